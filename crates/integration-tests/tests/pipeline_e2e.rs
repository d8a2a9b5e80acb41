//! End-to-end pipeline behavior: admission limits, retries, degradation
//! and cleanup, with the real store and hasher.

mod common;

use clipscope_core::application::Submission;
use clipscope_core::domain::{AnalysisError, AnalysisOptions, DetailTier, JobStatus};
use clipscope_core::port::analyzer::mocks::ScriptedAnalyzer;
use clipscope_core::port::frame_extractor::mocks::ExtractBehavior;
use clipscope_core::port::AnalyzerError;
use common::{eventually, World};

#[tokio::test]
async fn test_concurrency_ceiling_and_fifo_queue() {
    let world = World::new(ScriptedAnalyzer::gated());
    let mut service = world.service(world.config(2, Some(8)));
    service.start().await;
    let controller = service.controller().clone();

    let mut handles = Vec::new();
    for i in 0..5usize {
        let artifact = world.upload(&format!("clip{}.mp4", i), format!("clip-{}", i).as_bytes());
        match controller
            .submit(artifact, AnalysisOptions::default())
            .await
            .unwrap()
        {
            Submission::Admitted(handle) => {
                assert!(i < 2, "job {} should have been queued", i);
                handles.push(handle);
            }
            Submission::Queued { position, handle } => {
                assert_eq!(position, i - 1);
                assert_eq!(handle.status(), JobStatus::Queued { position });
                handles.push(handle);
            }
            Submission::Cached(_) => panic!("nothing is cached yet"),
        }
    }

    assert!(eventually(|| world.analyzer.in_flight() == 2).await);
    let stats = controller.stats();
    assert_eq!((stats.running, stats.queued), (2, 3));

    // One slot frees up: the head of the queue starts, the rest move up
    world.analyzer.release(1);
    assert!(eventually(|| handles[2].status() == JobStatus::Running).await);
    assert_eq!(handles[3].status(), JobStatus::Queued { position: 1 });
    assert_eq!(handles[4].status(), JobStatus::Queued { position: 2 });

    world.analyzer.release(4);
    for handle in handles {
        let report = handle.wait().await.unwrap();
        assert!(!report.cached);
    }

    assert_eq!(world.analyzer.call_count(), 5);
    assert!(world.analyzer.peak_in_flight() <= 2);

    assert!(world.uploads_are_empty());
    assert!(world.scratch_is_empty());
    assert_eq!(world.persisted_entries(), 5);

    let report = service.shutdown().await;
    assert!(report.drained);
}

#[tokio::test]
async fn test_queue_full_rejects_and_deletes_upload() {
    let world = World::new(ScriptedAnalyzer::gated());
    let mut service = world.service(world.config(1, Some(1)));
    service.start().await;
    let controller = service.controller().clone();

    let first = controller
        .submit(world.upload("a.mp4", b"a"), AnalysisOptions::default())
        .await
        .unwrap();
    let second = controller
        .submit(world.upload("b.mp4", b"b"), AnalysisOptions::default())
        .await
        .unwrap();
    assert!(matches!(first, Submission::Admitted(_)));
    assert!(matches!(second, Submission::Queued { position: 1, .. }));

    let rejected = world.upload("c.mp4", b"c");
    let rejected_path = rejected.path().to_path_buf();
    let err = controller
        .submit(rejected, AnalysisOptions::default())
        .await
        .unwrap_err();
    assert_eq!(
        err,
        AnalysisError::QueueFull {
            running: 1,
            queued: 1
        }
    );
    assert!(!rejected_path.exists());

    world.analyzer.release(2);
    for submission in [first, second] {
        match submission {
            Submission::Admitted(handle) | Submission::Queued { handle, .. } => {
                handle.wait().await.unwrap();
            }
            Submission::Cached(_) => unreachable!(),
        }
    }
    assert!(world.uploads_are_empty());
    service.shutdown().await;
}

#[tokio::test]
async fn test_transient_failures_exhaust_retries_without_caching() {
    let transient = || Err(AnalyzerError::Transient("503 Service Unavailable".to_string()));
    let world = World::new(ScriptedAnalyzer::with_script(vec![
        transient(),
        transient(),
        transient(),
    ]));
    let mut service = world.service(world.config(2, Some(4)));
    service.start().await;
    let controller = service.controller().clone();

    let handle = match controller
        .submit(world.upload("lag.mp4", b"lag spike"), AnalysisOptions::default())
        .await
        .unwrap()
    {
        Submission::Admitted(handle) => handle,
        _ => panic!("expected immediate admission"),
    };
    let status = handle.watch_status();
    let err = handle.wait().await.unwrap_err();

    match err {
        AnalysisError::AnalysisUnavailable { attempts, reason } => {
            assert_eq!(attempts, 3);
            assert!(reason.contains("503"));
        }
        other => panic!("unexpected error: {:?}", other),
    }
    assert_eq!(*status.borrow(), JobStatus::Failed);
    assert_eq!(world.sleeper.delays().len(), 2);
    assert!(service.cache().is_empty());
    assert!(world.uploads_are_empty());
    assert!(world.scratch_is_empty());

    // Same clip again is analyzed afresh, not served a cached failure
    let again = controller
        .submit(world.upload("lag.mp4", b"lag spike"), AnalysisOptions::default())
        .await
        .unwrap();
    let report = match again {
        Submission::Admitted(handle) => handle.wait().await.unwrap(),
        _ => panic!("expected immediate admission"),
    };
    assert_eq!(report.stats.inference_attempts, 1);

    let usage = service.usage().snapshot();
    assert_eq!(usage.daily.failures, 1);
    assert_eq!(usage.daily.analyses, 1);
    service.shutdown().await;
}

#[tokio::test]
async fn test_partial_extraction_degrades_report() {
    let world = World::new(ScriptedAnalyzer::new());
    world.extractor.set_behavior(ExtractBehavior::FailAfter(3));
    let mut service = world.service(world.config(1, Some(1)));
    service.start().await;

    let submission = service
        .controller()
        .submit(
            world.upload("dropped.mp4", b"dropped frames"),
            AnalysisOptions::with_tier(DetailTier::High),
        )
        .await
        .unwrap();
    let report = match submission {
        Submission::Admitted(handle) => handle.wait().await.unwrap(),
        _ => panic!("expected immediate admission"),
    };

    let degraded = report.degradation.expect("degradation recorded");
    assert_eq!(degraded.frames_requested, 12);
    assert_eq!(degraded.frames_extracted, 3);
    assert_eq!(report.stats.frames_extracted, 3);
    assert_eq!(world.analyzer.frames_seen(), vec![3]);
    assert!(world.scratch_is_empty());
    service.shutdown().await;
}

#[tokio::test]
async fn test_permanent_rejection_is_not_retried() {
    let world = World::new(ScriptedAnalyzer::with_script(vec![Err(
        AnalyzerError::Permanent("400 Bad Request".to_string()),
    )]));
    let mut service = world.service(world.config(1, None));
    service.start().await;

    let submission = service
        .controller()
        .submit(world.upload("bad.mp4", b"bad"), AnalysisOptions::default())
        .await
        .unwrap();
    let err = match submission {
        Submission::Admitted(handle) => handle.wait().await.unwrap_err(),
        _ => panic!("expected immediate admission"),
    };

    assert!(matches!(
        err,
        AnalysisError::AnalysisUnavailable { attempts: 1, .. }
    ));
    assert!(world.sleeper.delays().is_empty());
    assert_eq!(world.analyzer.call_count(), 1);
    service.shutdown().await;
}
