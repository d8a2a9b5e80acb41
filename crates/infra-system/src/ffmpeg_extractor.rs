// ffmpeg-based frame extractor
//
// One ffprobe call for the duration, one ffmpeg call sampling `count` frames
// evenly across the clip. Children are killed when the future is dropped, so
// the caller's timeout also terminates a hung process.

use async_trait::async_trait;
use clipscope_core::port::{ExtractionError, FrameExtractor, FrameSpec};
use std::ffi::OsString;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use tokio::process::Command;
use tracing::{debug, info, warn};

const FRAME_PREFIX: &str = "frame_";
const FRAME_PATTERN: &str = "frame_%03d.jpg";
const JPEG_QUALITY: &str = "3";
const STDERR_TAIL_CHARS: usize = 400;

pub struct FfmpegFrameExtractor {
    ffmpeg: PathBuf,
    ffprobe: PathBuf,
}

impl FfmpegFrameExtractor {
    /// Use `ffmpeg` and `ffprobe` from PATH
    pub fn new() -> Self {
        Self::with_binaries("ffmpeg", "ffprobe")
    }

    pub fn with_binaries(ffmpeg: impl Into<PathBuf>, ffprobe: impl Into<PathBuf>) -> Self {
        Self {
            ffmpeg: ffmpeg.into(),
            ffprobe: ffprobe.into(),
        }
    }

    /// Clip duration in seconds
    async fn probe_duration(&self, artifact: &Path) -> Result<f64, ExtractionError> {
        let output = Command::new(&self.ffprobe)
            .args([
                "-v",
                "error",
                "-show_entries",
                "format=duration",
                "-of",
                "default=noprint_wrappers=1:nokey=1",
            ])
            .arg(artifact)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .output()
            .await
            .map_err(|e| spawn_error(&self.ffprobe, e))?;

        if !output.status.success() {
            return Err(ExtractionError::ProbeFailed(stderr_tail(&output.stderr)));
        }

        let stdout = String::from_utf8_lossy(&output.stdout);
        parse_duration(&stdout).ok_or_else(|| {
            ExtractionError::ProbeFailed(format!("unusable duration '{}'", stdout.trim()))
        })
    }
}

impl Default for FfmpegFrameExtractor {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl FrameExtractor for FfmpegFrameExtractor {
    async fn extract(
        &self,
        artifact: &Path,
        out_dir: &Path,
        spec: FrameSpec,
    ) -> Result<Vec<PathBuf>, ExtractionError> {
        if spec.count == 0 {
            return Ok(Vec::new());
        }

        let duration = self.probe_duration(artifact).await?;
        let args = build_args(artifact, out_dir, spec, duration);
        debug!(
            artifact = %artifact.display(),
            duration_secs = duration,
            count = spec.count,
            width = spec.width,
            "Starting frame extraction"
        );

        let output = Command::new(&self.ffmpeg)
            .args(&args)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .output()
            .await
            .map_err(|e| spawn_error(&self.ffmpeg, e))?;

        let mut frames = list_frames(out_dir).await?;
        frames.truncate(spec.count);

        if !output.status.success() {
            let detail = stderr_tail(&output.stderr);
            if frames.is_empty() {
                return Err(ExtractionError::Failed(detail));
            }
            // Partial output is still useful input
            warn!(
                exit_code = ?output.status.code(),
                frames = frames.len(),
                stderr = %detail,
                "ffmpeg exited with an error after writing some frames"
            );
        }

        info!(frames = frames.len(), requested = spec.count, "Frames extracted");
        Ok(frames)
    }
}

/// ffmpeg arguments sampling `spec.count` frames evenly over `duration`
fn build_args(artifact: &Path, out_dir: &Path, spec: FrameSpec, duration: f64) -> Vec<OsString> {
    let rate = spec.count as f64 / duration;
    let filter = format!("fps={:.6},scale={}:-2", rate, spec.width);

    let mut args: Vec<OsString> = ["-hide_banner", "-loglevel", "error", "-nostdin", "-y", "-i"]
        .iter()
        .map(OsString::from)
        .collect();
    args.push(artifact.as_os_str().to_owned());
    for arg in [
        "-vf".to_string(),
        filter,
        "-frames:v".to_string(),
        spec.count.to_string(),
        "-q:v".to_string(),
        JPEG_QUALITY.to_string(),
    ] {
        args.push(OsString::from(arg));
    }
    args.push(out_dir.join(FRAME_PATTERN).into_os_string());
    args
}

fn parse_duration(stdout: &str) -> Option<f64> {
    stdout
        .lines()
        .map(str::trim)
        .find(|line| !line.is_empty())
        .and_then(|line| line.parse::<f64>().ok())
        .filter(|d| d.is_finite() && *d > 0.0)
}

async fn list_frames(out_dir: &Path) -> Result<Vec<PathBuf>, ExtractionError> {
    let mut entries = tokio::fs::read_dir(out_dir).await?;
    let mut frames = Vec::new();
    while let Some(entry) = entries.next_entry().await? {
        let name = entry.file_name();
        let name = name.to_string_lossy();
        if name.starts_with(FRAME_PREFIX) && name.ends_with(".jpg") {
            frames.push(entry.path());
        }
    }
    frames.sort();
    Ok(frames)
}

fn spawn_error(binary: &Path, e: std::io::Error) -> ExtractionError {
    if e.kind() == ErrorKind::NotFound {
        ExtractionError::SpawnFailed(format!("{} not found", binary.display()))
    } else {
        ExtractionError::SpawnFailed(format!("{}: {}", binary.display(), e))
    }
}

fn stderr_tail(stderr: &[u8]) -> String {
    let text = String::from_utf8_lossy(stderr);
    let text = text.trim();
    let skip = text.chars().count().saturating_sub(STDERR_TAIL_CHARS);
    text.chars().skip(skip).collect()
}
