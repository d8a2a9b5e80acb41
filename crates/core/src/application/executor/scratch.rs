// Owned temporary resources of a job
//
// Normal paths call `remove().await`. Dropping an unremoved guard deletes
// synchronously, which covers early returns and panic unwinding; either way
// each path is deleted exactly once.

use std::io;
use std::path::{Path, PathBuf};
use tokio::io::AsyncReadExt;
use tracing::{debug, warn};

/// Exclusively owned uploaded file.
///
/// Ownership moves submitter -> queue -> executor; whoever holds it last
/// deletes it by dropping it.
#[derive(Debug)]
pub struct Artifact {
    path: PathBuf,
    removed: bool,
}

impl Artifact {
    /// Take ownership of a file on disk
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            removed: false,
        }
    }

    /// Delete the file without blocking the runtime
    pub async fn remove(mut self) {
        self.removed = true;
        log_file_removal(&self.path, tokio::fs::remove_file(&self.path).await);
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Read up to `len` leading bytes (short files return fewer)
    pub async fn read_header(&self, len: usize) -> io::Result<Vec<u8>> {
        let mut file = tokio::fs::File::open(&self.path).await?;
        let mut buf = vec![0u8; len];
        let mut filled = 0;
        while filled < len {
            let n = file.read(&mut buf[filled..]).await?;
            if n == 0 {
                break;
            }
            filled += n;
        }
        buf.truncate(filled);
        Ok(buf)
    }
}

impl Drop for Artifact {
    fn drop(&mut self) {
        if !self.removed {
            log_file_removal(&self.path, std::fs::remove_file(&self.path));
        }
    }
}

fn log_file_removal(path: &Path, result: io::Result<()>) {
    match result {
        Ok(()) => debug!(path = %path.display(), "Artifact deleted"),
        Err(e) if e.kind() == io::ErrorKind::NotFound => {
            debug!(path = %path.display(), "Artifact already gone")
        }
        Err(e) => warn!(path = %path.display(), error = %e, "Failed to delete artifact"),
    }
}

/// Per-job scratch directory, namespaced by job id and start time
#[derive(Debug)]
pub struct ScratchDir {
    path: PathBuf,
    removed: bool,
}

impl ScratchDir {
    /// Create `<root>/<job id>-<now millis>`
    pub async fn create(root: &Path, job_id: &str, now_millis: i64) -> io::Result<Self> {
        let path = root.join(format!("{}-{}", sanitize(job_id), now_millis));
        tokio::fs::create_dir_all(&path).await?;
        Ok(Self {
            path,
            removed: false,
        })
    }

    /// Delete the directory and its frames without blocking the runtime
    pub async fn remove(mut self) {
        self.removed = true;
        log_dir_removal(&self.path, tokio::fs::remove_dir_all(&self.path).await);
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Regular files currently in the directory, sorted by name
    pub async fn files(&self) -> io::Result<Vec<PathBuf>> {
        let mut entries = tokio::fs::read_dir(&self.path).await?;
        let mut files = Vec::new();
        while let Some(entry) = entries.next_entry().await? {
            if entry.file_type().await?.is_file() {
                files.push(entry.path());
            }
        }
        files.sort();
        Ok(files)
    }
}

impl Drop for ScratchDir {
    fn drop(&mut self) {
        if !self.removed {
            log_dir_removal(&self.path, std::fs::remove_dir_all(&self.path));
        }
    }
}

fn log_dir_removal(path: &Path, result: io::Result<()>) {
    match result {
        Ok(()) => debug!(path = %path.display(), "Scratch directory removed"),
        Err(e) if e.kind() == io::ErrorKind::NotFound => {}
        Err(e) => warn!(
            path = %path.display(),
            error = %e,
            "Failed to remove scratch directory"
        ),
    }
}

fn sanitize(job_id: &str) -> String {
    job_id
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || c == '-' || c == '_' {
                c
            } else {
                '_'
            }
        })
        .collect()
}
