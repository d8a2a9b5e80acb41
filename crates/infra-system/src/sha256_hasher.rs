// Streaming SHA-256 content hasher
use async_trait::async_trait;
use clipscope_core::domain::ContentDigest;
use clipscope_core::port::ContentHasher;
use sha2::{Digest, Sha256};
use std::path::Path;
use tokio::io::AsyncReadExt;

const DEFAULT_CHUNK_SIZE: usize = 64 * 1024;

/// SHA-256 over the full file contents, read in fixed-size chunks
pub struct Sha256ContentHasher {
    chunk_size: usize,
}

impl Sha256ContentHasher {
    pub fn new() -> Self {
        Self {
            chunk_size: DEFAULT_CHUNK_SIZE,
        }
    }

    /// Smaller chunks exercise the streaming path in tests
    pub fn with_chunk_size(chunk_size: usize) -> Self {
        Self {
            chunk_size: chunk_size.max(1),
        }
    }
}

impl Default for Sha256ContentHasher {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ContentHasher for Sha256ContentHasher {
    async fn hash_file(&self, path: &Path) -> std::io::Result<ContentDigest> {
        let mut file = tokio::fs::File::open(path).await?;
        let mut hasher = Sha256::new();
        let mut buf = vec![0u8; self.chunk_size];

        loop {
            let n = file.read(&mut buf).await?;
            if n == 0 {
                break;
            }
            hasher.update(&buf[..n]);
        }

        Ok(ContentDigest::new(format!("{:x}", hasher.finalize())))
    }

    fn hash_bytes(&self, bytes: &[u8]) -> ContentDigest {
        ContentDigest::new(format!("{:x}", Sha256::digest(bytes)))
    }
}
