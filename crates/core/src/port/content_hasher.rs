// Content Hasher Port
// Stable identity of an artifact so identical submissions are recognised

use crate::domain::{AnalysisOptions, CacheKey, ContentDigest};
use async_trait::async_trait;
use std::path::Path;

/// Content hasher interface
///
/// Implementations:
/// - Sha256ContentHasher (infra-system): streaming SHA-256
#[async_trait]
pub trait ContentHasher: Send + Sync {
    /// Hash a file on disk without loading it fully into memory
    ///
    /// # Errors
    /// Any I/O error reading the artifact. Callers treat this as terminal.
    async fn hash_file(&self, path: &Path) -> std::io::Result<ContentDigest>;

    /// Hash an in-memory buffer
    fn hash_bytes(&self, bytes: &[u8]) -> ContentDigest;

    /// Content key of an artifact analysed with the given options
    fn cache_key(&self, content: &ContentDigest, options: &AnalysisOptions) -> CacheKey {
        let context = self.hash_bytes(&options.key_material());
        CacheKey::compose(content, options.tier, &context)
    }
}

// ============================================================================
// Mock Implementations for Testing
// ============================================================================

pub mod mocks {
    use super::*;

    /// Hex encoding of the raw bytes. Not collision resistant past small
    /// inputs; only meant for tests with tiny fixture files.
    pub struct HexContentHasher;

    fn to_hex(bytes: &[u8]) -> String {
        bytes.iter().map(|b| format!("{:02x}", b)).collect()
    }

    #[async_trait]
    impl ContentHasher for HexContentHasher {
        async fn hash_file(&self, path: &Path) -> std::io::Result<ContentDigest> {
            let bytes = tokio::fs::read(path).await?;
            Ok(ContentDigest::new(to_hex(&bytes)))
        }

        fn hash_bytes(&self, bytes: &[u8]) -> ContentDigest {
            ContentDigest::new(to_hex(bytes))
        }
    }
}
