// Clipscope Infrastructure - System Adapters
// Implements: FrameExtractor (ffmpeg/ffprobe subprocesses), ContentHasher (SHA-256)

pub mod ffmpeg_extractor;
pub mod sha256_hasher;

pub use ffmpeg_extractor::FfmpegFrameExtractor;
pub use sha256_hasher::Sha256ContentHasher;
