// Clipscope Infrastructure - Durable Cache Store
// Implements: CacheStore (single JSON file, atomic replace)

mod json_file_store;

pub use json_file_store::JsonFileCacheStore;
