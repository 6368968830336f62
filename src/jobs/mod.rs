pub mod cache_warmer;
pub mod sync;

pub use cache_warmer::CacheWarmer;
pub use sync::{ResultSync, SyncStats};
