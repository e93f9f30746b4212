pub mod lru;
pub mod shared;

pub use lru::{Handle, LruCache, LruCore};
pub use shared::{SharedCache, Tagged};
