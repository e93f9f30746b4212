pub use crate::ds::{NodeId, NodePool, NodeTable};
pub use crate::error::{ConfigError, InvariantError};
pub use crate::ghost::{
    AccessMode, ConcurrentGhostCache, GhostCache, KvMeta, SampledGhostCache, SampledGhostKvCache,
};
pub use crate::hash::{hash_bytes, Hash32, IdHash, MurmurHash32, PageHash, XxHash32};
pub use crate::policy::{Handle, LruCache, SharedCache, Tagged};
pub use crate::stat::{AtomicCacheStat, CacheStat};
