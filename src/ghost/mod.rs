pub mod cache;
pub mod sampled;
pub mod sampled_kv;

pub use cache::{AccessMode, ConcurrentGhostCache, GhostCache, GhostMeta};
pub use sampled::SampledGhostCache;
pub use sampled_kv::{KvMeta, SampledGhostKvCache};
