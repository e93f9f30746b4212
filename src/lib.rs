//! ghostkit: pinned-LRU cache primitives and ghost-cache MRC profiling.
//!
//! The crate has three layers:
//!
//! - [`ds`]: a fixed slot pool of intrusive nodes plus an open-chained hash
//!   index, the storage every cache in this crate runs on.
//! - [`policy`]: the pinned LRU core ([`policy::lru::LruCache`]) and the
//!   multi-tenant façade ([`policy::shared::SharedCache`]).
//! - [`ghost`]: metadata-only caches that report, from a single access
//!   stream, the hit rate every cache size in a configured spectrum would
//!   have achieved, optionally with hash-prefix sampling and KV byte
//!   accounting.
//!
//! See `DESIGN.md` for internal architecture and invariants.

pub mod ds;
pub mod error;
pub mod ghost;
pub mod hash;
pub mod policy;
pub mod prelude;
pub mod stat;
