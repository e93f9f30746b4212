//! Multi-tenant cache over one pool and one index.
//!
//! ## Architecture
//!
//! ```text
//!   ┌──────────────────────────────────────────────────────────────────┐
//!   │                     SharedCache<T, K, V, H>                      │
//!   │                                                                  │
//!   │   NodePool<K, Tagged<T, V>>   Σ capacity slots, one arena        │
//!   │   NodeTable                   one index over every tenant        │
//!   │                                                                  │
//!   │   tenants: FxHashMap<T, LruCore>                                 │
//!   │     tag_a ──► { lru, in_use, free, erased, len, capacity }       │
//!   │     tag_b ──► { lru, in_use, free, erased, len, capacity }       │
//!   └──────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Every node carries its owner's tag, so `lookup`, `release` and `pin`
//! need no tag argument: they route through the stored one. Because all
//! tenants share the table, a lookup can find any tenant's entry by key
//! alone, and it refreshes the *owning* tenant's LRU even when the caller
//! is another tenant. That cross-tenant refresh is a known wart of the
//! shared-index design, kept intentionally and pinned by a test.
//!
//! [`SharedCache::relocate`] rebalances capacity by preempting slots from
//! one tenant's view and assigning them to another's free list; the sum of
//! the two capacities is conserved.

use std::fmt;
use std::hash::Hash;

use rustc_hash::FxHashMap;

use crate::ds::node_pool::NodePool;
use crate::ds::node_table::NodeTable;
use crate::error::{ConfigError, InvariantError};
use crate::hash::{Hash32, PageHash};
use crate::policy::lru::{Handle, LruCore};

/// Node payload of a shared cache: the owner's tag plus the caller value.
#[derive(Debug, Default, Clone, Copy)]
pub struct Tagged<T, V> {
    pub tag: T,
    pub value: V,
}

/// Multi-tenant pinned LRU cache; see the module docs.
///
/// # Example
///
/// ```
/// use ghostkit::policy::shared::SharedCache;
///
/// let mut cache: SharedCache<u8, u32, u64> = SharedCache::new(&[(1, 3), (2, 2)]);
/// let h = cache.insert(1, 100, false).unwrap();
/// *cache.value_mut(h) = 7;
///
/// // Tag-free lookup finds any tenant's entry.
/// assert_eq!(cache.lookup(100, false), Some(h));
/// assert_eq!(cache.tag_of(h), 1);
///
/// // Move two slots from tenant 1 to tenant 2.
/// assert_eq!(cache.relocate(1, 2, 2), 2);
/// assert_eq!(cache.capacity_of(1), 1);
/// assert_eq!(cache.capacity_of(2), 4);
/// ```
pub struct SharedCache<T, K, V, H = PageHash> {
    pool: NodePool<K, Tagged<T, V>>,
    table: NodeTable,
    tenants: FxHashMap<T, LruCore>,
    hasher: H,
}

impl<T, K, V> SharedCache<T, K, V>
where
    T: Copy + Eq + Hash + Default,
    K: Copy + Eq + Default,
    V: Default,
    PageHash: Hash32<K>,
{
    /// Creates a shared cache from `(tag, capacity)` pairs.
    ///
    /// # Panics
    ///
    /// Panics if the configuration is invalid; see [`SharedCache::try_new`].
    pub fn new(tenant_configs: &[(T, usize)]) -> Self {
        Self::try_new(tenant_configs).expect("invalid tenant configuration")
    }

    /// Creates a shared cache, rejecting empty configurations, zero
    /// capacities and duplicate tags.
    pub fn try_new(tenant_configs: &[(T, usize)]) -> Result<Self, ConfigError> {
        Self::try_with_hasher(tenant_configs, PageHash)
    }
}

impl<T, K, V, H> SharedCache<T, K, V, H>
where
    T: Copy + Eq + Hash + Default,
    K: Copy + Eq + Default,
    V: Default,
    H: Hash32<K>,
{
    /// [`SharedCache::try_new`] with an explicit hash function.
    pub fn try_with_hasher(tenant_configs: &[(T, usize)], hasher: H) -> Result<Self, ConfigError> {
        if tenant_configs.is_empty() {
            return Err(ConfigError::new("shared cache needs at least one tenant"));
        }
        let total: usize = tenant_configs.iter().map(|&(_, cap)| cap).sum();
        let mut pool = NodePool::new(total);
        let table = NodeTable::new(total);
        let mut tenants = FxHashMap::default();
        let mut offset = 0;
        for &(tag, cap) in tenant_configs {
            if cap == 0 {
                return Err(ConfigError::new("tenant capacity must be nonzero"));
            }
            let core = LruCore::new(&mut pool, offset..offset + cap);
            if tenants.insert(tag, core).is_some() {
                return Err(ConfigError::new("duplicate tenant tag"));
            }
            offset += cap;
        }
        Ok(SharedCache {
            pool,
            table,
            tenants,
            hasher,
        })
    }

    /// Capacity currently assigned to `tag`.
    pub fn capacity_of(&self, tag: T) -> usize {
        self.tenant(tag).capacity()
    }

    /// Live entries currently owned by `tag`.
    pub fn size_of(&self, tag: T) -> usize {
        self.tenant(tag).len()
    }

    /// Total capacity across tenants.
    pub fn total_capacity(&self) -> usize {
        self.tenants.values().map(LruCore::capacity).sum()
    }

    /// Inserts `key` for tenant `tag` if the key is absent anywhere in the
    /// cache. A hit (even on another tenant's entry) refreshes the
    /// owner's LRU and returns the existing handle. `None` means the
    /// tenant's slots are exhausted and all pinned.
    pub fn insert(&mut self, tag: T, key: K, pin: bool) -> Option<Handle> {
        let hash = self.hasher.hash32(&key);
        if let Some(e) = self.table.lookup(&self.pool, key, hash) {
            let owner = self.pool.node(e).value.tag;
            self.tenants
                .get_mut(&owner)
                .expect("unknown tenant tag")
                .lookup_refresh(&mut self.pool, e, pin);
            return Some(Handle(e));
        }
        let e = self
            .tenants
            .get_mut(&tag)
            .expect("unknown tenant tag")
            .insert_impl(&mut self.pool, &mut self.table, key, hash, pin, true)?;
        self.pool.node_mut(e).value.tag = tag;
        Some(Handle(e))
    }

    /// Tag-free lookup across every tenant. Refreshes the owning tenant's
    /// LRU regardless of who calls.
    pub fn lookup(&mut self, key: K, pin: bool) -> Option<Handle> {
        let hash = self.hasher.hash32(&key);
        let e = self.table.lookup(&self.pool, key, hash)?;
        let owner = self.pool.node(e).value.tag;
        self.tenants
            .get_mut(&owner)
            .expect("unknown tenant tag")
            .lookup_refresh(&mut self.pool, e, pin);
        Some(Handle(e))
    }

    /// Releases a pin, routing through the node's stored tag.
    pub fn release(&mut self, h: Handle) {
        let owner = self.pool.node(h.0).value.tag;
        self.tenants
            .get_mut(&owner)
            .expect("unknown tenant tag")
            .release(&mut self.pool, h.0);
    }

    /// Pins a handle; must be matched by [`SharedCache::release`].
    pub fn pin(&mut self, h: Handle) {
        let owner = self.pool.node(h.0).value.tag;
        self.tenants
            .get_mut(&owner)
            .expect("unknown tenant tag")
            .ref_node(&mut self.pool, h.0);
    }

    /// Removes an unpinned entry from its owner, lowering that tenant's
    /// capacity. Returns `false` if the node is pinned.
    pub fn erase(&mut self, h: Handle) -> bool {
        let owner = self.pool.node(h.0).value.tag;
        let pool = &mut self.pool;
        let table = &mut self.table;
        self.tenants
            .get_mut(&owner)
            .expect("unknown tenant tag")
            .erase(pool, table, h.0)
    }

    /// Adds an entry for `tag` outside the normal churn, raising that
    /// tenant's capacity. The caller must set the value before reading it.
    pub fn install(&mut self, tag: T, key: K) -> Handle {
        let hash = self.hasher.hash32(&key);
        let pool = &mut self.pool;
        let table = &mut self.table;
        let e = self
            .tenants
            .get_mut(&tag)
            .expect("unknown tenant tag")
            .install(pool, table, key, hash);
        self.pool.node_mut(e).value.tag = tag;
        Handle(e)
    }

    /// Moves up to `count` slots from `src` to `dst`, evicting `src`
    /// entries as needed. Stops early when `src` has nothing left to give
    /// (every remaining slot pinned). Returns the number actually moved;
    /// `capacity_of(src) + capacity_of(dst)` is conserved.
    pub fn relocate(&mut self, src: T, dst: T, count: usize) -> usize {
        for moved in 0..count {
            let e = {
                let pool = &mut self.pool;
                let table = &mut self.table;
                match self
                    .tenants
                    .get_mut(&src)
                    .expect("unknown tenant tag")
                    .preempt(pool, table)
                {
                    Some(e) => e,
                    None => return moved,
                }
            };
            self.tenants
                .get_mut(&dst)
                .expect("unknown tenant tag")
                .assign(&mut self.pool, e);
        }
        count
    }

    /// Entry key for a live handle.
    #[inline]
    pub fn key(&self, h: Handle) -> K {
        self.pool.node(h.0).key
    }

    /// Owning tenant of a live handle.
    #[inline]
    pub fn tag_of(&self, h: Handle) -> T {
        self.pool.node(h.0).value.tag
    }

    /// Entry payload for a live handle.
    #[inline]
    pub fn value(&self, h: Handle) -> &V {
        &self.pool.node(h.0).value.value
    }

    /// Mutable entry payload for a live handle.
    #[inline]
    pub fn value_mut(&mut self, h: Handle) -> &mut V {
        &mut self.pool.node_mut(h.0).value.value
    }

    /// Unpinned entries of one tenant, oldest first.
    pub fn iter_lru(&self, tag: T) -> impl Iterator<Item = Handle> + '_ {
        self.pool
            .iter_list(self.tenant(tag).lru_sentinel())
            .map(Handle)
    }

    /// Pinned entries of one tenant.
    pub fn iter_in_use(&self, tag: T) -> impl Iterator<Item = Handle> + '_ {
        self.pool
            .iter_list(self.tenant(tag).in_use_sentinel())
            .map(Handle)
    }

    #[inline]
    fn tenant(&self, tag: T) -> &LruCore {
        self.tenants.get(&tag).expect("unknown tenant tag")
    }

    /// Per-tenant structural invariants plus the shared-table bijection.
    /// Intended for tests and debugging; walks every list and bucket.
    pub fn check_invariants(&self) -> Result<(), InvariantError> {
        use rustc_hash::FxHashSet;

        let mut live = FxHashSet::default();
        for (tag, core) in &self.tenants {
            for id in self.pool.iter_list(core.lru_sentinel()) {
                let n = self.pool.node(id);
                if n.refs != 1 {
                    return Err(InvariantError::new("lru node with refs != 1"));
                }
                if n.value.tag != *tag {
                    return Err(InvariantError::new("lru node filed under wrong tenant"));
                }
                if !live.insert(id) {
                    return Err(InvariantError::new("node on two tenant lists"));
                }
            }
            for id in self.pool.iter_list(core.in_use_sentinel()) {
                if self.pool.node(id).refs < 2 {
                    return Err(InvariantError::new("in_use node with refs < 2"));
                }
                if !live.insert(id) {
                    return Err(InvariantError::new("node on two tenant lists"));
                }
            }
        }
        let table_entries = self.table.collect_entries(&self.pool);
        if table_entries.len() != live.len() {
            return Err(InvariantError::new("table/list bijection broken"));
        }
        for id in table_entries {
            if !live.contains(&id) {
                return Err(InvariantError::new("table entry not on any tenant list"));
            }
        }
        Ok(())
    }
}

impl<T, K, V, H> fmt::Debug for SharedCache<T, K, V, H>
where
    T: Copy + Eq + Hash + Default + fmt::Debug,
    K: Copy + Eq + Default + fmt::Debug,
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut map = f.debug_map();
        for (tag, core) in &self.tenants {
            let keys: Vec<K> = self
                .pool
                .iter_list(core.lru_sentinel())
                .map(|id| self.pool.node(id).key)
                .collect();
            map.entry(tag, &keys);
        }
        map.finish()
    }
}
