//! Pinned LRU cache over a fixed node pool.
//!
//! ## Architecture
//!
//! ```text
//!   ┌─────────────────────────────────────────────────────────────────┐
//!   │                       LruCache<K, V, H>                         │
//!   │                                                                 │
//!   │   NodePool<K, V>      pool of C recyclable slots + sentinels    │
//!   │   NodeTable           (key, hash) -> NodeId, fixed buckets      │
//!   │   LruCore             list heads + len/capacity counters        │
//!   │                                                                 │
//!   │   lru:    oldest ◄──► … ◄──► newest     refs == 1, evictable    │
//!   │   in_use: pinned nodes, any order       refs >= 2               │
//!   │   free:   recyclable slots, never handed to clients             │
//!   │   erased: slots removed by erase(), value is garbage            │
//!   └─────────────────────────────────────────────────────────────────┘
//! ```
//!
//! A live node is on exactly one list, and it is in the table iff it is on
//! `lru` or `in_use`. Values are initialized once (optionally seeded by
//! [`LruCache::with_value_init`]) and survive recycling: after an eviction
//! the reused slot keeps the previous value until the caller overwrites it.
//! This is the usage pattern of a page cache, where the value is the
//! location of a physical buffer rather than data owned by the key.
//!
//! ## Node lifecycle
//!
//! ```text
//!   [free] ──alloc──► init ──► [lru] ◄──release── [in_use]
//!                                │  ▲                ▲
//!                                │  └──── unpin ─────┤
//!                              pin└───────────────────┘
//!   [lru] ──erase──► [erased] ──install──► [lru]   (new key)
//!   [lru] ──evict (alloc fallback)──► init ──► [lru]
//! ```
//!
//! ## Failure semantics
//!
//! `insert` returns `None` only when capacity is exhausted *and* every slot
//! is pinned. `lookup` returns `None` for absent keys. `erase` returns
//! `false` for pinned handles. Releasing an unpinned handle is a caller bug
//! caught by a debug assertion.
//!
//! [`LruCore`] is the view half: sentinels plus counters, with every method
//! taking the pool and table explicitly, so one pool can back many views
//! (see [`SharedCache`](crate::policy::shared::SharedCache)).

use std::fmt;
use std::ops::Range;

use crate::ds::node_pool::{NodeId, NodePool};
use crate::ds::node_table::NodeTable;
use crate::error::InvariantError;
use crate::hash::{Hash32, PageHash};

/// Non-owning reference to a cache entry.
///
/// A `Handle` stays valid until the underlying node is evicted, erased, or
/// the cache is dropped. Absence is expressed as `Option<Handle>`; the
/// entry's payload is read through [`LruCache::value`] /
/// [`LruCache::value_mut`] on the owning cache.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Handle(pub(crate) NodeId);

/// LRU bookkeeping for one pool region: four list sentinels plus the
/// current size and capacity.
///
/// All mutating methods take the pool and table as explicit arguments; the
/// core holds no storage of its own.
#[derive(Debug)]
pub struct LruCore {
    lru: NodeId,
    in_use: NodeId,
    free: NodeId,
    erased: NodeId,
    len: usize,
    capacity: usize,
}

impl LruCore {
    /// Creates a view over `slots` of `pool`, wiring them into the free
    /// list. Capacity equals the slot count.
    pub(crate) fn new<K, V>(pool: &mut NodePool<K, V>, slots: Range<usize>) -> Self
    where
        K: Copy + Eq + Default,
        V: Default,
    {
        let capacity = slots.len();
        let lru = pool.new_sentinel();
        let in_use = pool.new_sentinel();
        let free = pool.new_sentinel();
        let erased = pool.new_sentinel();
        for i in slots {
            pool.list_append(free, NodeId(i as u32));
        }
        LruCore {
            lru,
            in_use,
            free,
            erased,
            len: 0,
            capacity,
        }
    }

    /// Number of live entries (`lru` + `in_use`).
    #[inline]
    pub fn len(&self) -> usize {
        self.len
    }

    /// `true` if the view holds no live entries.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Current capacity; changed only by erase/install/preempt/assign.
    #[inline]
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    #[inline]
    pub(crate) fn lru_sentinel(&self) -> NodeId {
        self.lru
    }

    #[inline]
    pub(crate) fn in_use_sentinel(&self) -> NodeId {
        self.in_use
    }

    pub(crate) fn insert_impl<K, V>(
        &mut self,
        pool: &mut NodePool<K, V>,
        table: &mut NodeTable,
        key: K,
        hash: u32,
        pin: bool,
        hint_absent: bool,
    ) -> Option<NodeId>
    where
        K: Copy + Eq,
    {
        assert!(self.capacity > 0, "cache capacity must be set before use");

        if !hint_absent {
            if let Some(e) = self.lookup_impl(pool, table, key, hash, pin) {
                return Some(e);
            }
        } else {
            debug_assert!(table.lookup(pool, key, hash).is_none(), "absence hint was wrong");
        }

        let e = self.alloc_node(pool, table)?;
        pool.node_mut(e).reinit(key, hash);
        table.insert(pool, e);
        if pin {
            pool.node_mut(e).refs = 2;
            pool.list_append(self.in_use, e);
        } else {
            pool.list_append(self.lru, e);
        }
        self.len += 1;
        Some(e)
    }

    pub(crate) fn lookup_impl<K, V>(
        &mut self,
        pool: &mut NodePool<K, V>,
        table: &NodeTable,
        key: K,
        hash: u32,
        pin: bool,
    ) -> Option<NodeId>
    where
        K: Copy + Eq,
    {
        let e = table.lookup(pool, key, hash)?;
        self.lookup_refresh(pool, e, pin);
        Some(e)
    }

    /// Pin if asked; otherwise refresh LRU position when the node is on the
    /// `lru` list.
    pub(crate) fn lookup_refresh<K, V>(&mut self, pool: &mut NodePool<K, V>, e: NodeId, pin: bool) {
        if pin {
            self.ref_node(pool, e);
        } else if pool.node(e).refs == 1 {
            self.lru_refresh(pool, e);
        }
    }

    /// Ghost fast-path: like an unpinned insert, but also reports the node
    /// that occupies the accessed node's old position after the LRU move
    /// (`None` for a fresh insertion; the node itself when it was already
    /// the newest).
    pub(crate) fn refresh<K, V>(
        &mut self,
        pool: &mut NodePool<K, V>,
        table: &mut NodeTable,
        key: K,
        hash: u32,
    ) -> Option<(NodeId, Option<NodeId>)>
    where
        K: Copy + Eq,
    {
        assert!(self.capacity > 0, "cache capacity must be set before use");

        if let Some(e) = table.lookup(pool, key, hash) {
            let successor = self.lru_refresh(pool, e);
            return Some((e, Some(successor)));
        }

        let e = self.alloc_node(pool, table)?;
        pool.node_mut(e).reinit(key, hash);
        table.insert(pool, e);
        pool.list_append(self.lru, e);
        self.len += 1;
        Some((e, None))
    }

    /// Matches a prior pin. Refs must be > 1 on entry.
    pub(crate) fn release<K, V>(&mut self, pool: &mut NodePool<K, V>, e: NodeId) {
        debug_assert!(pool.node(e).refs > 1, "release without a matching pin");
        pool.node_mut(e).refs -= 1;
        if pool.node(e).refs == 1 {
            // No longer in use; back to the lru list.
            pool.list_remove(e);
            pool.list_append(self.lru, e);
        }
    }

    pub(crate) fn ref_node<K, V>(&mut self, pool: &mut NodePool<K, V>, e: NodeId) {
        if pool.node(e).refs == 1 {
            // First pin moves lru -> in_use.
            pool.list_remove(e);
            pool.list_append(self.in_use, e);
        }
        pool.node_mut(e).refs += 1;
    }

    /// Removes an unpinned node from circulation. The slot moves to the
    /// erased list and its value is garbage until `install` reuses it.
    pub(crate) fn erase<K, V>(
        &mut self,
        pool: &mut NodePool<K, V>,
        table: &mut NodeTable,
        e: NodeId,
    ) -> bool
    where
        K: Copy + Eq,
    {
        if pool.node(e).refs != 1 {
            return false;
        }
        pool.list_remove(e);
        pool.list_append(self.erased, e);
        // Not needed for correctness (reinit resets refs), but a zero ref
        // count makes a double erase observable.
        pool.node_mut(e).refs -= 1;
        let (key, hash) = {
            let n = pool.node(e);
            (n.key, n.hash)
        };
        let removed = table.remove(pool, key, hash);
        debug_assert_eq!(removed, Some(e));
        self.len -= 1;
        self.capacity -= 1;
        true
    }

    /// Adds a node outside the normal churn, reusing an erased slot or
    /// growing the pool. The caller must overwrite the value before reading
    /// it.
    pub(crate) fn install<K, V>(
        &mut self,
        pool: &mut NodePool<K, V>,
        table: &mut NodeTable,
        key: K,
        hash: u32,
    ) -> NodeId
    where
        K: Copy + Eq + Default,
        V: Default,
    {
        let e = match pool.list_oldest(self.erased) {
            Some(e) => {
                pool.list_remove(e);
                e
            }
            None => pool.push_overflow(),
        };
        pool.node_mut(e).reinit(key, hash);
        table.insert(pool, e);
        pool.list_append(self.lru, e);
        self.len += 1;
        self.capacity += 1;
        e
    }

    /// Surrenders one slot to the caller (free first, then evict the
    /// oldest), lowering capacity. Returns `None` when every slot is
    /// pinned.
    pub(crate) fn preempt<K, V>(
        &mut self,
        pool: &mut NodePool<K, V>,
        table: &mut NodeTable,
    ) -> Option<NodeId>
    where
        K: Copy + Eq,
    {
        let e = self.alloc_node(pool, table)?;
        self.capacity -= 1;
        Some(e)
    }

    /// Accepts a slot obtained elsewhere into the free list, raising
    /// capacity. Dual of [`LruCore::preempt`].
    pub(crate) fn assign<K, V>(&mut self, pool: &mut NodePool<K, V>, e: NodeId) {
        self.capacity += 1;
        pool.list_append(self.free, e);
    }

    /// Slot allocation: pop the free list, else evict the oldest `lru`
    /// node (unindexing it), else fail.
    fn alloc_node<K, V>(
        &mut self,
        pool: &mut NodePool<K, V>,
        table: &mut NodeTable,
    ) -> Option<NodeId>
    where
        K: Copy + Eq,
    {
        if let Some(e) = pool.list_oldest(self.free) {
            pool.list_remove(e);
            return Some(e);
        }

        let e = pool.list_oldest(self.lru)?;
        debug_assert_eq!(pool.node(e).refs, 1);
        pool.list_remove(e);
        let (key, hash) = {
            let n = pool.node(e);
            (n.key, n.hash)
        };
        let removed = table.remove(pool, key, hash);
        debug_assert_eq!(removed, Some(e));
        self.len -= 1;
        Some(e)
    }

    /// Moves `e` to the newest position and returns its successor: the node
    /// now holding `e`'s old position, or `e` itself if it was already the
    /// newest.
    fn lru_refresh<K, V>(&mut self, pool: &mut NodePool<K, V>, e: NodeId) -> NodeId {
        debug_assert_ne!(e, self.lru);
        debug_assert_eq!(pool.node(e).refs, 1);
        let successor = pool.node(e).next;
        if successor == self.lru {
            return e;
        }
        pool.list_remove(e);
        pool.list_append(self.lru, e);
        successor
    }
}

/// Owning pinned LRU cache: pool + table + one [`LruCore`] view.
///
/// # Example
///
/// ```
/// use ghostkit::policy::lru::LruCache;
///
/// let mut cache: LruCache<u32, u64> = LruCache::new(2);
/// let h = cache.insert(7, false).unwrap();
/// *cache.value_mut(h) = 42;
///
/// // A hit refreshes the LRU position.
/// assert_eq!(cache.lookup(7, false).map(|h| *cache.value(h)), Some(42));
///
/// // Filling past capacity evicts the oldest unpinned entry.
/// cache.insert(8, false);
/// cache.insert(9, false);
/// assert!(cache.lookup(7, false).is_none());
/// ```
pub struct LruCache<K, V, H = PageHash> {
    pool: NodePool<K, V>,
    table: NodeTable,
    core: LruCore,
    hasher: H,
}

impl<K, V> LruCache<K, V>
where
    K: Copy + Eq + Default,
    V: Default,
    PageHash: Hash32<K>,
{
    /// Creates a cache of `capacity` slots with default-initialized values.
    ///
    /// # Panics
    ///
    /// Panics if `capacity` is zero.
    pub fn new(capacity: usize) -> Self {
        Self::with_hasher(capacity, PageHash)
    }

    /// Creates a cache whose slot values are seeded by `init(slot_index)`,
    /// e.g. with pointers into a page buffer. Seeded values survive
    /// recycling.
    ///
    /// # Panics
    ///
    /// Panics if `capacity` is zero.
    pub fn with_value_init(capacity: usize, init: impl FnMut(usize) -> V) -> Self {
        Self::with_hasher_and_value_init(capacity, PageHash, init)
    }
}

impl<K, V, H> LruCache<K, V, H>
where
    K: Copy + Eq + Default,
    V: Default,
    H: Hash32<K>,
{
    /// Like [`LruCache::new`] with an explicit hash function.
    pub fn with_hasher(capacity: usize, hasher: H) -> Self {
        Self::with_hasher_and_value_init(capacity, hasher, |_| V::default())
    }

    /// Like [`LruCache::with_value_init`] with an explicit hash function.
    pub fn with_hasher_and_value_init(
        capacity: usize,
        hasher: H,
        init: impl FnMut(usize) -> V,
    ) -> Self {
        assert!(capacity > 0, "cache capacity must be nonzero");
        let mut pool = NodePool::new_with(capacity, init);
        let table = NodeTable::new(capacity);
        let core = LruCore::new(&mut pool, 0..capacity);
        LruCache {
            pool,
            table,
            core,
            hasher,
        }
    }

    /// Number of live entries.
    #[inline]
    pub fn len(&self) -> usize {
        self.core.len()
    }

    /// `true` if the cache holds no live entries.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.core.is_empty()
    }

    /// Current capacity (erase lowers it, install raises it).
    #[inline]
    pub fn capacity(&self) -> usize {
        self.core.capacity()
    }

    /// Inserts `key` if absent, returning its handle; returns the existing
    /// handle (refreshed, optionally pinned) on a duplicate. `None` means
    /// every slot is pinned.
    pub fn insert(&mut self, key: K, pin: bool) -> Option<Handle> {
        let hash = self.hasher.hash32(&key);
        self.core
            .insert_impl(&mut self.pool, &mut self.table, key, hash, pin, false)
            .map(Handle)
    }

    /// [`LruCache::insert`] for keys the caller knows are absent; skips the
    /// lookup. A wrong hint is caught by a debug assertion.
    pub fn insert_absent(&mut self, key: K, pin: bool) -> Option<Handle> {
        let hash = self.hasher.hash32(&key);
        self.core
            .insert_impl(&mut self.pool, &mut self.table, key, hash, pin, true)
            .map(Handle)
    }

    /// Finds `key`, refreshing its LRU position (or pinning it). `None` for
    /// absent keys.
    pub fn lookup(&mut self, key: K, pin: bool) -> Option<Handle> {
        let hash = self.hasher.hash32(&key);
        self.core
            .lookup_impl(&mut self.pool, &self.table, key, hash, pin)
            .map(Handle)
    }

    /// Finds `key` without touching LRU order or pins.
    pub fn peek(&self, key: K) -> Option<Handle> {
        let hash = self.hasher.hash32(&key);
        self.table.lookup(&self.pool, key, hash).map(Handle)
    }

    /// Releases a pin taken by `insert`/`lookup`/`pin`.
    pub fn release(&mut self, h: Handle) {
        self.core.release(&mut self.pool, h.0);
    }

    /// Pins a handle so eviction cannot reclaim it; must be matched by
    /// [`LruCache::release`].
    pub fn pin(&mut self, h: Handle) {
        self.core.ref_node(&mut self.pool, h.0);
    }

    /// Removes an unpinned entry from circulation, lowering capacity.
    /// Returns `false` if the node is pinned. The slot's value is garbage
    /// until [`LruCache::install`] reuses it.
    pub fn erase(&mut self, h: Handle) -> bool {
        self.core.erase(&mut self.pool, &mut self.table, h.0)
    }

    /// Adds an entry outside the normal churn, raising capacity. The caller
    /// must set the value before reading it.
    pub fn install(&mut self, key: K) -> Handle {
        let hash = self.hasher.hash32(&key);
        Handle(self.core.install(&mut self.pool, &mut self.table, key, hash))
    }

    /// Entry key for a live handle.
    #[inline]
    pub fn key(&self, h: Handle) -> K {
        self.pool.node(h.0).key
    }

    /// Entry payload for a live handle.
    #[inline]
    pub fn value(&self, h: Handle) -> &V {
        &self.pool.node(h.0).value
    }

    /// Mutable entry payload for a live handle.
    #[inline]
    pub fn value_mut(&mut self, h: Handle) -> &mut V {
        &mut self.pool.node_mut(h.0).value
    }

    /// Unpinned entries, oldest first.
    pub fn iter_lru(&self) -> impl Iterator<Item = Handle> + '_ {
        self.pool.iter_list(self.core.lru).map(Handle)
    }

    /// Unpinned entries, newest first.
    pub fn iter_mru(&self) -> impl Iterator<Item = Handle> + '_ {
        self.pool.iter_list_rev(self.core.lru).map(Handle)
    }

    /// Pinned entries, in no meaningful order.
    pub fn iter_in_use(&self) -> impl Iterator<Item = Handle> + '_ {
        self.pool.iter_list(self.core.in_use).map(Handle)
    }

    /// Every live entry: the lru list then the in-use list.
    pub fn iter(&self) -> impl Iterator<Item = Handle> + '_ {
        self.iter_lru().chain(self.iter_in_use())
    }

    /// Ghost fast-path; see [`LruCore::refresh`].
    pub(crate) fn refresh_hashed(&mut self, key: K, hash: u32) -> Option<(Handle, Option<Handle>)> {
        self.core
            .refresh(&mut self.pool, &mut self.table, key, hash)
            .map(|(e, s)| (Handle(e), s.map(Handle)))
    }

    /// Table-only lookup with a caller-supplied hash.
    pub(crate) fn peek_hashed(&self, key: K, hash: u32) -> Option<Handle> {
        self.table.lookup(&self.pool, key, hash).map(Handle)
    }

    /// Next node toward the newest end, `None` at the end of the list.
    pub(crate) fn next_newer(&self, h: Handle) -> Option<Handle> {
        let next = self.pool.node(h.0).next;
        if next == self.core.lru {
            None
        } else {
            Some(Handle(next))
        }
    }

    /// Oldest unpinned entry.
    pub(crate) fn oldest(&self) -> Option<Handle> {
        self.pool.list_oldest(self.core.lru).map(Handle)
    }

    /// Verifies the structural invariants: list disjointness, ref-count
    /// discipline, and the table/list bijection. Intended for tests and
    /// debugging; walks every list and bucket.
    pub fn check_invariants(&self) -> Result<(), InvariantError> {
        use rustc_hash::FxHashSet;

        let mut lru_set = FxHashSet::default();
        for id in self.pool.iter_list(self.core.lru) {
            if self.pool.node(id).refs != 1 {
                return Err(InvariantError::new(format!(
                    "lru node {} has refs {}",
                    id.index(),
                    self.pool.node(id).refs
                )));
            }
            if !lru_set.insert(id) {
                return Err(InvariantError::new("cycle in lru list"));
            }
        }

        let mut in_use_set = FxHashSet::default();
        for id in self.pool.iter_list(self.core.in_use) {
            if self.pool.node(id).refs < 2 {
                return Err(InvariantError::new(format!(
                    "in_use node {} has refs {}",
                    id.index(),
                    self.pool.node(id).refs
                )));
            }
            if lru_set.contains(&id) || !in_use_set.insert(id) {
                return Err(InvariantError::new("node on two lists"));
            }
        }

        for id in self
            .pool
            .iter_list(self.core.free)
            .chain(self.pool.iter_list(self.core.erased))
        {
            if lru_set.contains(&id) || in_use_set.contains(&id) {
                return Err(InvariantError::new("free/erased node also live"));
            }
        }

        let table_entries = self.table.collect_entries(&self.pool);
        if table_entries.len() != lru_set.len() + in_use_set.len() {
            return Err(InvariantError::new(format!(
                "table holds {} entries but lists hold {}",
                table_entries.len(),
                lru_set.len() + in_use_set.len()
            )));
        }
        for id in table_entries {
            if !lru_set.contains(&id) && !in_use_set.contains(&id) {
                return Err(InvariantError::new("table entry not on lru/in_use"));
            }
        }

        if self.core.len() != lru_set.len() + in_use_set.len() {
            return Err(InvariantError::new("len counter drifted from lists"));
        }
        Ok(())
    }
}

impl<K, V, H> fmt::Debug for LruCache<K, V, H>
where
    K: Copy + Eq + Default + fmt::Debug,
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let lru: Vec<K> = self
            .pool
            .iter_list(self.core.lru)
            .map(|id| self.pool.node(id).key)
            .collect();
        let in_use: Vec<K> = self
            .pool
            .iter_list(self.core.in_use)
            .map(|id| self.pool.node(id).key)
            .collect();
        f.debug_struct("LruCache")
            .field("capacity", &self.core.capacity())
            .field("lru", &lru)
            .field("in_use", &in_use)
            .finish()
    }
}
