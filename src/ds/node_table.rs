//! Open-chained hash index over pool nodes.
//!
//! A fixed array of `next_power_of_two(capacity)` buckets, each the head of
//! a singly linked chain threaded through `Node.next_hash`. The table never
//! owns nodes and never rehashes: it is sized once to the cache capacity so
//! chains stay short for the life of the cache.
//!
//! ```text
//!   buckets[hash & mask] ──► NodeId ──next_hash──► NodeId ──► (nil)
//! ```

use crate::ds::node_pool::{NodeId, NodePool};

/// Hash index mapping `(key, hash)` to a [`NodeId`].
#[derive(Debug)]
pub struct NodeTable {
    buckets: Vec<NodeId>,
    mask: u32,
}

impl NodeTable {
    /// Creates a table with `capacity.next_power_of_two()` empty buckets.
    pub fn new(capacity: usize) -> Self {
        let len = capacity.next_power_of_two().max(1);
        assert!(len <= u32::MAX as usize);
        NodeTable {
            buckets: vec![NodeId::NIL; len],
            mask: (len - 1) as u32,
        }
    }

    /// Number of buckets.
    #[inline]
    pub fn bucket_count(&self) -> usize {
        self.buckets.len()
    }

    #[inline]
    fn bucket(&self, hash: u32) -> usize {
        (hash & self.mask) as usize
    }

    /// Prepends `id` to its bucket. The caller guarantees `(key, hash)` is
    /// absent; double insertion is caught by a debug assertion.
    pub fn insert<K: Copy + Eq, V>(&mut self, pool: &mut NodePool<K, V>, id: NodeId) {
        let (key, hash) = {
            let n = pool.node(id);
            (n.key, n.hash)
        };
        debug_assert!(
            self.lookup(pool, key, hash).is_none(),
            "key already present in node table"
        );
        let slot = self.bucket(hash);
        pool.node_mut(id).next_hash = self.buckets[slot];
        self.buckets[slot] = id;
    }

    /// Returns the node matching `(key, hash)`, if present.
    pub fn lookup<K: Copy + Eq, V>(
        &self,
        pool: &NodePool<K, V>,
        key: K,
        hash: u32,
    ) -> Option<NodeId> {
        let mut cur = self.buckets[self.bucket(hash)];
        while !cur.is_nil() {
            let n = pool.node(cur);
            if n.hash == hash && n.key == key {
                return Some(cur);
            }
            cur = n.next_hash;
        }
        None
    }

    /// Unlinks and returns the node matching `(key, hash)`, if present.
    pub fn remove<K: Copy + Eq, V>(
        &mut self,
        pool: &mut NodePool<K, V>,
        key: K,
        hash: u32,
    ) -> Option<NodeId> {
        let slot = self.bucket(hash);
        let mut prev = NodeId::NIL;
        let mut cur = self.buckets[slot];
        while !cur.is_nil() {
            let n = pool.node(cur);
            if n.hash == hash && n.key == key {
                let next = n.next_hash;
                if prev.is_nil() {
                    self.buckets[slot] = next;
                } else {
                    pool.node_mut(prev).next_hash = next;
                }
                return Some(cur);
            }
            prev = cur;
            cur = n.next_hash;
        }
        None
    }

    /// Collects every chained node; test/debug support for the bijection
    /// invariant.
    pub(crate) fn collect_entries<K, V>(&self, pool: &NodePool<K, V>) -> Vec<NodeId> {
        let mut out = Vec::new();
        for &head in &self.buckets {
            let mut cur = head;
            while !cur.is_nil() {
                out.push(cur);
                cur = pool.node(cur).next_hash;
                assert!(out.len() <= pool.total_slots(), "cycle in bucket chain");
            }
        }
        out
    }
}
