// Multi-tenant behavior: routing, cross-tenant hits, relocate, and the
// erase/install slot-exchange protocol.

use ghostkit::policy::shared::SharedCache;

const T1: u32 = 537;
const T2: u32 = 564;

fn lru_keys(cache: &SharedCache<u32, u32, u32>, tag: u32) -> Vec<u32> {
    cache.iter_lru(tag).map(|h| cache.key(h)).collect()
}

#[test]
fn shared_workload_walk() {
    let mut cache: SharedCache<u32, u32, u32> = SharedCache::new(&[(T1, 3), (T2, 2)]);

    let h = cache.insert(T1, 1, true).unwrap();
    *cache.value_mut(h) = 111;
    cache.release(h);
    cache.insert(T2, 2, false).unwrap();
    cache.insert(T1, 3, false).unwrap();
    assert_eq!(lru_keys(&cache, T1), vec![1, 3]);
    assert_eq!(lru_keys(&cache, T2), vec![2]);

    cache.insert(T2, 4, false).unwrap();
    cache.insert(T1, 5, false).unwrap();
    assert_eq!(lru_keys(&cache, T1), vec![1, 3, 5]);
    assert_eq!(lru_keys(&cache, T2), vec![2, 4]);

    // Both tenants full: each insert evicts locally.
    cache.insert(T2, 6, false).unwrap();
    cache.insert(T1, 2, false).unwrap();
    assert_eq!(lru_keys(&cache, T1), vec![3, 5, 2]);
    assert_eq!(lru_keys(&cache, T2), vec![4, 6]);
    cache.check_invariants().unwrap();

    // Key 2 now lives under T1; inserting it under T2 returns the existing
    // node and leaves both lists as they were (2 is already T1's newest).
    let h2 = cache.insert(T2, 2, false).unwrap();
    assert_eq!(cache.tag_of(h2), T1);
    assert_eq!(lru_keys(&cache, T1), vec![3, 5, 2]);
    assert_eq!(lru_keys(&cache, T2), vec![4, 6]);

    // Rebalance two slots from T1 to T2; T1 evicts down to one entry.
    let moved = cache.relocate(T1, T2, 2);
    assert_eq!(moved, 2);
    assert_eq!(lru_keys(&cache, T1), vec![2]);
    assert_eq!(lru_keys(&cache, T2), vec![4, 6]);
    assert_eq!(cache.capacity_of(T1), 1);
    assert_eq!(cache.capacity_of(T2), 4);
    cache.check_invariants().unwrap();

    // T2 grows into its new capacity.
    cache.insert(T2, 7, false).unwrap();
    cache.insert(T2, 8, false).unwrap();
    assert_eq!(lru_keys(&cache, T2), vec![4, 6, 7, 8]);

    let h9 = cache.insert(T2, 9, false).unwrap();
    assert_eq!(lru_keys(&cache, T2), vec![6, 7, 8, 9]);

    // Erase hands the slot out of circulation; installs bring slots in,
    // per tenant.
    assert!(cache.erase(h9));
    assert_eq!(lru_keys(&cache, T2), vec![6, 7, 8]);
    assert_eq!(cache.capacity_of(T2), 3);

    cache.install(T1, 10);
    cache.install(T1, 11);
    cache.install(T2, 12);
    assert_eq!(lru_keys(&cache, T1), vec![2, 10, 11]);
    assert_eq!(lru_keys(&cache, T2), vec![6, 7, 8, 12]);
    assert_eq!(cache.capacity_of(T1), 3);
    assert_eq!(cache.capacity_of(T2), 4);
    cache.check_invariants().unwrap();
}

#[test]
fn cross_tenant_access_refreshes_owner_lru() {
    // A tag-free lookup (or an insert under the wrong tag) refreshes the
    // owning tenant's list. Kept deliberately: all tenants share one
    // index, so the owner's recency is the only recency there is.
    let mut cache: SharedCache<u32, u32, u32> = SharedCache::new(&[(T1, 3), (T2, 2)]);
    for k in [1, 3, 5] {
        cache.insert(T1, k, false).unwrap();
    }
    assert_eq!(lru_keys(&cache, T1), vec![1, 3, 5]);

    // T2 touches T1's oldest key; T1's order changes.
    let h = cache.insert(T2, 1, false).unwrap();
    assert_eq!(cache.tag_of(h), T1);
    assert_eq!(lru_keys(&cache, T1), vec![3, 5, 1]);
    assert_eq!(cache.size_of(T2), 0);

    let h = cache.lookup(3, false).unwrap();
    assert_eq!(cache.tag_of(h), T1);
    assert_eq!(lru_keys(&cache, T1), vec![5, 1, 3]);
    cache.check_invariants().unwrap();
}

#[test]
fn relocate_conserves_capacity_even_when_cut_short() {
    let mut cache: SharedCache<u32, u32, u32> = SharedCache::new(&[(T1, 3), (T2, 2)]);
    let pinned = cache.insert(T1, 1, true).unwrap();
    cache.insert(T1, 2, false).unwrap();

    let before = cache.capacity_of(T1) + cache.capacity_of(T2);
    // Only two slots can leave T1: one free, one evictable; the pinned
    // slot stays.
    let moved = cache.relocate(T1, T2, 3);
    assert_eq!(moved, 2);
    assert_eq!(cache.capacity_of(T1), 1);
    assert_eq!(cache.capacity_of(T2), 4);
    assert_eq!(cache.capacity_of(T1) + cache.capacity_of(T2), before);
    // The evictable entry is gone, the pinned one survived.
    assert!(cache.lookup(2, false).is_none());
    assert!(cache.lookup(1, false).is_some());
    cache.release(pinned);
    cache.check_invariants().unwrap();
}

#[test]
fn pinned_entries_block_tenant_eviction() {
    let mut cache: SharedCache<u32, u32, u32> = SharedCache::new(&[(T1, 2), (T2, 2)]);
    let ha = cache.insert(T2, 20, true).unwrap();
    let hb = cache.insert(T2, 21, true).unwrap();
    // T2 exhausted and fully pinned; T1 is unaffected.
    assert!(cache.insert(T2, 22, false).is_none());
    assert!(cache.insert(T1, 10, false).is_some());
    cache.release(ha);
    assert!(cache.insert(T2, 22, false).is_some());
    assert!(cache.lookup(20, false).is_none());
    cache.release(hb);
    cache.check_invariants().unwrap();
}
