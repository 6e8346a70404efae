//! Property-based invariant tests for termtile-core.
//!
//! These verify structural invariants that must hold for **any** input:
//!
//! 1. The LRU table never exceeds its capacity and never hands out the same
//!    entry index to two simultaneously-live entries.
//! 2. Ring rotation composes (`rotate(k)` then `rotate(-k)` is the identity)
//!    and iteration always visits every physical slot exactly once.
//! 3. Scrollback never panics and never exceeds its capacity for arbitrary
//!    operation sequences.

use std::collections::HashMap;

use proptest::prelude::*;
use termtile_core::{Ring, Scrollback, StrongHash, StrongLruTable};

// ── Helpers ─────────────────────────────────────────────────────────────

#[derive(Debug, Clone)]
enum TableOp {
    GetOrEmplace(u32),
    TryGet(u32),
    Touch(u32),
    Remove(u32),
    Decline(u32),
    Clear,
}

fn table_ops() -> impl Strategy<Value = Vec<TableOp>> {
    let op = prop_oneof![
        4 => (0u32..32).prop_map(TableOp::GetOrEmplace),
        2 => (0u32..32).prop_map(TableOp::TryGet),
        1 => (0u32..32).prop_map(TableOp::Touch),
        1 => (0u32..32).prop_map(TableOp::Remove),
        1 => (0u32..32).prop_map(TableOp::Decline),
        1 => Just(TableOp::Clear),
    ];
    proptest::collection::vec(op, 0..200)
}

fn h(v: u32) -> StrongHash {
    StrongHash::from_parts(0, 0, 0, v)
}

proptest! {
    #[test]
    fn lru_live_count_and_indices_stay_bounded(
        ops in table_ops(),
        capacity in 1usize..9,
    ) {
        let mut table: StrongLruTable<u32> = StrongLruTable::new(capacity, capacity, "prop");
        // hash word -> entry index, mirrored from constructor callbacks.
        let mut live: HashMap<u32, u32> = HashMap::new();

        for op in ops {
            match op {
                TableOp::GetOrEmplace(v) => {
                    let index = *table.get_or_emplace(h(v), |i| i);
                    live.retain(|_, &mut i| i != index);
                    live.insert(v, index);
                }
                TableOp::TryGet(v) => {
                    let hit = table.try_get(h(v)).copied();
                    prop_assert_eq!(hit, live.get(&v).copied());
                }
                TableOp::Touch(v) => table.touch(h(v)),
                TableOp::Remove(v) => {
                    table.remove(h(v));
                    live.remove(&v);
                }
                TableOp::Decline(v) => {
                    if !table.contains(h(v)) {
                        let before = table.len();
                        let order_before: Vec<_> = table.hashes().collect();
                        prop_assert!(table.get_or_try_emplace(h(v), |_| None::<u32>).is_none());
                        prop_assert!(!table.contains(h(v)));
                        // A decline is a perfect no-op at any fill level.
                        prop_assert_eq!(table.len(), before);
                        let order_after: Vec<_> = table.hashes().collect();
                        prop_assert_eq!(order_after, order_before);
                    }
                }
                TableOp::Clear => {
                    table.clear();
                    live.clear();
                }
            }

            // The shadow map may still hold hashes the table has evicted.
            live.retain(|&v, _| table.contains(h(v)));

            prop_assert!(table.len() <= capacity);
            prop_assert_eq!(table.len(), table.hashes().count());

            // Live entry indices are pairwise distinct and in range.
            let mut indices: Vec<u32> = live.values().copied().collect();
            indices.sort_unstable();
            indices.dedup();
            prop_assert_eq!(indices.len(), live.len());
            for &i in &indices {
                prop_assert!((i as usize) < capacity);
            }
        }
    }

    #[test]
    fn lru_eviction_is_least_recently_used(
        seed in proptest::collection::vec(0u32..16, 1..40),
    ) {
        let capacity = 4usize;
        let mut table: StrongLruTable<()> = StrongLruTable::new(capacity, capacity, "prop");
        // Shadow model: vec of hash words, MRU first.
        let mut model: Vec<u32> = Vec::new();

        for v in seed {
            if let Some(pos) = model.iter().position(|&m| m == v) {
                model.remove(pos);
            } else if model.len() == capacity {
                model.pop();
            }
            model.insert(0, v);
            table.get_or_emplace(h(v), |_| ());
        }

        let order: Vec<StrongHash> = table.hashes().collect();
        let expected: Vec<StrongHash> = model.iter().map(|&v| h(v)).collect();
        prop_assert_eq!(order, expected);
    }

    #[test]
    fn ring_rotation_composes_to_identity(
        items in proptest::collection::vec(any::<u16>(), 1..32),
        k in -100isize..100,
    ) {
        let original = items.clone();
        let mut ring = Ring::from_storage(items);
        ring.rotate(k);
        ring.rotate(-k);
        let logical: Vec<u16> = ring.iter().copied().collect();
        prop_assert_eq!(logical, original);
    }

    #[test]
    fn ring_iteration_is_a_permutation_of_storage(
        items in proptest::collection::vec(any::<u16>(), 1..32),
        k in -100isize..100,
    ) {
        let mut sorted = items.clone();
        sorted.sort_unstable();
        let mut ring = Ring::from_storage(items);
        ring.rotate(k);
        let mut seen: Vec<u16> = ring.iter().copied().collect();
        seen.sort_unstable();
        prop_assert_eq!(seen, sorted);
    }

    #[test]
    fn ring_rezero_preserves_logical_order(
        items in proptest::collection::vec(any::<u16>(), 1..32),
        k in -100isize..100,
    ) {
        let mut ring = Ring::from_storage(items);
        ring.rotate(k);
        let before: Vec<u16> = ring.iter().copied().collect();
        ring.rezero();
        prop_assert_eq!(ring.zero_index(), 0);
        let after: Vec<u16> = ring.iter().copied().collect();
        prop_assert_eq!(&after, &before);
        prop_assert_eq!(ring.storage(), after.as_slice());
    }

    #[test]
    fn ring_logical_index_maps_to_expected_physical_slot(
        len in 1usize..32,
        k in -100isize..100,
    ) {
        // Storage slot s holds the value s, so ring[i] tells us which
        // physical slot logical index i resolved to.
        let mut ring = Ring::from_storage((0..len).collect::<Vec<usize>>());
        ring.rotate(k);
        let zero = ring.zero_index();
        for i in 0..len {
            prop_assert_eq!(ring[i], (zero + i) % len);
        }
    }

    #[test]
    fn scrollback_never_exceeds_capacity(
        capacity in 0usize..8,
        pushes in proptest::collection::vec(any::<u8>(), 0..64),
    ) {
        let mut sb = Scrollback::new(capacity);
        let total = pushes.len();
        for (n, line) in pushes.into_iter().enumerate() {
            let evicted = sb.push(line);
            prop_assert!(sb.len() <= capacity);
            // Eviction starts exactly when the buffer is full.
            prop_assert_eq!(evicted.is_some(), capacity > 0 && n >= capacity);
        }
        if capacity > 0 {
            prop_assert_eq!(sb.len(), total.min(capacity));
        }
    }
}
