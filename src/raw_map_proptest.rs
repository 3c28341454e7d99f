#![cfg(test)]

// Property tests for RawMap kept inside the crate so the slot layout can be
// inspected directly. A low-bits hasher forces long shared probe chains.

use crate::alloc::Global;
use crate::key_traits::DefaultKeyTraits;
use crate::raw_map::{max_load, RawMap};
use hashbrown::hash_map::DefaultHashBuilder;
use proptest::prelude::*;
use std::collections::HashMap;
use std::hash::{BuildHasher, Hasher};

// Hash is the key modulo 4, independent of table size: at most four homes.
#[derive(Clone, Default)]
struct LowBits;
struct LowBitsHasher(u64);
impl BuildHasher for LowBits {
    type Hasher = LowBitsHasher;
    fn build_hasher(&self) -> LowBitsHasher {
        LowBitsHasher(0)
    }
}
impl Hasher for LowBitsHasher {
    fn write(&mut self, bytes: &[u8]) {
        for &b in bytes {
            self.0 = self.0.wrapping_mul(31).wrapping_add(b as u64);
        }
        self.0 &= 3;
    }
    fn write_u32(&mut self, n: u32) {
        self.0 = (n & 3) as u64;
    }
    fn finish(&self) -> u64 {
        self.0
    }
}

type Map<S> = RawMap<u32, i32, DefaultKeyTraits<S>, Global>;

// Structural checks that must hold between any two operations:
// - empty slots hold the clear key and no value, live slots the reverse;
// - the live slot count equals len, and len stays under the load limit;
// - every live key is reachable from its home without crossing an empty.
fn check_structure<S: BuildHasher>(m: &Map<S>) -> Result<(), TestCaseError> {
    let cap = m.capacity();
    prop_assert!(cap == 0 || cap.is_power_of_two());
    if cap == 0 {
        prop_assert_eq!(m.len(), 0);
        return Ok(());
    }
    prop_assert!(m.len() < max_load(cap), "len {} cap {}", m.len(), cap);
    let slots = m.slots();
    let mut live = 0;
    for (i, slot) in slots.iter().enumerate() {
        let clear = m.is_clear(&slot.key);
        prop_assert_eq!(clear, slot.value.is_none(), "slot {}", i);
        if clear {
            continue;
        }
        live += 1;
        let mut p = m.home_of(&slot.key);
        while p != i {
            prop_assert!(
                !m.is_clear(&slots[p].key),
                "key {} at {} unreachable: empty slot {} on its chain",
                slot.key,
                i,
                p
            );
            p = (p + 1) & m.mask();
        }
    }
    prop_assert_eq!(live, m.len());
    Ok(())
}

fn values_of<S: BuildHasher>(m: &Map<S>, key: u32) -> Vec<i32> {
    let anchor = match m.find_index(&key) {
        Some(i) => i,
        None => return Vec::new(),
    };
    let mut out = Vec::new();
    let mut at = Some(anchor);
    while let Some(i) = at {
        out.push(m.slots()[i].value.unwrap());
        let following = (i + 1) & m.mask();
        at = if following == anchor {
            None
        } else {
            m.next_in_cluster(&key, following, anchor)
        };
    }
    out
}

#[derive(Clone, Debug)]
enum UniqueOp {
    Insert(u32, i32),
    Remove(u32),
    Reserve(usize),
    Snapshot,
    Clear,
}

fn unique_op() -> impl Strategy<Value = UniqueOp> {
    prop_oneof![
        6 => (1u32..24, any::<i32>()).prop_map(|(k, v)| UniqueOp::Insert(k, v)),
        4 => (1u32..24).prop_map(UniqueOp::Remove),
        1 => (0usize..20).prop_map(UniqueOp::Reserve),
        1 => Just(UniqueOp::Snapshot),
        1 => Just(UniqueOp::Clear),
    ]
}

fn run_unique<S: BuildHasher + Clone>(hasher: S, ops: Vec<UniqueOp>) -> Result<(), TestCaseError> {
    let mut sut: Map<S> = RawMap::new(DefaultKeyTraits::with_hasher(hasher), Global);
    let mut model: HashMap<u32, i32> = HashMap::new();
    let mut snapshot: Option<(Map<S>, HashMap<u32, i32>)> = None;

    for op in ops {
        match op {
            UniqueOp::Insert(k, v) => {
                let prev = sut.insert_unique(k, v).unwrap();
                prop_assert_eq!(prev, model.insert(k, v));
            }
            UniqueOp::Remove(k) => {
                if model.contains_key(&k) {
                    prop_assert_eq!(sut.remove_key(&k).unwrap(), model.remove(&k).unwrap());
                } else {
                    prop_assert_eq!(sut.find_index(&k), None);
                }
            }
            UniqueOp::Reserve(n) => {
                sut.reserve(n).unwrap();
                prop_assert!(sut.len() + n < max_load(sut.capacity()));
            }
            UniqueOp::Snapshot => {
                snapshot = Some((sut.clone(), model.clone()));
                prop_assert!(sut.capacity() == 0 || sut.ref_count() >= 2);
            }
            UniqueOp::Clear => {
                sut.clear();
                model.clear();
            }
        }
        check_structure(&sut)?;
        prop_assert_eq!(sut.len(), model.len());
        for (k, v) in &model {
            prop_assert_eq!(sut.get(k), Some(v));
        }
        if let Some((snap, frozen)) = &snapshot {
            check_structure(snap)?;
            prop_assert_eq!(snap.len(), frozen.len());
            for (k, v) in frozen {
                prop_assert_eq!(snap.get(k), Some(v));
            }
        }
    }
    Ok(())
}

#[derive(Clone, Debug)]
enum MultiOp {
    Insert(u32, i32),
    RemoveN(u32, usize),
    Snapshot,
}

fn multi_op() -> impl Strategy<Value = MultiOp> {
    prop_oneof![
        6 => (1u32..12, any::<i32>()).prop_map(|(k, v)| MultiOp::Insert(k, v)),
        3 => (1u32..12, 0usize..4).prop_map(|(k, n)| MultiOp::RemoveN(k, n)),
        1 => Just(MultiOp::Snapshot),
    ]
}

// Model: per key, the values still present in insertion order. Cursor order
// and bounded removal both follow that order.
fn run_multi<S: BuildHasher + Clone>(hasher: S, ops: Vec<MultiOp>) -> Result<(), TestCaseError> {
    let mut sut: Map<S> = RawMap::new(DefaultKeyTraits::with_hasher(hasher), Global);
    let mut model: HashMap<u32, Vec<i32>> = HashMap::new();
    let mut snapshot: Option<(Map<S>, HashMap<u32, Vec<i32>>)> = None;

    for op in ops {
        match op {
            MultiOp::Insert(k, v) => {
                sut.insert_multi(k, v).unwrap();
                model.entry(k).or_default().push(v);
            }
            MultiOp::RemoveN(k, n) => {
                let vals = model.entry(k).or_default();
                let expect = n.min(vals.len());
                prop_assert_eq!(sut.remove_cluster(&k, n).unwrap(), expect);
                vals.drain(..expect);
            }
            MultiOp::Snapshot => snapshot = Some((sut.clone(), model.clone())),
        }
        check_structure(&sut)?;
        let total: usize = model.values().map(Vec::len).sum();
        prop_assert_eq!(sut.len(), total);
        for (k, vals) in &model {
            prop_assert_eq!(&values_of(&sut, *k), vals, "key {}", k);
        }
        if let Some((snap, frozen)) = &snapshot {
            for (k, vals) in frozen {
                prop_assert_eq!(&values_of(snap, *k), vals, "snapshot key {}", k);
            }
        }
    }
    Ok(())
}

proptest! {
    #![proptest_config(ProptestConfig { cases: 128, .. ProptestConfig::default() })]

    #[test]
    fn prop_unique_colliding_hashes(ops in proptest::collection::vec(unique_op(), 1..120)) {
        run_unique(LowBits, ops)?;
    }

    #[test]
    fn prop_unique_default_hasher(ops in proptest::collection::vec(unique_op(), 1..120)) {
        run_unique(DefaultHashBuilder::default(), ops)?;
    }

    #[test]
    fn prop_multi_colliding_hashes(ops in proptest::collection::vec(multi_op(), 1..120)) {
        run_multi(LowBits, ops)?;
    }

    #[test]
    fn prop_multi_default_hasher(ops in proptest::collection::vec(multi_op(), 1..120)) {
        run_multi(DefaultHashBuilder::default(), ops)?;
    }
}
