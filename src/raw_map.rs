//! RawMap: open-addressing core shared by `UniqueMap` and `MultiMap`.
//!
//! Linear probing over a `SharedTable` of slots. An empty slot is one whose
//! key is the clear value of the key capability; its value is `None`. Every
//! live key is reachable from its home index (`hash & (capacity - 1)`)
//! without crossing an empty slot, and deletion keeps it that way by
//! shifting later entries backward instead of leaving tombstones.
//!
//! Callers are responsible for the reentrancy guard; nothing in here
//! enters it.

use crate::alloc::Allocator;
use crate::error::{AllocationError, MapError};
use crate::key_traits::KeyTraits;
use crate::shared_table::SharedTable;
use core::mem;
use log::debug;

/// Smallest capacity allocated on first growth.
pub(crate) const MIN_CAPACITY: usize = 4;

#[derive(Clone, Debug)]
pub(crate) struct Slot<K, V> {
    pub(crate) key: K,
    pub(crate) value: Option<V>,
}

impl<K, V> Slot<K, V> {
    fn empty(clear: K) -> Self {
        Self {
            key: clear,
            value: None,
        }
    }
}

/// `floor(2 * capacity / 3)` without overflow. Inserts keep
/// `len < max_load(capacity)`, so a table always has an empty slot.
#[inline]
pub(crate) fn max_load(capacity: usize) -> usize {
    capacity - capacity / 3 - (capacity % 3 != 0) as usize
}

/// True if `r` lies on the forward path from `j` (exclusive) to `i`
/// (inclusive), wrapping at the end of the table.
///
/// During a backward shift `j` is the gap and `i` the entry under
/// inspection. An entry whose home `r` is in `(j, i]` would become
/// unreachable if moved into the gap, so it stays.
#[inline]
pub(crate) fn in_cyclic_range(j: usize, r: usize, i: usize) -> bool {
    if j <= i {
        j < r && r <= i
    } else {
        j < r || r <= i
    }
}

pub(crate) struct RawMap<K, V, T, A: Allocator> {
    table: SharedTable<Slot<K, V>, A>,
    len: usize,
    traits: T,
}

impl<K, V, T, A> Clone for RawMap<K, V, T, A>
where
    T: Clone,
    A: Allocator + Clone,
{
    fn clone(&self) -> Self {
        Self {
            table: self.table.clone(),
            len: self.len,
            traits: self.traits.clone(),
        }
    }
}

impl<K, V, T, A> RawMap<K, V, T, A>
where
    T: KeyTraits<K>,
    A: Allocator,
{
    pub(crate) fn new(traits: T, alloc: A) -> Self {
        Self {
            table: SharedTable::new_in(alloc),
            len: 0,
            traits,
        }
    }

    #[inline]
    pub(crate) fn len(&self) -> usize {
        self.len
    }

    #[inline]
    pub(crate) fn capacity(&self) -> usize {
        self.table.capacity()
    }

    pub(crate) fn ref_count(&self) -> usize {
        self.table.ref_count()
    }

    pub(crate) fn traits(&self) -> &T {
        &self.traits
    }

    pub(crate) fn allocator(&self) -> &A {
        self.table.allocator()
    }

    #[inline]
    pub(crate) fn slots(&self) -> &[Slot<K, V>] {
        self.table.slots()
    }

    #[inline]
    pub(crate) fn mask(&self) -> usize {
        self.capacity().wrapping_sub(1)
    }

    #[inline]
    pub(crate) fn home_of(&self, key: &K) -> usize {
        (self.traits.hash_of(key) as usize) & self.mask()
    }

    #[inline]
    pub(crate) fn is_clear(&self, key: &K) -> bool {
        self.traits.is_clear(key)
    }

    /// Index of the first slot holding `key`, scanning from its home.
    pub(crate) fn find_index(&self, key: &K) -> Option<usize> {
        if self.capacity() == 0 || self.len == 0 {
            return None;
        }
        let slots = self.slots();
        let mask = self.mask();
        let start = self.home_of(key);
        let mut i = start;
        loop {
            let slot = &slots[i];
            if self.traits.is_clear(&slot.key) {
                return None;
            }
            if self.traits.equals(&slot.key, key) {
                return Some(i);
            }
            i = (i + 1) & mask;
            if i == start {
                return None;
            }
        }
    }

    /// First slot from `key`'s home that is empty or holds `key`.
    pub(crate) fn find_insert_index(&self, key: &K) -> usize {
        self.probe_until(key, |slot_key| self.traits.equals(slot_key, key))
    }

    /// First empty slot from `key`'s home; equal keys do not stop the scan.
    pub(crate) fn find_empty_index(&self, key: &K) -> usize {
        self.probe_until(key, |_| false)
    }

    fn probe_until<F>(&self, key: &K, mut stop: F) -> usize
    where
        F: FnMut(&K) -> bool,
    {
        let slots = self.slots();
        let mask = self.mask();
        let start = self.home_of(key);
        let mut i = start;
        loop {
            let slot_key = &slots[i].key;
            if self.traits.is_clear(slot_key) || stop(slot_key) {
                return i;
            }
            i = (i + 1) & mask;
            assert!(i != start, "probe cycle exhausted: table has no empty slot");
        }
    }

    /// Next slot at or after `from` holding `key`, stopping at an empty
    /// slot or on coming back around to `anchor`.
    pub(crate) fn next_in_cluster(&self, key: &K, from: usize, anchor: usize) -> Option<usize> {
        let slots = self.slots();
        let mask = self.mask();
        let mut i = from;
        loop {
            let slot_key = &slots[i].key;
            if self.traits.is_clear(slot_key) {
                return None;
            }
            if self.traits.equals(slot_key, key) {
                return Some(i);
            }
            i = (i + 1) & mask;
            if i == anchor {
                return None;
            }
        }
    }

    pub(crate) fn get(&self, key: &K) -> Option<&V> {
        self.find_index(key)
            .and_then(|i| self.slots()[i].value.as_ref())
    }
}

impl<K, V, T, A> RawMap<K, V, T, A>
where
    K: Clone,
    V: Clone,
    T: KeyTraits<K>,
    A: Allocator + Clone,
{
    /// Make room for `amount` more entries: a uniqueness copy when the
    /// current capacity suffices, a resize otherwise.
    pub(crate) fn ensure_room(&mut self, amount: usize) -> Result<(), AllocationError> {
        let capacity = self.capacity();
        let overflow = || AllocationError::new(usize::MAX, mem::align_of::<Slot<K, V>>());
        let needed = self.len.checked_add(amount).ok_or_else(overflow)?;
        if needed < max_load(capacity) {
            self.table.make_unique()?;
            return Ok(());
        }
        let mut new_capacity = capacity.max(MIN_CAPACITY);
        while max_load(new_capacity) <= needed {
            new_capacity = new_capacity.checked_mul(2).ok_or_else(overflow)?;
        }
        self.resize(new_capacity)
    }

    /// Rehash every live entry into a fresh table of `new_capacity` slots.
    ///
    /// The old table is walked from just after one of its empty slots, so
    /// no probe chain is split at the wrap-around point and entries sharing
    /// a chain keep their relative order. A uniquely owned old buffer is
    /// drained and released without tearing slots down again; a shared one
    /// is cloned from and then let go.
    fn resize(&mut self, new_capacity: usize) -> Result<(), AllocationError> {
        let traits = &self.traits;
        let fresh = self
            .table
            .create_new_with(new_capacity, |_| Slot::empty(traits.clear_value()))?;
        let old = mem::replace(&mut self.table, fresh);
        debug!(
            "resize: {} -> {} slots, {} live entries",
            old.capacity(),
            new_capacity,
            self.len
        );
        if old.capacity() == 0 {
            return Ok(());
        }

        let start = old
            .slots()
            .iter()
            .position(|s| self.traits.is_clear(&s.key))
            .map_or(0, |e| e + 1);
        let traits = &self.traits;
        let slots = self.table.make_unique()?;
        match old.into_slots(start) {
            Ok(drain) => {
                for slot in drain {
                    if !traits.is_clear(&slot.key) {
                        place(slots, traits, slot);
                    }
                }
            }
            Err(shared) => {
                let mask = shared.capacity() - 1;
                let src = shared.slots();
                for k in 0..src.len() {
                    let slot = &src[(start + k) & mask];
                    if !traits.is_clear(&slot.key) {
                        place(slots, traits, slot.clone());
                    }
                }
            }
        }
        Ok(())
    }

    pub(crate) fn reserve(&mut self, additional: usize) -> Result<(), AllocationError> {
        self.ensure_room(additional)
    }

    /// Insert or overwrite. Returns the previous value for `key`.
    pub(crate) fn insert_unique(&mut self, key: K, value: V) -> Result<Option<V>, MapError> {
        if self.traits.is_clear(&key) {
            return Err(MapError::InvalidKey);
        }
        self.ensure_room(1)?;
        let i = self.find_insert_index(&key);
        let slots = self.table.make_unique()?;
        let slot = &mut slots[i];
        if self.traits.is_clear(&slot.key) {
            self.len += 1;
        }
        slot.key = key;
        Ok(slot.value.replace(value))
    }

    /// Insert alongside any existing entries for `key`.
    pub(crate) fn insert_multi(&mut self, key: K, value: V) -> Result<(), MapError> {
        if self.traits.is_clear(&key) {
            return Err(MapError::InvalidKey);
        }
        self.ensure_room(1)?;
        let i = self.find_empty_index(&key);
        let slots = self.table.make_unique()?;
        slots[i] = Slot {
            key,
            value: Some(value),
        };
        self.len += 1;
        Ok(())
    }

    pub(crate) fn get_mut(&mut self, key: &K) -> Result<Option<&mut V>, AllocationError> {
        let i = match self.find_index(key) {
            Some(i) => i,
            None => return Ok(None),
        };
        let slots = self.table.make_unique()?;
        Ok(slots[i].value.as_mut())
    }

    pub(crate) fn get_or_insert_with<F>(&mut self, key: K, default: F) -> Result<&mut V, MapError>
    where
        F: FnOnce() -> V,
    {
        if self.traits.is_clear(&key) {
            return Err(MapError::InvalidKey);
        }
        if let Some(i) = self.find_index(&key) {
            let slots = self.table.make_unique()?;
            return Ok(occupied_value_mut(&mut slots[i]));
        }
        self.ensure_room(1)?;
        let i = self.find_empty_index(&key);
        // Run user code before the slot is touched, so an unwind leaves it empty.
        let value = default();
        let slots = self.table.make_unique()?;
        slots[i] = Slot {
            key,
            value: Some(value),
        };
        self.len += 1;
        Ok(occupied_value_mut(&mut slots[i]))
    }

    /// Mutable view of every slot, for iteration.
    pub(crate) fn slots_mut(&mut self) -> Result<&mut [Slot<K, V>], AllocationError> {
        self.table.make_unique()
    }

    /// Remove `key`, which must be present.
    pub(crate) fn remove_key(&mut self, key: &K) -> Result<V, AllocationError> {
        let i = match self.find_index(key) {
            Some(i) => i,
            None => panic!("remove of a key that is not in the map"),
        };
        let slot = self.remove_at(i)?;
        Ok(match slot.value {
            Some(v) => v,
            None => unreachable!("occupied slot without a value"),
        })
    }

    /// Remove up to `limit` entries equal to `key`, starting at the first
    /// one found from its home (the anchor).
    ///
    /// After each removal the search for the next entry resumes at the
    /// deletion point, which may now hold a shifted entry. The search never
    /// wraps back onto the anchor: entries found that way belong to an
    /// earlier, overlapping chain and are not part of this cluster.
    pub(crate) fn remove_cluster(&mut self, key: &K, limit: usize) -> Result<usize, AllocationError> {
        let anchor = match self.find_index(key) {
            Some(i) => i,
            None => return Ok(0),
        };
        let mut removed = 0;
        let mut at = anchor;
        while removed < limit {
            drop(self.remove_at(at)?);
            removed += 1;
            match self.next_in_cluster(key, at, anchor) {
                Some(next) => at = next,
                None => break,
            }
        }
        Ok(removed)
    }

    /// Take slot `index` out and close the gap with a backward shift.
    fn remove_at(&mut self, index: usize) -> Result<Slot<K, V>, AllocationError> {
        let traits = &self.traits;
        let slots = self.table.make_unique()?;
        let taken = mem::replace(&mut slots[index], Slot::empty(traits.clear_value()));
        debug_assert!(taken.value.is_some(), "removing an empty slot");
        self.len -= 1;
        backward_shift(slots, traits, index);
        Ok(taken)
    }

    /// Empty every slot. A shared handle detaches from the buffer instead
    /// of copying it, leaving the map unallocated.
    pub(crate) fn clear(&mut self) {
        self.len = 0;
        let traits = &self.traits;
        match self.table.slots_mut() {
            Some(slots) => {
                for slot in slots.iter_mut() {
                    if slot.value.is_some() {
                        *slot = Slot::empty(traits.clear_value());
                    }
                }
            }
            None => {
                let alloc = self.table.allocator().clone();
                self.table = SharedTable::new_in(alloc);
            }
        }
    }
}

fn occupied_value_mut<K, V>(slot: &mut Slot<K, V>) -> &mut V {
    match slot.value.as_mut() {
        Some(v) => v,
        None => unreachable!("occupied slot without a value"),
    }
}

/// Put `slot` in the first empty position from its home. Used by rehash,
/// where the destination has no entries equal to the incoming one that
/// matter for placement.
fn place<K, V, T: KeyTraits<K>>(slots: &mut [Slot<K, V>], traits: &T, slot: Slot<K, V>) {
    let mask = slots.len() - 1;
    let start = (traits.hash_of(&slot.key) as usize) & mask;
    let mut i = start;
    while !traits.is_clear(&slots[i].key) {
        i = (i + 1) & mask;
        assert!(i != start, "probe cycle exhausted: table has no empty slot");
    }
    slots[i] = slot;
}

/// Close the gap at `gap` (already empty) by moving later entries of the
/// run backward, stopping at the first empty slot.
fn backward_shift<K, V, T: KeyTraits<K>>(slots: &mut [Slot<K, V>], traits: &T, gap: usize) {
    let mask = slots.len() - 1;
    let mut j = gap;
    let mut i = gap;
    loop {
        i = (i + 1) & mask;
        if traits.is_clear(&slots[i].key) {
            return;
        }
        let r = (traits.hash_of(&slots[i].key) as usize) & mask;
        if !in_cyclic_range(j, r, i) {
            slots.swap(i, j);
            j = i;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::alloc::Global;
    use std::hash::{BuildHasher, Hasher};

    #[test]
    fn max_load_is_two_thirds_floor() {
        for c in [0usize, 1, 2, 3, 4, 8, 16, 1024] {
            assert_eq!(max_load(c), 2 * c / 3, "capacity {}", c);
        }
        let big = 1usize << (usize::BITS - 1);
        assert_eq!(max_load(big) as u128, 2 * big as u128 / 3);
    }

    /// Brute force: walk forward from j (exclusive) to i (inclusive).
    fn walk_contains(cap: usize, j: usize, r: usize, i: usize) -> bool {
        let mut p = j;
        loop {
            p = (p + 1) % cap;
            if p == r {
                return true;
            }
            if p == i {
                return false;
            }
        }
    }

    #[test]
    fn cyclic_range_matches_forward_walk() {
        for cap in [1usize, 2, 4, 8, 16] {
            for j in 0..cap {
                for i in 0..cap {
                    if i == j {
                        continue;
                    }
                    for r in 0..cap {
                        assert_eq!(
                            in_cyclic_range(j, r, i),
                            walk_contains(cap, j, r, i),
                            "cap={} j={} r={} i={}",
                            cap,
                            j,
                            r,
                            i
                        );
                    }
                }
            }
        }
    }

    #[test]
    fn cyclic_range_excludes_gap_includes_current() {
        assert!(!in_cyclic_range(3, 3, 5));
        assert!(in_cyclic_range(3, 5, 5));
        assert!(in_cyclic_range(6, 0, 1));
        assert!(!in_cyclic_range(6, 2, 1));
    }

    /// Hashes a u32 key to itself so home slots are predictable.
    #[derive(Clone, Default)]
    struct Identity;
    struct IdentityHasher(u64);
    impl BuildHasher for Identity {
        type Hasher = IdentityHasher;
        fn build_hasher(&self) -> IdentityHasher {
            IdentityHasher(0)
        }
    }
    impl Hasher for IdentityHasher {
        fn write(&mut self, bytes: &[u8]) {
            for &b in bytes {
                self.0 = (self.0 << 8) | b as u64;
            }
        }
        fn write_u32(&mut self, n: u32) {
            self.0 = n as u64;
        }
        fn finish(&self) -> u64 {
            self.0
        }
    }

    type Map = RawMap<u32, &'static str, crate::key_traits::DefaultKeyTraits<Identity>, Global>;

    fn map() -> Map {
        RawMap::new(crate::key_traits::DefaultKeyTraits::with_hasher(Identity), Global)
    }

    fn keys(m: &Map) -> Vec<u32> {
        m.slots().iter().map(|s| s.key).collect()
    }

    #[test]
    fn first_growth_allocates_minimum_then_doubles() {
        let mut m = map();
        m.insert_unique(1, "a").unwrap();
        assert_eq!(m.capacity(), 4);
        m.insert_unique(2, "b").unwrap();
        assert_eq!(m.capacity(), 8);
        m.insert_unique(3, "c").unwrap();
        m.insert_unique(4, "d").unwrap();
        assert_eq!(m.capacity(), 8);
        m.insert_unique(5, "e").unwrap();
        assert_eq!(m.capacity(), 16);
        assert!(m.len() <= max_load(m.capacity()));
    }

    #[test]
    fn backward_shift_pulls_displaced_entries_home() {
        let mut m = map();
        m.reserve(5).unwrap();
        assert_eq!(m.capacity(), 16);
        // 1, 17 and 33 share home 1; 2 lands behind them at 4.
        for k in [1, 17, 33, 2] {
            m.insert_unique(k, "v").unwrap();
        }
        assert_eq!(&keys(&m)[..6], &[0, 1, 17, 33, 2, 0]);
        m.remove_key(&1).unwrap();
        assert_eq!(&keys(&m)[..6], &[0, 17, 33, 2, 0, 0]);
        m.remove_key(&33).unwrap();
        assert_eq!(&keys(&m)[..6], &[0, 17, 2, 0, 0, 0]);
    }

    #[test]
    fn backward_shift_leaves_entries_already_at_home() {
        let mut m = map();
        m.reserve(5).unwrap();
        // 3 sits at its home right behind 1's chain and must not move.
        for k in [1, 17, 3] {
            m.insert_unique(k, "v").unwrap();
        }
        assert_eq!(&keys(&m)[..5], &[0, 1, 17, 3, 0]);
        m.remove_key(&17).unwrap();
        assert_eq!(&keys(&m)[..5], &[0, 1, 0, 3, 0]);
    }

    #[test]
    fn backward_shift_wraps_around_the_end() {
        let mut m = map();
        m.reserve(5).unwrap();
        for k in [15, 31, 47] {
            m.insert_unique(k, "v").unwrap();
        }
        assert_eq!(keys(&m)[15], 15);
        assert_eq!(&keys(&m)[..2], &[31, 47]);
        m.remove_key(&15).unwrap();
        assert_eq!(keys(&m)[15], 31);
        assert_eq!(&keys(&m)[..2], &[47, 0]);
    }

    #[test]
    fn cluster_removal_stops_at_anchor_and_empty() {
        let mut m = map();
        m.reserve(6).unwrap();
        for (k, v) in [(1, "a"), (17, "x"), (1, "b"), (1, "c")] {
            m.insert_multi(k, v).unwrap();
        }
        assert_eq!(&keys(&m)[..5], &[0, 1, 17, 1, 1]);
        assert_eq!(m.remove_cluster(&1, 2).unwrap(), 2);
        let left: Vec<_> = m
            .slots()
            .iter()
            .filter(|s| s.key == 1)
            .map(|s| s.value.unwrap())
            .collect();
        assert_eq!(left, ["c"]);
        assert_eq!(m.len(), 2);
        assert_eq!(m.remove_cluster(&1, usize::MAX).unwrap(), 1);
        assert_eq!(m.find_index(&1), None);
        assert_eq!(m.get(&17), Some(&"x"));
    }

    #[test]
    fn rehash_keeps_chain_order_across_wrap() {
        let mut m = map();
        m.reserve(3).unwrap();
        assert_eq!(m.capacity(), 8);
        // Home 7 wraps: first entry at 7, second at 0.
        m.insert_multi(7, "first").unwrap();
        m.insert_multi(7, "second").unwrap();
        assert_eq!(keys(&m), [7, 0, 0, 0, 0, 0, 0, 7]);
        m.reserve(10).unwrap();
        assert_eq!(m.capacity(), 32);
        let order: Vec<_> = m
            .slots()
            .iter()
            .filter(|s| s.key == 7)
            .map(|s| s.value.unwrap())
            .collect();
        assert_eq!(order, ["first", "second"]);
    }

    #[test]
    fn clear_on_shared_detaches() {
        let mut m = map();
        m.insert_unique(1, "a").unwrap();
        let other = m.clone();
        assert_eq!(m.ref_count(), 2);
        m.clear();
        assert_eq!(m.len(), 0);
        assert_eq!(m.capacity(), 0);
        assert_eq!(other.ref_count(), 1);
        assert_eq!(other.get(&1), Some(&"a"));
    }

    #[test]
    #[should_panic(expected = "not in the map")]
    fn remove_missing_key_panics() {
        let mut m = map();
        m.insert_unique(1, "a").unwrap();
        let _ = m.remove_key(&2);
    }
}
