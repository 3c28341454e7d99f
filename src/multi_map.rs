//! MultiMap: copy-on-write open-addressing map permitting duplicate keys.
//!
//! Entries sharing a key sit on that key's probe chain, in insertion order
//! as seen walking forward from the key's home. Other keys whose chains
//! overlap can be interleaved with them, so a key's cluster is not a
//! maximal run of occupied slots: `equal_range` filters by key, and both
//! the cursor and cluster removal stop on coming back around to the first
//! entry found (the anchor).

use crate::alloc::{Allocator, Global};
use crate::error::MapError;
use crate::iter::{Iter, Keys, Values};
use crate::key_traits::{DefaultKeyTraits, KeyTraits};
use crate::raw_map::RawMap;
use crate::reentrancy::DebugReentrancy;
use core::fmt;
use core::hash::Hash;

/// Hash map that keeps every inserted `(key, value)` pair, duplicates
/// included. Sharing and copy-on-write behave as for `UniqueMap`.
pub struct MultiMap<K, V, T = DefaultKeyTraits, A: Allocator = Global> {
    raw: RawMap<K, V, T, A>,
    reentrancy: DebugReentrancy,
}

impl<K, V> MultiMap<K, V>
where
    K: Eq + Hash + Default,
{
    pub fn new() -> Self {
        Self::with_key_traits_in(DefaultKeyTraits::default(), Global)
    }
}

impl<K, V, A> MultiMap<K, V, DefaultKeyTraits, A>
where
    K: Eq + Hash + Default,
    A: Allocator,
{
    pub fn new_in(alloc: A) -> Self {
        Self::with_key_traits_in(DefaultKeyTraits::default(), alloc)
    }
}

impl<K, V, T> MultiMap<K, V, T>
where
    T: KeyTraits<K>,
{
    pub fn with_key_traits(traits: T) -> Self {
        Self::with_key_traits_in(traits, Global)
    }
}

impl<K, V, T, A> MultiMap<K, V, T, A>
where
    T: KeyTraits<K>,
    A: Allocator,
{
    pub fn with_key_traits_in(traits: T, alloc: A) -> Self {
        Self {
            raw: RawMap::new(traits, alloc),
            reentrancy: DebugReentrancy::new(),
        }
    }

    /// Number of entries, duplicates included.
    pub fn len(&self) -> usize {
        self.raw.len()
    }

    pub fn is_empty(&self) -> bool {
        self.raw.len() == 0
    }

    pub fn capacity(&self) -> usize {
        self.raw.capacity()
    }

    pub fn ref_count(&self) -> usize {
        self.raw.ref_count()
    }

    pub fn key_traits(&self) -> &T {
        self.raw.traits()
    }

    pub fn allocator(&self) -> &A {
        self.raw.allocator()
    }

    pub fn contains(&self, key: &K) -> bool {
        let _g = self.reentrancy.enter("contains");
        self.raw.find_index(key).is_some()
    }

    /// The first value of `key`'s cluster.
    pub fn get(&self, key: &K) -> Option<&V> {
        let _g = self.reentrancy.enter("get");
        self.raw.get(key)
    }

    /// Cursor over every value stored under `key`. Empty if the key is
    /// absent.
    pub fn equal_range(&self, key: &K) -> EqualRange<'_, K, V, T, A> {
        let _g = self.reentrancy.enter("equal_range");
        let anchor = self.raw.find_index(key);
        EqualRange {
            raw: &self.raw,
            reentrancy: &self.reentrancy,
            anchor,
            next: anchor,
        }
    }

    /// Number of values stored under `key`.
    pub fn count(&self, key: &K) -> usize {
        self.equal_range(key).count()
    }

    pub fn iter(&self) -> Iter<'_, K, V> {
        Iter::new(self.raw.slots(), self.raw.len())
    }

    /// Keys in slot order, repeated once per entry.
    pub fn keys(&self) -> Keys<'_, K, V> {
        Keys { inner: self.iter() }
    }

    pub fn values(&self) -> Values<'_, K, V> {
        Values { inner: self.iter() }
    }
}

impl<K, V, T, A> MultiMap<K, V, T, A>
where
    K: Clone,
    V: Clone,
    T: KeyTraits<K>,
    A: Allocator + Clone,
{
    /// Add `(key, value)`; existing entries for `key` are kept.
    pub fn insert(&mut self, key: K, value: V) -> Result<(), MapError> {
        let _g = self.reentrancy.enter("insert");
        self.raw.insert_multi(key, value)
    }

    /// Remove up to `limit` values of `key`, in cursor order. Returns how
    /// many were removed.
    pub fn remove_n(&mut self, key: &K, limit: usize) -> Result<usize, MapError> {
        let _g = self.reentrancy.enter("remove_n");
        Ok(self.raw.remove_cluster(key, limit)?)
    }

    /// Remove every value of `key`. Returns how many were removed.
    pub fn remove_all(&mut self, key: &K) -> Result<usize, MapError> {
        self.remove_n(key, usize::MAX)
    }

    pub fn reserve(&mut self, additional: usize) -> Result<(), MapError> {
        let _g = self.reentrancy.enter("reserve");
        Ok(self.raw.reserve(additional)?)
    }

    pub fn clear(&mut self) {
        let _g = self.reentrancy.enter("clear");
        self.raw.clear()
    }
}

/// Cursor returned by `MultiMap::equal_range`.
///
/// Walks forward from the anchor, wrapping at the end of the table,
/// yielding values whose key equals the anchor's and skipping entries of
/// other keys. Stops at an empty slot or on returning to the anchor.
pub struct EqualRange<'a, K, V, T, A: Allocator> {
    raw: &'a RawMap<K, V, T, A>,
    reentrancy: &'a DebugReentrancy,
    anchor: Option<usize>,
    next: Option<usize>,
}

impl<'a, K, V, T, A: Allocator> EqualRange<'a, K, V, T, A> {
    /// Slot index of the first entry of the cluster; `None` for an absent key.
    pub fn anchor(&self) -> Option<usize> {
        self.anchor
    }
}

impl<'a, K, V, T, A: Allocator> Clone for EqualRange<'a, K, V, T, A> {
    fn clone(&self) -> Self {
        Self {
            raw: self.raw,
            reentrancy: self.reentrancy,
            anchor: self.anchor,
            next: self.next,
        }
    }
}

impl<'a, K, V, T, A> Iterator for EqualRange<'a, K, V, T, A>
where
    T: KeyTraits<K>,
    A: Allocator,
{
    type Item = &'a V;

    fn next(&mut self) -> Option<&'a V> {
        let at = self.next?;
        let anchor = self.anchor?;
        let _g = self.reentrancy.enter("equal_range");
        let raw = self.raw;
        let slots = raw.slots();
        let following = (at + 1) & raw.mask();
        self.next = if following == anchor {
            None
        } else {
            raw.next_in_cluster(&slots[anchor].key, following, anchor)
        };
        slots[at].value.as_ref()
    }
}

impl<K, V, T, A> Clone for MultiMap<K, V, T, A>
where
    T: Clone,
    A: Allocator + Clone,
{
    fn clone(&self) -> Self {
        Self {
            raw: self.raw.clone(),
            reentrancy: DebugReentrancy::new(),
        }
    }
}

impl<K, V, T, A> Default for MultiMap<K, V, T, A>
where
    T: KeyTraits<K> + Default,
    A: Allocator + Default,
{
    fn default() -> Self {
        Self::with_key_traits_in(T::default(), A::default())
    }
}

impl<'a, K, V, T, A> IntoIterator for &'a MultiMap<K, V, T, A>
where
    T: KeyTraits<K>,
    A: Allocator,
{
    type Item = (&'a K, &'a V);
    type IntoIter = Iter<'a, K, V>;

    fn into_iter(self) -> Iter<'a, K, V> {
        self.iter()
    }
}

impl<K, V, T, A> fmt::Debug for MultiMap<K, V, T, A>
where
    K: fmt::Debug,
    V: fmt::Debug,
    T: KeyTraits<K>,
    A: Allocator,
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list().entries(self.iter()).finish()
    }
}
