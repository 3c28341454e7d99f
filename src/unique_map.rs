//! UniqueMap: copy-on-write open-addressing map with unique keys.

use crate::alloc::{Allocator, Global};
use crate::error::MapError;
use crate::iter::{Iter, IterMut, Keys, Values, ValuesMut};
use crate::key_traits::{DefaultKeyTraits, KeyTraits};
use crate::raw_map::RawMap;
use crate::reentrancy::DebugReentrancy;
use core::fmt;
use core::hash::Hash;
use core::ops::Index;

/// Hash map with unique keys whose storage is shared between clones until
/// one of them writes.
///
/// Cloning is O(1): the clone shares the slot buffer and bumps its
/// reference count. The first mutating call on a shared map copies the
/// buffer, so writes through one clone are never observed through another.
/// Mutating calls may therefore allocate, and report allocator failure as
/// `MapError::Allocation`.
///
/// The key capability `T` reserves a clear value that marks empty slots;
/// with `DefaultKeyTraits` that is `K::default()`, which cannot be
/// inserted.
pub struct UniqueMap<K, V, T = DefaultKeyTraits, A: Allocator = Global> {
    raw: RawMap<K, V, T, A>,
    reentrancy: DebugReentrancy,
}

impl<K, V> UniqueMap<K, V>
where
    K: Eq + Hash + Default,
{
    pub fn new() -> Self {
        Self::with_key_traits_in(DefaultKeyTraits::default(), Global)
    }
}

impl<K, V, A> UniqueMap<K, V, DefaultKeyTraits, A>
where
    K: Eq + Hash + Default,
    A: Allocator,
{
    pub fn new_in(alloc: A) -> Self {
        Self::with_key_traits_in(DefaultKeyTraits::default(), alloc)
    }
}

impl<K, V, T> UniqueMap<K, V, T>
where
    T: KeyTraits<K>,
{
    pub fn with_key_traits(traits: T) -> Self {
        Self::with_key_traits_in(traits, Global)
    }
}

impl<K, V, T, A> UniqueMap<K, V, T, A>
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

    pub fn len(&self) -> usize {
        self.raw.len()
    }

    pub fn is_empty(&self) -> bool {
        self.raw.len() == 0
    }

    /// Number of slots in the current table (0 before the first insert).
    pub fn capacity(&self) -> usize {
        self.raw.capacity()
    }

    /// Number of maps sharing this map's buffer; 0 when unallocated.
    pub fn ref_count(&self) -> usize {
        self.raw.ref_count()
    }

    pub fn key_traits(&self) -> &T {
        self.raw.traits()
    }

    pub fn allocator(&self) -> &A {
        self.raw.allocator()
    }

    pub fn get(&self, key: &K) -> Option<&V> {
        let _g = self.reentrancy.enter("get");
        self.raw.get(key)
    }

    pub fn contains(&self, key: &K) -> bool {
        let _g = self.reentrancy.enter("contains");
        self.raw.find_index(key).is_some()
    }

    /// Like `get`, but a missing key is an error. Querying with the clear
    /// value is rejected as `InvalidKey`.
    pub fn at(&self, key: &K) -> Result<&V, MapError> {
        let _g = self.reentrancy.enter("at");
        if self.raw.is_clear(key) {
            return Err(MapError::InvalidKey);
        }
        self.raw.get(key).ok_or(MapError::MissingKey)
    }

    /// Entries in slot order; insertion order is not preserved.
    pub fn iter(&self) -> Iter<'_, K, V> {
        Iter::new(self.raw.slots(), self.raw.len())
    }

    pub fn keys(&self) -> Keys<'_, K, V> {
        Keys { inner: self.iter() }
    }

    pub fn values(&self) -> Values<'_, K, V> {
        Values { inner: self.iter() }
    }
}

impl<K, V, T, A> UniqueMap<K, V, T, A>
where
    K: Clone,
    V: Clone,
    T: KeyTraits<K>,
    A: Allocator + Clone,
{
    /// Insert or overwrite, returning the previous value for `key`.
    pub fn insert(&mut self, key: K, value: V) -> Result<Option<V>, MapError> {
        let _g = self.reentrancy.enter("insert");
        self.raw.insert_unique(key, value)
    }

    /// Remove `key` and return its value.
    ///
    /// # Panics
    /// If `key` is not in the map. Check with `contains` first when unsure.
    pub fn remove(&mut self, key: &K) -> Result<V, MapError> {
        let _g = self.reentrancy.enter("remove");
        Ok(self.raw.remove_key(key)?)
    }

    pub fn get_mut(&mut self, key: &K) -> Result<Option<&mut V>, MapError> {
        let _g = self.reentrancy.enter("get_mut");
        Ok(self.raw.get_mut(key)?)
    }

    pub fn at_mut(&mut self, key: &K) -> Result<&mut V, MapError> {
        let _g = self.reentrancy.enter("at_mut");
        if self.raw.is_clear(key) {
            return Err(MapError::InvalidKey);
        }
        self.raw.get_mut(key)?.ok_or(MapError::MissingKey)
    }

    /// The value for `key`, inserting `default()` first if it is absent.
    pub fn get_or_insert_with<F>(&mut self, key: K, default: F) -> Result<&mut V, MapError>
    where
        F: FnOnce() -> V,
    {
        let _g = self.reentrancy.enter("get_or_insert_with");
        self.raw.get_or_insert_with(key, default)
    }

    /// Make room for `additional` more keys without further reallocation.
    pub fn reserve(&mut self, additional: usize) -> Result<(), MapError> {
        let _g = self.reentrancy.enter("reserve");
        Ok(self.raw.reserve(additional)?)
    }

    /// Remove every entry. Other maps sharing the buffer are unaffected.
    pub fn clear(&mut self) {
        let _g = self.reentrancy.enter("clear");
        self.raw.clear()
    }

    pub fn iter_mut(&mut self) -> Result<IterMut<'_, K, V>, MapError> {
        let len = self.raw.len();
        Ok(IterMut::new(self.raw.slots_mut()?, len))
    }

    pub fn values_mut(&mut self) -> Result<ValuesMut<'_, K, V>, MapError> {
        Ok(ValuesMut {
            inner: self.iter_mut()?,
        })
    }
}

impl<K, V, T, A> Clone for UniqueMap<K, V, T, A>
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

impl<K, V, T, A> Default for UniqueMap<K, V, T, A>
where
    T: KeyTraits<K> + Default,
    A: Allocator + Default,
{
    fn default() -> Self {
        Self::with_key_traits_in(T::default(), A::default())
    }
}

impl<K, V, T, A> Index<&K> for UniqueMap<K, V, T, A>
where
    T: KeyTraits<K>,
    A: Allocator,
{
    type Output = V;

    /// # Panics
    /// If `key` is not in the map.
    fn index(&self, key: &K) -> &V {
        match self.get(key) {
            Some(v) => v,
            None => panic!("key not present in map"),
        }
    }
}

impl<'a, K, V, T, A> IntoIterator for &'a UniqueMap<K, V, T, A>
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

impl<K, V, T, A> fmt::Debug for UniqueMap<K, V, T, A>
where
    K: fmt::Debug,
    V: fmt::Debug,
    T: KeyTraits<K>,
    A: Allocator,
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_map().entries(self.iter()).finish()
    }
}
