//! Per-key-type hashing and equality capability.

use core::hash::{BuildHasher, Hash};
use hashbrown::hash_map::DefaultHashBuilder;

/// How a map hashes and compares its keys, and which key value marks an
/// empty slot.
///
/// The clear value is reserved: maps reject it as a real key. It must
/// compare equal only to itself under `equals`.
pub trait KeyTraits<K> {
    fn clear_value(&self) -> K;

    fn equals(&self, a: &K, b: &K) -> bool;

    fn hash_of(&self, key: &K) -> u64;

    #[inline]
    fn is_clear(&self, key: &K) -> bool {
        self.equals(key, &self.clear_value())
    }
}

/// `Eq` + `Hash` keys whose `Default` value is the clear value, hashed by
/// a `BuildHasher`.
///
/// With this capability `0`, `""` and `None` cannot be stored as keys.
#[derive(Clone, Debug, Default)]
pub struct DefaultKeyTraits<S = DefaultHashBuilder> {
    hasher: S,
}

impl<S> DefaultKeyTraits<S> {
    pub fn with_hasher(hasher: S) -> Self {
        Self { hasher }
    }

    pub fn hasher(&self) -> &S {
        &self.hasher
    }
}

impl<K, S> KeyTraits<K> for DefaultKeyTraits<S>
where
    K: Eq + Hash + Default,
    S: BuildHasher,
{
    #[inline]
    fn clear_value(&self) -> K {
        K::default()
    }

    #[inline]
    fn equals(&self, a: &K, b: &K) -> bool {
        a == b
    }

    #[inline]
    fn hash_of(&self, key: &K) -> u64 {
        self.hasher.hash_one(key)
    }
}
