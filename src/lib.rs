//! cow-hashmap: single-threaded, copy-on-write hash maps over a
//! reference-counted slot buffer with a pluggable allocator.
//!
//! Internal Design:
//!
//! Summary
//! - Goal: cheap snapshots. Cloning a map is O(1) and shares storage;
//!   the first write through a shared handle takes a private copy.
//! - Layers:
//!   - `alloc`: the `Allocator` capability (`Global` by default) and
//!     prefixed blocks, which put a small header in front of a payload
//!     inside one allocation.
//!   - `SharedTable<T, A>`: a power-of-two array of slots whose strong
//!     count lives in the block prefix. Clone bumps the count,
//!     `make_unique` copies when shared, the last handle drops the slots
//!     and frees the block.
//!   - `RawMap` (internal): linear-probing core over a `SharedTable` of
//!     `(key, Option<value>)` slots. Owns growth, rehash, lookup and
//!     backward-shift deletion.
//!   - `UniqueMap<K, V, T, A>`: keys are unique; insert overwrites.
//!   - `MultiMap<K, V, T, A>`: duplicate keys kept in insertion order
//!     along the key's probe chain, read through `equal_range`.
//!
//! Constraints
//! - Single-threaded: `!Send`/`!Sync` (the strong count is a `Cell`).
//! - One allocation per table, count included; no per-entry heap use.
//! - No tombstones. Deletion moves later entries of the run backward so
//!   every live key stays reachable from its home slot without crossing
//!   an empty one.
//! - Load factor at most 2/3: an insert that would reach
//!   `floor(2 * capacity / 3)` doubles the table first (minimum 4 slots).
//!   A table therefore always has an empty slot and every probe ends.
//!
//! Keys and the clear value
//! - `KeyTraits<K>` supplies hashing, equality and a reserved clear value
//!   that marks an empty slot. `DefaultKeyTraits` uses `Eq + Hash` and
//!   `K::default()`, so `0` or `""` cannot be keys with it. Inserting the
//!   clear value fails with `MapError::InvalidKey`.
//! - Slots carry `Option<V>`: values need no default, and iteration reads
//!   value presence rather than calling back into `KeyTraits`.
//!
//! Copy-on-write rules
//! - Every mutating entry point (including `get_mut`, `iter_mut`, and
//!   `reserve`) makes the buffer unique first; a copy can fail with
//!   `MapError::Allocation`.
//! - `clear` on a shared map does not copy: the handle detaches and
//!   becomes unallocated, leaving other sharers untouched.
//! - A rehash of a uniquely owned table moves entries out of the old
//!   block; a shared table is cloned from instead.
//!
//! Ordering
//! - Iteration follows physical slot order, not insertion order.
//! - Rehash walks the old table starting just after an empty slot, so a
//!   probe chain that wraps past the end is never split and duplicates
//!   of a `MultiMap` key keep their relative order.
//!
//! Reentrancy policy
//! - Probing calls user code (`Eq`, `Hash`, `Default`) through
//!   `KeyTraits`. Maps keep a debug-only `DebugReentrancy` guard at each
//!   entry point; calling back into the same map from that user code
//!   panics in debug builds.
//!
//! Overflow semantics
//! - Strong-count overflow aborts the process, as `Rc` does.
//! - Capacity arithmetic that would overflow `usize` is reported as an
//!   `AllocationError` instead of wrapping.
//!
//! Logging
//! - Through the `log` facade: table allocation, duplication and release
//!   at `trace`, rehash at `debug`. No subscriber is installed here.

pub mod alloc;
mod count;
pub mod error;
pub mod iter;
pub mod key_traits;
pub mod multi_map;
mod raw_map;
mod raw_map_proptest;
mod reentrancy;
pub mod shared_table;
pub mod unique_map;

// Public surface
pub use alloc::{Allocator, Block, Global};
pub use error::{AllocationError, MapError};
pub use key_traits::{DefaultKeyTraits, KeyTraits};
pub use multi_map::{EqualRange, MultiMap};
pub use reentrancy::DebugReentrancy;
pub use shared_table::SharedTable;
pub use unique_map::UniqueMap;
