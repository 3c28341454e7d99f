use cow_hashmap::{AllocationError, Allocator, Block, Global, MapError, MultiMap, SharedTable, UniqueMap};
use std::cell::Cell;
use std::ptr::NonNull;
use std::rc::Rc;

#[derive(Default)]
struct Stats {
    live_blocks: Cell<usize>,
    live_ranges: Cell<usize>,
    allocations: Cell<usize>,
    // Allocations still allowed; `None` means unlimited.
    budget: Cell<Option<usize>>,
}

// Counts blocks and registered ranges, and can be told to start failing.
#[derive(Clone, Default)]
struct Tracking(Rc<Stats>);

impl Tracking {
    fn with_budget(n: usize) -> Self {
        let t = Tracking::default();
        t.0.budget.set(Some(n));
        t
    }

    fn live_blocks(&self) -> usize {
        self.0.live_blocks.get()
    }

    fn live_ranges(&self) -> usize {
        self.0.live_ranges.get()
    }
}

unsafe impl Allocator for Tracking {
    fn allocate(&self, size: usize, align: usize) -> Result<Block, AllocationError> {
        match self.0.budget.get() {
            Some(0) => return Err(AllocationError::new(size, align)),
            Some(n) => self.0.budget.set(Some(n - 1)),
            None => {}
        }
        let block = Global.allocate(size, align)?;
        self.0.live_blocks.set(self.0.live_blocks.get() + 1);
        self.0.allocations.set(self.0.allocations.get() + 1);
        Ok(block)
    }

    unsafe fn deallocate(&self, block: Block) {
        self.0.live_blocks.set(self.0.live_blocks.get() - 1);
        Global.deallocate(block)
    }

    fn register_range(&self, _ptr: NonNull<u8>, _len: usize) {
        self.0.live_ranges.set(self.0.live_ranges.get() + 1);
    }

    fn unregister_range(&self, _ptr: NonNull<u8>, _len: usize) {
        self.0.live_ranges.set(self.0.live_ranges.get() - 1);
    }
}

#[test]
fn every_block_is_released() {
    let alloc = Tracking::default();
    {
        let mut a: UniqueMap<u32, String, _, Tracking> = UniqueMap::new_in(alloc.clone());
        for k in 1..=64 {
            a.insert(k, k.to_string()).unwrap();
        }
        let mut b = a.clone();
        assert_eq!(alloc.live_blocks(), 1);
        b.insert(65, "x".to_string()).unwrap();
        assert_eq!(alloc.live_blocks(), 2);
        assert_eq!(alloc.live_ranges(), 2);
        for k in 1..=32 {
            a.remove(&k).unwrap();
        }
        drop(b);
        assert_eq!(alloc.live_blocks(), 1);
    }
    assert_eq!(alloc.live_blocks(), 0);
    assert_eq!(alloc.live_ranges(), 0);
    assert!(alloc.0.allocations.get() > 2);
}

#[test]
fn plain_slots_are_not_registered() {
    let alloc = Tracking::default();
    let mut m: UniqueMap<u32, u32, _, Tracking> = UniqueMap::new_in(alloc.clone());
    m.insert(1, 1).unwrap();
    assert_eq!(alloc.live_blocks(), 1);
    assert_eq!(alloc.live_ranges(), 0);
}

#[test]
fn failed_copy_leaves_both_maps_intact() {
    let alloc = Tracking::with_budget(1);
    let mut a: UniqueMap<u32, u32, _, Tracking> = UniqueMap::new_in(alloc.clone());
    a.insert(1, 10).unwrap();
    let mut b = a.clone();

    let err = b.insert(2, 20).unwrap_err();
    assert!(matches!(err, MapError::Allocation(_)));
    assert_eq!(b.len(), 1);
    assert_eq!(b.get(&2), None);
    assert_eq!(a.ref_count(), 2);
    assert!(b.get_mut(&1).is_err());
    assert!(b.iter_mut().is_err());
    assert_eq!(a.get(&1), Some(&10));
}

#[test]
fn failed_growth_keeps_the_old_table() {
    let alloc = Tracking::with_budget(1);
    let mut m: MultiMap<u32, u32, _, Tracking> = MultiMap::new_in(alloc.clone());
    m.insert(1, 1).unwrap();
    assert_eq!(m.capacity(), 4);
    assert!(matches!(m.insert(1, 2), Err(MapError::Allocation(_))));
    assert_eq!(m.capacity(), 4);
    assert_eq!(m.count(&1), 1);
    assert_eq!(alloc.live_blocks(), 1);
}

#[test]
fn clear_on_shared_map_allocates_nothing() {
    let alloc = Tracking::with_budget(1);
    let mut a: UniqueMap<u32, u32, _, Tracking> = UniqueMap::new_in(alloc.clone());
    a.insert(1, 1).unwrap();
    let b = a.clone();
    a.clear();
    assert_eq!(a.capacity(), 0);
    assert_eq!(b.get(&1), Some(&1));
    assert_eq!(alloc.live_blocks(), 1);
}

#[test]
fn drops_each_value_exactly_once() {
    let token = Rc::new(());
    {
        let mut a: UniqueMap<u32, Rc<()>> = UniqueMap::new();
        for k in 1..=20 {
            a.insert(k, token.clone()).unwrap();
        }
        let mut b = a.clone();
        assert_eq!(Rc::strong_count(&token), 21);
        b.remove(&1).unwrap();
        // The private copy of `b` holds its own clones.
        assert_eq!(Rc::strong_count(&token), 40);
        a.clear();
        assert_eq!(Rc::strong_count(&token), 20);
    }
    assert_eq!(Rc::strong_count(&token), 1);
}

#[test]
fn shared_table_counts_handles() {
    let alloc = Tracking::default();
    let mut t: SharedTable<u64, Tracking> = SharedTable::new_in(alloc.clone());
    t.initialize(8).unwrap();
    assert_eq!(t.ref_count(), 1);
    let mut u = t.clone();
    assert_eq!(t.ref_count(), 2);
    assert!(!u.is_unique());
    u.make_unique().unwrap()[3] = 7;
    assert_eq!(alloc.live_blocks(), 2);
    assert_eq!(t.slots()[3], 0);
    assert_eq!(u.slots()[3], 7);
    assert!(t.is_unique());
    drop(t);
    drop(u);
    assert_eq!(alloc.live_blocks(), 0);
}
