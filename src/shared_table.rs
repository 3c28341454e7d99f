//! SharedTable: a power-of-two slot buffer shared between handles.
//!
//! Handles share one physical allocation and a strong count stored in the
//! allocation prefix (see `alloc::allocate_prefixed`). Cloning a handle
//! bumps the count; a writer calls `make_unique` first and gets a private
//! copy when the buffer is shared. The last handle to go away drops every
//! slot and releases the block.

use crate::alloc::{allocate_prefixed, deallocate_prefixed, prefix_of, Allocator, Global};
use crate::count::RefCount;
use crate::error::AllocationError;
use core::alloc::Layout;
use core::fmt;
use core::marker::PhantomData;
use core::mem::{self, ManuallyDrop};
use core::ptr::{self, NonNull};
use log::trace;

pub struct SharedTable<T, A: Allocator = Global> {
    ptr: NonNull<T>,
    capacity: usize,
    alloc: A,
    _owns: PhantomData<T>,
    // !Send + !Sync: the strong count is a plain Cell.
    _nosend: PhantomData<*mut ()>,
}

impl<T> SharedTable<T> {
    pub const fn new() -> Self {
        Self::new_in(Global)
    }
}

impl<T, A: Allocator> SharedTable<T, A> {
    /// An unallocated table (capacity 0) that will allocate from `alloc`.
    pub const fn new_in(alloc: A) -> Self {
        Self {
            ptr: NonNull::dangling(),
            capacity: 0,
            alloc,
            _owns: PhantomData,
            _nosend: PhantomData,
        }
    }

    fn slot_layout(capacity: usize) -> Result<Layout, AllocationError> {
        Layout::array::<T>(capacity).map_err(|_| {
            AllocationError::new(
                capacity.saturating_mul(mem::size_of::<T>()),
                mem::align_of::<T>(),
            )
        })
    }

    fn live_layout(&self) -> Layout {
        match Self::slot_layout(self.capacity) {
            Ok(layout) => layout,
            Err(_) => unreachable!("layout of a live table no longer computes"),
        }
    }

    fn count(&self) -> Option<&RefCount> {
        if self.capacity == 0 {
            return None;
        }
        // SAFETY: allocated tables always carry an initialized RefCount prefix.
        unsafe {
            let prefix = prefix_of::<RefCount>(self.ptr.cast(), self.live_layout());
            Some(&*prefix.as_ptr())
        }
    }

    /// Allocate `capacity` slots and construct each with `fill(index)`.
    /// The strong count starts at one.
    fn allocate_filled<F>(alloc: &A, capacity: usize, mut fill: F) -> Result<NonNull<T>, AllocationError>
    where
        F: FnMut(usize) -> T,
    {
        let layout = Self::slot_layout(capacity)?;
        let block = allocate_prefixed::<RefCount, A>(alloc, layout)?;
        // SAFETY: the prefix is sized and aligned for RefCount.
        unsafe { block.prefix.as_ptr().write(RefCount::new(1)) };
        let ptr = block.payload.cast::<T>();

        let mut filling = Filling {
            ptr,
            written: 0,
            layout,
            alloc,
        };
        while filling.written < capacity {
            let value = fill(filling.written);
            // SAFETY: written < capacity, inside the payload.
            unsafe { ptr.as_ptr().add(filling.written).write(value) };
            filling.written += 1;
        }
        mem::forget(filling);

        if mem::needs_drop::<T>() {
            alloc.register_range(ptr.cast(), layout.size());
        }
        trace!(
            "shared table allocated: {} slots, {} bytes",
            capacity,
            layout.size()
        );
        Ok(ptr)
    }

    /// Unregister and free the block. Slots and prefix must already be dead.
    unsafe fn release(&self) {
        let layout = self.live_layout();
        if mem::needs_drop::<T>() {
            self.alloc.unregister_range(self.ptr.cast(), layout.size());
        }
        deallocate_prefixed::<RefCount, A>(&self.alloc, self.ptr.cast(), layout);
        trace!("shared table released: {} slots", self.capacity);
    }

    /// Allocate `length` slots built by `fill(index)`.
    ///
    /// Panics if the table is already allocated or `length` is not a power
    /// of two. A `length` of zero leaves the table unallocated.
    pub fn initialize_with<F>(&mut self, length: usize, fill: F) -> Result<(), AllocationError>
    where
        F: FnMut(usize) -> T,
    {
        assert!(self.capacity == 0, "initialize on an already allocated table");
        if length == 0 {
            return Ok(());
        }
        assert!(length.is_power_of_two(), "table length must be a power of two");
        self.ptr = Self::allocate_filled(&self.alloc, length, fill)?;
        self.capacity = length;
        Ok(())
    }

    pub fn initialize(&mut self, length: usize) -> Result<(), AllocationError>
    where
        T: Default,
    {
        self.initialize_with(length, |_| T::default())
    }

    /// A brand-new table of `length` slots using this table's allocator.
    /// `self` is left untouched.
    pub fn create_new_with<F>(&self, length: usize, fill: F) -> Result<Self, AllocationError>
    where
        A: Clone,
        F: FnMut(usize) -> T,
    {
        let mut table = Self::new_in(self.alloc.clone());
        table.initialize_with(length, fill)?;
        Ok(table)
    }

    pub fn create_new(&self, length: usize) -> Result<Self, AllocationError>
    where
        A: Clone,
        T: Default,
    {
        self.create_new_with(length, |_| T::default())
    }

    /// Private copy of every slot, empty ones included, at the same capacity.
    pub fn duplicate(&self) -> Result<Self, AllocationError>
    where
        A: Clone,
        T: Clone,
    {
        let src = self.slots();
        trace!("shared table duplicated: {} slots", self.capacity);
        self.create_new_with(self.capacity, |i| src[i].clone())
    }

    /// True if no other handle shares the buffer.
    #[inline]
    pub fn is_unique(&self) -> bool {
        self.count().map_or(true, |c| c.current() == 1)
    }

    /// Number of handles sharing the buffer; zero when unallocated.
    pub fn ref_count(&self) -> usize {
        self.count().map_or(0, RefCount::current)
    }

    #[inline]
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn allocator(&self) -> &A {
        &self.alloc
    }

    #[inline]
    pub fn slots(&self) -> &[T] {
        // SAFETY: ptr addresses `capacity` initialized slots (dangling when 0).
        unsafe { core::slice::from_raw_parts(self.ptr.as_ptr(), self.capacity) }
    }

    /// Mutable slots, only when this handle is the sole owner.
    #[inline]
    pub fn slots_mut(&mut self) -> Option<&mut [T]> {
        if !self.is_unique() {
            return None;
        }
        // SAFETY: unique handle, no other reader can observe the buffer.
        Some(unsafe { core::slice::from_raw_parts_mut(self.ptr.as_ptr(), self.capacity) })
    }

    /// Copy-on-write entry point: duplicate the buffer if it is shared,
    /// then hand out the (now private) slots.
    pub fn make_unique(&mut self) -> Result<&mut [T], AllocationError>
    where
        A: Clone,
        T: Clone,
    {
        if !self.is_unique() {
            // Assigning drops the old handle, which only decrements the
            // shared count since another handle is still alive.
            *self = self.duplicate()?;
        }
        // SAFETY: unique after the branch above.
        Ok(unsafe { core::slice::from_raw_parts_mut(self.ptr.as_ptr(), self.capacity) })
    }

    /// Move slot `index` out of the buffer.
    ///
    /// # Safety
    /// The handle must be unique, and the slot must be treated as
    /// uninitialized afterward: the only valid follow-up for the table is
    /// `deallocate` once every slot has been read.
    #[inline]
    pub unsafe fn read_slot(&self, index: usize) -> T {
        debug_assert!(index < self.capacity);
        debug_assert!(self.is_unique());
        ptr::read(self.ptr.as_ptr().add(index))
    }

    /// Release the buffer without dropping any slot.
    ///
    /// # Safety
    /// The handle must be unique and every slot must already have been
    /// moved out with `read_slot`; otherwise slot contents leak.
    pub unsafe fn deallocate(self) {
        assert!(self.is_unique(), "deallocate on a shared table");
        let this = ManuallyDrop::new(self);
        if this.capacity != 0 {
            this.release();
        }
        drop(ptr::read(&this.alloc));
    }
}

impl<T, A: Allocator> SharedTable<T, A> {
    /// Move every slot out, starting at `start` and wrapping around, then
    /// release the buffer without tearing slots down twice.
    ///
    /// Returns the table unchanged when it is shared.
    pub fn into_slots(self, start: usize) -> Result<IntoSlots<T, A>, Self> {
        if !self.is_unique() {
            return Err(self);
        }
        let start = if self.capacity == 0 {
            0
        } else {
            start & (self.capacity - 1)
        };
        Ok(IntoSlots {
            table: ManuallyDrop::new(self),
            start,
            taken: 0,
        })
    }
}

/// Draining iterator returned by `SharedTable::into_slots`.
///
/// Slots not consumed are dropped, and the buffer released, when the
/// iterator goes away.
pub struct IntoSlots<T, A: Allocator> {
    table: ManuallyDrop<SharedTable<T, A>>,
    start: usize,
    taken: usize,
}

impl<T, A: Allocator> Iterator for IntoSlots<T, A> {
    type Item = T;

    fn next(&mut self) -> Option<T> {
        let cap = self.table.capacity;
        if self.taken == cap {
            return None;
        }
        let index = (self.start + self.taken) & (cap - 1);
        self.taken += 1;
        // SAFETY: unique (checked in into_slots); each index is read once.
        Some(unsafe { self.table.read_slot(index) })
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        let rest = self.table.capacity - self.taken;
        (rest, Some(rest))
    }
}

impl<T, A: Allocator> ExactSizeIterator for IntoSlots<T, A> {}

impl<T, A: Allocator> Drop for IntoSlots<T, A> {
    fn drop(&mut self) {
        for rest in self.by_ref() {
            drop(rest);
        }
        // SAFETY: every slot has been moved out above.
        unsafe { ManuallyDrop::take(&mut self.table).deallocate() }
    }
}

impl<T, A: Allocator> Drop for SharedTable<T, A> {
    fn drop(&mut self) {
        let last = match self.count() {
            Some(c) => c.put(),
            None => return,
        };
        if last {
            // Frees the block even if a slot destructor panics.
            let _release = Release(&*self);
            // SAFETY: last handle; all slots initialized and unobserved.
            unsafe {
                ptr::drop_in_place(ptr::slice_from_raw_parts_mut(
                    self.ptr.as_ptr(),
                    self.capacity,
                ));
            }
        }
    }
}

impl<T, A: Allocator + Clone> Clone for SharedTable<T, A> {
    fn clone(&self) -> Self {
        if let Some(c) = self.count() {
            c.get();
        }
        Self {
            ptr: self.ptr,
            capacity: self.capacity,
            alloc: self.alloc.clone(),
            _owns: PhantomData,
            _nosend: PhantomData,
        }
    }
}

impl<T, A: Allocator + Default> Default for SharedTable<T, A> {
    fn default() -> Self {
        Self::new_in(A::default())
    }
}

impl<T, A: Allocator> fmt::Debug for SharedTable<T, A> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SharedTable")
            .field("capacity", &self.capacity)
            .field("ref_count", &self.ref_count())
            .finish()
    }
}

/// Unwinds a half-built buffer if a fill callback panics.
struct Filling<'a, T, A: Allocator> {
    ptr: NonNull<T>,
    written: usize,
    layout: Layout,
    alloc: &'a A,
}

impl<'a, T, A: Allocator> Drop for Filling<'a, T, A> {
    fn drop(&mut self) {
        unsafe {
            ptr::drop_in_place(ptr::slice_from_raw_parts_mut(self.ptr.as_ptr(), self.written));
            deallocate_prefixed::<RefCount, A>(self.alloc, self.ptr.cast(), self.layout);
        }
    }
}

struct Release<'a, T, A: Allocator>(&'a SharedTable<T, A>);

impl<'a, T, A: Allocator> Drop for Release<'a, T, A> {
    fn drop(&mut self) {
        // SAFETY: built only by the last handle, whose slots are dropped by now.
        unsafe { self.0.release() }
    }
}
