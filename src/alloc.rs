//! Block allocation capability consumed by `SharedTable`.
//!
//! Allocators hand out raw byte ranges described by an explicit size and
//! alignment. Nothing here relies on the global allocator's implicit
//! alignment guarantees; over-aligned slot types pass their alignment
//! through `allocate`.
//!
//! `allocate_prefixed` places a fixed-size value in front of a payload in
//! the same block so that it can be found again from the payload pointer
//! alone. `SharedTable` keeps its reference count there, which leaves the
//! slot region exactly `capacity` slots long.

use crate::error::AllocationError;
use core::alloc::Layout;
use core::ptr::NonNull;

/// A raw block returned by an [`Allocator`].
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct Block {
    ptr: NonNull<u8>,
    size: usize,
    align: usize,
}

impl Block {
    /// # Safety
    /// `ptr` must address `size` bytes aligned to `align` that the
    /// allocator receiving this block in `deallocate` handed out.
    pub unsafe fn from_raw_parts(ptr: NonNull<u8>, size: usize, align: usize) -> Self {
        Self { ptr, size, align }
    }

    pub fn ptr(&self) -> NonNull<u8> {
        self.ptr
    }

    pub fn size(&self) -> usize {
        self.size
    }

    pub fn align(&self) -> usize {
        self.align
    }
}

/// Source of raw memory for tables.
///
/// # Safety
/// `allocate` must return a block of at least `size` bytes aligned to
/// `align`, valid until passed to `deallocate` on the same allocator (or a
/// clone of it). Clones of an allocator must be able to release each
/// other's blocks.
pub unsafe trait Allocator {
    fn allocate(&self, size: usize, align: usize) -> Result<Block, AllocationError>;

    /// # Safety
    /// `block` must come from `allocate` on this allocator (or a clone)
    /// and must not be used afterward.
    unsafe fn deallocate(&self, block: Block);

    /// Grow or shrink `block` without moving it. Returns `false` when the
    /// allocator cannot do so; `block` is then left unchanged.
    ///
    /// # Safety
    /// Same provenance requirements as `deallocate`.
    unsafe fn resize_in_place(&self, block: &mut Block, new_size: usize) -> bool {
        let _ = (block, new_size);
        false
    }

    /// Called after a table that stores owning slots is allocated. Tracing
    /// allocators use this to scan the range for references.
    fn register_range(&self, ptr: NonNull<u8>, len: usize) {
        let _ = (ptr, len);
    }

    /// Counterpart of `register_range`, called before the range is freed.
    fn unregister_range(&self, ptr: NonNull<u8>, len: usize) {
        let _ = (ptr, len);
    }
}

unsafe impl<A: Allocator + ?Sized> Allocator for &A {
    #[inline]
    fn allocate(&self, size: usize, align: usize) -> Result<Block, AllocationError> {
        (**self).allocate(size, align)
    }

    #[inline]
    unsafe fn deallocate(&self, block: Block) {
        (**self).deallocate(block)
    }

    #[inline]
    unsafe fn resize_in_place(&self, block: &mut Block, new_size: usize) -> bool {
        (**self).resize_in_place(block, new_size)
    }

    #[inline]
    fn register_range(&self, ptr: NonNull<u8>, len: usize) {
        (**self).register_range(ptr, len)
    }

    #[inline]
    fn unregister_range(&self, ptr: NonNull<u8>, len: usize) {
        (**self).unregister_range(ptr, len)
    }
}

/// The process allocator.
#[derive(Copy, Clone, Debug, Default, Eq, PartialEq)]
pub struct Global;

unsafe impl Allocator for Global {
    fn allocate(&self, size: usize, align: usize) -> Result<Block, AllocationError> {
        let layout =
            Layout::from_size_align(size, align).map_err(|_| AllocationError::new(size, align))?;
        if size == 0 {
            // Zero-sized blocks never touch the heap; any aligned address will do.
            let ptr = NonNull::new(align as *mut u8).ok_or(AllocationError::new(size, align))?;
            return Ok(Block { ptr, size, align });
        }
        let raw = unsafe { std::alloc::alloc(layout) };
        NonNull::new(raw)
            .map(|ptr| Block { ptr, size, align })
            .ok_or(AllocationError::new(size, align))
    }

    unsafe fn deallocate(&self, block: Block) {
        if block.size == 0 {
            return;
        }
        let layout = Layout::from_size_align_unchecked(block.size, block.align);
        std::alloc::dealloc(block.ptr.as_ptr(), layout)
    }
}

/// Layout of a prefixed block: `[P][padding][payload]`.
///
/// Returns the whole layout and the byte offset of the payload.
pub fn prefixed_layout<P>(payload: Layout) -> Result<(Layout, usize), AllocationError> {
    let (layout, offset) = Layout::new::<P>()
        .extend(payload)
        .map_err(|_| AllocationError::new(payload.size(), payload.align()))?;
    Ok((layout.pad_to_align(), offset))
}

/// A block carrying a prefix value of type `P` ahead of its payload.
pub struct PrefixedBlock<P> {
    pub prefix: NonNull<P>,
    pub payload: NonNull<u8>,
}

/// Allocate room for a `P` followed by `payload`. The prefix is left
/// uninitialized.
pub fn allocate_prefixed<P, A>(alloc: &A, payload: Layout) -> Result<PrefixedBlock<P>, AllocationError>
where
    A: Allocator + ?Sized,
{
    let (layout, offset) = prefixed_layout::<P>(payload)?;
    let block = alloc.allocate(layout.size(), layout.align())?;
    let base = block.ptr();
    // SAFETY: offset < layout.size() whenever the payload is non-empty, and
    // equals the end of the block otherwise; both stay inside the allocation.
    let payload = unsafe { NonNull::new_unchecked(base.as_ptr().add(offset)) };
    Ok(PrefixedBlock {
        prefix: base.cast::<P>(),
        payload,
    })
}

/// Recover the prefix pointer of a block from its payload pointer.
///
/// # Safety
/// `payload` must have been returned by `allocate_prefixed::<P>` with the
/// same `payload_layout`.
pub unsafe fn prefix_of<P>(payload: NonNull<u8>, payload_layout: Layout) -> NonNull<P> {
    let offset = match prefixed_layout::<P>(payload_layout) {
        Ok((_, offset)) => offset,
        Err(_) => unreachable_layout(),
    };
    NonNull::new_unchecked(payload.as_ptr().sub(offset)).cast::<P>()
}

/// Release a block obtained from `allocate_prefixed`.
///
/// # Safety
/// Same as `prefix_of`; the block must not be used afterward. The prefix
/// value is not dropped.
pub unsafe fn deallocate_prefixed<P, A>(alloc: &A, payload: NonNull<u8>, payload_layout: Layout)
where
    A: Allocator + ?Sized,
{
    let (layout, _) = match prefixed_layout::<P>(payload_layout) {
        Ok(v) => v,
        Err(_) => unreachable_layout(),
    };
    let base = prefix_of::<P>(payload, payload_layout).cast::<u8>();
    alloc.deallocate(Block::from_raw_parts(base, layout.size(), layout.align()));
}

#[cold]
fn unreachable_layout() -> ! {
    panic!("layout of a live prefixed block no longer computes")
}
