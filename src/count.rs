//! Non-atomic strong count stored in a table's allocation prefix.

use core::cell::Cell;
use core::marker::PhantomData;

/// Single-threaded reference counter for a shared slot buffer.
#[derive(Debug)]
pub struct RefCount {
    count: Cell<usize>,
    // !Send + !Sync: the check-then-copy in make_unique is not atomic.
    _nosend: PhantomData<*mut ()>,
}

impl RefCount {
    pub fn new(initial: usize) -> Self {
        Self {
            count: Cell::new(initial),
            _nosend: PhantomData,
        }
    }

    #[inline]
    pub fn current(&self) -> usize {
        self.count.get()
    }

    /// Register one more handle.
    #[inline]
    pub fn get(&self) {
        let n = self.count.get().wrapping_add(1);
        self.count.set(n);
        if n == 0 {
            // Wrapped to zero: the buffer would be freed while still shared.
            std::process::abort();
        }
    }

    /// Drop one handle. Returns true if the count is now zero.
    #[inline]
    pub fn put(&self) -> bool {
        let c = self.count.get();
        assert!(c > 0, "RefCount underflow");
        let n = c - 1;
        self.count.set(n);
        n == 0
    }
}
