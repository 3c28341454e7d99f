//! Entry-point tracking for maps, checked in debug builds only.
//!
//! Probing calls into user code through `KeyTraits` (`Eq`, `Hash`,
//! `Default`). While a probe or a backward shift is running the slot
//! array can be transiently inconsistent, so calling back into the same
//! map from that user code is a bug. Each map records which of its methods
//! is active; a second entry panics naming both. Release builds keep no
//! state at all.

#[cfg(debug_assertions)]
use core::cell::Cell;
use core::fmt;
use core::marker::PhantomData;

/// Name of the map method currently running, if any.
pub struct DebugReentrancy {
    #[cfg(debug_assertions)]
    active: Cell<Option<&'static str>>,
    _nosend: PhantomData<*mut ()>,
}

impl DebugReentrancy {
    pub const fn new() -> Self {
        Self {
            #[cfg(debug_assertions)]
            active: Cell::new(None),
            _nosend: PhantomData,
        }
    }

    /// Mark `method` as running until the returned guard drops.
    ///
    /// # Panics
    /// In debug builds, if another method of the same map is still running.
    #[inline]
    pub fn enter(&self, method: &'static str) -> ReentrancyGuard<'_> {
        #[cfg(debug_assertions)]
        {
            if let Some(outer) = self.active.replace(Some(method)) {
                self.active.set(Some(outer));
                panic!(
                    "reentrancy detected: `{}` called from key code running inside `{}`",
                    method, outer
                );
            }
            ReentrancyGuard { owner: self }
        }

        #[cfg(not(debug_assertions))]
        {
            let _ = method;
            ReentrancyGuard { _z: PhantomData }
        }
    }

    /// The running method, or `None` between calls (always `None` in
    /// release builds).
    pub fn active(&self) -> Option<&'static str> {
        #[cfg(debug_assertions)]
        {
            self.active.get()
        }

        #[cfg(not(debug_assertions))]
        {
            None
        }
    }
}

impl Default for DebugReentrancy {
    fn default() -> Self {
        Self::new()
    }
}

// A map clone is a separate map: it starts idle.
impl Clone for DebugReentrancy {
    fn clone(&self) -> Self {
        Self::new()
    }
}

impl fmt::Debug for DebugReentrancy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DebugReentrancy")
            .field("active", &self.active())
            .finish()
    }
}

pub struct ReentrancyGuard<'a> {
    #[cfg(debug_assertions)]
    owner: &'a DebugReentrancy,
    #[cfg(not(debug_assertions))]
    _z: PhantomData<&'a ()>,
}

impl<'a> Drop for ReentrancyGuard<'a> {
    fn drop(&mut self) {
        #[cfg(debug_assertions)]
        {
            let was = self.owner.active.take();
            debug_assert!(was.is_some());
        }
    }
}
