use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use crossbeam::utils::CachePadded;

/// Cheaply clonable boolean flag shared across threads.
/// Wraps an `AtomicBool` in `Arc<CachePadded<...>>` to avoid false sharing
/// between the runner thread and consumer workers.
#[derive(Clone)]
#[repr(transparent)]
pub struct AtomicFlag(Arc<CachePadded<AtomicBool>>);

impl AtomicFlag {
    /// Create a new flag, initially unset.
    #[inline]
    pub fn new() -> Self {
        Self(Arc::new(CachePadded::new(AtomicBool::new(false))))
    }

    /// Current value (relaxed load).
    #[inline(always)]
    pub fn get(&self) -> bool {
        self.0.load(Ordering::Relaxed)
    }

    /// Raise the flag.
    #[inline(always)]
    pub fn set(&self) {
        self.0.store(true, Ordering::Release)
    }

    /// Lower the flag.
    #[inline(always)]
    pub fn clear(&self) {
        self.0.store(false, Ordering::Release)
    }

    /// Flip the flag, returning the new value.
    #[inline]
    pub fn toggle(&self) -> bool {
        !self.0.fetch_xor(true, Ordering::AcqRel)
    }
}

impl Default for AtomicFlag {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for AtomicFlag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AtomicFlag").field("value", &self.get()).finish()
    }
}
