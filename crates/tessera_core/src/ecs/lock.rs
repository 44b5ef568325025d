//! # World Lock
//!
//! A reentrancy counter, not a thread lock: one count per open query
//! cursor. Counts are held by [`LockGuard`]s and released on drop, so a
//! cursor that goes out of scope can never leave the world locked.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

/// Counter shared between a world and its guards.
#[derive(Debug, Default)]
pub(crate) struct WorldLock {
    count: Arc<AtomicUsize>,
}

impl WorldLock {
    /// Takes one count.
    pub fn acquire(&self) -> LockGuard {
        self.count.fetch_add(1, Ordering::AcqRel);
        LockGuard {
            count: Arc::clone(&self.count),
        }
    }

    /// Number of outstanding guards.
    #[inline]
    pub fn open(&self) -> usize {
        self.count.load(Ordering::Acquire)
    }

    #[inline]
    pub fn is_locked(&self) -> bool {
        self.open() > 0
    }
}

/// One count on a world lock, released when dropped.
#[derive(Debug)]
pub(crate) struct LockGuard {
    count: Arc<AtomicUsize>,
}

impl Drop for LockGuard {
    fn drop(&mut self) {
        self.count.fetch_sub(1, Ordering::AcqRel);
    }
}
