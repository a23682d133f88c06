//! One-outstanding-command latch
//!
//! The wire mutex only covers a single write+read pair. The interlock covers
//! the whole exchange as the caller sees it: flush, write, read, decode and
//! any corrective flush. It is a plain flag taken by sleep-spinning, so there
//! is no fairness between waiters.

use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

/// "Response pending" flag for one device instance
#[derive(Debug, Default)]
pub struct Interlock {
    pending: AtomicBool,
}

impl Interlock {
    /// Create a released interlock
    pub fn new() -> Self {
        Self::default()
    }

    /// Block until no response is pending, then claim it
    ///
    /// The returned guard releases on drop, so every exit path of an
    /// exchange gives the link back.
    pub fn acquire(&self, spin: Duration) -> InterlockGuard<'_> {
        while self
            .pending
            .compare_exchange_weak(false, true, Ordering::Acquire, Ordering::Relaxed)
            .is_err()
        {
            std::thread::sleep(spin);
        }
        InterlockGuard { interlock: self }
    }

    /// Claim the interlock only if it is free
    pub fn try_acquire(&self) -> Option<InterlockGuard<'_>> {
        self.pending
            .compare_exchange(false, true, Ordering::Acquire, Ordering::Relaxed)
            .ok()
            .map(|_| InterlockGuard { interlock: self })
    }

    /// Clear the flag unconditionally
    pub fn release(&self) {
        self.pending.store(false, Ordering::Release);
    }

    /// Whether an exchange is in flight
    pub fn is_pending(&self) -> bool {
        self.pending.load(Ordering::Acquire)
    }
}

/// Held for the duration of one logical exchange
#[must_use = "dropping the guard releases the interlock immediately"]
#[derive(Debug)]
pub struct InterlockGuard<'a> {
    interlock: &'a Interlock,
}

impl Drop for InterlockGuard<'_> {
    fn drop(&mut self) {
        self.interlock.release();
    }
}
