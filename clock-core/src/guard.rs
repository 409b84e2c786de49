//! Scoped in-flight flags.
//!
//! Both the controller (`Idle`/`Retargeting`) and the scheduler
//! (`Idle`/`Pulsing`) allow at most one operation at a time and reject, rather
//! than queue, anything that arrives while one is running. [`OperationFlag`]
//! hands out an [`OperationGuard`] that clears the flag when dropped, so every
//! exit path (including early returns and `?`) releases it.

use portable_atomic::{AtomicBool, Ordering};

/// Single-slot exclusion flag.
#[derive(Debug, Default)]
pub struct OperationFlag {
    active: AtomicBool,
}

impl OperationFlag {
    #[must_use]
    pub const fn new() -> Self {
        Self {
            active: AtomicBool::new(false),
        }
    }

    /// Claims the flag, or returns `None` when an operation is already in flight.
    pub fn try_begin(&self) -> Option<OperationGuard<'_>> {
        self.active
            .compare_exchange(false, true, Ordering::Acquire, Ordering::Relaxed)
            .ok()
            .map(|_| OperationGuard { flag: self })
    }

    /// Returns `true` while a guard is alive.
    pub fn is_active(&self) -> bool {
        self.active.load(Ordering::Acquire)
    }
}

/// Proof that the owning flag is claimed; releases it on drop.
#[derive(Debug)]
#[must_use = "the operation ends as soon as the guard is dropped"]
pub struct OperationGuard<'a> {
    flag: &'a OperationFlag,
}

impl Drop for OperationGuard<'_> {
    fn drop(&mut self) {
        self.flag.active.store(false, Ordering::Release);
    }
}
