//! Fail-fast operation lock
//!
//! One archive handle runs one mutating operation at a time. A second
//! caller gets [`ArchiveError::Busy`] immediately instead of queueing;
//! deferred mutations make blocking pointless, the caller can simply retry
//! after the running rebuild finishes.

use std::sync::atomic::{AtomicBool, Ordering};

use crate::error::{ArchiveError, Result};

#[derive(Debug, Default)]
pub(crate) struct OpLock {
    busy: AtomicBool,
}

impl OpLock {
    /// Claim the lock, failing fast when an operation is already running
    pub(crate) fn acquire(&self) -> Result<OpGuard<'_>> {
        if self
            .busy
            .compare_exchange(false, true, Ordering::Acquire, Ordering::Relaxed)
            .is_err()
        {
            return Err(ArchiveError::Busy);
        }
        Ok(OpGuard { lock: self })
    }
}

/// RAII guard releasing the lock on drop
pub(crate) struct OpGuard<'a> {
    lock: &'a OpLock,
}

impl Drop for OpGuard<'_> {
    fn drop(&mut self) {
        self.lock.busy.store(false, Ordering::Release);
    }
}
