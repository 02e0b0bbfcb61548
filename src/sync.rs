//! Counting semaphore used by the worker pool's job queue.

use std::sync::{Condvar, Mutex, PoisonError};

/// A counting semaphore built on `Mutex` + `Condvar`.
///
/// `release` wakes exactly one waiter, which pairs each submitted job with
/// exactly one worker wakeup.
pub struct Semaphore {
    permits: Mutex<usize>,
    available: Condvar,
}

impl Semaphore {
    pub fn new(permits: usize) -> Self {
        Self {
            permits: Mutex::new(permits),
            available: Condvar::new(),
        }
    }

    /// Blocks until a permit is available, then takes it.
    pub fn acquire(&self) {
        let mut count = self.permits.lock().unwrap_or_else(PoisonError::into_inner);
        while *count == 0 {
            count = self
                .available
                .wait(count)
                .unwrap_or_else(PoisonError::into_inner);
        }
        *count -= 1;
    }

    /// Adds a permit and wakes one waiter.
    pub fn release(&self) {
        let mut count = self.permits.lock().unwrap_or_else(PoisonError::into_inner);
        *count += 1;
        self.available.notify_one();
    }
}
