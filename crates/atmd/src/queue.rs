//! Work queue between the multiplexer and the worker pool.
//!
//! An unbounded FIFO guarded by one mutex. `push` never waits; `pop`
//! suspends the calling task until an element is available. The emptiness
//! check and the removal happen in the same critical section, so each
//! pushed element is handed to exactly one popper no matter how many are
//! waiting.
//!
//! # Panic-Free Guarantees
//!
//! This module follows the panic-free policy:
//! - No `.unwrap()`, `.expect()`, `panic!()`, `unreachable!()`, `todo!()`
//! - A poisoned mutex surfaces as [`LockPoisoned`] for the caller to escalate

use std::collections::VecDeque;
use std::sync::{Mutex, MutexGuard};

use tokio::sync::Notify;

use crate::error::LockPoisoned;

/// Thread-safe FIFO with an awaiting pop.
///
/// The mutex is never held across an `.await`; waiting happens on the
/// `Notify`, outside the lock.
#[derive(Debug)]
pub struct WorkQueue<T> {
    items: Mutex<VecDeque<T>>,
    available: Notify,
}

impl<T> WorkQueue<T> {
    pub fn new() -> Self {
        Self {
            items: Mutex::new(VecDeque::new()),
            available: Notify::new(),
        }
    }

    /// Appends an element at the tail and wakes a waiting popper.
    pub fn push(&self, item: T) -> Result<(), LockPoisoned> {
        self.lock()?.push_back(item);
        // Stores a permit when nobody is waiting, so the wake is never lost
        self.available.notify_one();
        Ok(())
    }

    /// Removes and returns the head, waiting until one exists.
    ///
    /// Cancel-safe: an element is only removed in the same poll that
    /// returns it.
    pub async fn pop(&self) -> Result<T, LockPoisoned> {
        loop {
            let notified = self.available.notified();
            tokio::pin!(notified);
            // Register interest before checking, so a push between the
            // check and the await still wakes us
            notified.as_mut().enable();

            let head = self.lock()?.pop_front();
            if let Some(item) = head {
                return Ok(item);
            }

            notified.await;
        }
    }

    pub fn len(&self) -> Result<usize, LockPoisoned> {
        Ok(self.lock()?.len())
    }

    pub fn is_empty(&self) -> Result<bool, LockPoisoned> {
        Ok(self.lock()?.is_empty())
    }

    fn lock(&self) -> Result<MutexGuard<'_, VecDeque<T>>, LockPoisoned> {
        self.items
            .lock()
            .map_err(|_| LockPoisoned::new("work queue"))
    }
}

impl<T> Default for WorkQueue<T> {
    fn default() -> Self {
        Self::new()
    }
}
