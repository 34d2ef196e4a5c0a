//! Synchronization failures shared by the server's owned state objects.

use thiserror::Error;

/// A mutex guarding shared server state was poisoned.
///
/// Raised when a thread panicked while holding the lock. The state behind
/// it can no longer be trusted, so every caller escalates this to a
/// server-wide shutdown instead of recovering in place.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("{resource} lock poisoned")]
pub struct LockPoisoned {
    /// Which shared resource the lock protects
    pub resource: &'static str,
}

impl LockPoisoned {
    pub const fn new(resource: &'static str) -> Self {
        Self { resource }
    }
}
