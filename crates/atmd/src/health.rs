//! Connection health tracking for reporting terminals.
//!
//! One record per origin holds the instant of its last valid event.
//! Workers refresh records as events arrive; the multiplexer sweeps the
//! set on every wake-up and evicts terminals that have been silent for
//! longer than the threshold, producing one `ConnectionFailure` event per
//! eviction.
//!
//! # Panic-Free Guarantees
//!
//! This module follows the panic-free policy:
//! - No `.unwrap()`, `.expect()`, `panic!()`, `unreachable!()`, `todo!()`
//! - A poisoned mutex surfaces as [`LockPoisoned`] for the caller to escalate

use std::collections::hash_map::Entry;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Mutex, MutexGuard};
use std::time::Duration;

use chrono::Utc;
use tokio::time::Instant;

use atm_core::{Event, OriginId};

use crate::error::LockPoisoned;

/// Default silence allowed before a terminal is declared disconnected.
pub const DEFAULT_HEALTH_THRESHOLD: Duration = Duration::from_secs(30);

/// Tracks the last-seen instant of every live terminal.
///
/// # Ownership
///
/// The tracker exclusively owns the record set; nothing else mutates it.
/// The lock is held only while touching the map, never while logging the
/// events a sweep produces.
#[derive(Debug)]
pub struct HealthTracker {
    records: Mutex<HashMap<OriginId, Instant>>,
    threshold: Duration,
    /// Serial source for synthesized failure events (starts at 1, never reset)
    failure_serial: AtomicU64,
}

impl HealthTracker {
    pub fn new(threshold: Duration) -> Self {
        Self {
            records: Mutex::new(HashMap::new()),
            threshold,
            failure_serial: AtomicU64::new(0),
        }
    }

    pub fn threshold(&self) -> Duration {
        self.threshold
    }

    /// Records a valid event from `origin` at `now`.
    ///
    /// Find-or-insert: refreshes the existing record or creates one.
    /// Returns true if the origin was not tracked before.
    pub fn update(&self, origin: OriginId, now: Instant) -> Result<bool, LockPoisoned> {
        let mut records = self.lock()?;
        match records.entry(origin) {
            Entry::Occupied(mut entry) => {
                entry.insert(now);
                Ok(false)
            }
            Entry::Vacant(entry) => {
                entry.insert(now);
                Ok(true)
            }
        }
    }

    /// Evicts every origin silent for longer than the threshold.
    ///
    /// Returns one `ConnectionFailure` event per evicted origin, in no
    /// particular order. A second sweep right after finds nothing for the
    /// same origins because their records are gone.
    pub fn sweep(&self, now: Instant) -> Result<Vec<Event>, LockPoisoned> {
        let mut expired = Vec::new();
        {
            let mut records = self.lock()?;
            records.retain(|origin, last_seen| {
                let alive = now.saturating_duration_since(*last_seen) <= self.threshold;
                if !alive {
                    expired.push(*origin);
                }
                alive
            });
        }

        let timestamp = Utc::now();
        Ok(expired
            .into_iter()
            .map(|origin| Event::connection_failure(origin, timestamp, self.next_failure_serial()))
            .collect())
    }

    /// Returns when `origin` last reported, if it is tracked.
    pub fn last_seen(&self, origin: OriginId) -> Result<Option<Instant>, LockPoisoned> {
        Ok(self.lock()?.get(&origin).copied())
    }

    /// Returns the number of tracked terminals.
    pub fn len(&self) -> Result<usize, LockPoisoned> {
        Ok(self.lock()?.len())
    }

    pub fn is_empty(&self) -> Result<bool, LockPoisoned> {
        Ok(self.lock()?.is_empty())
    }

    fn next_failure_serial(&self) -> u64 {
        self.failure_serial.fetch_add(1, Ordering::Relaxed) + 1
    }

    fn lock(&self) -> Result<MutexGuard<'_, HashMap<OriginId, Instant>>, LockPoisoned> {
        self.records
            .lock()
            .map_err(|_| LockPoisoned::new("health records"))
    }
}

impl Default for HealthTracker {
    fn default() -> Self {
        Self::new(DEFAULT_HEALTH_THRESHOLD)
    }
}
