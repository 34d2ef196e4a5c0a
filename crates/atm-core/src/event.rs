//! Terminal identities and the events they report.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::EventType;

// ============================================================================
// Type-Safe Identifiers
// ============================================================================

/// Integer identity of a remote terminal.
///
/// The unit tracked by the health tracker: one health record per origin.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct OriginId(u32);

impl OriginId {
    pub const fn new(id: u32) -> Self {
        Self(id)
    }

    /// Returns the raw numeric id.
    pub const fn get(&self) -> u32 {
        self.0
    }
}

impl fmt::Display for OriginId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<u32> for OriginId {
    fn from(id: u32) -> Self {
        Self(id)
    }
}

// ============================================================================
// Event
// ============================================================================

/// A single report from (or about) a terminal.
///
/// Events come from decoding a client payload or are synthesized by the
/// health sweep when a terminal goes silent. Fields are private so an
/// event cannot change after construction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Event {
    origin: OriginId,
    timestamp: DateTime<Utc>,
    event_type: EventType,
    serial: u64,
}

impl Event {
    pub fn new(
        origin: OriginId,
        timestamp: DateTime<Utc>,
        event_type: EventType,
        serial: u64,
    ) -> Self {
        Self {
            origin,
            timestamp,
            event_type,
            serial,
        }
    }

    /// Builds the event emitted when a terminal is declared disconnected.
    pub fn connection_failure(origin: OriginId, timestamp: DateTime<Utc>, serial: u64) -> Self {
        Self::new(origin, timestamp, EventType::ConnectionFailure, serial)
    }

    pub fn origin(&self) -> OriginId {
        self.origin
    }

    pub fn timestamp(&self) -> DateTime<Utc> {
        self.timestamp
    }

    pub fn event_type(&self) -> EventType {
        self.event_type
    }

    pub fn serial(&self) -> u64 {
        self.serial
    }

    /// Returns true if this event only signals liveness.
    #[must_use]
    pub fn is_heartbeat(&self) -> bool {
        self.event_type.is_heartbeat()
    }
}

impl fmt::Display for Event {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "#{} origin={} type={} ({})",
            self.serial,
            self.origin,
            self.event_type.code(),
            self.event_type
        )
    }
}
