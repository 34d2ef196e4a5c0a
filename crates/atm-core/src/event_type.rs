//! Event type codes reported by terminals.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::error::EventTypeError;

/// Types of events a terminal can report.
///
/// Each variant carries a stable numeric code that travels on the wire
/// and in the persisted log. `ConnectionFailure` is never sent by a
/// terminal; the server synthesizes it when a terminal goes silent.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "u16", into = "u16")]
#[repr(u16)]
pub enum EventType {
    /// Liveness report only
    Heartbeat = 0,
    CommunicationOffline = 1,
    CommunicationError = 2,
    LowCash = 3,
    RunningOutOfNotes = 4,
    Empty = 5,
    ServiceModeEntered = 6,
    ServiceModeLeft = 7,
    DeviceDidNotAnswer = 8,
    ProtocolCancelled = 9,
    LowPaper = 10,
    PrinterError = 11,
    PaperOut = 12,
    /// Terminal stopped reporting (synthesized by the health sweep)
    ConnectionFailure = 13,
}

impl EventType {
    /// Every event type, in code order.
    pub const ALL: [EventType; 14] = [
        Self::Heartbeat,
        Self::CommunicationOffline,
        Self::CommunicationError,
        Self::LowCash,
        Self::RunningOutOfNotes,
        Self::Empty,
        Self::ServiceModeEntered,
        Self::ServiceModeLeft,
        Self::DeviceDidNotAnswer,
        Self::ProtocolCancelled,
        Self::LowPaper,
        Self::PrinterError,
        Self::PaperOut,
        Self::ConnectionFailure,
    ];

    /// Returns the numeric wire code.
    #[must_use]
    pub fn code(&self) -> u16 {
        *self as u16
    }

    /// Looks up an event type by its numeric code.
    pub fn from_code(code: u16) -> Option<Self> {
        Self::ALL.iter().copied().find(|t| t.code() == code)
    }

    /// Returns the human-readable label used in logs and alerts.
    #[must_use]
    pub fn label(&self) -> &'static str {
        match self {
            Self::Heartbeat => "Heartbeat",
            Self::CommunicationOffline => "Communication Offline",
            Self::CommunicationError => "Communication error",
            Self::LowCash => "Low Cash alert",
            Self::RunningOutOfNotes => "Running Out of notes in cassette",
            Self::Empty => "Empty",
            Self::ServiceModeEntered => "Service mode entered",
            Self::ServiceModeLeft => "Service mode left",
            Self::DeviceDidNotAnswer => "Device did not answer as expected",
            Self::ProtocolCancelled => "The protocol was cancelled",
            Self::LowPaper => "Low Paper warning",
            Self::PrinterError => "Printer error",
            Self::PaperOut => "Paper-out condition",
            Self::ConnectionFailure => "Connection failure",
        }
    }

    /// Returns true for liveness-only events.
    #[must_use]
    pub fn is_heartbeat(&self) -> bool {
        matches!(self, Self::Heartbeat)
    }
}

impl TryFrom<u16> for EventType {
    type Error = EventTypeError;

    fn try_from(code: u16) -> Result<Self, Self::Error> {
        Self::from_code(code).ok_or(EventTypeError::UnknownCode { code })
    }
}

impl From<EventType> for u16 {
    fn from(event_type: EventType) -> Self {
        event_type.code()
    }
}

impl fmt::Display for EventType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.label())
    }
}
