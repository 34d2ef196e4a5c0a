//! Decoding terminal payloads into domain events.

use atm_core::Event;
use chrono::Utc;
use thiserror::Error;

use crate::payload::EventPayload;

/// Maximum payload size accepted by default (4 KiB).
///
/// A report is a handful of numbers; anything larger is not a report.
pub const DEFAULT_MAX_PAYLOAD_BYTES: usize = 4096;

/// Decodes the bytes received from one terminal connection.
///
/// `Ok` means the payload is well-formed; any `Err` makes the server
/// drop the connection without touching health state or the log.
pub trait EventCodec: Send + Sync {
    fn decode(&self, payload: &[u8]) -> Result<Event, DecodeError>;
}

/// Codec for the newline-delimited JSON format described by [`EventPayload`].
#[derive(Debug, Clone)]
pub struct JsonEventCodec {
    max_payload_bytes: usize,
}

impl JsonEventCodec {
    /// `max_payload_bytes` bounds the report itself; one trailing `\n` or
    /// `\r\n` is not counted.
    pub fn new(max_payload_bytes: usize) -> Self {
        Self { max_payload_bytes }
    }
}

impl Default for JsonEventCodec {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_PAYLOAD_BYTES)
    }
}

impl EventCodec for JsonEventCodec {
    fn decode(&self, payload: &[u8]) -> Result<Event, DecodeError> {
        let payload = strip_line_terminator(payload);
        if payload.len() > self.max_payload_bytes {
            return Err(DecodeError::TooLarge {
                size: payload.len(),
                max: self.max_payload_bytes,
            });
        }

        let text = std::str::from_utf8(payload).map_err(|_| DecodeError::InvalidUtf8)?;
        let text = text.trim();
        if text.is_empty() {
            return Err(DecodeError::Empty);
        }

        let raw: EventPayload =
            serde_json::from_str(text).map_err(|e| DecodeError::Parse(e.to_string()))?;

        raw.to_event(Utc::now())
    }
}

fn strip_line_terminator(payload: &[u8]) -> &[u8] {
    payload
        .strip_suffix(b"\r\n")
        .or_else(|| payload.strip_suffix(b"\n"))
        .unwrap_or(payload)
}

/// Reasons a payload is considered malformed.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DecodeError {
    #[error("empty payload")]
    Empty,

    #[error("payload too large: {size} bytes (max: {max})")]
    TooLarge { size: usize, max: usize },

    #[error("payload is not valid UTF-8")]
    InvalidUtf8,

    #[error("parse error: {0}")]
    Parse(String),

    #[error("unknown event type code: {0}")]
    UnknownEventType(u16),
}
