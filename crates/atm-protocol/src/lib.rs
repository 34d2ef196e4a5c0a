//! ATM Protocol - Wire format for terminal reports
//!
//! A terminal connects, writes one JSON object (newline-terminated or
//! followed by closing its write half) and the server closes the
//! connection once the event is processed. This crate owns that payload,
//! the codec that validates it, and the line format of the persisted log.

pub mod codec;
pub mod logline;
pub mod payload;

pub use codec::{DecodeError, EventCodec, JsonEventCodec, DEFAULT_MAX_PAYLOAD_BYTES};
pub use logline::{format_log_line, LOG_TIMESTAMP_FORMAT};
pub use payload::EventPayload;
