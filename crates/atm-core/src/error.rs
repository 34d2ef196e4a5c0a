//! Domain-specific error types following panic-free policy.

use thiserror::Error;

/// Errors raised while interpreting event type codes.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum EventTypeError {
    /// The numeric code does not name any known event type
    #[error("Unknown event type code: {code}")]
    UnknownCode { code: u16 },
}
