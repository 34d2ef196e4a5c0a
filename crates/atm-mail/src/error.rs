//! Mail transport errors.

use thiserror::Error;

/// Errors that can occur while delivering an alert.
#[derive(Debug, Error)]
pub enum MailError {
    #[error("mail command is empty")]
    EmptyCommand,

    #[error("Failed to start mail command '{program}': {error}")]
    Spawn { program: String, error: String },

    #[error("I/O error talking to mail command '{program}': {error}")]
    Io { program: String, error: String },

    #[error("Mail command '{program}' failed ({status}): {stderr}")]
    CommandFailed {
        program: String,
        status: String,
        stderr: String,
    },

    #[error("Mail command '{program}' timed out after {secs}s")]
    Timeout { program: String, secs: u64 },
}
