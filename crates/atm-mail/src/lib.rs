//! ATM Mail - Operator notifications for alertable events
//!
//! The server hands every alertable event to an [`AlertTransport`]. The
//! production transport pipes a plain-text message into a
//! sendmail-compatible command, which relays it through the local MTA.
//! Delivery failures are reported to the caller and never retried here.

mod error;
mod message;
mod sendmail;

pub use error::MailError;
pub use message::AlertMessage;
pub use sendmail::{SendmailTransport, DEFAULT_MAIL_COMMAND, DEFAULT_RECIPIENT, DEFAULT_SENDER};

use async_trait::async_trait;

use atm_core::Event;

/// Sends one notification per alertable event.
#[async_trait]
pub trait AlertTransport: Send + Sync {
    async fn notify(&self, event: &Event) -> Result<(), MailError>;
}
