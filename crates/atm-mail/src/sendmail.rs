//! Alert delivery through a sendmail-compatible command.
//!
//! The message is written to the command's stdin; recipients come from
//! the `To:` header (`sendmail -t`). Any command that reads a message on
//! stdin and exits zero on success can be configured instead.

use std::process::Stdio;
use std::time::Duration;

use async_trait::async_trait;
use tokio::io::AsyncWriteExt;
use tokio::process::Command;
use tokio::time::timeout;
use tracing::debug;

use atm_core::Event;

use crate::{AlertMessage, AlertTransport, MailError};

/// Recipient used when the configuration names none.
pub const DEFAULT_RECIPIENT: &str = "operator@localhost";

/// Sender address used when the configuration names none.
pub const DEFAULT_SENDER: &str = "atmd@localhost";

/// Command used when the configuration names none.
pub const DEFAULT_MAIL_COMMAND: &[&str] = &["sendmail", "-t"];

/// Upper bound on one delivery (spawn, write, wait).
const DELIVERY_TIMEOUT: Duration = Duration::from_secs(30);

/// Transport that pipes each alert into an external mail command.
#[derive(Debug, Clone)]
pub struct SendmailTransport {
    program: String,
    args: Vec<String>,
    sender: String,
    recipient: String,
}

impl SendmailTransport {
    /// Creates a transport.
    ///
    /// # Arguments
    ///
    /// * `command` - Program followed by its arguments
    /// * `sender` - `From:` address
    /// * `recipient` - `To:` address (the operator)
    pub fn new(
        command: &[String],
        sender: impl Into<String>,
        recipient: impl Into<String>,
    ) -> Result<Self, MailError> {
        let (program, args) = command.split_first().ok_or(MailError::EmptyCommand)?;
        if program.trim().is_empty() {
            return Err(MailError::EmptyCommand);
        }

        Ok(Self {
            program: program.clone(),
            args: args.to_vec(),
            sender: sender.into(),
            recipient: recipient.into(),
        })
    }

    async fn deliver(&self, message: &AlertMessage) -> Result<(), MailError> {
        let mut child = Command::new(&self.program)
            .args(&self.args)
            .stdin(Stdio::piped())
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| MailError::Spawn {
                program: self.program.clone(),
                error: e.to_string(),
            })?;

        if let Some(mut stdin) = child.stdin.take() {
            stdin
                .write_all(message.render().as_bytes())
                .await
                .map_err(|e| self.io_error(e))?;
            // Dropping stdin closes the pipe so the command sees EOF
        }

        let output = child.wait_with_output().await.map_err(|e| self.io_error(e))?;

        if !output.status.success() {
            return Err(MailError::CommandFailed {
                program: self.program.clone(),
                status: output.status.to_string(),
                stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            });
        }

        Ok(())
    }

    fn io_error(&self, error: std::io::Error) -> MailError {
        MailError::Io {
            program: self.program.clone(),
            error: error.to_string(),
        }
    }
}

#[async_trait]
impl AlertTransport for SendmailTransport {
    async fn notify(&self, event: &Event) -> Result<(), MailError> {
        let message = AlertMessage::for_event(event, &self.sender, &self.recipient);

        match timeout(DELIVERY_TIMEOUT, self.deliver(&message)).await {
            Ok(Ok(())) => {
                debug!(
                    origin = %event.origin(),
                    code = event.event_type().code(),
                    recipient = %self.recipient,
                    "Alert handed to mail command"
                );
                Ok(())
            }
            Ok(Err(e)) => Err(e),
            Err(_) => Err(MailError::Timeout {
                program: self.program.clone(),
                secs: DELIVERY_TIMEOUT.as_secs(),
            }),
        }
    }
}
