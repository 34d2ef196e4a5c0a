//! Plain-text alert message.

use atm_core::Event;

/// An RFC 5322 style message describing one alertable event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AlertMessage {
    pub from: String,
    pub to: String,
    pub subject: String,
    pub body: String,
}

impl AlertMessage {
    /// Builds the notification for an event.
    pub fn for_event(event: &Event, from: &str, to: &str) -> Self {
        let event_type = event.event_type();
        let subject = format!("ATM {}: {}", event.origin(), event_type.label());
        let body = format!(
            "Terminal: {}\nCode: {}\nDescription: {}\nTimestamp: {}\nSerial: {}\n",
            event.origin(),
            event_type.code(),
            event_type.label(),
            event.timestamp().to_rfc3339(),
            event.serial()
        );

        Self {
            from: from.to_string(),
            to: to.to_string(),
            subject,
            body,
        }
    }

    /// Renders headers and body, ready to be piped into `sendmail -t`.
    pub fn render(&self) -> String {
        format!(
            "From: {}\nTo: {}\nSubject: {}\nContent-Type: text/plain; charset=utf-8\n\n{}",
            self.from, self.to, self.subject, self.body
        )
    }
}
