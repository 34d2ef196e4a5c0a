//! Raw JSON structure sent by terminals.

use atm_core::{Event, EventType, OriginId};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::codec::DecodeError;

/// Raw event report as it appears on the wire.
///
/// The event type is kept as a bare number here so that an unknown code
/// surfaces as a typed [`DecodeError::UnknownEventType`] instead of a
/// generic JSON error. `timestamp` is optional; the receive time is used
/// when a terminal does not send one.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EventPayload {
    pub origin: u32,
    #[serde(rename = "type")]
    pub event_type: u16,
    pub serial: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<DateTime<Utc>>,
}

impl EventPayload {
    /// Creates a payload without a timestamp.
    pub fn new(origin: OriginId, event_type: EventType, serial: u64) -> Self {
        Self {
            origin: origin.get(),
            event_type: event_type.code(),
            serial,
            timestamp: None,
        }
    }

    /// Sets the terminal-side timestamp.
    #[must_use]
    pub fn with_timestamp(mut self, timestamp: DateTime<Utc>) -> Self {
        self.timestamp = Some(timestamp);
        self
    }

    /// Converts to a domain event.
    ///
    /// `received_at` fills in the timestamp when the payload lacks one.
    pub fn to_event(&self, received_at: DateTime<Utc>) -> Result<Event, DecodeError> {
        let event_type = EventType::from_code(self.event_type)
            .ok_or(DecodeError::UnknownEventType(self.event_type))?;

        Ok(Event::new(
            OriginId::new(self.origin),
            self.timestamp.unwrap_or(received_at),
            event_type,
            self.serial,
        ))
    }

    /// Serializes to a single newline-terminated line, ready to write.
    pub fn to_line(&self) -> Result<String, serde_json::Error> {
        let mut line = serde_json::to_string(self)?;
        line.push('\n');
        Ok(line)
    }
}

impl From<&Event> for EventPayload {
    fn from(event: &Event) -> Self {
        Self::new(event.origin(), event.event_type(), event.serial())
            .with_timestamp(event.timestamp())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_wire_field_names() {
        let payload = EventPayload::new(OriginId::new(17), EventType::ServiceModeLeft, 42);
        let json = serde_json::to_value(&payload).unwrap();
        assert_eq!(json, serde_json::json!({"origin": 17, "type": 7, "serial": 42}));
    }

    #[test]
    fn test_to_event_uses_receive_time_when_missing() {
        let received = Utc.with_ymd_and_hms(2026, 10, 14, 7, 15, 0).unwrap();
        let payload = EventPayload::new(OriginId::new(5), EventType::LowCash, 1);

        let event = payload.to_event(received).unwrap();
        assert_eq!(event.timestamp(), received);
        assert_eq!(event.event_type(), EventType::LowCash);
    }

    #[test]
    fn test_to_event_keeps_terminal_timestamp() {
        let sent = Utc.with_ymd_and_hms(2026, 1, 2, 3, 4, 5).unwrap();
        let payload =
            EventPayload::new(OriginId::new(5), EventType::LowCash, 1).with_timestamp(sent);

        let event = payload.to_event(Utc::now()).unwrap();
        assert_eq!(event.timestamp(), sent);
    }

    #[test]
    fn test_to_event_rejects_unknown_type() {
        let payload = EventPayload {
            origin: 1,
            event_type: 500,
            serial: 1,
            timestamp: None,
        };
        assert!(matches!(
            payload.to_event(Utc::now()),
            Err(DecodeError::UnknownEventType(500))
        ));
    }

    #[test]
    fn test_from_event_carries_timestamp() {
        let sent = Utc.with_ymd_and_hms(2026, 10, 14, 7, 15, 0).unwrap();
        let event = Event::new(OriginId::new(17), sent, EventType::ServiceModeLeft, 42);

        let payload = EventPayload::from(&event);
        assert_eq!(payload.origin, 17);
        assert_eq!(payload.event_type, 7);
        assert_eq!(payload.timestamp, Some(sent));
        assert_eq!(payload.to_event(Utc::now()).unwrap(), event);
    }

    #[test]
    fn test_to_line_is_newline_terminated() {
        let line = EventPayload::new(OriginId::new(1), EventType::Heartbeat, 9)
            .to_line()
            .unwrap();
        assert!(line.ends_with('\n'));
        assert_eq!(line.matches('\n').count(), 1);
    }
}
