//! Line format of the persisted event log.

use atm_core::Event;

/// Timestamp layout used in log lines.
pub const LOG_TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// Formats one event as a log line (without trailing newline).
///
/// Field order is fixed: serial, timestamp, origin, numeric code, label.
pub fn format_log_line(event: &Event) -> String {
    let event_type = event.event_type();
    format!(
        "{} | {} | {} | {} | {}",
        event.serial(),
        event.timestamp().format(LOG_TIMESTAMP_FORMAT),
        event.origin(),
        event_type.code(),
        event_type.label()
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use atm_core::{EventType, OriginId};
    use chrono::{TimeZone, Utc};

    #[test]
    fn test_format_log_line() {
        let timestamp = Utc.with_ymd_and_hms(2026, 10, 14, 7, 15, 3).unwrap();
        let event = Event::new(OriginId::new(17), timestamp, EventType::ServiceModeLeft, 42);

        assert_eq!(
            format_log_line(&event),
            "42 | 2026-10-14 07:15:03 | 17 | 7 | Service mode left"
        );
    }

    #[test]
    fn test_format_connection_failure() {
        let timestamp = Utc.with_ymd_and_hms(2026, 1, 1, 0, 0, 0).unwrap();
        let event = Event::connection_failure(OriginId::new(3), timestamp, 1);

        let line = format_log_line(&event);
        assert!(line.ends_with("| 3 | 13 | Connection failure"));
        assert!(!line.contains('\n'));
    }
}
