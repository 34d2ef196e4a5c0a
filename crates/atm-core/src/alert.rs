//! Operator-configured set of event types that trigger notifications.

use std::collections::HashSet;

use crate::{EventType, EventTypeError};

/// The alert pattern set.
///
/// Built once at startup and read-only afterwards, so it is shared
/// between workers without a lock. An empty policy alerts on nothing.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AlertPolicy {
    alertable: HashSet<EventType>,
}

impl AlertPolicy {
    pub fn new(types: impl IntoIterator<Item = EventType>) -> Self {
        Self {
            alertable: types.into_iter().collect(),
        }
    }

    /// Builds a policy from raw numeric codes, rejecting unknown ones.
    pub fn from_codes(codes: &[u16]) -> Result<Self, EventTypeError> {
        let types = codes
            .iter()
            .map(|&code| EventType::try_from(code))
            .collect::<Result<HashSet<_>, _>>()?;
        Ok(Self { alertable: types })
    }

    /// Returns true if events of this type must be sent to the operator.
    pub fn is_alertable(&self, event_type: EventType) -> bool {
        self.alertable.contains(&event_type)
    }

    pub fn is_empty(&self) -> bool {
        self.alertable.is_empty()
    }

    pub fn len(&self) -> usize {
        self.alertable.len()
    }

    /// Returns the configured codes in ascending order.
    pub fn codes(&self) -> Vec<u16> {
        let mut codes: Vec<u16> = self.alertable.iter().map(EventType::code).collect();
        codes.sort_unstable();
        codes
    }
}
