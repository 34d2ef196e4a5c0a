//! ATM Core - Shared types for terminal monitoring
//!
//! This crate provides the domain types shared between the central
//! server (atmd), the wire protocol and the alert transport.
//!
//! All code follows the panic-free policy: no `.unwrap()`, `.expect()`,
//! `panic!()`, `unreachable!()`, `todo!()`, or direct indexing `[i]`.

pub mod alert;
pub mod error;
pub mod event;
pub mod event_type;

// Re-exports for convenience
pub use alert::AlertPolicy;
pub use error::EventTypeError;
pub use event::{Event, OriginId};
pub use event_type::EventType;
