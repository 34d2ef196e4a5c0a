//! ATM Daemon - Central monitoring server for remote terminals
//!
//! This crate provides the core infrastructure of the central server:
//! - `server` - Listeners, the multiplexer loop and the worker pool
//! - `queue` - Work queue between the multiplexer and the workers
//! - `health` - Per-terminal liveness tracking and failure detection
//! - `log` - Persisted event log
//! - `config` - Runtime configuration (defaults, TOML file, CLI)
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                      atmd server                            │
//! ├─────────────────────────────────────────────────────────────┤
//! │                                                             │
//! │  ┌─────────────────┐     ┌─────────────────────────────┐   │
//! │  │  Multiplexer    │────▶│     WorkQueue               │   │
//! │  │ (TCP listeners) │     │  (readable listeners)       │   │
//! │  └────────┬────────┘     └──────────────┬──────────────┘   │
//! │           │                             │                   │
//! │           │ sweep                       │ pop               │
//! │           ▼                             ▼                   │
//! │  ┌─────────────────┐     ┌─────────────────────────────┐   │
//! │  │  HealthTracker  │◀────│   Worker pool (N tasks)     │   │
//! │  │ (last seen)     │     │   log + alert per event     │   │
//! │  └─────────────────┘     └─────────────────────────────┘   │
//! │                                                             │
//! └─────────────────────────────────────────────────────────────┘
//! ```
//!
//! # Panic-Free Guarantees
//!
//! All production code in this crate follows the panic-free policy:
//! - No `.unwrap()`, `.expect()`, `panic!()`, `unreachable!()`, `todo!()`
//! - All fallible operations return `Result` or `Option`
//! - A poisoned lock is reported as an error and stops the server

pub mod config;
pub mod error;
pub mod health;
pub mod log;
pub mod queue;
pub mod server;

pub use config::{ConfigError, FileConfig, ServerConfig};
pub use error::LockPoisoned;
pub use health::HealthTracker;
pub use log::{FileLogWriter, LogError, LogWriter};
pub use queue::WorkQueue;
pub use server::{Server, ServerError};
