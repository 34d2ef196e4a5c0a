//! TCP server for terminal reports.
//!
//! The server:
//! - Binds one non-blocking listener per resolved IPv4 address
//! - Runs one multiplexer task that detects pending connections
//! - Runs a fixed pool of workers that accept and process them
//! - Supports graceful shutdown via CancellationToken
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────┐   readable    ┌─────────────────┐
//! │   Multiplexer   │──────────────▶│    WorkQueue    │
//! │ (single task)   │               │  (listeners)    │
//! └───────┬─────────┘               └───────┬─────────┘
//!         │ sweep                     pop() │
//!         ▼                                 ▼
//! ┌─────────────────┐   update      ┌─────────────────┐
//! │  HealthTracker  │◀──────────────│  Worker × N     │
//! └─────────────────┘               │ accept → decode │
//!                                   └───────┬─────────┘
//!                                           │
//!                         ┌─────────────────┴──┐
//!                         ▼                    ▼
//!                  ┌─────────────┐     ┌───────────────┐
//!                  │  LogWriter  │     │AlertTransport │
//!                  └─────────────┘     └───────────────┘
//! ```
//!
//! # Panic-Free Guarantees
//!
//! This module follows the panic-free policy:
//! - No `.unwrap()`, `.expect()`, `panic!()`, `unreachable!()`, `todo!()`
//! - All fallible operations use `?` or pattern matching
//! - Per-connection errors are logged and the worker moves on

mod listener;
mod multiplexer;
mod worker;

pub use listener::{bind_listeners, ListenerHandle, DEFAULT_BACKLOG};
pub use multiplexer::Multiplexer;
pub use worker::{Outcome, Worker, WorkerContext};

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::Notify;
use tokio::task::{JoinError, JoinSet};
use tokio::time::timeout;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use atm_core::AlertPolicy;
use atm_mail::AlertTransport;
use atm_protocol::JsonEventCodec;

use crate::config::ServerConfig;
use crate::error::LockPoisoned;
use crate::health::HealthTracker;
use crate::log::LogWriter;
use crate::queue::WorkQueue;

/// How long tasks get to finish in-flight work after shutdown starts.
const SHUTDOWN_GRACE: Duration = Duration::from_secs(5);

/// The central server: listeners bound, tasks not yet started.
pub struct Server {
    listeners: Vec<Arc<ListenerHandle>>,
    queue: Arc<WorkQueue<Arc<ListenerHandle>>>,
    tracker: Arc<HealthTracker>,
    log: Arc<dyn LogWriter>,
    transport: Arc<dyn AlertTransport>,
    policy: Arc<AlertPolicy>,
    rearm: Arc<Notify>,
    workers: usize,
    select_timeout: Duration,
    max_payload_bytes: usize,

    /// Cancellation token for graceful shutdown
    cancel_token: CancellationToken,
}

impl Server {
    /// Binds the listeners described by `config`.
    ///
    /// # Arguments
    ///
    /// * `config` - Resolved server configuration
    /// * `log` - Sink for persisted events
    /// * `transport` - Delivery for alertable events
    /// * `cancel_token` - Token for graceful shutdown
    pub async fn bind(
        config: &ServerConfig,
        log: Arc<dyn LogWriter>,
        transport: Arc<dyn AlertTransport>,
        cancel_token: CancellationToken,
    ) -> Result<Self, ServerError> {
        if config.workers == 0 {
            return Err(ServerError::WorkerPool {
                reason: "no workers configured".to_string(),
            });
        }

        let rearm = Arc::new(Notify::new());
        let listeners = bind_listeners(
            &config.bind_host,
            config.port,
            config.backlog,
            Arc::clone(&rearm),
        )
        .await?;

        Ok(Self {
            listeners,
            queue: Arc::new(WorkQueue::new()),
            tracker: Arc::new(HealthTracker::new(config.health_threshold)),
            log,
            transport,
            policy: Arc::new(config.alert_policy.clone()),
            rearm,
            workers: config.workers,
            select_timeout: config.select_timeout,
            max_payload_bytes: config.max_payload_bytes,
            cancel_token,
        })
    }

    /// Returns the bound addresses (with the actual port when 0 was requested).
    pub fn local_addrs(&self) -> Vec<SocketAddr> {
        self.listeners.iter().map(|l| l.local_addr()).collect()
    }

    /// Runs the multiplexer and the worker pool.
    ///
    /// Does not return until the cancellation token is triggered or a task
    /// fails fatally. In the latter case every other task is cancelled and
    /// the first fatal error is returned.
    pub async fn run(self) -> Result<(), ServerError> {
        let mut tasks = JoinSet::new();

        tasks.spawn(
            Multiplexer {
                listeners: self.listeners.clone(),
                queue: Arc::clone(&self.queue),
                tracker: Arc::clone(&self.tracker),
                log: Arc::clone(&self.log),
                policy: Arc::clone(&self.policy),
                transport: Arc::clone(&self.transport),
                rearm: Arc::clone(&self.rearm),
                select_timeout: self.select_timeout,
                cancel_token: self.cancel_token.clone(),
            }
            .run(),
        );

        let ctx = Arc::new(WorkerContext {
            queue: Arc::clone(&self.queue),
            tracker: Arc::clone(&self.tracker),
            log: Arc::clone(&self.log),
            codec: Arc::new(JsonEventCodec::new(self.max_payload_bytes)),
            policy: Arc::clone(&self.policy),
            transport: Arc::clone(&self.transport),
            max_payload_bytes: self.max_payload_bytes,
        });
        for id in 0..self.workers {
            tasks.spawn(Worker::new(id, Arc::clone(&ctx), self.cancel_token.clone()).run());
        }

        info!(
            addrs = ?self.local_addrs(),
            workers = self.workers,
            "Server running"
        );

        let mut first_error = None;

        loop {
            tokio::select! {
                _ = self.cancel_token.cancelled() => {
                    info!("Server shutdown requested");
                    break;
                }
                joined = tasks.join_next() => match joined {
                    Some(joined) => self.settle(joined, &mut first_error),
                    None => break,
                },
            }
        }

        let drained = timeout(SHUTDOWN_GRACE, async {
            while let Some(joined) = tasks.join_next().await {
                self.settle(joined, &mut first_error);
            }
        })
        .await;
        if drained.is_err() {
            warn!(
                remaining = tasks.len(),
                grace_secs = SHUTDOWN_GRACE.as_secs(),
                "Tasks still busy after shutdown grace period, aborting"
            );
            tasks.shutdown().await;
        }

        info!("Server stopped");
        first_error.map_or(Ok(()), Err)
    }

    /// Records the result of a finished task; fatal errors start shutdown.
    fn settle(
        &self,
        joined: Result<Result<(), ServerError>, JoinError>,
        first_error: &mut Option<ServerError>,
    ) {
        let result = joined.unwrap_or_else(|e| {
            Err(ServerError::WorkerPool {
                reason: format!("task failed: {e}"),
            })
        });

        if let Err(e) = result {
            error!(error = %e, "Fatal server error, shutting down");
            if first_error.is_none() {
                *first_error = Some(e);
            }
            self.cancel_token.cancel();
        }
    }
}

/// Errors that stop the server.
#[derive(Debug, thiserror::Error)]
pub enum ServerError {
    #[error("Failed to resolve {host}:{port}: {error}")]
    Resolve { host: String, port: u16, error: String },

    #[error("No IPv4 address of {host} could be bound on port {port}")]
    NoListeners { host: String, port: u16 },

    #[error("Worker pool failure: {reason}")]
    WorkerPool { reason: String },

    #[error("Accept failed on {addr}: {error}")]
    Accept { addr: SocketAddr, error: String },

    #[error("Readiness wait failed: {error}")]
    Readiness { error: String },

    #[error(transparent)]
    LockPoisoned(#[from] LockPoisoned),
}
