//! The producer loop.
//!
//! Waits (bounded by the select timeout) until some watched listener has a
//! pending connection or a worker hands a listener back, sweeps connection
//! health on every wake-up, then queues each readable listener once.

use std::future::poll_fn;
use std::io;
use std::sync::Arc;
use std::task::Poll;
use std::time::Duration;

use futures::FutureExt;
use tokio::sync::Notify;
use tokio::task::JoinSet;
use tokio::time::{sleep, timeout, Instant};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use atm_core::AlertPolicy;
use atm_mail::AlertTransport;

use super::listener::ListenerHandle;
use super::worker::send_alert;
use super::ServerError;
use crate::health::HealthTracker;
use crate::log::{persist, LogWriter};
use crate::queue::WorkQueue;

/// How long in-flight failure alerts may run after shutdown starts.
///
/// Stays below the server's shutdown grace period so the multiplexer
/// finishes before it is aborted.
const ALERT_DRAIN_TIMEOUT: Duration = Duration::from_secs(4);

pub struct Multiplexer {
    pub(crate) listeners: Vec<Arc<ListenerHandle>>,
    pub(crate) queue: Arc<WorkQueue<Arc<ListenerHandle>>>,
    pub(crate) tracker: Arc<HealthTracker>,
    pub(crate) log: Arc<dyn LogWriter>,
    pub(crate) policy: Arc<AlertPolicy>,
    pub(crate) transport: Arc<dyn AlertTransport>,
    pub(crate) rearm: Arc<Notify>,
    pub(crate) select_timeout: Duration,
    pub(crate) cancel_token: CancellationToken,
}

impl Multiplexer {
    /// Runs until cancelled or a fatal error occurs.
    pub async fn run(self) -> Result<(), ServerError> {
        info!(
            listeners = self.listeners.len(),
            select_timeout_ms = millis(self.select_timeout),
            health_threshold_ms = millis(self.tracker.threshold()),
            "Multiplexer started"
        );

        let mut alerts = JoinSet::new();

        loop {
            let readable = tokio::select! {
                biased;
                _ = self.cancel_token.cancelled() => break,
                ready = wait_readable(&self.listeners) => {
                    ready.map_err(|e| {
                        error!(error = %e, "Readiness wait failed");
                        ServerError::Readiness { error: e.to_string() }
                    })?
                }
                _ = self.rearm.notified() => Vec::new(),
                _ = sleep(self.select_timeout) => Vec::new(),
            };

            self.sweep(&mut alerts)?;

            for handle in readable {
                if handle.mark_queued() {
                    self.queue.push(handle)?;
                }
            }

            // Reap finished alerts
            while let Some(Some(_)) = alerts.join_next().now_or_never() {}
        }

        drain_alerts(&mut alerts).await;
        debug!("Multiplexer stopped");
        Ok(())
    }

    /// Evicts silent terminals and records a failure event for each.
    fn sweep(&self, alerts: &mut JoinSet<()>) -> Result<(), ServerError> {
        for event in self.tracker.sweep(Instant::now())? {
            warn!(
                origin = %event.origin(),
                serial = event.serial(),
                "Terminal declared disconnected"
            );
            persist(self.log.as_ref(), &event)?;

            if self.policy.is_alertable(event.event_type()) {
                // Never block the loop on mail delivery
                let transport = Arc::clone(&self.transport);
                alerts.spawn(async move {
                    send_alert(transport.as_ref(), &event).await;
                });
            }
        }
        Ok(())
    }
}

/// Waits for in-flight alerts, abandoning them after [`ALERT_DRAIN_TIMEOUT`].
async fn drain_alerts(alerts: &mut JoinSet<()>) {
    if alerts.is_empty() {
        return;
    }

    let pending = alerts.len();
    let drained = timeout(ALERT_DRAIN_TIMEOUT, async {
        while alerts.join_next().await.is_some() {}
    })
    .await;
    if drained.is_err() {
        warn!(
            pending,
            abandoned = alerts.len(),
            "Connection failure alerts still in flight at shutdown, abandoning"
        );
        alerts.shutdown().await;
    }
}

fn millis(duration: Duration) -> u64 {
    u64::try_from(duration.as_millis()).unwrap_or(u64::MAX)
}

/// Resolves with every unqueued listener that is currently readable.
///
/// Stays pending while nothing is readable, including when every listener
/// is queued.
async fn wait_readable(listeners: &[Arc<ListenerHandle>]) -> io::Result<Vec<Arc<ListenerHandle>>> {
    poll_fn(|cx| {
        let mut ready = Vec::new();
        for handle in listeners.iter().filter(|h| !h.is_queued()) {
            match handle.poll_read_ready(cx) {
                Poll::Ready(Ok(())) => ready.push(Arc::clone(handle)),
                Poll::Ready(Err(e)) => return Poll::Ready(Err(e)),
                Poll::Pending => {}
            }
        }

        if ready.is_empty() {
            Poll::Pending
        } else {
            Poll::Ready(Ok(ready))
        }
    })
    .await
}
