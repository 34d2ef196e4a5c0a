//! Worker pool: the consumer side of the work queue.
//!
//! A worker pops a readable listener, accepts one client from it, releases
//! the listener, then reads, decodes and processes that client's single
//! report. A slow client only ever occupies the worker serving it.

use std::io;
use std::net::SocketAddr;
use std::sync::Arc;

use tokio::io::{AsyncBufReadExt, AsyncReadExt, AsyncWriteExt, BufReader};
use tokio::net::TcpStream;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, trace, warn};

use atm_core::{AlertPolicy, Event};
use atm_mail::AlertTransport;
use atm_protocol::{DecodeError, EventCodec};

use super::listener::ListenerHandle;
use super::ServerError;
use crate::health::HealthTracker;
use crate::log::{persist, LogWriter};
use crate::queue::WorkQueue;

/// State shared by every worker. Each field carries its own locking.
pub struct WorkerContext {
    pub queue: Arc<WorkQueue<Arc<ListenerHandle>>>,
    pub tracker: Arc<HealthTracker>,
    pub log: Arc<dyn LogWriter>,
    pub codec: Arc<dyn EventCodec>,
    pub policy: Arc<AlertPolicy>,
    pub transport: Arc<dyn AlertTransport>,
    pub max_payload_bytes: usize,
}

/// What happened to one client payload.
#[derive(Debug)]
pub enum Outcome {
    /// Malformed; nothing was recorded.
    Rejected(DecodeError),
    /// Decoded and recorded.
    Accepted {
        event: Event,
        /// A log line was written
        logged: bool,
        /// The alert transport accepted a notification
        alerted: bool,
    },
}

impl WorkerContext {
    /// Processes one payload received at `now`.
    ///
    /// Order: decode, refresh health, persist (heartbeats excluded), then
    /// alert if the type is in the policy. Only a poisoned lock is an error.
    pub async fn process_payload(
        &self,
        payload: &[u8],
        now: Instant,
    ) -> Result<Outcome, ServerError> {
        let event = match self.codec.decode(payload) {
            Ok(event) => event,
            Err(e) => return Ok(Outcome::Rejected(e)),
        };

        if self.tracker.update(event.origin(), now)? {
            info!(origin = %event.origin(), "Terminal connected");
        }

        let logged = if event.is_heartbeat() {
            false
        } else {
            persist(self.log.as_ref(), &event)?
        };

        let alerted = if self.policy.is_alertable(event.event_type()) {
            send_alert(self.transport.as_ref(), &event).await
        } else {
            false
        };

        Ok(Outcome::Accepted {
            event,
            logged,
            alerted,
        })
    }
}

/// Hands one event to the transport. Failures are logged, never retried.
pub(crate) async fn send_alert(transport: &dyn AlertTransport, event: &Event) -> bool {
    match transport.notify(event).await {
        Ok(()) => {
            info!(
                origin = %event.origin(),
                code = event.event_type().code(),
                serial = event.serial(),
                "Alert sent"
            );
            true
        }
        Err(e) => {
            warn!(
                origin = %event.origin(),
                code = event.event_type().code(),
                serial = event.serial(),
                error = %e,
                "Failed to send alert"
            );
            false
        }
    }
}

/// One consumer task.
pub struct Worker {
    id: usize,
    ctx: Arc<WorkerContext>,
    cancel_token: CancellationToken,
}

impl Worker {
    pub fn new(id: usize, ctx: Arc<WorkerContext>, cancel_token: CancellationToken) -> Self {
        Self {
            id,
            ctx,
            cancel_token,
        }
    }

    /// Serves clients until cancelled.
    ///
    /// Returns an error only for failures that must stop the server: a
    /// poisoned lock or an accept error other than "would block".
    pub async fn run(self) -> Result<(), ServerError> {
        debug!(worker = self.id, "Worker started");

        loop {
            let handle = tokio::select! {
                biased;
                _ = self.cancel_token.cancelled() => break,
                handle = self.ctx.queue.pop() => handle?,
            };

            let accepted = handle.try_accept();
            handle.release();

            let (stream, peer) = match accepted {
                Ok(Some(connection)) => connection,
                Ok(None) => {
                    trace!(worker = self.id, addr = %handle.local_addr(), "Spurious wake-up");
                    continue;
                }
                Err(e) if is_transient_accept_error(&e) => {
                    debug!(worker = self.id, error = %e, "Accept interrupted, retrying");
                    continue;
                }
                Err(e) => {
                    error!(
                        worker = self.id,
                        addr = %handle.local_addr(),
                        error = %e,
                        "Accept failed"
                    );
                    return Err(ServerError::Accept {
                        addr: handle.local_addr(),
                        error: e.to_string(),
                    });
                }
            };

            self.serve(stream, peer).await?;
        }

        debug!(worker = self.id, "Worker stopped");
        Ok(())
    }

    async fn serve(&self, stream: std::net::TcpStream, peer: SocketAddr) -> Result<(), ServerError> {
        let mut stream = match stream
            .set_nonblocking(true)
            .and_then(|()| TcpStream::from_std(stream))
        {
            Ok(stream) => stream,
            Err(e) => {
                warn!(worker = self.id, peer = %peer, error = %e, "Failed to register connection");
                return Ok(());
            }
        };

        let payload = match read_payload(&mut stream, self.ctx.max_payload_bytes).await {
            Ok(payload) => payload,
            Err(e) => {
                debug!(worker = self.id, peer = %peer, error = %e, "Failed to read payload");
                return Ok(());
            }
        };

        match self.ctx.process_payload(&payload, Instant::now()).await? {
            Outcome::Rejected(e) => {
                debug!(worker = self.id, peer = %peer, error = %e, "Dropped malformed payload");
            }
            Outcome::Accepted {
                event,
                logged,
                alerted,
            } => {
                debug!(
                    worker = self.id,
                    origin = %event.origin(),
                    code = event.event_type().code(),
                    serial = event.serial(),
                    logged,
                    alerted,
                    "Event processed"
                );
            }
        }

        if let Err(e) = stream.shutdown().await {
            trace!(worker = self.id, peer = %peer, error = %e, "Shutdown after processing failed");
        }
        Ok(())
    }
}

/// Reads one line (or everything up to EOF), at most `max + 2` bytes.
///
/// Room for a `\r\n` terminator past the limit, so the codec can tell an
/// oversized payload from one that is exactly at the limit.
async fn read_payload(stream: &mut TcpStream, max_payload_bytes: usize) -> io::Result<Vec<u8>> {
    let limit = u64::try_from(max_payload_bytes)
        .unwrap_or(u64::MAX)
        .saturating_add(2);
    let mut payload = Vec::new();
    BufReader::new(stream)
        .take(limit)
        .read_until(b'\n', &mut payload)
        .await?;
    Ok(payload)
}

fn is_transient_accept_error(error: &io::Error) -> bool {
    matches!(
        error.kind(),
        io::ErrorKind::WouldBlock | io::ErrorKind::Interrupted | io::ErrorKind::ConnectionAborted
    )
}
