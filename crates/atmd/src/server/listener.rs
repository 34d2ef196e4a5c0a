//! Listening sockets and the readiness state the multiplexer watches.
//!
//! Each [`ListenerHandle`] wraps one non-blocking IPv4 listener registered
//! with the runtime's reactor. A handle is in exactly one of two states:
//! *watched* by the multiplexer, or *queued* (sitting in the work queue or
//! held by a worker). The `queued` flag keeps a listener from being queued
//! twice; a worker clears it with [`ListenerHandle::release`] right after
//! its accept attempt, which also re-arms the multiplexer.
//!
//! Readiness reported by the reactor is retained until an accept actually
//! returns "would block", so a backlog of pending connections is handed to
//! successive workers one accept at a time.

use std::io;
use std::net::{SocketAddr, TcpListener, TcpStream};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::task::{Context, Poll};

use futures::FutureExt;
use tokio::io::unix::AsyncFd;
use tokio::io::Interest;
use tokio::net::TcpSocket;
use tokio::sync::Notify;
use tracing::{info, warn};

use super::ServerError;

/// Pending-connection queue length requested for every listener.
pub const DEFAULT_BACKLOG: u32 = 5;

/// A listening socket plus its queued flag.
#[derive(Debug)]
pub struct ListenerHandle {
    fd: AsyncFd<TcpListener>,
    local_addr: SocketAddr,
    queued: AtomicBool,
    rearm: Arc<Notify>,
}

impl ListenerHandle {
    /// Registers an already bound, non-blocking listener with the reactor.
    ///
    /// Must be called from within a Tokio runtime.
    pub fn new(listener: TcpListener, rearm: Arc<Notify>) -> io::Result<Self> {
        listener.set_nonblocking(true)?;
        let local_addr = listener.local_addr()?;
        let fd = AsyncFd::with_interest(listener, Interest::READABLE)?;

        Ok(Self {
            fd,
            local_addr,
            queued: AtomicBool::new(false),
            rearm,
        })
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    pub fn is_queued(&self) -> bool {
        self.queued.load(Ordering::Acquire)
    }

    /// Marks the handle queued. Returns false if it already was.
    pub fn mark_queued(&self) -> bool {
        !self.queued.swap(true, Ordering::AcqRel)
    }

    /// Returns the handle to the multiplexer's watch set and wakes it.
    pub fn release(&self) {
        self.queued.store(false, Ordering::Release);
        self.rearm.notify_one();
    }

    /// Polls for a pending inbound connection without consuming readiness.
    pub fn poll_read_ready(&self, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        // Dropping the guard leaves readiness set for the worker's accept
        self.fd.poll_read_ready(cx).map_ok(|_guard| ())
    }

    /// Accepts one pending connection without waiting.
    ///
    /// Returns `Ok(None)` when nothing was pending (a spurious wake-up); in
    /// that case the retained readiness is cleared so the reactor reports
    /// the next connection afresh.
    pub fn try_accept(&self) -> io::Result<Option<(TcpStream, SocketAddr)>> {
        let Some(guard) = self.fd.readable().now_or_never() else {
            return Ok(None);
        };
        let mut guard = guard?;

        match guard.try_io(|fd| fd.get_ref().accept()) {
            Ok(accepted) => accepted.map(Some),
            Err(_would_block) => Ok(None),
        }
    }
}

/// Binds one listener per IPv4 address `host` resolves to.
///
/// Addresses that fail to bind are logged and skipped. Fails when the host
/// does not resolve or nothing could be bound.
pub async fn bind_listeners(
    host: &str,
    port: u16,
    backlog: u32,
    rearm: Arc<Notify>,
) -> Result<Vec<Arc<ListenerHandle>>, ServerError> {
    let resolved = tokio::net::lookup_host((host, port))
        .await
        .map_err(|e| ServerError::Resolve {
            host: host.to_string(),
            port,
            error: e.to_string(),
        })?;

    let mut addrs: Vec<SocketAddr> = resolved.filter(SocketAddr::is_ipv4).collect();
    addrs.sort_unstable();
    addrs.dedup();

    let mut listeners = Vec::with_capacity(addrs.len());
    for addr in addrs {
        match bind_one(addr, backlog).and_then(|l| ListenerHandle::new(l, Arc::clone(&rearm))) {
            Ok(handle) => {
                info!(addr = %handle.local_addr(), backlog, "Listening");
                listeners.push(Arc::new(handle));
            }
            Err(e) => {
                warn!(addr = %addr, error = %e, "Failed to bind address, skipping");
            }
        }
    }

    if listeners.is_empty() {
        return Err(ServerError::NoListeners {
            host: host.to_string(),
            port,
        });
    }

    Ok(listeners)
}

fn bind_one(addr: SocketAddr, backlog: u32) -> io::Result<TcpListener> {
    let socket = TcpSocket::new_v4()?;
    socket.set_reuseaddr(true)?;
    socket.bind(addr)?;
    socket.listen(backlog)?.into_std()
}
