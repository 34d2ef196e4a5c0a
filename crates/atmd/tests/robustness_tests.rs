//! Robustness tests for the central server.
//!
//! These tests verify the server handles edge cases and error conditions gracefully:
//! - Oversized and partial payloads
//! - Clients that connect and never write
//! - Rapid connect/disconnect
//! - Many concurrent terminals
//! - Recovery after errors
//!
//! Tests CAN use `.unwrap()` and `.expect()` - this is allowed.

use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use atm_core::{AlertPolicy, Event, EventType, OriginId};
use atm_mail::{AlertTransport, MailError};
use atm_protocol::EventPayload;
use atmd::{FileLogWriter, Server, ServerConfig, ServerError};
use tempfile::TempDir;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::task::JoinHandle;
use tokio::time::{sleep, timeout, Instant};
use tokio_util::sync::CancellationToken;

// ============================================================================
// Constants
// ============================================================================

const LOG_WAIT_TIMEOUT: Duration = Duration::from_secs(5);
const LOG_POLL_INTERVAL: Duration = Duration::from_millis(20);
const MAX_PAYLOAD_BYTES: usize = 256;

// ============================================================================
// Test Helpers
// ============================================================================

struct NoopTransport;

#[async_trait]
impl AlertTransport for NoopTransport {
    async fn notify(&self, _event: &Event) -> Result<(), MailError> {
        Ok(())
    }
}

/// Transport that takes a long time, like a stalled MTA.
struct SlowTransport;

#[async_trait]
impl AlertTransport for SlowTransport {
    async fn notify(&self, _event: &Event) -> Result<(), MailError> {
        sleep(Duration::from_millis(500)).await;
        Ok(())
    }
}

struct TestServer {
    addr: SocketAddr,
    log_path: PathBuf,
    cancel_token: CancellationToken,
    handle: JoinHandle<Result<(), ServerError>>,
    _temp_dir: TempDir,
}

impl TestServer {
    async fn spawn(workers: usize) -> Self {
        Self::spawn_with(workers, AlertPolicy::default(), Arc::new(NoopTransport)).await
    }

    async fn spawn_with(
        workers: usize,
        policy: AlertPolicy,
        transport: Arc<dyn AlertTransport>,
    ) -> Self {
        let temp_dir = tempfile::tempdir().expect("create temp dir");
        let log_path = temp_dir.path().join("events.log");

        let mut config = ServerConfig::new(0, &log_path);
        config.bind_host = "127.0.0.1".to_string();
        config.workers = workers;
        config.select_timeout = Duration::from_millis(50);
        config.health_threshold = Duration::from_secs(30);
        config.max_payload_bytes = MAX_PAYLOAD_BYTES;
        // Bursts of simultaneous connects overflow the default backlog
        config.backlog = 128;
        config.alert_policy = policy;

        let log = Arc::new(FileLogWriter::open(&log_path).expect("open log"));
        let cancel_token = CancellationToken::new();
        let server = Server::bind(&config, log, transport, cancel_token.clone())
            .await
            .expect("bind loopback");
        let addr = server.local_addrs()[0];
        let handle = tokio::spawn(server.run());

        Self {
            addr,
            log_path,
            cancel_token,
            handle,
            _temp_dir: temp_dir,
        }
    }

    /// Sends raw bytes; returns once the server has closed the connection.
    async fn send_raw(&self, payload: &[u8]) -> std::io::Result<()> {
        let mut stream = TcpStream::connect(self.addr).await?;
        stream.write_all(payload).await?;
        stream.shutdown().await?;
        let mut rest = Vec::new();
        timeout(Duration::from_secs(3), stream.read_to_end(&mut rest))
            .await
            .expect("server closes the connection")?;
        Ok(())
    }

    async fn send(&self, origin: u32, event_type: EventType, serial: u64) {
        let line = EventPayload::new(OriginId::new(origin), event_type, serial)
            .to_line()
            .unwrap();
        self.send_raw(line.as_bytes()).await.unwrap();
    }

    fn log_lines(&self) -> Vec<String> {
        std::fs::read_to_string(&self.log_path)
            .unwrap_or_default()
            .lines()
            .map(str::to_string)
            .collect()
    }

    async fn wait_for_lines(&self, count: usize) -> Vec<String> {
        let start = Instant::now();
        loop {
            let lines = self.log_lines();
            if lines.len() >= count || start.elapsed() > LOG_WAIT_TIMEOUT {
                return lines;
            }
            sleep(LOG_POLL_INTERVAL).await;
        }
    }

    async fn shutdown(self) {
        self.cancel_token.cancel();
        timeout(Duration::from_secs(3), self.handle)
            .await
            .expect("server stops after cancel")
            .unwrap()
            .unwrap();
    }
}

// ============================================================================
// Malformed Input Tests
// ============================================================================

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_oversized_payload_rejected() {
    let server = TestServer::spawn(2).await;

    let padding = " ".repeat(MAX_PAYLOAD_BYTES * 4);
    let oversized = format!(r#"{{"origin": 1, "type": 3, "serial": 1{padding}}}"#);
    // The server may reset the connection while unread bytes remain
    let _ = server.send_raw(oversized.as_bytes()).await;

    server.send(2, EventType::LowCash, 1).await;
    let lines = server.wait_for_lines(1).await;
    assert_eq!(lines.len(), 1);
    assert!(lines[0].contains("| 2 | 3 |"), "only the valid event is logged");

    server.shutdown().await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_partial_json_handled() {
    let server = TestServer::spawn(2).await;

    server.send_raw(br#"{"origin": 1, "type": "#).await.unwrap();
    server.send_raw(b"\n").await.unwrap();
    server.send_raw(b"").await.unwrap();

    server.send(9, EventType::PrinterError, 1).await;
    let lines = server.wait_for_lines(1).await;
    assert_eq!(lines.len(), 1);
    assert!(lines[0].ends_with("| 9 | 11 | Printer error"));

    server.shutdown().await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_only_first_line_is_read() {
    let server = TestServer::spawn(2).await;

    let first = EventPayload::new(OriginId::new(4), EventType::LowPaper, 1)
        .to_line()
        .unwrap();
    let second = EventPayload::new(OriginId::new(4), EventType::PaperOut, 2)
        .to_line()
        .unwrap();
    let _ = server.send_raw(format!("{first}{second}").as_bytes()).await;

    let lines = server.wait_for_lines(1).await;
    sleep(Duration::from_millis(100)).await;
    assert_eq!(server.log_lines().len(), 1);
    assert!(lines[0].ends_with("| 4 | 10 | Low Paper warning"));

    server.shutdown().await;
}

// ============================================================================
// Connection Handling Tests
// ============================================================================

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_silent_client_does_not_block_others() {
    let server = TestServer::spawn(2).await;

    // Occupies one worker until dropped
    let idle = TcpStream::connect(server.addr).await.unwrap();
    sleep(Duration::from_millis(100)).await;

    for serial in 0..5 {
        server.send(50, EventType::ServiceModeEntered, serial).await;
    }
    let lines = server.wait_for_lines(5).await;
    assert_eq!(lines.len(), 5);

    drop(idle);
    server.shutdown().await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_rapid_connect_disconnect() {
    let server = TestServer::spawn(4).await;

    for _ in 0..50 {
        let stream = TcpStream::connect(server.addr).await.unwrap();
        drop(stream);
    }

    // Still serving
    server.send(1, EventType::CommunicationError, 1).await;
    let lines = server.wait_for_lines(1).await;
    assert_eq!(lines.len(), 1);

    server.shutdown().await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_many_concurrent_terminals() {
    const TERMINALS: u32 = 60;
    let server = Arc::new(TestServer::spawn(10).await);

    let mut clients = Vec::new();
    for origin in 0..TERMINALS {
        let server = Arc::clone(&server);
        clients.push(tokio::spawn(async move {
            server.send(origin, EventType::RunningOutOfNotes, 1).await;
        }));
    }
    for client in clients {
        client.await.unwrap();
    }

    let lines = server.wait_for_lines(TERMINALS as usize).await;
    assert_eq!(lines.len(), TERMINALS as usize);

    let mut origins: Vec<u32> = lines
        .iter()
        .map(|line| line.split(" | ").nth(2).unwrap().parse().unwrap())
        .collect();
    origins.sort_unstable();
    origins.dedup();
    assert_eq!(origins.len(), TERMINALS as usize, "every terminal logged once");

    let server = Arc::try_unwrap(server).ok().expect("no other references");
    server.shutdown().await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_slow_alert_only_stalls_its_worker() {
    let server = TestServer::spawn_with(
        2,
        AlertPolicy::new([EventType::Empty]),
        Arc::new(SlowTransport),
    )
    .await;

    let slow = {
        let addr = server.addr;
        tokio::spawn(async move {
            let line = EventPayload::new(OriginId::new(1), EventType::Empty, 1)
                .to_line()
                .unwrap();
            let mut stream = TcpStream::connect(addr).await.unwrap();
            stream.write_all(line.as_bytes()).await.unwrap();
            let mut rest = Vec::new();
            stream.read_to_end(&mut rest).await.unwrap();
        })
    };
    sleep(Duration::from_millis(50)).await;

    let start = Instant::now();
    server.send(2, EventType::LowCash, 1).await;
    assert!(
        start.elapsed() < Duration::from_millis(400),
        "second terminal waited on the first one's alert"
    );

    slow.await.unwrap();
    assert_eq!(server.wait_for_lines(2).await.len(), 2);

    server.shutdown().await;
}
