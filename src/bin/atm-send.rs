//! ATM terminal simulator
//!
//! Sends one event report to a running central server, the way a terminal
//! does: connect, write one JSON line, wait for the server to close.
//!
//! ```bash
//! # Service mode left, terminal 17
//! atm-send --port 7000 --origin 17 --code 7 --serial 42
//!
//! # Heartbeat every 10 seconds
//! atm-send --port 7000 --origin 17 --code 0 --repeat 10
//! ```

use std::time::Duration;

use anyhow::{Context, Result};
use chrono::Utc;
use clap::Parser;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::time::{sleep, timeout};
use tracing::{debug, info};
use tracing_subscriber::EnvFilter;

use atm_core::{Event, EventType, OriginId};
use atm_protocol::EventPayload;

/// How long to wait for the server to close the connection.
const CLOSE_TIMEOUT: Duration = Duration::from_secs(10);

/// Send a terminal event report to the ATM central server
#[derive(Parser, Debug)]
#[command(name = "atm-send", version, about)]
struct Args {
    /// Server host
    #[arg(long, default_value = "127.0.0.1")]
    host: String,

    /// Server port
    #[arg(short = 'l', long)]
    port: u16,

    /// Terminal id
    #[arg(long)]
    origin: u32,

    /// Event type code (0 = heartbeat, 1-13 = events)
    #[arg(long, value_parser = parse_event_type)]
    code: EventType,

    /// Terminal-local serial number (incremented on each repeat)
    #[arg(long, default_value_t = 1)]
    serial: u64,

    /// Resend every N seconds until interrupted
    #[arg(long)]
    repeat: Option<u64>,
}

fn parse_event_type(value: &str) -> Result<EventType, String> {
    let code: u16 = value
        .parse()
        .map_err(|_| format!("'{value}' is not a number"))?;
    EventType::try_from(code).map_err(|e| e.to_string())
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive("atm_send=info".parse()?))
        .init();

    let args = Args::parse();
    let origin = OriginId::new(args.origin);
    let mut serial = args.serial;

    loop {
        let event = Event::new(origin, Utc::now(), args.code, serial);
        send(&args.host, args.port, &EventPayload::from(&event)).await?;
        info!(
            origin = %origin,
            code = args.code.code(),
            serial,
            label = args.code.label(),
            "Event sent"
        );

        let Some(every) = args.repeat else {
            return Ok(());
        };
        sleep(Duration::from_secs(every)).await;
        serial = serial.wrapping_add(1);
    }
}

async fn send(host: &str, port: u16, payload: &EventPayload) -> Result<()> {
    let line = payload.to_line().context("Failed to encode event")?;

    let mut stream = TcpStream::connect((host, port))
        .await
        .with_context(|| format!("Failed to connect to {host}:{port}"))?;
    stream
        .write_all(line.as_bytes())
        .await
        .context("Failed to send event")?;
    stream.shutdown().await.context("Failed to close write half")?;

    let mut rest = Vec::new();
    match timeout(CLOSE_TIMEOUT, stream.read_to_end(&mut rest)).await {
        Ok(Ok(_)) => debug!("Server closed the connection"),
        Ok(Err(e)) => debug!(error = %e, "Connection ended with error"),
        Err(_) => debug!(secs = CLOSE_TIMEOUT.as_secs(), "Server did not close in time"),
    }
    Ok(())
}
