//! ATM Daemon - Central monitoring server
//!
//! Accepts event reports from remote terminals over TCP, tracks terminal
//! liveness, persists events to a log file and e-mails the operator for
//! alertable event types.
//!
//! # Usage
//!
//! ```bash
//! # Run in the foreground
//! atmd -l 7000 -b /var/log/atm/events.log
//!
//! # With a configuration file, in the background
//! atmd -l 7000 -b /var/log/atm/events.log -c /etc/atmd.toml -d
//! ```

use std::fs::{self, File};
use std::path::{Path, PathBuf};
use std::process;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use atm_mail::SendmailTransport;
use atmd::{FileConfig, FileLogWriter, Server, ServerConfig};

/// ATM central server - terminal event collection and alerting
#[derive(Parser, Debug)]
#[command(name = "atmd", version, about)]
struct Args {
    /// TCP port to listen on
    #[arg(short = 'l', long)]
    port: u16,

    /// Event log file (appended to, created if missing)
    #[arg(short = 'b', long = "log-file")]
    log_file: PathBuf,

    /// TOML configuration file
    #[arg(short = 'c', long)]
    config: Option<PathBuf>,

    /// Number of worker tasks (overrides the configuration file)
    #[arg(long)]
    workers: Option<usize>,

    /// Run as a background daemon (fork to background)
    #[arg(short = 'd', long)]
    daemon: bool,
}

fn diagnostics_log_path() -> PathBuf {
    let state_dir = dirs::state_dir()
        .unwrap_or_else(|| PathBuf::from("/tmp"))
        .join("atm");
    state_dir.join("atmd.log")
}

/// Resolves defaults, then the config file, then explicit flags.
fn build_config(args: &Args) -> Result<ServerConfig> {
    // Daemonizing changes the working directory to /
    let log_path = absolute(&args.log_file)?;
    let mut config = ServerConfig::new(args.port, log_path);

    if let Some(ref path) = args.config {
        let file = FileConfig::load(path)?;
        config.apply_file(&file)?;
    }
    if let Some(workers) = args.workers {
        config.workers = workers;
    }

    config.validate()?;
    Ok(config)
}

fn absolute(path: &Path) -> Result<PathBuf> {
    if path.is_absolute() {
        return Ok(path.to_path_buf());
    }
    let cwd = std::env::current_dir().context("Failed to read current directory")?;
    Ok(cwd.join(path))
}

fn main() -> Result<()> {
    let args = Args::parse();
    let config = build_config(&args)?;

    if args.daemon {
        daemonize()?;
    }

    run_server(config)
}

fn daemonize() -> Result<()> {
    use daemonize::Daemonize;

    let log_path = diagnostics_log_path();

    if let Some(parent) = log_path.parent() {
        fs::create_dir_all(parent).context("Failed to create log directory")?;
    }

    let stdout = File::create(&log_path).context("Failed to create log file for stdout")?;
    let stderr = stdout
        .try_clone()
        .context("Failed to create log file for stderr")?;

    let daemonize = Daemonize::new()
        .working_directory("/")
        .stdout(stdout)
        .stderr(stderr);

    daemonize.start().context("Failed to daemonize")?;

    Ok(())
}

#[tokio::main]
async fn run_server(config: ServerConfig) -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::from_default_env()
                .add_directive("atmd=info".parse()?)
                .add_directive("atm_core=info".parse()?)
                .add_directive("atm_protocol=info".parse()?)
                .add_directive("atm_mail=info".parse()?),
        )
        .init();

    info!(
        version = env!("CARGO_PKG_VERSION"),
        pid = process::id(),
        port = config.port,
        log = %config.log_path.display(),
        workers = config.workers,
        alert_codes = ?config.alert_policy.codes(),
        recipient = %config.recipient,
        "ATM central server starting"
    );

    let cancel_token = CancellationToken::new();

    let shutdown_token = cancel_token.clone();
    tokio::spawn(async move {
        if let Err(e) = wait_for_shutdown_signal().await {
            error!(error = %e, "Error waiting for shutdown signal");
        }
        info!("Shutdown signal received");
        shutdown_token.cancel();
    });

    let log = FileLogWriter::open(&config.log_path)?;
    let transport =
        SendmailTransport::new(&config.mail_command, &config.sender, &config.recipient)?;

    let server = Server::bind(&config, Arc::new(log), Arc::new(transport), cancel_token).await?;

    if let Err(e) = server.run().await {
        error!(error = %e, "Server error");
        return Err(e.into());
    }

    info!("ATM central server stopped");
    Ok(())
}

async fn wait_for_shutdown_signal() -> Result<()> {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};

        let mut sigterm = signal(SignalKind::terminate())?;
        let mut sigint = signal(SignalKind::interrupt())?;

        tokio::select! {
            _ = sigterm.recv() => {
                info!("Received SIGTERM");
            }
            _ = sigint.recv() => {
                info!("Received SIGINT");
            }
        }
    }

    #[cfg(not(unix))]
    {
        tokio::signal::ctrl_c().await?;
        info!("Received Ctrl+C");
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_args_parse_short_flags() {
        let args = Args::try_parse_from(["atmd", "-l", "7000", "-b", "events.log", "-d"]).unwrap();
        assert_eq!(args.port, 7000);
        assert_eq!(args.log_file, PathBuf::from("events.log"));
        assert!(args.daemon);
        assert!(args.config.is_none());
    }

    #[test]
    fn test_port_and_log_file_required() {
        assert!(Args::try_parse_from(["atmd", "-l", "7000"]).is_err());
        assert!(Args::try_parse_from(["atmd", "-b", "events.log"]).is_err());
    }

    #[test]
    fn test_cli_workers_override_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "workers = 3\nalert_codes = [13]").unwrap();
        let config_path = file.path().display().to_string();

        let args = Args::try_parse_from([
            "atmd", "-l", "7000", "-b", "/tmp/events.log", "-c", config_path.as_str(), "--workers", "6",
        ])
        .unwrap();
        let config = build_config(&args).unwrap();

        assert_eq!(config.workers, 6);
        assert_eq!(config.alert_policy.codes(), vec![13]);
        assert_eq!(config.log_path, PathBuf::from("/tmp/events.log"));
    }

    #[test]
    fn test_relative_log_path_made_absolute() {
        let args = Args::try_parse_from(["atmd", "-l", "7000", "-b", "events.log"]).unwrap();
        let config = build_config(&args).unwrap();
        assert!(config.log_path.is_absolute());
    }
}
