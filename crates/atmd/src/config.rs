//! Runtime configuration for the central server.
//!
//! Values come from three layers, lowest precedence first: built-in
//! defaults, an optional TOML file, then command-line flags. The binary
//! builds a [`ServerConfig`] from the required flags, applies the file with
//! [`ServerConfig::apply_file`] and then re-applies any explicit flags.
//!
//! ```toml
//! recipient = "ops@bank.example"
//! sender = "atmd@bank.example"
//! alert_codes = [3, 5, 12, 13]
//! workers = 10
//! select_timeout_secs = 5
//! health_threshold_secs = 30
//! max_payload_bytes = 4096
//! backlog = 5
//! bind_host = "0.0.0.0"
//! mail_command = ["sendmail", "-t"]
//! ```

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Deserialize;
use thiserror::Error;

use atm_core::{AlertPolicy, EventTypeError};
use atm_mail::{DEFAULT_MAIL_COMMAND, DEFAULT_RECIPIENT, DEFAULT_SENDER};
use atm_protocol::DEFAULT_MAX_PAYLOAD_BYTES;

use crate::health::DEFAULT_HEALTH_THRESHOLD;
use crate::server::DEFAULT_BACKLOG;

/// Number of worker tasks started by default.
pub const DEFAULT_WORKERS: usize = 10;

/// Default upper bound on one multiplexer wait.
pub const DEFAULT_SELECT_TIMEOUT: Duration = Duration::from_secs(5);

/// Default bind host (every IPv4 interface).
pub const DEFAULT_BIND_HOST: &str = "0.0.0.0";

/// Contents of the optional TOML configuration file.
///
/// Every key is optional; absent keys leave the current value untouched.
#[derive(Debug, Default, Clone, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct FileConfig {
    pub recipient: Option<String>,
    pub sender: Option<String>,
    pub alert_codes: Option<Vec<u16>>,
    pub workers: Option<usize>,
    pub select_timeout_secs: Option<u64>,
    pub health_threshold_secs: Option<u64>,
    pub max_payload_bytes: Option<usize>,
    pub backlog: Option<u32>,
    pub bind_host: Option<String>,
    pub mail_command: Option<Vec<String>>,
}

impl FileConfig {
    /// Reads and parses a configuration file.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path).map_err(|e| ConfigError::Read {
            path: path.to_path_buf(),
            error: e.to_string(),
        })?;
        Self::parse(&contents).map_err(|e| match e {
            ConfigError::Parse { error, .. } => ConfigError::Parse {
                path: Some(path.to_path_buf()),
                error,
            },
            other => other,
        })
    }

    pub fn parse(contents: &str) -> Result<Self, ConfigError> {
        toml::from_str(contents).map_err(|e| ConfigError::Parse {
            path: None,
            error: e.to_string(),
        })
    }
}

/// Fully resolved server configuration.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// TCP port every listener binds to
    pub port: u16,

    /// Persisted event log
    pub log_path: PathBuf,

    /// Host resolved to the IPv4 addresses to listen on
    pub bind_host: String,

    /// Listen backlog per socket
    pub backlog: u32,

    /// Size of the worker pool
    pub workers: usize,

    /// Upper bound on one multiplexer wait (and so on sweep spacing)
    pub select_timeout: Duration,

    /// Silence tolerated before a terminal is declared disconnected
    pub health_threshold: Duration,

    /// Largest payload accepted from one connection
    pub max_payload_bytes: usize,

    /// Event types that trigger an operator notification
    pub alert_policy: AlertPolicy,

    /// Operator address alerts are sent to
    pub recipient: String,

    /// `From:` address of alerts
    pub sender: String,

    /// Mail command and its arguments
    pub mail_command: Vec<String>,
}

impl ServerConfig {
    /// Creates a configuration with every optional value at its default.
    pub fn new(port: u16, log_path: impl Into<PathBuf>) -> Self {
        Self {
            port,
            log_path: log_path.into(),
            bind_host: DEFAULT_BIND_HOST.to_string(),
            backlog: DEFAULT_BACKLOG,
            workers: DEFAULT_WORKERS,
            select_timeout: DEFAULT_SELECT_TIMEOUT,
            health_threshold: DEFAULT_HEALTH_THRESHOLD,
            max_payload_bytes: DEFAULT_MAX_PAYLOAD_BYTES,
            alert_policy: AlertPolicy::default(),
            recipient: DEFAULT_RECIPIENT.to_string(),
            sender: DEFAULT_SENDER.to_string(),
            mail_command: DEFAULT_MAIL_COMMAND.iter().map(|s| s.to_string()).collect(),
        }
    }

    /// Overrides values present in `file`.
    ///
    /// Fails on alert codes that name no event type.
    pub fn apply_file(&mut self, file: &FileConfig) -> Result<(), ConfigError> {
        if let Some(ref v) = file.recipient {
            self.recipient.clone_from(v);
        }
        if let Some(ref v) = file.sender {
            self.sender.clone_from(v);
        }
        if let Some(ref codes) = file.alert_codes {
            self.alert_policy = AlertPolicy::from_codes(codes)?;
        }
        if let Some(v) = file.workers {
            self.workers = v;
        }
        if let Some(v) = file.select_timeout_secs {
            self.select_timeout = Duration::from_secs(v);
        }
        if let Some(v) = file.health_threshold_secs {
            self.health_threshold = Duration::from_secs(v);
        }
        if let Some(v) = file.max_payload_bytes {
            self.max_payload_bytes = v;
        }
        if let Some(v) = file.backlog {
            self.backlog = v;
        }
        if let Some(ref v) = file.bind_host {
            self.bind_host.clone_from(v);
        }
        if let Some(ref v) = file.mail_command {
            self.mail_command.clone_from(v);
        }
        Ok(())
    }

    /// Rejects values the server cannot run with.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.workers == 0 {
            return Err(ConfigError::invalid("workers", "must be at least 1"));
        }
        if self.select_timeout.is_zero() {
            return Err(ConfigError::invalid("select_timeout_secs", "must be positive"));
        }
        if self.health_threshold.is_zero() {
            return Err(ConfigError::invalid("health_threshold_secs", "must be positive"));
        }
        if self.max_payload_bytes == 0 {
            return Err(ConfigError::invalid("max_payload_bytes", "must be positive"));
        }
        if self.backlog == 0 {
            return Err(ConfigError::invalid("backlog", "must be positive"));
        }
        if self.bind_host.trim().is_empty() {
            return Err(ConfigError::invalid("bind_host", "must not be empty"));
        }
        if self.recipient.trim().is_empty() {
            return Err(ConfigError::invalid("recipient", "must not be empty"));
        }
        if self
            .mail_command
            .first()
            .map_or(true, |program| program.trim().is_empty())
        {
            return Err(ConfigError::invalid("mail_command", "must name a program"));
        }
        Ok(())
    }
}

/// Errors while building the configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file {path}: {error}")]
    Read { path: PathBuf, error: String },

    #[error("Invalid config{}: {error}", describe_path(.path))]
    Parse { path: Option<PathBuf>, error: String },

    #[error("Invalid alert code: {0}")]
    AlertCode(#[from] EventTypeError),

    #[error("Invalid value for {field}: {reason}")]
    Invalid { field: &'static str, reason: String },
}

fn describe_path(path: &Option<PathBuf>) -> String {
    path.as_ref()
        .map(|p| format!(" file {}", p.display()))
        .unwrap_or_default()
}

impl ConfigError {
    fn invalid(field: &'static str, reason: impl Into<String>) -> Self {
        Self::Invalid {
            field,
            reason: reason.into(),
        }
    }
}
