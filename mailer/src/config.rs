//! Configuration module for Camwatch Mailer.
//!
//! This module handles parsing configuration from environment variables.
//!
//! # Environment Variables
//!
//! | Variable | Required | Default | Description |
//! |----------|----------|---------|-------------|
//! | `CAMWATCH_MAIL_FROM` | Yes | - | Sender address |
//! | `CAMWATCH_MAIL_TO` | Yes | - | Recipient address |
//! | `CAMWATCH_SMTP_USER` | Yes | - | SMTP account name |
//! | `CAMWATCH_SMTP_PASSWORD` | Yes | - | SMTP account password |
//! | `CAMWATCH_SMTP_HOST` | Yes | - | SMTP host (e.g., `smtp.example.com`) |
//! | `CAMWATCH_SMTP_PORT` | No | 587 | SMTP submission port |
//! | `CAMWATCH_RESOLUTION` | No | `low` | Snapshot resolution: `low`, `high`, `none` |
//! | `CAMWATCH_STREAM_LINK` | No | `off` | Include an RTSP link with the public address: `on`, `off` |
//! | `CAMWATCH_STREAM_PORT` | No | 554 | RTSP port used in the link |
//! | `CAMWATCH_COOLDOWN_SECS` | No | 600 | Seconds between emails (0-99999) |
//! | `CAMWATCH_SKIP_EVENTS` | No | (none) | Initial letters of events to skip: `m`, `s`, `h`, `b` |
//! | `CAMWATCH_TIME_OFFSET_HOURS` | No | 0 | Clock fix for message timestamps (-23 to 23) |
//! | `CAMWATCH_HOST_LABEL` | No | hostname | Camera name shown in the `From` header |
//! | `CAMWATCH_FEED_COMMAND` | No | `/tmp/sd/yi-hack/bin/ipc_multiplexer` | Sensor feed program |
//! | `CAMWATCH_SNAPSHOT_COMMAND` | No | `/tmp/sd/yi-hack/bin/imggrabber` | Snapshot program |
//! | `CAMWATCH_MODEL_SUFFIX` | No | from `/tmp/sd/yi-hack/model_suffix` | Camera model passed to the snapshot program |
//! | `CAMWATCH_ADDRESS_ENDPOINTS` | No | built-in | Comma-separated public address endpoints |
//!
//! # Example
//!
//! ```no_run
//! use camwatch_mailer::config::Config;
//!
//! let config = Config::from_env().expect("Failed to load configuration");
//! println!("SMTP server: {}", config.smtp.server());
//! ```

use std::env;
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

use chrono::TimeDelta;
use thiserror::Error;
use zeroize::Zeroizing;

use crate::debounce::{EnabledEvents, DEFAULT_COOLDOWN_SECS};

/// Default SMTP submission port.
const DEFAULT_SMTP_PORT: u16 = 587;

/// Default RTSP port.
const DEFAULT_STREAM_PORT: u16 = 554;

/// Maximum cooldown in seconds.
const MAX_COOLDOWN_SECS: u64 = 99_999;

/// Largest accepted clock offset, in hours, either direction.
const MAX_TIME_OFFSET_HOURS: i64 = 23;

/// Default sensor feed program.
const DEFAULT_FEED_COMMAND: &str = "/tmp/sd/yi-hack/bin/ipc_multiplexer";

/// Default snapshot program.
const DEFAULT_SNAPSHOT_COMMAND: &str = "/tmp/sd/yi-hack/bin/imggrabber";

/// File holding the camera model suffix on the device.
const MODEL_SUFFIX_FILE: &str = "/tmp/sd/yi-hack/model_suffix";

/// Model used when the suffix file is missing.
const DEFAULT_MODEL_SUFFIX: &str = "y21ga";

/// Public address endpoints, tried in order.
const DEFAULT_ADDRESS_ENDPOINTS: [&str; 2] = ["https://api.ipify.org", "https://ifconfig.me/ip"];

/// Errors that can occur during configuration parsing.
#[derive(Error, Debug)]
pub enum ConfigError {
    /// Required environment variable is missing.
    #[error("missing required environment variable: {0}")]
    MissingEnvVar(String),

    /// Environment variable has an invalid value.
    #[error("invalid value for {key}: {message}")]
    InvalidValue { key: String, message: String },
}

/// Snapshot resolution requested for attachments.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Resolution {
    #[default]
    Low,
    High,
    /// No attachment; messages are single-part text.
    None,
}

impl Resolution {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Low => "low",
            Self::High => "high",
            Self::None => "none",
        }
    }

    /// Whether messages carry a snapshot attachment.
    #[must_use]
    pub fn has_attachment(self) -> bool {
        !matches!(self, Self::None)
    }

    /// Initial message buffer capacity, sized to typical snapshots.
    #[must_use]
    pub fn message_capacity(self) -> usize {
        match self {
            Self::Low => 65_536,
            Self::High => 491_520,
            Self::None => 4_096,
        }
    }

    /// RTSP stream path for this resolution, if it has one.
    #[must_use]
    pub fn stream_path(self) -> Option<&'static str> {
        match self {
            Self::Low => Some("ch0_1.h264"),
            Self::High => Some("ch0_0.h264"),
            Self::None => None,
        }
    }
}

impl fmt::Display for Resolution {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Resolution {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "low" => Ok(Self::Low),
            "high" => Ok(Self::High),
            "none" => Ok(Self::None),
            other => Err(format!("expected low, high or none, got '{other}'")),
        }
    }
}

/// SMTP submission settings.
#[derive(Clone)]
pub struct SmtpConfig {
    pub host: String,
    pub port: u16,
    pub username: String,
    pub password: Zeroizing<String>,
}

impl SmtpConfig {
    /// `host:port` of the submission server.
    #[must_use]
    pub fn server(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

impl fmt::Debug for SmtpConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SmtpConfig")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .finish()
    }
}

/// Configuration for Camwatch Mailer.
#[derive(Debug, Clone)]
pub struct Config {
    /// Sender address.
    pub mail_from: String,

    /// Recipient address.
    pub mail_to: String,

    /// SMTP submission settings.
    pub smtp: SmtpConfig,

    /// Snapshot resolution; `None` sends text-only messages.
    pub resolution: Resolution,

    /// Whether to resolve the public address and include an RTSP link.
    pub stream_link: bool,

    /// RTSP port used in the link.
    pub stream_port: u16,

    /// Minimum interval between two notifications.
    pub cooldown: Duration,

    /// Event kinds that may trigger a notification.
    pub enabled_events: EnabledEvents,

    /// Offset added to timestamps written into messages.
    pub time_offset: TimeDelta,

    /// Camera name used in the `From` display name.
    pub host_label: String,

    /// Program whose stderr is the sensor feed.
    pub feed_command: PathBuf,

    /// Program that writes a JPEG snapshot to stdout.
    pub snapshot_command: PathBuf,

    /// Camera model passed to the snapshot program.
    pub model_suffix: String,

    /// Endpoints queried for the public address.
    pub address_endpoints: Vec<String>,
}

impl Config {
    /// Creates a new `Config` by parsing environment variables.
    ///
    /// # Errors
    ///
    /// Returns a `ConfigError` if:
    /// - Any of the mail or SMTP account variables is not set
    /// - A numeric variable cannot be parsed or is out of range
    /// - `CAMWATCH_RESOLUTION` or `CAMWATCH_STREAM_LINK` has an unknown value
    pub fn from_env() -> Result<Self, ConfigError> {
        let mail_from = required("CAMWATCH_MAIL_FROM")?;
        let mail_to = required("CAMWATCH_MAIL_TO")?;

        let smtp = SmtpConfig {
            host: required("CAMWATCH_SMTP_HOST")?,
            port: parse_or("CAMWATCH_SMTP_PORT", DEFAULT_SMTP_PORT)?,
            username: required("CAMWATCH_SMTP_USER")?,
            password: Zeroizing::new(required("CAMWATCH_SMTP_PASSWORD")?),
        };

        let resolution = match env::var("CAMWATCH_RESOLUTION") {
            Ok(val) => val.parse().map_err(|message| ConfigError::InvalidValue {
                key: "CAMWATCH_RESOLUTION".to_string(),
                message,
            })?,
            Err(_) => Resolution::default(),
        };

        let stream_link = match env::var("CAMWATCH_STREAM_LINK") {
            Ok(val) => parse_switch("CAMWATCH_STREAM_LINK", &val)?,
            Err(_) => false,
        };

        let stream_port = parse_or("CAMWATCH_STREAM_PORT", DEFAULT_STREAM_PORT)?;

        // Optional: CAMWATCH_COOLDOWN_SECS (default: 600, max 99999)
        let cooldown_secs = parse_or("CAMWATCH_COOLDOWN_SECS", DEFAULT_COOLDOWN_SECS)?;
        if cooldown_secs > MAX_COOLDOWN_SECS {
            return Err(ConfigError::InvalidValue {
                key: "CAMWATCH_COOLDOWN_SECS".to_string(),
                message: format!("cooldown must be at most {MAX_COOLDOWN_SECS} seconds, got {cooldown_secs}"),
            });
        }

        let enabled_events = env::var("CAMWATCH_SKIP_EVENTS")
            .map(|val| EnabledEvents::from_skip_letters(&val))
            .unwrap_or_default();

        let offset_hours: i64 = parse_or("CAMWATCH_TIME_OFFSET_HOURS", 0)?;
        if !(-MAX_TIME_OFFSET_HOURS..=MAX_TIME_OFFSET_HOURS).contains(&offset_hours) {
            return Err(ConfigError::InvalidValue {
                key: "CAMWATCH_TIME_OFFSET_HOURS".to_string(),
                message: format!(
                    "offset must be between -{MAX_TIME_OFFSET_HOURS} and {MAX_TIME_OFFSET_HOURS} hours, got {offset_hours}"
                ),
            });
        }

        let host_label = env::var("CAMWATCH_HOST_LABEL").unwrap_or_else(|_| get_hostname());

        let feed_command = env::var("CAMWATCH_FEED_COMMAND")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from(DEFAULT_FEED_COMMAND));

        let snapshot_command = env::var("CAMWATCH_SNAPSHOT_COMMAND")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from(DEFAULT_SNAPSHOT_COMMAND));

        let model_suffix = env::var("CAMWATCH_MODEL_SUFFIX")
            .unwrap_or_else(|_| read_model_suffix(Path::new(MODEL_SUFFIX_FILE)));

        let address_endpoints = env::var("CAMWATCH_ADDRESS_ENDPOINTS")
            .map(|val| {
                val.split(',')
                    .map(|s| s.trim().to_string())
                    .filter(|s| !s.is_empty())
                    .collect::<Vec<_>>()
            })
            .ok()
            .filter(|endpoints| !endpoints.is_empty())
            .unwrap_or_else(|| DEFAULT_ADDRESS_ENDPOINTS.map(String::from).to_vec());

        Ok(Self {
            mail_from,
            mail_to,
            smtp,
            resolution,
            stream_link,
            stream_port,
            cooldown: Duration::from_secs(cooldown_secs),
            enabled_events,
            time_offset: TimeDelta::hours(offset_hours),
            host_label,
            feed_command,
            snapshot_command,
            model_suffix,
            address_endpoints,
        })
    }
}

fn required(key: &str) -> Result<String, ConfigError> {
    env::var(key)
        .ok()
        .filter(|val| !val.is_empty())
        .ok_or_else(|| ConfigError::MissingEnvVar(key.to_string()))
}

fn parse_or<T: FromStr>(key: &str, default: T) -> Result<T, ConfigError> {
    match env::var(key) {
        Ok(val) => val.trim().parse::<T>().map_err(|_| ConfigError::InvalidValue {
            key: key.to_string(),
            message: format!("expected integer, got '{val}'"),
        }),
        Err(_) => Ok(default),
    }
}

fn parse_switch(key: &str, val: &str) -> Result<bool, ConfigError> {
    match val.trim().to_ascii_lowercase().as_str() {
        "on" | "true" | "1" => Ok(true),
        "off" | "false" | "0" => Ok(false),
        _ => Err(ConfigError::InvalidValue {
            key: key.to_string(),
            message: format!("expected on or off, got '{val}'"),
        }),
    }
}

/// Reads the camera model from the device file, falling back to the default model.
pub fn read_model_suffix(path: &Path) -> String {
    std::fs::read_to_string(path)
        .ok()
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .unwrap_or_else(|| DEFAULT_MODEL_SUFFIX.to_string())
}

/// Gets the system hostname, falling back to "unknown" if it cannot be determined.
fn get_hostname() -> String {
    gethostname::gethostname()
        .into_string()
        .unwrap_or_else(|_| "unknown".to_string())
}
