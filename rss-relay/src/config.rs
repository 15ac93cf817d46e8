//! Configuration types and loading.
//!
//! Config is read from a YAML file, either the path given on the command line
//! or `config.yaml` in the platform config directory (e.g.
//! `~/.config/rss-relay/config.yaml`). Defaults are filled in and every
//! invariant the pollers rely on is checked before anything starts.

use crate::types::{FetchConfig, RelayError, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;
use tracing::Level;
use url::Url;

const CONFIG_FILENAME: &str = "config.yaml";
const APPLICATION_NAME: &str = "rss-relay";

pub const DEFAULT_MAX_HISTORY: usize = 3;
pub const DEFAULT_PORT: u16 = 6667;
pub const DEFAULT_NICKNAME: &str = "rssrelay";
pub const DEFAULT_RECONNECT_DELAY_MINUTES: u64 = 10;
pub const MIN_POLL_DELAY_MINUTES: u64 = 1;
/// Upper bound for any delay given in minutes (one year).
pub const MAX_DELAY_MINUTES: u64 = 365 * 24 * 60;

/// Top-level application config.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub irc: IrcConfig,

    /// One entry per relayed feed.
    #[serde(default)]
    pub rss: Vec<FeedConfig>,

    /// HTTP settings shared by every feed fetch.
    #[serde(default)]
    pub http: FetchConfig,

    #[serde(default = "default_log_level")]
    pub log_level: String,
}

/// Connection settings for the IRC network.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct IrcConfig {
    pub server: String,
    pub port: u16,
    pub nickname: String,
    pub ident: String,
    pub real_name: String,

    /// Joined after registration (or after NickServ login).
    pub channels: Vec<String>,

    /// User modes applied after registration, e.g. `+B`.
    pub modes: String,
    pub nickserv_password: String,
    pub server_password: String,

    pub use_tls: bool,
    pub tls_accept_invalid_certs: bool,

    pub max_reconnect: u32,
    /// Minutes between health checks.
    pub reconnect_delay: u64,

    /// Log every outbound line.
    pub debug: bool,
    /// Log every inbound line and each passing health check.
    pub verbose: bool,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct FeedConfig {
    pub feed_url: String,

    #[serde(default)]
    pub channels: Vec<String>,

    /// Minutes between polls.
    #[serde(default)]
    pub poll_delay: u64,

    /// Fetch window and cache capacity.
    #[serde(default)]
    pub max_history: usize,
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Config {
    /// Load, default and validate configuration.
    ///
    /// With no path the platform config directory is searched.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let path = match path {
            Some(path) => path.to_path_buf(),
            None => default_config_path().ok_or_else(|| {
                RelayError::Config(format!(
                    "{} doesn't exist in the global settings directory",
                    CONFIG_FILENAME
                ))
            })?,
        };

        let data = std::fs::read_to_string(&path)?;
        Self::from_yaml(&data)
    }

    pub fn from_yaml(data: &str) -> Result<Self> {
        let mut config: Config = serde_yaml::from_str(data)?;
        config.apply_defaults();
        config.validate()?;
        Ok(config)
    }

    fn apply_defaults(&mut self) {
        let irc = &mut self.irc;

        if irc.port == 0 {
            irc.port = DEFAULT_PORT;
        }
        if irc.nickname.is_empty() {
            irc.nickname = DEFAULT_NICKNAME.to_string();
        }
        if irc.ident.is_empty() {
            irc.ident = irc.nickname.clone();
        }
        if irc.real_name.is_empty() {
            irc.real_name = irc.nickname.clone();
        }
        if irc.reconnect_delay == 0 {
            irc.reconnect_delay = DEFAULT_RECONNECT_DELAY_MINUTES;
        }

        for feed in &mut self.rss {
            if feed.max_history == 0 {
                feed.max_history = DEFAULT_MAX_HISTORY;
            }
        }
    }

    fn validate(&self) -> Result<()> {
        if self.irc.server.trim().is_empty() {
            return Err(RelayError::Config("irc.server must be set".to_string()));
        }
        if self.irc.reconnect_delay > MAX_DELAY_MINUTES {
            return Err(RelayError::Config(format!(
                "the maximum reconnect delay is {} minutes",
                MAX_DELAY_MINUTES
            )));
        }

        for feed in &self.rss {
            let url = Url::parse(&feed.feed_url)?;
            if !matches!(url.scheme(), "http" | "https") || url.host().is_none() {
                return Err(RelayError::Config(format!(
                    "feed_url must be an http(s) URL: {}",
                    feed.feed_url
                )));
            }

            if feed.poll_delay < MIN_POLL_DELAY_MINUTES {
                return Err(RelayError::Config(format!(
                    "the minimum poll delay is {} minute (feed {})",
                    MIN_POLL_DELAY_MINUTES, feed.feed_url
                )));
            }
            if feed.poll_delay > MAX_DELAY_MINUTES {
                return Err(RelayError::Config(format!(
                    "the maximum poll delay is {} minutes (feed {})",
                    MAX_DELAY_MINUTES, feed.feed_url
                )));
            }
        }

        Ok(())
    }

    /// Configured log level, `info` when unparseable.
    pub fn log_level(&self) -> Level {
        parse_log_level(&self.log_level)
    }
}

impl IrcConfig {
    pub fn address(&self) -> String {
        format!("{}:{}", self.server, self.port)
    }

    pub fn reconnect_interval(&self) -> Duration {
        Duration::from_secs(self.reconnect_delay.saturating_mul(60))
    }
}

impl FeedConfig {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.poll_delay.saturating_mul(60))
    }
}

pub fn parse_log_level(level: &str) -> Level {
    Level::from_str(level.trim()).unwrap_or(Level::INFO)
}

/// `<config dir>/rss-relay/config.yaml`, if that file exists.
pub fn default_config_path() -> Option<PathBuf> {
    dirs::config_dir()
        .map(|dir| dir.join(APPLICATION_NAME).join(CONFIG_FILENAME))
        .filter(|path| path.is_file())
}
