//! Configuration management
//!
//! This module handles loading helper settings from TOML files. Every knob
//! has a default matching the stock connectivity check deployment, so the
//! helper runs without any config file at all.

use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::PathBuf;
use std::time::Duration;

/// Root configuration structure
#[derive(Debug, Deserialize, Clone, Default)]
pub struct Config {
    /// Connectivity probe settings
    #[serde(default)]
    pub connectivity: ConnectivityConfig,

    /// Service lifecycle settings
    #[serde(default)]
    pub service: ServiceConfig,

    /// Logging settings
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Connectivity probe settings
#[derive(Debug, Deserialize, Clone)]
pub struct ConnectivityConfig {
    /// Host the operator's connectivity probe answers on
    #[serde(default = "default_check_host")]
    pub check_host: String,

    /// Scheme used to reach the probe
    #[serde(default = "default_check_scheme")]
    pub check_scheme: String,

    /// Minimum interval between recheck signals for one session, in seconds
    #[serde(default = "default_recheck_ratelimit")]
    pub recheck_ratelimit_secs: u64,
}

impl ConnectivityConfig {
    /// Full URL of the connectivity check endpoint
    pub fn check_url(&self) -> String {
        format!("{}://{}", self.check_scheme, self.check_host)
    }

    pub fn recheck_ratelimit(&self) -> Duration {
        Duration::from_secs(self.recheck_ratelimit_secs)
    }
}

impl Default for ConnectivityConfig {
    fn default() -> Self {
        Self {
            check_host: default_check_host(),
            check_scheme: default_check_scheme(),
            recheck_ratelimit_secs: default_recheck_ratelimit(),
        }
    }
}

/// Service lifecycle settings
#[derive(Debug, Deserialize, Clone)]
pub struct ServiceConfig {
    /// Seconds to keep the service alive with no pending session
    #[serde(default = "default_inactivity_timeout")]
    pub inactivity_timeout_secs: u64,
}

impl ServiceConfig {
    pub fn inactivity_timeout(&self) -> Duration {
        Duration::from_secs(self.inactivity_timeout_secs)
    }
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            inactivity_timeout_secs: default_inactivity_timeout(),
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct LoggingConfig {
    /// Log level
    #[serde(default = "default_log_level")]
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

// Default value functions
fn default_check_host() -> String {
    "nmcheck.gnome.org".to_string()
}

fn default_check_scheme() -> String {
    "http".to_string()
}

fn default_recheck_ratelimit() -> u64 {
    30
}

fn default_inactivity_timeout() -> u64 {
    30
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Config {
    /// Load configuration from an explicit path, the usual locations, or
    /// fall back to defaults if no file is found
    pub fn load(path: Option<&str>) -> Result<Self> {
        if let Some(path) = path {
            let contents = std::fs::read_to_string(path)
                .with_context(|| format!("Failed to read config file: {}", path))?;
            return toml::from_str(&contents).context("Failed to parse config file");
        }

        let config_paths = vec![
            PathBuf::from("portal-helper.toml"),
            PathBuf::from("/etc/portal-helper/config.toml"),
            dirs::config_dir()
                .map(|d| d.join("portal-helper/config.toml"))
                .unwrap_or_default(),
        ];

        for path in &config_paths {
            if path.exists() {
                let contents = std::fs::read_to_string(path)
                    .context("Failed to read config file")?;

                let config: Config = toml::from_str(&contents)
                    .context("Failed to parse config file")?;

                return Ok(config);
            }
        }

        Ok(Self::default())
    }
}
