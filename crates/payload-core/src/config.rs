//! Configuration system for the payload daemon.
//!
//! Resolution order: environment variables → config file → defaults.
//!
//! Config file location:
//!   1. $PAYLOAD_CONFIG (explicit override)
//!   2. $XDG_CONFIG_HOME/payload/config.toml
//!   3. ~/.config/payload/config.toml

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

/// Top-level configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct PayloadConfig {
    pub link: LinkConfig,
    pub transport: TransportSettings,
    pub controller: ControllerSettings,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LinkConfig {
    /// Serial device path.
    pub device: PathBuf,
    pub baud_rate: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TransportSettings {
    /// How long `send` waits for each ACK.
    pub ack_timeout_ms: u64,
    /// How long `receive` waits for each header/data frame.
    pub data_timeout_ms: u64,
    /// Mismatched data packets tolerated per message before giving up.
    pub max_retries: u32,
    /// Header restarts tolerated per send before giving up.
    pub max_restarts: u32,
    /// Whole-message resends after a send timeout. 0 = abandon.
    pub resend_attempts: u32,
    /// Delay between transport loop iterations.
    pub idle_delay_ms: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ControllerSettings {
    /// Delay between controller cycles while NOMINAL.
    pub cycle_delay_ms: u64,
    /// Consecutive empty dequeues before dropping to IDLE.
    pub idle_after_empty_cycles: u32,
    /// Sleep per cycle while IDLE or in a fault state.
    pub idle_interval_secs: u64,
    /// Priority for tasks whose handler was registered without one.
    pub default_priority: u8,
}

// ── Defaults ──────────────────────────────────────────────────────────────────

impl Default for LinkConfig {
    fn default() -> Self {
        Self {
            device: PathBuf::from("/dev/ttyTHS0"),
            baud_rate: 57600,
        }
    }
}

impl Default for TransportSettings {
    fn default() -> Self {
        Self {
            ack_timeout_ms: 5000,
            data_timeout_ms: 5000,
            max_retries: 3,
            max_restarts: 3,
            resend_attempts: 0,
            idle_delay_ms: 100,
        }
    }
}

impl Default for ControllerSettings {
    fn default() -> Self {
        Self {
            cycle_delay_ms: 100,
            idle_after_empty_cycles: 5,
            idle_interval_secs: 10,
            default_priority: 100,
        }
    }
}

impl TransportSettings {
    pub fn ack_timeout(&self) -> Duration {
        Duration::from_millis(self.ack_timeout_ms)
    }

    pub fn data_timeout(&self) -> Duration {
        Duration::from_millis(self.data_timeout_ms)
    }

    pub fn idle_delay(&self) -> Duration {
        Duration::from_millis(self.idle_delay_ms)
    }
}

impl ControllerSettings {
    pub fn cycle_delay(&self) -> Duration {
        Duration::from_millis(self.cycle_delay_ms)
    }

    pub fn idle_interval(&self) -> Duration {
        Duration::from_secs(self.idle_interval_secs)
    }
}

// ── Path helpers ──────────────────────────────────────────────────────────────

fn config_dir() -> PathBuf {
    std::env::var("XDG_CONFIG_HOME")
        .map(PathBuf::from)
        .unwrap_or_else(|_| home_dir().join(".config"))
        .join("payload")
}

fn home_dir() -> PathBuf {
    std::env::var("HOME")
        .map(PathBuf::from)
        .unwrap_or_else(|_| PathBuf::from("/tmp"))
}

// ── Errors ────────────────────────────────────────────────────────────────────

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read {0}: {1}")]
    ReadFailed(PathBuf, std::io::Error),
    #[error("failed to parse {0}: {1}")]
    ParseFailed(PathBuf, toml::de::Error),
    #[error("failed to write {0}: {1}")]
    WriteFailed(PathBuf, std::io::Error),
    #[error("failed to serialize: {0}")]
    SerializeFailed(toml::ser::Error),
}

// ── Loading ───────────────────────────────────────────────────────────────────

impl PayloadConfig {
    /// Load config: env vars → file → defaults.
    pub fn load() -> Result<Self, ConfigError> {
        let path = Self::file_path();
        let mut config = if path.exists() {
            let text = std::fs::read_to_string(&path)
                .map_err(|e| ConfigError::ReadFailed(path.clone(), e))?;
            Self::from_toml(&text).map_err(|e| ConfigError::ParseFailed(path.clone(), e))?
        } else {
            PayloadConfig::default()
        };
        config.apply_env_overrides(|key| std::env::var(key).ok());
        Ok(config)
    }

    pub fn from_toml(text: &str) -> Result<Self, toml::de::Error> {
        toml::from_str(text)
    }

    /// Config file path.
    pub fn file_path() -> PathBuf {
        std::env::var("PAYLOAD_CONFIG")
            .map(PathBuf::from)
            .unwrap_or_else(|_| config_dir().join("config.toml"))
    }

    /// Write default config if none exists. Returns the path.
    pub fn write_default_if_missing() -> Result<PathBuf, ConfigError> {
        let path = Self::file_path();
        if !path.exists() {
            if let Some(parent) = path.parent() {
                std::fs::create_dir_all(parent)
                    .map_err(|e| ConfigError::WriteFailed(path.clone(), e))?;
            }
            let text = toml::to_string_pretty(&PayloadConfig::default())
                .map_err(ConfigError::SerializeFailed)?;
            std::fs::write(&path, text).map_err(|e| ConfigError::WriteFailed(path.clone(), e))?;
        }
        Ok(path)
    }

    /// Apply PAYLOAD_* overrides. `lookup` is the environment in production
    /// and a map in tests.
    fn apply_env_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        if let Some(v) = lookup("PAYLOAD_LINK__DEVICE") {
            self.link.device = PathBuf::from(v);
        }
        if let Some(v) = lookup("PAYLOAD_LINK__BAUD_RATE") {
            if let Ok(b) = v.parse() {
                self.link.baud_rate = b;
            }
        }
        if let Some(v) = lookup("PAYLOAD_TRANSPORT__ACK_TIMEOUT_MS") {
            if let Ok(ms) = v.parse() {
                self.transport.ack_timeout_ms = ms;
            }
        }
        if let Some(v) = lookup("PAYLOAD_CONTROLLER__IDLE_INTERVAL_SECS") {
            if let Ok(s) = v.parse() {
                self.controller.idle_interval_secs = s;
            }
        }
    }
}
