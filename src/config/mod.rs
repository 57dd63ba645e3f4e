//! # Configuration Management Module
//!
//! Loads, validates and writes the TOML configuration used by the `slipxfer`
//! binary. Every section has defaults, so a partial file is enough.
//!
//! ## Configuration Structure
//!
//! - [`SerialConfig`] - Device port and polling behaviour
//! - [`TransferConfig`] - Frame limits, sink selection and flow control
//! - [`SenderConfig`] - Host-side chunking and retry policy
//! - [`LoggingConfig`] - Log level and optional log file
//!
//! ## Usage
//!
//! ```rust,no_run
//! use slipxfer::config::Config;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let config = Config::load("config.toml").await?;
//!     println!("Serial Port: {}", config.serial.port);
//!
//!     Config::create_default("config.toml").await?;
//!     Ok(())
//! }
//! ```
//!
//! ## Configuration File Format
//!
//! ```toml
//! [serial]
//! port = "/dev/ttyUSB0"
//! baud_rate = 115200
//!
//! [transfer]
//! sink = "file"
//! output_dir = "./received"
//! sink_capacity = 10240
//! flow_control = true
//! ```
//!
//! CLI arguments override values from the file.

use crate::link::slip::DEFAULT_MAX_FRAME;
use crate::transfer::sender::{MAX_CHUNK, MIN_CHUNK};
use crate::transfer::wire::{DATA_HEADER_LEN, META_HEADER_LEN};
use anyhow::{anyhow, bail, Result};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tokio::fs;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub serial: SerialConfig,
    #[serde(default)]
    pub transfer: TransferConfig,
    #[serde(default)]
    pub sender: SenderConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SerialConfig {
    pub port: String,
    pub baud_rate: u32,
    /// Upper bound for a single driver read/write (ms).
    pub read_timeout_ms: u64,
    /// Pause when no byte is waiting (ms).
    pub idle_sleep_ms: u64,
}

impl Default for SerialConfig {
    fn default() -> Self {
        Self {
            port: "/dev/ttyUSB0".to_string(),
            baud_rate: 115200,
            read_timeout_ms: 50,
            idle_sleep_ms: 5,
        }
    }
}

impl SerialConfig {
    pub fn read_timeout(&self) -> Duration {
        Duration::from_millis(self.read_timeout_ms)
    }

    pub fn idle_sleep(&self) -> Duration {
        Duration::from_millis(self.idle_sleep_ms)
    }
}

/// Where reassembled bytes go.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum SinkKind {
    /// Fixed in-memory region.
    Memory,
    /// File under `output_dir`.
    File,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TransferConfig {
    /// Largest decoded SLIP frame accepted (bytes).
    pub max_frame: usize,
    pub sink: SinkKind,
    /// Largest transfer accepted (bytes).
    pub sink_capacity: u32,
    pub output_dir: String,
    /// Reply ACK/END/BAD after each processed frame.
    pub flow_control: bool,
}

impl Default for TransferConfig {
    fn default() -> Self {
        Self {
            max_frame: DEFAULT_MAX_FRAME,
            sink: SinkKind::File,
            sink_capacity: 10 * 1024,
            output_dir: "./received".to_string(),
            flow_control: false,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SenderConfig {
    /// DATA payload size; clamped to 64..=4096.
    pub chunk: usize,
    pub ack_timeout_ms: u64,
    pub max_retries: u32,
}

impl Default for SenderConfig {
    fn default() -> Self {
        Self {
            chunk: 1024,
            ack_timeout_ms: 2000,
            max_retries: 3,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    pub level: String,
    pub file: Option<String>,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            file: None,
        }
    }
}

impl LoggingConfig {
    /// Parsed level; unknown names fall back to `info`.
    pub fn level_filter(&self) -> log::LevelFilter {
        self.level.parse().unwrap_or(log::LevelFilter::Info)
    }
}

impl Config {
    /// Load configuration from a file
    pub async fn load(path: &str) -> Result<Self> {
        let content = fs::read_to_string(path)
            .await
            .map_err(|e| anyhow!("Failed to read config file {}: {}", path, e))?;

        let config: Config = toml::from_str(&content)
            .map_err(|e| anyhow!("Failed to parse config file {}: {}", path, e))?;

        config.validate()?;
        Ok(config)
    }

    /// Create a default configuration file
    pub async fn create_default(path: &str) -> Result<()> {
        let config = Config::default();
        let content = toml::to_string_pretty(&config)
            .map_err(|e| anyhow!("Failed to serialize default config: {}", e))?;

        fs::write(path, content)
            .await
            .map_err(|e| anyhow!("Failed to write config file {}: {}", path, e))?;

        Ok(())
    }

    /// Reject combinations that could never carry a transfer.
    pub fn validate(&self) -> Result<()> {
        if self.transfer.max_frame < META_HEADER_LEN {
            bail!(
                "transfer.max_frame ({}) is smaller than a META header ({} bytes)",
                self.transfer.max_frame,
                META_HEADER_LEN
            );
        }
        if self.transfer.sink_capacity == 0 {
            bail!("transfer.sink_capacity must be greater than zero");
        }
        if self.serial.baud_rate == 0 {
            bail!("serial.baud_rate must be greater than zero");
        }
        let chunk = self.sender.chunk.clamp(MIN_CHUNK, MAX_CHUNK);
        if chunk + DATA_HEADER_LEN > self.transfer.max_frame {
            bail!(
                "sender.chunk ({}) plus DATA header does not fit transfer.max_frame ({})",
                chunk,
                self.transfer.max_frame
            );
        }
        Ok(())
    }
}
