use std::net::{Ipv4Addr, SocketAddr};
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Deserialize;

use crate::tracker::TrackerConfig;

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct Config {
    pub serial: SerialConfig,
    pub monitor: MonitorConfig,
    pub server: ServerConfig,
    pub link: LinkConfig,
}

#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct SerialConfig {
    /// Device path or COM name
    pub port: String,
    pub baud_rate: u32,
    /// Read timeout; bounds how long closing a session can take
    pub read_timeout_ms: u64,
    /// Wait after opening while the board resets
    pub boot_delay_ms: u64,
}

#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct MonitorConfig {
    /// Alerts kept before the oldest is evicted
    pub journal_capacity: usize,
    /// Seconds before the device phase falls back to idle
    pub idle_timeout_secs: u64,
    /// Seconds a transient notice stays up
    pub notice_timeout_secs: u64,
}

#[derive(Debug, Deserialize)]
pub struct ServerConfig {
    /// Address for the HTTP server to listen on
    pub http_addr: SocketAddr,
}

#[derive(Debug, Default, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum LinkConfig {
    /// Real device on `[serial]`.
    #[default]
    Serial,
    Mock {
        /// Transcript replayed line by line
        script: PathBuf,
        /// Delay before each line
        #[serde(default)]
        line_interval_ms: u64,
        /// Keep the link open once the transcript is done
        #[serde(default)]
        hold_open: bool,
    },
}

impl Config {
    pub fn load(path: &Path) -> color_eyre::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: Config = toml::from_str(&content)?;
        Ok(config)
    }
}

impl SerialConfig {
    pub fn read_timeout(&self) -> Duration {
        Duration::from_millis(self.read_timeout_ms)
    }

    pub fn boot_delay(&self) -> Duration {
        Duration::from_millis(self.boot_delay_ms)
    }
}

impl MonitorConfig {
    pub fn tracker(&self) -> TrackerConfig {
        TrackerConfig {
            journal_capacity: self.journal_capacity,
            idle_timeout: Duration::from_secs(self.idle_timeout_secs),
            notice_timeout: Duration::from_secs(self.notice_timeout_secs),
        }
    }
}

impl Default for SerialConfig {
    fn default() -> Self {
        Self {
            port: "/dev/ttyUSB0".to_string(),
            baud_rate: 115_200,
            read_timeout_ms: 100,
            boot_delay_ms: 2000,
        }
    }
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            journal_capacity: 500,
            idle_timeout_secs: 4,
            notice_timeout_secs: 5,
        }
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            http_addr: SocketAddr::from((Ipv4Addr::LOCALHOST, 8082)),
        }
    }
}
