use serde::Deserialize;
use std::net::SocketAddr;
use std::path::Path;
use std::time::Duration;

use crate::constants::{DEFAULT_BIND_ADDRESS, KEEPALIVE_INTERVAL, RECV_BUF_SIZE, WORKER_COUNT};

/// Contents of `yate.toml`. Every section and key is optional.
#[derive(Debug, Default, Deserialize)]
pub struct ClientConfig {
    #[serde(default)]
    pub client: ClientSection,
    #[serde(default)]
    pub logging: LoggingSection,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ClientSection {
    #[serde(default = "default_bind_address")]
    pub bind_address: String,
    /// Proxy to connect to on startup.
    #[serde(default)]
    pub server_address: Option<String>,
    #[serde(default = "default_workers")]
    pub workers: usize,
    #[serde(default = "default_keepalive_interval_ms")]
    pub keepalive_interval_ms: u64,
    #[serde(default = "default_recv_buffer_size")]
    pub recv_buffer_size: usize,
}

fn default_bind_address() -> String {
    DEFAULT_BIND_ADDRESS.into()
}

fn default_workers() -> usize {
    WORKER_COUNT
}

fn default_keepalive_interval_ms() -> u64 {
    KEEPALIVE_INTERVAL.as_millis() as u64
}

fn default_recv_buffer_size() -> usize {
    RECV_BUF_SIZE
}

impl Default for ClientSection {
    fn default() -> Self {
        Self {
            bind_address: default_bind_address(),
            server_address: None,
            workers: default_workers(),
            keepalive_interval_ms: default_keepalive_interval_ms(),
            recv_buffer_size: default_recv_buffer_size(),
        }
    }
}

impl ClientSection {
    pub fn keepalive_interval(&self) -> Duration {
        Duration::from_millis(self.keepalive_interval_ms)
    }

    pub fn server_addr(&self) -> Result<Option<SocketAddr>, std::net::AddrParseError> {
        self.server_address.as_deref().map(str::parse).transpose()
    }
}

#[derive(Debug, Deserialize)]
pub struct LoggingSection {
    #[serde(default = "default_log_level")]
    pub level: String,
}

fn default_log_level() -> String {
    "info".into()
}

impl Default for LoggingSection {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

impl ClientConfig {
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, Box<dyn std::error::Error>> {
        let contents = std::fs::read_to_string(path)?;
        let config: Self = toml::from_str(&contents)?;
        Ok(config)
    }
}
