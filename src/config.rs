use std::{env, net::SocketAddr, time::Duration};

use thiserror::Error;

pub const DEFAULT_OPENWEATHER_BASE_URL: &str = "https://api.openweathermap.org";
pub const DEFAULT_GRAPH_BASE_URL: &str = "https://graph.microsoft.com/v1.0";
pub const DEFAULT_UPSTREAM_TIMEOUT_SECS: u64 = 10;
pub const MAX_UPSTREAM_TIMEOUT_SECS: u64 = 120;

#[derive(Debug, Clone)]
pub struct Config {
    pub bind_addr: String,
    pub bind_port: u16,
    pub api_token: Option<String>,
    pub openweather_api_key: Option<String>,
    pub openweather_base_url: String,
    pub graph_base_url: String,
    pub graph_access_token: Option<String>,
    pub graph_user_id: String,
    pub upstream_timeout: Duration,
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("BIND_PORT must be a valid u16")]
    InvalidPort,
    #[error("UPSTREAM_TIMEOUT_SECS must be an integer between 1 and 120")]
    InvalidTimeout,
    #[error("invalid bind address or port")]
    InvalidSocket,
}

impl Config {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Builds the configuration from an arbitrary variable source.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let var = |key: &str| {
            lookup(key)
                .map(|value| value.trim().to_string())
                .filter(|value| !value.is_empty())
        };

        let bind_port = var("BIND_PORT")
            .map(|value| value.parse::<u16>().map_err(|_| ConfigError::InvalidPort))
            .transpose()?
            .unwrap_or(8080);
        let timeout_secs = var("UPSTREAM_TIMEOUT_SECS")
            .map(|value| {
                value
                    .parse::<u64>()
                    .ok()
                    .filter(|secs| (1..=MAX_UPSTREAM_TIMEOUT_SECS).contains(secs))
                    .ok_or(ConfigError::InvalidTimeout)
            })
            .transpose()?
            .unwrap_or(DEFAULT_UPSTREAM_TIMEOUT_SECS);

        let config = Self {
            bind_addr: var("BIND_ADDR").unwrap_or_else(|| "127.0.0.1".to_string()),
            bind_port,
            api_token: var("MCP_API_TOKEN"),
            openweather_api_key: var("OPENWEATHER_API_KEY"),
            openweather_base_url: var("OPENWEATHER_BASE_URL")
                .unwrap_or_else(|| DEFAULT_OPENWEATHER_BASE_URL.to_string()),
            graph_base_url: var("GRAPH_BASE_URL")
                .unwrap_or_else(|| DEFAULT_GRAPH_BASE_URL.to_string()),
            graph_access_token: var("GRAPH_ACCESS_TOKEN"),
            graph_user_id: var("GRAPH_USER_ID").unwrap_or_else(|| "default".to_string()),
            upstream_timeout: Duration::from_secs(timeout_secs),
        };

        let _ = config.bind_socket()?;
        Ok(config)
    }

    pub fn bind_socket(&self) -> Result<SocketAddr, ConfigError> {
        format!("{}:{}", self.bind_addr, self.bind_port)
            .parse::<SocketAddr>()
            .map_err(|_| ConfigError::InvalidSocket)
    }
}
