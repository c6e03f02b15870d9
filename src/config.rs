//! Настройки HTTP сервера

use std::net::SocketAddr;

use serde::{Deserialize, Serialize};

use crate::error::{FeatureError, Result};

fn default_host() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    8000
}

fn default_max_upload_bytes() -> usize {
    16 * 1024 * 1024
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
    /// Предел размера тела запроса (CSV и JSON)
    #[serde(default = "default_max_upload_bytes")]
    pub max_upload_bytes: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            max_upload_bytes: default_max_upload_bytes(),
        }
    }
}

impl ServerConfig {
    /// FEATUREWISE_HOST, FEATUREWISE_PORT, FEATUREWISE_MAX_UPLOAD_BYTES
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Self::default();

        if let Some(host) = lookup("FEATUREWISE_HOST") {
            config.host = host;
        }
        if let Some(port) = lookup("FEATUREWISE_PORT") {
            config.port = port.trim().parse().map_err(|_| {
                FeatureError::InvalidConfig(format!("FEATUREWISE_PORT is not a valid port: '{}'", port))
            })?;
        }
        if let Some(limit) = lookup("FEATUREWISE_MAX_UPLOAD_BYTES") {
            config.max_upload_bytes = limit.trim().parse().map_err(|_| {
                FeatureError::InvalidConfig(format!(
                    "FEATUREWISE_MAX_UPLOAD_BYTES is not a byte count: '{}'",
                    limit
                ))
            })?;
        }
        Ok(config)
    }

    pub fn socket_addr(&self) -> Result<SocketAddr> {
        format!("{}:{}", self.host, self.port)
            .parse()
            .map_err(|_| {
                FeatureError::InvalidConfig(format!(
                    "Cannot build a socket address from '{}:{}'",
                    self.host, self.port
                ))
            })
    }
}
