//! Relay configuration

use anyhow::{anyhow, Result};
use execmux_proto::codec::MAX_FRAME_SIZE;
use std::env;

/// Relay configuration
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RelayConfig {
    /// Address of the first listener (default: "127.0.0.1:7001")
    pub listen_a: String,
    /// Address of the second listener (default: "127.0.0.1:7002")
    pub listen_b: String,
    /// Largest frame accepted on either leg
    pub max_frame_size: usize,
}

impl Default for RelayConfig {
    fn default() -> Self {
        Self {
            listen_a: "127.0.0.1:7001".to_string(),
            listen_b: "127.0.0.1:7002".to_string(),
            max_frame_size: MAX_FRAME_SIZE,
        }
    }
}

impl RelayConfig {
    /// Load configuration from environment variables.
    ///
    /// - `EXECMUX_RELAY_LISTEN_A` - first listen address
    /// - `EXECMUX_RELAY_LISTEN_B` - second listen address
    /// - `EXECMUX_RELAY_MAX_FRAME` - frame size limit in bytes
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Load configuration through an arbitrary variable lookup
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Self::default();

        let listen_a = lookup("EXECMUX_RELAY_LISTEN_A").unwrap_or(defaults.listen_a);
        let listen_b = lookup("EXECMUX_RELAY_LISTEN_B").unwrap_or(defaults.listen_b);
        if listen_a == listen_b {
            return Err(anyhow!("both legs are configured to listen on {}", listen_a));
        }

        let max_frame_size = match lookup("EXECMUX_RELAY_MAX_FRAME") {
            Some(value) => value
                .parse::<usize>()
                .ok()
                .filter(|size| *size > 0)
                .ok_or_else(|| anyhow!("invalid EXECMUX_RELAY_MAX_FRAME: {}", value))?,
            None => defaults.max_frame_size,
        };

        Ok(Self {
            listen_a,
            listen_b,
            max_frame_size,
        })
    }
}
