//! Connection openers
//!
//! The exec coordinator opens one connection per logical channel through a
//! [`ConnectionOpener`]. [`TcpOpener`] is the stock implementation: it dials
//! the remote host over TCP and introduces the channel with a handshake.

use crate::{framed, Connection, Result, TransportError};
use async_trait::async_trait;
use execmux_proto::Handshake;
use std::time::Duration;
use tokio::net::{lookup_host, TcpStream};
use tokio::time::timeout;
use tracing::{debug, info};

/// Opens the connection backing one logical channel of an operation
#[async_trait]
pub trait ConnectionOpener: Send + Sync {
    /// Open the connection for `endpoint` within `operation_id`
    async fn open(&self, operation_id: &str, endpoint: &str) -> Result<Connection>;

    /// Check whether the remote side supports a named capability
    async fn supports(&self, capability: &str) -> Result<bool> {
        let _ = capability;
        Ok(true)
    }
}

/// TCP opener configuration
#[derive(Debug, Clone)]
pub struct OpenerConfig {
    /// Remote `host:port`
    pub address: String,
    /// Timeout for each connection attempt
    pub connect_timeout: Duration,
    /// Capabilities the remote side advertises
    pub capabilities: Vec<String>,
}

impl Default for OpenerConfig {
    fn default() -> Self {
        Self {
            address: "localhost:8444".to_string(),
            connect_timeout: Duration::from_secs(10),
            capabilities: vec!["container_exec".to_string()],
        }
    }
}

impl OpenerConfig {
    /// Create a configuration for the given address
    pub fn new(address: impl Into<String>) -> Self {
        Self {
            address: address.into(),
            ..Default::default()
        }
    }

    /// Set the per-attempt connect timeout
    pub fn with_connect_timeout(mut self, connect_timeout: Duration) -> Self {
        self.connect_timeout = connect_timeout;
        self
    }

    /// Set the advertised capabilities
    pub fn with_capabilities(mut self, capabilities: Vec<String>) -> Self {
        self.capabilities = capabilities;
        self
    }
}

/// Opener that dials channels over TCP
#[derive(Debug, Clone)]
pub struct TcpOpener {
    config: OpenerConfig,
}

impl TcpOpener {
    /// Create a new TCP opener
    pub fn new(config: OpenerConfig) -> Self {
        Self { config }
    }

    /// Get the opener configuration
    pub fn config(&self) -> &OpenerConfig {
        &self.config
    }

    /// Resolve the address and try every candidate once
    async fn dial(&self) -> Result<TcpStream> {
        let address = &self.config.address;
        let candidates = lookup_host(address.as_str())
            .await
            .map_err(|e| TransportError::Connection(format!("Failed to resolve {}: {}", address, e)))?;

        for candidate in candidates {
            match timeout(self.config.connect_timeout, TcpStream::connect(candidate)).await {
                Ok(Ok(stream)) => {
                    debug!("Connected to {} via {}", address, candidate);
                    return Ok(stream);
                }
                Ok(Err(e)) => debug!("Connection to {} failed: {}", candidate, e),
                Err(_) => debug!("Connection to {} timed out", candidate),
            }
        }

        Err(TransportError::Connection(format!(
            "Unable to connect to: {}",
            address
        )))
    }
}

#[async_trait]
impl ConnectionOpener for TcpOpener {
    async fn open(&self, operation_id: &str, endpoint: &str) -> Result<Connection> {
        if operation_id.is_empty() {
            return Err(TransportError::Configuration("operation id is empty".to_string()));
        }
        if endpoint.is_empty() {
            return Err(TransportError::Configuration("endpoint token is empty".to_string()));
        }

        let stream = self.dial().await?;
        stream.set_nodelay(true)?;

        let connection = framed::dial(stream, &Handshake::new(operation_id, endpoint)).await?;
        info!(
            connection = %connection.id(),
            "Opened channel connection for operation {}", operation_id
        );
        Ok(connection)
    }

    async fn supports(&self, capability: &str) -> Result<bool> {
        Ok(self.config.capabilities.iter().any(|c| c == capability))
    }
}
