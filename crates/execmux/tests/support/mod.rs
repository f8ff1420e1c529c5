//! Shared test doubles for the integration tests

#![allow(dead_code)]

use async_trait::async_trait;
use execmux::proto::Message;
use execmux::transport::memory::{self, MemorySink};
use execmux::transport::{Connection, ConnectionOpener, MessageSink, Result, TransportError};
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

/// Sink that counts how often the transport is shut down
struct CountingSink {
    inner: MemorySink,
    closes: Arc<AtomicUsize>,
}

#[async_trait]
impl MessageSink for CountingSink {
    async fn send(&mut self, message: Message) -> Result<()> {
        self.inner.send(message).await
    }

    async fn close(&mut self) -> Result<()> {
        self.closes.fetch_add(1, Ordering::SeqCst);
        self.inner.close().await
    }
}

/// Opener backed by in-memory pairs that records every open and close
#[derive(Default)]
pub struct RecordingOpener {
    remotes: Mutex<HashMap<String, Connection>>,
    order: Mutex<Vec<String>>,
    failing: HashSet<String>,
    capabilities: Option<Vec<String>>,
    opens: AtomicUsize,
    closes: Arc<AtomicUsize>,
}

impl RecordingOpener {
    pub fn new() -> Self {
        Self::default()
    }

    /// Refuse to open `endpoint`
    pub fn fail_on(mut self, endpoint: &str) -> Self {
        self.failing.insert(endpoint.to_string());
        self
    }

    /// Only advertise the given capabilities
    pub fn with_capabilities(mut self, capabilities: &[&str]) -> Self {
        self.capabilities = Some(capabilities.iter().map(|c| c.to_string()).collect());
        self
    }

    /// Remote end of the connection opened for `endpoint`
    pub fn remote(&self, endpoint: &str) -> Connection {
        self.remotes
            .lock()
            .unwrap()
            .get(endpoint)
            .cloned()
            .unwrap_or_else(|| panic!("endpoint {} was never opened", endpoint))
    }

    pub fn was_opened(&self, endpoint: &str) -> bool {
        self.remotes.lock().unwrap().contains_key(endpoint)
    }

    /// Endpoints in the order open was attempted
    pub fn open_order(&self) -> Vec<String> {
        self.order.lock().unwrap().clone()
    }

    /// Connections handed out
    pub fn opens(&self) -> usize {
        self.opens.load(Ordering::SeqCst)
    }

    /// Transport shutdowns of handed-out connections
    pub fn closes(&self) -> usize {
        self.closes.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ConnectionOpener for RecordingOpener {
    async fn open(&self, _operation_id: &str, endpoint: &str) -> Result<Connection> {
        self.order.lock().unwrap().push(endpoint.to_string());
        if self.failing.contains(endpoint) {
            return Err(TransportError::Connection(format!(
                "endpoint {} refused",
                endpoint
            )));
        }

        let ((source, sink), (remote_source, remote_sink)) = memory::halves(16);
        let local = Connection::new(
            Box::new(source),
            Box::new(CountingSink {
                inner: sink,
                closes: Arc::clone(&self.closes),
            }),
        );
        let remote = Connection::new(Box::new(remote_source), Box::new(remote_sink));

        self.remotes
            .lock()
            .unwrap()
            .insert(endpoint.to_string(), remote);
        self.opens.fetch_add(1, Ordering::SeqCst);
        Ok(local)
    }

    async fn supports(&self, capability: &str) -> Result<bool> {
        Ok(match &self.capabilities {
            Some(capabilities) => capabilities.iter().any(|c| c == capability),
            None => true,
        })
    }
}

/// Read binary payloads from `connection` until a barrier, close or error
pub async fn collect_until_end(connection: &Connection) -> (Vec<u8>, Option<Message>) {
    let mut data = Vec::new();
    loop {
        match connection.next_message().await {
            Ok(Message::Binary(payload)) => data.extend_from_slice(&payload),
            Ok(other) => return (data, Some(other)),
            Err(_) => return (data, None),
        }
    }
}
