//! Logical channels and operation metadata
//!
//! An exec operation allocates up to four channels on the remote side and
//! publishes one endpoint token per channel in its metadata:
//!
//! ```json
//! { "fds": { "control": "c1f3...", "0": "9ab2...", "1": "77de...", "2": "04e1..." } }
//! ```

use crate::{ExecError, Result};
use serde_json::Value;
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

/// One logical channel of an exec session
///
/// Ordered control first, then by file descriptor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Channel {
    /// Out-of-band control channel
    Control,
    /// Remote stdin (fd 0)
    Stdin,
    /// Remote stdout (fd 1)
    Stdout,
    /// Remote stderr (fd 2)
    Stderr,
}

impl Channel {
    /// Every channel, in open order
    pub const ALL: [Channel; 4] = [
        Channel::Control,
        Channel::Stdin,
        Channel::Stdout,
        Channel::Stderr,
    ];

    /// Wire name of the channel
    pub fn as_str(&self) -> &'static str {
        match self {
            Channel::Control => "control",
            Channel::Stdin => "0",
            Channel::Stdout => "1",
            Channel::Stderr => "2",
        }
    }
}

impl fmt::Display for Channel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Channel {
    type Err = ExecError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "control" => Ok(Channel::Control),
            "0" => Ok(Channel::Stdin),
            "1" => Ok(Channel::Stdout),
            "2" => Ok(Channel::Stderr),
            other => Err(ExecError::InvalidArgument(format!(
                "unknown channel: {}",
                other
            ))),
        }
    }
}

/// Endpoint tokens of the channels an operation allocated
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ChannelMap {
    endpoints: BTreeMap<Channel, String>,
}

impl ChannelMap {
    /// Create an empty map
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a channel, builder style
    pub fn with(mut self, channel: Channel, endpoint: impl Into<String>) -> Self {
        self.insert(channel, endpoint);
        self
    }

    /// Set the endpoint of a channel; an empty token removes the channel
    pub fn insert(&mut self, channel: Channel, endpoint: impl Into<String>) {
        let endpoint = endpoint.into();
        if endpoint.is_empty() {
            self.endpoints.remove(&channel);
        } else {
            self.endpoints.insert(channel, endpoint);
        }
    }

    /// Get the endpoint of a channel
    pub fn get(&self, channel: Channel) -> Option<&str> {
        self.endpoints.get(&channel).map(String::as_str)
    }

    /// Check if a channel is present
    pub fn contains(&self, channel: Channel) -> bool {
        self.endpoints.contains_key(&channel)
    }

    /// Number of channels present
    pub fn len(&self) -> usize {
        self.endpoints.len()
    }

    /// Check if no channel is present
    pub fn is_empty(&self) -> bool {
        self.endpoints.is_empty()
    }

    /// Iterate present channels in open order
    pub fn iter(&self) -> impl Iterator<Item = (Channel, &str)> {
        self.endpoints.iter().map(|(c, e)| (*c, e.as_str()))
    }

    /// Parse the `fds` section of operation metadata
    ///
    /// Missing `fds` yields an empty map. Keys other than the four channel
    /// names are ignored.
    pub fn from_metadata(metadata: &Value) -> Result<Self> {
        let mut map = Self::new();

        let fds = match metadata.get("fds") {
            None | Some(Value::Null) => return Ok(map),
            Some(Value::Object(fds)) => fds,
            Some(_) => return Err(ExecError::Metadata("\"fds\" is not an object".to_string())),
        };

        for (key, value) in fds {
            let Ok(channel) = key.parse::<Channel>() else {
                continue;
            };
            let endpoint = value.as_str().ok_or_else(|| {
                ExecError::Metadata(format!("endpoint for channel {} is not a string", key))
            })?;
            map.insert(channel, endpoint);
        }

        Ok(map)
    }

    /// Parse operation metadata from JSON text
    pub fn from_json(json: &str) -> Result<Self> {
        let metadata: Value = serde_json::from_str(json)?;
        Self::from_metadata(&metadata)
    }
}
