//! Exec session coordination
//!
//! [`ExecCoordinator::start`] opens one connection per channel the remote
//! side allocated, attaches pumps to them, and returns as soon as every
//! channel is open. The data transfer and teardown run in the background;
//! the caller watches the session's completion signal.
//!
//! Interactive sessions mirror local stdin and stdout over channel `0`.
//! Non-interactive sessions pump stdin to channel `0` and channels `1` and
//! `2` to local stdout and stderr; once both outputs end, stdin forwarding
//! is cancelled. Either way every opened connection is closed exactly once
//! before the session reports completion.

use crate::channel::{Channel, ChannelMap};
use crate::config::SessionConfig;
use crate::inbound::recv_stream;
use crate::mirror::{Mirror, MirrorHandle};
use crate::outbound::{send_stream, OutboundPump};
use crate::signal::{completion, Completion, CompletionSignal};
use crate::{ExecError, LocalReader, LocalWriter, Result};
use async_trait::async_trait;
use execmux_transport::{Connection, ConnectionOpener, TransportError};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use uuid::Uuid;

/// Remote command descriptor
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExecCommand {
    /// Program and arguments
    pub command: Vec<String>,
    /// Extra environment for the command
    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub environment: HashMap<String, String>,
    /// Attach a TTY-style stdin/stdout pair
    #[serde(default)]
    pub interactive: bool,
    /// Terminal width
    #[serde(default)]
    pub width: u32,
    /// Terminal height
    #[serde(default)]
    pub height: u32,
}

impl ExecCommand {
    /// Create a non-interactive command
    pub fn new<I, S>(command: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            command: command.into_iter().map(Into::into).collect(),
            ..Default::default()
        }
    }

    /// Set the interactive flag
    pub fn interactive(mut self, interactive: bool) -> Self {
        self.interactive = interactive;
        self
    }

    /// Add an environment variable
    pub fn with_env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.environment.insert(key.into(), value.into());
        self
    }

    /// Set the terminal size
    pub fn with_size(mut self, width: u32, height: u32) -> Self {
        self.width = width;
        self.height = height;
        self
    }
}

/// Handler for the out-of-band control channel
///
/// Runs on its own task for as long as it likes; the session does not wait
/// for it. The coordinator still closes the control connection at teardown.
#[async_trait]
pub trait ControlHandler: Send + Sync + 'static {
    /// Take over the control connection
    async fn handle(&self, connection: Connection);
}

/// Local endpoints and hooks for one exec session
#[derive(Default)]
pub struct ExecArgs {
    /// Local source for the remote stdin
    pub stdin: Option<LocalReader>,
    /// Local sink for the remote stdout
    pub stdout: Option<LocalWriter>,
    /// Local sink for the remote stderr
    pub stderr: Option<LocalWriter>,
    /// Control channel handler
    pub control: Option<Box<dyn ControlHandler>>,
    /// Fired once the session has closed all its connections
    pub data_done: Option<Completion>,
}

impl ExecArgs {
    /// Create empty arguments
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the local stdin
    pub fn with_stdin(mut self, stdin: LocalReader) -> Self {
        self.stdin = Some(stdin);
        self
    }

    /// Set the local stdout
    pub fn with_stdout(mut self, stdout: LocalWriter) -> Self {
        self.stdout = Some(stdout);
        self
    }

    /// Set the local stderr
    pub fn with_stderr(mut self, stderr: LocalWriter) -> Self {
        self.stderr = Some(stderr);
        self
    }

    /// Set the control channel handler
    pub fn with_control(mut self, control: Box<dyn ControlHandler>) -> Self {
        self.control = Some(control);
        self
    }

    /// Set the completion fired after teardown
    pub fn with_data_done(mut self, data_done: Completion) -> Self {
        self.data_done = Some(data_done);
        self
    }
}

impl fmt::Debug for ExecArgs {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ExecArgs")
            .field("stdin", &self.stdin.is_some())
            .field("stdout", &self.stdout.is_some())
            .field("stderr", &self.stderr.is_some())
            .field("control", &self.control.is_some())
            .field("data_done", &self.data_done.is_some())
            .finish()
    }
}

/// Lifecycle of an exec session
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    /// Validating and opening channels
    Starting,
    /// Every channel connection is open
    ChannelsBound,
    /// Pumps are moving data
    Running,
    /// Pumps are done, connections are being closed
    Draining,
    /// Every connection is closed
    Closed,
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            SessionState::Starting => "starting",
            SessionState::ChannelsBound => "channels-bound",
            SessionState::Running => "running",
            SessionState::Draining => "draining",
            SessionState::Closed => "closed",
        };
        f.write_str(name)
    }
}

/// Handle to a running exec session
#[derive(Debug, Clone)]
pub struct ExecSession {
    id: Uuid,
    operation_id: String,
    channels: Vec<Channel>,
    state: watch::Receiver<SessionState>,
    done: CompletionSignal,
}

impl ExecSession {
    /// Get the session ID
    pub fn id(&self) -> Uuid {
        self.id
    }

    /// Get the remote operation ID
    pub fn operation_id(&self) -> &str {
        &self.operation_id
    }

    /// Channels opened for this session
    pub fn channels(&self) -> &[Channel] {
        &self.channels
    }

    /// Current lifecycle state
    pub fn state(&self) -> SessionState {
        *self.state.borrow()
    }

    /// Signal fired once the session is closed
    pub fn done(&self) -> CompletionSignal {
        self.done.clone()
    }

    /// Wait for the session to close
    pub async fn wait(&self) {
        self.done.wait().await
    }
}

/// How the data channels are being driven
enum DataPlan {
    /// Nothing to pump
    Idle,
    /// Stdin and stdout mirrored over channel `0`
    Interactive {
        mirror: MirrorHandle,
        cancel: CancellationToken,
    },
    /// Independent pumps per channel
    Streams {
        outputs: Vec<(Channel, CompletionSignal)>,
        stdin: CompletionSignal,
        cancel: CancellationToken,
    },
}

/// Starts exec sessions through a connection opener
#[derive(Clone)]
pub struct ExecCoordinator {
    opener: Arc<dyn ConnectionOpener>,
    config: SessionConfig,
}

impl ExecCoordinator {
    /// Create a coordinator with the default configuration
    pub fn new(opener: Arc<dyn ConnectionOpener>) -> Self {
        Self {
            opener,
            config: SessionConfig::default(),
        }
    }

    /// Set the session configuration
    pub fn with_config(mut self, config: SessionConfig) -> Self {
        self.config = config;
        self
    }

    /// Get the session configuration
    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    /// Start an exec session for `operation_id`
    ///
    /// Fails before any pump starts if the arguments are invalid, the remote
    /// side lacks the required capability, or any channel cannot be opened.
    /// In the last case every channel opened so far is closed first.
    pub async fn start(
        &self,
        operation_id: &str,
        channels: &ChannelMap,
        command: &ExecCommand,
        mut args: ExecArgs,
    ) -> Result<ExecSession> {
        validate(operation_id, channels, command, &args)?;

        if let Some(capability) = &self.config.required_capability {
            if !self.opener.supports(capability).await? {
                return Err(ExecError::NotSupported(format!(
                    "api extension \"{}\"",
                    capability
                )));
            }
        }

        let id = Uuid::new_v4();
        let (state_tx, state) = watch::channel(SessionState::Starting);

        let connections = self.open_channels(operation_id, channels).await?;
        state_tx.send_replace(SessionState::ChannelsBound);
        debug!(session = %id, "Opened {} channel(s) for operation {}", connections.len(), operation_id);

        let connection = |channel: Channel| {
            connections
                .iter()
                .find(|(c, _)| *c == channel)
                .map(|(_, conn)| conn.clone())
        };

        if let (Some(conn), Some(handler)) = (connection(Channel::Control), args.control.take()) {
            debug!(session = %id, "Starting control handler");
            tokio::spawn(async move { handler.handle(conn).await });
        }

        let plan = if command.interactive {
            match (connection(Channel::Stdin), args.stdin.take(), args.stdout.take()) {
                (Some(conn), Some(stdin), Some(stdout)) => {
                    let cancel = CancellationToken::new();
                    let outbound = OutboundPump::mirror()
                        .with_config(self.config.stream.clone())
                        .with_cancellation(cancel.clone());
                    let mirror = Mirror::default()
                        .with_outbound(Arc::new(outbound))
                        .start(&conn, stdout, stdin);
                    DataPlan::Interactive { mirror, cancel }
                }
                _ => DataPlan::Idle,
            }
        } else {
            let cancel = CancellationToken::new();
            let stdin = match connection(Channel::Stdin) {
                Some(conn) => {
                    let pump = OutboundPump::new(self.config.stream.clone())
                        .with_end_of_input(self.config.stdin_end)
                        .with_cancellation(cancel.clone());
                    send_stream(conn, args.stdin.take(), pump)
                }
                None => CompletionSignal::done(),
            };

            let mut outputs = Vec::new();
            if let Some(conn) = connection(Channel::Stdout) {
                outputs.push((Channel::Stdout, recv_stream(conn, args.stdout.take())));
            }
            if let Some(conn) = connection(Channel::Stderr) {
                outputs.push((Channel::Stderr, recv_stream(conn, args.stderr.take())));
            }

            DataPlan::Streams {
                outputs,
                stdin,
                cancel,
            }
        };

        state_tx.send_replace(SessionState::Running);
        info!(
            session = %id,
            interactive = command.interactive,
            "Exec session running for operation {}", operation_id
        );

        let (finished, done) = completion();
        let data_done = args.data_done.take();
        let opened: Vec<Channel> = connections.iter().map(|(c, _)| *c).collect();

        tokio::spawn(async move {
            drive(plan).await;

            state_tx.send_replace(SessionState::Draining);
            for (channel, conn) in &connections {
                close_channel(*channel, conn).await;
            }
            state_tx.send_replace(SessionState::Closed);
            info!(session = %id, "Exec session closed");

            if let Some(data_done) = data_done {
                data_done.fire();
            }
            finished.fire();
        });

        Ok(ExecSession {
            id,
            operation_id: operation_id.to_string(),
            channels: opened,
            state,
            done,
        })
    }

    /// Open every present channel in order, or none at all
    async fn open_channels(
        &self,
        operation_id: &str,
        channels: &ChannelMap,
    ) -> Result<Vec<(Channel, Connection)>> {
        let mut opened: Vec<(Channel, Connection)> = Vec::with_capacity(channels.len());

        for (channel, endpoint) in channels.iter() {
            match self.opener.open(operation_id, endpoint).await {
                Ok(conn) => opened.push((channel, conn)),
                Err(source) => {
                    warn!("Failed to open channel {} for operation {}: {}", channel, operation_id, source);
                    for (opened_channel, conn) in &opened {
                        close_channel(*opened_channel, conn).await;
                    }
                    return Err(ExecError::ChannelOpen { channel, source });
                }
            }
        }

        Ok(opened)
    }
}

impl fmt::Debug for ExecCoordinator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ExecCoordinator")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

fn validate(
    operation_id: &str,
    channels: &ChannelMap,
    command: &ExecCommand,
    args: &ExecArgs,
) -> Result<()> {
    if operation_id.is_empty() {
        return Err(ExecError::InvalidArgument("operation id is empty".to_string()));
    }
    if command.command.is_empty() {
        return Err(ExecError::InvalidArgument("command is empty".to_string()));
    }
    if command.interactive
        && args.stdin.is_some()
        && args.stdout.is_some()
        && !channels.contains(Channel::Stdin)
    {
        return Err(ExecError::InvalidArgument(
            "interactive session needs channel 0".to_string(),
        ));
    }
    Ok(())
}

async fn drive(plan: DataPlan) {
    match plan {
        DataPlan::Idle => {}
        DataPlan::Interactive { mirror, cancel } => {
            mirror.write_done.wait().await;
            if !mirror.read_done.is_done() {
                debug!("Remote output ended before local input, stopping stdin");
                cancel.cancel();
            }
            mirror.read_done.wait().await;
        }
        DataPlan::Streams {
            outputs,
            stdin,
            cancel,
        } => {
            for (channel, signal) in outputs {
                signal.wait().await;
                debug!("Channel {} finished", channel);
            }
            cancel.cancel();
            stdin.wait().await;
        }
    }
}

async fn close_channel(channel: Channel, conn: &Connection) {
    match conn.close().await {
        Ok(()) => debug!(connection = %conn.id(), "Closed channel {}", channel),
        Err(TransportError::AlreadyClosed) => {}
        Err(e) => warn!(connection = %conn.id(), "Error closing channel {}: {}", channel, e),
    }
}
