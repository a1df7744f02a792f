//! Collaborator traits: host storage, remote shell, and client sink.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use thiserror::Error;

use crate::{HostId, HostRecord, Login, SessionEvent, SshTarget};

/// Storage error.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("Host not found: {0}")]
    NotFound(HostId),
    #[error("Storage error: {0}")]
    Internal(String),
}

/// Trait for host record backends.
#[async_trait]
pub trait HostStore: Send + Sync {
    /// Get a host by ID.
    async fn get(&self, id: HostId) -> Result<Option<HostRecord>, StoreError>;

    /// List all hosts, ordered by ID.
    async fn list(&self) -> Result<Vec<HostRecord>, StoreError>;

    /// Record a successful source pull.
    async fn set_last_update(&self, id: HostId, at: DateTime<Utc>) -> Result<(), StoreError>;

    /// Stamp every host with the latest CI commit. Returns the number of hosts updated.
    async fn record_commit(&self, hash: &str, at: DateTime<Utc>) -> Result<u64, StoreError>;
}

/// A command to run on a remote host.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteCommand {
    /// Shell command line, passed to the remote `exec` request as-is.
    pub line: String,
    /// Bytes written to the command's standard input before EOF.
    pub stdin: Option<String>,
}

impl RemoteCommand {
    #[must_use]
    pub fn new(line: impl Into<String>) -> Self {
        Self {
            line: line.into(),
            stdin: None,
        }
    }

    #[must_use]
    pub fn with_stdin(mut self, input: impl Into<String>) -> Self {
        self.stdin = Some(input.into());
        self
    }
}

/// Result of a remote command that ran to completion.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CommandOutput {
    pub exit_status: u32,
    pub stdout: String,
    pub stderr: String,
}

impl CommandOutput {
    #[must_use]
    pub const fn success(&self) -> bool {
        self.exit_status == 0
    }
}

/// Remote shell error.
///
/// Non-zero exit statuses are not errors; they come back as [`CommandOutput`].
#[derive(Debug, Error)]
pub enum ShellError {
    #[error("connection to {target} timed out")]
    Timeout { target: SshTarget },
    #[error("connection to {target} failed: {message}")]
    Connect { target: SshTarget, message: String },
    #[error("authentication rejected by {target}")]
    AuthRejected { target: SshTarget },
    #[error("channel error: {0}")]
    Channel(String),
    #[error("remote command ended without an exit status")]
    NoExitStatus,
}

/// An open connection to one host.
///
/// Dropping the session releases the connection; [`RemoteSession::close`]
/// does so gracefully.
#[async_trait]
pub trait RemoteSession: Send {
    /// Run a command to completion and collect its output.
    async fn run(&mut self, command: &RemoteCommand) -> Result<CommandOutput, ShellError>;

    /// Disconnect.
    async fn close(&mut self) -> Result<(), ShellError>;
}

/// Trait for opening remote shell connections.
#[async_trait]
pub trait RemoteShell: Send + Sync {
    type Session: RemoteSession;

    /// Connect and authenticate.
    async fn connect(&self, target: &SshTarget, login: &Login) -> Result<Self::Session, ShellError>;

    /// Run a single command over its own connection.
    ///
    /// # Errors
    /// Returns error if the connection cannot be established or breaks.
    async fn exec(
        &self,
        target: &SshTarget,
        login: &Login,
        command: &RemoteCommand,
    ) -> Result<CommandOutput, ShellError> {
        let mut session = self.connect(target, login).await?;
        let result = session.run(command).await;
        let _ = session.close().await;
        result
    }
}

/// Outbound half of a client session.
pub trait EventSink: Send + Sync {
    /// Push an event to the client. Returns `false` if it was not delivered.
    fn send(&self, event: SessionEvent) -> bool;
}
