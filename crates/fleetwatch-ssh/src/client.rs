//! Short-lived SSH connections.

use std::{sync::Arc, time::Duration};

use async_trait::async_trait;
use fleetwatch_core::{
    CommandOutput, Login, RemoteCommand, RemoteSession, RemoteShell, ShellError, SshTarget,
};
use russh::{ChannelMsg, Disconnect, client, keys::PublicKey};

/// Extended data stream carrying stderr.
const STDERR_STREAM: u32 = 1;

/// Client handler that trusts every host key.
///
/// Monitored hosts are addressed by operator-maintained records; there is no
/// known-hosts file to check against.
pub struct TrustingHandler;

impl client::Handler for TrustingHandler {
    type Error = russh::Error;

    async fn check_server_key(&mut self, _server_public_key: &PublicKey) -> Result<bool, Self::Error> {
        Ok(true)
    }
}

/// Remote shell over SSH with password authentication.
#[derive(Clone)]
pub struct SshShell {
    config: Arc<client::Config>,
    connect_timeout: Duration,
}

impl SshShell {
    /// Create a shell whose connect-and-authenticate step is bounded by `connect_timeout`.
    #[must_use]
    pub fn new(connect_timeout: Duration) -> Self {
        Self {
            config: Arc::new(client::Config::default()),
            connect_timeout,
        }
    }

    async fn open(
        &self,
        target: &SshTarget,
        login: &Login,
    ) -> Result<client::Handle<TrustingHandler>, ShellError> {
        let connect_err = |e: russh::Error| ShellError::Connect {
            target: target.clone(),
            message: e.to_string(),
        };

        let mut handle = client::connect(
            Arc::clone(&self.config),
            (target.address.clone(), target.port),
            TrustingHandler,
        )
        .await
        .map_err(connect_err)?;

        let auth = handle
            .authenticate_password(login.username.clone(), login.password.clone())
            .await
            .map_err(connect_err)?;
        if !auth.success() {
            return Err(ShellError::AuthRejected {
                target: target.clone(),
            });
        }

        Ok(handle)
    }
}

#[async_trait]
impl RemoteShell for SshShell {
    type Session = SshSession;

    async fn connect(&self, target: &SshTarget, login: &Login) -> Result<SshSession, ShellError> {
        tracing::debug!(host = %target, username = %login.username, "opening ssh connection");
        let handle = tokio::time::timeout(self.connect_timeout, self.open(target, login))
            .await
            .map_err(|_| ShellError::Timeout {
                target: target.clone(),
            })??;

        Ok(SshSession {
            handle,
            target: target.clone(),
        })
    }
}

/// One authenticated SSH connection.
///
/// Dropping it tears the connection down; `close` sends a proper disconnect.
pub struct SshSession {
    handle: client::Handle<TrustingHandler>,
    target: SshTarget,
}

fn channel_err(e: russh::Error) -> ShellError {
    ShellError::Channel(e.to_string())
}

#[async_trait]
impl RemoteSession for SshSession {
    async fn run(&mut self, command: &RemoteCommand) -> Result<CommandOutput, ShellError> {
        let mut channel = self
            .handle
            .channel_open_session()
            .await
            .map_err(channel_err)?;
        channel
            .exec(true, command.line.as_str())
            .await
            .map_err(channel_err)?;

        if let Some(ref input) = command.stdin {
            channel.data(input.as_bytes()).await.map_err(channel_err)?;
            channel.eof().await.map_err(channel_err)?;
        }

        let mut stdout = Vec::new();
        let mut stderr = Vec::new();
        let mut exit_status = None;

        while let Some(msg) = channel.wait().await {
            match msg {
                ChannelMsg::Data { ref data } => stdout.extend_from_slice(data),
                ChannelMsg::ExtendedData { ref data, ext } if ext == STDERR_STREAM => {
                    stderr.extend_from_slice(data);
                }
                ChannelMsg::ExitStatus { exit_status: status } => exit_status = Some(status),
                _ => {}
            }
        }

        let exit_status = exit_status.ok_or(ShellError::NoExitStatus)?;
        tracing::debug!(
            host = %self.target,
            command = %command.line,
            exit_status,
            "remote command finished"
        );

        Ok(CommandOutput {
            exit_status,
            stdout: String::from_utf8_lossy(&stdout).into_owned(),
            stderr: String::from_utf8_lossy(&stderr).into_owned(),
        })
    }

    async fn close(&mut self) -> Result<(), ShellError> {
        self.handle
            .disconnect(Disconnect::ByApplication, "", "en")
            .await
            .map_err(channel_err)
    }
}
