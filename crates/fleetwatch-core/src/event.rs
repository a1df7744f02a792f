//! Events produced for a client session.

use std::{fmt, str::FromStr};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::{ConfigStatus, HostRecord};

/// Client-triggered remote pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Action {
    #[serde(rename = "toggle_mongo")]
    ToggleDatabase,
    #[serde(rename = "restore_backup")]
    RestoreBackup,
    #[serde(rename = "fast_pull")]
    FastPull,
    #[serde(rename = "pull_with_reload")]
    PullWithReload,
}

impl Action {
    pub const ALL: [Self; 4] = [
        Self::ToggleDatabase,
        Self::RestoreBackup,
        Self::FastPull,
        Self::PullWithReload,
    ];

    /// Wire name of the action.
    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Self::ToggleDatabase => "toggle_mongo",
            Self::RestoreBackup => "restore_backup",
            Self::FastPull => "fast_pull",
            Self::PullWithReload => "pull_with_reload",
        }
    }

    /// Human-readable text sent with the `started` event.
    #[must_use]
    pub const fn started_message(self) -> &'static str {
        match self {
            Self::ToggleDatabase => "switching database",
            Self::RestoreBackup => "restoring database backup",
            Self::FastPull => "pulling source",
            Self::PullWithReload => "pulling source and redeploying",
        }
    }

    /// Whether a successful run refreshes the host's last-update time.
    #[must_use]
    pub const fn touches_last_update(self) -> bool {
        matches!(self, Self::FastPull | Self::PullWithReload)
    }
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Unrecognised action name.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown action: {0}")]
pub struct UnknownAction(pub String);

impl FromStr for Action {
    type Err = UnknownAction;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|action| action.name() == s)
            .ok_or_else(|| UnknownAction(s.to_string()))
    }
}

/// Phase of a pipeline run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Started,
    Completed,
    Failed,
}

impl Phase {
    #[must_use]
    pub const fn suffix(self) -> &'static str {
        match self {
            Self::Started => "started",
            Self::Completed => "completed",
            Self::Failed => "failed",
        }
    }
}

/// One transition of a pipeline run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PipelineEvent {
    Started { action: Action, message: String },
    Completed { action: Action, result: String },
    Failed { action: Action, error: String },
}

impl PipelineEvent {
    #[must_use]
    pub fn started(action: Action) -> Self {
        Self::Started {
            action,
            message: action.started_message().to_string(),
        }
    }

    #[must_use]
    pub const fn action(&self) -> Action {
        match self {
            Self::Started { action, .. } | Self::Completed { action, .. } | Self::Failed { action, .. } => {
                *action
            }
        }
    }

    #[must_use]
    pub const fn phase(&self) -> Phase {
        match self {
            Self::Started { .. } => Phase::Started,
            Self::Completed { .. } => Phase::Completed,
            Self::Failed { .. } => Phase::Failed,
        }
    }

    /// Wire tag such as `fast_pull_completed`.
    #[must_use]
    pub fn tag(&self) -> String {
        format!("{}_{}", self.action().name(), self.phase().suffix())
    }
}

/// Result of one status poll.
///
/// Either `config_status` or `error` is set; host fields are echoed from the
/// record loaded for the tick.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StatusSnapshot {
    pub config_status: Option<ConfigStatus>,
    pub error: Option<String>,
    /// Raw comma-joined configuration file list.
    pub config_files: Option<String>,
    pub last_update: Option<DateTime<Utc>>,
    pub last_commit: Option<DateTime<Utc>>,
    pub commit_hash: Option<String>,
}

impl StatusSnapshot {
    #[must_use]
    pub fn status(host: &HostRecord, status: ConfigStatus, config_files: Option<String>) -> Self {
        Self {
            config_status: Some(status),
            error: None,
            config_files,
            last_update: host.last_update,
            last_commit: host.last_commit,
            commit_hash: host.commit_hash.clone(),
        }
    }

    #[must_use]
    pub fn failure(host: &HostRecord, error: impl Into<String>) -> Self {
        Self {
            config_status: None,
            error: Some(error.into()),
            config_files: None,
            last_update: host.last_update,
            last_commit: host.last_commit,
            commit_hash: host.commit_hash.clone(),
        }
    }

    #[must_use]
    pub const fn is_error(&self) -> bool {
        self.error.is_some()
    }
}

/// Anything the server pushes to a session's client.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionEvent {
    Snapshot(StatusSnapshot),
    Pipeline(PipelineEvent),
    /// Session-level failure such as an unknown host.
    Error(String),
}

impl From<StatusSnapshot> for SessionEvent {
    fn from(snapshot: StatusSnapshot) -> Self {
        Self::Snapshot(snapshot)
    }
}

impl From<PipelineEvent> for SessionEvent {
    fn from(event: PipelineEvent) -> Self {
        Self::Pipeline(event)
    }
}
