//! Wire protocol for client-server communication.
//!
//! Every frame is a flat JSON object. Server frames are distinguished by
//! their keys, not by a type tag.

use chrono::{DateTime, SecondsFormat, Utc};
use fleetwatch_core::{Action, PipelineEvent, SessionEvent, StatusSnapshot};
use serde::{Deserialize, Serialize};

/// Message from client to server.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClientMessage {
    pub action: String,
}

impl ClientMessage {
    /// Parse a text frame into an action.
    ///
    /// Returns `None` for malformed frames and unknown action names.
    #[must_use]
    pub fn parse(text: &str) -> Option<Action> {
        let message: Self = serde_json::from_str(text).ok()?;
        message.action.parse().ok()
    }
}

/// Message from server to client.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(untagged)]
pub enum ServerMessage {
    /// Polling snapshot.
    Status {
        config_status: Option<String>,
        last_update: Option<String>,
        last_commit: Option<String>,
        #[serde(rename = "commitHash")]
        commit_hash: Option<String>,
    },
    /// `<action>_started`.
    Started { action: String, message: String },
    /// `<action>_completed`.
    Completed { action: String, result: String },
    /// `<action>_failed`.
    Failed { action: String, error: String },
    /// Failed poll or session-level error.
    Error { error: String },
}

pub(crate) fn timestamp(at: Option<DateTime<Utc>>) -> Option<String> {
    at.map(|at| at.to_rfc3339_opts(SecondsFormat::Secs, true))
}

impl From<StatusSnapshot> for ServerMessage {
    fn from(snapshot: StatusSnapshot) -> Self {
        if let Some(error) = snapshot.error {
            return Self::Error { error };
        }
        Self::Status {
            config_status: snapshot.config_status.map(|s| s.to_string()),
            last_update: timestamp(snapshot.last_update),
            last_commit: timestamp(snapshot.last_commit),
            commit_hash: snapshot.commit_hash,
        }
    }
}

impl From<PipelineEvent> for ServerMessage {
    fn from(event: PipelineEvent) -> Self {
        let action = event.tag();
        match event {
            PipelineEvent::Started { message, .. } => Self::Started { action, message },
            PipelineEvent::Completed { result, .. } => Self::Completed { action, result },
            PipelineEvent::Failed { error, .. } => Self::Failed { action, error },
        }
    }
}

impl From<SessionEvent> for ServerMessage {
    fn from(event: SessionEvent) -> Self {
        match event {
            SessionEvent::Snapshot(snapshot) => snapshot.into(),
            SessionEvent::Pipeline(event) => event.into(),
            SessionEvent::Error(error) => Self::Error { error },
        }
    }
}

#[cfg(test)]
mod tests {
    use fleetwatch_core::{ConfigStatus, HostRecord};
    use serde_json::{Value, json};

    use super::*;

    fn to_json(message: impl Into<ServerMessage>) -> Value {
        serde_json::to_value(message.into()).unwrap()
    }

    #[test]
    fn test_parse_actions() {
        assert_eq!(
            ClientMessage::parse(r#"{"action": "toggle_mongo"}"#),
            Some(Action::ToggleDatabase)
        );
        assert_eq!(
            ClientMessage::parse(r#"{"action": "pull_with_reload", "extra": 1}"#),
            Some(Action::PullWithReload)
        );
        assert_eq!(ClientMessage::parse(r#"{"action": "reboot"}"#), None);
        assert_eq!(ClientMessage::parse(r#"{"command": "fast_pull"}"#), None);
        assert_eq!(ClientMessage::parse("fast_pull"), None);
    }

    #[test]
    fn test_snapshot_frame() {
        let mut host = HostRecord::new(1, "staging", "10.0.0.1", 22);
        host.last_update = Some(
            DateTime::parse_from_rfc3339("2025-03-01T10:00:00Z")
                .unwrap()
                .with_timezone(&Utc),
        );
        host.commit_hash = Some("1a2b3c4d".to_string());
        let snapshot = StatusSnapshot::status(
            &host,
            ConfigStatus::TestDatabase,
            Some("/etc/compose.base.yml".to_string()),
        );

        assert_eq!(
            to_json(snapshot),
            json!({
                "config_status": "test database attached",
                "last_update": "2025-03-01T10:00:00Z",
                "last_commit": null,
                "commitHash": "1a2b3c4d",
            })
        );
    }

    #[test]
    fn test_failed_snapshot_is_error_frame() {
        let host = HostRecord::new(1, "staging", "10.0.0.1", 22);
        let snapshot = StatusSnapshot::failure(&host, "could not parse project list");
        assert_eq!(to_json(snapshot), json!({"error": "could not parse project list"}));
    }

    #[test]
    fn test_pipeline_frames() {
        assert_eq!(
            to_json(PipelineEvent::started(Action::FastPull)),
            json!({"action": "fast_pull_started", "message": "pulling source"})
        );
        assert_eq!(
            to_json(PipelineEvent::Completed {
                action: Action::RestoreBackup,
                result: "restored".to_string(),
            }),
            json!({"action": "restore_backup_completed", "result": "restored"})
        );
        assert_eq!(
            to_json(PipelineEvent::Failed {
                action: Action::ToggleDatabase,
                error: "lock held".to_string(),
            }),
            json!({"action": "toggle_mongo_failed", "error": "lock held"})
        );
    }

    #[test]
    fn test_session_error_frame() {
        let event = SessionEvent::Error("SSH host not found".to_string());
        assert_eq!(to_json(event), json!({"error": "SSH host not found"}));
    }
}
