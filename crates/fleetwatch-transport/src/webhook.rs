//! CI commit webhook.
//!
//! GitLab posts pipeline events here; the commit they ran on is stamped onto
//! every host record.

use axum::{Json, extract::State, http::StatusCode, response::IntoResponse};
use chrono::{DateTime, NaiveDateTime, Utc};
use fleetwatch_core::{HostStore, RemoteShell};
use serde::Deserialize;
use serde_json::json;

use crate::AppState;

/// Length of the abbreviated commit hash kept on host records.
pub const SHORT_SHA_LEN: usize = 8;

/// Subset of a GitLab pipeline event.
#[derive(Debug, Default, Deserialize)]
pub struct PipelineHook {
    #[serde(default)]
    pub object_attributes: ObjectAttributes,
}

/// Absent fields read as empty strings; only an explicit `null` is `None`.
#[derive(Debug, Deserialize)]
pub struct ObjectAttributes {
    #[serde(default = "absent")]
    pub sha: Option<String>,
    /// e.g. `2025-03-01 10:00:00 UTC`
    #[serde(default = "absent")]
    pub finished_at: Option<String>,
}

#[allow(clippy::unnecessary_wraps)]
fn absent() -> Option<String> {
    Some(String::new())
}

impl Default for ObjectAttributes {
    fn default() -> Self {
        Self {
            sha: absent(),
            finished_at: absent(),
        }
    }
}

/// Parse GitLab's `finished_at` format.
#[must_use]
pub fn parse_finished_at(value: &str) -> Option<DateTime<Utc>> {
    let (stamp, zone) = value.trim().rsplit_once(' ')?;
    if !matches!(zone, "UTC" | "GMT") {
        return None;
    }
    NaiveDateTime::parse_from_str(stamp, "%Y-%m-%d %H:%M:%S")
        .ok()
        .map(|naive| naive.and_utc())
}

fn received(status: &str) -> (StatusCode, Json<serde_json::Value>) {
    (StatusCode::OK, Json(json!({ "status": status })))
}

/// `POST /api/gitlab/hosts/commit/`
pub async fn gitlab_commit<S, R>(
    State(state): State<AppState<S, R>>,
    Json(hook): Json<PipelineHook>,
) -> impl IntoResponse
where
    S: HostStore + 'static,
    R: RemoteShell + 'static,
{
    let ObjectAttributes { sha, finished_at } = hook.object_attributes;
    let (Some(sha), Some(finished_at)) = (sha, finished_at) else {
        tracing::warn!("commit hook with null sha or finish time");
        return received("received (None)");
    };

    let Some(at) = parse_finished_at(&finished_at) else {
        tracing::warn!(%finished_at, "commit hook with unparseable finish time");
        return received("received (invalid date format)");
    };

    let short: String = sha.chars().take(SHORT_SHA_LEN).collect();
    match state.controller.store().record_commit(&short, at).await {
        Ok(updated) => {
            tracing::info!(commit = %short, %at, updated, "recorded CI commit");
            received("received")
        }
        Err(e) => {
            tracing::error!(error = %e, "failed to record CI commit");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(json!({ "error": format!("Internal error: {e}") })),
            )
        }
    }
}
