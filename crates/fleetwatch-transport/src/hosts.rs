//! Read-only host listing for fleet overviews.

use axum::{
    Json,
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
};
use fleetwatch_core::{HostId, HostRecord, HostStore, RemoteShell, StoreError};
use serde::Serialize;
use serde_json::json;

use crate::{AppState, protocol::timestamp};

/// Public view of a host record. The port and compose file labels stay
/// server-side.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct HostSummary {
    pub id: HostId,
    pub name: String,
    pub host: String,
    pub last_update: Option<String>,
    pub last_commit: Option<String>,
    pub commit: Option<String>,
}

impl From<HostRecord> for HostSummary {
    fn from(host: HostRecord) -> Self {
        Self {
            id: host.id,
            name: host.name,
            host: host.address,
            last_update: timestamp(host.last_update),
            last_commit: timestamp(host.last_commit),
            commit: host.commit_hash,
        }
    }
}

fn store_failure(e: &StoreError) -> Response {
    tracing::error!(error = %e, "host listing failed");
    (
        StatusCode::INTERNAL_SERVER_ERROR,
        Json(json!({ "error": format!("Internal error: {e}") })),
    )
        .into_response()
}

/// `GET /api/hosts/`
pub async fn list_hosts<S, R>(State(state): State<AppState<S, R>>) -> Response
where
    S: HostStore + 'static,
    R: RemoteShell + 'static,
{
    match state.controller.store().list().await {
        Ok(hosts) => {
            Json(hosts.into_iter().map(HostSummary::from).collect::<Vec<_>>()).into_response()
        }
        Err(e) => store_failure(&e),
    }
}

/// `GET /api/hosts/{id}/`
pub async fn get_host<S, R>(
    Path(id): Path<HostId>,
    State(state): State<AppState<S, R>>,
) -> Response
where
    S: HostStore + 'static,
    R: RemoteShell + 'static,
{
    match state.controller.store().get(id).await {
        Ok(Some(host)) => Json(HostSummary::from(host)).into_response(),
        Ok(None) => (StatusCode::NOT_FOUND, Json(json!({ "detail": "Not found." }))).into_response(),
        Err(e) => store_failure(&e),
    }
}
