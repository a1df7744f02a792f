//! Status polling of a host's compose project.

use fleetwatch_core::{
    CommandOutput, ConfigStatus, HostRecord, RemoteCommand, RemoteShell, Settings, StatusSnapshot,
    classify_raw,
};
use serde::Deserialize;

use crate::command::LIST_PROJECTS;

/// One entry of `docker compose ls --format json`.
#[derive(Debug, Deserialize)]
struct ComposeProject {
    #[serde(rename = "Name")]
    name: String,
    #[serde(rename = "ConfigFiles", default)]
    config_files: Option<String>,
}

/// Poll the compose status of `host`.
///
/// Never fails: connection, command and parse problems become error snapshots.
pub async fn poll_status<R: RemoteShell>(
    shell: &R,
    host: &HostRecord,
    settings: &Settings,
) -> StatusSnapshot {
    let command = RemoteCommand::new(LIST_PROJECTS);
    match shell.exec(&host.target(), &settings.login, &command).await {
        Ok(output) => interpret_listing(host, &output, &settings.layout.compose_project),
        Err(e) => {
            tracing::error!(host_id = host.id, error = %e, "status poll connection failed");
            StatusSnapshot::failure(host, format!("connection error: {e}"))
        }
    }
}

/// Turn the output of the project listing into a snapshot.
#[must_use]
pub fn interpret_listing(host: &HostRecord, output: &CommandOutput, project: &str) -> StatusSnapshot {
    if !output.success() {
        return StatusSnapshot::failure(
            host,
            format!("failed to list projects: {}", output.stderr.trim()),
        );
    }

    let projects: Vec<ComposeProject> = match serde_json::from_str(&output.stdout) {
        Ok(projects) => projects,
        Err(e) => {
            tracing::warn!(host_id = host.id, error = %e, "unparseable compose listing");
            return StatusSnapshot::failure(host, "could not parse project list");
        }
    };

    let Some(found) = projects.into_iter().find(|p| p.name == project) else {
        tracing::debug!(host_id = host.id, project, "compose project not running");
        return StatusSnapshot::status(host, ConfigStatus::ProjectNotFound, None);
    };

    let status = classify_raw(
        found.config_files.as_deref(),
        host.base_config(),
        host.prod_config(),
    );
    tracing::debug!(host_id = host.id, config_files = ?found.config_files, %status, "classified");
    StatusSnapshot::status(host, status, found.config_files)
}
