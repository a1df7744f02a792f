//! Remote command building for status polls and pipeline steps.

use std::borrow::Cow;

use fleetwatch_core::{Action, HostRecord, Login, RemoteCommand, RemoteLayout};
use thiserror::Error;

/// Command build error.
#[derive(Debug, Error)]
pub enum CommandBuildError {
    #[error("no base compose file configured for host {0}")]
    MissingBaseConfig(String),
    #[error("Failed to quote command argument: {0}")]
    QuoteError(#[from] shlex::QuoteError),
}

/// Lists compose projects as JSON.
pub const LIST_PROJECTS: &str = "docker compose ls --format json";

/// One named step of a pipeline.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Step {
    pub name: &'static str,
    pub command: RemoteCommand,
}

impl Step {
    fn new(name: &'static str, line: String) -> Self {
        Self {
            name,
            command: RemoteCommand::new(line),
        }
    }
}

/// Ordered steps of one action.
#[derive(Debug, Clone)]
pub struct Plan {
    pub action: Action,
    pub steps: Vec<Step>,
    /// Run every step over one connection instead of one connection per step.
    pub shared_connection: bool,
}

fn quote(arg: &str) -> Result<Cow<'_, str>, CommandBuildError> {
    Ok(shlex::try_quote(arg)?)
}

/// Builder for the commands run against one host layout.
#[derive(Debug, Clone)]
pub struct CommandBuilder<'a> {
    layout: &'a RemoteLayout,
}

impl<'a> CommandBuilder<'a> {
    #[must_use]
    pub const fn new(layout: &'a RemoteLayout) -> Self {
        Self { layout }
    }

    /// Prefix `command` with a change into the project checkout.
    fn in_project(&self, command: &str) -> Result<String, CommandBuildError> {
        Ok(format!("cd {} && {command}", quote(&self.layout.project_dir)?))
    }

    /// Build the steps for `action` on `host`.
    ///
    /// # Errors
    /// Returns error if the host lacks a required setting or an argument cannot be quoted.
    pub fn plan(
        &self,
        action: Action,
        host: &HostRecord,
        login: &Login,
    ) -> Result<Plan, CommandBuildError> {
        let layout = self.layout;
        let steps = match action {
            Action::ToggleDatabase => {
                vec![Step::new("toggle database", layout.toggle_script.clone())]
            }
            Action::RestoreBackup => {
                vec![Step::new("restore backup", layout.restore_script.clone())]
            }
            Action::FastPull => vec![Step::new(
                "git pull",
                self.in_project(&format!(
                    "git pull --ff-only {} {}",
                    quote(&layout.git_remote)?,
                    quote(&layout.git_branch)?
                ))?,
            )],
            Action::PullWithReload => {
                let base = host
                    .base_config()
                    .ok_or_else(|| CommandBuildError::MissingBaseConfig(host.name.clone()))?;
                let upstream = format!("{}/{}", layout.git_remote, layout.git_branch);
                vec![
                    Step::new(
                        "git fetch",
                        self.in_project(&format!("git fetch {}", quote(&layout.git_remote)?))?,
                    ),
                    Step::new(
                        "git force checkout",
                        self.in_project(&format!(
                            "git checkout -B {} {}",
                            quote(&layout.git_branch)?,
                            quote(&upstream)?
                        ))?,
                    ),
                    Step::new("deploy remote", layout.deploy_script.clone()),
                    Step::new(
                        "docker compose up",
                        self.in_project(&format!(
                            "docker compose -f {} up -d --build --force-recreate",
                            quote(base)?
                        ))?,
                    ),
                ]
                .into_iter()
                // sudo inside the scripts reads the login password from stdin
                .map(|mut step| {
                    step.command = step.command.with_stdin(login.password.clone());
                    step
                })
                .collect()
            }
        };

        Ok(Plan {
            action,
            steps,
            shared_connection: matches!(action, Action::PullWithReload),
        })
    }
}
