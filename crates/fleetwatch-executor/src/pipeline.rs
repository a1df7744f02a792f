//! Fail-fast execution of client-triggered remote pipelines.

use std::{slice, sync::Arc};

use chrono::Utc;
use fleetwatch_core::{
    Action, CommandOutput, EventSink, HostRecord, HostStore, PipelineEvent, RemoteSession,
    RemoteShell, Settings,
};

use crate::command::{CommandBuilder, Step};

/// Result of running one step.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StepOutcome {
    Succeeded(CommandOutput),
    Failed(String),
}

/// Where and why an action stopped.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StepFailure {
    pub step: &'static str,
    pub error: String,
}

/// Result of a whole action.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PipelineOutcome {
    Completed,
    Failed(StepFailure),
}

fn failure_message(step: &Step, output: &CommandOutput) -> String {
    if output.stderr.trim().is_empty() {
        format!("{} failed with unknown error", step.name)
    } else {
        output.stderr.clone()
    }
}

/// Runs the steps of an action against a host.
pub struct PipelineRunner<R, S> {
    shell: Arc<R>,
    store: Arc<S>,
    settings: Arc<Settings>,
}

impl<R, S> PipelineRunner<R, S>
where
    R: RemoteShell,
    S: HostStore,
{
    #[must_use]
    pub const fn new(shell: Arc<R>, store: Arc<S>, settings: Arc<Settings>) -> Self {
        Self {
            shell,
            store,
            settings,
        }
    }

    /// Run `action` on `host`, pushing `started` and then exactly one of
    /// `completed` or `failed` into `sink`.
    ///
    /// Steps already applied are not rolled back when a later one fails.
    pub async fn run(&self, action: Action, host: &HostRecord, sink: &dyn EventSink) -> PipelineOutcome {
        tracing::info!(host_id = host.id, %action, "pipeline started");
        sink.send(PipelineEvent::started(action).into());

        let result = match CommandBuilder::new(&self.settings.layout).plan(
            action,
            host,
            &self.settings.login,
        ) {
            Ok(plan) if plan.shared_connection => self.on_connection(host, &plan.steps).await,
            Ok(plan) => self.on_separate_connections(host, &plan.steps).await,
            Err(e) => Err(StepFailure {
                step: "prepare",
                error: e.to_string(),
            }),
        };

        match result {
            Ok(output) => {
                if action.touches_last_update() {
                    if let Err(e) = self.store.set_last_update(host.id, Utc::now()).await {
                        tracing::warn!(host_id = host.id, error = %e, "failed to record last update");
                    }
                }
                tracing::info!(host_id = host.id, %action, "pipeline completed");
                sink.send(
                    PipelineEvent::Completed {
                        action,
                        result: output.stdout,
                    }
                    .into(),
                );
                PipelineOutcome::Completed
            }
            Err(failure) => {
                tracing::warn!(
                    host_id = host.id,
                    %action,
                    step = failure.step,
                    error = %failure.error,
                    "pipeline failed"
                );
                sink.send(
                    PipelineEvent::Failed {
                        action,
                        error: failure.error.clone(),
                    }
                    .into(),
                );
                PipelineOutcome::Failed(failure)
            }
        }
    }

    /// Run each step over its own connection.
    async fn on_separate_connections(
        &self,
        host: &HostRecord,
        steps: &[Step],
    ) -> Result<CommandOutput, StepFailure> {
        let mut last = CommandOutput::default();
        for step in steps {
            last = self.on_connection(host, slice::from_ref(step)).await?;
        }
        Ok(last)
    }

    /// Run `steps` in order over one connection, stopping at the first failure.
    async fn on_connection(
        &self,
        host: &HostRecord,
        steps: &[Step],
    ) -> Result<CommandOutput, StepFailure> {
        let Some(first) = steps.first() else {
            return Ok(CommandOutput::default());
        };

        let mut session = self
            .shell
            .connect(&host.target(), &self.settings.login)
            .await
            .map_err(|e| StepFailure {
                step: first.name,
                error: format!("connection error: {e}"),
            })?;

        let mut result = Ok(CommandOutput::default());
        for step in steps {
            match run_step(&mut session, step).await {
                StepOutcome::Succeeded(output) => result = Ok(output),
                StepOutcome::Failed(error) => {
                    result = Err(StepFailure {
                        step: step.name,
                        error,
                    });
                    break;
                }
            }
        }

        if let Err(e) = session.close().await {
            tracing::debug!(host_id = host.id, error = %e, "disconnect failed");
        }
        result
    }
}

async fn run_step<T: RemoteSession>(session: &mut T, step: &Step) -> StepOutcome {
    tracing::debug!(step = step.name, command = %step.command.line, "running step");
    match session.run(&step.command).await {
        Ok(output) if output.success() => StepOutcome::Succeeded(output),
        Ok(output) => StepOutcome::Failed(failure_message(step, &output)),
        Err(e) => StepOutcome::Failed(format!("connection error: {e}")),
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use async_trait::async_trait;
    use chrono::DateTime;
    use fleetwatch_core::{
        HostId, Login, SessionEvent, StoreError,
        testing::{RecordingSink, ScriptedShell, fail, ok},
    };

    use super::*;

    /// Single-host store that records last-update writes.
    struct OneHost {
        host: HostRecord,
        updates: Mutex<Vec<DateTime<Utc>>>,
    }

    impl OneHost {
        fn new(host: HostRecord) -> Self {
            Self {
                host,
                updates: Mutex::new(Vec::new()),
            }
        }

        fn updates(&self) -> usize {
            self.updates.lock().unwrap().len()
        }
    }

    #[async_trait]
    impl HostStore for OneHost {
        async fn get(&self, id: HostId) -> Result<Option<HostRecord>, StoreError> {
            Ok((id == self.host.id).then(|| self.host.clone()))
        }

        async fn list(&self) -> Result<Vec<HostRecord>, StoreError> {
            Ok(vec![self.host.clone()])
        }

        async fn set_last_update(&self, id: HostId, at: DateTime<Utc>) -> Result<(), StoreError> {
            if id != self.host.id {
                return Err(StoreError::NotFound(id));
            }
            self.updates.lock().unwrap().push(at);
            Ok(())
        }

        async fn record_commit(&self, _hash: &str, _at: DateTime<Utc>) -> Result<u64, StoreError> {
            Ok(1)
        }
    }

    fn host() -> HostRecord {
        HostRecord::new(9, "staging", "10.0.0.9", 22).with_configs("docker-base.yml", "docker-prod.yml")
    }

    fn runner(shell: &ScriptedShell, store: &Arc<OneHost>) -> PipelineRunner<ScriptedShell, OneHost> {
        PipelineRunner::new(
            Arc::new(shell.clone()),
            Arc::clone(store),
            Arc::new(Settings::new(Login::new("deploy", "secret"))),
        )
    }

    fn failed_errors(sink: &RecordingSink) -> Vec<String> {
        sink.events()
            .into_iter()
            .filter_map(|event| match event {
                SessionEvent::Pipeline(PipelineEvent::Failed { error, .. }) => Some(error),
                _ => None,
            })
            .collect()
    }

    #[tokio::test]
    async fn test_toggle_failure_reports_stderr() {
        let shell = ScriptedShell::new();
        shell.on("toggle-mongo", fail(1, "lock held"));
        let store = Arc::new(OneHost::new(host()));
        let sink = RecordingSink::new();

        let outcome = runner(&shell, &store).run(Action::ToggleDatabase, &host(), &sink).await;

        assert_eq!(sink.pipeline_tags(), vec!["toggle_mongo_started", "toggle_mongo_failed"]);
        assert_eq!(failed_errors(&sink), vec!["lock held"]);
        assert!(matches!(outcome, PipelineOutcome::Failed(ref f) if f.step == "toggle database"));
        assert_eq!(store.updates(), 0);
    }

    #[tokio::test]
    async fn test_checkout_failure_stops_pull_with_reload() {
        let shell = ScriptedShell::new();
        shell.on("checkout -B", fail(128, "fatal: invalid reference: origin/main"));
        let store = Arc::new(OneHost::new(host()));
        let sink = RecordingSink::new();

        let outcome = runner(&shell, &store).run(Action::PullWithReload, &host(), &sink).await;

        let executed = shell.executed();
        assert_eq!(executed.len(), 2);
        assert!(executed[0].contains("git fetch"));
        assert!(executed[1].contains("checkout -B"));
        assert!(!executed.iter().any(|c| c.contains("deploy_remote") || c.contains("compose")));

        assert_eq!(
            sink.pipeline_tags(),
            vec!["pull_with_reload_started", "pull_with_reload_failed"]
        );
        assert_eq!(failed_errors(&sink), vec!["fatal: invalid reference: origin/main"]);
        assert!(matches!(outcome, PipelineOutcome::Failed(ref f) if f.step == "git force checkout"));
        assert_eq!(store.updates(), 0);
        assert_eq!(shell.connections(), 1);
        assert_eq!(shell.closed(), 1);
    }

    #[tokio::test]
    async fn test_pull_with_reload_success() {
        let shell = ScriptedShell::new();
        shell.on("compose -f", ok("Container common-web-1  Started\n"));
        let store = Arc::new(OneHost::new(host()));
        let sink = RecordingSink::new();

        let outcome = runner(&shell, &store).run(Action::PullWithReload, &host(), &sink).await;

        assert_eq!(outcome, PipelineOutcome::Completed);
        assert_eq!(shell.executed().len(), 4);
        assert_eq!(shell.connections(), 1);
        assert!(
            shell
                .executed_commands()
                .iter()
                .all(|c| c.stdin.as_deref() == Some("secret"))
        );
        assert_eq!(store.updates(), 1);

        let events = sink.events();
        assert_eq!(events.len(), 2);
        assert_eq!(
            events[1],
            SessionEvent::Pipeline(PipelineEvent::Completed {
                action: Action::PullWithReload,
                result: "Container common-web-1  Started\n".to_string(),
            })
        );
    }

    #[tokio::test]
    async fn test_empty_stderr_gets_generic_message() {
        let shell = ScriptedShell::new();
        shell.on("git pull", fail(1, "  \n"));
        let store = Arc::new(OneHost::new(host()));
        let sink = RecordingSink::new();

        runner(&shell, &store).run(Action::FastPull, &host(), &sink).await;

        assert_eq!(failed_errors(&sink), vec!["git pull failed with unknown error"]);
        assert_eq!(store.updates(), 0);
    }

    #[tokio::test]
    async fn test_stderr_is_forwarded_verbatim() {
        let shell = ScriptedShell::new();
        shell.on("restore-backup", fail(2, "mongorestore: archive truncated\n"));
        let store = Arc::new(OneHost::new(host()));
        let sink = RecordingSink::new();

        runner(&shell, &store).run(Action::RestoreBackup, &host(), &sink).await;

        assert_eq!(failed_errors(&sink), vec!["mongorestore: archive truncated\n"]);
    }

    #[tokio::test]
    async fn test_connection_error_fails_action() {
        let shell = ScriptedShell::new();
        shell.refuse_connections("connection refused");
        let store = Arc::new(OneHost::new(host()));
        let sink = RecordingSink::new();

        runner(&shell, &store).run(Action::RestoreBackup, &host(), &sink).await;

        assert_eq!(sink.pipeline_tags(), vec!["restore_backup_started", "restore_backup_failed"]);
        let errors = failed_errors(&sink);
        assert!(errors[0].starts_with("connection error:"), "{}", errors[0]);
        assert!(shell.executed().is_empty());
    }

    #[tokio::test]
    async fn test_dropped_connection_mid_pipeline() {
        let shell = ScriptedShell::new();
        shell.drop_on("deploy_remote", "connection reset by peer");
        let store = Arc::new(OneHost::new(host()));
        let sink = RecordingSink::new();

        let outcome = runner(&shell, &store).run(Action::PullWithReload, &host(), &sink).await;

        assert!(matches!(outcome, PipelineOutcome::Failed(ref f) if f.step == "deploy remote"));
        assert_eq!(shell.executed().len(), 3);
        assert_eq!(failed_errors(&sink).len(), 1);
        assert_eq!(store.updates(), 0);
    }

    #[tokio::test]
    async fn test_fast_pull_touches_last_update() {
        let shell = ScriptedShell::new();
        shell.on("git pull", ok("Already up to date.\n"));
        let store = Arc::new(OneHost::new(host()));
        let sink = RecordingSink::new();

        runner(&shell, &store).run(Action::FastPull, &host(), &sink).await;

        assert_eq!(sink.pipeline_tags(), vec!["fast_pull_started", "fast_pull_completed"]);
        assert_eq!(store.updates(), 1);
    }

    #[tokio::test]
    async fn test_toggle_success_leaves_last_update() {
        let shell = ScriptedShell::new();
        let store = Arc::new(OneHost::new(host()));
        let sink = RecordingSink::new();

        runner(&shell, &store).run(Action::ToggleDatabase, &host(), &sink).await;

        assert_eq!(sink.pipeline_tags(), vec!["toggle_mongo_started", "toggle_mongo_completed"]);
        assert_eq!(store.updates(), 0);
    }

    #[tokio::test]
    async fn test_missing_base_config_runs_nothing() {
        let shell = ScriptedShell::new();
        let bare = HostRecord::new(9, "bare", "10.0.0.9", 22);
        let store = Arc::new(OneHost::new(bare.clone()));
        let sink = RecordingSink::new();

        runner(&shell, &store).run(Action::PullWithReload, &bare, &sink).await;

        assert!(shell.executed().is_empty());
        assert_eq!(shell.connections(), 0);
        assert_eq!(
            failed_errors(&sink),
            vec!["no base compose file configured for host bare"]
        );
    }
}
