//! Scripted collaborators for tests (feature: testing).

use std::{
    sync::{Arc, Mutex, PoisonError},
    time::Duration,
};

use async_trait::async_trait;

use crate::{
    CommandOutput, EventSink, Login, RemoteCommand, RemoteSession, RemoteShell, SessionEvent,
    ShellError, SshTarget,
};

/// Successful output with the given stdout.
#[must_use]
pub fn ok(stdout: &str) -> CommandOutput {
    CommandOutput {
        exit_status: 0,
        stdout: stdout.to_string(),
        stderr: String::new(),
    }
}

/// Failed output with the given exit status and stderr.
#[must_use]
pub fn fail(exit_status: u32, stderr: &str) -> CommandOutput {
    CommandOutput {
        exit_status,
        stdout: String::new(),
        stderr: stderr.to_string(),
    }
}

#[derive(Clone)]
enum Reply {
    Output(CommandOutput),
    Drop(String),
}

#[derive(Clone)]
struct Rule {
    needle: String,
    reply: Reply,
    delay: Option<Duration>,
}

#[derive(Default)]
struct Script {
    rules: Vec<Rule>,
    refuse: Option<String>,
    executed: Vec<RemoteCommand>,
    connects: usize,
    closes: usize,
}

/// Remote shell whose replies are matched by substring of the command line.
///
/// Commands without a matching rule succeed with empty output.
#[derive(Clone, Default)]
pub struct ScriptedShell {
    script: Arc<Mutex<Script>>,
}

impl ScriptedShell {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn with_script<T>(&self, f: impl FnOnce(&mut Script) -> T) -> T {
        let mut script = self.script.lock().unwrap_or_else(PoisonError::into_inner);
        f(&mut script)
    }

    /// Reply with `output` to commands containing `needle`.
    pub fn on(&self, needle: &str, output: CommandOutput) -> &Self {
        self.push_rule(needle, Reply::Output(output), None)
    }

    /// Like [`Self::on`], after sleeping for `delay`.
    pub fn on_delayed(&self, needle: &str, output: CommandOutput, delay: Duration) -> &Self {
        self.push_rule(needle, Reply::Output(output), Some(delay))
    }

    /// Break the connection while running commands containing `needle`.
    pub fn drop_on(&self, needle: &str, message: &str) -> &Self {
        self.push_rule(needle, Reply::Drop(message.to_string()), None)
    }

    /// Fail every connection attempt.
    pub fn refuse_connections(&self, message: &str) -> &Self {
        self.with_script(|s| s.refuse = Some(message.to_string()));
        self
    }

    fn push_rule(&self, needle: &str, reply: Reply, delay: Option<Duration>) -> &Self {
        self.with_script(|s| {
            s.rules.push(Rule {
                needle: needle.to_string(),
                reply,
                delay,
            });
        });
        self
    }

    /// Command lines run so far, in order.
    #[must_use]
    pub fn executed(&self) -> Vec<String> {
        self.with_script(|s| s.executed.iter().map(|c| c.line.clone()).collect())
    }

    /// Commands run so far, including their stdin.
    #[must_use]
    pub fn executed_commands(&self) -> Vec<RemoteCommand> {
        self.with_script(|s| s.executed.clone())
    }

    #[must_use]
    pub fn connections(&self) -> usize {
        self.with_script(|s| s.connects)
    }

    #[must_use]
    pub fn closed(&self) -> usize {
        self.with_script(|s| s.closes)
    }
}

/// Session handed out by [`ScriptedShell`].
pub struct ScriptedSession {
    shell: ScriptedShell,
}

#[async_trait]
impl RemoteSession for ScriptedSession {
    async fn run(&mut self, command: &RemoteCommand) -> Result<CommandOutput, ShellError> {
        let rule = self.shell.with_script(|s| {
            s.executed.push(command.clone());
            s.rules
                .iter()
                .find(|rule| command.line.contains(&rule.needle))
                .cloned()
        });
        let Some(rule) = rule else {
            return Ok(ok(""));
        };
        if let Some(delay) = rule.delay {
            tokio::time::sleep(delay).await;
        }
        match rule.reply {
            Reply::Output(output) => Ok(output),
            Reply::Drop(message) => Err(ShellError::Channel(message)),
        }
    }

    async fn close(&mut self) -> Result<(), ShellError> {
        self.shell.with_script(|s| s.closes += 1);
        Ok(())
    }
}

#[async_trait]
impl RemoteShell for ScriptedShell {
    type Session = ScriptedSession;

    async fn connect(&self, target: &SshTarget, _login: &Login) -> Result<Self::Session, ShellError> {
        let refused = self.with_script(|s| {
            s.connects += 1;
            s.refuse.clone()
        });
        if let Some(message) = refused {
            return Err(ShellError::Connect {
                target: target.clone(),
                message,
            });
        }
        Ok(ScriptedSession {
            shell: self.clone(),
        })
    }
}

/// Sink that records every delivered event.
#[derive(Clone, Default)]
pub struct RecordingSink {
    events: Arc<Mutex<Vec<SessionEvent>>>,
}

impl RecordingSink {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn events(&self) -> Vec<SessionEvent> {
        self.events
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Wire tags of delivered pipeline events, in order.
    #[must_use]
    pub fn pipeline_tags(&self) -> Vec<String> {
        self.events()
            .iter()
            .filter_map(|event| match event {
                SessionEvent::Pipeline(event) => Some(event.tag()),
                _ => None,
            })
            .collect()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.events.lock().unwrap_or_else(PoisonError::into_inner).len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl EventSink for RecordingSink {
    fn send(&self, event: SessionEvent) -> bool {
        self.events
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(event);
        true
    }
}
