//! Process-wide settings shared by every session.

use std::{fmt, time::Duration};

/// Remote login used for every host.
///
/// Built once at startup and shared by reference; never stored on host records.
#[derive(Clone, PartialEq, Eq)]
pub struct Login {
    pub username: String,
    pub password: String,
}

impl Login {
    #[must_use]
    pub fn new(username: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            username: username.into(),
            password: password.into(),
        }
    }
}

impl fmt::Debug for Login {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Login")
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .finish()
    }
}

/// Where things live on a monitored host.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteLayout {
    /// Checkout of the application stack.
    pub project_dir: String,
    /// Compose project whose configuration is classified.
    pub compose_project: String,
    /// Git remote and branch that deployments track.
    pub git_remote: String,
    pub git_branch: String,
    pub toggle_script: String,
    pub restore_script: String,
    pub deploy_script: String,
}

impl Default for RemoteLayout {
    fn default() -> Self {
        Self {
            project_dir: "/home/jsand/common".to_string(),
            compose_project: "common".to_string(),
            git_remote: "origin".to_string(),
            git_branch: "main".to_string(),
            toggle_script: "sudo /usr/local/bin/toggle-mongo".to_string(),
            restore_script: "sudo /usr/local/bin/restore-backup".to_string(),
            deploy_script: "sudo /usr/local/bin/deploy_remote".to_string(),
        }
    }
}

/// Immutable settings for the monitoring subsystem.
#[derive(Debug, Clone)]
pub struct Settings {
    pub login: Login,
    /// Upper bound on establishing and authenticating a remote connection.
    pub connect_timeout: Duration,
    /// Delay between two status polls of one session.
    pub poll_interval: Duration,
    /// How long teardown waits for an in-flight action before aborting it.
    pub action_drain_timeout: Duration,
    pub layout: RemoteLayout,
}

impl Settings {
    pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(10);
    pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(5);
    pub const DEFAULT_ACTION_DRAIN_TIMEOUT: Duration = Duration::from_secs(300);

    /// Create settings with default timings and layout.
    #[must_use]
    pub fn new(login: Login) -> Self {
        Self {
            login,
            connect_timeout: Self::DEFAULT_CONNECT_TIMEOUT,
            poll_interval: Self::DEFAULT_POLL_INTERVAL,
            action_drain_timeout: Self::DEFAULT_ACTION_DRAIN_TIMEOUT,
            layout: RemoteLayout::default(),
        }
    }

    #[must_use]
    pub const fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    #[must_use]
    pub const fn with_connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    #[must_use]
    pub const fn with_action_drain_timeout(mut self, timeout: Duration) -> Self {
        self.action_drain_timeout = timeout;
        self
    }

    #[must_use]
    pub fn with_layout(mut self, layout: RemoteLayout) -> Self {
        self.layout = layout;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_login_debug_redacts_password() {
        let login = Login::new("deploy", "hunter2");
        let printed = format!("{login:?}");
        assert!(printed.contains("deploy"));
        assert!(!printed.contains("hunter2"));
    }

    #[test]
    fn test_settings_defaults() {
        let settings = Settings::new(Login::new("u", "p"));
        assert_eq!(settings.connect_timeout, Duration::from_secs(10));
        assert_eq!(settings.poll_interval, Duration::from_secs(5));
        assert_eq!(settings.layout.compose_project, "common");
    }
}
