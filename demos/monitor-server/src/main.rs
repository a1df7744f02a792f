//! Host monitoring server.
//!
//! Run with: cargo run -p monitor-server -- --ssh-username deploy
//!
//! Hosts are read from the `hosts` table of the SQLite database; connect a
//! WebSocket client to `ws://localhost:8000/ws/core/<host id>/`.

use std::{net::SocketAddr, sync::Arc, time::Duration};

use anyhow::Context as _;
use clap::Parser;
use fleetwatch_core::{Login, RemoteLayout, Settings};
use fleetwatch_session::{SessionController, storage::SqliteHostStore};
use fleetwatch_ssh::SshShell;
use fleetwatch_transport::create_router;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Debug, Parser)]
#[command(name = "monitor-server", about = "Watch compose deployments over SSH")]
struct Cli {
    /// Address to listen on.
    #[arg(long, env = "FLEETWATCH_BIND", default_value = "127.0.0.1:8000")]
    bind: SocketAddr,

    /// SQLite database holding host records.
    #[arg(long, env = "DATABASE_URL", default_value = "sqlite://fleetwatch.db")]
    database_url: String,

    #[arg(long, env = "SSH_USERNAME")]
    ssh_username: String,

    #[arg(long, env = "SSH_PASSWORD", hide_env_values = true, default_value = "")]
    ssh_password: String,

    /// Seconds between status polls of a watched host.
    #[arg(long, env = "FLEETWATCH_POLL_INTERVAL_SECS", default_value_t = 5)]
    poll_interval_secs: u64,

    #[arg(long, env = "FLEETWATCH_CONNECT_TIMEOUT_SECS", default_value_t = 10)]
    connect_timeout_secs: u64,

    /// Checkout of the deployed project on every host.
    #[arg(long, env = "FLEETWATCH_PROJECT_DIR")]
    project_dir: Option<String>,
}

impl Cli {
    fn settings(&self) -> Settings {
        let mut layout = RemoteLayout::default();
        if let Some(dir) = &self.project_dir {
            layout.project_dir.clone_from(dir);
        }

        Settings::new(Login::new(&self.ssh_username, &self.ssh_password))
            .with_poll_interval(Duration::from_secs(self.poll_interval_secs))
            .with_connect_timeout(Duration::from_secs(self.connect_timeout_secs))
            .with_layout(layout)
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer())
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .init();

    let cli = Cli::parse();
    let settings = Arc::new(cli.settings());

    let store = SqliteHostStore::connect(&cli.database_url)
        .await
        .with_context(|| format!("failed to open {}", cli.database_url))?;
    let shell = SshShell::new(settings.connect_timeout);

    let controller = SessionController::new(Arc::new(store), Arc::new(shell), settings);
    let app = create_router(controller);

    let listener = tokio::net::TcpListener::bind(cli.bind)
        .await
        .with_context(|| format!("failed to bind {}", cli.bind))?;
    tracing::info!("Server listening on http://{}", cli.bind);

    axum::serve(listener, app).await.context("server error")?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use clap::CommandFactory;

    use super::*;

    #[test]
    fn test_cli_is_well_formed() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_settings_from_flags() {
        let cli = Cli::try_parse_from([
            "monitor-server",
            "--ssh-username",
            "deploy",
            "--ssh-password",
            "secret",
            "--poll-interval-secs",
            "2",
            "--project-dir",
            "/srv/common",
        ])
        .unwrap();

        let settings = cli.settings();
        assert_eq!(settings.login.username, "deploy");
        assert_eq!(settings.poll_interval, Duration::from_secs(2));
        assert_eq!(settings.connect_timeout, Settings::DEFAULT_CONNECT_TIMEOUT);
        assert_eq!(settings.layout.project_dir, "/srv/common");
        assert_eq!(settings.layout.git_branch, "main");
    }
}
