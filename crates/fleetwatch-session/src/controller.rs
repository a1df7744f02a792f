//! Session controller for live host monitoring.

use std::{sync::Arc, time::Duration};

use fleetwatch_core::{
    Action, EventSink, HostId, HostStore, RemoteShell, SessionEvent, Settings, StoreError,
};
use fleetwatch_executor::{PipelineRunner, poll_status};
use tokio::{sync::mpsc, task::JoinHandle};
use tokio_util::sync::CancellationToken;
use tracing::Instrument;
use uuid::Uuid;

/// Sent when the requested host does not exist.
pub const HOST_NOT_FOUND: &str = "SSH host not found";

/// Actions a session may have waiting behind the one that is running.
pub const ACTION_QUEUE_CAPACITY: usize = 4;

/// Session controller error.
#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    #[error("Host not found: {0}")]
    HostNotFound(String),
    #[error("Storage error: {0}")]
    Storage(#[from] StoreError),
}

/// Lifecycle of a client session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    /// Resolving the host; nothing runs yet.
    Connecting,
    /// Polling task running, actions accepted.
    Active,
    /// Cancelled; nothing more is sent.
    Closed,
}

/// Sink that drops every event once the session is cancelled.
struct GatedSink {
    inner: Arc<dyn EventSink>,
    token: CancellationToken,
}

impl EventSink for GatedSink {
    fn send(&self, event: SessionEvent) -> bool {
        if self.token.is_cancelled() {
            tracing::trace!("session closed, event suppressed");
            return false;
        }
        self.inner.send(event)
    }
}

struct Shared<S, R> {
    store: Arc<S>,
    shell: Arc<R>,
    settings: Arc<Settings>,
    runner: PipelineRunner<R, S>,
}

/// Opens monitoring sessions against hosts in a store.
pub struct SessionController<S, R> {
    shared: Arc<Shared<S, R>>,
}

impl<S, R> Clone for SessionController<S, R> {
    fn clone(&self) -> Self {
        Self {
            shared: Arc::clone(&self.shared),
        }
    }
}

impl<S, R> SessionController<S, R>
where
    S: HostStore + 'static,
    R: RemoteShell + 'static,
{
    /// Create a new session controller.
    #[must_use]
    pub fn new(store: Arc<S>, shell: Arc<R>, settings: Arc<Settings>) -> Self {
        let runner = PipelineRunner::new(
            Arc::clone(&shell),
            Arc::clone(&store),
            Arc::clone(&settings),
        );
        Self {
            shared: Arc::new(Shared {
                store,
                shell,
                settings,
                runner,
            }),
        }
    }

    /// The host store sessions read from.
    #[must_use]
    pub fn store(&self) -> &Arc<S> {
        &self.shared.store
    }

    /// Resolve `host_id` and start polling it.
    ///
    /// On failure the client has already been told why; the caller should
    /// close the channel.
    ///
    /// # Errors
    /// Returns error if the host is unknown or the store fails.
    pub async fn open(&self, host_id: &str, sink: Arc<dyn EventSink>) -> Result<Session, SessionError> {
        let id = Uuid::new_v4();
        tracing::debug!(session_id = %id, host_id, state = ?SessionState::Connecting, "session opening");

        let host = match host_id.parse::<HostId>() {
            Ok(parsed) => match self.shared.store.get(parsed).await {
                Ok(host) => host,
                Err(e) => {
                    tracing::error!(session_id = %id, host_id, error = %e, "host lookup failed");
                    sink.send(SessionEvent::Error(format!("Internal error: {e}")));
                    return Err(e.into());
                }
            },
            Err(_) => None,
        };
        let Some(host) = host else {
            tracing::warn!(session_id = %id, host_id, "host not found on connect");
            sink.send(SessionEvent::Error(HOST_NOT_FOUND.to_string()));
            return Err(SessionError::HostNotFound(host_id.to_string()));
        };

        let token = CancellationToken::new();
        let sink = Arc::new(GatedSink {
            inner: sink,
            token: token.clone(),
        });
        let span = tracing::info_span!("session", session_id = %id, host_id = host.id);

        let poller = tokio::spawn(
            poll_loop(
                Arc::clone(&self.shared),
                host.id,
                Arc::clone(&sink),
                token.clone(),
            )
            .instrument(span.clone()),
        );

        let (actions, queue) = mpsc::channel(ACTION_QUEUE_CAPACITY);
        let worker = tokio::spawn(
            action_worker(Arc::clone(&self.shared), host.id, sink, token.clone(), queue)
                .instrument(span),
        );

        tracing::info!(session_id = %id, host_id = host.id, "session active");
        Ok(Session {
            id,
            host_id: host.id,
            token,
            poller: Some(poller),
            actions: Some(actions),
            worker: Some(worker),
            drain_timeout: self.shared.settings.action_drain_timeout,
        })
    }
}

/// Reload the host and poll it.
async fn tick<S, R>(shared: &Shared<S, R>, host_id: HostId) -> SessionEvent
where
    S: HostStore,
    R: RemoteShell,
{
    match shared.store.get(host_id).await {
        Ok(Some(host)) => {
            SessionEvent::Snapshot(poll_status(shared.shell.as_ref(), &host, &shared.settings).await)
        }
        Ok(None) => SessionEvent::Error(HOST_NOT_FOUND.to_string()),
        Err(e) => {
            tracing::error!(error = %e, "host reload failed");
            SessionEvent::Error(format!("Internal error: {e}"))
        }
    }
}

async fn poll_loop<S, R>(
    shared: Arc<Shared<S, R>>,
    host_id: HostId,
    sink: Arc<GatedSink>,
    token: CancellationToken,
) where
    S: HostStore,
    R: RemoteShell,
{
    tracing::debug!("poll loop started");
    let interval = shared.settings.poll_interval;

    while !token.is_cancelled() {
        let event = tokio::select! {
            biased;
            () = token.cancelled() => break,
            event = tick(&shared, host_id) => event,
        };
        sink.send(event);

        tokio::select! {
            biased;
            () = token.cancelled() => break,
            () = tokio::time::sleep(interval) => {}
        }
    }

    tracing::debug!("poll loop finished");
}

async fn action_worker<S, R>(
    shared: Arc<Shared<S, R>>,
    host_id: HostId,
    sink: Arc<GatedSink>,
    token: CancellationToken,
    mut queue: mpsc::Receiver<Action>,
) where
    S: HostStore,
    R: RemoteShell,
{
    while let Some(action) = queue.recv().await {
        if token.is_cancelled() {
            tracing::debug!(%action, "session closed, queued action dropped");
            break;
        }

        match shared.store.get(host_id).await {
            Ok(Some(host)) => {
                let outcome = shared.runner.run(action, &host, sink.as_ref()).await;
                tracing::debug!(%action, ?outcome, "action finished");
            }
            Ok(None) => {
                tracing::warn!(%action, "host vanished before action");
                sink.send(SessionEvent::Error(HOST_NOT_FOUND.to_string()));
            }
            Err(e) => {
                tracing::error!(%action, error = %e, "host reload failed");
                sink.send(SessionEvent::Error(format!("Internal error: {e}")));
            }
        }
    }
}

/// Handle to one live client session.
///
/// Call [`Session::close`] on disconnect. Dropping the handle without closing
/// cancels and aborts its tasks instead of waiting for them.
pub struct Session {
    id: Uuid,
    host_id: HostId,
    token: CancellationToken,
    poller: Option<JoinHandle<()>>,
    actions: Option<mpsc::Sender<Action>>,
    worker: Option<JoinHandle<()>>,
    drain_timeout: Duration,
}

impl Session {
    #[must_use]
    pub const fn id(&self) -> Uuid {
        self.id
    }

    #[must_use]
    pub const fn host_id(&self) -> HostId {
        self.host_id
    }

    #[must_use]
    pub fn state(&self) -> SessionState {
        if self.token.is_cancelled() {
            SessionState::Closed
        } else {
            SessionState::Active
        }
    }

    /// Queue an action. Actions of one session run one at a time, in order.
    ///
    /// Returns `false` if the session is no longer active or already has
    /// [`ACTION_QUEUE_CAPACITY`] actions waiting; the action is dropped.
    pub fn submit(&self, action: Action) -> bool {
        if self.token.is_cancelled() {
            return false;
        }
        let Some(actions) = self.actions.as_ref() else {
            return false;
        };
        match actions.try_send(action) {
            Ok(()) => {
                tracing::debug!(session_id = %self.id, %action, "action queued");
                true
            }
            Err(mpsc::error::TrySendError::Full(_)) => {
                tracing::warn!(session_id = %self.id, %action, "action queue full, dropping");
                false
            }
            Err(mpsc::error::TrySendError::Closed(_)) => false,
        }
    }

    /// Stop the session and wait for its background work to finish.
    ///
    /// Nothing is sent to the client once this starts. An action already
    /// running is given `drain_timeout` to finish its remote commands.
    pub async fn close(mut self) {
        self.token.cancel();

        if let Some(poller) = self.poller.take() {
            if let Err(e) = poller.await {
                tracing::error!(session_id = %self.id, error = %e, "poll loop ended abnormally");
            }
        }

        drop(self.actions.take());
        if let Some(mut worker) = self.worker.take() {
            if tokio::time::timeout(self.drain_timeout, &mut worker).await.is_err() {
                tracing::warn!(session_id = %self.id, "in-flight action did not finish, aborting");
                worker.abort();
                let _ = worker.await;
            }
        }

        tracing::info!(session_id = %self.id, host_id = self.host_id, "session closed");
    }
}

impl Drop for Session {
    fn drop(&mut self) {
        self.token.cancel();
        if let Some(poller) = self.poller.take() {
            poller.abort();
        }
        if let Some(worker) = self.worker.take() {
            worker.abort();
        }
    }
}
