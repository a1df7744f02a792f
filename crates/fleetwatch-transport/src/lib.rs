//! HTTP and WebSocket surface.
//!
//! Provides:
//! - Wire protocol (flat JSON frames)
//! - WebSocket session transport (feature: websocket)
//! - CI commit webhook and read-only host listing (feature: websocket)

pub mod protocol;

#[cfg(feature = "websocket")]
pub mod hosts;
#[cfg(feature = "websocket")]
pub mod webhook;
#[cfg(feature = "websocket")]
pub mod websocket;

pub use protocol::{ClientMessage, ServerMessage};

#[cfg(feature = "websocket")]
pub use router::{AppState, create_router};

#[cfg(feature = "websocket")]
mod router {
    use axum::{
        Router,
        routing::{get, post},
    };
    use fleetwatch_core::{HostStore, RemoteShell};
    use fleetwatch_session::SessionController;
    use tower::ServiceBuilder;
    use tower_http::{cors::CorsLayer, trace::TraceLayer};

    use crate::{hosts, webhook, websocket};

    /// Shared handler state.
    pub struct AppState<S, R> {
        pub controller: SessionController<S, R>,
    }

    impl<S, R> Clone for AppState<S, R> {
        fn clone(&self) -> Self {
            Self {
                controller: self.controller.clone(),
            }
        }
    }

    /// Build the application router.
    ///
    /// # Example
    /// ```ignore
    /// let app = create_router(SessionController::new(store, shell, settings));
    /// axum::serve(listener, app).await?;
    /// ```
    #[must_use]
    pub fn create_router<S, R>(controller: SessionController<S, R>) -> Router
    where
        S: HostStore + 'static,
        R: RemoteShell + 'static,
    {
        Router::new()
            .route("/ws/core/{host_id}/", get(websocket::ws_handler::<S, R>))
            .route("/api/hosts/", get(hosts::list_hosts::<S, R>))
            .route("/api/hosts/{id}/", get(hosts::get_host::<S, R>))
            .route("/api/gitlab/hosts/commit/", post(webhook::gitlab_commit::<S, R>))
            .layer(
                ServiceBuilder::new()
                    .layer(TraceLayer::new_for_http())
                    .layer(CorsLayer::permissive()),
            )
            .with_state(AppState { controller })
    }

}
