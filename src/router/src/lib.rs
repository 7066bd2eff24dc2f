use axum::{
    Router,
    http::StatusCode,
    response::IntoResponse,
    routing::{get, post},
};
use common::config::ServerConfig;
use janitor::Reconciler;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

pub mod endpoints;

pub use endpoints::cleanup::CleanupResponse;

pub trait RouterState: Clone + Send + Sync + 'static {
    fn reconciler(&self) -> &Arc<Reconciler>;
    /// Deadline after which a triggered run is cancelled.
    fn request_timeout(&self) -> Duration;
    /// Cancelled on server shutdown; every triggered run observes it.
    fn shutdown(&self) -> &CancellationToken;
}

/// State shared by the route handlers
#[derive(Clone)]
pub struct JanitorState {
    reconciler: Arc<Reconciler>,
    request_timeout: Duration,
    shutdown: CancellationToken,
}

impl std::fmt::Debug for JanitorState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("JanitorState")
            .field("reconciler", &"Reconciler")
            .field("request_timeout", &self.request_timeout)
            .field("shutdown", &self.shutdown.is_cancelled())
            .finish()
    }
}

impl JanitorState {
    pub fn new(
        reconciler: Arc<Reconciler>,
        request_timeout: Duration,
        shutdown: CancellationToken,
    ) -> Self {
        Self {
            reconciler,
            request_timeout,
            shutdown,
        }
    }

    pub fn from_config(
        reconciler: Arc<Reconciler>,
        config: &ServerConfig,
        shutdown: CancellationToken,
    ) -> Self {
        Self::new(reconciler, config.request_timeout, shutdown)
    }
}

impl RouterState for JanitorState {
    fn reconciler(&self) -> &Arc<Reconciler> {
        &self.reconciler
    }

    fn request_timeout(&self) -> Duration {
        self.request_timeout
    }

    fn shutdown(&self) -> &CancellationToken {
        &self.shutdown
    }
}

/// Create a new router instance with all routes configured
pub fn create_router<S: RouterState>(state: S) -> Router {
    Router::new()
        .route("/health", get(health_check))
        .route(
            "/api/v1/cleanup",
            post(endpoints::cleanup::trigger_cleanup::<S>),
        )
        .with_state(state)
}

/// Basic health check endpoint
async fn health_check() -> impl IntoResponse {
    StatusCode::OK
}
