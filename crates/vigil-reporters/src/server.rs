//! HTTP status endpoint.
//!
//! Keeps the most recent status and serves it as JSON: 200 while healthy,
//! 500 otherwise. Until the first report arrives the endpoint answers 200
//! with an empty probe map.

use std::sync::Arc;

use async_trait::async_trait;
use axum::Router;
use axum::extract::State;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Json};
use axum::routing::get;
use tokio::net::TcpListener;
use tokio::sync::RwLock;
use tracing::info;
use vigil_core::{CancellationToken, Context, Reporter, Status};

pub const DEFAULT_ADDR: &str = "0.0.0.0:8081";
pub const DEFAULT_PATH: &str = "/healthz";

#[derive(Clone)]
pub struct HttpReporter {
    path: String,
    last: Arc<RwLock<Status>>,
}

impl Default for HttpReporter {
    fn default() -> Self {
        Self::new(DEFAULT_PATH)
    }
}

impl HttpReporter {
    /// A reporter serving at `path`. An empty path means `/healthz`.
    pub fn new(path: impl Into<String>) -> Self {
        let mut path = path.into();
        if path.is_empty() {
            path = DEFAULT_PATH.to_string();
        } else if !path.starts_with('/') {
            path.insert(0, '/');
        }
        Self {
            path,
            last: Arc::new(RwLock::new(Status::default())),
        }
    }

    pub fn path(&self) -> &str {
        &self.path
    }

    /// The most recently reported status.
    pub async fn last(&self) -> Status {
        self.last.read().await.clone()
    }

    pub fn router(&self) -> Router {
        Router::new()
            .route(&self.path, get(serve_status))
            .with_state(self.last.clone())
    }

    /// Serve on `listener` until `token` is cancelled.
    pub async fn serve(&self, listener: TcpListener, token: CancellationToken) -> std::io::Result<()> {
        let addr = listener.local_addr()?;
        info!(%addr, path = %self.path, "status endpoint listening");
        axum::serve(listener, self.router())
            .with_graceful_shutdown(token.cancelled_owned())
            .await?;
        info!(%addr, "status endpoint stopped");
        Ok(())
    }
}

async fn serve_status(State(last): State<Arc<RwLock<Status>>>) -> impl IntoResponse {
    let status = last.read().await.clone();
    let code = if status.is_healthy() {
        StatusCode::OK
    } else {
        StatusCode::INTERNAL_SERVER_ERROR
    };
    (code, Json(status))
}

#[async_trait]
impl Reporter for HttpReporter {
    fn name(&self) -> &str {
        "http"
    }

    async fn report(&self, _ctx: &Context, status: &Status) -> anyhow::Result<()> {
        *self.last.write().await = status.clone();
        Ok(())
    }
}
