//! Read-only HTTP projection of the branch store.
//!
//! The server runs on its own thread with a current-thread tokio runtime;
//! handlers only ever read the store, so they never contend with a sync
//! pass for anything longer than one entry lock.

use std::net::SocketAddr;
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Instant;

use axum::body::Body;
use axum::extract::{Path, Request, State};
use axum::http::{StatusCode, header};
use axum::middleware::{self, Next};
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::{Json, Router};
use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::sync::oneshot;

use crate::store::{BranchState, BranchStore};
use crate::types::BranchName;

/// Branch metadata as served over HTTP.
#[derive(Debug, Serialize)]
struct BranchSummary {
    name: BranchName,
    last_update: DateTime<Utc>,
    last_updated_by: String,
    last_updated_by_email: String,
}

impl From<BranchState> for BranchSummary {
    fn from(state: BranchState) -> Self {
        Self {
            name: state.name,
            last_update: state.last_update,
            last_updated_by: state.author_name,
            last_updated_by_email: state.author_email,
        }
    }
}

/// Build the router serving branch metadata and snapshots.
///
/// Routes:
/// - `GET /branches` - all branches, most recently updated first
/// - `GET /branches/{name}` - metadata for one branch
/// - `GET /branches/{name}/contents` - the cached snapshot archive
pub fn router(store: Arc<BranchStore>) -> Router {
    Router::new()
        .route("/branches", get(list_branches))
        .route("/branches/{name}", get(get_branch))
        .route("/branches/{name}/contents", get(get_branch_contents))
        .layer(middleware::from_fn(log_requests))
        .with_state(store)
}

async fn log_requests(request: Request, next: Next) -> Response {
    let method = request.method().clone();
    let path = request.uri().path().to_string();
    let start = Instant::now();

    let response = next.run(request).await;

    log::info!(
        "Request completed: method={} path={} status={} duration={:?}",
        method,
        path,
        response.status().as_u16(),
        start.elapsed(),
    );
    response
}

fn error_response(status: StatusCode, message: &str) -> Response {
    (status, Json(serde_json::json!({ "error": message }))).into_response()
}

async fn list_branches(State(store): State<Arc<BranchStore>>) -> Json<Vec<BranchSummary>> {
    let mut branches: Vec<BranchSummary> = store
        .get_all()
        .into_iter()
        .map(BranchSummary::from)
        .collect();

    // Most recently updated first; ties broken by name for a stable order.
    branches.sort_by(|a, b| {
        b.last_update
            .cmp(&a.last_update)
            .then_with(|| a.name.cmp(&b.name))
    });

    Json(branches)
}

async fn get_branch(
    State(store): State<Arc<BranchStore>>,
    Path(name): Path<String>,
) -> Response {
    let name: BranchName = match name.parse() {
        Ok(name) => name,
        Err(_) => return error_response(StatusCode::BAD_REQUEST, "invalid branch name"),
    };

    match store.get(&name) {
        Some(state) => Json(BranchSummary::from(state)).into_response(),
        None => error_response(StatusCode::NOT_FOUND, "branch not found"),
    }
}

async fn get_branch_contents(
    State(store): State<Arc<BranchStore>>,
    Path(name): Path<String>,
) -> Response {
    let name: BranchName = match name.parse() {
        Ok(name) => name,
        Err(_) => return error_response(StatusCode::BAD_REQUEST, "invalid branch name"),
    };

    let Some(state) = store.get(&name) else {
        return error_response(StatusCode::NOT_FOUND, "branch not found");
    };

    match state.snapshot {
        // Known branch, snapshot not built yet: distinct from not-found.
        None => StatusCode::NO_CONTENT.into_response(),
        Some(payload) => (
            [(header::CONTENT_TYPE, "application/gzip")],
            Body::from(payload.to_vec()),
        )
            .into_response(),
    }
}

/// Handle for managing the HTTP server thread.
pub struct HttpServerHandle {
    thread: Option<JoinHandle<()>>,
    close: Option<oneshot::Sender<()>>,
}

impl HttpServerHandle {
    /// Bind `addr` and serve the query surface on a dedicated thread.
    ///
    /// Binding happens here, synchronously, so an unusable address fails
    /// startup instead of surfacing later in a log line.
    pub fn spawn(store: Arc<BranchStore>, addr: SocketAddr) -> std::io::Result<Self> {
        let listener = std::net::TcpListener::bind(addr)?;
        listener.set_nonblocking(true)?;

        let (close_tx, close_rx) = oneshot::channel();
        let app = router(store);

        let thread = thread::Builder::new()
            .name("repowatch-http".to_string())
            .spawn(move || {
                let runtime = match tokio::runtime::Builder::new_current_thread()
                    .enable_all()
                    .build()
                {
                    Ok(runtime) => runtime,
                    Err(err) => {
                        log::error!("Failed to start HTTP runtime: {}", err);
                        return;
                    }
                };

                runtime.block_on(async move {
                    let listener = match tokio::net::TcpListener::from_std(listener) {
                        Ok(listener) => listener,
                        Err(err) => {
                            log::error!("Failed to adopt HTTP listener: {}", err);
                            return;
                        }
                    };

                    log::info!("HTTP server listening on {}", addr);
                    let serve = axum::serve(listener, app).with_graceful_shutdown(async {
                        let _ = close_rx.await;
                    });
                    if let Err(err) = serve.await {
                        log::error!("HTTP server error: {}", err);
                    }
                });

                log::info!("HTTP server stopped");
            })
            .expect("failed to spawn http thread");

        Ok(Self {
            thread: Some(thread),
            close: Some(close_tx),
        })
    }

    /// Signal shutdown and wait for the server thread to exit.
    pub fn shutdown(&mut self) {
        if let Some(close) = self.close.take() {
            let _ = close.send(());
        }
        if let Some(thread) = self.thread.take() {
            let _ = thread.join();
        }
    }
}

impl Drop for HttpServerHandle {
    fn drop(&mut self) {
        self.shutdown();
    }
}
