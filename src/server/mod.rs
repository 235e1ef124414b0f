//! HTTP control surface
//!
//! Routes:
//! - `POST /crawl` - start a job (or validate seeds with `validate_only`)
//! - `GET /jobs/:id` - job snapshot
//! - `GET /corpus/stats` - aggregate corpus counts
//! - `GET /health` - liveness

mod handlers;
mod types;

pub use types::{
    ApiError, CrawlCommand, CrawlRequest, ErrorBody, StartResponse, ValidateResponse,
};

use crate::crawler::Scheduler;
use axum::routing::{get, post};
use axum::Router;
use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;
use tower_http::trace::TraceLayer;

/// Shared handler state
#[derive(Clone)]
pub struct AppState {
    pub scheduler: Arc<Scheduler>,
}

/// Builds the router around `scheduler`
pub fn router(scheduler: Arc<Scheduler>) -> Router {
    Router::new()
        .route("/crawl", post(handlers::start_crawl))
        .route("/jobs/:id", get(handlers::get_job))
        .route("/corpus/stats", get(handlers::corpus_stats))
        .route("/health", get(handlers::health))
        .layer(TraceLayer::new_for_http())
        .with_state(AppState { scheduler })
}

/// Serves on an already bound listener until `shutdown` resolves
pub async fn serve_listener<F>(
    listener: TcpListener,
    scheduler: Arc<Scheduler>,
    shutdown: F,
) -> std::io::Result<()>
where
    F: Future<Output = ()> + Send + 'static,
{
    if let Ok(addr) = listener.local_addr() {
        tracing::info!("Listening on http://{}", addr);
    }

    axum::serve(listener, router(scheduler))
        .with_graceful_shutdown(shutdown)
        .await
}

/// Binds `addr` and serves until `shutdown` resolves
pub async fn serve<F>(addr: SocketAddr, scheduler: Arc<Scheduler>, shutdown: F) -> std::io::Result<()>
where
    F: Future<Output = ()> + Send + 'static,
{
    let listener = TcpListener::bind(addr).await?;
    serve_listener(listener, scheduler, shutdown).await
}
