//! Route handlers
//!
//! Handlers only translate between JSON and the scheduler; all crawl
//! behavior lives in the engine.

use crate::crawler::normalize_seeds;
use crate::server::types::{
    ApiError, CrawlCommand, CrawlRequest, StartResponse, ValidateResponse,
};
use crate::server::AppState;
use crate::storage::CorpusStats;
use crate::JobSnapshot;
use axum::extract::rejection::JsonRejection;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::{json, Value};
use uuid::Uuid;

pub async fn health() -> Json<Value> {
    Json(json!({ "status": "ok" }))
}

/// `POST /crawl`
pub async fn start_crawl(
    State(state): State<AppState>,
    body: Result<Json<CrawlRequest>, JsonRejection>,
) -> Result<Response, ApiError> {
    let Json(request) = body.map_err(|e| ApiError::InvalidBody(e.body_text()))?;

    match CrawlCommand::try_from(request)? {
        CrawlCommand::Validate { seeds } => {
            let (seeds, hosts) = normalize_seeds(&seeds)?;
            let response = ValidateResponse {
                valid: true,
                seeds: seeds.iter().map(|u| u.to_string()).collect(),
                allowed_hosts: hosts.into_iter().collect(),
            };
            Ok((StatusCode::OK, Json(response)).into_response())
        }
        CrawlCommand::Start {
            seeds,
            max_pages,
            dry_run,
        } => {
            let job = state.scheduler.create_job(&seeds, max_pages, dry_run)?;
            let snapshot = job.snapshot();
            state.scheduler.spawn_job(job);

            let response = StartResponse {
                job_id: snapshot.id,
                status: snapshot.status,
                created_at: snapshot.created_at,
                max_pages: snapshot.max_pages,
                dry_run: snapshot.dry_run,
                queued: snapshot.stats.queued,
            };
            Ok((StatusCode::ACCEPTED, Json(response)).into_response())
        }
    }
}

/// `GET /jobs/:id`
pub async fn get_job(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<JobSnapshot>, ApiError> {
    let id = Uuid::parse_str(&id).map_err(|_| ApiError::JobNotFound)?;

    match state.scheduler.job(id)? {
        Some(snapshot) => Ok(Json(snapshot)),
        None => Err(ApiError::JobNotFound),
    }
}

/// `GET /corpus/stats`
pub async fn corpus_stats(State(state): State<AppState>) -> Result<Json<CorpusStats>, ApiError> {
    Ok(Json(state.scheduler.corpus_stats()?))
}
