//! Request and response bodies of the HTTP control surface

use crate::crawler::JobStatus;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Raw `POST /crawl` body
#[derive(Debug, Clone, Default, Deserialize)]
pub struct CrawlRequest {
    #[serde(default)]
    pub seeds: Option<Vec<String>>,
    #[serde(default, alias = "maxPages")]
    pub max_pages: Option<usize>,
    #[serde(default, alias = "dryRun")]
    pub dry_run: Option<bool>,
    #[serde(default, alias = "validateOnly")]
    pub validate_only: Option<bool>,
}

/// Validated intent of a `POST /crawl` body
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CrawlCommand {
    /// Create a job and start it in the background
    Start {
        seeds: Vec<String>,
        max_pages: Option<usize>,
        dry_run: bool,
    },
    /// Normalize the seeds and report what a job would crawl
    Validate { seeds: Vec<String> },
}

impl TryFrom<CrawlRequest> for CrawlCommand {
    type Error = ApiError;

    fn try_from(request: CrawlRequest) -> Result<Self, Self::Error> {
        let seeds: Vec<String> = request
            .seeds
            .unwrap_or_default()
            .into_iter()
            .filter(|s| !s.trim().is_empty())
            .collect();

        if seeds.is_empty() {
            return Err(ApiError::SeedsRequired);
        }

        if request.validate_only.unwrap_or(false) {
            Ok(Self::Validate { seeds })
        } else {
            Ok(Self::Start {
                seeds,
                max_pages: request.max_pages,
                dry_run: request.dry_run.unwrap_or(false),
            })
        }
    }
}

/// `202` body for a started job
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StartResponse {
    pub job_id: Uuid,
    pub status: JobStatus,
    pub created_at: DateTime<Utc>,
    pub max_pages: usize,
    pub dry_run: bool,
    pub queued: u64,
}

/// `200` body for a validate-only request
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ValidateResponse {
    pub valid: bool,
    pub seeds: Vec<String>,
    pub allowed_hosts: Vec<String>,
}

/// Error body: `{"error": code, "message": text}`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorBody {
    pub error: String,
    pub message: String,
}

/// Errors returned by the handlers
#[derive(Debug)]
pub enum ApiError {
    InvalidBody(String),
    SeedsRequired,
    InvalidSeed(String),
    InvalidMaxPages,
    JobNotFound,
    Internal(String),
}

impl ApiError {
    pub fn status(&self) -> StatusCode {
        match self {
            Self::InvalidBody(_)
            | Self::SeedsRequired
            | Self::InvalidSeed(_)
            | Self::InvalidMaxPages => StatusCode::BAD_REQUEST,
            Self::JobNotFound => StatusCode::NOT_FOUND,
            Self::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    pub fn code(&self) -> &'static str {
        match self {
            Self::InvalidBody(_) => "invalid_body",
            Self::SeedsRequired => "seeds_required",
            Self::InvalidSeed(_) => "invalid_seed",
            Self::InvalidMaxPages => "invalid_max_pages",
            Self::JobNotFound => "job_not_found",
            Self::Internal(_) => "internal_error",
        }
    }

    fn message(&self) -> String {
        match self {
            Self::InvalidBody(m) | Self::InvalidSeed(m) | Self::Internal(m) => m.clone(),
            Self::SeedsRequired => "at least one seed URL must be supplied".to_string(),
            Self::InvalidMaxPages => "max_pages must be at least 1".to_string(),
            Self::JobNotFound => "no job with this id".to_string(),
        }
    }
}

impl From<crate::HarvestError> for ApiError {
    fn from(err: crate::HarvestError) -> Self {
        use crate::HarvestError;

        match err {
            HarvestError::SeedsRequired => Self::SeedsRequired,
            HarvestError::InvalidSeed { .. } => Self::InvalidSeed(err.to_string()),
            HarvestError::InvalidMaxPages => Self::InvalidMaxPages,
            other => Self::Internal(other.to_string()),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        if let Self::Internal(message) = &self {
            tracing::error!("Request failed: {}", message);
        }

        let body = ErrorBody {
            error: self.code().to_string(),
            message: self.message(),
        };
        (self.status(), Json(body)).into_response()
    }
}
