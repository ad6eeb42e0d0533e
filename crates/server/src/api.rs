//! Admin HTTP surface over a running [`Detector`].
//!
//! | Method | Path                  | Purpose                                  |
//! |--------|-----------------------|------------------------------------------|
//! | GET    | `/v1/issues`          | Active issues (`type`, `object_type`, `name` filters) |
//! | GET    | `/v1/issues/resolved` | Recently resolved issues (`limit`)        |
//! | GET    | `/v1/issues/{id}`     | One active issue                          |
//! | POST   | `/v1/feed`            | Submit a JSON array of feed messages      |
//! | GET    | `/healthz`            | Liveness                                  |
//! | GET    | `/readyz`             | Readiness (initial sync complete)         |
//!
//! Errors are JSON objects carrying the detector's error code:
//!
//! ```json
//! {"error": "not_ready", "code": 1000, "message": "...", "retryable": true}
//! ```
//!
//! A feed submission that fails part way also reports how many messages were
//! accepted before the failure; only the rest need to be redelivered.

use std::{sync::Arc, time::Duration};

use axum::{
    Json, Router,
    extract::{Path, Query, State, rejection::JsonRejection},
    http::{HeaderValue, StatusCode, header},
    response::{IntoResponse, Response},
    routing::{get, post},
};
use inferadb_issues_detector::{Detector, DetectorPhase};
use inferadb_issues_types::{
    DetectorError, EntityKind, ErrorCode, FeedMessage, Issue, IssueFilter, IssueId, IssueType,
    ResolvedIssue,
};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

/// Resolved issues returned when no `limit` is given.
const DEFAULT_RESOLVED_LIMIT: usize = 50;

/// Longest a feed submission may wait for its events to be applied.
const MAX_FEED_WAIT: Duration = Duration::from_secs(30);

/// Shared handler state.
#[derive(Debug, Clone)]
pub struct AppState {
    detector: Arc<Detector>,
}

impl AppState {
    fn reject(&self, error: DetectorError) -> ApiError {
        let retry_after = error.is_retryable().then(|| self.detector.config().not_ready_retry_after);
        ApiError { error, retry_after, accepted: None }
    }
}

/// Builds the admin router.
pub fn router(detector: Arc<Detector>) -> Router {
    Router::new()
        .route("/healthz", get(health))
        .route("/readyz", get(readiness))
        .route("/v1/issues", get(list_issues))
        .route("/v1/issues/resolved", get(resolved_issues))
        .route("/v1/issues/:id", get(get_issue))
        .route("/v1/feed", post(submit_feed))
        .with_state(AppState { detector })
}

// ============================================================================
// Errors
// ============================================================================

/// A detector error rendered as an HTTP response.
#[derive(Debug)]
pub struct ApiError {
    error: DetectorError,
    retry_after: Option<Duration>,
    /// Feed messages accepted before the failure.
    accepted: Option<usize>,
}

impl ApiError {
    fn invalid(message: impl Into<String>) -> Self {
        Self {
            error: DetectorError::InvalidArgument { message: message.into() },
            retry_after: None,
            accepted: None,
        }
    }

    fn with_accepted(self, accepted: usize) -> Self {
        Self { accepted: Some(accepted), ..self }
    }
}

#[derive(Debug, Serialize)]
struct ErrorBody {
    error: &'static str,
    code: u16,
    message: String,
    retryable: bool,
    suggested_action: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    accepted: Option<usize>,
}

/// Stable short name of an error code, used as the `error` field.
fn error_slug(code: ErrorCode) -> &'static str {
    match code {
        ErrorCode::NotReady => "not_ready",
        ErrorCode::ShuttingDown => "shutting_down",
        ErrorCode::FeedClosed => "feed_closed",
        ErrorCode::WatermarkTimeout => "watermark_timeout",
        ErrorCode::IssueNotFound => "not_found",
        ErrorCode::InvalidArgument => "invalid_argument",
        ErrorCode::Config => "config",
    }
}

fn status_for(code: ErrorCode) -> StatusCode {
    match code {
        ErrorCode::NotReady | ErrorCode::ShuttingDown | ErrorCode::FeedClosed => {
            StatusCode::SERVICE_UNAVAILABLE
        },
        ErrorCode::WatermarkTimeout => StatusCode::GATEWAY_TIMEOUT,
        ErrorCode::IssueNotFound => StatusCode::NOT_FOUND,
        ErrorCode::InvalidArgument => StatusCode::BAD_REQUEST,
        ErrorCode::Config => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let code = self.error.code();
        let status = status_for(code);
        if status.is_server_error() && !code.is_retryable() {
            warn!(error = %self.error, code = code.as_u16(), "Admin request failed");
        } else {
            debug!(error = %self.error, code = code.as_u16(), "Admin request rejected");
        }

        let body = ErrorBody {
            error: error_slug(code),
            code: code.as_u16(),
            message: self.error.to_string(),
            retryable: code.is_retryable(),
            suggested_action: code.suggested_action(),
            accepted: self.accepted,
        };
        let mut response = (status, Json(body)).into_response();
        if let Some(retry_after) = self.retry_after {
            // Whole seconds, rounded up so sub-second hints never become 0.
            let secs = retry_after.as_secs() + u64::from(retry_after.subsec_nanos() > 0);
            response.headers_mut().insert(header::RETRY_AFTER, HeaderValue::from(secs.max(1)));
        }
        response
    }
}

// ============================================================================
// Health
// ============================================================================

#[derive(Debug, Serialize)]
struct HealthResponse {
    status: &'static str,
    phase: &'static str,
    applied_index: u64,
}

async fn health(State(state): State<AppState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        phase: state.detector.phase().as_str(),
        applied_index: state.detector.applied_index(),
    })
}

async fn readiness(State(state): State<AppState>) -> impl IntoResponse {
    let phase = state.detector.phase();
    let ready = phase == DetectorPhase::Ready;
    let status = if ready { StatusCode::OK } else { StatusCode::SERVICE_UNAVAILABLE };
    (
        status,
        Json(HealthResponse {
            status: if ready { "ready" } else { "not_ready" },
            phase: phase.as_str(),
            applied_index: state.detector.applied_index(),
        }),
    )
}

// ============================================================================
// Issues
// ============================================================================

/// Query parameters of `GET /v1/issues`.
#[derive(Debug, Default, Deserialize)]
struct IssuesParams {
    #[serde(rename = "type")]
    issue_type: Option<String>,
    object_type: Option<String>,
    name: Option<String>,
}

impl IssuesParams {
    fn into_filter(self) -> Result<IssueFilter, ApiError> {
        let mut filter = IssueFilter::all();
        if let Some(value) = self.issue_type {
            let issue_type = parse_issue_type(&value)
                .ok_or_else(|| ApiError::invalid(format!("unknown issue type: {value:?}")))?;
            filter = filter.with_type(issue_type);
        }
        if let Some(value) = self.object_type {
            let kind: EntityKind = value.parse().map_err(|e| ApiError::invalid(format!("{e}")))?;
            filter = filter.with_object_type(kind);
        }
        if let Some(name) = self.name {
            filter = filter.with_name(name);
        }
        Ok(filter)
    }
}

fn parse_issue_type(value: &str) -> Option<IssueType> {
    [IssueType::NameConflict].into_iter().find(|issue_type| issue_type.as_str() == value)
}

async fn list_issues(
    State(state): State<AppState>,
    Query(params): Query<IssuesParams>,
) -> Result<Json<Vec<Issue>>, ApiError> {
    let filter = params.into_filter()?;
    let issues = state.detector.query().list_issues(&filter).map_err(|e| state.reject(e))?;
    Ok(Json(issues))
}

async fn get_issue(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<Issue>, ApiError> {
    let id: IssueId =
        id.parse().map_err(|_| ApiError::invalid(format!("malformed issue id: {id:?}")))?;
    let issue = state.detector.query().get_issue(id).map_err(|e| state.reject(e))?;
    Ok(Json(issue))
}

#[derive(Debug, Default, Deserialize)]
struct ResolvedParams {
    limit: Option<usize>,
}

async fn resolved_issues(
    State(state): State<AppState>,
    Query(params): Query<ResolvedParams>,
) -> Result<Json<Vec<ResolvedIssue>>, ApiError> {
    let limit = params.limit.unwrap_or(DEFAULT_RESOLVED_LIMIT);
    let resolved = state.detector.query().resolved_issues(limit).map_err(|e| state.reject(e))?;
    Ok(Json(resolved))
}

// ============================================================================
// Feed
// ============================================================================

#[derive(Debug, Default, Deserialize)]
struct FeedParams {
    /// Wait up to this many milliseconds for the submitted events to apply.
    wait_ms: Option<u64>,
}

#[derive(Debug, Serialize)]
struct FeedResponse {
    accepted: usize,
    applied_index: u64,
}

async fn submit_feed(
    State(state): State<AppState>,
    Query(params): Query<FeedParams>,
    body: Result<Json<Vec<FeedMessage>>, JsonRejection>,
) -> Result<(StatusCode, Json<FeedResponse>), ApiError> {
    let Json(messages) = body.map_err(|rejection| ApiError::invalid(rejection.body_text()))?;
    let highest = messages.iter().map(FeedMessage::log_index).max();

    let feed = state.detector.feed();
    let mut accepted = 0;
    for message in messages {
        if let Err(e) = feed.send(message).await {
            return Err(state.reject(e).with_accepted(accepted));
        }
        accepted += 1;
    }

    let applied_index = match (params.wait_ms, highest) {
        (Some(wait_ms), Some(highest)) => {
            let limit = Duration::from_millis(wait_ms).min(MAX_FEED_WAIT);
            state.detector.wait_for_index(highest, Some(limit)).await.map_err(|e| state.reject(e))?
        },
        _ => state.detector.applied_index(),
    };

    Ok((StatusCode::ACCEPTED, Json(FeedResponse { accepted, applied_index })))
}
