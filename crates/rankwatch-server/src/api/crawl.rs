use axum::{
    extract::{Query, State},
    http::StatusCode,
    Extension, Json,
};
use chrono::{DateTime, Utc};
use rankwatch_core::CrawlStore;
use rankwatch_crawl::{ActiveBatch, BatchReport, ConvergenceStatus};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::middleware::RequestId;

use super::{map_crawl_error, ApiError, ApiResponse, AppState};

#[derive(Debug, Deserialize)]
pub(super) struct CrawlRequest {
    pub urls: Vec<String>,
}

#[derive(Debug, Serialize)]
pub(super) struct CrawlAccepted {
    pub batch_id: Uuid,
    pub started_at: DateTime<Utc>,
    pub urls: Vec<String>,
}

/// `urls` is a JSON array encoded into a single query parameter.
#[derive(Debug, Deserialize)]
pub(super) struct StatusQuery {
    pub urls: String,
    pub since: Option<DateTime<Utc>>,
}

#[derive(Debug, Serialize)]
pub(super) struct CurrentCrawl {
    pub batch: Option<ActiveBatch>,
    pub last_report: Option<BatchReport>,
}

pub(super) async fn start_crawl<S: CrawlStore>(
    State(state): State<AppState<S>>,
    Extension(req_id): Extension<RequestId>,
    Json(body): Json<CrawlRequest>,
) -> Result<(StatusCode, Json<ApiResponse<CrawlAccepted>>), ApiError> {
    let urls: Vec<String> = body
        .urls
        .into_iter()
        .map(|u| u.trim().to_string())
        .filter(|u| !u.is_empty())
        .collect();

    let handle = state
        .engine
        .request_crawl(urls)
        .await
        .map_err(|e| map_crawl_error(req_id.0.clone(), &e))?;

    let accepted = CrawlAccepted {
        batch_id: handle.id(),
        started_at: handle.started_at(),
        urls: handle.urls().to_vec(),
    };
    // The handle is dropped here; the worker keeps running and its report
    // lands in `last_report`.
    Ok((
        StatusCode::ACCEPTED,
        Json(ApiResponse::new(accepted, req_id.0)),
    ))
}

pub(super) async fn crawl_status<S: CrawlStore>(
    State(state): State<AppState<S>>,
    Extension(req_id): Extension<RequestId>,
    Query(params): Query<StatusQuery>,
) -> Result<Json<ApiResponse<ConvergenceStatus>>, ApiError> {
    let urls: Vec<String> = serde_json::from_str(&params.urls).map_err(|e| {
        ApiError::new(
            req_id.0.clone(),
            "validation_error",
            format!("urls must be a JSON array of strings: {e}"),
        )
    })?;

    let status = state
        .engine
        .poll_status(&urls, params.since)
        .await
        .map_err(|e| map_crawl_error(req_id.0.clone(), &e))?;

    Ok(Json(ApiResponse::new(status, req_id.0)))
}

pub(super) async fn current_crawl<S: CrawlStore>(
    State(state): State<AppState<S>>,
    Extension(req_id): Extension<RequestId>,
) -> Json<ApiResponse<CurrentCrawl>> {
    let current = CurrentCrawl {
        batch: state.engine.current_batch(),
        last_report: state.engine.last_report(),
    };
    Json(ApiResponse::new(current, req_id.0))
}
