use axum::{extract::State, Extension, Json};
use rankwatch_core::CrawlStore;
use serde::{Deserialize, Serialize};

use crate::middleware::RequestId;

use super::{map_crawl_error, ApiError, ApiResponse, AppState};

#[derive(Debug, Deserialize)]
pub(super) struct IntervalUpdate {
    pub interval: i64,
}

#[derive(Debug, Serialize)]
pub(super) struct IntervalView {
    pub interval: u32,
}

#[derive(Debug, Serialize)]
pub(super) struct Cleared {
    pub cleared: bool,
}

pub(super) async fn get_crawl_interval<S: CrawlStore>(
    State(state): State<AppState<S>>,
    Extension(req_id): Extension<RequestId>,
) -> Result<Json<ApiResponse<IntervalView>>, ApiError> {
    let interval = state
        .engine
        .current_interval()
        .await
        .map_err(|e| map_crawl_error(req_id.0.clone(), &e))?;

    Ok(Json(ApiResponse::new(
        IntervalView {
            interval: interval.hours(),
        },
        req_id.0,
    )))
}

pub(super) async fn update_crawl_interval<S: CrawlStore>(
    State(state): State<AppState<S>>,
    Extension(req_id): Extension<RequestId>,
    Json(body): Json<IntervalUpdate>,
) -> Result<Json<ApiResponse<IntervalView>>, ApiError> {
    let interval = state
        .engine
        .reconfigure_interval(body.interval)
        .await
        .map_err(|e| map_crawl_error(req_id.0.clone(), &e))?;

    Ok(Json(ApiResponse::new(
        IntervalView {
            interval: interval.hours(),
        },
        req_id.0,
    )))
}

pub(super) async fn clear_database<S: CrawlStore>(
    State(state): State<AppState<S>>,
    Extension(req_id): Extension<RequestId>,
) -> Result<Json<ApiResponse<Cleared>>, ApiError> {
    state
        .engine
        .reset()
        .await
        .map_err(|e| map_crawl_error(req_id.0.clone(), &e))?;

    Ok(Json(ApiResponse::new(Cleared { cleared: true }, req_id.0)))
}
