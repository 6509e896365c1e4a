use axum::{extract::State, Extension, Json};
use chrono::Utc;
use rankwatch_core::{CrawlStore, ProductBoard};

use crate::middleware::RequestId;

use super::{map_crawl_error, ApiError, ApiResponse, AppState};

pub(super) async fn list_products<S: CrawlStore>(
    State(state): State<AppState<S>>,
    Extension(req_id): Extension<RequestId>,
) -> Result<Json<ApiResponse<ProductBoard>>, ApiError> {
    let board = state
        .engine
        .product_board(Utc::now())
        .await
        .map_err(|e| map_crawl_error(req_id.0.clone(), &e))?;

    Ok(Json(ApiResponse::new(board, req_id.0)))
}
