mod crawl;
mod products;
mod settings;

use axum::{
    extract::State,
    http::{header, HeaderName, Method, StatusCode},
    response::IntoResponse,
    routing::{get, post},
    Extension, Json, Router,
};
use chrono::{DateTime, Utc};
use rankwatch_core::{ConfigStore, CrawlStore, CRAWL_INTERVAL_SETTING};
use rankwatch_crawl::{CrawlEngine, CrawlError};
use serde::Serialize;
use tower::ServiceBuilder;
use tower_http::{cors::CorsLayer, trace::TraceLayer};

use crate::middleware::{request_id, RequestId};

pub struct AppState<S> {
    pub engine: CrawlEngine<S>,
}

impl<S> Clone for AppState<S> {
    fn clone(&self) -> Self {
        Self {
            engine: self.engine.clone(),
        }
    }
}

#[derive(Debug, Serialize)]
pub struct ApiResponse<T: Serialize> {
    pub data: T,
    pub meta: ResponseMeta,
}

#[derive(Debug, Serialize)]
pub struct ResponseMeta {
    pub request_id: String,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Serialize)]
pub struct ApiError {
    pub error: ErrorBody,
    pub meta: ResponseMeta,
}

#[derive(Debug, Serialize)]
pub struct ErrorBody {
    pub code: String,
    pub message: String,
}

#[derive(Debug, Serialize, PartialEq, Eq)]
struct HealthData {
    status: &'static str,
    database: &'static str,
}

impl ResponseMeta {
    pub(super) fn new(request_id: String) -> Self {
        Self {
            request_id,
            timestamp: Utc::now(),
        }
    }
}

impl<T: Serialize> ApiResponse<T> {
    pub(super) fn new(data: T, request_id: String) -> Self {
        Self {
            data,
            meta: ResponseMeta::new(request_id),
        }
    }
}

impl ApiError {
    pub fn new(
        request_id: impl Into<String>,
        code: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        Self {
            error: ErrorBody {
                code: code.into(),
                message: message.into(),
            },
            meta: ResponseMeta::new(request_id.into()),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> axum::response::Response {
        let status = match self.error.code.as_str() {
            "not_found" => StatusCode::NOT_FOUND,
            "bad_request" | "validation_error" => StatusCode::BAD_REQUEST,
            "conflict" => StatusCode::CONFLICT,
            "worker_unavailable" => StatusCode::SERVICE_UNAVAILABLE,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        };
        (status, Json(self)).into_response()
    }
}

pub(super) fn map_crawl_error(request_id: String, error: &CrawlError) -> ApiError {
    match error {
        CrawlError::InvalidConfig(_)
        | CrawlError::EmptyBatch
        | CrawlError::InvalidObservation(_) => {
            ApiError::new(request_id, "validation_error", error.to_string())
        }
        CrawlError::BatchAlreadyRunning { .. } => {
            ApiError::new(request_id, "conflict", error.to_string())
        }
        CrawlError::InterpreterNotFound { .. } => {
            tracing::error!(error = %error, "crawl request failed: no interpreter");
            ApiError::new(request_id, "worker_unavailable", error.to_string())
        }
        _ => {
            tracing::error!(error = %error, "crawl engine operation failed");
            ApiError::new(request_id, "internal_error", "crawl engine operation failed")
        }
    }
}

fn build_cors() -> CorsLayer {
    CorsLayer::new()
        .allow_origin(tower_http::cors::Any)
        .allow_methods([Method::GET, Method::POST, Method::PUT])
        .allow_headers([header::CONTENT_TYPE, HeaderName::from_static("x-request-id")])
}

fn api_router<S: CrawlStore>() -> Router<AppState<S>> {
    Router::new()
        .route("/api/v1/products", get(products::list_products::<S>))
        .route("/api/v1/crawl", post(crawl::start_crawl::<S>))
        .route("/api/v1/crawl/status", get(crawl::crawl_status::<S>))
        .route("/api/v1/crawl/current", get(crawl::current_crawl::<S>))
        .route(
            "/api/v1/settings/crawl-interval",
            get(settings::get_crawl_interval::<S>).put(settings::update_crawl_interval::<S>),
        )
        .route(
            "/api/v1/settings/clear-database",
            post(settings::clear_database::<S>),
        )
}

pub fn build_app<S: CrawlStore>(state: AppState<S>) -> Router {
    let public_routes = Router::new().route("/api/v1/health", get(health::<S>));

    Router::new()
        .merge(public_routes)
        .merge(api_router::<S>())
        .layer(
            ServiceBuilder::new()
                .layer(TraceLayer::new_for_http())
                .layer(build_cors())
                .layer(axum::middleware::from_fn(request_id)),
        )
        .with_state(state)
}

async fn health<S: CrawlStore>(
    State(state): State<AppState<S>>,
    Extension(req_id): Extension<RequestId>,
) -> impl IntoResponse {
    let meta = ResponseMeta::new(req_id.0);

    // A settings read is the cheapest round trip every store supports.
    match state.engine.store().get(CRAWL_INTERVAL_SETTING).await {
        Ok(_) => (
            StatusCode::OK,
            Json(ApiResponse {
                data: HealthData {
                    status: "ok",
                    database: "ok",
                },
                meta,
            }),
        ),
        Err(e) => {
            tracing::warn!(error = %e, "health check: database unavailable");
            (
                StatusCode::SERVICE_UNAVAILABLE,
                Json(ApiResponse {
                    data: HealthData {
                        status: "degraded",
                        database: "unavailable",
                    },
                    meta,
                }),
            )
        }
    }
}

#[cfg(test)]
mod tests;
