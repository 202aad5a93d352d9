//! HTTP control and query API.
//!
//! # Endpoints
//!
//! | Method | Path | Description |
//! |--------|------|-------------|
//! | `GET`  | `/health` | Health check (returns version) |
//! | `GET`  | `/capture/status` | Scheduler state, counters and gate settings |
//! | `POST` | `/capture/start` | Start periodic capture; optional `{"interval_seconds": N}` |
//! | `POST` | `/capture/stop` | Stop periodic capture |
//! | `POST` | `/capture/now` | Capture and evaluate one frame immediately |
//! | `POST` | `/capture/configure` | `{"threshold"?: N, "capacity"?: N}` |
//! | `GET`  | `/screenshots` | Paged list, newest first (`limit`, `offset`, `start_date`, `end_date`) |
//! | `GET`  | `/screenshots/{id}` | Screenshot metadata |
//! | `GET`  | `/screenshots/{id}/image` | Stored JPEG |
//! | `DELETE` | `/screenshots/{id}` | Delete row and file |
//! | `GET`  | `/timeline` | Screenshots grouped by capture day (`date`, `limit`) |
//!
//! # Error Contract
//!
//! ```json
//! { "error": { "code": "bad_request", "message": "limit must be between 1 and 500" } }
//! ```
//!
//! Error codes: `bad_request` (400), `not_found` (404), `capture_failed` (503),
//! `internal` (500).

use axum::{
    body::Bytes,
    extract::{Path, Query, State},
    http::{header, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use sqlx::SqlitePool;
use tower_http::cors::{Any, CorsLayer};
use tracing::{error, info};

use screen_context_core::Evaluation;

use crate::models::{Screenshot, TimelineDay};
use crate::scheduler::{CaptureCadence, CaptureScheduler, CaptureStatus, GateSummary};
use crate::screenshots::{self, CapturedRange};

const DEFAULT_PAGE: i64 = 50;
const DEFAULT_TIMELINE_LIMIT: i64 = 100;

/// Shared application state passed to all route handlers.
#[derive(Clone)]
pub struct AppState {
    pub scheduler: CaptureScheduler,
    pub pool: SqlitePool,
}

pub fn build_router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/health", get(handle_health))
        .route("/capture/status", get(handle_status))
        .route("/capture/start", post(handle_start))
        .route("/capture/stop", post(handle_stop))
        .route("/capture/now", post(handle_capture_now))
        .route("/capture/configure", post(handle_configure))
        .route("/screenshots", get(handle_list))
        .route(
            "/screenshots/{id}",
            get(handle_get_screenshot).delete(handle_delete_screenshot),
        )
        .route("/screenshots/{id}/image", get(handle_get_image))
        .route("/timeline", get(handle_timeline))
        .layer(cors)
        .with_state(state)
}

/// Serve until the process is terminated or `shutdown` resolves.
pub async fn run_server(
    bind_addr: &str,
    state: AppState,
    shutdown: impl std::future::Future<Output = ()> + Send + 'static,
) -> anyhow::Result<()> {
    let app = build_router(state);
    let listener = tokio::net::TcpListener::bind(bind_addr).await?;
    info!(addr = %bind_addr, "HTTP server listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown)
        .await?;
    Ok(())
}

// ============ Error response ============

#[derive(Serialize)]
struct ErrorBody {
    error: ErrorDetail,
}

#[derive(Serialize)]
struct ErrorDetail {
    code: String,
    message: String,
}

struct AppError {
    status: StatusCode,
    code: String,
    message: String,
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let body = ErrorBody {
            error: ErrorDetail {
                code: self.code,
                message: self.message,
            },
        };
        (self.status, Json(body)).into_response()
    }
}

fn bad_request(message: impl Into<String>) -> AppError {
    AppError {
        status: StatusCode::BAD_REQUEST,
        code: "bad_request".to_string(),
        message: message.into(),
    }
}

fn not_found(message: impl Into<String>) -> AppError {
    AppError {
        status: StatusCode::NOT_FOUND,
        code: "not_found".to_string(),
        message: message.into(),
    }
}

fn capture_failed(message: impl Into<String>) -> AppError {
    AppError {
        status: StatusCode::SERVICE_UNAVAILABLE,
        code: "capture_failed".to_string(),
        message: message.into(),
    }
}

fn internal(err: anyhow::Error) -> AppError {
    error!(error = %format!("{:#}", err), "request failed");
    AppError {
        status: StatusCode::INTERNAL_SERVER_ERROR,
        code: "internal".to_string(),
        message: err.to_string(),
    }
}

// ============ GET /health ============

#[derive(Serialize)]
struct HealthResponse {
    status: String,
    version: String,
}

async fn handle_health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
    })
}

// ============ /capture ============

#[derive(Serialize)]
struct StatusResponse {
    #[serde(flatten)]
    status: CaptureStatus,
    gate: GateSummary,
}

/// Never waits on the gate, so it answers while a capture is in flight.
fn status_response(scheduler: &CaptureScheduler) -> StatusResponse {
    StatusResponse {
        status: scheduler.status(),
        gate: scheduler.gate_summary(),
    }
}

async fn handle_status(State(state): State<AppState>) -> Json<StatusResponse> {
    Json(status_response(&state.scheduler))
}

#[derive(Deserialize, Default)]
struct StartRequest {
    interval_seconds: Option<u64>,
}

#[derive(Serialize)]
struct StartResponse {
    started: bool,
    status: CaptureStatus,
}

/// An empty body starts with the configured cadence.
async fn handle_start(
    State(state): State<AppState>,
    body: Bytes,
) -> Result<Json<StartResponse>, AppError> {
    let request: StartRequest = if body.is_empty() {
        StartRequest::default()
    } else {
        serde_json::from_slice(&body).map_err(|e| bad_request(format!("invalid body: {}", e)))?
    };

    let cadence = match request.interval_seconds {
        Some(interval_secs) => CaptureCadence::Fixed { interval_secs },
        None => state.scheduler.status().cadence,
    };

    let started = state
        .scheduler
        .start(cadence)
        .map_err(|e| bad_request(e.to_string()))?;

    Ok(Json(StartResponse {
        started,
        status: state.scheduler.status(),
    }))
}

#[derive(Serialize)]
struct StopResponse {
    stopped: bool,
    status: CaptureStatus,
}

async fn handle_stop(State(state): State<AppState>) -> Json<StopResponse> {
    let stopped = state.scheduler.stop();
    Json(StopResponse {
        stopped,
        status: state.scheduler.status(),
    })
}

async fn handle_capture_now(
    State(state): State<AppState>,
) -> Result<Json<Evaluation>, AppError> {
    state
        .scheduler
        .trigger_now()
        .await
        .map(Json)
        .map_err(|e| capture_failed(e.to_string()))
}

#[derive(Deserialize)]
struct ConfigureRequest {
    threshold: Option<u32>,
    capacity: Option<usize>,
}

async fn handle_configure(
    State(state): State<AppState>,
    Json(req): Json<ConfigureRequest>,
) -> Result<Json<GateSummary>, AppError> {
    if req.threshold.is_some_and(|t| t > 64) {
        return Err(bad_request("threshold must be in [0, 64]"));
    }
    if req.capacity == Some(0) {
        return Err(bad_request("capacity must be >= 1"));
    }

    Ok(Json(
        state.scheduler.configure(req.threshold, req.capacity).await,
    ))
}

// ============ /screenshots ============

#[derive(Deserialize)]
struct ListParams {
    limit: Option<i64>,
    offset: Option<i64>,
    start_date: Option<String>,
    end_date: Option<String>,
}

#[derive(Serialize)]
struct ListResponse {
    screenshots: Vec<Screenshot>,
    total: i64,
    limit: i64,
    offset: i64,
}

async fn handle_list(
    State(state): State<AppState>,
    Query(params): Query<ListParams>,
) -> Result<Json<ListResponse>, AppError> {
    let limit = params.limit.unwrap_or(DEFAULT_PAGE);
    let offset = params.offset.unwrap_or(0);
    screenshots::validate_page(limit, offset).map_err(|e| bad_request(e.to_string()))?;
    let range = CapturedRange::parse(params.start_date.as_deref(), params.end_date.as_deref())
        .map_err(|e| bad_request(format!("{:#}", e)))?;

    let screenshots = screenshots::list_screenshots(&state.pool, &range, limit, offset)
        .await
        .map_err(internal)?;
    let total = screenshots::count_in_range(&state.pool, &range)
        .await
        .map_err(internal)?;

    Ok(Json(ListResponse {
        screenshots,
        total,
        limit,
        offset,
    }))
}

#[derive(Deserialize)]
struct TimelineParams {
    date: Option<String>,
    limit: Option<i64>,
}

async fn handle_timeline(
    State(state): State<AppState>,
    Query(params): Query<TimelineParams>,
) -> Result<Json<Vec<TimelineDay>>, AppError> {
    let limit = params.limit.unwrap_or(DEFAULT_TIMELINE_LIMIT);
    screenshots::validate_page(limit, 0).map_err(|e| bad_request(e.to_string()))?;
    let date = params
        .date
        .as_deref()
        .map(screenshots::parse_date)
        .transpose()
        .map_err(|e| bad_request(format!("{:#}", e)))?;

    screenshots::timeline(&state.pool, date, limit)
        .await
        .map(Json)
        .map_err(internal)
}

async fn find_screenshot(pool: &SqlitePool, id: i64) -> Result<Screenshot, AppError> {
    screenshots::get_screenshot(pool, id)
        .await
        .map_err(internal)?
        .ok_or_else(|| not_found(format!("screenshot not found: {}", id)))
}

async fn handle_get_screenshot(
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> Result<Json<Screenshot>, AppError> {
    find_screenshot(&state.pool, id).await.map(Json)
}

async fn handle_get_image(
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> Result<Response, AppError> {
    let shot = find_screenshot(&state.pool, id).await?;
    let bytes = tokio::fs::read(&shot.filepath)
        .await
        .map_err(|_| not_found(format!("image file missing for screenshot {}", id)))?;

    Ok(([(header::CONTENT_TYPE, "image/jpeg")], bytes).into_response())
}

async fn handle_delete_screenshot(
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> Result<Json<serde_json::Value>, AppError> {
    let deleted = screenshots::delete_screenshot(&state.pool, id)
        .await
        .map_err(internal)?;
    if !deleted {
        return Err(not_found(format!("screenshot not found: {}", id)));
    }
    Ok(Json(serde_json::json!({ "deleted": id })))
}
