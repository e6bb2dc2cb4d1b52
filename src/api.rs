//! HTTP routes over the sync engine
//!
//! Partial failures inside a bucket or fleet sync come back as 200 with the
//! failure list embedded; only unit-level failures map to error statuses.

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use serde_json::json;
use tower::ServiceBuilder;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

use crate::config::BucketNaming;
use crate::jobs::JobRegistry;
use crate::sync::SyncEngine;
use crate::types::{FailureKind, SyncResult};

/// Shared handler state
#[derive(Clone)]
pub struct AppState {
    pub engine: SyncEngine,
    pub jobs: JobRegistry,
    pub naming: BucketNaming,
}

impl AppState {
    pub fn new(engine: SyncEngine) -> Self {
        Self {
            engine,
            jobs: JobRegistry::default(),
            naming: BucketNaming::default(),
        }
    }

    pub fn with_naming(mut self, naming: BucketNaming) -> Self {
        self.naming = naming;
        self
    }
}

/// Request body for `POST /sync/file`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SyncFileRequest {
    pub source_bucket: String,
    pub destination_bucket: String,
    pub object_key: String,
}

/// Query parameters for `POST /sync/{bucket}`
#[derive(Debug, Clone, Default, Deserialize)]
pub struct BucketSyncQuery {
    pub destination: Option<String>,
    pub prefix: Option<String>,
}

/// Error body: `{error, detail, status_code}`
#[derive(Debug)]
pub struct ApiError {
    status: StatusCode,
    detail: String,
}

impl ApiError {
    pub fn new(status: StatusCode, detail: impl Into<String>) -> Self {
        Self {
            status,
            detail: detail.into(),
        }
    }

    fn bad_request(detail: impl Into<String>) -> Self {
        Self::new(StatusCode::BAD_REQUEST, detail)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let body = json!({
            "error": self.status.canonical_reason().unwrap_or("Error"),
            "detail": self.detail,
            "status_code": self.status.as_u16(),
        });
        (self.status, Json(body)).into_response()
    }
}

type ApiResult<T> = std::result::Result<T, ApiError>;

/// Build the router
pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health_handler))
        .route("/sync/all", post(sync_all_handler))
        .route("/sync/all/async", post(sync_all_async_handler))
        .route("/sync/jobs/:id", get(job_handler))
        .route("/sync/file", post(sync_file_handler))
        .route("/sync/status/:bucket/*key", get(sync_status_handler))
        .route(
            "/sync/:source/:destination/files/*key",
            post(sync_file_by_path_handler),
        )
        .route("/sync/:bucket", post(sync_bucket_handler))
        .layer(
            ServiceBuilder::new()
                .layer(TraceLayer::new_for_http())
                .layer(CorsLayer::permissive()),
        )
        .with_state(state)
}

/// HTTP status for a failed unit of work
pub fn status_for_failure(kind: Option<FailureKind>) -> StatusCode {
    match kind {
        Some(FailureKind::SourceNotFound) => StatusCode::NOT_FOUND,
        Some(FailureKind::AccessDenied) => StatusCode::FORBIDDEN,
        Some(FailureKind::Cancelled) => StatusCode::SERVICE_UNAVAILABLE,
        _ => StatusCode::BAD_GATEWAY,
    }
}

/// HTTP status for a bucket-level failure: absent source bucket or upstream error
pub fn status_for_bucket_failure(kind: Option<FailureKind>) -> StatusCode {
    match kind {
        Some(FailureKind::SourceNotFound) => StatusCode::NOT_FOUND,
        _ => StatusCode::BAD_GATEWAY,
    }
}

fn require(value: &str, what: &str) -> ApiResult<()> {
    if value.trim().is_empty() {
        return Err(ApiError::bad_request(format!("{} cannot be empty", what)));
    }
    Ok(())
}

async fn health_handler(State(state): State<AppState>) -> impl IntoResponse {
    Json(json!({
        "status": "ok",
        "source": state.engine.source().name(),
        "destination": state.engine.destination().name(),
        "jobs": state.jobs.len(),
    }))
}

async fn sync_all_handler(State(state): State<AppState>) -> ApiResult<impl IntoResponse> {
    let summary = state.engine.sync_fleet(&state.naming).await.map_err(|e| {
        ApiError::new(
            StatusCode::BAD_GATEWAY,
            format!("Failed to sync all buckets: {}", e),
        )
    })?;
    Ok(Json(summary))
}

async fn sync_all_async_handler(State(state): State<AppState>) -> ApiResult<impl IntoResponse> {
    let engine = state.engine.clone();
    let naming = state.naming.clone();
    let job_id = state
        .jobs
        .spawn("fleet", async move { engine.sync_fleet(&naming).await })
        .ok_or_else(|| {
            ApiError::new(
                StatusCode::TOO_MANY_REQUESTS,
                format!(
                    "Too many background syncs running (limit {}); retry later",
                    state.jobs.capacity()
                ),
            )
        })?;

    Ok((
        StatusCode::ACCEPTED,
        Json(json!({
            "status": "accepted",
            "job_id": job_id,
            "message": "Sync operation started in background.",
        })),
    ))
}

async fn job_handler(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> ApiResult<impl IntoResponse> {
    state
        .jobs
        .get(&id)
        .map(Json)
        .ok_or_else(|| ApiError::new(StatusCode::NOT_FOUND, format!("Job '{}' not found", id)))
}

async fn sync_bucket_handler(
    State(state): State<AppState>,
    Path(bucket): Path<String>,
    Query(query): Query<BucketSyncQuery>,
) -> ApiResult<impl IntoResponse> {
    require(&bucket, "Bucket name")?;

    let summary = state
        .engine
        .sync_bucket(&bucket, query.destination.as_deref(), query.prefix.as_deref())
        .await;

    if let Some(ref error) = summary.error {
        let status = status_for_bucket_failure(summary.error_kind);
        let detail = if status == StatusCode::NOT_FOUND {
            format!("Bucket '{}' not found: {}", bucket, error)
        } else {
            format!("Failed to sync bucket '{}': {}", bucket, error)
        };
        return Err(ApiError::new(status, detail));
    }

    if !summary.failed_files.is_empty() {
        tracing::warn!(
            "Bucket '{}' synced with {} file failures",
            bucket,
            summary.failed_files.len()
        );
    }
    Ok(Json(summary))
}

async fn sync_file_handler(
    State(state): State<AppState>,
    Json(payload): Json<SyncFileRequest>,
) -> ApiResult<Json<SyncResult>> {
    sync_one(
        &state,
        &payload.source_bucket,
        &payload.destination_bucket,
        &payload.object_key,
    )
    .await
}

async fn sync_file_by_path_handler(
    State(state): State<AppState>,
    Path((source, destination, key)): Path<(String, String, String)>,
) -> ApiResult<Json<SyncResult>> {
    sync_one(&state, &source, &destination, &key).await
}

async fn sync_one(
    state: &AppState,
    source: &str,
    destination: &str,
    key: &str,
) -> ApiResult<Json<SyncResult>> {
    require(source, "Source bucket name")?;
    require(destination, "Destination bucket name")?;
    require(key, "Object key")?;

    let result = state.engine.sync_object(source, destination, key).await;
    if result.is_failed() {
        let error = result.error.as_deref().unwrap_or("Unknown error");
        let status = status_for_failure(result.error_kind);
        let detail = match status {
            StatusCode::NOT_FOUND => format!("File not found: {}", error),
            StatusCode::FORBIDDEN => format!("Access denied: {}", error),
            _ => format!("Sync failed: {}", error),
        };
        return Err(ApiError::new(status, detail));
    }
    Ok(Json(result))
}

async fn sync_status_handler(
    State(state): State<AppState>,
    Path((bucket, key)): Path<(String, String)>,
) -> ApiResult<impl IntoResponse> {
    let view = state
        .engine
        .sync_status(&bucket, &key)
        .await
        .map_err(|e| ApiError::new(status_for_failure(Some(e.kind())), e.to_string()))?;
    Ok(Json(view))
}
