//! HTTP route definitions and handlers.

use std::{sync::Arc, time::Duration};

use axum::{
    async_trait,
    extract::{
        rejection::{JsonRejection, QueryRejection},
        FromRequest, FromRequestParts, Path, Query, Request, State,
    },
    http::{
        header::{CONTENT_DISPOSITION, CONTENT_TYPE},
        request::Parts,
        StatusCode,
    },
    response::{IntoResponse, Response},
    routing::get,
    Json, Router,
};
use barscan_server::{
    config::ServerConfig,
    export::XLSX_CONTENT_TYPE,
    handlers::{
        scans::{CreateScanRequest, CREATION_FAILED_MESSAGE},
        FilterError, ScanQuery,
    },
    ScanServiceError,
};
use barscan_storage::{ScanStore, StorageError, StoredScan};
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use tower_http::{limit::RequestBodyLimitLayer, timeout::TimeoutLayer};
use tracing::{error, info};

use super::state::AppState;
use crate::middleware::{
    cors_layer, MetricsLayer, RequestIdLayer, RequestLoggingLayer, RequestMetrics,
};
use crate::observability::{metrics_handler, MetricsState};

/// Default request body size limit (1 MiB).
pub const DEFAULT_BODY_LIMIT: usize = 1024 * 1024;

/// Greeting returned by `GET /`.
pub const WELCOME_MESSAGE: &str = "Welcome to the barcode scan management API";

/// JSON body extractor that reports malformed bodies as 422 `validation_error`.
///
/// Body-limit rejections keep their 413 status.
pub struct ValidatedJson<T>(pub T);

#[async_trait]
impl<S, T> FromRequest<S> for ValidatedJson<T>
where
    T: DeserializeOwned,
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request(req: Request, state: &S) -> Result<Self, Self::Rejection> {
        match Json::<T>::from_request(req, state).await {
            Ok(Json(value)) => Ok(ValidatedJson(value)),
            Err(rejection) => Err(json_rejection_to_api_error(rejection)),
        }
    }
}

fn json_rejection_to_api_error(rejection: JsonRejection) -> ApiError {
    let message = rejection.body_text();
    match &rejection {
        JsonRejection::BytesRejection(_) if rejection.status() == StatusCode::PAYLOAD_TOO_LARGE => {
            ApiError::payload_too_large(message)
        }
        _ => ApiError::validation_error(message),
    }
}

/// Query-string extractor that reports undecodable parameters as 422.
pub struct ValidatedQuery<T>(pub T);

#[async_trait]
impl<S, T> FromRequestParts<S> for ValidatedQuery<T>
where
    T: DeserializeOwned,
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        Query::<T>::from_request_parts(parts, state)
            .await
            .map(|Query(value)| ValidatedQuery(value))
            .map_err(|rejection: QueryRejection| ApiError::validation_error(rejection.body_text()))
    }
}

/// Scan routes, mounted under `/api`.
fn api_routes<S: ScanStore>() -> Router<Arc<AppState<S>>> {
    Router::new()
        .route(
            "/scans",
            get(list_scans::<S>)
                .post(create_scan::<S>)
                .delete(clear_scans::<S>),
        )
        .route("/scans/export", get(export_scans::<S>))
        .route("/scans/:id", get(get_scan::<S>))
}

/// Application routes with state applied and no middleware.
fn app_routes<S: ScanStore>(state: AppState<S>) -> Router {
    Router::new()
        .route("/", get(root))
        .nest("/api", api_routes::<S>())
        .route("/health", get(health_check))
        .route("/ready", get(readiness_check::<S>))
        .with_state(Arc::new(state))
}

/// Creates the HTTP router with the default body limit and no other layers.
pub fn create_router<S: ScanStore>(state: AppState<S>) -> Router {
    create_router_with_body_limit(state, DEFAULT_BODY_LIMIT)
}

/// Creates the HTTP router with a custom body size limit.
pub fn create_router_with_body_limit<S: ScanStore>(state: AppState<S>, body_limit: usize) -> Router {
    app_routes(state).layer(RequestBodyLimitLayer::new(body_limit))
}

/// Creates the fully layered router used by the server.
///
/// Adds `/metrics` (when enabled in `config`) and, from outermost to
/// innermost: CORS, request ids, request metrics, request logging, body
/// limit and request timeout.
pub fn create_router_with_observability<S: ScanStore>(
    state: AppState<S>,
    metrics_state: MetricsState,
    config: &ServerConfig,
) -> Router {
    let mut router = app_routes(state);

    if config.metrics.enabled {
        let metrics_router = Router::new()
            .route("/metrics", get(metrics_handler))
            .with_state(metrics_state);
        router = router.merge(metrics_router);
    }

    router
        .layer(TimeoutLayer::new(Duration::from_secs(
            config.server.request_timeout_secs,
        )))
        .layer(RequestBodyLimitLayer::new(config.server.body_limit_bytes))
        .layer(RequestLoggingLayer::new())
        .layer(MetricsLayer::new(Arc::new(RequestMetrics::new())))
        .layer(RequestIdLayer::new())
        .layer(cors_layer(&config.cors))
}

// ============================================================
// Error Handling
// ============================================================

/// Error codes of the `{code, message}` envelope.
///
/// Each code maps to one HTTP status in [`ApiError::into_response`].
pub mod error_codes {
    /// Malformed body, query or path parameter (422).
    pub const VALIDATION_ERROR: &str = "validation_error";
    /// No record with the requested id (404).
    pub const SCAN_NOT_FOUND: &str = "scan_not_found";
    /// Request body exceeds the configured limit (413).
    pub const PAYLOAD_TOO_LARGE: &str = "payload_too_large";
    /// Unexpected server-side failure (500).
    pub const INTERNAL_ERROR: &str = "internal_error";
    /// Storage backend unreachable (503).
    pub const SERVICE_UNAVAILABLE: &str = "service_unavailable";
    /// Storage operation exceeded its timeout (504).
    pub const TIMEOUT: &str = "timeout";
}

/// Error body returned by every non-2xx JSON response.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ApiError {
    pub code: String,
    pub message: String,
}

impl ApiError {
    pub fn new(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            code: code.into(),
            message: message.into(),
        }
    }

    pub fn validation_error(message: impl Into<String>) -> Self {
        Self::new(error_codes::VALIDATION_ERROR, message)
    }

    pub fn scan_not_found(message: impl Into<String>) -> Self {
        Self::new(error_codes::SCAN_NOT_FOUND, message)
    }

    pub fn payload_too_large(message: impl Into<String>) -> Self {
        Self::new(error_codes::PAYLOAD_TOO_LARGE, message)
    }

    pub fn internal_error(message: impl Into<String>) -> Self {
        Self::new(error_codes::INTERNAL_ERROR, message)
    }

    pub fn service_unavailable(message: impl Into<String>) -> Self {
        Self::new(error_codes::SERVICE_UNAVAILABLE, message)
    }

    pub fn gateway_timeout(message: impl Into<String>) -> Self {
        Self::new(error_codes::TIMEOUT, message)
    }

    /// HTTP status for this error's code.
    pub fn status(&self) -> StatusCode {
        use error_codes::*;

        match self.code.as_str() {
            VALIDATION_ERROR => StatusCode::UNPROCESSABLE_ENTITY,
            SCAN_NOT_FOUND => StatusCode::NOT_FOUND,
            PAYLOAD_TOO_LARGE => StatusCode::PAYLOAD_TOO_LARGE,
            SERVICE_UNAVAILABLE => StatusCode::SERVICE_UNAVAILABLE,
            TIMEOUT => StatusCode::GATEWAY_TIMEOUT,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (self.status(), Json(self)).into_response()
    }
}

impl From<StorageError> for ApiError {
    fn from(err: StorageError) -> Self {
        match &err {
            StorageError::ScanNotFound { id } => {
                ApiError::scan_not_found(format!("scan {id} not found"))
            }
            StorageError::InvalidInput { message } => ApiError::validation_error(message),
            StorageError::ConnectionError { .. } | StorageError::HealthCheckFailed { .. } => {
                error!(error = %err, "storage unavailable");
                ApiError::service_unavailable("storage backend unavailable")
            }
            StorageError::QueryTimeout { .. } => {
                error!(error = %err, "storage timeout");
                ApiError::gateway_timeout("storage operation timed out")
            }
            _ => {
                error!(error = %err, "storage error");
                ApiError::internal_error("storage operation failed")
            }
        }
    }
}

impl From<FilterError> for ApiError {
    fn from(err: FilterError) -> Self {
        ApiError::validation_error(err.to_string())
    }
}

impl From<ScanServiceError> for ApiError {
    fn from(err: ScanServiceError) -> Self {
        match err {
            ScanServiceError::InvalidInput { message } => ApiError::validation_error(message),
            ScanServiceError::InvalidQuery(e) => e.into(),
            ScanServiceError::NotFound { id } => {
                ApiError::scan_not_found(format!("scan {id} not found"))
            }
            ScanServiceError::CreationFailed { barcode } => {
                error!(%barcode, "scan creation failed after duplicate conflict");
                ApiError::internal_error(CREATION_FAILED_MESSAGE)
            }
            ScanServiceError::Export(e) => {
                error!(error = %e, "export rendering failed");
                ApiError::internal_error("failed to generate export")
            }
            ScanServiceError::Storage(e) => e.into(),
        }
    }
}

type ApiResult<T> = Result<T, ApiError>;

// ============================================================
// Health and Readiness Checks
// ============================================================

async fn root() -> impl IntoResponse {
    Json(serde_json::json!({ "message": WELCOME_MESSAGE }))
}

/// Liveness probe. Does not touch storage.
async fn health_check() -> impl IntoResponse {
    Json(serde_json::json!({ "status": "ok" }))
}

/// Readiness probe: 200 when the storage backend answers, 503 otherwise.
///
/// Failure details are logged, not returned.
async fn readiness_check<S: ScanStore>(State(state): State<Arc<AppState<S>>>) -> impl IntoResponse {
    let failure = match state.storage.health_check().await {
        Ok(status) if status.healthy => None,
        Ok(status) => Some(status.message.unwrap_or_else(|| "unhealthy".to_string())),
        Err(e) => Some(e.to_string()),
    };

    match failure {
        None => (
            StatusCode::OK,
            Json(serde_json::json!({
                "status": "ready",
                "checks": { "storage": "ok" }
            })),
        ),
        Some(reason) => {
            error!(%reason, "readiness check failed: storage unavailable");
            (
                StatusCode::SERVICE_UNAVAILABLE,
                Json(serde_json::json!({
                    "status": "not_ready",
                    "checks": { "storage": "unavailable" }
                })),
            )
        }
    }
}

// ============================================================
// Scan Records
// ============================================================

#[derive(Debug, Deserialize)]
pub struct CreateScanBody {
    pub barcode: String,
    #[serde(default)]
    pub notes: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct CreateScanResponse {
    pub scan: StoredScan,
    pub is_duplicate: bool,
    pub message: String,
}

#[derive(Debug, Serialize)]
pub struct ScanListResponse {
    pub scans: Vec<StoredScan>,
    pub total: u64,
}

#[derive(Debug, Serialize)]
pub struct ClearScansResponse {
    pub message: String,
    pub deleted: u64,
}

async fn create_scan<S: ScanStore>(
    State(state): State<Arc<AppState<S>>>,
    ValidatedJson(body): ValidatedJson<CreateScanBody>,
) -> ApiResult<Json<CreateScanResponse>> {
    let outcome = state
        .scans
        .create_scan(CreateScanRequest::new(body.barcode, body.notes))
        .await?;

    Ok(Json(CreateScanResponse {
        scan: outcome.scan,
        is_duplicate: outcome.is_duplicate,
        message: outcome.message,
    }))
}

async fn list_scans<S: ScanStore>(
    State(state): State<Arc<AppState<S>>>,
    ValidatedQuery(query): ValidatedQuery<ScanQuery>,
) -> ApiResult<Json<ScanListResponse>> {
    let page = state.scans.list_scans(&query).await?;
    Ok(Json(ScanListResponse {
        scans: page.scans,
        total: page.total,
    }))
}

async fn get_scan<S: ScanStore>(
    State(state): State<Arc<AppState<S>>>,
    Path(raw_id): Path<String>,
) -> ApiResult<Json<StoredScan>> {
    let id: i64 = raw_id
        .parse()
        .map_err(|_| ApiError::validation_error(format!("invalid scan id: {raw_id}")))?;

    Ok(Json(state.scans.get_scan(id).await?))
}

async fn clear_scans<S: ScanStore>(
    State(state): State<Arc<AppState<S>>>,
) -> ApiResult<Json<ClearScansResponse>> {
    let outcome = state.scans.clear_scans().await?;
    Ok(Json(ClearScansResponse {
        message: outcome.message,
        deleted: outcome.deleted,
    }))
}

async fn export_scans<S: ScanStore>(
    State(state): State<Arc<AppState<S>>>,
    ValidatedQuery(query): ValidatedQuery<ScanQuery>,
) -> ApiResult<Response> {
    let export = state.scans.export_workbook(&query).await?;
    info!(filename = %export.filename, records = export.records, "serving export");

    Ok((
        StatusCode::OK,
        [
            (CONTENT_TYPE, XLSX_CONTENT_TYPE.to_string()),
            (
                CONTENT_DISPOSITION,
                format!("attachment; filename=\"{}\"", export.filename),
            ),
        ],
        export.content,
    )
        .into_response())
}
