use std::sync::Arc;

use axum::{
    extract::{
        rejection::{JsonRejection, PathRejection, QueryRejection},
        Path, Query, State,
    },
    http::{header, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tracing::{error, warn};

use crate::alerts;
use crate::errors::Error;
use crate::export::to_csv;
use crate::ingest::Ingestor;
use crate::model::{Alert, AlertId, Reading, UserId};
use crate::payload::{BatchUpload, RawReading};
use crate::stats::{self, clamp_window};
use crate::store::AlertFilter;

const DEFAULT_PAGE_SIZE: u64 = 50;
const MAX_PAGE_SIZE: u64 = 200;
const DEFAULT_EXPORT_LIMIT: u64 = 1000;
const MAX_EXPORT_LIMIT: u64 = 10_000;

#[derive(Clone)]
struct AppState {
    ingestor: Arc<Ingestor>,
}

#[derive(Debug, Serialize)]
pub struct ApiResponse<T> {
    success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    message: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    data: Option<T>,
    timestamp: DateTime<Utc>,
}

impl<T: Serialize> ApiResponse<T> {
    fn ok(data: T) -> Json<Self> {
        Json(Self {
            success: true,
            message: None,
            data: Some(data),
            timestamp: Utc::now(),
        })
    }

    fn with_message(message: impl Into<String>, data: T) -> Json<Self> {
        Json(Self {
            success: true,
            message: Some(message.into()),
            data: Some(data),
            timestamp: Utc::now(),
        })
    }
}

#[derive(Debug, Deserialize)]
pub struct UserQuery {
    user_id: Option<UserId>,
}

#[derive(Debug, Deserialize)]
pub struct WindowQuery {
    user_id: Option<UserId>,
    days: Option<i64>,
}

#[derive(Debug, Deserialize)]
pub struct HistoryQuery {
    user_id: Option<UserId>,
    page: Option<u64>,
    per_page: Option<u64>,
}

#[derive(Debug, Deserialize)]
pub struct ExportQuery {
    user_id: Option<UserId>,
    limit: Option<u64>,
}

#[derive(Debug, Deserialize)]
pub struct AlertQuery {
    user_id: Option<UserId>,
    acknowledged: Option<bool>,
    limit: Option<u64>,
}

#[derive(Debug, Serialize)]
pub struct Pagination {
    page: u64,
    per_page: u64,
    total_pages: u64,
    total_items: u64,
    has_next: bool,
    has_prev: bool,
}

impl Pagination {
    fn new(page: u64, per_page: u64, total_items: u64) -> Self {
        let total_pages = total_items.div_ceil(per_page);
        Self {
            page,
            per_page,
            total_pages,
            total_items,
            has_next: page < total_pages,
            has_prev: page > 1,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct History {
    readings: Vec<Reading>,
    pagination: Pagination,
}

pub fn create_router(ingestor: Arc<Ingestor>) -> Router {
    let state = AppState { ingestor };

    Router::new()
        .route("/api/v1/medical-data", post(create_reading))
        .route("/api/v1/medical-data/batch", post(create_batch))
        .route("/api/v1/medical-data/latest", get(get_latest))
        .route("/api/v1/medical-data/statistics", get(get_statistics))
        .route("/api/v1/medical-data/summary", get(get_summary))
        .route("/api/v1/medical-data/history", get(get_history))
        .route("/api/v1/medical-data/export", get(export_csv))
        .route("/api/v1/alerts", get(get_alerts))
        .route("/api/v1/alerts/:id/acknowledge", post(acknowledge_alert))
        .route("/api/v1/health", get(health))
        .with_state(state)
}

async fn create_reading(
    State(state): State<AppState>,
    body: Result<Json<Value>, JsonRejection>,
) -> Result<impl IntoResponse, AppError> {
    let Json(body) = body.map_err(malformed)?;
    let raw = RawReading::from_value(body)?;
    let user_id = raw.user_id()?;
    let outcome = state.ingestor.ingest_one(user_id, &raw).await?;

    Ok((
        StatusCode::CREATED,
        ApiResponse::with_message("Medical data saved successfully", outcome),
    ))
}

async fn create_batch(
    State(state): State<AppState>,
    body: Result<Json<Value>, JsonRejection>,
) -> Result<impl IntoResponse, AppError> {
    let Json(body) = body.map_err(malformed)?;
    let upload: BatchUpload =
        serde_json::from_value(body).map_err(|e| Error::MalformedPayload(e.to_string()))?;
    let outcome = state.ingestor.ingest_upload(upload).await?;

    Ok((
        StatusCode::CREATED,
        ApiResponse::with_message(
            format!(
                "Batch upload processed: {}/{} readings saved",
                outcome.saved_readings, outcome.total_readings
            ),
            outcome,
        ),
    ))
}

async fn get_latest(
    State(state): State<AppState>,
    params: Result<Query<UserQuery>, QueryRejection>,
) -> Result<Json<ApiResponse<Reading>>, AppError> {
    let Query(params) = params.map_err(malformed)?;
    let user_id = params.user_id.ok_or(Error::MissingUserId)?;
    let reading = state
        .ingestor
        .store()
        .latest_reading(user_id)
        .await?
        .ok_or(Error::NoData)?;
    Ok(ApiResponse::ok(reading))
}

async fn get_statistics(
    State(state): State<AppState>,
    params: Result<Query<WindowQuery>, QueryRejection>,
) -> Result<Json<ApiResponse<stats::Stats>>, AppError> {
    let Query(params) = params.map_err(malformed)?;
    let user_id = params.user_id.ok_or(Error::MissingUserId)?;
    let days = clamp_window(params.days);
    let statistics = stats::statistics(state.ingestor.store(), user_id, days, Utc::now()).await?;
    Ok(ApiResponse::ok(statistics))
}

async fn get_summary(
    State(state): State<AppState>,
    params: Result<Query<WindowQuery>, QueryRejection>,
) -> Result<Json<ApiResponse<stats::Summary>>, AppError> {
    let Query(params) = params.map_err(malformed)?;
    let user_id = params.user_id.ok_or(Error::MissingUserId)?;
    let days = clamp_window(params.days);
    let summary = stats::summary(
        state.ingestor.store(),
        user_id,
        days,
        Utc::now(),
        &state.ingestor.thresholds().concerns,
    )
    .await?;
    Ok(ApiResponse::ok(summary))
}

async fn get_history(
    State(state): State<AppState>,
    params: Result<Query<HistoryQuery>, QueryRejection>,
) -> Result<Json<ApiResponse<History>>, AppError> {
    let Query(params) = params.map_err(malformed)?;
    let user_id = params.user_id.ok_or(Error::MissingUserId)?;
    let page = params.page.unwrap_or(1).max(1);
    let per_page = params
        .per_page
        .unwrap_or(DEFAULT_PAGE_SIZE)
        .clamp(1, MAX_PAGE_SIZE);

    let (readings, total) = state
        .ingestor
        .store()
        .readings_page(user_id, (page - 1).saturating_mul(per_page), per_page)
        .await?;

    Ok(ApiResponse::ok(History {
        readings,
        pagination: Pagination::new(page, per_page, total),
    }))
}

async fn export_csv(
    State(state): State<AppState>,
    params: Result<Query<ExportQuery>, QueryRejection>,
) -> Result<Response, AppError> {
    let Query(params) = params.map_err(malformed)?;
    let user_id = params.user_id.ok_or(Error::MissingUserId)?;
    let limit = params
        .limit
        .unwrap_or(DEFAULT_EXPORT_LIMIT)
        .clamp(1, MAX_EXPORT_LIMIT);

    let (readings, _) = state
        .ingestor
        .store()
        .readings_page(user_id, 0, limit)
        .await?;
    if readings.is_empty() {
        return Err(Error::NoData.into());
    }

    let filename = format!(
        "vitals_{}_{}.csv",
        user_id,
        Utc::now().format("%Y%m%d_%H%M%S")
    );
    Ok((
        [
            (header::CONTENT_TYPE, "text/csv; charset=utf-8".to_string()),
            (
                header::CONTENT_DISPOSITION,
                format!("attachment; filename={filename}"),
            ),
        ],
        to_csv(&readings),
    )
        .into_response())
}

async fn get_alerts(
    State(state): State<AppState>,
    params: Result<Query<AlertQuery>, QueryRejection>,
) -> Result<Json<ApiResponse<Vec<Alert>>>, AppError> {
    let Query(params) = params.map_err(malformed)?;
    let user_id = params.user_id.ok_or(Error::MissingUserId)?;
    let filter = AlertFilter {
        acknowledged: params.acknowledged,
        limit: params.limit.unwrap_or(DEFAULT_PAGE_SIZE).clamp(1, MAX_PAGE_SIZE),
    };
    let alerts = state.ingestor.store().alerts(user_id, filter).await?;
    Ok(ApiResponse::ok(alerts))
}

async fn acknowledge_alert(
    State(state): State<AppState>,
    alert_id: Result<Path<AlertId>, PathRejection>,
    params: Result<Query<UserQuery>, QueryRejection>,
) -> Result<Json<ApiResponse<Alert>>, AppError> {
    let Query(params) = params.map_err(malformed)?;
    let Path(alert_id) = alert_id.map_err(malformed)?;
    let alert = alerts::acknowledge(
        state.ingestor.store(),
        alert_id,
        params.user_id,
        Utc::now(),
    )
    .await?;
    Ok(ApiResponse::with_message("Alert acknowledged", alert))
}

async fn health(State(state): State<AppState>) -> Response {
    match state.ingestor.store().ping().await {
        Ok(()) => ApiResponse::ok(json!({ "status": "healthy", "database": "connected" }))
            .into_response(),
        Err(e) => {
            error!("Health check failed: {}", e);
            (
                StatusCode::SERVICE_UNAVAILABLE,
                Json(json!({
                    "success": false,
                    "error": "Database unavailable",
                    "code": "UNHEALTHY",
                    "timestamp": Utc::now(),
                })),
            )
                .into_response()
        }
    }
}

/// Maps axum's extractor rejections into the JSON error envelope.
fn malformed(rejection: impl std::fmt::Display) -> Error {
    Error::MalformedPayload(rejection.to_string())
}

struct AppError(anyhow::Error);

impl AppError {
    fn status_and_code(&self) -> (StatusCode, &'static str) {
        match self.0.downcast_ref::<Error>() {
            Some(Error::MissingUserId) => (StatusCode::BAD_REQUEST, "MISSING_USER_ID"),
            Some(Error::UnknownUser(_)) => (StatusCode::NOT_FOUND, "USER_NOT_FOUND"),
            Some(Error::BatchTooLarge { .. }) => (StatusCode::BAD_REQUEST, "BATCH_TOO_LARGE"),
            Some(Error::MalformedPayload(_) | Error::Json(_)) => {
                (StatusCode::BAD_REQUEST, "MALFORMED_PAYLOAD")
            }
            Some(Error::AlertNotFound(_)) => (StatusCode::NOT_FOUND, "ALERT_NOT_FOUND"),
            Some(Error::Forbidden { .. }) => (StatusCode::FORBIDDEN, "FORBIDDEN"),
            Some(Error::NoData) => (StatusCode::NOT_FOUND, "NO_DATA"),
            _ => (StatusCode::INTERNAL_SERVER_ERROR, "INTERNAL_ERROR"),
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, code) = self.status_and_code();
        let message = if status.is_server_error() {
            error!("API error: {:#}", self.0);
            "Internal server error".to_string()
        } else {
            warn!("Rejected request: {}", self.0);
            self.0.to_string()
        };

        (
            status,
            Json(json!({
                "success": false,
                "error": message,
                "code": code,
                "timestamp": Utc::now(),
            })),
        )
            .into_response()
    }
}

impl<E> From<E> for AppError
where
    E: Into<anyhow::Error>,
{
    fn from(err: E) -> Self {
        Self(err.into())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pagination_metadata() {
        let first = Pagination::new(1, 50, 120);
        assert_eq!(first.total_pages, 3);
        assert!(first.has_next);
        assert!(!first.has_prev);

        let last = Pagination::new(3, 50, 120);
        assert!(!last.has_next);
        assert!(last.has_prev);

        let empty = Pagination::new(1, 50, 0);
        assert_eq!(empty.total_pages, 0);
        assert!(!empty.has_next);
    }

    #[test]
    fn test_error_status_mapping() {
        let cases = [
            (AppError::from(Error::MissingUserId), StatusCode::BAD_REQUEST),
            (AppError::from(Error::UnknownUser(4)), StatusCode::NOT_FOUND),
            (
                AppError::from(Error::BatchTooLarge { size: 101, max: 100 }),
                StatusCode::BAD_REQUEST,
            ),
            (
                AppError::from(Error::Forbidden { alert_id: 1, user_id: 2 }),
                StatusCode::FORBIDDEN,
            ),
            (AppError::from(Error::NoData), StatusCode::NOT_FOUND),
            (
                AppError::from(Error::Database(sqlx::Error::PoolTimedOut)),
                StatusCode::INTERNAL_SERVER_ERROR,
            ),
        ];

        for (err, status) in cases {
            assert_eq!(err.status_and_code().0, status);
        }
    }

    #[test]
    fn test_server_errors_hide_details() {
        let response = AppError::from(Error::Database(sqlx::Error::PoolTimedOut)).into_response();
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    }
}
