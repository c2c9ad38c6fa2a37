//! API handlers for the Eventful server.

use crate::AppState;
use axum::{
    extract::{Extension, Path, Query},
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use eventful_feed::{EventDetail, FeedError, Guest};
use eventful_types::{Event, PageRequest, User};
use serde::Deserialize;
use std::sync::Arc;
use thiserror::Error;

/// Query parameters for `GET /api/users/{id}/events`.
#[derive(Debug, Default, Deserialize)]
pub struct FeedQuery {
    /// `ALL`, `HOSTING` or `INVITED`. Also accepted as `eventType`.
    #[serde(rename = "viewMode", alias = "eventType")]
    pub view_mode: Option<String>,
    /// 1-based page number (default 1).
    pub page: Option<String>,
    /// Page size (default 10).
    pub limit: Option<String>,
}

impl FeedQuery {
    fn page_request(&self) -> Result<PageRequest, ApiError> {
        Ok(PageRequest::new(
            parse_number("page", self.page.as_deref(), PageRequest::DEFAULT_PAGE)?,
            parse_number("limit", self.limit.as_deref(), PageRequest::DEFAULT_LIMIT)?,
        ))
    }
}

fn parse_number(name: &str, raw: Option<&str>, default: u32) -> Result<u32, ApiError> {
    match raw.map(str::trim).filter(|v| !v.is_empty()) {
        None => Ok(default),
        Some(v) => v
            .parse()
            .map_err(|_| ApiError::BadRequest(format!("{name} must be a positive integer, got '{v}'"))),
    }
}

/// API error type mapping to HTTP status codes.
#[derive(Debug, Error)]
pub enum ApiError {
    #[error("invalid input: {0}")]
    BadRequest(String),
    #[error("not found: {0}")]
    NotFound(String),
    #[error("gateway timeout: {0}")]
    GatewayTimeout(String),
    #[error("internal server error: {0}")]
    InternalServerError(String),
}

impl From<FeedError> for ApiError {
    fn from(err: FeedError) -> Self {
        match err {
            FeedError::InvalidArgument(msg) => ApiError::BadRequest(msg),
            FeedError::NotFound(msg) => ApiError::NotFound(msg),
            FeedError::DeadlineExceeded(deadline) => {
                tracing::warn!(?deadline, "feed request timed out");
                ApiError::GatewayTimeout(format!("feed request exceeded {deadline:?}"))
            }
            other => {
                tracing::error!(error = %other, "feed request failed");
                ApiError::InternalServerError(other.to_string())
            }
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, message) = match self {
            ApiError::BadRequest(msg) => (StatusCode::BAD_REQUEST, msg),
            ApiError::NotFound(msg) => (StatusCode::NOT_FOUND, msg),
            ApiError::GatewayTimeout(msg) => (StatusCode::GATEWAY_TIMEOUT, msg),
            ApiError::InternalServerError(msg) => (StatusCode::INTERNAL_SERVER_ERROR, msg),
        };

        let body = Json(serde_json::json!({
            "error": message
        }));

        (status, body).into_response()
    }
}

/// Handler for `GET /api/users/{id}/events`.
///
/// Returns one page of the user's feed as a JSON array of events.
pub async fn get_feed_handler(
    Extension(state): Extension<Arc<AppState>>,
    Path(user_id): Path<String>,
    Query(params): Query<FeedQuery>,
) -> Result<Json<Vec<Event>>, ApiError> {
    let view = params
        .view_mode
        .as_deref()
        .ok_or_else(|| ApiError::BadRequest("viewMode is required".to_string()))?;
    let page = params.page_request()?;

    let events = state.feed.get_feed_by_label(&user_id, view, page).await?;
    Ok(Json(events))
}

/// Handler for `GET /api/events/{id}`.
pub async fn get_event_handler(
    Extension(state): Extension<Arc<AppState>>,
    Path(event_id): Path<String>,
) -> Result<Json<EventDetail>, ApiError> {
    Ok(Json(state.feed.get_event(&event_id).await?))
}

/// Handler for `GET /api/events/{id}/guests`.
///
/// Returns everyone invited to the event, registered or not.
pub async fn get_event_guests_handler(
    Extension(state): Extension<Arc<AppState>>,
    Path(event_id): Path<String>,
) -> Result<Json<Vec<Guest>>, ApiError> {
    Ok(Json(state.feed.get_event_guests(&event_id).await?))
}

/// Handler for `GET /api/users/{id}`.
pub async fn get_user_handler(
    Extension(state): Extension<Arc<AppState>>,
    Path(user_id): Path<String>,
) -> Result<Json<User>, ApiError> {
    Ok(Json(state.feed.get_user(&user_id).await?))
}
