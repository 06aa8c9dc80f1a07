// Event ingestion and status HTTP routes
// Decision: /schedule authenticates before method dispatch, so unauthenticated callers never learn the allowed methods
// Decision: Read the body as bytes and decode it ourselves; clients are not required to send a JSON content type

use axum::{
    body::Bytes,
    extract::{Path, State},
    http::{header, HeaderValue, Method, StatusCode},
    response::{IntoResponse, Response},
    routing::{any, get},
    Json, Router,
};
use events_core::{Event, EventId, NewEvent, StoreError};
use url::Url;

use crate::auth::SessionUser;
use crate::common::{ErrorResponse, ListResponse};
use crate::AppState;

const SCHEDULE_ALLOW: &str = "OPTIONS,POST";

/// Create event routes
pub fn routes(state: AppState) -> Router {
    Router::new()
        .route("/schedule", any(schedule))
        .route("/events", get(list_events))
        .route("/events/:event_id", get(get_event))
        .with_state(state)
}

/// Errors surfaced by event handlers
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error("{0}")]
    BadRequest(String),

    #[error("Event not found")]
    NotFound,

    #[error("Method not allowed")]
    MethodNotAllowed,

    #[error("Internal server error")]
    Internal,
}

impl ApiError {
    fn status(&self) -> StatusCode {
        match self {
            Self::BadRequest(_) => StatusCode::BAD_REQUEST,
            Self::NotFound => StatusCode::NOT_FOUND,
            Self::MethodNotAllowed => StatusCode::METHOD_NOT_ALLOWED,
            Self::Internal => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl From<StoreError> for ApiError {
    fn from(e: StoreError) -> Self {
        match e {
            StoreError::InvalidEvent(message) => Self::BadRequest(message),
            e => {
                tracing::error!("Event store error: {}", e);
                Self::Internal
            }
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (self.status(), Json(ErrorResponse::new(self.to_string()))).into_response()
    }
}

/// POST /schedule - Register an event for delivery
///
/// Also answers `OPTIONS`; any other method is rejected with 405.
#[utoipa::path(
    post,
    path = "/schedule",
    request_body = NewEvent,
    responses(
        (status = 201, description = "Event scheduled", body = Event),
        (status = 400, description = "Malformed body or invalid target", body = ErrorResponse),
        (status = 403, description = "Missing or invalid session", body = ErrorResponse),
        (status = 405, description = "Method not allowed", body = ErrorResponse),
        (status = 500, description = "Event could not be stored", body = ErrorResponse)
    ),
    tag = "events"
)]
pub async fn schedule(
    SessionUser(user): SessionUser,
    State(state): State<AppState>,
    method: Method,
    body: Bytes,
) -> Response {
    let result = match method {
        Method::POST => create_event(&state, &user, &body)
            .await
            .map(|event| (StatusCode::CREATED, Json(event)).into_response()),
        Method::OPTIONS => Ok(StatusCode::OK.into_response()),
        _ => Err(ApiError::MethodNotAllowed),
    };

    let mut response = result.unwrap_or_else(IntoResponse::into_response);
    response
        .headers_mut()
        .insert(header::ALLOW, HeaderValue::from_static(SCHEDULE_ALLOW));
    response
}

async fn create_event(
    state: &AppState,
    user: &events_core::User,
    body: &[u8],
) -> Result<Event, ApiError> {
    let new_event: NewEvent = serde_json::from_slice(body).map_err(|e| {
        tracing::debug!("Malformed schedule request: {}", e);
        ApiError::BadRequest(format!("Malformed request body: {}", e))
    })?;

    validate_target(&new_event.target)?;

    let event = state.store.persist_event(user, new_event).await?;
    tracing::info!(event_id = %event.id, owner = %user.id, target = %event.target, "Event scheduled");
    Ok(event)
}

/// A target must be an absolute http(s) URL with a host
pub fn validate_target(target: &str) -> Result<(), ApiError> {
    if target.trim().is_empty() {
        return Err(ApiError::BadRequest("Target must not be empty".to_string()));
    }

    let url = Url::parse(target)
        .map_err(|e| ApiError::BadRequest(format!("Target is not a valid URL: {}", e)))?;

    if !matches!(url.scheme(), "http" | "https") {
        return Err(ApiError::BadRequest(format!(
            "Unsupported target scheme: {}",
            url.scheme()
        )));
    }
    if url.host_str().map_or(true, str::is_empty) {
        return Err(ApiError::BadRequest("Target has no host".to_string()));
    }
    Ok(())
}

/// GET /events - List the caller's events
#[utoipa::path(
    get,
    path = "/events",
    responses(
        (status = 200, description = "Events owned by the caller", body = ListResponse<Event>),
        (status = 403, description = "Missing or invalid session", body = ErrorResponse),
        (status = 500, description = "Internal server error", body = ErrorResponse)
    ),
    tag = "events"
)]
pub async fn list_events(
    SessionUser(user): SessionUser,
    State(state): State<AppState>,
) -> Result<Json<ListResponse<Event>>, ApiError> {
    let events = state.store.list_events(&user.id).await?;
    Ok(Json(ListResponse::new(events)))
}

/// GET /events/{event_id} - Get one of the caller's events
#[utoipa::path(
    get,
    path = "/events/{event_id}",
    params(
        ("event_id" = uuid::Uuid, Path, description = "Event ID")
    ),
    responses(
        (status = 200, description = "Event found", body = Event),
        (status = 403, description = "Missing or invalid session", body = ErrorResponse),
        (status = 404, description = "Event not found", body = ErrorResponse),
        (status = 500, description = "Internal server error", body = ErrorResponse)
    ),
    tag = "events"
)]
pub async fn get_event(
    SessionUser(user): SessionUser,
    State(state): State<AppState>,
    Path(event_id): Path<EventId>,
) -> Result<Json<Event>, ApiError> {
    // Other owners' events are indistinguishable from missing ones
    let event = state
        .store
        .get_event(event_id)
        .await?
        .filter(|event| event.owner == user.id)
        .ok_or(ApiError::NotFound)?;

    Ok(Json(event))
}
