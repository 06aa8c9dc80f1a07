// Event ingestion API
// Decision: Router assembly lives in the library so handler tests drive the same app the binary serves

pub mod auth;
mod common;
pub mod config;
pub mod events;

use std::sync::Arc;

use axum::{
    body::Bytes,
    extract::State,
    http::{header, HeaderMap, Method, StatusCode, Uri},
    response::IntoResponse,
    routing::{any, get},
    Json, Router,
};
use events_core::{Event, EventStatus, EventStore, NewEvent, User};
use serde::Serialize;
use tower_http::trace::TraceLayer;
use utoipa::{OpenApi, ToSchema};

pub use common::{ErrorResponse, ListResponse};
pub use config::{ServerConfig, StorageBackend};

/// State shared by every route
///
/// `storage` only feeds `/health`; handlers reach events through `store`.
#[derive(Clone)]
pub struct AppState {
    pub store: Arc<dyn EventStore>,
    pub storage: StorageBackend,
}

impl AppState {
    pub fn new(store: Arc<dyn EventStore>, storage: StorageBackend) -> Self {
        Self { store, storage }
    }
}

#[derive(Debug, Serialize, ToSchema)]
pub struct HealthResponse {
    status: &'static str,
    version: &'static str,
    storage: &'static str,
}

/// OpenAPI documentation
#[derive(OpenApi)]
#[openapi(
    paths(
        events::schedule,
        events::list_events,
        events::get_event,
        health,
    ),
    components(
        schemas(
            Event, EventStatus, NewEvent, User,
            ErrorResponse, HealthResponse,
            ListResponse<Event>,
        )
    ),
    tags(
        (name = "events", description = "Event scheduling and status endpoints"),
        (name = "health", description = "Service health")
    ),
    info(
        title = "Events API",
        version = "0.1.0",
        description = "Schedule events for delivery to a target URL",
        license(name = "MIT", url = "https://opensource.org/licenses/MIT")
    )
)]
pub struct ApiDoc;

/// Build the full application router
pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/", get(index))
        .route("/log", any(log_request))
        .route("/health", get(health).with_state(state.clone()))
        .route("/api-doc/openapi.json", get(openapi))
        .merge(events::routes(state))
        .layer(TraceLayer::new_for_http())
}

/// GET / - Plain greeting
async fn index() -> impl IntoResponse {
    ([(header::ALLOW, "OPTIONS,GET")], "Hello World")
}

/// ANY /log - Dump the incoming request to the service log
async fn log_request(method: Method, uri: Uri, headers: HeaderMap, body: Bytes) -> StatusCode {
    tracing::info!(
        %method,
        %uri,
        headers = ?headers,
        body = %String::from_utf8_lossy(&body),
        "Logged request"
    );
    StatusCode::OK
}

/// GET /health - Liveness and configured backend
#[utoipa::path(
    get,
    path = "/health",
    responses(
        (status = 200, description = "Service is up", body = HealthResponse)
    ),
    tag = "health"
)]
async fn health(State(state): State<AppState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        version: env!("CARGO_PKG_VERSION"),
        storage: state.storage.as_str(),
    })
}

async fn openapi() -> Json<utoipa::openapi::OpenApi> {
    Json(ApiDoc::openapi())
}
