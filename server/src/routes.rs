//! HTTP route handlers for the OmeroFS monitor server.
//!
//! This module provides the HTTP API endpoints:
//!
//! - `POST /monitors` - Create a monitor (not started)
//! - `GET /monitors` - List monitors
//! - `GET /monitors/{id}` - Describe one monitor
//! - `DELETE /monitors/{id}` - Stop and unregister a monitor
//! - `POST /monitors/{id}/start` - Start a monitor
//! - `POST /monitors/{id}/stop` - Stop a monitor
//! - `GET /monitors/{id}/directory` - List a directory under the monitor root
//! - `GET /monitors/{id}/stats` - Metadata of a file under the monitor root
//! - `GET /health` - Health check endpoint
//!
//! # Errors
//!
//! Every failure is a JSON [`ErrorResponse`] `{error, code}`. The code is
//! [`ServerError::code`]; the status is chosen per code:
//!
//! | Code | Status |
//! |------|--------|
//! | `unknown_monitor_type`, `invalid_path`, `invalid_filter`, `invalid_callback_url`, `invalid_request` | 400 |
//! | `unknown_monitor_id` | 404 |
//! | `monitor_start_failed` | 409 |
//! | `monitor_creation_failed` | 422 |
//! | `monitor_stop_failed`, `internal_error` | 500 |
//! | `at_capacity` | 503 |
//!
//! # Example
//!
//! ```rust,no_run
//! use omerofs_server::routes::{create_router, AppState};
//! use omerofs_server::config::Config;
//!
//! #[tokio::main]
//! async fn main() {
//!     let config = Config::from_env().expect("failed to load config");
//!     let state = AppState::new(config).expect("failed to build state");
//!     let app = create_router(state);
//!
//!     let listener = tokio::net::TcpListener::bind("127.0.0.1:8080").await.unwrap();
//!     axum::serve(listener, app).await.unwrap();
//! }
//! ```

use std::sync::Arc;

use axum::{
    body::Bytes,
    extract::{rejection::QueryRejection, DefaultBodyLimit, Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use omerofs_monitor::types::MonitorId;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tokio::time::Instant;
use tower_http::trace::TraceLayer;
use tracing::{debug, error, warn};

use crate::config::Config;
use crate::error::ServerError;
use crate::monitor_server::MonitorServer;
use crate::remote::HttpWatcher;
use crate::types::{
    CreateMonitorRequest, CreateMonitorResponse, DirectoryQuery, DirectoryResponse, FileStats,
    MonitorListResponse, MonitorSummary, StatsQuery,
};

// ============================================================================
// Constants
// ============================================================================

/// Maximum body size of a create request (64 KiB).
const MAX_BODY_SIZE: usize = 64 * 1024;

/// Idle connections kept per callback host.
const CALLBACK_POOL_IDLE_PER_HOST: usize = 10;

// ============================================================================
// Application State
// ============================================================================

/// Shared application state for all route handlers.
#[derive(Clone)]
pub struct AppState {
    /// Server configuration.
    pub config: Arc<Config>,

    /// Registry of monitors.
    pub server: MonitorServer,

    /// HTTP client shared by every callback watcher.
    pub client: Client,

    /// Server start time for uptime calculation.
    pub start_time: Instant,
}

impl AppState {
    /// Creates application state from configuration.
    ///
    /// # Errors
    ///
    /// Returns [`ServerError::HttpClient`] if the callback client cannot be
    /// built.
    pub fn new(config: Config) -> Result<Self, ServerError> {
        let client = Client::builder()
            .timeout(config.callback_timeout)
            .pool_max_idle_per_host(CALLBACK_POOL_IDLE_PER_HOST)
            .build()?;
        let server = MonitorServer::from_config(&config.monitor, config.max_monitors);
        Ok(Self::with_components(config, server, client))
    }

    /// Creates application state around an existing server and client.
    ///
    /// Useful for testing or when embedding a custom watch backend.
    #[must_use]
    pub fn with_components(config: Config, server: MonitorServer, client: Client) -> Self {
        Self {
            config: Arc::new(config),
            server,
            client,
            start_time: Instant::now(),
        }
    }
}

impl std::fmt::Debug for AppState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AppState")
            .field("config", &self.config)
            .field("server", &self.server)
            .field("start_time", &self.start_time)
            .finish_non_exhaustive()
    }
}

// ============================================================================
// Router
// ============================================================================

/// Creates the application router with all routes configured.
pub fn create_router(state: AppState) -> Router {
    Router::new()
        .route(
            "/monitors",
            post(create_monitor)
                .layer(DefaultBodyLimit::max(MAX_BODY_SIZE))
                .get(list_monitors),
        )
        .route("/monitors/{id}", get(get_monitor).delete(destroy_monitor))
        .route("/monitors/{id}/start", post(start_monitor))
        .route("/monitors/{id}/stop", post(stop_monitor))
        .route("/monitors/{id}/directory", get(get_directory))
        .route("/monitors/{id}/stats", get(get_stats))
        .route("/health", get(get_health))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

// ============================================================================
// Error Response Types
// ============================================================================

/// JSON error response body.
#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub code: Option<String>,
}

impl ErrorResponse {
    fn new(error: impl Into<String>) -> Self {
        Self {
            error: error.into(),
            code: None,
        }
    }

    fn with_code(mut self, code: impl Into<String>) -> Self {
        self.code = Some(code.into());
        self
    }
}

/// Returns the HTTP status for a server error.
fn status_for(err: &ServerError) -> StatusCode {
    match err {
        ServerError::UnknownMonitorType(_)
        | ServerError::InvalidPath(_)
        | ServerError::InvalidFilter(_)
        | ServerError::InvalidCallbackUrl(_) => StatusCode::BAD_REQUEST,
        ServerError::UnknownMonitorId(_) => StatusCode::NOT_FOUND,
        ServerError::MonitorStart(_) => StatusCode::CONFLICT,
        ServerError::MonitorCreation(_) => StatusCode::UNPROCESSABLE_ENTITY,
        ServerError::AtCapacity { .. } => StatusCode::SERVICE_UNAVAILABLE,
        ServerError::MonitorStop(_)
        | ServerError::Io(_)
        | ServerError::Config(_)
        | ServerError::HttpClient(_) => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

impl IntoResponse for ServerError {
    fn into_response(self) -> Response {
        let status = status_for(&self);
        if status.is_server_error() {
            error!(error = %self, code = self.code(), "Request failed");
        } else {
            debug!(error = %self, code = self.code(), "Request rejected");
        }

        (
            status,
            Json(ErrorResponse::new(self.to_string()).with_code(self.code())),
        )
            .into_response()
    }
}

fn bad_request(message: impl Into<String>) -> Response {
    (
        StatusCode::BAD_REQUEST,
        Json(ErrorResponse::new(message).with_code("invalid_request")),
    )
        .into_response()
}

// ============================================================================
// Monitor Lifecycle
// ============================================================================

/// POST /monitors - Create a monitor.
///
/// # Responses
///
/// - `201 Created` - `{monitor_id}`; the monitor is not started
/// - `400 Bad Request` - Malformed body, unknown type or bad callback URL
/// - `422 Unprocessable Entity` - The watch could not be set up
/// - `503 Service Unavailable` - Monitor limit reached
async fn create_monitor(State(state): State<AppState>, body: Bytes) -> Response {
    let request: CreateMonitorRequest = match serde_json::from_slice(&body) {
        Ok(request) => request,
        Err(e) => {
            debug!(error = %e, "Failed to parse create request");
            return bad_request(format!("invalid request body: {e}"));
        }
    };

    let watcher = match HttpWatcher::new(&request.callback_url, state.client.clone()) {
        Ok(watcher) => watcher,
        Err(e) => return e.into_response(),
    };
    let spec = request.to_spec(&state.config.monitor);

    match state
        .server
        .create_monitor(&request.kind, spec, Arc::new(watcher))
    {
        Ok(monitor_id) => (
            StatusCode::CREATED,
            Json(CreateMonitorResponse { monitor_id }),
        )
            .into_response(),
        Err(e) => e.into_response(),
    }
}

/// GET /monitors - List monitors, oldest first.
async fn list_monitors(State(state): State<AppState>) -> Json<MonitorListResponse> {
    Json(MonitorListResponse {
        monitors: state.server.list_monitors(),
    })
}

/// GET /monitors/{id} - Describe one monitor, including its state.
async fn get_monitor(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<MonitorSummary>, ServerError> {
    state.server.monitor_summary(&MonitorId::from(id)).map(Json)
}

/// POST /monitors/{id}/start - Start a monitor.
async fn start_monitor(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<StatusCode, ServerError> {
    state.server.start_monitor(&MonitorId::from(id))?;
    Ok(StatusCode::NO_CONTENT)
}

/// POST /monitors/{id}/stop - Stop a monitor. Stopping twice is fine.
async fn stop_monitor(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<StatusCode, ServerError> {
    state.server.stop_monitor(&MonitorId::from(id))?;
    Ok(StatusCode::NO_CONTENT)
}

/// DELETE /monitors/{id} - Stop and unregister a monitor.
///
/// A second delete of the same id is `404`.
async fn destroy_monitor(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<StatusCode, ServerError> {
    state.server.destroy_monitor(&MonitorId::from(id))?;
    Ok(StatusCode::NO_CONTENT)
}

// ============================================================================
// File System Queries
// ============================================================================

/// GET /monitors/{id}/directory?path=&filter= - List a directory.
async fn get_directory(
    State(state): State<AppState>,
    Path(id): Path<String>,
    query: Result<Query<DirectoryQuery>, QueryRejection>,
) -> Response {
    let Query(query) = match query {
        Ok(query) => query,
        Err(e) => return bad_request(e.body_text()),
    };

    match state
        .server
        .get_directory(
            &MonitorId::from(id),
            query.path.as_deref().unwrap_or_default(),
            query.filter.as_deref(),
        )
        .await
    {
        Ok(entries) => Json(DirectoryResponse { entries }).into_response(),
        Err(e) => e.into_response(),
    }
}

/// GET /monitors/{id}/stats?file= - Metadata of one file.
async fn get_stats(
    State(state): State<AppState>,
    Path(id): Path<String>,
    query: Result<Query<StatsQuery>, QueryRejection>,
) -> Response {
    let Query(query) = match query {
        Ok(query) => query,
        Err(e) => {
            warn!(error = %e, "Invalid stats query");
            return bad_request(e.body_text());
        }
    };

    let result: Result<FileStats, ServerError> = state
        .server
        .get_stats(&MonitorId::from(id), &query.file)
        .await;
    match result {
        Ok(stats) => Json(stats).into_response(),
        Err(e) => e.into_response(),
    }
}

// ============================================================================
// GET /health - Health Check
// ============================================================================

/// Health check response body.
#[derive(Debug, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
    pub monitors: usize,
    pub max_monitors: usize,
    pub uptime_seconds: u64,
}

/// GET /health - Health check endpoint.
async fn get_health(State(state): State<AppState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".to_string(),
        monitors: state.server.len(),
        max_monitors: state.server.max_monitors(),
        uptime_seconds: state.start_time.elapsed().as_secs(),
    })
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use axum::http::Request;
    use omerofs_monitor::factory::MonitorFactory;
    use omerofs_monitor::types::MonitorState;
    use omerofs_monitor::watch::ManualBackend;
    use serde::de::DeserializeOwned;
    use tower::ServiceExt;

    const CALLBACK: &str = "http://127.0.0.1:9/hook";

    fn app_with(backend: &ManualBackend, max_monitors: usize) -> Router {
        let server = MonitorServer::new(MonitorFactory::new(backend.clone()), max_monitors, 16);
        create_router(AppState::with_components(
            Config::default(),
            server,
            Client::new(),
        ))
    }

    fn app() -> (Router, ManualBackend) {
        let backend = ManualBackend::new();
        (app_with(&backend, 16), backend)
    }

    async fn send(app: &Router, method: &str, uri: &str, body: Option<serde_json::Value>) -> Response {
        let request = Request::builder().method(method).uri(uri);
        let request = match body {
            Some(json) => request
                .header("content-type", "application/json")
                .body(Body::from(json.to_string())),
            None => request.body(Body::empty()),
        };
        app.clone().oneshot(request.unwrap()).await.unwrap()
    }

    async fn json<T: DeserializeOwned>(response: Response) -> T {
        let body = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        serde_json::from_slice(&body).unwrap()
    }

    async fn create(app: &Router, kind: &str, path: &str) -> MonitorId {
        let response = send(
            app,
            "POST",
            "/monitors",
            Some(serde_json::json!({
                "kind": kind,
                "path": path,
                "callback_url": CALLBACK,
            })),
        )
        .await;
        assert_eq!(response.status(), StatusCode::CREATED);
        json::<CreateMonitorResponse>(response).await.monitor_id
    }

    async fn error_code(response: Response) -> Option<String> {
        json::<ErrorResponse>(response).await.code
    }

    // ========================================================================
    // Health endpoint tests
    // ========================================================================

    #[tokio::test]
    async fn health_returns_ok_status() {
        let (app, _backend) = app();
        create(&app, "persistent", "/data/m1").await;

        let response = send(&app, "GET", "/health", None).await;
        assert_eq!(response.status(), StatusCode::OK);

        let health: HealthResponse = json(response).await;
        assert_eq!(health.status, "ok");
        assert_eq!(health.monitors, 1);
        assert_eq!(health.max_monitors, 16);
    }

    // ========================================================================
    // Lifecycle tests
    // ========================================================================

    #[tokio::test]
    async fn create_start_stop_destroy() {
        let (app, backend) = app();
        let id = create(&app, "OneShot", "/data/m1").await;
        let uri = format!("/monitors/{id}");

        let summary: MonitorSummary = json(send(&app, "GET", &uri, None).await).await;
        assert_eq!(summary.state, MonitorState::Created);
        assert_eq!(summary.target, CALLBACK);

        let response = send(&app, "POST", &format!("{uri}/start"), None).await;
        assert_eq!(response.status(), StatusCode::NO_CONTENT);
        assert_eq!(backend.active_watches("/data/m1"), 1);

        let response = send(&app, "POST", &format!("{uri}/stop"), None).await;
        assert_eq!(response.status(), StatusCode::NO_CONTENT);
        let response = send(&app, "POST", &format!("{uri}/stop"), None).await;
        assert_eq!(response.status(), StatusCode::NO_CONTENT);

        let response = send(&app, "DELETE", &uri, None).await;
        assert_eq!(response.status(), StatusCode::NO_CONTENT);
        assert_eq!(backend.active_watches("/data/m1"), 0);

        let response = send(&app, "DELETE", &uri, None).await;
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
        assert_eq!(error_code(response).await.as_deref(), Some("unknown_monitor_id"));
    }

    #[tokio::test]
    async fn list_returns_created_monitors() {
        let (app, _backend) = app();
        let first = create(&app, "persistent", "/data/a").await;
        let second = create(&app, "inactivity", "/data/b").await;

        let list: MonitorListResponse = json(send(&app, "GET", "/monitors", None).await).await;
        let ids: Vec<_> = list.monitors.iter().map(|m| m.monitor_id.clone()).collect();
        assert_eq!(ids.len(), 2);
        assert!(ids.contains(&first));
        assert!(ids.contains(&second));
    }

    #[tokio::test]
    async fn starting_twice_conflicts() {
        let (app, _backend) = app();
        let id = create(&app, "persistent", "/data/m1").await;
        let uri = format!("/monitors/{id}/start");

        assert_eq!(send(&app, "POST", &uri, None).await.status(), StatusCode::NO_CONTENT);
        let response = send(&app, "POST", &uri, None).await;
        assert_eq!(response.status(), StatusCode::CONFLICT);
        assert_eq!(error_code(response).await.as_deref(), Some("monitor_start_failed"));
    }

    #[tokio::test]
    async fn unknown_id_is_not_found() {
        let (app, _backend) = app();

        for (method, uri) in [
            ("GET", "/monitors/nonexistent-id"),
            ("POST", "/monitors/nonexistent-id/start"),
            ("POST", "/monitors/nonexistent-id/stop"),
            ("DELETE", "/monitors/nonexistent-id"),
        ] {
            let response = send(&app, method, uri, None).await;
            assert_eq!(response.status(), StatusCode::NOT_FOUND, "{method} {uri}");
        }
    }

    // ========================================================================
    // Create validation tests
    // ========================================================================

    #[tokio::test]
    async fn unknown_type_is_bad_request() {
        let (app, _backend) = app();
        let response = send(
            &app,
            "POST",
            "/monitors",
            Some(serde_json::json!({
                "kind": "sometimes",
                "path": "/data",
                "callback_url": CALLBACK,
            })),
        )
        .await;

        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert_eq!(error_code(response).await.as_deref(), Some("unknown_monitor_type"));
    }

    #[tokio::test]
    async fn bad_callback_url_is_bad_request() {
        let (app, _backend) = app();
        let response = send(
            &app,
            "POST",
            "/monitors",
            Some(serde_json::json!({
                "kind": "persistent",
                "path": "/data",
                "callback_url": "file:///tmp/hook",
            })),
        )
        .await;

        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert_eq!(error_code(response).await.as_deref(), Some("invalid_callback_url"));
    }

    #[tokio::test]
    async fn malformed_body_is_bad_request() {
        let (app, _backend) = app();
        let response = send(
            &app,
            "POST",
            "/monitors",
            Some(serde_json::json!({"kind": "persistent"})),
        )
        .await;

        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert_eq!(error_code(response).await.as_deref(), Some("invalid_request"));
    }

    #[tokio::test]
    async fn watch_setup_failure_is_unprocessable() {
        let (app, backend) = app();
        backend.reject_path("/gone");
        let response = send(
            &app,
            "POST",
            "/monitors",
            Some(serde_json::json!({
                "kind": "persistent",
                "path": "/gone",
                "callback_url": CALLBACK,
            })),
        )
        .await;

        assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY);
        assert_eq!(error_code(response).await.as_deref(), Some("monitor_creation_failed"));
    }

    #[tokio::test]
    async fn full_registry_is_unavailable() {
        let backend = ManualBackend::new();
        let app = app_with(&backend, 1);
        create(&app, "persistent", "/data/a").await;

        let response = send(
            &app,
            "POST",
            "/monitors",
            Some(serde_json::json!({
                "kind": "persistent",
                "path": "/data/b",
                "callback_url": CALLBACK,
            })),
        )
        .await;
        assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
        assert_eq!(error_code(response).await.as_deref(), Some("at_capacity"));
    }

    // ========================================================================
    // File system query tests
    // ========================================================================

    #[tokio::test]
    async fn directory_and_stats() {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path().canonicalize().unwrap();
        std::fs::write(root.join("a.jpg"), b"jpeg").unwrap();
        std::fs::write(root.join("b.txt"), b"text").unwrap();

        let (app, _backend) = app();
        let id = create(&app, "persistent", &root.to_string_lossy()).await;

        let response = send(
            &app,
            "GET",
            &format!("/monitors/{id}/directory?filter=*.jpg"),
            None,
        )
        .await;
        assert_eq!(response.status(), StatusCode::OK);
        let listing: DirectoryResponse = json(response).await;
        assert_eq!(
            listing.entries,
            vec![root.join("a.jpg").to_string_lossy().into_owned()]
        );

        let response = send(&app, "GET", &format!("/monitors/{id}/stats?file=b.txt"), None).await;
        assert_eq!(response.status(), StatusCode::OK);
        let stats: FileStats = json(response).await;
        assert_eq!(stats.base_name, "b.txt");
        assert_eq!(stats.size, 4);

        let response = send(&app, "GET", &format!("/monitors/{id}/stats"), None).await;
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert_eq!(error_code(response).await.as_deref(), Some("invalid_request"));

        let response = send(
            &app,
            "GET",
            &format!("/monitors/{id}/directory?path=.."),
            None,
        )
        .await;
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert_eq!(error_code(response).await.as_deref(), Some("invalid_path"));
    }

    #[test]
    fn every_error_code_has_a_status() {
        use omerofs_monitor::error::MonitorError;
        use std::path::PathBuf;

        let cases = [
            (ServerError::UnknownMonitorType("x".into()), StatusCode::BAD_REQUEST),
            (ServerError::InvalidPath(PathBuf::from("..")), StatusCode::BAD_REQUEST),
            (ServerError::InvalidFilter("[".into()), StatusCode::BAD_REQUEST),
            (ServerError::InvalidCallbackUrl("x".into()), StatusCode::BAD_REQUEST),
            (ServerError::UnknownMonitorId(MonitorId::from("x")), StatusCode::NOT_FOUND),
            (ServerError::MonitorStart(MonitorError::AlreadyRunning), StatusCode::CONFLICT),
            (
                ServerError::MonitorCreation(MonitorError::NoRuntime),
                StatusCode::UNPROCESSABLE_ENTITY,
            ),
            (
                ServerError::MonitorStop(MonitorError::NoRuntime),
                StatusCode::INTERNAL_SERVER_ERROR,
            ),
            (ServerError::AtCapacity { max: 1 }, StatusCode::SERVICE_UNAVAILABLE),
        ];
        for (err, status) in cases {
            assert_eq!(status_for(&err), status, "{}", err.code());
        }
    }
}
