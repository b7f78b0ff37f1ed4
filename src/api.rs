//! HTTP API for SafeScrub
//!
//! Exposes the session manager over JSON and mounts the model proxy.
//!
//! ## Endpoint Map
//!
//! | Route                                   | Description                         |
//! |-----------------------------------------|-------------------------------------|
//! | `GET /health`                           | Health probe                        |
//! | `GET /api/v1/anonymizer/status`         | Manager status snapshot             |
//! | `POST /api/v1/anonymizer/initialize`    | Install the initial detector        |
//! | `PUT /api/v1/anonymizer/mode`           | Switch detector mode                |
//! | `POST /api/v1/anonymizer/anonymize`     | Anonymize text, start a new session |
//! | `POST /api/v1/anonymizer/deanonymize`   | Restore text from the session       |
//! | `GET /api/v1/anonymizer/session`        | Session presence and stats          |
//! | `DELETE /api/v1/anonymizer/session`     | Clear the session                   |
//! | `GET /api/models/*`, `/api/hf-proxy`    | Model proxy (see [`crate::proxy`])  |

use crate::privacy::{DetectorMode, SessionStats};
use crate::proxy::{model_proxy_router, ProxyState};
use crate::session::{FailureKind, ManagerStatus, SessionError, SessionManager};
use axum::{
    extract::State,
    http::{header, Method, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post, put},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

/// Shared state for anonymizer handlers
#[derive(Clone)]
pub struct AppState {
    pub manager: Arc<SessionManager>,
}

/// Build the complete HTTP application
///
/// The proxy routes answer their own preflights, so the CORS layer only wraps
/// the anonymizer routes.
pub fn build_app(manager: Arc<SessionManager>, proxy: Option<ProxyState>, cors_origins: &[String]) -> Router {
    let mut app = Router::new()
        .route("/health", get(health_check))
        .merge(anonymizer_router(AppState { manager }))
        .layer(build_cors(cors_origins));

    if let Some(proxy) = proxy {
        app = app.merge(model_proxy_router(proxy));
    }

    app.layer(TraceLayer::new_for_http())
}

/// Create the anonymizer router
pub fn anonymizer_router(state: AppState) -> Router {
    Router::new()
        .route("/api/v1/anonymizer/status", get(status))
        .route("/api/v1/anonymizer/initialize", post(initialize))
        .route("/api/v1/anonymizer/mode", put(set_mode))
        .route("/api/v1/anonymizer/anonymize", post(anonymize))
        .route("/api/v1/anonymizer/deanonymize", post(deanonymize))
        .route(
            "/api/v1/anonymizer/session",
            get(session_info).delete(clear_session),
        )
        .with_state(state)
}

// =============================================================================
// Request / Response types
// =============================================================================

#[derive(Debug, Deserialize)]
pub struct TextRequest {
    pub text: String,
}

#[derive(Debug, Deserialize)]
pub struct ModeRequest {
    pub mode: DetectorMode,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StatusResponse {
    pub success: bool,
    pub status: ManagerStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_code: Option<&'static str>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AnonymizeResponse {
    pub success: bool,
    pub anonymized_text: String,
    pub entity_count: usize,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DeanonymizeResponse {
    pub success: bool,
    pub text: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionResponse {
    pub success: bool,
    pub active: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stats: Option<SessionStats>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct ErrorResponse {
    success: bool,
    error: String,
    error_code: &'static str,
}

fn http_status(err: &SessionError) -> StatusCode {
    match err {
        SessionError::NotInitialized | SessionError::AlreadyInProgress => StatusCode::CONFLICT,
        SessionError::NoActiveSession => StatusCode::NOT_FOUND,
        SessionError::BackendConstructionFailed {
            kind: FailureKind::NetworkOrCors,
            ..
        } => StatusCode::SERVICE_UNAVAILABLE,
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

fn failure(err: SessionError) -> Response {
    (
        http_status(&err),
        Json(ErrorResponse {
            success: false,
            error: err.user_message(),
            error_code: err.code(),
        }),
    )
        .into_response()
}

/// Status body for lifecycle calls; carries the snapshot on failure too
fn lifecycle_response(manager: &SessionManager, result: Result<(), SessionError>) -> Response {
    let status = manager.status();
    match result {
        Ok(()) => Json(StatusResponse {
            success: true,
            status,
            error: None,
            error_code: None,
        })
        .into_response(),
        Err(err) => (
            http_status(&err),
            Json(StatusResponse {
                success: false,
                status,
                error: Some(err.user_message()),
                error_code: Some(err.code()),
            }),
        )
            .into_response(),
    }
}

// =============================================================================
// Handlers
// =============================================================================

#[derive(Serialize)]
struct HealthResponse {
    status: String,
    version: String,
}

async fn health_check() -> impl IntoResponse {
    Json(HealthResponse {
        status: "ok".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
    })
}

async fn status(State(state): State<AppState>) -> Response {
    lifecycle_response(&state.manager, Ok(()))
}

async fn initialize(State(state): State<AppState>) -> Response {
    let result = state.manager.initialize().await;
    lifecycle_response(&state.manager, result)
}

async fn set_mode(State(state): State<AppState>, Json(request): Json<ModeRequest>) -> Response {
    let result = state.manager.set_detector_mode(request.mode).await;
    lifecycle_response(&state.manager, result)
}

async fn anonymize(State(state): State<AppState>, Json(request): Json<TextRequest>) -> Response {
    match state.manager.anonymize(&request.text).await {
        Ok(outcome) => Json(AnonymizeResponse {
            success: true,
            anonymized_text: outcome.anonymized_text,
            entity_count: outcome.entity_count,
        })
        .into_response(),
        Err(err) => failure(err),
    }
}

async fn deanonymize(State(state): State<AppState>, Json(request): Json<TextRequest>) -> Response {
    match state.manager.deanonymize(&request.text).await {
        Ok(text) => Json(DeanonymizeResponse {
            success: true,
            text,
        })
        .into_response(),
        Err(err) => failure(err),
    }
}

async fn session_info(State(state): State<AppState>) -> impl IntoResponse {
    let stats = state.manager.session_stats().await;
    Json(SessionResponse {
        success: true,
        active: stats.is_some(),
        stats,
    })
}

async fn clear_session(State(state): State<AppState>) -> impl IntoResponse {
    state.manager.clear_session().await;
    Json(serde_json::json!({"success": true}))
}

// =============================================================================
// CORS
// =============================================================================

fn build_cors(origins: &[String]) -> CorsLayer {
    let cors = CorsLayer::new()
        .allow_methods([
            Method::GET,
            Method::POST,
            Method::PUT,
            Method::DELETE,
            Method::OPTIONS,
        ])
        .allow_headers([header::CONTENT_TYPE, header::ACCEPT]);

    if origins.is_empty() {
        cors.allow_origin(Any)
    } else {
        let parsed: Vec<_> = origins
            .iter()
            .filter_map(|o| o.parse().ok())
            .collect();
        cors.allow_origin(parsed)
    }
}
