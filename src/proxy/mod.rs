//! Model download proxy
//!
//! Fetches model assets server-side so browser clients can download them
//! without hitting cross-origin failures on the hub's CDN redirects:
//! - GET|OPTIONS /api/models/*path — forward to the XET bridge origin
//! - GET|OPTIONS /api/hf-proxy?url= — fetch a hub URL, following redirects

pub mod rewrite;

use crate::config::ProxyConfig;
use axum::{
    body::Body,
    extract::{Path, Query, RawQuery, State},
    http::{header, HeaderMap, HeaderValue, StatusCode},
    response::{IntoResponse, Response},
    routing::get,
    Json, Router,
};
use serde::Deserialize;
use std::sync::Arc;

const ALLOW_METHODS: &str = "GET, OPTIONS";
const ALLOW_HEADERS: &str = "Range, Content-Type";
const EXPOSE_HEADERS: &str = "Content-Length, Content-Range, Accept-Ranges";
const PREFLIGHT_MAX_AGE: &str = "86400";

/// Shared state for proxy handlers
#[derive(Clone)]
pub struct ProxyState {
    config: Arc<ProxyConfig>,
    client: reqwest::Client,
}

impl ProxyState {
    pub fn new(config: ProxyConfig) -> Self {
        Self::with_client(config, reqwest::Client::new())
    }

    /// Use a preconfigured HTTP client
    pub fn with_client(config: ProxyConfig, client: reqwest::Client) -> Self {
        Self {
            config: Arc::new(config),
            client,
        }
    }
}

/// Create the proxy router
pub fn model_proxy_router(state: ProxyState) -> Router {
    Router::new()
        .route("/api/models/*path", get(proxy_model).options(preflight))
        .route("/api/hf-proxy", get(proxy_hub).options(preflight_hub))
        .with_state(state)
}

/// Which proxy route is serving a request
#[derive(Debug, Clone, Copy)]
enum Upstream {
    Bridge,
    Hub,
}

impl Upstream {
    fn rejected(self, reason: &str) -> String {
        match self {
            Self::Bridge => format!("Failed to fetch model: {}", reason),
            Self::Hub => format!("Failed to fetch from HuggingFace: {}", reason),
        }
    }

    fn failed(self, err: &reqwest::Error) -> String {
        match self {
            Self::Bridge => format!("Failed to proxy model download: {}", err),
            Self::Hub => format!("Failed to proxy HuggingFace request: {}", err),
        }
    }
}

/// Error response carrying the CORS allow-origin header
#[derive(Debug)]
struct ProxyError {
    status: StatusCode,
    message: String,
}

impl ProxyError {
    fn bad_request(message: impl Into<String>) -> Self {
        Self {
            status: StatusCode::BAD_REQUEST,
            message: message.into(),
        }
    }
}

impl IntoResponse for ProxyError {
    fn into_response(self) -> Response {
        let code = match self.status {
            StatusCode::BAD_REQUEST => "BAD_REQUEST",
            s if s.is_server_error() => "PROXY_ERROR",
            _ => "UPSTREAM_ERROR",
        };
        let body = serde_json::json!({"error": {"code": code, "message": self.message}});
        (
            self.status,
            [(header::ACCESS_CONTROL_ALLOW_ORIGIN, "*")],
            Json(body),
        )
            .into_response()
    }
}

#[derive(Debug, Deserialize)]
struct HubQuery {
    url: Option<String>,
}

async fn preflight() -> impl IntoResponse {
    (
        StatusCode::OK,
        [
            (header::ACCESS_CONTROL_ALLOW_ORIGIN, "*"),
            (header::ACCESS_CONTROL_ALLOW_METHODS, ALLOW_METHODS),
            (header::ACCESS_CONTROL_ALLOW_HEADERS, ALLOW_HEADERS),
            (header::ACCESS_CONTROL_MAX_AGE, PREFLIGHT_MAX_AGE),
        ],
    )
}

async fn preflight_hub(
    State(state): State<ProxyState>,
    Query(query): Query<HubQuery>,
) -> Result<impl IntoResponse, ProxyError> {
    validate_hub_url(&state.config, query.url.as_deref())?;
    Ok(preflight().await)
}

async fn proxy_model(
    State(state): State<ProxyState>,
    Path(path): Path<String>,
    RawQuery(query): RawQuery,
    headers: HeaderMap,
) -> Result<Response, ProxyError> {
    let base = state.config.origin_base.trim_end_matches('/');
    let url = match query.filter(|q| !q.is_empty()) {
        Some(q) => format!("{}/{}?{}", base, path, q),
        None => format!("{}/{}", base, path),
    };
    forward(&state, &url, &headers, Upstream::Bridge).await
}

async fn proxy_hub(
    State(state): State<ProxyState>,
    Query(query): Query<HubQuery>,
    headers: HeaderMap,
) -> Result<Response, ProxyError> {
    let url = validate_hub_url(&state.config, query.url.as_deref())?;
    forward(&state, url, &headers, Upstream::Hub).await
}

fn validate_hub_url<'a>(config: &ProxyConfig, url: Option<&'a str>) -> Result<&'a str, ProxyError> {
    let url = url
        .filter(|u| !u.is_empty())
        .ok_or_else(|| ProxyError::bad_request("URL parameter is required"))?;

    let allowed = reqwest::Url::parse(url)
        .ok()
        .and_then(|u| u.host_str().map(|h| rewrite::is_hub_host(h, &config.allowed_host)))
        .unwrap_or(false);
    if !allowed {
        return Err(ProxyError::bad_request(format!(
            "Only {} URLs are allowed",
            config.allowed_host
        )));
    }
    Ok(url)
}

/// Fetch `url` upstream and stream the response back.
///
/// Never logs query strings; signed CDN URLs carry credentials.
async fn forward(
    state: &ProxyState,
    url: &str,
    headers: &HeaderMap,
    upstream: Upstream,
) -> Result<Response, ProxyError> {
    let range = headers.get(header::RANGE).and_then(|v| v.to_str().ok());

    let mut request = state
        .client
        .get(url)
        .header("User-Agent", state.config.user_agent.as_str());
    if let Some(range) = range {
        request = request.header("Range", range);
    }

    let response = request.send().await.map_err(|e| {
        let e = e.without_url();
        tracing::error!(?upstream, error = %e, "Model proxy request failed");
        ProxyError {
            status: StatusCode::INTERNAL_SERVER_ERROR,
            message: upstream.failed(&e),
        }
    })?;

    let status = response.status();
    if !status.is_success() && status.as_u16() != 206 {
        tracing::warn!(?upstream, status = status.as_u16(), "Upstream rejected model request");
        return Err(ProxyError {
            status: StatusCode::from_u16(status.as_u16()).unwrap_or(StatusCode::BAD_GATEWAY),
            message: upstream.rejected(status.canonical_reason().unwrap_or("Unknown status")),
        });
    }

    let upstream_header = |name: &str| {
        response
            .headers()
            .get(name)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| HeaderValue::from_str(v).ok())
    };
    let content_type = upstream_header("content-type")
        .unwrap_or_else(|| HeaderValue::from_static("application/octet-stream"));
    let passthrough = [
        (header::CONTENT_LENGTH, upstream_header("content-length")),
        (header::ACCEPT_RANGES, upstream_header("accept-ranges")),
        (header::CONTENT_RANGE, upstream_header("content-range")),
    ];

    let status = if status.as_u16() == 206 {
        StatusCode::PARTIAL_CONTENT
    } else {
        StatusCode::OK
    };

    let mut builder = Response::builder()
        .status(status)
        .header(header::CONTENT_TYPE, content_type)
        .header(header::ACCESS_CONTROL_ALLOW_ORIGIN, "*")
        .header(header::ACCESS_CONTROL_ALLOW_METHODS, ALLOW_METHODS)
        .header(header::ACCESS_CONTROL_ALLOW_HEADERS, ALLOW_HEADERS)
        .header(header::ACCESS_CONTROL_EXPOSE_HEADERS, EXPOSE_HEADERS);
    for (name, value) in passthrough {
        if let Some(value) = value {
            builder = builder.header(name, value);
        }
    }

    builder
        .body(Body::from_stream(response.bytes_stream()))
        .map_err(|e| ProxyError {
            status: StatusCode::INTERNAL_SERVER_ERROR,
            message: format!("Failed to build proxy response: {}", e),
        })
}
