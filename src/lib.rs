//! Core library for Cultivate.  This module wires together request
//! validation, option normalization, the per-request engine session and the
//! HTTP handlers.  The analysis engine itself sits behind the traits in
//! [`engine`].

mod config;
pub mod engine;
pub mod error;
pub mod metrics;
pub mod openapi;
pub mod options;
pub mod readiness;
pub mod session;
pub mod shutdown;
pub mod validate;

pub use config::AppConfig;

use axum::body::Bytes;
use axum::extract::{rejection::BytesRejection, DefaultBodyLimit, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::routing::{get, post};
use axum::{Json, Router};
use serde_json::{Map, Value};
use std::sync::Arc;
use std::time::Instant;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

use crate::engine::{EngineFactory, RemoteEngineFactory};
use crate::error::ApiError;
use crate::metrics::{Metrics, Outcome};
use crate::readiness::{ReadinessState, ServerReadiness};
use crate::session::SessionManager;

/// Application state shared across handlers.
#[derive(Clone)]
pub struct AppState {
    pub sessions: SessionManager,
    pub readiness: ServerReadiness,
    pub metrics: Metrics,
    /// Maximum accepted request body size in bytes (None => axum default)
    pub max_request_bytes: Option<usize>,
}

impl AppState {
    pub fn new(factory: Arc<dyn EngineFactory>, readiness: ServerReadiness) -> Self {
        let metrics = Metrics::new();
        Self {
            sessions: SessionManager::new(factory, metrics.clone()),
            readiness,
            metrics,
            max_request_bytes: None,
        }
    }

    pub fn with_max_request_bytes(mut self, limit: Option<usize>) -> Self {
        self.max_request_bytes = limit;
        self
    }
}

/// Build state for the remote engine described by `config`.
pub fn build_state(config: &AppConfig, readiness: ServerReadiness) -> anyhow::Result<AppState> {
    if config.engine_url.is_none() {
        tracing::warn!("CULTIVATE_ENGINE_URL not set; every analysis will fail");
    }
    let factory = RemoteEngineFactory::new(
        config.engine_url.as_deref(),
        config.engine_token.clone(),
        config.engine_timeout_ms,
    )?;
    Ok(AppState::new(Arc::new(factory), readiness).with_max_request_bytes(config.max_request_bytes))
}

/// Build the Axum router and attach handlers.
pub fn app(state: AppState) -> Router {
    let max_request_bytes = state.max_request_bytes;

    let router = Router::new()
        .route("/", get(root_handler))
        .route("/health", get(health_handler))
        .route("/analyze", post(analyze_handler))
        .route("/metrics", get(metrics_handler))
        .route(openapi::DOCUMENT_PATH, get(openapi::document_handler))
        .route("/swagger-ui", get(openapi::swagger_ui_handler));

    let router = if let Some(limit) = max_request_bytes {
        router.layer(DefaultBodyLimit::max(limit))
    } else {
        router
    };

    router
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}

async fn root_handler() -> axum::response::Response {
    let json = serde_json::json!({ "message": "Welcome to the Cultivate API" });
    (StatusCode::OK, Json(json)).into_response()
}

/// Readiness probe: 200 only while accepting new work.
async fn health_handler(State(state): State<AppState>) -> axum::response::Response {
    let message = match state.readiness.state() {
        ReadinessState::Accepting => {
            return (StatusCode::OK, Json(serde_json::json!({ "status": "OK" }))).into_response();
        }
        ReadinessState::Starting => "Server is starting",
        ReadinessState::Draining => "Server is shutting down",
    };
    let json = serde_json::json!({ "status": "Service Unavailable", "message": message });
    (StatusCode::SERVICE_UNAVAILABLE, Json(json)).into_response()
}

/// Handler for `/analyze`.  Validates the body, normalizes the options and
/// runs one engine session, answering with the engine's result verbatim.
async fn analyze_handler(
    State(state): State<AppState>,
    body: Result<Bytes, BytesRejection>,
) -> axum::response::Response {
    let start = Instant::now();
    let outcome = analyze(&state, body).await;
    let latency = start.elapsed();
    match outcome {
        Ok(result) => {
            tracing::debug!(latency_ms = latency.as_millis() as u64, "analyze request served");
            state.metrics.observe(Outcome::Success, latency);
            (StatusCode::OK, Json(result)).into_response()
        }
        Err(err) => {
            state.metrics.observe(err.outcome(), latency);
            err.into_response()
        }
    }
}

async fn analyze(state: &AppState, body: Result<Bytes, BytesRejection>) -> Result<Value, ApiError> {
    if state.readiness.is_draining() {
        return Err(ApiError::Draining);
    }
    let body = body?;
    // An empty body reads as an empty object so it reports the missing URL.
    let payload: Value = if body.is_empty() {
        Value::Object(Map::new())
    } else {
        serde_json::from_slice(&body).map_err(|e| ApiError::InvalidJson(e.to_string()))?
    };

    let request = validate::validate(&payload)?;
    let opts = options::normalize(&request.options);

    let result = state.sessions.run(&request.url, &opts).await.map_err(|err| {
        tracing::error!(url = %request.url, error = %err, "analysis failed");
        ApiError::Analysis(err)
    })?;
    tracing::info!(url = %request.url, "analysis completed");
    Ok(result)
}

/// Prometheus-style metrics exposition.
async fn metrics_handler(State(state): State<AppState>) -> axum::response::Response {
    (
        StatusCode::OK,
        [(
            axum::http::header::CONTENT_TYPE,
            "text/plain; version=0.0.4",
        )],
        state.metrics.render(),
    )
        .into_response()
}
