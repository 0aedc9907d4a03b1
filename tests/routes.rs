#[path = "common/mod.rs"]
mod common;

use axum::body::Body;
use axum::http::{Request, StatusCode};
use common::{get, post_analyze, state_with, MockFactory, Stage};
use cultivate::readiness::ServerReadiness;
use cultivate::{app, AppState};
use http_body_util::BodyExt;
use serde_json::json;
use std::sync::Arc;
use tower::ServiceExt;

#[tokio::test]
async fn root_greets() {
    let (state, _) = state_with(MockFactory::returning(json!({})));
    let (status, body) = get(app(state), "/").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, json!({"message": "Welcome to the Cultivate API"}));
}

#[tokio::test]
async fn health_follows_readiness() {
    let factory = Arc::new(MockFactory::returning(json!({})));
    let readiness = ServerReadiness::new();
    let state = AppState::new(factory, readiness.clone());

    let (status, body) = get(app(state.clone()), "/health").await;
    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
    assert_eq!(body["status"], json!("Service Unavailable"));
    assert_eq!(body["message"], json!("Server is starting"));

    readiness.mark_listening();
    let (status, body) = get(app(state.clone()), "/health").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, json!({"status": "OK"}));

    readiness.begin_draining();
    let (status, body) = get(app(state), "/health").await;
    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
    assert_eq!(body["message"], json!("Server is shutting down"));
}

#[tokio::test]
async fn analyze_is_refused_while_draining() {
    let (state, calls) = state_with(MockFactory::returning(json!({})));
    state.readiness.begin_draining();
    let (status, body) = post_analyze(app(state), json!({"url": "https://example.com"})).await;
    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
    assert_eq!(body["error"], json!("Service Unavailable"));
    assert_eq!(calls.constructed(), 0);
}

#[tokio::test]
async fn metrics_reflect_outcomes() {
    let factory = MockFactory::returning(json!({})).failing(Stage::Analyze, "timeout");
    let (state, _) = state_with(factory);
    post_analyze(app(state.clone()), json!({"url": "https://example.com"})).await;
    post_analyze(app(state.clone()), json!({"url": "nope"})).await;

    let request = Request::builder().uri("/metrics").body(Body::empty()).unwrap();
    let response = app(state).oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let text = String::from_utf8(
        response.into_body().collect().await.unwrap().to_bytes().to_vec(),
    )
    .unwrap();
    assert!(text.contains("cultivate_requests_total 2"));
    assert!(text.contains("cultivate_outcomes_total{outcome=\"engine_failure\"} 1"));
    assert!(text.contains("cultivate_outcomes_total{outcome=\"invalid_input\"} 1"));
    assert!(text.contains("cultivate_sessions_total 1"));
    assert!(text.contains("cultivate_sessions_in_flight 0"));
}

#[tokio::test]
async fn api_description_is_served() {
    let (state, _) = state_with(MockFactory::returning(json!({})));
    let (status, doc) = get(app(state.clone()), "/openapi.json").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(doc["openapi"], json!("3.0.3"));
    assert!(doc["paths"]["/analyze"]["post"].is_object());

    let (status, page) = get(app(state), "/swagger-ui").await;
    assert_eq!(status, StatusCode::OK);
    assert!(page.as_str().unwrap().contains("/openapi.json"));
}

#[tokio::test]
async fn cors_preflight_is_allowed() {
    let (state, _) = state_with(MockFactory::returning(json!({})));
    let request = Request::builder()
        .method("OPTIONS")
        .uri("/analyze")
        .header("origin", "https://dashboard.example")
        .header("access-control-request-method", "POST")
        .body(Body::empty())
        .unwrap();
    let response = app(state).oneshot(request).await.unwrap();
    assert!(response.status().is_success());
    assert_eq!(
        response
            .headers()
            .get("access-control-allow-origin")
            .and_then(|v| v.to_str().ok()),
        Some("*")
    );
}
