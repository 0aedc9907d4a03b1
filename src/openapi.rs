//! Machine-readable API description and the page that renders it.
//!
//! The document is assembled here from the same constants the handlers and
//! the option normalizer use, so handlers carry no documentation
//! annotations of their own.

use axum::response::{Html, IntoResponse};
use axum::Json;
use serde_json::{json, Value};

use crate::options::{DEFAULT_DELAY_MS, DEFAULT_MAX_URLS, DEFAULT_MAX_WAIT_MS, DEFAULT_USER_AGENT};

pub const DOCUMENT_PATH: &str = "/openapi.json";

fn error_schema() -> Value {
    json!({
        "type": "object",
        "required": ["error"],
        "properties": {
            "error": {"type": "string"},
            "message": {"type": "string"}
        }
    })
}

fn options_schema() -> Value {
    let map = json!({"type": "object", "additionalProperties": {"type": "string"}});
    json!({
        "type": "object",
        "description": "Analysis options. Absent or falsy fields take their default.",
        "properties": {
            "debug": {"type": "boolean", "default": false},
            "delay": {"type": "integer", "default": DEFAULT_DELAY_MS},
            "maxUrls": {"type": "integer", "default": DEFAULT_MAX_URLS},
            "maxWait": {"type": "integer", "default": DEFAULT_MAX_WAIT_MS},
            "recursive": {"type": "boolean", "default": false},
            "probe": {"type": "boolean", "default": false},
            "htmlMaxCols": {"type": "integer"},
            "htmlMaxRows": {"type": "integer"},
            "noScripts": {"type": "boolean", "default": false},
            "noRedirect": {"type": "boolean", "default": false},
            "headers": map.clone(),
            "localStorage": map.clone(),
            "sessionStorage": map
        }
    })
}

fn json_content(schema: Value) -> Value {
    json!({"application/json": {"schema": schema}})
}

fn root_path() -> Value {
    let greeting = json!({"type": "object", "properties": {"message": {"type": "string"}}});
    json!({
        "get": {
            "summary": "Welcome message",
            "responses": {"200": {"description": "Greeting", "content": json_content(greeting)}}
        }
    })
}

fn health_path() -> Value {
    let status = json!({
        "type": "object",
        "properties": {"status": {"type": "string"}, "message": {"type": "string"}}
    });
    json!({
        "get": {
            "summary": "Readiness probe",
            "responses": {
                "200": {"description": "Accepting requests", "content": json_content(status.clone())},
                "503": {"description": "Starting or shutting down", "content": json_content(status)}
            }
        }
    })
}

fn analyze_path() -> Value {
    let request = json!({
        "type": "object",
        "required": ["url"],
        "properties": {
            "url": {"type": "string", "format": "uri", "example": "https://example.com"},
            "options": options_schema()
        }
    });
    let error = |description: &str| json!({"description": description, "content": json_content(error_schema())});
    json!({
        "post": {
            "summary": "Detect the technologies used by a website",
            "requestBody": {"required": true, "content": json_content(request)},
            "responses": {
                "200": {
                    "description": "Analysis result as produced by the engine",
                    "content": json_content(json!({"type": "object"}))
                },
                "400": error("Missing or malformed URL"),
                "413": error("Request body too large"),
                "500": error("Analysis failed"),
                "503": error("Server is shutting down")
            }
        }
    })
}

/// OpenAPI 3 description of the public routes.
pub fn document() -> Value {
    let description = format!(
        "Website technology fingerprinting. Analyses run with user agent `{}`.",
        DEFAULT_USER_AGENT
    );
    json!({
        "openapi": "3.0.3",
        "info": {
            "title": "Cultivate API",
            "version": env!("CARGO_PKG_VERSION"),
            "description": description
        },
        "paths": {
            "/": root_path(),
            "/health": health_path(),
            "/analyze": analyze_path(),
            "/metrics": {
                "get": {
                    "summary": "Prometheus metrics",
                    "responses": {"200": {"description": "Text exposition format"}}
                }
            }
        }
    })
}

pub async fn document_handler() -> impl IntoResponse {
    Json(document())
}

pub async fn swagger_ui_handler() -> impl IntoResponse {
    Html(format!(
        r##"<!DOCTYPE html>
<html lang="en">
<head>
  <meta charset="utf-8">
  <title>Cultivate API</title>
  <link rel="stylesheet" href="https://unpkg.com/swagger-ui-dist@5/swagger-ui.css">
</head>
<body>
  <div id="swagger-ui"></div>
  <script src="https://unpkg.com/swagger-ui-dist@5/swagger-ui-bundle.js"></script>
  <script>window.ui = SwaggerUIBundle({{ url: "{}", dom_id: "#swagger-ui" }});</script>
</body>
</html>
"##,
        DOCUMENT_PATH
    ))
}
