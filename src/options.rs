//! Option normalization.
//!
//! Callers may send any subset of the analysis options.  Normalization
//! substitutes a default for every absent or falsy field and otherwise
//! forwards the caller's value exactly as supplied: type and range checks
//! belong to the engine, not to this layer.

use serde::Serialize;
use serde_json::{json, Map, Value};

/// User agent presented by the engine for every analysis.
pub const DEFAULT_USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/91.0.4472.124 Safari/537.36";
pub const DEFAULT_DELAY_MS: u64 = 500;
pub const DEFAULT_MAX_URLS: u64 = 1;
pub const DEFAULT_MAX_WAIT_MS: u64 = 10_000;

/// Complete engine configuration.  Every field except the two HTML limits
/// always carries a value; the limits stay absent unless supplied so the
/// engine can apply its own defaults.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct EngineOptions {
    pub debug: Value,
    pub delay: Value,
    pub max_urls: Value,
    pub max_wait: Value,
    pub recursive: Value,
    pub probe: Value,
    pub user_agent: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub html_max_cols: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub html_max_rows: Option<Value>,
    pub no_scripts: Value,
    pub no_redirect: Value,
}

impl Default for EngineOptions {
    fn default() -> Self {
        Self::from_raw(&Map::new())
    }
}

impl EngineOptions {
    fn from_raw(raw: &Map<String, Value>) -> Self {
        Self {
            debug: or_default(raw, "debug", json!(false)),
            delay: or_default(raw, "delay", json!(DEFAULT_DELAY_MS)),
            max_urls: or_default(raw, "maxUrls", json!(DEFAULT_MAX_URLS)),
            max_wait: or_default(raw, "maxWait", json!(DEFAULT_MAX_WAIT_MS)),
            recursive: or_default(raw, "recursive", json!(false)),
            probe: or_default(raw, "probe", json!(false)),
            user_agent: DEFAULT_USER_AGENT.to_string(),
            html_max_cols: raw.get("htmlMaxCols").cloned(),
            html_max_rows: raw.get("htmlMaxRows").cloned(),
            no_scripts: or_default(raw, "noScripts", json!(false)),
            no_redirect: or_default(raw, "noRedirect", json!(false)),
        }
    }
}

/// Initial browser storage handed to the engine when it opens the page.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct StorageSeed {
    pub local: Map<String, Value>,
    pub session: Map<String, Value>,
}

/// Everything the session layer needs besides the URL.
#[derive(Debug, Clone, PartialEq)]
pub struct NormalizedOptions {
    pub engine: EngineOptions,
    pub headers: Map<String, Value>,
    pub storage: StorageSeed,
}

/// Merge raw caller options with defaults.
pub fn normalize(raw: &Map<String, Value>) -> NormalizedOptions {
    NormalizedOptions {
        engine: EngineOptions::from_raw(raw),
        headers: object_or_empty(raw, "headers"),
        storage: StorageSeed {
            local: object_or_empty(raw, "localStorage"),
            session: object_or_empty(raw, "sessionStorage"),
        },
    }
}

/// JavaScript truthiness over JSON values: `null`, `false`, zero and the
/// empty string are falsy, everything else (including empty containers) is
/// truthy.
pub fn is_truthy(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64().map(|f| f != 0.0).unwrap_or(true),
        Value::String(s) => !s.is_empty(),
        Value::Array(_) | Value::Object(_) => true,
    }
}

fn or_default(raw: &Map<String, Value>, key: &str, default: Value) -> Value {
    match raw.get(key) {
        Some(v) if is_truthy(v) => v.clone(),
        _ => default,
    }
}

fn object_or_empty(raw: &Map<String, Value>, key: &str) -> Map<String, Value> {
    match raw.get(key) {
        Some(Value::Object(map)) => map.clone(),
        Some(other) if is_truthy(other) => {
            tracing::debug!(option = key, "ignoring non-object option value");
            Map::new()
        }
        _ => Map::new(),
    }
}
