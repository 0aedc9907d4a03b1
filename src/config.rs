use std::env;

use anyhow::{anyhow, Result};

pub const DEFAULT_PORT: u16 = 3000;
pub const DEFAULT_ENGINE_TIMEOUT_MS: u64 = 60_000;
/// Listener stays open this long after draining begins, so readiness probes
/// get a 503 instead of a refused connection.  Zero closes it at once.
pub const DEFAULT_DRAIN_GRACE_MS: u64 = 1_000;
/// Upper bound on waiting for engine sessions to be released at exit.
pub const DEFAULT_RELEASE_TIMEOUT_MS: u64 = 10_000;

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub port: u16,
    pub engine_url: Option<String>,
    pub engine_token: Option<String>,
    pub engine_timeout_ms: u64,
    pub max_request_bytes: Option<usize>,
    pub drain_grace_ms: u64,
    pub release_timeout_ms: u64,
}

impl AppConfig {
    pub fn from_env() -> Result<Self> {
        // Any unusable PORT falls back to the default rather than failing.
        let port = env::var("PORT")
            .ok()
            .and_then(|s| s.trim().parse::<u16>().ok())
            .filter(|p| *p != 0)
            .unwrap_or(DEFAULT_PORT);

        let engine_url = non_empty_var("CULTIVATE_ENGINE_URL");
        let engine_token = non_empty_var("CULTIVATE_ENGINE_TOKEN");
        let engine_timeout_ms =
            parse_optional_u64("CULTIVATE_ENGINE_TIMEOUT_MS")?.unwrap_or(DEFAULT_ENGINE_TIMEOUT_MS);
        let max_request_bytes =
            parse_optional_u64("CULTIVATE_MAX_REQUEST_BYTES")?.map(|v| v as usize);
        let drain_grace_ms =
            parse_optional_u64("CULTIVATE_DRAIN_GRACE_MS")?.unwrap_or(DEFAULT_DRAIN_GRACE_MS);
        let release_timeout_ms = parse_optional_u64("CULTIVATE_RELEASE_TIMEOUT_MS")?
            .unwrap_or(DEFAULT_RELEASE_TIMEOUT_MS);

        Ok(Self {
            port,
            engine_url,
            engine_token,
            engine_timeout_ms,
            max_request_bytes,
            drain_grace_ms,
            release_timeout_ms,
        })
    }
}

fn non_empty_var(var: &str) -> Option<String> {
    env::var(var)
        .ok()
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

fn parse_optional_u64(var: &str) -> Result<Option<u64>> {
    match env::var(var) {
        Ok(value) if !value.trim().is_empty() => value
            .trim()
            .parse::<u64>()
            .map(Some)
            .map_err(|_| anyhow!("{} must be a positive integer", var)),
        Ok(_) => Ok(None),
        Err(env::VarError::NotPresent) => Ok(None),
        Err(err) => Err(err.into()),
    }
}
