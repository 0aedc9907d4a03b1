use serde_json::{json, Map, Value};
use std::time::Duration;

use super::{Engine, EngineError, EngineFactory, Site};
use crate::options::{EngineOptions, StorageSeed};

/// Builds [`RemoteEngine`] instances that drive an analysis engine running
/// as a separate HTTP service.  Every engine shares one pooled client.
pub struct RemoteEngineFactory {
    base_url: Option<String>,
    bearer_token: Option<String>,
    client: reqwest::Client,
}

impl RemoteEngineFactory {
    /// `base_url` of `None` yields a factory whose `construct` always fails,
    /// so requests are answered with an analysis failure instead of the
    /// process refusing to start.
    pub fn new(
        base_url: Option<&str>,
        bearer_token: Option<String>,
        timeout_ms: u64,
    ) -> anyhow::Result<Self> {
        let base_url = match base_url {
            Some(raw) => {
                let parsed = url::Url::parse(raw)
                    .map_err(|e| anyhow::anyhow!("invalid engine URL '{}': {}", raw, e))?;
                Some(parsed.as_str().trim_end_matches('/').to_string())
            }
            None => None,
        };
        let client = reqwest::Client::builder()
            .timeout(Duration::from_millis(timeout_ms))
            .build()?;
        Ok(Self {
            base_url,
            bearer_token,
            client,
        })
    }
}

#[async_trait::async_trait]
impl EngineFactory for RemoteEngineFactory {
    async fn construct(&self, options: &EngineOptions) -> Result<Box<dyn Engine>, EngineError> {
        let base_url = self.base_url.clone().ok_or_else(|| {
            EngineError::new("analysis engine endpoint not configured (set CULTIVATE_ENGINE_URL)")
        })?;
        Ok(Box::new(RemoteEngine {
            client: self.client.clone(),
            base_url,
            bearer_token: self.bearer_token.clone(),
            options: options.clone(),
            session_id: None,
        }))
    }
}

/// Engine instance backed by one remote session.  The session exists from a
/// successful `init` until `destroy`.
pub struct RemoteEngine {
    client: reqwest::Client,
    base_url: String,
    bearer_token: Option<String>,
    options: EngineOptions,
    session_id: Option<String>,
}

impl RemoteEngine {
    fn session_url(&self, id: &str, action: Option<&str>) -> String {
        match action {
            Some(action) => format!("{}/sessions/{}/{}", self.base_url, id, action),
            None => format!("{}/sessions/{}", self.base_url, id),
        }
    }

    fn authorize(&self, rb: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        authorize(rb, self.bearer_token.as_deref())
    }
}

#[async_trait::async_trait]
impl Engine for RemoteEngine {
    async fn init(&mut self) -> Result<(), EngineError> {
        let url = format!("{}/sessions", self.base_url);
        let rb = self.authorize(self.client.post(&url).json(&self.options));
        let resp = ensure_success(rb.send().await?).await?;
        let body: Value = resp.json().await?;
        let id = match body.get("id") {
            Some(Value::String(s)) => s.clone(),
            Some(Value::Number(n)) => n.to_string(),
            _ => return Err(EngineError::new("engine did not return a session id")),
        };
        tracing::debug!(session = %id, "remote engine session created");
        self.session_id = Some(id);
        Ok(())
    }

    async fn open(
        &mut self,
        url: &str,
        headers: &Map<String, Value>,
        storage: &StorageSeed,
    ) -> Result<Box<dyn Site>, EngineError> {
        let id = self
            .session_id
            .as_deref()
            .ok_or_else(|| EngineError::new("engine session not initialised"))?;
        let body = json!({
            "url": url,
            "headers": headers,
            "storage": storage,
        });
        let rb = self.authorize(self.client.post(self.session_url(id, Some("open"))).json(&body));
        ensure_success(rb.send().await?).await?;
        Ok(Box::new(RemoteSite {
            client: self.client.clone(),
            analyze_url: self.session_url(id, Some("analyze")),
            bearer_token: self.bearer_token.clone(),
        }))
    }

    async fn destroy(&mut self) -> Result<(), EngineError> {
        // Nothing to release when init never produced a session.
        let Some(id) = self.session_id.take() else {
            return Ok(());
        };
        let rb = self.authorize(self.client.delete(self.session_url(&id, None)));
        ensure_success(rb.send().await?).await?;
        tracing::debug!(session = %id, "remote engine session destroyed");
        Ok(())
    }
}

struct RemoteSite {
    client: reqwest::Client,
    analyze_url: String,
    bearer_token: Option<String>,
}

#[async_trait::async_trait]
impl Site for RemoteSite {
    async fn analyze(&mut self) -> Result<Value, EngineError> {
        let rb = authorize(
            self.client.post(&self.analyze_url),
            self.bearer_token.as_deref(),
        );
        let resp = ensure_success(rb.send().await?).await?;
        let text = resp.text().await?;
        serde_json::from_str(&text)
            .map_err(|e| EngineError::new(format!("engine returned malformed result: {}", e)))
    }
}

/// Attach the configured bearer token, if any.
fn authorize(rb: reqwest::RequestBuilder, token: Option<&str>) -> reqwest::RequestBuilder {
    match token {
        Some(tok) => rb.bearer_auth(tok),
        None => rb,
    }
}

async fn ensure_success(resp: reqwest::Response) -> Result<reqwest::Response, EngineError> {
    let status = resp.status();
    if status.is_success() {
        return Ok(resp);
    }
    let body: Option<Value> = resp.json().await.ok();
    Err(EngineError::new(failure_message(status.as_u16(), body.as_ref())))
}

fn failure_message(status: u16, body: Option<&Value>) -> String {
    body.and_then(|v| v.get("message").or_else(|| v.get("error")))
        .and_then(Value::as_str)
        .map(str::to_owned)
        .unwrap_or_else(|| format!("engine responded with status {}", status))
}
