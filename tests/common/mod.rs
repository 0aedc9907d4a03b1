#![allow(dead_code)]

use async_trait::async_trait;
use axum::body::Body;
use axum::http::{Request, StatusCode};
use axum::Router;
use cultivate::engine::{Engine, EngineError, EngineFactory, Site};
use cultivate::options::{EngineOptions, StorageSeed};
use cultivate::readiness::ServerReadiness;
use cultivate::{app, AppState};
use http_body_util::BodyExt;
use serde_json::{Map, Value};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::Notify;
use tower::ServiceExt; // for oneshot

/// Lifecycle step of the mock engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Construct,
    Init,
    Open,
    Analyze,
    Destroy,
}

/// Everything the mock engine saw, shared with the test.
#[derive(Default)]
pub struct Calls {
    pub constructed: AtomicUsize,
    pub destroyed: AtomicUsize,
    pub released: AtomicUsize,
    pub log: Mutex<Vec<Stage>>,
    pub options: Mutex<Option<EngineOptions>>,
    pub opened: Mutex<Option<(String, Map<String, Value>, StorageSeed)>>,
}

impl Calls {
    pub fn constructed(&self) -> usize {
        self.constructed.load(Ordering::SeqCst)
    }

    pub fn destroyed(&self) -> usize {
        self.destroyed.load(Ordering::SeqCst)
    }

    /// Destroy calls that ran to completion.
    pub fn released(&self) -> usize {
        self.released.load(Ordering::SeqCst)
    }

    pub fn log(&self) -> Vec<Stage> {
        self.log.lock().unwrap().clone()
    }

    fn record(&self, stage: Stage) {
        self.log.lock().unwrap().push(stage);
    }
}

#[derive(Clone)]
struct Script {
    result: Value,
    failures: Vec<(Stage, String)>,
    gate: Option<Arc<Notify>>,
    destroy_delay: Option<Duration>,
}

impl Script {
    fn failure(&self, stage: Stage) -> Result<(), EngineError> {
        match self.failures.iter().find(|(s, _)| *s == stage) {
            Some((_, message)) => Err(EngineError::new(message.clone())),
            None => Ok(()),
        }
    }
}

/// Engine factory whose engines follow a script and count their calls.
pub struct MockFactory {
    pub calls: Arc<Calls>,
    script: Script,
}

impl MockFactory {
    pub fn returning(result: Value) -> Self {
        Self {
            calls: Arc::new(Calls::default()),
            script: Script {
                result,
                failures: Vec::new(),
                gate: None,
                destroy_delay: None,
            },
        }
    }

    pub fn failing(mut self, stage: Stage, message: &str) -> Self {
        self.script.failures.push((stage, message.to_string()));
        self
    }

    /// `analyze` waits for a notification on `gate` before returning.
    pub fn gated(mut self, gate: Arc<Notify>) -> Self {
        self.script.gate = Some(gate);
        self
    }

    /// `destroy` takes `delay` before it completes.
    pub fn slow_destroy(mut self, delay: Duration) -> Self {
        self.script.destroy_delay = Some(delay);
        self
    }
}

#[async_trait]
impl EngineFactory for MockFactory {
    async fn construct(&self, options: &EngineOptions) -> Result<Box<dyn Engine>, EngineError> {
        self.calls.record(Stage::Construct);
        self.script.failure(Stage::Construct)?;
        self.calls.constructed.fetch_add(1, Ordering::SeqCst);
        *self.calls.options.lock().unwrap() = Some(options.clone());
        Ok(Box::new(MockEngine {
            calls: self.calls.clone(),
            script: self.script.clone(),
        }))
    }
}

struct MockEngine {
    calls: Arc<Calls>,
    script: Script,
}

#[async_trait]
impl Engine for MockEngine {
    async fn init(&mut self) -> Result<(), EngineError> {
        self.calls.record(Stage::Init);
        tokio::task::yield_now().await;
        self.script.failure(Stage::Init)
    }

    async fn open(
        &mut self,
        url: &str,
        headers: &Map<String, Value>,
        storage: &StorageSeed,
    ) -> Result<Box<dyn Site>, EngineError> {
        self.calls.record(Stage::Open);
        *self.calls.opened.lock().unwrap() =
            Some((url.to_string(), headers.clone(), storage.clone()));
        self.script.failure(Stage::Open)?;
        Ok(Box::new(MockSite {
            calls: self.calls.clone(),
            script: self.script.clone(),
        }))
    }

    async fn destroy(&mut self) -> Result<(), EngineError> {
        self.calls.record(Stage::Destroy);
        self.calls.destroyed.fetch_add(1, Ordering::SeqCst);
        if let Some(delay) = self.script.destroy_delay {
            tokio::time::sleep(delay).await;
        }
        self.calls.released.fetch_add(1, Ordering::SeqCst);
        self.script.failure(Stage::Destroy)
    }
}

struct MockSite {
    calls: Arc<Calls>,
    script: Script,
}

#[async_trait]
impl Site for MockSite {
    async fn analyze(&mut self) -> Result<Value, EngineError> {
        self.calls.record(Stage::Analyze);
        if let Some(gate) = &self.script.gate {
            gate.notified().await;
        }
        self.script.failure(Stage::Analyze)?;
        Ok(self.script.result.clone())
    }
}

/// State around `factory` with a server that is already accepting.
pub fn state_with(factory: MockFactory) -> (AppState, Arc<Calls>) {
    let calls = factory.calls.clone();
    let state = AppState::new(Arc::new(factory), ServerReadiness::accepting());
    (state, calls)
}

pub fn router_with(factory: MockFactory) -> (Router, Arc<Calls>) {
    let (state, calls) = state_with(factory);
    (app(state), calls)
}

pub async fn send(router: Router, request: Request<Body>) -> (StatusCode, Value) {
    let response = router.oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    let body = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap_or_else(|_| {
            Value::String(String::from_utf8_lossy(&bytes).into_owned())
        })
    };
    (status, body)
}

pub async fn post_analyze(router: Router, body: Value) -> (StatusCode, Value) {
    let request = Request::builder()
        .method("POST")
        .uri("/analyze")
        .header("content-type", "application/json")
        .body(Body::from(body.to_string()))
        .unwrap();
    send(router, request).await
}

pub async fn get(router: Router, path: &str) -> (StatusCode, Value) {
    let request = Request::builder()
        .method("GET")
        .uri(path)
        .body(Body::empty())
        .unwrap();
    send(router, request).await
}
