//! Per-request engine session lifecycle.
//!
//! [`SessionManager::run`] constructs one engine, drives `init`, `open` and
//! `analyze` strictly in sequence, then destroys the engine.  The engine
//! lives inside an `AnalysisSession` whose `Drop` schedules `destroy` on
//! the runtime if the request future is cancelled before the explicit close,
//! so release happens exactly once on every exit path.

use serde_json::{Map, Value};
use std::sync::Arc;

use crate::engine::{Engine, EngineError, EngineFactory};
use crate::metrics::{InFlightGuard, Metrics};
use crate::options::{NormalizedOptions, StorageSeed};

#[derive(Clone)]
pub struct SessionManager {
    factory: Arc<dyn EngineFactory>,
    metrics: Metrics,
}

impl SessionManager {
    pub fn new(factory: Arc<dyn EngineFactory>, metrics: Metrics) -> Self {
        Self { factory, metrics }
    }

    /// Run one complete analysis.  The engine failure, if any, is returned
    /// only after cleanup has finished; a cleanup failure never replaces it.
    pub async fn run(&self, url: &str, options: &NormalizedOptions) -> Result<Value, EngineError> {
        let engine = self.factory.construct(&options.engine).await?;
        let mut session = AnalysisSession::new(engine, self.metrics.clone());
        let outcome = session.drive(url, &options.headers, &options.storage).await;
        session.close().await;
        outcome
    }
}

/// Exclusive owner of one engine instance.
struct AnalysisSession {
    engine: Option<Box<dyn Engine>>,
    metrics: Metrics,
    live: Option<InFlightGuard>,
}

impl AnalysisSession {
    fn new(engine: Box<dyn Engine>, metrics: Metrics) -> Self {
        let live = metrics.session_started();
        Self {
            engine: Some(engine),
            metrics,
            live: Some(live),
        }
    }

    async fn drive(
        &mut self,
        url: &str,
        headers: &Map<String, Value>,
        storage: &StorageSeed,
    ) -> Result<Value, EngineError> {
        let engine = self
            .engine
            .as_mut()
            .ok_or_else(|| EngineError::new("analysis session already closed"))?;
        engine.init().await?;
        tracing::debug!(url, "engine initialised");
        let mut site = engine.open(url, headers, storage).await?;
        tracing::debug!(url, "site opened");
        site.analyze().await
    }

    async fn close(mut self) {
        if let Some(engine) = self.engine.take() {
            release(engine, &self.metrics).await;
        }
    }
}

impl Drop for AnalysisSession {
    fn drop(&mut self) {
        let Some(engine) = self.engine.take() else {
            return;
        };
        match tokio::runtime::Handle::try_current() {
            Ok(handle) => {
                tracing::debug!("analysis abandoned; releasing engine in background");
                let metrics = self.metrics.clone();
                let live = self.live.take();
                handle.spawn(async move {
                    release(engine, &metrics).await;
                    drop(live);
                });
            }
            Err(_) => {
                tracing::warn!("no runtime available to release abandoned engine session");
            }
        }
    }
}

async fn release(mut engine: Box<dyn Engine>, metrics: &Metrics) {
    if let Err(err) = engine.destroy().await {
        metrics.cleanup_failed();
        tracing::warn!(error = %err, "engine cleanup failed");
    }
}
