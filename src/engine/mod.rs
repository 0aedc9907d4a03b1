//! Seam between the orchestration layer and the external site-analysis
//! engine.
//!
//! The engine is consumed through three traits that mirror its lifecycle:
//! an [`EngineFactory`] constructs one [`Engine`] per request from the
//! normalized [`EngineOptions`], the engine is initialised and opens a
//! [`Site`], and the site produces the analysis result.  `destroy` releases
//! whatever the engine acquired; the session layer guarantees it runs.

use async_trait::async_trait;
use serde_json::{Map, Value};

use crate::options::{EngineOptions, StorageSeed};

pub mod remote;

pub use self::remote::RemoteEngineFactory;

/// Failure reported by the engine during construction, `init`, `open`,
/// `analyze` or `destroy`.  Only the message survives; it is what callers
/// see in the `message` field of a failed analysis.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{message}")]
pub struct EngineError {
    message: String,
}

impl EngineError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }

    pub fn message(&self) -> &str {
        &self.message
    }
}

impl From<reqwest::Error> for EngineError {
    fn from(err: reqwest::Error) -> Self {
        Self::new(err.to_string())
    }
}

/// Builds engine instances.  Construction may fail, in which case nothing
/// was acquired and no `destroy` follows.
#[async_trait]
pub trait EngineFactory: Send + Sync {
    async fn construct(&self, options: &EngineOptions) -> Result<Box<dyn Engine>, EngineError>;
}

/// One engine instance, owned by a single request.
#[async_trait]
pub trait Engine: Send {
    async fn init(&mut self) -> Result<(), EngineError>;

    async fn open(
        &mut self,
        url: &str,
        headers: &Map<String, Value>,
        storage: &StorageSeed,
    ) -> Result<Box<dyn Site>, EngineError>;

    /// Release engine resources.  Must tolerate being called after a failed
    /// `init` or `open`.
    async fn destroy(&mut self) -> Result<(), EngineError>;
}

/// A page opened by an engine, ready to be analysed.
#[async_trait]
pub trait Site: Send {
    async fn analyze(&mut self) -> Result<Value, EngineError>;
}
