//! Graceful shutdown: SIGTERM or SIGINT moves the server into draining,
//! the listener closes after the configured grace period, and `serve`
//! returns once every in-flight request has been answered and every engine
//! session released.

use std::time::Duration;
use tokio::net::TcpListener;
use tokio::signal;

use crate::config::{DEFAULT_DRAIN_GRACE_MS, DEFAULT_RELEASE_TIMEOUT_MS};
use crate::readiness::ServerReadiness;
use crate::{app, AppConfig, AppState};

/// Resolves on the first SIGINT (Ctrl+C) or, on Unix, SIGTERM.
pub async fn termination_signal() {
    let ctrl_c = async {
        if let Err(err) = signal::ctrl_c().await {
            tracing::warn!(error = %err, "failed to listen for SIGINT");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(err) => {
                tracing::warn!(error = %err, "failed to listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}

/// Flip `readiness` to draining when a termination signal arrives.
pub fn spawn_signal_listener(readiness: ServerReadiness) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        termination_signal().await;
        if readiness.begin_draining() {
            tracing::info!("shutdown signal received; draining in-flight requests");
        }
    })
}

/// Timings that bound how long shutdown may take.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DrainSettings {
    /// How long the listener stays open after draining begins.
    pub grace: Duration,
    /// How long to wait, once every connection is closed, for engine
    /// sessions abandoned by cancelled requests to be released.
    pub release_timeout: Duration,
}

impl DrainSettings {
    pub fn from_config(config: &AppConfig) -> Self {
        Self {
            grace: Duration::from_millis(config.drain_grace_ms),
            release_timeout: Duration::from_millis(config.release_timeout_ms),
        }
    }
}

impl Default for DrainSettings {
    fn default() -> Self {
        Self {
            grace: Duration::from_millis(DEFAULT_DRAIN_GRACE_MS),
            release_timeout: Duration::from_millis(DEFAULT_RELEASE_TIMEOUT_MS),
        }
    }
}

/// Serve the application built from `state` on `listener` until its
/// readiness starts draining.  During the grace period the listener stays
/// open so probes observe the 503; after it the listener closes, in-flight
/// requests run to completion, and `serve` returns only once every engine
/// session has been released (or `release_timeout` has passed).
pub async fn serve(
    listener: TcpListener,
    state: AppState,
    drain: DrainSettings,
) -> std::io::Result<()> {
    let readiness = state.readiness.clone();
    let metrics = state.metrics.clone();
    if readiness.mark_listening() {
        if let Ok(addr) = listener.local_addr() {
            tracing::info!(%addr, "accepting requests");
        }
    }
    let grace = drain.grace;
    axum::serve(listener, app(state))
        .with_graceful_shutdown(async move {
            readiness.drained().await;
            if !grace.is_zero() {
                tokio::time::sleep(grace).await;
            }
            tracing::info!("listener closed; waiting for in-flight requests");
        })
        .await?;
    tracing::info!("all in-flight requests completed");

    match tokio::time::timeout(drain.release_timeout, metrics.sessions_idle()).await {
        Ok(()) => tracing::info!("all engine sessions released"),
        Err(_) => tracing::warn!(
            live = metrics.in_flight(),
            "engine sessions still live after release timeout"
        ),
    }
    Ok(())
}
