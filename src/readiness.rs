//! Server readiness shared between the HTTP handlers and the shutdown path.

use std::sync::Arc;
use tokio::sync::watch;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReadinessState {
    /// Listener not bound yet.
    Starting,
    Accepting,
    /// Terminal: new work is rejected while in-flight work completes.
    Draining,
}

/// Cloneable handle onto the process readiness.  Transitions only move
/// forward (`Starting -> Accepting -> Draining`, or straight to
/// `Draining`), so readers never need a lock.
#[derive(Clone, Debug)]
pub struct ServerReadiness {
    tx: Arc<watch::Sender<ReadinessState>>,
}

impl Default for ServerReadiness {
    fn default() -> Self {
        Self::new()
    }
}

impl ServerReadiness {
    pub fn new() -> Self {
        let (tx, _rx) = watch::channel(ReadinessState::Starting);
        Self { tx: Arc::new(tx) }
    }

    /// Readiness for a server that is already listening.
    pub fn accepting() -> Self {
        let readiness = Self::new();
        readiness.mark_listening();
        readiness
    }

    pub fn state(&self) -> ReadinessState {
        *self.tx.borrow()
    }

    pub fn is_accepting(&self) -> bool {
        self.state() == ReadinessState::Accepting
    }

    pub fn is_draining(&self) -> bool {
        self.state() == ReadinessState::Draining
    }

    /// `Starting -> Accepting`.  Returns false if draining already began.
    pub fn mark_listening(&self) -> bool {
        self.tx.send_if_modified(|state| {
            if *state == ReadinessState::Starting {
                *state = ReadinessState::Accepting;
                true
            } else {
                false
            }
        })
    }

    /// Enter `Draining`.  Returns true only for the call that made the
    /// transition.
    pub fn begin_draining(&self) -> bool {
        self.tx.send_if_modified(|state| {
            if *state == ReadinessState::Draining {
                false
            } else {
                *state = ReadinessState::Draining;
                true
            }
        })
    }

    /// Resolves once draining has begun.
    pub async fn drained(&self) {
        let mut rx = self.tx.subscribe();
        // The sender lives as long as `self`, so this cannot observe a close.
        let _ = rx.wait_for(|state| *state == ReadinessState::Draining).await;
    }
}
