//! Shutdown coordination.

use std::fmt;

use tokio::sync::broadcast;

/// What asked the daemon to stop.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShutdownReason {
    Interrupt,
    Terminate,
    /// Triggered from code, e.g. by an embedding application.
    Requested,
}

impl fmt::Display for ShutdownReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            ShutdownReason::Interrupt => "SIGINT",
            ShutdownReason::Terminate => "SIGTERM",
            ShutdownReason::Requested => "requested",
        })
    }
}

/// Broadcast handle shared by everything that waits for shutdown.
///
/// Clones share one channel. Only the first trigger is delivered to a
/// waiter; later ones are dropped.
#[derive(Debug, Clone)]
pub struct Shutdown {
    tx: broadcast::Sender<ShutdownReason>,
}

impl Shutdown {
    pub fn new() -> Self {
        let (tx, _) = broadcast::channel(1);
        Self { tx }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<ShutdownReason> {
        self.tx.subscribe()
    }

    pub fn trigger(&self, reason: ShutdownReason) {
        if self.tx.send(reason).is_err() {
            tracing::debug!(%reason, "Shutdown triggered with no waiters");
        }
    }

    /// Resolve with the reason of the next trigger. A closed channel counts
    /// as [`ShutdownReason::Requested`].
    pub async fn wait(mut rx: broadcast::Receiver<ShutdownReason>) -> ShutdownReason {
        match rx.recv().await {
            Ok(reason) => reason,
            Err(_) => ShutdownReason::Requested,
        }
    }
}

impl Default for Shutdown {
    fn default() -> Self {
        Self::new()
    }
}
