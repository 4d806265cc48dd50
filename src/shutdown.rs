//! Graceful shutdown handling.
//!
//! A [`ShutdownCoordinator`] fans a single shutdown signal out to every
//! pipeline worker. In-flight ticks drain within a bounded grace period;
//! whatever remains afterwards is aborted by the caller.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tracing::info;

/// Grace period granted to in-flight ticks before forced termination.
const DEFAULT_GRACE_PERIOD: Duration = Duration::from_secs(5);

/// Coordinates graceful termination across pipeline tasks.
#[derive(Clone)]
pub struct ShutdownCoordinator {
    tx: Arc<watch::Sender<bool>>,
    rx: watch::Receiver<bool>,
    triggered: Arc<AtomicBool>,
    grace: Duration,
}

impl ShutdownCoordinator {
    pub fn new() -> Self {
        Self::with_grace_period(DEFAULT_GRACE_PERIOD)
    }

    pub fn with_grace_period(grace: Duration) -> Self {
        let (tx, rx) = watch::channel(false);
        Self {
            tx: Arc::new(tx),
            rx,
            triggered: Arc::new(AtomicBool::new(false)),
            grace,
        }
    }

    /// Signal shutdown. Idempotent.
    pub fn trigger(&self) {
        if self
            .triggered
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_ok()
        {
            info!("shutdown initiated");
            let _ = self.tx.send(true);
        }
    }

    /// Whether shutdown has been signalled.
    pub fn is_triggered(&self) -> bool {
        self.triggered.load(Ordering::SeqCst)
    }

    /// A watch receiver for use inside `select!` loops.
    pub fn watch(&self) -> watch::Receiver<bool> {
        self.rx.clone()
    }

    /// Wait until shutdown is signalled.
    pub async fn wait(&self) {
        let mut rx = self.rx.clone();
        while !*rx.borrow() {
            if rx.changed().await.is_err() {
                break;
            }
        }
    }

    /// Bounded drain window for in-flight work.
    pub fn grace_period(&self) -> Duration {
        self.grace
    }
}

impl Default for ShutdownCoordinator {
    fn default() -> Self {
        Self::new()
    }
}

/// Listen for SIGINT/SIGTERM and trigger the coordinator.
pub async fn listen_for_signals(coordinator: ShutdownCoordinator) {
    let ctrl_c = async {
        let _ = tokio::signal::ctrl_c().await;
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(_) => std::future::pending::<()>().await,
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => info!("received interrupt"),
        _ = terminate => info!("received terminate"),
    }

    coordinator.trigger();
}
