//! Shutdown orchestration.
//!
//! `Running -> Draining -> Stopped`. An interrupt moves the server to
//! `Draining`: the acceptor is paused and new requests are refused while
//! in-flight ones finish. The server stops gracefully once idle, or forcibly
//! when the drain deadline passes, in which case operators are notified.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use reviews_core::ports::Notifier;
use tokio::sync::watch;

use super::InFlightTracker;

/// How the server reached `Stopped`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopReason {
    /// Every in-flight request finished before the deadline.
    Drained,
    /// The deadline passed and remaining connections were closed.
    Forced,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ServerPhase {
    Running,
    Draining,
    Stopped(StopReason),
}

#[derive(Debug, thiserror::Error)]
pub enum ShutdownError {
    #[error("Drain deadline of {deadline:?} exceeded with {in_flight} request(s) in flight")]
    DeadlineExceeded { deadline: Duration, in_flight: usize },
}

/// The parts of a running HTTP server the orchestrator drives.
#[async_trait]
pub trait ServerControl: Send + Sync {
    /// Stop accepting new connections.
    async fn pause(&self);

    /// Stop the server. `graceful = false` closes open connections at once.
    async fn stop(&self, graceful: bool);
}

#[async_trait]
impl ServerControl for actix_web::dev::ServerHandle {
    async fn pause(&self) {
        actix_web::dev::ServerHandle::pause(self).await
    }

    async fn stop(&self, graceful: bool) {
        actix_web::dev::ServerHandle::stop(self, graceful).await
    }
}

/// Resolves on the first interrupt (Ctrl+C / SIGINT).
pub async fn wait_for_interrupt() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "Failed to listen for interrupt, shutting down");
        return;
    }
    tracing::info!("Shutdown signal received");
}

pub struct ShutdownOrchestrator {
    phase: watch::Sender<ServerPhase>,
    in_flight: InFlightTracker,
    deadline: Duration,
    notifier: Arc<dyn Notifier>,
}

impl ShutdownOrchestrator {
    pub fn new(in_flight: InFlightTracker, deadline: Duration, notifier: Arc<dyn Notifier>) -> Self {
        let (phase, _) = watch::channel(ServerPhase::Running);
        Self {
            phase,
            in_flight,
            deadline,
            notifier,
        }
    }

    pub fn phase(&self) -> ServerPhase {
        *self.phase.borrow()
    }

    pub fn subscribe(&self) -> watch::Receiver<ServerPhase> {
        self.phase.subscribe()
    }

    /// Wait for `signal`, then drain and stop `server`.
    pub async fn run<F>(&self, signal: F, server: &dyn ServerControl) -> Result<StopReason, ShutdownError>
    where
        F: Future<Output = ()>,
    {
        signal.await;
        self.drain(server).await
    }

    /// Drain in-flight requests and stop `server`, within the deadline.
    pub async fn drain(&self, server: &dyn ServerControl) -> Result<StopReason, ShutdownError> {
        if self.phase() != ServerPhase::Running {
            tracing::debug!(phase = ?self.phase(), "Shutdown already in progress");
            return Ok(StopReason::Drained);
        }

        self.phase.send_replace(ServerPhase::Draining);
        self.in_flight.start_draining();
        server.pause().await;
        tracing::info!(
            in_flight = self.in_flight.count(),
            deadline = ?self.deadline,
            "Draining in-flight requests"
        );

        let drained = tokio::time::timeout(self.deadline, self.in_flight.wait_idle())
            .await
            .is_ok();

        if drained {
            server.stop(true).await;
            self.phase.send_replace(ServerPhase::Stopped(StopReason::Drained));
            tracing::info!("Server stopped gracefully");
            return Ok(StopReason::Drained);
        }

        let in_flight = self.in_flight.count();
        server.stop(false).await;
        self.phase.send_replace(ServerPhase::Stopped(StopReason::Forced));

        let error = ShutdownError::DeadlineExceeded {
            deadline: self.deadline,
            in_flight,
        };
        tracing::error!(error = %error, "Server forced to shutdown");

        if let Err(e) = self
            .notifier
            .notify(&format!("Server forced to shutdown: {error}"))
            .await
        {
            tracing::error!(error = %e, "Failed to deliver shutdown notification");
        }

        Err(error)
    }
}
