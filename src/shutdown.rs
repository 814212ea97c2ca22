//! Graceful shutdown handling with invocation draining.
//!
//! This module provides:
//! - Signal handling (SIGTERM, SIGINT, SIGHUP, Ctrl+C)
//! - Draining of in-flight gateway invocations with a configurable timeout
//!
//! Connections are per-invocation leases, so once the drain finishes there
//! is nothing left to close.

use crate::config::env_parse;
use crate::constants::{DEFAULT_DRAIN_TIMEOUT, DEFAULT_DRAIN_TIMEOUT_SECS};
use crate::error::ConfigError;
use crate::gateway::Gateway;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tracing::{error, info, warn};

/// How often the drain loop re-checks the in-flight gauge.
const DRAIN_POLL_INTERVAL: Duration = Duration::from_millis(500);

/// Shutdown signal that can be awaited.
#[derive(Clone)]
pub struct ShutdownSignal {
    receiver: watch::Receiver<bool>,
}

impl ShutdownSignal {
    /// Wait for the shutdown signal.
    pub async fn recv(&mut self) {
        let _ = self.receiver.wait_for(|&v| v).await;
    }

    /// Check if shutdown has been signaled without blocking.
    pub fn is_shutdown(&self) -> bool {
        *self.receiver.borrow()
    }
}

/// Controller for managing graceful shutdown.
pub struct ShutdownController {
    /// Sender to notify all listeners of shutdown.
    sender: watch::Sender<bool>,

    /// Flag indicating shutdown in progress.
    shutting_down: Arc<AtomicBool>,

    /// Drain timeout duration.
    drain_timeout: Duration,
}

impl ShutdownController {
    /// Create a new shutdown controller with the default drain timeout.
    pub fn new() -> Self {
        Self::with_drain_timeout(DEFAULT_DRAIN_TIMEOUT)
    }

    pub fn with_drain_timeout(drain_timeout: Duration) -> Self {
        let (sender, _) = watch::channel(false);

        Self {
            sender,
            shutting_down: Arc::new(AtomicBool::new(false)),
            drain_timeout,
        }
    }

    /// Get a shutdown signal receiver.
    pub fn signal(&self) -> ShutdownSignal {
        ShutdownSignal {
            receiver: self.sender.subscribe(),
        }
    }

    /// Check if shutdown is in progress.
    pub fn is_shutting_down(&self) -> bool {
        self.shutting_down.load(Ordering::SeqCst)
    }

    /// Initiate shutdown. Idempotent.
    pub fn shutdown(&self) {
        if self
            .shutting_down
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_ok()
        {
            info!("Initiating graceful shutdown...");
            let _ = self.sender.send(true);
        }
    }

    /// Signal shutdown, then wait (up to the drain timeout) for in-flight
    /// invocations to finish.
    pub async fn graceful_shutdown(&self, gateway: &Gateway) {
        self.shutdown();

        info!(in_flight = gateway.in_flight(), "Draining invocations");
        self.drain_invocations(gateway).await;

        info!("Graceful shutdown complete");
    }

    async fn drain_invocations(&self, gateway: &Gateway) {
        let start = std::time::Instant::now();

        loop {
            let in_flight = gateway.in_flight();

            if in_flight == 0 {
                info!("All invocations drained");
                break;
            }

            if start.elapsed() > self.drain_timeout {
                warn!(
                    "Drain timeout exceeded with {} invocations still running",
                    in_flight
                );
                break;
            }

            info!("Waiting for {} in-flight invocations to complete...", in_flight);
            tokio::time::sleep(DRAIN_POLL_INTERVAL).await;
        }
    }

    pub fn drain_timeout(&self) -> Duration {
        self.drain_timeout
    }
}

impl Default for ShutdownController {
    fn default() -> Self {
        Self::new()
    }
}

/// Shared shutdown controller type.
pub type SharedShutdownController = Arc<ShutdownController>;

pub fn new_shutdown_controller(config: &ShutdownConfig) -> SharedShutdownController {
    Arc::new(ShutdownController::with_drain_timeout(config.drain_timeout))
}

/// Install signal handlers for graceful shutdown.
///
/// This sets up handlers for:
/// - SIGINT (Ctrl+C)
/// - SIGTERM and SIGHUP (Unix)
///
/// When a signal is received, the shutdown controller is triggered.
pub async fn install_signal_handlers(controller: SharedShutdownController) {
    let ctrl_c_controller = controller.clone();

    tokio::spawn(async move {
        match tokio::signal::ctrl_c().await {
            Ok(()) => {
                info!("Received Ctrl+C, initiating shutdown...");
                ctrl_c_controller.shutdown();
            }
            Err(e) => {
                error!("Failed to listen for Ctrl+C signal: {}", e);
            }
        }
    });

    #[cfg(unix)]
    {
        let term_controller = controller.clone();
        tokio::spawn(async move {
            match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
                Ok(mut sigterm) => {
                    sigterm.recv().await;
                    info!("Received SIGTERM, initiating shutdown...");
                    term_controller.shutdown();
                }
                Err(e) => {
                    error!("Failed to install SIGTERM handler: {}", e);
                }
            }
        });
    }

    // MCP clients close stdio and may send SIGHUP when they exit
    #[cfg(unix)]
    {
        let hup_controller = controller;
        tokio::spawn(async move {
            match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::hangup()) {
                Ok(mut sighup) => {
                    sighup.recv().await;
                    info!("Received SIGHUP, initiating shutdown...");
                    hup_controller.shutdown();
                }
                Err(e) => {
                    error!("Failed to install SIGHUP handler: {}", e);
                }
            }
        });
    }
}

/// Shutdown configuration.
#[derive(Debug, Clone)]
pub struct ShutdownConfig {
    /// Timeout for draining in-flight invocations.
    pub drain_timeout: Duration,
}

impl Default for ShutdownConfig {
    fn default() -> Self {
        Self {
            drain_timeout: DEFAULT_DRAIN_TIMEOUT,
        }
    }
}

impl ShutdownConfig {
    /// Load from `GATEWAY_SHUTDOWN_DRAIN_TIMEOUT` (seconds).
    pub fn from_env() -> Result<Self, ConfigError> {
        let secs = env_parse("GATEWAY_SHUTDOWN_DRAIN_TIMEOUT", DEFAULT_DRAIN_TIMEOUT_SECS)?;
        Ok(Self {
            drain_timeout: Duration::from_secs(secs),
        })
    }
}
