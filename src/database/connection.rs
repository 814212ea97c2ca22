//! Bounded, timed connection acquisition for SQL Server.
//!
//! Every invocation gets its own connection. A semaphore caps how many are
//! open at once; the [`Lease`] returned by [`MssqlBackend`] owns both the
//! permit and the client, so dropping it on any exit path closes the
//! connection and frees the slot.

use super::auth::create_connection;
use super::query::{run_statement, QueryResult, RawConnection, Statement};
use super::{GateStatus, SqlBackend, SqlSession};
use crate::config::DatabaseConfig;
use crate::error::GatewayError;
use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{OwnedSemaphorePermit, Semaphore};
use tracing::{debug, warn};

/// Semaphore-backed limit on concurrently open connections.
#[derive(Debug, Clone)]
pub struct ConnectionGate {
    semaphore: Arc<Semaphore>,
    max: usize,
}

impl ConnectionGate {
    pub fn new(max: usize) -> Self {
        Self {
            semaphore: Arc::new(Semaphore::new(max)),
            max,
        }
    }

    /// Wait up to `timeout` for a free slot.
    pub async fn acquire(
        &self,
        timeout: Duration,
    ) -> Result<OwnedSemaphorePermit, GatewayError> {
        match tokio::time::timeout(timeout, self.semaphore.clone().acquire_owned()).await {
            Ok(Ok(permit)) => Ok(permit),
            Ok(Err(_closed)) => Err(GatewayError::connectivity("Connection gate is closed")),
            Err(_elapsed) => Err(GatewayError::connectivity(format!(
                "Timed out after {:?} waiting for a free connection ({} in use)",
                timeout, self.max
            ))),
        }
    }

    pub fn status(&self) -> GateStatus {
        GateStatus {
            in_use: self.max - self.semaphore.available_permits(),
            max: self.max,
        }
    }
}

/// SQL Server backend: opens a fresh connection per session.
pub struct MssqlBackend {
    config: Arc<DatabaseConfig>,
    gate: ConnectionGate,
}

impl MssqlBackend {
    pub fn new(config: Arc<DatabaseConfig>) -> Self {
        let gate = ConnectionGate::new(config.pool.max_connections);
        Self { config, gate }
    }
}

#[async_trait]
impl SqlBackend for MssqlBackend {
    async fn acquire(&self) -> Result<Box<dyn SqlSession>, GatewayError> {
        let permit = self.gate.acquire(self.config.pool.acquire_timeout).await?;

        let connect_timeout = self.config.pool.connect_timeout;
        let client = match tokio::time::timeout(connect_timeout, create_connection(&self.config))
            .await
        {
            Ok(result) => result?,
            Err(_elapsed) => {
                warn!(
                    host = %self.config.host,
                    port = self.config.port,
                    timeout = ?connect_timeout,
                    "Connect timed out"
                );
                return Err(GatewayError::connectivity(format!(
                    "Timed out after {:?} connecting to the database server",
                    connect_timeout
                )));
            }
        };

        debug!(in_use = self.gate.status().in_use, "Connection leased");

        Ok(Box::new(Lease {
            client,
            _permit: permit,
        }))
    }

    fn gate_status(&self) -> GateStatus {
        self.gate.status()
    }
}

/// One leased connection plus its gate permit.
pub struct Lease {
    client: RawConnection,
    _permit: OwnedSemaphorePermit,
}

#[async_trait]
impl SqlSession for Lease {
    async fn query(&mut self, statement: &Statement) -> Result<QueryResult, GatewayError> {
        run_statement(&mut self.client, statement).await
    }
}

/// Runs every statement of a session under a deadline.
///
/// A statement that overruns drops the wrapped session mid-flight, which
/// closes its connection and frees the gate slot; later statements on the
/// same session fail fast.
pub struct TimedSession {
    inner: Option<Box<dyn SqlSession>>,
    timeout: Duration,
}

impl TimedSession {
    pub fn new(inner: Box<dyn SqlSession>, timeout: Duration) -> Self {
        Self {
            inner: Some(inner),
            timeout,
        }
    }
}

#[async_trait]
impl SqlSession for TimedSession {
    async fn query(&mut self, statement: &Statement) -> Result<QueryResult, GatewayError> {
        let session = self
            .inner
            .as_mut()
            .ok_or_else(|| GatewayError::connectivity("Connection was closed after a timeout"))?;

        match tokio::time::timeout(self.timeout, session.query(statement)).await {
            Ok(result) => result,
            Err(_elapsed) => {
                warn!(timeout = ?self.timeout, "Statement timed out; dropping connection");
                self.inner = None;
                Err(GatewayError::timeout(self.timeout))
            }
        }
    }
}
