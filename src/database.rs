//! Database connectivity and query execution.
//!
//! The gateway talks to the database only through [`SqlBackend`] and
//! [`SqlSession`], so tests can substitute an in-memory backend.

mod auth;
mod connection;
mod query;
pub mod types;

pub use auth::{create_base_config, create_connection};
pub use connection::{ConnectionGate, Lease, MssqlBackend, TimedSession};
pub use query::{ColumnInfo, QueryResult, Row, SqlParam, Statement};
pub use types::TypeMapper;

use crate::error::GatewayError;
use async_trait::async_trait;
use serde::Serialize;

/// Connection gate occupancy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct GateStatus {
    pub in_use: usize,
    pub max: usize,
}

/// Source of database sessions.
#[async_trait]
pub trait SqlBackend: Send + Sync {
    /// Acquire a session bound to its own connection.
    async fn acquire(&self) -> Result<Box<dyn SqlSession>, GatewayError>;

    fn gate_status(&self) -> GateStatus;
}

/// A connection held for the duration of one invocation.
#[async_trait]
pub trait SqlSession: Send {
    async fn query(&mut self, statement: &Statement) -> Result<QueryResult, GatewayError>;
}
