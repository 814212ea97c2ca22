//! In-memory backend for gateway unit tests.

use super::Gateway;
use crate::config::{AuthConfig, Config, DatabaseConfig, LimitsConfig, PoolConfig};
use crate::database::{
    ConnectionGate, GateStatus, QueryResult, Row, SqlBackend, SqlSession, Statement,
};
use crate::error::GatewayError;
use async_trait::async_trait;
use serde_json::Value;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::OwnedSemaphorePermit;

type Responder = dyn Fn(&Statement) -> Result<QueryResult, GatewayError> + Send + Sync;

/// Records every acquire and statement; answers with a closure.
#[derive(Clone)]
pub struct FakeBackend {
    inner: Arc<Inner>,
}

struct Inner {
    responder: Box<Responder>,
    reachable: bool,
    delay: Duration,
    gate: ConnectionGate,
    acquires: AtomicUsize,
    peak_in_use: AtomicUsize,
    statements: Mutex<Vec<Statement>>,
}

pub const FAKE_GATE_SIZE: usize = 4;

impl FakeBackend {
    pub fn new<F>(responder: F) -> Self
    where
        F: Fn(&Statement) -> Result<QueryResult, GatewayError> + Send + Sync + 'static,
    {
        Self::build(Box::new(responder), true, Duration::ZERO)
    }

    pub fn empty() -> Self {
        Self::new(|_| Ok(QueryResult::empty()))
    }

    pub fn unreachable() -> Self {
        Self::build(Box::new(|_| Ok(QueryResult::empty())), false, Duration::ZERO)
    }

    pub fn slow<F>(delay: Duration, responder: F) -> Self
    where
        F: Fn(&Statement) -> Result<QueryResult, GatewayError> + Send + Sync + 'static,
    {
        Self::build(Box::new(responder), true, delay)
    }

    fn build(responder: Box<Responder>, reachable: bool, delay: Duration) -> Self {
        Self {
            inner: Arc::new(Inner {
                responder,
                reachable,
                delay,
                gate: ConnectionGate::new(FAKE_GATE_SIZE),
                acquires: AtomicUsize::new(0),
                peak_in_use: AtomicUsize::new(0),
                statements: Mutex::new(Vec::new()),
            }),
        }
    }

    pub fn acquires(&self) -> usize {
        self.inner.acquires.load(Ordering::SeqCst)
    }

    pub fn peak_in_use(&self) -> usize {
        self.inner.peak_in_use.load(Ordering::SeqCst)
    }

    pub fn statements(&self) -> Vec<Statement> {
        self.inner.statements.lock().unwrap().clone()
    }

    pub fn last_statement(&self) -> Statement {
        self.statements().pop().expect("no statement was executed")
    }
}

#[async_trait]
impl SqlBackend for FakeBackend {
    async fn acquire(&self) -> Result<Box<dyn SqlSession>, GatewayError> {
        if !self.inner.reachable {
            return Err(GatewayError::connectivity("Connection refused"));
        }
        let permit = self.inner.gate.acquire(Duration::from_secs(5)).await?;
        self.inner.acquires.fetch_add(1, Ordering::SeqCst);
        self.inner
            .peak_in_use
            .fetch_max(self.inner.gate.status().in_use, Ordering::SeqCst);
        Ok(Box::new(FakeSession {
            backend: self.clone(),
            _permit: permit,
        }))
    }

    fn gate_status(&self) -> GateStatus {
        self.inner.gate.status()
    }
}

struct FakeSession {
    backend: FakeBackend,
    _permit: OwnedSemaphorePermit,
}

#[async_trait]
impl SqlSession for FakeSession {
    async fn query(&mut self, statement: &Statement) -> Result<QueryResult, GatewayError> {
        self.backend
            .inner
            .statements
            .lock()
            .unwrap()
            .push(statement.clone());
        if !self.backend.inner.delay.is_zero() {
            tokio::time::sleep(self.backend.inner.delay).await;
        }
        (self.backend.inner.responder)(statement)
    }
}

pub fn test_config() -> Config {
    Config {
        database: DatabaseConfig {
            host: "localhost".to_string(),
            port: 1433,
            database: "Northwind".to_string(),
            auth: AuthConfig::SqlServer {
                username: "sa".to_string(),
                password: "secret".to_string(),
            },
            pool: PoolConfig {
                max_connections: FAKE_GATE_SIZE,
                ..PoolConfig::default()
            },
            encrypt: false,
            trust_server_certificate: true,
            application_name: "azure-sql-mcp-test".to_string(),
        },
        limits: LimitsConfig::default(),
    }
}

pub fn gateway_with(backend: FakeBackend) -> Gateway {
    gateway_with_config(backend, test_config())
}

pub fn gateway_with_config(backend: FakeBackend, config: Config) -> Gateway {
    Gateway::new(Arc::new(config), Arc::new(backend))
}

/// Build a row from a JSON object literal.
pub fn row(value: Value) -> Row {
    value.as_object().cloned().unwrap_or_default()
}

/// Result with the given rows and no column metadata.
pub fn rows(values: Vec<Value>) -> QueryResult {
    QueryResult::from_rows(Vec::new(), values.into_iter().map(row).collect())
}
