//! Query gateway: turns tool invocations into database statements.
//!
//! [`Gateway::invoke`] is the single boundary between the MCP layer and the
//! database. Every invocation yields exactly one [`InvocationOutcome`]: a
//! [`QueryResult`] or an [`ErrorResult`]. Arguments are validated before a
//! session is acquired; only existence checks go to the database.

mod adhoc;
mod analytics;
mod catalog;
mod explore;
mod invocation;
mod northwind;
mod suggestions;
#[cfg(test)]
pub(crate) mod testing;

pub use invocation::{
    AdvancedSearchArgs, Aggregate, AggregateFn, CustomAggregationArgs, CustomerOrdersArgs,
    DataProfilingArgs, EntityKind, Filter, FilterOp, HavingCondition, NoArgs, OrderArgs,
    PaginatedQueryArgs, ProductArgs, QueryArgs, RangeSearchArgs, SalesAnalyticsArgs,
    SalesGrouping, SampleDataArgs, SearchArgs, SearchEntitiesArgs, SuggestQueriesArgs,
    TableArgs, ToolInvocation, TOOL_NAMES,
};
pub use suggestions::suggest_queries;

use crate::config::{Config, LimitBound};
use crate::database::{
    ColumnInfo, GateStatus, MssqlBackend, QueryResult, SqlBackend, SqlSession, Statement,
    TimedSession,
};
use crate::error::{ErrorKind, GatewayError};
use crate::security::ReadOnlyGuard;
use crate::telemetry::{generate_short_correlation_id, GatewayMetrics, SharedMetrics};
use serde::Serialize;
use serde_json::{json, Map, Value};
use std::sync::Arc;
use std::time::Instant;
use tracing::{info, info_span, warn, Instrument};

/// Exactly one of these is produced per invocation.
pub type InvocationOutcome = Result<QueryResult, ErrorResult>;

/// Structured failure returned to the calling agent.
#[derive(Debug, Clone, Serialize)]
pub struct ErrorResult {
    pub error: ErrorDetail,
    pub invocation: ToolInvocation,
}

#[derive(Debug, Clone, Serialize)]
pub struct ErrorDetail {
    pub kind: ErrorKind,
    pub message: String,
    pub suggestion: &'static str,
    pub correlation_id: String,
}

impl ErrorResult {
    fn new(error: &GatewayError, invocation: ToolInvocation, correlation_id: String) -> Self {
        Self {
            error: ErrorDetail {
                kind: error.kind(),
                message: error.to_string(),
                suggestion: error.suggestion(),
                correlation_id,
            },
            invocation,
        }
    }

    pub fn kind(&self) -> ErrorKind {
        self.error.kind
    }

    pub fn message(&self) -> &str {
        &self.error.message
    }
}

/// The query gateway. Cheap to clone; all state is shared.
#[derive(Clone)]
pub struct Gateway {
    config: Arc<Config>,
    backend: Arc<dyn SqlBackend>,
    guard: ReadOnlyGuard,
    metrics: SharedMetrics,
}

impl Gateway {
    pub fn new(config: Arc<Config>, backend: Arc<dyn SqlBackend>) -> Self {
        let guard = ReadOnlyGuard::new(config.limits.max_query_length);
        Self {
            config,
            backend,
            guard,
            metrics: Arc::new(GatewayMetrics::new()),
        }
    }

    /// Gateway backed by a live SQL Server connection profile.
    pub fn with_mssql(config: Arc<Config>) -> Self {
        let backend = MssqlBackend::new(Arc::new(config.database.clone()));
        Self::new(config, Arc::new(backend))
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn metrics(&self) -> &SharedMetrics {
        &self.metrics
    }

    /// Invocations currently being served.
    pub fn in_flight(&self) -> usize {
        self.metrics.in_flight()
    }

    pub fn gate_status(&self) -> GateStatus {
        self.backend.gate_status()
    }

    /// Serve one invocation. Never panics on bad input and never leaks a
    /// raw error: every failure becomes an [`ErrorResult`].
    pub async fn invoke(&self, invocation: ToolInvocation) -> InvocationOutcome {
        let _in_flight = self.metrics.start_invocation();
        let correlation_id = generate_short_correlation_id();
        let tool = invocation.name();
        let start = Instant::now();

        let span = info_span!("invoke", tool, correlation_id = %correlation_id);
        let result = self.dispatch(&invocation).instrument(span).await;
        let elapsed = start.elapsed();

        match result {
            Ok(result) => {
                self.metrics.record(Ok(()), elapsed);
                info!(
                    tool,
                    correlation_id = %correlation_id,
                    rows = result.row_count,
                    elapsed_ms = elapsed.as_millis() as u64,
                    "Invocation succeeded"
                );
                Ok(result)
            }
            Err(error) => {
                let error = error.truncated(self.config.limits.error_message_length);
                self.metrics.record(Err(error.kind()), elapsed);
                warn!(
                    tool,
                    correlation_id = %correlation_id,
                    kind = %error.kind(),
                    elapsed_ms = elapsed.as_millis() as u64,
                    "Invocation failed: {}",
                    error
                );
                Err(ErrorResult::new(&error, invocation, correlation_id))
            }
        }
    }

    async fn dispatch(&self, invocation: &ToolInvocation) -> Result<QueryResult, GatewayError> {
        match invocation {
            ToolInvocation::ListTables(_) => self.list_tables().await,
            ToolInvocation::GetTableSchema(args) => self.get_table_schema(&args.table_name).await,
            ToolInvocation::GetSampleData(args) => {
                self.get_sample_data(&args.table_name, args.limit).await
            }
            ToolInvocation::SearchEntities(args) => {
                self.search_entities(&args.criteria, args.entity, args.limit)
                    .await
            }
            ToolInvocation::SearchCustomers(args) => {
                self.search_entities(&args.criteria, EntityKind::Customers, args.limit)
                    .await
            }
            ToolInvocation::SearchProducts(args) => {
                self.search_entities(&args.criteria, EntityKind::Products, args.limit)
                    .await
            }
            ToolInvocation::GetCustomerOrders(args) => {
                self.get_customer_orders(&args.customer_id, args.limit)
                    .await
            }
            ToolInvocation::GetOrderDetails(args) => self.get_order_details(args.order_id).await,
            ToolInvocation::GetProductInfo(args) => self.get_product_info(args.product_id).await,
            ToolInvocation::ExecuteQuery(args) => self.execute_query(&args.query).await,
            ToolInvocation::PaginatedQuery(args) => self.paginated_query(args).await,
            ToolInvocation::SalesAnalytics(args) => self.sales_analytics(args).await,
            ToolInvocation::AdvancedSearch(args) => self.advanced_search(args).await,
            ToolInvocation::RangeSearch(args) => self.range_search(args).await,
            ToolInvocation::DataProfiling(args) => self.data_profiling(args).await,
            ToolInvocation::CustomAggregation(args) => self.custom_aggregation(args).await,
            ToolInvocation::SuggestQueries(args) => {
                suggest_queries(&args.context, args.table_focus.as_deref())
            }
            ToolInvocation::HealthCheck(_) => self.health_check().await,
        }
    }

    async fn session(&self) -> Result<Box<dyn SqlSession>, GatewayError> {
        let session = self.backend.acquire().await?;
        Ok(Box::new(TimedSession::new(
            session,
            self.config.database.pool.query_timeout,
        )))
    }

    /// Round-trip `SELECT 1` and report gate usage and counters.
    pub async fn health_check(&self) -> Result<QueryResult, GatewayError> {
        let start = Instant::now();
        let mut session = self.session().await?;
        let ping = session
            .query(&Statement::new(
                "SELECT 1 AS ok, DB_NAME() AS database_name, @@VERSION AS server_version",
            ))
            .await?;
        let latency_ms = start.elapsed().as_millis() as u64;

        let server_version = ping
            .first_value("server_version")
            .and_then(Value::as_str)
            .and_then(|v| v.lines().next())
            .unwrap_or("unknown")
            .trim()
            .to_string();
        let database = ping
            .first_value("database_name")
            .cloned()
            .unwrap_or(Value::Null);

        let gate = self.backend.gate_status();
        let metrics = self.metrics.snapshot();

        let mut row = Map::new();
        row.insert("status".into(), json!("healthy"));
        row.insert("database".into(), database);
        row.insert("server_version".into(), json!(server_version));
        row.insert("latency_ms".into(), json!(latency_ms));
        row.insert("connections_in_use".into(), json!(gate.in_use));
        row.insert("connections_max".into(), json!(gate.max));

        let columns = vec![
            ColumnInfo::new("status", "nvarchar"),
            ColumnInfo::new("database", "nvarchar"),
            ColumnInfo::new("server_version", "nvarchar"),
            ColumnInfo::new("latency_ms", "bigint"),
            ColumnInfo::new("connections_in_use", "int"),
            ColumnInfo::new("connections_max", "int"),
        ];

        let mut result = QueryResult::from_rows(columns, vec![row]).with_metadata(json!({
            "metrics": metrics,
            "avg_invocation_time_ms": metrics.avg_invocation_time_ms(),
        }));
        result.execution_time_ms = latency_ms;
        Ok(result)
    }
}

/// Apply a limit's default and reject values outside `1..=max`.
fn resolve_limit(name: &str, value: Option<i64>, bound: LimitBound) -> Result<i64, GatewayError> {
    let value = value.unwrap_or(bound.default);
    if value <= 0 || value > bound.max {
        return Err(GatewayError::validation(format!(
            "{} must be between 1 and {}, got {}",
            name, bound.max, value
        )));
    }
    Ok(value)
}

/// Read a string column from a catalog row.
fn text_column(result: &QueryResult, row: usize, column: &str) -> Result<String, GatewayError> {
    result
        .rows
        .get(row)
        .and_then(|r| r.get(column))
        .and_then(Value::as_str)
        .map(str::to_string)
        .ok_or_else(|| {
            GatewayError::execution(format!("Catalog row is missing column '{}'", column))
        })
}
