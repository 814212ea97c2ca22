//! Statements, bound parameters and query results.

use crate::database::types::TypeMapper;
use crate::error::{truncate_message, GatewayError};
use chrono::NaiveDate;
use futures_util::TryStreamExt;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::time::Instant;
use tiberius::{Client, Query, QueryItem};
use tokio::net::TcpStream;
use tokio_util::compat::Compat;
use tracing::debug;

/// A parameter bound positionally as `@P1..@Pn`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum SqlParam {
    Int(i64),
    Float(f64),
    Text(String),
    Date(NaiveDate),
}

/// A SQL statement with its bound parameters.
///
/// Values supplied by callers always travel as parameters; only identifiers
/// resolved from the catalog (and escaped) are ever spliced into the text.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Statement {
    pub text: String,
    pub params: Vec<SqlParam>,
    /// Rows kept before the result is marked truncated.
    #[serde(skip)]
    pub max_rows: Option<usize>,
}

impl Statement {
    pub fn new(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            params: Vec::new(),
            max_rows: None,
        }
    }

    pub fn bind(mut self, param: SqlParam) -> Self {
        self.params.push(param);
        self
    }

    pub fn with_max_rows(mut self, max_rows: usize) -> Self {
        self.max_rows = Some(max_rows);
        self
    }
}

/// Information about a result column.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ColumnInfo {
    /// Column name.
    pub name: String,

    /// SQL type name.
    pub sql_type: String,
}

impl ColumnInfo {
    pub fn new(name: impl Into<String>, sql_type: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            sql_type: sql_type.into(),
        }
    }
}

/// One result row: column name to value, in column order.
pub type Row = Map<String, Value>;

/// Result of a tool invocation that reached (or simulated) the database.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QueryResult {
    /// Column names and types in order.
    pub columns: Vec<ColumnInfo>,

    /// Result rows.
    pub rows: Vec<Row>,

    /// Number of rows returned.
    pub row_count: usize,

    /// Whether rows were dropped because of the row limit.
    pub truncated: bool,

    /// Execution time in milliseconds.
    pub execution_time_ms: u64,

    /// Statement text that produced the rows.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub statement: Option<String>,

    /// Tool-specific extras (pagination, summaries).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub metadata: Option<Value>,
}

impl QueryResult {
    /// Create an empty query result.
    pub fn empty() -> Self {
        Self {
            columns: Vec::new(),
            rows: Vec::new(),
            row_count: 0,
            truncated: false,
            execution_time_ms: 0,
            statement: None,
            metadata: None,
        }
    }

    /// Build a result from in-memory rows (no database round trip).
    pub fn from_rows(columns: Vec<ColumnInfo>, rows: Vec<Row>) -> Self {
        Self {
            row_count: rows.len(),
            columns,
            rows,
            ..Self::empty()
        }
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// First row's value for `column`.
    pub fn first_value(&self, column: &str) -> Option<&Value> {
        self.rows.first().and_then(|row| row.get(column))
    }

    pub fn with_metadata(mut self, metadata: Value) -> Self {
        self.metadata = Some(metadata);
        self
    }
}

pub type RawConnection = Client<Compat<TcpStream>>;

/// Run a statement on an open connection and collect the first result set.
pub async fn run_statement(
    client: &mut RawConnection,
    statement: &Statement,
) -> Result<QueryResult, GatewayError> {
    let start = Instant::now();
    debug!(
        statement = %truncate_message(&statement.text, crate::constants::LOG_STATEMENT_CHARS),
        params = statement.params.len(),
        "Executing statement"
    );

    let mut query = Query::new(statement.text.as_str());
    for param in &statement.params {
        match param {
            SqlParam::Int(v) => query.bind(*v),
            SqlParam::Float(v) => query.bind(*v),
            SqlParam::Text(v) => query.bind(v.as_str()),
            SqlParam::Date(v) => query.bind(*v),
        }
    }

    let mut stream = query.query(client).await?;

    let max_rows = statement.max_rows.unwrap_or(usize::MAX);
    let mut columns: Vec<ColumnInfo> = Vec::new();
    let mut rows: Vec<Row> = Vec::new();
    let mut truncated = false;

    while let Some(item) = stream.try_next().await? {
        match item {
            QueryItem::Metadata(meta) if meta.result_index() == 0 => {
                columns = meta
                    .columns()
                    .iter()
                    .map(|col| ColumnInfo::new(col.name(), TypeMapper::sql_type_name(col)))
                    .collect();
            }
            QueryItem::Metadata(_) => {}
            QueryItem::Row(row) if row.result_index() == 0 => {
                if rows.len() >= max_rows {
                    // keep draining so the connection stays usable
                    truncated = true;
                    continue;
                }
                let mut values = Row::new();
                for (col, data) in columns.iter().zip(row.into_iter()) {
                    values.insert(col.name.clone(), TypeMapper::to_json(&data));
                }
                rows.push(values);
            }
            QueryItem::Row(_) => {}
        }
    }

    let result = QueryResult {
        row_count: rows.len(),
        columns,
        rows,
        truncated,
        execution_time_ms: start.elapsed().as_millis() as u64,
        statement: Some(statement.text.clone()),
        metadata: None,
    };

    debug!(
        rows = result.row_count,
        truncated = result.truncated,
        elapsed_ms = result.execution_time_ms,
        "Statement completed"
    );

    Ok(result)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_statement_builder() {
        let stmt = Statement::new("SELECT TOP (@P1) * FROM [dbo].[Customers]")
            .bind(SqlParam::Int(5))
            .with_max_rows(5);
        assert_eq!(stmt.params, vec![SqlParam::Int(5)]);
        assert_eq!(stmt.max_rows, Some(5));
    }

    #[test]
    fn test_query_result_empty() {
        let result = QueryResult::empty();
        assert!(result.is_empty());
        assert_eq!(result.row_count, 0);
        assert!(!result.truncated);
    }

    #[test]
    fn test_row_order_is_preserved_in_json() {
        let mut row = Row::new();
        row.insert("OrderID".to_string(), json!(10643));
        row.insert("CustomerID".to_string(), json!("ALFKI"));
        row.insert("Freight".to_string(), json!(29.46));

        let result = QueryResult::from_rows(
            vec![
                ColumnInfo::new("OrderID", "INT"),
                ColumnInfo::new("CustomerID", "NCHAR"),
                ColumnInfo::new("Freight", "MONEY"),
            ],
            vec![row],
        );

        let rendered = serde_json::to_string(&result.rows[0]).unwrap();
        assert_eq!(rendered, r#"{"OrderID":10643,"CustomerID":"ALFKI","Freight":29.46}"#);
        assert_eq!(result.first_value("CustomerID"), Some(&json!("ALFKI")));
    }

    #[test]
    fn test_metadata_is_omitted_when_absent() {
        let value = serde_json::to_value(QueryResult::empty()).unwrap();
        assert!(value.get("metadata").is_none());
        assert!(value.get("statement").is_none());
    }
}
