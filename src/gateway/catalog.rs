//! Schema introspection: tables, columns and sample rows.
//!
//! Caller-supplied table names are parsed locally, then resolved against
//! `INFORMATION_SCHEMA` with bound parameters. Only the catalog's own
//! spelling of a name is ever spliced into statement text.

use super::{resolve_limit, text_column, Gateway};
use crate::database::{QueryResult, SqlParam, SqlSession, Statement};
use crate::error::GatewayError;
use crate::security::{parse_table_name, quote_qualified, TableName};

const LIST_TABLES_SQL: &str = "\
SELECT TABLE_SCHEMA AS [schema], TABLE_NAME AS [name], \
TABLE_SCHEMA + '.' + TABLE_NAME AS full_name \
FROM INFORMATION_SCHEMA.TABLES \
WHERE TABLE_TYPE = 'BASE TABLE' \
ORDER BY TABLE_SCHEMA, TABLE_NAME";

const COLUMNS_SQL: &str = "\
SELECT TABLE_SCHEMA AS table_schema, COLUMN_NAME AS column_name, DATA_TYPE AS data_type, \
IS_NULLABLE AS is_nullable, COLUMN_DEFAULT AS column_default, \
CHARACTER_MAXIMUM_LENGTH AS max_length \
FROM INFORMATION_SCHEMA.COLUMNS \
WHERE TABLE_NAME = @P1";

const RESOLVE_TABLE_SQL: &str = "\
SELECT TABLE_SCHEMA AS [schema], TABLE_NAME AS [name] \
FROM INFORMATION_SCHEMA.TABLES \
WHERE TABLE_NAME = @P1";

/// Append the optional schema filter and a deterministic order.
fn by_table(base: &str, table: &TableName, order_by: &str) -> Statement {
    match &table.schema {
        Some(schema) => Statement::new(format!(
            "{} AND TABLE_SCHEMA = @P2 ORDER BY {}",
            base, order_by
        ))
        .bind(SqlParam::Text(table.name.clone()))
        .bind(SqlParam::Text(schema.clone())),
        None => Statement::new(format!("{} ORDER BY {}", base, order_by))
            .bind(SqlParam::Text(table.name.clone())),
    }
}

/// Resolve a table against the catalog, preferring the caller's default
/// schema when the name is unqualified. Returns `(schema, name)`.
pub(super) async fn resolve_table(
    session: &mut dyn SqlSession,
    table: &TableName,
) -> Result<(String, String), GatewayError> {
    let statement = by_table(
        RESOLVE_TABLE_SQL,
        table,
        "CASE WHEN TABLE_SCHEMA = SCHEMA_NAME() THEN 0 ELSE 1 END, TABLE_SCHEMA",
    );
    let found = session.query(&statement).await?;
    if found.is_empty() {
        return Err(GatewayError::not_found("Table", table.to_string()));
    }
    Ok((text_column(&found, 0, "schema")?, text_column(&found, 0, "name")?))
}

impl Gateway {
    /// All base tables, ordered by schema and name.
    pub async fn list_tables(&self) -> Result<QueryResult, GatewayError> {
        let mut session = self.session().await?;
        session.query(&Statement::new(LIST_TABLES_SQL)).await
    }

    /// Column definitions of a table or view, in ordinal order.
    pub async fn get_table_schema(&self, table_name: &str) -> Result<QueryResult, GatewayError> {
        let table = parse_table_name(table_name)?;
        let statement = by_table(COLUMNS_SQL, &table, "TABLE_SCHEMA, ORDINAL_POSITION");

        let mut session = self.session().await?;
        let columns = session.query(&statement).await?;
        if columns.is_empty() {
            return Err(GatewayError::not_found("Table", table.to_string()));
        }
        Ok(columns)
    }

    /// Up to `limit` rows of a table.
    pub async fn get_sample_data(
        &self,
        table_name: &str,
        limit: Option<i64>,
    ) -> Result<QueryResult, GatewayError> {
        let limit = resolve_limit("limit", limit, self.config.limits.sample_data)?;
        let table = parse_table_name(table_name)?;

        let mut session = self.session().await?;
        let (schema, name) = resolve_table(session.as_mut(), &table).await?;

        let statement = Statement::new(format!(
            "SELECT TOP (@P1) * FROM {}",
            quote_qualified(&schema, &name)
        ))
        .bind(SqlParam::Int(limit));
        session.query(&statement).await
    }
}

#[cfg(test)]
mod tests {
    use super::super::testing::{gateway_with, rows, FakeBackend};
    use super::*;
    use crate::error::ErrorKind;
    use crate::gateway::{NoArgs, SampleDataArgs, TableArgs, ToolInvocation};
    use serde_json::json;

    fn customers_catalog() -> FakeBackend {
        FakeBackend::new(|statement| {
            let wants_customers = statement.params.first()
                == Some(&SqlParam::Text("Customers".to_string()));
            if statement.text.contains("INFORMATION_SCHEMA.COLUMNS") {
                if !wants_customers {
                    return Ok(QueryResult::empty());
                }
                return Ok(rows(vec![
                    json!({"table_schema": "dbo", "column_name": "CustomerID", "data_type": "nchar", "is_nullable": "NO", "column_default": null, "max_length": 5}),
                    json!({"table_schema": "dbo", "column_name": "CompanyName", "data_type": "nvarchar", "is_nullable": "NO", "column_default": null, "max_length": 40}),
                    json!({"table_schema": "dbo", "column_name": "ContactName", "data_type": "nvarchar", "is_nullable": "YES", "column_default": null, "max_length": 30}),
                    json!({"table_schema": "dbo", "column_name": "City", "data_type": "nvarchar", "is_nullable": "YES", "column_default": null, "max_length": 15}),
                    json!({"table_schema": "dbo", "column_name": "Country", "data_type": "nvarchar", "is_nullable": "YES", "column_default": null, "max_length": 15}),
                ]));
            }
            if statement.text.contains("INFORMATION_SCHEMA.TABLES") {
                if !wants_customers {
                    return Ok(QueryResult::empty());
                }
                return Ok(rows(vec![json!({"schema": "dbo", "name": "Customers"})]));
            }
            Ok(rows(vec![json!({"CustomerID": "ALFKI"})]))
        })
    }

    #[tokio::test]
    async fn test_get_table_schema_returns_columns() {
        let gateway = gateway_with(customers_catalog());
        let result = gateway.get_table_schema("Customers").await.unwrap();

        let names: Vec<&str> = result
            .rows
            .iter()
            .filter_map(|r| r["column_name"].as_str())
            .collect();
        for expected in ["CustomerID", "CompanyName", "ContactName", "City", "Country"] {
            assert!(names.contains(&expected), "missing {}", expected);
        }
    }

    #[tokio::test]
    async fn test_get_table_schema_unknown_table_is_not_found() {
        let gateway = gateway_with(customers_catalog());
        let err = gateway
            .invoke(ToolInvocation::GetTableSchema(TableArgs {
                table_name: "NoSuchTable".into(),
            }))
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::NotFound);
    }

    #[tokio::test]
    async fn test_get_table_schema_binds_schema_and_name() {
        let backend = customers_catalog();
        let gateway = gateway_with(backend.clone());
        gateway.get_table_schema("dbo.[Customers]").await.unwrap();

        let statement = backend.last_statement();
        assert!(statement.text.contains("TABLE_SCHEMA = @P2"));
        assert_eq!(
            statement.params,
            vec![
                SqlParam::Text("Customers".into()),
                SqlParam::Text("dbo".into())
            ]
        );
    }

    #[tokio::test]
    async fn test_malformed_table_name_never_reaches_database() {
        let backend = customers_catalog();
        let gateway = gateway_with(backend.clone());

        for bad in ["", "a.b.c", "Customers; DROP TABLE x", "Customers--"] {
            let err = gateway
                .invoke(ToolInvocation::GetTableSchema(TableArgs {
                    table_name: bad.into(),
                }))
                .await
                .unwrap_err();
            assert_eq!(err.kind(), ErrorKind::Validation, "{}", bad);
        }
        assert_eq!(backend.acquires(), 0);
    }

    #[tokio::test]
    async fn test_sample_data_limit_bounds_checked_before_acquire() {
        let backend = customers_catalog();
        let gateway = gateway_with(backend.clone());

        for limit in [0, -1, 101, i64::MAX] {
            let err = gateway
                .invoke(ToolInvocation::GetSampleData(SampleDataArgs {
                    table_name: "Customers".into(),
                    limit: Some(limit),
                }))
                .await
                .unwrap_err();
            assert_eq!(err.kind(), ErrorKind::Validation);
        }
        assert_eq!(backend.acquires(), 0);
    }

    #[tokio::test]
    async fn test_sample_data_uses_catalog_name_and_bound_top() {
        let backend = customers_catalog();
        let gateway = gateway_with(backend.clone());

        let result = gateway.get_sample_data("customers", Some(3)).await;
        // resolution is case-sensitive in the fake; the real catalog uses the
        // database collation
        assert_eq!(result.unwrap_err().kind(), ErrorKind::NotFound);

        gateway.get_sample_data("Customers", None).await.unwrap();
        let statement = backend.last_statement();
        assert_eq!(statement.text, "SELECT TOP (@P1) * FROM [dbo].[Customers]");
        assert_eq!(statement.params, vec![SqlParam::Int(5)]);
        assert_eq!(backend.acquires(), 2);
    }

    #[tokio::test]
    async fn test_list_tables_in_parallel() {
        let backend = FakeBackend::slow(std::time::Duration::from_millis(20), |_| {
            Ok(rows(vec![
                json!({"schema": "dbo", "name": "Customers", "full_name": "dbo.Customers"}),
                json!({"schema": "dbo", "name": "Orders", "full_name": "dbo.Orders"}),
            ]))
        });
        let gateway = gateway_with(backend.clone());

        let handles: Vec<_> = (0..10)
            .map(|_| {
                let gateway = gateway.clone();
                tokio::spawn(async move { gateway.invoke(ToolInvocation::ListTables(NoArgs {})).await })
            })
            .collect();

        for handle in handles {
            let result = handle.await.unwrap().unwrap();
            assert_eq!(result.row_count, 2);
        }

        assert_eq!(backend.acquires(), 10);
        assert!(backend.peak_in_use() <= super::super::testing::FAKE_GATE_SIZE);
        assert_eq!(gateway.gate_status().in_use, 0);
    }
}
