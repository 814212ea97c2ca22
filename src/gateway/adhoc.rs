//! Free-form read queries, plain and paginated.

use super::{resolve_limit, Gateway, PaginatedQueryArgs};
use crate::database::{QueryResult, SqlParam, Statement};
use crate::error::GatewayError;
use crate::security::{has_order_by, starts_with_cte};
use serde_json::{json, Value};
use tracing::debug;

impl Gateway {
    /// Run one caller-written read statement after the read-only guard
    /// accepts it. Rows past `max_result_rows` are dropped.
    pub async fn execute_query(&self, query: &str) -> Result<QueryResult, GatewayError> {
        let query = self.guard.validate(query)?;
        let statement = Statement::new(query).with_max_rows(self.config.limits.max_result_rows);

        let mut session = self.session().await?;
        session.query(&statement).await
    }

    /// Run a read statement one page at a time with OFFSET/FETCH.
    pub async fn paginated_query(
        &self,
        args: &PaginatedQueryArgs,
    ) -> Result<QueryResult, GatewayError> {
        let query = self.guard.validate(&args.query)?;

        let page = args.page.unwrap_or(1);
        if page < 1 {
            return Err(GatewayError::validation(format!(
                "page must be 1 or greater, got {}",
                page
            )));
        }
        let page_size = resolve_limit("page_size", args.page_size, self.config.limits.page_size)?;
        let offset = (page - 1)
            .checked_mul(page_size)
            .ok_or_else(|| GatewayError::validation(format!("page {} is out of range", page)))?;

        if args.count_total && starts_with_cte(query) {
            return Err(GatewayError::validation(
                "count_total is not supported for queries that start with WITH",
            ));
        }

        // a newline keeps a trailing line comment from swallowing the suffix
        let ordered = if has_order_by(query) {
            query.to_string()
        } else {
            format!("{}\nORDER BY (SELECT NULL)", query)
        };

        // one extra row tells whether another page exists
        let statement = Statement::new(format!(
            "{}\nOFFSET @P1 ROWS FETCH NEXT @P2 ROWS ONLY",
            ordered
        ))
        .bind(SqlParam::Int(offset))
        .bind(SqlParam::Int(page_size + 1));

        let mut session = self.session().await?;
        let mut result = session.query(&statement).await?;

        let has_next_page = result.rows.len() as i64 > page_size;
        if has_next_page {
            result.rows.truncate(page_size as usize);
            result.row_count = result.rows.len();
        }

        let mut metadata = json!({
            "page": page,
            "page_size": page_size,
            "records_on_page": result.row_count,
            "has_next_page": has_next_page,
        });

        if args.count_total {
            let count = Statement::new(format!(
                "SELECT COUNT_BIG(*) AS total FROM ({}\nOFFSET 0 ROWS) AS paged_source",
                ordered
            ));
            let total = session
                .query(&count)
                .await?
                .first_value("total")
                .and_then(Value::as_i64)
                .unwrap_or(0);
            let total_pages = (total + page_size - 1) / page_size;
            debug!(total, total_pages, "Counted paginated source");

            metadata["total_records"] = json!(total);
            metadata["total_pages"] = json!(total_pages);
        }

        Ok(result.with_metadata(metadata))
    }
}

#[cfg(test)]
mod tests {
    use super::super::testing::{gateway_with, rows, FakeBackend};
    use super::*;
    use crate::error::ErrorKind;
    use crate::gateway::{QueryArgs, ToolInvocation};

    fn paged_source(total: usize) -> FakeBackend {
        FakeBackend::new(move |statement| {
            if statement.text.starts_with("SELECT COUNT_BIG(*)") {
                return Ok(rows(vec![json!({"total": total})]));
            }
            let (offset, fetch) = match statement.params.as_slice() {
                [SqlParam::Int(o), SqlParam::Int(f)] => (*o as usize, *f as usize),
                _ => (0, total),
            };
            let page = (offset..total)
                .take(fetch)
                .map(|i| json!({"n": i}))
                .collect();
            Ok(rows(page))
        })
    }

    fn paginated(query: &str, page: Option<i64>, page_size: Option<i64>, count_total: bool) -> PaginatedQueryArgs {
        PaginatedQueryArgs {
            query: query.to_string(),
            page,
            page_size,
            count_total,
        }
    }

    #[tokio::test]
    async fn test_execute_query_rejects_modifications_without_acquiring() {
        let backend = FakeBackend::empty();
        let gateway = gateway_with(backend.clone());

        let statements = [
            "INSERT INTO Customers (CustomerID) VALUES ('X')",
            "update Customers SET City = 'Oslo'",
            "  Delete FROM Orders",
            "-- cleanup\nDROP TABLE Orders",
            "/* note */ alter table Orders add x int",
            "\n\tTRUNCATE TABLE [Order Details]",
        ];
        for query in statements {
            let err = gateway
                .invoke(ToolInvocation::ExecuteQuery(QueryArgs {
                    query: query.to_string(),
                }))
                .await
                .unwrap_err();
            assert_eq!(err.kind(), ErrorKind::Validation, "{}", query);
        }
        assert_eq!(backend.acquires(), 0);
    }

    #[tokio::test]
    async fn test_execute_query_passes_trimmed_statement_with_row_cap() {
        let backend = FakeBackend::empty();
        let gateway = gateway_with(backend.clone());
        gateway
            .execute_query("  SELECT TOP 5 * FROM Customers;  ")
            .await
            .unwrap();

        let statement = backend.last_statement();
        assert_eq!(statement.text, "SELECT TOP 5 * FROM Customers");
        assert!(statement.params.is_empty());
        assert_eq!(statement.max_rows, Some(1_000));
    }

    #[tokio::test]
    async fn test_paginated_query_appends_order_and_detects_next_page() {
        let backend = paged_source(45);
        let gateway = gateway_with(backend.clone());

        let result = gateway
            .paginated_query(&paginated("SELECT n FROM Numbers", Some(2), Some(20), false))
            .await
            .unwrap();
        assert_eq!(result.row_count, 20);
        assert_eq!(result.rows[0]["n"], 20);

        let metadata = result.metadata.unwrap();
        assert_eq!(metadata["has_next_page"], true);
        assert!(metadata.get("total_records").is_none());

        let statement = backend.last_statement();
        assert_eq!(
            statement.text,
            "SELECT n FROM Numbers\nORDER BY (SELECT NULL)\nOFFSET @P1 ROWS FETCH NEXT @P2 ROWS ONLY"
        );
        assert_eq!(statement.params, vec![SqlParam::Int(20), SqlParam::Int(21)]);
    }

    #[tokio::test]
    async fn test_paginated_query_orders_window_function_queries() {
        let backend = paged_source(12);
        let gateway = gateway_with(backend.clone());

        let query = "SELECT OrderID, ROW_NUMBER() OVER (ORDER BY OrderDate) AS rn FROM Orders";
        gateway
            .paginated_query(&paginated(query, Some(1), Some(10), true))
            .await
            .unwrap();

        let statements = backend.statements();
        assert_eq!(
            statements[0].text,
            format!(
                "{}\nORDER BY (SELECT NULL)\nOFFSET @P1 ROWS FETCH NEXT @P2 ROWS ONLY",
                query
            )
        );
        assert_eq!(
            statements[1].text,
            format!(
                "SELECT COUNT_BIG(*) AS total FROM ({}\nORDER BY (SELECT NULL)\nOFFSET 0 ROWS) AS paged_source",
                query
            )
        );
    }

    #[tokio::test]
    async fn test_paginated_query_last_page_with_total() {
        let backend = paged_source(45);
        let gateway = gateway_with(backend.clone());

        let result = gateway
            .paginated_query(&paginated(
                "SELECT n FROM Numbers ORDER BY n",
                Some(3),
                Some(20),
                true,
            ))
            .await
            .unwrap();
        assert_eq!(result.row_count, 5);

        let metadata = result.metadata.unwrap();
        assert_eq!(metadata["has_next_page"], false);
        assert_eq!(metadata["total_records"], 45);
        assert_eq!(metadata["total_pages"], 3);

        let count = backend.last_statement();
        assert_eq!(
            count.text,
            "SELECT COUNT_BIG(*) AS total FROM (SELECT n FROM Numbers ORDER BY n\nOFFSET 0 ROWS) AS paged_source"
        );
        assert_eq!(backend.acquires(), 1);
    }

    #[tokio::test]
    async fn test_paginated_query_validation() {
        let backend = paged_source(10);
        let gateway = gateway_with(backend.clone());

        let bad = [
            paginated("SELECT 1", Some(0), None, false),
            paginated("SELECT 1", None, Some(0), false),
            paginated("SELECT 1", None, Some(101), false),
            paginated("SELECT 1", Some(i64::MAX), Some(100), false),
            paginated("DELETE FROM Orders", None, None, false),
            paginated("WITH t AS (SELECT 1 AS n) SELECT n FROM t", None, None, true),
        ];
        for args in bad {
            let err = gateway.paginated_query(&args).await.unwrap_err();
            assert_eq!(err.kind(), ErrorKind::Validation, "{:?}", args);
        }
        assert_eq!(backend.acquires(), 0);

        // CTEs page fine without a total
        gateway
            .paginated_query(&paginated("WITH t AS (SELECT 1 AS n) SELECT n FROM t", None, None, false))
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_trailing_comment_does_not_swallow_paging() {
        let backend = paged_source(3);
        let gateway = gateway_with(backend.clone());
        gateway
            .paginated_query(&paginated("SELECT n FROM Numbers -- all of them", None, None, false))
            .await
            .unwrap();
        let statement = backend.last_statement();
        assert!(statement.text.contains("-- all of them\nORDER BY (SELECT NULL)\nOFFSET"));
    }
}
