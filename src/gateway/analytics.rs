//! Grouped sales totals over Northwind orders.

use super::northwind::{number, round_cents};
use super::{Gateway, SalesAnalyticsArgs, SalesGrouping};
use crate::database::{QueryResult, SqlParam, Statement};
use crate::error::GatewayError;
use chrono::NaiveDate;
use serde_json::{json, Value};

const DATE_FORMAT: &str = "%Y-%m-%d";

/// Grouping expression, its output column and the joins it needs.
struct Dimension {
    expression: &'static str,
    label: &'static str,
    joins: &'static str,
}

impl SalesGrouping {
    fn dimension(&self) -> Dimension {
        match self {
            SalesGrouping::Day => Dimension {
                expression: "CAST(o.OrderDate AS DATE)",
                label: "Date",
                joins: "",
            },
            SalesGrouping::Month => Dimension {
                expression: "FORMAT(o.OrderDate, 'yyyy-MM')",
                label: "Month",
                joins: "",
            },
            SalesGrouping::Quarter => Dimension {
                expression: "CONCAT(YEAR(o.OrderDate), '-Q', DATEPART(QUARTER, o.OrderDate))",
                label: "Quarter",
                joins: "",
            },
            SalesGrouping::Year => Dimension {
                expression: "YEAR(o.OrderDate)",
                label: "Year",
                joins: "",
            },
            SalesGrouping::Category => Dimension {
                expression: "c.CategoryName",
                label: "Category",
                joins: " JOIN Products p ON od.ProductID = p.ProductID \
                         JOIN Categories c ON p.CategoryID = c.CategoryID",
            },
            SalesGrouping::Customer => Dimension {
                expression: "cust.CompanyName",
                label: "Customer",
                joins: " JOIN Customers cust ON o.CustomerID = cust.CustomerID",
            },
            SalesGrouping::Employee => Dimension {
                expression: "CONCAT(e.FirstName, ' ', e.LastName)",
                label: "Employee",
                joins: " JOIN Employees e ON o.EmployeeID = e.EmployeeID",
            },
        }
    }
}

fn parse_date(name: &str, value: &str) -> Result<NaiveDate, GatewayError> {
    NaiveDate::parse_from_str(value.trim(), DATE_FORMAT).map_err(|_| {
        GatewayError::validation(format!("{} must be a YYYY-MM-DD date, got '{}'", name, value))
    })
}

/// Both dates or neither; start must not be after end.
fn date_range(args: &SalesAnalyticsArgs) -> Result<Option<(NaiveDate, NaiveDate)>, GatewayError> {
    match (&args.start_date, &args.end_date) {
        (None, None) => Ok(None),
        (Some(start), Some(end)) => {
            let start = parse_date("start_date", start)?;
            let end = parse_date("end_date", end)?;
            if start > end {
                return Err(GatewayError::validation(format!(
                    "start_date {} is after end_date {}",
                    start, end
                )));
            }
            Ok(Some((start, end)))
        }
        _ => Err(GatewayError::validation(
            "start_date and end_date must be given together",
        )),
    }
}

fn analytics_statement(dimension: &Dimension, range: Option<(NaiveDate, NaiveDate)>) -> Statement {
    let line_value = "od.UnitPrice * od.Quantity * (1 - od.Discount)";
    let filter = if range.is_some() {
        " WHERE o.OrderDate >= @P1 AND o.OrderDate < DATEADD(day, 1, @P2)"
    } else {
        ""
    };

    let text = format!(
        "SELECT {expr} AS [{label}], \
         COUNT(DISTINCT o.OrderID) AS OrderCount, \
         CAST(SUM({line}) AS DECIMAL(19, 2)) AS TotalSales, \
         CAST(AVG({line}) AS DECIMAL(19, 2)) AS AverageLineValue, \
         SUM(od.Quantity) AS TotalQuantity, \
         COUNT(DISTINCT o.CustomerID) AS UniqueCustomers \
         FROM Orders o \
         JOIN [Order Details] od ON o.OrderID = od.OrderID{joins}{filter} \
         GROUP BY {expr} \
         ORDER BY {expr}",
        expr = dimension.expression,
        label = dimension.label,
        line = line_value,
        joins = dimension.joins,
        filter = filter,
    );

    let statement = Statement::new(text);
    match range {
        Some((start, end)) => statement
            .bind(SqlParam::Date(start))
            .bind(SqlParam::Date(end)),
        None => statement,
    }
}

impl Gateway {
    /// Sales totals grouped by a time period or an entity.
    pub async fn sales_analytics(
        &self,
        args: &SalesAnalyticsArgs,
    ) -> Result<QueryResult, GatewayError> {
        let range = date_range(args)?;
        let statement = analytics_statement(&args.group_by.dimension(), range);

        let mut session = self.session().await?;
        let result = session.query(&statement).await?;

        let total_sales: f64 = result
            .rows
            .iter()
            .filter_map(|row| row.get("TotalSales").and_then(number))
            .sum();
        let total_orders: i64 = result
            .rows
            .iter()
            .filter_map(|row| row.get("OrderCount").and_then(Value::as_i64))
            .sum();
        let date_range = match range {
            Some((start, end)) => format!("{} to {}", start, end),
            None => "all dates".to_string(),
        };

        let summary = json!({
            "grouped_by": args.group_by.as_str(),
            "date_range": date_range,
            "total_sales": round_cents(total_sales),
            "total_orders": total_orders,
            "periods_analyzed": result.row_count,
        });
        Ok(result.with_metadata(summary))
    }
}
