//! Canned Northwind query suggestions. No database access.

use crate::constants::MAX_SUGGESTIONS;
use crate::database::{ColumnInfo, QueryResult};
use crate::error::GatewayError;
use serde_json::{json, Map, Value};

struct Suggestion {
    query: &'static str,
    description: &'static str,
    use_case: &'static str,
}

/// Keyword triggers and the suggestions they unlock.
const TOPICS: &[(&[&str], &[Suggestion])] = &[
    (
        &["sales", "revenue", "money", "profit"],
        &[
            Suggestion {
                query: "SELECT c.CompanyName, SUM(od.UnitPrice * od.Quantity * (1 - od.Discount)) AS TotalSales FROM Customers c JOIN Orders o ON c.CustomerID = o.CustomerID JOIN [Order Details] od ON o.OrderID = od.OrderID GROUP BY c.CompanyName ORDER BY TotalSales DESC",
                description: "Top customers by total sales revenue",
                use_case: "Customer revenue analysis",
            },
            Suggestion {
                query: "SELECT p.ProductName, SUM(od.UnitPrice * od.Quantity * (1 - od.Discount)) AS ProductRevenue FROM Products p JOIN [Order Details] od ON p.ProductID = od.ProductID GROUP BY p.ProductName ORDER BY ProductRevenue DESC",
                description: "Best selling products by revenue",
                use_case: "Product performance analysis",
            },
        ],
    ),
    (
        &["customer", "client", "buyer"],
        &[
            Suggestion {
                query: "SELECT Country, COUNT(*) AS CustomerCount FROM Customers GROUP BY Country ORDER BY CustomerCount DESC",
                description: "Customer distribution by country",
                use_case: "Geographic customer analysis",
            },
            Suggestion {
                query: "SELECT c.CompanyName, COUNT(o.OrderID) AS OrderCount FROM Customers c LEFT JOIN Orders o ON c.CustomerID = o.CustomerID GROUP BY c.CompanyName ORDER BY OrderCount DESC",
                description: "Customers by order frequency",
                use_case: "Customer activity analysis",
            },
        ],
    ),
    (
        &["product", "inventory", "stock"],
        &[
            Suggestion {
                query: "SELECT ProductName, UnitsInStock, ReorderLevel FROM Products WHERE UnitsInStock <= ReorderLevel AND Discontinued = 0",
                description: "Products that need reordering",
                use_case: "Inventory management",
            },
            Suggestion {
                query: "SELECT c.CategoryName, COUNT(p.ProductID) AS ProductCount, AVG(p.UnitPrice) AS AvgPrice FROM Categories c JOIN Products p ON c.CategoryID = p.CategoryID GROUP BY c.CategoryName",
                description: "Product count and average price by category",
                use_case: "Category analysis",
            },
        ],
    ),
    (
        &["employee", "staff", "worker"],
        &[
            Suggestion {
                query: "SELECT e.FirstName + ' ' + e.LastName AS EmployeeName, COUNT(o.OrderID) AS OrdersHandled FROM Employees e LEFT JOIN Orders o ON e.EmployeeID = o.EmployeeID GROUP BY e.FirstName, e.LastName ORDER BY OrdersHandled DESC",
                description: "Employee performance by orders handled",
                use_case: "Employee productivity analysis",
            },
            Suggestion {
                query: "SELECT e.FirstName + ' ' + e.LastName AS EmployeeName, SUM(od.UnitPrice * od.Quantity * (1 - od.Discount)) AS SalesGenerated FROM Employees e JOIN Orders o ON e.EmployeeID = o.EmployeeID JOIN [Order Details] od ON o.OrderID = od.OrderID GROUP BY e.FirstName, e.LastName ORDER BY SalesGenerated DESC",
                description: "Employee sales performance",
                use_case: "Sales team analysis",
            },
        ],
    ),
    (
        &["time", "date", "trend", "period"],
        &[
            Suggestion {
                query: "SELECT FORMAT(OrderDate, 'yyyy-MM') AS Month, COUNT(*) AS OrderCount, SUM(Freight) AS TotalFreight FROM Orders GROUP BY FORMAT(OrderDate, 'yyyy-MM') ORDER BY Month",
                description: "Monthly order trends with freight costs",
                use_case: "Time series analysis",
            },
            Suggestion {
                query: "SELECT DATENAME(WEEKDAY, OrderDate) AS DayOfWeek, COUNT(*) AS OrderCount FROM Orders GROUP BY DATENAME(WEEKDAY, OrderDate), DATEPART(WEEKDAY, OrderDate) ORDER BY DATEPART(WEEKDAY, OrderDate)",
                description: "Orders by day of week",
                use_case: "Weekly pattern analysis",
            },
        ],
    ),
];

const TABLE_FOCUS: &[(&str, Suggestion)] = &[
    (
        "orders",
        Suggestion {
            query: "SELECT TOP 10 * FROM Orders ORDER BY OrderDate DESC",
            description: "Most recent orders",
            use_case: "Recent activity review",
        },
    ),
    (
        "customers",
        Suggestion {
            query: "SELECT TOP 10 * FROM Customers ORDER BY 1",
            description: "Sample records from the Customers table",
            use_case: "Data exploration",
        },
    ),
    (
        "products",
        Suggestion {
            query: "SELECT TOP 10 * FROM Products ORDER BY 1",
            description: "Sample records from the Products table",
            use_case: "Data exploration",
        },
    ),
    (
        "employees",
        Suggestion {
            query: "SELECT TOP 10 * FROM Employees ORDER BY 1",
            description: "Sample records from the Employees table",
            use_case: "Data exploration",
        },
    ),
];

const DEFAULTS: &[Suggestion] = &[
    Suggestion {
        query: "SELECT COUNT(*) AS TotalOrders, SUM(Freight) AS TotalFreight FROM Orders",
        description: "Overall order statistics",
        use_case: "General overview",
    },
    Suggestion {
        query: "SELECT TOP 5 CompanyName FROM Customers ORDER BY CompanyName",
        description: "Sample customer list",
        use_case: "Data exploration",
    },
];

impl Suggestion {
    fn to_row(&self) -> Map<String, Value> {
        let mut row = Map::new();
        row.insert("query".into(), json!(self.query));
        row.insert("description".into(), json!(self.description));
        row.insert("use_case".into(), json!(self.use_case));
        row
    }
}

/// Pick up to eight read-only queries matching the words in `context`,
/// plus one for `table_focus` when it names a known table.
pub fn suggest_queries(
    context: &str,
    table_focus: Option<&str>,
) -> Result<QueryResult, GatewayError> {
    let context = context.to_lowercase();

    let mut picked: Vec<&Suggestion> = TOPICS
        .iter()
        .filter(|(triggers, _)| triggers.iter().any(|t| context.contains(t)))
        .flat_map(|(_, suggestions)| suggestions.iter())
        .collect();

    let focus = table_focus.map(|t| t.trim().to_lowercase());
    if let Some(focus) = &focus {
        if let Some((_, suggestion)) = TABLE_FOCUS.iter().find(|(table, _)| *table == focus.as_str()) {
            picked.push(suggestion);
        }
    }

    if picked.is_empty() {
        picked.extend(DEFAULTS.iter());
    }
    picked.truncate(MAX_SUGGESTIONS);

    let columns = vec![
        ColumnInfo::new("query", "nvarchar"),
        ColumnInfo::new("description", "nvarchar"),
        ColumnInfo::new("use_case", "nvarchar"),
    ];
    let rows = picked.iter().map(|s| s.to_row()).collect();

    Ok(QueryResult::from_rows(columns, rows).with_metadata(json!({
        "context_analyzed": context,
        "table_focus": focus,
    })))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::security::ReadOnlyGuard;

    fn queries(result: &QueryResult) -> Vec<&str> {
        result
            .rows
            .iter()
            .filter_map(|r| r["query"].as_str())
            .collect()
    }

    #[test]
    fn test_every_suggestion_passes_the_read_only_guard() {
        let guard = ReadOnlyGuard::new(10_000);
        let all = TOPICS
            .iter()
            .flat_map(|(_, s)| s.iter())
            .chain(TABLE_FOCUS.iter().map(|(_, s)| s))
            .chain(DEFAULTS.iter());
        for suggestion in all {
            assert!(guard.validate(suggestion.query).is_ok(), "{}", suggestion.query);
        }
    }

    #[test]
    fn test_keywords_select_topics() {
        let result = suggest_queries("Which customers bring the most revenue?", None).unwrap();
        let q = queries(&result);
        assert_eq!(q.len(), 4);
        assert!(q[0].contains("TotalSales"));
        assert!(q[2].contains("CustomerCount"));
    }

    #[test]
    fn test_table_focus_and_defaults() {
        let result = suggest_queries("anything", Some("Orders")).unwrap();
        assert_eq!(queries(&result), vec!["SELECT TOP 10 * FROM Orders ORDER BY OrderDate DESC"]);

        let result = suggest_queries("anything", Some("Shippers")).unwrap();
        assert_eq!(result.row_count, DEFAULTS.len());
    }

    #[test]
    fn test_capped_at_eight() {
        let result = suggest_queries(
            "sales customer product employee trend",
            Some("products"),
        )
        .unwrap();
        assert_eq!(result.row_count, MAX_SUGGESTIONS);
        assert_eq!(result.columns.len(), 3);
    }
}
