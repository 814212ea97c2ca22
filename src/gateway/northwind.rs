//! Northwind entity lookups: customers, products and orders.

use super::{resolve_limit, EntityKind, Gateway};
use crate::database::{QueryResult, SqlParam, Statement};
use crate::error::GatewayError;
use crate::security::contains_pattern;
use serde_json::{json, Value};

/// Longest accepted search term.
const MAX_CRITERIA_CHARS: usize = 200;

/// Longest accepted customer identifier.
const MAX_CUSTOMER_ID_CHARS: usize = 10;

/// A searchable entity: fixed projection, searchable columns and order.
struct EntitySearch {
    select: &'static str,
    searchable: &'static [&'static str],
    order_by: &'static str,
}

const CUSTOMER_SEARCH: EntitySearch = EntitySearch {
    select: "SELECT TOP (@P1) CustomerID, CompanyName, ContactName, ContactTitle, \
             Address, City, Region, PostalCode, Country, Phone \
             FROM Customers",
    searchable: &["CompanyName", "ContactName", "City", "Country"],
    order_by: "CompanyName",
};

const PRODUCT_SEARCH: EntitySearch = EntitySearch {
    select: "SELECT TOP (@P1) p.ProductID, p.ProductName, c.CategoryName, \
             s.CompanyName AS SupplierName, p.QuantityPerUnit, p.UnitPrice, \
             p.UnitsInStock, p.UnitsOnOrder, p.ReorderLevel, p.Discontinued \
             FROM Products p \
             LEFT JOIN Categories c ON p.CategoryID = c.CategoryID \
             LEFT JOIN Suppliers s ON p.SupplierID = s.SupplierID",
    searchable: &["p.ProductName", "c.CategoryName", "s.CompanyName"],
    order_by: "p.ProductName",
};

impl EntityKind {
    fn search(&self) -> &'static EntitySearch {
        match self {
            EntityKind::Customers => &CUSTOMER_SEARCH,
            EntityKind::Products => &PRODUCT_SEARCH,
        }
    }
}

impl EntitySearch {
    fn statement(&self, pattern: String, limit: i64) -> Statement {
        let predicate = self
            .searchable
            .iter()
            .map(|column| format!("LOWER({}) LIKE @P2", column))
            .collect::<Vec<_>>()
            .join(" OR ");

        Statement::new(format!(
            "{} WHERE {} ORDER BY {}",
            self.select, predicate, self.order_by
        ))
        .bind(SqlParam::Int(limit))
        .bind(SqlParam::Text(pattern))
    }
}

const CUSTOMER_EXISTS_SQL: &str = "SELECT CustomerID FROM Customers WHERE CustomerID = @P1";

const CUSTOMER_ORDERS_SQL: &str = "\
SELECT TOP (@P1) OrderID, CustomerID, EmployeeID, OrderDate, RequiredDate, ShippedDate, \
ShipVia, Freight, ShipName, ShipCity, ShipCountry \
FROM Orders \
WHERE CustomerID = @P2 \
ORDER BY OrderDate DESC, OrderID DESC";

const ORDER_DETAILS_SQL: &str = "\
SELECT o.OrderID, o.CustomerID, c.CompanyName, o.EmployeeID, o.OrderDate, o.RequiredDate, \
o.ShippedDate, o.ShipVia, o.Freight, o.ShipName, o.ShipAddress, o.ShipCity, o.ShipRegion, \
o.ShipPostalCode, o.ShipCountry, \
od.ProductID, p.ProductName, od.UnitPrice, od.Quantity, od.Discount, \
CAST(od.UnitPrice * od.Quantity * (1 - od.Discount) AS DECIMAL(19, 2)) AS LineTotal \
FROM Orders o \
LEFT JOIN Customers c ON c.CustomerID = o.CustomerID \
LEFT JOIN [Order Details] od ON od.OrderID = o.OrderID \
LEFT JOIN Products p ON p.ProductID = od.ProductID \
WHERE o.OrderID = @P1 \
ORDER BY od.ProductID";

const PRODUCT_INFO_SQL: &str = "\
SELECT p.ProductID, p.ProductName, p.SupplierID, s.CompanyName AS SupplierName, \
s.Country AS SupplierCountry, p.CategoryID, c.CategoryName, c.Description AS CategoryDescription, \
p.QuantityPerUnit, p.UnitPrice, p.UnitsInStock, p.UnitsOnOrder, p.ReorderLevel, p.Discontinued \
FROM Products p \
LEFT JOIN Suppliers s ON p.SupplierID = s.SupplierID \
LEFT JOIN Categories c ON p.CategoryID = c.CategoryID \
WHERE p.ProductID = @P1";

/// Trim and upper-case a customer id; reject anything that is not 1-10
/// ASCII alphanumerics.
fn normalize_customer_id(raw: &str) -> Result<String, GatewayError> {
    let id = raw.trim();
    if id.is_empty() {
        return Err(GatewayError::validation("customer_id cannot be empty"));
    }
    if id.chars().count() > MAX_CUSTOMER_ID_CHARS || !id.chars().all(|c| c.is_ascii_alphanumeric())
    {
        return Err(GatewayError::validation(format!(
            "customer_id must be 1-{} letters or digits, got '{}'",
            MAX_CUSTOMER_ID_CHARS, id
        )));
    }
    Ok(id.to_ascii_uppercase())
}

fn positive_id(name: &str, value: i64) -> Result<i64, GatewayError> {
    if value <= 0 {
        return Err(GatewayError::validation(format!(
            "{} must be a positive integer, got {}",
            name, value
        )));
    }
    Ok(value)
}

impl Gateway {
    /// Case-insensitive substring search across an entity's fixed columns.
    pub async fn search_entities(
        &self,
        criteria: &str,
        entity: EntityKind,
        limit: Option<i64>,
    ) -> Result<QueryResult, GatewayError> {
        let limit = resolve_limit("limit", limit, self.config.limits.search)?;
        let criteria = criteria.trim();
        if criteria.is_empty() {
            return Err(GatewayError::validation("Search criteria cannot be empty"));
        }
        if criteria.chars().count() > MAX_CRITERIA_CHARS {
            return Err(GatewayError::validation(format!(
                "Search criteria exceeds {} characters",
                MAX_CRITERIA_CHARS
            )));
        }

        let statement = entity.search().statement(contains_pattern(criteria), limit);
        let mut session = self.session().await?;
        let result = session.query(&statement).await?;

        Ok(result.with_metadata(json!({
            "entity": entity.as_str(),
            "criteria": criteria,
        })))
    }

    /// Most recent orders of an existing customer.
    pub async fn get_customer_orders(
        &self,
        customer_id: &str,
        limit: Option<i64>,
    ) -> Result<QueryResult, GatewayError> {
        let limit = resolve_limit("limit", limit, self.config.limits.customer_orders)?;
        let customer_id = normalize_customer_id(customer_id)?;

        let mut session = self.session().await?;
        let exists = session
            .query(&Statement::new(CUSTOMER_EXISTS_SQL).bind(SqlParam::Text(customer_id.clone())))
            .await?;
        if exists.is_empty() {
            return Err(GatewayError::not_found("Customer", customer_id));
        }

        let statement = Statement::new(CUSTOMER_ORDERS_SQL)
            .bind(SqlParam::Int(limit))
            .bind(SqlParam::Text(customer_id.clone()));
        let result = session.query(&statement).await?;

        Ok(result.with_metadata(json!({ "customer_id": customer_id })))
    }

    /// An order header joined with its line items.
    pub async fn get_order_details(&self, order_id: i64) -> Result<QueryResult, GatewayError> {
        let order_id = positive_id("order_id", order_id)?;

        let mut session = self.session().await?;
        let result = session
            .query(&Statement::new(ORDER_DETAILS_SQL).bind(SqlParam::Int(order_id)))
            .await?;
        if result.is_empty() {
            return Err(GatewayError::not_found("Order", order_id.to_string()));
        }

        let lines: Vec<_> = result
            .rows
            .iter()
            .filter(|row| row.get("ProductID").is_some_and(|v| !v.is_null()))
            .collect();
        let order_total: f64 = lines
            .iter()
            .filter_map(|row| row.get("LineTotal").and_then(number))
            .sum();
        let metadata = json!({
            "order_id": order_id,
            "line_count": lines.len(),
            "order_total": round_cents(order_total),
        });

        Ok(result.with_metadata(metadata))
    }

    /// A single product with supplier and category names.
    pub async fn get_product_info(&self, product_id: i64) -> Result<QueryResult, GatewayError> {
        let product_id = positive_id("product_id", product_id)?;

        let mut session = self.session().await?;
        let result = session
            .query(&Statement::new(PRODUCT_INFO_SQL).bind(SqlParam::Int(product_id)))
            .await?;
        if result.is_empty() {
            return Err(GatewayError::not_found("Product", product_id.to_string()));
        }
        Ok(result)
    }
}

/// Numeric value of a cell; decimals may arrive as numbers or strings.
pub(super) fn number(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.parse().ok(),
        _ => None,
    }
}

pub(super) fn round_cents(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

#[cfg(test)]
mod tests {
    use super::super::testing::{gateway_with, rows, FakeBackend};
    use super::*;
    use crate::error::ErrorKind;
    use crate::gateway::{CustomerOrdersArgs, SearchEntitiesArgs, ToolInvocation};

    fn northwind() -> FakeBackend {
        FakeBackend::new(|statement| {
            let text = statement.text.as_str();
            if text.starts_with("SELECT CustomerID FROM Customers") {
                return Ok(match statement.params.first() {
                    Some(SqlParam::Text(id)) if id == "ALFKI" => {
                        rows(vec![json!({"CustomerID": "ALFKI"})])
                    }
                    _ => QueryResult::empty(),
                });
            }
            if text.contains("FROM Orders WHERE CustomerID") {
                let all = vec![
                    json!({"OrderID": 11011, "OrderDate": "1998-04-09T00:00:00"}),
                    json!({"OrderID": 10952, "OrderDate": "1998-03-16T00:00:00"}),
                    json!({"OrderID": 10835, "OrderDate": "1998-01-15T00:00:00"}),
                    json!({"OrderID": 10702, "OrderDate": "1997-10-13T00:00:00"}),
                    json!({"OrderID": 10692, "OrderDate": "1997-10-03T00:00:00"}),
                    json!({"OrderID": 10643, "OrderDate": "1997-08-25T00:00:00"}),
                ];
                let top = match statement.params.first() {
                    Some(SqlParam::Int(n)) => *n as usize,
                    _ => all.len(),
                };
                return Ok(rows(all.into_iter().take(top).collect()));
            }
            if text.contains("WHERE o.OrderID = @P1") {
                return Ok(match statement.params.first() {
                    Some(SqlParam::Int(10248)) => rows(vec![
                        json!({"OrderID": 10248, "ProductID": 11, "ProductName": "Queso Cabrales", "LineTotal": 168.0}),
                        json!({"OrderID": 10248, "ProductID": 42, "ProductName": "Singaporean Hokkien Fried Mee", "LineTotal": 98.0}),
                        json!({"OrderID": 10248, "ProductID": 72, "ProductName": "Mozzarella di Giovanni", "LineTotal": "174.00"}),
                    ]),
                    Some(SqlParam::Int(20000)) => rows(vec![
                        json!({"OrderID": 20000, "ProductID": null, "ProductName": null, "LineTotal": null}),
                    ]),
                    _ => QueryResult::empty(),
                });
            }
            if text.contains("WHERE p.ProductID = @P1") {
                return Ok(match statement.params.first() {
                    Some(SqlParam::Int(1)) => rows(vec![json!({"ProductID": 1, "ProductName": "Chai"})]),
                    _ => QueryResult::empty(),
                });
            }
            // searches: nothing contains the sentinel term
            Ok(QueryResult::empty())
        })
    }

    #[test]
    fn test_normalize_customer_id() {
        assert_eq!(normalize_customer_id(" alfki ").unwrap(), "ALFKI");
        assert_eq!(normalize_customer_id("NOSUCHID").unwrap(), "NOSUCHID");
        assert!(normalize_customer_id("").is_err());
        assert!(normalize_customer_id("   ").is_err());
        assert!(normalize_customer_id("AL'FK").is_err());
        assert!(normalize_customer_id("ABCDEFGHIJK").is_err());
    }

    #[test]
    fn test_search_statement_binds_escaped_pattern() {
        let statement = CUSTOMER_SEARCH.statement(contains_pattern("50%_Off"), 10);
        assert_eq!(
            statement.text.matches("LIKE @P2").count(),
            CUSTOMER_SEARCH.searchable.len()
        );
        assert!(statement.text.contains(" OR "));
        assert!(!statement.text.contains("50"));
        assert_eq!(
            statement.params,
            vec![SqlParam::Int(10), SqlParam::Text("%50[%][_]off%".into())]
        );
    }

    #[tokio::test]
    async fn test_search_without_matches_is_empty_result() {
        let gateway = gateway_with(northwind());
        let result = gateway
            .search_entities("zzzzznotfound", EntityKind::Customers, Some(10))
            .await
            .unwrap();
        assert_eq!(result.row_count, 0);
        assert!(result.rows.is_empty());
    }

    #[tokio::test]
    async fn test_search_products_uses_product_columns() {
        let backend = northwind();
        let gateway = gateway_with(backend.clone());
        gateway
            .search_entities("Chai", EntityKind::Products, None)
            .await
            .unwrap();
        let statement = backend.last_statement();
        assert!(statement.text.contains("LOWER(c.CategoryName) LIKE @P2"));
        assert!(statement.text.ends_with("ORDER BY p.ProductName"));
        assert_eq!(statement.params[0], SqlParam::Int(10));
    }

    #[tokio::test]
    async fn test_search_validation_never_acquires() {
        let backend = northwind();
        let gateway = gateway_with(backend.clone());

        let cases = [
            ("   ", Some(10)),
            ("berlin", Some(0)),
            ("berlin", Some(101)),
        ];
        for (criteria, limit) in cases {
            let err = gateway
                .invoke(ToolInvocation::SearchEntities(SearchEntitiesArgs {
                    criteria: criteria.into(),
                    entity: EntityKind::Customers,
                    limit,
                }))
                .await
                .unwrap_err();
            assert_eq!(err.kind(), ErrorKind::Validation);
        }
        let err = gateway
            .search_entities(&"x".repeat(201), EntityKind::Products, None)
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Validation);
        assert_eq!(backend.acquires(), 0);
    }

    #[tokio::test]
    async fn test_customer_orders_respects_limit() {
        let backend = northwind();
        let gateway = gateway_with(backend.clone());
        let result = gateway.get_customer_orders("alfki", Some(5)).await.unwrap();

        assert_eq!(result.row_count, 5);
        let ids: Vec<i64> = result
            .rows
            .iter()
            .filter_map(|r| r["OrderID"].as_i64())
            .collect();
        assert_eq!(ids, vec![11011, 10952, 10835, 10702, 10692]);

        let statement = backend.last_statement();
        assert!(statement.text.ends_with("ORDER BY OrderDate DESC, OrderID DESC"));
        assert_eq!(statement.params[1], SqlParam::Text("ALFKI".into()));
        // existence check and listing share one session
        assert_eq!(backend.acquires(), 1);
    }

    #[tokio::test]
    async fn test_customer_orders_unknown_and_empty_ids() {
        let backend = northwind();
        let gateway = gateway_with(backend.clone());

        let err = gateway
            .invoke(ToolInvocation::GetCustomerOrders(CustomerOrdersArgs {
                customer_id: "NOSUCHID".into(),
                limit: Some(5),
            }))
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::NotFound);

        let before = backend.acquires();
        let err = gateway
            .invoke(ToolInvocation::GetCustomerOrders(CustomerOrdersArgs {
                customer_id: "".into(),
                limit: Some(5),
            }))
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Validation);
        assert_eq!(backend.acquires(), before);
    }

    #[tokio::test]
    async fn test_order_details_totals_lines() {
        let gateway = gateway_with(northwind());
        let result = gateway.get_order_details(10248).await.unwrap();
        assert_eq!(result.row_count, 3);

        let metadata = result.metadata.unwrap();
        assert_eq!(metadata["line_count"], 3);
        assert_eq!(metadata["order_total"], 440.0);
    }

    #[tokio::test]
    async fn test_order_without_lines_is_not_an_error() {
        let gateway = gateway_with(northwind());
        let result = gateway.get_order_details(20000).await.unwrap();
        assert_eq!(result.metadata.unwrap()["line_count"], 0);
    }

    #[tokio::test]
    async fn test_unknown_order_and_product_are_not_found() {
        let gateway = gateway_with(northwind());
        assert_eq!(
            gateway.get_order_details(1).await.unwrap_err().kind(),
            ErrorKind::NotFound
        );
        assert_eq!(
            gateway.get_product_info(9999).await.unwrap_err().kind(),
            ErrorKind::NotFound
        );
        assert!(gateway.get_product_info(1).await.is_ok());
    }

    #[tokio::test]
    async fn test_non_positive_ids_are_rejected_locally() {
        let backend = northwind();
        let gateway = gateway_with(backend.clone());
        assert_eq!(
            gateway.get_order_details(0).await.unwrap_err().kind(),
            ErrorKind::Validation
        );
        assert_eq!(
            gateway.get_product_info(-7).await.unwrap_err().kind(),
            ErrorKind::Validation
        );
        assert_eq!(backend.acquires(), 0);
    }
}
