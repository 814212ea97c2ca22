//! The closed set of tool invocations and their arguments.
//!
//! Argument structs double as the MCP tool input schemas, so their doc
//! comments are what the calling model sees.

use crate::error::GatewayError;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};

/// Arguments for tools that take none.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct NoArgs {}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct TableArgs {
    /// Table name, either `Table` or `schema.Table` (brackets allowed, e.g. `[Order Details]`)
    pub table_name: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct SampleDataArgs {
    /// Table name, either `Table` or `schema.Table`
    pub table_name: String,
    /// Number of rows to return (default 5, max 100)
    #[serde(default)]
    pub limit: Option<i64>,
}

/// Searchable entity kinds.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum EntityKind {
    /// Customers by company name, contact name, city or country
    #[default]
    Customers,
    /// Products by product name, category name or supplier name
    Products,
}

impl EntityKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            EntityKind::Customers => "customers",
            EntityKind::Products => "products",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct SearchEntitiesArgs {
    /// Text to look for (case-insensitive substring match)
    #[serde(alias = "search_criteria")]
    pub criteria: String,
    /// Entity to search (default: customers)
    #[serde(default)]
    pub entity: EntityKind,
    /// Maximum results (default 10, max 100)
    #[serde(default)]
    pub limit: Option<i64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct SearchArgs {
    /// Text to look for (case-insensitive substring match)
    #[serde(alias = "search_criteria")]
    pub criteria: String,
    /// Maximum results (default 10, max 100)
    #[serde(default)]
    pub limit: Option<i64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct CustomerOrdersArgs {
    /// Customer identifier, e.g. `ALFKI`
    pub customer_id: String,
    /// Maximum orders to return, newest first (default 20, max 200)
    #[serde(default)]
    pub limit: Option<i64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct OrderArgs {
    /// Numeric order identifier, e.g. 10248
    pub order_id: i64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct ProductArgs {
    /// Numeric product identifier
    pub product_id: i64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct QueryArgs {
    /// A single read-only statement starting with SELECT or WITH
    pub query: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct PaginatedQueryArgs {
    /// A single read-only statement starting with SELECT or WITH, without OFFSET/FETCH
    pub query: String,
    /// Page number, 1-based (default 1)
    #[serde(default)]
    pub page: Option<i64>,
    /// Rows per page (default 20, max 100)
    #[serde(default)]
    pub page_size: Option<i64>,
    /// Also count all matching rows (may be slow on large tables)
    #[serde(default)]
    pub count_total: bool,
}

/// Grouping dimension for sales analytics.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum SalesGrouping {
    Day,
    #[default]
    Month,
    Quarter,
    Year,
    Category,
    Customer,
    Employee,
}

impl SalesGrouping {
    pub fn as_str(&self) -> &'static str {
        match self {
            SalesGrouping::Day => "day",
            SalesGrouping::Month => "month",
            SalesGrouping::Quarter => "quarter",
            SalesGrouping::Year => "year",
            SalesGrouping::Category => "category",
            SalesGrouping::Customer => "customer",
            SalesGrouping::Employee => "employee",
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct SalesAnalyticsArgs {
    /// Grouping level (default: month)
    #[serde(default)]
    pub group_by: SalesGrouping,
    /// Start date, YYYY-MM-DD (requires end_date)
    #[serde(default, alias = "date_range_start")]
    pub start_date: Option<String>,
    /// End date, YYYY-MM-DD, inclusive (requires start_date)
    #[serde(default, alias = "date_range_end")]
    pub end_date: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct SuggestQueriesArgs {
    /// What the user wants to analyze, in plain words
    pub context: String,
    /// Optional table to focus on: orders, customers, products or employees
    #[serde(default)]
    pub table_focus: Option<String>,
}

/// Comparison operators accepted in column filters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum FilterOp {
    Eq,
    Ne,
    Lt,
    #[serde(alias = "lte")]
    Le,
    Gt,
    #[serde(alias = "gte")]
    Ge,
    /// Case-insensitive substring match on the value
    #[serde(alias = "like")]
    Contains,
    /// Case-insensitive prefix match on the value
    StartsWith,
    /// Value must be a non-empty array
    In,
    /// Takes no value
    IsNull,
    /// Takes no value
    IsNotNull,
}

impl FilterOp {
    pub fn as_str(&self) -> &'static str {
        match self {
            FilterOp::Eq => "eq",
            FilterOp::Ne => "ne",
            FilterOp::Lt => "lt",
            FilterOp::Le => "le",
            FilterOp::Gt => "gt",
            FilterOp::Ge => "ge",
            FilterOp::Contains => "contains",
            FilterOp::StartsWith => "starts_with",
            FilterOp::In => "in",
            FilterOp::IsNull => "is_null",
            FilterOp::IsNotNull => "is_not_null",
        }
    }
}

/// One `column op value` condition; conditions are combined with AND.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct Filter {
    /// Column name as listed by get_table_schema
    pub column: String,
    /// Comparison operator
    pub op: FilterOp,
    /// Number, string or boolean; an array for `in`; omitted for `is_null`/`is_not_null`
    #[serde(default)]
    pub value: Value,
}

/// Accept filters as a list of `{column, op, value}` objects, or in the
/// `{"Column": {"op": value}}` shape, optionally JSON-encoded in a string.
fn filters_from_list_or_map<'de, D>(deserializer: D) -> Result<Vec<Filter>, D::Error>
where
    D: serde::Deserializer<'de>,
{
    use serde::de::Error;

    let value = Value::deserialize(deserializer)?;
    filters_from_value(value).map_err(D::Error::custom)
}

fn filters_from_value(value: Value) -> Result<Vec<Filter>, String> {
    match value {
        Value::Null => Ok(Vec::new()),
        Value::String(text) if text.trim().is_empty() => Ok(Vec::new()),
        Value::String(text) => {
            let decoded: Value = serde_json::from_str(&text)
                .map_err(|e| format!("filters is not valid JSON: {}", e))?;
            match decoded {
                Value::String(_) => Err("filters must be a list or an object".to_string()),
                other => filters_from_value(other),
            }
        }
        Value::Array(_) => serde_json::from_value(value).map_err(|e| e.to_string()),
        Value::Object(columns) => {
            let mut filters = Vec::new();
            for (column, condition) in columns {
                let Value::Object(conditions) = condition else {
                    // bare values mean equality
                    filters.push(Filter {
                        column,
                        op: FilterOp::Eq,
                        value: condition,
                    });
                    continue;
                };
                for (op, value) in conditions {
                    let op: FilterOp = serde_json::from_value(Value::String(op.clone()))
                        .map_err(|_| format!("unknown filter operator '{}'", op))?;
                    filters.push(Filter {
                        column: column.clone(),
                        op,
                        value,
                    });
                }
            }
            Ok(filters)
        }
        _ => Err("filters must be a list or an object".to_string()),
    }
}

/// Accept a list of strings, or the same list JSON-encoded in a string.
fn names_from_list_or_string<'de, D>(deserializer: D) -> Result<Vec<String>, D::Error>
where
    D: serde::Deserializer<'de>,
{
    use serde::de::Error;

    match Value::deserialize(deserializer)? {
        Value::Null => Ok(Vec::new()),
        Value::String(text) if text.trim().is_empty() => Ok(Vec::new()),
        Value::String(text) => serde_json::from_str(&text).map_err(D::Error::custom),
        other => serde_json::from_value(other).map_err(D::Error::custom),
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct AdvancedSearchArgs {
    /// Table name, either `Table` or `schema.Table`
    pub table_name: String,
    /// Conditions, e.g. `[{"column": "Country", "op": "eq", "value": "Germany"}]`
    #[serde(default, deserialize_with = "filters_from_list_or_map")]
    pub filters: Vec<Filter>,
    /// Column to sort by, optionally followed by ASC or DESC, e.g. `OrderDate DESC`
    #[serde(default)]
    pub sort_by: Option<String>,
    /// Maximum results (default 20, max 200)
    #[serde(default)]
    pub limit: Option<i64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct RangeSearchArgs {
    /// Table name, either `Table` or `schema.Table`
    pub table_name: String,
    /// Numeric or date column to bound
    pub column: String,
    /// Inclusive lower bound (number, or date as YYYY-MM-DD)
    pub min_value: Value,
    /// Inclusive upper bound (number, or date as YYYY-MM-DD)
    pub max_value: Value,
    /// Further conditions combined with AND
    #[serde(
        default,
        alias = "additional_filters",
        deserialize_with = "filters_from_list_or_map"
    )]
    pub filters: Vec<Filter>,
    /// Maximum results (default 50, max 200)
    #[serde(default)]
    pub limit: Option<i64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct DataProfilingArgs {
    /// Table name, either `Table` or `schema.Table`
    pub table_name: String,
    /// Columns to profile; empty profiles every column
    #[serde(default, deserialize_with = "names_from_list_or_string")]
    pub columns: Vec<String>,
}

/// Aggregate functions available to custom aggregation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum AggregateFn {
    /// Row count; the column is optional
    Count,
    CountDistinct,
    Sum,
    Avg,
    Min,
    Max,
}

impl AggregateFn {
    pub fn as_str(&self) -> &'static str {
        match self {
            AggregateFn::Count => "count",
            AggregateFn::CountDistinct => "count_distinct",
            AggregateFn::Sum => "sum",
            AggregateFn::Avg => "avg",
            AggregateFn::Min => "min",
            AggregateFn::Max => "max",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct Aggregate {
    /// Aggregate function
    pub function: AggregateFn,
    /// Column to aggregate; omit for `count` to count rows
    #[serde(default)]
    pub column: Option<String>,
    /// Output column name (default: `<function>_<column>`)
    #[serde(default)]
    pub alias: Option<String>,
}

/// A condition on an aggregate, referenced by its output name.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct HavingCondition {
    /// Output name of one of the aggregates
    pub aggregate: String,
    /// One of eq, ne, lt, le, gt, ge
    pub op: FilterOp,
    /// Numeric threshold
    pub value: Value,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct CustomAggregationArgs {
    /// Table name, either `Table` or `schema.Table`
    pub table_name: String,
    /// Columns to group by; empty aggregates the whole table
    #[serde(
        default,
        alias = "group_by_columns",
        deserialize_with = "names_from_list_or_string"
    )]
    pub group_by: Vec<String>,
    /// At least one aggregate, e.g. `[{"function": "sum", "column": "Freight"}]`
    pub aggregates: Vec<Aggregate>,
    /// Row conditions applied before grouping
    #[serde(
        default,
        alias = "where_conditions",
        deserialize_with = "filters_from_list_or_map"
    )]
    pub filters: Vec<Filter>,
    /// Conditions on aggregates applied after grouping
    #[serde(default, alias = "having_conditions")]
    pub having: Vec<HavingCondition>,
    /// Maximum groups returned (default 100, max 1000)
    #[serde(default)]
    pub limit: Option<i64>,
}

/// A validated-by-shape request for one gateway tool.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "tool", content = "arguments", rename_all = "snake_case")]
pub enum ToolInvocation {
    ListTables(NoArgs),
    GetTableSchema(TableArgs),
    GetSampleData(SampleDataArgs),
    SearchEntities(SearchEntitiesArgs),
    SearchCustomers(SearchArgs),
    SearchProducts(SearchArgs),
    GetCustomerOrders(CustomerOrdersArgs),
    GetOrderDetails(OrderArgs),
    GetProductInfo(ProductArgs),
    ExecuteQuery(QueryArgs),
    PaginatedQuery(PaginatedQueryArgs),
    SalesAnalytics(SalesAnalyticsArgs),
    AdvancedSearch(AdvancedSearchArgs),
    RangeSearch(RangeSearchArgs),
    DataProfiling(DataProfilingArgs),
    CustomAggregation(CustomAggregationArgs),
    SuggestQueries(SuggestQueriesArgs),
    HealthCheck(NoArgs),
}

/// Every tool name the gateway accepts.
pub const TOOL_NAMES: &[&str] = &[
    "list_tables",
    "get_table_schema",
    "get_sample_data",
    "search_entities",
    "search_customers",
    "search_products",
    "get_customer_orders",
    "get_order_details",
    "get_product_info",
    "execute_query",
    "paginated_query",
    "sales_analytics",
    "advanced_search",
    "range_search",
    "data_profiling",
    "custom_aggregation",
    "suggest_queries",
    "health_check",
];

impl ToolInvocation {
    /// Parse a raw tool call. Unknown tools and arguments that do not fit the
    /// tool's schema are validation errors.
    pub fn from_call(name: &str, arguments: Option<Map<String, Value>>) -> Result<Self, GatewayError> {
        if !TOOL_NAMES.contains(&name) {
            return Err(GatewayError::validation(format!("Unknown tool '{}'", name)));
        }

        let envelope = json!({
            "tool": name,
            "arguments": Value::Object(arguments.unwrap_or_default()),
        });

        serde_json::from_value(envelope).map_err(|e| {
            GatewayError::validation(format!("Invalid arguments for '{}': {}", name, e))
        })
    }

    pub fn name(&self) -> &'static str {
        match self {
            ToolInvocation::ListTables(_) => "list_tables",
            ToolInvocation::GetTableSchema(_) => "get_table_schema",
            ToolInvocation::GetSampleData(_) => "get_sample_data",
            ToolInvocation::SearchEntities(_) => "search_entities",
            ToolInvocation::SearchCustomers(_) => "search_customers",
            ToolInvocation::SearchProducts(_) => "search_products",
            ToolInvocation::GetCustomerOrders(_) => "get_customer_orders",
            ToolInvocation::GetOrderDetails(_) => "get_order_details",
            ToolInvocation::GetProductInfo(_) => "get_product_info",
            ToolInvocation::ExecuteQuery(_) => "execute_query",
            ToolInvocation::PaginatedQuery(_) => "paginated_query",
            ToolInvocation::SalesAnalytics(_) => "sales_analytics",
            ToolInvocation::AdvancedSearch(_) => "advanced_search",
            ToolInvocation::RangeSearch(_) => "range_search",
            ToolInvocation::DataProfiling(_) => "data_profiling",
            ToolInvocation::CustomAggregation(_) => "custom_aggregation",
            ToolInvocation::SuggestQueries(_) => "suggest_queries",
            ToolInvocation::HealthCheck(_) => "health_check",
        }
    }
}
