//! MCP tools for the Northwind query gateway.
//!
//! Every tool is a thin adapter: it wraps its typed input in a
//! [`ToolInvocation`] and hands it to the gateway.
//!
//! - `list_tables`: List base tables
//! - `get_table_schema`: Column definitions of a table
//! - `get_sample_data`: First rows of a table
//! - `search_entities`: Substring search over customers or products
//! - `search_customers` / `search_products`: Entity-specific search
//! - `get_customer_orders`: Recent orders of a customer
//! - `get_order_details`: Order header with line items
//! - `get_product_info`: Product with supplier and category
//! - `execute_query`: Run a read-only SELECT
//! - `paginated_query`: Run a read-only SELECT one page at a time
//! - `sales_analytics`: Grouped sales totals
//! - `advanced_search`: Rows of any table matching column filters
//! - `range_search`: Rows whose numeric or date column lies in a range
//! - `data_profiling`: Per-column statistics and frequent values
//! - `custom_aggregation`: Grouped aggregates over any table
//! - `suggest_queries`: Suggested queries for an analysis goal
//! - `health_check`: Test database connectivity

use crate::gateway::{
    AdvancedSearchArgs, CustomAggregationArgs, CustomerOrdersArgs, DataProfilingArgs, NoArgs,
    OrderArgs, PaginatedQueryArgs, ProductArgs, QueryArgs, RangeSearchArgs, SalesAnalyticsArgs,
    SampleDataArgs, SearchArgs, SearchEntitiesArgs, SuggestQueriesArgs, TableArgs,
    ToolInvocation,
};
use crate::server::AzureSqlMcpServer;
use rmcp::handler::server::router::tool::ToolRouter;
use rmcp::handler::server::wrapper::Parameters;
use rmcp::model::CallToolResult;
use rmcp::{tool, tool_router, ErrorData as McpError};
use tracing::debug;

/// Build the router for every tool below.
pub(crate) fn create_tool_router() -> ToolRouter<AzureSqlMcpServer> {
    AzureSqlMcpServer::tool_router()
}

#[tool_router]
impl AzureSqlMcpServer {
    // =========================================================================
    // Schema discovery
    // =========================================================================

    #[tool(description = "List all tables in the database with their schema names.")]
    async fn list_tables(&self) -> Result<CallToolResult, McpError> {
        self.run(ToolInvocation::ListTables(NoArgs {})).await
    }

    #[tool(
        description = "Get column names, data types, nullability, defaults and maximum lengths for a table.\nAccepts `Table` or `schema.Table`."
    )]
    async fn get_table_schema(
        &self,
        Parameters(args): Parameters<TableArgs>,
    ) -> Result<CallToolResult, McpError> {
        debug!("Describing table: {}", args.table_name);
        self.run(ToolInvocation::GetTableSchema(args)).await
    }

    #[tool(description = "Get sample rows from a table (default 5, max 100).")]
    async fn get_sample_data(
        &self,
        Parameters(args): Parameters<SampleDataArgs>,
    ) -> Result<CallToolResult, McpError> {
        self.run(ToolInvocation::GetSampleData(args)).await
    }

    // =========================================================================
    // Entity search and lookup
    // =========================================================================

    #[tool(
        description = "Case-insensitive search over customers (company, contact, city, country) or products (product, category, supplier).\nNo matches returns an empty result."
    )]
    async fn search_entities(
        &self,
        Parameters(args): Parameters<SearchEntitiesArgs>,
    ) -> Result<CallToolResult, McpError> {
        self.run(ToolInvocation::SearchEntities(args)).await
    }

    #[tool(description = "Search customers by company name, contact name, city or country.")]
    async fn search_customers(
        &self,
        Parameters(args): Parameters<SearchArgs>,
    ) -> Result<CallToolResult, McpError> {
        self.run(ToolInvocation::SearchCustomers(args)).await
    }

    #[tool(description = "Search products by product name, category or supplier.")]
    async fn search_products(
        &self,
        Parameters(args): Parameters<SearchArgs>,
    ) -> Result<CallToolResult, McpError> {
        self.run(ToolInvocation::SearchProducts(args)).await
    }

    #[tool(
        description = "Get a customer's most recent orders, newest first (default 20, max 200).\nUnknown customer ids return a not_found error."
    )]
    async fn get_customer_orders(
        &self,
        Parameters(args): Parameters<CustomerOrdersArgs>,
    ) -> Result<CallToolResult, McpError> {
        self.run(ToolInvocation::GetCustomerOrders(args)).await
    }

    #[tool(description = "Get an order with its line items, product names and line totals.")]
    async fn get_order_details(
        &self,
        Parameters(args): Parameters<OrderArgs>,
    ) -> Result<CallToolResult, McpError> {
        self.run(ToolInvocation::GetOrderDetails(args)).await
    }

    #[tool(description = "Get a product with its supplier and category.")]
    async fn get_product_info(
        &self,
        Parameters(args): Parameters<ProductArgs>,
    ) -> Result<CallToolResult, McpError> {
        self.run(ToolInvocation::GetProductInfo(args)).await
    }

    // =========================================================================
    // Query execution
    // =========================================================================

    #[tool(
        description = "Execute a read-only SQL query. Only a single SELECT (optionally starting with WITH) is accepted; data or schema changes are rejected.\nLarge results are truncated."
    )]
    async fn execute_query(
        &self,
        Parameters(args): Parameters<QueryArgs>,
    ) -> Result<CallToolResult, McpError> {
        self.run(ToolInvocation::ExecuteQuery(args)).await
    }

    #[tool(
        description = "Execute a read-only SELECT one page at a time (page_size default 20, max 100).\nDo not include OFFSET/FETCH; set count_total to also get the total row count."
    )]
    async fn paginated_query(
        &self,
        Parameters(args): Parameters<PaginatedQueryArgs>,
    ) -> Result<CallToolResult, McpError> {
        self.run(ToolInvocation::PaginatedQuery(args)).await
    }

    // =========================================================================
    // Analysis helpers
    // =========================================================================

    #[tool(
        description = "Sales totals grouped by day, month, quarter, year, category, customer or employee.\nOptional start_date/end_date (YYYY-MM-DD) must be given together."
    )]
    async fn sales_analytics(
        &self,
        Parameters(args): Parameters<SalesAnalyticsArgs>,
    ) -> Result<CallToolResult, McpError> {
        self.run(ToolInvocation::SalesAnalytics(args)).await
    }

    // =========================================================================
    // Structured exploration
    // =========================================================================

    #[tool(
        description = "Search any table with column filters combined by AND.\nOperators: eq, ne, lt, le, gt, ge, contains, starts_with, in, is_null, is_not_null. Optional sort_by (`Column` or `Column DESC`); limit default 20, max 200."
    )]
    async fn advanced_search(
        &self,
        Parameters(args): Parameters<AdvancedSearchArgs>,
    ) -> Result<CallToolResult, McpError> {
        debug!("Filtered search on {}", args.table_name);
        self.run(ToolInvocation::AdvancedSearch(args)).await
    }

    #[tool(
        description = "Rows whose numeric or date column lies between min_value and max_value (inclusive), ordered by that column.\nOptional extra filters; limit default 50, max 200."
    )]
    async fn range_search(
        &self,
        Parameters(args): Parameters<RangeSearchArgs>,
    ) -> Result<CallToolResult, McpError> {
        self.run(ToolInvocation::RangeSearch(args)).await
    }

    #[tool(
        description = "Profile table columns: null and distinct counts, value or length ranges and the most frequent values.\nLeave columns empty to profile every column."
    )]
    async fn data_profiling(
        &self,
        Parameters(args): Parameters<DataProfilingArgs>,
    ) -> Result<CallToolResult, McpError> {
        self.run(ToolInvocation::DataProfiling(args)).await
    }

    #[tool(
        description = "Group a table by columns and compute count, count_distinct, sum, avg, min or max.\nOptional row filters and HAVING conditions on aggregate aliases; limit default 100, max 1000."
    )]
    async fn custom_aggregation(
        &self,
        Parameters(args): Parameters<CustomAggregationArgs>,
    ) -> Result<CallToolResult, McpError> {
        self.run(ToolInvocation::CustomAggregation(args)).await
    }

    #[tool(
        description = "Suggest ready-to-run read-only queries for an analysis goal (sales, customers, products, employees, trends)."
    )]
    async fn suggest_queries(
        &self,
        Parameters(args): Parameters<SuggestQueriesArgs>,
    ) -> Result<CallToolResult, McpError> {
        self.run(ToolInvocation::SuggestQueries(args)).await
    }

    #[tool(description = "Test database connectivity and report latency and connection usage.")]
    async fn health_check(&self) -> Result<CallToolResult, McpError> {
        self.run(ToolInvocation::HealthCheck(NoArgs {})).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gateway::TOOL_NAMES;

    #[test]
    fn test_router_exposes_every_gateway_tool() {
        let router = create_tool_router();
        let mut listed: Vec<String> = router
            .list_all()
            .into_iter()
            .map(|tool| tool.name.to_string())
            .collect();
        listed.sort();

        let mut expected: Vec<String> = TOOL_NAMES.iter().map(|s| s.to_string()).collect();
        expected.sort();
        assert_eq!(listed, expected);
    }
}
