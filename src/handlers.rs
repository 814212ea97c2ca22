//! ServerHandler implementation for the Azure SQL MCP server.
//!
//! This module implements the rmcp `ServerHandler` trait which defines how
//! the server responds to MCP protocol requests.

use crate::config::Config;
use crate::server::AzureSqlMcpServer;
use rmcp::handler::server::ServerHandler;
use rmcp::model::{Implementation, ProtocolVersion, ServerCapabilities, ServerInfo};
use rmcp::tool_handler;
use tracing::info;

/// The `#[tool_handler]` macro wires up tool routing automatically.
/// It generates the `list_tools` and `call_tool` method implementations.
#[tool_handler]
impl ServerHandler for AzureSqlMcpServer {
    /// Server identification - called during initialization handshake.
    fn get_info(&self) -> ServerInfo {
        info!("MCP client requesting server info");

        ServerInfo {
            protocol_version: ProtocolVersion::LATEST,

            capabilities: ServerCapabilities::builder().enable_tools().build(),

            server_info: Implementation {
                name: env!("CARGO_PKG_NAME").to_string(),
                title: Some("Azure SQL MCP Server".to_string()),
                version: env!("CARGO_PKG_VERSION").to_string(),
                icons: None,
                website_url: None,
            },

            instructions: Some(build_instructions(self.gateway.config())),
        }
    }
}

/// Build server instructions from the connection profile and limits.
fn build_instructions(config: &Config) -> String {
    let limits = &config.limits;
    let mut instructions = String::new();

    instructions.push_str("# Azure SQL MCP Server\n\n");
    instructions.push_str("Read-only access to a Northwind-style SQL Server database.\n\n");
    instructions.push_str(&format!(
        "**Connected to database:** `{}`\n\n",
        config.database.database
    ));

    instructions.push_str("## Available Operations\n\n");
    instructions.push_str("### Schema discovery\n");
    instructions.push_str("- `list_tables`, `get_table_schema`, `get_sample_data`\n\n");
    instructions.push_str("### Entities\n");
    instructions.push_str("- `search_entities` (customers or products), `search_customers`, `search_products`\n");
    instructions.push_str("- `get_customer_orders`, `get_order_details`, `get_product_info`\n\n");
    instructions.push_str("### Queries\n");
    instructions.push_str("- **Read-only**: only a single SELECT (optionally starting with WITH) is accepted\n");
    instructions.push_str(&format!(
        "- `execute_query` returns at most {} rows; use `paginated_query` (max {} per page) for more\n",
        limits.max_result_rows, limits.page_size.max
    ));
    instructions.push_str("- `sales_analytics` and `suggest_queries` help with common analyses\n\n");

    instructions.push_str("### Exploration without SQL\n");
    instructions.push_str("- `advanced_search` and `range_search` filter any table by column conditions\n");
    instructions.push_str("- `data_profiling` summarizes columns; `custom_aggregation` groups and aggregates\n");
    instructions.push_str("- Columns must exist in `get_table_schema`; values are always bound, never spliced\n\n");

    instructions.push_str("### Errors\n");
    instructions.push_str("Failures carry a kind: `validation` (fix the arguments), `not_found` ");
    instructions.push_str("(the named table or entity does not exist), `connectivity` (database ");
    instructions.push_str("unreachable, retry later) or `execution` (the database rejected the statement).\n\n");

    instructions.push_str("### Best Practices\n");
    instructions.push_str("1. Use `list_tables` and `get_table_schema` before writing queries\n");
    instructions.push_str("2. Prefer the entity tools over hand-written SQL\n");
    instructions.push_str("3. Bracket names with spaces, e.g. `[Order Details]`\n");

    instructions
}
