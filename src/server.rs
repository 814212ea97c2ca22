//! MCP server struct definition and initialization.

use crate::gateway::{Gateway, InvocationOutcome, ToolInvocation};
use rmcp::handler::server::router::tool::ToolRouter;
use rmcp::model::{CallToolResult, Content};
use rmcp::ErrorData as McpError;
use serde::Serialize;
use std::sync::Arc;
use tracing::warn;

/// The Azure SQL MCP server instance.
///
/// This struct is cloned for each request; the gateway behind it is shared
/// via `Arc`. Every tool forwards to [`Gateway::invoke`], so tool calls
/// never fail at the protocol level for database or validation reasons.
#[derive(Clone)]
pub struct AzureSqlMcpServer {
    /// Query gateway shared by all tool calls.
    pub(crate) gateway: Arc<Gateway>,

    /// Tool router for dispatching tool calls.
    pub(crate) tool_router: ToolRouter<Self>,
}

impl AzureSqlMcpServer {
    pub fn new(gateway: Arc<Gateway>) -> Self {
        Self {
            gateway,
            tool_router: crate::tools::create_tool_router(),
        }
    }

    pub fn gateway(&self) -> &Arc<Gateway> {
        &self.gateway
    }

    /// Invoke the gateway and wrap the outcome for MCP.
    pub(crate) async fn run(&self, invocation: ToolInvocation) -> Result<CallToolResult, McpError> {
        Ok(outcome_to_result(self.gateway.invoke(invocation).await))
    }
}

/// Render an outcome as pretty JSON text content. Failures are tool
/// errors (`is_error = true`), not protocol errors.
pub fn outcome_to_result(outcome: InvocationOutcome) -> CallToolResult {
    match outcome {
        Ok(result) => match to_pretty_json(&result) {
            Ok(text) => CallToolResult::success(vec![Content::text(text)]),
            Err(text) => CallToolResult::error(vec![Content::text(text)]),
        },
        Err(error) => {
            let text = to_pretty_json(&error).unwrap_or_else(|text| text);
            CallToolResult::error(vec![Content::text(text)])
        }
    }
}

fn to_pretty_json<T: Serialize>(value: &T) -> Result<String, String> {
    serde_json::to_string_pretty(value).map_err(|e| {
        warn!("Failed to serialize tool output: {}", e);
        serde_json::json!({
            "error": {
                "kind": "execution",
                "message": format!("Failed to serialize result: {}", e),
            }
        })
        .to_string()
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::database::QueryResult;
    use crate::gateway::testing::test_config;
    use crate::gateway::{QueryArgs, ToolInvocation};

    fn text_of(result: &CallToolResult) -> String {
        result.content[0]
            .as_text()
            .map(|t| t.text.clone())
            .unwrap_or_default()
    }

    #[test]
    fn test_success_is_pretty_json() {
        let result = outcome_to_result(Ok(QueryResult::empty()));
        assert_eq!(result.is_error, Some(false));

        let body: serde_json::Value = serde_json::from_str(&text_of(&result)).unwrap();
        assert_eq!(body["row_count"], 0);
        assert_eq!(body["truncated"], false);
    }

    #[tokio::test]
    async fn test_gateway_failure_is_tool_error() {
        // validation fails before any connection attempt
        let gateway = Arc::new(Gateway::with_mssql(Arc::new(test_config())));
        let server = AzureSqlMcpServer::new(gateway);

        let result = server
            .run(ToolInvocation::ExecuteQuery(QueryArgs {
                query: "DELETE FROM Orders".into(),
            }))
            .await
            .unwrap();
        assert_eq!(result.is_error, Some(true));

        let body: serde_json::Value = serde_json::from_str(&text_of(&result)).unwrap();
        assert_eq!(body["error"]["kind"], "validation");
        assert_eq!(body["invocation"]["tool"], "execute_query");
        assert_eq!(server.gateway().in_flight(), 0);
    }
}
