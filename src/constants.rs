//! Centralized constants for the Azure SQL MCP gateway.
//!
//! Default limits, timeouts and environment fallbacks live here so that
//! configuration, validation and tests agree on the same numbers.

use std::time::Duration;

// =============================================================================
// Timeout Constants
// =============================================================================

/// Default TDS connect timeout in seconds.
pub const DEFAULT_CONNECT_TIMEOUT_SECS: u64 = 30;

/// Default time to wait for a free connection slot, in seconds.
pub const DEFAULT_ACQUIRE_TIMEOUT_SECS: u64 = 10;

/// Default statement timeout in seconds.
pub const DEFAULT_QUERY_TIMEOUT_SECS: u64 = 30;

/// Default drain timeout on shutdown, in seconds.
pub const DEFAULT_DRAIN_TIMEOUT_SECS: u64 = 30;

pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(DEFAULT_CONNECT_TIMEOUT_SECS);
pub const DEFAULT_ACQUIRE_TIMEOUT: Duration = Duration::from_secs(DEFAULT_ACQUIRE_TIMEOUT_SECS);
pub const DEFAULT_QUERY_TIMEOUT: Duration = Duration::from_secs(DEFAULT_QUERY_TIMEOUT_SECS);
pub const DEFAULT_DRAIN_TIMEOUT: Duration = Duration::from_secs(DEFAULT_DRAIN_TIMEOUT_SECS);

// =============================================================================
// Connection Constants
// =============================================================================

/// Default SQL Server port.
pub const DEFAULT_PORT: u16 = 1433;

/// Default maximum number of concurrently open connections.
pub const DEFAULT_MAX_CONNECTIONS: usize = 10;

/// Application name reported to SQL Server.
pub const APPLICATION_NAME: &str = "azure-sql-mcp";

/// Azure SQL token scope for service principal authentication.
pub const AZURE_SQL_SCOPE: &str = "https://database.windows.net/.default";

// =============================================================================
// Result Size Constants
// =============================================================================

/// Default cap on rows returned by free-form queries.
pub const DEFAULT_MAX_RESULT_ROWS: usize = 1_000;

/// Default maximum accepted query text length, in bytes.
pub const DEFAULT_MAX_QUERY_LENGTH: usize = 100_000;

/// Default length database error messages are truncated to.
pub const DEFAULT_ERROR_MESSAGE_LENGTH: usize = 500;

// =============================================================================
// Per-Tool Limits (default, hard bound)
// =============================================================================

pub const DEFAULT_SAMPLE_LIMIT: i64 = 5;
pub const MAX_SAMPLE_LIMIT: i64 = 100;

pub const DEFAULT_SEARCH_LIMIT: i64 = 10;
pub const MAX_SEARCH_LIMIT: i64 = 100;

pub const DEFAULT_ORDERS_LIMIT: i64 = 20;
pub const MAX_ORDERS_LIMIT: i64 = 200;

pub const DEFAULT_PAGE_SIZE: i64 = 20;
pub const MAX_PAGE_SIZE: i64 = 100;

pub const DEFAULT_FILTERED_SEARCH_LIMIT: i64 = 20;
pub const DEFAULT_RANGE_SEARCH_LIMIT: i64 = 50;
pub const MAX_FILTERED_SEARCH_LIMIT: i64 = 200;

pub const DEFAULT_AGGREGATION_GROUPS: i64 = 100;
pub const MAX_AGGREGATION_GROUPS: i64 = 1_000;

/// Most conditions accepted in one filter list.
pub const MAX_FILTERS: usize = 16;

/// Most values accepted by an `in` filter.
pub const MAX_IN_VALUES: usize = 100;

/// Most aggregates or grouping columns in one aggregation.
pub const MAX_AGGREGATES: usize = 10;

/// Most frequent values reported per profiled column.
pub const PROFILE_TOP_VALUES: i64 = 5;

/// Maximum number of query suggestions returned at once.
pub const MAX_SUGGESTIONS: usize = 8;

// =============================================================================
// Logging Constants
// =============================================================================

/// Maximum characters of statement text written to debug logs.
pub const LOG_STATEMENT_CHARS: usize = 200;
