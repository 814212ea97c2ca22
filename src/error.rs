//! Error types for the Azure SQL MCP gateway.
//!
//! Every gateway failure is one of four kinds (validation, not found,
//! connectivity, execution). SQL Server error numbers are mapped onto
//! those kinds so callers can react without parsing messages.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Machine-readable error kind carried in every error result.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    Validation,
    NotFound,
    Connectivity,
    Execution,
}

impl ErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorKind::Validation => "validation",
            ErrorKind::NotFound => "not_found",
            ErrorKind::Connectivity => "connectivity",
            ErrorKind::Execution => "execution",
        }
    }
}

impl std::fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Domain errors raised while serving a tool invocation.
#[derive(Debug, Error)]
pub enum GatewayError {
    /// Arguments rejected before any database access.
    #[error("Validation failed: {0}")]
    Validation(String),

    /// A named table or entity does not exist.
    #[error("{entity} not found: {name}")]
    NotFound { entity: String, name: String },

    /// The database could not be reached or refused the login.
    #[error("Connectivity error: {message}")]
    Connectivity {
        message: String,
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    /// The engine rejected or aborted the statement.
    #[error("Execution error: {message}")]
    Execution { message: String, code: Option<u32> },
}

impl GatewayError {
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    pub fn not_found(entity: impl Into<String>, name: impl Into<String>) -> Self {
        Self::NotFound {
            entity: entity.into(),
            name: name.into(),
        }
    }

    pub fn connectivity(msg: impl Into<String>) -> Self {
        Self::Connectivity {
            message: msg.into(),
            source: None,
        }
    }

    pub fn connectivity_with_source(
        msg: impl Into<String>,
        source: impl std::error::Error + Send + Sync + 'static,
    ) -> Self {
        Self::Connectivity {
            message: msg.into(),
            source: Some(Box::new(source)),
        }
    }

    pub fn execution(msg: impl Into<String>) -> Self {
        Self::Execution {
            message: msg.into(),
            code: None,
        }
    }

    pub fn execution_with_code(msg: impl Into<String>, code: u32) -> Self {
        Self::Execution {
            message: msg.into(),
            code: Some(code),
        }
    }

    /// Statement ran past its deadline.
    pub fn timeout(limit: std::time::Duration) -> Self {
        Self::execution(format!("Statement timed out after {:?}", limit))
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Validation(_) => ErrorKind::Validation,
            Self::NotFound { .. } => ErrorKind::NotFound,
            Self::Connectivity { .. } => ErrorKind::Connectivity,
            Self::Execution { .. } => ErrorKind::Execution,
        }
    }

    /// Cap the engine-supplied text of execution errors at `max_chars`.
    pub fn truncated(self, max_chars: usize) -> Self {
        match self {
            Self::Execution { message, code } => Self::Execution {
                message: truncate_message(&message, max_chars),
                code,
            },
            other => other,
        }
    }

    /// Get a user-facing hint for how to recover from this error.
    pub fn suggestion(&self) -> &'static str {
        match self {
            Self::Validation(_) => "Check the tool arguments against the tool's input schema",
            Self::NotFound { .. } => "Use list_tables or a search tool to find valid names",
            Self::Connectivity { .. } => {
                "Check server name, credentials, firewall rules and network connectivity"
            }
            Self::Execution { .. } => "Review the statement; use get_table_schema to check names",
        }
    }
}

/// Map SQL Server error numbers onto gateway error kinds.
pub fn from_sql_error(code: u32, message: &str) -> GatewayError {
    match code {
        // Login and availability failures
        18456 => GatewayError::connectivity(format!("Login failed: {}", message)),
        18452 => GatewayError::connectivity(format!("Untrusted login: {}", message)),
        4060 => GatewayError::connectivity(format!("Cannot open database: {}", message)),
        40532 | 40613 | 40501 | 40197 | 49918 | 49919 | 49920 => {
            GatewayError::connectivity(format!("Azure SQL unavailable: {}", message))
        }
        53 | 10053 | 10054 | 10060 => GatewayError::connectivity(message.to_string()),

        // Statement rejected by the engine
        102 => GatewayError::execution_with_code(format!("Syntax error: {}", message), code),
        207 => GatewayError::execution_with_code(format!("Invalid column: {}", message), code),
        208 => GatewayError::execution_with_code(format!("Invalid object: {}", message), code),
        229 | 230 => {
            GatewayError::execution_with_code(format!("Permission denied: {}", message), code)
        }
        245 | 8114 => {
            GatewayError::execution_with_code(format!("Conversion failed: {}", message), code)
        }
        1205 => GatewayError::execution_with_code(
            "Statement was chosen as a deadlock victim",
            code,
        ),
        8115 => {
            GatewayError::execution_with_code(format!("Arithmetic overflow: {}", message), code)
        }

        _ => GatewayError::execution_with_code(message, code),
    }
}

impl From<tiberius::error::Error> for GatewayError {
    fn from(e: tiberius::error::Error) -> Self {
        use tiberius::error::Error;

        match e {
            Error::Server(token) => from_sql_error(token.code(), token.message()),
            Error::Io { .. } => GatewayError::connectivity_with_source("IO error", e),
            Error::Tls(_) => GatewayError::connectivity_with_source("TLS error", e),
            Error::Protocol(_) => GatewayError::connectivity_with_source("Protocol error", e),
            Error::Routing { host, port } => {
                tracing::warn!(%host, port, "Server asked to reroute an established connection");
                GatewayError::connectivity("Unexpected routing request from the database server")
            }
            Error::Conversion(msg) => {
                GatewayError::execution(format!("Type conversion error: {}", msg))
            }
            other => GatewayError::execution(other.to_string()),
        }
    }
}

/// Errors raised while loading configuration at startup.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("{0} environment variable is required")]
    Missing(&'static str),

    #[error("Invalid value for {name}: {value:?} ({reason})")]
    Invalid {
        name: &'static str,
        value: String,
        reason: String,
    },

    #[error("{0}")]
    Unsupported(String),
}

/// Truncate on a character boundary, marking the cut with an ellipsis.
pub fn truncate_message(s: &str, max_chars: usize) -> String {
    match s.char_indices().nth(max_chars) {
        Some((idx, _)) => format!("{}...", &s[..idx]),
        None => s.to_string(),
    }
}
