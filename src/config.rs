//! Configuration management for the Azure SQL MCP gateway.
//!
//! Configuration is loaded from environment variables following the 12-factor app pattern.
//! The resulting [`Config`] is immutable and shared behind an `Arc` for the
//! lifetime of the gateway.

use crate::constants::{
    APPLICATION_NAME, DEFAULT_ACQUIRE_TIMEOUT, DEFAULT_ACQUIRE_TIMEOUT_SECS,
    DEFAULT_CONNECT_TIMEOUT, DEFAULT_CONNECT_TIMEOUT_SECS, DEFAULT_QUERY_TIMEOUT,
    DEFAULT_ERROR_MESSAGE_LENGTH, DEFAULT_MAX_CONNECTIONS, DEFAULT_MAX_QUERY_LENGTH,
    DEFAULT_MAX_RESULT_ROWS, DEFAULT_ORDERS_LIMIT, DEFAULT_PAGE_SIZE, DEFAULT_PORT,
    DEFAULT_QUERY_TIMEOUT_SECS, DEFAULT_SAMPLE_LIMIT, DEFAULT_SEARCH_LIMIT, MAX_ORDERS_LIMIT,
    MAX_PAGE_SIZE, MAX_SAMPLE_LIMIT, MAX_SEARCH_LIMIT, DEFAULT_AGGREGATION_GROUPS,
    DEFAULT_FILTERED_SEARCH_LIMIT, DEFAULT_RANGE_SEARCH_LIMIT, MAX_AGGREGATION_GROUPS,
    MAX_FILTERED_SEARCH_LIMIT,
};
use crate::error::ConfigError;
use serde::{Deserialize, Serialize};
use std::str::FromStr;
use std::time::Duration;

/// Gateway configuration loaded from environment variables.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Connection profile
    pub database: DatabaseConfig,

    /// Per-tool and global result limits
    pub limits: LimitsConfig,
}

/// Connection profile: everything needed to reach the database.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    /// Server hostname, e.g. `myserver.database.windows.net`
    pub host: String,

    /// SQL Server port (default: 1433)
    pub port: u16,

    /// Database name
    pub database: String,

    /// Authentication configuration
    pub auth: AuthConfig,

    /// Connection gate configuration
    pub pool: PoolConfig,

    /// Enable TLS encryption
    pub encrypt: bool,

    /// Trust server certificate (for self-signed certs)
    pub trust_server_certificate: bool,

    /// Application name sent to SQL Server
    pub application_name: String,
}

/// Authentication configuration.
///
/// Secrets are never serialized.
#[derive(Clone, Serialize, Deserialize)]
pub enum AuthConfig {
    /// SQL Server authentication (username/password)
    SqlServer {
        username: String,
        #[serde(skip_serializing)]
        password: String,
    },

    /// Pre-acquired Azure AD access token (az cli, pipeline identity, ...)
    AccessToken {
        #[serde(skip_serializing)]
        token: String,
    },

    /// Azure AD service principal; a token is acquired on every connect
    AzureAd {
        client_id: String,
        #[serde(skip_serializing)]
        client_secret: String,
        tenant_id: String,
    },

    /// Azure managed identity of the host; `client_id` selects a
    /// user-assigned identity, otherwise the system-assigned one is used
    ManagedIdentity { client_id: Option<String> },

    /// Windows integrated security
    #[cfg(windows)]
    Integrated,
}

impl std::fmt::Debug for AuthConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            AuthConfig::SqlServer { username, .. } => f
                .debug_struct("SqlServer")
                .field("username", username)
                .field("password", &"<redacted>")
                .finish(),
            AuthConfig::AccessToken { .. } => f
                .debug_struct("AccessToken")
                .field("token", &"<redacted>")
                .finish(),
            AuthConfig::AzureAd {
                client_id,
                tenant_id,
                ..
            } => f
                .debug_struct("AzureAd")
                .field("client_id", client_id)
                .field("client_secret", &"<redacted>")
                .field("tenant_id", tenant_id)
                .finish(),
            AuthConfig::ManagedIdentity { client_id } => f
                .debug_struct("ManagedIdentity")
                .field("client_id", client_id)
                .finish(),
            #[cfg(windows)]
            AuthConfig::Integrated => f.write_str("Integrated"),
        }
    }
}

impl AuthConfig {
    /// Short name used in logs.
    pub fn method_name(&self) -> &'static str {
        match self {
            AuthConfig::SqlServer { .. } => "sql",
            AuthConfig::AccessToken { .. } => "token",
            AuthConfig::AzureAd { .. } => "azuread",
            AuthConfig::ManagedIdentity { .. } => "managed_identity",
            #[cfg(windows)]
            AuthConfig::Integrated => "integrated",
        }
    }
}

/// Connection gate configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PoolConfig {
    /// Maximum number of concurrently open connections
    pub max_connections: usize,

    /// How long an invocation waits for a free connection slot
    pub acquire_timeout: Duration,

    /// TCP + TDS handshake timeout
    pub connect_timeout: Duration,

    /// Per-statement timeout
    pub query_timeout: Duration,
}

/// Default and hard upper bound for a limited tool argument.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct LimitBound {
    pub default: i64,
    pub max: i64,
}

impl LimitBound {
    pub const fn new(default: i64, max: i64) -> Self {
        Self { default, max }
    }
}

/// Result limits applied by the gateway.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LimitsConfig {
    pub sample_data: LimitBound,
    pub search: LimitBound,
    pub customer_orders: LimitBound,
    pub page_size: LimitBound,
    pub advanced_search: LimitBound,
    pub range_search: LimitBound,
    pub aggregation_groups: LimitBound,

    /// Rows kept from free-form queries before the result is marked truncated
    pub max_result_rows: usize,

    /// Maximum accepted query text length (bytes)
    pub max_query_length: usize,

    /// Characters of engine error text surfaced to callers
    pub error_message_length: usize,
}

impl Config {
    /// Load configuration from environment variables.
    ///
    /// # Environment Variables
    ///
    /// ## Required
    /// - `MSSQL_HOST` (or `SERVER_NAME`): server hostname
    /// - `MSSQL_DATABASE` (or `DATABASE`): database name
    ///
    /// ## Authentication
    /// - `MSSQL_AUTH_TYPE`: `sql`, `token`, `azuread`, `managed_identity` or `integrated`
    /// - `MSSQL_USER` / `MSSQL_PASSWORD`: SQL authentication
    /// - `MSSQL_ACCESS_TOKEN`: pre-acquired Azure AD token
    /// - `MSSQL_AZURE_CLIENT_ID` / `MSSQL_AZURE_CLIENT_SECRET` / `MSSQL_AZURE_TENANT_ID`
    ///   (with `managed_identity`, `MSSQL_AZURE_CLIENT_ID` picks a user-assigned identity)
    ///
    /// ## Optional
    /// - `MSSQL_PORT`: Port number (default: 1433)
    /// - `MSSQL_ENCRYPT`: Enable TLS (default: true)
    /// - `MSSQL_TRUST_CERT`: Trust server certificate (default: false)
    /// - `MSSQL_POOL_MAX`: Maximum concurrent connections (default: 10)
    /// - `MSSQL_ACQUIRE_TIMEOUT`: Seconds to wait for a connection slot (default: 10)
    /// - `MSSQL_CONNECT_TIMEOUT`: Connection timeout in seconds (default: 30)
    /// - `MSSQL_QUERY_TIMEOUT`: Statement timeout in seconds (default: 30)
    /// - `MSSQL_MAX_ROWS`: Maximum rows from free-form queries (default: 1000)
    /// - `MSSQL_MAX_QUERY_LENGTH`: Maximum query length in bytes (default: 100000)
    /// - `MSSQL_ERROR_MESSAGE_LENGTH`: Truncation length for engine errors (default: 500)
    pub fn from_env() -> Result<Self, ConfigError> {
        let host = env_with_fallback("MSSQL_HOST", "SERVER_NAME")
            .ok_or(ConfigError::Missing("MSSQL_HOST"))?;
        let database = env_with_fallback("MSSQL_DATABASE", "DATABASE")
            .ok_or(ConfigError::Missing("MSSQL_DATABASE"))?;

        let auth = auth_from_env()?;

        let port = env_parse("MSSQL_PORT", DEFAULT_PORT)?;
        let encrypt = env_flag("MSSQL_ENCRYPT", true);
        let trust_server_certificate = env_flag("MSSQL_TRUST_CERT", false);

        let max_connections = env_parse("MSSQL_POOL_MAX", DEFAULT_MAX_CONNECTIONS)?;
        if max_connections == 0 {
            return Err(ConfigError::Invalid {
                name: "MSSQL_POOL_MAX",
                value: "0".to_string(),
                reason: "must be at least 1".to_string(),
            });
        }

        let acquire_timeout_secs = env_parse("MSSQL_ACQUIRE_TIMEOUT", DEFAULT_ACQUIRE_TIMEOUT_SECS)?;
        let connect_timeout_secs = env_parse("MSSQL_CONNECT_TIMEOUT", DEFAULT_CONNECT_TIMEOUT_SECS)?;
        let query_timeout_secs = env_parse("MSSQL_QUERY_TIMEOUT", DEFAULT_QUERY_TIMEOUT_SECS)?;

        let limits = LimitsConfig {
            max_result_rows: env_parse("MSSQL_MAX_ROWS", DEFAULT_MAX_RESULT_ROWS)?,
            max_query_length: env_parse("MSSQL_MAX_QUERY_LENGTH", DEFAULT_MAX_QUERY_LENGTH)?,
            error_message_length: env_parse(
                "MSSQL_ERROR_MESSAGE_LENGTH",
                DEFAULT_ERROR_MESSAGE_LENGTH,
            )?,
            ..LimitsConfig::default()
        };

        Ok(Config {
            database: DatabaseConfig {
                host,
                port,
                database,
                auth,
                pool: PoolConfig {
                    max_connections,
                    acquire_timeout: Duration::from_secs(acquire_timeout_secs),
                    connect_timeout: Duration::from_secs(connect_timeout_secs),
                    query_timeout: Duration::from_secs(query_timeout_secs),
                },
                encrypt,
                trust_server_certificate,
                application_name: APPLICATION_NAME.to_string(),
            },
            limits,
        })
    }
}

/// Resolve the authentication method.
///
/// An explicit `MSSQL_AUTH_TYPE` wins; otherwise the first usable credential
/// source is picked (token, then SQL login, then `LOCAL_DB` integrated auth).
fn auth_from_env() -> Result<AuthConfig, ConfigError> {
    let auth_type = std::env::var("MSSQL_AUTH_TYPE")
        .ok()
        .map(|s| s.trim().to_lowercase());

    match auth_type.as_deref() {
        Some("sql") | Some("sqlserver") => sql_auth_from_env(),
        Some("token") | Some("access_token") => {
            let token = required("MSSQL_ACCESS_TOKEN")?;
            Ok(AuthConfig::AccessToken { token })
        }
        Some("azuread") | Some("azure") | Some("aad") => Ok(AuthConfig::AzureAd {
            client_id: required("MSSQL_AZURE_CLIENT_ID")?,
            client_secret: required("MSSQL_AZURE_CLIENT_SECRET")?,
            tenant_id: required("MSSQL_AZURE_TENANT_ID")?,
        }),
        Some("managed_identity") | Some("managed") | Some("msi") => {
            Ok(AuthConfig::ManagedIdentity {
                client_id: non_empty_env("MSSQL_AZURE_CLIENT_ID"),
            })
        }
        Some("integrated") | Some("windows") => integrated_auth(),
        Some(other) => Err(ConfigError::Invalid {
            name: "MSSQL_AUTH_TYPE",
            value: other.to_string(),
            reason: "expected sql, token, azuread, managed_identity or integrated".to_string(),
        }),
        None => {
            if let Some(token) = non_empty_env("MSSQL_ACCESS_TOKEN") {
                Ok(AuthConfig::AccessToken { token })
            } else if non_empty_env("MSSQL_USER").is_some() {
                sql_auth_from_env()
            } else if env_flag("LOCAL_DB", false) {
                integrated_auth()
            } else {
                Err(ConfigError::Unsupported(
                    "Authentication required: set MSSQL_USER and MSSQL_PASSWORD, \
                     MSSQL_ACCESS_TOKEN, or MSSQL_AUTH_TYPE=azuread"
                        .to_string(),
                ))
            }
        }
    }
}

fn sql_auth_from_env() -> Result<AuthConfig, ConfigError> {
    let username = required("MSSQL_USER")?;
    let password = required("MSSQL_PASSWORD")?;
    Ok(AuthConfig::SqlServer { username, password })
}

#[cfg(windows)]
fn integrated_auth() -> Result<AuthConfig, ConfigError> {
    Ok(AuthConfig::Integrated)
}

#[cfg(not(windows))]
fn integrated_auth() -> Result<AuthConfig, ConfigError> {
    Err(ConfigError::Unsupported(
        "Integrated authentication is only available on Windows".to_string(),
    ))
}

fn non_empty_env(name: &str) -> Option<String> {
    std::env::var(name)
        .ok()
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

fn env_with_fallback(primary: &str, fallback: &str) -> Option<String> {
    non_empty_env(primary).or_else(|| non_empty_env(fallback))
}

fn required(name: &'static str) -> Result<String, ConfigError> {
    non_empty_env(name).ok_or(ConfigError::Missing(name))
}

fn env_flag(name: &str, default: bool) -> bool {
    std::env::var(name)
        .map(|v| matches!(v.trim().to_lowercase().as_str(), "true" | "1" | "yes"))
        .unwrap_or(default)
}

pub(crate) fn env_parse<T>(name: &'static str, default: T) -> Result<T, ConfigError>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    match non_empty_env(name) {
        Some(value) => value.parse().map_err(|e: T::Err| ConfigError::Invalid {
            name,
            value,
            reason: e.to_string(),
        }),
        None => Ok(default),
    }
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            max_connections: DEFAULT_MAX_CONNECTIONS,
            acquire_timeout: DEFAULT_ACQUIRE_TIMEOUT,
            connect_timeout: DEFAULT_CONNECT_TIMEOUT,
            query_timeout: DEFAULT_QUERY_TIMEOUT,
        }
    }
}

impl Default for LimitsConfig {
    fn default() -> Self {
        Self {
            sample_data: LimitBound::new(DEFAULT_SAMPLE_LIMIT, MAX_SAMPLE_LIMIT),
            search: LimitBound::new(DEFAULT_SEARCH_LIMIT, MAX_SEARCH_LIMIT),
            customer_orders: LimitBound::new(DEFAULT_ORDERS_LIMIT, MAX_ORDERS_LIMIT),
            page_size: LimitBound::new(DEFAULT_PAGE_SIZE, MAX_PAGE_SIZE),
            advanced_search: LimitBound::new(
                DEFAULT_FILTERED_SEARCH_LIMIT,
                MAX_FILTERED_SEARCH_LIMIT,
            ),
            range_search: LimitBound::new(DEFAULT_RANGE_SEARCH_LIMIT, MAX_FILTERED_SEARCH_LIMIT),
            aggregation_groups: LimitBound::new(
                DEFAULT_AGGREGATION_GROUPS,
                MAX_AGGREGATION_GROUPS,
            ),
            max_result_rows: DEFAULT_MAX_RESULT_ROWS,
            max_query_length: DEFAULT_MAX_QUERY_LENGTH,
            error_message_length: DEFAULT_ERROR_MESSAGE_LENGTH,
        }
    }
}
