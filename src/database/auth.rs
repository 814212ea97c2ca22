//! Authentication and connection setup for SQL Server / Azure SQL.
//!
//! Supported methods:
//! - SQL Server authentication (username/password)
//! - Pre-acquired Azure AD access token
//! - Azure AD service principal (client credentials, `azure-auth` feature)
//! - Azure managed identity (`azure-auth` feature)
//! - Windows integrated security (Windows only)

use crate::config::{AuthConfig, DatabaseConfig};
use crate::database::query::RawConnection;
use crate::error::GatewayError;
use tiberius::{AuthMethod, Client, Config, EncryptionLevel};
use tokio::net::TcpStream;
use tokio_util::compat::TokioAsyncWriteCompatExt;
use tracing::{debug, info};

/// Configure the tiberius authentication method.
///
/// For the service principal flow this acquires a fresh access token.
pub async fn configure_auth(config: &mut Config, auth: &AuthConfig) -> Result<(), GatewayError> {
    match auth {
        AuthConfig::SqlServer { username, password } => {
            config.authentication(AuthMethod::sql_server(username, password));
        }
        AuthConfig::AccessToken { token } => {
            config.authentication(AuthMethod::aad_token(token));
        }
        AuthConfig::AzureAd {
            client_id,
            client_secret,
            tenant_id,
        } => {
            let token = acquire_azure_ad_token(client_id, client_secret, tenant_id).await?;
            config.authentication(AuthMethod::aad_token(token));
        }
        AuthConfig::ManagedIdentity { client_id } => {
            let token = acquire_managed_identity_token(client_id.as_deref()).await?;
            config.authentication(AuthMethod::aad_token(token));
        }
        #[cfg(windows)]
        AuthConfig::Integrated => {
            config.authentication(AuthMethod::Integrated);
        }
    }
    Ok(())
}

/// Acquire an Azure AD access token for Azure SQL using client credentials.
#[cfg(feature = "azure-auth")]
async fn acquire_azure_ad_token(
    client_id: &str,
    client_secret: &str,
    tenant_id: &str,
) -> Result<String, GatewayError> {
    use azure_core::credentials::{Secret, TokenCredential};
    use azure_identity::ClientSecretCredential;

    debug!(
        client_id = %client_id.chars().take(8).collect::<String>(),
        "Acquiring Azure AD token"
    );

    let credential = ClientSecretCredential::new(
        tenant_id,
        client_id.to_string(),
        Secret::new(client_secret.to_string()),
        None,
    )
    .map_err(|e| GatewayError::connectivity_with_source("Invalid Azure AD credentials", e))?;

    let token = credential
        .get_token(&[crate::constants::AZURE_SQL_SCOPE], None)
        .await
        .map_err(|e| GatewayError::connectivity_with_source("Failed to acquire Azure AD token", e))?;

    Ok(token.token.secret().to_string())
}

#[cfg(not(feature = "azure-auth"))]
async fn acquire_azure_ad_token(
    _client_id: &str,
    _client_secret: &str,
    _tenant_id: &str,
) -> Result<String, GatewayError> {
    Err(GatewayError::connectivity(
        "Azure AD service principal authentication requires the 'azure-auth' feature; \
         alternatively supply a token via MSSQL_ACCESS_TOKEN",
    ))
}

/// Acquire an Azure SQL token from the host's managed identity endpoint.
#[cfg(feature = "azure-auth")]
async fn acquire_managed_identity_token(client_id: Option<&str>) -> Result<String, GatewayError> {
    use azure_core::credentials::TokenCredential;
    use azure_identity::{ManagedIdentityCredential, ManagedIdentityCredentialOptions, UserAssignedId};

    debug!(user_assigned = client_id.is_some(), "Acquiring managed identity token");

    let options = ManagedIdentityCredentialOptions {
        user_assigned_id: client_id.map(|id| UserAssignedId::ClientId(id.to_string())),
        ..Default::default()
    };
    let credential = ManagedIdentityCredential::new(Some(options)).map_err(|e| {
        GatewayError::connectivity_with_source("Managed identity is not available", e)
    })?;

    let token = credential
        .get_token(&[crate::constants::AZURE_SQL_SCOPE], None)
        .await
        .map_err(|e| {
            GatewayError::connectivity_with_source("Failed to acquire managed identity token", e)
        })?;

    Ok(token.token.secret().to_string())
}

#[cfg(not(feature = "azure-auth"))]
async fn acquire_managed_identity_token(_client_id: Option<&str>) -> Result<String, GatewayError> {
    Err(GatewayError::connectivity(
        "Managed identity authentication requires the 'azure-auth' feature; \
         alternatively supply a token via MSSQL_ACCESS_TOKEN",
    ))
}

/// Create a tiberius Config from the connection profile, without authentication.
pub fn create_base_config(db_config: &DatabaseConfig) -> Config {
    let mut config = Config::new();

    config.host(&db_config.host);
    config.port(db_config.port);
    config.database(&db_config.database);

    if db_config.encrypt {
        config.encryption(EncryptionLevel::Required);
    } else {
        config.encryption(EncryptionLevel::Off);
    }

    if db_config.trust_server_certificate {
        config.trust_cert();
    }

    config.application_name(&db_config.application_name);

    config
}

/// Open a new connection to SQL Server.
///
/// Azure SQL gateways may answer the login with a routing redirect; the
/// redirect is followed once.
pub async fn create_connection(db_config: &DatabaseConfig) -> Result<RawConnection, GatewayError> {
    let mut config = create_base_config(db_config);
    configure_auth(&mut config, &db_config.auth).await?;

    match connect(config.clone(), &db_config.host, db_config.port).await {
        Err(tiberius::error::Error::Routing { host, port }) => {
            info!(host = %host, port, "Following Azure SQL routing redirect");
            config.host(&host);
            config.port(port);
            connect(config, &host, port).await.map_err(connection_error)
        }
        result => result.map_err(connection_error),
    }
}

async fn connect(
    config: Config,
    host: &str,
    port: u16,
) -> Result<RawConnection, tiberius::error::Error> {
    let address = format!("{}:{}", host, port);
    debug!(address = %address, "Opening TCP connection");

    let tcp = TcpStream::connect(&address).await?;
    tcp.set_nodelay(true)?;

    let client = Client::connect(config, tcp.compat_write()).await?;
    debug!("Connection established");
    Ok(client)
}

// Login failures carry server error numbers that map to connectivity;
// anything else during connect is a connectivity failure too.
fn connection_error(e: tiberius::error::Error) -> GatewayError {
    match GatewayError::from(e) {
        GatewayError::Execution { message, .. } => GatewayError::connectivity(message),
        other => other,
    }
}
