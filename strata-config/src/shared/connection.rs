use secrecy::{ExposeSecret, Secret, SecretString};
use thiserror::Error;

/// Environment variable holding the warehouse account identifier.
const WAREHOUSE_ACCOUNT_ENV: &str = "SNOWFLAKE_ACCOUNT";
/// Environment variable holding the warehouse login name.
const WAREHOUSE_USER_ENV: &str = "SNOWFLAKE_USER";
/// Environment variable holding the warehouse password.
const WAREHOUSE_PASSWORD_ENV: &str = "SNOWFLAKE_PASSWORD";
/// Environment variable holding the virtual warehouse to run statements on.
const WAREHOUSE_NAME_ENV: &str = "SNOWFLAKE_WAREHOUSE";

/// Environment variable holding the object-store endpoint (`host:port`).
const OBJECT_STORE_ENDPOINT_ENV: &str = "MINIO_ENDPOINT";
/// Fallback environment variable holding only the object-store port.
const OBJECT_STORE_PORT_ENV: &str = "MINIO_PORT";
/// Environment variable holding the object-store access key.
const OBJECT_STORE_ACCESS_KEY_ENV: &str = "MINIO_ROOT_USER";
/// Environment variable holding the object-store secret key.
const OBJECT_STORE_SECRET_KEY_ENV: &str = "MINIO_ROOT_PASSWORD";

/// Errors raised while reading credentials from the environment.
///
/// These are fatal at client construction: no orchestration starts with an
/// incomplete credential set.
#[derive(Debug, Error)]
pub enum CredentialsError {
    #[error("missing required environment variable `{0}`")]
    MissingVariable(&'static str),
}

fn required_env(name: &'static str) -> Result<String, CredentialsError> {
    match std::env::var(name) {
        Ok(value) if !value.is_empty() => Ok(value),
        _ => Err(CredentialsError::MissingVariable(name)),
    }
}

/// Connection settings for the warehouse gateway, read from the environment.
///
/// This intentionally does not implement `Serialize` to avoid accidentally
/// leaking the password into serialized forms.
#[derive(Debug, Clone)]
pub struct WarehouseConnectionConfig {
    /// Account identifier, e.g. `myorg-myaccount`.
    pub account: String,
    /// Login name.
    pub user: String,
    /// Login password.
    pub password: SecretString,
    /// Virtual warehouse statements run on.
    pub warehouse: String,
}

impl WarehouseConnectionConfig {
    /// Reads the warehouse connection settings from `SNOWFLAKE_*` variables.
    pub fn from_env() -> Result<Self, CredentialsError> {
        Ok(Self {
            account: required_env(WAREHOUSE_ACCOUNT_ENV)?,
            user: required_env(WAREHOUSE_USER_ENV)?,
            password: Secret::new(required_env(WAREHOUSE_PASSWORD_ENV)?),
            warehouse: required_env(WAREHOUSE_NAME_ENV)?,
        })
    }
}

/// Same as [`WarehouseConnectionConfig`] but without secrets, safe for
/// logging and diagnostics output.
#[derive(Debug, Clone)]
pub struct WarehouseConnectionConfigWithoutSecrets {
    pub account: String,
    pub user: String,
    pub warehouse: String,
}

impl From<&WarehouseConnectionConfig> for WarehouseConnectionConfigWithoutSecrets {
    fn from(value: &WarehouseConnectionConfig) -> Self {
        Self {
            account: value.account.clone(),
            user: value.user.clone(),
            warehouse: value.warehouse.clone(),
        }
    }
}

/// Connection settings for the object store, read from the environment.
#[derive(Debug, Clone)]
pub struct ObjectStoreConnectionConfig {
    /// Endpoint as `host:port`, without a scheme.
    pub endpoint: String,
    pub access_key: String,
    pub secret_key: SecretString,
}

impl ObjectStoreConnectionConfig {
    /// Reads the object-store connection settings from `MINIO_*` variables.
    ///
    /// The endpoint falls back to `minio:<MINIO_PORT|9000>` when unset, which
    /// matches the compose-network default of the deployment this serves.
    pub fn from_env() -> Result<Self, CredentialsError> {
        let endpoint = std::env::var(OBJECT_STORE_ENDPOINT_ENV)
            .ok()
            .filter(|value| !value.is_empty())
            .unwrap_or_else(|| {
                let port = std::env::var(OBJECT_STORE_PORT_ENV)
                    .ok()
                    .filter(|value| !value.is_empty())
                    .unwrap_or_else(|| "9000".to_string());
                format!("minio:{port}")
            });

        Ok(Self {
            endpoint,
            access_key: required_env(OBJECT_STORE_ACCESS_KEY_ENV)?,
            secret_key: Secret::new(required_env(OBJECT_STORE_SECRET_KEY_ENV)?),
        })
    }

    /// Exposes the secret key for handoff to the object-store builder.
    pub fn secret_key(&self) -> &str {
        self.secret_key.expose_secret()
    }
}
