//! Snowflake implementation of the warehouse gateway.
//!
//! Talks to the SQL REST API: a session is opened with the legacy
//! login-request endpoint (password authentication), statements go through
//! `/api/v2/statements`, and long-running statements are polled by handle
//! until they complete. One client session per orchestration unit.

use std::sync::Arc;
use std::time::Duration;

use reqwest::StatusCode;
use reqwest::header::{ACCEPT, AUTHORIZATION};
use secrecy::ExposeSecret;
use serde::{Deserialize, Serialize};
use strata_config::shared::WarehouseConnectionConfig;
use tokio::time::Instant;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::error::{ErrorKind, StrataResult};
use crate::strata_error;
use crate::warehouse::{Row, WarehouseClient, normalize_statement};

/// Per-request transport timeout.
const REQUEST_TIMEOUT: Duration = Duration::from_secs(60);

/// Server-side statement timeout, also the bound on handle polling.
const STATEMENT_TIMEOUT: Duration = Duration::from_secs(300);

/// Interval between statement-handle polls after a 202 response.
///
/// This is driver plumbing for individual statements, distinct from the
/// ingestion-pipe poll loop.
const STATEMENT_POLL_INTERVAL: Duration = Duration::from_secs(1);

const LOGIN_PATH: &str = "/session/v1/login-request";
const LOGOUT_PATH: &str = "/session/logout-request";
const STATEMENTS_PATH: &str = "/api/v2/statements";

#[derive(Serialize)]
struct LoginRequest<'a> {
    data: LoginRequestData<'a>,
}

#[derive(Serialize)]
struct LoginRequestData<'a> {
    #[serde(rename = "ACCOUNT_NAME")]
    account_name: &'a str,
    #[serde(rename = "LOGIN_NAME")]
    login_name: &'a str,
    #[serde(rename = "PASSWORD")]
    password: &'a str,
}

#[derive(Deserialize)]
struct LoginResponse {
    success: bool,
    #[serde(default)]
    message: Option<String>,
    #[serde(default)]
    data: Option<LoginResponseData>,
}

#[derive(Deserialize)]
struct LoginResponseData {
    #[serde(default)]
    token: Option<String>,
}

#[derive(Serialize)]
struct StatementRequest<'a> {
    statement: &'a str,
    warehouse: &'a str,
    timeout: u64,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct StatementResponse {
    #[serde(default)]
    result_set_meta_data: Option<ResultSetMetaData>,
    #[serde(default)]
    data: Option<Vec<Row>>,
    #[serde(default)]
    statement_handle: Option<String>,
    #[serde(default)]
    message: Option<String>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct ResultSetMetaData {
    #[serde(default)]
    #[allow(dead_code)]
    num_rows: Option<u64>,
}

struct Inner {
    http: reqwest::Client,
    base_url: String,
    warehouse: String,
    session_token: String,
}

/// Warehouse gateway backed by the Snowflake SQL REST API.
///
/// Cheaply cloneable; clones share the same session.
#[derive(Clone)]
pub struct SnowflakeClient {
    inner: Arc<Inner>,
}

impl SnowflakeClient {
    /// Opens a session using password authentication.
    ///
    /// Fails with [`ErrorKind::AuthenticationError`] when the credentials are
    /// rejected and [`ErrorKind::ConnectionFailed`] when the account endpoint
    /// is unreachable.
    pub async fn connect(config: &WarehouseConnectionConfig) -> StrataResult<Self> {
        let http = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()?;
        let base_url = format!("https://{}.snowflakecomputing.com", config.account);

        let request = LoginRequest {
            data: LoginRequestData {
                account_name: &config.account,
                login_name: &config.user,
                password: config.password.expose_secret(),
            },
        };

        let response: LoginResponse = http
            .post(format!("{base_url}{LOGIN_PATH}"))
            .header(ACCEPT, "application/json")
            .json(&request)
            .send()
            .await?
            .json()
            .await?;

        let token = match (response.success, response.data.and_then(|data| data.token)) {
            (true, Some(token)) => token,
            _ => {
                return Err(strata_error!(
                    ErrorKind::AuthenticationError,
                    "Warehouse login rejected",
                    response
                        .message
                        .unwrap_or_else(|| "no message returned".to_string())
                ));
            }
        };

        debug!(account = %config.account, user = %config.user, "warehouse session opened");

        Ok(Self {
            inner: Arc::new(Inner {
                http,
                base_url,
                warehouse: config.warehouse.clone(),
                session_token: token,
            }),
        })
    }

    fn authorization(&self) -> String {
        format!("Snowflake Token=\"{}\"", self.inner.session_token)
    }

    /// Drives a submitted statement to completion, polling its handle while
    /// the server keeps answering 202.
    async fn finish_statement(
        &self,
        mut response: reqwest::Response,
        statement: &str,
    ) -> StrataResult<Option<Vec<Row>>> {
        let deadline = Instant::now() + STATEMENT_TIMEOUT;

        while response.status() == StatusCode::ACCEPTED {
            let pending: StatementResponse = response.json().await?;
            let Some(handle) = pending.statement_handle else {
                return Err(strata_error!(
                    ErrorKind::ResponseInvalid,
                    "Asynchronous statement response carried no handle",
                    statement
                ));
            };

            if Instant::now() >= deadline {
                return Err(strata_error!(
                    ErrorKind::StatementFailed,
                    "Statement did not complete within the driver timeout",
                    format!("statement: {statement}")
                ));
            }

            tokio::time::sleep(STATEMENT_POLL_INTERVAL).await;

            response = self
                .inner
                .http
                .get(format!(
                    "{}{STATEMENTS_PATH}/{handle}",
                    self.inner.base_url
                ))
                .header(AUTHORIZATION, self.authorization())
                .header(ACCEPT, "application/json")
                .send()
                .await?;
        }

        let status = response.status();
        if !status.is_success() {
            let server_message = response
                .json::<StatementResponse>()
                .await
                .ok()
                .and_then(|body| body.message)
                .unwrap_or_else(|| format!("HTTP {status}"));

            return Err(strata_error!(
                ErrorKind::StatementFailed,
                "SQL statement failed",
                format!("statement: {statement}; server message: {server_message}")
            ));
        }

        let payload: StatementResponse = response.json().await?;
        match payload.result_set_meta_data {
            Some(_) => Ok(Some(payload.data.unwrap_or_default())),
            None => Ok(None),
        }
    }
}

impl WarehouseClient for SnowflakeClient {
    async fn execute(&self, statement: &str) -> StrataResult<Option<Vec<Row>>> {
        let statement = normalize_statement(statement);
        let request_id = Uuid::new_v4();

        let request = StatementRequest {
            statement: &statement,
            warehouse: &self.inner.warehouse,
            timeout: STATEMENT_TIMEOUT.as_secs(),
        };

        let response = self
            .inner
            .http
            .post(format!(
                "{}{STATEMENTS_PATH}?requestId={request_id}",
                self.inner.base_url
            ))
            .header(AUTHORIZATION, self.authorization())
            .header(ACCEPT, "application/json")
            .json(&request)
            .send()
            .await?;

        self.finish_statement(response, &statement).await
    }

    /// Logs the session out. Close-time failures are logged and swallowed so
    /// cleanup on error paths can never mask the original error.
    async fn close(&self) {
        let result = self
            .inner
            .http
            .post(format!("{}{LOGOUT_PATH}", self.inner.base_url))
            .header(AUTHORIZATION, self.authorization())
            .send()
            .await;

        match result {
            Ok(_) => debug!("warehouse session closed"),
            Err(err) => warn!(error = %err, "failed to close warehouse session"),
        }
    }
}
