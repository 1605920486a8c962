use strata::error::StrataError;
use strata_config::LoadConfigError;
use strata_config::shared::CredentialsError;
use thiserror::Error;

/// Result type for runner operations.
pub type RunnerResult<T> = Result<T, RunnerError>;

/// Error type for the runner service.
///
/// Wraps [`StrataError`] for orchestration failures and provides variants for
/// infrastructure errors raised before any orchestration begins.
#[derive(Debug, Error)]
pub enum RunnerError {
    /// Orchestration or warehouse-related error.
    #[error("{0}")]
    Orchestration(#[from] StrataError),
    /// Configuration discovery or parsing error.
    #[error("configuration error: {0}")]
    Config(#[from] LoadConfigError),
    /// Missing environment credential.
    #[error("credential error: {0}")]
    Credentials(#[from] CredentialsError),
    /// I/O error.
    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),
}
