//! Error types and result definitions for orchestration operations.
//!
//! Provides a kind-classified error system with captured diagnostic metadata
//! for ingestion operations. [`StrataError`] represents single errors, errors
//! with additional detail, and multiple aggregated errors (used when several
//! pipeline namespaces fail independently within one run).

use std::backtrace::Backtrace;
use std::borrow::Cow;
use std::error;
use std::fmt;
use std::panic::Location;
use std::sync::Arc;

/// Convenient result type for orchestration operations using [`StrataError`].
pub type StrataResult<T> = Result<T, StrataError>;

/// Detailed payload stored for single [`StrataError`] instances.
#[derive(Debug, Clone)]
struct ErrorPayload {
    kind: ErrorKind,
    description: Cow<'static, str>,
    detail: Option<Cow<'static, str>>,
    source: Option<Arc<dyn error::Error + Send + Sync>>,
    location: &'static Location<'static>,
    backtrace: Arc<Backtrace>,
}

/// Main error type for orchestration operations.
#[derive(Debug, Clone)]
pub struct StrataError {
    repr: ErrorRepr,
}

/// Internal representation of error data.
#[derive(Debug, Clone)]
enum ErrorRepr {
    /// Single error payload holding rich metadata.
    Single(ErrorPayload),
    /// Multiple aggregated errors, one per failed pipeline namespace.
    Many {
        errors: Vec<StrataError>,
        location: &'static Location<'static>,
    },
}

/// Specific categories of errors that can occur during orchestration.
#[derive(PartialEq, Eq, Copy, Clone, Debug)]
#[non_exhaustive]
pub enum ErrorKind {
    /// Configuration is missing or semantically invalid.
    ConfigError,
    /// Credential material is missing or was rejected at login.
    AuthenticationError,
    /// The warehouse gateway could not reach or keep a session with the warehouse.
    ConnectionFailed,
    /// A SQL statement failed; the detail carries the statement and server message.
    StatementFailed,
    /// The warehouse answered with a payload that could not be interpreted.
    ResponseInvalid,
    /// An object-store operation failed.
    ObjectStoreFailed,
    /// Local I/O failed.
    IoError,
    /// Data returned by the warehouse violates an expected shape.
    InvalidData,
    /// Uncategorized failure.
    Unknown,
}

impl StrataError {
    /// Returns the [`ErrorKind`] of this error.
    ///
    /// For aggregated errors, returns the kind of the first error or
    /// [`ErrorKind::Unknown`] when the aggregation is empty.
    pub fn kind(&self) -> ErrorKind {
        match self.repr {
            ErrorRepr::Single(ref payload) => payload.kind,
            ErrorRepr::Many { ref errors, .. } => errors
                .first()
                .map(|err| err.kind())
                .unwrap_or(ErrorKind::Unknown),
        }
    }

    /// Returns all [`ErrorKind`]s present in this error, flattened.
    pub fn kinds(&self) -> Vec<ErrorKind> {
        match self.repr {
            ErrorRepr::Single(ref payload) => vec![payload.kind],
            ErrorRepr::Many { ref errors, .. } => {
                errors.iter().flat_map(|err| err.kinds()).collect()
            }
        }
    }

    /// Returns the detailed error information if available.
    pub fn detail(&self) -> Option<&str> {
        match self.repr {
            ErrorRepr::Single(ref payload) => payload.detail.as_deref(),
            ErrorRepr::Many { ref errors, .. } => errors.iter().find_map(|err| err.detail()),
        }
    }

    /// Returns the captured backtrace for this error.
    pub fn backtrace(&self) -> Option<&Backtrace> {
        match self.repr {
            ErrorRepr::Single(ref payload) => Some(payload.backtrace.as_ref()),
            ErrorRepr::Many { .. } => None,
        }
    }

    /// Returns the captured callsite location for this error.
    pub fn location(&self) -> &'static Location<'static> {
        match self.repr {
            ErrorRepr::Single(ref payload) => payload.location,
            ErrorRepr::Many { location, .. } => location,
        }
    }

    /// Returns the aggregated errors when this error wraps several failures.
    pub fn errors(&self) -> Option<&[StrataError]> {
        match self.repr {
            ErrorRepr::Single(_) => None,
            ErrorRepr::Many { ref errors, .. } => Some(errors),
        }
    }

    /// Attaches an originating [`error::Error`] and returns the modified instance.
    ///
    /// Has no effect on aggregated errors, which forward the first contained
    /// error as their source.
    pub fn with_source<E>(mut self, source: E) -> Self
    where
        E: error::Error + Send + Sync + 'static,
    {
        if let ErrorRepr::Single(ref mut payload) = self.repr {
            payload.source = Some(Arc::new(source));
        }
        self
    }

    /// Creates a [`StrataError`] from its components.
    #[track_caller]
    fn from_components(
        kind: ErrorKind,
        description: Cow<'static, str>,
        detail: Option<Cow<'static, str>>,
        source: Option<Arc<dyn error::Error + Send + Sync>>,
    ) -> Self {
        StrataError {
            repr: ErrorRepr::Single(ErrorPayload {
                kind,
                description,
                detail,
                source,
                location: Location::caller(),
                backtrace: Arc::new(Backtrace::capture()),
            }),
        }
    }
}

impl PartialEq for StrataError {
    fn eq(&self, other: &StrataError) -> bool {
        match (&self.repr, &other.repr) {
            (ErrorRepr::Single(a), ErrorRepr::Single(b)) => a.kind == b.kind,
            (
                ErrorRepr::Many {
                    errors: errors_a, ..
                },
                ErrorRepr::Many {
                    errors: errors_b, ..
                },
            ) => {
                errors_a.len() == errors_b.len()
                    && errors_a.iter().zip(errors_b.iter()).all(|(a, b)| a == b)
            }
            _ => false,
        }
    }
}

impl fmt::Display for StrataError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> Result<(), fmt::Error> {
        match &self.repr {
            ErrorRepr::Single(payload) => {
                let location = payload.location;
                write!(
                    f,
                    "[{:?}] {} @ {}:{}:{}",
                    payload.kind,
                    payload.description,
                    location.file(),
                    location.line(),
                    location.column()
                )?;

                if let Some(detail) = payload.detail.as_deref() {
                    write!(f, "\n  Detail:")?;
                    for line in detail.lines() {
                        write!(f, "\n    {line}")?;
                    }
                }

                Ok(())
            }
            ErrorRepr::Many { errors, location } => {
                let count = errors.len();
                write!(
                    f,
                    "[Many] {} error{} aggregated @ {}:{}:{}",
                    count,
                    if count == 1 { "" } else { "s" },
                    location.file(),
                    location.line(),
                    location.column()
                )?;

                for (index, error) in errors.iter().enumerate() {
                    let rendered = format!("{error}");
                    for (line_index, line) in rendered.lines().enumerate() {
                        if line_index == 0 {
                            write!(f, "\n  {}. {}", index + 1, line)?;
                        } else {
                            write!(f, "\n     {line}")?;
                        }
                    }
                }

                Ok(())
            }
        }
    }
}

impl error::Error for StrataError {
    fn source(&self) -> Option<&(dyn error::Error + 'static)> {
        match &self.repr {
            ErrorRepr::Single(payload) => payload
                .source
                .as_ref()
                .map(|source| source as &(dyn error::Error + 'static)),
            // Aggregated errors forward the first contained error as their source.
            ErrorRepr::Many { errors, .. } => errors
                .first()
                .map(|error| error as &(dyn error::Error + 'static)),
        }
    }
}

/// Creates a [`StrataError`] from an error kind and static description.
impl From<(ErrorKind, &'static str)> for StrataError {
    #[track_caller]
    fn from((kind, desc): (ErrorKind, &'static str)) -> StrataError {
        StrataError::from_components(kind, Cow::Borrowed(desc), None, None)
    }
}

/// Creates a [`StrataError`] from an error kind, static description, and
/// dynamic detail.
impl<D> From<(ErrorKind, &'static str, D)> for StrataError
where
    D: Into<Cow<'static, str>>,
{
    #[track_caller]
    fn from((kind, desc, detail): (ErrorKind, &'static str, D)) -> StrataError {
        StrataError::from_components(kind, Cow::Borrowed(desc), Some(detail.into()), None)
    }
}

/// Aggregates a vector of errors.
///
/// A vector holding exactly one error unwraps to that error directly.
impl<E> From<Vec<E>> for StrataError
where
    E: Into<StrataError>,
{
    #[track_caller]
    fn from(errors: Vec<E>) -> StrataError {
        let location = Location::caller();

        let mut errors: Vec<StrataError> = errors.into_iter().map(Into::into).collect();
        if errors.len() == 1 {
            return errors.pop().expect("just checked length is 1");
        }

        StrataError {
            repr: ErrorRepr::Many { errors, location },
        }
    }
}

/// Converts [`std::io::Error`] with [`ErrorKind::IoError`].
impl From<std::io::Error> for StrataError {
    #[track_caller]
    fn from(err: std::io::Error) -> StrataError {
        let detail = err.to_string();
        let source = Arc::new(err);
        StrataError::from_components(
            ErrorKind::IoError,
            Cow::Borrowed("I/O operation failed"),
            Some(Cow::Owned(detail)),
            Some(source),
        )
    }
}

/// Converts [`serde_json::Error`] with the appropriate error kind.
impl From<serde_json::Error> for StrataError {
    #[track_caller]
    fn from(err: serde_json::Error) -> StrataError {
        let (kind, description) = match err.classify() {
            serde_json::error::Category::Io => (ErrorKind::IoError, "JSON I/O operation failed"),
            _ => (ErrorKind::ResponseInvalid, "JSON deserialization failed"),
        };

        let detail = err.to_string();
        let source = Arc::new(err);
        StrataError::from_components(
            kind,
            Cow::Borrowed(description),
            Some(Cow::Owned(detail)),
            Some(source),
        )
    }
}

/// Converts [`reqwest::Error`] with the appropriate error kind.
///
/// Transport-level failures map to [`ErrorKind::ConnectionFailed`]; body and
/// decoding failures map to [`ErrorKind::ResponseInvalid`].
impl From<reqwest::Error> for StrataError {
    #[track_caller]
    fn from(err: reqwest::Error) -> StrataError {
        let (kind, description) = if err.is_connect() || err.is_timeout() {
            (
                ErrorKind::ConnectionFailed,
                "Warehouse gateway request failed",
            )
        } else if err.is_decode() {
            (
                ErrorKind::ResponseInvalid,
                "Warehouse gateway response could not be decoded",
            )
        } else {
            (ErrorKind::ConnectionFailed, "Warehouse gateway error")
        };

        let detail = err.to_string();
        let source = Arc::new(err);
        StrataError::from_components(
            kind,
            Cow::Borrowed(description),
            Some(Cow::Owned(detail)),
            Some(source),
        )
    }
}

/// Converts [`object_store::Error`] with [`ErrorKind::ObjectStoreFailed`].
impl From<object_store::Error> for StrataError {
    #[track_caller]
    fn from(err: object_store::Error) -> StrataError {
        let detail = err.to_string();
        let source = Arc::new(err);
        StrataError::from_components(
            ErrorKind::ObjectStoreFailed,
            Cow::Borrowed("Object store operation failed"),
            Some(Cow::Owned(detail)),
            Some(source),
        )
    }
}

/// Converts [`strata_config::shared::CredentialsError`] with
/// [`ErrorKind::AuthenticationError`].
impl From<strata_config::shared::CredentialsError> for StrataError {
    #[track_caller]
    fn from(err: strata_config::shared::CredentialsError) -> StrataError {
        let detail = err.to_string();
        let source = Arc::new(err);
        StrataError::from_components(
            ErrorKind::AuthenticationError,
            Cow::Borrowed("Missing credential material"),
            Some(Cow::Owned(detail)),
            Some(source),
        )
    }
}

/// Converts [`strata_config::shared::ValidationError`] with
/// [`ErrorKind::ConfigError`].
impl From<strata_config::shared::ValidationError> for StrataError {
    #[track_caller]
    fn from(err: strata_config::shared::ValidationError) -> StrataError {
        let detail = err.to_string();
        let source = Arc::new(err);
        StrataError::from_components(
            ErrorKind::ConfigError,
            Cow::Borrowed("Configuration validation failed"),
            Some(Cow::Owned(detail)),
            Some(source),
        )
    }
}
