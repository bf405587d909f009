use std::error;
use std::fmt;

/// Convenient result type for pipeline operations using [`ConveyorError`] as
/// the error type.
pub type ConveyorResult<T> = Result<T, ConveyorError>;

/// Main error type for pipeline operations.
///
/// [`ConveyorError`] can represent a single classified error, an error with
/// additional dynamic detail, or multiple aggregated errors from concurrent
/// stages. Classification lives in [`ErrorKind`] so that retry decisions never
/// depend on string matching.
#[derive(Debug, Clone)]
pub struct ConveyorError {
    repr: ErrorRepr,
}

/// Internal representation of error data.
#[derive(Debug, Clone)]
enum ErrorRepr {
    /// Error with kind and static description.
    WithDescription(ErrorKind, &'static str),
    /// Error with kind, static description, and dynamic detail.
    WithDescriptionAndDetail(ErrorKind, &'static str, String),
    /// Multiple aggregated errors.
    Many(Vec<ConveyorError>),
}

/// Closed classification of pipeline failures.
///
/// The transient/fatal split drawn by [`ErrorKind::is_transient`] is the
/// single decision point consumed by the retry policy; no retry decision is
/// ever derived from error text.
#[derive(PartialEq, Eq, Copy, Clone, Debug)]
#[non_exhaustive]
pub enum ErrorKind {
    // Configuration & preconditions
    ConfigError,
    ValidationFailed,

    // Transient source/destination failures
    SourceConnectionFailed,
    TimedOut,
    RateLimited,
    SourceUnavailable,

    // Fatal extraction failures
    AuthenticationFailed,
    MalformedResponse,
    SchemaViolation,

    // Dataset & transform failures
    MissingDataset,
    TransformFailed,
    ConversionError,

    // Loading failures
    LoadBatchFailed,
    DestinationError,

    // IO & serialization
    IoError,
    SerializationError,
    DeserializationError,

    // Lifecycle
    InvalidState,
    Cancelled,

    // Unknown / uncategorized
    Unknown,
}

impl ErrorKind {
    /// Returns `true` when a failure of this kind is worth retrying.
    ///
    /// Timeouts, connection drops, throttling responses and temporary outages
    /// are transient; everything else fails immediately regardless of the
    /// remaining retry budget.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            ErrorKind::SourceConnectionFailed
                | ErrorKind::TimedOut
                | ErrorKind::RateLimited
                | ErrorKind::SourceUnavailable
        )
    }
}

impl ConveyorError {
    /// Creates a [`ConveyorError`] containing multiple aggregated errors.
    ///
    /// Used when several concurrent stages fail and all failures should be
    /// reported rather than just the first one.
    pub fn many(errors: Vec<ConveyorError>) -> ConveyorError {
        ConveyorError {
            repr: ErrorRepr::Many(errors),
        }
    }

    /// Returns the [`ErrorKind`] of this error.
    ///
    /// For multiple errors, returns the kind of the first error or
    /// [`ErrorKind::Unknown`] if the error list is empty.
    pub fn kind(&self) -> ErrorKind {
        match self.repr {
            ErrorRepr::WithDescription(kind, _)
            | ErrorRepr::WithDescriptionAndDetail(kind, _, _) => kind,
            ErrorRepr::Many(ref errors) => errors
                .first()
                .map(|err| err.kind())
                .unwrap_or(ErrorKind::Unknown),
        }
    }

    /// Returns all [`ErrorKind`]s present in this error.
    pub fn kinds(&self) -> Vec<ErrorKind> {
        match self.repr {
            ErrorRepr::WithDescription(kind, _)
            | ErrorRepr::WithDescriptionAndDetail(kind, _, _) => vec![kind],
            ErrorRepr::Many(ref errors) => errors
                .iter()
                .flat_map(|err| err.kinds())
                .collect::<Vec<_>>(),
        }
    }

    /// Returns the detailed error information if available.
    pub fn detail(&self) -> Option<&str> {
        match self.repr {
            ErrorRepr::WithDescriptionAndDetail(_, _, ref detail) => Some(detail.as_str()),
            ErrorRepr::Many(ref errors) => errors.iter().find_map(|e| e.detail()),
            _ => None,
        }
    }
}

impl PartialEq for ConveyorError {
    fn eq(&self, other: &ConveyorError) -> bool {
        match (&self.repr, &other.repr) {
            (ErrorRepr::WithDescription(kind_a, _), ErrorRepr::WithDescription(kind_b, _)) => {
                kind_a == kind_b
            }
            (
                ErrorRepr::WithDescriptionAndDetail(kind_a, _, _),
                ErrorRepr::WithDescriptionAndDetail(kind_b, _, _),
            ) => kind_a == kind_b,
            (ErrorRepr::Many(errors_a), ErrorRepr::Many(errors_b)) => {
                errors_a.len() == errors_b.len()
                    && errors_a.iter().zip(errors_b.iter()).all(|(a, b)| a == b)
            }
            _ => false,
        }
    }
}

impl fmt::Display for ConveyorError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> Result<(), fmt::Error> {
        match self.repr {
            ErrorRepr::WithDescription(kind, desc) => {
                fmt::Debug::fmt(&kind, f)?;
                f.write_str(": ")?;
                desc.fmt(f)?;

                Ok(())
            }
            ErrorRepr::WithDescriptionAndDetail(kind, desc, ref detail) => {
                fmt::Debug::fmt(&kind, f)?;
                f.write_str(": ")?;
                desc.fmt(f)?;
                f.write_str(" -> ")?;
                detail.fmt(f)?;

                Ok(())
            }
            ErrorRepr::Many(ref errors) => {
                if errors.is_empty() {
                    write!(f, "Multiple errors occurred (empty)")?;
                } else if errors.len() == 1 {
                    errors[0].fmt(f)?;
                } else {
                    write!(f, "Multiple errors occurred ({} total):", errors.len())?;
                    for (i, error) in errors.iter().enumerate() {
                        write!(f, "\n  {}: {}", i + 1, error)?;
                    }
                }
                Ok(())
            }
        }
    }
}

impl error::Error for ConveyorError {}

/// Creates a [`ConveyorError`] from an error kind and static description.
impl From<(ErrorKind, &'static str)> for ConveyorError {
    fn from((kind, desc): (ErrorKind, &'static str)) -> ConveyorError {
        ConveyorError {
            repr: ErrorRepr::WithDescription(kind, desc),
        }
    }
}

/// Creates a [`ConveyorError`] from an error kind, static description, and
/// dynamic detail.
impl From<(ErrorKind, &'static str, String)> for ConveyorError {
    fn from((kind, desc, detail): (ErrorKind, &'static str, String)) -> ConveyorError {
        ConveyorError {
            repr: ErrorRepr::WithDescriptionAndDetail(kind, desc, detail),
        }
    }
}

/// Creates a [`ConveyorError`] from a vector of errors for aggregation.
impl<E> From<Vec<E>> for ConveyorError
where
    E: Into<ConveyorError>,
{
    fn from(errors: Vec<E>) -> ConveyorError {
        ConveyorError {
            repr: ErrorRepr::Many(errors.into_iter().map(Into::into).collect()),
        }
    }
}

/// Converts [`std::io::Error`] to [`ConveyorError`] with [`ErrorKind::IoError`].
impl From<std::io::Error> for ConveyorError {
    fn from(err: std::io::Error) -> ConveyorError {
        ConveyorError {
            repr: ErrorRepr::WithDescriptionAndDetail(
                ErrorKind::IoError,
                "I/O error occurred",
                err.to_string(),
            ),
        }
    }
}

/// Converts [`serde_json::Error`] to [`ConveyorError`] with the appropriate
/// error kind based on error classification.
impl From<serde_json::Error> for ConveyorError {
    fn from(err: serde_json::Error) -> ConveyorError {
        let (kind, description) = match err.classify() {
            serde_json::error::Category::Io => (ErrorKind::IoError, "JSON I/O operation failed"),
            serde_json::error::Category::Syntax
            | serde_json::error::Category::Data
            | serde_json::error::Category::Eof => (
                ErrorKind::DeserializationError,
                "JSON deserialization failed",
            ),
        };

        ConveyorError {
            repr: ErrorRepr::WithDescriptionAndDetail(kind, description, err.to_string()),
        }
    }
}

/// Converts [`chrono::ParseError`] to [`ConveyorError`] with
/// [`ErrorKind::ConversionError`].
impl From<chrono::ParseError> for ConveyorError {
    fn from(err: chrono::ParseError) -> ConveyorError {
        ConveyorError {
            repr: ErrorRepr::WithDescriptionAndDetail(
                ErrorKind::ConversionError,
                "Timestamp parsing failed",
                err.to_string(),
            ),
        }
    }
}

/// Converts a configuration [`conveyor_config::ValidationError`] to
/// [`ConveyorError`] with [`ErrorKind::ConfigError`].
impl From<conveyor_config::ValidationError> for ConveyorError {
    fn from(err: conveyor_config::ValidationError) -> ConveyorError {
        ConveyorError {
            repr: ErrorRepr::WithDescriptionAndDetail(
                ErrorKind::ConfigError,
                "Invalid job configuration",
                err.to_string(),
            ),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{bail, conveyor_error};

    #[test]
    fn simple_error_creation() {
        let err = ConveyorError::from((ErrorKind::SourceConnectionFailed, "Connection refused"));
        assert_eq!(err.kind(), ErrorKind::SourceConnectionFailed);
        assert_eq!(err.detail(), None);
        assert_eq!(err.kinds(), vec![ErrorKind::SourceConnectionFailed]);
    }

    #[test]
    fn error_with_detail() {
        let err = ConveyorError::from((
            ErrorKind::MissingDataset,
            "Dataset not found in store",
            "orders".to_string(),
        ));
        assert_eq!(err.kind(), ErrorKind::MissingDataset);
        assert_eq!(err.detail(), Some("orders"));
    }

    #[test]
    fn multiple_errors_aggregate_kinds() {
        let errors = vec![
            ConveyorError::from((ErrorKind::ValidationFailed, "Invalid destination")),
            ConveyorError::from((ErrorKind::TimedOut, "Stage timed out")),
        ];
        let multi_err = ConveyorError::many(errors);

        assert_eq!(multi_err.kind(), ErrorKind::ValidationFailed);
        assert_eq!(
            multi_err.kinds(),
            vec![ErrorKind::ValidationFailed, ErrorKind::TimedOut]
        );
    }

    #[test]
    fn empty_multiple_errors_default_to_unknown() {
        let multi_err = ConveyorError::many(vec![]);
        assert_eq!(multi_err.kind(), ErrorKind::Unknown);
        assert_eq!(multi_err.kinds(), vec![]);
    }

    #[test]
    fn transient_classification_is_closed() {
        assert!(ErrorKind::TimedOut.is_transient());
        assert!(ErrorKind::SourceConnectionFailed.is_transient());
        assert!(ErrorKind::RateLimited.is_transient());
        assert!(ErrorKind::SourceUnavailable.is_transient());

        assert!(!ErrorKind::AuthenticationFailed.is_transient());
        assert!(!ErrorKind::MalformedResponse.is_transient());
        assert!(!ErrorKind::SchemaViolation.is_transient());
        assert!(!ErrorKind::MissingDataset.is_transient());
        assert!(!ErrorKind::ConfigError.is_transient());
        assert!(!ErrorKind::LoadBatchFailed.is_transient());
    }

    #[test]
    fn error_display_includes_kind_and_detail() {
        let err = ConveyorError::from((
            ErrorKind::LoadBatchFailed,
            "Batch load failed",
            "batch 2 of 3".to_string(),
        ));
        let display_str = format!("{err}");
        assert!(display_str.contains("LoadBatchFailed"));
        assert!(display_str.contains("Batch load failed"));
        assert!(display_str.contains("batch 2 of 3"));
    }

    #[test]
    fn macro_usage() {
        let err = conveyor_error!(ErrorKind::ValidationFailed, "Invalid data format");
        assert_eq!(err.kind(), ErrorKind::ValidationFailed);
        assert_eq!(err.detail(), None);

        let err_with_detail = conveyor_error!(
            ErrorKind::ConversionError,
            "Type conversion failed",
            "cannot convert 'abc' to an integer"
        );
        assert_eq!(err_with_detail.kind(), ErrorKind::ConversionError);
        assert!(err_with_detail.detail().unwrap().contains("abc"));
    }

    #[test]
    fn bail_macro_returns_early() {
        fn fails() -> ConveyorResult<i32> {
            bail!(ErrorKind::ValidationFailed, "Test error");
        }

        let err = fails().unwrap_err();
        assert_eq!(err.kind(), ErrorKind::ValidationFailed);
    }
}
