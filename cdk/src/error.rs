//! Error types and result definitions for concurrent source operations.
//!
//! Provides an error system with classification, aggregation, and captured
//! diagnostic metadata. The [`CdkError`] type supports single errors, errors with
//! additional detail, and multiple aggregated errors for scenarios where several
//! workers fail independently during the same sync.

use std::backtrace::Backtrace;
use std::borrow::Cow;
use std::error;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::panic::Location;
use std::sync::Arc;

/// Convenient result type for concurrent source operations using [`CdkError`] as the error type.
pub type CdkResult<T> = Result<T, CdkError>;

/// Detailed payload stored for single [`CdkError`] instances.
#[derive(Debug, Clone)]
struct ErrorPayload {
    kind: ErrorKind,
    description: Cow<'static, str>,
    detail: Option<Cow<'static, str>>,
    source: Option<Arc<dyn error::Error + Send + Sync>>,
    location: &'static Location<'static>,
    backtrace: Arc<Backtrace>,
}

impl ErrorPayload {
    /// Creates a new payload with optional dynamic detail.
    fn new(
        kind: ErrorKind,
        description: Cow<'static, str>,
        detail: Option<Cow<'static, str>>,
        source: Option<Arc<dyn error::Error + Send + Sync>>,
        location: &'static Location<'static>,
        backtrace: Arc<Backtrace>,
    ) -> Self {
        Self {
            kind,
            description,
            detail,
            source,
            location,
            backtrace,
        }
    }
}

/// Main error type for concurrent source operations.
///
/// [`CdkError`] can represent single errors, errors with additional detail, or
/// multiple aggregated errors. Aggregation matters here because a best-effort
/// sync collects one failure per misbehaving stream and must surface all of
/// them at the end.
#[derive(Debug, Clone)]
pub struct CdkError {
    repr: ErrorRepr,
}

/// Internal representation of error data.
///
/// This enum supports different error patterns while maintaining a unified interface.
/// Users should not interact with this type directly but use [`CdkError`] methods instead.
#[derive(Debug, Clone)]
enum ErrorRepr {
    /// Single error payload holding rich metadata.
    Single(ErrorPayload),
    /// Multiple aggregated errors.
    ///
    /// This variant is mainly useful to capture multiple workers failures.
    Many {
        errors: Vec<CdkError>,
        location: &'static Location<'static>,
    },
}

/// Specific categories of errors that can occur during concurrent source operations.
///
/// This enum provides granular error classification to enable appropriate error handling
/// strategies. Error kinds are organized by functional area and failure mode.
#[derive(PartialEq, Eq, Copy, Clone, Debug, Hash)]
#[non_exhaustive]
pub enum ErrorKind {
    // Stream & Partition Errors
    AvailabilityCheckFailed,
    PartitionGenerationFailed,
    PartitionReadFailed,

    // Coordination Errors
    QueueClosed,
    InvalidState,
    PartitionGeneratorPanic,
    PartitionReaderPanic,

    // Configuration Errors
    ConfigError,

    // IO & Serialization Errors
    IoError,
    SerializationError,
    DeserializationError,

    // General Errors
    SourceError,

    // Unknown / Uncategorized
    Unknown,
}

impl CdkError {
    /// Returns the [`ErrorKind`] of this error.
    ///
    /// For multiple errors, returns the kind of the first error or [`ErrorKind::Unknown`]
    /// if the error list is empty.
    pub fn kind(&self) -> ErrorKind {
        match self.repr {
            ErrorRepr::Single(ref payload) => payload.kind,
            ErrorRepr::Many { ref errors, .. } => errors
                .first()
                .map(|err| err.kind())
                .unwrap_or(ErrorKind::Unknown),
        }
    }

    /// Returns all [`ErrorKind`]s present in this error.
    ///
    /// For single errors, returns a vector with one element. For multiple errors,
    /// returns a flattened vector of all error kinds.
    pub fn kinds(&self) -> Vec<ErrorKind> {
        match self.repr {
            ErrorRepr::Single(ref payload) => vec![payload.kind],
            ErrorRepr::Many { ref errors, .. } => errors
                .iter()
                .flat_map(|err| err.kinds())
                .collect::<Vec<_>>(),
        }
    }

    /// Returns the detailed error information if available.
    ///
    /// For multiple errors, returns the detail of the first error that has one.
    /// Returns [`None`] if no detailed information is available.
    pub fn detail(&self) -> Option<&str> {
        match self.repr {
            ErrorRepr::Single(ref payload) => payload.detail.as_deref(),
            ErrorRepr::Many { ref errors, .. } => {
                // For multiple errors, return the detail of the first error that has one.
                errors.iter().find_map(|e| e.detail())
            }
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

    /// Attaches an originating [`error::Error`] to this error and returns the modified instance.
    ///
    /// The stored source is preserved across clones and exposed via [`error::Error::source`].
    /// Has no effect when called on aggregated errors because aggregates forward the first
    /// contained error as their source.
    pub fn with_source<E>(mut self, source: E) -> Self
    where
        E: error::Error + Send + Sync + 'static,
    {
        self.set_source(Some(Arc::new(source)));
        self
    }

    /// Creates a [`CdkError`] from its components.
    #[track_caller]
    fn from_components(
        kind: ErrorKind,
        description: Cow<'static, str>,
        detail: Option<Cow<'static, str>>,
        source: Option<Arc<dyn error::Error + Send + Sync>>,
    ) -> Self {
        let location = Location::caller();
        let backtrace = Arc::new(Backtrace::capture());

        CdkError {
            repr: ErrorRepr::Single(ErrorPayload::new(
                kind,
                description,
                detail,
                source,
                location,
                backtrace,
            )),
        }
    }

    /// Sets the source for this [`CdkError`].
    fn set_source(&mut self, source: Option<Arc<dyn error::Error + Send + Sync>>) {
        if let ErrorRepr::Single(ref mut payload) = self.repr {
            payload.source = source;
        }
    }
}

impl PartialEq for CdkError {
    fn eq(&self, other: &CdkError) -> bool {
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

impl Hash for CdkError {
    /// Hashes the error using only its stable identifying components.
    ///
    /// Only hashes the error kind and static description, intentionally excluding:
    /// - Location information (file, line, column)
    /// - Detail field (often contains dynamic data like stream names, slices)
    /// - Source errors
    /// - Backtrace
    ///
    /// This ensures that errors of the same category produce the same hash,
    /// enabling stable grouping and deduplication across multiple occurrences.
    fn hash<H: Hasher>(&self, state: &mut H) {
        match &self.repr {
            ErrorRepr::Single(payload) => {
                // Hash the discriminant to distinguish from Many variant.
                std::mem::discriminant(&self.repr).hash(state);
                // Hash only the stable components.
                payload.kind.hash(state);
                payload.description.hash(state);
            }
            ErrorRepr::Many { errors, .. } => {
                // Hash the discriminant to distinguish from Single variant.
                std::mem::discriminant(&self.repr).hash(state);
                // Hash the number of errors for differentiation.
                errors.len().hash(state);
                // Hash all errors in the aggregation.
                for error in errors {
                    error.hash(state);
                }
            }
        }
    }
}

impl fmt::Display for CdkError {
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

                write_detail(payload.detail.as_deref(), f, 1)?;
                write_backtrace(payload.backtrace.as_ref(), f, 1)?;

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

                if errors.is_empty() {
                    write!(f, "\n  (no inner errors provided)")?;
                } else {
                    for (index, error) in errors.iter().enumerate() {
                        let rendered = format!("{error}");
                        let mut lines = rendered.lines();
                        if let Some(first_line) = lines.next() {
                            write!(f, "\n  {}. {}", index + 1, first_line)?;
                        } else {
                            write!(f, "\n  {}.", index + 1)?;
                        }

                        for line in lines {
                            if line.is_empty() {
                                write!(f, "\n     ")?;
                            } else {
                                write!(f, "\n     {line}")?;
                            }
                        }
                    }
                }

                Ok(())
            }
        }
    }
}

impl error::Error for CdkError {
    fn source(&self) -> Option<&(dyn error::Error + 'static)> {
        match &self.repr {
            ErrorRepr::Single(payload) => payload
                .source
                .as_ref()
                .map(|source| source as &(dyn error::Error + 'static)),
            // For aggregated errors, we forward the first contained error as the source.
            ErrorRepr::Many { errors, .. } => errors
                .first()
                .map(|error| error as &(dyn error::Error + 'static)),
        }
    }
}

/// Writes the captured backtrace with indentation.
fn write_backtrace(
    backtrace: &Backtrace,
    f: &mut fmt::Formatter<'_>,
    indent: usize,
) -> fmt::Result {
    let indent_str = "  ".repeat(indent);

    let rendered_backtrace = format!("{backtrace}");
    if !rendered_backtrace.trim().is_empty() {
        write!(f, "\n{indent_str}Backtrace:")?;
        for line in rendered_backtrace.lines() {
            if line.trim().is_empty() {
                write!(f, "\n{indent_str}  ")?;
            } else {
                write!(f, "\n{indent_str}  {line}")?;
            }
        }
    }

    Ok(())
}

/// Writes the detail block with indentation.
fn write_detail(detail: Option<&str>, f: &mut fmt::Formatter<'_>, indent: usize) -> fmt::Result {
    if let Some(detail) = detail {
        let indent_str = "  ".repeat(indent);
        if detail.trim().is_empty() {
            write!(f, "\n{indent_str}Detail: <empty>")?;
        } else {
            write!(f, "\n{indent_str}Detail:")?;
            for line in detail.lines() {
                if line.trim().is_empty() {
                    write!(f, "\n{indent_str}  ")?;
                } else {
                    write!(f, "\n{indent_str}  {line}")?;
                }
            }
        }
    }

    Ok(())
}

/// Creates a [`CdkError`] from an error kind and static description.
impl From<(ErrorKind, &'static str)> for CdkError {
    #[track_caller]
    fn from((kind, desc): (ErrorKind, &'static str)) -> CdkError {
        CdkError::from_components(kind, Cow::Borrowed(desc), None, None)
    }
}

/// Creates a [`CdkError`] from an error kind, static description, and dynamic detail.
impl<D> From<(ErrorKind, &'static str, D)> for CdkError
where
    D: Into<Cow<'static, str>>,
{
    #[track_caller]
    fn from((kind, desc, detail): (ErrorKind, &'static str, D)) -> CdkError {
        CdkError::from_components(kind, Cow::Borrowed(desc), Some(detail.into()), None)
    }
}

/// Creates a [`CdkError`] from a vector of errors for aggregation.
///
/// If the vector contains exactly one error, returns that error directly without wrapping
/// it in the [`ErrorRepr::Many`] variant.
impl<E> From<Vec<E>> for CdkError
where
    E: Into<CdkError>,
{
    #[track_caller]
    fn from(errors: Vec<E>) -> CdkError {
        let location = Location::caller();

        let mut errors: Vec<CdkError> = errors.into_iter().map(Into::into).collect();

        if errors.len() == 1 {
            return errors.pop().expect("just checked length is 1");
        }

        CdkError {
            repr: ErrorRepr::Many { errors, location },
        }
    }
}

/// Converts [`std::io::Error`] to [`CdkError`] with [`ErrorKind::IoError`].
impl From<std::io::Error> for CdkError {
    #[track_caller]
    fn from(err: std::io::Error) -> CdkError {
        let detail = err.to_string();
        let source = Arc::new(err);
        CdkError::from_components(
            ErrorKind::IoError,
            Cow::Borrowed("I/O operation failed"),
            Some(Cow::Owned(detail)),
            Some(source),
        )
    }
}

/// Converts [`serde_json::Error`] to [`CdkError`] with the appropriate error kind.
///
/// Maps to [`ErrorKind::SerializationError`] for serialization failures and
/// [`ErrorKind::DeserializationError`] for deserialization failures based on error classification.
impl From<serde_json::Error> for CdkError {
    #[track_caller]
    fn from(err: serde_json::Error) -> CdkError {
        let (kind, description) = match err.classify() {
            serde_json::error::Category::Io => (ErrorKind::IoError, "JSON I/O operation failed"),
            serde_json::error::Category::Syntax | serde_json::error::Category::Data => (
                ErrorKind::DeserializationError,
                "JSON deserialization failed",
            ),
            serde_json::error::Category::Eof => (
                ErrorKind::DeserializationError,
                "JSON deserialization failed",
            ),
        };

        let detail = err.to_string();
        let source = Arc::new(err);
        CdkError::from_components(
            kind,
            Cow::Borrowed(description),
            Some(Cow::Owned(detail)),
            Some(source),
        )
    }
}

/// An error raised inside a worker task, tagged with the stream it belongs to.
///
/// Worker tasks never propagate errors upward: they wrap them in this type and
/// push them through the output queue, reusing the same delivery mechanism as
/// successful records. The consumer loop is therefore the single place where
/// fatal-versus-recoverable decisions are made.
#[derive(Debug, Clone)]
pub struct StreamWorkerError {
    stream_name: Arc<str>,
    error: CdkError,
}

impl StreamWorkerError {
    /// Creates a new worker error for the given stream.
    pub fn new(stream_name: impl Into<Arc<str>>, error: CdkError) -> Self {
        Self {
            stream_name: stream_name.into(),
            error,
        }
    }

    /// Name of the stream whose worker raised the error.
    pub fn stream_name(&self) -> &str {
        &self.stream_name
    }

    /// The wrapped error.
    pub fn error(&self) -> &CdkError {
        &self.error
    }

    /// Consumes the wrapper and returns the underlying error.
    pub fn into_error(self) -> CdkError {
        self.error
    }
}

impl PartialEq for StreamWorkerError {
    fn eq(&self, other: &StreamWorkerError) -> bool {
        self.stream_name == other.stream_name && self.error == other.error
    }
}

impl fmt::Display for StreamWorkerError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "worker for stream '{}' failed: {}", self.stream_name, self.error)
    }
}

impl error::Error for StreamWorkerError {
    fn source(&self) -> Option<&(dyn error::Error + 'static)> {
        Some(&self.error)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cdk_error;

    #[test]
    fn single_errors_compare_by_kind() {
        let a = cdk_error!(ErrorKind::PartitionReadFailed, "read failed");
        let b = cdk_error!(ErrorKind::PartitionReadFailed, "another description");
        let c = cdk_error!(ErrorKind::PartitionGenerationFailed, "read failed");

        assert_eq!(a, b);
        assert_ne!(a, c);
    }

    #[test]
    fn aggregating_one_error_returns_it_unwrapped() {
        let single = cdk_error!(ErrorKind::PartitionReadFailed, "read failed");
        let aggregated = CdkError::from(vec![single.clone()]);

        assert_eq!(aggregated, single);
        assert_eq!(aggregated.kinds(), vec![ErrorKind::PartitionReadFailed]);
    }

    #[test]
    fn aggregated_errors_flatten_kinds() {
        let errors = vec![
            cdk_error!(ErrorKind::PartitionReadFailed, "read failed"),
            cdk_error!(ErrorKind::PartitionGenerationFailed, "generation failed"),
        ];
        let aggregated = CdkError::from(errors);

        assert_eq!(
            aggregated.kinds(),
            vec![
                ErrorKind::PartitionReadFailed,
                ErrorKind::PartitionGenerationFailed
            ]
        );
        assert_eq!(aggregated.kind(), ErrorKind::PartitionReadFailed);
    }

    #[test]
    fn worker_errors_compare_by_stream_and_error() {
        let a = StreamWorkerError::new(
            "orders",
            cdk_error!(ErrorKind::PartitionReadFailed, "read failed"),
        );
        let b = StreamWorkerError::new(
            "orders",
            cdk_error!(ErrorKind::PartitionReadFailed, "read failed elsewhere"),
        );
        let c = StreamWorkerError::new(
            "customers",
            cdk_error!(ErrorKind::PartitionReadFailed, "read failed"),
        );

        assert_eq!(a, b);
        assert_ne!(a, c);
    }
}
