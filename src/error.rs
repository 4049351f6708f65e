//! Definition of the crate's error and result types.

use thiserror::Error;

/// The crate's failure enum.
///
/// `InvalidRequest` and `AfterKey` are raised while a request is prepared,
/// before any document is scanned. `ValueTypeMismatch` is a data-integrity
/// fault detected during scanning; it aborts the whole request rather than
/// skipping documents, since it indicates a mapping inconsistency.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum CompositeError {
    /// The request configuration is invalid (empty source list, duplicate
    /// source names, zero size, bad interval, ...).
    #[error("invalid composite aggregation request: {0}")]
    InvalidRequest(String),
    /// The supplied after key does not decode against the configured sources.
    #[error(
        "cannot set after key - incompatible value in the position {position} for field \
         '{field}': {detail}"
    )]
    AfterKey {
        /// Name of the offending source.
        field: String,
        /// Zero-based position of the source in the request.
        position: usize,
        /// What went wrong, including expected vs. actual type where known.
        detail: String,
    },
    /// A document produced a raw value incompatible with its source's
    /// declared type.
    #[error("field '{field}' yielded a {actual} value, expected {expected}")]
    ValueTypeMismatch {
        /// The field that produced the value.
        field: String,
        /// Description of the type the source requires.
        expected: String,
        /// Kind of the value actually seen.
        actual: &'static str,
    },
    /// A collaborator failed while scanning a partition. The whole request
    /// fails; incomplete results are never returned silently.
    #[error("partition error: {0}")]
    Partition(String),
    /// System error (e.g. spawning the scan thread pool failed).
    #[error("system error: '{0}'")]
    SystemError(String),
    /// Invariant violation inside the engine.
    #[error("internal error: '{0}'")]
    InternalError(String),
}

impl From<serde_json::Error> for CompositeError {
    fn from(error: serde_json::Error) -> CompositeError {
        CompositeError::InvalidRequest(error.to_string())
    }
}

impl From<rayon::ThreadPoolBuildError> for CompositeError {
    fn from(error: rayon::ThreadPoolBuildError) -> CompositeError {
        CompositeError::SystemError(error.to_string())
    }
}
