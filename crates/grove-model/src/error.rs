use thiserror::Error;

/// Errors raised by the field model and by callers validating documents
/// against it.
#[derive(Debug, Error)]
pub enum GroveError {
    /// Malformed persisted data or an unparseable field format string.
    /// Unrecoverable for the affected document.
    #[error("format error: {0}")]
    Format(String),
    /// A candidate value was rejected by a field's validation rules.
    /// Local and recoverable; blocks only the specific edit.
    #[error("{0}")]
    Validation(String),
    /// A field name that does not exist in the field set.
    #[error("unknown field: {0}")]
    UnknownField(String),
    /// A field name that already exists in the field set.
    #[error("duplicate field: {0}")]
    DuplicateField(String),
}

pub type Result<T> = std::result::Result<T, GroveError>;
