//! Error types for the gridcal engine.

use thiserror::Error;

/// Errors that can occur while parsing and syncing a schedule source.
///
/// Per-cell and per-event problems are recovered locally (they become
/// diagnostics and never surface through this type during a run); these
/// variants cover run-level and pre-flight failures.
#[derive(Error, Debug)]
pub enum GridCalError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Cell parse error at {location}: {message}")]
    CellParse { location: String, message: String },

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Fetch error: {0}")]
    Fetch(String),

    #[error("Dispatch error: {0}")]
    Dispatch(String),

    #[error("State error: {0}")]
    State(String),

    #[error("Source not found: {0}")]
    SourceNotFound(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(String),
}

/// Result type alias for gridcal operations.
pub type GridCalResult<T> = Result<T, GridCalError>;
