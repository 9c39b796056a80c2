//! Error types for the benchmark harness.

use std::path::PathBuf;
use thiserror::Error;

use crate::backend::{Backend, Operation};

/// Result type alias for harness operations.
pub type Result<T, E = Error> = std::result::Result<T, E>;

/// Errors that can occur while preparing or running a benchmark.
#[derive(Error, Debug)]
pub enum Error {
    /// Malformed configuration, rejected before any work begins.
    #[error("invalid input: {0}")]
    InvalidInput(String),

    /// Staging or cleanup I/O failed.
    #[error("I/O failure{} at {}: {source}", index_suffix(.index), .path.display())]
    Io {
        /// Position of the image being staged, if any.
        index: Option<usize>,
        /// The file that could not be written or removed.
        path: PathBuf,
        /// The underlying error.
        #[source]
        source: std::io::Error,
    },

    /// One backend failed one operation.
    #[error("backend '{}' failed to {operation}: {cause}", .backend.name())]
    Backend {
        /// The failing variant.
        backend: Backend,
        /// The failing operation.
        operation: Operation,
        /// Human-readable cause, converted from the library error.
        cause: String,
    },

    /// The run report could not be written.
    #[error("report error: {0}")]
    Report(String),
}

fn index_suffix(index: &Option<usize>) -> String {
    match index {
        Some(i) => format!(" staging image {}", i),
        None => String::new(),
    }
}

impl Error {
    pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Error::Io {
            index: None,
            path: path.into(),
            source,
        }
    }

    pub(crate) fn backend(backend: Backend, operation: Operation, cause: impl ToString) -> Self {
        Error::Backend {
            backend,
            operation,
            cause: cause.to_string(),
        }
    }
}
