//! Error type of the training crate.
//!
//! [`TrainError`] wraps the errors of the lower crates and adds the failures
//! that only exist once files are involved: IO, malformed input lines and
//! empty vocabularies.

use hyperembed_core::{ConfigError, ManifoldError, OptimizerError};
use thiserror::Error;

/// Errors raised while loading data, training or writing checkpoints.
#[derive(Debug, Error)]
pub enum TrainError {
    /// A vector space or an embedding table was misused.
    #[error(transparent)]
    Manifold(#[from] ManifoldError),

    /// The optimizer rejected its configuration or an index.
    #[error(transparent)]
    Optimizer(#[from] OptimizerError),

    /// The run configuration is invalid.
    #[error(transparent)]
    Config(#[from] ConfigError),

    /// Reading or writing a file failed.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// An input line could not be parsed.
    #[error("Malformed input at line {line}: {reason}")]
    Format {
        /// One-based line number
        line: usize,
        /// What is wrong with the line
        reason: String,
    },

    /// The input produced no item to train on.
    #[error("The vocabulary is empty")]
    EmptyVocabulary,

    /// A JSON checkpoint could not be encoded or decoded.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl TrainError {
    /// Create a Format error.
    pub fn format<S: Into<String>>(line: usize, reason: S) -> Self {
        Self::Format {
            line,
            reason: reason.into(),
        }
    }
}

/// Result type alias for training operations.
pub type TrainResult<T> = std::result::Result<T, TrainError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_wrapped_errors_keep_their_message() {
        let err: TrainError = ManifoldError::invalid_parameter("curvature must be positive").into();
        assert_eq!(
            err.to_string(),
            "Invalid manifold parameter: curvature must be positive"
        );

        let err = TrainError::format(3, "expected 4 coordinates");
        assert_eq!(
            err.to_string(),
            "Malformed input at line 3: expected 4 coordinates"
        );
    }
}
