//! Error types for hyperbolic embedding training.
//!
//! Three families of errors exist, one per concern:
//!
//! - [`ManifoldError`]: a vector space or an embedding table was built or
//!   used with inconsistent parameters (wrong coordinate length, invalid
//!   curvature, unsupported model conversion).
//! - [`OptimizerError`]: the optimizer was configured with invalid values or
//!   asked to touch an index outside of the parameter store.
//! - [`ConfigError`]: the run configuration is invalid. These are fatal and
//!   are reported before any training starts.
//!
//! Numerical degeneracy during training (a NaN loss for a sampled batch) is
//! deliberately not represented here: it is handled locally by resampling.

use thiserror::Error;

/// Errors that can occur while building or using a vector space.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ManifoldError {
    /// Point does not satisfy the constraints of its vector space.
    #[error("Point is not on the manifold: {reason}")]
    InvalidPoint {
        /// Description of why the point is invalid
        reason: String,
    },

    /// A parameter of the vector space itself is invalid.
    #[error("Invalid manifold parameter: {reason}")]
    InvalidParameter {
        /// Description of the invalid parameter
        reason: String,
    },

    /// Coordinate lengths do not agree.
    #[error("Dimension mismatch: expected {expected}, got {actual}")]
    DimensionMismatch {
        /// Expected dimensions
        expected: String,
        /// Actual dimensions
        actual: String,
    },

    /// Conversion between two curvature models is not available.
    #[error("Conversion from {from} to {to} is not supported")]
    UnsupportedConversion {
        /// Source model
        from: String,
        /// Target model
        to: String,
    },
}

impl ManifoldError {
    /// Create an InvalidPoint error with a custom reason.
    pub fn invalid_point<S: Into<String>>(reason: S) -> Self {
        Self::InvalidPoint {
            reason: reason.into(),
        }
    }

    /// Create an InvalidParameter error with a custom reason.
    pub fn invalid_parameter<S: Into<String>>(reason: S) -> Self {
        Self::InvalidParameter {
            reason: reason.into(),
        }
    }

    /// Create a DimensionMismatch error.
    pub fn dimension_mismatch<S1, S2>(expected: S1, actual: S2) -> Self
    where
        S1: std::fmt::Display,
        S2: std::fmt::Display,
    {
        Self::DimensionMismatch {
            expected: expected.to_string(),
            actual: actual.to_string(),
        }
    }

    /// Create an UnsupportedConversion error.
    pub fn unsupported_conversion<S1, S2>(from: S1, to: S2) -> Self
    where
        S1: std::fmt::Display,
        S2: std::fmt::Display,
    {
        Self::UnsupportedConversion {
            from: from.to_string(),
            to: to.to_string(),
        }
    }
}

/// Errors that can occur during optimization.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum OptimizerError {
    /// Invalid optimizer configuration.
    #[error("Invalid configuration for {parameter}: {reason} (value: {value})")]
    InvalidConfiguration {
        /// Description of the invalid configuration
        reason: String,
        /// Name of the parameter
        parameter: String,
        /// Offending value
        value: String,
    },

    /// A step referenced a slot outside of the parameter store.
    #[error("Index {index} is out of bounds for a store of {len} slots")]
    IndexOutOfBounds {
        /// Offending index
        index: usize,
        /// Number of slots in the store
        len: usize,
    },

    /// Manifold operation failed.
    #[error("Manifold error: {0}")]
    ManifoldError(#[from] ManifoldError),
}

impl OptimizerError {
    /// Create an InvalidConfiguration error.
    pub fn invalid_configuration<S1, S2, S3>(reason: S1, parameter: S2, value: S3) -> Self
    where
        S1: Into<String>,
        S2: Into<String>,
        S3: std::fmt::Display,
    {
        Self::InvalidConfiguration {
            reason: reason.into(),
            parameter: parameter.into(),
            value: value.to_string(),
        }
    }
}

/// Errors raised while reading or validating the run configuration.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ConfigError {
    /// A field holds a value outside of its valid range.
    #[error("Invalid value for {parameter}: {reason} (value: {value})")]
    InvalidValue {
        /// Name of the parameter
        parameter: String,
        /// Offending value
        value: String,
        /// Why the value is rejected
        reason: String,
    },

    /// A required field was not provided.
    #[error("Missing required parameter: {parameter}")]
    Missing {
        /// Name of the parameter
        parameter: String,
    },

    /// The requested curvature model does not exist.
    #[error("Unknown manifold variant '{name}' (expected Poincare, PoincareStack or Lorentz)")]
    UnknownManifold {
        /// Name that failed to parse
        name: String,
    },

    /// The configuration file could not be read or parsed.
    #[error("Failed to parse configuration: {reason}")]
    Parse {
        /// Underlying parser or IO message
        reason: String,
    },
}

impl ConfigError {
    /// Create an InvalidValue error.
    pub fn invalid_value<S1, S2, S3>(parameter: S1, value: S2, reason: S3) -> Self
    where
        S1: Into<String>,
        S2: std::fmt::Display,
        S3: Into<String>,
    {
        Self::InvalidValue {
            parameter: parameter.into(),
            value: value.to_string(),
            reason: reason.into(),
        }
    }

    /// Create a Missing error.
    pub fn missing<S: Into<String>>(parameter: S) -> Self {
        Self::Missing {
            parameter: parameter.into(),
        }
    }
}

/// Result type alias for manifold operations.
pub type Result<T> = std::result::Result<T, ManifoldError>;

/// Result type alias for optimizer operations.
pub type OptimizerResult<T> = std::result::Result<T, OptimizerError>;

/// Result type alias for configuration handling.
pub type ConfigResult<T> = std::result::Result<T, ConfigError>;
