//! Core types for hyperbolic embedding training.
//!
//! This crate holds what every other crate of the workspace builds on:
//!
//! - [`error`]: error taxonomy for manifolds, the optimizer and configuration
//! - [`types`]: coordinate vector alias and numerical constants
//! - [`numerical`]: central-difference differentiation and stability helpers
//! - [`config`]: the run configuration and curvature model selection

pub mod config;
pub mod error;
pub mod numerical;
pub mod types;

// Re-export commonly used items at the crate root
pub use config::{ManifoldKind, TrainingConfig};
pub use error::{
    ConfigError, ConfigResult, ManifoldError, OptimizerError, OptimizerResult, Result,
};
pub use types::{constants, Coordinates, DVector};

/// Prelude module for convenient imports.
///
/// # Example
/// ```
/// use hyperembed_core::prelude::*;
/// ```
pub mod prelude {
    pub use crate::config::{ManifoldKind, TrainingConfig};
    pub use crate::error::{
        ConfigError, ConfigResult, ManifoldError, OptimizerError, OptimizerResult, Result,
    };
    pub use crate::numerical::{derivative, gradient, jacobian, Jacobian};
    pub use crate::types::{constants, Coordinates, DVector};
}
