//! Run configuration.

pub mod manifold_kind;
pub mod training;

pub use manifold_kind::ManifoldKind;
pub use training::{TrainingConfig, MIN_REPORT_INTERVAL};
