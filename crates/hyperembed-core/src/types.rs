//! Type aliases and numerical constants shared by every crate of the workspace.
//!
//! All coordinates are stored as double precision, heap-allocated
//! [`nalgebra::DVector`]s. A coordinate vector is allocated once per
//! embedding slot and then mutated in place.

pub use nalgebra::DVector;

/// Owned coordinate vector of one embedding slot.
pub type Coordinates = DVector<f64>;

/// Numerical constants used by the geometric formulas.
pub mod constants {
    /// Smallest value a denominator or a coordinate is clamped to.
    pub const NUMERICAL_FLOOR: f64 = 1e-6;

    /// Distance kept between a Poincaré point and the boundary of the disk.
    pub const BOUNDARY_STABILITY: f64 = 1e-2;

    /// Lower bound of the squared Minkowski norm of a Lorentz tangent vector.
    pub const MIN_TANGENT_NORM: f64 = 1e-16;

    /// Largest magnitude accepted by the clamped exponential helpers.
    pub const MAX_EXP: f64 = 16.0;

    /// Machine epsilon used to size finite-difference steps.
    pub const EPSILON: f64 = f64::EPSILON;
}
