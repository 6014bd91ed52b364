//! Numerical stability helpers for the hyperbolic formulas.
//!
//! Every distance and gradient formula clamps its denominators so that
//! coinciding points or points close to the disk boundary never produce
//! NaN or infinite values.

use crate::types::constants::NUMERICAL_FLOOR;
use nalgebra::DVector;

/// Clamp a strictly positive quantity away from zero.
pub fn floor(x: f64, min: f64) -> f64 {
    x.max(min)
}

/// Division whose denominator is clamped to [`NUMERICAL_FLOOR`].
///
/// Only meant for denominators that are non-negative in exact arithmetic.
pub fn safe_divide(numerator: f64, denominator: f64) -> f64 {
    numerator / denominator.max(NUMERICAL_FLOOR)
}

/// Square root that handles small negative values due to rounding.
pub fn safe_sqrt(x: f64) -> f64 {
    if x < 0.0 && x > -f64::EPSILON {
        0.0
    } else {
        x.sqrt()
    }
}

/// Inverse hyperbolic tangent restricted to the open interval (-1, 1).
pub fn safe_atanh(x: f64) -> f64 {
    let bound = 1.0 - f64::EPSILON;
    x.clamp(-bound, bound).atanh()
}

/// Inverse hyperbolic cosine of a value that must be at least one.
pub fn safe_acosh(x: f64) -> f64 {
    x.max(1.0).acosh()
}

/// Replace non-finite coordinates with `fill`.
///
/// Returns the number of replaced coordinates.
pub fn sanitize(v: &mut DVector<f64>, fill: f64) -> usize {
    let mut replaced = 0;
    for x in v.iter_mut() {
        if !x.is_finite() {
            *x = fill;
            replaced += 1;
        }
    }
    replaced
}

/// Check that all coordinates are finite.
pub fn is_finite_vector(v: &DVector<f64>) -> bool {
    v.iter().all(|x| x.is_finite())
}
