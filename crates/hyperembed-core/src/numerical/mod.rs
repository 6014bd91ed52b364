//! Numerical differentiation and stability helpers.

pub mod differentiate;
pub mod stability;

pub use differentiate::{adaptive_step, derivative, gradient, jacobian, Jacobian};
pub use stability::*;
