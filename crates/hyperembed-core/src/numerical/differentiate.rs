//! Central-difference numerical differentiation.
//!
//! Used wherever a closed-form derivative is impractical, most notably the
//! Jacobian of Möbius addition on the Poincaré disk and the derivative of the
//! clamped logistic losses.
//!
//! # Step size
//!
//! The step adapts to the magnitude of the evaluation point:
//!
//! ```text
//! h(x₀) = √ε          if x₀ = 0
//! h(x₀) = √ε · x₀     otherwise
//! f'(x₀) ≈ (f(x₀ + h) - f(x₀ - h)) / 2h
//! ```
//!
//! A negative `x₀` yields a negative step, which leaves the quotient unchanged.

use crate::types::constants::EPSILON;
use nalgebra::DVector;

/// Finite-difference step for an evaluation point.
#[inline]
pub fn adaptive_step(x0: f64) -> f64 {
    let sqrt_eps = EPSILON.sqrt();
    if x0 == 0.0 {
        sqrt_eps
    } else {
        sqrt_eps * x0
    }
}

/// Derivative of a scalar function at `x0`.
pub fn derivative<F>(f: F, x0: f64) -> f64
where
    F: Fn(f64) -> f64,
{
    let h = adaptive_step(x0);
    (f(x0 + h) - f(x0 - h)) / (2.0 * h)
}

/// Gradient of a scalar function of a vector.
///
/// Each coordinate is perturbed independently with its own adaptive step.
pub fn gradient<F>(f: F, x: &DVector<f64>) -> DVector<f64>
where
    F: Fn(&DVector<f64>) -> f64,
{
    let mut probe = x.clone();
    let mut grad = DVector::zeros(x.len());
    for i in 0..x.len() {
        let x0 = x[i];
        let h = adaptive_step(x0);
        probe[i] = x0 + h;
        let upper = f(&probe);
        probe[i] = x0 - h;
        let lower = f(&probe);
        probe[i] = x0;
        grad[i] = (upper - lower) / (2.0 * h);
    }
    grad
}

/// Jacobian of a function mapping `m` input vectors of width `n` to an
/// output vector of length `p`.
///
/// Entry `(k, i, j)` holds `∂f_k / ∂x_{i,j}`.
#[derive(Debug, Clone, PartialEq)]
pub struct Jacobian {
    outputs: usize,
    inputs: usize,
    width: usize,
    data: Vec<f64>,
}

impl Jacobian {
    fn zeros(outputs: usize, inputs: usize, width: usize) -> Self {
        Self {
            outputs,
            inputs,
            width,
            data: vec![0.0; outputs * inputs * width],
        }
    }

    #[inline]
    fn offset(&self, k: usize, i: usize, j: usize) -> usize {
        (k * self.inputs + i) * self.width + j
    }

    /// Shape as `(outputs, inputs, width)`.
    pub fn shape(&self) -> (usize, usize, usize) {
        (self.outputs, self.inputs, self.width)
    }

    /// Partial derivative of output `k` with respect to coordinate `j` of input `i`.
    pub fn get(&self, k: usize, i: usize, j: usize) -> f64 {
        self.data[self.offset(k, i, j)]
    }

    /// Vector-Jacobian product for one input, added to `out`:
    ///
    /// ```text
    /// out_j += scale · Σ_k weights_k · ∂f_k/∂x_{input,j}
    /// ```
    pub fn accumulate_contraction(
        &self,
        input: usize,
        weights: &DVector<f64>,
        scale: f64,
        out: &mut DVector<f64>,
    ) {
        debug_assert_eq!(weights.len(), self.outputs);
        debug_assert_eq!(out.len(), self.width);
        for j in 0..self.width {
            let mut acc = 0.0;
            for k in 0..self.outputs {
                acc += weights[k] * self.get(k, input, j);
            }
            out[j] += scale * acc;
        }
    }
}

/// Jacobian of a vector-valued function of several vectors.
///
/// `f` writes its value for the given inputs into the output buffer, which
/// has length `outputs`. All inputs must share the same length.
pub fn jacobian<F>(f: F, inputs: &[DVector<f64>], outputs: usize) -> Jacobian
where
    F: Fn(&[DVector<f64>], &mut DVector<f64>),
{
    let width = inputs.first().map_or(0, DVector::len);
    debug_assert!(inputs.iter().all(|v| v.len() == width));

    let mut jac = Jacobian::zeros(outputs, inputs.len(), width);
    let mut probe = inputs.to_vec();
    let mut upper = DVector::zeros(outputs);
    let mut lower = DVector::zeros(outputs);

    for i in 0..inputs.len() {
        for j in 0..width {
            let x0 = inputs[i][j];
            let h = adaptive_step(x0);

            probe[i][j] = x0 + h;
            f(&probe, &mut upper);
            probe[i][j] = x0 - h;
            f(&probe, &mut lower);
            probe[i][j] = x0;

            for k in 0..outputs {
                let idx = jac.offset(k, i, j);
                jac.data[idx] = (upper[k] - lower[k]) / (2.0 * h);
            }
        }
    }

    jac
}
