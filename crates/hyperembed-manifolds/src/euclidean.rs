//! Flat space ℝⁿ.
//!
//! Used to check the optimizer against problems with known minimizers. The
//! exponential map is vector addition, the Riemannian gradient is the
//! Euclidean gradient and transport is the identity.

use crate::space::VectorSpace;
use hyperembed_core::DVector;
use rand::Rng;
use rand_distr::{Distribution, Uniform};

const INIT_RANGE: f64 = 0.001;

/// Euclidean space of dimension `dim`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Euclidean {
    dim: usize,
}

impl Euclidean {
    /// Creates ℝ^dim.
    pub fn new(dim: usize) -> Self {
        Self { dim }
    }
}

impl VectorSpace for Euclidean {
    fn name(&self) -> &'static str {
        "Euclidean"
    }

    fn coordinate_len(&self) -> usize {
        self.dim
    }

    fn header_param(&self) -> f64 {
        0.0
    }

    fn dist(&self, a: &DVector<f64>, b: &DVector<f64>) -> f64 {
        (a - b).norm()
    }

    fn diff_dist(
        &self,
        a: &DVector<f64>,
        b: &DVector<f64>,
        grad_a: &mut DVector<f64>,
        grad_b: &mut DVector<f64>,
        coeff: f64,
    ) {
        let diff = a - b;
        let d = diff.norm();
        if d == 0.0 {
            return;
        }
        grad_a.axpy(coeff / d, &diff, 1.0);
        grad_b.axpy(-coeff / d, &diff, 1.0);
    }

    fn exp_map(&self, base: &DVector<f64>, tangent: &DVector<f64>, out: &mut DVector<f64>) {
        out.copy_from(&(base + tangent));
    }

    fn egrad2hgrad(&self, _base: &DVector<f64>, _grad: &mut DVector<f64>) {}

    fn project(&self, _x: &mut DVector<f64>) {}

    fn project_tangent(&self, _v: &mut DVector<f64>) {}

    fn transport(&self, _from: &DVector<f64>, _to: &DVector<f64>, _v: &mut DVector<f64>) {}

    fn randomize<R: Rng + ?Sized>(&self, x: &mut DVector<f64>, rng: &mut R) {
        let uniform = Uniform::new_inclusive(-INIT_RANGE, INIT_RANGE);
        for v in x.iter_mut() {
            *v = uniform.sample(rng);
        }
    }
}
