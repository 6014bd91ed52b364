//! # Lorentz Hyperboloid ℍⁿ_c
//!
//! Points are stored with `n + 1` coordinates, the first one being the time
//! coordinate. The bilinear form is
//!
//! ```text
//! ⟨a, b⟩_L = c · Σ_{i≥1} a_i b_i - a_0 b_0
//! ```
//!
//! and the sheet is `{x : x_0 = √(1 + c‖x_s‖²)}` where `x_s` is the spatial
//! part. Projection simply recomputes `x_0` from the spatial coordinates.
//!
//! ```text
//! d(a, b)    = acosh(-⟨a, b⟩_L)
//! exp_x(v)_s = cosh(‖v‖_L) x_s + sinh(‖v‖_L) v_s / ‖v‖_L
//! ```
//!
//! Parallel transport is the identity in this chart.

use crate::space::VectorSpace;
use hyperembed_core::{
    constants::{MIN_TANGENT_NORM, NUMERICAL_FLOOR},
    numerical::{floor, safe_acosh, sanitize},
    DVector, ManifoldError, Result,
};
use rand::Rng;
use rand_distr::{Distribution, Uniform};

const INIT_RANGE: f64 = 0.001;

/// The upper sheet of the hyperboloid with `dim` spatial coordinates.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Hyperboloid {
    dim: usize,
    curvature: f64,
}

impl Hyperboloid {
    /// Creates a hyperboloid with `dim` spatial coordinates.
    ///
    /// # Errors
    ///
    /// Returns `InvalidParameter` if `dim == 0` or the curvature is not positive.
    pub fn new(dim: usize, curvature: f64) -> Result<Self> {
        if dim == 0 {
            return Err(ManifoldError::invalid_parameter(
                "hyperboloid dimension must be positive",
            ));
        }
        if !(curvature > 0.0 && curvature.is_finite()) {
            return Err(ManifoldError::invalid_parameter(format!(
                "hyperboloid curvature must be positive, got {curvature}"
            )));
        }
        Ok(Self { dim, curvature })
    }

    /// Number of spatial coordinates.
    pub fn dim(&self) -> usize {
        self.dim
    }

    /// Curvature constant `c`.
    pub fn curvature(&self) -> f64 {
        self.curvature
    }

    /// Lorentzian bilinear form.
    pub fn inner_product(&self, a: &DVector<f64>, b: &DVector<f64>) -> f64 {
        let spatial = a.rows(1, self.dim).dot(&b.rows(1, self.dim));
        self.curvature * spatial - a[0] * b[0]
    }

    /// Recomputes the time coordinate from the spatial part.
    pub fn clip(&self, x: &mut DVector<f64>) {
        let spatial = x.rows(1, self.dim).norm_squared();
        x[0] = (1.0 + self.curvature * spatial).sqrt();
    }

    /// Maps a hyperboloid point to the Poincaré disk of the same curvature:
    /// `x_j = l_{j+1} / (l_0 + 1)`.
    pub fn to_poincare(&self, x: &DVector<f64>) -> DVector<f64> {
        let denom = x[0] + 1.0;
        DVector::from_iterator(self.dim, x.iter().skip(1).map(|v| v / denom))
    }

    /// Maps a point of the Poincaré disk of radius `1/√c` onto the hyperboloid,
    /// inverting [`Self::to_poincare`]:
    ///
    /// ```text
    /// l_0 = (1 + c‖x‖²) / (1 - c‖x‖²)    l_j = 2 x_{j-1} / (1 - c‖x‖²)
    /// ```
    pub fn lift_poincare(&self, p: &DVector<f64>) -> DVector<f64> {
        let n2 = self.curvature * p.norm_squared();
        let denom = floor(1.0 - n2, NUMERICAL_FLOOR);
        let mut x = DVector::zeros(self.dim + 1);
        x[0] = (1.0 + n2) / denom;
        for j in 0..self.dim {
            x[j + 1] = 2.0 * p[j] / denom;
        }
        x
    }
}

impl VectorSpace for Hyperboloid {
    fn name(&self) -> &'static str {
        "Lorentz"
    }

    fn coordinate_len(&self) -> usize {
        self.dim + 1
    }

    fn header_param(&self) -> f64 {
        self.curvature
    }

    fn dist(&self, a: &DVector<f64>, b: &DVector<f64>) -> f64 {
        safe_acosh(-self.inner_product(a, b))
    }

    fn diff_dist(
        &self,
        a: &DVector<f64>,
        b: &DVector<f64>,
        grad_a: &mut DVector<f64>,
        grad_b: &mut DVector<f64>,
        coeff: f64,
    ) {
        let ip = self.inner_product(a, b);
        let lambda = -coeff / floor(ip * ip - 1.0, NUMERICAL_FLOOR).sqrt();

        grad_a[0] -= lambda * b[0];
        grad_b[0] -= lambda * a[0];
        for i in 1..=self.dim {
            grad_a[i] += lambda * self.curvature * b[i];
            grad_b[i] += lambda * self.curvature * a[i];
        }
    }

    fn exp_map(&self, base: &DVector<f64>, tangent: &DVector<f64>, out: &mut DVector<f64>) {
        let spatial = tangent.rows(1, self.dim).norm_squared();
        let norm = (self.curvature * spatial - tangent[0] * tangent[0])
            .max(MIN_TANGENT_NORM)
            .sqrt();
        let (sinh, cosh) = (norm.sinh(), norm.cosh());
        for i in 1..=self.dim {
            out[i] = cosh * base[i] + sinh * tangent[i] / norm;
        }
        self.clip(out);
    }

    fn egrad2hgrad(&self, base: &DVector<f64>, grad: &mut DVector<f64>) {
        grad[0] = -grad[0];
        for i in 1..=self.dim {
            grad[i] /= self.curvature;
        }
        let ip = self.inner_product(base, grad);
        grad.axpy(ip, base, 1.0);
    }

    fn project(&self, x: &mut DVector<f64>) {
        self.clip(x);
    }

    fn project_tangent(&self, v: &mut DVector<f64>) {
        sanitize(v, 0.0);
    }

    fn transport(&self, _from: &DVector<f64>, _to: &DVector<f64>, _v: &mut DVector<f64>) {}

    fn randomize<R: Rng + ?Sized>(&self, x: &mut DVector<f64>, rng: &mut R) {
        let uniform = Uniform::new_inclusive(-INIT_RANGE, INIT_RANGE);
        for i in 1..=self.dim {
            x[i] = uniform.sample(rng);
        }
        self.clip(x);
    }
}
