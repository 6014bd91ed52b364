//! # Poincaré Disk 𝔻ⁿ_c
//!
//! The Poincaré disk is the open ball of radius `1/√c` equipped with the
//! conformal metric
//!
//! ```text
//! g_x = λ(x)² · g_E        λ(x) = 2 / (1 - c‖x‖²)
//! ```
//!
//! All operations are expressed with the Möbius gyrovector operations.
//!
//! ## Möbius addition
//! ```text
//!          (1 + 2c⟨x,y⟩ + c‖y‖²) x + (1 - c‖x‖²) y
//! x ⊕ y = ─────────────────────────────────────────
//!               1 + 2c⟨x,y⟩ + c²‖x‖²‖y‖²
//! ```
//!
//! ## Möbius scalar multiplication
//! ```text
//! r ⊗ x = tanh(r · atanh(√c‖x‖)) · x / (√c‖x‖)
//! ```
//!
//! ## Distance
//! ```text
//! d(a, b) = 2 · atanh(‖(-a) ⊕ b‖)
//! ```
//!
//! When the disk is built with the Lorentzian distance flag, both points are
//! lifted to the hyperboloid and the squared Lorentzian distance
//! `-2c - 2⟨a, b⟩_L` is used instead.
//!
//! ## Exponential map
//! ```text
//! exp_x(v) = x ⊕ tanh(λ(x)‖v‖ / 2) · v / ‖v‖
//! ```
//!
//! ## Parallel transport
//! ```text
//! P_{x→y}(u) = gyr[y, -x](u) · λ(x) / λ(y)
//! ```
//!
//! ## Numerical Considerations
//!
//! Points are kept at Euclidean distance at least [`BOUNDARY_STABILITY`] from
//! the boundary, conformal factor denominators are floored at
//! [`NUMERICAL_FLOOR`] and the distance gradient is obtained by central
//! differences of Möbius addition.

use crate::space::VectorSpace;
use hyperembed_core::{
    constants::{BOUNDARY_STABILITY, NUMERICAL_FLOOR},
    numerical::{floor, jacobian, safe_atanh, safe_divide, sanitize},
    DVector, ManifoldError, Result,
};
use rand::Rng;
use rand_distr::{Distribution, Uniform};
use std::fmt::{self, Debug};

/// Half-width of the uniform initialization interval.
const INIT_RANGE: f64 = 0.01;

/// The Poincaré disk of curvature `-c`.
#[derive(Clone, Copy, PartialEq)]
pub struct PoincareDisk {
    dim: usize,
    curvature: f64,
    sqrt_curvature: f64,
    lorentzian: bool,
}

impl Debug for PoincareDisk {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "PoincareDisk(dim={}, c={}", self.dim, self.curvature)?;
        if self.lorentzian {
            write!(f, ", lorentzian")?;
        }
        write!(f, ")")
    }
}

impl PoincareDisk {
    /// Creates a disk of dimension `dim` and curvature constant `c > 0`.
    ///
    /// # Errors
    ///
    /// Returns `InvalidParameter` if `dim == 0` or `c` is not a positive
    /// finite number.
    pub fn new(dim: usize, curvature: f64) -> Result<Self> {
        if dim == 0 {
            return Err(ManifoldError::invalid_parameter(
                "Poincaré disk dimension must be positive",
            ));
        }
        if !(curvature > 0.0 && curvature.is_finite()) {
            return Err(ManifoldError::invalid_parameter(format!(
                "Poincaré curvature must be positive, got {curvature}"
            )));
        }
        Ok(Self {
            dim,
            curvature,
            sqrt_curvature: curvature.sqrt(),
            lorentzian: false,
        })
    }

    /// Switches between the Möbius distance and the squared Lorentzian distance.
    #[must_use]
    pub fn with_lorentzian_distance(mut self, lorentzian: bool) -> Self {
        self.lorentzian = lorentzian;
        self
    }

    /// Dimension of the disk.
    pub fn dim(&self) -> usize {
        self.dim
    }

    /// Curvature constant `c`.
    pub fn curvature(&self) -> f64 {
        self.curvature
    }

    /// Whether distances are computed on the hyperboloid lift.
    pub fn is_lorentzian(&self) -> bool {
        self.lorentzian
    }

    /// Largest Euclidean norm a projected point may have.
    pub fn max_norm(&self) -> f64 {
        1.0 / self.sqrt_curvature - BOUNDARY_STABILITY
    }

    /// Conformal factor `λ(x)`.
    pub fn lambda(&self, x: &DVector<f64>) -> f64 {
        2.0 / floor(1.0 - self.curvature * x.norm_squared(), NUMERICAL_FLOOR)
    }

    /// Möbius addition `x ⊕ y` written into `out`.
    pub fn mobius_add_into(&self, x: &DVector<f64>, y: &DVector<f64>, out: &mut DVector<f64>) {
        let c = self.curvature;
        let x2 = x.norm_squared();
        let y2 = y.norm_squared();
        let xy = x.dot(y);
        let denom = 1.0 + 2.0 * c * xy + c * c * x2 * y2;
        let alpha = (1.0 + 2.0 * c * xy + c * y2) / denom;
        let beta = (1.0 - c * x2) / denom;
        for i in 0..out.len() {
            out[i] = alpha * x[i] + beta * y[i];
        }
    }

    /// Möbius addition `x ⊕ y`.
    pub fn mobius_add(&self, x: &DVector<f64>, y: &DVector<f64>) -> DVector<f64> {
        let mut out = DVector::zeros(x.len());
        self.mobius_add_into(x, y, &mut out);
        out
    }

    /// Möbius scalar multiplication `r ⊗ x`. The origin is a fixed point.
    pub fn mobius_scale(&self, r: f64, x: &DVector<f64>) -> DVector<f64> {
        let scaled_norm = self.sqrt_curvature * x.norm();
        if scaled_norm == 0.0 {
            return DVector::zeros(x.len());
        }
        x * ((r * safe_atanh(scaled_norm)).tanh() / scaled_norm)
    }

    /// Gyration `gyr[u, v](w)`.
    pub fn gyration(&self, u: &DVector<f64>, v: &DVector<f64>, w: &DVector<f64>) -> DVector<f64> {
        let su2 = u.norm_squared();
        let sv2 = v.norm_squared();
        let suv = u.dot(v);
        let suw = u.dot(w);
        let svw = v.dot(w);

        let a = -suw * sv2 + svw + 2.0 * svw * suv;
        let b = -svw * su2 - suw;
        let d = floor(1.0 + 2.0 * suv + su2 * sv2, NUMERICAL_FLOOR);
        let scale = 2.0 / d;

        w + u * (scale * a) + v * (scale * b)
    }

    /// Lifts a disk point to the hyperboloid used by the Lorentzian distance.
    fn lift(&self, x: &DVector<f64>) -> DVector<f64> {
        let denom = floor(1.0 - x.norm_squared(), NUMERICAL_FLOOR);
        let mut lifted = DVector::zeros(x.len() + 1);
        for i in 0..x.len() {
            lifted[i + 1] = 2.0 * x[i] / denom;
        }
        let spatial = lifted.rows(1, x.len()).norm_squared();
        lifted[0] = (spatial + self.curvature).sqrt();
        lifted
    }

    fn lorentzian_dist(&self, a: &DVector<f64>, b: &DVector<f64>) -> f64 {
        let la = self.lift(a);
        let lb = self.lift(b);
        let n = a.len();
        let inner = -la[0] * lb[0] + la.rows(1, n).dot(&lb.rows(1, n));
        -2.0 * self.curvature - 2.0 * inner
    }

    fn mobius_dist(&self, a: &DVector<f64>, b: &DVector<f64>) -> f64 {
        let diff = self.mobius_add(&(-a), b);
        2.0 * safe_atanh(diff.norm())
    }

    fn lorentzian_diff_dist(
        &self,
        a: &DVector<f64>,
        b: &DVector<f64>,
        grad_a: &mut DVector<f64>,
        grad_b: &mut DVector<f64>,
        coeff: f64,
    ) {
        let jac = jacobian(
            |xs, out| out[0] = self.lorentzian_dist(&xs[0], &xs[1]),
            &[a.clone(), b.clone()],
            1,
        );
        let weights = DVector::from_element(1, 1.0);
        jac.accumulate_contraction(0, &weights, coeff, grad_a);
        jac.accumulate_contraction(1, &weights, coeff, grad_b);
    }
}

impl VectorSpace for PoincareDisk {
    fn name(&self) -> &'static str {
        "Poincare"
    }

    fn coordinate_len(&self) -> usize {
        self.dim
    }

    fn header_param(&self) -> f64 {
        self.curvature
    }

    fn dist(&self, a: &DVector<f64>, b: &DVector<f64>) -> f64 {
        if self.lorentzian {
            self.lorentzian_dist(a, b)
        } else {
            self.mobius_dist(a, b)
        }
    }

    /// Accumulates the distance gradient.
    ///
    /// With `δ = (-a) ⊕ b` and `n = ‖δ‖`, the outer derivative of
    /// `2·atanh(n)` with respect to `δ` is `2δ / ((1 - n²) n)`. It is
    /// contracted with the numerical Jacobian of `(x, y) ↦ (-x) ⊕ y`.
    fn diff_dist(
        &self,
        a: &DVector<f64>,
        b: &DVector<f64>,
        grad_a: &mut DVector<f64>,
        grad_b: &mut DVector<f64>,
        coeff: f64,
    ) {
        if self.lorentzian {
            self.lorentzian_diff_dist(a, b, grad_a, grad_b, coeff);
            return;
        }

        let diff = self.mobius_add(&(-a), b);
        let n2 = diff.norm_squared();
        let n = floor(n2.sqrt(), NUMERICAL_FLOOR);
        let outer = safe_divide(2.0, (1.0 - n2) * n);
        let weights = diff * outer;

        let jac = jacobian(
            |xs, out| self.mobius_add_into(&(-&xs[0]), &xs[1], out),
            &[a.clone(), b.clone()],
            self.dim,
        );
        jac.accumulate_contraction(0, &weights, coeff, grad_a);
        jac.accumulate_contraction(1, &weights, coeff, grad_b);
    }

    fn exp_map(&self, base: &DVector<f64>, tangent: &DVector<f64>, out: &mut DVector<f64>) {
        let norm = tangent.norm();
        if norm == 0.0 {
            out.copy_from(base);
            return;
        }
        let factor = (0.5 * self.lambda(base) * norm).tanh() / norm;
        self.mobius_add_into(base, &(tangent * factor), out);
    }

    fn egrad2hgrad(&self, base: &DVector<f64>, grad: &mut DVector<f64>) {
        let lambda = self.lambda(base);
        *grad /= lambda * lambda;
    }

    fn project(&self, x: &mut DVector<f64>) {
        let max_norm = self.max_norm();
        let norm = x.norm();
        if norm >= max_norm || norm.is_nan() {
            let ratio = max_norm / norm;
            for v in x.iter_mut() {
                *v = if !v.is_finite() || !ratio.is_finite() {
                    NUMERICAL_FLOOR
                } else {
                    *v * ratio
                };
            }
        } else if norm < NUMERICAL_FLOOR {
            for v in x.iter_mut() {
                if v.abs() < NUMERICAL_FLOOR {
                    *v = NUMERICAL_FLOOR;
                }
            }
        }
    }

    fn project_tangent(&self, v: &mut DVector<f64>) {
        sanitize(v, 0.0);
        let max_norm = self.max_norm();
        let norm = v.norm();
        if norm > max_norm {
            *v *= max_norm / norm;
        }
    }

    fn transport(&self, from: &DVector<f64>, to: &DVector<f64>, v: &mut DVector<f64>) {
        let moved = self.gyration(to, &(-from), v) * (self.lambda(from) / self.lambda(to));
        v.copy_from(&moved);
    }

    fn randomize<R: Rng + ?Sized>(&self, x: &mut DVector<f64>, rng: &mut R) {
        let uniform = Uniform::new_inclusive(-INIT_RANGE, INIT_RANGE);
        for v in x.iter_mut() {
            *v = uniform.sample(rng);
        }
        self.project(x);
    }
}
