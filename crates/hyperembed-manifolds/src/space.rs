//! The vector space contract and its closed set of implementations.
//!
//! Every curvature model implements [`VectorSpace`]. The training loop never
//! holds a trait object: it works with the [`Space`] enum, which dispatches
//! statically to one of the concrete spaces.
//!
//! Operations write into caller-owned buffers so that the optimizer can reuse
//! per-slot allocations across steps. Gradients are always accumulated.

use crate::{
    euclidean::Euclidean, lorentz::Hyperboloid, poincare::PoincareDisk, stack::PoincareStack,
};
use hyperembed_core::{DVector, ManifoldError, ManifoldKind, Result};
use rand::Rng;
use std::fmt::Debug;

/// Geometric operations needed to train an embedding on a manifold.
pub trait VectorSpace: Debug + Send + Sync {
    /// Model name as written in embedding file headers.
    fn name(&self) -> &'static str;

    /// Number of stored coordinates per point.
    fn coordinate_len(&self) -> usize;

    /// Model parameter written after the name in embedding file headers.
    fn header_param(&self) -> f64;

    /// Geodesic distance between two points.
    fn dist(&self, a: &DVector<f64>, b: &DVector<f64>) -> f64;

    /// Adds `coeff · ∂dist/∂a` to `grad_a` and `coeff · ∂dist/∂b` to `grad_b`.
    fn diff_dist(
        &self,
        a: &DVector<f64>,
        b: &DVector<f64>,
        grad_a: &mut DVector<f64>,
        grad_b: &mut DVector<f64>,
        coeff: f64,
    );

    /// Exponential map of `tangent` at `base`, written into `out`.
    fn exp_map(&self, base: &DVector<f64>, tangent: &DVector<f64>, out: &mut DVector<f64>);

    /// Converts a Euclidean gradient at `base` into a Riemannian gradient in place.
    fn egrad2hgrad(&self, base: &DVector<f64>, grad: &mut DVector<f64>);

    /// Pulls a point back into the valid region of the space.
    fn project(&self, x: &mut DVector<f64>);

    /// Sanitizes an update direction before it is applied.
    fn project_tangent(&self, v: &mut DVector<f64>);

    /// Moves the tangent vector `v` from `from` to `to` in place.
    fn transport(&self, from: &DVector<f64>, to: &DVector<f64>, v: &mut DVector<f64>);

    /// Overwrites `x` with small random coordinates, then projects.
    fn randomize<R: Rng + ?Sized>(&self, x: &mut DVector<f64>, rng: &mut R);

    /// Zero vector with the coordinate length of the space.
    fn zeros(&self) -> DVector<f64> {
        DVector::zeros(self.coordinate_len())
    }

    /// Freshly allocated random point.
    fn random_point<R: Rng + ?Sized>(&self, rng: &mut R) -> DVector<f64> {
        let mut x = self.zeros();
        self.randomize(&mut x, rng);
        x
    }

    /// Checks that `x` has the coordinate length of the space.
    fn check_len(&self, x: &DVector<f64>) -> Result<()> {
        if x.len() == self.coordinate_len() {
            Ok(())
        } else {
            Err(ManifoldError::dimension_mismatch(
                self.coordinate_len(),
                x.len(),
            ))
        }
    }

    /// Renders coordinates as space-separated decimals.
    fn serialize(&self, x: &DVector<f64>) -> String {
        x.iter()
            .map(f64::to_string)
            .collect::<Vec<_>>()
            .join(" ")
    }
}

/// Closed set of vector spaces an embedding can live in.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Space {
    /// Poincaré disk.
    Poincare(PoincareDisk),
    /// Lorentz hyperboloid.
    Lorentz(Hyperboloid),
    /// Cartesian stack of two-dimensional Poincaré disks.
    Stack(PoincareStack),
    /// Flat space, used to exercise the optimizer.
    Euclidean(Euclidean),
}

macro_rules! dispatch {
    ($self:ident, $space:ident => $body:expr) => {
        match $self {
            Space::Poincare($space) => $body,
            Space::Lorentz($space) => $body,
            Space::Stack($space) => $body,
            Space::Euclidean($space) => $body,
        }
    };
}

impl Space {
    /// Builds the space selected by the run configuration.
    ///
    /// For [`ManifoldKind::PoincareStack`], `dim` is the number of
    /// two-dimensional sub-disks. The Lorentzian distance flag only applies
    /// to the Poincaré disk.
    ///
    /// # Errors
    ///
    /// Returns an error for a zero dimension, a non-positive curvature or
    /// the Lorentzian distance flag combined with another model.
    pub fn new(kind: ManifoldKind, dim: usize, curvature: f64, lorentzian: bool) -> Result<Self> {
        if lorentzian && kind != ManifoldKind::Poincare {
            return Err(ManifoldError::invalid_parameter(format!(
                "Lorentzian distance is only available on the Poincaré disk, not {kind}"
            )));
        }
        match kind {
            ManifoldKind::Poincare => Ok(Self::Poincare(
                PoincareDisk::new(dim, curvature)?.with_lorentzian_distance(lorentzian),
            )),
            ManifoldKind::Lorentz => Ok(Self::Lorentz(Hyperboloid::new(dim, curvature)?)),
            ManifoldKind::PoincareStack => Ok(Self::Stack(PoincareStack::new(dim)?)),
        }
    }

    /// Flat space of dimension `dim`.
    pub fn euclidean(dim: usize) -> Self {
        Self::Euclidean(Euclidean::new(dim))
    }

    /// Curvature model, `None` for the flat space.
    pub fn kind(&self) -> Option<ManifoldKind> {
        match self {
            Self::Poincare(_) => Some(ManifoldKind::Poincare),
            Self::Lorentz(_) => Some(ManifoldKind::Lorentz),
            Self::Stack(_) => Some(ManifoldKind::PoincareStack),
            Self::Euclidean(_) => None,
        }
    }

    /// Builds a space back from an embedding file header.
    ///
    /// # Errors
    ///
    /// Returns an error if the name is unknown or the coordinate length does
    /// not fit the model.
    pub fn from_header(name: &str, coordinate_len: usize, param: f64) -> Result<Self> {
        if name.eq_ignore_ascii_case("euclidean") {
            return Ok(Self::euclidean(coordinate_len));
        }
        let kind: ManifoldKind = name
            .parse()
            .map_err(|_| ManifoldError::invalid_parameter(format!("unknown model {name}")))?;
        match kind {
            ManifoldKind::Poincare => Self::new(kind, coordinate_len, param, false),
            ManifoldKind::Lorentz => {
                if coordinate_len < 2 {
                    return Err(ManifoldError::dimension_mismatch(">= 2", coordinate_len));
                }
                Self::new(kind, coordinate_len - 1, param, false)
            }
            ManifoldKind::PoincareStack => {
                if coordinate_len % 2 != 0 {
                    return Err(ManifoldError::dimension_mismatch(
                        "even coordinate count",
                        coordinate_len,
                    ));
                }
                Self::new(kind, coordinate_len / 2, 1.0, false)
            }
        }
    }

    /// Header tag `"<name> <param>"`.
    pub fn header(&self) -> String {
        format!("{} {}", self.name(), self.header_param())
    }
}

impl VectorSpace for Space {
    fn name(&self) -> &'static str {
        dispatch!(self, s => s.name())
    }

    fn coordinate_len(&self) -> usize {
        dispatch!(self, s => s.coordinate_len())
    }

    fn header_param(&self) -> f64 {
        dispatch!(self, s => s.header_param())
    }

    #[inline]
    fn dist(&self, a: &DVector<f64>, b: &DVector<f64>) -> f64 {
        dispatch!(self, s => s.dist(a, b))
    }

    #[inline]
    fn diff_dist(
        &self,
        a: &DVector<f64>,
        b: &DVector<f64>,
        grad_a: &mut DVector<f64>,
        grad_b: &mut DVector<f64>,
        coeff: f64,
    ) {
        dispatch!(self, s => s.diff_dist(a, b, grad_a, grad_b, coeff))
    }

    #[inline]
    fn exp_map(&self, base: &DVector<f64>, tangent: &DVector<f64>, out: &mut DVector<f64>) {
        dispatch!(self, s => s.exp_map(base, tangent, out))
    }

    #[inline]
    fn egrad2hgrad(&self, base: &DVector<f64>, grad: &mut DVector<f64>) {
        dispatch!(self, s => s.egrad2hgrad(base, grad))
    }

    #[inline]
    fn project(&self, x: &mut DVector<f64>) {
        dispatch!(self, s => s.project(x))
    }

    #[inline]
    fn project_tangent(&self, v: &mut DVector<f64>) {
        dispatch!(self, s => s.project_tangent(v))
    }

    #[inline]
    fn transport(&self, from: &DVector<f64>, to: &DVector<f64>, v: &mut DVector<f64>) {
        dispatch!(self, s => s.transport(from, to, v))
    }

    fn randomize<R: Rng + ?Sized>(&self, x: &mut DVector<f64>, rng: &mut R) {
        dispatch!(self, s => s.randomize(x, rng))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::{rngs::SmallRng, SeedableRng};

    #[test]
    fn test_factory_coordinate_lengths() {
        let disk = Space::new(ManifoldKind::Poincare, 5, 1.0, false).unwrap();
        let lorentz = Space::new(ManifoldKind::Lorentz, 5, 1.0, false).unwrap();
        let stack = Space::new(ManifoldKind::PoincareStack, 5, 1.0, false).unwrap();
        assert_eq!(disk.coordinate_len(), 5);
        assert_eq!(lorentz.coordinate_len(), 6);
        assert_eq!(stack.coordinate_len(), 10);
        assert_eq!(Space::euclidean(3).coordinate_len(), 3);
    }

    #[test]
    fn test_factory_rejects_invalid_parameters() {
        assert!(Space::new(ManifoldKind::Poincare, 0, 1.0, false).is_err());
        assert!(Space::new(ManifoldKind::Lorentz, 3, -1.0, false).is_err());
        assert!(Space::new(ManifoldKind::Lorentz, 3, 1.0, true).is_err());
    }

    #[test]
    fn test_header_round_trip() {
        for kind in [
            ManifoldKind::Poincare,
            ManifoldKind::Lorentz,
            ManifoldKind::PoincareStack,
        ] {
            let space = Space::new(kind, 4, 0.5, false).unwrap();
            let header = space.header();
            let mut parts = header.split(' ');
            let name = parts.next().unwrap();
            let param: f64 = parts.next().unwrap().parse().unwrap();
            let rebuilt = Space::from_header(name, space.coordinate_len(), param).unwrap();
            assert_eq!(rebuilt.kind(), Some(kind));
            assert_eq!(rebuilt.coordinate_len(), space.coordinate_len());
        }
    }

    #[test]
    fn test_random_point_has_right_length() {
        let mut rng = SmallRng::seed_from_u64(7);
        let space = Space::new(ManifoldKind::Lorentz, 3, 1.0, false).unwrap();
        let x = space.random_point(&mut rng);
        assert!(space.check_len(&x).is_ok());
        assert!(space.check_len(&DVector::zeros(3)).is_err());
    }
}
