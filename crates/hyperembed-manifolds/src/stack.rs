//! Cartesian product of two-dimensional Poincaré disks.
//!
//! A point is the concatenation of `count` blocks of [`SUBSPACE_DIM`]
//! coordinates. The distance combines the block distances as an L2 norm:
//!
//! ```text
//! d(a, b) = √(Σ_k d_k(a_k, b_k)²)
//! ```
//!
//! so that `∂d/∂a_k = (d_k / d) · ∂d_k/∂a_k`. All other operations act on
//! each block independently.

use crate::{poincare::PoincareDisk, space::VectorSpace};
use hyperembed_core::{
    constants::NUMERICAL_FLOOR, numerical::floor, DVector, ManifoldError, Result,
};
use rand::Rng;

/// Dimension of every sub-disk.
pub const SUBSPACE_DIM: usize = 2;

/// A stack of `count` Poincaré disks of dimension [`SUBSPACE_DIM`] and curvature 1.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PoincareStack {
    count: usize,
    disk: PoincareDisk,
}

impl PoincareStack {
    /// Creates a stack of `count` sub-disks.
    ///
    /// # Errors
    ///
    /// Returns `InvalidParameter` if `count == 0`.
    pub fn new(count: usize) -> Result<Self> {
        if count == 0 {
            return Err(ManifoldError::invalid_parameter(
                "a Poincaré stack needs at least one sub-disk",
            ));
        }
        Ok(Self {
            count,
            disk: PoincareDisk::new(SUBSPACE_DIM, 1.0)?,
        })
    }

    /// Number of sub-disks.
    pub fn count(&self) -> usize {
        self.count
    }

    /// The shared sub-disk descriptor.
    pub fn subspace(&self) -> &PoincareDisk {
        &self.disk
    }

    fn block(x: &DVector<f64>, k: usize) -> DVector<f64> {
        x.rows(k * SUBSPACE_DIM, SUBSPACE_DIM).into_owned()
    }

    fn store(x: &mut DVector<f64>, k: usize, block: &DVector<f64>) {
        x.rows_mut(k * SUBSPACE_DIM, SUBSPACE_DIM).copy_from(block);
    }

    fn for_each_block(&self, x: &mut DVector<f64>, mut op: impl FnMut(&mut DVector<f64>)) {
        for k in 0..self.count {
            let mut block = Self::block(x, k);
            op(&mut block);
            Self::store(x, k, &block);
        }
    }

    /// Distance within each sub-disk.
    pub fn block_distances(&self, a: &DVector<f64>, b: &DVector<f64>) -> Vec<f64> {
        (0..self.count)
            .map(|k| self.disk.dist(&Self::block(a, k), &Self::block(b, k)))
            .collect()
    }
}

impl VectorSpace for PoincareStack {
    fn name(&self) -> &'static str {
        "PoincareStack"
    }

    fn coordinate_len(&self) -> usize {
        self.count * SUBSPACE_DIM
    }

    fn header_param(&self) -> f64 {
        SUBSPACE_DIM as f64
    }

    fn dist(&self, a: &DVector<f64>, b: &DVector<f64>) -> f64 {
        self.block_distances(a, b)
            .iter()
            .map(|d| d * d)
            .sum::<f64>()
            .sqrt()
    }

    fn diff_dist(
        &self,
        a: &DVector<f64>,
        b: &DVector<f64>,
        grad_a: &mut DVector<f64>,
        grad_b: &mut DVector<f64>,
        coeff: f64,
    ) {
        let distances = self.block_distances(a, b);
        let total = distances.iter().map(|d| d * d).sum::<f64>().sqrt();
        let global = coeff / (2.0 * floor(total, NUMERICAL_FLOOR));

        let mut block_ga = DVector::zeros(SUBSPACE_DIM);
        let mut block_gb = DVector::zeros(SUBSPACE_DIM);
        for (k, d) in distances.iter().enumerate() {
            block_ga.fill(0.0);
            block_gb.fill(0.0);
            self.disk.diff_dist(
                &Self::block(a, k),
                &Self::block(b, k),
                &mut block_ga,
                &mut block_gb,
                global * 2.0 * d,
            );
            let offset = k * SUBSPACE_DIM;
            let mut ga = grad_a.rows_mut(offset, SUBSPACE_DIM);
            ga += &block_ga;
            let mut gb = grad_b.rows_mut(offset, SUBSPACE_DIM);
            gb += &block_gb;
        }
    }

    fn exp_map(&self, base: &DVector<f64>, tangent: &DVector<f64>, out: &mut DVector<f64>) {
        let mut block_out = DVector::zeros(SUBSPACE_DIM);
        for k in 0..self.count {
            self.disk
                .exp_map(&Self::block(base, k), &Self::block(tangent, k), &mut block_out);
            Self::store(out, k, &block_out);
        }
    }

    fn egrad2hgrad(&self, base: &DVector<f64>, grad: &mut DVector<f64>) {
        for k in 0..self.count {
            let mut block = Self::block(grad, k);
            self.disk.egrad2hgrad(&Self::block(base, k), &mut block);
            Self::store(grad, k, &block);
        }
    }

    fn project(&self, x: &mut DVector<f64>) {
        self.for_each_block(x, |block| self.disk.project(block));
    }

    fn project_tangent(&self, v: &mut DVector<f64>) {
        self.for_each_block(v, |block| self.disk.project_tangent(block));
    }

    fn transport(&self, from: &DVector<f64>, to: &DVector<f64>, v: &mut DVector<f64>) {
        for k in 0..self.count {
            let mut block = Self::block(v, k);
            self.disk
                .transport(&Self::block(from, k), &Self::block(to, k), &mut block);
            Self::store(v, k, &block);
        }
    }

    fn randomize<R: Rng + ?Sized>(&self, x: &mut DVector<f64>, rng: &mut R) {
        for k in 0..self.count {
            let mut block = Self::block(x, k);
            self.disk.randomize(&mut block, &mut *rng);
            Self::store(x, k, &block);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_single_block_matches_disk() {
        let stack = PoincareStack::new(1).unwrap();
        let a = DVector::from_vec(vec![0.1, 0.2]);
        let b = DVector::from_vec(vec![-0.3, 0.1]);
        assert_relative_eq!(stack.dist(&a, &b), stack.subspace().dist(&a, &b), epsilon = 1e-12);
    }

    #[test]
    fn test_distance_is_l2_of_blocks() {
        let stack = PoincareStack::new(2).unwrap();
        let a = DVector::from_vec(vec![0.1, 0.2, 0.0, 0.0]);
        let b = DVector::from_vec(vec![-0.3, 0.1, 0.4, 0.0]);
        let per_block = stack.block_distances(&a, &b);
        let expected = (per_block[0].powi(2) + per_block[1].powi(2)).sqrt();
        assert_relative_eq!(stack.dist(&a, &b), expected, epsilon = 1e-12);
    }

    #[test]
    fn test_diff_dist_only_touches_moving_blocks() {
        let stack = PoincareStack::new(2).unwrap();
        let a = DVector::from_vec(vec![0.1, 0.2, 0.3, -0.1]);
        let b = DVector::from_vec(vec![-0.3, 0.1, 0.3, -0.1]);
        let mut ga = stack.zeros();
        let mut gb = stack.zeros();
        stack.diff_dist(&a, &b, &mut ga, &mut gb, 1.0);
        assert!(ga[0] != 0.0);
        assert_relative_eq!(ga[2], 0.0, epsilon = 1e-6);
        assert_relative_eq!(ga[3], 0.0, epsilon = 1e-6);
    }

    #[test]
    fn test_header_param_is_subspace_dimension() {
        let stack = PoincareStack::new(3).unwrap();
        assert_eq!(stack.coordinate_len(), 6);
        assert_relative_eq!(stack.header_param(), 2.0);
    }
}
