//! Hyperbolic vector spaces for embedding training.
//!
//! This crate implements the geometric contract used by the optimizer and
//! the batch generator on several curvature models.
//!
//! - [`PoincareDisk`]: the Poincaré disk, with an optional Lorentzian distance
//! - [`Hyperboloid`]: the Lorentz hyperboloid
//! - [`PoincareStack`]: a Cartesian stack of two-dimensional Poincaré disks
//! - [`Euclidean`]: flat space, for optimizer tests
//!
//! [`Space`] closes the set and is what the rest of the workspace passes around.

pub mod embedding;
pub mod euclidean;
pub mod lorentz;
pub mod poincare;
pub mod space;
pub mod stack;

// Re-export main spaces for convenience
pub use embedding::EmbeddingTable;
pub use euclidean::Euclidean;
pub use lorentz::Hyperboloid;
pub use poincare::PoincareDisk;
pub use space::{Space, VectorSpace};
pub use stack::{PoincareStack, SUBSPACE_DIM};
