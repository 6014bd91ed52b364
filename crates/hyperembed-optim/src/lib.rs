//! Riemannian optimization for hyperbolic embeddings.
//!
//! This crate provides the sparse, concurrent optimizer that moves embedding
//! vectors on their manifold.
//!
//! # Components
//!
//! - **[`ParameterStore`]**: points and momenta, one lock per slot
//! - **[`GradientBuffer`]**: per-worker Euclidean gradients
//! - **[`LearningRateSchedule`]**: burn-in and linear decay
//! - **[`Rsgd`]**: Riemannian SGD with classical or Nesterov momentum
//!
//! # Examples
//!
//! ```rust
//! use std::collections::BTreeSet;
//! use hyperembed_core::DVector;
//! use hyperembed_manifolds::Space;
//! use hyperembed_optim::{GradientBuffer, ParameterStore, Rsgd, RsgdConfig};
//!
//! let store = ParameterStore::new(Space::euclidean(1), vec![DVector::from_element(1, 50.0)])?;
//! let rsgd = Rsgd::new(
//!     store,
//!     RsgdConfig::new()
//!         .with_constant_learning_rate(0.01)
//!         .with_classical_momentum(0.9),
//! )?;
//!
//! let mut grads = GradientBuffer::for_store(rsgd.store());
//! let touched = BTreeSet::from([0]);
//! for _ in 0..1000 {
//!     let x = rsgd.store().param(0)?[0];
//!     if let Some(g) = grads.get_mut(0) {
//!         g[0] = 2.0 * x - 9.0;
//!     }
//!     rsgd.step(&touched, &mut grads, 0)?;
//! }
//! assert!((rsgd.store().param(0)?[0] - 4.5).abs() < 1e-3);
//! # Ok::<(), hyperembed_core::OptimizerError>(())
//! ```

pub mod rsgd;
pub mod schedule;
pub mod store;

// Re-export main types for convenience
pub use rsgd::{MomentumMethod, Rsgd, RsgdConfig};
pub use schedule::{LearningRateSchedule, BURN_IN_FACTOR};
pub use store::{GradientBuffer, ParameterStore, Slot, SlotGuard};
