//! # hyperembed
//!
//! Hyperbolic embeddings of discrete items, trained with Riemannian SGD and
//! negative sampling.
//!
//! This crate gathers the workspace crates behind one dependency:
//!
//! - [`hyperembed_core`]: errors, configuration and numerical differentiation
//! - [`hyperembed_manifolds`]: Poincaré disk, Lorentz hyperboloid and Poincaré stack
//! - [`hyperembed_optim`]: locked parameter store and Riemannian SGD
//! - [`hyperembed_train`]: sampling sources, batch generator, trainer and persistence
//!
//! [`nalgebra`] is re-exported for the coordinate vectors. The [`cli`] module
//! backs the `hyperembed` binary.
//!
//! ## Quick Start
//!
//! ```rust
//! use hyperembed::prelude::*;
//!
//! let triples = vec![
//!     ("mammal".to_string(), "dog".to_string(), 1.0),
//!     ("mammal".to_string(), "cat".to_string(), 1.0),
//!     ("bird".to_string(), "sparrow".to_string(), 1.0),
//! ];
//! let source = SimilarityTable::from_triples(triples, 100, true)?;
//! let config = TrainingConfig::new()
//!     .with_dim(2)
//!     .with_threads(0)
//!     .with_batch_size(3)
//!     .with_niter(100)
//!     .with_similarity_mode(true)
//!     .with_seed(3);
//!
//! let mut trainer = Trainer::random(config, source.into())?;
//! trainer.train(&mut NullSink)?;
//! let (embedding, _) = trainer.into_parts()?;
//! assert_eq!(embedding.len(), 5);
//! # Ok::<(), hyperembed::hyperembed_train::TrainError>(())
//! ```

pub mod cli;

pub use hyperembed_core;
pub use hyperembed_manifolds;
pub use hyperembed_optim;
pub use hyperembed_train;
pub use nalgebra;

/// Commonly used items.
pub mod prelude {
    pub use hyperembed_core::{DVector, ManifoldKind, TrainingConfig};
    pub use hyperembed_manifolds::{EmbeddingTable, Space, VectorSpace};
    pub use hyperembed_optim::{GradientBuffer, ParameterStore, Rsgd, RsgdConfig};
    pub use hyperembed_train::{
        CheckpointSink, ItemSource, MemorySink, NullSink, SimilarityTable, TextCheckpointSink,
        Trainer, TrainingReport, VectorSource,
    };
}
