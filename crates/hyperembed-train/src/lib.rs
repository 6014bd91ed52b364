//! Training of hyperbolic embeddings with negative sampling.
//!
//! Items come either from pretrained vectors, whose cosine neighbourhoods
//! define what should end up close, or from a table of pairwise similarity
//! scores. Each step draws an anchor and a set of candidates, one of which is
//! the positive, and minimizes a softmax-style loss over their manifold
//! distances with Riemannian SGD.
//!
//! # Components
//!
//! - **[`sources`]**: [`VectorSource`] and [`SimilarityTable`] behind [`ItemSource`]
//! - **[`batch`]**: [`BatchMaker`] draws candidates and accumulates gradients
//! - **[`loss`]**: stable `log(1 + exp)` terms and similarity weighting
//! - **[`trainer`]**: the multi-threaded epoch loop
//! - **[`persist`]**: text embeddings and checkpoint sinks
//! - **[`early_stop`]**: windowed loss trend
//!
//! # Examples
//!
//! ```rust
//! use hyperembed_core::TrainingConfig;
//! use hyperembed_train::{MemorySink, SimilarityTable, Trainer};
//!
//! let triples = vec![
//!     ("cat".to_string(), "feline".to_string(), 0.9),
//!     ("dog".to_string(), "canine".to_string(), 0.8),
//!     ("cat".to_string(), "dog".to_string(), 0.3),
//! ];
//! let table = SimilarityTable::from_triples(triples, 10, true)?;
//! let config = TrainingConfig::new()
//!     .with_dim(2)
//!     .with_threads(0)
//!     .with_batch_size(3)
//!     .with_niter(50)
//!     .with_similarity_mode(true)
//!     .with_seed(1);
//!
//! let mut trainer = Trainer::random(config, table.into())?;
//! let report = trainer.train(&mut MemorySink::new())?;
//! assert_eq!(report.steps, 50);
//! # Ok::<(), hyperembed_train::TrainError>(())
//! ```

pub mod batch;
pub mod early_stop;
pub mod error;
pub mod loss;
pub mod persist;
pub mod sources;
pub mod trainer;

pub use batch::{Batch, BatchMaker};
pub use early_stop::EarlyStopper;
pub use error::{TrainError, TrainResult};
pub use loss::Weighting;
pub use persist::{
    load_embedding, read_embedding, read_vectors, save_embedding, write_embedding, write_vectors,
    Checkpoint, CheckpointSink, JsonCheckpoint, JsonCheckpointSink, MemorySink, NullSink,
    StoredCheckpoint, TextCheckpointSink, VectorFile,
};
pub use sources::{EmbeddingSource, ItemSource, SimilaritySource, SimilarityTable, VectorSource};
pub use trainer::{TerminationReason, Trainer, TrainingReport};
