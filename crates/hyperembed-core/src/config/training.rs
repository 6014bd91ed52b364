//! Run configuration for embedding training.
//!
//! [`TrainingConfig`] gathers every knob of a training run: vocabulary and
//! embedding shape, optimizer hyper-parameters, sampling policy, curvature
//! model and early stopping. Invalid values are rejected by
//! [`TrainingConfig::validate`] before any training starts.
//!
//! # Examples
//!
//! ```rust
//! use hyperembed_core::config::{ManifoldKind, TrainingConfig};
//!
//! let config = TrainingConfig::new()
//!     .with_dim(5)
//!     .with_manifold(ManifoldKind::Lorentz)
//!     .with_learning_rate(0.05)
//!     .with_nesterov(true);
//! assert!(config.validate().is_ok());
//! ```

use super::ManifoldKind;
use crate::error::{ConfigError, ConfigResult};

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// Smallest accepted progress reporting interval, in optimizer steps.
pub const MIN_REPORT_INTERVAL: u64 = 1000;

/// Configuration of a training run.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(default))]
pub struct TrainingConfig {
    /// Maximum vocabulary size
    pub nvoc: usize,
    /// Embedding dimension (number of sub-disks for the stack model)
    pub dim: usize,
    /// Worker threads; 0 runs everything on the calling thread
    pub threads: usize,
    /// Learning rate reached after the burn-in phase
    pub lr: f64,
    /// Momentum coefficient β
    pub momentum: f64,
    /// Use Nesterov momentum
    pub nesterov: bool,
    /// Candidates drawn per batch
    pub batch_size: usize,
    /// Batches accumulated before each optimizer step
    pub sampling: usize,
    /// Initial probability of drawing a close candidate
    pub pos_threshold: f64,
    /// Final probability of drawing a close candidate (defaults to `pos_threshold`)
    pub max_pos_threshold: Option<f64>,
    /// Fraction of `niter` run at a tenth of the learning rate
    pub plateau: f64,
    /// Total optimizer steps
    pub niter: u64,
    /// Curvature ("celerity") constant
    pub curvature: f64,
    /// Curvature model
    pub manifold: ManifoldKind,
    /// Use the hyperboloid distance formula on Poincaré points
    pub lorentzian_distance: bool,
    /// Decay the learning rate linearly after the burn-in phase
    pub decaying_lr: bool,
    /// Floor of the decaying learning rate
    pub min_lr: f64,
    /// Similarity weighting mode (0 to 3)
    pub weighting: u8,
    /// Similarity normalizer used when no median similarity is available
    pub alpha: f64,
    /// Sample from a similarity table instead of a vector source
    pub similarity_mode: bool,
    /// Look similarity pairs up in both directions
    pub symmetric: bool,
    /// Steps between two nearest-neighbor index rebuilds (one epoch)
    pub rebuild_every: u64,
    /// Steps between two progress reports
    pub report_every: u64,
    /// Write numbered checkpoints instead of overwriting
    pub numbered_checkpoints: bool,
    /// Enable early stopping
    pub early_stop: bool,
    /// Number of losses averaged into one early stopping sample
    pub early_stop_window: usize,
    /// Resume from an existing embedding (skips the burn-in phase)
    pub resume: bool,
    /// Seed of the worker random generators
    pub seed: Option<u64>,
}

impl Default for TrainingConfig {
    fn default() -> Self {
        Self {
            nvoc: 50_000,
            dim: 10,
            threads: num_cpus::get(),
            lr: 1e-2,
            momentum: 0.9,
            nesterov: false,
            batch_size: 10,
            sampling: 20,
            pos_threshold: 0.1,
            max_pos_threshold: None,
            plateau: 0.1,
            niter: 100_000,
            curvature: 1.0,
            manifold: ManifoldKind::Poincare,
            lorentzian_distance: false,
            decaying_lr: false,
            min_lr: 0.0,
            weighting: 0,
            alpha: 0.5,
            similarity_mode: false,
            symmetric: false,
            rebuild_every: 10_000,
            report_every: 10_000,
            numbered_checkpoints: false,
            early_stop: false,
            early_stop_window: 1000,
            resume: false,
            seed: None,
        }
    }
}

impl TrainingConfig {
    /// Creates a configuration with default parameters.
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the vocabulary size.
    pub fn with_nvoc(mut self, nvoc: usize) -> Self {
        self.nvoc = nvoc;
        self
    }

    /// Sets the embedding dimension.
    pub fn with_dim(mut self, dim: usize) -> Self {
        self.dim = dim;
        self
    }

    /// Sets the number of worker threads.
    pub fn with_threads(mut self, threads: usize) -> Self {
        self.threads = threads;
        self
    }

    /// Sets the learning rate.
    pub fn with_learning_rate(mut self, lr: f64) -> Self {
        self.lr = lr;
        self
    }

    /// Sets the momentum coefficient.
    pub fn with_momentum(mut self, momentum: f64) -> Self {
        self.momentum = momentum;
        self
    }

    /// Enables or disables Nesterov momentum.
    pub fn with_nesterov(mut self, nesterov: bool) -> Self {
        self.nesterov = nesterov;
        self
    }

    /// Sets the number of candidates per batch.
    pub fn with_batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size;
        self
    }

    /// Sets the number of batches accumulated per optimizer step.
    pub fn with_sampling(mut self, sampling: usize) -> Self {
        self.sampling = sampling;
        self
    }

    /// Sets the initial and final positive sampling ratios.
    pub fn with_positive_ratio(mut self, initial: f64, max: f64) -> Self {
        self.pos_threshold = initial;
        self.max_pos_threshold = Some(max);
        self
    }

    /// Sets the burn-in fraction.
    pub fn with_plateau(mut self, plateau: f64) -> Self {
        self.plateau = plateau;
        self
    }

    /// Sets the total number of optimizer steps.
    pub fn with_niter(mut self, niter: u64) -> Self {
        self.niter = niter;
        self
    }

    /// Sets the curvature constant.
    pub fn with_curvature(mut self, curvature: f64) -> Self {
        self.curvature = curvature;
        self
    }

    /// Sets the curvature model.
    pub fn with_manifold(mut self, manifold: ManifoldKind) -> Self {
        self.manifold = manifold;
        self
    }

    /// Enables a linearly decaying learning rate with the given floor.
    pub fn with_decaying_lr(mut self, min_lr: f64) -> Self {
        self.decaying_lr = true;
        self.min_lr = min_lr;
        self
    }

    /// Sets the similarity weighting mode.
    pub fn with_weighting(mut self, weighting: u8) -> Self {
        self.weighting = weighting;
        self
    }

    /// Switches to similarity-table sampling.
    pub fn with_similarity_mode(mut self, symmetric: bool) -> Self {
        self.similarity_mode = true;
        self.symmetric = symmetric;
        self
    }

    /// Sets the number of steps per epoch.
    pub fn with_rebuild_every(mut self, steps: u64) -> Self {
        self.rebuild_every = steps;
        self
    }

    /// Enables early stopping over windows of `window` losses.
    pub fn with_early_stop(mut self, window: usize) -> Self {
        self.early_stop = true;
        self.early_stop_window = window;
        self
    }

    /// Marks the run as a continuation of a previous one.
    pub fn with_resume(mut self, resume: bool) -> Self {
        self.resume = resume;
        self
    }

    /// Fixes the seed of the worker random generators.
    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = Some(seed);
        self
    }

    /// Final probability of drawing a close candidate.
    pub fn max_positive_ratio(&self) -> f64 {
        self.max_pos_threshold.unwrap_or(self.pos_threshold)
    }

    /// Burn-in fraction actually applied: resumed runs skip the burn-in.
    pub fn effective_plateau(&self) -> f64 {
        if self.resume {
            0.0
        } else {
            self.plateau
        }
    }

    /// Steps per epoch. A similarity table never needs an index rebuild,
    /// so the whole run is a single epoch.
    pub fn effective_rebuild_every(&self) -> u64 {
        if self.similarity_mode {
            self.niter
        } else {
            self.rebuild_every.min(self.niter)
        }
    }

    /// Progress reporting interval.
    pub fn effective_report_every(&self) -> u64 {
        self.report_every.max(MIN_REPORT_INTERVAL)
    }

    /// Checks every field against its valid range.
    pub fn validate(&self) -> ConfigResult<()> {
        if self.dim == 0 {
            return Err(ConfigError::invalid_value("dim", self.dim, "must be positive"));
        }
        if self.nvoc == 0 {
            return Err(ConfigError::invalid_value("nvoc", self.nvoc, "must be positive"));
        }
        if !(self.lr > 0.0 && self.lr.is_finite()) {
            return Err(ConfigError::invalid_value("lr", self.lr, "must be positive"));
        }
        if !(0.0..1.0).contains(&self.momentum) {
            return Err(ConfigError::invalid_value(
                "momentum",
                self.momentum,
                "must be in [0, 1)",
            ));
        }
        if self.batch_size < 2 {
            return Err(ConfigError::invalid_value(
                "batch_size",
                self.batch_size,
                "needs one positive and at least one negative candidate",
            ));
        }
        if self.sampling == 0 {
            return Err(ConfigError::invalid_value("sampling", self.sampling, "must be positive"));
        }
        for (name, ratio) in [
            ("pos_threshold", self.pos_threshold),
            ("max_pos_threshold", self.max_positive_ratio()),
            ("plateau", self.plateau),
        ] {
            if !(0.0..=1.0).contains(&ratio) {
                return Err(ConfigError::invalid_value(name, ratio, "must be in [0, 1]"));
            }
        }
        if self.max_positive_ratio() < self.pos_threshold {
            return Err(ConfigError::invalid_value(
                "max_pos_threshold",
                self.max_positive_ratio(),
                "must not be lower than pos_threshold",
            ));
        }
        if !(self.curvature > 0.0 && self.curvature.is_finite()) {
            return Err(ConfigError::invalid_value(
                "curvature",
                self.curvature,
                "must be positive",
            ));
        }
        if self.min_lr < 0.0 {
            return Err(ConfigError::invalid_value("min_lr", self.min_lr, "must not be negative"));
        }
        if self.weighting > 3 {
            return Err(ConfigError::invalid_value(
                "weighting",
                self.weighting,
                "must be 0, 1, 2 or 3",
            ));
        }
        if self.niter == 0 {
            return Err(ConfigError::invalid_value("niter", self.niter, "must be positive"));
        }
        if self.rebuild_every == 0 {
            return Err(ConfigError::invalid_value(
                "rebuild_every",
                self.rebuild_every,
                "must be positive",
            ));
        }
        if self.early_stop && self.early_stop_window == 0 {
            return Err(ConfigError::invalid_value(
                "early_stop_window",
                self.early_stop_window,
                "must be positive when early stopping is enabled",
            ));
        }
        if self.lorentzian_distance && self.manifold != ManifoldKind::Poincare {
            return Err(ConfigError::invalid_value(
                "lorentzian_distance",
                self.manifold,
                "only applies to the Poincare model",
            ));
        }
        Ok(())
    }

    /// Reads a JSON configuration. Missing fields take their default value.
    #[cfg(feature = "serde")]
    pub fn from_json_str(json: &str) -> ConfigResult<Self> {
        serde_json::from_str(json).map_err(|e| ConfigError::Parse {
            reason: e.to_string(),
        })
    }

    /// Reads a JSON configuration file.
    #[cfg(feature = "serde")]
    pub fn from_json_file<P: AsRef<std::path::Path>>(path: P) -> ConfigResult<Self> {
        let text = std::fs::read_to_string(path.as_ref()).map_err(|e| ConfigError::Parse {
            reason: format!("{}: {e}", path.as_ref().display()),
        })?;
        Self::from_json_str(&text)
    }

    /// Serializes the configuration as pretty-printed JSON.
    #[cfg(feature = "serde")]
    pub fn to_json_string(&self) -> ConfigResult<String> {
        serde_json::to_string_pretty(self).map_err(|e| ConfigError::Parse {
            reason: e.to_string(),
        })
    }
}
