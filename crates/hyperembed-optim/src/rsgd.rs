//! Riemannian stochastic gradient descent with momentum.
//!
//! The optimizer applies sparse updates: a step only touches the slots whose
//! gradients were written by the batch generator. Several workers may step
//! concurrently on overlapping index sets. Each slot is updated under its own
//! lock for the whole read-modify-write sequence.
//!
//! # Algorithm
//!
//! For every touched slot `i` with point `x`, momentum `m` and Euclidean
//! gradient `g`:
//!
//! ```text
//! g ← egrad2hgrad(x, g)                 Riemannian gradient
//! m ← β·m + g
//! d ← m                                 classical
//! d ← g + β·m   (and m ← β·m)           Nesterov
//! x' ← exp_x(-α_k · d)
//! m ← P_{x→x'}(m)                       parallel transport
//! g ← 0
//! ```
//!
//! Update directions and momenta are passed through the space's tangent
//! projection after every change, and the new point through the point
//! projection.
//!
//! The learning rate `α_k` is derived from an atomic step counter shared by
//! all workers, see [`LearningRateSchedule`].

use crate::{
    schedule::LearningRateSchedule,
    store::{GradientBuffer, ParameterStore, Slot},
};
use hyperembed_core::{OptimizerError, OptimizerResult, TrainingConfig};
use hyperembed_manifolds::VectorSpace;
use std::collections::BTreeSet;
use std::sync::atomic::{AtomicU64, Ordering};
use tracing::{debug, trace};

/// Momentum method for RSGD.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum MomentumMethod {
    /// No momentum
    None,

    /// Classical momentum: m_k = β·m_{k-1} + g_k
    Classical {
        /// Momentum coefficient β
        coefficient: f64,
    },

    /// Nesterov accelerated gradient
    Nesterov {
        /// Momentum coefficient β
        coefficient: f64,
    },
}

impl MomentumMethod {
    /// Maps a coefficient and a Nesterov flag to a method. A zero coefficient disables momentum.
    pub fn from_coefficient(coefficient: f64, nesterov: bool) -> Self {
        if coefficient == 0.0 {
            Self::None
        } else if nesterov {
            Self::Nesterov { coefficient }
        } else {
            Self::Classical { coefficient }
        }
    }

    fn coefficient(self) -> f64 {
        match self {
            Self::None => 0.0,
            Self::Classical { coefficient } | Self::Nesterov { coefficient } => coefficient,
        }
    }
}

/// Configuration for the RSGD optimizer.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RsgdConfig {
    /// Learning rate schedule
    pub schedule: LearningRateSchedule,

    /// Momentum method
    pub momentum: MomentumMethod,
}

impl Default for RsgdConfig {
    fn default() -> Self {
        Self {
            schedule: LearningRateSchedule::Constant(0.01),
            momentum: MomentumMethod::None,
        }
    }
}

impl RsgdConfig {
    /// Creates a new RSGD configuration with default parameters.
    pub fn new() -> Self {
        Self::default()
    }

    /// Configuration described by a run configuration.
    pub fn from_training_config(config: &TrainingConfig) -> Self {
        Self {
            schedule: LearningRateSchedule::from_config(config),
            momentum: MomentumMethod::from_coefficient(config.momentum, config.nesterov),
        }
    }

    /// Sets the learning rate schedule.
    #[must_use]
    pub fn with_schedule(mut self, schedule: LearningRateSchedule) -> Self {
        self.schedule = schedule;
        self
    }

    /// Sets a constant learning rate.
    #[must_use]
    pub fn with_constant_learning_rate(mut self, lr: f64) -> Self {
        self.schedule = LearningRateSchedule::Constant(lr);
        self
    }

    /// Sets momentum method.
    #[must_use]
    pub fn with_momentum(mut self, momentum: MomentumMethod) -> Self {
        self.momentum = momentum;
        self
    }

    /// Sets classical momentum.
    #[must_use]
    pub fn with_classical_momentum(mut self, coefficient: f64) -> Self {
        self.momentum = MomentumMethod::Classical { coefficient };
        self
    }

    /// Sets Nesterov momentum.
    #[must_use]
    pub fn with_nesterov_momentum(mut self, coefficient: f64) -> Self {
        self.momentum = MomentumMethod::Nesterov { coefficient };
        self
    }

    /// Checks the learning rate and momentum coefficient.
    pub fn validate(&self) -> OptimizerResult<()> {
        let lr = self.schedule.nominal_rate();
        if !(lr > 0.0 && lr.is_finite()) {
            return Err(OptimizerError::invalid_configuration(
                "learning rate must be positive",
                "lr",
                lr,
            ));
        }
        let beta = self.momentum.coefficient();
        if !(0.0..1.0).contains(&beta) {
            return Err(OptimizerError::invalid_configuration(
                "momentum coefficient must be in [0, 1)",
                "momentum",
                beta,
            ));
        }
        Ok(())
    }
}

/// Riemannian SGD over a shared [`ParameterStore`].
///
/// `Rsgd` is `Sync`: workers share it by reference and call [`Rsgd::step`]
/// with their own gradient buffers.
#[derive(Debug)]
pub struct Rsgd {
    store: ParameterStore,
    config: RsgdConfig,
    steps: AtomicU64,
    worker_steps: Vec<AtomicU64>,
}

impl Rsgd {
    /// Creates an optimizer for a single worker.
    pub fn new(store: ParameterStore, config: RsgdConfig) -> OptimizerResult<Self> {
        Self::with_workers(store, config, 1)
    }

    /// Creates an optimizer keeping per-worker step counts for `workers` workers.
    pub fn with_workers(
        store: ParameterStore,
        config: RsgdConfig,
        workers: usize,
    ) -> OptimizerResult<Self> {
        config.validate()?;
        debug!(slots = store.len(), ?config, workers, "Creating RSGD optimizer");
        Ok(Self {
            store,
            config,
            steps: AtomicU64::new(0),
            worker_steps: (0..workers.max(1)).map(|_| AtomicU64::new(0)).collect(),
        })
    }

    /// The optimized parameters.
    pub fn store(&self) -> &ParameterStore {
        &self.store
    }

    /// Consumes the optimizer, returning its parameters.
    pub fn into_store(self) -> ParameterStore {
        self.store
    }

    /// Optimizer configuration.
    pub fn config(&self) -> &RsgdConfig {
        &self.config
    }

    /// Number of steps taken by all workers.
    pub fn steps(&self) -> u64 {
        self.steps.load(Ordering::Relaxed)
    }

    /// Number of steps taken by `worker`.
    pub fn worker_steps(&self, worker: usize) -> u64 {
        self.worker_steps
            .get(worker)
            .map_or(0, |count| count.load(Ordering::Relaxed))
    }

    /// Learning rate the next step would use.
    pub fn learning_rate(&self) -> f64 {
        self.config.schedule.rate(self.steps())
    }

    /// Applies the gradients of `touched` slots and zeroes them.
    ///
    /// Returns the learning rate used for this step.
    ///
    /// # Errors
    ///
    /// Returns `IndexOutOfBounds` if an index is outside of the store or of
    /// the gradient buffer. No slot is modified in that case.
    pub fn step(
        &self,
        touched: &BTreeSet<usize>,
        grads: &mut GradientBuffer,
        worker: usize,
    ) -> OptimizerResult<f64> {
        let len = self.store.len().min(grads.len());
        if let Some(&index) = touched.iter().next_back().filter(|&&i| i >= len) {
            return Err(OptimizerError::IndexOutOfBounds { index, len });
        }

        let completed = self.steps.fetch_add(1, Ordering::Relaxed);
        if let Some(count) = self.worker_steps.get(worker) {
            count.fetch_add(1, Ordering::Relaxed);
        }
        let lr = self.config.schedule.rate(completed);
        trace!(worker, step = completed, lr, touched = touched.len(), "RSGD step");

        let space = self.store.space();
        for &index in touched {
            let Some(grad) = grads.get_mut(index) else {
                continue;
            };
            let mut guard = self.store.lock(index)?;
            let Slot { param, momentum } = &mut *guard;

            space.egrad2hgrad(param, grad);
            space.project_tangent(grad);

            match self.config.momentum {
                MomentumMethod::None => {}
                MomentumMethod::Classical { coefficient } => {
                    *momentum *= coefficient;
                    *momentum += &*grad;
                    grad.copy_from(&*momentum);
                }
                MomentumMethod::Nesterov { coefficient } => {
                    *momentum *= coefficient;
                    *momentum += &*grad;
                    *momentum *= coefficient;
                    *grad += &*momentum;
                }
            }

            *grad *= -lr;
            space.project_tangent(grad);

            let previous = param.clone();
            space.exp_map(&previous, grad, param);
            space.project(param);

            space.transport(&previous, param, momentum);
            space.project_tangent(momentum);

            grad.fill(0.0);
        }

        Ok(lr)
    }
}
