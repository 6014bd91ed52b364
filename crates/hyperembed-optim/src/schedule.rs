//! Learning rate schedules.
//!
//! The rate is a pure function of the number of optimizer steps completed so
//! far, so every worker can derive it from a shared atomic counter.
//!
//! # Burn-in
//!
//! During the first `plateau_steps` steps the rate is held at a tenth of the
//! configured value. Afterwards it is either constant or decays linearly:
//!
//! ```text
//! α_k = 0.1 · α                                   k < plateau
//! α_k = α                                         otherwise (no decay)
//! α_k = max(α · (1 - (k - plateau) / (total - plateau)), α_min)
//! ```

use hyperembed_core::TrainingConfig;

/// Fraction of the configured rate used during burn-in.
pub const BURN_IN_FACTOR: f64 = 0.1;

/// Step-count driven learning rate.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum LearningRateSchedule {
    /// Fixed rate for every step.
    Constant(f64),

    /// Reduced rate until `plateau_steps`, then the configured rate.
    BurnIn {
        /// Rate after burn-in
        lr: f64,
        /// Number of burn-in steps
        plateau_steps: u64,
    },

    /// Burn-in followed by a linear decay that reaches `min_lr` at `total_steps`.
    BurnInLinearDecay {
        /// Rate right after burn-in
        lr: f64,
        /// Number of burn-in steps
        plateau_steps: u64,
        /// Step at which the decay bottoms out
        total_steps: u64,
        /// Floor of the decayed rate
        min_lr: f64,
    },
}

impl LearningRateSchedule {
    /// Schedule described by a run configuration.
    pub fn from_config(config: &TrainingConfig) -> Self {
        let plateau_steps = (config.effective_plateau() * config.niter as f64) as u64;
        if config.decaying_lr {
            Self::BurnInLinearDecay {
                lr: config.lr,
                plateau_steps,
                total_steps: config.niter,
                min_lr: config.min_lr,
            }
        } else {
            Self::BurnIn {
                lr: config.lr,
                plateau_steps,
            }
        }
    }

    /// Rate to use for the step following `completed` steps.
    pub fn rate(&self, completed: u64) -> f64 {
        match *self {
            Self::Constant(lr) => lr,
            Self::BurnIn { lr, plateau_steps } => {
                if completed < plateau_steps {
                    BURN_IN_FACTOR * lr
                } else {
                    lr
                }
            }
            Self::BurnInLinearDecay {
                lr,
                plateau_steps,
                total_steps,
                min_lr,
            } => {
                if completed < plateau_steps {
                    return BURN_IN_FACTOR * lr;
                }
                let span = total_steps.saturating_sub(plateau_steps);
                if span == 0 {
                    return min_lr;
                }
                let progress = (completed - plateau_steps) as f64 / span as f64;
                (lr * (1.0 - progress)).max(min_lr)
            }
        }
    }

    /// Rate after burn-in, before any decay.
    pub fn nominal_rate(&self) -> f64 {
        match *self {
            Self::Constant(lr) | Self::BurnIn { lr, .. } | Self::BurnInLinearDecay { lr, .. } => lr,
        }
    }
}
