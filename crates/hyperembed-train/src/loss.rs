//! Clamped logistic losses and similarity weighting.
//!
//! The ranking loss pulls the positive candidate towards the anchor with
//! `ln(1 + e^d)` and pushes negatives away with `ln(1 + e^{-d})`, where `d`
//! is the manifold distance. Arguments are clamped to `[-MAX_EXP, MAX_EXP]`
//! so that far away pairs saturate instead of overflowing.

use hyperembed_core::{constants::MAX_EXP, ConfigError, ConfigResult};

/// Added to a negative similarity before dividing by it.
const SIMILARITY_EPSILON: f64 = 1e-8;

fn clamp(x: f64) -> f64 {
    x.clamp(-MAX_EXP, MAX_EXP)
}

/// `ln(1 + e^{-x})`, the loss of a negative candidate at distance `x`.
pub fn logexp(x: f64) -> f64 {
    (-clamp(x)).exp().ln_1p()
}

/// `ln(1 + e^{x})`, the loss of the positive candidate at distance `x`.
pub fn neglogexp(x: f64) -> f64 {
    clamp(x).exp().ln_1p()
}

/// `e^{-x}` with the same clamping.
pub fn expneg(x: f64) -> f64 {
    (-clamp(x)).exp()
}

/// [`logexp`] evaluated at `weight · x`.
pub fn weighted_logexp(x: f64, weight: f64) -> f64 {
    logexp(weight * x)
}

/// [`neglogexp`] evaluated at `weight · x`.
pub fn weighted_neglogexp(x: f64, weight: f64) -> f64 {
    neglogexp(weight * x)
}

/// How similarity scores reweight the loss terms.
///
/// Each loss term is `f1 · loss(f2 · d)`. The ratio used for `f1`/`f2` is
/// `sim / norm` for the positive candidate and
/// `cumulative_negative / (sim + 1e-8)` for a negative one, where `norm` is
/// the median similarity of the table or the configured `alpha`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Weighting {
    /// Mode 0: `f1 = f2 = 1`.
    #[default]
    Unweighted,
    /// Mode 1: the ratio scales the distance argument (`f2`).
    Argument,
    /// Mode 2: the ratio scales the loss and its gradient (`f1`).
    Magnitude,
    /// Mode 3: both.
    Both,
}

impl Weighting {
    /// Maps the numeric mode of the configuration.
    pub fn from_mode(mode: u8) -> ConfigResult<Self> {
        match mode {
            0 => Ok(Self::Unweighted),
            1 => Ok(Self::Argument),
            2 => Ok(Self::Magnitude),
            3 => Ok(Self::Both),
            _ => Err(ConfigError::invalid_value(
                "weighting",
                mode,
                "must be between 0 and 3",
            )),
        }
    }

    /// Numeric mode.
    pub fn mode(self) -> u8 {
        match self {
            Self::Unweighted => 0,
            Self::Argument => 1,
            Self::Magnitude => 2,
            Self::Both => 3,
        }
    }

    /// Returns `(f1, f2)` for one candidate.
    pub fn factors(self, sim: f64, norm: f64, positive: bool, cumulative_negative: f64) -> (f64, f64) {
        let ratio = if positive {
            sim / norm
        } else {
            cumulative_negative / (sim + SIMILARITY_EPSILON)
        };
        match self {
            Self::Unweighted => (1.0, 1.0),
            Self::Argument => (1.0, ratio),
            Self::Magnitude => (ratio, 1.0),
            Self::Both => (ratio, ratio),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_values_inside_range() {
        assert_relative_eq!(logexp(0.0), 2.0_f64.ln());
        assert_relative_eq!(neglogexp(0.0), 2.0_f64.ln());
        assert_relative_eq!(logexp(1.5), (1.0 + (-1.5_f64).exp()).ln(), epsilon = 1e-15);
        assert_relative_eq!(neglogexp(1.5), (1.0 + 1.5_f64.exp()).ln(), epsilon = 1e-15);
        assert_relative_eq!(expneg(2.0), (-2.0_f64).exp());
    }

    #[test]
    fn test_clamping_beyond_max_exp() {
        for x in [17.0, 100.0, 1e300, f64::INFINITY] {
            assert_relative_eq!(logexp(x), logexp(MAX_EXP));
            assert_relative_eq!(logexp(-x), logexp(-MAX_EXP));
            assert_relative_eq!(neglogexp(x), neglogexp(MAX_EXP));
            assert_relative_eq!(neglogexp(-x), neglogexp(-MAX_EXP));
            assert_relative_eq!(expneg(-x), MAX_EXP.exp());
            for v in [logexp(x), logexp(-x), neglogexp(x), neglogexp(-x), expneg(x), expneg(-x)] {
                assert!(v.is_finite());
            }
        }
    }

    #[test]
    fn test_positive_loss_grows_with_distance() {
        assert!(neglogexp(2.0) > neglogexp(1.0));
        assert!(logexp(2.0) < logexp(1.0));
        assert_relative_eq!(weighted_neglogexp(1.0, 3.0), neglogexp(3.0));
        assert_relative_eq!(weighted_logexp(2.0, 0.5), logexp(1.0));
    }

    #[test]
    fn test_weighting_modes() {
        assert_eq!(Weighting::from_mode(2).unwrap(), Weighting::Magnitude);
        assert!(Weighting::from_mode(4).is_err());
        assert_eq!(Weighting::Both.mode(), 3);

        assert_eq!(Weighting::Unweighted.factors(0.8, 0.5, true, 2.0), (1.0, 1.0));

        let (f1, f2) = Weighting::Argument.factors(0.8, 0.5, true, 2.0);
        assert_relative_eq!(f1, 1.0);
        assert_relative_eq!(f2, 1.6);

        let (f1, f2) = Weighting::Magnitude.factors(0.5, 0.5, false, 2.0);
        assert_relative_eq!(f1, 2.0 / (0.5 + 1e-8));
        assert_relative_eq!(f2, 1.0);

        let (f1, f2) = Weighting::Both.factors(0.25, 0.5, true, 2.0);
        assert_relative_eq!(f1, 0.5);
        assert_relative_eq!(f2, 0.5);
    }

    mod properties {
        use super::*;
        use proptest::prelude::*;

        proptest! {
            #[test]
            fn losses_are_positive_and_finite(x in -1e6f64..1e6) {
                prop_assert!(logexp(x) > 0.0 && logexp(x).is_finite());
                prop_assert!(neglogexp(x) > 0.0 && neglogexp(x).is_finite());
            }

            #[test]
            fn logexp_mirrors_neglogexp(x in -16.0f64..16.0) {
                prop_assert!((logexp(x) - neglogexp(-x)).abs() < 1e-12);
            }

            #[test]
            fn neglogexp_is_monotone(x in -16.0f64..15.0, dx in 0.01f64..1.0) {
                prop_assert!(neglogexp(x + dx) > neglogexp(x));
                prop_assert!(logexp(x + dx) < logexp(x));
            }
        }
    }
}
