//! Early stopping on a windowed loss trend.

use std::collections::VecDeque;

/// Number of trailing window averages examined.
pub const DEFAULT_PATIENCE: usize = 10;

/// Fraction of trailing averages that must fail to improve before stopping.
pub const DEFAULT_THRESHOLD: f64 = 0.75;

/// Averages losses over fixed windows and stops once they stop improving.
///
/// Training continues until at least `threshold · patience` of the last
/// `patience` window averages are no lower than the best average seen
/// before them.
///
/// ```
/// use hyperembed_train::EarlyStopper;
///
/// let mut stopper = EarlyStopper::new(2);
/// for i in 0..40 {
///     stopper.push(f64::from(i));
/// }
/// assert!(!stopper.continue_training());
/// ```
#[derive(Debug, Clone)]
pub struct EarlyStopper {
    window: usize,
    patience: usize,
    threshold: f64,
    sum: f64,
    pending: usize,
    trailing: VecDeque<f64>,
    best_before: f64,
    completed: usize,
}

impl EarlyStopper {
    /// Creates a stopper averaging `window` losses per sample.
    pub fn new(window: usize) -> Self {
        Self {
            window: window.max(1),
            patience: DEFAULT_PATIENCE,
            threshold: DEFAULT_THRESHOLD,
            sum: 0.0,
            pending: 0,
            trailing: VecDeque::with_capacity(DEFAULT_PATIENCE + 1),
            best_before: f64::INFINITY,
            completed: 0,
        }
    }

    /// Sets the number of trailing averages examined.
    pub fn with_patience(mut self, patience: usize) -> Self {
        self.patience = patience.max(1);
        self.trailing = VecDeque::with_capacity(self.patience + 1);
        self
    }

    /// Sets the fraction of non-improving averages that stops training.
    pub fn with_threshold(mut self, threshold: f64) -> Self {
        self.threshold = threshold;
        self
    }

    /// Records one loss.
    pub fn push(&mut self, loss: f64) {
        self.sum += loss;
        self.pending += 1;
        if self.pending == self.window {
            self.trailing.push_back(self.sum / self.window as f64);
            self.sum = 0.0;
            self.pending = 0;
            self.completed += 1;
            if self.trailing.len() > self.patience {
                if let Some(evicted) = self.trailing.pop_front() {
                    self.best_before = self.best_before.min(evicted);
                }
            }
        }
    }

    /// The last `patience` window averages, oldest first.
    pub fn trailing(&self) -> impl Iterator<Item = f64> + '_ {
        self.trailing.iter().copied()
    }

    /// Number of window averages completed so far.
    pub fn completed(&self) -> usize {
        self.completed
    }

    /// Lowest window average so far.
    pub fn minimum(&self) -> Option<f64> {
        let trailing = self.trailing().reduce(f64::min);
        if self.best_before.is_finite() {
            Some(trailing.map_or(self.best_before, |t| t.min(self.best_before)))
        } else {
            trailing
        }
    }

    /// Whether training should go on.
    pub fn continue_training(&self) -> bool {
        if self.completed <= self.patience {
            return true;
        }
        let stalled = self.trailing().filter(|&a| a >= self.best_before).count();
        (stalled as f64) < self.threshold * self.patience as f64
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_window_averages() {
        let mut stopper = EarlyStopper::new(3);
        for loss in [1.0, 2.0, 3.0, 4.0] {
            stopper.push(loss);
        }
        assert_eq!(stopper.completed(), 1);
        assert_eq!(stopper.trailing().collect::<Vec<_>>(), vec![2.0]);
        assert_relative_eq!(stopper.minimum().unwrap(), 2.0);
    }

    #[test]
    fn test_increasing_trend_stops() {
        let mut stopper = EarlyStopper::new(5);
        let mut stopped = false;
        for i in 0..1000 {
            stopper.push(f64::from(i) * 0.01);
            if !stopper.continue_training() {
                stopped = true;
                break;
            }
        }
        assert!(stopped);
    }

    #[test]
    fn test_decreasing_trend_continues() {
        let mut stopper = EarlyStopper::new(5);
        for i in 0..1000 {
            stopper.push(10.0 - f64::from(i) * 0.01);
            assert!(stopper.continue_training());
        }
    }

    #[test]
    fn test_plateau_stops() {
        let mut stopper = EarlyStopper::new(1).with_patience(4);
        for loss in [1.0, 1.0, 1.0, 1.0, 1.0, 1.0] {
            stopper.push(loss);
        }
        assert!(!stopper.continue_training());
    }

    #[test]
    fn test_noisy_improvement_continues() {
        let mut stopper = EarlyStopper::new(1).with_patience(4).with_threshold(0.75);
        for loss in [5.0, 4.0, 4.5, 3.0, 4.2, 2.0] {
            stopper.push(loss);
        }
        // Only 2 of the last 4 averages are above the best earlier one (4.0).
        assert!(stopper.continue_training());
    }

    #[test]
    fn test_history_is_bounded() {
        let mut stopper = EarlyStopper::new(1).with_patience(4);
        for i in 0..100_000 {
            stopper.push(1000.0 - f64::from(i) * 0.001);
        }
        assert_eq!(stopper.completed(), 100_000);
        assert_eq!(stopper.trailing().count(), 4);
        assert_relative_eq!(stopper.minimum().unwrap(), 1000.0 - 99_999.0 * 0.001);
        assert!(stopper.continue_training());
    }

    #[test]
    fn test_minimum_remembers_evicted_averages() {
        let mut stopper = EarlyStopper::new(1).with_patience(2);
        for loss in [0.5, 3.0, 2.0, 4.0] {
            stopper.push(loss);
        }
        assert_eq!(stopper.trailing().collect::<Vec<_>>(), vec![2.0, 4.0]);
        assert_relative_eq!(stopper.minimum().unwrap(), 0.5);
        assert!(!stopper.continue_training());
    }
}
