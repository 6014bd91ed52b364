//! Negative sampling and the ranking loss.
//!
//! A batch is one anchor and `B` distinct candidates. The candidate most
//! similar to the anchor is the positive one and is pulled closer; the
//! others are pushed away:
//!
//! ```text
//! loss = f1 · ln(1 + e^{f2·d⁺}) + 1/(B-1) · Σ_neg f1 · ln(1 + e^{-f2·d⁻})
//! ```
//!
//! The derivative of each term with respect to the distance is taken
//! numerically and chained through the space's `diff_dist` into the worker's
//! gradient buffer. The anchor entry accumulates over all candidates.

use crate::{
    error::TrainResult,
    loss::{logexp, neglogexp, weighted_logexp, weighted_neglogexp, Weighting},
    sources::{cosine, ItemSource},
};
use hyperembed_core::{numerical::derivative, DVector, TrainingConfig};
use hyperembed_manifolds::VectorSpace;
use hyperembed_optim::{GradientBuffer, ParameterStore};
use rand::{Rng, RngCore};
use std::collections::HashSet;

/// Breadth of the neighbour search for close candidates.
pub const NEIGHBORHOOD: usize = 10;

/// Similarity every candidate beats when the positive one is chosen.
pub const MIN_SIMILARITY: f64 = -10.0;

/// Close draws attempted for one candidate before drawing uniformly instead.
const MAX_CLOSE_ATTEMPTS: usize = 64;

/// One sampled training example.
#[derive(Debug, Clone, PartialEq)]
pub struct Batch {
    /// Anchor item
    pub anchor: usize,
    /// Distinct candidates, none equal to the anchor
    pub candidates: Vec<usize>,
    /// Similarity of each candidate with the anchor
    pub similarities: Vec<f64>,
    /// Distance of each candidate to the anchor when sampled
    pub distances: Vec<f64>,
    /// Position of the positive candidate in `candidates`
    pub positive: Option<usize>,
    /// Loss of the batch
    pub loss: f64,
}

impl Batch {
    /// Anchor followed by every candidate.
    pub fn touched(&self) -> impl Iterator<Item = usize> + '_ {
        std::iter::once(self.anchor).chain(self.candidates.iter().copied())
    }
}

/// Draws batches and writes their gradients.
///
/// The probability of drawing a close candidate ramps linearly from the
/// initial to the final positive ratio over `total_batches` calls.
#[derive(Debug, Clone)]
pub struct BatchMaker {
    batch_size: usize,
    initial_ratio: f64,
    max_ratio: f64,
    total_batches: u64,
    progress: u64,
    weighting: Weighting,
    alpha: f64,
    chosen: HashSet<usize>,
}

impl BatchMaker {
    /// Creates a generator for a run of `total_batches` batches.
    pub fn new(config: &TrainingConfig, total_batches: u64) -> TrainResult<Self> {
        Ok(Self {
            batch_size: config.batch_size,
            initial_ratio: config.pos_threshold,
            max_ratio: config.max_positive_ratio(),
            total_batches,
            progress: 0,
            weighting: Weighting::from_mode(config.weighting)?,
            alpha: config.alpha,
            chosen: HashSet::with_capacity(config.batch_size + 1),
        })
    }

    /// Batches drawn so far.
    pub fn progress(&self) -> u64 {
        self.progress
    }

    /// Current probability of drawing a close candidate.
    pub fn positive_ratio(&self) -> f64 {
        if self.total_batches == 0 {
            return self.initial_ratio;
        }
        let t = (self.progress as f64 / self.total_batches as f64).min(1.0);
        self.initial_ratio + t * (self.max_ratio - self.initial_ratio)
    }

    fn similarity_norm(&self, source: &ItemSource) -> f64 {
        match source {
            ItemSource::Similarities(s) => s.median_similarity(),
            ItemSource::Vectors(_) => self.alpha,
        }
    }

    /// Draws one candidate not yet chosen, with its similarity to the anchor.
    fn draw(
        &self,
        source: &ItemSource,
        anchor: usize,
        anchor_vector: Option<&DVector<f64>>,
        ratio: f64,
        rng: &mut dyn RngCore,
    ) -> (usize, f64) {
        let mut attempts = 0;
        loop {
            let close = attempts < MAX_CLOSE_ATTEMPTS && rng.gen::<f64>() <= ratio;
            attempts += 1;
            let (item, sim) = match (source, anchor_vector) {
                (ItemSource::Vectors(s), Some(query)) => {
                    let (i, v) = if close {
                        s.random_close_item(query, NEIGHBORHOOD, rng)
                    } else {
                        s.random_item(rng)
                    };
                    (i, cosine(query, v))
                }
                (ItemSource::Vectors(s), None) => {
                    let (i, _) = s.random_item(rng);
                    (i, 0.0)
                }
                (ItemSource::Similarities(s), _) => {
                    if close {
                        s.close_index(anchor, rng)
                    } else {
                        let j = s.random_index(rng);
                        (j, s.similarity(anchor, j))
                    }
                }
            };
            if !self.chosen.contains(&item) {
                return (item, sim);
            }
        }
    }

    /// Samples a batch, adds its gradients to `grads` and returns it.
    ///
    /// Distances are computed on the current parameters, each read under
    /// its slot lock.
    pub fn next_batch(
        &mut self,
        source: &ItemSource,
        store: &ParameterStore,
        grads: &mut GradientBuffer,
        rng: &mut dyn RngCore,
    ) -> TrainResult<Batch> {
        let ratio = self.positive_ratio();
        self.progress += 1;

        let (anchor, anchor_vector) = match source {
            ItemSource::Vectors(s) => {
                let (i, v) = s.random_item(rng);
                (i, Some(v))
            }
            ItemSource::Similarities(s) => (s.random_index(rng), None),
        };
        self.chosen.clear();
        self.chosen.insert(anchor);

        let count = self.batch_size.min(source.len().saturating_sub(1));
        let mut candidates = Vec::with_capacity(count);
        let mut similarities = Vec::with_capacity(count);
        let mut best_index = 0;
        let mut best = MIN_SIMILARITY;
        for k in 0..count {
            let (item, sim) = self.draw(source, anchor, anchor_vector, ratio, rng);
            self.chosen.insert(item);
            candidates.push(item);
            similarities.push(sim);
            if sim > best {
                best = sim;
                best_index = k;
            }
        }
        let positive = (count > 0).then_some(best_index);

        let space = store.space();
        let anchor_param = store.param(anchor)?;
        let mut params = Vec::with_capacity(count);
        let mut distances = Vec::with_capacity(count);
        for &c in &candidates {
            let p = store.param(c)?;
            distances.push(space.dist(&anchor_param, &p));
            params.push(p);
        }

        let cumulative_negative = 1.0
            + similarities
                .iter()
                .enumerate()
                .filter(|&(k, _)| Some(k) != positive)
                .map(|(_, s)| s)
                .sum::<f64>();
        let norm = self.similarity_norm(source);
        let negatives = count.saturating_sub(1).max(1) as f64;

        let mut loss = 0.0;
        for k in 0..count {
            let is_positive = Some(k) == positive;
            let d = distances[k];
            let (f1, f2) = self
                .weighting
                .factors(similarities[k], norm, is_positive, cumulative_negative);
            let (diff, subloss) = if is_positive {
                (
                    f1 * derivative(|x| weighted_neglogexp(x, f2), d),
                    f1 * neglogexp(d * f2),
                )
            } else {
                (
                    f1 * derivative(|x| weighted_logexp(x, f2), d) / negatives,
                    f1 * logexp(d * f2) / negatives,
                )
            };
            if let Some((ga, gc)) = grads.pair_mut(anchor, candidates[k]) {
                space.diff_dist(&anchor_param, &params[k], ga, gc, diff);
            }
            loss += subloss;
        }

        Ok(Batch {
            anchor,
            candidates,
            similarities,
            distances,
            positive,
            loss,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sources::{SimilarityTable, VectorSource};
    use approx::assert_relative_eq;
    use hyperembed_core::ManifoldKind;
    use hyperembed_manifolds::Space;
    use rand::{rngs::SmallRng, SeedableRng};

    fn similarity_source(n: usize) -> ItemSource {
        let mut triples = Vec::new();
        for i in 0..n {
            for j in 0..n {
                if i != j {
                    let score = 1.0 / (1.0 + (i as f64 - j as f64).abs());
                    triples.push((format!("n{i}"), format!("n{j}"), score));
                }
            }
        }
        SimilarityTable::from_triples(triples, n, true).unwrap().into()
    }

    fn store(n: usize, seed: u64) -> ParameterStore {
        let space = Space::new(ManifoldKind::Poincare, 3, 1.0, false).unwrap();
        let mut rng = SmallRng::seed_from_u64(seed);
        let params = (0..n).map(|_| space.random_point(&mut rng)).collect();
        ParameterStore::new(space, params).unwrap()
    }

    fn config(batch_size: usize) -> TrainingConfig {
        TrainingConfig::new()
            .with_batch_size(batch_size)
            .with_positive_ratio(0.2, 0.8)
    }

    #[test]
    fn test_candidates_are_distinct_and_exclude_anchor() {
        let source = similarity_source(12);
        let store = store(12, 1);
        let mut grads = GradientBuffer::for_store(&store);
        let mut maker = BatchMaker::new(&config(5), 100).unwrap();
        let mut rng = SmallRng::seed_from_u64(2);

        for _ in 0..50 {
            let batch = maker.next_batch(&source, &store, &mut grads, &mut rng).unwrap();
            assert_eq!(batch.candidates.len(), 5);
            let unique: HashSet<usize> = batch.touched().collect();
            assert_eq!(unique.len(), 6);
            assert!(batch.loss.is_finite());
            assert!(batch.positive.is_some());
        }
    }

    #[test]
    fn test_positive_is_most_similar() {
        let source = similarity_source(8);
        let store = store(8, 3);
        let mut grads = GradientBuffer::for_store(&store);
        let mut maker = BatchMaker::new(&config(4), 10).unwrap();
        let mut rng = SmallRng::seed_from_u64(4);

        let batch = maker.next_batch(&source, &store, &mut grads, &mut rng).unwrap();
        let p = batch.positive.unwrap();
        let max = batch.similarities.iter().copied().fold(f64::MIN, f64::max);
        assert_relative_eq!(batch.similarities[p], max);
    }

    #[test]
    fn test_small_vocabulary_shrinks_batch() {
        let source = similarity_source(3);
        let store = store(3, 5);
        let mut grads = GradientBuffer::for_store(&store);
        let mut maker = BatchMaker::new(&config(10), 10).unwrap();
        let mut rng = SmallRng::seed_from_u64(6);

        let batch = maker.next_batch(&source, &store, &mut grads, &mut rng).unwrap();
        assert_eq!(batch.candidates.len(), 2);
    }

    #[test]
    fn test_positive_ratio_ramps() {
        let source = similarity_source(6);
        let store = store(6, 7);
        let mut grads = GradientBuffer::for_store(&store);
        let mut maker = BatchMaker::new(&config(2), 4).unwrap();
        let mut rng = SmallRng::seed_from_u64(8);

        assert_relative_eq!(maker.positive_ratio(), 0.2);
        for _ in 0..2 {
            maker.next_batch(&source, &store, &mut grads, &mut rng).unwrap();
        }
        assert_relative_eq!(maker.positive_ratio(), 0.5, epsilon = 1e-12);
        for _ in 0..10 {
            maker.next_batch(&source, &store, &mut grads, &mut rng).unwrap();
        }
        assert_relative_eq!(maker.positive_ratio(), 0.8, epsilon = 1e-12);
    }

    #[test]
    fn test_gradients_land_on_touched_slots() {
        let source = similarity_source(10);
        let store = store(10, 9);
        let mut grads = GradientBuffer::for_store(&store);
        let mut maker = BatchMaker::new(&config(3), 10).unwrap();
        let mut rng = SmallRng::seed_from_u64(10);

        let batch = maker.next_batch(&source, &store, &mut grads, &mut rng).unwrap();
        let touched: HashSet<usize> = batch.touched().collect();
        for i in 0..store.len() {
            let norm = grads.get(i).unwrap().norm();
            if touched.contains(&i) {
                assert!(norm > 0.0, "slot {i} has no gradient");
            } else {
                assert_eq!(norm, 0.0);
            }
        }
    }

    #[test]
    fn test_loss_matches_distances() {
        let source = similarity_source(10);
        let store = store(10, 11);
        let mut grads = GradientBuffer::for_store(&store);
        let mut maker = BatchMaker::new(&config(4), 10).unwrap();
        let mut rng = SmallRng::seed_from_u64(12);

        let batch = maker.next_batch(&source, &store, &mut grads, &mut rng).unwrap();
        let p = batch.positive.unwrap();
        let mut expected = neglogexp(batch.distances[p]);
        for (k, d) in batch.distances.iter().enumerate() {
            if k != p {
                expected += logexp(*d) / 3.0;
            }
        }
        assert_relative_eq!(batch.loss, expected, epsilon = 1e-12);
    }

    #[test]
    fn test_vector_mode_uses_cosine() {
        let vectors: Vec<DVector<f64>> = (0..6)
            .map(|i| {
                let angle = f64::from(i) * 0.5;
                DVector::from_vec(vec![angle.cos(), angle.sin()])
            })
            .collect();
        let labels = (0..6).map(|i| format!("v{i}")).collect();
        let source: ItemSource = VectorSource::from_parts(labels, vectors.clone()).unwrap().into();
        let store = store(6, 13);
        let mut grads = GradientBuffer::for_store(&store);
        let mut maker = BatchMaker::new(&config(3), 10).unwrap();
        let mut rng = SmallRng::seed_from_u64(14);

        let batch = maker.next_batch(&source, &store, &mut grads, &mut rng).unwrap();
        for (k, &c) in batch.candidates.iter().enumerate() {
            assert_relative_eq!(
                batch.similarities[k],
                cosine(&vectors[batch.anchor], &vectors[c]),
                epsilon = 1e-12
            );
        }
    }
}
