//! Training orchestration.
//!
//! A run is split into epochs of `rebuild_every` optimizer steps. During an
//! epoch every worker thread owns a [`BatchMaker`], a [`GradientBuffer`] and
//! a random generator, and steps the shared [`Rsgd`] optimizer:
//!
//! ```text
//! for each epoch:
//!     workers in parallel, ceil(rebuild_every / threads) steps each:
//!         sample `sampling` batches, accumulating gradients
//!         discard and resample if the loss is NaN
//!         rsgd.step(touched slots)
//!     join workers
//!     rebuild the neighbour index (vector input only)
//!     checkpoint
//! final checkpoint
//! ```
//!
//! Early stopping raises a shared flag that workers check before every step.

use crate::{
    batch::BatchMaker,
    early_stop::EarlyStopper,
    error::{TrainError, TrainResult},
    persist::{Checkpoint, CheckpointSink},
    sources::ItemSource,
};
use hyperembed_core::{ConfigError, DVector, ManifoldError, TrainingConfig};
use hyperembed_manifolds::{EmbeddingTable, Space, VectorSpace};
use hyperembed_optim::{GradientBuffer, ParameterStore, Rsgd, RsgdConfig};
use parking_lot::Mutex;
use rand::{rngs::SmallRng, SeedableRng};
use std::{
    collections::BTreeSet,
    sync::atomic::{AtomicBool, Ordering},
    thread,
    time::{Duration, Instant},
};
use tracing::{debug, info, warn};

/// Resampling attempts for one step before it is skipped.
pub const MAX_NAN_RETRIES: usize = 100;

/// Why a training run ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TerminationReason {
    /// Every epoch ran.
    Completed,
    /// The loss trend stopped improving.
    EarlyStopped,
}

/// Summary of a training run.
#[derive(Debug, Clone, PartialEq)]
pub struct TrainingReport {
    /// Completed epochs
    pub epochs: usize,
    /// Optimizer steps taken by all workers
    pub steps: u64,
    /// Mean step loss over the last epoch
    pub final_loss: f64,
    /// Whether early stopping ended the run
    pub stopped_early: bool,
    /// Learning rate the next step would have used
    pub learning_rate: f64,
    /// Sampling rounds discarded because of a NaN loss
    pub discarded_batches: u64,
    /// Wall-clock duration
    pub duration: Duration,
    /// Why the run ended
    pub termination_reason: TerminationReason,
}

/// State shared by the workers of one epoch.
struct Shared<'a> {
    rsgd: &'a Rsgd,
    source: &'a ItemSource,
    stop: &'a AtomicBool,
    stopper: Option<&'a Mutex<EarlyStopper>>,
    sampling: usize,
    report_every: u64,
}

/// Thread-local state of one worker, kept across epochs.
struct Worker {
    id: usize,
    maker: BatchMaker,
    grads: GradientBuffer,
    rng: SmallRng,
    touched: BTreeSet<usize>,
    report_loss: f64,
    report_steps: u64,
    epoch_loss: f64,
    epoch_steps: u64,
    discarded: u64,
}

impl Worker {
    fn new(id: usize, maker: BatchMaker, grads: GradientBuffer, seed: Option<u64>) -> Self {
        let rng = seed.map_or_else(SmallRng::from_entropy, |s| {
            SmallRng::seed_from_u64(s.wrapping_add(id as u64))
        });
        Self {
            id,
            maker,
            grads,
            rng,
            touched: BTreeSet::new(),
            report_loss: 0.0,
            report_steps: 0,
            epoch_loss: 0.0,
            epoch_steps: 0,
            discarded: 0,
        }
    }

    /// Accumulates `sampling` batches. Returns `None` when every attempt
    /// produced a NaN loss.
    fn sample(&mut self, shared: &Shared<'_>) -> TrainResult<Option<f64>> {
        let store = shared.rsgd.store();
        for attempt in 0..MAX_NAN_RETRIES {
            self.touched.clear();
            let mut loss = 0.0;
            for _ in 0..shared.sampling {
                let batch = self
                    .maker
                    .next_batch(shared.source, store, &mut self.grads, &mut self.rng)?;
                self.touched.extend(batch.touched());
                loss += batch.loss / shared.sampling as f64;
            }
            if !loss.is_nan() {
                return Ok(Some(loss));
            }
            for &i in &self.touched {
                self.grads.zero(i);
            }
            self.touched.clear();
            self.discarded += 1;
            debug!(worker = self.id, attempt, "Discarding batches with NaN loss");
        }
        warn!(
            worker = self.id,
            retries = MAX_NAN_RETRIES,
            "Skipping step after repeated NaN losses"
        );
        Ok(None)
    }

    fn record(&mut self, loss: f64, shared: &Shared<'_>) {
        self.report_loss += loss;
        self.report_steps += 1;
        self.epoch_loss += loss;
        self.epoch_steps += 1;

        if let Some(stopper) = shared.stopper {
            let mut stopper = stopper.lock();
            stopper.push(loss);
            if !stopper.continue_training() && !shared.stop.swap(true, Ordering::Relaxed) {
                info!(
                    worker = self.id,
                    step = shared.rsgd.steps(),
                    best = stopper.minimum(),
                    "Loss stopped improving, stopping early"
                );
            }
        }

        if self.report_steps >= shared.report_every {
            info!(
                worker = self.id,
                step = shared.rsgd.steps(),
                loss = self.report_loss / self.report_steps as f64,
                lr = shared.rsgd.learning_rate(),
                positive_ratio = self.maker.positive_ratio(),
                "Training progress"
            );
            self.report_loss = 0.0;
            self.report_steps = 0;
        }
    }

    fn run(&mut self, shared: &Shared<'_>, iterations: u64) -> TrainResult<()> {
        for _ in 0..iterations {
            if shared.stop.load(Ordering::Relaxed) {
                break;
            }
            let Some(loss) = self.sample(shared)? else {
                continue;
            };
            shared.rsgd.step(&self.touched, &mut self.grads, self.id)?;
            self.touched.clear();
            self.record(loss, shared);
        }
        Ok(())
    }
}

/// Trains an embedding table against an item source.
#[derive(Debug)]
pub struct Trainer {
    config: TrainingConfig,
    labels: Vec<String>,
    rsgd: Rsgd,
    source: ItemSource,
    stop: AtomicBool,
    stopper: Option<Mutex<EarlyStopper>>,
}

impl Trainer {
    /// Creates a trainer starting from `table` with zero momentum.
    ///
    /// # Errors
    ///
    /// Fails on an invalid configuration, an empty table, or a table whose
    /// labels differ from the source's.
    pub fn new(config: TrainingConfig, table: EmbeddingTable, source: ItemSource) -> TrainResult<Self> {
        let store = ParameterStore::from_table(&table);
        let (_, labels, _) = table.into_parts();
        Self::with_store(config, labels, store, source)
    }

    /// Creates a trainer resuming from `table` and saved momenta.
    ///
    /// # Errors
    ///
    /// On top of the checks of [`Trainer::new`], fails with a
    /// [`ConfigError`] when the saved space differs from the configured
    /// model, dimension or curvature.
    pub fn with_momentum(
        config: TrainingConfig,
        table: EmbeddingTable,
        momenta: Vec<DVector<f64>>,
        source: ItemSource,
    ) -> TrainResult<Self> {
        config.validate()?;
        let (saved, labels, vectors) = table.into_parts();
        let space = resumed_space(&config, &saved)?;
        let store = ParameterStore::with_momentum(space, vectors, momenta)?;
        Self::with_store(config, labels, store, source)
    }

    /// Creates a trainer from randomly initialized points for every item of `source`.
    pub fn random(config: TrainingConfig, source: ItemSource) -> TrainResult<Self> {
        config.validate()?;
        let space = configured_space(&config)?;
        let mut rng = config
            .seed
            .map_or_else(SmallRng::from_entropy, SmallRng::seed_from_u64);
        let table = EmbeddingTable::random(space, source.labels().to_vec(), &mut rng)?;
        Self::new(config, table, source)
    }

    fn with_store(
        config: TrainingConfig,
        labels: Vec<String>,
        store: ParameterStore,
        source: ItemSource,
    ) -> TrainResult<Self> {
        config.validate()?;
        if store.is_empty() || source.is_empty() {
            return Err(TrainError::EmptyVocabulary);
        }
        if store.len() != source.len() {
            return Err(ManifoldError::dimension_mismatch(
                format!("{} items", source.len()),
                store.len(),
            )
            .into());
        }
        if labels.as_slice() != source.labels() {
            return Err(ConfigError::invalid_value(
                "input",
                format!("{} items", source.len()),
                "embedding labels do not match the input vocabulary",
            )
            .into());
        }

        let workers = config.threads.max(1);
        let rsgd = Rsgd::with_workers(store, RsgdConfig::from_training_config(&config), workers)?;
        let stopper = config
            .early_stop
            .then(|| Mutex::new(EarlyStopper::new(config.early_stop_window)));
        Ok(Self {
            config,
            labels,
            rsgd,
            source,
            stop: AtomicBool::new(false),
            stopper,
        })
    }

    /// Run configuration.
    pub fn config(&self) -> &TrainingConfig {
        &self.config
    }

    /// Item labels in index order.
    pub fn labels(&self) -> &[String] {
        &self.labels
    }

    /// The optimizer and its parameters.
    pub fn optimizer(&self) -> &Rsgd {
        &self.rsgd
    }

    /// Asks the workers to stop before their next step.
    pub fn request_stop(&self) {
        self.stop.store(true, Ordering::Relaxed);
    }

    /// Copy of the current embedding.
    pub fn snapshot(&self) -> TrainResult<EmbeddingTable> {
        let store = self.rsgd.store();
        Ok(EmbeddingTable::new(
            *store.space(),
            self.labels.clone(),
            store.snapshot(),
        )?)
    }

    /// Consumes the trainer, returning the embedding and its momenta.
    pub fn into_parts(self) -> TrainResult<(EmbeddingTable, Vec<DVector<f64>>)> {
        let store = self.rsgd.into_store();
        let space = *store.space();
        let (params, momenta) = store.into_parts();
        Ok((EmbeddingTable::new(space, self.labels, params)?, momenta))
    }

    fn checkpoint(&self, sink: &mut dyn CheckpointSink, epoch: usize, last: bool) -> TrainResult<()> {
        let store = self.rsgd.store();
        let params = store.snapshot();
        let momenta = store.momentum_snapshot();
        sink.save(&Checkpoint {
            epoch,
            step: self.rsgd.steps(),
            last,
            space: store.space(),
            labels: &self.labels,
            params: &params,
            momenta: &momenta,
        })
    }

    fn run_epoch(&self, workers: &mut [Worker], iterations: u64) -> TrainResult<()> {
        let report_every = (self.config.effective_report_every() / workers.len() as u64).max(1);
        let shared = Shared {
            rsgd: &self.rsgd,
            source: &self.source,
            stop: &self.stop,
            stopper: self.stopper.as_ref(),
            sampling: self.config.sampling,
            report_every,
        };

        if self.config.threads == 0 {
            return workers
                .iter_mut()
                .try_for_each(|worker| worker.run(&shared, iterations));
        }

        thread::scope(|scope| {
            let handles: Vec<_> = workers
                .iter_mut()
                .map(|worker| {
                    let shared = &shared;
                    scope.spawn(move || worker.run(shared, iterations))
                })
                .collect();
            handles
                .into_iter()
                .map(|handle| handle.join().unwrap_or_else(|e| std::panic::resume_unwind(e)))
                .collect::<TrainResult<Vec<()>>>()
        })?;
        Ok(())
    }

    /// Runs every epoch, checkpointing into `sink` after each of them and
    /// once more at the end.
    pub fn train(&mut self, sink: &mut dyn CheckpointSink) -> TrainResult<TrainingReport> {
        let started = Instant::now();
        let epoch_steps = self.config.effective_rebuild_every();
        let epochs = if epoch_steps == 0 {
            0
        } else {
            self.config.niter / epoch_steps
        };
        let threads = self.config.threads;
        let per_worker = if threads == 0 {
            epoch_steps
        } else {
            epoch_steps.div_ceil(threads as u64)
        };
        let total_batches = per_worker * epochs * self.config.sampling as u64;

        let mut workers = (0..threads.max(1))
            .map(|id| {
                Ok(Worker::new(
                    id,
                    BatchMaker::new(&self.config, total_batches)?,
                    GradientBuffer::for_store(self.rsgd.store()),
                    self.config.seed,
                ))
            })
            .collect::<TrainResult<Vec<_>>>()?;

        info!(
            items = self.labels.len(),
            space = %self.rsgd.store().space().header(),
            epochs,
            steps_per_worker = per_worker,
            workers = workers.len(),
            "Starting training"
        );

        let mut completed = 0;
        let mut final_loss = f64::NAN;
        for _ in 0..epochs {
            if self.stop.load(Ordering::Relaxed) {
                break;
            }
            self.run_epoch(&mut workers, per_worker)?;
            completed += 1;

            let steps: u64 = workers.iter().map(|w| w.epoch_steps).sum();
            if steps > 0 {
                final_loss = workers.iter().map(|w| w.epoch_loss).sum::<f64>() / steps as f64;
            }
            for w in &mut workers {
                w.epoch_loss = 0.0;
                w.epoch_steps = 0;
            }
            info!(
                epoch = completed,
                epochs,
                loss = final_loss,
                lr = self.rsgd.learning_rate(),
                steps = self.rsgd.steps(),
                "Epoch finished"
            );

            if matches!(self.source, ItemSource::Vectors(_)) {
                info!("Rebuilding neighbour index");
                self.source.rebuild_index();
            }
            self.checkpoint(sink, completed, false)?;
        }
        self.checkpoint(sink, completed, true)?;

        let stopped_early = self.stopper.is_some() && self.stop.load(Ordering::Relaxed);
        let report = TrainingReport {
            epochs: completed,
            steps: self.rsgd.steps(),
            final_loss,
            stopped_early,
            learning_rate: self.rsgd.learning_rate(),
            discarded_batches: workers.iter().map(|w| w.discarded).sum(),
            duration: started.elapsed(),
            termination_reason: if stopped_early {
                TerminationReason::EarlyStopped
            } else {
                TerminationReason::Completed
            },
        };
        info!(
            epochs = report.epochs,
            steps = report.steps,
            loss = report.final_loss,
            elapsed = ?report.duration,
            "Training finished"
        );
        Ok(report)
    }
}

fn configured_space(config: &TrainingConfig) -> TrainResult<Space> {
    Ok(Space::new(
        config.manifold,
        config.dim,
        config.curvature,
        config.lorentzian_distance,
    )?)
}

/// The configured space, provided the saved one has the same model,
/// coordinate length and header parameter. Saved files do not record the
/// Lorentzian distance flag, so it is taken from the configuration.
fn resumed_space(config: &TrainingConfig, saved: &Space) -> TrainResult<Space> {
    let expected = configured_space(config)?;
    let (a, b) = (saved.header_param(), expected.header_param());
    let same = saved.kind() == expected.kind()
        && saved.coordinate_len() == expected.coordinate_len()
        && (a - b).abs() <= f64::EPSILON * a.abs().max(b.abs()).max(1.0);
    if !same {
        return Err(ConfigError::invalid_value(
            "manifold",
            format!("{} ({} coordinates)", saved.header(), saved.coordinate_len()),
            format!(
                "saved embedding does not match the configured {} ({} coordinates)",
                expected.header(),
                expected.coordinate_len()
            ),
        )
        .into());
    }
    Ok(expected)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{persist::MemorySink, sources::SimilarityTable};
    use hyperembed_core::ManifoldKind;

    fn source(n: usize) -> ItemSource {
        let triples = (0..n).map(|i| (format!("n{i}"), format!("n{}", (i + 1) % n), 1.0));
        SimilarityTable::from_triples(triples, n, true).unwrap().into()
    }

    fn config() -> TrainingConfig {
        TrainingConfig::new()
            .with_dim(2)
            .with_threads(0)
            .with_batch_size(3)
            .with_sampling(2)
            .with_niter(40)
            .with_rebuild_every(10)
            .with_seed(7)
    }

    #[test]
    fn test_labels_must_match_source() {
        let space = Space::new(ManifoldKind::Poincare, 2, 1.0, false).unwrap();
        let labels: Vec<String> = (0..5).map(|i| format!("m{i}")).collect();
        let mut rng = SmallRng::seed_from_u64(1);
        let table = EmbeddingTable::random(space, labels, &mut rng).unwrap();
        assert!(matches!(
            Trainer::new(config(), table, source(5)),
            Err(TrainError::Config(_))
        ));
    }

    #[test]
    fn test_size_mismatch_rejected() {
        let space = Space::new(ManifoldKind::Poincare, 2, 1.0, false).unwrap();
        let labels: Vec<String> = (0..4).map(|i| format!("n{i}")).collect();
        let mut rng = SmallRng::seed_from_u64(1);
        let table = EmbeddingTable::random(space, labels, &mut rng).unwrap();
        assert!(matches!(
            Trainer::new(config(), table, source(5)),
            Err(TrainError::Manifold(_))
        ));
    }

    #[test]
    fn test_resume_requires_the_configured_space() {
        let labels: Vec<String> = (0..5).map(|i| format!("n{i}")).collect();
        let resume = |space: Space| {
            let mut rng = SmallRng::seed_from_u64(2);
            let table = EmbeddingTable::random(space, labels.clone(), &mut rng).unwrap();
            let momenta = vec![space.zeros(); 5];
            Trainer::with_momentum(config(), table, momenta, source(5))
        };

        let lorentz = Space::new(ManifoldKind::Lorentz, 2, 1.0, false).unwrap();
        assert!(matches!(resume(lorentz), Err(TrainError::Config(_))));
        let wider = Space::new(ManifoldKind::Poincare, 3, 1.0, false).unwrap();
        assert!(matches!(resume(wider), Err(TrainError::Config(_))));
        let curved = Space::new(ManifoldKind::Poincare, 2, 2.0, false).unwrap();
        assert!(matches!(resume(curved), Err(TrainError::Config(_))));

        let same = Space::new(ManifoldKind::Poincare, 2, 1.0, false).unwrap();
        assert!(resume(same).is_ok());
    }

    #[test]
    fn test_similarity_mode_is_a_single_epoch() {
        let config = config().with_similarity_mode(true);
        let mut trainer = Trainer::random(config, source(6)).unwrap();
        let mut sink = MemorySink::new();
        let report = trainer.train(&mut sink).unwrap();
        assert_eq!(report.epochs, 1);
        assert_eq!(report.steps, 40);
        assert_eq!(sink.snapshots().len(), 2);
        assert!(sink.last().unwrap().last);
    }

    #[test]
    fn test_request_stop_skips_training() {
        let mut trainer = Trainer::random(config(), source(6)).unwrap();
        trainer.request_stop();
        let mut sink = MemorySink::new();
        let report = trainer.train(&mut sink).unwrap();
        assert_eq!(report.epochs, 0);
        assert_eq!(report.steps, 0);
        assert!(!report.stopped_early);
        assert_eq!(sink.snapshots().len(), 1);
    }
}
