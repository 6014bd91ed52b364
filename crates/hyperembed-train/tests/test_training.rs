//! End-to-end training runs on small synthetic inputs.

use approx::assert_relative_eq;
use hyperembed_core::{DVector, ManifoldKind, TrainingConfig};
use hyperembed_manifolds::{EmbeddingTable, Space, VectorSpace};
use hyperembed_train::{
    ItemSource, JsonCheckpoint, JsonCheckpointSink, MemorySink, SimilarityTable,
    TerminationReason, Trainer, VectorSource,
};
use rand::{rngs::SmallRng, Rng, SeedableRng};

/// Two cliques of four items, every pair inside a clique scored 1.
fn two_cliques() -> SimilarityTable {
    let mut triples = Vec::new();
    for group in ["a", "b"] {
        for i in 0..4 {
            for j in (i + 1)..4 {
                triples.push((format!("{group}{i}"), format!("{group}{j}"), 1.0));
            }
        }
    }
    SimilarityTable::from_triples(triples, 100, true).unwrap()
}

/// A ring where every item is equally similar to its two neighbours.
fn ring(n: usize) -> SimilarityTable {
    let triples = (0..n).map(|i| (format!("n{i}"), format!("n{}", (i + 1) % n), 1.0));
    SimilarityTable::from_triples(triples, n, true).unwrap()
}

/// Pretrained vectors scattered around two opposite directions.
fn clustered_vectors(rng: &mut SmallRng) -> VectorSource {
    let mut labels = Vec::new();
    let mut vectors = Vec::new();
    for (group, sign) in [("x", 1.0), ("y", -1.0)] {
        for i in 0..6 {
            labels.push(format!("{group}{i}"));
            vectors.push(DVector::from_fn(4, |k, _| {
                let base = if k == 0 { sign } else { 0.0 };
                base + rng.gen_range(-0.2..0.2)
            }));
        }
    }
    VectorSource::from_parts(labels, vectors).unwrap()
}

fn base_config() -> TrainingConfig {
    TrainingConfig::new()
        .with_dim(2)
        .with_threads(0)
        .with_batch_size(4)
        .with_sampling(1)
        .with_plateau(0.0)
        .with_seed(11)
}

fn mean_distance(table: &EmbeddingTable, pairs: &[(usize, usize)]) -> f64 {
    let space = table.space();
    let vectors = table.vectors();
    pairs
        .iter()
        .map(|&(i, j)| space.dist(&vectors[i], &vectors[j]))
        .sum::<f64>()
        / pairs.len() as f64
}

#[test]
fn test_cliques_separate_on_poincare_disk() {
    let source: ItemSource = two_cliques().into();
    let group: Vec<bool> = source.labels().iter().map(|l| l.starts_with('a')).collect();
    assert_eq!(group.len(), 8);
    let config = base_config()
        .with_learning_rate(0.05)
        .with_positive_ratio(0.5, 0.5)
        .with_niter(3000)
        .with_similarity_mode(true);

    let mut trainer = Trainer::random(config, source).unwrap();
    let report = trainer.train(&mut MemorySink::new()).unwrap();
    assert_eq!(report.epochs, 1);
    assert_eq!(report.termination_reason, TerminationReason::Completed);
    assert!(report.final_loss.is_finite());

    let (embedding, _) = trainer.into_parts().unwrap();
    let mut intra = Vec::new();
    let mut inter = Vec::new();
    for i in 0..8 {
        for j in (i + 1)..8 {
            if group[i] == group[j] {
                intra.push((i, j));
            } else {
                inter.push((i, j));
            }
        }
    }
    let close = mean_distance(&embedding, &intra);
    let far = mean_distance(&embedding, &inter);
    assert!(close < far, "intra {close} should be below inter {far}");
}

#[test]
fn test_points_stay_inside_the_disk() {
    let config = base_config()
        .with_learning_rate(0.5)
        .with_niter(500)
        .with_similarity_mode(true);
    let mut trainer = Trainer::random(config, ring(12).into()).unwrap();
    trainer.train(&mut MemorySink::new()).unwrap();

    let (embedding, _) = trainer.into_parts().unwrap();
    for v in embedding.vectors() {
        assert!(v.iter().all(|x| x.is_finite()));
        assert!(v.norm() < 1.0);
    }
}

#[test]
fn test_lorentz_training_stays_finite() {
    let config = base_config()
        .with_manifold(ManifoldKind::Lorentz)
        .with_niter(400)
        .with_similarity_mode(true);
    let mut trainer = Trainer::random(config, ring(10).into()).unwrap();
    let report = trainer.train(&mut MemorySink::new()).unwrap();
    assert!(report.final_loss.is_finite());

    let (embedding, momenta) = trainer.into_parts().unwrap();
    assert_eq!(embedding.vectors()[0].len(), 3);
    for (v, m) in embedding.vectors().iter().zip(&momenta) {
        assert!(v.iter().chain(m.iter()).all(|x| x.is_finite()));
        // Upper sheet of the hyperboloid.
        assert!(v[0] >= 1.0);
    }
}

#[test]
fn test_threaded_steps_round_up_per_worker() {
    let config = base_config()
        .with_threads(2)
        .with_niter(41)
        .with_similarity_mode(true);
    let mut trainer = Trainer::random(config, ring(8).into()).unwrap();
    let report = trainer.train(&mut MemorySink::new()).unwrap();
    // ceil(41 / 2) steps on each of the two workers.
    assert_eq!(report.steps, 42);
    assert_eq!(trainer.optimizer().worker_steps(0), 21);
    assert_eq!(trainer.optimizer().worker_steps(1), 21);
}

#[test]
fn test_vector_mode_checkpoints_every_epoch() {
    let mut rng = SmallRng::seed_from_u64(5);
    let source = clustered_vectors(&mut rng);
    let config = base_config()
        .with_threads(3)
        .with_niter(300)
        .with_rebuild_every(100);
    let mut trainer = Trainer::random(config, source.into()).unwrap();
    let mut sink = MemorySink::new();
    let report = trainer.train(&mut sink).unwrap();

    assert_eq!(report.epochs, 3);
    assert_eq!(report.steps, 3 * 3 * 34);
    let snapshots = sink.snapshots();
    assert_eq!(snapshots.len(), 4);
    assert_eq!(
        snapshots.iter().map(|s| s.epoch).collect::<Vec<_>>(),
        vec![1, 2, 3, 3]
    );
    assert!(snapshots[..3].iter().all(|s| !s.last));
    assert!(snapshots[3].last);
    assert!(snapshots.windows(2).all(|w| w[0].step <= w[1].step));
}

#[test]
fn test_seeded_inline_runs_are_reproducible() {
    let run = || {
        let config = base_config().with_niter(200).with_similarity_mode(true);
        let mut trainer = Trainer::random(config, ring(9).into()).unwrap();
        trainer.train(&mut MemorySink::new()).unwrap();
        trainer.into_parts().unwrap().0
    };
    let first = run();
    let second = run();
    assert_eq!(first.vectors(), second.vectors());
}

#[test]
fn test_stalled_loss_stops_early() {
    // A vanishing learning rate keeps the loss stationary.
    let config = base_config()
        .with_learning_rate(1e-12)
        .with_niter(5000)
        .with_early_stop(1)
        .with_similarity_mode(true);
    let mut trainer = Trainer::random(config, ring(8).into()).unwrap();
    let mut sink = MemorySink::new();
    let report = trainer.train(&mut sink).unwrap();

    assert!(report.stopped_early);
    assert_eq!(report.termination_reason, TerminationReason::EarlyStopped);
    assert!(report.steps < 5000);
    assert!(sink.last().unwrap().last);
}

#[test]
fn test_resume_from_json_checkpoint() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("run.json");
    let config = base_config().with_niter(200).with_similarity_mode(true);

    let mut trainer = Trainer::random(config.clone(), ring(6).into()).unwrap();
    let mut sink = JsonCheckpointSink::new(&path, config.clone());
    let first = trainer.train(&mut sink).unwrap();
    let (trained, momenta) = trainer.into_parts().unwrap();

    let checkpoint = JsonCheckpoint::load(&path).unwrap();
    assert_eq!(checkpoint.step, first.steps);
    assert_eq!(checkpoint.config.niter, config.niter);
    assert_eq!(checkpoint.config.seed, config.seed);
    let (table, saved_momenta) = checkpoint.into_table().unwrap();
    assert_eq!(table.labels(), trained.labels());
    for (a, b) in table.vectors().iter().zip(trained.vectors()) {
        assert_relative_eq!(a, b, epsilon = 1e-12);
    }
    for (a, b) in saved_momenta.iter().zip(&momenta) {
        assert_relative_eq!(a, b, epsilon = 1e-12);
    }

    let resumed_config = config.with_resume(true);
    let mut resumed =
        Trainer::with_momentum(resumed_config, table, saved_momenta, ring(6).into()).unwrap();
    let report = resumed.train(&mut MemorySink::new()).unwrap();
    assert_eq!(report.steps, 200);
}

#[test]
fn test_explicit_table_is_used_as_starting_point() {
    let source: ItemSource = ring(5).into();
    let space = Space::new(ManifoldKind::Poincare, 2, 1.0, false).unwrap();
    let mut rng = SmallRng::seed_from_u64(3);
    let table = EmbeddingTable::random(space, source.labels().to_vec(), &mut rng).unwrap();
    let start = table.vectors().to_vec();

    let config = base_config().with_niter(1).with_similarity_mode(true);
    let trainer = Trainer::new(config, table, source).unwrap();
    assert_eq!(trainer.snapshot().unwrap().vectors(), start.as_slice());
}
