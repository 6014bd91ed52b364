//! Command-line parsing and end-to-end runs.

use clap::Parser;
use hyperembed::cli::{config_path, run, Cli};
use hyperembed::hyperembed_core::{ManifoldKind, TrainingConfig};
use hyperembed::hyperembed_train::{load_embedding, JsonCheckpoint};
use pretty_assertions::assert_eq;
use std::fs;
use std::path::Path;

fn parse(args: &[&str]) -> Cli {
    Cli::try_parse_from(std::iter::once("hyperembed").chain(args.iter().copied())).unwrap()
}

fn write_pairs(dir: &Path) -> std::path::PathBuf {
    let path = dir.join("pairs.csv");
    let mut text = String::new();
    for i in 0..8 {
        text.push_str(&format!("n{i},n{},1.0\n", (i + 1) % 8));
        text.push_str(&format!("n{i},n{},0.5\n", (i + 3) % 8));
    }
    fs::write(&path, text).unwrap();
    path
}

#[test]
fn test_overrides_apply_on_defaults() {
    let cli = parse(&[
        "-i", "in.csv", "-o", "out", "--similarity", "--symmetric", "-d", "5", "-t", "0",
        "--lr", "0.2", "-m", "lorentz", "--min-lr", "0.001", "--early-stop", "50", "--seed", "3",
    ]);
    let config = cli.training_config().unwrap();
    let expected = TrainingConfig {
        dim: 5,
        threads: 0,
        lr: 0.2,
        manifold: ManifoldKind::Lorentz,
        decaying_lr: true,
        min_lr: 0.001,
        similarity_mode: true,
        symmetric: true,
        early_stop: true,
        early_stop_window: 50,
        seed: Some(3),
        ..TrainingConfig::default()
    };
    assert_eq!(config, expected);
}

#[test]
fn test_options_override_the_config_file() {
    let dir = tempfile::tempdir().unwrap();
    let file = dir.path().join("run.json");
    fs::write(&file, r#"{"dim": 7, "niter": 500, "batch_size": 4, "threads": 1}"#).unwrap();

    let path = file.to_str().unwrap();
    let cli = parse(&["-i", "x", "-o", "y", "-c", path, "--niter", "900"]);
    let config = cli.training_config().unwrap();
    assert_eq!(config.dim, 7);
    assert_eq!(config.batch_size, 4);
    assert_eq!(config.niter, 900);
}

#[test]
fn test_invalid_values_fail_before_training() {
    let cli = parse(&["-i", "x", "-o", "y", "--batch-size", "1"]);
    assert!(cli.training_config().is_err());

    let cli = parse(&["-i", "x", "-o", "y", "--momentum", "1.5"]);
    assert!(cli.training_config().is_err());

    assert!(Cli::try_parse_from(["hyperembed", "-i", "x", "-o", "y", "-m", "sphere"]).is_err());
}

#[test]
fn test_similarity_run_writes_outputs_and_resumes() {
    let dir = tempfile::tempdir().unwrap();
    let input = write_pairs(dir.path());
    let prefix = dir.path().join("model");
    let json = dir.path().join("model.json");
    let args = [
        "-i",
        input.to_str().unwrap(),
        "-o",
        prefix.to_str().unwrap(),
        "--json",
        json.to_str().unwrap(),
        "--similarity",
        "--symmetric",
        "-d",
        "2",
        "-t",
        "2",
        "-n",
        "200",
        "--batch-size",
        "4",
        "--sampling",
        "2",
        "--seed",
        "1",
    ];

    let report = run(&parse(&args)).unwrap();
    assert_eq!(report.epochs, 1);
    assert_eq!(report.steps, 200);

    let embedding = load_embedding(prefix.with_extension("vec")).unwrap();
    assert_eq!(embedding.len(), 8);
    assert!(embedding.vectors().iter().all(|v| v.norm() < 1.0));
    assert!(dir.path().join("model.momentum.vec").exists());

    let recorded = TrainingConfig::from_json_file(config_path(&prefix)).unwrap();
    assert_eq!(recorded.niter, 200);
    assert!(recorded.similarity_mode);
    assert_eq!(JsonCheckpoint::load(&json).unwrap().items.len(), 8);

    let mut resumed = args.to_vec();
    resumed.push("--resume");
    let report = run(&parse(&resumed)).unwrap();
    assert_eq!(report.steps, 200);
}

#[test]
fn test_resume_rejects_a_different_space() {
    let dir = tempfile::tempdir().unwrap();
    let input = write_pairs(dir.path());
    let prefix = dir.path().join("model");
    let run_with = |dim: &str, resume: bool| {
        let mut args = vec![
            "-i",
            input.to_str().unwrap(),
            "-o",
            prefix.to_str().unwrap(),
            "--similarity",
            "-d",
            dim,
            "-t",
            "0",
            "-n",
            "20",
            "--batch-size",
            "3",
        ];
        if resume {
            args.push("--resume");
        }
        run(&parse(&args))
    };

    run_with("2", false).unwrap();
    let error = run_with("3", true).unwrap_err();
    assert!(format!("{error:#}").contains("does not match"));
    assert_eq!(run_with("2", true).unwrap().steps, 20);
}

#[test]
fn test_facade_reexports_vectors() {
    use hyperembed::hyperembed_manifolds::{Space, VectorSpace};
    use hyperembed::nalgebra::DVector;

    let space = Space::new(ManifoldKind::Poincare, 2, 1.0, false).unwrap();
    let a: DVector<f64> = DVector::from_vec(vec![0.1, 0.0]);
    assert!(space.dist(&a, &space.zeros()) > 0.0);
}

#[test]
fn test_vector_run() {
    let dir = tempfile::tempdir().unwrap();
    let input = dir.path().join("words.vec");
    let mut text = String::from("6 3\n");
    for (i, v) in ["1 0 0", "0.9 0.1 0", "0 1 0", "0.1 0.9 0", "0 0 1", "0 0.1 0.9"]
        .iter()
        .enumerate()
    {
        text.push_str(&format!("w{i} {v}\n"));
    }
    fs::write(&input, text).unwrap();
    let prefix = dir.path().join("words");

    let report = run(&parse(&[
        "-i",
        input.to_str().unwrap(),
        "-o",
        prefix.to_str().unwrap(),
        "-m",
        "stack",
        "-d",
        "2",
        "-t",
        "0",
        "-n",
        "60",
        "--rebuild-every",
        "20",
        "--batch-size",
        "3",
        "--numbered",
    ]))
    .unwrap();
    assert_eq!(report.epochs, 3);

    let embedding = load_embedding(dir.path().join("words.vec")).unwrap();
    assert_eq!(embedding.vectors()[0].len(), 4);
    for k in 1..=3 {
        assert!(dir.path().join(format!("words.{k}.vec")).exists());
    }
}
