//! Command-line front end.

use anyhow::{Context, Result};
use clap::Parser;
use hyperembed_core::{ManifoldKind, TrainingConfig};
use hyperembed_train::{
    load_embedding, read_vectors, CheckpointSink, ItemSource, JsonCheckpointSink,
    SimilarityTable, TextCheckpointSink, Trainer, TrainingReport, VectorSource,
};
use std::{
    fs::{self, File},
    io::BufReader,
    path::{Path, PathBuf},
};
use tracing::info;

/// Train hyperbolic embeddings with Riemannian SGD.
#[derive(Parser, Debug, Clone)]
#[command(name = "hyperembed", version)]
#[command(about = "Train hyperbolic embeddings with Riemannian SGD and negative sampling")]
pub struct Cli {
    /// Training input: `head,tail,score` lines with --similarity, pre-trained vectors otherwise
    #[arg(short, long)]
    pub input: PathBuf,

    /// Output prefix; writes `<prefix>.vec` and `<prefix>.momentum.vec`
    #[arg(short, long)]
    pub output: PathBuf,

    /// JSON configuration file, overridden by the options below
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    /// Also write a JSON checkpoint to this path
    #[arg(long)]
    pub json: Option<PathBuf>,

    /// Sample from a similarity table instead of pre-trained vectors
    #[arg(long)]
    pub similarity: bool,

    /// Read every similarity pair in both directions
    #[arg(long)]
    pub symmetric: bool,

    /// Vocabulary size
    #[arg(long)]
    pub nvoc: Option<usize>,

    /// Embedding dimension
    #[arg(short, long)]
    pub dim: Option<usize>,

    /// Worker threads, 0 to train on the calling thread
    #[arg(short, long)]
    pub threads: Option<usize>,

    /// Learning rate
    #[arg(long)]
    pub lr: Option<f64>,

    /// Momentum coefficient
    #[arg(long)]
    pub momentum: Option<f64>,

    /// Use Nesterov momentum
    #[arg(long)]
    pub nesterov: bool,

    /// Candidates per batch
    #[arg(long)]
    pub batch_size: Option<usize>,

    /// Batches accumulated per optimizer step
    #[arg(long)]
    pub sampling: Option<usize>,

    /// Initial probability of drawing a close candidate
    #[arg(long)]
    pub pos_threshold: Option<f64>,

    /// Final probability of drawing a close candidate
    #[arg(long)]
    pub max_pos_threshold: Option<f64>,

    /// Fraction of the run trained at a reduced rate
    #[arg(long)]
    pub plateau: Option<f64>,

    /// Optimizer steps
    #[arg(short, long)]
    pub niter: Option<u64>,

    /// Curvature of the Poincaré disk or hyperboloid
    #[arg(long)]
    pub curvature: Option<f64>,

    /// Model: poincare, stack or lorentz
    #[arg(short, long)]
    pub manifold: Option<ManifoldKind>,

    /// Measure Poincaré distances through the hyperboloid
    #[arg(long)]
    pub lorentzian: bool,

    /// Decay the learning rate linearly down to this value
    #[arg(long)]
    pub min_lr: Option<f64>,

    /// Similarity weighting mode (0-3)
    #[arg(long)]
    pub weighting: Option<u8>,

    /// Similarity normalization used by the weighting in vector mode
    #[arg(long)]
    pub alpha: Option<f64>,

    /// Steps between neighbour index rebuilds and checkpoints
    #[arg(long)]
    pub rebuild_every: Option<u64>,

    /// Steps between progress reports
    #[arg(long)]
    pub report_every: Option<u64>,

    /// Keep every intermediate checkpoint as `<prefix>.<k>.vec`
    #[arg(long)]
    pub numbered: bool,

    /// Stop once the loss averaged over windows of this size stops improving
    #[arg(long)]
    pub early_stop: Option<usize>,

    /// Continue from `<prefix>.vec` and `<prefix>.momentum.vec`
    #[arg(long)]
    pub resume: bool,

    /// Seed of the random generators
    #[arg(long)]
    pub seed: Option<u64>,
}

impl Cli {
    /// Builds the run configuration: the JSON file if any, then every option
    /// given on the command line.
    pub fn training_config(&self) -> Result<TrainingConfig> {
        let mut config = match &self.config {
            Some(path) => TrainingConfig::from_json_file(path)?,
            None => TrainingConfig::default(),
        };

        macro_rules! set {
            ($($field:ident => $target:ident),* $(,)?) => {
                $(if let Some(value) = self.$field {
                    config.$target = value;
                })*
            };
        }
        set!(
            nvoc => nvoc,
            dim => dim,
            threads => threads,
            lr => lr,
            momentum => momentum,
            batch_size => batch_size,
            sampling => sampling,
            pos_threshold => pos_threshold,
            plateau => plateau,
            niter => niter,
            curvature => curvature,
            manifold => manifold,
            min_lr => min_lr,
            weighting => weighting,
            alpha => alpha,
            rebuild_every => rebuild_every,
            report_every => report_every,
        );
        if let Some(max) = self.max_pos_threshold {
            config.max_pos_threshold = Some(max);
        }
        if let Some(window) = self.early_stop {
            config.early_stop = true;
            config.early_stop_window = window;
        }
        if self.min_lr.is_some() {
            config.decaying_lr = true;
        }
        if self.seed.is_some() {
            config.seed = self.seed;
        }
        config.similarity_mode |= self.similarity;
        config.symmetric |= self.symmetric;
        config.nesterov |= self.nesterov;
        config.lorentzian_distance |= self.lorentzian;
        config.numbered_checkpoints |= self.numbered;
        config.resume |= self.resume;

        config.validate()?;
        Ok(config)
    }

    fn source(&self, config: &TrainingConfig) -> Result<ItemSource> {
        let source = if config.similarity_mode {
            SimilarityTable::from_csv_path(&self.input, config.nvoc, config.symmetric)?.into()
        } else {
            VectorSource::from_path(&self.input, config.nvoc)?.into()
        };
        Ok(source)
    }

    fn trainer(
        &self,
        config: TrainingConfig,
        source: ItemSource,
        text: &TextCheckpointSink,
    ) -> Result<Trainer> {
        if !config.resume {
            return Ok(Trainer::random(config, source)?);
        }
        let embedding_path = text.embedding_path();
        let table = load_embedding(&embedding_path)
            .with_context(|| format!("cannot resume from {}", embedding_path.display()))?;
        let momentum_path = text.momentum_path();
        let momenta = read_vectors(BufReader::new(File::open(&momentum_path)?), None)
            .with_context(|| format!("cannot resume from {}", momentum_path.display()))?
            .vectors;
        info!(path = %embedding_path.display(), items = table.len(), "Resuming training");
        Ok(Trainer::with_momentum(config, table, momenta, source)?)
    }
}

/// Path of the configuration record written next to the outputs.
pub fn config_path(prefix: &Path) -> PathBuf {
    let mut name = prefix.as_os_str().to_owned();
    name.push(".config.json");
    PathBuf::from(name)
}

/// Loads the input, trains and writes the outputs.
pub fn run(cli: &Cli) -> Result<TrainingReport> {
    let config = cli.training_config().context("invalid configuration")?;
    let source = cli
        .source(&config)
        .with_context(|| format!("cannot read {}", cli.input.display()))?;
    let mode = if config.similarity_mode { "similarity" } else { "vectors" };
    info!(items = source.len(), mode, "Loaded training input");

    let record = config_path(&cli.output);
    fs::write(&record, config.to_json_string()?)
        .with_context(|| format!("cannot write {}", record.display()))?;

    let text = TextCheckpointSink::new(&cli.output).with_numbered(config.numbered_checkpoints);
    let mut sinks: Vec<Box<dyn CheckpointSink>> = vec![Box::new(text.clone())];
    if let Some(path) = &cli.json {
        sinks.push(Box::new(JsonCheckpointSink::new(path, config.clone())));
    }

    let mut trainer = cli.trainer(config, source, &text)?;
    Ok(trainer.train(&mut sinks)?)
}
