//! Text embedding files and checkpoint sinks.
//!
//! Embeddings are written in the `.vec` text format:
//!
//! ```text
//! <count> <coordinate_len> <model> <param>
//! <label> <c_1> ... <c_k>
//! ...
//! ```
//!
//! Pre-trained input vectors use the same layout without the model tag.
//! A [`CheckpointSink`] receives a [`Checkpoint`] at the end of every epoch
//! and once more when training finishes.

use crate::error::{TrainError, TrainResult};
use hyperembed_core::{DVector, TrainingConfig};
use hyperembed_manifolds::{EmbeddingTable, Space, VectorSpace};
use serde::{Deserialize, Serialize};
use std::{
    fs::File,
    io::{BufRead, BufReader, BufWriter, Write},
    path::{Path, PathBuf},
};
use tracing::{debug, info, warn};

/// Raw content of a `.vec` file.
#[derive(Debug, Clone, PartialEq)]
pub struct VectorFile {
    /// Number of coordinates per line
    pub coordinate_len: usize,
    /// Header tokens after the count and the coordinate length
    pub meta: Vec<String>,
    /// Item labels, in file order
    pub labels: Vec<String>,
    /// Item coordinates, in file order
    pub vectors: Vec<DVector<f64>>,
}

fn parse_header(line: &str) -> TrainResult<(usize, usize, Vec<String>)> {
    let mut tokens = line.split_whitespace();
    let mut number = |name: &str| -> TrainResult<usize> {
        tokens
            .next()
            .ok_or_else(|| TrainError::format(1, format!("missing {name} in header")))?
            .parse::<usize>()
            .map_err(|e| TrainError::format(1, format!("invalid {name}: {e}")))
    };
    let count = number("item count")?;
    let coordinate_len = number("coordinate length")?;
    Ok((count, coordinate_len, tokens.map(str::to_string).collect()))
}

fn parse_line(line: &str, number: usize, coordinate_len: usize) -> TrainResult<(String, DVector<f64>)> {
    let mut tokens = line.split_whitespace();
    let label = tokens
        .next()
        .ok_or_else(|| TrainError::format(number, "empty line"))?
        .to_string();
    let coords = tokens
        .map(|t| {
            t.parse::<f64>()
                .map_err(|e| TrainError::format(number, format!("invalid coordinate {t:?}: {e}")))
        })
        .collect::<TrainResult<Vec<f64>>>()?;
    if coords.len() != coordinate_len {
        return Err(TrainError::format(
            number,
            format!("expected {coordinate_len} coordinates, found {}", coords.len()),
        ));
    }
    Ok((label, DVector::from_vec(coords)))
}

/// Reads a `.vec` file, keeping at most `limit` items.
///
/// # Errors
///
/// Returns `Format` for a malformed header or line and `EmptyVocabulary`
/// when no item is read.
pub fn read_vectors<R: BufRead>(reader: R, limit: Option<usize>) -> TrainResult<VectorFile> {
    let mut lines = reader.lines();
    let header = lines.next().ok_or(TrainError::EmptyVocabulary)??;
    let (count, coordinate_len, meta) = parse_header(&header)?;
    let keep = limit.map_or(count, |l| l.min(count));

    let mut labels = Vec::with_capacity(keep);
    let mut vectors = Vec::with_capacity(keep);
    for (i, line) in lines.enumerate() {
        if labels.len() == keep {
            break;
        }
        let line = line?;
        if line.trim().is_empty() {
            continue;
        }
        let (label, v) = parse_line(&line, i + 2, coordinate_len)?;
        labels.push(label);
        vectors.push(v);
    }

    if labels.is_empty() {
        return Err(TrainError::EmptyVocabulary);
    }
    if labels.len() < keep {
        warn!(declared = count, read = labels.len(), "Vector file is shorter than its header");
    }
    debug!(items = labels.len(), coordinate_len, "Read vector file");
    Ok(VectorFile {
        coordinate_len,
        meta,
        labels,
        vectors,
    })
}

/// Writes labelled vectors under a header tagged with the space.
pub fn write_vectors<W: Write>(
    mut writer: W,
    space: &Space,
    labels: &[String],
    vectors: &[DVector<f64>],
) -> TrainResult<()> {
    writeln!(
        writer,
        "{} {} {}",
        labels.len(),
        space.coordinate_len(),
        space.header()
    )?;
    for (label, v) in labels.iter().zip(vectors) {
        writeln!(writer, "{label} {}", space.serialize(v))?;
    }
    writer.flush()?;
    Ok(())
}

/// Writes an embedding table in the `.vec` format.
pub fn write_embedding<W: Write>(writer: W, table: &EmbeddingTable) -> TrainResult<()> {
    write_vectors(writer, table.space(), table.labels(), table.vectors())
}

/// Reads an embedding table written by [`write_embedding`].
///
/// # Errors
///
/// Fails if the header does not name a known model.
pub fn read_embedding<R: BufRead>(reader: R) -> TrainResult<EmbeddingTable> {
    let file = read_vectors(reader, None)?;
    let (name, param) = match file.meta.as_slice() {
        [name, param, ..] => (
            name.as_str(),
            param
                .parse::<f64>()
                .map_err(|e| TrainError::format(1, format!("invalid model parameter: {e}")))?,
        ),
        _ => return Err(TrainError::format(1, "missing model name and parameter")),
    };
    let space = Space::from_header(name, file.coordinate_len, param)?;
    Ok(EmbeddingTable::new(space, file.labels, file.vectors)?)
}

/// Writes an embedding table to `path`.
pub fn save_embedding<P: AsRef<Path>>(path: P, table: &EmbeddingTable) -> TrainResult<()> {
    write_embedding(BufWriter::new(File::create(path)?), table)
}

/// Reads an embedding table from `path`.
pub fn load_embedding<P: AsRef<Path>>(path: P) -> TrainResult<EmbeddingTable> {
    read_embedding(BufReader::new(File::open(path)?))
}

/// State handed to a checkpoint sink.
#[derive(Debug, Clone, Copy)]
pub struct Checkpoint<'a> {
    /// Completed epochs
    pub epoch: usize,
    /// Completed optimizer steps
    pub step: u64,
    /// Whether training is over
    pub last: bool,
    /// Space of every vector
    pub space: &'a Space,
    /// Item labels
    pub labels: &'a [String],
    /// Current points
    pub params: &'a [DVector<f64>],
    /// Current momentum accumulators
    pub momenta: &'a [DVector<f64>],
}

/// Destination of training snapshots.
pub trait CheckpointSink: Send + Sync {
    /// Persists one snapshot.
    fn save(&mut self, checkpoint: &Checkpoint<'_>) -> TrainResult<()>;
}

/// Writes `<prefix>.vec` and `<prefix>.momentum.vec`.
///
/// With numbered checkpoints, intermediate snapshots go to `<prefix>.<k>.vec`
/// instead so that the whole trajectory is kept.
#[derive(Debug, Clone)]
pub struct TextCheckpointSink {
    prefix: PathBuf,
    numbered: bool,
}

impl TextCheckpointSink {
    /// Creates a sink writing next to `prefix`.
    pub fn new<P: Into<PathBuf>>(prefix: P) -> Self {
        Self {
            prefix: prefix.into(),
            numbered: false,
        }
    }

    /// Keeps every intermediate snapshot.
    pub fn with_numbered(mut self, numbered: bool) -> Self {
        self.numbered = numbered;
        self
    }

    fn path(&self, suffix: &str) -> PathBuf {
        let mut name = self.prefix.as_os_str().to_owned();
        name.push(suffix);
        PathBuf::from(name)
    }

    /// Path of the embedding file.
    pub fn embedding_path(&self) -> PathBuf {
        self.path(".vec")
    }

    /// Path of the momentum file.
    pub fn momentum_path(&self) -> PathBuf {
        self.path(".momentum.vec")
    }

    /// Path of the `k`-th numbered snapshot.
    pub fn numbered_path(&self, k: usize) -> PathBuf {
        self.path(&format!(".{k}.vec"))
    }

    fn write(path: &Path, space: &Space, labels: &[String], vectors: &[DVector<f64>]) -> TrainResult<()> {
        write_vectors(BufWriter::new(File::create(path)?), space, labels, vectors)
    }
}

impl CheckpointSink for TextCheckpointSink {
    fn save(&mut self, checkpoint: &Checkpoint<'_>) -> TrainResult<()> {
        if self.numbered && !checkpoint.last {
            let path = self.numbered_path(checkpoint.epoch);
            Self::write(&path, checkpoint.space, checkpoint.labels, checkpoint.params)?;
            debug!(path = %path.display(), "Wrote numbered checkpoint");
            return Ok(());
        }
        let path = self.embedding_path();
        Self::write(&path, checkpoint.space, checkpoint.labels, checkpoint.params)?;
        Self::write(
            &self.momentum_path(),
            checkpoint.space,
            checkpoint.labels,
            checkpoint.momenta,
        )?;
        info!(path = %path.display(), epoch = checkpoint.epoch, "Saved embedding");
        Ok(())
    }
}

/// One item of a JSON checkpoint.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JsonItem {
    /// Item label
    pub label: String,
    /// Point coordinates
    pub vector: Vec<f64>,
    /// Momentum coordinates
    pub momentum: Vec<f64>,
}

/// Self-describing checkpoint document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JsonCheckpoint {
    /// Configuration of the run that produced the snapshot
    pub config: TrainingConfig,
    /// Space header, `<model> <param>`
    pub space: String,
    /// Completed epochs
    pub epoch: usize,
    /// Completed optimizer steps
    pub step: u64,
    /// Items in vocabulary order
    pub items: Vec<JsonItem>,
}

impl JsonCheckpoint {
    /// Reads a checkpoint written by [`JsonCheckpointSink`].
    pub fn load<P: AsRef<Path>>(path: P) -> TrainResult<Self> {
        Ok(serde_json::from_reader(BufReader::new(File::open(path)?))?)
    }

    /// Rebuilds the embedding table and the momenta of the snapshot.
    pub fn into_table(self) -> TrainResult<(EmbeddingTable, Vec<DVector<f64>>)> {
        let mut header = self.space.split_whitespace();
        let name = header
            .next()
            .ok_or_else(|| TrainError::format(1, "missing model name"))?;
        let param = header
            .next()
            .ok_or_else(|| TrainError::format(1, "missing model parameter"))?
            .parse::<f64>()
            .map_err(|e| TrainError::format(1, format!("invalid model parameter: {e}")))?;
        let coordinate_len = self.items.first().map_or(0, |item| item.vector.len());
        let space = Space::from_header(name, coordinate_len, param)?;

        let mut labels = Vec::with_capacity(self.items.len());
        let mut vectors = Vec::with_capacity(self.items.len());
        let mut momenta = Vec::with_capacity(self.items.len());
        for item in self.items {
            labels.push(item.label);
            vectors.push(DVector::from_vec(item.vector));
            momenta.push(DVector::from_vec(item.momentum));
        }
        for m in &momenta {
            space.check_len(m)?;
        }
        Ok((EmbeddingTable::new(space, labels, vectors)?, momenta))
    }
}

/// Writes a [`JsonCheckpoint`] to a single file, overwriting it each time.
#[derive(Debug, Clone)]
pub struct JsonCheckpointSink {
    path: PathBuf,
    config: TrainingConfig,
}

impl JsonCheckpointSink {
    /// Creates a sink recording `config` alongside the vectors.
    pub fn new<P: Into<PathBuf>>(path: P, config: TrainingConfig) -> Self {
        Self {
            path: path.into(),
            config,
        }
    }
}

impl CheckpointSink for JsonCheckpointSink {
    fn save(&mut self, checkpoint: &Checkpoint<'_>) -> TrainResult<()> {
        let items = checkpoint
            .labels
            .iter()
            .zip(checkpoint.params)
            .zip(checkpoint.momenta)
            .map(|((label, v), m)| JsonItem {
                label: label.clone(),
                vector: v.iter().copied().collect(),
                momentum: m.iter().copied().collect(),
            })
            .collect();
        let document = JsonCheckpoint {
            config: self.config.clone(),
            space: checkpoint.space.header(),
            epoch: checkpoint.epoch,
            step: checkpoint.step,
            items,
        };
        let mut writer = BufWriter::new(File::create(&self.path)?);
        serde_json::to_writer(&mut writer, &document)?;
        writer.flush()?;
        debug!(path = %self.path.display(), epoch = checkpoint.epoch, "Wrote JSON checkpoint");
        Ok(())
    }
}

/// Snapshot kept by a [`MemorySink`].
#[derive(Debug, Clone, PartialEq)]
pub struct StoredCheckpoint {
    /// Completed epochs
    pub epoch: usize,
    /// Completed optimizer steps
    pub step: u64,
    /// Whether this was the final save
    pub last: bool,
    /// Points
    pub params: Vec<DVector<f64>>,
    /// Momenta
    pub momenta: Vec<DVector<f64>>,
}

/// Keeps every snapshot in memory.
#[derive(Debug, Clone, Default)]
pub struct MemorySink {
    snapshots: Vec<StoredCheckpoint>,
}

impl MemorySink {
    /// Creates an empty sink.
    pub fn new() -> Self {
        Self::default()
    }

    /// Every snapshot received so far.
    pub fn snapshots(&self) -> &[StoredCheckpoint] {
        &self.snapshots
    }

    /// Most recent snapshot.
    pub fn last(&self) -> Option<&StoredCheckpoint> {
        self.snapshots.last()
    }
}

impl CheckpointSink for MemorySink {
    fn save(&mut self, checkpoint: &Checkpoint<'_>) -> TrainResult<()> {
        self.snapshots.push(StoredCheckpoint {
            epoch: checkpoint.epoch,
            step: checkpoint.step,
            last: checkpoint.last,
            params: checkpoint.params.to_vec(),
            momenta: checkpoint.momenta.to_vec(),
        });
        Ok(())
    }
}

/// Discards every snapshot.
#[derive(Debug, Clone, Copy, Default)]
pub struct NullSink;

impl CheckpointSink for NullSink {
    fn save(&mut self, _checkpoint: &Checkpoint<'_>) -> TrainResult<()> {
        Ok(())
    }
}

impl<S: CheckpointSink + ?Sized> CheckpointSink for Box<S> {
    fn save(&mut self, checkpoint: &Checkpoint<'_>) -> TrainResult<()> {
        (**self).save(checkpoint)
    }
}

/// Forwards each snapshot to every sink in order, stopping at the first error.
impl<S: CheckpointSink> CheckpointSink for Vec<S> {
    fn save(&mut self, checkpoint: &Checkpoint<'_>) -> TrainResult<()> {
        self.iter_mut().try_for_each(|sink| sink.save(checkpoint))
    }
}
