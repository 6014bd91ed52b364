//! Where anchors and candidates come from.
//!
//! Two kinds of input drive training:
//!
//! - a table of pre-trained vectors ([`EmbeddingSource`], implemented by
//!   [`VectorSource`]): close candidates are nearest neighbours of the
//!   anchor's pre-trained vector and similarities are cosines;
//! - a table of scored pairs ([`SimilaritySource`], implemented by
//!   [`SimilarityTable`]): close candidates are resampled proportionally to
//!   their score.
//!
//! Sources are shared read-only by every worker. Only [`EmbeddingSource::rebuild_index`]
//! takes `&mut self`, and the trainer calls it between epochs.

use crate::{
    error::{TrainError, TrainResult},
    persist::read_vectors,
};
use hyperembed_core::{constants::NUMERICAL_FLOOR, numerical::floor, DVector, ManifoldError};
use rand::{Rng, RngCore};
use std::{
    collections::{BTreeSet, HashMap},
    fs::File,
    io::{BufRead, BufReader},
    path::Path,
};
use tracing::{debug, info, warn};

#[cfg(feature = "parallel")]
use rayon::prelude::*;

/// Copies of the neighbours of an item in its resampling table.
pub const RESAMPLE_SIZE: f64 = 1000.0;

/// Items with pre-trained vectors and a nearest-neighbour index over them.
pub trait EmbeddingSource: Send + Sync {
    /// Number of items.
    fn len(&self) -> usize;

    /// Whether the source has no item.
    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Item labels in index order.
    fn labels(&self) -> &[String];

    /// Uniformly random item.
    fn random_item(&self, rng: &mut dyn RngCore) -> (usize, &DVector<f64>);

    /// Random item among the `breadth` nearest neighbours of `query`.
    fn random_close_item(
        &self,
        query: &DVector<f64>,
        breadth: usize,
        rng: &mut dyn RngCore,
    ) -> (usize, &DVector<f64>);

    /// Rebuilds the neighbour index.
    fn rebuild_index(&mut self);
}

/// Items with pairwise similarity scores.
pub trait SimilaritySource: Send + Sync {
    /// Number of items.
    fn len(&self) -> usize;

    /// Whether the source has no item.
    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Item labels in index order.
    fn labels(&self) -> &[String];

    /// Uniformly random item.
    fn random_index(&self, rng: &mut dyn RngCore) -> usize;

    /// Item drawn proportionally to its similarity with `anchor`, with that similarity.
    fn close_index(&self, anchor: usize, rng: &mut dyn RngCore) -> (usize, f64);

    /// Similarity of `i` with `j`, 0 for unrelated items.
    fn similarity(&self, i: usize, j: usize) -> f64;

    /// Median of every input score.
    fn median_similarity(&self) -> f64;
}

/// The input a trainer samples from.
pub enum ItemSource {
    /// Pre-trained vectors.
    Vectors(Box<dyn EmbeddingSource>),
    /// Scored pairs.
    Similarities(Box<dyn SimilaritySource>),
}

impl ItemSource {
    /// Number of items.
    pub fn len(&self) -> usize {
        match self {
            Self::Vectors(s) => s.len(),
            Self::Similarities(s) => s.len(),
        }
    }

    /// Whether the source has no item.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Item labels in index order.
    pub fn labels(&self) -> &[String] {
        match self {
            Self::Vectors(s) => s.labels(),
            Self::Similarities(s) => s.labels(),
        }
    }

    /// Rebuilds the neighbour index of a vector source. Similarity tables
    /// have nothing to rebuild.
    pub fn rebuild_index(&mut self) {
        if let Self::Vectors(s) = self {
            s.rebuild_index();
        }
    }
}

impl std::fmt::Debug for ItemSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Vectors(s) => write!(f, "ItemSource::Vectors({} items)", s.len()),
            Self::Similarities(s) => write!(f, "ItemSource::Similarities({} items)", s.len()),
        }
    }
}

impl From<VectorSource> for ItemSource {
    fn from(source: VectorSource) -> Self {
        Self::Vectors(Box::new(source))
    }
}

impl From<SimilarityTable> for ItemSource {
    fn from(table: SimilarityTable) -> Self {
        Self::Similarities(Box::new(table))
    }
}

/// Cosine similarity, 0 when either vector vanishes.
pub fn cosine(a: &DVector<f64>, b: &DVector<f64>) -> f64 {
    let norms = a.norm() * b.norm();
    if norms == 0.0 {
        0.0
    } else {
        a.dot(b) / norms
    }
}

/// Pre-trained vectors searched by angular distance.
///
/// The index is a unit-normalised copy of the vectors scanned exhaustively.
#[derive(Debug, Clone)]
pub struct VectorSource {
    labels: Vec<String>,
    vectors: Vec<DVector<f64>>,
    normalized: Vec<DVector<f64>>,
}

impl VectorSource {
    /// Creates a source from labels and vectors.
    ///
    /// # Errors
    ///
    /// Fails on an empty input or vectors of different lengths.
    pub fn from_parts(labels: Vec<String>, vectors: Vec<DVector<f64>>) -> TrainResult<Self> {
        if labels.is_empty() {
            return Err(TrainError::EmptyVocabulary);
        }
        if labels.len() != vectors.len() {
            return Err(ManifoldError::dimension_mismatch(labels.len(), vectors.len()).into());
        }
        let dim = vectors[0].len();
        if let Some(v) = vectors.iter().find(|v| v.len() != dim) {
            return Err(ManifoldError::dimension_mismatch(dim, v.len()).into());
        }
        let mut source = Self {
            labels,
            vectors,
            normalized: Vec::new(),
        };
        source.rebuild_index();
        Ok(source)
    }

    /// Reads at most `nvoc` vectors from a `.vec` text stream.
    pub fn from_reader<R: BufRead>(reader: R, nvoc: usize) -> TrainResult<Self> {
        let file = read_vectors(reader, Some(nvoc))?;
        info!(items = file.labels.len(), dim = file.coordinate_len, "Loaded pre-trained vectors");
        Self::from_parts(file.labels, file.vectors)
    }

    /// Reads at most `nvoc` vectors from a `.vec` file.
    pub fn from_path<P: AsRef<Path>>(path: P, nvoc: usize) -> TrainResult<Self> {
        Self::from_reader(BufReader::new(File::open(path)?), nvoc)
    }

    /// Dimension of the pre-trained vectors.
    pub fn dim(&self) -> usize {
        self.vectors[0].len()
    }

    /// Pre-trained vector of item `i`.
    pub fn vector(&self, i: usize) -> Option<&DVector<f64>> {
        self.vectors.get(i)
    }

    /// The `breadth` items closest in angle to `query`, most similar first.
    pub fn nearest(&self, query: &DVector<f64>, breadth: usize) -> Vec<usize> {
        let unit = query / floor(query.norm(), NUMERICAL_FLOOR);
        let mut scored: Vec<(f64, usize)> = self
            .normalized
            .iter()
            .enumerate()
            .map(|(i, v)| (v.dot(&unit), i))
            .collect();
        let breadth = breadth.clamp(1, scored.len());
        let descending = |a: &(f64, usize), b: &(f64, usize)| b.0.total_cmp(&a.0);
        if breadth < scored.len() {
            scored.select_nth_unstable_by(breadth - 1, descending);
            scored.truncate(breadth);
        }
        scored.sort_unstable_by(descending);
        scored.into_iter().map(|(_, i)| i).collect()
    }
}

impl EmbeddingSource for VectorSource {
    fn len(&self) -> usize {
        self.labels.len()
    }

    fn labels(&self) -> &[String] {
        &self.labels
    }

    fn random_item(&self, rng: &mut dyn RngCore) -> (usize, &DVector<f64>) {
        let i = rng.gen_range(0..self.vectors.len());
        (i, &self.vectors[i])
    }

    fn random_close_item(
        &self,
        query: &DVector<f64>,
        breadth: usize,
        rng: &mut dyn RngCore,
    ) -> (usize, &DVector<f64>) {
        let neighbours = self.nearest(query, breadth);
        let i = neighbours[rng.gen_range(0..neighbours.len())];
        (i, &self.vectors[i])
    }

    fn rebuild_index(&mut self) {
        let normalize = |v: &DVector<f64>| v / floor(v.norm(), NUMERICAL_FLOOR);
        #[cfg(feature = "parallel")]
        {
            self.normalized = self.vectors.par_iter().map(normalize).collect();
        }
        #[cfg(not(feature = "parallel"))]
        {
            self.normalized = self.vectors.iter().map(normalize).collect();
        }
        debug!(items = self.normalized.len(), "Rebuilt angular index");
    }
}

/// Scored pairs over the most frequent items of an input.
#[derive(Debug, Clone)]
pub struct SimilarityTable {
    labels: Vec<String>,
    scores: HashMap<(usize, usize), f64>,
    resamplers: Vec<Vec<usize>>,
    symmetric: bool,
    median: f64,
}

impl SimilarityTable {
    /// Builds a table from `(head, tail, score)` triples.
    ///
    /// Only the `nvoc` items appearing most often (as head or tail) are kept,
    /// ties broken by label. A pair is kept when both items are; the first
    /// score of a repeated pair wins. Each kept item gets a resampling table
    /// where every neighbour appears `ceil(1000 · sim / Σ sim)` times.
    ///
    /// # Errors
    ///
    /// Returns `EmptyVocabulary` when there is no triple or `nvoc == 0`.
    pub fn from_triples<I>(triples: I, nvoc: usize, symmetric: bool) -> TrainResult<Self>
    where
        I: IntoIterator<Item = (String, String, f64)>,
    {
        let triples: Vec<(String, String, f64)> = triples.into_iter().collect();
        if triples.is_empty() || nvoc == 0 {
            return Err(TrainError::EmptyVocabulary);
        }

        let mut counts: HashMap<&str, usize> = HashMap::new();
        for (h, t, _) in &triples {
            *counts.entry(h.as_str()).or_default() += 1;
            *counts.entry(t.as_str()).or_default() += 1;
        }
        let mut ranked: Vec<(&str, usize)> = counts.into_iter().collect();
        ranked.sort_unstable_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(b.0)));
        ranked.truncate(nvoc);

        let labels: Vec<String> = ranked.iter().map(|(l, _)| (*l).to_string()).collect();
        let index: HashMap<&str, usize> = ranked
            .iter()
            .enumerate()
            .map(|(i, (l, _))| (*l, i))
            .collect();

        let mut scores = HashMap::new();
        let mut neighbours = vec![BTreeSet::new(); labels.len()];
        for (h, t, score) in &triples {
            let (Some(&hi), Some(&ti)) = (index.get(h.as_str()), index.get(t.as_str())) else {
                continue;
            };
            scores.entry((hi, ti)).or_insert(*score);
            neighbours[hi].insert(ti);
            if symmetric {
                neighbours[ti].insert(hi);
            }
        }

        let mut all_scores: Vec<f64> = triples.iter().map(|(_, _, s)| *s).collect();
        let mid = all_scores.len() / 2;
        let (_, median, _) = all_scores.select_nth_unstable_by(mid, f64::total_cmp);
        let median = *median;

        let mut table = Self {
            labels,
            scores,
            resamplers: Vec::new(),
            symmetric,
            median,
        };
        table.resamplers = neighbours
            .iter()
            .enumerate()
            .map(|(key, ns)| table.resampler(key, ns))
            .collect();

        let isolated = table.resamplers.iter().filter(|r| r.is_empty()).count();
        if isolated > 0 {
            warn!(isolated, "Items without neighbours fall back to random sampling");
        }
        info!(
            items = table.labels.len(),
            pairs = table.scores.len(),
            median = table.median,
            "Built similarity table"
        );
        Ok(table)
    }

    fn resampler(&self, key: usize, neighbours: &BTreeSet<usize>) -> Vec<usize> {
        let total: f64 = neighbours.iter().map(|&n| self.similarity(key, n)).sum();
        let mut table = Vec::new();
        if !(total.is_finite() && total != 0.0) {
            return table;
        }
        for &n in neighbours {
            let copies = (RESAMPLE_SIZE * self.similarity(key, n) / total).ceil();
            if copies > 0.0 {
                table.extend(std::iter::repeat(n).take(copies as usize));
            }
        }
        table
    }

    /// Parses `head,tail,score` lines.
    ///
    /// # Errors
    ///
    /// Returns `Format` with the line number of a malformed line.
    pub fn from_csv_reader<R: BufRead>(reader: R, nvoc: usize, symmetric: bool) -> TrainResult<Self> {
        let mut triples = Vec::new();
        for (i, line) in reader.lines().enumerate() {
            let line = line?;
            if line.trim().is_empty() {
                continue;
            }
            let mut fields = line.split(',');
            let (Some(h), Some(t), Some(s)) = (fields.next(), fields.next(), fields.next()) else {
                return Err(TrainError::format(i + 1, "expected head,tail,score"));
            };
            let score = s
                .trim()
                .parse::<f64>()
                .map_err(|e| TrainError::format(i + 1, format!("invalid score {s:?}: {e}")))?;
            triples.push((h.trim().to_string(), t.trim().to_string(), score));
        }
        Self::from_triples(triples, nvoc, symmetric)
    }

    /// Parses a `head,tail,score` file.
    pub fn from_csv_path<P: AsRef<Path>>(path: P, nvoc: usize, symmetric: bool) -> TrainResult<Self> {
        Self::from_csv_reader(BufReader::new(File::open(path)?), nvoc, symmetric)
    }

    /// Index of `label`.
    pub fn index_of(&self, label: &str) -> Option<usize> {
        self.labels.iter().position(|l| l == label)
    }

    /// Whether pairs are looked up in both directions.
    pub fn is_symmetric(&self) -> bool {
        self.symmetric
    }

    /// Size of the resampling table of `key`.
    pub fn resampler_len(&self, key: usize) -> usize {
        self.resamplers.get(key).map_or(0, Vec::len)
    }
}

impl SimilaritySource for SimilarityTable {
    fn len(&self) -> usize {
        self.labels.len()
    }

    fn labels(&self) -> &[String] {
        &self.labels
    }

    fn random_index(&self, rng: &mut dyn RngCore) -> usize {
        rng.gen_range(0..self.labels.len())
    }

    fn close_index(&self, anchor: usize, rng: &mut dyn RngCore) -> (usize, f64) {
        let j = match self.resamplers.get(anchor) {
            Some(table) if !table.is_empty() => table[rng.gen_range(0..table.len())],
            _ => self.random_index(rng),
        };
        (j, self.similarity(anchor, j))
    }

    fn similarity(&self, i: usize, j: usize) -> f64 {
        if let Some(&s) = self.scores.get(&(i, j)) {
            s
        } else if self.symmetric {
            self.scores.get(&(j, i)).copied().unwrap_or(0.0)
        } else {
            0.0
        }
    }

    fn median_similarity(&self) -> f64 {
        self.median
    }
}
