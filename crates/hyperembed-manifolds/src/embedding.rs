//! Embedding tables: labelled coordinate vectors sharing one vector space.

use crate::{
    lorentz::Hyperboloid,
    poincare::PoincareDisk,
    space::{Space, VectorSpace},
};
use hyperembed_core::{DVector, ManifoldError, Result};
use rand::Rng;
use std::collections::HashMap;
use tracing::{debug, info};

#[cfg(feature = "parallel")]
use rayon::prelude::*;

/// Ordered mapping from vocabulary index to a label and a point of `space`.
///
/// Labels are unique and every vector has the coordinate length of the space.
#[derive(Debug, Clone)]
pub struct EmbeddingTable {
    space: Space,
    labels: Vec<String>,
    index: HashMap<String, usize>,
    vectors: Vec<DVector<f64>>,
}

impl EmbeddingTable {
    /// Builds a table from labels and existing vectors.
    ///
    /// # Errors
    ///
    /// Fails if the two lists differ in length, a label is repeated or a
    /// vector has the wrong coordinate length.
    pub fn new(space: Space, labels: Vec<String>, vectors: Vec<DVector<f64>>) -> Result<Self> {
        if labels.len() != vectors.len() {
            return Err(ManifoldError::dimension_mismatch(
                format!("{} vectors", labels.len()),
                vectors.len(),
            ));
        }
        for v in &vectors {
            space.check_len(v)?;
        }
        let index = Self::build_index(&labels)?;
        Ok(Self {
            space,
            labels,
            index,
            vectors,
        })
    }

    /// Builds a table of randomly initialized points.
    ///
    /// # Errors
    ///
    /// Fails if a label is repeated.
    pub fn random<R: Rng + ?Sized>(space: Space, labels: Vec<String>, rng: &mut R) -> Result<Self> {
        let index = Self::build_index(&labels)?;
        let vectors = (0..labels.len()).map(|_| space.random_point(&mut *rng)).collect();
        debug!(items = labels.len(), space = %space.header(), "Randomly initialized embedding");
        Ok(Self {
            space,
            labels,
            index,
            vectors,
        })
    }

    fn build_index(labels: &[String]) -> Result<HashMap<String, usize>> {
        let mut index = HashMap::with_capacity(labels.len());
        for (i, label) in labels.iter().enumerate() {
            if index.insert(label.clone(), i).is_some() {
                return Err(ManifoldError::invalid_point(format!(
                    "label {label:?} appears more than once"
                )));
            }
        }
        Ok(index)
    }

    /// Vector space shared by every entry.
    pub fn space(&self) -> &Space {
        &self.space
    }

    /// Number of entries.
    pub fn len(&self) -> usize {
        self.labels.len()
    }

    /// Whether the table has no entries.
    pub fn is_empty(&self) -> bool {
        self.labels.is_empty()
    }

    /// All labels in index order.
    pub fn labels(&self) -> &[String] {
        &self.labels
    }

    /// All vectors in index order.
    pub fn vectors(&self) -> &[DVector<f64>] {
        &self.vectors
    }

    /// Label at index `i`.
    pub fn label(&self, i: usize) -> Option<&str> {
        self.labels.get(i).map(String::as_str)
    }

    /// Index of `label`.
    pub fn index_of(&self, label: &str) -> Option<usize> {
        self.index.get(label).copied()
    }

    /// Vector at index `i`.
    pub fn vector(&self, i: usize) -> Option<&DVector<f64>> {
        self.vectors.get(i)
    }

    /// Replaces all vectors, keeping labels and space.
    ///
    /// # Errors
    ///
    /// Fails on a count or coordinate length mismatch.
    pub fn replace_vectors(&mut self, vectors: Vec<DVector<f64>>) -> Result<()> {
        if vectors.len() != self.labels.len() {
            return Err(ManifoldError::dimension_mismatch(self.labels.len(), vectors.len()));
        }
        for v in &vectors {
            self.space.check_len(v)?;
        }
        self.vectors = vectors;
        Ok(())
    }

    /// Splits the table into its space, labels and vectors.
    pub fn into_parts(self) -> (Space, Vec<String>, Vec<DVector<f64>>) {
        (self.space, self.labels, self.vectors)
    }

    fn map_vectors<F>(&self, f: F) -> Vec<DVector<f64>>
    where
        F: Fn(&DVector<f64>) -> DVector<f64> + Sync + Send,
    {
        #[cfg(feature = "parallel")]
        {
            self.vectors.par_iter().map(f).collect()
        }
        #[cfg(not(feature = "parallel"))]
        {
            self.vectors.iter().map(f).collect()
        }
    }

    /// Converts a hyperboloid table to the Poincaré disk.
    ///
    /// # Errors
    ///
    /// Fails for the Poincaré stack and the flat space.
    pub fn to_poincare(&self) -> Result<Self> {
        match self.space {
            Space::Poincare(_) => {
                info!("Embedding is already in the Poincaré model");
                Ok(self.clone())
            }
            Space::Lorentz(h) => {
                let disk = PoincareDisk::new(h.dim(), h.curvature())?;
                info!(items = self.len(), "Converting Lorentz embedding to Poincaré");
                Ok(Self {
                    space: Space::Poincare(disk),
                    labels: self.labels.clone(),
                    index: self.index.clone(),
                    vectors: self.map_vectors(|x| h.to_poincare(x)),
                })
            }
            other => Err(ManifoldError::unsupported_conversion(other.name(), "Poincare")),
        }
    }

    /// Converts a Poincaré disk table to the hyperboloid.
    ///
    /// # Errors
    ///
    /// Fails for the Poincaré stack and the flat space.
    pub fn to_lorentz(&self) -> Result<Self> {
        match self.space {
            Space::Lorentz(_) => {
                info!("Embedding is already in the Lorentz model");
                Ok(self.clone())
            }
            Space::Poincare(disk) => {
                let h = Hyperboloid::new(disk.dim(), disk.curvature())?;
                info!(items = self.len(), "Converting Poincaré embedding to Lorentz");
                Ok(Self {
                    space: Space::Lorentz(h),
                    labels: self.labels.clone(),
                    index: self.index.clone(),
                    vectors: self.map_vectors(|x| h.lift_poincare(x)),
                })
            }
            other => Err(ManifoldError::unsupported_conversion(other.name(), "Lorentz")),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use hyperembed_core::ManifoldKind;
    use pretty_assertions::assert_eq;
    use rand::{rngs::SmallRng, SeedableRng};

    fn labels(n: usize) -> Vec<String> {
        (0..n).map(|i| format!("item{i}")).collect()
    }

    #[test]
    fn test_duplicate_labels_rejected() {
        let space = Space::euclidean(2);
        let result = EmbeddingTable::new(
            space,
            vec!["a".into(), "a".into()],
            vec![DVector::zeros(2), DVector::zeros(2)],
        );
        assert!(result.is_err());
    }

    #[test]
    fn test_wrong_length_rejected() {
        let space = Space::euclidean(2);
        let result = EmbeddingTable::new(space, vec!["a".into()], vec![DVector::zeros(3)]);
        assert!(matches!(result, Err(ManifoldError::DimensionMismatch { .. })));
    }

    #[test]
    fn test_lookup() {
        let mut rng = SmallRng::seed_from_u64(1);
        let space = Space::new(ManifoldKind::Poincare, 3, 1.0, false).unwrap();
        let table = EmbeddingTable::random(space, labels(4), &mut rng).unwrap();
        assert_eq!(table.len(), 4);
        assert_eq!(table.index_of("item2"), Some(2));
        assert_eq!(table.label(3), Some("item3"));
        assert!(table.vector(4).is_none());
    }

    #[test]
    fn test_conversion_round_trip() {
        let mut rng = SmallRng::seed_from_u64(3);
        let space = Space::new(ManifoldKind::Poincare, 3, 1.0, false).unwrap();
        let table = EmbeddingTable::random(space, labels(5), &mut rng).unwrap();

        let lorentz = table.to_lorentz().unwrap();
        assert_eq!(lorentz.space().coordinate_len(), 4);
        let back = lorentz.to_poincare().unwrap();
        for (a, b) in table.vectors().iter().zip(back.vectors()) {
            for j in 0..3 {
                assert_relative_eq!(a[j], b[j], epsilon = 1e-10);
            }
        }
    }

    #[test]
    fn test_conversion_with_curvature_lands_on_the_sheet() {
        let space = Space::new(ManifoldKind::Poincare, 2, 2.0, false).unwrap();
        let vectors = vec![
            DVector::from_vec(vec![0.3, 0.4]),
            DVector::from_vec(vec![-0.5, 0.1]),
            DVector::from_vec(vec![0.0, 0.0]),
        ];
        let table = EmbeddingTable::new(space, labels(3), vectors).unwrap();

        let lorentz = table.to_lorentz().unwrap();
        let Space::Lorentz(h) = lorentz.space() else {
            panic!("expected a Lorentz table");
        };
        for x in lorentz.vectors() {
            assert_relative_eq!(h.inner_product(x, x), -1.0, epsilon = 1e-10);
        }

        let back = lorentz.to_poincare().unwrap();
        for (a, b) in table.vectors().iter().zip(back.vectors()) {
            for j in 0..2 {
                assert_relative_eq!(a[j], b[j], epsilon = 1e-10);
            }
        }
    }

    #[test]
    fn test_conversion_preserves_distances() {
        let mut rng = SmallRng::seed_from_u64(5);
        let space = Space::new(ManifoldKind::Poincare, 2, 1.0, false).unwrap();
        let table = EmbeddingTable::random(space, labels(3), &mut rng).unwrap();
        let lorentz = table.to_lorentz().unwrap();
        let d_disk = table.space().dist(&table.vectors()[0], &table.vectors()[1]);
        let d_hyp = lorentz
            .space()
            .dist(&lorentz.vectors()[0], &lorentz.vectors()[1]);
        assert_relative_eq!(d_disk, d_hyp, epsilon = 1e-6);
    }

    #[test]
    fn test_stack_conversion_unsupported() {
        let mut rng = SmallRng::seed_from_u64(7);
        let space = Space::new(ManifoldKind::PoincareStack, 2, 1.0, false).unwrap();
        let table = EmbeddingTable::random(space, labels(2), &mut rng).unwrap();
        assert!(matches!(
            table.to_lorentz(),
            Err(ManifoldError::UnsupportedConversion { .. })
        ));
    }
}
