use crate::error::{Result, VectorStoreError};
use ndarray::{Array2, ArrayView1};
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;

pub const INDEX_SCHEMA_VERSION: u32 = 1;

/// Exact nearest-neighbour index under squared Euclidean distance.
///
/// Vectors are append-only; the row number of a vector is its position and is
/// never reused. Brute force is fine at novel scale (hundreds of chapters) and
/// keeps results exact and reproducible.
#[derive(Debug, Clone)]
pub struct SimilarityIndex {
    dimension: usize,
    vectors: Array2<f32>,
}

#[derive(Debug, Serialize, Deserialize)]
pub(crate) struct PersistedIndex {
    pub schema_version: u32,
    pub model_id: String,
    pub revision: u64,
    pub dimension: usize,
    pub len: usize,
    pub data: Vec<f32>,
}

impl SimilarityIndex {
    #[must_use]
    pub fn new(dimension: usize) -> Self {
        Self {
            dimension,
            vectors: Array2::zeros((0, dimension)),
        }
    }

    #[must_use]
    pub const fn dimension(&self) -> usize {
        self.dimension
    }

    /// Append vectors; each gets the next position. Either all vectors are
    /// appended or, on a dimension mismatch, none are.
    pub fn add(&mut self, vectors: &[Vec<f32>]) -> Result<()> {
        if let Some(bad) = vectors.iter().find(|v| v.len() != self.dimension) {
            return Err(VectorStoreError::InvalidDimension {
                expected: self.dimension,
                actual: bad.len(),
            });
        }
        for vector in vectors {
            self.vectors
                .push_row(ArrayView1::from(vector.as_slice()))
                .map_err(|e| VectorStoreError::IndexError(format!("append failed: {e}")))?;
        }
        Ok(())
    }

    /// Positions of the `k` stored vectors closest to `query`, nearest first,
    /// paired with their squared L2 distance. Equal distances keep insertion
    /// order.
    pub fn search(&self, query: &[f32], k: usize) -> Result<Vec<(usize, f32)>> {
        if query.len() != self.dimension {
            return Err(VectorStoreError::InvalidDimension {
                expected: self.dimension,
                actual: query.len(),
            });
        }
        if k == 0 || self.is_empty() {
            return Ok(Vec::new());
        }

        let mut scored: Vec<(usize, f32)> = self
            .vectors
            .outer_iter()
            .enumerate()
            .map(|(position, row)| (position, squared_l2(row, query)))
            .collect();

        scored.sort_by(|a, b| match a.1.total_cmp(&b.1) {
            Ordering::Equal => a.0.cmp(&b.0),
            other => other,
        });
        scored.truncate(k);
        Ok(scored)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.vectors.nrows()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Stored vector at `position`.
    pub fn vector(&self, position: usize) -> Result<Vec<f32>> {
        if position >= self.len() {
            return Err(VectorStoreError::OutOfRange {
                position,
                len: self.len(),
            });
        }
        Ok(self.vectors.row(position).to_vec())
    }

    pub(crate) fn to_persisted(&self, model_id: &str, revision: u64) -> PersistedIndex {
        PersistedIndex {
            schema_version: INDEX_SCHEMA_VERSION,
            model_id: model_id.to_string(),
            revision,
            dimension: self.dimension,
            len: self.len(),
            data: self.vectors.iter().copied().collect(),
        }
    }

    /// Rebuild from a persisted artifact. The error string explains what is
    /// inconsistent; callers attach the path.
    pub(crate) fn from_persisted(
        persisted: PersistedIndex,
    ) -> std::result::Result<Self, String> {
        if persisted.schema_version != INDEX_SCHEMA_VERSION {
            return Err(format!(
                "unsupported index schema_version {} (expected {INDEX_SCHEMA_VERSION})",
                persisted.schema_version
            ));
        }
        if persisted.dimension == 0 {
            return Err("index dimension is zero".to_string());
        }
        let expected = persisted.len.checked_mul(persisted.dimension);
        if expected != Some(persisted.data.len()) {
            return Err(format!(
                "index holds {} floats, expected {} x {}",
                persisted.data.len(),
                persisted.len,
                persisted.dimension
            ));
        }
        let vectors = Array2::from_shape_vec((persisted.len, persisted.dimension), persisted.data)
            .map_err(|e| format!("index shape error: {e}"))?;
        Ok(Self {
            dimension: persisted.dimension,
            vectors,
        })
    }

    /// Encode into the binary index artifact.
    pub fn to_bytes(&self, model_id: &str, revision: u64) -> Result<Vec<u8>> {
        bincode::serialize(&self.to_persisted(model_id, revision))
            .map_err(|e| VectorStoreError::IndexError(format!("index encode failed: {e}")))
    }
}

pub(crate) fn decode_index(bytes: &[u8]) -> std::result::Result<PersistedIndex, String> {
    bincode::deserialize(bytes).map_err(|e| format!("index artifact is unreadable: {e}"))
}

/// Revision stored in an index artifact, read without decoding the vectors.
pub(crate) fn index_revision(bytes: &[u8]) -> Option<u64> {
    // Leading fields of `PersistedIndex`: schema_version, model_id, revision.
    bincode::deserialize::<(u32, String, u64)>(bytes)
        .ok()
        .map(|(_, _, revision)| revision)
}

fn squared_l2(row: ArrayView1<'_, f32>, query: &[f32]) -> f32 {
    row.iter()
        .zip(query)
        .map(|(a, b)| {
            let d = a - b;
            d * d
        })
        .sum()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn index_with(vectors: &[[f32; 3]]) -> SimilarityIndex {
        let mut index = SimilarityIndex::new(3);
        let owned: Vec<Vec<f32>> = vectors.iter().map(|v| v.to_vec()).collect();
        index.add(&owned).unwrap();
        index
    }

    #[test]
    fn search_orders_by_l2_distance() {
        let index = index_with(&[[0.0, 1.0, 0.0], [1.0, 0.0, 0.0], [0.9, 0.1, 0.0]]);
        assert_eq!(index.len(), 3);

        let results = index.search(&[1.0, 0.0, 0.0], 2).unwrap();
        assert_eq!(results.len(), 2);
        assert_eq!(results[0].0, 1);
        assert!(results[0].1.abs() < 1e-6);
        assert_eq!(results[1].0, 2);
        assert!((results[1].1 - 0.02).abs() < 1e-5);
    }

    #[test]
    fn equal_distances_prefer_earlier_positions() {
        let index = index_with(&[[0.0, 0.0, 1.0], [1.0, 0.0, 0.0], [1.0, 0.0, 0.0]]);
        let results = index.search(&[1.0, 0.0, 0.0], 3).unwrap();
        let positions: Vec<usize> = results.iter().map(|(p, _)| *p).collect();
        assert_eq!(positions, vec![1, 2, 0]);

        // Mirror image: both candidates equidistant from the query.
        let index = index_with(&[[1.0, 0.0, 0.0], [-1.0, 0.0, 0.0]]);
        let results = index.search(&[0.0, 0.0, 0.0], 2).unwrap();
        assert_eq!(results[0].0, 0);
        assert_eq!(results[1].0, 1);
    }

    #[test]
    fn small_index_returns_everything_and_empty_returns_nothing() {
        let index = index_with(&[[1.0, 0.0, 0.0], [0.0, 1.0, 0.0]]);
        assert_eq!(index.search(&[0.0, 1.0, 0.0], 10).unwrap().len(), 2);
        assert!(index.search(&[0.0, 1.0, 0.0], 0).unwrap().is_empty());

        let empty = SimilarityIndex::new(3);
        assert!(empty.is_empty());
        assert!(empty.search(&[0.0, 1.0, 0.0], 5).unwrap().is_empty());
    }

    #[test]
    fn dimension_mismatch_rejects_whole_batch() {
        let mut index = SimilarityIndex::new(3);
        let err = index
            .add(&[vec![1.0, 0.0, 0.0], vec![1.0, 0.0]])
            .unwrap_err();
        assert!(matches!(
            err,
            VectorStoreError::InvalidDimension {
                expected: 3,
                actual: 2
            }
        ));
        assert!(index.is_empty());

        index.add(&[vec![1.0, 0.0, 0.0]]).unwrap();
        assert!(index.search(&[1.0, 0.0], 1).is_err());
    }

    #[test]
    fn vector_lookup_checks_range() {
        let index = index_with(&[[1.0, 2.0, 3.0]]);
        assert_eq!(index.vector(0).unwrap(), vec![1.0, 2.0, 3.0]);
        assert!(matches!(
            index.vector(1),
            Err(VectorStoreError::OutOfRange { position: 1, len: 1 })
        ));
    }

    #[test]
    fn binary_artifact_restores_identical_search_behaviour() {
        let index = index_with(&[[0.3, 0.1, 0.2], [0.9, 0.0, 0.1], [0.3, 0.1, 0.2]]);
        let bytes = index.to_bytes("lexical-v1:3", 7).unwrap();

        let persisted = decode_index(&bytes).unwrap();
        assert_eq!(persisted.revision, 7);
        assert_eq!(persisted.model_id, "lexical-v1:3");
        let restored = SimilarityIndex::from_persisted(persisted).unwrap();

        assert_eq!(restored.len(), index.len());
        for position in 0..index.len() {
            assert_eq!(restored.vector(position).unwrap(), index.vector(position).unwrap());
        }
        let query = [0.3, 0.1, 0.25];
        assert_eq!(
            restored.search(&query, 3).unwrap(),
            index.search(&query, 3).unwrap()
        );
    }

    #[test]
    fn inconsistent_artifacts_are_rejected() {
        let index = index_with(&[[1.0, 0.0, 0.0], [0.0, 1.0, 0.0]]);
        let mut persisted = index.to_persisted("m", 1);
        persisted.data.truncate(4);
        let err = SimilarityIndex::from_persisted(persisted).unwrap_err();
        assert!(err.contains("expected 2 x 3"), "unexpected error: {err}");

        assert!(decode_index(b"not an index").is_err());
    }

    #[test]
    fn revision_is_readable_from_the_header() {
        let index = index_with(&[[1.0, 0.0, 0.0]]);
        let bytes = index.to_bytes("lexical-v1:3", 42).unwrap();
        assert_eq!(index_revision(&bytes), Some(42));
        assert_eq!(index_revision(b"\x01"), None);
    }
}
