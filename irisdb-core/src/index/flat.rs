use crate::core::errors::{IrisError, Result};
use crate::core::types::InternalId;
use crate::vector::distance::DistanceMetric;

/// Append-only exact similarity index over fixed-dimension vectors.
///
/// Vectors live in one contiguous buffer; a vector's internal id is its
/// position, so ids are dense and never reused. There is no delete or
/// update: soft-deletion is the record store's concern, and the whole
/// index is replaced wholesale by a rebuild.
#[derive(Debug, Clone)]
pub struct FlatIndex {
    dim: usize,
    metric: DistanceMetric,
    data: Vec<f32>,
}

impl FlatIndex {
    /// Create an empty index.
    pub fn new(dim: usize, metric: DistanceMetric) -> Result<Self> {
        if dim == 0 {
            return Err(IrisError::DimensionInvalid(dim));
        }
        Ok(FlatIndex {
            dim,
            metric,
            data: Vec::new(),
        })
    }

    /// Reassemble an index from persisted parts. The buffer length must be
    /// a whole number of vectors.
    pub fn from_parts(dim: usize, metric: DistanceMetric, data: Vec<f32>) -> Result<Self> {
        if dim == 0 {
            return Err(IrisError::DimensionInvalid(dim));
        }
        if data.len() % dim != 0 {
            return Err(IrisError::StorageError {
                code: crate::core::errors::ErrorCode::SnapshotFailed,
                message: format!(
                    "vector buffer length {} is not a multiple of dimension {}",
                    data.len(),
                    dim
                ),
            });
        }
        Ok(FlatIndex { dim, metric, data })
    }

    /// Append a vector, assigning the next sequential internal id.
    ///
    /// Not safe to call concurrently with another `append` or with a
    /// rebuild; the coordinator serializes writers.
    pub fn append(&mut self, vector: &[f32]) -> Result<InternalId> {
        if vector.len() != self.dim {
            return Err(IrisError::DimensionMismatch {
                expected: self.dim,
                got: vector.len(),
            });
        }
        let id = self.count() as InternalId;
        self.data.extend_from_slice(vector);
        Ok(id)
    }

    /// K-nearest-neighbor search.
    ///
    /// `k` is clamped to `count()`; an empty index yields an empty result.
    /// Ordering is by descending similarity (inner product) or ascending
    /// distance (L2), ties broken by lower internal id.
    pub fn knn(&self, query: &[f32], k: usize) -> Result<Vec<(InternalId, f32)>> {
        if query.len() != self.dim {
            return Err(IrisError::DimensionMismatch {
                expected: self.dim,
                got: query.len(),
            });
        }
        if self.count() == 0 || k == 0 {
            return Ok(Vec::new());
        }

        let mut scored: Vec<(InternalId, f32)> = self
            .data
            .chunks_exact(self.dim)
            .enumerate()
            .map(|(i, candidate)| (i as InternalId, self.metric.score(query, candidate)))
            .collect();

        if self.metric.descending() {
            scored.sort_by(|a, b| {
                b.1.partial_cmp(&a.1)
                    .unwrap_or(std::cmp::Ordering::Equal)
                    .then_with(|| a.0.cmp(&b.0))
            });
        } else {
            scored.sort_by(|a, b| {
                a.1.partial_cmp(&b.1)
                    .unwrap_or(std::cmp::Ordering::Equal)
                    .then_with(|| a.0.cmp(&b.0))
            });
        }

        scored.truncate(k.min(self.count()));
        Ok(scored)
    }

    /// Read back a stored vector by internal id.
    pub fn get(&self, id: InternalId) -> Option<&[f32]> {
        let start = (id as usize).checked_mul(self.dim)?;
        self.data.get(start..start + self.dim)
    }

    pub fn count(&self) -> usize {
        self.data.len() / self.dim
    }

    pub fn dim(&self) -> usize {
        self.dim
    }

    pub fn metric(&self) -> DistanceMetric {
        self.metric
    }

    /// The raw vector buffer, for snapshotting.
    pub fn raw_data(&self) -> &[f32] {
        &self.data
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ip_index(dim: usize) -> FlatIndex {
        FlatIndex::new(dim, DistanceMetric::InnerProduct).unwrap()
    }

    #[test]
    fn test_append_assigns_sequential_ids() {
        let mut index = ip_index(2);
        assert_eq!(index.append(&[1.0, 0.0]).unwrap(), 0);
        assert_eq!(index.append(&[0.0, 1.0]).unwrap(), 1);
        assert_eq!(index.append(&[0.5, 0.5]).unwrap(), 2);
        assert_eq!(index.count(), 3);
    }

    #[test]
    fn test_append_dimension_mismatch() {
        let mut index = ip_index(4);
        let err = index.append(&[1.0, 2.0]).unwrap_err();
        assert!(matches!(
            err,
            IrisError::DimensionMismatch { expected: 4, got: 2 }
        ));
        assert_eq!(index.count(), 0);
    }

    #[test]
    fn test_knn_empty_index_returns_empty() {
        let index = ip_index(3);
        let hits = index.knn(&[1.0, 0.0, 0.0], 5).unwrap();
        assert!(hits.is_empty());
    }

    #[test]
    fn test_knn_clamps_k() {
        let mut index = ip_index(2);
        index.append(&[1.0, 0.0]).unwrap();
        index.append(&[0.0, 1.0]).unwrap();

        let hits = index.knn(&[1.0, 0.0], 10).unwrap();
        assert_eq!(hits.len(), 2);
    }

    #[test]
    fn test_knn_inner_product_ordering() {
        let mut index = ip_index(2);
        index.append(&[1.0, 0.0]).unwrap();
        index.append(&[0.0, 1.0]).unwrap();
        index.append(&[0.9, 0.1]).unwrap();

        let hits = index.knn(&[1.0, 0.0], 3).unwrap();
        assert_eq!(hits[0].0, 0);
        assert_eq!(hits[1].0, 2);
        assert_eq!(hits[2].0, 1);
        assert!(hits[0].1 >= hits[1].1 && hits[1].1 >= hits[2].1);
    }

    #[test]
    fn test_knn_l2_ordering() {
        let mut index = FlatIndex::new(2, DistanceMetric::L2).unwrap();
        index.append(&[0.0, 0.0]).unwrap();
        index.append(&[3.0, 4.0]).unwrap();
        index.append(&[1.0, 0.0]).unwrap();

        let hits = index.knn(&[0.0, 0.0], 3).unwrap();
        assert_eq!(hits[0].0, 0);
        assert_eq!(hits[1].0, 2);
        assert_eq!(hits[2].0, 1);
        assert!(hits[0].1 <= hits[1].1 && hits[1].1 <= hits[2].1);
    }

    #[test]
    fn test_knn_tie_breaks_by_lower_id() {
        let mut index = ip_index(2);
        index.append(&[1.0, 0.0]).unwrap();
        index.append(&[1.0, 0.0]).unwrap();
        index.append(&[1.0, 0.0]).unwrap();

        let hits = index.knn(&[1.0, 0.0], 3).unwrap();
        let ids: Vec<_> = hits.iter().map(|(id, _)| *id).collect();
        assert_eq!(ids, vec![0, 1, 2]);
    }

    #[test]
    fn test_get_round_trip() {
        let mut index = ip_index(3);
        index.append(&[1.0, 2.0, 3.0]).unwrap();
        index.append(&[4.0, 5.0, 6.0]).unwrap();

        assert_eq!(index.get(1), Some(&[4.0, 5.0, 6.0][..]));
        assert_eq!(index.get(2), None);
    }

    #[test]
    fn test_from_parts_rejects_ragged_buffer() {
        let err = FlatIndex::from_parts(3, DistanceMetric::L2, vec![1.0; 7]).unwrap_err();
        assert!(matches!(err, IrisError::StorageError { .. }));
    }

    #[test]
    fn test_zero_dimension_rejected() {
        assert!(FlatIndex::new(0, DistanceMetric::L2).is_err());
    }
}
