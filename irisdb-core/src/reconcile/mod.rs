use std::collections::HashSet;

use crate::core::errors::Result;
use crate::core::types::ExternalId;
use crate::index::FlatIndex;
use crate::mapping::IdentifierMap;
use crate::records::{ActiveRecord, FeatureExtractor};
use crate::vector::distance::DistanceMetric;

/// Counts from a completed rebuild.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RebuildSummary {
    /// Records successfully embedded and indexed.
    pub indexed: usize,
    /// Records skipped (extraction failure, bad dimension, duplicate).
    pub skipped: usize,
    /// Vectors carried over from the previous index without re-embedding.
    pub reused: usize,
}

/// Divergence between the mapping and the authoritative record set.
///
/// "Extra in map" is expected under soft-deletion; growing unexplained
/// divergence signals an operational bug.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DivergenceReport {
    /// Active records that were never indexed.
    pub never_indexed: Vec<ExternalId>,
    /// Indexed external ids whose authoritative record is gone.
    pub unknown_to_records: Vec<ExternalId>,
}

impl DivergenceReport {
    pub fn is_aligned(&self) -> bool {
        self.never_indexed.is_empty() && self.unknown_to_records.is_empty()
    }
}

/// Rebuilds the index/mapping pair from the authoritative record store
/// and audits divergence between the two.
pub struct Reconciler {
    dim: usize,
    metric: DistanceMetric,
}

impl Reconciler {
    pub fn new(dim: usize, metric: DistanceMetric) -> Self {
        Reconciler { dim, metric }
    }

    /// Rebuild a fresh index and mapping from the active record set.
    ///
    /// Records are processed in ascending external-id order so repeated
    /// rebuilds over an unchanged set produce identical mappings. A
    /// record whose cached internal id still agrees with the previous
    /// mapping has its vector copied over instead of re-embedded.
    /// Per-record failures are logged and skipped; they never abort the
    /// rebuild.
    pub async fn rebuild_from_records(
        &self,
        records: &[ActiveRecord],
        extractor: &dyn FeatureExtractor,
        previous: Option<(&FlatIndex, &IdentifierMap)>,
    ) -> Result<(FlatIndex, IdentifierMap, RebuildSummary)> {
        let mut ordered: Vec<&ActiveRecord> = records.iter().collect();
        ordered.sort_by_key(|r| r.external_id);

        let mut index = FlatIndex::new(self.dim, self.metric)?;
        let mut map = IdentifierMap::new();
        let mut summary = RebuildSummary::default();

        for record in ordered {
            if map.reverse_lookup(record.external_id).is_ok() {
                tracing::warn!(
                    external_id = record.external_id,
                    "duplicate external id in record listing, skipping"
                );
                summary.skipped += 1;
                continue;
            }

            let (vector, reused) = match self.resolve_vector(record, extractor, previous).await {
                Ok(resolved) => resolved,
                Err(e) => {
                    tracing::warn!(
                        external_id = record.external_id,
                        asset = %record.asset,
                        error = %e,
                        "skipping record during rebuild"
                    );
                    summary.skipped += 1;
                    continue;
                }
            };

            if vector.len() != self.dim {
                tracing::warn!(
                    external_id = record.external_id,
                    expected = self.dim,
                    got = vector.len(),
                    "extracted vector has wrong dimension, skipping"
                );
                summary.skipped += 1;
                continue;
            }

            let internal = map.advance();
            let appended = index.append(&vector)?;
            debug_assert_eq!(appended, internal);
            map.bind(internal, record.external_id)?;
            summary.indexed += 1;
            if reused {
                summary.reused += 1;
            }
        }

        if summary.indexed == 0 && !records.is_empty() {
            tracing::warn!(
                records = records.len(),
                skipped = summary.skipped,
                "rebuild indexed zero records"
            );
        } else {
            tracing::info!(
                indexed = summary.indexed,
                skipped = summary.skipped,
                reused = summary.reused,
                "rebuild complete"
            );
        }

        map.check_invariants(index.count())?;
        Ok((index, map, summary))
    }

    /// Reuse the previously stored vector when the record's cached
    /// binding still agrees with the previous mapping; otherwise
    /// re-embed from the source asset.
    async fn resolve_vector(
        &self,
        record: &ActiveRecord,
        extractor: &dyn FeatureExtractor,
        previous: Option<(&FlatIndex, &IdentifierMap)>,
    ) -> Result<(Vec<f32>, bool)> {
        if let (Some((prev_index, prev_map)), Some(cached)) = (previous, record.cached_internal_id)
        {
            let binding_agrees = prev_map
                .translate(cached)
                .map_or(false, |external| external == record.external_id);
            if binding_agrees && prev_index.dim() == self.dim {
                if let Some(vector) = prev_index.get(cached) {
                    return Ok((vector.to_vec(), true));
                }
            }
        }
        let vector = extractor.extract(&record.asset).await?;
        Ok((vector, false))
    }

    /// Compare the mapping's external-id set against the active record
    /// set without mutating either.
    pub fn audit_consistency(
        map: &IdentifierMap,
        records: &[ActiveRecord],
    ) -> DivergenceReport {
        let record_ids: HashSet<ExternalId> = records.iter().map(|r| r.external_id).collect();
        let mapped_ids: HashSet<ExternalId> = map.external_ids().into_iter().collect();

        let mut never_indexed: Vec<ExternalId> =
            record_ids.difference(&mapped_ids).copied().collect();
        let mut unknown_to_records: Vec<ExternalId> =
            mapped_ids.difference(&record_ids).copied().collect();
        never_indexed.sort_unstable();
        unknown_to_records.sort_unstable();

        DivergenceReport {
            never_indexed,
            unknown_to_records,
        }
    }
}
