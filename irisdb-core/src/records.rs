use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::core::errors::Result;
use crate::core::types::{ExternalId, InternalId};

/// An active (not soft-deleted) record from the authoritative store.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ActiveRecord {
    /// Record-store primary key.
    pub external_id: ExternalId,
    /// Locator for the source asset (image path or object key).
    pub asset: String,
    /// The record store's cached view of this record's index position,
    /// if it was ever indexed. Advisory; the mapping is authoritative.
    #[serde(default)]
    pub cached_internal_id: Option<InternalId>,
}

/// Boundary with the authoritative record store.
#[async_trait]
pub trait RecordStore: Send + Sync {
    /// List all active records. Soft-deleted entities are excluded.
    async fn list_active_records(&self) -> Result<Vec<ActiveRecord>>;

    /// Record a fresh external/internal binding so the store's cached
    /// view stays aligned with the mapping.
    async fn mark_indexed(&self, external_id: ExternalId, internal_id: InternalId) -> Result<()>;
}

/// Boundary with the embedding extractor.
///
/// Failures surface as `UnreadableImage` or `ExtractionFailed`; the
/// reconciler skips the record, interactive callers propagate.
#[async_trait]
pub trait FeatureExtractor: Send + Sync {
    /// Turn a source asset into a fixed-dimension feature vector.
    async fn extract(&self, asset: &str) -> Result<Vec<f32>>;
}

#[async_trait]
impl<T: RecordStore + ?Sized> RecordStore for std::sync::Arc<T> {
    async fn list_active_records(&self) -> Result<Vec<ActiveRecord>> {
        (**self).list_active_records().await
    }

    async fn mark_indexed(&self, external_id: ExternalId, internal_id: InternalId) -> Result<()> {
        (**self).mark_indexed(external_id, internal_id).await
    }
}

#[async_trait]
impl<T: FeatureExtractor + ?Sized> FeatureExtractor for std::sync::Arc<T> {
    async fn extract(&self, asset: &str) -> Result<Vec<f32>> {
        (**self).extract(asset).await
    }
}
