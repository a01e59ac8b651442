use std::collections::HashMap;
use std::path::PathBuf;

use async_trait::async_trait;
use parking_lot::Mutex;

use irisdb_core::{
    ActiveRecord, ErrorCode, ExternalId, FeatureExtractor, InternalId, IrisError, RecordStore,
    Result, Vector,
};

/// Record store backed by a JSON file holding an array of active records.
///
/// Stands in for the relational store the way the maintenance scripts
/// stand outside the serving process: `mark_indexed` updates the cached
/// index position in memory and `persist` writes the file back.
pub struct FileRecordStore {
    path: PathBuf,
    records: Mutex<Vec<ActiveRecord>>,
}

impl FileRecordStore {
    pub fn load(path: &str) -> Result<Self> {
        let raw = std::fs::read_to_string(path).map_err(|e| {
            IrisError::RecordStoreError(format!("failed to read {}: {}", path, e))
        })?;
        let records: Vec<ActiveRecord> = serde_json::from_str(&raw).map_err(|e| {
            IrisError::RecordStoreError(format!("failed to parse {}: {}", path, e))
        })?;
        Ok(FileRecordStore {
            path: PathBuf::from(path),
            records: Mutex::new(records),
        })
    }

    /// Write updated cached bindings back to the records file.
    pub fn persist(&self) -> Result<()> {
        let records = self.records.lock();
        let json = serde_json::to_string_pretty(&*records).map_err(|e| {
            IrisError::RecordStoreError(format!("failed to serialize records: {}", e))
        })?;
        std::fs::write(&self.path, json).map_err(|e| {
            IrisError::RecordStoreError(format!(
                "failed to write {}: {}",
                self.path.display(),
                e
            ))
        })
    }
}

#[async_trait]
impl RecordStore for FileRecordStore {
    async fn list_active_records(&self) -> Result<Vec<ActiveRecord>> {
        Ok(self.records.lock().clone())
    }

    async fn mark_indexed(&self, external_id: ExternalId, internal_id: InternalId) -> Result<()> {
        let mut records = self.records.lock();
        match records.iter_mut().find(|r| r.external_id == external_id) {
            Some(record) => {
                record.cached_internal_id = Some(internal_id);
                Ok(())
            }
            None => Err(IrisError::RecordStoreError(format!(
                "no active record with external id {}",
                external_id
            ))),
        }
    }
}

/// Extractor backed by a JSON file of precomputed feature vectors keyed
/// by asset locator. Under the inner-product metric the vectors are
/// L2-normalized on the way out, as the index expects of its callers.
pub struct FileFeatureExtractor {
    vectors: HashMap<String, Vec<f32>>,
    normalize: bool,
}

impl FileFeatureExtractor {
    pub fn load(path: &str, normalize: bool) -> Result<Self> {
        let raw = std::fs::read_to_string(path).map_err(|e| IrisError::ExtractionError {
            code: ErrorCode::ExtractionFailed,
            message: format!("failed to read {}: {}", path, e),
        })?;
        let vectors: HashMap<String, Vec<f32>> =
            serde_json::from_str(&raw).map_err(|e| IrisError::ExtractionError {
                code: ErrorCode::ExtractionFailed,
                message: format!("failed to parse {}: {}", path, e),
            })?;
        Ok(FileFeatureExtractor { vectors, normalize })
    }
}

#[async_trait]
impl FeatureExtractor for FileFeatureExtractor {
    async fn extract(&self, asset: &str) -> Result<Vec<f32>> {
        let vector = self
            .vectors
            .get(asset)
            .cloned()
            .ok_or_else(|| IrisError::ExtractionError {
                code: ErrorCode::UnreadableImage,
                message: format!("no feature vector for asset {}", asset),
            })?;
        if self.normalize {
            Ok(Vector::new(vector).normalize().data)
        } else {
            Ok(vector)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_record_store_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("records.json");
        std::fs::write(
            &path,
            r#"[{"external_id": 101, "asset": "a.jpg"},
                {"external_id": 102, "asset": "b.jpg", "cached_internal_id": 1}]"#,
        )
        .unwrap();

        let store = FileRecordStore::load(path.to_str().unwrap()).unwrap();
        let records = store.list_active_records().await.unwrap();
        assert_eq!(records.len(), 2);
        assert_eq!(records[0].cached_internal_id, None);
        assert_eq!(records[1].cached_internal_id, Some(1));

        store.mark_indexed(101, 0).await.unwrap();
        store.persist().unwrap();

        let reloaded = FileRecordStore::load(path.to_str().unwrap()).unwrap();
        let records = reloaded.list_active_records().await.unwrap();
        assert_eq!(records[0].cached_internal_id, Some(0));
    }

    #[tokio::test]
    async fn test_mark_indexed_unknown_record() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("records.json");
        std::fs::write(&path, "[]").unwrap();

        let store = FileRecordStore::load(path.to_str().unwrap()).unwrap();
        assert!(store.mark_indexed(999, 0).await.is_err());
    }

    #[tokio::test]
    async fn test_feature_extractor_lookup() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("features.json");
        std::fs::write(&path, r#"{"a.jpg": [1.0, 0.0]}"#).unwrap();

        let extractor = FileFeatureExtractor::load(path.to_str().unwrap(), false).unwrap();
        assert_eq!(extractor.extract("a.jpg").await.unwrap(), vec![1.0, 0.0]);

        let err = extractor.extract("missing.jpg").await.unwrap_err();
        assert_eq!(err.code(), ErrorCode::UnreadableImage);
    }

    #[tokio::test]
    async fn test_feature_extractor_normalizes() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("features.json");
        std::fs::write(&path, r#"{"a.jpg": [3.0, 4.0]}"#).unwrap();

        let extractor = FileFeatureExtractor::load(path.to_str().unwrap(), true).unwrap();
        let vector = extractor.extract("a.jpg").await.unwrap();
        assert!((vector[0] - 0.6).abs() < 1e-6);
        assert!((vector[1] - 0.8).abs() < 1e-6);
    }
}
