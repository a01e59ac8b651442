use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;

use crate::core::config::IndexConfig;
use crate::core::errors::{ErrorCode, IrisError, Result};
use crate::core::types::{ExternalId, InternalId};
use crate::records::{ActiveRecord, FeatureExtractor, RecordStore};
use crate::service::{AddOutcome, IndexCoordinator, Lifecycle};
use crate::vector::distance::DistanceMetric;

/// Record store backed by an in-memory listing; captures `mark_indexed`.
#[derive(Default)]
struct MockRecordStore {
    records: Mutex<Vec<ActiveRecord>>,
    marked: Mutex<Vec<(ExternalId, InternalId)>>,
}

impl MockRecordStore {
    fn with_records(records: Vec<ActiveRecord>) -> Self {
        MockRecordStore {
            records: Mutex::new(records),
            marked: Mutex::new(Vec::new()),
        }
    }

    fn set_records(&self, records: Vec<ActiveRecord>) {
        *self.records.lock() = records;
    }
}

#[async_trait]
impl RecordStore for MockRecordStore {
    async fn list_active_records(&self) -> Result<Vec<ActiveRecord>> {
        Ok(self.records.lock().clone())
    }

    async fn mark_indexed(&self, external_id: ExternalId, internal_id: InternalId) -> Result<()> {
        self.marked.lock().push((external_id, internal_id));
        Ok(())
    }
}

/// Extractor backed by a fixed asset->vector table.
struct TableExtractor {
    vectors: HashMap<String, Vec<f32>>,
}

impl TableExtractor {
    fn new(entries: &[(&str, Vec<f32>)]) -> Self {
        TableExtractor {
            vectors: entries
                .iter()
                .map(|(k, v)| (k.to_string(), v.clone()))
                .collect(),
        }
    }

    fn empty() -> Self {
        TableExtractor {
            vectors: HashMap::new(),
        }
    }
}

#[async_trait]
impl FeatureExtractor for TableExtractor {
    async fn extract(&self, asset: &str) -> Result<Vec<f32>> {
        self.vectors
            .get(asset)
            .cloned()
            .ok_or_else(|| IrisError::ExtractionError {
                code: ErrorCode::UnreadableImage,
                message: format!("asset not found: {}", asset),
            })
    }
}

/// Extractor that stalls long enough for rebuild deadlines to fire.
struct StallingExtractor;

#[async_trait]
impl FeatureExtractor for StallingExtractor {
    async fn extract(&self, _asset: &str) -> Result<Vec<f32>> {
        tokio::time::sleep(Duration::from_secs(30)).await;
        Ok(vec![0.0; 4])
    }
}

fn test_config(dir: &std::path::Path) -> IndexConfig {
    IndexConfig {
        dim: 4,
        metric: DistanceMetric::InnerProduct,
        data_dir: dir.to_path_buf(),
    }
}

fn record(external_id: ExternalId, asset: &str) -> ActiveRecord {
    ActiveRecord {
        external_id,
        asset: asset.to_string(),
        cached_internal_id: None,
    }
}

async fn ready_coordinator(
    dir: &std::path::Path,
) -> IndexCoordinator<MockRecordStore, TableExtractor> {
    let coordinator = IndexCoordinator::new(
        &test_config(dir),
        MockRecordStore::default(),
        TableExtractor::empty(),
    )
    .unwrap();
    coordinator.initialize(None).await.unwrap();
    coordinator
}

#[tokio::test]
async fn test_initialize_empty_first_run() {
    let dir = tempfile::tempdir().unwrap();
    let coordinator = ready_coordinator(dir.path()).await;

    assert_eq!(coordinator.lifecycle(), Lifecycle::Ready);
    let info = coordinator.info().await;
    assert_eq!(info.vectors, 0);
    assert_eq!(info.dim, 4);
    assert!(!info.dirty);
}

#[tokio::test]
async fn test_add_and_search_scenario() {
    let dir = tempfile::tempdir().unwrap();
    let coordinator = ready_coordinator(dir.path()).await;

    let vectors: [(ExternalId, [f32; 4]); 3] = [
        (101, [1.0, 0.0, 0.0, 0.0]),
        (102, [0.0, 1.0, 0.0, 0.0]),
        (103, [0.9, 0.1, 0.0, 0.0]),
    ];
    for (external_id, vector) in &vectors {
        let outcome = coordinator.add(vector, *external_id).await.unwrap();
        assert!(matches!(outcome, AddOutcome::Inserted(_)));
    }
    assert_eq!(coordinator.info().await.vectors, 3);

    // Query with 102's own vector: 102 first with the max score.
    let matches = coordinator.search(&[0.0, 1.0, 0.0, 0.0], 2).await.unwrap();
    assert_eq!(matches.len(), 2);
    assert_eq!(matches[0].external_id, 102);
    assert!((matches[0].score - 1.0).abs() < 1e-6);
    assert!(matches[1].score < matches[0].score);
    assert!(matches[1].external_id == 101 || matches[1].external_id == 103);
}

#[tokio::test]
async fn test_every_added_vector_is_its_own_top_hit() {
    let dir = tempfile::tempdir().unwrap();
    let coordinator = ready_coordinator(dir.path()).await;

    let vectors: Vec<(ExternalId, Vec<f32>)> = vec![
        (1, vec![1.0, 0.0, 0.0, 0.0]),
        (2, vec![0.0, 1.0, 0.0, 0.0]),
        (3, vec![0.0, 0.0, 1.0, 0.0]),
        (4, vec![0.0, 0.0, 0.0, 1.0]),
    ];
    for (external_id, vector) in &vectors {
        coordinator.add(vector, *external_id).await.unwrap();
    }

    for (external_id, vector) in &vectors {
        let matches = coordinator.search(vector, 1).await.unwrap();
        assert_eq!(matches[0].external_id, *external_id);
    }
}

#[tokio::test]
async fn test_add_duplicate_external_id() {
    let dir = tempfile::tempdir().unwrap();
    let coordinator = ready_coordinator(dir.path()).await;

    let first = coordinator.add(&[1.0, 0.0, 0.0, 0.0], 101).await.unwrap();
    let AddOutcome::Inserted(internal) = first else {
        panic!("expected Inserted");
    };

    let second = coordinator.add(&[0.5, 0.5, 0.0, 0.0], 101).await.unwrap();
    assert_eq!(second, AddOutcome::AlreadyIndexed(internal));
    assert_eq!(coordinator.info().await.vectors, 1);
}

#[tokio::test]
async fn test_add_dimension_mismatch() {
    let dir = tempfile::tempdir().unwrap();
    let coordinator = ready_coordinator(dir.path()).await;

    let err = coordinator.add(&[1.0, 0.0], 101).await.unwrap_err();
    assert!(matches!(
        err,
        IrisError::DimensionMismatch { expected: 4, got: 2 }
    ));
    assert_eq!(coordinator.info().await.vectors, 0);
}

#[tokio::test]
async fn test_search_k_larger_than_count() {
    let dir = tempfile::tempdir().unwrap();
    let coordinator = ready_coordinator(dir.path()).await;

    coordinator.add(&[1.0, 0.0, 0.0, 0.0], 101).await.unwrap();
    coordinator.add(&[0.0, 1.0, 0.0, 0.0], 102).await.unwrap();

    let matches = coordinator.search(&[1.0, 0.0, 0.0, 0.0], 50).await.unwrap();
    assert_eq!(matches.len(), 2);
}

#[tokio::test]
async fn test_search_empty_index() {
    let dir = tempfile::tempdir().unwrap();
    let coordinator = ready_coordinator(dir.path()).await;

    let matches = coordinator.search(&[1.0, 0.0, 0.0, 0.0], 5).await.unwrap();
    assert!(matches.is_empty());
}

#[tokio::test]
async fn test_operations_rejected_before_ready() {
    let dir = tempfile::tempdir().unwrap();
    let coordinator = IndexCoordinator::new(
        &test_config(dir.path()),
        MockRecordStore::default(),
        TableExtractor::empty(),
    )
    .unwrap();

    let err = coordinator.add(&[1.0, 0.0, 0.0, 0.0], 101).await.unwrap_err();
    assert!(err.is_retryable());
    let err = coordinator.search(&[1.0, 0.0, 0.0, 0.0], 1).await.unwrap_err();
    assert!(matches!(err, IrisError::ServiceUnavailable { state: "uninitialized" }));
}

#[tokio::test]
async fn test_add_marks_record_indexed() {
    let dir = tempfile::tempdir().unwrap();
    let store = std::sync::Arc::new(MockRecordStore::default());
    let coordinator = IndexCoordinator::new(
        &test_config(dir.path()),
        store.clone(),
        TableExtractor::empty(),
    )
    .unwrap();
    coordinator.initialize(None).await.unwrap();

    coordinator.add(&[1.0, 0.0, 0.0, 0.0], 101).await.unwrap();
    assert_eq!(store.marked.lock().as_slice(), &[(101, 0)]);
}

#[tokio::test]
async fn test_state_survives_restart() {
    let dir = tempfile::tempdir().unwrap();

    {
        let coordinator = ready_coordinator(dir.path()).await;
        coordinator.add(&[1.0, 0.0, 0.0, 0.0], 101).await.unwrap();
        coordinator.add(&[0.0, 1.0, 0.0, 0.0], 102).await.unwrap();
        coordinator.shutdown().await.unwrap();
    }

    let coordinator = ready_coordinator(dir.path()).await;
    let info = coordinator.info().await;
    assert_eq!(info.vectors, 2);

    let matches = coordinator.search(&[0.0, 1.0, 0.0, 0.0], 1).await.unwrap();
    assert_eq!(matches[0].external_id, 102);

    // The id sequence must continue where it left off.
    let outcome = coordinator.add(&[0.5, 0.5, 0.0, 0.0], 103).await.unwrap();
    assert_eq!(outcome, AddOutcome::Inserted(2));
}

#[tokio::test]
async fn test_initialize_rebuilds_from_corrupt_state() {
    let dir = tempfile::tempdir().unwrap();
    std::fs::write(dir.path().join("index.bin"), b"garbage").unwrap();
    std::fs::write(dir.path().join("mapping.json"), b"{not json").unwrap();

    let store = MockRecordStore::with_records(vec![record(101, "a.jpg"), record(102, "b.jpg")]);
    let extractor = TableExtractor::new(&[
        ("a.jpg", vec![1.0, 0.0, 0.0, 0.0]),
        ("b.jpg", vec![0.0, 1.0, 0.0, 0.0]),
    ]);

    let coordinator =
        IndexCoordinator::new(&test_config(dir.path()), store, extractor).unwrap();
    coordinator.initialize(None).await.unwrap();

    assert_eq!(coordinator.info().await.vectors, 2);
    let matches = coordinator.search(&[1.0, 0.0, 0.0, 0.0], 1).await.unwrap();
    assert_eq!(matches[0].external_id, 101);
}

#[tokio::test]
async fn test_rebuild_swaps_in_new_records() {
    let dir = tempfile::tempdir().unwrap();
    let store = std::sync::Arc::new(MockRecordStore::with_records(vec![record(101, "a.jpg")]));
    let extractor = TableExtractor::new(&[
        ("a.jpg", vec![1.0, 0.0, 0.0, 0.0]),
        ("b.jpg", vec![0.0, 1.0, 0.0, 0.0]),
    ]);

    let coordinator =
        IndexCoordinator::new(&test_config(dir.path()), store.clone(), extractor).unwrap();
    coordinator.initialize(None).await.unwrap();
    assert_eq!(coordinator.info().await.vectors, 1);

    store.set_records(vec![record(101, "a.jpg"), record(102, "b.jpg")]);
    let summary = coordinator.rebuild(None).await.unwrap();
    assert_eq!(summary.indexed, 2);
    assert_eq!(coordinator.lifecycle(), Lifecycle::Ready);

    let matches = coordinator.search(&[0.0, 1.0, 0.0, 0.0], 1).await.unwrap();
    assert_eq!(matches[0].external_id, 102);
}

#[tokio::test]
async fn test_rebuild_timeout_leaves_previous_state() {
    let dir = tempfile::tempdir().unwrap();
    let store = std::sync::Arc::new(MockRecordStore::with_records(vec![record(101, "a.jpg")]));

    let coordinator =
        IndexCoordinator::new(&test_config(dir.path()), store.clone(), StallingExtractor).unwrap();
    // First run: rebuild stalls on extraction and hits the deadline.
    let err = coordinator
        .initialize(Some(Duration::from_millis(50)))
        .await
        .unwrap_err();
    assert!(matches!(err, IrisError::RebuildTimeout));
    assert_eq!(coordinator.lifecycle(), Lifecycle::Uninitialized);

    // Retry without records to index: comes up empty but Ready.
    store.set_records(vec![]);
    coordinator.initialize(None).await.unwrap();
    assert_eq!(coordinator.info().await.vectors, 0);

    // An exclusive rebuild that times out must not disturb Ready state.
    store.set_records(vec![record(101, "a.jpg")]);
    coordinator.add(&[1.0, 0.0, 0.0, 0.0], 7).await.unwrap();
    let err = coordinator
        .rebuild(Some(Duration::from_millis(50)))
        .await
        .unwrap_err();
    assert!(matches!(err, IrisError::RebuildTimeout));
    assert_eq!(coordinator.lifecycle(), Lifecycle::Ready);
    assert_eq!(coordinator.info().await.vectors, 1);
}

#[tokio::test]
async fn test_save_failure_marks_dirty_and_flush_recovers() {
    let dir = tempfile::tempdir().unwrap();
    let data_dir = dir.path().join("index");
    let coordinator = IndexCoordinator::new(
        &IndexConfig {
            dim: 4,
            metric: DistanceMetric::InnerProduct,
            data_dir: data_dir.clone(),
        },
        MockRecordStore::default(),
        TableExtractor::empty(),
    )
    .unwrap();
    coordinator.initialize(None).await.unwrap();

    // Pull the data directory out from under the save path.
    std::fs::remove_dir_all(&data_dir).unwrap();
    let outcome = coordinator.add(&[1.0, 0.0, 0.0, 0.0], 101).await.unwrap();
    assert!(matches!(outcome, AddOutcome::Inserted(0)));
    assert!(coordinator.info().await.dirty);

    // In-memory state stays authoritative while dirty.
    let matches = coordinator.search(&[1.0, 0.0, 0.0, 0.0], 1).await.unwrap();
    assert_eq!(matches[0].external_id, 101);

    std::fs::create_dir_all(&data_dir).unwrap();
    coordinator.flush().await.unwrap();
    assert!(!coordinator.info().await.dirty);
}

#[tokio::test]
async fn test_shutdown_closes_service() {
    let dir = tempfile::tempdir().unwrap();
    let coordinator = ready_coordinator(dir.path()).await;
    coordinator.add(&[1.0, 0.0, 0.0, 0.0], 101).await.unwrap();

    coordinator.shutdown().await.unwrap();
    assert_eq!(coordinator.lifecycle(), Lifecycle::Closed);

    let err = coordinator.add(&[0.0, 1.0, 0.0, 0.0], 102).await.unwrap_err();
    assert!(matches!(err, IrisError::ServiceUnavailable { state: "closed" }));
}

#[tokio::test]
async fn test_initialize_twice_rejected() {
    let dir = tempfile::tempdir().unwrap();
    let coordinator = ready_coordinator(dir.path()).await;

    let err = coordinator.initialize(None).await.unwrap_err();
    assert!(matches!(err, IrisError::ServiceUnavailable { state: "ready" }));
}

#[tokio::test]
async fn test_concurrent_searches_share_the_index() {
    let dir = tempfile::tempdir().unwrap();
    let coordinator = std::sync::Arc::new(ready_coordinator(dir.path()).await);
    for i in 0..8i64 {
        let mut vector = vec![0.0; 4];
        vector[(i % 4) as usize] = 1.0;
        coordinator.add(&vector, 100 + i).await.unwrap();
    }

    let mut handles = Vec::new();
    for i in 0..8i64 {
        let coordinator = coordinator.clone();
        handles.push(tokio::spawn(async move {
            let mut query = vec![0.0; 4];
            query[(i % 4) as usize] = 1.0;
            coordinator.search(&query, 3).await
        }));
    }
    for handle in handles {
        let matches = handle.await.unwrap().unwrap();
        assert_eq!(matches.len(), 3);
    }
}
