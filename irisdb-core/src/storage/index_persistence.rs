use std::fs::{self, File};
use std::io::{BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::core::errors::{ErrorCode, IrisError, Result};
use crate::core::types::{ExternalId, InternalId};
use crate::index::FlatIndex;
use crate::mapping::IdentifierMap;
use crate::vector::distance::DistanceMetric;

/// On-disk format version; both artifacts must carry the same value.
pub const FORMAT_VERSION: u32 = 1;

const INDEX_FILE: &str = "index.bin";
const MAPPING_FILE: &str = "mapping.json";

/// Serializable flat-index snapshot.
#[derive(Debug, Serialize, Deserialize)]
struct FlatSnapshot {
    version: u32,
    dim: usize,
    metric: DistanceMetric,
    data: Vec<f32>,
}

/// Serializable mapping file: `next_internal_id` plus the forward table
/// as an ordered sequence of `(internal, external)` pairs, ascending and
/// gap-free. The reverse table is derived on load; the gap-free ordering
/// is itself a load-time integrity check.
#[derive(Debug, Serialize, Deserialize)]
struct MappingFile {
    version: u32,
    next_internal_id: InternalId,
    entries: Vec<(InternalId, ExternalId)>,
}

/// Outcome of loading persisted state.
///
/// `NotFound` and `Corrupt` both route the caller to the reconciler's
/// full-rebuild path; neither is a crash.
#[derive(Debug)]
pub enum LoadOutcome {
    Loaded(FlatIndex, IdentifierMap),
    NotFound,
    Corrupt(String),
}

/// Index persistence manager.
///
/// The index snapshot is written before the mapping file and both are
/// fsynced, so a crash between the two writes leaves a pair the load
/// routine will refuse (count cross-check) instead of silently trusting.
pub struct IndexPersistence {
    base_dir: PathBuf,
    index_path: PathBuf,
    mapping_path: PathBuf,
}

impl IndexPersistence {
    /// Create a persistence manager over a data directory.
    pub fn new(base_dir: &Path) -> Result<Self> {
        fs::create_dir_all(base_dir).map_err(|e| IrisError::StorageError {
            code: ErrorCode::StorageIOError,
            message: format!("Failed to create data dir: {}", e),
        })?;

        Ok(IndexPersistence {
            index_path: base_dir.join(INDEX_FILE),
            mapping_path: base_dir.join(MAPPING_FILE),
            base_dir: base_dir.to_path_buf(),
        })
    }

    pub fn base_dir(&self) -> &Path {
        &self.base_dir
    }

    /// Serialize the index and the mapping, index first.
    pub fn save(&self, index: &FlatIndex, map: &IdentifierMap) -> Result<()> {
        map.check_invariants(index.count())?;

        let snapshot = FlatSnapshot {
            version: FORMAT_VERSION,
            dim: index.dim(),
            metric: index.metric(),
            data: index.raw_data().to_vec(),
        };

        let file = File::create(&self.index_path).map_err(|e| IrisError::StorageError {
            code: ErrorCode::StorageIOError,
            message: format!("Failed to create index file: {}", e),
        })?;
        let mut writer = BufWriter::new(file);
        bincode::serialize_into(&mut writer, &snapshot).map_err(|e| IrisError::StorageError {
            code: ErrorCode::SnapshotFailed,
            message: format!("Failed to serialize index snapshot: {}", e),
        })?;
        writer.flush().map_err(|e| IrisError::StorageError {
            code: ErrorCode::StorageIOError,
            message: format!("Failed to flush index file: {}", e),
        })?;
        writer
            .into_inner()
            .map_err(|e| IrisError::StorageError {
                code: ErrorCode::StorageIOError,
                message: format!("Failed to flush index file: {}", e),
            })?
            .sync_all()
            .map_err(|e| IrisError::StorageError {
                code: ErrorCode::StorageIOError,
                message: format!("Failed to sync index file: {}", e),
            })?;

        let mapping = MappingFile {
            version: FORMAT_VERSION,
            next_internal_id: map.next_id(),
            entries: map.entries(),
        };
        let json = serde_json::to_string(&mapping).map_err(|e| IrisError::StorageError {
            code: ErrorCode::StorageIOError,
            message: format!("Failed to serialize mapping: {}", e),
        })?;

        let mut file = File::create(&self.mapping_path).map_err(|e| IrisError::StorageError {
            code: ErrorCode::StorageIOError,
            message: format!("Failed to create mapping file: {}", e),
        })?;
        file.write_all(json.as_bytes())
            .map_err(|e| IrisError::StorageError {
                code: ErrorCode::StorageIOError,
                message: format!("Failed to write mapping file: {}", e),
            })?;
        file.sync_all().map_err(|e| IrisError::StorageError {
            code: ErrorCode::StorageIOError,
            message: format!("Failed to sync mapping file: {}", e),
        })?;

        tracing::debug!(
            vectors = index.count(),
            path = %self.base_dir.display(),
            "persisted index and mapping"
        );
        Ok(())
    }

    /// Load the persisted pair, verifying the artifacts against each other
    /// before trusting either.
    pub fn load(&self) -> Result<LoadOutcome> {
        let index_exists = self.index_path.exists();
        let mapping_exists = self.mapping_path.exists();

        if !index_exists && !mapping_exists {
            return Ok(LoadOutcome::NotFound);
        }
        if index_exists != mapping_exists {
            let missing = if index_exists { MAPPING_FILE } else { INDEX_FILE };
            return Ok(LoadOutcome::Corrupt(format!(
                "partial persisted state: {} is missing",
                missing
            )));
        }

        let snapshot: FlatSnapshot = match File::open(&self.index_path)
            .map_err(|e| format!("Failed to open index file: {}", e))
            .and_then(|f| {
                bincode::deserialize_from(BufReader::new(f))
                    .map_err(|e| format!("Failed to deserialize index snapshot: {}", e))
            }) {
            Ok(snapshot) => snapshot,
            Err(reason) => return Ok(LoadOutcome::Corrupt(reason)),
        };

        let mapping: MappingFile = match fs::read_to_string(&self.mapping_path)
            .map_err(|e| format!("Failed to read mapping file: {}", e))
            .and_then(|s| {
                serde_json::from_str(&s)
                    .map_err(|e| format!("Failed to parse mapping file: {}", e))
            }) {
            Ok(mapping) => mapping,
            Err(reason) => return Ok(LoadOutcome::Corrupt(reason)),
        };

        if snapshot.version != FORMAT_VERSION || mapping.version != FORMAT_VERSION {
            return Ok(LoadOutcome::Corrupt(format!(
                "format version mismatch: index v{}, mapping v{}, expected v{}",
                snapshot.version, mapping.version, FORMAT_VERSION
            )));
        }

        let index = match FlatIndex::from_parts(snapshot.dim, snapshot.metric, snapshot.data) {
            Ok(index) => index,
            Err(e) => return Ok(LoadOutcome::Corrupt(e.to_string())),
        };

        let map = match IdentifierMap::from_entries(mapping.next_internal_id, &mapping.entries) {
            Ok(map) => map,
            Err(e) => return Ok(LoadOutcome::Corrupt(e.to_string())),
        };

        if let Err(e) = map.check_invariants(index.count()) {
            return Ok(LoadOutcome::Corrupt(e.to_string()));
        }

        tracing::info!(
            vectors = index.count(),
            next_internal_id = map.next_id(),
            "loaded persisted index and mapping"
        );
        Ok(LoadOutcome::Loaded(index, map))
    }
}
