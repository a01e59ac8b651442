// ============================================================================
// CORE TYPES & UTILITIES
// ============================================================================
pub mod core;

// ============================================================================
// VECTORS & SIMILARITY
// ============================================================================
pub mod vector;
pub mod index;

// ============================================================================
// IDENTIFIER MAPPING & PERSISTENCE
// ============================================================================
pub mod mapping;
pub mod storage;

// ============================================================================
// RECONCILIATION & SERVICE FACADE
// ============================================================================
pub mod records;
pub mod reconcile;
pub mod service;

// Re-export commonly used types
pub use crate::core::{ErrorCode, ExternalId, IndexConfig, InternalId, IrisError, Result};
pub use index::FlatIndex;
pub use mapping::IdentifierMap;
pub use records::{ActiveRecord, FeatureExtractor, RecordStore};
pub use reconcile::{DivergenceReport, RebuildSummary, Reconciler};
pub use service::{AddOutcome, IndexCoordinator, IndexInfo, Lifecycle, SearchMatch};
pub use storage::{IndexPersistence, LoadOutcome};
pub use vector::distance::DistanceMetric;
pub use vector::types::Vector;
