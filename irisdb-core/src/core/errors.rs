use std::fmt;

use crate::core::types::{ExternalId, InternalId};

/// Error codes for programmatic error handling
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorCode {
    /// 1000-1099: Dimension/Vector errors
    VectorDimensionMismatch = 1001,
    VectorDimensionInvalid = 1002,
    InvalidDistanceMetric = 1003,

    /// 1100-1199: Identifier map errors
    DuplicateExternalId = 1101,
    DuplicateInternalId = 1102,
    UnknownInternalId = 1103,
    UnknownExternalId = 1104,

    /// 1200-1299: Storage errors
    StorageIOError = 1201,
    SnapshotFailed = 1202,
    MappingCorrupted = 1203,

    /// 1300-1399: Extraction/record-store errors
    ExtractionFailed = 1301,
    UnreadableImage = 1302,
    RecordStoreError = 1303,

    /// 1400-1499: Service lifecycle errors
    ServiceUnavailable = 1401,
    RebuildTimeout = 1402,

    /// 1500-1599: Configuration errors
    ConfigError = 1501,

    /// 9000: Unknown error
    Unknown = 9000,
}

impl ErrorCode {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorCode::VectorDimensionMismatch => "VECTOR_DIMENSION_MISMATCH",
            ErrorCode::VectorDimensionInvalid => "VECTOR_DIMENSION_INVALID",
            ErrorCode::InvalidDistanceMetric => "INVALID_DISTANCE_METRIC",
            ErrorCode::DuplicateExternalId => "DUPLICATE_EXTERNAL_ID",
            ErrorCode::DuplicateInternalId => "DUPLICATE_INTERNAL_ID",
            ErrorCode::UnknownInternalId => "UNKNOWN_INTERNAL_ID",
            ErrorCode::UnknownExternalId => "UNKNOWN_EXTERNAL_ID",
            ErrorCode::StorageIOError => "STORAGE_IO_ERROR",
            ErrorCode::SnapshotFailed => "SNAPSHOT_FAILED",
            ErrorCode::MappingCorrupted => "MAPPING_CORRUPTED",
            ErrorCode::ExtractionFailed => "EXTRACTION_FAILED",
            ErrorCode::UnreadableImage => "UNREADABLE_IMAGE",
            ErrorCode::RecordStoreError => "RECORD_STORE_ERROR",
            ErrorCode::ServiceUnavailable => "SERVICE_UNAVAILABLE",
            ErrorCode::RebuildTimeout => "REBUILD_TIMEOUT",
            ErrorCode::ConfigError => "CONFIG_ERROR",
            ErrorCode::Unknown => "UNKNOWN_ERROR",
        }
    }
}

#[derive(Debug, Clone)]
pub enum IrisError {
    /// Dimension mismatch between a vector and the index
    DimensionMismatch { expected: usize, got: usize },
    /// Invalid vector dimension (e.g. zero)
    DimensionInvalid(usize),
    /// Invalid distance metric name
    InvalidDistance(String),
    /// External id already bound in the reverse map
    DuplicateExternalId(ExternalId),
    /// Internal id already bound in the forward map (invariant violation)
    DuplicateInternalId(InternalId),
    /// Internal id absent from the forward map
    UnknownInternalId(InternalId),
    /// External id absent from the reverse map
    UnknownExternalId(ExternalId),
    /// Storage error with details
    StorageError { code: ErrorCode, message: String },
    /// Feature extraction failed for an asset
    ExtractionError { code: ErrorCode, message: String },
    /// Authoritative record store failed
    RecordStoreError(String),
    /// Service is not in a state that accepts the operation
    ServiceUnavailable { state: &'static str },
    /// Rebuild exceeded the caller-supplied deadline
    RebuildTimeout,
    /// Configuration error
    ConfigError { message: String },
}

impl IrisError {
    pub fn code(&self) -> ErrorCode {
        match self {
            IrisError::DimensionMismatch { .. } => ErrorCode::VectorDimensionMismatch,
            IrisError::DimensionInvalid(_) => ErrorCode::VectorDimensionInvalid,
            IrisError::InvalidDistance(_) => ErrorCode::InvalidDistanceMetric,
            IrisError::DuplicateExternalId(_) => ErrorCode::DuplicateExternalId,
            IrisError::DuplicateInternalId(_) => ErrorCode::DuplicateInternalId,
            IrisError::UnknownInternalId(_) => ErrorCode::UnknownInternalId,
            IrisError::UnknownExternalId(_) => ErrorCode::UnknownExternalId,
            IrisError::StorageError { code, .. } => *code,
            IrisError::ExtractionError { code, .. } => *code,
            IrisError::RecordStoreError(_) => ErrorCode::RecordStoreError,
            IrisError::ServiceUnavailable { .. } => ErrorCode::ServiceUnavailable,
            IrisError::RebuildTimeout => ErrorCode::RebuildTimeout,
            IrisError::ConfigError { .. } => ErrorCode::ConfigError,
        }
    }

    /// Errors the caller may retry after the service settles.
    pub fn is_retryable(&self) -> bool {
        matches!(self, IrisError::ServiceUnavailable { .. })
    }
}

impl fmt::Display for IrisError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            IrisError::DimensionMismatch { expected, got } => {
                write!(f, "[{}] Vector dimension mismatch: expected {}, got {}",
                    self.code().as_str(), expected, got)
            }
            IrisError::DimensionInvalid(dim) => {
                write!(f, "[{}] Invalid vector dimension: {}", self.code().as_str(), dim)
            }
            IrisError::InvalidDistance(name) => {
                write!(f, "[{}] Invalid distance metric: {}", self.code().as_str(), name)
            }
            IrisError::DuplicateExternalId(id) => {
                write!(f, "[{}] External id already indexed: {}", self.code().as_str(), id)
            }
            IrisError::DuplicateInternalId(id) => {
                write!(f, "[{}] Internal id already bound: {}", self.code().as_str(), id)
            }
            IrisError::UnknownInternalId(id) => {
                write!(f, "[{}] Unknown internal id: {}", self.code().as_str(), id)
            }
            IrisError::UnknownExternalId(id) => {
                write!(f, "[{}] Unknown external id: {}", self.code().as_str(), id)
            }
            IrisError::StorageError { code, message } => {
                write!(f, "[{}] Storage error: {}", code.as_str(), message)
            }
            IrisError::ExtractionError { code, message } => {
                write!(f, "[{}] Extraction error: {}", code.as_str(), message)
            }
            IrisError::RecordStoreError(message) => {
                write!(f, "[{}] Record store error: {}", self.code().as_str(), message)
            }
            IrisError::ServiceUnavailable { state } => {
                write!(f, "[{}] Service unavailable (state: {})", self.code().as_str(), state)
            }
            IrisError::RebuildTimeout => {
                write!(f, "[{}] Rebuild timed out", self.code().as_str())
            }
            IrisError::ConfigError { message } => {
                write!(f, "[{}] Config error: {}", self.code().as_str(), message)
            }
        }
    }
}

impl std::error::Error for IrisError {}

pub type Result<T> = std::result::Result<T, IrisError>;
