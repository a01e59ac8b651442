use std::path::PathBuf;

use crate::vector::distance::DistanceMetric;

/// Index configuration.
#[derive(Debug, Clone)]
pub struct IndexConfig {
    /// Feature vector dimension, fixed per deployment.
    pub dim: usize,
    /// Similarity metric. Inner product expects callers to L2-normalize.
    pub metric: DistanceMetric,
    /// Directory holding the persisted index and mapping artifacts.
    pub data_dir: PathBuf,
}

impl Default for IndexConfig {
    fn default() -> Self {
        IndexConfig {
            dim: 2048,
            metric: DistanceMetric::InnerProduct,
            data_dir: PathBuf::from("data/index"),
        }
    }
}

impl IndexConfig {
    /// Load from environment variables.
    pub fn from_env() -> Self {
        let mut config = IndexConfig::default();

        if let Ok(dim) = std::env::var("IRISDB_FEATURE_DIM") {
            config.dim = dim.parse().unwrap_or(config.dim);
        }
        if let Ok(metric) = std::env::var("IRISDB_METRIC") {
            if let Some(parsed) = DistanceMetric::from_str(&metric) {
                config.metric = parsed;
            }
        }
        if let Ok(dir) = std::env::var("IRISDB_DATA_DIR") {
            config.data_dir = PathBuf::from(dir);
        }

        config
    }
}
