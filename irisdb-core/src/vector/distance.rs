use serde::{Deserialize, Serialize};

/// Compute L2 (Euclidean) distance between two vectors.
pub fn l2_distance(a: &[f32], b: &[f32]) -> f32 {
    debug_assert_eq!(
        a.len(),
        b.len(),
        "Vectors must have the same dimension"
    );
    a.iter()
        .zip(b.iter())
        .map(|(x, y)| (x - y).powi(2))
        .sum::<f32>()
        .sqrt()
}

/// Compute inner product between two vectors.
pub fn inner_product(a: &[f32], b: &[f32]) -> f32 {
    debug_assert_eq!(
        a.len(),
        b.len(),
        "Vectors must have the same dimension"
    );
    a.iter().zip(b.iter()).map(|(x, y)| x * y).sum()
}

/// Similarity metric for the flat index. Only insert-without-training
/// variants; IVF-style indexes that need a training phase are out.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DistanceMetric {
    /// Inner product over L2-normalized vectors; higher score is closer.
    InnerProduct,
    /// Euclidean distance; lower score is closer.
    L2,
}

impl DistanceMetric {
    /// Score a candidate against a query under this metric.
    pub fn score(&self, query: &[f32], candidate: &[f32]) -> f32 {
        match self {
            DistanceMetric::InnerProduct => inner_product(query, candidate),
            DistanceMetric::L2 => l2_distance(query, candidate),
        }
    }

    /// Whether a higher score means a closer match.
    pub fn descending(&self) -> bool {
        matches!(self, DistanceMetric::InnerProduct)
    }

    pub fn from_str(name: &str) -> Option<Self> {
        match name {
            "ip" | "inner_product" | "IndexFlatIP" => Some(DistanceMetric::InnerProduct),
            "l2" | "IndexFlatL2" => Some(DistanceMetric::L2),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            DistanceMetric::InnerProduct => "inner_product",
            DistanceMetric::L2 => "l2",
        }
    }
}

impl std::fmt::Display for DistanceMetric {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}
