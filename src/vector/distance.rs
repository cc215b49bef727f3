//! Distance metrics.
//!
//! The metric is a closed set chosen when an index is created and never
//! changes for the lifetime of that graph. Cosine is the canonical metric.

use serde::{Deserialize, Serialize};

/// Distance metric used to rank neighbors.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum DistanceMetric {
    /// `1 - cosine_similarity(a, b)`. 0.0 = same direction, 2.0 = opposite.
    #[default]
    Cosine,

    /// Straight-line (L2) distance.
    Euclidean,
}

impl DistanceMetric {
    /// Computes the distance between two equal-length vectors.
    #[inline]
    pub fn distance(&self, a: &[f32], b: &[f32]) -> f32 {
        match self {
            Self::Cosine => cosine_distance(a, b),
            Self::Euclidean => euclidean_distance(a, b),
        }
    }

    /// Converts a distance into a similarity score (higher is closer).
    ///
    /// Cosine maps to `1 - distance`, i.e. the cosine similarity itself.
    /// Euclidean maps to `1 / (1 + distance)`.
    ///
    /// ```rust
    /// use pulseindex::DistanceMetric;
    ///
    /// assert_eq!(DistanceMetric::Cosine.similarity(0.25), 0.75);
    /// assert_eq!(DistanceMetric::Euclidean.similarity(1.0), 0.5);
    /// ```
    #[inline]
    pub fn similarity(&self, distance: f32) -> f32 {
        match self {
            Self::Cosine => 1.0 - distance,
            Self::Euclidean => 1.0 / (1.0 + distance),
        }
    }

    /// Short lowercase name, used in persisted metadata and logs.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Cosine => "cosine",
            Self::Euclidean => "euclidean",
        }
    }
}

/// Cosine distance between two vectors.
///
/// A zero-length vector has no direction; its distance to anything is 1.0.
#[inline]
pub fn cosine_distance(a: &[f32], b: &[f32]) -> f32 {
    debug_assert_eq!(a.len(), b.len());
    let mut dot = 0.0f32;
    let mut norm_a = 0.0f32;
    let mut norm_b = 0.0f32;
    for (x, y) in a.iter().zip(b.iter()) {
        dot += x * y;
        norm_a += x * x;
        norm_b += y * y;
    }
    if norm_a == 0.0 || norm_b == 0.0 {
        return 1.0;
    }
    let similarity = dot / (norm_a.sqrt() * norm_b.sqrt());
    // Rounding can push similarity slightly outside [-1, 1]
    (1.0 - similarity.clamp(-1.0, 1.0)).max(0.0)
}

/// Euclidean distance between two vectors.
#[inline]
pub fn euclidean_distance(a: &[f32], b: &[f32]) -> f32 {
    debug_assert_eq!(a.len(), b.len());
    a.iter()
        .zip(b.iter())
        .map(|(x, y)| {
            let d = x - y;
            d * d
        })
        .sum::<f32>()
        .sqrt()
}
