//! Embedding collaborator used by the semantic chunker

use super::error::Result;
use crate::util::cancel::CancelToken;
use async_trait::async_trait;
use std::sync::Arc;

/// Batch embedding generator.
///
/// Implementations return exactly one vector per input, in input order.
#[async_trait]
pub trait EmbeddingGenerator: Send + Sync {
    async fn generate(&self, inputs: &[String], cancel: &CancelToken) -> Result<Vec<Vec<f32>>>;

    fn identify(&self) -> &'static str {
        std::any::type_name::<Self>()
    }
}

pub type SharedEmbeddingGenerator = Arc<dyn EmbeddingGenerator>;

/// Cosine distance `1 - cos(a, b)`, 1.0 when either vector has zero magnitude
pub fn cosine_distance(a: &[f32], b: &[f32]) -> f64 {
    let mut dot = 0.0;
    let mut mag_a = 0.0;
    let mut mag_b = 0.0;

    for (&ai, &bi) in a.iter().zip(b.iter()) {
        let (ai, bi) = (ai as f64, bi as f64);
        dot += ai * bi;
        mag_a += ai * ai;
        mag_b += bi * bi;
    }

    let denom = mag_a.sqrt() * mag_b.sqrt();
    if denom < f64::EPSILON {
        return 1.0;
    }

    1.0 - (dot / denom)
}

/// Linearly interpolated percentile (`0..=100`) of `values`; 0.0 when empty
pub fn percentile(values: &[f64], percentile: f64) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    let mut sorted = values.to_vec();
    sorted.sort_by(|a, b| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal));

    let rank = percentile.clamp(0.0, 100.0) / 100.0 * (sorted.len() - 1) as f64;
    let lower = rank.floor() as usize;
    let upper = rank.ceil() as usize;
    sorted[lower] + (sorted[upper] - sorted[lower]) * (rank - lower as f64)
}
