//! Local embedding comparator: ArcFace cosine similarity against a threshold.

use crate::engine::{VisionError, VisionHandle};
use crate::types::Embedding;
use async_trait::async_trait;
use facevote_core::{OracleId, Outcome};
use facevote_pipeline::{Opinion, Oracle, OracleError};
use image::DynamicImage;

pub const DEFAULT_SIMILARITY_THRESHOLD: f32 = 0.40;

pub struct EmbeddingOracle {
    id: OracleId,
    handle: VisionHandle,
    threshold: f32,
}

impl EmbeddingOracle {
    pub fn new(id: impl Into<OracleId>, handle: VisionHandle, threshold: f32) -> Self {
        Self {
            id: id.into(),
            handle,
            threshold,
        }
    }
}

#[async_trait]
impl Oracle for EmbeddingOracle {
    async fn compare(&self, a: &DynamicImage, b: &DynamicImage) -> Result<Opinion, OracleError> {
        let (ea, eb) = tokio::try_join!(
            self.handle.embed(a.to_rgb8()),
            self.handle.embed(b.to_rgb8()),
        )
        .map_err(to_oracle_error)?;

        let opinion = judge(&self.id, &ea, &eb, self.threshold);
        tracing::debug!(
            oracle = %self.id,
            similarity = ea.similarity(&eb),
            threshold = self.threshold,
            outcome = %opinion.outcome,
            "embedding comparison"
        );
        Ok(opinion)
    }
}

fn to_oracle_error(err: VisionError) -> OracleError {
    match err {
        VisionError::NoFace => OracleError::NoFace,
        other => OracleError::Inference(other.to_string()),
    }
}

/// Same person iff cosine similarity reaches `threshold`.
fn judge(id: &OracleId, a: &Embedding, b: &Embedding, threshold: f32) -> Opinion {
    let similarity = a.similarity(b);
    let outcome = if similarity >= threshold {
        Outcome::Same
    } else {
        Outcome::Different
    };
    Opinion::new(outcome, format!("{id}_{:.3}", 1.0 - similarity))
}
