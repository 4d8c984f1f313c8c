//! Oracle interface and its classified failure taxonomy.

use async_trait::async_trait;
use facevote_core::{OracleId, Outcome};
use image::DynamicImage;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;

/// An oracle's answer for one image pair.
#[derive(Debug, Clone, PartialEq)]
pub struct Opinion {
    pub outcome: Outcome,
    /// Free-form tag describing how the answer was produced (model, distance, raw reply).
    pub provenance: String,
}

impl Opinion {
    pub fn new(outcome: Outcome, provenance: impl Into<String>) -> Self {
        Self {
            outcome,
            provenance: provenance.into(),
        }
    }
}

#[derive(Error, Debug)]
pub enum OracleError {
    #[error("not configured: {0}")]
    NotConfigured(String),
    #[error("credentials rejected: {0}")]
    Unauthorized(String),
    #[error("rate limited: {0}")]
    RateLimited(String),
    #[error("model unavailable: {0}")]
    ModelUnavailable(String),
    #[error("timed out after {0:?}")]
    Timeout(Duration),
    #[error("request failed: {0}")]
    Request(String),
    #[error("no face detected")]
    NoFace,
    #[error("inference failed: {0}")]
    Inference(String),
    #[error("image encoding failed: {0}")]
    Encoding(String),
}

/// How a failure is handled, decided once where the error is raised.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorClass {
    /// Retry the same model with increasing, capped backoff.
    RateLimited,
    /// Advance to the next configured model.
    ModelUnavailable,
    /// Missing or rejected credentials; the oracle abstains for every run.
    Configuration,
    /// Timeout, transport or server error; retry the same model after the base delay.
    Transient,
    /// The oracle ran but has no opinion (no face, bad input); do not retry.
    NoOpinion,
}

impl ErrorClass {
    pub fn as_str(self) -> &'static str {
        match self {
            ErrorClass::RateLimited => "rate_limited",
            ErrorClass::ModelUnavailable => "model_unavailable",
            ErrorClass::Configuration => "not_configured",
            ErrorClass::Transient => "transient",
            ErrorClass::NoOpinion => "no_opinion",
        }
    }
}

impl OracleError {
    pub fn class(&self) -> ErrorClass {
        match self {
            OracleError::NotConfigured(_) | OracleError::Unauthorized(_) => {
                ErrorClass::Configuration
            }
            OracleError::RateLimited(_) => ErrorClass::RateLimited,
            OracleError::ModelUnavailable(_) => ErrorClass::ModelUnavailable,
            OracleError::Timeout(_) | OracleError::Request(_) => ErrorClass::Transient,
            OracleError::NoFace | OracleError::Inference(_) | OracleError::Encoding(_) => {
                ErrorClass::NoOpinion
            }
        }
    }
}

/// A model or algorithm that opines whether two images show the same person.
///
/// Implementations must be safe to call concurrently; any rate-limit state
/// they keep is their own.
#[async_trait]
pub trait Oracle: Send + Sync {
    async fn compare(&self, a: &DynamicImage, b: &DynamicImage) -> Result<Opinion, OracleError>;
}

/// Immutable mapping from oracle name to implementation, built once at startup.
#[derive(Clone, Default)]
pub struct OracleSet {
    oracles: HashMap<OracleId, Arc<dyn Oracle>>,
}

impl OracleSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register an oracle, replacing any previous one with the same name.
    pub fn with(mut self, id: impl Into<OracleId>, oracle: Arc<dyn Oracle>) -> Self {
        self.oracles.insert(id.into(), oracle);
        self
    }

    pub fn get(&self, id: &OracleId) -> Option<&Arc<dyn Oracle>> {
        self.oracles.get(id)
    }

    pub fn contains(&self, id: &OracleId) -> bool {
        self.oracles.contains_key(id)
    }

    pub fn len(&self) -> usize {
        self.oracles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.oracles.is_empty()
    }
}
