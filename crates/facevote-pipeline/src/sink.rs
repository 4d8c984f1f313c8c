//! Final per-run record and the append-only sink that consumes it.

use chrono::{DateTime, Utc};
use facevote_core::{Breakdown, Decision, OracleId, Stage};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

/// An oracle slot that produced no opinion, kept so degraded runs are visible.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Abstention {
    pub stage: Stage,
    pub oracle: OracleId,
    pub reason: String,
}

/// Identity of one input image (e.g. file name and content digest).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InputFingerprint {
    pub label: String,
    pub sha256: String,
}

/// Everything known about one finished comparison.
///
/// The field set is the persisted schema; add fields with `#[serde(default)]`
/// so older log lines keep parsing.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ComparisonRecord {
    pub run_id: Uuid,
    pub finished_at: DateTime<Utc>,
    pub decision: Decision,
    pub breakdown: Breakdown,
    pub processing_ms: u64,
    /// `None` when the Cropped stage never ran.
    pub crop_success: Option<bool>,
    /// `None` when the Aligned stage never ran.
    pub align_success: Option<bool>,
    pub oracle_calls: usize,
    pub abstentions: Vec<Abstention>,
    #[serde(default)]
    pub inputs: Vec<InputFingerprint>,
}

#[derive(Error, Debug)]
pub enum SinkError {
    #[error("sink I/O: {0}")]
    Io(#[from] std::io::Error),
    #[error("record serialization: {0}")]
    Serialize(String),
}

/// Append-only consumer of finished records. Never queried by the pipeline.
pub trait ResultSink: Send + Sync {
    fn record(&self, record: &ComparisonRecord) -> Result<(), SinkError>;
}
