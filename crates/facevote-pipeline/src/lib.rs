//! facevote-pipeline — Staged comparison of a face image pair.
//!
//! Drives the Original → Cropped → Aligned stages over injected oracles and an
//! optional preprocessor, feeds the votes to the voting engine, stops early on
//! a count quorum and emits one [`ComparisonRecord`] per run.

pub mod config;
pub mod limiter;
pub mod oracle;
pub mod orchestrator;
pub mod preprocess;
pub mod retry;
pub mod run;
pub mod sink;

pub use config::{ConfigError, CroppedRole, CroppedSlot, PipelineConfig, StagePlan};
pub use limiter::RateLimiter;
pub use oracle::{ErrorClass, Opinion, Oracle, OracleError, OracleSet};
pub use orchestrator::Orchestrator;
pub use preprocess::{ImagePair, PreprocessError, Preprocessor};
pub use retry::{call_with_fallback, Answer, RetryPolicy};
pub use run::{ComparisonRun, RunState};
pub use sink::{Abstention, ComparisonRecord, InputFingerprint, ResultSink, SinkError};
