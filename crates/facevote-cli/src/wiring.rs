//! Builds the oracle map and preprocessor once at startup.

use crate::config::Config;
use facevote_pipeline::{OracleSet, Orchestrator, ResultSink};
use facevote_remote::VisionLlmOracle;
use facevote_vision::{spawn_vision_engine, EmbeddingOracle, FacePreprocessor};
use std::sync::Arc;

/// Local embedding comparators sharing the inference thread.
const EMBEDDING_ORACLES: [&str; 2] = ["deepface", "retinaface"];

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OracleStatus {
    pub name: String,
    pub kind: &'static str,
    pub usable: bool,
    pub detail: String,
}

/// What each oracle slot will do, without loading anything.
pub fn oracle_status(config: &Config) -> Vec<OracleStatus> {
    let mut out: Vec<OracleStatus> = config
        .remotes
        .iter()
        .map(|r| {
            let (usable, detail) = match (&r.remote.api_key, r.remote.models.is_empty()) {
                (None, _) => (false, "no API key".to_string()),
                (Some(_), true) => (false, "no models configured".to_string()),
                (Some(_), false) => (true, r.remote.models.join(", ")),
            };
            OracleStatus {
                name: r.name.clone(),
                kind: "vision-llm",
                usable,
                detail,
            }
        })
        .collect();

    let models = config.model_paths();
    let present = models.present();
    let detail = if present {
        config.model_dir.display().to_string()
    } else {
        format!("models missing in {}", config.model_dir.display())
    };
    out.extend(EMBEDDING_ORACLES.iter().map(|name| OracleStatus {
        name: name.to_string(),
        kind: "embedding",
        usable: present,
        detail: detail.clone(),
    }));
    out
}

/// Register every oracle and the preprocessor, then hand them to the orchestrator.
///
/// Remote oracles without a key are still registered so their slots abstain
/// with a configuration reason. Local oracles and the preprocessor are only
/// registered when the models load.
pub fn build_orchestrator(config: &Config, sink: Option<Arc<dyn ResultSink>>) -> Orchestrator {
    let mut oracles = OracleSet::new();

    for remote in &config.remotes {
        if remote.remote.api_key.is_none() {
            tracing::warn!(oracle = %remote.name, "no API key configured; oracle will abstain");
        }
        oracles = oracles.with(
            remote.name.as_str(),
            Arc::new(VisionLlmOracle::new(remote.name.as_str(), remote.remote.clone())),
        );
    }

    let models = config.model_paths();
    let handle = if models.present() {
        match spawn_vision_engine(&models) {
            Ok(handle) => Some(handle),
            Err(e) => {
                tracing::warn!(error = %e, "local vision unavailable; embedding oracles and preprocessing disabled");
                None
            }
        }
    } else {
        tracing::warn!(
            model_dir = %config.model_dir.display(),
            "face models not found; embedding oracles and preprocessing disabled"
        );
        None
    };

    let mut orchestrator = match handle {
        Some(handle) => {
            for name in EMBEDDING_ORACLES {
                oracles = oracles.with(
                    name,
                    Arc::new(EmbeddingOracle::new(
                        name,
                        handle.clone(),
                        config.embedding_threshold,
                    )),
                );
            }
            Orchestrator::new(oracles, config.pipeline.clone()).with_preprocessor(Arc::new(
                FacePreprocessor::new(handle, config.crop_margin, config.max_crop_size),
            ))
        }
        None => Orchestrator::new(oracles, config.pipeline.clone()),
    };

    if let Some(sink) = sink {
        orchestrator = orchestrator.with_sink(sink);
    }
    orchestrator
}
