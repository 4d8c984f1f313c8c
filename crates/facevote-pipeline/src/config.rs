use facevote_core::{EarlyStopPolicy, OracleId, StageWeights, WeightsError};
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("cannot read weights file {path}: {source}")]
    WeightsFile {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("weights file {path}: {source}")]
    Weights {
        path: PathBuf,
        source: WeightsError,
    },
}

/// How an oracle takes part in the Cropped stage.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CroppedRole {
    /// Vote at the Cropped-stage base weight.
    Direct,
    /// Cross-checked against the reference oracle via the split rule.
    Split,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CroppedSlot {
    pub oracle: OracleId,
    pub role: CroppedRole,
}

/// Which oracle is consulted in which stage, in declaration order.
///
/// Votes are appended in this order regardless of completion order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StagePlan {
    pub original: Vec<OracleId>,
    pub cropped: Vec<CroppedSlot>,
    /// Geometric reference for the split rule, run on the cropped pair.
    pub reference: OracleId,
    pub aligned: Vec<OracleId>,
}

impl Default for StagePlan {
    fn default() -> Self {
        let slot = |name: &str, role| CroppedSlot {
            oracle: OracleId::new(name),
            role,
        };
        Self {
            original: ["qwen", "chatgpt", "gemini", "deepface"]
                .into_iter()
                .map(OracleId::new)
                .collect(),
            cropped: vec![
                slot("qwen", CroppedRole::Split),
                slot("chatgpt", CroppedRole::Direct),
                slot("gemini", CroppedRole::Split),
            ],
            reference: OracleId::new("retinaface"),
            aligned: ["qwen", "chatgpt", "gemini"]
                .into_iter()
                .map(OracleId::new)
                .collect(),
        }
    }
}

impl StagePlan {
    /// Oracles re-queried in the Cropped stage (excluding the reference).
    pub fn cropped_oracles(&self) -> impl Iterator<Item = &OracleId> {
        self.cropped.iter().map(|s| &s.oracle)
    }

    /// Every oracle name the plan refers to, deduplicated, in first-use order.
    pub fn all_oracles(&self) -> Vec<OracleId> {
        let mut out: Vec<OracleId> = Vec::new();
        let names = self
            .original
            .iter()
            .chain(self.cropped_oracles())
            .chain(std::iter::once(&self.reference))
            .chain(self.aligned.iter());
        for name in names {
            if !out.contains(name) {
                out.push(name.clone());
            }
        }
        out
    }
}

/// Decision-core configuration, loaded from `FACEVOTE_*` environment variables.
#[derive(Debug, Clone)]
pub struct PipelineConfig {
    pub weights: StageWeights,
    pub plan: StagePlan,
    pub early_stop: EarlyStopPolicy,
    /// Upper bound on one oracle call, retries included.
    pub call_timeout: Duration,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            weights: StageWeights::default(),
            plan: StagePlan::default(),
            early_stop: EarlyStopPolicy::default(),
            call_timeout: Duration::from_secs(120),
        }
    }
}

impl PipelineConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        let weights = match std::env::var("FACEVOTE_WEIGHTS_FILE") {
            Ok(path) => load_weights(PathBuf::from(path))?,
            Err(_) => StageWeights::default(),
        };

        Ok(Self {
            weights,
            plan: StagePlan::default(),
            early_stop: EarlyStopPolicy {
                enabled: env_flag("FACEVOTE_EARLY_STOP", true),
                threshold: env_or("FACEVOTE_EARLY_STOP_THRESHOLD", 6),
            },
            call_timeout: Duration::from_secs(env_or("FACEVOTE_CALL_TIMEOUT_SECS", 120)),
        })
    }
}

fn load_weights(path: PathBuf) -> Result<StageWeights, ConfigError> {
    let src = match std::fs::read_to_string(&path) {
        Ok(src) => src,
        Err(source) => return Err(ConfigError::WeightsFile { path, source }),
    };
    let weights = StageWeights::from_toml_str(&src)
        .map_err(|source| ConfigError::Weights { path: path.clone(), source })?;
    tracing::info!(path = %path.display(), "loaded stage weights");
    Ok(weights)
}

/// Parse `key` from the environment, falling back to `default` when unset or malformed.
pub fn env_or<T: FromStr>(key: &str, default: T) -> T {
    std::env::var(key)
        .ok()
        .and_then(|v| v.trim().parse().ok())
        .unwrap_or(default)
}

/// Boolean switch: any value other than `0` enables.
pub fn env_flag(key: &str, default: bool) -> bool {
    std::env::var(key).map(|v| v != "0").unwrap_or(default)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_default_plan_shape() {
        let plan = StagePlan::default();
        assert_eq!(plan.original.len(), 4);
        assert_eq!(plan.cropped.len(), 3);
        assert_eq!(
            plan.cropped
                .iter()
                .filter(|s| s.role == CroppedRole::Split)
                .count(),
            2
        );
        assert_eq!(plan.aligned.len(), 3);
    }

    #[test]
    fn test_all_oracles_deduplicated() {
        let names: Vec<String> = StagePlan::default()
            .all_oracles()
            .iter()
            .map(|o| o.to_string())
            .collect();
        assert_eq!(names, vec!["qwen", "chatgpt", "gemini", "deepface", "retinaface"]);
    }

    #[test]
    fn test_load_weights_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "[aligned]\nqwen = 2.0").unwrap();
        let weights = load_weights(file.path().to_path_buf()).unwrap();
        assert_eq!(weights.aligned.get(&OracleId::new("qwen")), Some(&2.0));
    }

    #[test]
    fn test_load_weights_missing_file() {
        let err = load_weights(PathBuf::from("/nonexistent/weights.toml")).unwrap_err();
        assert!(matches!(err, ConfigError::WeightsFile { .. }));
    }

    #[test]
    fn test_env_or_falls_back_on_garbage() {
        std::env::set_var("FACEVOTE_TEST_ENV_OR", "not-a-number");
        assert_eq!(env_or("FACEVOTE_TEST_ENV_OR", 7usize), 7);
        std::env::set_var("FACEVOTE_TEST_ENV_OR", " 9 ");
        assert_eq!(env_or("FACEVOTE_TEST_ENV_OR", 7usize), 9);
        std::env::remove_var("FACEVOTE_TEST_ENV_OR");
    }
}
