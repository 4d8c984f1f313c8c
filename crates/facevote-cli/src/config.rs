use facevote_pipeline::config::{env_flag, env_or};
use facevote_pipeline::{ConfigError, PipelineConfig, RetryPolicy};
use facevote_remote::{RemoteConfig, DEFAULT_BASE_URL};
use facevote_vision::{
    ModelPaths, DEFAULT_CROP_MARGIN, DEFAULT_MAX_CROP_SIZE, DEFAULT_SIMILARITY_THRESHOLD,
};
use std::path::PathBuf;
use std::time::Duration;

/// Remote vision-LLM oracles, in registration order: name, key variable, default models.
const REMOTE_ORACLES: [(&str, &str, &str); 3] = [
    ("qwen", "FACEVOTE_QWEN", "qwen/qwen-vl-max"),
    ("chatgpt", "FACEVOTE_CHATGPT", "openai/gpt-4o-2024-11-20"),
    (
        "gemini",
        "FACEVOTE_GEMINI",
        "google/gemini-2.0-flash-exp:free,google/gemini-exp-1206:free",
    ),
];

/// One remote oracle as configured from the environment.
#[derive(Debug, Clone)]
pub struct RemoteOracleConfig {
    pub name: String,
    pub remote: RemoteConfig,
}

/// CLI configuration, loaded from `FACEVOTE_*` environment variables.
#[derive(Debug, Clone)]
pub struct Config {
    pub pipeline: PipelineConfig,
    pub remotes: Vec<RemoteOracleConfig>,
    /// Directory containing the SCRFD and ArcFace ONNX files.
    pub model_dir: PathBuf,
    /// Cosine similarity at or above which the embedding oracles answer "same".
    pub embedding_threshold: f32,
    /// Crop margin as a fraction of the face box, per side.
    pub crop_margin: f32,
    pub max_crop_size: u32,
    pub max_image_bytes: u64,
    /// JSON-lines result log.
    pub log_file: PathBuf,
    pub log_enabled: bool,
}

impl Config {
    pub fn from_env() -> Result<Self, ConfigError> {
        let data_dir = data_dir();

        let base_url =
            std::env::var("FACEVOTE_API_BASE_URL").unwrap_or_else(|_| DEFAULT_BASE_URL.to_string());
        let rate_delay = Duration::from_millis(env_or("FACEVOTE_RATE_DELAY_MS", 1000));
        let retry = RetryPolicy {
            max_retries: env_or("FACEVOTE_MAX_RETRIES", 3),
            delay: rate_delay,
            backoff_cap: Duration::from_secs(env_or("FACEVOTE_BACKOFF_CAP_SECS", 10)),
        };
        let request_timeout = Duration::from_secs(env_or("FACEVOTE_REQUEST_TIMEOUT_SECS", 30));

        let remotes = REMOTE_ORACLES
            .iter()
            .map(|(name, prefix, default_models)| {
                let api_key = std::env::var(format!("{prefix}_API_KEY"))
                    .ok()
                    .filter(|k| !k.trim().is_empty());
                let models = std::env::var(format!("{prefix}_MODELS"))
                    .map(|raw| parse_models(&raw))
                    .unwrap_or_else(|_| parse_models(default_models));
                RemoteOracleConfig {
                    name: name.to_string(),
                    remote: RemoteConfig {
                        api_key,
                        base_url: base_url.clone(),
                        models,
                        retry,
                        rate_delay,
                        request_timeout,
                    },
                }
            })
            .collect();

        let model_dir = std::env::var("FACEVOTE_MODEL_DIR")
            .map(PathBuf::from)
            .unwrap_or_else(|_| data_dir.join("models"));

        let log_file = std::env::var("FACEVOTE_LOG_FILE")
            .map(PathBuf::from)
            .unwrap_or_else(|_| data_dir.join("comparisons.jsonl"));

        Ok(Self {
            pipeline: PipelineConfig::from_env()?,
            remotes,
            model_dir,
            embedding_threshold: env_or("FACEVOTE_EMBEDDING_THRESHOLD", DEFAULT_SIMILARITY_THRESHOLD),
            crop_margin: env_or("FACEVOTE_CROP_MARGIN", DEFAULT_CROP_MARGIN),
            max_crop_size: env_or("FACEVOTE_MAX_CROP_SIZE", DEFAULT_MAX_CROP_SIZE),
            max_image_bytes: env_or("FACEVOTE_MAX_IMAGE_MB", 5u64) * 1024 * 1024,
            log_file,
            log_enabled: env_flag("FACEVOTE_LOG_ENABLED", true),
        })
    }

    pub fn model_paths(&self) -> ModelPaths {
        ModelPaths::in_dir(&self.model_dir)
    }
}

/// `$XDG_DATA_HOME/facevote`, falling back to `~/.local/share/facevote`.
fn data_dir() -> PathBuf {
    std::env::var("XDG_DATA_HOME")
        .map(PathBuf::from)
        .unwrap_or_else(|_| {
            let home = std::env::var("HOME").unwrap_or_else(|_| "/tmp".to_string());
            PathBuf::from(home).join(".local/share")
        })
        .join("facevote")
}

/// Comma-separated model list; blanks dropped.
fn parse_models(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(str::trim)
        .filter(|m| !m.is_empty())
        .map(String::from)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_models() {
        assert_eq!(
            parse_models(" a/b , c/d:free,,"),
            vec!["a/b".to_string(), "c/d:free".to_string()]
        );
        assert!(parse_models("").is_empty());
    }

    #[test]
    fn test_default_gemini_has_fallback_model() {
        let (_, _, models) = REMOTE_ORACLES[2];
        assert_eq!(parse_models(models).len(), 2);
    }

    #[test]
    fn test_from_env_registers_remote_oracles_in_order() {
        let config = Config::from_env().unwrap();
        let names: Vec<&str> = config.remotes.iter().map(|r| r.name.as_str()).collect();
        assert_eq!(names, vec!["qwen", "chatgpt", "gemini"]);
        assert!(config.remotes.iter().all(|r| !r.remote.models.is_empty()));
        assert!(config.max_image_bytes > 0);
    }
}
