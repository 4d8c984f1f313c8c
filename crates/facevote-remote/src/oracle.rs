use crate::protocol::{jpeg_data_url, ChatRequest, ChatResponse};
use crate::reply::{parse_verdict, provenance};
use async_trait::async_trait;
use facevote_core::OracleId;
use facevote_pipeline::{call_with_fallback, Opinion, Oracle, OracleError, RateLimiter, RetryPolicy};
use image::DynamicImage;
use reqwest::StatusCode;
use std::time::Duration;

pub const DEFAULT_BASE_URL: &str = "https://openrouter.ai/api/v1";
pub const COMPARISON_PROMPT: &str =
    "Are these two images showing the same person? Answer only YES or NO.";
const JPEG_QUALITY: u8 = 95;

/// Connection settings for one remote oracle.
#[derive(Debug, Clone)]
pub struct RemoteConfig {
    /// `None` makes every call fail with a configuration error.
    pub api_key: Option<String>,
    pub base_url: String,
    /// Tried in order; later entries are fallbacks.
    pub models: Vec<String>,
    pub retry: RetryPolicy,
    /// Minimum spacing between request starts.
    pub rate_delay: Duration,
    pub request_timeout: Duration,
}

impl RemoteConfig {
    pub fn new(api_key: Option<String>, models: Vec<String>) -> Self {
        Self {
            api_key,
            base_url: DEFAULT_BASE_URL.to_string(),
            models,
            retry: RetryPolicy::default(),
            rate_delay: Duration::from_secs(1),
            request_timeout: Duration::from_secs(30),
        }
    }
}

/// A vision-capable chat model asked whether two images show the same person.
pub struct VisionLlmOracle {
    id: OracleId,
    client: reqwest::Client,
    config: RemoteConfig,
    limiter: RateLimiter,
}

impl VisionLlmOracle {
    pub fn new(id: impl Into<OracleId>, config: RemoteConfig) -> Self {
        Self {
            id: id.into(),
            client: reqwest::Client::new(),
            limiter: RateLimiter::new(config.rate_delay),
            config,
        }
    }

    pub fn id(&self) -> &OracleId {
        &self.id
    }

    pub fn is_configured(&self) -> bool {
        self.config.api_key.is_some() && !self.config.models.is_empty()
    }

    async fn ask(&self, api_key: &str, model: String, images: &[String; 2]) -> Result<String, OracleError> {
        self.limiter.acquire().await;
        tracing::debug!(oracle = %self.id, model = %model, "sending comparison request");

        let url = format!("{}/chat/completions", self.config.base_url.trim_end_matches('/'));
        let response = self
            .client
            .post(url)
            .bearer_auth(api_key)
            .timeout(self.config.request_timeout)
            .json(&ChatRequest::compare(&model, images, COMPARISON_PROMPT))
            .send()
            .await
            .map_err(|e| self.transport_error(e))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(classify_status(status, &model, &body));
        }

        let parsed: ChatResponse = response
            .json()
            .await
            .map_err(|e| OracleError::Request(format!("malformed response from {model}: {e}")))?;
        parsed
            .into_text()
            .ok_or_else(|| OracleError::Request(format!("empty response from {model}")))
    }

    fn transport_error(&self, err: reqwest::Error) -> OracleError {
        if err.is_timeout() {
            OracleError::Timeout(self.config.request_timeout)
        } else {
            OracleError::Request(err.to_string())
        }
    }
}

/// Map a non-success HTTP status onto the oracle error taxonomy.
pub fn classify_status(status: StatusCode, model: &str, body: &str) -> OracleError {
    let detail: String = body.chars().take(200).collect();
    match status {
        StatusCode::TOO_MANY_REQUESTS => OracleError::RateLimited(format!("{model}: {detail}")),
        StatusCode::NOT_FOUND => OracleError::ModelUnavailable(model.to_string()),
        StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => {
            OracleError::Unauthorized(format!("{model}: HTTP {status}"))
        }
        _ => OracleError::Request(format!("{model}: HTTP {status}: {detail}")),
    }
}

#[async_trait]
impl Oracle for VisionLlmOracle {
    async fn compare(&self, a: &DynamicImage, b: &DynamicImage) -> Result<Opinion, OracleError> {
        let api_key = self
            .config
            .api_key
            .as_deref()
            .ok_or_else(|| OracleError::NotConfigured(format!("{}: no API key", self.id)))?;

        let images = [jpeg_data_url(a, JPEG_QUALITY)?, jpeg_data_url(b, JPEG_QUALITY)?];

        let answer = call_with_fallback(
            self.id.as_str(),
            &self.config.models,
            &self.config.retry,
            |model| self.ask(api_key, model, &images),
        )
        .await?;

        let verdict = parse_verdict(&answer.value);
        if verdict.unclear {
            tracing::warn!(oracle = %self.id, reply = %answer.value, "unclear reply; counting as different");
        }
        Ok(Opinion::new(
            verdict.outcome,
            provenance(self.id.as_str(), &answer.value, &verdict, answer.model_index),
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use facevote_core::Outcome;
    use facevote_pipeline::ErrorClass;
    use serde_json::json;
    use wiremock::matchers::{body_partial_json, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn reply(text: &str) -> ResponseTemplate {
        ResponseTemplate::new(200).set_body_json(json!({
            "choices": [{"message": {"role": "assistant", "content": text}}]
        }))
    }

    fn oracle(server: &MockServer, models: &[&str]) -> VisionLlmOracle {
        let config = RemoteConfig {
            api_key: Some("test-key".into()),
            base_url: format!("{}/api/v1", server.uri()),
            models: models.iter().map(|m| m.to_string()).collect(),
            retry: RetryPolicy {
                max_retries: 2,
                delay: Duration::from_millis(5),
                backoff_cap: Duration::from_millis(20),
            },
            rate_delay: Duration::ZERO,
            request_timeout: Duration::from_secs(5),
        };
        VisionLlmOracle::new("qwen", config)
    }

    fn images() -> (DynamicImage, DynamicImage) {
        (DynamicImage::new_rgb8(8, 8), DynamicImage::new_rgb8(8, 8))
    }

    #[tokio::test]
    async fn test_yes_reply_is_same() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/v1/chat/completions"))
            .and(header("authorization", "Bearer test-key"))
            .and(body_partial_json(json!({"max_tokens": 50, "model": "m1"})))
            .respond_with(reply("YES"))
            .expect(1)
            .mount(&server)
            .await;

        let (a, b) = images();
        let opinion = oracle(&server, &["m1"]).compare(&a, &b).await.unwrap();
        assert_eq!(opinion.outcome, Outcome::Same);
        assert_eq!(opinion.provenance, "qwen_YES");

        let requests = server.received_requests().await.unwrap();
        let body: serde_json::Value = requests[0].body_json().unwrap();
        let content = &body["messages"][0]["content"];
        assert_eq!(content[2]["text"], COMPARISON_PROMPT);
        assert!(content[0]["image_url"]["url"]
            .as_str()
            .unwrap()
            .starts_with("data:image/jpeg;base64,"));
    }

    #[tokio::test]
    async fn test_rate_limit_retries_same_model() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(429))
            .up_to_n_times(1)
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .respond_with(reply("No."))
            .mount(&server)
            .await;

        let (a, b) = images();
        let opinion = oracle(&server, &["m1"]).compare(&a, &b).await.unwrap();
        assert_eq!(opinion.outcome, Outcome::Different);
        assert_eq!(server.received_requests().await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_missing_model_falls_back() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(body_partial_json(json!({"model": "gone"})))
            .respond_with(ResponseTemplate::new(404))
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(body_partial_json(json!({"model": "backup"})))
            .respond_with(reply("yes"))
            .expect(1)
            .mount(&server)
            .await;

        let (a, b) = images();
        let opinion = oracle(&server, &["gone", "backup"])
            .compare(&a, &b)
            .await
            .unwrap();
        assert_eq!(opinion.outcome, Outcome::Same);
        assert_eq!(opinion.provenance, "qwen_YES_fallback1");
    }

    #[tokio::test]
    async fn test_unauthorized_stops_immediately() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(401))
            .expect(1)
            .mount(&server)
            .await;

        let (a, b) = images();
        let err = oracle(&server, &["m1", "m2"])
            .compare(&a, &b)
            .await
            .unwrap_err();
        assert_eq!(err.class(), ErrorClass::Configuration);
    }

    #[tokio::test]
    async fn test_server_errors_exhaust_retries() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(503))
            .expect(2)
            .mount(&server)
            .await;

        let (a, b) = images();
        let err = oracle(&server, &["m1"]).compare(&a, &b).await.unwrap_err();
        assert_eq!(err.class(), ErrorClass::Transient);
    }

    #[tokio::test]
    async fn test_missing_key_makes_no_request() {
        let server = MockServer::start().await;
        let mut o = oracle(&server, &["m1"]);
        o.config.api_key = None;
        assert!(!o.is_configured());

        let (a, b) = images();
        let err = o.compare(&a, &b).await.unwrap_err();
        assert!(matches!(err, OracleError::NotConfigured(_)));
        assert!(server.received_requests().await.unwrap().is_empty());
    }

    #[test]
    fn test_classify_status() {
        let class = |code: u16| {
            classify_status(StatusCode::from_u16(code).unwrap(), "m", "").class()
        };
        assert_eq!(class(429), ErrorClass::RateLimited);
        assert_eq!(class(404), ErrorClass::ModelUnavailable);
        assert_eq!(class(401), ErrorClass::Configuration);
        assert_eq!(class(403), ErrorClass::Configuration);
        assert_eq!(class(500), ErrorClass::Transient);
        assert_eq!(class(400), ErrorClass::Transient);
    }
}
