//! Model fallback and retry driver shared by oracle clients.
//!
//! Branches on [`ErrorClass`] only; providers' error wording never matters here.

use crate::oracle::{ErrorClass, OracleError};
use std::future::Future;
use std::time::Duration;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Attempts per model identifier (at least one is always made).
    pub max_retries: u32,
    /// Base delay between attempts; also the rate-limit backoff unit.
    pub delay: Duration,
    /// Upper bound for rate-limit backoff.
    pub backoff_cap: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 3,
            delay: Duration::from_secs(1),
            backoff_cap: Duration::from_secs(10),
        }
    }
}

impl RetryPolicy {
    /// Backoff after the `attempt`-th (0-based) rate-limited call: `delay × (attempt + 2)`, capped.
    pub fn rate_limit_backoff(&self, attempt: u32) -> Duration {
        self.delay
            .saturating_mul(attempt.saturating_add(2))
            .min(self.backoff_cap)
    }
}

/// A successful answer and the model that produced it.
#[derive(Debug, Clone, PartialEq)]
pub struct Answer<T> {
    pub value: T,
    pub model: String,
    /// Position of `model` in the configured list; > 0 means a fallback model answered.
    pub model_index: usize,
}

/// Try `models` in order until one answers.
///
/// - `RateLimited`: retry the same model with capped, increasing backoff.
/// - `Transient`: retry the same model after the base delay.
/// - `ModelUnavailable`: move on to the next model immediately.
/// - `Configuration` / `NoOpinion`: give up at once.
///
/// A model whose attempts are exhausted yields to the next one; if every
/// model fails, the last error is returned.
pub async fn call_with_fallback<T, F, Fut>(
    oracle: &str,
    models: &[String],
    policy: &RetryPolicy,
    mut call: F,
) -> Result<Answer<T>, OracleError>
where
    F: FnMut(String) -> Fut,
    Fut: Future<Output = Result<T, OracleError>>,
{
    let attempts = policy.max_retries.max(1);
    let mut last_err = OracleError::NotConfigured(format!("{oracle}: no models configured"));

    'models: for (model_index, model) in models.iter().enumerate() {
        for attempt in 0..attempts {
            let err = match call(model.clone()).await {
                Ok(value) => {
                    return Ok(Answer {
                        value,
                        model: model.clone(),
                        model_index,
                    })
                }
                Err(err) => err,
            };

            let class = err.class();
            let is_last_attempt = attempt + 1 == attempts;
            match class {
                ErrorClass::RateLimited => {
                    let wait = policy.rate_limit_backoff(attempt);
                    tracing::warn!(oracle, model = %model, attempt, ?wait, "rate limited");
                    last_err = err;
                    if !is_last_attempt {
                        tokio::time::sleep(wait).await;
                    }
                }
                ErrorClass::Transient => {
                    tracing::warn!(oracle, model = %model, attempt, error = %err, "call failed");
                    last_err = err;
                    if !is_last_attempt {
                        tokio::time::sleep(policy.delay).await;
                    }
                }
                ErrorClass::ModelUnavailable => {
                    tracing::warn!(oracle, model = %model, "model unavailable; trying next");
                    last_err = err;
                    continue 'models;
                }
                ErrorClass::Configuration | ErrorClass::NoOpinion => return Err(err),
            }
        }
        tracing::warn!(oracle, model = %model, attempts, "attempts exhausted");
    }

    Err(last_err)
}
