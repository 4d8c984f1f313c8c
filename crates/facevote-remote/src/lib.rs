//! facevote-remote — Vision-language model oracles.
//!
//! Speaks the OpenAI-compatible chat-completions protocol (OpenRouter by
//! default). Each oracle owns its HTTP client, rate limiter and ordered model
//! list; retries and model fallback go through the pipeline's shared driver.

mod protocol;
pub mod oracle;
pub mod reply;

pub use oracle::{classify_status, RemoteConfig, VisionLlmOracle, COMPARISON_PROMPT, DEFAULT_BASE_URL};
pub use reply::{parse_verdict, Verdict};
