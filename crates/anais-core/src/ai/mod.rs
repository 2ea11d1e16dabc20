//! AI extraction capability: the backend trait and its provider implementations.

pub mod anthropic;
pub mod client;
pub mod mock;
pub mod openai;
pub mod prompts;

use std::fmt;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::rate_limit::parse_retry_after;
use crate::{Config, CoreError, ProviderKind};

pub use anthropic::AnthropicBackend;
pub use client::AiClient;
pub use openai::OpenAiBackend;
pub use prompts::PromptSet;

/// Task identifiers understood by the extraction capability.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AiTask {
    ArticleExtraction,
    ReferencesExtraction,
    FieldCompletion,
    AuthorAffiliationCorrection,
    TextProcessing,
}

impl AiTask {
    pub const ALL: [AiTask; 5] = [
        AiTask::ArticleExtraction,
        AiTask::ReferencesExtraction,
        AiTask::FieldCompletion,
        AiTask::AuthorAffiliationCorrection,
        AiTask::TextProcessing,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            AiTask::ArticleExtraction => "article_extraction",
            AiTask::ReferencesExtraction => "references_extraction",
            AiTask::FieldCompletion => "field_completion",
            AiTask::AuthorAffiliationCorrection => "author_affiliation_correction",
            AiTask::TextProcessing => "text_processing",
        }
    }

    /// Whether the task answers with structured JSON (every task but text repair).
    pub fn expects_json(&self) -> bool {
        !matches!(self, AiTask::TextProcessing)
    }
}

impl fmt::Display for AiTask {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Failure of one AI invocation.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum AiError {
    #[error("AI call timed out")]
    Timeout,
    #[error("rate limited by provider")]
    RateLimited { retry_after: Option<Duration> },
    #[error("provider error: {0}")]
    Provider(String),
    #[error("malformed response: {reason}")]
    MalformedResponse { reason: String, raw: String },
}

impl AiError {
    /// Timeouts, 429s and provider faults are worth another attempt.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            AiError::Timeout | AiError::RateLimited { .. } | AiError::Provider(_)
        )
    }

    /// Raw model output, when the failure carried one.
    pub fn raw_response(&self) -> Option<&str> {
        match self {
            AiError::MalformedResponse { raw, .. } => Some(raw),
            _ => None,
        }
    }

    pub(crate) fn malformed(reason: impl Into<String>, raw: impl Into<String>) -> Self {
        AiError::MalformedResponse {
            reason: reason.into(),
            raw: raw.into(),
        }
    }
}

/// One request to a provider.
#[derive(Debug, Clone, Copy)]
pub struct AiRequest<'a> {
    pub task: AiTask,
    pub system: &'a str,
    pub input: &'a str,
    /// Ask the provider for a JSON object response.
    pub json: bool,
    pub timeout: Duration,
}

/// A provider able to answer a system prompt plus input text.
///
/// Implementations return the raw model text; JSON extraction and retries
/// live in [`AiClient`].
pub trait AiBackend: Send + Sync {
    /// Provider name used in logs and rate limiter keys.
    fn name(&self) -> &str;

    fn complete<'a>(
        &'a self,
        request: AiRequest<'a>,
    ) -> Pin<Box<dyn Future<Output = Result<String, AiError>> + Send + 'a>>;
}

/// Build the backend selected by the configuration.
///
/// Fails when the provider's credential is absent; this is checked before any
/// article is processed.
pub fn build_backend(config: &Config) -> Result<Arc<dyn AiBackend>, CoreError> {
    let api_key = config
        .api_key
        .clone()
        .filter(|k| !k.trim().is_empty())
        .ok_or(CoreError::MissingCredential(config.provider.api_key_env()))?;
    let client = reqwest::Client::builder()
        .pool_idle_timeout(Duration::from_secs(30))
        .build()?;

    Ok(match config.provider {
        ProviderKind::OpenAi => {
            let mut backend = OpenAiBackend::new(client, api_key)
                .with_temperature(config.temperature)
                .with_max_tokens(config.max_tokens);
            if let Some(ref model) = config.model {
                backend = backend.with_model(model);
            }
            if let Some(ref url) = config.base_url {
                backend = backend.with_base_url(url);
            }
            Arc::new(backend)
        }
        ProviderKind::Anthropic => {
            let mut backend = AnthropicBackend::new(client, api_key)
                .with_temperature(config.temperature)
                .with_max_tokens(config.max_tokens);
            if let Some(ref model) = config.model {
                backend = backend.with_model(model);
            }
            if let Some(ref url) = config.base_url {
                backend = backend.with_base_url(url);
            }
            Arc::new(backend)
        }
    })
}

/// Send a provider request and decode the JSON envelope, mapping HTTP
/// failures onto [`AiError`].
pub(crate) async fn send_request(
    request: reqwest::RequestBuilder,
) -> Result<serde_json::Value, AiError> {
    let resp = request.send().await.map_err(|e| {
        if e.is_timeout() {
            AiError::Timeout
        } else {
            AiError::Provider(e.to_string())
        }
    })?;

    let status = resp.status();
    if status.as_u16() == 429 {
        let retry_after = resp
            .headers()
            .get("retry-after")
            .and_then(|v| v.to_str().ok())
            .and_then(parse_retry_after);
        return Err(AiError::RateLimited { retry_after });
    }
    if !status.is_success() {
        let body = resp.text().await.unwrap_or_default();
        let snippet: String = body.chars().take(300).collect();
        return Err(AiError::Provider(format!("HTTP {}: {}", status, snippet)));
    }

    resp.json::<serde_json::Value>().await.map_err(|e| {
        if e.is_timeout() {
            AiError::Timeout
        } else {
            AiError::Provider(format!("invalid provider envelope: {}", e))
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_text_processing_is_free_text() {
        for task in AiTask::ALL {
            assert_eq!(task.expects_json(), task != AiTask::TextProcessing);
        }
    }

    #[test]
    fn transient_classification() {
        assert!(AiError::Timeout.is_transient());
        assert!(AiError::Provider("502".into()).is_transient());
        assert!(AiError::RateLimited { retry_after: None }.is_transient());
        assert!(!AiError::malformed("no json", "sorry").is_transient());
    }

    #[test]
    fn missing_credential_is_fatal() {
        let config = Config {
            api_key: None,
            ..Config::default()
        };
        match build_backend(&config) {
            Err(CoreError::MissingCredential(var)) => assert_eq!(var, "OPENAI_API_KEY"),
            other => panic!("expected missing credential, got {:?}", other.err()),
        }
    }
}
