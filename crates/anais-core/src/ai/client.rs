use std::sync::Arc;
use std::time::Duration;

use serde_json::Value;

use super::{AiBackend, AiError, AiRequest, AiTask, PromptSet};
use crate::Config;
use crate::rate_limit::{AdaptiveLimiter, RetryPolicy};

/// The extraction capability as the pipeline sees it: one backend bound to
/// its prompts, retry policy, per-call timeout and rate limiter.
pub struct AiClient {
    backend: Arc<dyn AiBackend>,
    prompts: PromptSet,
    retry: RetryPolicy,
    call_timeout: Duration,
    limiter: Option<AdaptiveLimiter>,
}

impl AiClient {
    pub fn new(backend: Arc<dyn AiBackend>) -> Self {
        Self {
            backend,
            prompts: PromptSet::default(),
            retry: RetryPolicy::default(),
            call_timeout: Duration::from_secs(120),
            limiter: None,
        }
    }

    /// Client with the retry, timeout and rate settings of `config`.
    pub fn from_config(backend: Arc<dyn AiBackend>, config: &Config, prompts: PromptSet) -> Self {
        let client = Self::new(backend)
            .with_prompts(prompts)
            .with_retry(config.retry_policy())
            .with_call_timeout(Duration::from_secs(config.ai_timeout_secs));
        if config.requests_per_minute > 0 {
            client.with_rate_limit(config.requests_per_minute)
        } else {
            client
        }
    }

    pub fn with_prompts(mut self, prompts: PromptSet) -> Self {
        self.prompts = prompts;
        self
    }

    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    pub fn with_call_timeout(mut self, timeout: Duration) -> Self {
        self.call_timeout = timeout;
        self
    }

    pub fn with_rate_limit(mut self, requests_per_minute: u32) -> Self {
        self.limiter = Some(AdaptiveLimiter::per_minute(requests_per_minute));
        self
    }

    pub fn provider(&self) -> &str {
        self.backend.name()
    }

    /// Invoke a JSON task and return the parsed payload.
    pub async fn invoke(&self, task: AiTask, input: &str) -> Result<Value, AiError> {
        self.invoke_with(task, input, |raw| {
            anais_parsing::extract_json(raw).map_err(|e| AiError::malformed(e.to_string(), raw))
        })
        .await
    }

    /// Invoke a JSON task and check the payload's shape with `validate`.
    ///
    /// A payload rejected by `validate` counts as a malformed response, so it
    /// is retried under the same policy as unparseable output.
    pub async fn invoke_validated<T>(
        &self,
        task: AiTask,
        input: &str,
        validate: impl Fn(Value) -> Result<T, AiError>,
    ) -> Result<T, AiError> {
        self.invoke_with(task, input, |raw| {
            let value = anais_parsing::extract_json(raw)
                .map_err(|e| AiError::malformed(e.to_string(), raw))?;
            validate(value)
        })
        .await
    }

    /// Invoke a free-text task and return the model output verbatim.
    pub async fn invoke_text(&self, task: AiTask, input: &str) -> Result<String, AiError> {
        self.invoke_with(task, input, |raw| Ok(raw.to_string())).await
    }

    async fn invoke_with<T>(
        &self,
        task: AiTask,
        input: &str,
        parse: impl Fn(&str) -> Result<T, AiError>,
    ) -> Result<T, AiError> {
        let mut attempt = 1;
        loop {
            let result = self.attempt(task, input).await.and_then(|raw| parse(&raw));
            let err = match result {
                Ok(value) => return Ok(value),
                Err(err) => err,
            };

            if let AiError::RateLimited { .. } = err
                && let Some(ref limiter) = self.limiter
            {
                limiter.on_rate_limited();
            }

            if !self.retry.should_retry(attempt, &err) {
                tracing::warn!(
                    provider = self.backend.name(),
                    task = %task,
                    attempts = attempt,
                    error = %err,
                    "AI call failed"
                );
                return Err(err);
            }

            let wait = self.retry.delay(attempt, &err);
            tracing::info!(
                provider = self.backend.name(),
                task = %task,
                attempt,
                wait_ms = wait.as_millis() as u64,
                error = %err,
                "AI call failed, retrying"
            );
            tokio::time::sleep(wait).await;
            attempt += 1;
        }
    }

    async fn attempt(&self, task: AiTask, input: &str) -> Result<String, AiError> {
        if let Some(ref limiter) = self.limiter {
            limiter.acquire().await;
        }
        let request = AiRequest {
            task,
            system: self.prompts.get(task),
            input,
            json: task.expects_json(),
            timeout: self.call_timeout,
        };
        match tokio::time::timeout(self.call_timeout, self.backend.complete(request)).await {
            Ok(result) => result,
            Err(_) => Err(AiError::Timeout),
        }
    }
}
