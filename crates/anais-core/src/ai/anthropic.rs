use std::future::Future;
use std::pin::Pin;

use serde_json::{Value, json};

use super::{AiBackend, AiError, AiRequest, send_request};

const DEFAULT_BASE_URL: &str = "https://api.anthropic.com";
const DEFAULT_MODEL: &str = "claude-3-opus-20240229";
const API_VERSION: &str = "2023-06-01";

/// Anthropic messages API backend.
pub struct AnthropicBackend {
    client: reqwest::Client,
    api_key: String,
    base_url: String,
    model: String,
    temperature: f32,
    max_tokens: u32,
}

impl AnthropicBackend {
    pub fn new(client: reqwest::Client, api_key: String) -> Self {
        Self {
            client,
            api_key,
            base_url: DEFAULT_BASE_URL.to_string(),
            model: DEFAULT_MODEL.to_string(),
            temperature: 0.0,
            max_tokens: 4000,
        }
    }

    pub fn with_model(mut self, model: &str) -> Self {
        self.model = model.to_string();
        self
    }

    pub fn with_base_url(mut self, url: &str) -> Self {
        self.base_url = url.trim_end_matches('/').to_string();
        self
    }

    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = temperature;
        self
    }

    pub fn with_max_tokens(mut self, max_tokens: u32) -> Self {
        self.max_tokens = max_tokens;
        self
    }

    fn body(&self, request: &AiRequest<'_>) -> Value {
        json!({
            "model": self.model,
            "max_tokens": self.max_tokens,
            "temperature": self.temperature,
            "system": request.system,
            "messages": [{"role": "user", "content": request.input}],
        })
    }
}

/// Concatenated text blocks of a messages API response.
fn response_text(envelope: &Value) -> Option<String> {
    let blocks = envelope["content"].as_array()?;
    let text: String = blocks
        .iter()
        .filter(|b| b["type"] == "text")
        .filter_map(|b| b["text"].as_str())
        .collect();
    if text.is_empty() { None } else { Some(text) }
}

impl AiBackend for AnthropicBackend {
    fn name(&self) -> &str {
        "Anthropic"
    }

    fn complete<'a>(
        &'a self,
        request: AiRequest<'a>,
    ) -> Pin<Box<dyn Future<Output = Result<String, AiError>> + Send + 'a>> {
        Box::pin(async move {
            let url = format!("{}/v1/messages", self.base_url);
            let builder = self
                .client
                .post(&url)
                .header("x-api-key", &self.api_key)
                .header("anthropic-version", API_VERSION)
                .timeout(request.timeout)
                .json(&self.body(&request));

            let envelope = send_request(builder).await?;
            response_text(&envelope).ok_or_else(|| {
                AiError::Provider(format!("message without text content: {}", envelope))
            })
        })
    }
}
