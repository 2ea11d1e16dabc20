use std::future::Future;
use std::pin::Pin;

use serde_json::{Value, json};

use super::{AiBackend, AiError, AiRequest, send_request};

const DEFAULT_BASE_URL: &str = "https://api.openai.com/v1";
const DEFAULT_MODEL: &str = "gpt-4o";

/// OpenAI chat completions backend. Any OpenAI-compatible endpoint works via
/// [`with_base_url`](OpenAiBackend::with_base_url).
pub struct OpenAiBackend {
    client: reqwest::Client,
    api_key: String,
    base_url: String,
    model: String,
    temperature: f32,
    max_tokens: u32,
}

impl OpenAiBackend {
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
        let mut body = json!({
            "model": self.model,
            "temperature": self.temperature,
            "max_tokens": self.max_tokens,
            "messages": [
                {"role": "system", "content": request.system},
                {"role": "user", "content": request.input},
            ],
        });
        if request.json {
            body["response_format"] = json!({"type": "json_object"});
        }
        body
    }
}

/// Text of the first choice of a chat completion envelope.
fn message_content(envelope: &Value) -> Option<String> {
    envelope["choices"]
        .get(0)?
        .get("message")?
        .get("content")?
        .as_str()
        .map(str::to_string)
}

impl AiBackend for OpenAiBackend {
    fn name(&self) -> &str {
        "OpenAI"
    }

    fn complete<'a>(
        &'a self,
        request: AiRequest<'a>,
    ) -> Pin<Box<dyn Future<Output = Result<String, AiError>> + Send + 'a>> {
        Box::pin(async move {
            let url = format!("{}/chat/completions", self.base_url);
            let builder = self
                .client
                .post(&url)
                .bearer_auth(&self.api_key)
                .timeout(request.timeout)
                .json(&self.body(&request));

            let envelope = send_request(builder).await?;
            message_content(&envelope).ok_or_else(|| {
                AiError::Provider(format!("chat completion without content: {}", envelope))
            })
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ai::AiTask;
    use std::time::Duration;

    fn request(json: bool) -> AiRequest<'static> {
        AiRequest {
            task: AiTask::FieldCompletion,
            system: "Return JSON.",
            input: "{}",
            json,
            timeout: Duration::from_secs(5),
        }
    }

    #[test]
    fn json_tasks_request_json_object_format() {
        let backend = OpenAiBackend::new(reqwest::Client::new(), "k".into()).with_model("gpt-x");
        let body = backend.body(&request(true));
        assert_eq!(body["model"], "gpt-x");
        assert_eq!(body["response_format"]["type"], "json_object");
        assert_eq!(body["messages"][0]["role"], "system");

        let body = backend.body(&request(false));
        assert!(body.get("response_format").is_none());
    }

    #[test]
    fn reads_first_choice_content() {
        let envelope = json!({"choices": [{"message": {"role": "assistant", "content": "{\"a\":1}"}}]});
        assert_eq!(message_content(&envelope).as_deref(), Some("{\"a\":1}"));
        assert!(message_content(&json!({"choices": []})).is_none());
    }
}
