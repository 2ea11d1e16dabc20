//! Scripted AI backend for tests.

use std::collections::{HashMap, VecDeque};
use std::future::Future;
use std::pin::Pin;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use serde_json::Value;

use super::{AiBackend, AiError, AiRequest, AiTask};

/// A configurable mock response for [`MockAi`].
#[derive(Clone, Debug)]
pub enum MockResponse {
    /// Raw model text, returned as-is.
    Text(String),
    /// A JSON payload, serialized as the model text.
    Json(Value),
    /// Simulate a provider-side timeout.
    Timeout,
    /// Simulate a 429.
    RateLimited { retry_after: Option<Duration> },
    /// Simulate a generic provider error.
    Error(String),
    /// Never answer; the caller's timeout decides.
    Hang,
}

type Handler = Arc<dyn Fn(&str) -> MockResponse + Send + Sync>;

/// A hand-rolled mock implementing [`AiBackend`].
///
/// Per task it supports a fixed response, a sequence (last one repeats) or a
/// handler computing the response from the input text. Unscripted tasks fail
/// with a provider error.
#[derive(Default)]
pub struct MockAi {
    sequences: Mutex<HashMap<AiTask, VecDeque<MockResponse>>>,
    fallbacks: HashMap<AiTask, MockResponse>,
    handlers: HashMap<AiTask, Handler>,
    delay: Option<Duration>,
    calls: Mutex<Vec<(AiTask, String)>>,
    call_count: AtomicUsize,
}

impl MockAi {
    pub fn new() -> Self {
        Self::default()
    }

    /// Always answer `task` with `response`.
    pub fn respond(mut self, task: AiTask, response: MockResponse) -> Self {
        self.fallbacks.insert(task, response);
        self
    }

    /// Answer `task` with `responses` in order, repeating the last one.
    pub fn sequence(mut self, task: AiTask, responses: Vec<MockResponse>) -> Self {
        if let Some(last) = responses.last() {
            self.fallbacks.insert(task, last.clone());
        }
        if let Ok(mut seqs) = self.sequences.lock() {
            seqs.insert(task, responses.into());
        }
        self
    }

    /// Compute the answer for `task` from the request input.
    pub fn handler(
        mut self,
        task: AiTask,
        f: impl Fn(&str) -> MockResponse + Send + Sync + 'static,
    ) -> Self {
        self.handlers.insert(task, Arc::new(f));
        self
    }

    /// Simulated latency per call.
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    /// Calls made for `task`.
    pub fn call_count(&self, task: AiTask) -> usize {
        self.calls
            .lock()
            .map(|calls| calls.iter().filter(|(t, _)| *t == task).count())
            .unwrap_or(0)
    }

    /// Calls made for any task.
    pub fn total_calls(&self) -> usize {
        self.call_count.load(Ordering::SeqCst)
    }

    /// Inputs received for `task`, in call order.
    pub fn inputs(&self, task: AiTask) -> Vec<String> {
        self.calls
            .lock()
            .map(|calls| {
                calls
                    .iter()
                    .filter(|(t, _)| *t == task)
                    .map(|(_, input)| input.clone())
                    .collect()
            })
            .unwrap_or_default()
    }

    fn next_response(&self, task: AiTask, input: &str) -> MockResponse {
        if let Some(handler) = self.handlers.get(&task) {
            return handler(input);
        }
        let scripted = self
            .sequences
            .lock()
            .ok()
            .and_then(|mut seqs| seqs.get_mut(&task).and_then(VecDeque::pop_front));
        scripted
            .or_else(|| self.fallbacks.get(&task).cloned())
            .unwrap_or_else(|| MockResponse::Error(format!("no mock response for {}", task)))
    }
}

impl AiBackend for MockAi {
    fn name(&self) -> &str {
        "Mock"
    }

    fn complete<'a>(
        &'a self,
        request: AiRequest<'a>,
    ) -> Pin<Box<dyn Future<Output = Result<String, AiError>> + Send + 'a>> {
        self.call_count.fetch_add(1, Ordering::SeqCst);
        if let Ok(mut calls) = self.calls.lock() {
            calls.push((request.task, request.input.to_string()));
        }
        let response = self.next_response(request.task, request.input);
        let delay = self.delay;

        Box::pin(async move {
            if let Some(d) = delay {
                tokio::time::sleep(d).await;
            }
            match response {
                MockResponse::Text(text) => Ok(text),
                MockResponse::Json(value) => Ok(value.to_string()),
                MockResponse::Timeout => Err(AiError::Timeout),
                MockResponse::RateLimited { retry_after } => {
                    Err(AiError::RateLimited { retry_after })
                }
                MockResponse::Error(msg) => Err(AiError::Provider(msg)),
                MockResponse::Hang => {
                    std::future::pending::<()>().await;
                    Err(AiError::Timeout)
                }
            }
        })
    }
}
