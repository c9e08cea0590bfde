use anyhow::{anyhow, Result};
use async_trait::async_trait;
use std::collections::VecDeque;
use std::sync::Mutex;

use crate::models::message::Message;
use crate::providers::base::{GenerateConfig, Generation, Provider};

/// A request as seen by the mock provider
#[derive(Debug, Clone)]
pub struct RecordedRequest {
    pub model: String,
    pub contents: Vec<Message>,
    pub config: GenerateConfig,
}

enum Scripted {
    Generation(Generation),
    Error(String),
}

/// A mock provider that returns pre-configured responses for testing
#[derive(Default)]
pub struct MockProvider {
    responses: Mutex<VecDeque<Scripted>>,
    requests: Mutex<Vec<RecordedRequest>>,
}

impl MockProvider {
    /// Create a new mock provider with a sequence of responses
    pub fn new(responses: Vec<Generation>) -> Self {
        Self {
            responses: Mutex::new(responses.into_iter().map(Scripted::Generation).collect()),
            requests: Mutex::new(Vec::new()),
        }
    }

    /// Convenience for a sequence of plain model messages
    pub fn with_messages(messages: Vec<Message>) -> Self {
        Self::new(messages.into_iter().map(Generation::from_message).collect())
    }

    /// Queue a failing call after the already scripted responses
    pub fn then_error<S: Into<String>>(self, error: S) -> Self {
        self.responses
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push_back(Scripted::Error(error.into()));
        self
    }

    /// Every request received so far, in order
    pub fn requests(&self) -> Vec<RecordedRequest> {
        self.requests
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }

    pub fn call_count(&self) -> usize {
        self.requests.lock().unwrap_or_else(|e| e.into_inner()).len()
    }
}

#[async_trait]
impl Provider for MockProvider {
    async fn generate(
        &self,
        model: &str,
        contents: &[Message],
        config: &GenerateConfig,
    ) -> Result<Generation> {
        self.requests
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(RecordedRequest {
                model: model.to_string(),
                contents: contents.to_vec(),
                config: config.clone(),
            });

        let next = self
            .responses
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .pop_front();
        match next {
            Some(Scripted::Generation(generation)) => Ok(generation),
            Some(Scripted::Error(error)) => Err(anyhow!(error)),
            None => Err(anyhow!("mock provider has no more scripted responses")),
        }
    }
}
