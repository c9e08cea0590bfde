use anyhow::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::models::message::Message;
use crate::models::tool::Tool;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Usage {
    pub input_tokens: Option<i32>,
    pub output_tokens: Option<i32>,
    pub total_tokens: Option<i32>,
}

impl Usage {
    pub fn new(
        input_tokens: Option<i32>,
        output_tokens: Option<i32>,
        total_tokens: Option<i32>,
    ) -> Self {
        Self {
            input_tokens,
            output_tokens,
            total_tokens,
        }
    }
}

/// Per-request settings sent alongside the conversation
#[derive(Debug, Clone, Default, PartialEq)]
pub struct GenerateConfig {
    pub temperature: Option<f64>,
    /// Function declarations the model may call
    pub tools: Vec<Tool>,
    /// Attach the provider's built-in web search tool
    pub web_search: bool,
}

/// Metadata returned when a response was backed by a web search
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Grounding {
    pub source_uri: Option<String>,
    pub rendered_content: Option<String>,
    pub search_queries: Vec<String>,
}

impl Grounding {
    /// A short human readable note about the sources behind a response
    pub fn note(&self) -> Option<String> {
        if let Some(source) = self.source_uri.as_ref().or(self.rendered_content.as_ref()) {
            return Some(format!("Source (URI): {}", source));
        }
        if self.search_queries.is_empty() {
            return None;
        }
        let queries: Vec<&str> = self
            .search_queries
            .iter()
            .map(|q| q.trim())
            .filter(|q| !q.is_empty())
            .collect();
        if queries.is_empty() {
            Some("Web search was used (no specific queries).".to_string())
        } else {
            Some(format!("Search queries used: {}", queries.join(", ")))
        }
    }
}

/// Why the provider refused to answer, if it did
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PromptFeedback {
    pub block_reason: Option<String>,
    pub block_reason_message: Option<String>,
}

/// The outcome of a single generation call
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Generation {
    /// The first candidate's content, absent when the response was blocked or empty
    pub message: Option<Message>,
    pub grounding: Option<Grounding>,
    pub feedback: Option<PromptFeedback>,
    pub usage: Usage,
}

impl Generation {
    pub fn from_message(message: Message) -> Self {
        Self {
            message: Some(message),
            ..Default::default()
        }
    }

    pub fn blocked<R: Into<String>, M: Into<String>>(reason: R, message: M) -> Self {
        Self {
            feedback: Some(PromptFeedback {
                block_reason: Some(reason.into()),
                block_reason_message: Some(message.into()),
            }),
            ..Default::default()
        }
    }
}

/// Base trait for generation endpoints
#[async_trait]
pub trait Provider: Send + Sync {
    /// Generate the next turn for the given conversation
    async fn generate(
        &self,
        model: &str,
        contents: &[Message],
        config: &GenerateConfig,
    ) -> Result<Generation>;
}
