use anyhow::{anyhow, Result};
use async_trait::async_trait;
use reqwest::Client;
use reqwest::StatusCode;
use serde_json::{json, Value};
use std::time::Duration;

use super::base::{GenerateConfig, Generation, Provider};
use super::configs::GeminiProviderConfig;
use super::utils::{
    gemini_response_to_generation, generation_config_spec, messages_to_gemini_spec,
    tools_to_gemini_spec,
};
use crate::models::message::Message;

pub struct GeminiProvider {
    client: Client,
    config: GeminiProviderConfig,
}

impl GeminiProvider {
    pub fn new(config: GeminiProviderConfig) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(600)) // 10 minutes timeout
            .build()?;

        Ok(Self { client, config })
    }

    fn url(&self, model: &str) -> String {
        // Accept both "gemini-..." and the fully qualified "models/gemini-..." form
        let model = model.trim_start_matches("models/");
        format!(
            "{}/v1beta/models/{}:generateContent",
            self.config.host.trim_end_matches('/'),
            model
        )
    }

    async fn post(&self, model: &str, payload: Value) -> Result<Value> {
        let response = self
            .client
            .post(self.url(model))
            .header("x-goog-api-key", &self.config.api_key)
            .json(&payload)
            .send()
            .await?;

        match response.status() {
            StatusCode::OK => Ok(response.json().await?),
            status if status == StatusCode::TOO_MANY_REQUESTS || status.as_u16() >= 500 => {
                Err(anyhow!("Server error: {}", status))
            }
            status => {
                let body = response.text().await.unwrap_or_default();
                Err(anyhow!("Request failed: {}\nResponse: {}", status, body))
            }
        }
    }
}

#[async_trait]
impl Provider for GeminiProvider {
    async fn generate(
        &self,
        model: &str,
        contents: &[Message],
        config: &GenerateConfig,
    ) -> Result<Generation> {
        let mut payload = json!({
            "contents": messages_to_gemini_spec(contents),
            "generationConfig": generation_config_spec(config),
        });

        let tools_spec = tools_to_gemini_spec(config)?;
        if !tools_spec.is_empty() {
            payload["tools"] = json!(tools_spec);
        }

        tracing::debug!(model, turns = contents.len(), "sending generateContent request");
        let response = self.post(model, payload).await?;

        if let Some(error) = response.get("error") {
            return Err(anyhow!("Gemini API error: {}", error));
        }

        let generation = gemini_response_to_generation(&response)?;
        tracing::debug!(usage = ?generation.usage, "generateContent finished");
        Ok(generation)
    }
}
