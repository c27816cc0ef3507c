use crate::config::LlmConfig;
use anyhow::{Context, Result, anyhow};
use async_trait::async_trait;
use serde::Deserialize;
use serde_json::json;

/// A hosted text-generation model that answers a single prompt.
#[async_trait]
pub trait CompletionModel: Send + Sync {
    async fn complete(&self, prompt: &str) -> Result<String>;
}

pub struct LLMClient {
    client: reqwest::Client,
    api_url: String,
    api_key: String,
    model: String,
    temperature: f32,
}

#[derive(Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Deserialize)]
struct ChatChoice {
    message: ChatMessage,
}

#[derive(Deserialize)]
struct ChatMessage {
    content: Option<String>,
}

impl LLMClient {
    pub fn new(config: &LlmConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .user_agent(concat!("bookforge/", env!("CARGO_PKG_VERSION")))
            .build()
            .context("failed to build LLM HTTP client")?;

        Ok(LLMClient {
            client,
            api_url: config.api_url.clone(),
            api_key: config.api_key.clone(),
            model: config.model.clone(),
            temperature: config.temperature,
        })
    }
}

#[async_trait]
impl CompletionModel for LLMClient {
    async fn complete(&self, prompt: &str) -> Result<String> {
        tracing::info!(model = %self.model, "Requesting completion");

        let response = self
            .client
            .post(&self.api_url)
            .header("Content-Type", "application/json")
            .header("Authorization", format!("Bearer {}", self.api_key))
            .json(&json!({
                "model": self.model,
                "messages": [
                    { "role": "user", "content": prompt }
                ],
                "temperature": self.temperature
            }))
            .send()
            .await
            .context("LLM request failed")?;

        let status = response.status();
        if !status.is_success() {
            let error_text = response.text().await.unwrap_or_default();
            return Err(anyhow!("LLM API error ({}): {}", status, error_text));
        }

        let chat: ChatResponse = response
            .json()
            .await
            .context("failed to decode LLM response")?;

        let content = chat
            .choices
            .into_iter()
            .next()
            .and_then(|choice| choice.message.content)
            .ok_or_else(|| anyhow!("LLM response empty or missing content"))?;

        tracing::debug!(bytes = content.len(), "Completion received");
        Ok(content.trim().to_string())
    }
}
