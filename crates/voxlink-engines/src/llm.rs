//! Language-generation engine over an OpenAI-compatible chat completions API.

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::json;
use tracing::debug;

use voxlink_core::config::LlmConfig;
use voxlink_core::context::ContextMessage;
use voxlink_core::error::{Result, VoxlinkError};

const DEFAULT_BASE_URL: &str = "https://api.openai.com";
const DEFAULT_MODEL: &str = "gpt-4o-mini";

/// Generates one assistant reply from the conversation context.
#[async_trait]
pub trait LanguageGeneration: Send + Sync {
    async fn generate(&self, context: &[ContextMessage]) -> Result<String>;
}

pub struct HttpLanguageGeneration {
    config: LlmConfig,
    base_url: String,
    client: reqwest::Client,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChatMessage,
}

#[derive(Debug, Deserialize)]
struct ChatMessage {
    #[serde(default)]
    content: Option<String>,
}

impl HttpLanguageGeneration {
    pub fn new(config: LlmConfig) -> Self {
        let base_url = config
            .base_url
            .as_deref()
            .unwrap_or(DEFAULT_BASE_URL)
            .trim_end_matches('/')
            .to_string();
        Self {
            config,
            base_url,
            client: reqwest::Client::new(),
        }
    }

    pub fn completions_url(&self) -> String {
        format!("{}/v1/chat/completions", self.base_url)
    }
}

#[async_trait]
impl LanguageGeneration for HttpLanguageGeneration {
    async fn generate(&self, context: &[ContextMessage]) -> Result<String> {
        let api_key = self
            .config
            .resolve_api_key()
            .ok_or_else(|| VoxlinkError::Engine("No LLM API key configured".into()))?;

        let model = self.config.model.as_deref().unwrap_or(DEFAULT_MODEL);
        let mut body = json!({
            "model": model,
            "messages": context,
            "max_tokens": self.config.max_tokens.unwrap_or(1024),
        });
        if let Some(temperature) = self.config.temperature {
            body["temperature"] = json!(temperature);
        }

        debug!(model, messages = context.len(), "Requesting completion");

        let resp = self
            .client
            .post(self.completions_url())
            .header("Authorization", format!("Bearer {api_key}"))
            .json(&body)
            .send()
            .await
            .map_err(|e| VoxlinkError::Engine(e.to_string()))?;

        if !resp.status().is_success() {
            let status = resp.status();
            let body = resp.text().await.unwrap_or_default();
            return Err(VoxlinkError::Engine(format!(
                "Completions API error {status}: {body}"
            )));
        }

        let parsed: ChatResponse = resp
            .json()
            .await
            .map_err(|e| VoxlinkError::Engine(e.to_string()))?;

        let text = parsed
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .unwrap_or_default();

        if text.is_empty() {
            return Err(VoxlinkError::Engine("Empty completion".into()));
        }
        Ok(text)
    }
}
