//! OpenAI-compatible chat-completions client behind the `LlmClient` seam.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::debug;

use webpilot_agent_core::{AgentError, AgentResult, LlmClient, LlmRequest};

use crate::config::Config;

const REQUEST_TIMEOUT: Duration = Duration::from_secs(60);

/// Client used when no API key is configured. Every call fails as a
/// transport error, so the rule-based planner and the decider's graduated
/// fallback carry the session.
pub struct OfflineLlm;

#[async_trait]
impl LlmClient for OfflineLlm {
    async fn complete(&self, _request: LlmRequest) -> AgentResult<String> {
        Err(AgentError::transport("no llm endpoint configured"))
    }
}

#[derive(Clone, Debug)]
pub struct OpenAiConfig {
    pub base_url: String,
    pub api_key: String,
    pub model: String,
}

impl OpenAiConfig {
    pub fn from_config(config: &Config) -> Option<Self> {
        Some(Self {
            base_url: config.llm_base_url.clone(),
            api_key: config.llm_api_key.clone()?,
            model: config.llm_model.clone(),
        })
    }
}

pub struct OpenAiLlmClient {
    client: Client,
    config: OpenAiConfig,
}

impl OpenAiLlmClient {
    pub fn new(config: OpenAiConfig) -> Self {
        let client = Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .unwrap_or_default();
        Self { client, config }
    }
}

#[derive(Serialize)]
struct ChatRequest {
    model: String,
    messages: Vec<ChatMessage>,
    max_tokens: u32,
    temperature: f32,
}

#[derive(Serialize, Deserialize)]
struct ChatMessage {
    role: String,
    content: String,
}

#[derive(Deserialize)]
struct ChatResponse {
    choices: Vec<Choice>,
}

#[derive(Deserialize)]
struct Choice {
    message: ChatMessage,
}

#[async_trait]
impl LlmClient for OpenAiLlmClient {
    async fn complete(&self, request: LlmRequest) -> AgentResult<String> {
        let mut messages = Vec::with_capacity(2);
        if !request.system.is_empty() {
            messages.push(ChatMessage {
                role: "system".to_string(),
                content: request.system,
            });
        }
        messages.push(ChatMessage {
            role: "user".to_string(),
            content: request.user,
        });

        let body = ChatRequest {
            model: self.config.model.clone(),
            messages,
            max_tokens: request.max_tokens,
            temperature: request.temperature,
        };

        debug!(model = %self.config.model, "llm chat completion request");

        let response = self
            .client
            .post(format!("{}/chat/completions", self.config.base_url))
            .header("Authorization", format!("Bearer {}", self.config.api_key))
            .json(&body)
            .send()
            .await
            .map_err(|err| AgentError::transport(err.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let detail = response.text().await.unwrap_or_default();
            return Err(AgentError::transport(format!(
                "llm endpoint returned {status}: {detail}"
            )));
        }

        let parsed: ChatResponse = response
            .json()
            .await
            .map_err(|err| AgentError::transport(err.to_string()))?;
        parsed
            .choices
            .into_iter()
            .next()
            .map(|choice| choice.message.content)
            .ok_or_else(|| AgentError::schema("llm response had no choices"))
    }
}
