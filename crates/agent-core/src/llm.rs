//! Abstraction over the LLM endpoint so multiple vendors (and scripted
//! test doubles) can plug into the planner, decider and synthesizer.

use std::collections::VecDeque;

use async_trait::async_trait;
use parking_lot::Mutex;

use crate::errors::{AgentError, AgentResult};

/// One completion request. `system` and `user` map onto chat roles.
#[derive(Clone, Debug)]
pub struct LlmRequest {
    pub system: String,
    pub user: String,
    pub temperature: f32,
    pub max_tokens: u32,
}

impl LlmRequest {
    pub fn new(system: impl Into<String>, user: impl Into<String>) -> Self {
        Self {
            system: system.into(),
            user: user.into(),
            temperature: 0.2,
            max_tokens: 1_024,
        }
    }

    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = temperature;
        self
    }

    pub fn with_max_tokens(mut self, max_tokens: u32) -> Self {
        self.max_tokens = max_tokens;
        self
    }
}

#[async_trait]
pub trait LlmClient: Send + Sync {
    /// Return the raw completion text for the request.
    async fn complete(&self, request: LlmRequest) -> AgentResult<String>;
}

/// Deterministic client used for tests and offline development: pops
/// queued responses in order, errors when the script runs dry.
#[derive(Debug, Default)]
pub struct ScriptedLlm {
    responses: Mutex<VecDeque<AgentResult<String>>>,
    requests: Mutex<Vec<LlmRequest>>,
}

impl ScriptedLlm {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&self, response: impl Into<String>) -> &Self {
        self.responses.lock().push_back(Ok(response.into()));
        self
    }

    pub fn push_error(&self, message: impl Into<String>) -> &Self {
        self.responses
            .lock()
            .push_back(Err(AgentError::transport(message)));
        self
    }

    /// Requests observed so far, for prompt assertions.
    pub fn seen(&self) -> Vec<LlmRequest> {
        self.requests.lock().clone()
    }
}

#[async_trait]
impl LlmClient for ScriptedLlm {
    async fn complete(&self, request: LlmRequest) -> AgentResult<String> {
        self.requests.lock().push(request);
        self.responses
            .lock()
            .pop_front()
            .unwrap_or_else(|| Err(AgentError::transport("scripted llm exhausted")))
    }
}
