use thiserror::Error;
use webpilot_page_scanner::PageError;

/// Errors emitted by the agent-core crate.
#[derive(Debug, Error)]
pub enum AgentError {
    /// The LLM endpoint could not be reached or returned a non-success.
    #[error("llm transport failure: {0}")]
    LlmTransport(String),

    /// The LLM answered, but the payload failed schema validation even
    /// after auto-patching.
    #[error("llm response failed schema validation: {0}")]
    LlmSchema(String),

    /// A proposed action is malformed or references an unknown region.
    #[error("invalid action: {0}")]
    InvalidAction(String),

    /// Browser-side failure bubbled up from the page port.
    #[error(transparent)]
    Page(#[from] PageError),
}

impl AgentError {
    pub fn transport(message: impl Into<String>) -> Self {
        Self::LlmTransport(message.into())
    }

    pub fn schema(message: impl Into<String>) -> Self {
        Self::LlmSchema(message.into())
    }

    pub fn invalid_action(message: impl Into<String>) -> Self {
        Self::InvalidAction(message.into())
    }
}

pub type AgentResult<T> = Result<T, AgentError>;
