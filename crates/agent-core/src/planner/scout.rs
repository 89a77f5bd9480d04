//! Scout preflight: decide whether the task names an ambiguous
//! institution-specific service whose URL must be verified by a live
//! search instead of guessed.

use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::errors::AgentResult;
use crate::llm::{LlmClient, LlmRequest};
use crate::util::extract_json_object;

/// A search result the scout actually observed in a live browser.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct VerifiedUrl {
    pub title: String,
    pub url: String,
}

/// Port to the live search runner (auxiliary visible browser in
/// production, scripted double in tests).
#[async_trait]
pub trait ScoutSearch: Send + Sync {
    /// Search for `query` and return up to three result links.
    async fn verify_urls(&self, query: &str) -> AgentResult<Vec<VerifiedUrl>>;
}

/// Scout that never searches; plans proceed without verified URLs.
pub struct NoScout;

#[async_trait]
impl ScoutSearch for NoScout {
    async fn verify_urls(&self, _query: &str) -> AgentResult<Vec<VerifiedUrl>> {
        Ok(Vec::new())
    }
}

const SCOUT_CLASSIFY_PROMPT: &str = r#"You decide whether a browser task mentions an ambiguous, institution-specific web service whose URL must not be guessed (a university portal, a company SSO page, an internal tool). Generic public sites (Google, YouTube, Amazon, Wikipedia) never qualify.

Respond with JSON only:
{"query": "<search engine query to find the service's real URL>"}
or, when no verification is needed:
{"query": null}"#;

/// One cheap LLM call; any failure degrades to "no verification needed".
pub async fn scout_query(llm: &Arc<dyn LlmClient>, task: &str) -> Option<String> {
    #[derive(Deserialize)]
    struct ScoutAnswer {
        query: Option<String>,
    }

    let request = LlmRequest::new(SCOUT_CLASSIFY_PROMPT, format!("Task: {task}"))
        .with_temperature(0.0)
        .with_max_tokens(128);
    let text = match llm.complete(request).await {
        Ok(text) => text,
        Err(err) => {
            debug!(%err, "scout classification failed, skipping URL verification");
            return None;
        }
    };
    let span = extract_json_object(&text)?;
    let answer: ScoutAnswer = serde_json::from_str(span).ok()?;
    answer.query.filter(|query| !query.trim().is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::ScriptedLlm;

    #[tokio::test]
    async fn parses_query_from_fenced_answer() {
        let llm = Arc::new(ScriptedLlm::new());
        llm.push("```json\n{\"query\": \"Acme University student portal\"}\n```");
        let llm: Arc<dyn LlmClient> = llm;
        let query = scout_query(&llm, "check my grades on the Acme portal").await;
        assert_eq!(query.as_deref(), Some("Acme University student portal"));
    }

    #[tokio::test]
    async fn null_sentinel_means_no_search() {
        let llm = Arc::new(ScriptedLlm::new());
        llm.push(r#"{"query": null}"#);
        let llm: Arc<dyn LlmClient> = llm;
        assert!(scout_query(&llm, "search for cats").await.is_none());
    }

    #[tokio::test]
    async fn transport_failure_degrades_to_none() {
        let llm = Arc::new(ScriptedLlm::new());
        llm.push_error("boom");
        let llm: Arc<dyn LlmClient> = llm;
        assert!(scout_query(&llm, "anything").await.is_none());
    }
}
