//! Semantic visibility gate: one cheap YES/NO call that decides whether
//! auto-scroll can stop because relevant content is already on screen.

use std::sync::Arc;

use tracing::debug;

use webpilot_core_types::Region;

use crate::llm::{LlmClient, LlmRequest};
use crate::util::truncate_chars;

const VISIBILITY_SYSTEM_PROMPT: &str = r#"You check whether a web page already shows content relevant to an objective. Accept synonyms and related wording (Dining matches Food, Catalog matches Classes). Navigation or links that clearly lead to the target count as relevant.

Answer with a single word: YES or NO."#;

/// Text budget for the visibility call; it is meant to stay cheap.
const VISIBILITY_TEXT_CHARS: usize = 1_500;
const VISIBILITY_LABELS: usize = 25;

pub struct VisibilityChecker {
    llm: Arc<dyn LlmClient>,
}

impl VisibilityChecker {
    pub fn new(llm: Arc<dyn LlmClient>) -> Self {
        Self { llm }
    }

    /// `true` means "relevant content is on screen, do not auto-scroll".
    /// Failures also return `true`: the decider handles ambiguity better
    /// than a blind scroll loop does.
    pub async fn visible(&self, objective: &str, page_text: &str, regions: &[Region]) -> bool {
        let labels = regions
            .iter()
            .take(VISIBILITY_LABELS)
            .map(|r| r.label.as_str())
            .collect::<Vec<_>>()
            .join(" | ");
        let user = format!(
            "Objective: {objective}\n\nVisible text:\n{}\n\nElement labels:\n{labels}",
            truncate_chars(page_text, VISIBILITY_TEXT_CHARS)
        );
        let request = LlmRequest::new(VISIBILITY_SYSTEM_PROMPT, user)
            .with_temperature(0.0)
            .with_max_tokens(8);
        match self.llm.complete(request).await {
            Ok(answer) => {
                let yes = answer.trim().to_uppercase().starts_with("YES");
                debug!(yes, "semantic visibility check");
                yes
            }
            Err(err) => {
                debug!(%err, "visibility check failed, assuming content visible");
                true
            }
        }
    }
}
