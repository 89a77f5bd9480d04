//! Synthesis finalizer: condenses accumulated research notes into the
//! user-facing answer at the end of a research task.

use std::sync::Arc;

use tracing::warn;

use crate::llm::{LlmClient, LlmRequest};
use crate::notes::{ResearchNotes, NOTES_SYNTHESIS_CHARS};

const SYNTHESIS_SYSTEM_PROMPT: &str = r#"You turn raw research notes gathered while browsing into a concise, well-organized answer. Include concrete facts, names, figures, and source URLs where the notes contain them. Point out gaps the notes leave open instead of papering over them. No preamble."#;

pub struct Synthesizer {
    llm: Arc<dyn LlmClient>,
}

impl Synthesizer {
    pub fn new(llm: Arc<dyn LlmClient>) -> Self {
        Self { llm }
    }

    /// Produce the final answer. A transport failure yields an explanatory
    /// message rather than an error: the session still completes.
    pub async fn synthesize(&self, task: &str, notes: &ResearchNotes) -> String {
        let window = notes.window_text(NOTES_SYNTHESIS_CHARS);
        let request = LlmRequest::new(
            SYNTHESIS_SYSTEM_PROMPT,
            format!("Task: {task}\n\nNotes (most recent last):\n{window}"),
        )
        .with_temperature(0.3)
        .with_max_tokens(1_500);
        match self.llm.complete(request).await {
            Ok(answer) => answer,
            Err(err) => {
                warn!(%err, "synthesis call failed");
                format!(
                    "Research notes were collected ({} entries) but the final summary could not \
                     be generated: {err}",
                    notes.len()
                )
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::ScriptedLlm;

    #[tokio::test]
    async fn returns_llm_answer() {
        let llm = Arc::new(ScriptedLlm::new());
        llm.push("The best monitor is X.");
        let synthesizer = Synthesizer::new(llm);
        let mut notes = ResearchNotes::new();
        notes.push("Step", "monitor X is great");
        let answer = synthesizer.synthesize("find monitors", &notes).await;
        assert_eq!(answer, "The best monitor is X.");
    }

    #[tokio::test]
    async fn failure_yields_explanatory_message() {
        let llm = Arc::new(ScriptedLlm::new());
        llm.push_error("offline");
        let synthesizer = Synthesizer::new(llm);
        let mut notes = ResearchNotes::new();
        notes.push("Step", "finding");
        let answer = synthesizer.synthesize("task", &notes).await;
        assert!(answer.contains("could not"));
        assert!(answer.contains("1 entries"));
    }
}
