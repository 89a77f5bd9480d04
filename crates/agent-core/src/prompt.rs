//! Prompt templates and composition for the decision stage.

use crate::action::Action;
use crate::history::HistoryEntry;
use crate::outcome::ActionOutcome;
use crate::util::truncate_chars;
use webpilot_core_types::Region;

/// Visible page text injected per decision.
pub const PAGE_TEXT_CHARS: usize = 4_000;
/// Regions listed per decision.
pub const MAX_PROMPT_REGIONS: usize = 40;

pub const DECIDER_SYSTEM_PROMPT: &str = r#"You drive a real web browser one action at a time. Each turn you receive the task context, the current URL, recent actions, visible page text, and the interactive regions found on screen. Choose exactly one next action.

Respond with JSON only:
{
  "action": { "type": "<ACTION_TYPE>", ... },
  "reasoning": "<one or two sentences>",
  "confidence": 0.0-1.0
}

Action types:
- {"type": "VISION_CLICK", "regionId": "element-.."} - cursor click on a region
- {"type": "DOM_CLICK", "regionId": "element-.."} - instant click (also accepts "role"+"name" or "selector")
- {"type": "VISION_FILL", "regionId": "element-..", "value": "text"} - type into a field
- {"type": "DOM_FILL", "regionId": "element-..", "value": "text"}
- {"type": "KEY_PRESS", "key": "Enter", "regionId": "element-.. (optional)"}
- {"type": "SCROLL", "direction": "up"|"down", "amount": 600}
- {"type": "WAIT", "duration": 1000} or {"type": "WAIT", "until": "networkidle"}
- {"type": "ASK_USER", "message": "why manual help is needed"}
- {"type": "CONFIRM", "message": "what you want permission to do"}
- {"type": "DONE", "reason": "why the CURRENT objective is satisfied"}

Strict rules:
- Only use regionId values from the region list of THIS turn; they do not survive page changes.
- Fill values must come from the task itself. Never invent emails, names, or credentials.
- If the last action reported stateChanged=false, do NOT repeat it unchanged.
- Stay within the current objective. Do not start later plan steps.
- DONE means the objective is satisfied, not "a promising page opened". A search-results page is never DONE for a research objective; DONE requires the content itself to have been reached and read.
- Use ASK_USER for login walls, MFA prompts, and CAPTCHAs."#;

/// Assemble the user-side prompt for one decision.
#[allow(clippy::too_many_arguments)]
pub fn compose_decision_prompt(
    context_prompt: &str,
    url: &str,
    history: &[HistoryEntry],
    page_text: &str,
    regions: &[Region],
    last_action: Option<&Action>,
    last_outcome: Option<&ActionOutcome>,
    scroll_status: &str,
    feedback: Option<&str>,
) -> String {
    let mut prompt = String::with_capacity(8_192);
    prompt.push_str(context_prompt);
    prompt.push_str("\n\nCurrent URL: ");
    prompt.push_str(url);

    prompt.push_str("\n\nRecent actions (oldest first):\n");
    if history.is_empty() {
        prompt.push_str("(none)\n");
    } else {
        for entry in history.iter().rev() {
            prompt.push_str(&entry.prompt_line());
            prompt.push('\n');
        }
    }

    if let Some(action) = last_action {
        let changed = last_outcome.map(|o| o.state_changed).unwrap_or(false);
        prompt.push_str(&format!(
            "\nLast action: {} (stateChanged={})\n",
            action.kind(),
            changed
        ));
    }

    prompt.push_str("\nScroll status: ");
    prompt.push_str(scroll_status);

    prompt.push_str("\n\nVisible page text (truncated):\n");
    prompt.push_str(&truncate_chars(page_text, PAGE_TEXT_CHARS));

    prompt.push_str("\n\nInteractive regions:\n");
    for region in regions.iter().take(MAX_PROMPT_REGIONS) {
        prompt.push_str(&region.prompt_line());
        prompt.push('\n');
    }
    if regions.len() > MAX_PROMPT_REGIONS {
        prompt.push_str(&format!(
            "(and {} more not shown)\n",
            regions.len() - MAX_PROMPT_REGIONS
        ));
    }

    if let Some(feedback) = feedback {
        prompt.push_str("\nFeedback on your previous answer: ");
        prompt.push_str(feedback);
        prompt.push('\n');
    }

    prompt.push_str("\nReply with the decision JSON only.");
    prompt
}
