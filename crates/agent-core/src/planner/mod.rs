//! Task planner: scout preflight, one main LLM call, schema validation,
//! and a rule-based fallback so a malformed answer can never leave a
//! session without a plan.

mod rule_based;
pub mod scout;

use std::sync::Arc;

use serde::Deserialize;
use tracing::{debug, warn};

use crate::llm::{LlmClient, LlmRequest};
use crate::plan::{Plan, PlanStep, MAX_PLAN_STEPS};
use crate::util::extract_json_object;

pub use rule_based::draft_plan;
pub use scout::{scout_query, NoScout, ScoutSearch, VerifiedUrl};

const PLANNER_SYSTEM_PROMPT: &str = r#"You are the planning stage of a browser agent. Turn the user's task into an ordered plan of granular, atomic objectives.

Classify the task first:
- simple-action: one or two concrete interactions.
- deep-research: the user wants information gathered and summarized. Set "needsSynthesis": true. A search-results page is NEVER the final answer; plan steps that open and read actual sources.
- transactional: the task changes state on a site (purchases, form submissions).

Rules:
- At most 15 steps, each doing exactly one thing.
- Set "needsAuth": true on steps a human must perform (login, MFA, CAPTCHA).
- "targetUrl" may ONLY be copied from the Verified URLs section below. Never invent a URL. Omit the field otherwise.

Respond with JSON only:
{
  "strategy": "<one-paragraph approach>",
  "needsSynthesis": false,
  "steps": [
    {"title": "<short>", "description": "<detailed>", "needsAuth": false, "targetUrl": "<optional verified url>"}
  ]
}"#;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct PlanWire {
    strategy: String,
    #[serde(default)]
    needs_synthesis: bool,
    steps: Vec<PlanStepWire>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct PlanStepWire {
    title: String,
    #[serde(default)]
    description: String,
    #[serde(default)]
    needs_auth: bool,
    #[serde(default)]
    target_url: Option<String>,
}

pub struct Planner {
    llm: Arc<dyn LlmClient>,
    scout: Arc<dyn ScoutSearch>,
}

impl Planner {
    pub fn new(llm: Arc<dyn LlmClient>, scout: Arc<dyn ScoutSearch>) -> Self {
        Self { llm, scout }
    }

    /// Plan the task. Never fails: every degradation path lands on the
    /// rule-based fallback.
    pub async fn plan(&self, task: &str) -> Plan {
        let verified = self.run_scout(task).await;

        let user_prompt = match verified.is_empty() {
            true => format!("Task: {task}"),
            false => {
                let listing = verified
                    .iter()
                    .map(|v| format!("- {} : {}", v.title, v.url))
                    .collect::<Vec<_>>()
                    .join("\n");
                format!("Task: {task}\n\nVerified URLs (live search results):\n{listing}")
            }
        };

        let request = LlmRequest::new(PLANNER_SYSTEM_PROMPT, user_prompt)
            .with_temperature(0.2)
            .with_max_tokens(2_048);
        let text = match self.llm.complete(request).await {
            Ok(text) => text,
            Err(err) => {
                warn!(%err, "planner llm call failed, using rule-based plan");
                return draft_plan(task);
            }
        };

        match parse_plan(&text, &verified) {
            Some(plan) => plan,
            None => {
                warn!("planner output failed validation, using rule-based plan");
                draft_plan(task)
            }
        }
    }

    async fn run_scout(&self, task: &str) -> Vec<VerifiedUrl> {
        let Some(query) = scout_query(&self.llm, task).await else {
            return Vec::new();
        };
        debug!(%query, "scout verifying service URL via live search");
        match self.scout.verify_urls(&query).await {
            Ok(urls) => urls.into_iter().take(3).collect(),
            Err(err) => {
                warn!(%err, "scout search failed, planning without verified URLs");
                Vec::new()
            }
        }
    }
}

/// Parse and validate the planner answer. `verified` bounds which
/// targetUrl values are allowed to survive.
fn parse_plan(text: &str, verified: &[VerifiedUrl]) -> Option<Plan> {
    let span = extract_json_object(text)?;
    let wire: PlanWire = serde_json::from_str(span).ok()?;
    if wire.steps.is_empty() {
        return None;
    }
    let steps = wire
        .steps
        .into_iter()
        .take(MAX_PLAN_STEPS)
        .enumerate()
        .map(|(index, step)| {
            let target_url = step
                .target_url
                .filter(|url| verified.iter().any(|v| &v.url == url));
            PlanStep {
                id: index as u32 + 1,
                title: step.title,
                description: step.description,
                needs_auth: step.needs_auth,
                target_url,
            }
        })
        .collect::<Vec<_>>();
    if steps.iter().any(|step| step.title.trim().is_empty()) {
        return None;
    }
    Some(Plan {
        strategy: wire.strategy,
        needs_synthesis: wire.needs_synthesis,
        steps,
    })
}
