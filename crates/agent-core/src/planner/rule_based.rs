//! Heuristic fallback planner used when the LLM is unreachable or its
//! output cannot be validated.

use crate::plan::{mentions_login, Plan, PlanStep};

/// Fallback plans never exceed this many objectives.
const MAX_FALLBACK_STEPS: usize = 10;

/// Split the task on "then" / "," / "." into ordered objectives.
pub fn draft_plan(task: &str) -> Plan {
    let mut steps = Vec::new();
    for chunk in split_objectives(task) {
        if steps.len() >= MAX_FALLBACK_STEPS {
            break;
        }
        let id = steps.len() as u32 + 1;
        steps.push(PlanStep {
            id,
            title: chunk.clone(),
            description: chunk.clone(),
            needs_auth: mentions_login(&chunk),
            target_url: None,
        });
    }
    if steps.is_empty() {
        steps.push(PlanStep {
            id: 1,
            title: task.trim().to_string(),
            description: task.trim().to_string(),
            needs_auth: mentions_login(task),
            target_url: None,
        });
    }
    Plan {
        strategy: "Execute the task step by step as written".to_string(),
        needs_synthesis: false,
        steps,
    }
}

fn split_objectives(task: &str) -> Vec<String> {
    task.split(" then ")
        .flat_map(|part| part.split(&[',', '.'][..]))
        .map(|chunk| chunk.trim().to_string())
        .filter(|chunk| !chunk.is_empty())
        .collect()
}
