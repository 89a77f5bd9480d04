//! Plan model and the fast-forward rules that skip objectives the agent
//! already accomplished out of order.

use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use url::Url;

/// Upper bound enforced on planner output.
pub const MAX_PLAN_STEPS: usize = 15;

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct PlanStep {
    pub id: u32,
    pub title: String,
    pub description: String,
    #[serde(default)]
    pub needs_auth: bool,
    /// Only ever set from verified scout results, never invented.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub target_url: Option<String>,
}

#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct Plan {
    pub strategy: String,
    #[serde(default)]
    pub needs_synthesis: bool,
    pub steps: Vec<PlanStep>,
}

impl Plan {
    pub fn len(&self) -> usize {
        self.steps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }

    /// Human-readable listing emitted to the client after planning.
    pub fn summary(&self) -> String {
        let mut out = format!("Strategy: {}\n", self.strategy);
        for step in &self.steps {
            let auth = if step.needs_auth { " [manual]" } else { "" };
            out.push_str(&format!("{}. {}{}\n", step.id, step.title, auth));
        }
        out
    }

    /// Listing injected into objective prompts.
    pub fn prompt_listing(&self) -> String {
        self.steps
            .iter()
            .map(|step| format!("{}. {}", step.id, step.title))
            .collect::<Vec<_>>()
            .join("\n")
    }
}

static LOGIN_KEYWORDS: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)\b(log\s*in|login|sign\s*in|password|mfa|2fa|credential)").unwrap());

static SEARCH_MARKERS: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)(search|results|\?q=|query=)").unwrap());

static DEEP_PAGE_MARKERS: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)(watch\?v=|/in/|/video/|/item/|/product/|/article/)").unwrap());

/// Whether a step's wording marks it as a human-owned login/MFA objective.
pub fn mentions_login(text: &str) -> bool {
    LOGIN_KEYWORDS.is_match(text)
}

/// Whether a URL already looks like a search-results page.
pub fn url_has_search_markers(url: &str) -> bool {
    SEARCH_MARKERS.is_match(url)
}

/// Fast-forward predicate: does the current URL already satisfy the step?
/// Pure over (step, url), so re-running it cannot advance the plan further
/// than a single pass.
pub fn step_likely_done(step: &PlanStep, url: &str) -> bool {
    let wording = format!("{} {}", step.title, step.description).to_lowercase();

    if wording.contains("navigate") || wording.contains("go to") || wording.contains("open the site")
    {
        if let Some(domain) = first_domain_token(&wording) {
            if host_matches(url, &domain) {
                return true;
            }
        }
    }

    if wording.contains("search") || wording.contains("type") || wording.contains("initiate") {
        if url_has_search_markers(url) {
            return true;
        }
    }

    if wording.contains("click") || wording.contains("detail") || wording.contains("watch") {
        if DEEP_PAGE_MARKERS.is_match(url) {
            return true;
        }
    }

    false
}

/// First domain-looking token in free text ("go to youtube.com and ...").
fn first_domain_token(text: &str) -> Option<String> {
    text.split(|ch: char| ch.is_whitespace() || ch == ',' || ch == ';' || ch == ')')
        .map(|token| token.trim_matches(|ch: char| !ch.is_alphanumeric() && ch != '.' && ch != '-'))
        .find(|token| {
            token.contains('.')
                && !token.starts_with('.')
                && !token.ends_with('.')
                && token.chars().any(|ch| ch.is_alphabetic())
        })
        .map(str::to_string)
}

fn host_matches(url: &str, domain: &str) -> bool {
    let Some(host) = Url::parse(url)
        .ok()
        .and_then(|u| u.host_str().map(str::to_lowercase))
    else {
        return false;
    };
    let domain = domain.trim_start_matches("www.");
    let host = host.trim_start_matches("www.");
    host == domain || host.ends_with(&format!(".{domain}")) || domain.ends_with(&format!(".{host}"))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn step(title: &str, description: &str) -> PlanStep {
        PlanStep {
            id: 1,
            title: title.to_string(),
            description: description.to_string(),
            needs_auth: false,
            target_url: None,
        }
    }

    #[test]
    fn navigate_step_done_when_host_matches() {
        let step = step("Navigate to youtube.com", "Open the YouTube homepage");
        assert!(step_likely_done(&step, "https://www.youtube.com/"));
        assert!(!step_likely_done(&step, "https://www.example.com/"));
    }

    #[test]
    fn search_step_done_on_results_url() {
        let step = step("Search for rust tutorials", "Type the query and submit");
        assert!(step_likely_done(
            &step,
            "https://www.youtube.com/results?search_query=rust"
        ));
        assert!(!step_likely_done(&step, "https://www.youtube.com/"));
    }

    #[test]
    fn click_detail_step_done_on_deep_page() {
        let step = step("Click the first video", "Open the most relevant result");
        assert!(step_likely_done(
            &step,
            "https://www.youtube.com/watch?v=abc123"
        ));
        assert!(!step_likely_done(
            &step,
            "https://www.youtube.com/results?search_query=rust"
        ));
    }

    #[test]
    fn fast_forward_predicate_is_stable() {
        let step = step("Search for rust tutorials", "Type the query and submit");
        let url = "https://example.com/search?q=rust";
        assert_eq!(step_likely_done(&step, url), step_likely_done(&step, url));
    }

    #[test]
    fn login_keywords_detected() {
        assert!(mentions_login("Log in to the student portal"));
        assert!(mentions_login("enter your PASSWORD"));
        assert!(!mentions_login("browse the catalog"));
    }

    #[test]
    fn plan_summary_marks_manual_steps() {
        let plan = Plan {
            strategy: "demo".to_string(),
            needs_synthesis: false,
            steps: vec![PlanStep {
                id: 1,
                title: "Sign in".to_string(),
                description: String::new(),
                needs_auth: true,
                target_url: None,
            }],
        };
        assert!(plan.summary().contains("[manual]"));
    }
}
