//! Outbound safety gate: vets each proposed action before it reaches the
//! browser. Risky labels require explicit user confirmation; literal secret
//! markers are denied outright and never travel to the LLM.

use serde::{Deserialize, Serialize};
use url::Url;
use webpilot_core_types::Region;

use crate::action::Action;

/// Labels containing any of these (case-insensitive) require confirmation.
pub const DEFAULT_CONFIRM_KEYWORDS: &[&str] =
    &["submit", "enroll", "pay", "send", "delete", "remove"];

/// Fill values containing any of these are denied without negotiation.
const SECRET_MARKERS: &[&str] = &["SECRET.", "PASSWORD", "API_KEY"];

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct GuardrailVerdict {
    pub allowed: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
    pub requires_confirmation: bool,
}

impl GuardrailVerdict {
    fn allow() -> Self {
        Self {
            allowed: true,
            reason: None,
            requires_confirmation: false,
        }
    }

    fn confirm(reason: impl Into<String>) -> Self {
        Self {
            allowed: false,
            reason: Some(reason.into()),
            requires_confirmation: true,
        }
    }

    fn deny(reason: impl Into<String>) -> Self {
        Self {
            allowed: false,
            reason: Some(reason.into()),
            requires_confirmation: false,
        }
    }
}

#[derive(Clone, Debug)]
pub struct GuardrailGate {
    confirm_keywords: Vec<String>,
}

impl Default for GuardrailGate {
    fn default() -> Self {
        Self::new(
            DEFAULT_CONFIRM_KEYWORDS
                .iter()
                .map(|kw| kw.to_string())
                .collect(),
        )
    }
}

impl GuardrailGate {
    pub fn new(confirm_keywords: Vec<String>) -> Self {
        Self {
            confirm_keywords: confirm_keywords
                .into_iter()
                .map(|kw| kw.to_lowercase())
                .filter(|kw| !kw.is_empty())
                .collect(),
        }
    }

    pub fn check(&self, action: &Action, regions: &[Region]) -> GuardrailVerdict {
        if let Some(value) = action.fill_value() {
            let upper = value.to_uppercase();
            if SECRET_MARKERS.iter().any(|marker| upper.contains(marker)) {
                return GuardrailVerdict::deny("fill value contains a secret marker");
            }
        }

        if let Some(region_id) = action.target_region() {
            if let Some(region) = regions.iter().find(|r| r.id == region_id) {
                let label = region.label.to_lowercase();
                if let Some(keyword) = self
                    .confirm_keywords
                    .iter()
                    .find(|kw| label.contains(kw.as_str()))
                {
                    return GuardrailVerdict::confirm(format!(
                        "target \"{}\" matches sensitive keyword \"{}\"",
                        region.label, keyword
                    ));
                }
            }
        }

        GuardrailVerdict::allow()
    }
}

/// Navigation-level allowlist: the host must equal an allowed domain or be
/// a dot-suffix of one. An empty allowlist allows everything.
pub fn domain_allowed(url: &str, allowed: &[String]) -> bool {
    if allowed.is_empty() {
        return true;
    }
    let Some(host) = Url::parse(url)
        .ok()
        .and_then(|u| u.host_str().map(str::to_lowercase))
    else {
        return false;
    };
    allowed.iter().any(|domain| {
        let domain = domain.trim().to_lowercase();
        !domain.is_empty() && (host == domain || host.ends_with(&format!(".{domain}")))
    })
}
