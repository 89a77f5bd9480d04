//! The action schema: a tagged union of everything the agent can do,
//! with strict validation before anything reaches the browser.

use serde::{Deserialize, Serialize};
use webpilot_core_types::Region;
use webpilot_page_scanner::WaitUntil;

use crate::errors::{AgentError, AgentResult};

/// Default scroll distance in CSS pixels.
pub const DEFAULT_SCROLL_PX: f64 = 600.0;

#[derive(Clone, Copy, Debug, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ScrollDirection {
    Up,
    Down,
}

/// Everything the decider may propose. Dispatch is by tag; no payload is
/// interpreted before validation.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "SCREAMING_SNAKE_CASE", rename_all_fields = "camelCase")]
pub enum Action {
    /// Cursor-physics click on a scanned region.
    VisionClick {
        region_id: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        description: Option<String>,
    },
    /// Instant programmatic click; addressable by region, role+name, or a
    /// raw CSS selector.
    DomClick {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        region_id: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        role: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        name: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        selector: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        description: Option<String>,
    },
    VisionFill {
        region_id: String,
        value: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        description: Option<String>,
    },
    DomFill {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        region_id: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        role: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        name: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        selector: Option<String>,
        value: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        description: Option<String>,
    },
    KeyPress {
        key: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        region_id: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        description: Option<String>,
    },
    Scroll {
        direction: ScrollDirection,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        amount: Option<f64>,
    },
    Wait {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        duration: Option<u64>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        until: Option<WaitUntil>,
    },
    /// A manual step is needed from the user (login, MFA, CAPTCHA).
    AskUser {
        message: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        action_id: Option<String>,
    },
    /// Permission is needed before a sensitive action proceeds.
    Confirm {
        message: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        action_id: Option<String>,
    },
    /// The current objective is satisfied. Never terminates the session
    /// directly.
    Done {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        reason: Option<String>,
    },
}

impl Action {
    pub fn kind(&self) -> &'static str {
        match self {
            Action::VisionClick { .. } => "VISION_CLICK",
            Action::DomClick { .. } => "DOM_CLICK",
            Action::VisionFill { .. } => "VISION_FILL",
            Action::DomFill { .. } => "DOM_FILL",
            Action::KeyPress { .. } => "KEY_PRESS",
            Action::Scroll { .. } => "SCROLL",
            Action::Wait { .. } => "WAIT",
            Action::AskUser { .. } => "ASK_USER",
            Action::Confirm { .. } => "CONFIRM",
            Action::Done { .. } => "DONE",
        }
    }

    /// Whether the action ends the agent loop for the current objective.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            Action::Done { .. } | Action::AskUser { .. } | Action::Confirm { .. }
        )
    }

    /// Whether the action types text into an element.
    pub fn is_fill(&self) -> bool {
        matches!(self, Action::VisionFill { .. } | Action::DomFill { .. })
    }

    /// The region the action targets, when it targets one.
    pub fn target_region(&self) -> Option<&str> {
        match self {
            Action::VisionClick { region_id, .. } | Action::VisionFill { region_id, .. } => {
                Some(region_id)
            }
            Action::DomClick { region_id, .. }
            | Action::DomFill { region_id, .. }
            | Action::KeyPress { region_id, .. } => region_id.as_deref(),
            _ => None,
        }
    }

    /// The text a fill would type, when the action is a fill.
    pub fn fill_value(&self) -> Option<&str> {
        match self {
            Action::VisionFill { value, .. } | Action::DomFill { value, .. } => Some(value),
            _ => None,
        }
    }

    /// Validate payloads and region references against the current scan.
    pub fn validate(&self, regions: &[Region]) -> AgentResult<()> {
        let known = |id: &str| regions.iter().any(|r| r.id == id);
        match self {
            Action::VisionClick { region_id, .. } => {
                if !known(region_id) {
                    return Err(AgentError::invalid_action(format!(
                        "unknown region id {region_id}"
                    )));
                }
            }
            Action::VisionFill { region_id, value, .. } => {
                if value.is_empty() {
                    return Err(AgentError::invalid_action("fill value must not be empty"));
                }
                if !known(region_id) {
                    return Err(AgentError::invalid_action(format!(
                        "unknown region id {region_id}"
                    )));
                }
            }
            Action::DomClick {
                region_id,
                role,
                name,
                selector,
                ..
            } => {
                if region_id.is_none() && selector.is_none() && (role.is_none() || name.is_none()) {
                    return Err(AgentError::invalid_action(
                        "DOM_CLICK needs a regionId, a selector, or role+name",
                    ));
                }
                if let Some(id) = region_id {
                    if !known(id) {
                        return Err(AgentError::invalid_action(format!(
                            "unknown region id {id}"
                        )));
                    }
                }
            }
            Action::DomFill {
                region_id,
                role,
                name,
                selector,
                value,
                ..
            } => {
                if value.is_empty() {
                    return Err(AgentError::invalid_action("fill value must not be empty"));
                }
                if region_id.is_none() && selector.is_none() && (role.is_none() || name.is_none()) {
                    return Err(AgentError::invalid_action(
                        "DOM_FILL needs a regionId, a selector, or role+name",
                    ));
                }
                if let Some(id) = region_id {
                    if !known(id) {
                        return Err(AgentError::invalid_action(format!(
                            "unknown region id {id}"
                        )));
                    }
                }
            }
            Action::KeyPress { key, region_id, .. } => {
                if key.is_empty() {
                    return Err(AgentError::invalid_action("key must not be empty"));
                }
                if let Some(id) = region_id {
                    if !known(id) {
                        return Err(AgentError::invalid_action(format!(
                            "unknown region id {id}"
                        )));
                    }
                }
            }
            Action::Scroll { amount, .. } => {
                if let Some(px) = amount {
                    if *px <= 0.0 {
                        return Err(AgentError::invalid_action("scroll amount must be positive"));
                    }
                }
            }
            Action::Wait { duration, until } => {
                if duration.is_none() && until.is_none() {
                    return Err(AgentError::invalid_action(
                        "WAIT needs a duration or an until condition",
                    ));
                }
            }
            Action::AskUser { message, .. } | Action::Confirm { message, .. } => {
                if message.trim().is_empty() {
                    return Err(AgentError::invalid_action("message must not be empty"));
                }
            }
            _ => {}
        }
        Ok(())
    }
}

/// Decider output: the action plus the two fields that feed logs and
/// future prompts.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Decision {
    pub action: Action,
    pub reasoning: String,
    pub confidence: f64,
}

impl Decision {
    pub fn new(action: Action, reasoning: impl Into<String>, confidence: f64) -> Self {
        Self {
            action,
            reasoning: reasoning.into(),
            confidence: confidence.clamp(0.0, 1.0),
        }
    }
}
