//! Shared identifiers and small cross-crate types for webpilot.

use std::fmt;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Identifier for one task session (one browser, one plan).
#[derive(Clone, Debug, Eq, PartialEq, Hash, Serialize, Deserialize)]
pub struct SessionId(pub String);

impl SessionId {
    pub fn new() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for SessionId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for SessionId {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

/// Identifier attached to a proposed action awaiting user confirmation.
#[derive(Clone, Debug, Eq, PartialEq, Hash, Serialize, Deserialize)]
pub struct ActionId(pub String);

impl ActionId {
    pub fn new() -> Self {
        Self(Uuid::new_v4().to_string())
    }
}

impl Default for ActionId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for ActionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Pipeline phase a log line belongs to.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Phase {
    Observe,
    Decide,
    Act,
    Verify,
    Navigate,
    Planning,
    Synthesis,
}

impl Phase {
    pub fn as_str(&self) -> &'static str {
        match self {
            Phase::Observe => "OBSERVE",
            Phase::Decide => "DECIDE",
            Phase::Act => "ACT",
            Phase::Verify => "VERIFY",
            Phase::Navigate => "NAVIGATE",
            Phase::Planning => "PLANNING",
            Phase::Synthesis => "SYNTHESIS",
        }
    }
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Lifecycle status reported to the client and persisted per session.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SessionStatus {
    Started,
    Running,
    Paused,
    Completed,
    Error,
    Stopped,
}

impl SessionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            SessionStatus::Started => "started",
            SessionStatus::Running => "running",
            SessionStatus::Paused => "paused",
            SessionStatus::Completed => "completed",
            SessionStatus::Error => "error",
            SessionStatus::Stopped => "stopped",
        }
    }
}

impl fmt::Display for SessionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Whether a paused session awaits a manual user step or approval of a
/// specific proposed action.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PauseKind {
    AskUser,
    Confirm,
}

/// Semantic role of an interactive region. Closed set; anything the scanner
/// cannot classify lands in `Other`.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RegionRole {
    Link,
    Button,
    Input,
    Textarea,
    Select,
    Checkbox,
    Radio,
    Other,
}

impl RegionRole {
    pub fn from_tag(tag: &str) -> Self {
        match tag.to_ascii_lowercase().as_str() {
            "a" => RegionRole::Link,
            "button" => RegionRole::Button,
            "input" => RegionRole::Input,
            "textarea" => RegionRole::Textarea,
            "select" => RegionRole::Select,
            _ => RegionRole::Other,
        }
    }

    pub fn from_aria(role: &str) -> Option<Self> {
        match role.to_ascii_lowercase().as_str() {
            "link" => Some(RegionRole::Link),
            "button" => Some(RegionRole::Button),
            "textbox" | "searchbox" => Some(RegionRole::Input),
            "checkbox" => Some(RegionRole::Checkbox),
            "radio" => Some(RegionRole::Radio),
            "combobox" | "listbox" => Some(RegionRole::Select),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            RegionRole::Link => "link",
            RegionRole::Button => "button",
            RegionRole::Input => "input",
            RegionRole::Textarea => "textarea",
            RegionRole::Select => "select",
            RegionRole::Checkbox => "checkbox",
            RegionRole::Radio => "radio",
            RegionRole::Other => "other",
        }
    }
}

/// Viewport-relative bounding box in CSS pixels.
#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct BoundingBox {
    pub x: f64,
    pub y: f64,
    pub width: f64,
    pub height: f64,
}

impl BoundingBox {
    pub fn area(&self) -> f64 {
        self.width * self.height
    }

    pub fn center(&self) -> (f64, f64) {
        (self.x + self.width / 2.0, self.y + self.height / 2.0)
    }
}

/// An addressable interactive element found on the page.
///
/// The `id` is a per-scan identity written onto the DOM node itself as a
/// custom attribute; it is the only handle used to address the element
/// afterwards, so later DOM reordering cannot redirect an action.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Region {
    pub id: String,
    pub label: String,
    pub role: RegionRole,
    pub bbox: BoundingBox,
    pub confidence: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub href: Option<String>,
}

impl Region {
    /// One-line rendering used in decision prompts.
    pub fn prompt_line(&self) -> String {
        match &self.href {
            Some(href) => format!(
                "[{}] ({}) \"{}\" -> {}",
                self.id,
                self.role.as_str(),
                self.label,
                href
            ),
            None => format!("[{}] ({}) \"{}\"", self.id, self.role.as_str(), self.label),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn session_ids_are_unique() {
        assert_ne!(SessionId::new(), SessionId::new());
    }

    #[test]
    fn phase_serializes_screaming() {
        let json = serde_json::to_string(&Phase::Observe).unwrap();
        assert_eq!(json, "\"OBSERVE\"");
    }

    #[test]
    fn status_serializes_lowercase() {
        let json = serde_json::to_string(&SessionStatus::Paused).unwrap();
        assert_eq!(json, "\"paused\"");
    }

    #[test]
    fn role_from_aria_overrides() {
        assert_eq!(RegionRole::from_aria("searchbox"), Some(RegionRole::Input));
        assert_eq!(RegionRole::from_aria("banner"), None);
        assert_eq!(RegionRole::from_tag("textarea"), RegionRole::Textarea);
    }

    #[test]
    fn region_prompt_line_includes_href_for_links() {
        let region = Region {
            id: "element-a1b2c3d4".to_string(),
            label: "Docs".to_string(),
            role: RegionRole::Link,
            bbox: BoundingBox {
                x: 0.0,
                y: 0.0,
                width: 40.0,
                height: 12.0,
            },
            confidence: 1.0,
            href: Some("/docs".to_string()),
        };
        assert!(region.prompt_line().contains("-> /docs"));
    }
}
