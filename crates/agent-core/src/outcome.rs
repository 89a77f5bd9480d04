//! Post-action observation: did anything observable change?

use serde::{Deserialize, Serialize};

/// Characters of normalized page text kept per snapshot.
const TEXT_SNIPPET_CHARS: usize = 400;

/// Page state sampled immediately before or after an action.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StateSnapshot {
    pub url: String,
    pub title: String,
    pub text: String,
}

impl StateSnapshot {
    pub fn new(url: impl Into<String>, title: impl Into<String>, raw_text: &str) -> Self {
        Self {
            url: url.into(),
            title: title.into(),
            text: normalize_text(raw_text),
        }
    }
}

/// Outcome captured after each action.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ActionOutcome {
    pub before: StateSnapshot,
    pub after: StateSnapshot,
    pub state_changed: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl ActionOutcome {
    pub fn from_snapshots(before: StateSnapshot, after: StateSnapshot) -> Self {
        let state_changed =
            before.url != after.url || before.title != after.title || before.text != after.text;
        Self {
            before,
            after,
            state_changed,
            error: None,
        }
    }

    /// Outcome for an action that threw: nothing observable changed.
    pub fn failed(before: StateSnapshot, error: impl Into<String>) -> Self {
        Self {
            after: before.clone(),
            before,
            state_changed: false,
            error: Some(error.into()),
        }
    }
}

/// Lowercase, collapse whitespace, keep the first 400 chars.
pub fn normalize_text(raw: &str) -> String {
    let collapsed = raw
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .to_lowercase();
    collapsed.chars().take(TEXT_SNIPPET_CHARS).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn normalizes_case_and_whitespace() {
        assert_eq!(normalize_text("  Hello\n\tWORLD  "), "hello world");
    }

    #[test]
    fn truncates_at_snippet_limit() {
        let long = "a".repeat(1_000);
        assert_eq!(normalize_text(&long).len(), TEXT_SNIPPET_CHARS);
    }

    #[test]
    fn detects_title_only_change() {
        let before = StateSnapshot::new("https://a", "Home", "same text");
        let after = StateSnapshot::new("https://a", "Results", "same text");
        assert!(ActionOutcome::from_snapshots(before, after).state_changed);
    }

    #[test]
    fn identical_snapshots_mean_no_change() {
        let before = StateSnapshot::new("https://a", "Home", "same text");
        let outcome = ActionOutcome::from_snapshots(before.clone(), before);
        assert!(!outcome.state_changed);
        assert!(outcome.error.is_none());
    }
}
