//! Short-term action history injected into decision prompts.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use webpilot_core_types::SessionId;

/// Bounded window fetched for prompts.
pub const HISTORY_WINDOW: u32 = 5;

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct HistoryEntry {
    pub step_number: u64,
    pub action_type: String,
    pub action_data: Value,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl HistoryEntry {
    /// One-line rendering used in decision prompts, oldest first.
    pub fn prompt_line(&self) -> String {
        let data = serde_json::to_string(&self.action_data).unwrap_or_default();
        match &self.error {
            Some(error) => format!(
                "step {}: {} {} -> ERROR {}",
                self.step_number, self.action_type, data, error
            ),
            None => format!("step {}: {} {}", self.step_number, self.action_type, data),
        }
    }
}

/// Read side of the persisted step log. The write side lives with the
/// orchestrator's storage; the loop only needs the recent window.
#[async_trait]
pub trait HistoryStore: Send + Sync {
    /// Most recent entries for the session, newest first, at most `limit`.
    async fn recent(&self, session: &SessionId, limit: u32) -> Vec<HistoryEntry>;
}

/// Store with no history, for tests and cold starts.
pub struct EmptyHistory;

#[async_trait]
impl HistoryStore for EmptyHistory {
    async fn recent(&self, _session: &SessionId, _limit: u32) -> Vec<HistoryEntry> {
        Vec::new()
    }
}
