//! The client channel: JSON-framed messages in both directions. Outbound
//! events go over a broadcast bus, so the owning session's socket and any
//! other connected listener receive them best-effort; a send with nobody
//! listening is not an error.

use chrono::Utc;
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;
use tracing::debug;

use webpilot_agent_core::Action;
use webpilot_core_types::{PauseKind, Phase, Region, SessionId, SessionStatus};

/// Buffered events per subscriber before lagging sockets drop messages.
const CHANNEL_CAPACITY: usize = 512;

#[derive(Clone, Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LogEvent {
    pub step: u64,
    pub phase: Phase,
    pub message: String,
    pub timestamp: i64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

#[derive(Clone, Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ScreenshotEvent {
    pub session_id: SessionId,
    pub step: u64,
    pub screenshot_path: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub observation: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub regions: Option<Vec<Region>>,
}

#[derive(Clone, Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StatusEvent {
    pub session_id: SessionId,
    pub status: SessionStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pending_action: Option<Action>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pause_kind: Option<PauseKind>,
}

/// Everything pushed to clients.
#[derive(Clone, Debug, Serialize)]
#[serde(tag = "type", content = "data", rename_all = "lowercase")]
pub enum ServerEvent {
    Log(LogEvent),
    Screenshot(ScreenshotEvent),
    Status(StatusEvent),
    Error { message: String },
}

/// Inbound client messages.
#[derive(Clone, Debug, Deserialize)]
#[serde(tag = "type", content = "data", rename_all = "lowercase")]
pub enum ClientMessage {
    #[serde(rename_all = "camelCase")]
    Task {
        task: String,
        #[serde(default)]
        session_id: Option<String>,
    },
    #[serde(rename_all = "camelCase")]
    Stop { session_id: String },
    #[serde(rename_all = "camelCase")]
    Confirmation {
        session_id: String,
        approved: bool,
        #[serde(default)]
        action_id: Option<String>,
    },
}

/// Cloneable handle over the outbound bus.
#[derive(Clone)]
pub struct ClientChannel {
    tx: broadcast::Sender<ServerEvent>,
}

impl Default for ClientChannel {
    fn default() -> Self {
        Self::new()
    }
}

impl ClientChannel {
    pub fn new() -> Self {
        let (tx, _) = broadcast::channel(CHANNEL_CAPACITY);
        Self { tx }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<ServerEvent> {
        self.tx.subscribe()
    }

    fn send(&self, event: ServerEvent) {
        // Err means no listeners right now; the session keeps running.
        if self.tx.send(event).is_err() {
            debug!("no client channel listeners");
        }
    }

    pub fn log(&self, step: u64, phase: Phase, message: impl Into<String>, error: Option<String>) {
        self.send(ServerEvent::Log(LogEvent {
            step,
            phase,
            message: message.into(),
            timestamp: Utc::now().timestamp_millis(),
            error,
        }));
    }

    pub fn screenshot(
        &self,
        session_id: SessionId,
        step: u64,
        screenshot_path: String,
        observation: Option<String>,
        regions: Option<Vec<Region>>,
    ) {
        self.send(ServerEvent::Screenshot(ScreenshotEvent {
            session_id,
            step,
            screenshot_path,
            observation,
            regions,
        }));
    }

    pub fn status(
        &self,
        session_id: SessionId,
        status: SessionStatus,
        message: Option<String>,
        pending_action: Option<Action>,
        pause_kind: Option<PauseKind>,
    ) {
        self.send(ServerEvent::Status(StatusEvent {
            session_id,
            status,
            message,
            pending_action,
            pause_kind,
        }));
    }

    pub fn error(&self, message: impl Into<String>) {
        self.send(ServerEvent::Error {
            message: message.into(),
        });
    }
}
