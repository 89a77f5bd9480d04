//! Shared axum state and the health snapshot surfaced at /healthz.

use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use chrono::Utc;
use parking_lot::Mutex;

use crate::orchestrator::Orchestrator;

#[derive(Clone)]
pub struct ServeState {
    pub orchestrator: Arc<Orchestrator>,
    pub health: Arc<ServeHealth>,
    pub artifacts_root: PathBuf,
}

/// Liveness/readiness flags plus the detail of the most recent readiness
/// change, kept behind one small lock.
#[derive(Default)]
pub struct ServeHealth {
    live: AtomicBool,
    ready: AtomicBool,
    detail: Mutex<ReadinessDetail>,
}

#[derive(Clone, Default)]
struct ReadinessDetail {
    checked_at: Option<i64>,
    error: Option<String>,
}

pub struct HealthSnapshot {
    pub live: bool,
    pub ready: bool,
    pub last_ready_check: Option<u64>,
    pub last_error: Option<String>,
}

impl ServeHealth {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn mark_live(&self) {
        self.live.store(true, Ordering::SeqCst);
    }

    pub fn mark_ready(&self) {
        self.ready.store(true, Ordering::SeqCst);
        *self.detail.lock() = ReadinessDetail {
            checked_at: Some(Utc::now().timestamp()),
            error: None,
        };
    }

    pub fn mark_unready(&self, error: impl Into<String>) {
        self.ready.store(false, Ordering::SeqCst);
        *self.detail.lock() = ReadinessDetail {
            checked_at: Some(Utc::now().timestamp()),
            error: Some(error.into()),
        };
    }

    pub fn snapshot(&self) -> HealthSnapshot {
        let detail = self.detail.lock().clone();
        HealthSnapshot {
            live: self.live.load(Ordering::SeqCst),
            ready: self.ready.load(Ordering::SeqCst),
            last_ready_check: detail.checked_at.map(|seconds| seconds as u64),
            last_error: detail.error,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn health_transitions() {
        let health = ServeHealth::new();
        let snapshot = health.snapshot();
        assert!(!snapshot.live);
        assert!(!snapshot.ready);
        assert!(snapshot.last_ready_check.is_none());

        health.mark_live();
        health.mark_ready();
        let snapshot = health.snapshot();
        assert!(snapshot.live && snapshot.ready);
        assert!(snapshot.last_error.is_none());
        assert!(snapshot.last_ready_check.is_some());

        health.mark_unready("browser gone");
        let snapshot = health.snapshot();
        assert!(!snapshot.ready);
        assert_eq!(snapshot.last_error.as_deref(), Some("browser gone"));
    }

    #[test]
    fn ready_clears_a_previous_error() {
        let health = ServeHealth::new();
        health.mark_unready("flaky start");
        health.mark_ready();
        assert!(health.snapshot().last_error.is_none());
    }
}
