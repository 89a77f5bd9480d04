//! SQLite persistence: session rows, the step log, and artifact records.
//! The step log doubles as the short-term history store the decider reads.

use std::path::Path;

use async_trait::async_trait;
use chrono::Utc;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use sqlx::SqlitePool;

use webpilot_agent_core::{HistoryEntry, HistoryStore};
use webpilot_core_types::{Phase, SessionId, SessionStatus};

#[derive(Clone)]
pub struct Storage {
    pool: SqlitePool,
}

/// One row in the step log.
#[derive(Clone, Debug)]
pub struct StepRecord {
    pub session_id: SessionId,
    pub step_number: u64,
    pub phase: Phase,
    pub action_type: Option<String>,
    pub action_data: Option<serde_json::Value>,
    pub observation: Option<String>,
    pub error: Option<String>,
}

impl Storage {
    pub async fn connect(path: &Path) -> Result<Self, sqlx::Error> {
        let options = SqliteConnectOptions::new()
            .filename(path)
            .create_if_missing(true);
        let pool = SqlitePoolOptions::new()
            .max_connections(4)
            .connect_with(options)
            .await?;
        let storage = Self { pool };
        storage.init().await?;
        Ok(storage)
    }

    /// In-memory database for tests.
    pub async fn in_memory() -> Result<Self, sqlx::Error> {
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect("sqlite::memory:")
            .await?;
        let storage = Self { pool };
        storage.init().await?;
        Ok(storage)
    }

    async fn init(&self) -> Result<(), sqlx::Error> {
        sqlx::query(
            "CREATE TABLE IF NOT EXISTS sessions (
                id         TEXT PRIMARY KEY,
                task       TEXT    NOT NULL,
                start_url  TEXT    NOT NULL,
                status     TEXT    NOT NULL,
                created_at INTEGER NOT NULL,
                updated_at INTEGER NOT NULL
            )",
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            "CREATE TABLE IF NOT EXISTS steps (
                id          INTEGER PRIMARY KEY AUTOINCREMENT,
                session_id  TEXT    NOT NULL,
                step_number INTEGER NOT NULL,
                phase       TEXT    NOT NULL,
                action_type TEXT,
                action_data TEXT,
                observation TEXT,
                error       TEXT,
                created_at  INTEGER NOT NULL
            )",
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            "CREATE INDEX IF NOT EXISTS idx_steps_session ON steps (session_id, step_number DESC)",
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            "CREATE TABLE IF NOT EXISTS artifacts (
                id          INTEGER PRIMARY KEY AUTOINCREMENT,
                session_id  TEXT    NOT NULL,
                step_number INTEGER NOT NULL,
                file_path   TEXT    NOT NULL,
                file_type   TEXT    NOT NULL,
                created_at  INTEGER NOT NULL
            )",
        )
        .execute(&self.pool)
        .await?;

        sqlx::query("CREATE INDEX IF NOT EXISTS idx_artifacts_session ON artifacts (session_id)")
            .execute(&self.pool)
            .await?;

        Ok(())
    }

    pub async fn create_session(
        &self,
        id: &SessionId,
        task: &str,
        start_url: &str,
    ) -> Result<(), sqlx::Error> {
        let now = Utc::now().timestamp_millis();
        sqlx::query(
            "INSERT INTO sessions (id, task, start_url, status, created_at, updated_at)
             VALUES (?, ?, ?, ?, ?, ?)",
        )
        .bind(id.as_str())
        .bind(task)
        .bind(start_url)
        .bind(SessionStatus::Started.as_str())
        .bind(now)
        .bind(now)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    pub async fn update_session_status(
        &self,
        id: &SessionId,
        status: SessionStatus,
    ) -> Result<(), sqlx::Error> {
        sqlx::query("UPDATE sessions SET status = ?, updated_at = ? WHERE id = ?")
            .bind(status.as_str())
            .bind(Utc::now().timestamp_millis())
            .bind(id.as_str())
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    pub async fn session_status(&self, id: &SessionId) -> Result<Option<String>, sqlx::Error> {
        let row = sqlx::query_as::<_, (String,)>("SELECT status FROM sessions WHERE id = ?")
            .bind(id.as_str())
            .fetch_optional(&self.pool)
            .await?;
        Ok(row.map(|r| r.0))
    }

    pub async fn record_step(&self, record: &StepRecord) -> Result<(), sqlx::Error> {
        sqlx::query(
            "INSERT INTO steps
             (session_id, step_number, phase, action_type, action_data, observation, error, created_at)
             VALUES (?, ?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(record.session_id.as_str())
        .bind(record.step_number as i64)
        .bind(record.phase.as_str())
        .bind(&record.action_type)
        .bind(record.action_data.as_ref().map(|v| v.to_string()))
        .bind(&record.observation)
        .bind(&record.error)
        .bind(Utc::now().timestamp_millis())
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    pub async fn record_artifact(
        &self,
        session_id: &SessionId,
        step_number: u64,
        file_path: &str,
        file_type: &str,
    ) -> Result<(), sqlx::Error> {
        sqlx::query(
            "INSERT INTO artifacts (session_id, step_number, file_path, file_type, created_at)
             VALUES (?, ?, ?, ?, ?)",
        )
        .bind(session_id.as_str())
        .bind(step_number as i64)
        .bind(file_path)
        .bind(file_type)
        .bind(Utc::now().timestamp_millis())
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    /// The short-term window the decider sees: recent executed actions,
    /// newest first.
    pub async fn recent_history(
        &self,
        session_id: &SessionId,
        limit: u32,
    ) -> Result<Vec<HistoryEntry>, sqlx::Error> {
        let rows = sqlx::query_as::<_, (i64, String, Option<String>, Option<String>)>(
            "SELECT step_number, action_type, action_data, error
             FROM steps
             WHERE session_id = ? AND action_type IS NOT NULL
             ORDER BY step_number DESC
             LIMIT ?",
        )
        .bind(session_id.as_str())
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows
            .into_iter()
            .map(|(step_number, action_type, action_data, error)| HistoryEntry {
                step_number: step_number as u64,
                action_type,
                action_data: action_data
                    .and_then(|raw| serde_json::from_str(&raw).ok())
                    .unwrap_or(serde_json::Value::Null),
                error,
            })
            .collect())
    }
}

#[async_trait]
impl HistoryStore for Storage {
    async fn recent(&self, session: &SessionId, limit: u32) -> Vec<HistoryEntry> {
        self.recent_history(session, limit).await.unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn record(session: &SessionId, step: u64, action: Option<&str>) -> StepRecord {
        StepRecord {
            session_id: session.clone(),
            step_number: step,
            phase: if action.is_some() {
                Phase::Act
            } else {
                Phase::Observe
            },
            action_type: action.map(str::to_string),
            action_data: action.map(|_| json!({"regionId": format!("element-{step:08x}")})),
            observation: None,
            error: None,
        }
    }

    #[tokio::test]
    async fn session_lifecycle_roundtrip() {
        let storage = Storage::in_memory().await.unwrap();
        let id = SessionId::new();
        storage.create_session(&id, "do things", "https://start").await.unwrap();
        assert_eq!(storage.session_status(&id).await.unwrap().as_deref(), Some("started"));
        storage
            .update_session_status(&id, SessionStatus::Completed)
            .await
            .unwrap();
        assert_eq!(
            storage.session_status(&id).await.unwrap().as_deref(),
            Some("completed")
        );
    }

    #[tokio::test]
    async fn history_window_is_newest_first_and_actions_only() {
        let storage = Storage::in_memory().await.unwrap();
        let id = SessionId::new();
        storage.create_session(&id, "t", "https://s").await.unwrap();
        for step in 1..=8u64 {
            storage.record_step(&record(&id, step, Some("DOM_CLICK"))).await.unwrap();
        }
        // Phase-only rows never surface in history.
        storage.record_step(&record(&id, 9, None)).await.unwrap();

        let history = storage.recent_history(&id, 5).await.unwrap();
        assert_eq!(history.len(), 5);
        assert_eq!(history[0].step_number, 8);
        assert_eq!(history[4].step_number, 4);
        assert!(history.iter().all(|entry| entry.action_type == "DOM_CLICK"));
    }

    #[tokio::test]
    async fn artifacts_are_recorded_per_session() {
        let storage = Storage::in_memory().await.unwrap();
        let id = SessionId::new();
        storage.create_session(&id, "t", "https://s").await.unwrap();
        storage
            .record_artifact(&id, 1, "artifacts/x/step-0001.png", "png")
            .await
            .unwrap();
        let rows = sqlx::query_as::<_, (String, i64)>(
            "SELECT file_path, step_number FROM artifacts WHERE session_id = ?",
        )
        .bind(id.as_str())
        .fetch_all(&storage.pool)
        .await
        .unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].1, 1);
    }
}
