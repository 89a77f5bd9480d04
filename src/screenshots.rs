//! Screenshot artifact writer: `step-NNNN.png` (and optional decision
//! trace JSON) under a per-session directory, served back at
//! `/artifacts/<session>/<file>`.

use std::path::PathBuf;

use tokio::fs;

use webpilot_core_types::SessionId;

#[derive(Clone)]
pub struct ArtifactStore {
    root: PathBuf,
}

pub struct SavedArtifact {
    pub file_path: PathBuf,
    /// Stable client-facing path.
    pub web_path: String,
}

impl ArtifactStore {
    pub fn new(root: PathBuf) -> Self {
        Self { root }
    }

    pub fn root(&self) -> &PathBuf {
        &self.root
    }

    fn file_name(step: u64, suffix: &str) -> String {
        format!("step-{step:04}{suffix}")
    }

    pub async fn save_screenshot(
        &self,
        session: &SessionId,
        step: u64,
        bytes: &[u8],
    ) -> std::io::Result<SavedArtifact> {
        self.save(session, Self::file_name(step, ".png"), bytes).await
    }

    pub async fn save_trace(
        &self,
        session: &SessionId,
        step: u64,
        trace: &serde_json::Value,
    ) -> std::io::Result<SavedArtifact> {
        self.save(
            session,
            Self::file_name(step, "-trace.json"),
            trace.to_string().as_bytes(),
        )
        .await
    }

    async fn save(
        &self,
        session: &SessionId,
        name: String,
        bytes: &[u8],
    ) -> std::io::Result<SavedArtifact> {
        let dir = self.root.join(session.as_str());
        fs::create_dir_all(&dir).await?;
        let file_path = dir.join(&name);
        fs::write(&file_path, bytes).await?;
        Ok(SavedArtifact {
            file_path,
            web_path: format!("/artifacts/{}/{}", session.as_str(), name),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn screenshot_names_are_zero_padded() {
        let dir = std::env::temp_dir().join(format!("webpilot-art-{}", uuid::Uuid::new_v4()));
        let store = ArtifactStore::new(dir.clone());
        let session = SessionId::from("sess-1");
        let saved = store.save_screenshot(&session, 7, b"png").await.unwrap();
        assert!(saved.web_path.ends_with("/sess-1/step-0007.png"));
        assert!(saved.file_path.exists());
        let trace = store
            .save_trace(&session, 7, &serde_json::json!({"a": 1}))
            .await
            .unwrap();
        assert!(trace.web_path.ends_with("step-0007-trace.json"));
        let _ = tokio::fs::remove_dir_all(dir).await;
    }
}
