//! Best-effort dialogue transcript.

use chrono::Local;
use std::path::{Path, PathBuf};
use tokio::io::AsyncWriteExt;
use tracing::warn;

/// Appends one `[user]` / `[assistant]` pair per completed turn.
///
/// Write failures are logged and otherwise ignored.
#[derive(Debug, Clone)]
pub struct TranscriptWriter {
    path: PathBuf,
}

impl TranscriptWriter {
    /// Open the transcript and write the session header.
    pub async fn open(path: impl Into<PathBuf>) -> Self {
        let writer = Self { path: path.into() };
        let header = format!(
            "=== session start: {} ===\n",
            Local::now().format("%Y-%m-%d")
        );
        writer.write(&header).await;
        writer
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub async fn record_turn(&self, user: &str, assistant: &str) {
        let entry = format!("[user]: {}\n[assistant]: {}\n", user.trim(), assistant.trim());
        self.write(&entry).await;
    }

    async fn write(&self, text: &str) {
        if let Err(e) = self.try_write(text).await {
            warn!(path = %self.path.display(), "transcript write failed: {e}");
        }
    }

    async fn try_write(&self, text: &str) -> std::io::Result<()> {
        if let Some(parent) = self.path.parent()
            && !parent.as_os_str().is_empty()
        {
            tokio::fs::create_dir_all(parent).await?;
        }
        let mut file = tokio::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .await?;
        file.write_all(text.as_bytes()).await?;
        file.flush().await
    }
}
