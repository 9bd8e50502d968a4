//! Append-only memory file.

use crate::error::Result;
use chrono::Local;
use std::path::{Path, PathBuf};
use tokio::io::AsyncWriteExt;

/// Placeholder folded into the system prompt when the file cannot be read.
pub const UNREADABLE_MEMORY: &str = "(No saved memories are available.)";

#[derive(Debug, Clone)]
pub struct MemoryFile {
    path: PathBuf,
}

impl MemoryFile {
    #[must_use]
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Whole file content.
    pub async fn read_all(&self) -> Result<String> {
        Ok(tokio::fs::read_to_string(&self.path).await?)
    }

    /// Append one `[YYYY-MM-DD HH:MM:SS] text` line, creating the file if needed.
    pub async fn append(&self, text: &str) -> Result<()> {
        if let Some(parent) = self.path.parent()
            && !parent.as_os_str().is_empty()
        {
            tokio::fs::create_dir_all(parent).await?;
        }
        let line = format!(
            "[{}] {}\n",
            Local::now().format("%Y-%m-%d %H:%M:%S"),
            text.trim()
        );
        let mut file = tokio::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .await?;
        file.write_all(line.as_bytes()).await?;
        file.flush().await?;
        Ok(())
    }

    /// System-prompt appendix: the file content, or a placeholder.
    pub async fn prompt_appendix(&self) -> String {
        match self.read_all().await {
            Ok(content) if !content.trim().is_empty() => {
                format!("Things you remember about the user:\n{}", content.trim_end())
            }
            Ok(_) => UNREADABLE_MEMORY.to_owned(),
            Err(e) => {
                tracing::warn!(path = %self.path.display(), "memory file unreadable: {e}");
                UNREADABLE_MEMORY.to_owned()
            }
        }
    }
}
