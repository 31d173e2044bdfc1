//! Event journal for builds and runs
//!
//! Appends JSON lines to `<state>/journal.log`. Journal writes never
//! fail the operation being recorded.

use chrono::Utc;
use std::path::PathBuf;
use tokio::fs::OpenOptions;
use tokio::io::AsyncWriteExt;
use tokio::sync::Mutex;
use tracing::warn;

/// File-based journal that appends JSON lines
pub struct Journal {
    enabled: bool,
    path: PathBuf,
    write_lock: Mutex<()>,
}

impl Journal {
    /// Create a journal at `path`
    pub fn new(path: PathBuf, enabled: bool) -> Self {
        Self {
            enabled,
            path,
            write_lock: Mutex::new(()),
        }
    }

    /// A journal that records nothing
    pub fn disabled() -> Self {
        Self::new(PathBuf::new(), false)
    }

    pub fn path(&self) -> &std::path::Path {
        &self.path
    }

    /// Record an event as a JSON line
    ///
    /// Drops the event with a warning on IO failure.
    pub async fn record(&self, event: &str, data: &serde_json::Value) {
        if !self.enabled {
            return;
        }

        let entry = serde_json::json!({
            "timestamp": Utc::now().to_rfc3339(),
            "event": event,
            "data": data,
        });

        let mut line = match serde_json::to_string(&entry) {
            Ok(s) => s,
            Err(e) => {
                warn!("Failed to serialize journal event: {}", e);
                return;
            }
        };
        line.push('\n');

        let _guard = self.write_lock.lock().await;
        if let Err(e) = self.append(&line).await {
            warn!("Failed to write journal: {}", e);
        }
    }

    async fn append(&self, line: &str) -> std::io::Result<()> {
        if let Some(parent) = self.path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }

        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .await?;

        file.write_all(line.as_bytes()).await?;
        file.flush().await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use tempfile::TempDir;

    fn journal(dir: &TempDir, enabled: bool) -> Journal {
        Journal::new(dir.path().join("state/journal.log"), enabled)
    }

    #[tokio::test]
    async fn writes_json_line() {
        let dir = TempDir::new().unwrap();
        let journal = journal(&dir, true);

        journal
            .record(
                "build.finish",
                &serde_json::json!({"cell": "python=3.11", "status": "success"}),
            )
            .await;

        let content = tokio::fs::read_to_string(journal.path()).await.unwrap();
        let parsed: serde_json::Value = serde_json::from_str(content.trim()).unwrap();

        assert_eq!(parsed["event"], "build.finish");
        assert_eq!(parsed["data"]["cell"], "python=3.11");
        assert!(parsed["timestamp"].is_string());
    }

    #[tokio::test]
    async fn concurrent_records_stay_whole_lines() {
        let dir = TempDir::new().unwrap();
        let journal = Arc::new(journal(&dir, true));

        let mut handles = Vec::new();
        for i in 0..8 {
            let journal = journal.clone();
            handles.push(tokio::spawn(async move {
                journal
                    .record("dispatch.finish", &serde_json::json!({"n": i}))
                    .await;
            }));
        }
        for handle in handles {
            handle.await.unwrap();
        }

        let content = tokio::fs::read_to_string(journal.path()).await.unwrap();
        let lines: Vec<&str> = content.trim().lines().collect();
        assert_eq!(lines.len(), 8);
        for line in lines {
            serde_json::from_str::<serde_json::Value>(line).unwrap();
        }
    }

    #[tokio::test]
    async fn skips_when_disabled() {
        let dir = TempDir::new().unwrap();
        let journal = journal(&dir, false);

        journal.record("should.not.appear", &serde_json::json!({})).await;

        assert!(!journal.path().exists());
    }
}
