//! Thread Log (spec §6, §9, §11.4): one append-only JSONL file per
//! `(platform-id, assistant-session-id)`, buffered and flushed on every write, with a
//! background retention sweep deleting files past their age limit.

use crate::Result;
use serde::Serialize;
use std::collections::HashMap;
use std::path::PathBuf;
use std::time::Duration;
use tokio::fs::OpenOptions;
use tokio::io::AsyncWriteExt;
use tokio::sync::Mutex;

/// One line written to a thread log (spec §6: `type`-specific fields alongside `ts`/`sessionId`).
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ThreadLogEntry {
    ClaudeEvent { raw: serde_json::Value },
    UserMessage { text: String },
    Lifecycle { detail: String },
    Command { text: String },
    Permission { tool_name: String, approved: bool },
    Reaction { emoji: String, user: String },
    Executor { detail: String },
}

#[derive(Serialize)]
struct LogLine<'a> {
    ts: i64,
    #[serde(rename = "sessionId")]
    session_id: &'a str,
    #[serde(flatten)]
    entry: &'a ThreadLogEntry,
}

/// Append-only JSONL writer keyed by `(platform-id, assistant-session-id)`. Each distinct
/// key gets its own file handle behind its own mutex, since there is no native append-lock
/// most target filesystems offer for concurrent writers.
pub struct ThreadLog {
    dir: PathBuf,
    writers: Mutex<HashMap<String, Mutex<tokio::fs::File>>>,
}

impl ThreadLog {
    pub fn new(dir: PathBuf) -> Self {
        Self { dir, writers: Mutex::new(HashMap::new()) }
    }

    fn key(platform_id: &str, assistant_session_id: &str) -> String {
        format!("{platform_id}__{assistant_session_id}")
    }

    pub async fn append(
        &self,
        platform_id: &str,
        session_id: &str,
        assistant_session_id: &str,
        entry: ThreadLogEntry,
    ) -> Result<()> {
        let key = Self::key(platform_id, assistant_session_id);
        {
            let writers = self.writers.lock().await;
            if let Some(file) = writers.get(&key) {
                return self.write_line(file, session_id, &entry).await;
            }
        }

        tokio::fs::create_dir_all(&self.dir).await?;
        let path = self.dir.join(format!("{key}.jsonl"));
        let file = OpenOptions::new().create(true).append(true).open(&path).await?;
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            let _ = tokio::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o600)).await;
        }

        let mut writers = self.writers.lock().await;
        let file = writers.entry(key).or_insert_with(|| Mutex::new(file));
        self.write_line(file, session_id, &entry).await
    }

    async fn write_line(&self, file: &Mutex<tokio::fs::File>, session_id: &str, entry: &ThreadLogEntry) -> Result<()> {
        let line = LogLine { ts: chrono::Utc::now().timestamp_millis(), session_id, entry };
        let mut json = serde_json::to_string(&line).map_err(anyhow::Error::from)?;
        json.push('\n');
        let mut file = file.lock().await;
        file.write_all(json.as_bytes()).await?;
        file.flush().await?;
        Ok(())
    }
}

/// Spawn the once-per-process retention sweep (spec §11.4): deletes thread-log files
/// whose mtime exceeds `retention_days`, logging a summary count each run.
pub fn spawn_retention_job(dir: PathBuf, retention_days: u64, sweep_interval: Duration) {
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(sweep_interval);
        loop {
            interval.tick().await;
            let cutoff = std::time::SystemTime::now()
                .checked_sub(Duration::from_secs(retention_days * 86_400))
                .unwrap_or(std::time::SystemTime::UNIX_EPOCH);
            let mut deleted = 0u64;
            if let Ok(mut entries) = tokio::fs::read_dir(&dir).await {
                while let Ok(Some(entry)) = entries.next_entry().await {
                    let Ok(metadata) = entry.metadata().await else { continue };
                    let Ok(modified) = metadata.modified() else { continue };
                    if modified < cutoff && tokio::fs::remove_file(entry.path()).await.is_ok() {
                        deleted += 1;
                    }
                }
            }
            tracing::info!(deleted, dir = %dir.display(), "thread-log retention sweep complete");
        }
    });
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn append_writes_one_jsonl_line_per_call() {
        let dir = tempdir();
        let log = ThreadLog::new(dir.clone());
        log.append("mm-main", "mm-main:thread-1", "asst-1", ThreadLogEntry::UserMessage { text: "hi".into() })
            .await
            .unwrap();
        log.append("mm-main", "mm-main:thread-1", "asst-1", ThreadLogEntry::Lifecycle { detail: "started".into() })
            .await
            .unwrap();

        let path = dir.join("mm-main__asst-1.jsonl");
        let contents = tokio::fs::read_to_string(&path).await.unwrap();
        assert_eq!(contents.lines().count(), 2);
        assert!(contents.contains("\"type\":\"user_message\""));

        let _ = tokio::fs::remove_dir_all(&dir).await;
    }

    fn tempdir() -> PathBuf {
        std::env::temp_dir().join(format!("threadbot-test-{}", uuid::Uuid::new_v4()))
    }
}
