//! Assistant subprocess lifecycle management: spawn, NDJSON stdin/stdout wiring,
//! bounded stderr capture, graceful-then-forceful shutdown (spec §4.2).

use super::protocol::{AssistantEvent, UserMessage, parse_event};
use crate::error::{AssistantError, Result};
use std::path::Path;
use std::process::Stdio;
use tokio::io::{AsyncBufReadExt, AsyncReadExt, AsyncWriteExt, BufReader};
use tokio::process::{Child, ChildStdin};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

/// Maximum bytes to capture from the assistant's stderr stream.
const MAX_STDERR_BYTES: usize = 64 * 1024;
/// Grace window before escalating SIGTERM to SIGKILL.
const KILL_GRACE: std::time::Duration = std::time::Duration::from_secs(5);

/// Configuration needed to spawn one assistant subprocess.
#[derive(Debug, Clone)]
pub struct SpawnConfig {
    pub command: String,
    pub args: Vec<String>,
    pub env: Vec<(String, String)>,
    pub working_dir: std::path::PathBuf,
    /// Assistant-native session id to resume, if respawning after an idle timeout or crash.
    pub resume_session_id: Option<String>,
}

/// An item produced by the assistant's stdout stream.
#[derive(Debug)]
pub enum StreamItem {
    Event(AssistantEvent),
    /// stdout closed. `clean` is true only if the stream ended right after a `result` event;
    /// otherwise this is the "unexpected exit" case the Session Manager must distinguish
    /// from a normal end-of-turn (spec §4.2).
    Exited { clean: bool },
}

/// A running assistant subprocess with piped I/O.
pub struct AssistantProcess {
    child: Child,
    stdin: Option<ChildStdin>,
    stderr_task: JoinHandle<String>,
}

impl AssistantProcess {
    /// Spawn the assistant subprocess and begin streaming its stdout as [`StreamItem`]s.
    ///
    /// Returns the process handle plus a receiver of parsed events. The background
    /// reader task owns `stdout` for the process's lifetime.
    pub fn spawn(config: SpawnConfig) -> Result<(Self, mpsc::Receiver<StreamItem>)> {
        let mut cmd = tokio::process::Command::new(&config.command);
        cmd.args(&config.args)
            .current_dir(&config.working_dir)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        if let Some(resume_id) = &config.resume_session_id {
            cmd.arg("--resume").arg(resume_id);
        }

        for (key, value) in &config.env {
            cmd.env(key, value);
        }

        let mut child = cmd
            .spawn()
            .map_err(|e| AssistantError::Spawn(format!("{}: {e}", config.command)))?;

        let stdin = child.stdin.take();
        let stdout = child.stdout.take();
        let stderr = child.stderr.take();

        let stderr_task = tokio::spawn(async move {
            let Some(stderr) = stderr else {
                return String::new();
            };
            let mut reader = BufReader::new(stderr);
            let mut buf = Vec::with_capacity(4096);
            loop {
                let mut chunk = [0u8; 4096];
                match reader.read(&mut chunk).await {
                    Ok(0) => break,
                    Ok(n) => {
                        let remaining = MAX_STDERR_BYTES.saturating_sub(buf.len());
                        if remaining == 0 {
                            continue;
                        }
                        buf.extend_from_slice(&chunk[..n.min(remaining)]);
                    }
                    Err(_) => break,
                }
            }
            String::from_utf8_lossy(&buf).into_owned()
        });

        let (tx, rx) = mpsc::channel(256);
        tokio::spawn(async move {
            let Some(stdout) = stdout else {
                let _ = tx.send(StreamItem::Exited { clean: false }).await;
                return;
            };
            let mut lines = BufReader::new(stdout).lines();
            let mut last_was_result = false;

            loop {
                match lines.next_line().await {
                    Ok(Some(line)) => {
                        if line.trim().is_empty() {
                            continue;
                        }
                        match parse_event(&line) {
                            Ok(event) => {
                                last_was_result = matches!(event, AssistantEvent::Result(_));
                                if tx.send(StreamItem::Event(event)).await.is_err() {
                                    break;
                                }
                            }
                            Err(error) => {
                                tracing::warn!(%error, line, "failed to parse assistant event");
                            }
                        }
                    }
                    Ok(None) => {
                        let _ = tx
                            .send(StreamItem::Exited {
                                clean: last_was_result,
                            })
                            .await;
                        break;
                    }
                    Err(error) => {
                        tracing::warn!(%error, "error reading assistant stdout");
                        let _ = tx.send(StreamItem::Exited { clean: false }).await;
                        break;
                    }
                }
            }
        });

        Ok((
            Self {
                child,
                stdin,
                stderr_task,
            },
            rx,
        ))
    }

    /// Write one user message to the assistant's stdin as a single NDJSON line.
    pub async fn send(&mut self, message: &UserMessage) -> Result<()> {
        let stdin = self
            .stdin
            .as_mut()
            .ok_or_else(|| AssistantError::StdinWrite("stdin already closed".into()))?;
        let line = message
            .to_ndjson_line()
            .map_err(|e| AssistantError::StdinWrite(e.to_string()))?;
        stdin
            .write_all(line.as_bytes())
            .await
            .map_err(|e| AssistantError::StdinWrite(e.to_string()))?;
        stdin
            .write_all(b"\n")
            .await
            .map_err(|e| AssistantError::StdinWrite(e.to_string()))?;
        stdin
            .flush()
            .await
            .map_err(|e| AssistantError::StdinWrite(e.to_string()))?;
        Ok(())
    }

    /// Send SIGTERM, wait for the grace window, then SIGKILL if the process is still alive.
    pub async fn kill(&mut self) {
        #[cfg(unix)]
        if let Some(pid) = self.child.id() {
            unsafe {
                libc::kill(pid as i32, libc::SIGTERM);
            }
        }

        if tokio::time::timeout(KILL_GRACE, self.child.wait())
            .await
            .is_err()
        {
            let _ = self.child.kill().await;
        }
    }

    /// Collect captured stderr output (consumes the capture task).
    pub async fn stderr_tail(&mut self) -> String {
        (&mut self.stderr_task).await.unwrap_or_default()
    }

    pub fn exit_code(&mut self) -> Option<i32> {
        self.child.try_wait().ok().flatten().and_then(|s| s.code())
    }
}

pub(crate) fn resolve_working_dir(base: &Path, subpath: Option<&str>) -> std::path::PathBuf {
    match subpath {
        Some(p) => base.join(p),
        None => base.to_path_buf(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn spawned_echo_process_emits_parsed_events_then_exits_cleanly() {
        let line = r#"{"type":"result","subtype":"success"}"#;
        let config = SpawnConfig {
            command: "sh".into(),
            args: vec!["-c".into(), format!("printf '%s\\n' '{line}'")],
            env: Vec::new(),
            working_dir: std::env::temp_dir(),
            resume_session_id: None,
        };
        let (mut process, mut rx) = AssistantProcess::spawn(config).unwrap();

        let mut saw_result = false;
        let mut exited_clean = false;
        while let Some(item) = rx.recv().await {
            match item {
                StreamItem::Event(AssistantEvent::Result(r)) => {
                    saw_result = r.is_success();
                }
                StreamItem::Exited { clean } => {
                    exited_clean = clean;
                    break;
                }
                _ => {}
            }
        }
        assert!(saw_result);
        assert!(exited_clean);
        process.kill().await;
    }

    #[test]
    fn resolve_working_dir_joins_subpath() {
        let base = Path::new("/tmp/base");
        assert_eq!(
            resolve_working_dir(base, Some("sub")),
            Path::new("/tmp/base/sub")
        );
        assert_eq!(resolve_working_dir(base, None), Path::new("/tmp/base"));
    }
}
