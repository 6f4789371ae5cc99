//! Responder backed by an external command.
//!
//! Each call spawns the command through the shell, writes one JSON request
//! line to its stdin and takes its trimmed stdout as the answer:
//!
//! ```text
//! {"prompt":"field_category","args":{"table_name":"users","field_name":"email",...}}
//! ```
//!
//! A command that fails, exits non-zero or runs past the timeout answers
//! with the empty string.

use std::process::Stdio;
use std::time::Duration;

use async_trait::async_trait;
use schema_enrich::{PromptArgs, PromptKind, Responder};
use serde::Serialize;
use tokio::io::AsyncWriteExt;
use tokio::process::Command;
use tracing::{debug, warn};

#[derive(Serialize)]
struct Request<'a> {
    prompt: PromptKind,
    args: &'a PromptArgs,
}

pub struct CommandResponder {
    command: String,
    timeout: Duration,
}

impl CommandResponder {
    pub fn new(command: impl Into<String>, timeout: Duration) -> Self {
        Self {
            command: command.into(),
            timeout,
        }
    }

    fn shell(&self) -> Command {
        #[cfg(unix)]
        {
            let mut cmd = Command::new("sh");
            cmd.arg("-c").arg(&self.command);
            cmd
        }
        #[cfg(not(unix))]
        {
            let mut cmd = Command::new("cmd");
            cmd.arg("/C").arg(&self.command);
            cmd
        }
    }

    async fn call(&self, line: &str) -> Result<String, String> {
        let mut child = self
            .shell()
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::inherit())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| format!("failed to spawn '{}': {}", self.command, e))?;

        // the request write shares the timeout with the wait
        let exchange = async move {
            if let Some(mut stdin) = child.stdin.take() {
                stdin
                    .write_all(line.as_bytes())
                    .await
                    .map_err(|e| format!("failed to write request: {}", e))?;
                stdin
                    .flush()
                    .await
                    .map_err(|e| format!("failed to write request: {}", e))?;
            }
            child
                .wait_with_output()
                .await
                .map_err(|e| format!("failed to read answer: {}", e))
        };

        let output = match tokio::time::timeout(self.timeout, exchange).await {
            Ok(result) => result?,
            Err(_) => return Err(format!("timed out after {}s", self.timeout.as_secs())),
        };
        if !output.status.success() {
            return Err(format!("exited with {}", output.status));
        }
        Ok(String::from_utf8_lossy(&output.stdout).trim().to_string())
    }
}

#[async_trait]
impl Responder for CommandResponder {
    async fn respond(&self, kind: PromptKind, args: &PromptArgs) -> String {
        let line = match serde_json::to_string(&Request { prompt: kind, args }) {
            Ok(json) => json + "\n",
            Err(e) => {
                warn!("Cannot encode {} request: {}", kind, e);
                return String::new();
            }
        };

        match self.call(&line).await {
            Ok(answer) => {
                debug!("Responder answered {}: {:?}", kind, answer);
                answer
            }
            Err(e) => {
                warn!("Responder command failed for {}: {}", kind, e);
                String::new()
            }
        }
    }

    fn responder_type(&self) -> &'static str {
        "command"
    }
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;

    fn responder(command: &str) -> CommandResponder {
        CommandResponder::new(command, Duration::from_secs(5))
    }

    #[tokio::test]
    async fn test_answer_is_trimmed_stdout() {
        let r = responder("cat > /dev/null; printf '  Enum\\n'");
        let args = PromptArgs::new().with("field_name", "status");
        assert_eq!(r.respond(PromptKind::FieldCategory, &args).await, "Enum");
        assert_eq!(r.responder_type(), "command");
    }

    #[tokio::test]
    async fn test_request_line_is_json() {
        let r = responder("cat");
        let args = PromptArgs::new().with("table_name", "users").with("field_name", "id");
        let echoed = r.respond(PromptKind::ColumnDescription, &args).await;
        let value: serde_json::Value = serde_json::from_str(&echoed).unwrap();
        assert_eq!(value["prompt"], "column_description");
        assert_eq!(value["args"]["table_name"], "users");
        assert_eq!(value["args"]["field_name"], "id");
    }

    #[tokio::test]
    async fn test_failures_answer_empty() {
        let args = PromptArgs::new();
        assert_eq!(
            responder("cat > /dev/null; echo partial; exit 3")
                .respond(PromptKind::TableDescription, &args)
                .await,
            ""
        );

        let slow = CommandResponder::new("sleep 5", Duration::from_millis(100));
        assert_eq!(slow.respond(PromptKind::TableDescription, &args).await, "");
    }

    #[tokio::test]
    async fn test_timeout_covers_unread_request() {
        // larger than a pipe buffer, so the write blocks
        let args = PromptArgs::new().with("table_mschema", "x".repeat(1 << 20));
        let deaf = CommandResponder::new("sleep 5", Duration::from_millis(200));

        let started = std::time::Instant::now();
        assert_eq!(deaf.respond(PromptKind::TableDescription, &args).await, "");
        assert!(started.elapsed() < Duration::from_secs(3));
    }
}
