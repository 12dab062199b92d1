//! `shell-exec`: run a shell command, capture combined output.
//!
//! `Platform`/timeout/allow-deny-list/output-cap fields and the incremental,
//! size-bounded stdout/stderr reader are lifted from
//! `cloudllm::tools::bash::BashTool`; the confirmation gate (optional,
//! per spec §4.4's table) and the `ToolOutcome` adaptation are new.

use crate::confirmation::ConfirmationProtocol;
use crate::schema::{FunctionDeclaration, Schema, SchemaType};
use crate::tool::{Tool, ToolContext, ToolError, ToolHandler, ToolOutcome};
use async_trait::async_trait;
use serde_json::{Map, Value};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::io::AsyncReadExt;
use tokio::process::Command as TokioCommand;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Platform {
    Linux,
    #[allow(non_camel_case_types)]
    macOS,
}

impl Platform {
    pub fn shell_path(&self) -> &'static str {
        "/bin/bash"
    }
}

const DEFAULT_MAX_OUTPUT_SIZE: usize = 10 * 1024 * 1024;
const DEFAULT_TIMEOUT_SECS: u64 = 30;

async fn read_limited<R: AsyncReadExt + Unpin>(
    mut reader: R,
    max_bytes: usize,
    stream_name: &'static str,
) -> Result<Vec<u8>, String> {
    let mut buf = Vec::new();
    let mut chunk = vec![0u8; 8192];
    loop {
        match reader.read(&mut chunk).await {
            Ok(0) => return Ok(buf),
            Ok(n) => {
                if buf.len() + n > max_bytes {
                    return Err(format!("{} exceeded the {} byte limit", stream_name, max_bytes));
                }
                buf.extend_from_slice(&chunk[..n]);
            }
            Err(e) => return Err(e.to_string()),
        }
    }
}

pub struct ShellExecHandler {
    platform: Platform,
    timeout: Duration,
    max_output_size: usize,
    allowed_commands: Option<Vec<String>>,
    denied_commands: Option<Vec<String>>,
    confirmation: Option<Arc<ConfirmationProtocol>>,
}

impl ShellExecHandler {
    pub fn new(platform: Platform) -> Self {
        Self {
            platform,
            timeout: Duration::from_secs(DEFAULT_TIMEOUT_SECS),
            max_output_size: DEFAULT_MAX_OUTPUT_SIZE,
            allowed_commands: None,
            denied_commands: None,
            confirmation: None,
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_denied_commands(mut self, commands: Vec<String>) -> Self {
        self.denied_commands = Some(commands);
        self
    }

    pub fn with_allowed_commands(mut self, commands: Vec<String>) -> Self {
        self.allowed_commands = Some(commands);
        self
    }

    pub fn with_confirmation(mut self, protocol: Arc<ConfirmationProtocol>) -> Self {
        self.confirmation = Some(protocol);
        self
    }

    fn is_command_allowed(&self, cmd: &str) -> Result<(), String> {
        let lower = cmd.trim().to_lowercase();
        let first_word = lower.split_whitespace().next().unwrap_or("");
        let basename = first_word.rsplit('/').next().unwrap_or(first_word);
        let matches = |entry: &str| {
            let e = entry.to_lowercase();
            lower.starts_with(&e) || basename.starts_with(&e)
        };
        if let Some(denied) = &self.denied_commands {
            if let Some(hit) = denied.iter().find(|d| matches(d)) {
                return Err(format!("command '{}' is denied", hit));
            }
        }
        if let Some(allowed) = &self.allowed_commands {
            if !allowed.iter().any(|a| matches(a)) {
                return Err("command not in allowed list".to_string());
            }
        }
        Ok(())
    }
}

#[async_trait]
impl ToolHandler for ShellExecHandler {
    async fn handle(&self, ctx: &ToolContext, args: &Map<String, Value>) -> Result<ToolOutcome, ToolError> {
        let Some(command) = args.get("command").and_then(Value::as_str) else {
            return Err(ToolError::InvalidParameters("missing string field 'command'".to_string()));
        };

        if let Err(e) = self.is_command_allowed(command) {
            return Ok(ToolOutcome::failure(e));
        }

        if let Some(protocol) = &self.confirmation {
            let confirmed = protocol
                .request(
                    ctx.session_id.clone(),
                    "Run shell command",
                    format!("Run `{}`?", command),
                    Some(command.to_string()),
                    Some("shell".to_string()),
                    std::future::pending(),
                )
                .await
                .unwrap_or(false);
            if !confirmed {
                return Ok(ToolOutcome::failure("command execution cancelled by user"));
            }
        }

        ctx.announce(format!("running: {}", command)).await;

        let start = Instant::now();
        let shell_path = self.platform.shell_path().to_string();
        let cmd = command.to_string();
        let max_output = self.max_output_size;
        let cwd = ctx.cwd.clone();

        let run = async move {
            let mut process = TokioCommand::new(&shell_path);
            process
                .arg("-c")
                .arg(&cmd)
                .current_dir(&cwd)
                .stdin(std::process::Stdio::null())
                .stdout(std::process::Stdio::piped())
                .stderr(std::process::Stdio::piped());
            let mut child = process.spawn().map_err(|e| e.to_string())?;
            let stdout_pipe = child.stdout.take().expect("stdout was piped");
            let stderr_pipe = child.stderr.take().expect("stderr was piped");
            let (stdout_result, stderr_result) = tokio::join!(
                read_limited(stdout_pipe, max_output, "stdout"),
                read_limited(stderr_pipe, max_output, "stderr"),
            );
            let (stdout_bytes, stderr_bytes) = match (stdout_result, stderr_result) {
                (Err(e), _) | (_, Err(e)) => {
                    let _ = child.kill().await;
                    return Err(e);
                }
                (Ok(out), Ok(err)) => (out, err),
            };
            let status = child.wait().await.map_err(|e| e.to_string())?;
            Ok((
                String::from_utf8_lossy(&stdout_bytes).to_string(),
                String::from_utf8_lossy(&stderr_bytes).to_string(),
                status.code().unwrap_or(-1),
            ))
        };

        match tokio::time::timeout(self.timeout, run).await {
            Ok(Ok((stdout, stderr, exit_code))) => {
                let mut data = Map::new();
                data.insert("stdout".to_string(), Value::String(stdout));
                data.insert("stderr".to_string(), Value::String(stderr));
                data.insert("exit_code".to_string(), Value::from(exit_code));
                data.insert(
                    "duration_ms".to_string(),
                    Value::from(start.elapsed().as_millis() as u64),
                );
                if exit_code == 0 {
                    Ok(ToolOutcome::success(data))
                } else {
                    let mut outcome = ToolOutcome::failure(format!("command exited with code {}", exit_code));
                    outcome.data = data;
                    Ok(outcome)
                }
            }
            Ok(Err(e)) => Ok(ToolOutcome::failure(e)),
            Err(_) => Ok(ToolOutcome::failure(format!(
                "command exceeded {}s timeout",
                self.timeout.as_secs()
            ))),
        }
    }
}

pub fn shell_exec_tool(handler: ShellExecHandler) -> Tool {
    let requires_confirmation = handler.confirmation.is_some();
    Tool::new(
        FunctionDeclaration::new(
            "shell-exec",
            "Run a shell command and capture its combined stdout/stderr",
            Schema::new(SchemaType::Object, "shell-exec arguments")
                .with_required(vec!["command".to_string()])
                .with_property("command", Schema::new(SchemaType::String, "the command to run")),
            Schema::new(SchemaType::Object, "shell-exec response"),
        ),
        Arc::new(handler),
    )
    .with_confirmation_required(requires_confirmation)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn args(command: &str) -> Map<String, Value> {
        let mut m = Map::new();
        m.insert("command".to_string(), Value::String(command.to_string()));
        m
    }

    #[tokio::test]
    async fn captures_stdout_on_success() {
        let handler = ShellExecHandler::new(Platform::Linux);
        let ctx = ToolContext::new(".", "s1");
        let outcome = handler.handle(&ctx, &args("echo hello")).await.unwrap();
        assert!(outcome.success);
        assert_eq!(
            outcome.data.get("stdout").and_then(Value::as_str).map(str::trim),
            Some("hello")
        );
    }

    #[tokio::test]
    async fn nonzero_exit_is_reported_as_failure_not_an_error() {
        let handler = ShellExecHandler::new(Platform::Linux);
        let ctx = ToolContext::new(".", "s1");
        let outcome = handler.handle(&ctx, &args("exit 7")).await.unwrap();
        assert!(!outcome.success);
        assert_eq!(outcome.data.get("exit_code").and_then(Value::as_i64), Some(7));
    }

    #[tokio::test]
    async fn denied_command_is_rejected_without_running() {
        let handler = ShellExecHandler::new(Platform::Linux).with_denied_commands(vec!["rm".to_string()]);
        let ctx = ToolContext::new(".", "s1");
        let outcome = handler.handle(&ctx, &args("rm -rf /tmp/x")).await.unwrap();
        assert!(!outcome.success);
        assert!(outcome.error.unwrap().contains("denied"));
    }

    #[tokio::test]
    async fn missing_command_argument_is_a_schema_error() {
        let handler = ShellExecHandler::new(Platform::Linux);
        let ctx = ToolContext::new(".", "s1");
        let err = handler.handle(&ctx, &Map::new()).await.unwrap_err();
        assert!(matches!(err, ToolError::InvalidParameters(_)));
    }
}
