//! Shell command capability

use anyhow::{bail, Context, Result};
use async_trait::async_trait;
use serde_json::Value;
use std::process::Stdio;
use tokio::process::Command;
use tracing::debug;

use crate::tools::{CapabilityOutput, Tool, ToolContext};

/// Runs one command line through the user's shell
pub struct ShellTool;

impl ShellTool {
    /// Accepts a bare string or an object with `cmd` / `command`
    fn command_from(args: &Value) -> Result<String> {
        let command = match args {
            Value::String(s) => Some(s.as_str()),
            Value::Object(map) => map
                .get("cmd")
                .or_else(|| map.get("command"))
                .and_then(|v| v.as_str()),
            _ => None,
        };

        match command.map(str::trim) {
            Some(c) if !c.is_empty() => Ok(c.to_string()),
            _ => bail!("Missing command: expected a string or {{\"cmd\": \"...\"}}"),
        }
    }
}

/// Shell program and its "run this string" flag
pub fn shell_invocation() -> (String, &'static str) {
    if cfg!(target_os = "windows") {
        ("cmd".to_string(), "/C")
    } else {
        let shell = std::env::var("SHELL")
            .ok()
            .filter(|s| !s.trim().is_empty())
            .unwrap_or_else(|| "sh".to_string());
        (shell, "-c")
    }
}

/// Merge stdout and stderr the way the model sees them
pub fn combine_output(stdout: &[u8], stderr: &[u8]) -> String {
    let stdout = String::from_utf8_lossy(stdout);
    let stderr = String::from_utf8_lossy(stderr);

    let mut combined = String::new();
    if !stdout.is_empty() {
        combined.push_str(&stdout);
    }
    if !stderr.is_empty() {
        if !combined.is_empty() {
            combined.push_str("\n--- stderr ---\n");
        }
        combined.push_str(&stderr);
    }
    combined
}

#[async_trait]
impl Tool for ShellTool {
    fn name(&self) -> &str {
        "shell_cmd"
    }

    fn description(&self) -> &str {
        "Execute a shell command in the current working directory and return its combined stdout and stderr."
    }

    fn usage(&self) -> &str {
        "Put the command line itself in the block, e.g. <tool_result>ls -la</tool_result>, \
         or JSON: <tool_result>{\"name\": \"shell_cmd\", \"arguments\": {\"cmd\": \"ls -la\"}}</tool_result>"
    }

    async fn run(&self, args: &Value, ctx: &ToolContext) -> Result<CapabilityOutput> {
        let command = Self::command_from(args)?;

        if !ctx.working_dir.is_dir() {
            return Ok(CapabilityOutput::failure(format!(
                "Working directory does not exist: {}",
                ctx.working_dir.display()
            )));
        }

        let (shell, flag) = shell_invocation();
        debug!(%shell, %command, "Spawning shell command");

        // Dropping the future (timeout, interrupt) kills the child
        let output = Command::new(&shell)
            .arg(flag)
            .arg(&command)
            .current_dir(&ctx.working_dir)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .output()
            .await
            .with_context(|| format!("Failed to spawn {}", shell))?;

        let combined = combine_output(&output.stdout, &output.stderr);

        if output.status.success() {
            Ok(CapabilityOutput::success(combined))
        } else {
            let code = output
                .status
                .code()
                .map(|c| c.to_string())
                .unwrap_or_else(|| "unknown".to_string());
            let mut text = combined;
            if !text.is_empty() && !text.ends_with('\n') {
                text.push('\n');
            }
            text.push_str(&format!("[exit code {}]", code));
            Ok(CapabilityOutput::failure(text))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use tempfile::TempDir;

    #[test]
    fn test_command_from_accepts_string_and_object() {
        assert_eq!(ShellTool::command_from(&json!("ls")).unwrap(), "ls");
        assert_eq!(ShellTool::command_from(&json!({"cmd": "pwd"})).unwrap(), "pwd");
        assert_eq!(
            ShellTool::command_from(&json!({"command": " date "})).unwrap(),
            "date"
        );
        assert!(ShellTool::command_from(&json!({"other": 1})).is_err());
        assert!(ShellTool::command_from(&json!("   ")).is_err());
        assert!(ShellTool::command_from(&json!(42)).is_err());
    }

    #[test]
    fn test_combine_output() {
        assert_eq!(combine_output(b"out\n", b""), "out\n");
        assert_eq!(combine_output(b"", b"err\n"), "err\n");
        assert_eq!(combine_output(b"out\n", b"err\n"), "out\n\n--- stderr ---\nerr\n");
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_shell_echo() {
        let result = ShellTool
            .run(&json!("echo 'hello world'"), &ToolContext::default())
            .await
            .unwrap();
        assert!(result.success);
        assert!(result.output.contains("hello world"));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_shell_pwd_uses_context_dir() {
        let temp_dir = TempDir::new().unwrap();
        let ctx = ToolContext::new(temp_dir.path().to_path_buf());

        let result = ShellTool.run(&json!({"cmd": "pwd"}), &ctx).await.unwrap();
        assert!(result.success);
        let canonical = temp_dir.path().canonicalize().unwrap();
        assert!(
            result.output.contains(canonical.to_str().unwrap())
                || result.output.contains(temp_dir.path().to_str().unwrap())
        );
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_shell_nonzero_exit_is_failure() {
        let result = ShellTool
            .run(&json!("echo oops >&2; exit 3"), &ToolContext::default())
            .await
            .unwrap();
        assert!(!result.success);
        assert!(result.output.contains("oops"));
        assert!(result.output.ends_with("[exit code 3]"));
    }

    #[tokio::test]
    async fn test_missing_working_dir() {
        let temp_dir = TempDir::new().unwrap();
        let ctx = ToolContext::new(temp_dir.path().join("gone"));
        let result = ShellTool.run(&json!("true"), &ctx).await.unwrap();
        assert!(!result.success);
        assert!(result.output.contains("does not exist"));
    }
}
