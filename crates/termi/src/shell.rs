//! Direct shell execution for REPL lines that are not addressed to the AI
//!
//! Each line runs in a fresh shell process. `cd` is handled here so the
//! working directory carries over to later lines and to agent capabilities.

use std::path::{Path, PathBuf};
use std::process::Stdio;

use anyhow::{Context, Result};
use tokio::process::Command;
use tracing::debug;

use crate::tools::builtin::{combine_output, shell_invocation};

/// One directly executed command and what it printed
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ShellEntry {
    pub command: String,
    pub output: String,
    /// `None` when the process was killed by a signal
    pub exit_code: Option<i32>,
}

impl ShellEntry {
    pub fn success(&self) -> bool {
        self.exit_code == Some(0)
    }
}

#[derive(Debug)]
pub struct ShellSession {
    cwd: PathBuf,
    previous: Option<PathBuf>,
}

impl ShellSession {
    pub fn new(cwd: PathBuf) -> Self {
        Self {
            cwd,
            previous: None,
        }
    }

    pub fn cwd(&self) -> &Path {
        &self.cwd
    }

    /// Run one line. `Err` only when the shell could not be started.
    pub async fn execute(&mut self, line: &str) -> Result<ShellEntry> {
        let line = line.trim();
        if let Some(arg) = cd_argument(line) {
            return Ok(self.change_dir(line, arg));
        }

        let (shell, flag) = shell_invocation();
        debug!(%shell, command = %line, cwd = %self.cwd.display(), "Running direct command");

        let output = Command::new(&shell)
            .arg(flag)
            .arg(line)
            .current_dir(&self.cwd)
            .stdin(Stdio::inherit())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .output()
            .await
            .with_context(|| format!("Failed to spawn {}", shell))?;

        Ok(ShellEntry {
            command: line.to_string(),
            output: combine_output(&output.stdout, &output.stderr),
            exit_code: output.status.code(),
        })
    }

    fn change_dir(&mut self, line: &str, arg: &str) -> ShellEntry {
        let entry = |output: String, code: i32| ShellEntry {
            command: line.to_string(),
            output,
            exit_code: Some(code),
        };

        let Some(target) = self.resolve_target(arg) else {
            return entry("cd: no previous directory\n".to_string(), 1);
        };

        match target.canonicalize() {
            Ok(dir) if dir.is_dir() => {
                debug!(from = %self.cwd.display(), to = %dir.display(), "Changed directory");
                self.previous = Some(std::mem::replace(&mut self.cwd, dir));
                entry(String::new(), 0)
            }
            _ => entry(format!("cd: no such directory: {}\n", arg), 1),
        }
    }

    fn resolve_target(&self, arg: &str) -> Option<PathBuf> {
        let home = || dirs::home_dir().unwrap_or_else(|| PathBuf::from("/"));
        match arg {
            "" | "~" => Some(home()),
            "-" => self.previous.clone(),
            _ => {
                if let Some(rest) = arg.strip_prefix("~/") {
                    Some(home().join(rest))
                } else {
                    Some(self.cwd.join(arg))
                }
            }
        }
    }
}

/// `Some(arg)` when `line` is a plain `cd` (no chaining)
fn cd_argument(line: &str) -> Option<&str> {
    if line.contains(['&', ';', '|']) {
        return None;
    }
    if line == "cd" {
        return Some("");
    }
    line.strip_prefix("cd ")
        .map(|arg| arg.trim().trim_matches(|c| c == '"' || c == '\''))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_cd_argument() {
        assert_eq!(cd_argument("cd"), Some(""));
        assert_eq!(cd_argument("cd /tmp"), Some("/tmp"));
        assert_eq!(cd_argument("cd \"my dir\""), Some("my dir"));
        assert_eq!(cd_argument("cd /tmp && ls"), None);
        assert_eq!(cd_argument("cdrecord"), None);
        assert_eq!(cd_argument("ls"), None);
    }

    #[tokio::test]
    async fn test_cd_changes_working_dir() {
        let temp = TempDir::new().unwrap();
        std::fs::create_dir(temp.path().join("sub")).unwrap();
        let mut session = ShellSession::new(temp.path().to_path_buf());

        let entry = session.execute("cd sub").await.unwrap();
        assert!(entry.success());
        assert_eq!(session.cwd(), temp.path().join("sub").canonicalize().unwrap());

        let back = session.execute("cd -").await.unwrap();
        assert!(back.success());
        assert_eq!(session.cwd(), temp.path().canonicalize().unwrap());
    }

    #[tokio::test]
    async fn test_cd_missing_dir_keeps_cwd() {
        let temp = TempDir::new().unwrap();
        let mut session = ShellSession::new(temp.path().to_path_buf());

        let entry = session.execute("cd nowhere").await.unwrap();
        assert!(!entry.success());
        assert!(entry.output.contains("no such directory"));
        assert_eq!(session.cwd(), temp.path());
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_command_runs_in_session_dir() {
        let temp = TempDir::new().unwrap();
        std::fs::write(temp.path().join("marker.txt"), "x").unwrap();
        let mut session = ShellSession::new(temp.path().to_path_buf());

        let entry = session.execute("ls").await.unwrap();
        assert!(entry.success());
        assert!(entry.output.contains("marker.txt"));

        let failed = session.execute("exit 4").await.unwrap();
        assert_eq!(failed.exit_code, Some(4));
        assert!(!failed.success());
    }
}
