//! System prompt construction

use std::collections::BTreeMap;
use std::fmt::Write;
use std::path::Path;

use crate::shell::ShellEntry;
use crate::stream::parser::{THINKING_CLOSE, THINKING_OPEN, TOOL_CLOSE, TOOL_OPEN};
use crate::tools::ToolRegistry;

/// Characters of each direct-shell output kept in the prompt
const SHELL_OUTPUT_PREVIEW: usize = 500;

/// What the prompt knows about the user's environment
pub struct PromptContext<'a> {
    pub working_dir: &'a Path,
    pub shell_log: &'a [ShellEntry],
    pub notes: &'a BTreeMap<String, String>,
}

/// Prompt for the shell agent: tag protocol, capabilities, example, context
pub fn shell_system_prompt(registry: &ToolRegistry, ctx: &PromptContext<'_>) -> String {
    let mut prompt = String::from(
        "You are termi, a command-line assistant working inside the user's terminal.\n\
         You can run shell commands to answer questions and complete tasks. \
         Use `man <command>` when you need a command's documentation.\n\n",
    );

    let _ = writeln!(prompt, "## Response format\n");
    let _ = writeln!(
        prompt,
        "- Put private reasoning inside {}...{}. It is shown dimmed and never executed.",
        THINKING_OPEN, THINKING_CLOSE
    );
    let _ = writeln!(
        prompt,
        "- To run a capability, write exactly one {}...{} block and stop. \
         The result comes back as a `tool` message and you continue from there.",
        TOOL_OPEN, TOOL_CLOSE
    );
    let _ = writeln!(
        prompt,
        "- When you have the answer, reply in plain text without either tag.\n"
    );

    let _ = writeln!(prompt, "## Capabilities\n");
    for tool in registry.all_tools() {
        let _ = writeln!(prompt, "### {}\n{}\nUsage: {}\n", tool.name(), tool.description(), tool.usage());
    }

    let _ = writeln!(prompt, "## Example\n");
    let _ = writeln!(prompt, "user: How much disk space is left?");
    let _ = writeln!(
        prompt,
        "assistant: {open_t}The command depends on the OS; check it first.{close_t}\n\
         {open_r}uname{close_r}",
        open_t = THINKING_OPEN,
        close_t = THINKING_CLOSE,
        open_r = TOOL_OPEN,
        close_r = TOOL_CLOSE
    );
    let _ = writeln!(prompt, "tool: Linux");
    let _ = writeln!(
        prompt,
        "assistant: {}Linux, so df works.{}\n{}df -h{}",
        THINKING_OPEN, THINKING_CLOSE, TOOL_OPEN, TOOL_CLOSE
    );
    let _ = writeln!(prompt, "tool: Filesystem Size Used Avail ...");
    let _ = writeln!(prompt, "assistant: Your root filesystem has 42G free.\n");

    push_environment(&mut prompt, ctx);
    prompt
}

/// Prompt for the chat agent: no capabilities, same context
pub fn chat_system_prompt(ctx: &PromptContext<'_>) -> String {
    let mut prompt = String::from(
        "You are termi, a shell expert. Answer questions and suggest commands \
         based on the user's recent shell activity. You cannot run commands yourself; \
         show them in code blocks for the user to run.\n\n",
    );
    push_environment(&mut prompt, ctx);
    prompt
}

fn push_environment(prompt: &mut String, ctx: &PromptContext<'_>) {
    let _ = writeln!(prompt, "## Environment\n");
    let _ = writeln!(prompt, "- OS: {} ({})", std::env::consts::OS, std::env::consts::ARCH);
    let _ = writeln!(prompt, "- Working directory: {}", ctx.working_dir.display());

    if !ctx.shell_log.is_empty() {
        let _ = writeln!(prompt, "\n## Recent shell activity\n");
        for entry in ctx.shell_log {
            let _ = writeln!(prompt, "$ {}", entry.command);
            let output = entry.output.trim_end();
            if !output.is_empty() {
                let _ = writeln!(prompt, "{}", clip(output, SHELL_OUTPUT_PREVIEW));
            }
            if !entry.success() {
                match entry.exit_code {
                    Some(code) => {
                        let _ = writeln!(prompt, "[exit code {}]", code);
                    }
                    None => {
                        let _ = writeln!(prompt, "[killed]");
                    }
                }
            }
        }
    }

    if !ctx.notes.is_empty() {
        let _ = writeln!(prompt, "\n## Notes from the user\n");
        for (key, value) in ctx.notes {
            let _ = writeln!(prompt, "- {}: {}", key, value);
        }
    }
}

fn clip(text: &str, max_chars: usize) -> String {
    match text.char_indices().nth(max_chars) {
        Some((idx, _)) => format!("{}\n[...]", &text[..idx]),
        None => text.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tools::builtin::create_shell_registry;
    use std::path::PathBuf;

    fn entry(command: &str, output: &str, code: i32) -> ShellEntry {
        ShellEntry {
            command: command.to_string(),
            output: output.to_string(),
            exit_code: Some(code),
        }
    }

    #[test]
    fn test_shell_prompt_describes_protocol_and_capabilities() {
        let dir = PathBuf::from("/home/user/project");
        let notes = BTreeMap::new();
        let ctx = PromptContext {
            working_dir: &dir,
            shell_log: &[],
            notes: &notes,
        };

        let prompt = shell_system_prompt(&create_shell_registry(), &ctx);
        assert!(prompt.contains("<thinking>"));
        assert!(prompt.contains("<tool_result>"));
        assert!(prompt.contains("### shell_cmd"));
        assert!(prompt.contains("/home/user/project"));
        assert!(!prompt.contains("Recent shell activity"));
    }

    #[test]
    fn test_prompt_includes_shell_log_and_notes() {
        let dir = PathBuf::from("/tmp");
        let log = vec![entry("ls", "a.txt\n", 0), entry("make", "error: boom\n", 2)];
        let mut notes = BTreeMap::new();
        notes.insert("editor".to_string(), "helix".to_string());
        let ctx = PromptContext {
            working_dir: &dir,
            shell_log: &log,
            notes: &notes,
        };

        let prompt = chat_system_prompt(&ctx);
        assert!(prompt.contains("$ ls\na.txt"));
        assert!(prompt.contains("[exit code 2]"));
        assert!(prompt.contains("- editor: helix"));
        assert!(!prompt.contains("### shell_cmd"));
    }

    #[test]
    fn test_clip_long_output() {
        let clipped = clip(&"x".repeat(20), 5);
        assert_eq!(clipped, "xxxxx\n[...]");
    }
}
