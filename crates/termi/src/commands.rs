//! CLI commands implementation

use anyhow::{Context, Result};
use std::io::{self, IsTerminal, Read};
use std::path::PathBuf;
use std::sync::Arc;
use termi_llm::OpenAiClient;
use tokio_util::sync::CancellationToken;

use crate::agent::{build_agent, Agent, TurnOutcome};
use crate::config::UserConfig;
use crate::progress::StatusLine;
use crate::render::TerminalPresenter;

// ANSI color codes
const BLUE: &str = "\x1b[94m";
const BOLD: &str = "\x1b[1m";
const DIM: &str = "\x1b[2m";
const RESET: &str = "\x1b[0m";

/// Build the configured agent over a real model client
pub fn create_agent(config: &UserConfig, working_dir: PathBuf) -> Result<Box<dyn Agent>> {
    let client = OpenAiClient::new(config.model.clone()).context("Failed to create model client")?;
    Ok(build_agent(
        config.agent.kind,
        Arc::new(client),
        config.agent.to_agent_config(working_dir),
    ))
}

/// One-shot agent turn (non-interactive)
pub async fn ask(config: &UserConfig, prompt: &str, stdin: bool) -> Result<()> {
    let mut request = String::new();

    if stdin {
        let mut input = String::new();
        io::stdin()
            .read_to_string(&mut input)
            .context("Failed to read stdin")?;
        if !input.trim().is_empty() {
            request.push_str("```\n");
            request.push_str(input.trim_end());
            request.push_str("\n```\n\n");
        }
    }
    request.push_str(prompt.trim());

    if request.trim().is_empty() {
        anyhow::bail!("Nothing to ask. Usage: termi ask <prompt...>");
    }

    let working_dir = std::env::current_dir().context("Failed to determine current directory")?;
    let mut agent = create_agent(config, working_dir)?;
    let mut presenter = TerminalPresenter::new(config.agent.show_thinking && io::stdout().is_terminal());

    let cancel = CancellationToken::new();
    let watcher = tokio::spawn({
        let cancel = cancel.clone();
        async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                cancel.cancel();
            }
        }
    });

    let report = agent.think(&request, &mut presenter, &cancel).await;
    watcher.abort();

    match report.outcome {
        TurnOutcome::Completed => Ok(()),
        TurnOutcome::Failed(message) => anyhow::bail!("Request failed: {}", message),
        TurnOutcome::Interrupted => anyhow::bail!("Interrupted"),
        TurnOutcome::MaxToolRoundsExceeded(rounds) => {
            anyhow::bail!("No final answer after {} tool round(s)", rounds)
        }
    }
}

// Config management commands

/// Create default config file
pub async fn config_init() -> Result<()> {
    match UserConfig::create_default() {
        Ok(path) => {
            let status = StatusLine::new();
            status.success(format!("Created {}", path.display()));
            status.info("Set OPENAI_API_KEY (or api_key under [model]) before asking anything.");
        }
        Err(e) => {
            if e.to_string().contains("already exists") {
                let path = UserConfig::config_path()?;
                StatusLine::new().detail(format!("Config file already exists: {}", path.display()));
            } else {
                return Err(e);
            }
        }
    }

    Ok(())
}

/// Print config file path
pub async fn config_path() -> Result<()> {
    let path = UserConfig::config_path()?;
    println!("{}", path.display());

    Ok(())
}

/// Show the effective configuration after environment and flags
pub async fn config_show(config: &UserConfig) -> Result<()> {
    let path = UserConfig::config_path()?;
    let source = if path.exists() {
        path.display().to_string()
    } else {
        "defaults (no config file)".to_string()
    };

    println!("{}Effective Configuration{}", BOLD, RESET);
    println!("  {}Source:{} {}", DIM, RESET, source);
    println!();

    println!("{}[model]{}", BLUE, RESET);
    println!("  base_url = \"{}\"", config.model.base_url);
    println!("  api_key = {}", mask_key(config.model.api_key.as_deref()));
    println!("  model = \"{}\"", config.model.model);
    println!("  temperature = {}", config.model.temperature);
    println!("  max_tokens = {}", config.model.max_tokens);
    println!();

    println!("{}[agent]{}", BLUE, RESET);
    println!("  kind = \"{}\"", config.agent.kind);
    println!("  max_tool_rounds = {}", config.agent.max_tool_rounds);
    println!("  tool_timeout_secs = {}", config.agent.tool_timeout_secs);
    println!("  max_output_len = {}", config.agent.max_output_len);
    println!("  show_thinking = {}", config.agent.show_thinking);
    if let Some(window) = config.agent.history_window {
        println!("  history_window = {}", window);
    }
    println!();

    println!("{}[repl]{}", BLUE, RESET);
    println!("  ai_prefix = \"{}\"", config.repl.ai_prefix);
    println!("  history_size = {}", config.repl.history_size);

    Ok(())
}

fn mask_key(key: Option<&str>) -> String {
    match key {
        None => "(not set)".to_string(),
        Some(k) if k.chars().count() <= 8 => "\"****\"".to_string(),
        Some(k) => {
            let tail: String = k.chars().rev().take(4).collect::<Vec<_>>().into_iter().rev().collect();
            format!("\"****{}\"", tail)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mask_key() {
        assert_eq!(mask_key(None), "(not set)");
        assert_eq!(mask_key(Some("short")), "\"****\"");
        assert_eq!(mask_key(Some("sk-1234567890abcd")), "\"****abcd\"");
    }

    #[test]
    fn test_create_agent_uses_configured_kind() {
        let mut config = UserConfig::default();
        config.agent.kind = crate::agent::AgentKind::Chat;
        let agent = create_agent(&config, PathBuf::from(".")).unwrap();
        assert_eq!(agent.kind(), crate::agent::AgentKind::Chat);
        assert!(agent.available_actions().is_empty());
    }
}
