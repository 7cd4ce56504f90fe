//! termi: a shell where the AI is one prefix away
//!
//! Lines starting with `AI:` go to a language model that can reason, run
//! shell commands and answer; everything else runs in the shell.

mod agent;
mod commands;
mod config;
mod conversation;
mod progress;
mod prompt;
mod render;
mod repl;
mod shell;
mod stream;
mod tools;

#[cfg(test)]
mod testing;

use anyhow::Result;
use clap::{Parser, Subcommand};
use termi_llm::config::API_KEY_ENV;
use tracing_subscriber::EnvFilter;

use crate::agent::AgentKind;
use crate::config::{Overrides, UserConfig};

#[derive(Debug, Parser)]
#[command(name = "termi")]
#[command(about = "Shell assistant driven by a language model", version)]
#[command(propagate_version = true)]
struct Cli {
    /// Enable verbose (debug) logging on stderr
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Model to use (overrides config)
    #[arg(short, long, global = true)]
    model: Option<String>,

    /// API root of an OpenAI-compatible endpoint
    #[arg(long, global = true)]
    base_url: Option<String>,

    /// API key
    #[arg(long, global = true, env = API_KEY_ENV, hide_env_values = true)]
    api_key: Option<String>,

    /// Agent variant
    #[arg(long, global = true, value_enum)]
    agent: Option<AgentKind>,

    /// Tool rounds allowed per request
    #[arg(long, global = true)]
    max_tool_rounds: Option<usize>,

    /// Seconds a single command may run
    #[arg(long, global = true)]
    tool_timeout: Option<u64>,

    /// Do not print the model's thinking
    #[arg(long, global = true)]
    hide_thinking: bool,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Start the interactive shell (default)
    Chat,

    /// One-shot request (non-interactive)
    Ask {
        /// The request to send
        prompt: Vec<String>,

        /// Prepend stdin to the request
        #[arg(long)]
        stdin: bool,
    },

    /// Manage configuration
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
}

#[derive(Debug, Subcommand)]
enum ConfigAction {
    /// Write a commented default config file
    Init,
    /// Print the config file location
    Path,
    /// Show the effective configuration
    Show,
}

impl Cli {
    fn overrides(&self) -> Overrides {
        Overrides {
            model: self.model.clone(),
            base_url: self.base_url.clone(),
            api_key: self.api_key.clone(),
            agent: self.agent,
            max_tool_rounds: self.max_tool_rounds,
            tool_timeout_secs: self.tool_timeout,
            hide_thinking: self.hide_thinking,
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // RUST_LOG wins; logs go to stderr so they never mix with streamed output
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        if cli.verbose {
            EnvFilter::new("debug")
        } else {
            EnvFilter::new("warn")
        }
    });
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    match cli.command {
        Some(Commands::Config { ref action }) => match action {
            ConfigAction::Init => commands::config_init().await,
            ConfigAction::Path => commands::config_path().await,
            ConfigAction::Show => {
                let config = UserConfig::load()?.resolve(&cli.overrides());
                commands::config_show(&config).await
            }
        },
        Some(Commands::Ask { ref prompt, stdin }) => {
            let config = UserConfig::load()?.resolve(&cli.overrides());
            commands::ask(&config, &prompt.join(" "), stdin).await
        }
        Some(Commands::Chat) | None => {
            let config = UserConfig::load()?.resolve(&cli.overrides());
            repl::run(config).await
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cli_parses_flags() {
        let cli = Cli::try_parse_from([
            "termi",
            "--agent",
            "chat",
            "--max-tool-rounds",
            "3",
            "--hide-thinking",
            "ask",
            "what",
            "time",
        ])
        .unwrap();

        let overrides = cli.overrides();
        assert_eq!(overrides.agent, Some(AgentKind::Chat));
        assert_eq!(overrides.max_tool_rounds, Some(3));
        assert!(overrides.hide_thinking);
        match cli.command {
            Some(Commands::Ask { prompt, stdin }) => {
                assert_eq!(prompt, vec!["what", "time"]);
                assert!(!stdin);
            }
            other => panic!("unexpected command: {:?}", other),
        }
    }

    #[test]
    fn test_cli_defaults_to_repl() {
        let cli = Cli::try_parse_from(["termi", "-m", "local-model"]).unwrap();
        assert!(cli.command.is_none());
        assert_eq!(cli.model.as_deref(), Some("local-model"));
    }

    #[test]
    fn test_cli_config_subcommands() {
        let cli = Cli::try_parse_from(["termi", "config", "path"]).unwrap();
        assert!(matches!(
            cli.command,
            Some(Commands::Config {
                action: ConfigAction::Path
            })
        ));
    }
}
