//! Interactive shell with an AI prefix
//!
//! - Lines starting with the AI prefix (`AI:` by default) run an agent turn
//! - Any other line runs directly in the shell; `cd` is tracked
//! - Slash commands for in-session control
//! - `exit` or Ctrl-D ends the session; Ctrl-C cancels the running turn

use anyhow::{Context, Result};
use rustyline::error::ReadlineError;
use rustyline::history::DefaultHistory;
use rustyline::Editor;
use std::path::PathBuf;
use termi_llm::Role;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::agent::{Agent, TurnOutcome};
use crate::commands::create_agent;
use crate::config::UserConfig;
use crate::progress::StatusLine;
use crate::render::TerminalPresenter;
use crate::shell::ShellSession;

// ANSI colors
const GREEN: &str = "\x1b[92m";
const BLUE: &str = "\x1b[94m";
const YELLOW: &str = "\x1b[93m";
const CYAN: &str = "\x1b[96m";
const DIM: &str = "\x1b[2m";
const BOLD: &str = "\x1b[1m";
const RESET: &str = "\x1b[0m";

/// What a line of input asks for
#[derive(Debug, PartialEq, Eq)]
enum ReplInput<'a> {
    Empty,
    Exit,
    Slash { command: &'a str, args: &'a str },
    Ai(&'a str),
    Shell(&'a str),
}

fn classify<'a>(line: &'a str, ai_prefix: &str) -> ReplInput<'a> {
    let line = line.trim();
    if line.is_empty() {
        return ReplInput::Empty;
    }
    if line.eq_ignore_ascii_case("exit") {
        return ReplInput::Exit;
    }
    if let Some(request) = line.strip_prefix(ai_prefix) {
        return ReplInput::Ai(request.trim());
    }
    if let Some(rest) = line.strip_prefix('/') {
        let (command, args) = line.split_once(' ').unwrap_or((line, ""));
        // `/usr/bin/env` is a path, not a slash command
        if !rest.is_empty() && !command[1..].contains('/') {
            return ReplInput::Slash {
                command,
                args: args.trim(),
            };
        }
    }
    ReplInput::Shell(line)
}

struct ReplState {
    agent: Box<dyn Agent>,
    shell: ShellSession,
    presenter: TerminalPresenter,
    ai_prefix: String,
    model: String,
}

/// Run the interactive REPL
pub async fn run(config: UserConfig) -> Result<()> {
    let working_dir = std::env::current_dir().context("Failed to determine current directory")?;

    if config.model.api_key.is_none() {
        eprintln!(
            "{}Warning:{} no API key configured; set OPENAI_API_KEY or run {}termi config init{}",
            YELLOW, RESET, BLUE, RESET
        );
    }

    let mut state = ReplState {
        agent: create_agent(&config, working_dir.clone())?,
        shell: ShellSession::new(working_dir),
        presenter: TerminalPresenter::new(config.agent.show_thinking),
        ai_prefix: config.repl.ai_prefix.clone(),
        model: config.model.model.clone(),
    };

    let rl_config = rustyline::Config::builder()
        .max_history_size(config.repl.history_size)?
        .auto_add_history(false)
        .build();
    let mut rl: Editor<(), DefaultHistory> = Editor::with_config(rl_config)?;
    let history_path = history_path();
    if let Some(path) = &history_path {
        let _ = rl.load_history(path);
    }

    print_welcome(&state);

    loop {
        let prompt = format!("{}{}{} {}>{} ", DIM, short_cwd(&state), RESET, CYAN, RESET);

        match rl.readline(&prompt) {
            Ok(line) => {
                let input = classify(&line, &state.ai_prefix);
                if input != ReplInput::Empty {
                    let _ = rl.add_history_entry(line.trim());
                }

                match input {
                    ReplInput::Empty => continue,
                    ReplInput::Exit => break,
                    ReplInput::Slash { command, args } => {
                        match handle_slash_command(&mut state, command, args) {
                            Ok(true) => break,
                            Ok(false) => {}
                            Err(e) => StatusLine::new().error(format!("{:#}", e)),
                        }
                    }
                    ReplInput::Ai("") => {
                        println!("Usage: {} <request>", state.ai_prefix);
                    }
                    ReplInput::Ai(request) => ask_agent(&mut state, request).await,
                    ReplInput::Shell(command) => {
                        if let Err(e) = run_shell(&mut state, command).await {
                            StatusLine::new().error(format!("{:#}", e));
                        }
                    }
                }
            }
            Err(ReadlineError::Interrupted) => {
                println!("{}^C{}", DIM, RESET);
                continue;
            }
            Err(ReadlineError::Eof) => break,
            Err(e) => {
                eprintln!("{}Error:{} {}", YELLOW, RESET, e);
                break;
            }
        }
    }

    println!("{}Goodbye!{}", DIM, RESET);
    if let Some(path) = &history_path {
        let _ = rl.save_history(path);
    }

    Ok(())
}

/// Token cancelled by the next Ctrl-C; the watcher must be aborted afterwards
fn ctrl_c_token() -> (CancellationToken, tokio::task::JoinHandle<()>) {
    let cancel = CancellationToken::new();
    let watcher = tokio::spawn({
        let cancel = cancel.clone();
        async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                cancel.cancel();
            }
        }
    });
    (cancel, watcher)
}

async fn ask_agent(state: &mut ReplState, request: &str) {
    let (cancel, watcher) = ctrl_c_token();
    let report = state
        .agent
        .think(request, &mut state.presenter, &cancel)
        .await;
    watcher.abort();

    info!(outcome = ?report.outcome, tool_rounds = report.tool_rounds, "Turn finished");
    if report.outcome == TurnOutcome::Completed && report.tool_rounds > 0 {
        println!("{}({} tool round(s)){}", DIM, report.tool_rounds, RESET);
    }
}

async fn run_shell(state: &mut ReplState, command: &str) -> Result<()> {
    let (cancel, watcher) = ctrl_c_token();
    let before = state.shell.cwd().to_path_buf();

    let executed = tokio::select! {
        _ = cancel.cancelled() => None,
        entry = state.shell.execute(command) => Some(entry),
    };
    watcher.abort();

    let Some(entry) = executed else {
        println!("{}^C{}", DIM, RESET);
        return Ok(());
    };
    let entry = entry?;

    print!("{}", entry.output);
    if !entry.output.is_empty() && !entry.output.ends_with('\n') {
        println!();
    }
    if !entry.success() {
        match entry.exit_code {
            Some(code) => println!("{}[exit code {}]{}", DIM, code, RESET),
            None => println!("{}[killed]{}", DIM, RESET),
        }
    }

    if state.shell.cwd() != before {
        debug!(cwd = %state.shell.cwd().display(), "Working directory changed");
        state.agent.set_working_dir(state.shell.cwd().to_path_buf());
    }
    state.agent.observe_shell(entry);
    Ok(())
}

/// Handle slash commands; `Ok(true)` ends the session
fn handle_slash_command(state: &mut ReplState, command: &str, args: &str) -> Result<bool> {
    let status = StatusLine::new();
    match command.to_lowercase().as_str() {
        "/help" | "/h" | "/?" => print_help(&state.ai_prefix),
        "/exit" | "/quit" | "/q" => return Ok(true),
        "/history" | "/hist" => print_history(state),
        "/remember" => {
            let Some((key, value)) = args.split_once(' ') else {
                println!("Usage: /remember <key> <value>");
                return Ok(false);
            };
            state.agent.remember(key, value.trim());
            status.success(format!("Remembered {}", key));
        }
        "/recall" => {
            if args.is_empty() {
                println!("Usage: /recall <key>");
            } else {
                match state.agent.recall(args) {
                    Some(value) => println!("{}", value),
                    None => status.detail(format!("Nothing remembered for {}", args)),
                }
            }
        }
        "/actions" => {
            let actions = state.agent.available_actions();
            if actions.is_empty() {
                status.detail(format!("No actions: the {} agent only advises", state.agent.kind()));
            } else {
                println!("{}Available actions:{}", BOLD, RESET);
                for action in actions {
                    println!("  - {}", action);
                }
            }
        }
        "/agent" => {
            println!(
                "Agent: {}{}{}  Model: {}{}{}",
                GREEN,
                state.agent.kind(),
                RESET,
                BLUE,
                state.model,
                RESET
            );
        }
        _ => {
            status.warning(format!("Unknown command: {}", command));
            println!("Type {}/help{} for available commands", CYAN, RESET);
        }
    }
    Ok(false)
}

fn print_history(state: &ReplState) {
    let history = state.agent.conversation().history();
    if history.is_empty() {
        println!("No messages in conversation");
        return;
    }

    println!("{}Conversation History:{}", BOLD, RESET);
    for (i, msg) in history.iter().enumerate() {
        let role_color = match msg.role {
            Role::User => CYAN,
            Role::Assistant => GREEN,
            Role::System => YELLOW,
            Role::Tool => BLUE,
        };
        let mut preview = preview(&msg.content, 60);
        if let Some(calls) = &msg.tool_calls {
            for call in calls {
                preview.push_str(&format!(" → {} {}", call.name, call.arguments_text()));
            }
        }
        println!(
            "  {}[{}]{} {}{}:{} {}",
            DIM,
            i + 1,
            RESET,
            role_color,
            msg.role,
            RESET,
            preview.replace('\n', " ")
        );
    }
}

fn print_welcome(state: &ReplState) {
    println!();
    println!("{}termi{} - shell with an AI prefix", BOLD, RESET);
    println!(
        "{}Agent:{} {}  {}Model:{} {}{}{}",
        DIM,
        RESET,
        state.agent.kind(),
        DIM,
        RESET,
        BLUE,
        state.model,
        RESET
    );
    println!(
        "Start a line with {}{}{} to ask, anything else runs in the shell. {}/help{} for commands.",
        CYAN, state.ai_prefix, RESET, CYAN, RESET
    );
    println!();
}

fn print_help(ai_prefix: &str) {
    println!();
    println!("{}Input:{}", BOLD, RESET);
    println!("  {}{} <request>{}     Ask the agent", CYAN, ai_prefix, RESET);
    println!("  {}<command>{}           Run directly in the shell", CYAN, RESET);
    println!("  {}exit{}                Leave termi", CYAN, RESET);
    println!();
    println!("{}Commands:{}", BOLD, RESET);
    println!("  {}/help{}, /h, /?        Show this help", CYAN, RESET);
    println!("  {}/history{}            Show conversation history", CYAN, RESET);
    println!("  {}/remember{} <k> <v>   Store a note for the agent", CYAN, RESET);
    println!("  {}/recall{} <k>         Show a stored note", CYAN, RESET);
    println!("  {}/actions{}            List the agent's actions", CYAN, RESET);
    println!("  {}/agent{}              Show the active agent and model", CYAN, RESET);
    println!("  {}/exit{}, /quit, /q    Leave termi", CYAN, RESET);
    println!();
    println!("{}Tips:{}", DIM, RESET);
    println!("  - Ctrl+C cancels a running request or command");
    println!("  - Ctrl+D exits");
    println!();
}

fn history_path() -> Option<PathBuf> {
    let dir = dirs::data_dir()?.join("termi");
    std::fs::create_dir_all(&dir).ok()?;
    Some(dir.join("history"))
}

/// Last component of the working directory, or the full path at the root
fn short_cwd(state: &ReplState) -> String {
    let cwd = state.shell.cwd();
    cwd.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| cwd.display().to_string())
}

fn preview(text: &str, max_chars: usize) -> String {
    match text.char_indices().nth(max_chars) {
        Some((idx, _)) => format!("{}...", &text[..idx]),
        None => text.to_string(),
    }
}
