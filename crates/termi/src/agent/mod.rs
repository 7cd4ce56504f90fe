//! Agents: a capability interface over the orchestration loop
//!
//! Two variants share the same loop and differ in what they expose. The
//! `shell` agent can run commands; the `chat` agent only advises.

mod agent_loop;
mod state;

use agent_loop::AgentLoop;
pub use state::{AgentConfig, TurnOutcome, TurnReport};

use std::collections::BTreeMap;
use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use termi_llm::{ModelClient, ToolCall};
use tokio_util::sync::CancellationToken;

use crate::conversation::ConversationState;
use crate::prompt::{chat_system_prompt, shell_system_prompt, PromptContext};
use crate::render::Presenter;
use crate::shell::ShellEntry;
use crate::tools::builtin::create_shell_registry;
use crate::tools::{ToolRegistry, ToolResult};

/// Direct shell entries remembered for the prompt
pub const SHELL_LOG_LIMIT: usize = 10;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum AgentKind {
    /// Runs shell commands through the `shell_cmd` capability
    #[default]
    Shell,
    /// Answers and suggests, never executes
    Chat,
}

impl fmt::Display for AgentKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AgentKind::Shell => write!(f, "shell"),
            AgentKind::Chat => write!(f, "chat"),
        }
    }
}

/// User notes plus the tail of direct shell activity
#[derive(Debug, Default)]
pub struct AgentMemory {
    notes: BTreeMap<String, String>,
    shell_log: Vec<ShellEntry>,
}

impl AgentMemory {
    pub fn remember(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.notes.insert(key.into(), value.into());
    }

    pub fn recall(&self, key: &str) -> Option<&str> {
        self.notes.get(key).map(String::as_str)
    }

    pub fn notes(&self) -> &BTreeMap<String, String> {
        &self.notes
    }

    pub fn observe(&mut self, entry: ShellEntry) {
        self.shell_log.push(entry);
        if self.shell_log.len() > SHELL_LOG_LIMIT {
            let excess = self.shell_log.len() - SHELL_LOG_LIMIT;
            self.shell_log.drain(..excess);
        }
    }

    pub fn shell_log(&self) -> &[ShellEntry] {
        &self.shell_log
    }
}

#[async_trait]
pub trait Agent: Send {
    fn kind(&self) -> AgentKind;

    /// Run one user turn through the model
    async fn think(
        &mut self,
        input: &str,
        presenter: &mut dyn Presenter,
        cancel: &CancellationToken,
    ) -> TurnReport;

    fn remember(&mut self, key: &str, value: &str);

    fn recall(&self, key: &str) -> Option<&str>;

    /// Invoke a capability directly, bypassing the model
    async fn perform_action(&self, name: &str, arguments: Value) -> ToolResult;

    fn available_actions(&self) -> Vec<String>;

    fn conversation(&self) -> &ConversationState;

    /// Record a directly executed command for later prompts
    fn observe_shell(&mut self, entry: ShellEntry);

    fn set_working_dir(&mut self, dir: PathBuf);
}

/// State every variant carries
struct AgentCore {
    agent_loop: AgentLoop,
    conversation: ConversationState,
    memory: AgentMemory,
}

impl AgentCore {
    fn new(client: Arc<dyn ModelClient>, registry: ToolRegistry, config: AgentConfig) -> Self {
        Self {
            agent_loop: AgentLoop::new(client, registry, config),
            conversation: ConversationState::new(),
            memory: AgentMemory::default(),
        }
    }

    fn prompt_context(&self) -> PromptContext<'_> {
        PromptContext {
            working_dir: &self.agent_loop.config().working_dir,
            shell_log: self.memory.shell_log(),
            notes: self.memory.notes(),
        }
    }

    async fn turn(
        &mut self,
        system_prompt: String,
        input: &str,
        presenter: &mut dyn Presenter,
        cancel: &CancellationToken,
    ) -> TurnReport {
        self.agent_loop.set_system_prompt(system_prompt);
        self.agent_loop
            .run_turn(&mut self.conversation, input, presenter, cancel)
            .await
    }

    async fn perform(&self, name: &str, arguments: Value) -> ToolResult {
        let call = ToolCall::new(
            format!("call_{}", uuid::Uuid::new_v4().simple()),
            name,
            arguments,
        );
        self.agent_loop.execute_call(&call).await
    }
}

/// Agent that can execute shell commands
pub struct ShellAgent {
    core: AgentCore,
}

impl ShellAgent {
    pub fn new(client: Arc<dyn ModelClient>, config: AgentConfig) -> Self {
        Self::with_registry(client, create_shell_registry(), config)
    }

    pub fn with_registry(client: Arc<dyn ModelClient>, registry: ToolRegistry, config: AgentConfig) -> Self {
        Self {
            core: AgentCore::new(client, registry, config),
        }
    }
}

#[async_trait]
impl Agent for ShellAgent {
    fn kind(&self) -> AgentKind {
        AgentKind::Shell
    }

    async fn think(
        &mut self,
        input: &str,
        presenter: &mut dyn Presenter,
        cancel: &CancellationToken,
    ) -> TurnReport {
        let prompt = shell_system_prompt(self.core.agent_loop.registry(), &self.core.prompt_context());
        self.core.turn(prompt, input, presenter, cancel).await
    }

    fn remember(&mut self, key: &str, value: &str) {
        self.core.memory.remember(key, value);
    }

    fn recall(&self, key: &str) -> Option<&str> {
        self.core.memory.recall(key)
    }

    async fn perform_action(&self, name: &str, arguments: Value) -> ToolResult {
        self.core.perform(name, arguments).await
    }

    fn available_actions(&self) -> Vec<String> {
        self.core
            .agent_loop
            .registry()
            .list_names()
            .into_iter()
            .map(str::to_string)
            .collect()
    }

    fn conversation(&self) -> &ConversationState {
        &self.core.conversation
    }

    fn observe_shell(&mut self, entry: ShellEntry) {
        self.core.memory.observe(entry);
    }

    fn set_working_dir(&mut self, dir: PathBuf) {
        self.core.agent_loop.set_working_dir(dir);
    }
}

/// Advice-only agent: no capabilities are registered
pub struct ChatAgent {
    core: AgentCore,
}

impl ChatAgent {
    pub fn new(client: Arc<dyn ModelClient>, config: AgentConfig) -> Self {
        Self {
            core: AgentCore::new(client, ToolRegistry::new(), config),
        }
    }
}

#[async_trait]
impl Agent for ChatAgent {
    fn kind(&self) -> AgentKind {
        AgentKind::Chat
    }

    async fn think(
        &mut self,
        input: &str,
        presenter: &mut dyn Presenter,
        cancel: &CancellationToken,
    ) -> TurnReport {
        let prompt = chat_system_prompt(&self.core.prompt_context());
        self.core.turn(prompt, input, presenter, cancel).await
    }

    fn remember(&mut self, key: &str, value: &str) {
        self.core.memory.remember(key, value);
    }

    fn recall(&self, key: &str) -> Option<&str> {
        self.core.memory.recall(key)
    }

    async fn perform_action(&self, name: &str, arguments: Value) -> ToolResult {
        self.core.perform(name, arguments).await
    }

    fn available_actions(&self) -> Vec<String> {
        Vec::new()
    }

    fn conversation(&self) -> &ConversationState {
        &self.core.conversation
    }

    fn observe_shell(&mut self, entry: ShellEntry) {
        self.core.memory.observe(entry);
    }

    fn set_working_dir(&mut self, dir: PathBuf) {
        self.core.agent_loop.set_working_dir(dir);
    }
}

/// Construct the configured variant
pub fn build_agent(kind: AgentKind, client: Arc<dyn ModelClient>, config: AgentConfig) -> Box<dyn Agent> {
    match kind {
        AgentKind::Shell => Box::new(ShellAgent::new(client, config)),
        AgentKind::Chat => Box::new(ChatAgent::new(client, config)),
    }
}
