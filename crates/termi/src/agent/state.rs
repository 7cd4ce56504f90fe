//! Agent loop configuration, turn staging and outcomes

use std::fmt;
use std::path::PathBuf;
use std::time::Duration;

use termi_llm::ChatMessage;

use crate::conversation::ConversationState;
use crate::stream::DEFAULT_CAPABILITY;

/// Configuration for the agent loop
#[derive(Debug, Clone)]
pub struct AgentConfig {
    /// Tool rounds allowed per user turn before it is stopped
    pub max_tool_rounds: usize,
    /// Maximum wait for one capability
    pub tool_timeout: Duration,
    /// Committed messages replayed per request; `None` replays everything
    pub history_window: Option<usize>,
    /// Directory capabilities run in
    pub working_dir: PathBuf,
    /// Capability output longer than this is truncated
    pub max_output_len: usize,
    /// Capability a bare `<tool_result>` payload is sent to
    pub default_capability: String,
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            max_tool_rounds: 8,
            tool_timeout: Duration::from_secs(60),
            history_window: None,
            working_dir: std::env::current_dir().unwrap_or_else(|_| PathBuf::from(".")),
            max_output_len: 20000,
            default_capability: DEFAULT_CAPABILITY.to_string(),
        }
    }
}

impl AgentConfig {
    pub fn with_max_tool_rounds(mut self, max: usize) -> Self {
        self.max_tool_rounds = max;
        self
    }

    pub fn with_tool_timeout(mut self, timeout: Duration) -> Self {
        self.tool_timeout = timeout;
        self
    }

    pub fn with_history_window(mut self, window: Option<usize>) -> Self {
        self.history_window = window;
        self
    }

    pub fn with_working_dir(mut self, dir: PathBuf) -> Self {
        self.working_dir = dir;
        self
    }

    pub fn with_max_output_len(mut self, len: usize) -> Self {
        self.max_output_len = len;
        self
    }
}

/// Where the loop is in a turn
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoopState {
    AwaitingUserInput,
    StreamingResponse,
    AwaitingToolResult,
    Done,
    Failed,
}

impl fmt::Display for LoopState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            LoopState::AwaitingUserInput => "awaiting_user_input",
            LoopState::StreamingResponse => "streaming_response",
            LoopState::AwaitingToolResult => "awaiting_tool_result",
            LoopState::Done => "done",
            LoopState::Failed => "failed",
        };
        f.write_str(name)
    }
}

/// Messages produced during a turn, held back until the turn settles
#[derive(Debug, Default)]
pub struct PendingTurn {
    messages: Vec<ChatMessage>,
}

impl PendingTurn {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, message: ChatMessage) {
        self.messages.push(message);
    }

    pub fn messages(&self) -> &[ChatMessage] {
        &self.messages
    }

    pub fn len(&self) -> usize {
        self.messages.len()
    }

    /// Append everything staged to the conversation, in order
    pub fn commit_into(self, conversation: &mut ConversationState) {
        for message in self.messages {
            conversation.append(message);
        }
    }
}

/// How a turn ended
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TurnOutcome {
    Completed,
    /// Transport failure; the turn was discarded
    Failed(String),
    /// Cancelled by the user; the turn was discarded
    Interrupted,
    /// Stopped after this many tool rounds; the turn was kept with a notice
    MaxToolRoundsExceeded(usize),
}

impl TurnOutcome {
    pub fn is_success(&self) -> bool {
        matches!(self, TurnOutcome::Completed)
    }
}

/// Summary of one user turn
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TurnReport {
    pub outcome: TurnOutcome,
    pub tool_rounds: usize,
    /// Final answer text, when the turn completed
    pub final_answer: Option<String>,
}
