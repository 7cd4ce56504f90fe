//! Incremental tag lexer for model output
//!
//! Model text arrives in arbitrary fragments. The parser keeps a small pending
//! buffer so a delimiter cut across two fragments (`<thin` + `king>`) is never
//! leaked as answer text, and emits events as soon as they are decidable.
//!
//! Blocks do not nest: inside `<thinking>` only `</thinking>` is recognized,
//! inside `<tool_result>` only `</tool_result>`.

use serde_json::Value;
use termi_llm::ToolCall;
use tracing::{debug, warn};

pub const THINKING_OPEN: &str = "<thinking>";
pub const THINKING_CLOSE: &str = "</thinking>";
pub const TOOL_OPEN: &str = "<tool_result>";
pub const TOOL_CLOSE: &str = "</tool_result>";

/// Capability used when a tool block holds a bare command
pub const DEFAULT_CAPABILITY: &str = "shell_cmd";

const PLAIN_DELIMITERS: &[&str] = &[THINKING_OPEN, TOOL_OPEN];
const THINKING_DELIMITERS: &[&str] = &[THINKING_CLOSE];
const TOOL_DELIMITERS: &[&str] = &[TOOL_CLOSE];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParserState {
    Plain,
    InThinking,
    InToolResult,
}

impl ParserState {
    fn delimiters(self) -> &'static [&'static str] {
        match self {
            ParserState::Plain => PLAIN_DELIMITERS,
            ParserState::InThinking => THINKING_DELIMITERS,
            ParserState::InToolResult => TOOL_DELIMITERS,
        }
    }
}

/// Semantic event extracted from the model's text
#[derive(Debug, Clone, PartialEq)]
pub enum ParserEvent {
    ThinkingDelta(String),
    ThinkingDone,
    ToolInvocation(ToolCall),
    FinalAnswerDelta(String),
    FinalAnswerDone,
    StreamEnd { error: Option<String> },
}

/// Streaming parser for `<thinking>` / `<tool_result>` sections
#[derive(Debug)]
pub struct TagParser {
    state: ParserState,
    /// Unconsumed text; only ever holds a possible delimiter prefix between feeds
    pending: String,
    tool_payload: String,
    default_capability: String,
    finished: bool,
}

impl Default for TagParser {
    fn default() -> Self {
        Self::new()
    }
}

impl TagParser {
    pub fn new() -> Self {
        Self {
            state: ParserState::Plain,
            pending: String::new(),
            tool_payload: String::new(),
            default_capability: DEFAULT_CAPABILITY.to_string(),
            finished: false,
        }
    }

    pub fn with_default_capability(mut self, name: impl Into<String>) -> Self {
        self.default_capability = name.into();
        self
    }

    pub fn state(&self) -> ParserState {
        self.state
    }

    pub fn is_finished(&self) -> bool {
        self.finished
    }

    /// Consume one fragment, returning every event it makes decidable
    pub fn feed(&mut self, fragment: &str) -> Vec<ParserEvent> {
        let mut events = Vec::new();
        if self.finished {
            warn!("Fragment received after stream end, ignoring");
            return events;
        }

        self.pending.push_str(fragment);

        loop {
            let delimiters = self.state.delimiters();
            match find_earliest(&self.pending, delimiters) {
                Some((pos, delimiter)) => {
                    let text: String = self.pending.drain(..pos).collect();
                    self.emit_text(&text, &mut events);
                    self.pending.drain(..delimiter.len());
                    self.on_delimiter(delimiter, &mut events);
                }
                None => {
                    let hold = partial_delimiter_start(&self.pending, delimiters);
                    let text: String = self.pending.drain(..hold).collect();
                    self.emit_text(&text, &mut events);
                    break;
                }
            }
        }

        events
    }

    /// Close the stream. Withheld text is flushed as ordinary text and an open
    /// block is closed implicitly. A truncated tool payload is dropped when the
    /// stream ended with an error.
    pub fn finish(&mut self, error: Option<String>) -> Vec<ParserEvent> {
        let mut events = Vec::new();
        if self.finished {
            return events;
        }
        self.finished = true;

        let rest = std::mem::take(&mut self.pending);
        self.emit_text(&rest, &mut events);

        match self.state {
            ParserState::Plain => {}
            ParserState::InThinking => {
                debug!("Stream ended inside a thinking block, closing it");
                events.push(ParserEvent::ThinkingDone);
            }
            ParserState::InToolResult => {
                if error.is_none() {
                    debug!("Stream ended inside a tool block, closing it");
                    if let Some(call) = self.take_invocation() {
                        events.push(ParserEvent::ToolInvocation(call));
                    }
                } else {
                    warn!(
                        payload_len = self.tool_payload.len(),
                        "Discarding truncated tool block after transport error"
                    );
                    self.tool_payload.clear();
                }
            }
        }
        self.state = ParserState::Plain;

        if error.is_none() {
            events.push(ParserEvent::FinalAnswerDone);
        }
        events.push(ParserEvent::StreamEnd { error });
        events
    }

    fn emit_text(&mut self, text: &str, events: &mut Vec<ParserEvent>) {
        if text.is_empty() {
            return;
        }
        match self.state {
            ParserState::Plain => events.push(ParserEvent::FinalAnswerDelta(text.to_string())),
            ParserState::InThinking => events.push(ParserEvent::ThinkingDelta(text.to_string())),
            ParserState::InToolResult => self.tool_payload.push_str(text),
        }
    }

    fn on_delimiter(&mut self, delimiter: &str, events: &mut Vec<ParserEvent>) {
        match delimiter {
            THINKING_OPEN => self.state = ParserState::InThinking,
            TOOL_OPEN => {
                self.tool_payload.clear();
                self.state = ParserState::InToolResult;
            }
            THINKING_CLOSE => {
                events.push(ParserEvent::ThinkingDone);
                self.state = ParserState::Plain;
            }
            TOOL_CLOSE => {
                if let Some(call) = self.take_invocation() {
                    events.push(ParserEvent::ToolInvocation(call));
                }
                self.state = ParserState::Plain;
            }
            _ => unreachable!("delimiter lists only contain the four tags"),
        }
    }

    fn take_invocation(&mut self) -> Option<ToolCall> {
        let payload = std::mem::take(&mut self.tool_payload);
        let call = parse_invocation(&payload, &self.default_capability);
        if call.is_none() {
            warn!("Empty tool block, no invocation emitted");
        }
        call
    }
}

/// Earliest complete delimiter in `text`
fn find_earliest(text: &str, delimiters: &[&'static str]) -> Option<(usize, &'static str)> {
    delimiters
        .iter()
        .filter_map(|d| text.find(d).map(|pos| (pos, *d)))
        .min_by_key(|(pos, _)| *pos)
}

/// Byte index where a possible delimiter prefix starts at the end of `text`,
/// or `text.len()` when nothing has to be withheld
fn partial_delimiter_start(text: &str, delimiters: &[&str]) -> usize {
    let longest = delimiters.iter().map(|d| d.len()).max().unwrap_or(0);
    let window_start = text.len().saturating_sub(longest.saturating_sub(1));

    (window_start..text.len())
        .filter(|&i| text.is_char_boundary(i))
        .find(|&i| delimiters.iter().any(|d| d.starts_with(&text[i..])))
        .unwrap_or(text.len())
}

/// Turn a tool block payload into a call.
///
/// `{"name": ..., "arguments": ...}` selects a capability explicitly; anything
/// else is a raw command for `default_capability`.
pub fn parse_invocation(payload: &str, default_capability: &str) -> Option<ToolCall> {
    let payload = strip_code_fence(payload.trim()).trim();
    if payload.is_empty() {
        return None;
    }

    let id = format!("call_{}", uuid::Uuid::new_v4().simple());

    if let Some((name, arguments)) = try_parse_structured(payload) {
        return Some(ToolCall::new(id, name, arguments));
    }

    Some(ToolCall::new(
        id,
        default_capability,
        Value::String(payload.to_string()),
    ))
}

fn try_parse_structured(payload: &str) -> Option<(String, Value)> {
    #[derive(serde::Deserialize)]
    struct ToolCallJson {
        name: String,
        #[serde(default)]
        arguments: Value,
    }

    if !payload.starts_with('{') {
        return None;
    }
    let parsed: ToolCallJson = serde_json::from_str(payload).ok()?;
    if parsed.name.is_empty() {
        return None;
    }
    Some((parsed.name, parsed.arguments))
}

/// Unwrap a payload the model wrapped in a markdown fence (```bash ... ```)
fn strip_code_fence(payload: &str) -> &str {
    let Some(body) = payload.strip_prefix("```") else {
        return payload;
    };
    let Some(body) = body.strip_suffix("```") else {
        return payload;
    };
    // drop the info string (`bash`, `sh`, ...) on the opening line
    match body.find('\n') {
        Some(newline) => &body[newline + 1..],
        None => body,
    }
}
