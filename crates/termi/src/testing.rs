//! Test doubles: scripted model client, recording presenter, mock capabilities

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use futures::{stream, StreamExt};
use serde_json::Value;
use termi_llm::{ChatMessage, FragmentStream, LlmError, LlmErrorKind, ModelClient, ToolCall};

use crate::render::{PresentationEvent, Presenter};
use crate::tools::{CapabilityOutput, Tool, ToolContext, ToolResult};

/// Flags when every guard it handed out has been dropped
#[derive(Clone, Default)]
pub struct DropProbe(Arc<AtomicBool>);

pub struct ProbeGuard(Arc<AtomicBool>);

impl DropProbe {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn guard(&self) -> ProbeGuard {
        ProbeGuard(self.0.clone())
    }

    pub fn dropped(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

impl ProbeGuard {
    /// Lets a closure take ownership of the guard
    pub fn hold(&self) {}
}

impl Drop for ProbeGuard {
    fn drop(&mut self) {
        self.0.store(true, Ordering::SeqCst);
    }
}

/// One canned response
pub enum Script {
    Fragments(Vec<String>),
    /// `send` itself fails
    SendError(LlmError),
    /// Fragments, then a transport error
    FailAfter(Vec<String>, LlmError),
    /// Fragments, then the stream never ends
    Stall(Vec<String>),
    /// Like `Stall`, holding the guard until the stream is dropped
    Guarded(Vec<String>, ProbeGuard),
}

impl Script {
    pub fn text(parts: &[&str]) -> Self {
        Script::Fragments(parts.iter().map(|p| p.to_string()).collect())
    }
}

fn ok_fragments(parts: Vec<String>) -> impl futures::Stream<Item = Result<String, LlmError>> + Send {
    stream::iter(parts.into_iter().map(Ok::<String, LlmError>))
}

/// Replays scripts in order and records every request history
pub struct ScriptedClient {
    scripts: Mutex<VecDeque<Script>>,
    requests: Mutex<Vec<Vec<ChatMessage>>>,
    probe: Option<DropProbe>,
    probe_log: Mutex<Vec<bool>>,
}

impl ScriptedClient {
    pub fn new(scripts: Vec<Script>) -> Self {
        Self {
            scripts: Mutex::new(scripts.into()),
            requests: Mutex::new(Vec::new()),
            probe: None,
            probe_log: Mutex::new(Vec::new()),
        }
    }

    /// Record `probe.dropped()` at every `send`
    pub fn with_probe(mut self, probe: DropProbe) -> Self {
        self.probe = Some(probe);
        self
    }

    pub fn requests(&self) -> Vec<Vec<ChatMessage>> {
        self.requests.lock().unwrap().clone()
    }

    pub fn probe_log(&self) -> Vec<bool> {
        self.probe_log.lock().unwrap().clone()
    }
}

#[async_trait]
impl ModelClient for ScriptedClient {
    async fn send(&self, history: &[ChatMessage]) -> Result<FragmentStream, LlmError> {
        self.requests.lock().unwrap().push(history.to_vec());
        if let Some(probe) = &self.probe {
            self.probe_log.lock().unwrap().push(probe.dropped());
        }

        let Some(script) = self.scripts.lock().unwrap().pop_front() else {
            return Err(LlmError::new(
                LlmErrorKind::InvalidRequest,
                "no scripted response left",
            ));
        };

        let stream: FragmentStream = match script {
            Script::SendError(e) => return Err(e),
            Script::Fragments(parts) => Box::pin(ok_fragments(parts)),
            Script::FailAfter(parts, e) => {
                Box::pin(ok_fragments(parts).chain(stream::once(async move { Err(e) })))
            }
            Script::Stall(parts) => Box::pin(ok_fragments(parts).chain(stream::pending())),
            Script::Guarded(parts, guard) => Box::pin(
                ok_fragments(parts)
                    .chain(stream::pending())
                    .map(move |item| {
                        guard.hold();
                        item
                    }),
            ),
        };
        Ok(stream)
    }

    fn model_name(&self) -> &str {
        "scripted"
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Recorded {
    Thinking(String),
    ThinkingDone,
    Answer(String),
    AnswerDone,
    ToolCall(ToolCall),
    ToolResult(ToolResult),
    Notice(String),
    Failure(String),
}

/// Presenter that keeps every event
#[derive(Debug, Default)]
pub struct RecordingPresenter {
    pub events: Vec<Recorded>,
}

impl RecordingPresenter {
    pub fn thinking_text(&self) -> String {
        self.events
            .iter()
            .filter_map(|e| match e {
                Recorded::Thinking(t) => Some(t.as_str()),
                _ => None,
            })
            .collect()
    }

    pub fn answer_text(&self) -> String {
        self.events
            .iter()
            .filter_map(|e| match e {
                Recorded::Answer(t) => Some(t.as_str()),
                _ => None,
            })
            .collect()
    }

    pub fn tool_results(&self) -> Vec<ToolResult> {
        self.events
            .iter()
            .filter_map(|e| match e {
                Recorded::ToolResult(r) => Some(r.clone()),
                _ => None,
            })
            .collect()
    }

    pub fn notices(&self) -> Vec<String> {
        self.events
            .iter()
            .filter_map(|e| match e {
                Recorded::Notice(n) => Some(n.clone()),
                _ => None,
            })
            .collect()
    }

    pub fn failures(&self) -> Vec<String> {
        self.events
            .iter()
            .filter_map(|e| match e {
                Recorded::Failure(f) => Some(f.clone()),
                _ => None,
            })
            .collect()
    }

    pub fn saw_answer_done(&self) -> bool {
        self.events.contains(&Recorded::AnswerDone)
    }
}

impl Presenter for RecordingPresenter {
    fn present(&mut self, event: PresentationEvent<'_>) {
        let recorded = match event {
            PresentationEvent::ThinkingDelta(t) => Recorded::Thinking(t.to_string()),
            PresentationEvent::ThinkingDone => Recorded::ThinkingDone,
            PresentationEvent::AnswerDelta(t) => Recorded::Answer(t.to_string()),
            PresentationEvent::AnswerDone => Recorded::AnswerDone,
            PresentationEvent::ToolCall(c) => Recorded::ToolCall(c.clone()),
            PresentationEvent::ToolResult(r) => Recorded::ToolResult(r.clone()),
            PresentationEvent::Notice(n) => Recorded::Notice(n.to_string()),
            PresentationEvent::Failure(f) => Recorded::Failure(f.to_string()),
        };
        self.events.push(recorded);
    }
}

/// Capability that always returns the same output
pub struct StaticTool {
    name: String,
    output: CapabilityOutput,
    calls: Arc<AtomicUsize>,
}

impl StaticTool {
    pub fn ok(name: &str, output: impl Into<String>) -> Self {
        Self {
            name: name.to_string(),
            output: CapabilityOutput::success(output),
            calls: Arc::new(AtomicUsize::new(0)),
        }
    }

    pub fn failing(name: &str, output: impl Into<String>) -> Self {
        Self {
            output: CapabilityOutput::failure(output),
            ..Self::ok(name, "")
        }
    }

    pub fn call_counter(&self) -> Arc<AtomicUsize> {
        self.calls.clone()
    }
}

#[async_trait]
impl Tool for StaticTool {
    fn name(&self) -> &str {
        &self.name
    }

    fn description(&self) -> &str {
        "Returns canned output"
    }

    fn usage(&self) -> &str {
        "<tool_result>anything</tool_result>"
    }

    async fn run(&self, _args: &Value, _ctx: &ToolContext) -> Result<CapabilityOutput> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(self.output.clone())
    }
}

/// Capability that cannot run at all
pub struct FailingTool {
    name: String,
}

impl FailingTool {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
        }
    }
}

#[async_trait]
impl Tool for FailingTool {
    fn name(&self) -> &str {
        &self.name
    }

    fn description(&self) -> &str {
        "Always errors"
    }

    fn usage(&self) -> &str {
        ""
    }

    async fn run(&self, _args: &Value, _ctx: &ToolContext) -> Result<CapabilityOutput> {
        Err(anyhow!("spawn failed: no such file or directory"))
    }
}

/// Capability that sleeps before succeeding
pub struct SlowTool {
    name: String,
    delay: Duration,
}

impl SlowTool {
    pub fn new(name: &str, delay: Duration) -> Self {
        Self {
            name: name.to_string(),
            delay,
        }
    }
}

#[async_trait]
impl Tool for SlowTool {
    fn name(&self) -> &str {
        &self.name
    }

    fn description(&self) -> &str {
        "Sleeps"
    }

    fn usage(&self) -> &str {
        ""
    }

    async fn run(&self, _args: &Value, _ctx: &ToolContext) -> Result<CapabilityOutput> {
        tokio::time::sleep(self.delay).await;
        Ok(CapabilityOutput::success("finally"))
    }
}
