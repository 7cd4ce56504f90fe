//! Orchestration loop
//!
//! Drives one user turn: request with full history, stream the reply through
//! the tag parser, run any capability the model asks for, then ask again with
//! the result folded in. Messages are staged in a [`PendingTurn`] and only
//! reach the conversation once the turn settles.

use std::sync::Arc;

use termi_llm::{ChatMessage, ModelClient, ToolCall};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, warn};

use crate::conversation::ConversationState;
use crate::render::{PresentationEvent, Presenter};
use crate::stream::{Fragment, ParserEvent, TagParser, TokenStreamReader};
use crate::tools::{ToolContext, ToolDispatcher, ToolRegistry, ToolResult};

use super::state::{AgentConfig, LoopState, PendingTurn, TurnOutcome, TurnReport};

/// How one streamed response ended
enum StreamStep {
    Finished,
    Invocation(ToolCall),
    Failed(String),
    Interrupted,
}

pub struct AgentLoop {
    client: Arc<dyn ModelClient>,
    dispatcher: ToolDispatcher,
    config: AgentConfig,
    system_prompt: Option<String>,
    state: LoopState,
}

impl AgentLoop {
    pub fn new(client: Arc<dyn ModelClient>, registry: ToolRegistry, config: AgentConfig) -> Self {
        let dispatcher = ToolDispatcher::new(registry).with_timeout(config.tool_timeout);
        Self {
            client,
            dispatcher,
            config,
            system_prompt: None,
            state: LoopState::AwaitingUserInput,
        }
    }

    pub fn with_system_prompt(mut self, prompt: impl Into<String>) -> Self {
        self.system_prompt = Some(prompt.into());
        self
    }

    /// Replace the system prompt sent ahead of the history
    pub fn set_system_prompt(&mut self, prompt: impl Into<String>) {
        self.system_prompt = Some(prompt.into());
    }

    pub fn state(&self) -> LoopState {
        self.state
    }

    pub fn config(&self) -> &AgentConfig {
        &self.config
    }

    pub fn registry(&self) -> &ToolRegistry {
        self.dispatcher.registry()
    }

    /// Update where capabilities run, e.g. after a direct `cd`
    pub fn set_working_dir(&mut self, dir: std::path::PathBuf) {
        self.config.working_dir = dir;
    }

    /// Dispatch a single call outside of a turn
    pub async fn execute_call(&self, call: &ToolCall) -> ToolResult {
        let ctx = ToolContext::new(self.config.working_dir.clone())
            .with_max_output_len(self.config.max_output_len);
        self.dispatcher.execute(call, &ctx).await
    }

    /// Run one user turn to completion, failure, interruption or the tool
    /// round limit. Only `Completed` and `MaxToolRoundsExceeded` change
    /// `conversation`. The loop is back in `AwaitingUserInput` afterwards; the
    /// terminal state is carried by the report.
    #[instrument(skip_all, fields(model = %self.client.model_name(), input_len = input.len()))]
    pub async fn run_turn(
        &mut self,
        conversation: &mut ConversationState,
        input: &str,
        presenter: &mut dyn Presenter,
        cancel: &CancellationToken,
    ) -> TurnReport {
        let report = self.drive_turn(conversation, input, presenter, cancel).await;
        self.transition(LoopState::AwaitingUserInput);
        report
    }

    async fn drive_turn(
        &mut self,
        conversation: &mut ConversationState,
        input: &str,
        presenter: &mut dyn Presenter,
        cancel: &CancellationToken,
    ) -> TurnReport {
        info!(history = conversation.len(), "Starting turn");

        let mut pending = PendingTurn::new();
        pending.push(ChatMessage::user(input));

        let ctx = ToolContext::new(self.config.working_dir.clone())
            .with_max_output_len(self.config.max_output_len);
        let mut rounds = 0;

        loop {
            self.transition(LoopState::StreamingResponse);
            let request = self.build_request(conversation, &pending);
            debug!(messages = request.len(), round = rounds, "Sending request");

            let sent = tokio::select! {
                biased;
                _ = cancel.cancelled() => None,
                result = self.client.send(&request) => Some(result),
            };
            let stream = match sent {
                None => return self.interrupted(presenter, rounds),
                Some(Err(e)) => {
                    warn!(error = %e, kind = ?e.kind, "Model request failed");
                    return self.failed(presenter, e.to_string(), rounds);
                }
                Some(Ok(stream)) => stream,
            };

            let mut reader = TokenStreamReader::new(stream);
            let mut parser =
                TagParser::new().with_default_capability(self.config.default_capability.clone());
            let mut answer = String::new();

            let step = stream_response(&mut reader, &mut parser, &mut answer, presenter, cancel).await;
            // Abandon whatever is left of the response before doing anything else
            reader.release();

            match step {
                StreamStep::Interrupted => return self.interrupted(presenter, rounds),
                StreamStep::Failed(message) => {
                    warn!(error = %message, fragments = reader.fragment_count(), "Stream failed");
                    return self.failed(presenter, message, rounds);
                }
                StreamStep::Finished => {
                    let answer = answer.trim().to_string();
                    pending.push(ChatMessage::assistant(answer.clone()));
                    pending.commit_into(conversation);
                    self.transition(LoopState::Done);
                    info!(tool_rounds = rounds, answer_len = answer.len(), "Turn completed");
                    return TurnReport {
                        outcome: TurnOutcome::Completed,
                        tool_rounds: rounds,
                        final_answer: Some(answer),
                    };
                }
                StreamStep::Invocation(call) => {
                    if rounds >= self.config.max_tool_rounds {
                        return self.stop_at_round_limit(conversation, pending, &answer, presenter, rounds);
                    }
                    rounds += 1;

                    pending.push(ChatMessage::assistant_with_calls(
                        answer.trim(),
                        vec![call.clone()],
                    ));
                    presenter.present(PresentationEvent::ToolCall(&call));

                    self.transition(LoopState::AwaitingToolResult);
                    let executed = tokio::select! {
                        biased;
                        _ = cancel.cancelled() => None,
                        result = self.dispatcher.execute(&call, &ctx) => Some(result),
                    };
                    let Some(result) = executed else {
                        return self.interrupted(presenter, rounds);
                    };

                    presenter.present(PresentationEvent::ToolResult(&result));
                    pending.push(ChatMessage::tool_result(
                        result.call_id.clone(),
                        result.to_message_content(),
                    ));
                }
            }
        }
    }

    fn build_request(&self, conversation: &ConversationState, pending: &PendingTurn) -> Vec<ChatMessage> {
        let committed = match self.config.history_window {
            Some(k) => conversation.last_n(k),
            None => conversation.history(),
        };

        let mut request = Vec::with_capacity(committed.len() + pending.len() + 1);
        if let Some(prompt) = self.system_prompt.as_deref().filter(|p| !p.is_empty()) {
            request.push(ChatMessage::system(prompt));
        }
        request.extend(committed.iter().cloned());
        request.extend(pending.messages().iter().cloned());
        request
    }

    fn stop_at_round_limit(
        &mut self,
        conversation: &mut ConversationState,
        mut pending: PendingTurn,
        answer: &str,
        presenter: &mut dyn Presenter,
        rounds: usize,
    ) -> TurnReport {
        warn!(max_tool_rounds = self.config.max_tool_rounds, "Tool round limit reached");
        let notice = format!(
            "Stopped after {} tool round(s) without a final answer.",
            rounds
        );
        let content = match answer.trim() {
            "" => notice.clone(),
            text => format!("{}\n\n{}", text, notice),
        };
        pending.push(ChatMessage::assistant(content));
        pending.commit_into(conversation);

        presenter.present(PresentationEvent::Notice(&notice));
        self.transition(LoopState::Done);
        TurnReport {
            outcome: TurnOutcome::MaxToolRoundsExceeded(rounds),
            tool_rounds: rounds,
            final_answer: None,
        }
    }

    fn failed(&mut self, presenter: &mut dyn Presenter, message: String, rounds: usize) -> TurnReport {
        presenter.present(PresentationEvent::Failure(&message));
        self.transition(LoopState::Failed);
        TurnReport {
            outcome: TurnOutcome::Failed(message),
            tool_rounds: rounds,
            final_answer: None,
        }
    }

    fn interrupted(&mut self, presenter: &mut dyn Presenter, rounds: usize) -> TurnReport {
        info!(tool_rounds = rounds, "Turn interrupted");
        presenter.present(PresentationEvent::Notice("Interrupted."));
        TurnReport {
            outcome: TurnOutcome::Interrupted,
            tool_rounds: rounds,
            final_answer: None,
        }
    }

    fn transition(&mut self, next: LoopState) {
        if self.state != next {
            debug!(from = %self.state, to = %next, "Loop state");
            self.state = next;
        }
    }
}

/// Pump fragments through the parser until the response settles
async fn stream_response(
    reader: &mut TokenStreamReader,
    parser: &mut TagParser,
    answer: &mut String,
    presenter: &mut dyn Presenter,
    cancel: &CancellationToken,
) -> StreamStep {
    loop {
        let fragment = tokio::select! {
            biased;
            _ = cancel.cancelled() => return StreamStep::Interrupted,
            fragment = reader.next() => fragment,
        };

        let events = match fragment {
            Some(Fragment::Text(text)) => parser.feed(&text),
            Some(Fragment::End { error }) => parser.finish(error),
            None => parser.finish(None),
        };

        for event in events {
            match event {
                ParserEvent::ThinkingDelta(text) => {
                    presenter.present(PresentationEvent::ThinkingDelta(&text))
                }
                ParserEvent::ThinkingDone => presenter.present(PresentationEvent::ThinkingDone),
                ParserEvent::FinalAnswerDelta(text) => {
                    presenter.present(PresentationEvent::AnswerDelta(&text));
                    answer.push_str(&text);
                }
                ParserEvent::FinalAnswerDone => presenter.present(PresentationEvent::AnswerDone),
                ParserEvent::ToolInvocation(call) => {
                    debug!(tool = %call.name, call_id = %call.id, "Tool invocation");
                    return StreamStep::Invocation(call);
                }
                ParserEvent::StreamEnd { error: Some(e) } => return StreamStep::Failed(e),
                ParserEvent::StreamEnd { error: None } => return StreamStep::Finished,
            }
        }

        if parser.is_finished() {
            return StreamStep::Finished;
        }
    }
}
