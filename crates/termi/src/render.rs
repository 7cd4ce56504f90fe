//! Presentation boundary
//!
//! The agent loop never prints. It hands [`PresentationEvent`]s to a
//! [`Presenter`]; the terminal implementation colors them and runs a spinner
//! while a capability executes.

use std::io::{stdout, Write};

use termi_llm::ToolCall;

use crate::progress::Spinner;
use crate::tools::ToolResult;

// ANSI colors
const GREEN: &str = "\x1b[92m";
const YELLOW: &str = "\x1b[93m";
const RED: &str = "\x1b[91m";
const CYAN: &str = "\x1b[96m";
const DIM: &str = "\x1b[2m";
const RESET: &str = "\x1b[0m";

/// Characters of capability output echoed to the terminal
const RESULT_PREVIEW_LEN: usize = 400;

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum PresentationEvent<'a> {
    ThinkingDelta(&'a str),
    ThinkingDone,
    AnswerDelta(&'a str),
    AnswerDone,
    ToolCall(&'a ToolCall),
    ToolResult(&'a ToolResult),
    Notice(&'a str),
    Failure(&'a str),
}

pub trait Presenter: Send {
    fn present(&mut self, event: PresentationEvent<'_>);
}

/// Renders events to stdout with ANSI styling
pub struct TerminalPresenter {
    show_thinking: bool,
    in_thinking: bool,
    /// Cursor is mid-line after streamed text
    mid_line: bool,
    spinner: Option<Spinner>,
}

impl TerminalPresenter {
    pub fn new(show_thinking: bool) -> Self {
        Self {
            show_thinking,
            in_thinking: false,
            mid_line: false,
            spinner: None,
        }
    }

    fn write(&mut self, text: &str) {
        print!("{}", text);
        let _ = stdout().flush();
        if !text.is_empty() {
            self.mid_line = !text.ends_with('\n');
        }
    }

    fn end_line(&mut self) {
        if self.mid_line {
            println!();
            self.mid_line = false;
        }
    }

    fn stop_spinner(&mut self) {
        if let Some(mut spinner) = self.spinner.take() {
            spinner.stop();
        }
    }
}

impl Presenter for TerminalPresenter {
    fn present(&mut self, event: PresentationEvent<'_>) {
        match event {
            PresentationEvent::ThinkingDelta(text) => {
                if !self.show_thinking {
                    return;
                }
                if !self.in_thinking {
                    self.end_line();
                    self.write(&format!("{}thinking: ", DIM));
                    self.in_thinking = true;
                }
                self.write(text);
            }
            PresentationEvent::ThinkingDone => {
                if self.in_thinking {
                    self.write(RESET);
                    self.end_line();
                    self.in_thinking = false;
                }
            }
            PresentationEvent::AnswerDelta(text) => self.write(text),
            PresentationEvent::AnswerDone => self.end_line(),
            PresentationEvent::ToolCall(call) => {
                self.end_line();
                println!("{}→ {}{} {}", YELLOW, call.name, RESET, call.arguments_text());
                let mut spinner = Spinner::new(format!("Running {}...", call.name));
                spinner.start();
                self.spinner = Some(spinner);
            }
            PresentationEvent::ToolResult(result) => {
                self.stop_spinner();
                let (color, mark) = if result.success {
                    (GREEN, "ok")
                } else {
                    (RED, "failed")
                };
                println!("{}[{}]{}", color, mark, RESET);
                let preview = preview(&result.output, RESULT_PREVIEW_LEN);
                if !preview.is_empty() {
                    println!("{}{}{}", DIM, preview, RESET);
                }
            }
            PresentationEvent::Notice(text) => {
                self.stop_spinner();
                self.end_line();
                println!("{}{}{}", CYAN, text, RESET);
            }
            PresentationEvent::Failure(text) => {
                self.stop_spinner();
                self.end_line();
                println!("{}Error: {}{}", RED, text, RESET);
            }
        }
    }
}

impl Drop for TerminalPresenter {
    fn drop(&mut self) {
        self.stop_spinner();
    }
}

/// First `max_chars` characters of `text`, trimmed, with an ellipsis if cut
fn preview(text: &str, max_chars: usize) -> String {
    let trimmed = text.trim_end();
    match trimmed.char_indices().nth(max_chars) {
        Some((idx, _)) => format!("{}…", &trimmed[..idx]),
        None => trimmed.to_string(),
    }
}
