//! Capability framework
//!
//! A capability is an executable action the model can invoke by name from a
//! `<tool_result>` block. The dispatcher looks it up in a [`ToolRegistry`],
//! runs it under a deadline and turns whatever happens into a [`ToolResult`].

pub mod builtin;
pub mod dispatcher;
pub mod registry;

use anyhow::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::path::PathBuf;

pub use dispatcher::ToolDispatcher;
pub use registry::ToolRegistry;

/// What a capability reports back
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CapabilityOutput {
    pub success: bool,
    pub output: String,
}

impl CapabilityOutput {
    pub fn success(output: impl Into<String>) -> Self {
        Self {
            success: true,
            output: output.into(),
        }
    }

    pub fn failure(output: impl Into<String>) -> Self {
        Self {
            success: false,
            output: output.into(),
        }
    }
}

/// Outcome of one dispatched call, as recorded in the conversation
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ToolResult {
    pub call_id: String,
    pub success: bool,
    pub output: String,
}

impl ToolResult {
    pub fn success(call_id: impl Into<String>, output: impl Into<String>) -> Self {
        Self {
            call_id: call_id.into(),
            success: true,
            output: output.into(),
        }
    }

    pub fn failure(call_id: impl Into<String>, output: impl Into<String>) -> Self {
        Self {
            call_id: call_id.into(),
            success: false,
            output: output.into(),
        }
    }

    /// Content of the `tool` message replayed to the model
    pub fn to_message_content(&self) -> String {
        if self.success {
            self.output.clone()
        } else {
            format!("[failed] {}", self.output)
        }
    }
}

/// Context provided to capabilities during execution
#[derive(Debug, Clone)]
pub struct ToolContext {
    /// Directory commands run in
    pub working_dir: PathBuf,
    /// Maximum output length (truncate if exceeded)
    pub max_output_len: usize,
}

impl Default for ToolContext {
    fn default() -> Self {
        Self {
            working_dir: std::env::current_dir().unwrap_or_else(|_| PathBuf::from(".")),
            max_output_len: 20000,
        }
    }
}

impl ToolContext {
    pub fn new(working_dir: PathBuf) -> Self {
        Self {
            working_dir,
            ..Default::default()
        }
    }

    pub fn with_max_output_len(mut self, len: usize) -> Self {
        self.max_output_len = len;
        self
    }
}

/// The trait every capability implements
#[async_trait]
pub trait Tool: Send + Sync {
    /// Name the model uses to invoke it
    fn name(&self) -> &str;

    /// One-paragraph description for the system prompt
    fn description(&self) -> &str;

    /// How to write the payload of a `<tool_result>` block for this capability
    fn usage(&self) -> &str;

    /// Run with the call's arguments. `Err` means the capability could not run
    /// at all; a command that ran and failed is `Ok` with `success: false`.
    async fn run(&self, args: &Value, ctx: &ToolContext) -> Result<CapabilityOutput>;
}

/// Cut `output` to at most `max_len` bytes on a char boundary, with a marker
pub fn truncate_output(output: String, max_len: usize) -> String {
    if output.len() <= max_len {
        return output;
    }
    let mut cut = max_len;
    while cut > 0 && !output.is_char_boundary(cut) {
        cut -= 1;
    }
    format!(
        "{}\n\n[Output truncated at {} of {} bytes]",
        &output[..cut],
        cut,
        output.len()
    )
}
