//! Capability dispatch
//!
//! Never fails: unknown names, capability errors and timeouts all come back
//! as a failed [`ToolResult`] so the model can see what went wrong.

use std::time::Duration;

use termi_llm::ToolCall;
use tokio::time::timeout;
use tracing::{info, instrument, warn};

use super::registry::ToolRegistry;
use super::{truncate_output, ToolContext, ToolResult};

/// Default maximum wait for a capability
pub const DEFAULT_TOOL_TIMEOUT: Duration = Duration::from_secs(60);

pub struct ToolDispatcher {
    registry: ToolRegistry,
    timeout: Duration,
}

impl ToolDispatcher {
    pub fn new(registry: ToolRegistry) -> Self {
        Self {
            registry,
            timeout: DEFAULT_TOOL_TIMEOUT,
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn registry(&self) -> &ToolRegistry {
        &self.registry
    }

    /// Run one call to completion (or deadline)
    #[instrument(skip(self, ctx), fields(tool = %call.name, call_id = %call.id))]
    pub async fn execute(&self, call: &ToolCall, ctx: &ToolContext) -> ToolResult {
        let Some(tool) = self.registry.lookup(&call.name) else {
            warn!("Unknown capability");
            return ToolResult::failure(&call.id, format!("unknown capability: {}", call.name));
        };

        info!("Executing capability");
        match timeout(self.timeout, tool.run(&call.arguments, ctx)).await {
            Ok(Ok(out)) => {
                if out.success {
                    info!(output_len = out.output.len(), "Capability succeeded");
                } else {
                    warn!(output_len = out.output.len(), "Capability reported failure");
                }
                ToolResult {
                    call_id: call.id.clone(),
                    success: out.success,
                    output: truncate_output(out.output, ctx.max_output_len),
                }
            }
            Ok(Err(e)) => {
                warn!(error = %e, "Capability error");
                ToolResult::failure(&call.id, format!("{} failed: {:#}", call.name, e))
            }
            Err(_) => {
                warn!(timeout_secs = self.timeout.as_secs_f64(), "Capability timed out");
                ToolResult::failure(
                    &call.id,
                    format!(
                        "{} timed out after {:.1}s and was stopped",
                        call.name,
                        self.timeout.as_secs_f64()
                    ),
                )
            }
        }
    }
}

impl std::fmt::Debug for ToolDispatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ToolDispatcher")
            .field("registry", &self.registry)
            .field("timeout", &self.timeout)
            .finish()
    }
}
