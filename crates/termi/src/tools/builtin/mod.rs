//! Built-in capabilities

mod shell;

pub use shell::{combine_output, shell_invocation, ShellTool};

use super::registry::ToolRegistry;

/// Registry with the shell capability the shell agent exposes
pub fn create_shell_registry() -> ToolRegistry {
    let mut registry = ToolRegistry::new();
    registry.register(ShellTool);
    registry
}
