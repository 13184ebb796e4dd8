//! Registers the reference tool set into a fresh [`ToolRegistry`]. The
//! one place an embedding program needs to touch to get the full
//! built-in lineup instead of wiring each tool in by hand.

use std::path::PathBuf;
use std::sync::Arc;

use ac_conversation::tool::ToolRegistry;

use crate::file_ops::FileEditTool;
use crate::finish::FinishTool;
use crate::shell::ShellTool;
use crate::task_tracker::TaskTrackerTool;
use crate::think::ThinkTool;

/// `shell`, `file_edit` (rooted at `workspace`), `finish`, `think`, and
/// `task_tracker` (persisted under `workspace` if `persist_tasks` is
/// set).
pub fn register_builtin_tools(registry: &mut ToolRegistry, workspace: impl Into<PathBuf>, persist_tasks: bool) {
    let workspace = workspace.into();
    registry.register(Arc::new(ShellTool::default()));
    registry.register(Arc::new(FileEditTool::new(workspace.clone())));
    registry.register(Arc::new(FinishTool));
    registry.register(Arc::new(ThinkTool));
    let save_dir = if persist_tasks { Some(workspace) } else { None };
    registry.register(Arc::new(TaskTrackerTool::new(save_dir)));
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn registers_all_five_builtins() {
        let mut registry = ToolRegistry::default();
        register_builtin_tools(&mut registry, "/tmp/ws", false);
        for name in ["shell", "file_edit", "finish", "think", "task_tracker"] {
            assert!(registry.contains(name), "missing builtin tool '{name}'");
        }
    }
}
