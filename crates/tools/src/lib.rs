//! Reference tool implementations exercising the `ac_conversation::tool::Tool`
//! contract: a foreground shell, a workspace-scoped file editor, a task
//! tracker, and the `finish`/`think` pair every agent step engine needs
//! to terminate or think out loud. These are demonstration tools, not a
//! sandboxed execution host.

pub mod builtin;
pub mod file_ops;
pub mod finish;
pub mod shell;
pub mod task_tracker;
pub mod think;

pub use builtin::register_builtin_tools;
pub use file_ops::FileEditTool;
pub use finish::FinishTool;
pub use shell::ShellTool;
pub use task_tracker::TaskTrackerTool;
pub use think::ThinkTool;
