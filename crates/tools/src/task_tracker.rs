//! `task_tracker`: lets the agent maintain a todo list across steps.
//! `view` returns the current list, `plan` replaces it wholesale —
//! adapted from the original's save-to-disk executor, with the saved
//! file optional and scoped to a workspace directory like `file_edit`.

use std::path::PathBuf;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::fs;
use tokio::sync::Mutex;

use ac_conversation::tool::{ConversationHandle, Tool, ToolAnnotations};

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
struct TaskItem {
    title: String,
    #[serde(default)]
    notes: String,
    #[serde(default = "default_status")]
    status: String,
}

fn default_status() -> String {
    "todo".into()
}

#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "command", rename_all = "snake_case")]
enum TaskTrackerArgs {
    View,
    Plan {
        #[serde(default)]
        task_list: Vec<TaskItem>,
    },
}

const TASKS_FILE: &str = "TASKS.json";

/// Tracks one todo list per tool instance. `save_dir`, when set, persists
/// the list to `save_dir/TASKS.json` across process restarts.
pub struct TaskTrackerTool {
    save_dir: Option<PathBuf>,
    tasks: Mutex<Vec<TaskItem>>,
}

impl TaskTrackerTool {
    pub fn new(save_dir: Option<PathBuf>) -> Self {
        Self { save_dir, tasks: Mutex::new(Vec::new()) }
    }

    async fn load(&self) -> Vec<TaskItem> {
        let Some(dir) = &self.save_dir else { return Vec::new() };
        let path = dir.join(TASKS_FILE);
        match fs::read_to_string(&path).await {
            Ok(raw) => serde_json::from_str(&raw).unwrap_or_default(),
            Err(_) => Vec::new(),
        }
    }

    async fn save(&self, tasks: &[TaskItem]) {
        let Some(dir) = &self.save_dir else { return };
        if let Err(e) = fs::create_dir_all(dir).await {
            tracing::warn!(error = %e, "failed to create task tracker save directory");
            return;
        }
        let path = dir.join(TASKS_FILE);
        match serde_json::to_string_pretty(tasks) {
            Ok(json) => {
                if let Err(e) = fs::write(&path, json).await {
                    tracing::warn!(error = %e, "failed to save task list");
                }
            }
            Err(e) => tracing::warn!(error = %e, "failed to serialize task list"),
        }
    }

    fn format(tasks: &[TaskItem]) -> String {
        if tasks.is_empty() {
            return "No tasks in the list.".into();
        }
        let mut out = String::from("# Task List\n\n");
        for (i, task) in tasks.iter().enumerate() {
            let icon = match task.status.as_str() {
                "in_progress" => "~",
                "done" => "x",
                _ => " ",
            };
            out.push_str(&format!("{}. [{icon}] {}\n", i + 1, task.title));
            if !task.notes.is_empty() {
                out.push_str(&format!("   {}\n", task.notes));
            }
        }
        out.trim_end().to_string()
    }
}

#[async_trait]
impl Tool for TaskTrackerTool {
    fn name(&self) -> &str {
        "task_tracker"
    }

    fn description(&self) -> &str {
        "Maintain a todo list for multi-step work. `view` shows the current list; \
         `plan` replaces it with the given items. View the list before changing it."
    }

    fn input_schema(&self) -> Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "command": {"type": "string", "enum": ["view", "plan"]},
                "task_list": {
                    "type": "array",
                    "items": {
                        "type": "object",
                        "properties": {
                            "title": {"type": "string"},
                            "notes": {"type": "string"},
                            "status": {"type": "string", "enum": ["todo", "in_progress", "done"]},
                        },
                        "required": ["title"],
                    },
                },
            },
            "required": ["command"],
        })
    }

    fn annotations(&self) -> ToolAnnotations {
        ToolAnnotations { read_only_hint: false }
    }

    async fn execute(&self, action: Value, _conv: ConversationHandle<'_>) -> Result<Value, String> {
        let args: TaskTrackerArgs =
            serde_json::from_value(action).map_err(|e| format!("invalid task_tracker arguments: {e}"))?;

        let mut tasks = self.tasks.lock().await;
        if tasks.is_empty() {
            *tasks = self.load().await;
        }

        match args {
            TaskTrackerArgs::View => Ok(serde_json::json!({
                "command": "view",
                "content": Self::format(&tasks),
                "task_list": *tasks,
            })),
            TaskTrackerArgs::Plan { task_list } => {
                *tasks = task_list;
                self.save(&tasks).await;
                Ok(serde_json::json!({
                    "command": "plan",
                    "content": format!("Task list has been updated with {} item(s).", tasks.len()),
                    "task_list": *tasks,
                }))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ac_conversation::secrets::SecretsRegistry;
    use tempfile::TempDir;

    fn handle<'a>(secrets: &'a SecretsRegistry) -> ConversationHandle<'a> {
        ConversationHandle { conversation_id: "c1", secrets }
    }

    #[tokio::test]
    async fn view_on_empty_list_says_so() {
        let secrets = SecretsRegistry::default();
        let tool = TaskTrackerTool::new(None);
        let result = tool.execute(serde_json::json!({"command": "view"}), handle(&secrets)).await.unwrap();
        assert!(result["content"].as_str().unwrap().contains("No tasks"));
    }

    #[tokio::test]
    async fn plan_then_view_roundtrips() {
        let secrets = SecretsRegistry::default();
        let tool = TaskTrackerTool::new(None);
        tool.execute(
            serde_json::json!({"command": "plan", "task_list": [{"title": "write tests"}]}),
            handle(&secrets),
        )
        .await
        .unwrap();

        let result = tool.execute(serde_json::json!({"command": "view"}), handle(&secrets)).await.unwrap();
        assert_eq!(result["task_list"][0]["title"], serde_json::json!("write tests"));
        assert_eq!(result["task_list"][0]["status"], serde_json::json!("todo"));
    }

    #[tokio::test]
    async fn plan_persists_across_instances_when_save_dir_set() {
        let dir = TempDir::new().unwrap();
        let secrets = SecretsRegistry::default();

        let tool = TaskTrackerTool::new(Some(dir.path().to_path_buf()));
        tool.execute(
            serde_json::json!({"command": "plan", "task_list": [{"title": "ship it", "status": "in_progress"}]}),
            handle(&secrets),
        )
        .await
        .unwrap();

        let reloaded = TaskTrackerTool::new(Some(dir.path().to_path_buf()));
        let result = reloaded.execute(serde_json::json!({"command": "view"}), handle(&secrets)).await.unwrap();
        assert_eq!(result["task_list"][0]["title"], serde_json::json!("ship it"));
    }
}
