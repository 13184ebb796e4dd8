//! `file_edit`: read, write, append, or list files rooted at a fixed
//! workspace directory. Paths are validated to stay inside that root,
//! trimmed to the operations this reference tool actually exposes.

use std::path::{Component, Path, PathBuf};

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::Value;
use tokio::fs;
use tokio::io::AsyncWriteExt;

use ac_conversation::tool::{ConversationHandle, Tool, ToolAnnotations};

#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "operation", rename_all = "snake_case")]
enum FileArgs {
    Read { path: String },
    Write { path: String, content: String },
    Append { path: String, content: String },
    List { #[serde(default = "default_dot")] path: String },
    Delete { path: String },
}

fn default_dot() -> String {
    ".".into()
}

/// Resolve `requested` against `root`, rejecting absolute paths, raw
/// `..` components, and anything that canonicalizes outside `root`.
pub fn validate_path(root: &Path, requested: &str) -> Result<PathBuf, String> {
    let requested_path = Path::new(requested);
    if requested_path.is_absolute() {
        return Err(format!("absolute paths are not allowed (got '{requested}')"));
    }
    for component in requested_path.components() {
        if matches!(component, Component::ParentDir) {
            return Err("path must not contain '..' components".into());
        }
    }

    let canonical_root = root
        .canonicalize()
        .map_err(|e| format!("cannot resolve workspace root '{}': {e}", root.display()))?;
    let candidate = canonical_root.join(requested_path);

    let resolved = if candidate.exists() {
        candidate.canonicalize().map_err(|e| format!("cannot resolve '{}': {e}", candidate.display()))?
    } else {
        let parent = candidate.parent().unwrap_or(&candidate);
        let canonical_parent = parent
            .canonicalize()
            .map_err(|e| format!("cannot resolve parent of '{}': {e}", candidate.display()))?;
        match candidate.file_name() {
            Some(name) => canonical_parent.join(name),
            None => canonical_parent,
        }
    };

    if !resolved.starts_with(&canonical_root) {
        return Err(format!("path '{requested}' resolves outside the workspace root"));
    }
    Ok(resolved)
}

pub struct FileEditTool {
    pub workspace_root: PathBuf,
}

impl FileEditTool {
    pub fn new(workspace_root: impl Into<PathBuf>) -> Self {
        Self { workspace_root: workspace_root.into() }
    }
}

#[async_trait]
impl Tool for FileEditTool {
    fn name(&self) -> &str {
        "file_edit"
    }

    fn description(&self) -> &str {
        "Read, write, append to, list, or delete a file within the conversation's workspace."
    }

    fn input_schema(&self) -> Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "operation": {"type": "string", "enum": ["read", "write", "append", "list", "delete"]},
                "path": {"type": "string"},
                "content": {"type": "string"},
            },
            "required": ["operation", "path"],
        })
    }

    fn annotations(&self) -> ToolAnnotations {
        ToolAnnotations { read_only_hint: false }
    }

    async fn execute(&self, action: Value, _conv: ConversationHandle<'_>) -> Result<Value, String> {
        let args: FileArgs = serde_json::from_value(action).map_err(|e| format!("invalid file_edit arguments: {e}"))?;

        match args {
            FileArgs::Read { path } => {
                let resolved = validate_path(&self.workspace_root, &path)?;
                let content = fs::read_to_string(&resolved).await.map_err(|e| format!("failed to read '{path}': {e}"))?;
                Ok(serde_json::json!({"path": path, "content": content}))
            }
            FileArgs::Write { path, content } => {
                let resolved = validate_path(&self.workspace_root, &path)?;
                if let Some(parent) = resolved.parent() {
                    fs::create_dir_all(parent).await.map_err(|e| format!("failed to create parent directory: {e}"))?;
                }
                fs::write(&resolved, &content).await.map_err(|e| format!("failed to write '{path}': {e}"))?;
                Ok(serde_json::json!({"path": path, "bytes_written": content.len()}))
            }
            FileArgs::Append { path, content } => {
                let resolved = validate_path(&self.workspace_root, &path)?;
                if let Some(parent) = resolved.parent() {
                    fs::create_dir_all(parent).await.map_err(|e| format!("failed to create parent directory: {e}"))?;
                }
                let mut file = fs::OpenOptions::new()
                    .create(true)
                    .append(true)
                    .open(&resolved)
                    .await
                    .map_err(|e| format!("failed to open '{path}' for append: {e}"))?;
                file.write_all(content.as_bytes()).await.map_err(|e| format!("failed to append to '{path}': {e}"))?;
                Ok(serde_json::json!({"path": path, "bytes_appended": content.len()}))
            }
            FileArgs::List { path } => {
                let resolved = validate_path(&self.workspace_root, &path)?;
                let mut read_dir = fs::read_dir(&resolved).await.map_err(|e| format!("failed to read directory '{path}': {e}"))?;
                let mut names = Vec::new();
                while let Some(entry) = read_dir.next_entry().await.map_err(|e| format!("failed to read directory entry: {e}"))? {
                    names.push(entry.file_name().to_string_lossy().to_string());
                }
                names.sort();
                Ok(serde_json::json!({"path": path, "entries": names}))
            }
            FileArgs::Delete { path } => {
                let resolved = validate_path(&self.workspace_root, &path)?;
                let metadata = fs::metadata(&resolved).await.map_err(|e| format!("failed to stat '{path}': {e}"))?;
                if metadata.is_dir() {
                    fs::remove_dir(&resolved).await.map_err(|e| format!("failed to remove directory '{path}': {e}"))?;
                } else {
                    fs::remove_file(&resolved).await.map_err(|e| format!("failed to remove file '{path}': {e}"))?;
                }
                Ok(serde_json::json!({"path": path, "deleted": true}))
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

    #[test]
    fn validate_path_rejects_parent_traversal() {
        let ws = TempDir::new().unwrap();
        assert!(validate_path(ws.path(), "../etc/passwd").is_err());
    }

    #[tokio::test]
    async fn write_then_read_roundtrips() {
        let ws = TempDir::new().unwrap();
        let secrets = SecretsRegistry::default();
        let tool = FileEditTool::new(ws.path());

        tool.execute(
            serde_json::json!({"operation": "write", "path": "notes.txt", "content": "hello"}),
            handle(&secrets),
        )
        .await
        .unwrap();

        let result = tool
            .execute(serde_json::json!({"operation": "read", "path": "notes.txt"}), handle(&secrets))
            .await
            .unwrap();
        assert_eq!(result["content"], serde_json::json!("hello"));
    }

    #[tokio::test]
    async fn list_rejects_escape_attempts() {
        let ws = TempDir::new().unwrap();
        let secrets = SecretsRegistry::default();
        let tool = FileEditTool::new(ws.path());
        let result = tool
            .execute(serde_json::json!({"operation": "list", "path": "../"}), handle(&secrets))
            .await;
        assert!(result.is_err());
    }
}
