//! In-process conversation registry the HTTP API dispatches against.
//! No session persistence across process restarts beyond what each
//! conversation's own event log already provides on disk.

use std::sync::Arc;

use parking_lot::Mutex;
use std::collections::HashMap;

use ac_conversation::Conversation;
use ac_mcp_client::McpManager;

use crate::config::Config;

pub struct AppState {
    pub config: Arc<Config>,
    pub mcp: Arc<McpManager>,
    pub conversations: Mutex<HashMap<String, Arc<Conversation>>>,
}

impl AppState {
    /// Spawns every configured MCP server up front so its tools are
    /// already discovered by the time the first conversation asks for
    /// them; a server that fails to start is skipped, not fatal.
    pub async fn new(config: Config) -> Self {
        let mcp = McpManager::from_config(&config.mcp).await;
        Self { config: Arc::new(config), mcp: Arc::new(mcp), conversations: Mutex::new(HashMap::new()) }
    }

    pub fn insert(&self, conversation: Conversation) -> Arc<Conversation> {
        let conversation = Arc::new(conversation);
        self.conversations.lock().insert(conversation.id.clone(), conversation.clone());
        conversation
    }

    pub fn get(&self, id: &str) -> Option<Arc<Conversation>> {
        self.conversations.lock().get(id).cloned()
    }
}
