//! HTTP surface over the `Conversation` façade: create, send a message,
//! run to the next pause point, and inspect/resolve status. Thin by
//! design — every interesting decision already lives in `ac-conversation`.

use std::sync::Arc;

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::{Deserialize, Serialize};

use ac_conversation::confirmation::ConfirmRisky;
use ac_conversation::condenser::RecentEventsCondenser;
use ac_conversation::event::SecurityRisk;
use ac_conversation::event_log::{EventLog, LocalFileStore};
use ac_conversation::security::LlmSecurityAnalyzer;
use ac_conversation::{Agent, Conversation};
use ac_mcp_client::bridge::McpBridgeTool;
use ac_tools::register_builtin_tools;

use crate::llm_http::HttpLlmClient;
use crate::state::AppState;

pub fn router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/conversations", post(create_conversation))
        .route("/conversations/:id", get(get_conversation))
        .route("/conversations/:id/messages", post(send_message))
        .route("/conversations/:id/run", post(run_conversation))
        .route("/conversations/:id/pause", post(pause_conversation))
        .route("/conversations/:id/reject_pending", post(reject_pending))
        .with_state(state)
}

struct ApiError(StatusCode, String);

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (self.0, Json(serde_json::json!({"error": self.1}))).into_response()
    }
}

fn not_found(id: &str) -> ApiError {
    ApiError(StatusCode::NOT_FOUND, format!("no conversation '{id}'"))
}

fn internal(err: impl std::fmt::Display) -> ApiError {
    ApiError(StatusCode::INTERNAL_SERVER_ERROR, err.to_string())
}

#[derive(Deserialize)]
struct CreateConversationRequest {
    #[serde(default)]
    id: Option<String>,
    #[serde(default = "default_system_prompt")]
    system_prompt: String,
    #[serde(default)]
    workspace: Option<String>,
}

fn default_system_prompt() -> String {
    "You are a careful coding agent. Use tools to accomplish the user's request, then call finish.".into()
}

#[derive(Serialize)]
struct ConversationResponse {
    id: String,
    status: String,
}

async fn create_conversation(
    State(state): State<Arc<AppState>>,
    Json(req): Json<CreateConversationRequest>,
) -> Result<Json<ConversationResponse>, ApiError> {
    let id = req.id.unwrap_or_else(|| uuid::Uuid::new_v4().to_string());
    let workspace = req.workspace.unwrap_or_else(|| format!("./workspace/{id}"));

    let mut tools = ac_conversation::tool::ToolRegistry::default();
    register_builtin_tools(&mut tools, workspace, true);
    for tool in McpBridgeTool::discover(state.mcp.clone()) {
        tools.register(tool);
    }

    let api_key = std::env::var(&state.config.llm.api_key_env).ok();
    let llm = Arc::new(HttpLlmClient::new(state.config.llm.base_url.clone(), state.config.llm.model.clone(), api_key));

    let agent = Agent::new(llm, tools, req.system_prompt).with_security_analyzer(Arc::new(LlmSecurityAnalyzer));

    let conversation_dir = format!("./data/{id}");
    let events = EventLog::open(Box::new(LocalFileStore), format!("{conversation_dir}/events")).map_err(internal)?;

    let condenser = RecentEventsCondenser {
        keep_first: state.config.conversation.condenser_keep_first,
        keep_last: state.config.conversation.condenser_keep_last,
        trigger_len: state.config.conversation.condenser_trigger_len,
    };
    let confirmation_policy = ConfirmRisky { threshold: SecurityRisk::High };

    let conversation = Conversation::open_persistent(
        id.clone(),
        agent,
        events,
        Box::new(condenser),
        Box::new(confirmation_policy),
        Box::new(LocalFileStore),
        conversation_dir,
    )
    .map_err(internal)?;

    let conversation = state.insert(conversation);
    Ok(Json(ConversationResponse { id: conversation.id.clone(), status: conversation.status().to_string() }))
}

async fn get_conversation(State(state): State<Arc<AppState>>, Path(id): Path<String>) -> Result<Json<ConversationResponse>, ApiError> {
    let conversation = state.get(&id).ok_or_else(|| not_found(&id))?;
    Ok(Json(ConversationResponse { id: conversation.id.clone(), status: conversation.status().to_string() }))
}

#[derive(Deserialize)]
struct SendMessageRequest {
    text: String,
}

async fn send_message(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    Json(req): Json<SendMessageRequest>,
) -> Result<Json<ConversationResponse>, ApiError> {
    let conversation = state.get(&id).ok_or_else(|| not_found(&id))?;
    conversation.send_message(req.text).map_err(internal)?;
    Ok(Json(ConversationResponse { id: conversation.id.clone(), status: conversation.status().to_string() }))
}

async fn run_conversation(State(state): State<Arc<AppState>>, Path(id): Path<String>) -> Result<Json<ConversationResponse>, ApiError> {
    let conversation = state.get(&id).ok_or_else(|| not_found(&id))?;
    conversation.run().await.map_err(internal)?;
    Ok(Json(ConversationResponse { id: conversation.id.clone(), status: conversation.status().to_string() }))
}

async fn pause_conversation(State(state): State<Arc<AppState>>, Path(id): Path<String>) -> Result<Json<ConversationResponse>, ApiError> {
    let conversation = state.get(&id).ok_or_else(|| not_found(&id))?;
    conversation.pause().map_err(internal)?;
    Ok(Json(ConversationResponse { id: conversation.id.clone(), status: conversation.status().to_string() }))
}

#[derive(Deserialize)]
struct RejectPendingRequest {
    #[serde(default = "default_reject_reason")]
    reason: String,
}

fn default_reject_reason() -> String {
    "rejected by operator".into()
}

async fn reject_pending(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    Json(req): Json<RejectPendingRequest>,
) -> Result<Json<ConversationResponse>, ApiError> {
    let conversation = state.get(&id).ok_or_else(|| not_found(&id))?;
    conversation.reject_pending_actions(req.reason).map_err(internal)?;
    Ok(Json(ConversationResponse { id: conversation.id.clone(), status: conversation.status().to_string() }))
}
