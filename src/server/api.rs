use crate::config::normalize_prefix;
use crate::constants::{DEFAULT_SESSION_ID, DEFAULT_USER_ID};
use crate::models::{ChatRequest, ChatResponse, ToolSource, ToolSpec};
use crate::server::{AppState, SharedAgent, SharedTools};
use crate::services::api_logging::{log_chat_metrics, ChatMetrics};
use crate::services::suggestion::generate_suggestions;
use crate::services::ui_parser::{extract_intent, parse_ui_effects};
use axum::{
    extract::{Json, State},
    http::StatusCode,
    response::{IntoResponse, Response},
};
use axum_extra::extract::Query;
use chrono::Utc;
use serde::{Deserialize, Serialize};
use tracing::{debug, error, info, instrument};

fn non_empty(value: Option<&String>) -> Option<String> {
    value.map(|v| v.trim()).filter(|v| !v.is_empty()).map(str::to_string)
}

/// POST {prefix}/chat - run the assistant on the latest message
#[instrument(skip(state, payload), fields(messages = payload.messages.len()))]
pub async fn chat_handler(
    State(state): State<AppState>,
    Json(payload): Json<ChatRequest>,
) -> Response {
    let endpoint = format!("{}/chat", normalize_prefix(&state.settings.api_v1_prefix));
    let mut metrics = ChatMetrics::new(Utc::now(), &endpoint);

    let Some(last) = payload.messages.last() else {
        metrics.fail("messages is required");
        metrics.complete();
        log_chat_metrics(&metrics);
        return (
            StatusCode::BAD_REQUEST,
            Json(serde_json::json!({"error": "messages is required"})),
        )
            .into_response();
    };
    let user_message = last.content.clone();

    let meta = payload.meta.clone().unwrap_or_default();
    let user_id = non_empty(meta.user_id.as_ref()).unwrap_or_else(|| DEFAULT_USER_ID.to_string());
    let session_id =
        non_empty(meta.session_id.as_ref()).unwrap_or_else(|| DEFAULT_SESSION_ID.to_string());
    metrics.user_id = user_id.clone();
    metrics.session_id = session_id.clone();

    debug!(%user_id, %session_id, "Running agent");
    let output = match state.agent.run(&user_id, &session_id, &user_message).await {
        Ok(output) => output,
        Err(e) => {
            error!("Agent runner error: {}", e);
            metrics.fail(e.to_string());
            metrics.complete();
            log_chat_metrics(&metrics);
            return (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(serde_json::json!({"error": format!("Agent runner error: {}", e)})),
            )
                .into_response();
        }
    };

    let ui_effects = parse_ui_effects(&output.reply, &user_message);
    let intent = extract_intent(&output.reply, &user_message);
    let suggestions = generate_suggestions(
        &output.reply,
        &user_message,
        intent,
        &payload.messages,
        &ui_effects,
    );

    metrics.intent = intent.map(|i| i.as_str().to_string());
    metrics.tool_calls = output.events.iter().filter(|e| e.tool.is_some()).count();
    metrics.ui_effects = ui_effects.len();
    metrics.suggestions = suggestions.len();
    metrics.reply_size_bytes = output.reply.len();
    metrics.complete();
    log_chat_metrics(&metrics);

    let response = ChatResponse {
        reply: output.reply.clone(),
        ui_effects,
        suggestions,
        intent,
        raw_agent_output: serde_json::to_value(&output).ok(),
    };

    (StatusCode::OK, Json(response)).into_response()
}

/// Query parameters for the tools listing (`source` may repeat)
#[derive(Debug, Deserialize)]
pub struct ToolsQuery {
    #[serde(default)]
    pub source: Vec<ToolSource>,
}

#[derive(Debug, Serialize)]
pub struct ToolsResponse<'a> {
    pub total: usize,
    pub mcp_tools: usize,
    pub tools: Vec<&'a ToolSpec>,
}

/// GET {prefix}/tools - list registered tools
#[instrument(skip(tools))]
pub async fn tools_handler(
    State(tools): State<SharedTools>,
    Query(query): Query<ToolsQuery>,
) -> Response {
    let listed = tools.by_source(&query.source);
    info!(count = listed.len(), "Listing tools");

    let body = ToolsResponse {
        total: listed.len(),
        mcp_tools: tools.mcp_tool_count(),
        tools: listed,
    };
    (StatusCode::OK, Json(body)).into_response()
}

/// GET /health - service status
#[instrument(skip(app_state, agent, tools))]
pub async fn health_handler(
    State(app_state): State<AppState>,
    State(agent): State<SharedAgent>,
    State(tools): State<SharedTools>,
) -> impl IntoResponse {
    debug!("Received health check");

    Json(serde_json::json!({
        "status": "ok",
        "project": app_state.settings.project_name,
        "mcp_tools": tools.mcp_tool_count(),
        "total_tools": tools.len(),
        "model": agent.model_name(),
        "provider": agent.provider(),
    }))
}
