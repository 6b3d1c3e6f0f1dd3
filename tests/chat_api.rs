use async_trait::async_trait;
use axum::body::Body;
use axum::http::{Request, StatusCode};
use serde_json::Value;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tower::ServiceExt;
use vnstock_agent::config::{BackendSettings, LlmSettings, McpSettings, Settings};
use vnstock_agent::constants::{DEFAULT_SESSION_ID, DEFAULT_USER_ID};
use vnstock_agent::error::{AppError, Result};
use vnstock_agent::server::{app_router, AppState};
use vnstock_agent::services::agent::{AgentEvent, AgentOutput, AgentRunner};
use vnstock_agent::services::{BackendClient, McpClient, McpToolManager, ToolRegistry};

/// Replies with a fixed text and records what it was asked
struct StubAgent {
    reply: std::result::Result<String, String>,
    calls: Mutex<Vec<(String, String, String)>>,
}

impl StubAgent {
    fn replying(reply: &str) -> Arc<Self> {
        Arc::new(Self { reply: Ok(reply.to_string()), calls: Mutex::new(Vec::new()) })
    }

    fn failing(message: &str) -> Arc<Self> {
        Arc::new(Self { reply: Err(message.to_string()), calls: Mutex::new(Vec::new()) })
    }
}

#[async_trait]
impl AgentRunner for StubAgent {
    async fn run(&self, user_id: &str, session_id: &str, message: &str) -> Result<AgentOutput> {
        self.calls
            .lock()
            .unwrap()
            .push((user_id.to_string(), session_id.to_string(), message.to_string()));
        match &self.reply {
            Ok(reply) => Ok(AgentOutput {
                reply: reply.clone(),
                events: vec![AgentEvent {
                    author: "stub".to_string(),
                    text: Some(reply.clone()),
                    tool_calls: Vec::new(),
                    tool: None,
                }],
            }),
            Err(message) => Err(AppError::Llm(message.clone())),
        }
    }

    fn model_name(&self) -> String {
        "stub-model".to_string()
    }

    fn provider(&self) -> String {
        "stub".to_string()
    }
}

fn settings(prefix: &str) -> Settings {
    Settings {
        project_name: "Test Chatbot".to_string(),
        api_v1_prefix: prefix.to_string(),
        port: 0,
        cors_origins: vec!["*".to_string()],
        mcp: McpSettings {
            server_url: "http://127.0.0.1:1".to_string(),
            timeout: Duration::from_millis(200),
        },
        backend: BackendSettings { base_url: None, token: None, verify_ssl: true },
        llm: LlmSettings {
            use_groq: false,
            groq_api_key: None,
            openrouter_api_key: None,
            openrouter_model: "stub".to_string(),
        },
    }
}

fn app(agent: Arc<StubAgent>) -> axum::Router {
    app_with_prefix(agent, "/api/v1")
}

fn app_with_prefix(agent: Arc<StubAgent>, prefix: &str) -> axum::Router {
    let settings = settings(prefix);
    let mcp = Arc::new(McpClient::new(&settings.mcp).unwrap());
    let backend = Arc::new(BackendClient::new(&settings.backend).unwrap());
    let tools = ToolRegistry::from_parts(Arc::new(McpToolManager::new(mcp)), backend, Vec::new());

    app_router(AppState {
        settings: Arc::new(settings),
        agent,
        tools: Arc::new(tools),
    })
}

async fn send(app: axum::Router, request: Request<Body>) -> (StatusCode, Value) {
    let response = app.oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
    let body = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
    (status, body)
}

fn post_chat(body: &str) -> Request<Body> {
    post_chat_to("/api/v1/chat", body)
}

fn post_chat_to(uri: &str, body: &str) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri(uri)
        .header("content-type", "application/json")
        .body(Body::from(body.to_string()))
        .unwrap()
}

#[tokio::test]
async fn test_chat_returns_reply_effects_and_suggestions() {
    let agent = StubAgent::replying("Giá MWG hiện tại là 50.000 VNĐ. Bạn muốn mua bao nhiêu cổ phiếu?");
    let (status, body) = send(
        app(agent.clone()),
        post_chat(
            r#"{"messages":[{"role":"user","content":"Mình muốn mua cổ phiếu MWG"}],
                "meta":{"user_id":"u-42","session_id":"s-1"}}"#,
        ),
    )
    .await;

    assert_eq!(status, StatusCode::OK);
    assert!(body["reply"].as_str().unwrap().contains("MWG"));
    assert_eq!(body["intent"], "buy_stock");

    let effects = body["ui_effects"].as_array().unwrap();
    assert!(effects
        .iter()
        .any(|e| e["type"] == "OPEN_BUY_STOCK" && e["payload"]["symbol"] == "MWG"));

    let suggestions = body["suggestions"].as_array().unwrap();
    assert!(!suggestions.is_empty() && suggestions.len() <= 3);
    assert_eq!(body["raw_agent_output"]["events"][0]["author"], "stub");

    let calls = agent.calls.lock().unwrap();
    assert_eq!(
        calls[0],
        ("u-42".to_string(), "s-1".to_string(), "Mình muốn mua cổ phiếu MWG".to_string())
    );
}

#[tokio::test]
async fn test_chat_uses_last_message_and_default_ids() {
    let agent = StubAgent::replying("Chào bạn, tôi có thể giúp gì?");
    let (status, _) = send(
        app(agent.clone()),
        post_chat(
            r#"{"messages":[
                {"role":"user","content":"xin chào"},
                {"role":"assistant","content":"Chào bạn"},
                {"role":"user","content":"Tổng quan thị trường hôm nay"}]}"#,
        ),
    )
    .await;

    assert_eq!(status, StatusCode::OK);
    let calls = agent.calls.lock().unwrap();
    assert_eq!(calls.len(), 1);
    assert_eq!(calls[0].0, DEFAULT_USER_ID);
    assert_eq!(calls[0].1, DEFAULT_SESSION_ID);
    assert_eq!(calls[0].2, "Tổng quan thị trường hôm nay");
}

#[tokio::test]
async fn test_chat_rejects_empty_messages() {
    let agent = StubAgent::replying("unused");
    let (status, body) = send(app(agent.clone()), post_chat(r#"{"messages":[]}"#)).await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "messages is required");
    assert!(agent.calls.lock().unwrap().is_empty());
}

#[tokio::test]
async fn test_chat_agent_failure_is_500() {
    let agent = StubAgent::failing("all models rate limited");
    let (status, body) = send(
        app(agent),
        post_chat(r#"{"messages":[{"role":"user","content":"Giá VCB?"}]}"#),
    )
    .await;

    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    let error = body["error"].as_str().unwrap();
    assert!(error.starts_with("Agent runner error:"));
    assert!(error.contains("all models rate limited"));
}

#[tokio::test]
async fn test_health_reports_model_and_tools() {
    let request = Request::builder().uri("/health").body(Body::empty()).unwrap();
    let (status, body) = send(app(StubAgent::replying("ok")), request).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "ok");
    assert_eq!(body["project"], "Test Chatbot");
    assert_eq!(body["model"], "stub-model");
    assert_eq!(body["provider"], "stub");
    assert_eq!(body["mcp_tools"], 0);
    assert!(body["total_tools"].as_u64().unwrap() > 0);
}

#[tokio::test]
async fn test_tools_filter_by_source() {
    let request = Request::builder()
        .uri("/api/v1/tools?source=backend&source=custom")
        .body(Body::empty())
        .unwrap();
    let (status, body) = send(app(StubAgent::replying("ok")), request).await;

    assert_eq!(status, StatusCode::OK);
    let tools = body["tools"].as_array().unwrap();
    assert_eq!(body["total"], tools.len());
    assert!(tools
        .iter()
        .all(|t| t["source"] == "backend" || t["source"] == "custom"));
    assert!(tools.iter().any(|t| t["name"] == "get_current_datetime"));
    assert!(tools.iter().any(|t| t["name"] == "create_transaction"));
}

#[tokio::test]
async fn test_tools_lists_fallbacks_when_mcp_is_down() {
    let request = Request::builder().uri("/api/v1/tools").body(Body::empty()).unwrap();
    let (status, body) = send(app(StubAgent::replying("ok")), request).await;

    assert_eq!(status, StatusCode::OK);
    let tools = body["tools"].as_array().unwrap();
    assert!(tools.iter().any(|t| t["source"] == "fallback"));
    assert!(!tools.iter().any(|t| t["source"] == "mcp"));
}

#[tokio::test]
async fn test_tools_rejects_unknown_source() {
    let request = Request::builder()
        .uri("/api/v1/tools?source=weather")
        .body(Body::empty())
        .unwrap();
    let response = app(StubAgent::replying("ok")).oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_prefix_without_leading_slash_is_normalized() {
    let body = r#"{"messages":[{"role":"user","content":"xin chào"}]}"#;

    let (status, _) = send(
        app_with_prefix(StubAgent::replying("Chào bạn"), "api/v1/"),
        post_chat_to("/api/v1/chat", body),
    )
    .await;
    assert_eq!(status, StatusCode::OK);

    let request = Request::builder().uri("/api/v1/tools").body(Body::empty()).unwrap();
    let (status, _) = send(app_with_prefix(StubAgent::replying("ok"), "api/v1"), request).await;
    assert_eq!(status, StatusCode::OK);
}

#[tokio::test]
async fn test_empty_prefix_mounts_at_root() {
    let (status, body) = send(
        app_with_prefix(StubAgent::replying("Chào bạn"), ""),
        post_chat_to("/chat", r#"{"messages":[{"role":"user","content":"xin chào"}]}"#),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["reply"], "Chào bạn");
}
