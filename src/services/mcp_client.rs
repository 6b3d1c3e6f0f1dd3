//! JSON-RPC 2.0 client for the market data MCP server (streamable HTTP transport).
//!
//! Responses may arrive as plain JSON or as a server-sent event stream whose
//! first `data: ` line carries the JSON-RPC message.

use crate::config::McpSettings;
use crate::constants::{
    MCP_CLIENT_NAME, MCP_ENDPOINTS, MCP_INIT_MAX_RETRIES, MCP_PROTOCOL_VERSION, MCP_SESSION_HEADER,
};
use crate::error::{AppError, Result};
use reqwest::header::{ACCEPT, CONTENT_TYPE};
use serde_json::{json, Value};
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use tokio::sync::Mutex as TokioMutex;
use tokio::time::sleep;
use tracing::{debug, info, warn};

/// Outcome of a single initialize attempt across all endpoints
enum InitFailure {
    /// Server answered but refused; retrying will not help
    Rejected(String),
    /// Timeout or connection problem; worth another attempt
    Transport(String),
}

pub struct McpClient {
    server_url: String,
    client: reqwest::Client,
    session_id: TokioMutex<Option<String>>,
    next_id: AtomicU64,
    retry_base: Duration,
}

impl McpClient {
    pub fn new(settings: &McpSettings) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(settings.timeout)
            .build()
            .map_err(|e| AppError::Network(format!("Failed to create HTTP client: {}", e)))?;

        Ok(Self {
            server_url: settings.server_url.trim_end_matches('/').to_string(),
            client,
            session_id: TokioMutex::new(None),
            next_id: AtomicU64::new(1),
            retry_base: Duration::from_secs(1),
        })
    }

    /// Override the backoff unit (`retry_base * 2^attempt` plus up to 10% jitter)
    pub fn with_retry_base(mut self, retry_base: Duration) -> Self {
        self.retry_base = retry_base;
        self
    }

    pub fn server_url(&self) -> &str {
        &self.server_url
    }

    pub async fn session_id(&self) -> Option<String> {
        self.session_id.lock().await.clone()
    }

    /// Open an MCP session, reusing the cached one when present
    pub async fn initialize_session(&self, max_retries: u32) -> Result<String> {
        let mut guard = self.session_id.lock().await;
        if let Some(session_id) = guard.as_ref() {
            return Ok(session_id.clone());
        }

        let attempts = max_retries.max(1);
        let mut last_error = String::from("no attempt made");

        for attempt in 0..attempts {
            if attempt > 0 {
                let base = self.retry_base * 2u32.pow(attempt - 1);
                let delay = base + self.retry_base.mul_f64(rand::random::<f64>() * 0.1);
                info!(
                    "MCP initialize retry: attempt {}/{} - reason: {}, waiting {:.1}s before retry",
                    attempt + 1,
                    attempts,
                    last_error,
                    delay.as_secs_f64()
                );
                sleep(delay).await;
            }

            match self.try_initialize().await {
                Ok(session_id) => {
                    info!("MCP session initialized: {}", session_id);
                    *guard = Some(session_id.clone());
                    return Ok(session_id);
                }
                Err(InitFailure::Rejected(message)) => {
                    warn!("Error initializing MCP session: {}", message);
                    return Err(AppError::Network(message));
                }
                Err(InitFailure::Transport(message)) => {
                    last_error = message;
                }
            }
        }

        warn!(
            "Error initializing MCP session after {} attempts: {}. Server at {} may be cold starting or unavailable",
            attempts, last_error, self.server_url
        );
        Err(AppError::Network(format!(
            "MCP initialize failed after {} attempts: {}",
            attempts, last_error
        )))
    }

    async fn try_initialize(&self) -> std::result::Result<String, InitFailure> {
        let payload = json!({
            "jsonrpc": "2.0",
            "method": "initialize",
            "params": {
                "protocolVersion": MCP_PROTOCOL_VERSION,
                "capabilities": {},
                "clientInfo": {
                    "name": MCP_CLIENT_NAME,
                    "version": env!("CARGO_PKG_VERSION"),
                },
            },
            "id": self.next_request_id(),
        });

        for (idx, endpoint) in MCP_ENDPOINTS.iter().enumerate() {
            let is_last = idx == MCP_ENDPOINTS.len() - 1;
            let url = format!("{}{}", self.server_url, endpoint);

            let response = self
                .post(&url, &payload, None)
                .await
                .map_err(|e| InitFailure::Transport(e.to_string()))?;
            let status = response.status();

            if status.as_u16() != 200 {
                warn!("MCP initialize failed on {}: HTTP {}", endpoint, status.as_u16());
                if !is_last {
                    continue;
                }
                return Err(InitFailure::Rejected(format!("Initialize failed: HTTP {}", status.as_u16())));
            }

            let session_id = response
                .headers()
                .get(MCP_SESSION_HEADER)
                .and_then(|v| v.to_str().ok())
                .map(str::to_string);

            let Some(session_id) = session_id else {
                warn!("No session ID in initialize response from {}", endpoint);
                if !is_last {
                    continue;
                }
                return Err(InitFailure::Rejected("No session ID in initialize response".to_string()));
            };

            let body = parse_response(response)
                .await
                .map_err(|e| InitFailure::Transport(e.to_string()))?;
            if let Some(error) = body.as_ref().and_then(|b| b.get("error")) {
                let message = error
                    .get("message")
                    .and_then(|m| m.as_str())
                    .unwrap_or("Unknown error");
                return Err(InitFailure::Rejected(message.to_string()));
            }

            let notification = json!({
                "jsonrpc": "2.0",
                "method": "notifications/initialized",
                "params": {},
            });
            if let Err(e) = self.post(&url, &notification, Some(&session_id)).await {
                warn!("Failed to send initialized notification: {}", e);
            }

            return Ok(session_id);
        }

        Err(InitFailure::Rejected("No MCP endpoint accepted initialize".to_string()))
    }

    /// Send a JSON-RPC request; failures come back as error objects
    pub async fn call(&self, method: &str, params: Option<Value>) -> Value {
        let session_id = match self.initialize_session(MCP_INIT_MAX_RETRIES).await {
            Ok(session_id) => session_id,
            Err(_) => {
                return json!({
                    "error": "Failed to initialize MCP session",
                    "method": method,
                });
            }
        };

        let mut payload = json!({
            "jsonrpc": "2.0",
            "method": method,
            "id": self.next_request_id(),
        });
        if let Some(params) = params {
            payload["params"] = params;
        }

        for (idx, endpoint) in MCP_ENDPOINTS.iter().enumerate() {
            let is_last = idx == MCP_ENDPOINTS.len() - 1;
            let url = format!("{}{}", self.server_url, endpoint);
            debug!(method, %url, "MCP request");

            let response = match self.post(&url, &payload, Some(&session_id)).await {
                Ok(response) => response,
                Err(e) => return transport_error(method, &e.to_string(), &self.server_url),
            };
            let status = response.status();

            if status.as_u16() == 404 && !is_last {
                continue;
            }
            if !status.is_success() {
                let text = response.text().await.unwrap_or_default();
                return json!({
                    "error": format!("HTTP {}: {}", status.as_u16(), text),
                    "method": method,
                    "endpoint": endpoint,
                });
            }

            let body = match parse_response(response).await {
                Ok(Some(body)) => body,
                Ok(None) => {
                    return json!({"error": "Failed to parse response", "method": method});
                }
                Err(e) => return transport_error(method, &e.to_string(), &self.server_url),
            };

            return unwrap_result(method, body);
        }

        json!({
            "error": "Failed to connect to MCP server",
            "method": method,
            "note": format!("Tried endpoints: {:?}", MCP_ENDPOINTS),
        })
    }

    async fn post(
        &self,
        url: &str,
        payload: &Value,
        session_id: Option<&str>,
    ) -> std::result::Result<reqwest::Response, reqwest::Error> {
        let mut request = self
            .client
            .post(url)
            .header(CONTENT_TYPE, "application/json")
            .header(ACCEPT, "application/json, text/event-stream")
            .json(payload);
        if let Some(session_id) = session_id {
            request = request.header(MCP_SESSION_HEADER, session_id);
        }
        request.send().await
    }

    fn next_request_id(&self) -> u64 {
        self.next_id.fetch_add(1, Ordering::Relaxed)
    }
}

fn transport_error(method: &str, message: &str, server_url: &str) -> Value {
    json!({
        "error": message,
        "method": method,
        "note": format!("Failed to call MCP server at {}", server_url),
    })
}

/// Map a JSON-RPC response body to its `result` or an error object
fn unwrap_result(method: &str, mut body: Value) -> Value {
    if let Some(error) = body.get("error") {
        let (message, code) = match error {
            Value::Object(obj) => (
                obj.get("message")
                    .and_then(|m| m.as_str())
                    .map(str::to_string)
                    .unwrap_or_else(|| error.to_string()),
                obj.get("code").cloned().unwrap_or(Value::Null),
            ),
            Value::String(s) => (s.clone(), Value::Null),
            other => (other.to_string(), Value::Null),
        };
        return json!({"error": message, "code": code, "method": method});
    }

    match body.get_mut("result") {
        Some(result) => result.take(),
        None => body,
    }
}

async fn parse_response(response: reqwest::Response) -> std::result::Result<Option<Value>, reqwest::Error> {
    let is_sse = response
        .headers()
        .get(CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .map(|ct| ct.to_lowercase().contains("text/event-stream"))
        .unwrap_or(false);
    let text = response.text().await?;

    if is_sse {
        Ok(parse_sse(&text))
    } else {
        Ok(serde_json::from_str(&text).ok())
    }
}

/// First `data: ` line of an SSE body, parsed as JSON
pub fn parse_sse(text: &str) -> Option<Value> {
    let line = text.trim().lines().find(|line| line.starts_with("data: "))?;
    match serde_json::from_str(&line["data: ".len()..]) {
        Ok(value) => Some(value),
        Err(e) => {
            warn!("Error parsing SSE response: {}", e);
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::StatusCode;
    use axum::response::{IntoResponse, Response};
    use axum::routing::post;
    use axum::{Json, Router};
    use std::sync::atomic::AtomicUsize;
    use std::sync::Arc;

    fn sse(body: Value) -> String {
        format!("event: message\ndata: {}\n\n", body)
    }

    async fn mcp_stub(Json(req): Json<Value>) -> Response {
        let id = req.get("id").cloned().unwrap_or(Value::Null);
        match req["method"].as_str().unwrap_or_default() {
            "initialize" => (
                StatusCode::OK,
                [("mcp-session-id", "session-1"), ("content-type", "text/event-stream")],
                sse(json!({"jsonrpc": "2.0", "id": id, "result": {"protocolVersion": "2024-11-05"}})),
            )
                .into_response(),
            "notifications/initialized" => StatusCode::ACCEPTED.into_response(),
            "tools/list" => Json(json!({
                "jsonrpc": "2.0",
                "id": id,
                "result": {"tools": [{"name": "get_price_board", "inputSchema": {}}]}
            }))
            .into_response(),
            _ => Json(json!({
                "jsonrpc": "2.0",
                "id": id,
                "error": {"code": -32601, "message": "Method not found"}
            }))
            .into_response(),
        }
    }

    async fn spawn(router: Router) -> String {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, router).await.unwrap();
        });
        format!("http://{}", addr)
    }

    fn client_for(url: &str) -> McpClient {
        McpClient::new(&McpSettings {
            server_url: url.to_string(),
            timeout: Duration::from_secs(5),
        })
        .unwrap()
        .with_retry_base(Duration::from_millis(10))
    }

    #[test]
    fn test_parse_sse_first_data_line() {
        let text = "event: message\r\ndata: {\"id\":1}\r\ndata: {\"id\":2}\r\n\r\n";
        assert_eq!(parse_sse(text), Some(json!({"id": 1})));
        assert_eq!(parse_sse("event: ping\n\n"), None);
        assert_eq!(parse_sse("data: not-json"), None);
    }

    #[test]
    fn test_unwrap_result_shapes() {
        assert_eq!(unwrap_result("m", json!({"result": {"a": 1}})), json!({"a": 1}));
        assert_eq!(unwrap_result("m", json!({"tools": []})), json!({"tools": []}));

        let err = unwrap_result("m", json!({"error": {"code": -32000, "message": "boom"}}));
        assert_eq!(err["error"], "boom");
        assert_eq!(err["code"], -32000);
        assert_eq!(err["method"], "m");

        let err = unwrap_result("m", json!({"error": "plain"}));
        assert_eq!(err["error"], "plain");
        assert!(err["code"].is_null());
    }

    #[tokio::test]
    async fn test_session_and_call() {
        let url = spawn(Router::new().route("/mcp", post(mcp_stub))).await;
        let client = client_for(&url);

        let session = client.initialize_session(3).await.unwrap();
        assert_eq!(session, "session-1");
        assert_eq!(client.session_id().await.as_deref(), Some("session-1"));

        let tools = client.call("tools/list", None).await;
        assert_eq!(tools["tools"][0]["name"], "get_price_board");

        let err = client.call("unknown/method", Some(json!({}))).await;
        assert_eq!(err["error"], "Method not found");
        assert_eq!(err["code"], -32601);
    }

    #[tokio::test]
    async fn test_falls_back_to_root_endpoint() {
        // Only "/" is served, so "/mcp" answers 404
        let url = spawn(Router::new().route("/", post(mcp_stub))).await;
        let client = client_for(&url);

        let tools = client.call("tools/list", None).await;
        assert_eq!(tools["tools"][0]["name"], "get_price_board");
    }

    #[tokio::test]
    async fn test_unreachable_server() {
        let client = client_for("http://127.0.0.1:1");
        assert!(client.initialize_session(2).await.is_err());

        let result = client.call("tools/list", None).await;
        assert_eq!(result["error"], "Failed to initialize MCP session");
        assert_eq!(result["method"], "tools/list");
    }

    #[tokio::test]
    async fn test_retries_after_dropped_connection() {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            // First connection is closed without a response, as during a cold start
            let (socket, _) = listener.accept().await.unwrap();
            drop(socket);
            axum::serve(listener, Router::new().route("/mcp", post(mcp_stub)))
                .await
                .unwrap();
        });

        let client = McpClient::new(&McpSettings {
            server_url: format!("http://{}", addr),
            timeout: Duration::from_secs(5),
        })
        .unwrap()
        .with_retry_base(Duration::from_millis(50));

        let started = std::time::Instant::now();
        let session = client.initialize_session(3).await.unwrap();
        assert_eq!(session, "session-1");
        // One backoff of at least the retry base was taken
        assert!(started.elapsed() >= Duration::from_millis(50));
    }

    #[tokio::test]
    async fn test_rejected_initialize_is_not_retried() {
        let hits = Arc::new(AtomicUsize::new(0));
        let counter = hits.clone();
        let router = Router::new().fallback(move || {
            let counter = counter.clone();
            async move {
                counter.fetch_add(1, Ordering::SeqCst);
                StatusCode::INTERNAL_SERVER_ERROR
            }
        });
        let url = spawn(router).await;

        let err = client_for(&url).initialize_session(4).await.unwrap_err();
        assert_eq!(err.to_string(), "Network error: Initialize failed: HTTP 500");
        // "/mcp" then "/", once
        assert_eq!(hits.load(Ordering::SeqCst), MCP_ENDPOINTS.len());
    }
}
