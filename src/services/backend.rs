//! Trading backend REST client.
//!
//! Every call returns a JSON value: either the backend's response body or an
//! error object (`{"error": ..., "endpoint": ...}`) that is handed to the model
//! unchanged. Protected endpoints get `Authorization: Bearer <BE_API_TOKEN>`;
//! when no token is configured they short-circuit with a fixed error object.

use crate::config::BackendSettings;
use crate::constants::BACKEND_HTTP_TIMEOUT_SECS;
use crate::error::{AppError, Result};
use crate::models::{ToolContext, ToolSource, ToolSpec};
use crate::utils::join_url;
use reqwest::Method;
use serde_json::{json, Map, Value};
use std::time::Duration;
use tracing::{debug, info, warn};

/// Substrings of transport errors caused by speaking TLS to a plain HTTP port
const TLS_ERROR_MARKERS: &[&str] = &[
    "ssl",
    "tls",
    "certificate",
    "wrong version number",
    "corrupt message",
    "invalidcontenttype",
];

enum SendError {
    Status { code: u16, body: String },
    Transport(reqwest::Error),
    Decode(String),
}

#[derive(Clone)]
pub struct BackendClient {
    base_url: Option<String>,
    token: Option<String>,
    client: reqwest::Client,
    /// Used for the plain-HTTP retry; never verifies certificates
    insecure_client: reqwest::Client,
}

impl BackendClient {
    pub fn new(settings: &BackendSettings) -> Result<Self> {
        let timeout = Duration::from_secs(BACKEND_HTTP_TIMEOUT_SECS);

        let client = reqwest::Client::builder()
            .timeout(timeout)
            .danger_accept_invalid_certs(!settings.verify_ssl)
            .build()
            .map_err(|e| AppError::Network(format!("Failed to create HTTP client: {}", e)))?;

        let insecure_client = reqwest::Client::builder()
            .timeout(timeout)
            .danger_accept_invalid_certs(true)
            .build()
            .map_err(|e| AppError::Network(format!("Failed to create HTTP client: {}", e)))?;

        let base_url = settings.base_url.as_ref().map(|u| u.trim().to_string());
        match &base_url {
            Some(url) => info!("Backend API configured: {}", url),
            None => warn!("BE_API not found in .env. Backend tools will not work."),
        }

        Ok(Self {
            base_url,
            token: settings.token.clone(),
            client,
            insecure_client,
        })
    }

    pub fn is_configured(&self) -> bool {
        self.base_url.is_some()
    }

    pub fn has_token(&self) -> bool {
        self.token.is_some()
    }

    /// Call the backend API and return its JSON body or an error object
    pub async fn call(
        &self,
        method: Method,
        endpoint: &str,
        body: Option<&Value>,
        query: &[(&str, &str)],
        require_auth: bool,
    ) -> Value {
        let base_url = match &self.base_url {
            Some(url) => url,
            None => {
                return json!({
                    "error": "BE_API not configured. Please set BE_API in .env file.",
                    "endpoint": endpoint,
                });
            }
        };

        let token = if require_auth {
            match &self.token {
                Some(token) => Some(token.as_str()),
                None => {
                    return json!({
                        "error": "Authentication required",
                        "message": "This endpoint requires authentication but BE_API_TOKEN is not set in .env file.",
                        "endpoint": endpoint,
                        "suggestion": "Set BE_API_TOKEN in .env file with your JWT token",
                    });
                }
            }
        } else {
            None
        };

        let url = join_url(base_url, endpoint);
        debug!(%method, %url, require_auth, "Calling backend API");

        match self.send(&self.client, &method, &url, body, query, token).await {
            Ok(value) => value,
            Err(SendError::Status { code, body }) => status_error(code, &body, endpoint),
            Err(SendError::Decode(message)) => json!({
                "error": "Unexpected error",
                "message": message,
                "endpoint": endpoint,
            }),
            Err(SendError::Transport(e)) => {
                let error_msg = e.to_string();
                if is_tls_error(&e) && url.starts_with("https://") {
                    let http_url = url.replacen("https://", "http://", 1);
                    warn!("SSL error detected. Retrying with HTTP: {}", http_url);

                    return match self
                        .send(&self.insecure_client, &method, &http_url, body, query, token)
                        .await
                    {
                        Ok(value) => value,
                        Err(retry_err) => json!({
                            "error": "Request failed (tried both HTTPS and HTTP)",
                            "message": format!("HTTPS error: {}, HTTP retry error: {}", error_msg, describe_send_error(&retry_err)),
                            "endpoint": endpoint,
                            "suggestion": "Check if BE_API URL uses correct protocol (http:// or https://)",
                        }),
                    };
                }

                json!({
                    "error": "Request failed",
                    "message": error_msg,
                    "endpoint": endpoint,
                })
            }
        }
    }

    async fn send(
        &self,
        client: &reqwest::Client,
        method: &Method,
        url: &str,
        body: Option<&Value>,
        query: &[(&str, &str)],
        token: Option<&str>,
    ) -> std::result::Result<Value, SendError> {
        let mut request = client
            .request(method.clone(), url)
            .header(reqwest::header::CONTENT_TYPE, "application/json");

        if !query.is_empty() {
            request = request.query(query);
        }
        if let Some(token) = token {
            request = request.bearer_auth(token);
        }
        if let Some(body) = body {
            if *method == Method::POST || *method == Method::PUT {
                request = request.json(body);
            }
        }

        let response = request.send().await.map_err(SendError::Transport)?;
        let status = response.status();
        let text = response.text().await.map_err(SendError::Transport)?;

        if !status.is_success() {
            return Err(SendError::Status { code: status.as_u16(), body: text });
        }

        serde_json::from_str::<Value>(&text).map_err(|e| SendError::Decode(e.to_string()))
    }

    /// Execute a backend tool by name with model-supplied arguments
    pub async fn call_tool(&self, name: &str, args: &Value, ctx: &ToolContext) -> Value {
        let args = with_user_id(args, ctx);
        let result = match name {
            "create_transaction" => self.create_transaction_tool(&args).await,
            "get_transaction_history" => match arg_str(&args, "userId") {
                Ok(user_id) => Ok(self.get_transaction_history(&user_id).await),
                Err(e) => Err(e),
            },
            "get_transaction_stats" => match arg_str(&args, "userId") {
                Ok(user_id) => Ok(self.get_transaction_stats(&user_id).await),
                Err(e) => Err(e),
            },
            "get_user_profile" => match arg_str(&args, "userId") {
                Ok(user_id) => Ok(self.get_user_profile(&user_id).await),
                Err(e) => Err(e),
            },
            "get_ranking" => Ok(self.get_ranking().await),
            "get_transaction_by_id" => match arg_str(&args, "transactionId") {
                Ok(id) => Ok(self.get_transaction_by_id(&id).await),
                Err(e) => Err(e),
            },
            "cancel_transaction" => match arg_str(&args, "transactionId") {
                Ok(id) => Ok(self.cancel_transaction(&id).await),
                Err(e) => Err(e),
            },
            _ => Ok(json!({"error": format!("Unknown backend tool: {}", name)})),
        };

        result.unwrap_or_else(|message| json!({"error": message, "tool": name}))
    }

    async fn create_transaction_tool(&self, args: &Value) -> std::result::Result<Value, String> {
        let user_id = arg_str(args, "userId")?;
        let symbol = arg_str(args, "symbol")?;
        let side = arg_str(args, "type")?;
        let quantity = arg_i64(args, "quantity")?;
        let price = arg_f64(args, "price")?;
        let order_type = arg_str(args, "orderType").unwrap_or_else(|_| "limit".to_string());

        Ok(self
            .create_transaction(&user_id, &symbol, &side, quantity, price, &order_type)
            .await)
    }

    /// Place a buy/sell order
    pub async fn create_transaction(
        &self,
        user_id: &str,
        symbol: &str,
        side: &str,
        quantity: i64,
        price: f64,
        order_type: &str,
    ) -> Value {
        if side != "buy" && side != "sell" {
            return json!({"error": "type must be 'buy' or 'sell'", "type": side});
        }
        if order_type != "limit" && order_type != "market" {
            return json!({
                "error": "orderType must be 'limit' or 'market'",
                "orderType": order_type,
            });
        }

        let payload = json!({
            "userId": user_id,
            "symbol": symbol.to_uppercase(),
            "type": side,
            "quantity": quantity,
            "price": price,
            "orderType": order_type,
        });

        self.call(Method::POST, "stock-transactions/transactions", Some(&payload), &[], false)
            .await
    }

    pub async fn get_transaction_history(&self, user_id: &str) -> Value {
        let endpoint = format!("stock-transactions/transactions/{}", user_id);
        self.call(Method::GET, &endpoint, None, &[], false).await
    }

    pub async fn get_transaction_stats(&self, user_id: &str) -> Value {
        let endpoint = format!("stock-transactions/transactions/{}/stats", user_id);
        self.call(Method::GET, &endpoint, None, &[], true).await
    }

    pub async fn get_user_profile(&self, user_id: &str) -> Value {
        self.call(Method::GET, "user/profile", None, &[("userId", user_id)], true)
            .await
    }

    pub async fn get_ranking(&self) -> Value {
        self.call(Method::GET, "stock-transactions/ranking", None, &[], false)
            .await
    }

    pub async fn get_transaction_by_id(&self, transaction_id: &str) -> Value {
        let endpoint = format!("stock-transactions/transactions/{}", transaction_id);
        self.call(Method::GET, &endpoint, None, &[], true).await
    }

    pub async fn cancel_transaction(&self, transaction_id: &str) -> Value {
        let endpoint = format!("stock-transactions/transactions/{}/cancel", transaction_id);
        self.call(Method::PUT, &endpoint, None, &[], true).await
    }
}

fn is_tls_error(err: &reqwest::Error) -> bool {
    // reqwest's own message embeds the URL; only the causes are matched
    let mut source = std::error::Error::source(err);
    while let Some(inner) = source {
        if mentions_tls(&inner.to_string()) {
            return true;
        }
        source = inner.source();
    }
    false
}

fn mentions_tls(message: &str) -> bool {
    let lower = message.to_lowercase();
    TLS_ERROR_MARKERS.iter().any(|marker| lower.contains(marker))
}

fn describe_send_error(err: &SendError) -> String {
    match err {
        SendError::Status { code, body } => format!("HTTP {}: {}", code, body),
        SendError::Transport(e) => e.to_string(),
        SendError::Decode(message) => message.clone(),
    }
}

fn status_error(code: u16, body: &str, endpoint: &str) -> Value {
    let message = serde_json::from_str::<Value>(body)
        .ok()
        .and_then(|v| v.get("message").and_then(|m| m.as_str()).map(str::to_string))
        .unwrap_or_else(|| body.to_string());

    json!({
        "error": format!("HTTP {}", code),
        "message": message,
        "status_code": code,
        "endpoint": endpoint,
    })
}

/// Fill `userId` from the chat metadata when the model left it out
fn with_user_id(args: &Value, ctx: &ToolContext) -> Value {
    let mut object = args.as_object().cloned().unwrap_or_else(Map::new);
    let missing = object
        .get("userId")
        .map(|v| v.is_null() || v.as_str().map_or(false, |s| s.trim().is_empty()))
        .unwrap_or(true);
    if missing {
        if let Some(user_id) = &ctx.user_id {
            object.insert("userId".to_string(), Value::String(user_id.clone()));
        }
    }
    Value::Object(object)
}

fn arg_str(args: &Value, key: &str) -> std::result::Result<String, String> {
    match args.get(key) {
        Some(Value::String(s)) if !s.trim().is_empty() => Ok(s.trim().to_string()),
        Some(Value::Number(n)) => Ok(n.to_string()),
        _ => Err(format!("Missing required argument '{}'", key)),
    }
}

fn arg_f64(args: &Value, key: &str) -> std::result::Result<f64, String> {
    match args.get(key) {
        Some(Value::Number(n)) => n.as_f64().ok_or_else(|| format!("Invalid number for '{}'", key)),
        Some(Value::String(s)) => s
            .trim()
            .replace(',', "")
            .parse::<f64>()
            .map_err(|_| format!("Invalid number for '{}': {}", key, s)),
        _ => Err(format!("Missing required argument '{}'", key)),
    }
}

fn arg_i64(args: &Value, key: &str) -> std::result::Result<i64, String> {
    arg_f64(args, key).map(|v| v.round() as i64)
}

/// Tool definitions for the trading backend
pub fn backend_tool_specs() -> Vec<ToolSpec> {
    let user_only = json!({
        "type": "object",
        "properties": {
            "userId": {"type": "string", "description": "ID người dùng (tự động lấy từ metadata nếu bỏ trống)"}
        },
        "required": []
    });
    let transaction_only = json!({
        "type": "object",
        "properties": {
            "transactionId": {"type": "string", "description": "ID giao dịch"}
        },
        "required": ["transactionId"]
    });

    vec![
        ToolSpec::new(
            "create_transaction",
            "Tạo giao dịch mua/bán cổ phiếu (POST stock-transactions/transactions).",
            json!({
                "type": "object",
                "properties": {
                    "userId": {"type": "string", "description": "ID người dùng (tự động lấy từ metadata nếu bỏ trống)"},
                    "symbol": {"type": "string", "description": "Mã cổ phiếu, ví dụ MWG, VCB"},
                    "type": {"type": "string", "enum": ["buy", "sell"], "description": "Loại giao dịch"},
                    "quantity": {"type": "integer", "description": "Số lượng cổ phiếu"},
                    "price": {"type": "number", "description": "Giá đặt lệnh (VNĐ)"},
                    "orderType": {"type": "string", "enum": ["limit", "market"], "default": "limit"}
                },
                "required": ["symbol", "type", "quantity", "price"]
            }),
            ToolSource::Backend,
        ),
        ToolSpec::new(
            "get_transaction_history",
            "Lấy lịch sử giao dịch của người dùng.",
            user_only.clone(),
            ToolSource::Backend,
        ),
        ToolSpec::new(
            "get_transaction_stats",
            "Lấy thống kê giao dịch (totalProfit, totalTransactions, winRate). Yêu cầu xác thực.",
            user_only.clone(),
            ToolSource::Backend,
        ),
        ToolSpec::new(
            "get_user_profile",
            "Lấy thông tin tài khoản người dùng (fullName, email, balance). Yêu cầu xác thực.",
            user_only,
            ToolSource::Backend,
        ),
        ToolSpec::new(
            "get_ranking",
            "Lấy bảng xếp hạng người dùng theo lợi nhuận.",
            json!({"type": "object", "properties": {}, "required": []}),
            ToolSource::Backend,
        ),
        ToolSpec::new(
            "get_transaction_by_id",
            "Lấy chi tiết một giao dịch theo ID. Yêu cầu xác thực.",
            transaction_only.clone(),
            ToolSource::Backend,
        ),
        ToolSpec::new(
            "cancel_transaction",
            "Hủy một giao dịch. Yêu cầu xác thực.",
            transaction_only,
            ToolSource::Backend,
        ),
    ]
}
