//! MCP tool loading, argument normalization and result extraction.

use crate::constants::{
    CLOSING_PRICE_LOOKBACK_DAYS, COMMON_MCP_TOOLS, HISTORY_PRICE_TOOL, INTRADAY_PRICE_TOOL,
    PRICE_BOARD_TOOL,
};
use crate::models::{ToolSource, ToolSpec};
use crate::services::mcp_client::McpClient;
use crate::services::trading_hours::market_now;
use chrono::Duration as ChronoDuration;
use serde_json::{json, Map, Value};
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Aliases the model tends to use for ticker arguments
const SYMBOL_ALIASES: &[&str] = &["symbol", "symbols", "symbol_list", "stocks", "stock"];

pub struct McpToolManager {
    client: Arc<McpClient>,
}

impl McpToolManager {
    pub fn new(client: Arc<McpClient>) -> Self {
        Self { client }
    }

    pub fn server_url(&self) -> &str {
        self.client.server_url()
    }

    /// List tools from the MCP server; an empty vector means unavailable
    pub async fn load_tools(&self) -> Vec<ToolSpec> {
        let result = self.client.call("tools/list", None).await;

        if let Some(error) = result.get("error") {
            warn!("Error listing MCP tools: {}", error);
            warn!("Ensure MCP server is running at {}", self.client.server_url());
            return Vec::new();
        }

        let tools: Vec<ToolSpec> = result
            .get("tools")
            .and_then(|t| t.as_array())
            .map(|list| list.iter().filter_map(tool_spec_from_mcp).collect())
            .unwrap_or_default();

        if tools.is_empty() {
            warn!("No tools found from MCP server");
        } else {
            info!(
                "Successfully loaded {} MCP tools from {}",
                tools.len(),
                self.client.server_url()
            );
        }
        tools
    }

    /// Execute an MCP tool with model-supplied arguments
    pub async fn call_tool(&self, spec: &ToolSpec, args: &Value) -> Value {
        if spec.name == INTRADAY_PRICE_TOOL {
            return self.intraday_price_with_fallback(spec, args).await;
        }
        self.call_raw(spec, args).await
    }

    async fn call_raw(&self, spec: &ToolSpec, args: &Value) -> Value {
        let properties = spec.properties();
        let processed = process_arguments(&spec.name, &properties, args);
        let processed_value = Value::Object(processed.clone());
        debug!(tool = %spec.name, raw = %args, processed = %processed_value, "Calling MCP tool");

        let result = self
            .client
            .call(
                "tools/call",
                Some(json!({"name": spec.name, "arguments": processed})),
            )
            .await;

        let extracted = extract_tool_result(&spec.name, result);
        if let Some(error) = extracted.get("error") {
            warn!("{} failed: {}", spec.name, error);
        }
        extracted
    }

    /// Intraday quotes fall back to the latest closing price when empty or failing
    async fn intraday_price_with_fallback(&self, spec: &ToolSpec, args: &Value) -> Value {
        let normalized = normalize_keys(&spec.name, &spec.properties(), args);
        let symbol = match normalized.get("symbol") {
            Some(Value::String(s)) if !s.trim().is_empty() => s.trim().to_string(),
            Some(Value::Array(items)) if !items.is_empty() => stringify(&items[0]),
            _ => {
                return json!({
                    "error": "Missing required argument 'symbol'",
                    "tool": spec.name,
                });
            }
        };
        let output_format = normalized
            .get("output_format")
            .and_then(|v| v.as_str())
            .unwrap_or("json")
            .to_string();

        let call_args = json!({
            "symbol": symbol,
            "page_size": normalized.get("page_size").cloned().unwrap_or(json!(100)),
            "last_time": normalized.get("last_time").cloned().unwrap_or(Value::Null),
            "output_format": output_format,
        });

        let result = self.call_raw(spec, &call_args).await;
        if let Some(error) = result.get("error") {
            info!("{} failed: {}. Falling back to {} for closing price", INTRADAY_PRICE_TOOL, error, HISTORY_PRICE_TOOL);
            return self.closing_price(&symbol, &output_format).await;
        }
        if is_empty_result(&result) {
            info!("{} returned empty result. Falling back to {} for closing price", INTRADAY_PRICE_TOOL, HISTORY_PRICE_TOOL);
            return self.closing_price(&symbol, &output_format).await;
        }
        result
    }

    async fn closing_price(&self, symbol: &str, output_format: &str) -> Value {
        let now = market_now();
        let end_date = now.format("%Y-%m-%d").to_string();
        let start_date = (now - ChronoDuration::days(CLOSING_PRICE_LOOKBACK_DAYS))
            .format("%Y-%m-%d")
            .to_string();

        let result = self
            .client
            .call(
                "tools/call",
                Some(json!({
                    "name": HISTORY_PRICE_TOOL,
                    "arguments": {
                        "symbol": symbol,
                        "start_date": start_date,
                        "end_date": end_date,
                        "interval": "1D",
                        "output_format": output_format,
                    }
                })),
            )
            .await;

        if let Some(error) = result.get("error") {
            return json!({
                "error": format!("Failed to get closing price: {}", stringify(error)),
                "tool": HISTORY_PRICE_TOOL,
                "fallback_from": INTRADAY_PRICE_TOOL,
            });
        }
        extract_content(result)
    }
}

fn tool_spec_from_mcp(tool: &Value) -> Option<ToolSpec> {
    let name = tool.get("name")?.as_str()?;
    let description = tool
        .get("description")
        .and_then(|d| d.as_str())
        .filter(|d| !d.is_empty())
        .map(str::to_string)
        .unwrap_or_else(|| format!("MCP tool: {}", name));

    let mut parameters = tool
        .get("inputSchema")
        .filter(|s| s.is_object())
        .cloned()
        .unwrap_or_else(|| json!({}));
    if let Some(obj) = parameters.as_object_mut() {
        obj.entry("type").or_insert_with(|| json!("object"));
        obj.entry("properties").or_insert_with(|| json!({}));
    }

    Some(ToolSpec::new(name, &description, parameters, ToolSource::Mcp))
}

/// Target key for ticker aliases, decided by what the schema declares
fn symbol_target(tool_name: &str, properties: &Map<String, Value>) -> Option<&'static str> {
    if tool_name == PRICE_BOARD_TOOL || properties.contains_key("symbols") {
        Some("symbols")
    } else if properties.contains_key("symbol") {
        Some("symbol")
    } else {
        None
    }
}

fn normalize_keys(tool_name: &str, properties: &Map<String, Value>, args: &Value) -> Map<String, Value> {
    let target = symbol_target(tool_name, properties);
    let mut normalized = Map::new();

    if let Some(obj) = args.as_object() {
        for (key, value) in obj {
            let key = match target {
                Some(target) if key != target && SYMBOL_ALIASES.contains(&key.as_str()) => target,
                _ => key.as_str(),
            };
            normalized.insert(key.to_string(), value.clone());
        }
    }
    normalized
}

fn is_array_type(schema: &Value) -> bool {
    match schema.get("type") {
        Some(Value::String(t)) => t == "array",
        Some(Value::Array(types)) => types.iter().any(|t| t == "array"),
        _ => false,
    }
}

fn stringify(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

/// Rename ticker aliases and coerce values to the declared schema types
pub fn process_arguments(tool_name: &str, properties: &Map<String, Value>, args: &Value) -> Map<String, Value> {
    let normalized = normalize_keys(tool_name, properties, args);
    let mut processed = Map::new();

    for (name, value) in normalized {
        let Some(schema) = properties.get(&name) else {
            processed.insert(name, value);
            continue;
        };

        let coerced = if tool_name == PRICE_BOARD_TOOL && name == "symbols" {
            match value {
                Value::Array(_) => value,
                Value::String(_) => Value::Array(vec![value]),
                other => Value::Array(vec![Value::String(stringify(&other))]),
            }
        } else if is_array_type(schema) {
            match value {
                Value::Array(_) => value,
                other => Value::Array(vec![other]),
            }
        } else if schema.get("type").and_then(|t| t.as_str()) == Some("string") {
            match value {
                Value::Null => Value::Null,
                Value::Array(items) => {
                    Value::String(items.first().map(stringify).unwrap_or_default())
                }
                other => Value::String(stringify(&other)),
            }
        } else {
            value
        };
        processed.insert(name, coerced);
    }
    processed
}

/// Text payload of an MCP result (`content[].text`, `content`, `text`, or the whole result)
pub fn extract_content(result: Value) -> Value {
    let mut obj = match result {
        Value::Object(obj) => obj,
        other => return other,
    };

    if let Some(content) = obj.remove("content") {
        return match content {
            Value::Array(items) => {
                let texts: Vec<String> = items
                    .iter()
                    .filter_map(|item| match item {
                        Value::Object(o) => o.get("text").map(stringify),
                        Value::String(s) => Some(s.clone()),
                        _ => None,
                    })
                    .collect();
                match texts.len() {
                    0 => Value::Array(items),
                    1 => Value::String(texts.into_iter().next().unwrap_or_default()),
                    _ => Value::String(texts.join("\n")),
                }
            }
            other => other,
        };
    }

    if let Some(text) = obj.remove("text") {
        return text;
    }
    Value::Object(obj)
}

/// Turn a `tools/call` response into the value handed back to the model
pub fn extract_tool_result(tool_name: &str, result: Value) -> Value {
    match &result {
        Value::Object(obj) if obj.contains_key("error") => {
            let error = match &obj["error"] {
                Value::Object(e) => e
                    .get("message")
                    .map(stringify)
                    .unwrap_or_else(|| obj["error"].to_string()),
                other => stringify(other),
            };
            json!({
                "error": error,
                "tool": tool_name,
                "code": obj.get("code").cloned().unwrap_or(Value::Null),
            })
        }
        Value::String(s) => {
            let lower = s.to_lowercase();
            if s.trim().is_empty() {
                json!({"error": "Empty response", "tool": tool_name})
            } else if lower.contains("error") || lower.contains("failed") {
                json!({"error": s, "tool": tool_name})
            } else {
                result
            }
        }
        _ => extract_content(result),
    }
}

fn is_empty_result(value: &Value) -> bool {
    match value {
        Value::Null => true,
        Value::String(s) => s.trim().is_empty(),
        Value::Array(a) => a.is_empty(),
        Value::Object(o) => o.is_empty(),
        _ => false,
    }
}

/// Stand-ins for the common market data tools while the MCP server is down
pub fn fallback_tool_specs() -> Vec<ToolSpec> {
    COMMON_MCP_TOOLS
        .iter()
        .map(|name| {
            ToolSpec::new(
                name,
                &format!("Fallback tool for {} - returns error when MCP server is unavailable.", name),
                json!({"type": "object", "properties": {}, "additionalProperties": true}),
                ToolSource::Fallback,
            )
        })
        .collect()
}

/// Fixed answer of every fallback tool
pub fn fallback_tool_result(tool_name: &str, server_url: &str) -> Value {
    json!({
        "error": format!("MCP server is currently unavailable. Tool '{}' cannot be used.", tool_name),
        "message": format!(
            "Xin lỗi, hiện tại không thể truy cập MCP server để lấy thông tin thị trường. \
             Vui lòng thử lại sau hoặc liên hệ quản trị viên. MCP Server URL: {}",
            server_url
        ),
        "tool": tool_name,
        "suggestion": "MCP server có thể đang trong trạng thái cold start hoặc gặp sự cố. Vui lòng đợi vài giây rồi thử lại.",
    })
}
