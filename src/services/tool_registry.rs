//! One registry over every tool the agent can call: MCP market data (or
//! fallbacks), trading backend endpoints and locally computed tools.

use crate::models::{ToolContext, ToolSource, ToolSpec};
use crate::services::backend::{backend_tool_specs, BackendClient};
use crate::services::mcp_client::McpClient;
use crate::services::mcp_tools::{fallback_tool_result, fallback_tool_specs, McpToolManager};
use crate::services::trading_hours::current_datetime_info;
use crate::constants::MCP_INIT_MAX_RETRIES;
use serde_json::{json, Value};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{info, warn};

pub const CURRENT_DATETIME_TOOL: &str = "get_current_datetime";

fn custom_tool_specs() -> Vec<ToolSpec> {
    vec![ToolSpec::new(
        CURRENT_DATETIME_TOOL,
        "Lấy ngày và giờ hiện tại theo giờ Việt Nam: date, time, datetime, date_vn (DD/MM/YYYY), \
         day_name, day_name_vn, full_vn (\"DD tháng MM năm YYYY\"), is_trading_hours (9:00-15:00, thứ 2-6), is_weekend.",
        json!({"type": "object", "properties": {}, "required": []}),
        ToolSource::Custom,
    )]
}

pub struct ToolRegistry {
    specs: Vec<ToolSpec>,
    index: HashMap<String, usize>,
    mcp: Arc<McpToolManager>,
    backend: Arc<BackendClient>,
    mcp_tool_count: usize,
}

impl ToolRegistry {
    /// Connect to the MCP server and gather every tool source
    pub async fn collect(
        mcp_client: Arc<McpClient>,
        backend: Arc<BackendClient>,
    ) -> Self {
        let mcp = Arc::new(McpToolManager::new(mcp_client.clone()));
        info!("Connecting to MCP server at {}", mcp_client.server_url());

        let mcp_tools = match mcp_client.initialize_session(MCP_INIT_MAX_RETRIES).await {
            Ok(_) => {
                let tools = mcp.load_tools().await;
                info!("Loaded {} MCP tools for market data", tools.len());
                tools
            }
            Err(e) => {
                warn!(
                    "Failed to initialize MCP session: {}. MCP tools will not be available (server down, cold start, or wrong URL: {})",
                    e,
                    mcp_client.server_url()
                );
                Vec::new()
            }
        };

        Self::from_parts(mcp, backend, mcp_tools)
    }

    /// Assemble a registry from already-loaded MCP tools
    pub fn from_parts(
        mcp: Arc<McpToolManager>,
        backend: Arc<BackendClient>,
        mcp_tools: Vec<ToolSpec>,
    ) -> Self {
        let mcp_tool_count = mcp_tools.len();
        let mut specs = mcp_tools;

        if mcp_tool_count == 0 {
            let fallbacks = fallback_tool_specs();
            warn!("Creating {} fallback MCP tools", fallbacks.len());
            specs.extend(fallbacks);
        }

        let backend_specs = backend_tool_specs();
        let backend_count = backend_specs.len();
        specs.extend(backend_specs);

        let custom_specs = custom_tool_specs();
        let custom_count = custom_specs.len();
        specs.extend(custom_specs);

        // First definition wins if an MCP tool shadows a local name
        let mut index = HashMap::new();
        let mut deduped = Vec::with_capacity(specs.len());
        for spec in specs {
            if index.contains_key(&spec.name) {
                warn!("Duplicate tool name '{}' ignored ({})", spec.name, spec.source.as_str());
                continue;
            }
            index.insert(spec.name.clone(), deduped.len());
            deduped.push(spec);
        }

        info!(
            "Total tools available: {} ({} MCP + {} Backend API + {} custom)",
            deduped.len(),
            mcp_tool_count,
            backend_count,
            custom_count
        );

        Self {
            specs: deduped,
            index,
            mcp,
            backend,
            mcp_tool_count,
        }
    }

    pub fn specs(&self) -> &[ToolSpec] {
        &self.specs
    }

    pub fn len(&self) -> usize {
        self.specs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.specs.is_empty()
    }

    pub fn mcp_tool_count(&self) -> usize {
        self.mcp_tool_count
    }

    pub fn get(&self, name: &str) -> Option<&ToolSpec> {
        self.index.get(name).map(|&idx| &self.specs[idx])
    }

    /// Tools from the given sources; every tool when `sources` is empty
    pub fn by_source(&self, sources: &[ToolSource]) -> Vec<&ToolSpec> {
        self.specs
            .iter()
            .filter(|spec| sources.is_empty() || sources.contains(&spec.source))
            .collect()
    }

    /// Run a tool by name; unknown names yield an error object
    pub async fn execute(&self, name: &str, args: &Value, ctx: &ToolContext) -> Value {
        let Some(spec) = self.get(name) else {
            warn!("Model requested unknown tool '{}'", name);
            return json!({"error": format!("Unknown tool: {}", name)});
        };

        match spec.source {
            ToolSource::Mcp => self.mcp.call_tool(spec, args).await,
            ToolSource::Fallback => fallback_tool_result(name, self.mcp.server_url()),
            ToolSource::Backend => self.backend.call_tool(name, args, ctx).await,
            ToolSource::Custom => match name {
                CURRENT_DATETIME_TOOL => {
                    serde_json::to_value(current_datetime_info()).unwrap_or(Value::Null)
                }
                _ => json!({"error": format!("Unknown tool: {}", name)}),
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{BackendSettings, McpSettings};
    use std::time::Duration;

    fn registry(mcp_tools: Vec<ToolSpec>) -> ToolRegistry {
        let client = McpClient::new(&McpSettings {
            server_url: "http://127.0.0.1:1".to_string(),
            timeout: Duration::from_secs(1),
        })
        .unwrap();
        let backend = BackendClient::new(&BackendSettings {
            base_url: None,
            token: None,
            verify_ssl: true,
        })
        .unwrap();
        ToolRegistry::from_parts(
            Arc::new(McpToolManager::new(Arc::new(client))),
            Arc::new(backend),
            mcp_tools,
        )
    }

    #[test]
    fn test_fallbacks_when_mcp_empty() {
        let reg = registry(Vec::new());
        assert_eq!(reg.mcp_tool_count(), 0);
        assert_eq!(reg.by_source(&[ToolSource::Fallback]).len(), 6);
        assert_eq!(reg.by_source(&[ToolSource::Backend]).len(), 7);
        assert_eq!(reg.by_source(&[ToolSource::Custom]).len(), 1);
        assert_eq!(reg.by_source(&[]).len(), reg.len());
    }

    #[test]
    fn test_no_fallbacks_when_mcp_loaded() {
        let mcp = vec![ToolSpec::new("get_price_board", "", json!({}), ToolSource::Mcp)];
        let reg = registry(mcp);
        assert_eq!(reg.mcp_tool_count(), 1);
        assert!(reg.by_source(&[ToolSource::Fallback]).is_empty());
        assert_eq!(reg.get("get_price_board").unwrap().source, ToolSource::Mcp);
    }

    #[tokio::test]
    async fn test_execute_dispatch() {
        let reg = registry(Vec::new());
        let ctx = ToolContext::default();

        let unknown = reg.execute("nope", &json!({}), &ctx).await;
        assert_eq!(unknown["error"], "Unknown tool: nope");

        let fallback = reg.execute("get_price_board", &json!({"symbols": ["VCB"]}), &ctx).await;
        assert_eq!(fallback["tool"], "get_price_board");

        let clock = reg.execute(CURRENT_DATETIME_TOOL, &json!({}), &ctx).await;
        assert!(clock["date_vn"].is_string());
        assert!(clock["is_weekend"].is_boolean());

        let backend = reg.execute("get_ranking", &json!({}), &ctx).await;
        assert_eq!(backend["error"], "BE_API not configured. Please set BE_API in .env file.");
    }
}
