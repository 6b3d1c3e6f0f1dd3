pub mod ask;
pub mod doctor;
pub mod serve;
pub mod tools;

use crate::config::Settings;
use crate::error::Result;
use crate::server::AppState;
use crate::services::{BackendClient, LlmAgent, LlmClient, McpClient, ModelManager, ToolRegistry};
use std::sync::Arc;

/// Connect to the MCP server and assemble the tool registry
pub(crate) async fn build_tools(settings: &Settings) -> Result<Arc<ToolRegistry>> {
    let mcp_client = Arc::new(McpClient::new(&settings.mcp)?);
    let backend = Arc::new(BackendClient::new(&settings.backend)?);
    Ok(Arc::new(ToolRegistry::collect(mcp_client, backend).await))
}

/// Wire settings, tools, model and agent into the server state
pub(crate) async fn build_app_state(settings: Settings) -> Result<AppState> {
    let tools = build_tools(&settings).await?;
    let models = ModelManager::from_settings(&settings.llm);
    let model = Arc::new(LlmClient::new(models));
    let agent = Arc::new(LlmAgent::new(model, tools.clone()));

    Ok(AppState {
        settings: Arc::new(settings),
        agent,
        tools,
    })
}
