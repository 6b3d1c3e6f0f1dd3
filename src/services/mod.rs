pub mod agent;
pub mod api_logging;
pub mod backend;
pub mod llm_client;
pub mod mcp_client;
pub mod mcp_tools;
pub mod model_manager;
pub mod suggestion;
pub mod tool_registry;
pub mod trading_hours;
pub mod ui_parser;

pub use agent::{AgentOutput, AgentRunner, LlmAgent, SessionStore};
pub use backend::BackendClient;
pub use llm_client::{ChatModel, ChatTurn, LlmClient, RegistryTool};
pub use mcp_client::McpClient;
pub use mcp_tools::McpToolManager;
pub use model_manager::{ModelManager, Provider};
pub use tool_registry::ToolRegistry;
pub use trading_hours::{current_datetime_info, is_trading_hours};
