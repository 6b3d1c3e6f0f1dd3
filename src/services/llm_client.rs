//! LLM layer on rig-core: Groq and OpenRouter agents over the tool registry,
//! with model switching on rate or token limits.

use crate::constants::MAX_AGENT_STEPS;
use crate::error::{AppError, Result};
use crate::models::{ToolContext, ToolSpec};
use crate::services::agent::AgentEvent;
use crate::services::model_manager::{ModelManager, Provider};
use crate::services::tool_registry::ToolRegistry;
use async_trait::async_trait;
use reqwest::Client as HttpClient;
use rig::{
    agent::Agent,
    client::CompletionClient,
    completion::{CompletionModel, Message, Prompt, ToolDefinition},
    message::{AssistantContent, Text, ToolChoice, UserContent},
    providers::{groq, openrouter},
    tool::Tool,
    OneOrMany,
};
use serde_json::{json, Value};
use std::future::Future;
use std::sync::{Arc, Mutex, RwLock};
use tracing::{debug, info, warn};

/// Phrases providers use when a request fails on a rate or token limit
const RATE_LIMIT_MARKERS: &[&str] = &[
    "429",
    "413",
    "rate limit",
    "rate_limit",
    "ratelimit",
    "token limit",
    "tokens per minute",
    "too many requests",
];

/// Tool activity recorded during one agent turn
pub type EventLog = Arc<Mutex<Vec<AgentEvent>>>;

pub fn user_message(text: impl Into<String>) -> Message {
    Message::User {
        content: OneOrMany::one(UserContent::Text(Text { text: text.into() })),
    }
}

pub fn assistant_message(text: impl Into<String>) -> Message {
    Message::Assistant {
        id: None,
        content: OneOrMany::one(AssistantContent::Text(Text { text: text.into() })),
    }
}

/// A registry entry exposed to the model under its own name
#[derive(Clone)]
pub struct RegistryTool {
    definition: ToolDefinition,
    registry: Arc<ToolRegistry>,
    ctx: ToolContext,
    events: EventLog,
}

impl RegistryTool {
    pub fn new(spec: &ToolSpec, registry: Arc<ToolRegistry>, ctx: ToolContext, events: EventLog) -> Self {
        Self {
            definition: spec.to_tool_definition(),
            registry,
            ctx,
            events,
        }
    }
}

impl Tool for RegistryTool {
    // rig keys tools by `name()`, which is overridden with the registry name
    const NAME: &'static str = "registry_tool";

    type Error = AppError;
    type Args = Value;
    type Output = Value;

    fn name(&self) -> String {
        self.definition.name.clone()
    }

    async fn definition(&self, _prompt: String) -> ToolDefinition {
        self.definition.clone()
    }

    async fn call(&self, args: Self::Args) -> std::result::Result<Self::Output, Self::Error> {
        let name = &self.definition.name;
        let args = if args.is_object() { args } else { json!({}) };

        info!(tool = %name, %args, "Executing tool");
        let result = self.registry.execute(name, &args, &self.ctx).await;

        let text = match &result {
            Value::String(s) => s.clone(),
            other => other.to_string(),
        };
        if let Ok(mut events) = self.events.lock() {
            events.push(AgentEvent {
                author: "tool".to_string(),
                text: Some(text),
                tool_calls: Vec::new(),
                tool: Some(name.clone()),
            });
        }
        Ok(result)
    }
}

/// Everything the model needs for one chat turn
pub struct ChatTurn {
    pub preamble: String,
    pub history: Vec<Message>,
    pub prompt: String,
    pub tools: Vec<RegistryTool>,
}

/// A model that runs the tool-calling loop and returns the final text
#[async_trait]
pub trait ChatModel: Send + Sync {
    async fn chat(&self, turn: ChatTurn) -> Result<String>;

    fn model_name(&self) -> String;

    fn provider(&self) -> Provider;
}

fn mentions_rate_limit(text: &str) -> bool {
    let lower = text.to_lowercase();
    RATE_LIMIT_MARKERS.iter().any(|marker| lower.contains(marker))
}

fn classify_error(message: String) -> AppError {
    if mentions_rate_limit(&message) {
        AppError::RateLimit(message)
    } else {
        AppError::Llm(message)
    }
}

async fn prompt_agent<M: CompletionModel + 'static>(agent: Agent<M>, turn: &ChatTurn) -> Result<String> {
    let mut history = turn.history.clone();
    agent
        .prompt(&turn.prompt)
        .with_history(&mut history)
        .max_turns(MAX_AGENT_STEPS)
        .await
        .map_err(|e| classify_error(e.to_string()))
}

// Provider clients have distinct model types, so the agent is built per arm
macro_rules! run_agent {
    ($client:expr, $model:expr, $turn:expr) => {{
        let mut tools = $turn.tools.iter().cloned();
        match tools.next() {
            None => {
                let agent = $client.agent($model).preamble(&$turn.preamble).build();
                prompt_agent(agent, $turn).await
            }
            Some(first) => {
                let mut builder = $client.agent($model).preamble(&$turn.preamble).tool(first);
                for tool in tools {
                    builder = builder.tool(tool);
                }
                let agent = builder.tool_choice(ToolChoice::Auto).build();
                prompt_agent(agent, $turn).await
            }
        }
    }};
}

pub struct LlmClient {
    models: RwLock<ModelManager>,
}

impl LlmClient {
    pub fn new(models: ModelManager) -> Self {
        Self {
            models: RwLock::new(models),
        }
    }

    fn snapshot(&self) -> ModelManager {
        match self.models.read() {
            Ok(guard) => guard.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }

    fn switch_from(&self, failed: usize) -> bool {
        match self.models.write() {
            Ok(mut guard) => guard.switch_from(failed),
            Err(poisoned) => poisoned.into_inner().switch_from(failed),
        }
    }

    /// Run `attempt` on the current model, moving down the chain on limits
    async fn with_model_fallback<F, Fut>(&self, mut attempt: F) -> Result<String>
    where
        F: FnMut(ModelManager) -> Fut + Send,
        Fut: Future<Output = Result<String>> + Send,
    {
        loop {
            let manager = self.snapshot();
            let model = manager.current_model().to_string();
            let failed = manager.index();
            match attempt(manager).await {
                Err(e) if e.is_rate_limit() => {
                    warn!("Model {} hit a limit: {}", model, e);
                    if !self.switch_from(failed) {
                        return Err(e);
                    }
                }
                other => return other,
            }
        }
    }

    /// Build a rig agent for the manager's current model and run the turn
    async fn send(manager: ModelManager, turn: &ChatTurn) -> Result<String> {
        let key = manager.api_key().ok_or_else(|| {
            AppError::Config(format!("No API key configured for {}", manager.provider().as_str()))
        })?;
        let model = manager.current_model();
        debug!(model, history = turn.history.len(), tools = turn.tools.len(), "LLM request");

        let run = async {
            match manager.provider() {
                Provider::Groq => {
                    let client: groq::Client<HttpClient> =
                        groq::Client::new(key).map_err(|e| AppError::Llm(e.to_string()))?;
                    run_agent!(client, model, turn)
                }
                Provider::OpenRouter => {
                    let client: openrouter::Client<HttpClient> =
                        openrouter::Client::new(key).map_err(|e| AppError::Llm(e.to_string()))?;
                    run_agent!(client, model, turn)
                }
            }
        };

        tokio::time::timeout(manager.timeout(), run)
            .await
            .map_err(|_| AppError::Network(format!("{} timed out after {:?}", model, manager.timeout())))?
    }
}

#[async_trait]
impl ChatModel for LlmClient {
    async fn chat(&self, turn: ChatTurn) -> Result<String> {
        let turn = &turn;
        self.with_model_fallback(|manager| Self::send(manager, turn)).await
    }

    fn model_name(&self) -> String {
        self.snapshot().current_model().to_string()
    }

    fn provider(&self) -> Provider {
        self.snapshot().provider()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{BackendSettings, LlmSettings, McpSettings};
    use crate::services::backend::BackendClient;
    use crate::services::mcp_client::McpClient;
    use crate::services::mcp_tools::McpToolManager;
    use crate::services::tool_registry::CURRENT_DATETIME_TOOL;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    fn groq_client() -> LlmClient {
        LlmClient::new(ModelManager::from_settings(&LlmSettings {
            use_groq: true,
            groq_api_key: Some("gsk".to_string()),
            openrouter_api_key: None,
            openrouter_model: "openai/gpt-oss-120b:free".to_string(),
        }))
    }

    fn registry() -> Arc<ToolRegistry> {
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
        Arc::new(ToolRegistry::from_parts(
            Arc::new(McpToolManager::new(Arc::new(client))),
            Arc::new(backend),
            Vec::new(),
        ))
    }

    #[tokio::test]
    async fn test_rate_limit_moves_to_next_model() {
        let client = groq_client();
        let attempts = AtomicUsize::new(0);

        let reply = client
            .with_model_fallback(|manager| {
                let n = attempts.fetch_add(1, Ordering::SeqCst);
                async move {
                    if n < 2 {
                        Err(AppError::RateLimit(format!("429 on {}", manager.current_model())))
                    } else {
                        Ok(format!("answered by {}", manager.current_model()))
                    }
                }
            })
            .await
            .unwrap();

        assert_eq!(reply, "answered by llama-3.1-70b-versatile");
        assert_eq!(client.model_name(), "llama-3.1-70b-versatile");
    }

    #[tokio::test]
    async fn test_rate_limit_on_every_model_returns_last_error() {
        let client = groq_client();
        let attempts = AtomicUsize::new(0);

        let err = client
            .with_model_fallback(|manager| {
                attempts.fetch_add(1, Ordering::SeqCst);
                async move { Err(AppError::RateLimit(manager.current_model().to_string())) }
            })
            .await
            .unwrap_err();

        assert_eq!(attempts.load(Ordering::SeqCst), 4);
        assert_eq!(err.to_string(), "Rate limit exceeded: llama3-70b-8192");
    }

    #[tokio::test]
    async fn test_other_errors_do_not_switch_models() {
        let client = groq_client();
        let err = client
            .with_model_fallback(|_| async { Err(AppError::Llm("invalid request".to_string())) })
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::Llm(_)));
        assert_eq!(client.model_name(), "llama-3.1-8b-instant");
    }

    #[test]
    fn test_concurrent_failures_switch_once() {
        let client = groq_client();
        let failed = client.snapshot().index();
        assert!(client.switch_from(failed));
        assert!(client.switch_from(failed));
        assert_eq!(client.model_name(), "llama3-8b-8192");
    }

    #[tokio::test]
    async fn test_missing_key_is_a_config_error() {
        let manager = ModelManager::from_settings(&LlmSettings {
            use_groq: false,
            groq_api_key: None,
            openrouter_api_key: None,
            openrouter_model: "openai/gpt-oss-120b:free".to_string(),
        });
        let turn = ChatTurn {
            preamble: String::new(),
            history: Vec::new(),
            prompt: "hi".to_string(),
            tools: Vec::new(),
        };
        let err = LlmClient::send(manager, &turn).await.unwrap_err();
        assert_eq!(err.to_string(), "Configuration error: No API key configured for openrouter");
    }

    #[tokio::test]
    async fn test_registry_tool_runs_and_records() {
        let registry = registry();
        let events: EventLog = Arc::new(Mutex::new(Vec::new()));
        let spec = registry.get(CURRENT_DATETIME_TOOL).unwrap().clone();
        let tool = RegistryTool::new(&spec, registry.clone(), ToolContext::default(), events.clone());

        assert_eq!(tool.name(), CURRENT_DATETIME_TOOL);
        assert_eq!(tool.definition(String::new()).await.name, CURRENT_DATETIME_TOOL);

        let result = tool.call(Value::Null).await.unwrap();
        assert!(result["date_vn"].is_string());

        let events = events.lock().unwrap();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].tool.as_deref(), Some(CURRENT_DATETIME_TOOL));
    }

    #[test]
    fn test_error_classification() {
        assert!(classify_error("CompletionError: HTTP 429 Too Many Requests".into()).is_rate_limit());
        assert!(classify_error("Rate limit reached for tokens per minute".into()).is_rate_limit());
        assert!(matches!(classify_error("model not found".into()), AppError::Llm(_)));
    }
}
