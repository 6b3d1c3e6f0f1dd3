use crate::models::{FeatureInstruction, Intent};
use serde::{Deserialize, Serialize};
use serde_json::Value;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
    System,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: Role,
    pub content: String,
}

impl ChatMessage {
    pub fn user(content: impl Into<String>) -> Self {
        Self { role: Role::User, content: content.into() }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self { role: Role::Assistant, content: content.into() }
    }
}

fn default_locale() -> Option<String> {
    Some("vi-VN".to_string())
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatMetadata {
    #[serde(default)]
    pub user_id: Option<String>,
    #[serde(default)]
    pub session_id: Option<String>,
    #[serde(default = "default_locale")]
    pub locale: Option<String>,
}

impl Default for ChatMetadata {
    fn default() -> Self {
        Self { user_id: None, session_id: None, locale: default_locale() }
    }
}

/// POST /chat request body
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ChatRequest {
    pub messages: Vec<ChatMessage>,
    #[serde(default)]
    pub meta: Option<ChatMetadata>,
}

/// Follow-up prompt the client can render as a button
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SuggestionMessage {
    pub text: String,
    /// `query:<text>`, `buy:<SYM>`, `confirm:buy:<SYM>`, `help`, ...
    pub action: String,
    pub icon: String,
}

impl SuggestionMessage {
    pub fn new(text: impl Into<String>, action: impl Into<String>, icon: &str) -> Self {
        Self { text: text.into(), action: action.into(), icon: icon.to_string() }
    }
}

/// POST /chat response body
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatResponse {
    pub reply: String,
    #[serde(default)]
    pub ui_effects: Vec<FeatureInstruction>,
    #[serde(default)]
    pub suggestions: Vec<SuggestionMessage>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub intent: Option<Intent>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub raw_agent_output: Option<Value>,
}
