use rig::completion::ToolDefinition;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

/// Where a tool is served from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ToolSource {
    /// Market data from the MCP server
    Mcp,
    /// Placeholder for an MCP tool while the server is unreachable
    Fallback,
    /// Trading backend REST API
    Backend,
    /// Computed locally
    Custom,
}

impl ToolSource {
    pub fn as_str(&self) -> &'static str {
        match self {
            ToolSource::Mcp => "mcp",
            ToolSource::Fallback => "fallback",
            ToolSource::Backend => "backend",
            ToolSource::Custom => "custom",
        }
    }
}

/// Tool definition advertised to the model
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolSpec {
    pub name: String,
    pub description: String,
    /// JSON schema of the arguments object
    pub parameters: Value,
    pub source: ToolSource,
}

impl ToolSpec {
    pub fn new(name: &str, description: &str, parameters: Value, source: ToolSource) -> Self {
        Self {
            name: name.to_string(),
            description: description.to_string(),
            parameters,
            source,
        }
    }

    /// Schema `properties` object (empty when absent)
    pub fn properties(&self) -> serde_json::Map<String, Value> {
        self.parameters
            .get("properties")
            .and_then(|p| p.as_object())
            .cloned()
            .unwrap_or_default()
    }

    /// Definition handed to the model; a non-object schema becomes an empty one
    pub fn to_tool_definition(&self) -> ToolDefinition {
        let parameters = if self.parameters.is_object() {
            self.parameters.clone()
        } else {
            json!({"type": "object", "properties": {}})
        };
        ToolDefinition {
            name: self.name.clone(),
            description: self.description.clone(),
            parameters,
        }
    }
}

/// Per-request context available to tools
#[derive(Debug, Clone, Default)]
pub struct ToolContext {
    /// Authenticated user from chat metadata; injected as `userId` when omitted
    pub user_id: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tool_definition_shape() {
        let spec = ToolSpec::new(
            "get_ranking",
            "Leaderboard",
            json!({"type": "object", "properties": {}}),
            ToolSource::Backend,
        );
        let def = spec.to_tool_definition();
        assert_eq!(def.name, "get_ranking");
        assert_eq!(def.description, "Leaderboard");
        assert_eq!(def.parameters["type"], "object");
    }

    #[test]
    fn test_non_object_schema_is_replaced() {
        let spec = ToolSpec::new("x", "", Value::Null, ToolSource::Mcp);
        assert_eq!(spec.to_tool_definition().parameters["type"], "object");
        assert!(spec.properties().is_empty());
    }
}
