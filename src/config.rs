//! Runtime settings loaded from `.env`, the environment and an optional TOML file.
//!
//! Precedence for every key is: environment variable > config file > default.

use crate::constants::{
    DEFAULT_MCP_CONFIG_FILE, DEFAULT_MCP_SERVER_URL, DEFAULT_MCP_TIMEOUT_SECS,
    DEFAULT_OPENROUTER_MODEL,
};
use crate::error::Result;
use crate::utils::{get_env, get_env_bool};
use serde::Deserialize;
use std::path::Path;
use std::time::Duration;
use tracing::warn;

/// `[mcp_server]` table of the MCP config file
#[derive(Debug, Clone, Default, Deserialize)]
pub struct McpFileSection {
    pub url: Option<String>,
    pub timeout: Option<f64>,
}

/// Optional on-disk MCP configuration
#[derive(Debug, Clone, Default, Deserialize)]
pub struct McpFileConfig {
    #[serde(default)]
    pub mcp_server: McpFileSection,
}

impl McpFileConfig {
    /// Load from a TOML file; a missing file yields the empty config
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        if !path.exists() {
            return Ok(Self::default());
        }
        let content = std::fs::read_to_string(path)?;
        let config: McpFileConfig = toml::from_str(&content)?;
        Ok(config)
    }
}

#[derive(Debug, Clone)]
pub struct McpSettings {
    pub server_url: String,
    pub timeout: Duration,
}

impl McpSettings {
    /// Environment values win over the file section, which wins over defaults
    pub fn resolve(env_url: Option<String>, env_timeout: Option<String>, file: McpFileSection) -> Self {
        let server_url = env_url
            .or(file.url)
            .unwrap_or_else(|| DEFAULT_MCP_SERVER_URL.to_string());

        let from_env = env_timeout.and_then(|v| {
            let timeout = v.trim().parse::<f64>().ok().and_then(timeout_from_secs);
            if timeout.is_none() {
                warn!("Invalid MCP_TIMEOUT '{}', ignoring", v);
            }
            timeout
        });
        let timeout = from_env
            .or_else(|| {
                let secs = file.timeout?;
                let timeout = timeout_from_secs(secs);
                if timeout.is_none() {
                    warn!("Invalid mcp_server.timeout {}, ignoring", secs);
                }
                timeout
            })
            .unwrap_or_else(|| Duration::from_secs_f64(DEFAULT_MCP_TIMEOUT_SECS));

        Self {
            server_url: server_url.trim_end_matches('/').to_string(),
            timeout,
        }
    }
}

/// Positive, finite and representable as a `Duration`
fn timeout_from_secs(secs: f64) -> Option<Duration> {
    if !secs.is_finite() || secs <= 0.0 {
        return None;
    }
    Duration::try_from_secs_f64(secs).ok()
}

/// Route prefix with one leading slash and no trailing slash; empty stays empty
pub fn normalize_prefix(raw: &str) -> String {
    let trimmed = raw.trim().trim_matches('/');
    if trimmed.is_empty() {
        String::new()
    } else {
        format!("/{}", trimmed)
    }
}

#[derive(Debug, Clone)]
pub struct BackendSettings {
    /// Base URL of the trading backend; `None` disables backend tools
    pub base_url: Option<String>,
    /// Static bearer token for protected endpoints
    pub token: Option<String>,
    pub verify_ssl: bool,
}

#[derive(Debug, Clone)]
pub struct LlmSettings {
    pub use_groq: bool,
    pub groq_api_key: Option<String>,
    pub openrouter_api_key: Option<String>,
    pub openrouter_model: String,
}

#[derive(Debug, Clone)]
pub struct Settings {
    pub project_name: String,
    pub api_v1_prefix: String,
    pub port: u16,
    pub cors_origins: Vec<String>,
    pub mcp: McpSettings,
    pub backend: BackendSettings,
    pub llm: LlmSettings,
}

impl Settings {
    /// Build settings from `.env`, process environment and the MCP config file
    pub fn from_env() -> Self {
        dotenvy::dotenv().ok();

        let config_path = get_env("MCP_CONFIG_FILE").unwrap_or_else(|| DEFAULT_MCP_CONFIG_FILE.to_string());
        let file_config = match McpFileConfig::load(&config_path) {
            Ok(config) => config,
            Err(e) => {
                warn!("Failed to load config from {}: {}", config_path, e);
                McpFileConfig::default()
            }
        };

        Self::from_parts(file_config)
    }

    /// Resolve settings from the environment on top of an already-loaded file config
    pub fn from_parts(file_config: McpFileConfig) -> Self {
        let mcp = McpSettings::resolve(
            get_env("MCP_SERVER_URL"),
            get_env("MCP_TIMEOUT"),
            file_config.mcp_server,
        );

        let port = get_env("PORT").and_then(|p| p.parse().ok()).unwrap_or(8000);

        Self {
            project_name: get_env("PROJECT_NAME").unwrap_or_else(|| "Trading Chatbot Backend".to_string()),
            api_v1_prefix: normalize_prefix(&get_env("API_V1_PREFIX").unwrap_or_else(|| "/api/v1".to_string())),
            port,
            cors_origins: parse_cors_origins(&std::env::var("BACKEND_CORS_ORIGINS").unwrap_or_default()),
            mcp,
            backend: BackendSettings {
                base_url: get_env("BE_API"),
                token: get_env("BE_API_TOKEN"),
                verify_ssl: get_env_bool("BE_API_VERIFY_SSL", true),
            },
            llm: LlmSettings {
                use_groq: get_env_bool("USE_GROQ", true),
                groq_api_key: get_env("GROQ_API_KEY"),
                openrouter_api_key: get_env("OPENROUTER_API_KEY"),
                openrouter_model: get_env("OPENROUTER_MODEL")
                    .map(|m| m.trim_start_matches("openrouter/").to_string())
                    .unwrap_or_else(|| DEFAULT_OPENROUTER_MODEL.to_string()),
            },
        }
    }
}

/// Parse CORS origins from a plain string, comma list or JSON array
///
/// Examples:
/// - `""` -> `["*"]`
/// - `"https://a.com"` -> `["https://a.com"]`
/// - `"https://a.com, https://b.com"` -> both entries
/// - `"[\"https://a.com\",\"https://b.com\"]"` -> both entries
pub fn parse_cors_origins(raw: &str) -> Vec<String> {
    let raw = raw.trim();
    if raw.is_empty() {
        return vec!["*".to_string()];
    }

    if raw.starts_with('[') {
        if let Ok(value) = serde_json::from_str::<serde_json::Value>(raw) {
            let origins: Vec<String> = match value {
                serde_json::Value::Array(items) => items
                    .into_iter()
                    .map(|item| match item {
                        serde_json::Value::String(s) => s,
                        other => other.to_string(),
                    })
                    .collect(),
                serde_json::Value::String(s) => vec![s],
                other => vec![other.to_string()],
            };
            return origins;
        }
    }

    let origins: Vec<String> = raw
        .split(',')
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .collect();

    if origins.is_empty() {
        vec!["*".to_string()]
    } else {
        origins
    }
}
