//! Service Constants
//!
//! Default endpoints, timeouts and fixed catalogues shared across the agent.
//!
//! ## Tool sources
//!
//! | Source   | Transport                         | Examples                                  |
//! |----------|-----------------------------------|-------------------------------------------|
//! | MCP      | JSON-RPC over HTTP (SSE framing)  | get_price_board, get_company_news         |
//! | Backend  | REST with optional bearer token   | create_transaction, get_user_profile      |
//! | Custom   | computed locally                  | get_current_datetime                      |

/// Default MCP server when neither env nor config file provide one
pub const DEFAULT_MCP_SERVER_URL: &str = "https://mcp-server-vietnam-stock-trading.onrender.com";

/// Default MCP request timeout in seconds (Render free tier cold starts are slow)
pub const DEFAULT_MCP_TIMEOUT_SECS: f64 = 60.0;

/// Default location of the optional MCP config file
pub const DEFAULT_MCP_CONFIG_FILE: &str = "configs/mcp_config.toml";

/// MCP endpoints tried in order for every JSON-RPC request
pub const MCP_ENDPOINTS: &[&str] = &["/mcp", "/"];

/// MCP protocol revision announced in `initialize`
pub const MCP_PROTOCOL_VERSION: &str = "2024-11-05";

/// Client name announced in `initialize`
pub const MCP_CLIENT_NAME: &str = "vnstock-agent";

/// Session header returned by `initialize` and echoed on every later request
pub const MCP_SESSION_HEADER: &str = "mcp-session-id";

/// Attempts for MCP session initialization (exponential backoff 1s, 2s, ...)
pub const MCP_INIT_MAX_RETRIES: u32 = 3;

/// Backend REST timeout in seconds
pub const BACKEND_HTTP_TIMEOUT_SECS: u64 = 30;

/// Market data tools exposed as fallbacks when the MCP server is unreachable
pub const COMMON_MCP_TOOLS: &[&str] = &[
    "get_quote_intraday_price",
    "get_quote_history_price",
    "get_price_board",
    "get_company_overview",
    "get_company_news",
    "get_quote_price_depth",
];

/// Intraday quote tool wrapped with the closing-price fallback
pub const INTRADAY_PRICE_TOOL: &str = "get_quote_intraday_price";

/// Historical quote tool used to fetch the last closing price
pub const HISTORY_PRICE_TOOL: &str = "get_quote_history_price";

/// Price board tool; its `symbols` argument is always a list
pub const PRICE_BOARD_TOOL: &str = "get_price_board";

/// Days of history requested when falling back to the closing price
pub const CLOSING_PRICE_LOOKBACK_DAYS: i64 = 7;

/// Groq models in fallback order
pub const GROQ_MODELS: &[&str] = &[
    "llama-3.1-8b-instant",
    "llama3-8b-8192",
    "llama-3.1-70b-versatile",
    "llama3-70b-8192",
];

/// Wall-clock limit for one agent turn, tool calls included
pub const GROQ_TIMEOUT_SECS: u64 = 120;

pub const DEFAULT_OPENROUTER_MODEL: &str = "openai/gpt-oss-120b:free";
pub const OPENROUTER_TIMEOUT_SECS: u64 = 180;

/// Upper bound on model round-trips per chat turn
pub const MAX_AGENT_STEPS: usize = 8;

/// Messages kept per chat session (user and assistant turns)
pub const MAX_SESSION_MESSAGES: usize = 40;

/// Sessions kept in memory; the least recently used one is evicted past this
pub const MAX_SESSIONS: usize = 1000;

/// Session defaults when the client sends no metadata
pub const DEFAULT_USER_ID: &str = "user-unknown";
pub const DEFAULT_SESSION_ID: &str = "default-session";

/// User id placeholder used by UI effects when none can be extracted
pub const CURRENT_USER_PLACEHOLDER: &str = "current_user";

/// Placeholder reply when the model produced no text
pub const EMPTY_REPLY_PLACEHOLDER: &str =
    "[DEBUG] Agent không trả về text – kiểm tra raw_agent_output.events để debug.";

/// Maximum suggestions returned per reply
pub const MAX_SUGGESTIONS: usize = 3;

/// Market timezone used for trading hours and the date/time tool
pub const MARKET_TIMEZONE: &str = "Asia/Ho_Chi_Minh";

/// Popular tickers used when the VN30 list cannot be fetched
pub const VN30_DEFAULT_SYMBOLS: &[&str] = &[
    "VCB", "VIC", "VHM", "HPG", "MSN", "MWG", "FPT", "VNM", "TCB", "BID", "CTG", "MBB", "VPB",
    "TPB", "ACB", "STB", "HDB", "SSI", "VCI", "GAS", "PLX", "POW", "GVR", "VSH", "VGC", "DXG",
    "VRE", "VHC", "VND", "VJC",
];
