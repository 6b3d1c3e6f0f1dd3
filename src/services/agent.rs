//! Stock market assistant: instruction prompt, per-session history and the
//! tool-calling loop.

use crate::constants::{
    DEFAULT_USER_ID, EMPTY_REPLY_PLACEHOLDER, MAX_SESSIONS, MAX_SESSION_MESSAGES,
    VN30_DEFAULT_SYMBOLS,
};
use crate::error::Result;
use crate::models::ToolContext;
use crate::services::llm_client::{
    assistant_message, user_message, ChatModel, ChatTurn, EventLog, RegistryTool,
};
use crate::services::tool_registry::ToolRegistry;
use async_trait::async_trait;
use rig::completion::Message;
use serde::Serialize;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use tokio::sync::Mutex as TokioMutex;
use tracing::{debug, info, instrument, warn};

pub const AGENT_NAME: &str = "vnstock_agent";

const MCP_UNAVAILABLE_WARNING: &str = "
⚠️  QUAN TRỌNG: MCP SERVER HIỆN KHÔNG KHẢ DỤNG
- MCP tools không thể sử dụng được do MCP server không kết nối được.
- Khi người dùng hỏi về thông tin thị trường (giá cổ phiếu, tin tức, báo cáo tài chính),
  bạn có thể gọi MCP tools, nhưng chúng sẽ trả về error message.
- Khi nhận được error từ MCP tools, bạn PHẢI trả lời cho người dùng:
  'Xin lỗi, hiện tại không thể truy cập dữ liệu thị trường do MCP server không khả dụng.
  Vui lòng thử lại sau hoặc liên hệ quản trị viên.'
- Chỉ có thể sử dụng backend API tools (giao dịch, lịch sử, thống kê) và get_current_datetime.
";

/// System instruction; warns the model when market data tools are down
pub fn build_instruction(mcp_tools_count: usize) -> String {
    let warning = if mcp_tools_count == 0 { MCP_UNAVAILABLE_WARNING } else { "" };
    let vn30 = VN30_DEFAULT_SYMBOLS
        .iter()
        .map(|s| format!("\"{}\"", s))
        .collect::<Vec<_>>()
        .join(", ");

    format!(
        r#"Bạn là một assistant chuyên về thị trường chứng khoán Việt Nam.
{warning}
PHÂN LOẠI TOOLS:

1. MCP TOOLS (ƯU TIÊN CHO THÔNG TIN THỊ TRƯỜNG):
   - LUÔN sử dụng MCP tools để lấy thông tin thị trường, giá cổ phiếu, thông tin công ty
     * Thông tin công ty: get_company_overview, get_company_news, get_company_events, get_company_shareholders, get_company_officers, get_company_ratio_summary
     * Dữ liệu giá: get_quote_history_price, get_quote_intraday_price, get_quote_price_depth, get_price_board
     * Báo cáo tài chính: get_income_statements, get_balance_sheets, get_cash_flows, get_finance_ratios
     * Danh sách mã: get_all_symbol_groups, get_all_symbols_by_group, get_all_symbols
     * Khác: get_gold_price, get_exchange_rate

2. BACKEND API TOOLS (USER ACTIONS VÀ THÔNG TIN CÁ NHÂN):
   - Mua/bán cổ phiếu (create_transaction), hủy giao dịch (cancel_transaction), chi tiết giao dịch (get_transaction_by_id)
   - Lịch sử giao dịch (get_transaction_history), thống kê giao dịch (get_transaction_stats), thông tin tài khoản (get_user_profile), bảng xếp hạng (get_ranking)
   - userId sẽ được tự động lấy từ metadata, không cần user cung cấp trong message
   - KHÔNG BAO GIỜ dùng backend API để lấy thông tin thị trường real-time

QUY TẮC SỬ DỤNG TOOLS:
- Giá cổ phiếu, tin tức, báo cáo tài chính → MCP TOOLS
- Mua/bán → lấy giá hiện tại bằng MCP TOOLS, SAU ĐÓ dùng create_transaction (type="buy" hoặc "sell")
- Thông tin cá nhân, giao dịch của user → BACKEND API TOOLS
- Bảng xếp hạng → get_ranking

THỜI GIAN VÀ DỮ LIỆU:
- Khi người dùng hỏi về ngày/giờ hiện tại, LUÔN gọi `get_current_datetime`
- KHÔNG BAO GIỜ tự đoán ngày tháng hoặc tự tạo dữ liệu
- Nếu tool trả về lỗi, hãy thông báo lỗi rõ ràng cho người dùng
- get_quote_intraday_price TỰ ĐỘNG lấy giá đóng cửa gần nhất nếu ngoài giờ giao dịch (9:00-15:00, thứ 2-6) hoặc có lỗi

CÂU HỎI KHÔNG RÕ RÀNG:
- "Tình hình thị trường", "thị trường hôm nay", "bảng giá" mà không có mã cụ thể:
  → Dùng get_all_symbols_by_group với group="VN30", rồi get_price_board với danh sách đó
  → Nếu thất bại, dùng get_price_board với: [{vn30}]
  → Hiển thị kết quả, SAU ĐÓ hỏi người dùng có muốn xem mã cụ thể nào không
- "Tin tức công ty" hoặc "báo cáo tài chính" mà không có mã: hỏi lại mã cổ phiếu (ví dụ: VCB, VNM, FPT)
- "Tin tức về [MÃ]": get_company_news với symbol đó, page_size=10, page=0

FORMAT RESPONSE:
- LUÔN trả lời bằng một đoạn văn hoàn chỉnh bằng tiếng Việt, KHÔNG ĐƯỢC ĐỂ TRỐNG
- KHÔNG chỉ trả về dữ liệu thô
- Khi thiếu thông tin để đặt lệnh (mã, khối lượng, giá), hướng dẫn người dùng cung cấp đầy đủ"#
    )
}

/// One step of an agent run, exposed as `raw_agent_output.events`
#[derive(Debug, Clone, Serialize)]
pub struct AgentEvent {
    pub author: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub tool_calls: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tool: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct AgentOutput {
    pub reply: String,
    pub events: Vec<AgentEvent>,
}

/// Anything that can answer one chat turn
#[async_trait]
pub trait AgentRunner: Send + Sync {
    async fn run(&self, user_id: &str, session_id: &str, message: &str) -> Result<AgentOutput>;

    fn model_name(&self) -> String;

    fn provider(&self) -> String;
}

type SessionKey = (String, String);

struct Session {
    messages: Vec<Message>,
    last_used: u64,
}

#[derive(Default)]
struct Sessions {
    entries: HashMap<SessionKey, Session>,
    clock: u64,
}

impl Sessions {
    /// Session for `key`, created on first use; evicts the least recently
    /// used session when the store is full
    fn touch(&mut self, key: SessionKey, max_sessions: usize) -> &mut Session {
        self.clock += 1;
        let now = self.clock;

        if !self.entries.contains_key(&key) {
            if self.entries.len() >= max_sessions {
                let oldest = self
                    .entries
                    .iter()
                    .min_by_key(|(_, session)| session.last_used)
                    .map(|(k, _)| k.clone());
                if let Some(oldest) = oldest {
                    debug!(user_id = %oldest.0, session_id = %oldest.1, "Evicting chat session");
                    self.entries.remove(&oldest);
                }
            }
            debug!(user_id = %key.0, session_id = %key.1, "Creating chat session");
        }

        let session = self.entries.entry(key).or_insert_with(|| Session {
            messages: Vec::new(),
            last_used: now,
        });
        session.last_used = now;
        session
    }
}

/// In-memory conversation history per `(user_id, session_id)`
pub struct SessionStore {
    sessions: TokioMutex<Sessions>,
    max_sessions: usize,
}

impl Default for SessionStore {
    fn default() -> Self {
        Self::with_capacity(MAX_SESSIONS)
    }
}

impl SessionStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_capacity(max_sessions: usize) -> Self {
        Self {
            sessions: TokioMutex::new(Sessions::default()),
            max_sessions: max_sessions.max(1),
        }
    }

    /// History of a session, creating it on first use
    pub async fn history(&self, user_id: &str, session_id: &str) -> Vec<Message> {
        let mut sessions = self.sessions.lock().await;
        sessions
            .touch((user_id.to_string(), session_id.to_string()), self.max_sessions)
            .messages
            .clone()
    }

    pub async fn append(&self, user_id: &str, session_id: &str, turn: Vec<Message>) {
        let mut sessions = self.sessions.lock().await;
        let history = &mut sessions
            .touch((user_id.to_string(), session_id.to_string()), self.max_sessions)
            .messages;
        history.extend(turn);
        if history.len() > MAX_SESSION_MESSAGES {
            let excess = history.len() - MAX_SESSION_MESSAGES;
            history.drain(..excess);
        }
    }

    pub async fn len(&self) -> usize {
        self.sessions.lock().await.entries.len()
    }

    pub async fn contains(&self, user_id: &str, session_id: &str) -> bool {
        self.sessions
            .lock()
            .await
            .entries
            .contains_key(&(user_id.to_string(), session_id.to_string()))
    }
}

pub struct LlmAgent {
    model: Arc<dyn ChatModel>,
    tools: Arc<ToolRegistry>,
    sessions: SessionStore,
    instruction: String,
}

impl LlmAgent {
    pub fn new(model: Arc<dyn ChatModel>, tools: Arc<ToolRegistry>) -> Self {
        let instruction = build_instruction(tools.mcp_tool_count());
        info!(
            "{} initialized with model {} and {} tools",
            AGENT_NAME,
            model.model_name(),
            tools.len()
        );
        Self {
            model,
            tools,
            sessions: SessionStore::new(),
            instruction,
        }
    }

    pub fn sessions(&self) -> &SessionStore {
        &self.sessions
    }
}

#[async_trait]
impl AgentRunner for LlmAgent {
    #[instrument(skip(self, message))]
    async fn run(&self, user_id: &str, session_id: &str, message: &str) -> Result<AgentOutput> {
        let history = self.sessions.history(user_id, session_id).await;
        let ctx = ToolContext {
            user_id: (user_id != DEFAULT_USER_ID).then(|| user_id.to_string()),
        };

        let log: EventLog = Arc::new(Mutex::new(Vec::new()));
        let tools = self
            .tools
            .specs()
            .iter()
            .map(|spec| RegistryTool::new(spec, self.tools.clone(), ctx.clone(), log.clone()))
            .collect();

        let text = self
            .model
            .chat(ChatTurn {
                preamble: self.instruction.clone(),
                history,
                prompt: message.to_string(),
                tools,
            })
            .await?;

        let mut events = match log.lock() {
            Ok(mut events) => std::mem::take(&mut *events),
            Err(poisoned) => std::mem::take(&mut *poisoned.into_inner()),
        };
        let mut reply = text.trim().to_string();
        let tool_calls = events.iter().filter_map(|e| e.tool.clone()).collect();
        events.push(AgentEvent {
            author: AGENT_NAME.to_string(),
            text: (!reply.is_empty()).then(|| reply.clone()),
            tool_calls,
            tool: None,
        });

        if reply.is_empty() {
            warn!("Agent returned no text for session {}/{}", user_id, session_id);
            reply = EMPTY_REPLY_PLACEHOLDER.to_string();
        } else {
            self.sessions
                .append(
                    user_id,
                    session_id,
                    vec![user_message(message), assistant_message(reply.clone())],
                )
                .await;
        }

        Ok(AgentOutput { reply, events })
    }

    fn model_name(&self) -> String {
        self.model.model_name()
    }

    fn provider(&self) -> String {
        self.model.provider().as_str().to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{BackendSettings, McpSettings};
    use crate::services::backend::BackendClient;
    use crate::services::mcp_client::McpClient;
    use crate::services::mcp_tools::McpToolManager;
    use crate::services::model_manager::Provider;
    use crate::services::tool_registry::CURRENT_DATETIME_TOOL;
    use rig::tool::Tool;
    use serde_json::json;
    use std::time::Duration;

    /// Replays canned replies, optionally calling one tool first, and records
    /// the history length it was given
    struct ScriptedModel {
        calls_tool: Option<String>,
        replies: Mutex<Vec<String>>,
        seen_history: Mutex<Vec<usize>>,
    }

    impl ScriptedModel {
        fn new(calls_tool: Option<&str>, replies: &[&str]) -> Self {
            let mut replies: Vec<String> = replies.iter().map(|r| r.to_string()).collect();
            replies.reverse();
            Self {
                calls_tool: calls_tool.map(str::to_string),
                replies: Mutex::new(replies),
                seen_history: Mutex::new(Vec::new()),
            }
        }
    }

    #[async_trait]
    impl ChatModel for ScriptedModel {
        async fn chat(&self, turn: ChatTurn) -> Result<String> {
            self.seen_history.lock().unwrap().push(turn.history.len());
            if let Some(name) = &self.calls_tool {
                let tool = turn.tools.iter().find(|t| &t.name() == name).unwrap();
                tool.call(json!({})).await?;
            }
            Ok(self.replies.lock().unwrap().pop().unwrap_or_default())
        }

        fn model_name(&self) -> String {
            "scripted".to_string()
        }

        fn provider(&self) -> Provider {
            Provider::OpenRouter
        }
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

    #[test]
    fn test_instruction_warns_without_mcp() {
        assert!(build_instruction(0).contains("MCP SERVER HIỆN KHÔNG KHẢ DỤNG"));
        assert!(!build_instruction(32).contains("MCP SERVER HIỆN KHÔNG KHẢ DỤNG"));
        assert!(build_instruction(32).contains("\"VCB\""));
    }

    #[tokio::test]
    async fn test_tool_events_and_history() {
        let model = Arc::new(ScriptedModel::new(
            Some(CURRENT_DATETIME_TOOL),
            &["Hôm nay là thứ Hai.", "Không có gì."],
        ));
        let agent = LlmAgent::new(model.clone(), registry());

        let out = agent.run("u1", "s1", "Hôm nay là ngày mấy?").await.unwrap();
        assert_eq!(out.reply, "Hôm nay là thứ Hai.");
        assert_eq!(out.events.len(), 2);
        assert_eq!(out.events[0].tool.as_deref(), Some(CURRENT_DATETIME_TOOL));
        assert_eq!(out.events[1].author, AGENT_NAME);
        assert_eq!(out.events[1].tool_calls, vec![CURRENT_DATETIME_TOOL.to_string()]);

        agent.run("u1", "s1", "Cảm ơn").await.unwrap();
        // The second turn sees the first user/assistant pair
        assert_eq!(*model.seen_history.lock().unwrap(), vec![0, 2]);

        let history = agent.sessions().history("u1", "s1").await;
        assert_eq!(history.len(), 4);
        assert!(matches!(history[0], Message::User { .. }));
        assert!(matches!(history[3], Message::Assistant { .. }));
    }

    #[tokio::test]
    async fn test_empty_reply_placeholder() {
        let agent = LlmAgent::new(Arc::new(ScriptedModel::new(None, &["   "])), registry());
        let out = agent.run(DEFAULT_USER_ID, "s", "hi").await.unwrap();
        assert_eq!(out.reply, EMPTY_REPLY_PLACEHOLDER);
        assert!(out.events[0].text.is_none());
        assert_eq!(agent.sessions().len().await, 1);
        assert!(agent.sessions().history(DEFAULT_USER_ID, "s").await.is_empty());
    }

    #[tokio::test]
    async fn test_session_history_is_capped() {
        let store = SessionStore::new();
        for i in 0..MAX_SESSION_MESSAGES {
            store
                .append("u", "s", vec![user_message(format!("q{}", i)), assistant_message("a")])
                .await;
        }
        let history = store.history("u", "s").await;
        assert_eq!(history.len(), MAX_SESSION_MESSAGES);
        assert!(matches!(history.last(), Some(Message::Assistant { .. })));
    }

    #[tokio::test]
    async fn test_least_recently_used_session_is_evicted() {
        let store = SessionStore::with_capacity(2);
        store.append("u", "a", vec![user_message("1")]).await;
        store.append("u", "b", vec![user_message("2")]).await;

        // Reading "a" makes "b" the oldest
        store.history("u", "a").await;
        store.append("u", "c", vec![user_message("3")]).await;

        assert_eq!(store.len().await, 2);
        assert!(store.contains("u", "a").await);
        assert!(!store.contains("u", "b").await);
        assert!(store.contains("u", "c").await);
    }

    #[tokio::test]
    async fn test_many_distinct_sessions_stay_bounded() {
        let store = SessionStore::with_capacity(10);
        for i in 0..100 {
            store.history(&format!("user-{}", i), "s").await;
        }
        assert_eq!(store.len().await, 10);
        assert!(store.contains("user-99", "s").await);
        assert!(!store.contains("user-0", "s").await);
    }
}
