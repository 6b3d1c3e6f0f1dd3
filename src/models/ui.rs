//! UI instructions returned alongside the chat reply.
//!
//! Mirrors the web client's `FeatureInstruction` union: every instruction is a
//! JSON object with a `type` tag and, for most variants, a camelCase `payload`.

use serde::{Deserialize, Serialize};
use serde_json::Value;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BuyFlowStep {
    pub id: String,
    pub title: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

impl BuyFlowStep {
    pub fn new(id: &str, title: &str) -> Self {
        Self { id: id.to_string(), title: title.to_string(), description: None }
    }
}

/// Default order form steps shown for buy and sell flows
pub fn default_order_steps() -> Vec<BuyFlowStep> {
    vec![
        BuyFlowStep::new("choose_volume", "Chọn khối lượng"),
        BuyFlowStep::new("choose_price", "Chọn giá đặt lệnh"),
        BuyFlowStep::new("confirm", "Xác nhận lệnh"),
    ]
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Sentiment {
    Positive,
    Negative,
    Neutral,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewsItem {
    pub id: String,
    pub title: String,
    pub source: String,
    pub time_ago: String,
    pub sentiment: Sentiment,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewsData {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub symbol: Option<String>,
    pub items: Vec<NewsItem>,
}

/// Stock detail panel; only the symbol is known when detected from text
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StockDetailData {
    pub symbol: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub price: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub change_percent: Option<f64>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub intraday_chart: Vec<Value>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BuyStockData {
    pub symbol: String,
    pub current_price: f64,
    pub steps: Vec<BuyFlowStep>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SellStockData {
    pub symbol: String,
    pub current_price: f64,
    /// Shares the user currently holds
    pub available_quantity: f64,
    pub steps: Vec<BuyFlowStep>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TradeSide {
    Buy,
    Sell,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TransactionData {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub transaction_id: Option<String>,
    pub symbol: String,
    #[serde(rename = "type")]
    pub side: TradeSide,
    pub quantity: f64,
    pub price: f64,
    pub total_amount: f64,
    pub user_id: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserProfileData {
    pub user_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub full_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub balance: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub avatar: Option<String>,
}

impl UserProfileData {
    pub fn for_user(user_id: impl Into<String>) -> Self {
        Self { user_id: user_id.into(), full_name: None, email: None, balance: None, avatar: None }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TransactionHistoryData {
    pub user_id: String,
    #[serde(default)]
    pub transactions: Vec<Value>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TransactionStatsData {
    pub user_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub total_profit: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub total_transactions: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub win_rate: Option<f64>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RankingData {
    #[serde(default)]
    pub rankings: Vec<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_rank: Option<u32>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "payload", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum FeatureInstruction {
    ShowMarketOverview,
    OpenBuyStock(BuyStockData),
    OpenSellStock(SellStockData),
    OpenNews(NewsData),
    OpenStockDetail(StockDetailData),
    ConfirmTransaction(TransactionData),
    ShowUserProfile(UserProfileData),
    ShowTransactionHistory(TransactionHistoryData),
    ShowTransactionStats(TransactionStatsData),
    ShowRanking(RankingData),
}

impl FeatureInstruction {
    /// Wire tag of this instruction
    pub fn type_name(&self) -> &'static str {
        match self {
            FeatureInstruction::ShowMarketOverview => "SHOW_MARKET_OVERVIEW",
            FeatureInstruction::OpenBuyStock(_) => "OPEN_BUY_STOCK",
            FeatureInstruction::OpenSellStock(_) => "OPEN_SELL_STOCK",
            FeatureInstruction::OpenNews(_) => "OPEN_NEWS",
            FeatureInstruction::OpenStockDetail(_) => "OPEN_STOCK_DETAIL",
            FeatureInstruction::ConfirmTransaction(_) => "CONFIRM_TRANSACTION",
            FeatureInstruction::ShowUserProfile(_) => "SHOW_USER_PROFILE",
            FeatureInstruction::ShowTransactionHistory(_) => "SHOW_TRANSACTION_HISTORY",
            FeatureInstruction::ShowTransactionStats(_) => "SHOW_TRANSACTION_STATS",
            FeatureInstruction::ShowRanking(_) => "SHOW_RANKING",
        }
    }

    /// Ticker carried by the payload, if any
    pub fn symbol(&self) -> Option<&str> {
        match self {
            FeatureInstruction::OpenBuyStock(data) => Some(&data.symbol),
            FeatureInstruction::OpenSellStock(data) => Some(&data.symbol),
            FeatureInstruction::OpenStockDetail(data) => Some(&data.symbol),
            FeatureInstruction::ConfirmTransaction(data) => Some(&data.symbol),
            FeatureInstruction::OpenNews(data) => data.symbol.as_deref(),
            _ => None,
        }
    }
}
