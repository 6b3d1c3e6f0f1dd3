//! Keyword rules that turn a chat turn into UI instructions and an intent.

use crate::constants::CURRENT_USER_PLACEHOLDER;
use crate::models::ui::{
    default_order_steps, BuyStockData, RankingData, SellStockData, StockDetailData,
    TransactionHistoryData, TransactionStatsData, UserProfileData,
};
use crate::models::{FeatureInstruction, Intent};
use once_cell::sync::Lazy;
use regex::Regex;

static SYMBOL_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"\b([A-Z]{3,4})\b").unwrap());
static OBJECT_ID_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"\b([0-9a-fA-F]{24})\b").unwrap());
static USER_ID_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)(?:user[_-]?id|user)[:=\s]+([a-zA-Z0-9_-]+)").unwrap());

const MARKET_KEYWORDS: &[&str] = &["tổng quan", "market overview", "thị trường chung", "vnindex"];
const BUY_KEYWORDS: &[&str] = &["mua", "buy", "đặt lệnh mua", "order buy"];
const SELL_KEYWORDS: &[&str] = &["bán", "sell", "đặt lệnh bán", "order sell"];
const PROFILE_KEYWORDS: &[&str] = &["thông tin tài khoản", "profile", "tài khoản", "số dư", "balance"];
const HISTORY_KEYWORDS: &[&str] = &["lịch sử giao dịch", "transaction history", "giao dịch", "lệnh đã đặt"];
const STATS_KEYWORDS: &[&str] = &["thống kê", "statistics", "lợi nhuận", "profit", "tỷ lệ thắng", "win rate"];
const RANKING_KEYWORDS: &[&str] = &["bảng xếp hạng", "ranking", "top", "xếp hạng"];
const DETAIL_KEYWORDS: &[&str] = &["chi tiết", "detail", "thông tin", "báo cáo", "phân tích"];

fn contains_any(text: &str, keywords: &[&str]) -> bool {
    keywords.iter().any(|kw| text.contains(kw))
}

/// First 3-4 letter upper-case ticker in the text
pub fn extract_symbol(text: &str) -> Option<String> {
    SYMBOL_RE.captures(text).map(|c| c[1].to_string())
}

/// A 24-hex ObjectId, else the id after `user`, `userId`, `user_id` or `user-id`
pub fn extract_user_id(text: &str) -> Option<String> {
    if let Some(c) = OBJECT_ID_RE.captures(text) {
        return Some(c[1].to_string());
    }
    USER_ID_RE.captures(text).map(|c| c[1].to_string())
}

/// UI instructions implied by the user's query and the assistant's reply
pub fn parse_ui_effects(reply: &str, query: &str) -> Vec<FeatureInstruction> {
    let mut effects = Vec::new();
    let reply_lower = reply.to_lowercase();
    let query_lower = query.to_lowercase();

    if contains_any(&query_lower, MARKET_KEYWORDS) || contains_any(&reply_lower, MARKET_KEYWORDS) {
        effects.push(FeatureInstruction::ShowMarketOverview);
    }

    if contains_any(&query_lower, BUY_KEYWORDS) {
        if let Some(symbol) = extract_symbol(reply).or_else(|| extract_symbol(query)) {
            effects.push(FeatureInstruction::OpenBuyStock(BuyStockData {
                symbol,
                current_price: 0.0,
                steps: default_order_steps(),
            }));
        }
    }

    if contains_any(&query_lower, SELL_KEYWORDS) {
        if let Some(symbol) = extract_symbol(reply).or_else(|| extract_symbol(query)) {
            effects.push(FeatureInstruction::OpenSellStock(SellStockData {
                symbol,
                current_price: 0.0,
                available_quantity: 0.0,
                steps: default_order_steps(),
            }));
        }
    }

    let user_id = || extract_user_id(query).unwrap_or_else(|| CURRENT_USER_PLACEHOLDER.to_string());

    if contains_any(&query_lower, PROFILE_KEYWORDS) {
        effects.push(FeatureInstruction::ShowUserProfile(UserProfileData::for_user(user_id())));
    }

    if contains_any(&query_lower, HISTORY_KEYWORDS) {
        effects.push(FeatureInstruction::ShowTransactionHistory(TransactionHistoryData {
            user_id: user_id(),
            transactions: Vec::new(),
        }));
    }

    if contains_any(&query_lower, STATS_KEYWORDS) {
        effects.push(FeatureInstruction::ShowTransactionStats(TransactionStatsData {
            user_id: user_id(),
            total_profit: None,
            total_transactions: None,
            win_rate: None,
        }));
    }

    if contains_any(&query_lower, RANKING_KEYWORDS) {
        effects.push(FeatureInstruction::ShowRanking(RankingData::default()));
    }

    if let Some(symbol) = extract_symbol(query) {
        if contains_any(&query_lower, DETAIL_KEYWORDS) {
            effects.push(FeatureInstruction::OpenStockDetail(StockDetailData {
                symbol,
                name: None,
                description: None,
                price: None,
                change_percent: None,
                intraday_chart: Vec::new(),
            }));
        }
    }

    effects
}

/// Ordered keyword rules over the query; the first match wins
pub fn extract_intent(_reply: &str, query: &str) -> Option<Intent> {
    let q = query.to_lowercase();
    let rules: &[(&[&str], Intent)] = &[
        (&["tổng quan", "market overview", "vnindex"], Intent::MarketOverview),
        (&["mua", "buy", "đặt lệnh mua"], Intent::BuyStock),
        (&["bán", "sell", "đặt lệnh bán"], Intent::SellStock),
        (&["thông tin tài khoản", "profile", "tài khoản", "số dư"], Intent::UserProfile),
        (&["lịch sử giao dịch", "transaction history", "giao dịch"], Intent::TransactionHistory),
        (&["thống kê", "statistics", "lợi nhuận", "profit"], Intent::TransactionStats),
        (&["bảng xếp hạng", "ranking", "top"], Intent::Ranking),
        (&["chi tiết", "detail", "thông tin chi tiết"], Intent::StockDetail),
        (&["tin tức", "news", "sự kiện"], Intent::ViewNews),
        (&["giá", "price"], Intent::PriceQuery),
    ];

    rules
        .iter()
        .find(|(keywords, _)| contains_any(&q, keywords))
        .map(|(_, intent)| *intent)
}
