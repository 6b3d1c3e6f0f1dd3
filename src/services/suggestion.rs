//! Follow-up suggestions shown under an assistant reply.

use crate::constants::MAX_SUGGESTIONS;
use crate::models::{ChatMessage, FeatureInstruction, Intent, SuggestionMessage};
use once_cell::sync::Lazy;
use regex::Regex;
use std::collections::HashSet;

static SYMBOLS_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"\b([A-Z]{3,4})\b").unwrap());

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum FlowKind {
    Buy,
    Sell,
    Confirm,
}

/// Order flow the conversation is in the middle of
#[derive(Debug, Clone, PartialEq, Eq)]
struct FlowState {
    kind: FlowKind,
    symbol: Option<String>,
}

fn contains_any(text: &str, keywords: &[&str]) -> bool {
    keywords.iter().any(|kw| text.contains(kw))
}

fn symbols(text: &str) -> Vec<String> {
    SYMBOLS_RE.captures_iter(text).map(|c| c[1].to_string()).collect()
}

pub fn default_suggestions() -> Vec<SuggestionMessage> {
    vec![
        SuggestionMessage::new("Xem tổng quan thị trường", "query:tổng quan thị trường", "🌐"),
        SuggestionMessage::new("Giá cổ phiếu VCB hôm nay?", "query:Giá VCB hôm nay", "💹"),
        SuggestionMessage::new("Tìm hiểu thêm", "help", "❓"),
    ]
}

fn detect_flow_state(
    history: &[ChatMessage],
    reply: &str,
    ui_effects: &[FeatureInstruction],
) -> Option<FlowState> {
    if history.is_empty() {
        return None;
    }

    for effect in ui_effects {
        let kind = match effect {
            FeatureInstruction::OpenBuyStock(_) => FlowKind::Buy,
            FeatureInstruction::OpenSellStock(_) => FlowKind::Sell,
            FeatureInstruction::ConfirmTransaction(_) => FlowKind::Confirm,
            _ => continue,
        };
        return Some(FlowState { kind, symbol: effect.symbol().map(str::to_string) });
    }

    // Latest message that talks about buying or selling
    let mut flow: Option<FlowState> = None;
    for msg in history.iter().rev() {
        let content = msg.content.to_lowercase();
        let kind = if content.contains("mua") || content.contains("buy") {
            FlowKind::Buy
        } else if content.contains("bán") || content.contains("sell") {
            FlowKind::Sell
        } else {
            continue;
        };
        flow = Some(FlowState { kind, symbol: symbols(&msg.content).into_iter().next() });
        break;
    }

    let reply_lower = reply.to_lowercase();
    if let Some(state) = &flow {
        if contains_any(&reply_lower, &["hướng dẫn", "điền", "chọn", "khối lượng", "giá đặt lệnh"]) {
            return Some(state.clone());
        }
    }

    if contains_any(&reply_lower, &["đã xác nhận", "giao dịch thành công", "transaction", "lệnh đã được"]) {
        return Some(FlowState {
            kind: FlowKind::Confirm,
            symbol: flow.and_then(|f| f.symbol),
        });
    }

    None
}

fn flow_suggestions(state: &FlowState, symbol: Option<&str>) -> Vec<SuggestionMessage> {
    let symbol = state.symbol.as_deref().or(symbol);

    let (verb, side) = match state.kind {
        FlowKind::Buy => ("mua", "buy"),
        FlowKind::Sell => ("bán", "sell"),
        FlowKind::Confirm => {
            let mut out = vec![
                SuggestionMessage::new("Xem lịch sử giao dịch", "query:lịch sử giao dịch", "📋"),
                SuggestionMessage::new("Xem thông tin tài khoản", "query:thông tin tài khoản", "👤"),
            ];
            if let Some(s) = symbol {
                out.push(SuggestionMessage::new(
                    format!("Xem chi tiết {}", s),
                    format!("query:chi tiết {}", s),
                    "📊",
                ));
            }
            return out;
        }
    };

    match symbol {
        Some(s) => vec![
            SuggestionMessage::new(
                format!("Xác nhận {} {}", verb, s),
                format!("confirm:{}:{}", side, s),
                "✅",
            ),
            SuggestionMessage::new(format!("Hủy {} {}", verb, s), format!("cancel:{}:{}", side, s), "❌"),
        ],
        None => vec![SuggestionMessage::new(
            format!("Xác nhận {}", verb),
            format!("confirm:{}", side),
            "✅",
        )],
    }
}

/// Up to three follow-ups drawn from the reply, the query and the order flow state
pub fn generate_suggestions(
    reply: &str,
    query: &str,
    intent: Option<Intent>,
    history: &[ChatMessage],
    ui_effects: &[FeatureInstruction],
) -> Vec<SuggestionMessage> {
    let query_lower = query.to_lowercase();
    let reply_lower = if reply.contains("[DEBUG]") || reply.trim().chars().count() < 10 {
        query_lower.clone()
    } else {
        reply.to_lowercase()
    };

    let flow_state = detect_flow_state(history, reply, ui_effects);

    // Query symbols first, then reply symbols, de-duplicated
    let mut all_symbols: Vec<String> = Vec::new();
    for s in symbols(query).into_iter().chain(symbols(reply)) {
        if !all_symbols.contains(&s) {
            all_symbols.push(s);
        }
    }
    let primary = all_symbols.first().map(String::as_str);

    let reply_has_price = contains_any(&reply_lower, &["giá", "price", "vnđ", "đồng"]);
    let reply_has_current_price =
        contains_any(&reply_lower, &["giá hiện tại", "giá hôm nay", "current price", "giá đóng cửa"]);
    let reply_has_news = contains_any(&reply_lower, &["tin tức", "news", "sự kiện"]);
    let reply_has_market_overview =
        contains_any(&reply_lower, &["tổng quan", "market overview", "thị trường", "vn-index"]);
    let reply_has_transaction = contains_any(&reply_lower, &["giao dịch", "transaction", "mua", "bán"]);
    let query_has_price = contains_any(&query_lower, &["giá", "price"]);
    let query_has_buy_sell = contains_any(&query_lower, &["mua", "bán", "buy", "sell"]);
    let price_context = query_has_price || intent == Some(Intent::PriceQuery);

    let mut suggestions = Vec::new();

    if reply_has_current_price {
        suggestions.push(match primary {
            Some(s) => SuggestionMessage::new(
                format!("Xem lịch sử giá {} 1 tháng qua", s),
                format!("query:lịch sử giá {}", s),
                "📊",
            ),
            None => SuggestionMessage::new("Xem lịch sử giá 1 tháng qua", "query:lịch sử giá", "📊"),
        });
    }

    if let (1, Some(s)) = (all_symbols.len(), primary) {
        if price_context {
            suggestions.push(SuggestionMessage::new(
                format!("So sánh {} với mã khác", s),
                format!("query:so sánh {}", s),
                "🔍",
            ));
        }
    }

    if let Some(s) = primary {
        if price_context {
            suggestions.push(SuggestionMessage::new(
                format!("Xem báo cáo tài chính {}", s),
                format!("query:báo cáo tài chính {}", s),
                "📈",
            ));
        }

        if reply_has_price
            && !query_has_buy_sell
            && !matches!(intent, Some(Intent::BuyStock) | Some(Intent::SellStock))
        {
            suggestions.push(SuggestionMessage::new(format!("Mua {}", s), format!("buy:{}", s), "💰"));
            suggestions.push(SuggestionMessage::new(format!("Bán {}", s), format!("sell:{}", s), "💸"));
        }

        if reply_has_news || intent == Some(Intent::ViewNews) {
            suggestions.push(SuggestionMessage::new(
                format!("Xem tin tức {}", s),
                format!("query:tin tức {}", s),
                "📰",
            ));
        }

        if price_context && intent != Some(Intent::StockDetail) {
            suggestions.push(SuggestionMessage::new(
                format!("Xem chi tiết {}", s),
                format!("query:chi tiết {}", s),
                "📋",
            ));
        }

        if intent != Some(Intent::MarketOverview) {
            suggestions.push(SuggestionMessage::new(
                "Xem tổng quan thị trường",
                "query:tổng quan thị trường",
                "🌐",
            ));
        }
    }

    if !intent.map_or(false, |i| i.is_account()) {
        suggestions.push(SuggestionMessage::new("Xem thông tin tài khoản", "query:thông tin tài khoản", "👤"));
    }

    if intent != Some(Intent::TransactionHistory) && !reply_has_transaction {
        suggestions.push(SuggestionMessage::new("Xem lịch sử giao dịch", "query:lịch sử giao dịch", "📋"));
    }

    if intent != Some(Intent::Ranking) {
        suggestions.push(SuggestionMessage::new("Xem bảng xếp hạng", "query:bảng xếp hạng", "🏆"));
    }

    if intent == Some(Intent::MarketOverview) || reply_has_market_overview {
        let s = primary.unwrap_or("VCB");
        suggestions.push(SuggestionMessage::new(
            format!("Giá cổ phiếu {} hôm nay?", s),
            format!("query:Giá {} hôm nay", s),
            "💹",
        ));
    }

    if let Some(state) = &flow_state {
        let mut flow = flow_suggestions(state, primary);
        flow.extend(suggestions);
        suggestions = flow;
    }

    let mut seen = HashSet::new();
    let mut unique: Vec<SuggestionMessage> = suggestions
        .into_iter()
        .filter(|s| seen.insert(s.text.clone()))
        .collect();

    if unique.is_empty() {
        unique = default_suggestions().into_iter().take(1).collect();
    } else if unique.len() < MAX_SUGGESTIONS {
        for default in default_suggestions() {
            if unique.len() >= MAX_SUGGESTIONS {
                break;
            }
            if !seen.contains(&default.text) {
                unique.push(default);
            }
        }
    }

    unique.truncate(MAX_SUGGESTIONS);
    unique
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::ui::{default_order_steps, BuyStockData};

    fn texts(s: &[SuggestionMessage]) -> Vec<&str> {
        s.iter().map(|m| m.text.as_str()).collect()
    }

    #[test]
    fn test_price_reply_suggestions() {
        let out = generate_suggestions(
            "Giá hiện tại của VCB là 95,000 VNĐ",
            "Giá VCB hôm nay?",
            Some(Intent::PriceQuery),
            &[],
            &[],
        );
        assert_eq!(
            texts(&out),
            vec!["Xem lịch sử giá VCB 1 tháng qua", "So sánh VCB với mã khác", "Xem báo cáo tài chính VCB"]
        );
        assert_eq!(out[0].action, "query:lịch sử giá VCB");
        assert_eq!(out[0].icon, "📊");
    }

    #[test]
    fn test_buy_flow_suggestions_first() {
        let history = vec![ChatMessage::user("Mình muốn mua MWG")];
        let effects = vec![FeatureInstruction::OpenBuyStock(BuyStockData {
            symbol: "MWG".to_string(),
            current_price: 0.0,
            steps: default_order_steps(),
        })];
        let out = generate_suggestions(
            "Tôi sẽ hướng dẫn bạn mua cổ phiếu MWG.",
            "Mình muốn mua MWG",
            Some(Intent::BuyStock),
            &history,
            &effects,
        );
        assert_eq!(out[0].action, "confirm:buy:MWG");
        assert_eq!(out[1].action, "cancel:buy:MWG");
        assert_eq!(out.len(), 3);
    }

    #[test]
    fn test_sell_flow_from_history() {
        let history = vec![
            ChatMessage::user("Tôi muốn bán HPG"),
            ChatMessage::assistant("Bạn muốn bao nhiêu cổ phiếu?"),
        ];
        let out = generate_suggestions("Vui lòng chọn khối lượng.", "100 cổ", None, &history, &[]);
        assert_eq!(out[0].text, "Xác nhận bán HPG");
        assert_eq!(out[1].text, "Hủy bán HPG");
    }

    #[test]
    fn test_confirmation_flow() {
        let history = vec![ChatMessage::user("mua 100 FPT giá 120000")];
        let out = generate_suggestions("Giao dịch thành công!", "ok", None, &history, &[]);
        assert_eq!(texts(&out), vec!["Xem lịch sử giao dịch", "Xem thông tin tài khoản", "Xem chi tiết FPT"]);
    }

    #[test]
    fn test_debug_reply_and_defaults_padding() {
        let out = generate_suggestions(
            "[DEBUG] Agent không trả về text",
            "xem bảng xếp hạng",
            Some(Intent::Ranking),
            &[],
            &[],
        );
        // account + history, then padded with the first default
        assert_eq!(
            texts(&out),
            vec!["Xem thông tin tài khoản", "Xem lịch sử giao dịch", "Xem tổng quan thị trường"]
        );
    }

    #[test]
    fn test_never_more_than_three() {
        let out = generate_suggestions(
            "Tổng quan thị trường: giá hiện tại VCB, tin tức FPT",
            "giá VCB và tin tức FPT",
            None,
            &[],
            &[],
        );
        assert_eq!(out.len(), MAX_SUGGESTIONS);
        let unique: HashSet<_> = out.iter().map(|s| &s.text).collect();
        assert_eq!(unique.len(), out.len());
    }
}
