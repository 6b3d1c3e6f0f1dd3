//! User intent detected from a chat turn
//!
//! Drives suggestion generation and is echoed back to the web client.

use serde::{Deserialize, Serialize};
use std::str::FromStr;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Intent {
    MarketOverview,
    BuyStock,
    SellStock,
    UserProfile,
    TransactionHistory,
    TransactionStats,
    Ranking,
    StockDetail,
    ViewNews,
    PriceQuery,
}

impl FromStr for Intent {
    type Err = String;

    /// Case-insensitive parse of the snake_case name
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "market_overview" => Ok(Intent::MarketOverview),
            "buy_stock" => Ok(Intent::BuyStock),
            "sell_stock" => Ok(Intent::SellStock),
            "user_profile" => Ok(Intent::UserProfile),
            "transaction_history" => Ok(Intent::TransactionHistory),
            "transaction_stats" => Ok(Intent::TransactionStats),
            "ranking" => Ok(Intent::Ranking),
            "stock_detail" => Ok(Intent::StockDetail),
            "view_news" => Ok(Intent::ViewNews),
            "price_query" => Ok(Intent::PriceQuery),
            _ => Err(format!("Invalid intent: '{}'", s)),
        }
    }
}

impl Intent {
    /// Convert to string representation
    pub fn as_str(&self) -> &'static str {
        match self {
            Intent::MarketOverview => "market_overview",
            Intent::BuyStock => "buy_stock",
            Intent::SellStock => "sell_stock",
            Intent::UserProfile => "user_profile",
            Intent::TransactionHistory => "transaction_history",
            Intent::TransactionStats => "transaction_stats",
            Intent::Ranking => "ranking",
            Intent::StockDetail => "stock_detail",
            Intent::ViewNews => "view_news",
            Intent::PriceQuery => "price_query",
        }
    }

    /// Intents about the user's own account data
    pub fn is_account(&self) -> bool {
        matches!(
            self,
            Intent::UserProfile | Intent::TransactionHistory | Intent::TransactionStats
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_intent_round_trip_names() {
        for intent in [Intent::MarketOverview, Intent::PriceQuery, Intent::ViewNews] {
            assert_eq!(intent.as_str().parse::<Intent>().unwrap(), intent);
        }
        assert_eq!("BUY_STOCK".parse::<Intent>(), Ok(Intent::BuyStock));
        assert_eq!(
            "weather".parse::<Intent>().unwrap_err(),
            "Invalid intent: 'weather'"
        );
    }

    #[test]
    fn test_intent_serialize() {
        let json = serde_json::to_string(&Intent::TransactionStats).unwrap();
        assert_eq!(json, r#""transaction_stats""#);
    }

    #[test]
    fn test_is_account() {
        assert!(Intent::UserProfile.is_account());
        assert!(!Intent::Ranking.is_account());
    }
}
