use crate::constants::MARKET_TIMEZONE;
use chrono::{DateTime, Datelike, Timelike, Utc, Weekday};
use chrono_tz::Tz;
use serde::Serialize;

/// Trading hours configuration for Vietnam stock market
pub struct TradingHours {
    pub start_hour: u32,        // 9 for 9am
    pub end_hour: u32,          // 15 for 3pm
    pub timezone: &'static str, // "Asia/Ho_Chi_Minh"
    pub weekdays_only: bool,    // true for Monday-Friday only
}

impl Default for TradingHours {
    fn default() -> Self {
        Self {
            start_hour: 9,
            end_hour: 15,
            timezone: MARKET_TIMEZONE,
            weekdays_only: true,
        }
    }
}

impl TradingHours {
    /// Parse the configured timezone, falling back to UTC
    pub fn tz(&self) -> Tz {
        match self.timezone.parse() {
            Ok(tz) => tz,
            Err(e) => {
                tracing::warn!("Failed to parse timezone '{}': {}", self.timezone, e);
                Tz::UTC
            }
        }
    }

    /// Check whether a local market time is inside the session
    pub fn contains(&self, local: &DateTime<Tz>) -> bool {
        if self.weekdays_only && is_weekend(local.weekday()) {
            return false;
        }
        let hour = local.hour();
        hour >= self.start_hour && hour < self.end_hour
    }
}

fn is_weekend(weekday: Weekday) -> bool {
    matches!(weekday, Weekday::Sat | Weekday::Sun)
}

/// Current time in the market timezone
pub fn market_now() -> DateTime<Tz> {
    Utc::now().with_timezone(&TradingHours::default().tz())
}

/// Check if current time is within trading hours
pub fn is_trading_hours() -> bool {
    TradingHours::default().contains(&market_now())
}

/// Snapshot returned by the `get_current_datetime` tool
#[derive(Debug, Clone, Serialize)]
pub struct DateTimeInfo {
    pub date: String,
    pub time: String,
    pub datetime: String,
    pub date_vn: String,
    pub day_name: String,
    pub day_name_vn: String,
    pub full_vn: String,
    pub is_trading_hours: bool,
    pub is_weekend: bool,
}

fn day_name_vn(weekday: Weekday) -> &'static str {
    match weekday {
        Weekday::Mon => "Thứ Hai",
        Weekday::Tue => "Thứ Ba",
        Weekday::Wed => "Thứ Tư",
        Weekday::Thu => "Thứ Năm",
        Weekday::Fri => "Thứ Sáu",
        Weekday::Sat => "Thứ Bảy",
        Weekday::Sun => "Chủ Nhật",
    }
}

/// Describe a local market time in the formats the assistant needs
pub fn describe_datetime(local: &DateTime<Tz>) -> DateTimeInfo {
    let hours = TradingHours::default();
    DateTimeInfo {
        date: local.format("%Y-%m-%d").to_string(),
        time: local.format("%H:%M:%S").to_string(),
        datetime: local.format("%Y-%m-%d %H:%M:%S").to_string(),
        date_vn: local.format("%d/%m/%Y").to_string(),
        day_name: local.format("%A").to_string(),
        day_name_vn: day_name_vn(local.weekday()).to_string(),
        full_vn: format!("{} tháng {} năm {}", local.format("%d"), local.format("%m"), local.format("%Y")),
        is_trading_hours: hours.contains(local),
        is_weekend: is_weekend(local.weekday()),
    }
}

/// `get_current_datetime` tool body
pub fn current_datetime_info() -> DateTimeInfo {
    describe_datetime(&market_now())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn vn(y: i32, m: u32, d: u32, h: u32, min: u32) -> DateTime<Tz> {
        chrono_tz::Asia::Ho_Chi_Minh.with_ymd_and_hms(y, m, d, h, min, 0).unwrap()
    }

    #[test]
    fn test_trading_hours_config() {
        let config = TradingHours::default();
        assert_eq!(config.start_hour, 9);
        assert_eq!(config.end_hour, 15);
        assert_eq!(config.timezone, "Asia/Ho_Chi_Minh");
        assert!(config.weekdays_only);
    }

    #[test]
    fn test_session_boundaries() {
        let hours = TradingHours::default();
        // 2024-11-11 is a Monday
        assert!(!hours.contains(&vn(2024, 11, 11, 8, 59)));
        assert!(hours.contains(&vn(2024, 11, 11, 9, 0)));
        assert!(hours.contains(&vn(2024, 11, 11, 14, 59)));
        assert!(!hours.contains(&vn(2024, 11, 11, 15, 0)));
        // Saturday
        assert!(!hours.contains(&vn(2024, 11, 9, 10, 0)));
    }

    #[test]
    fn test_describe_datetime_formats() {
        let info = describe_datetime(&vn(2024, 11, 9, 10, 30));
        assert_eq!(info.date, "2024-11-09");
        assert_eq!(info.time, "10:30:00");
        assert_eq!(info.date_vn, "09/11/2024");
        assert_eq!(info.day_name, "Saturday");
        assert_eq!(info.day_name_vn, "Thứ Bảy");
        assert_eq!(info.full_vn, "09 tháng 11 năm 2024");
        assert!(info.is_weekend);
        assert!(!info.is_trading_hours);
    }
}
