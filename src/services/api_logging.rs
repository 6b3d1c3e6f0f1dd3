use chrono::{DateTime, Utc};

/// Chat request performance metrics
#[derive(Debug, Clone)]
pub struct ChatMetrics {
    pub start_time: DateTime<Utc>,
    pub end_time: DateTime<Utc>,
    pub duration_ms: u64,
    pub status: ApiStatus,
    pub endpoint: String,
    pub user_id: String,
    pub session_id: String,
    pub intent: Option<String>,
    pub tool_calls: usize,
    pub ui_effects: usize,
    pub suggestions: usize,
    pub reply_size_bytes: usize,
    pub error_message: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ApiStatus {
    Success,
    Fail,
}

impl ChatMetrics {
    pub fn new(start_time: DateTime<Utc>, endpoint: &str) -> Self {
        Self {
            start_time,
            end_time: start_time,
            duration_ms: 0,
            status: ApiStatus::Success,
            endpoint: endpoint.to_string(),
            user_id: String::new(),
            session_id: String::new(),
            intent: None,
            tool_calls: 0,
            ui_effects: 0,
            suggestions: 0,
            reply_size_bytes: 0,
            error_message: None,
        }
    }

    pub fn fail(&mut self, error: impl Into<String>) {
        self.status = ApiStatus::Fail;
        self.error_message = Some(error.into());
    }

    pub fn complete(&mut self) {
        self.end_time = Utc::now();
        self.duration_ms = (self.end_time - self.start_time).num_milliseconds().max(0) as u64;
    }
}

fn format_duration(duration_ms: u64) -> String {
    if duration_ms >= 1000 {
        format!("{}.{:01}s", duration_ms / 1000, (duration_ms % 1000) / 100)
    } else {
        format!("{}ms", duration_ms)
    }
}

fn format_size(bytes: usize) -> String {
    if bytes >= 1024 {
        format!("{}kb", bytes / 1024)
    } else {
        format!("{}b", bytes)
    }
}

/// Compact one-line summary of a chat request
pub fn format_metrics_line(metrics: &ChatMetrics) -> String {
    let status_str = match metrics.status {
        ApiStatus::Success => "OK",
        ApiStatus::Fail => "FAIL",
    };

    let error_info = match &metrics.error_message {
        Some(error) => format!(" error:{}", error),
        None => String::new(),
    };

    format!(
        "{} | {} | {} | {} | user:{} session:{} intent:{} tools:{} effects:{} suggestions:{} reply:{}{}",
        metrics.start_time.format("%Y-%m-%d %H:%M:%S"),
        format_duration(metrics.duration_ms),
        metrics.endpoint,
        status_str,
        metrics.user_id,
        metrics.session_id,
        metrics.intent.as_deref().unwrap_or("-"),
        metrics.tool_calls,
        metrics.ui_effects,
        metrics.suggestions,
        format_size(metrics.reply_size_bytes),
        error_info
    )
}

pub fn log_chat_metrics(metrics: &ChatMetrics) {
    let line = format_metrics_line(metrics);
    match metrics.status {
        ApiStatus::Success => tracing::info!(target: "api_requests", "{}", line),
        ApiStatus::Fail => tracing::warn!(target: "api_requests", "{}", line),
    }
}
