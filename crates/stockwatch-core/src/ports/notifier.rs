//! Notifier port - owner への通知配送
//!
//! watch task から見ると「届けるか、黙って失敗するか」だけです。
//! 失敗は task 側でログに残して捨てます。

use async_trait::async_trait;

use crate::domain::StockAlert;

#[derive(Debug, thiserror::Error)]
pub enum NotifyError {
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("API error: {0}")]
    Api(String),

    #[error("rate limited: retry after {retry_after_secs}s")]
    RateLimited { retry_after_secs: u64 },

    #[error("configuration error: {0}")]
    Config(String),
}

#[async_trait]
pub trait Notifier: Send + Sync {
    async fn notify(&self, alert: &StockAlert) -> Result<(), NotifyError>;

    /// ログ用のチャネル名（"telegram" など）
    fn channel_name(&self) -> &str;
}
