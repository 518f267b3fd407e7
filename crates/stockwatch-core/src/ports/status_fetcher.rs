//! StatusFetcher port - url から在庫状態を 1 回観測する
//!
//! # 設計原則
//! - 呼び出し側を無期限に止めない（実装側で timeout を持つ）
//! - 失敗は型付きの `FetchError` としてデータで返す
//! - 失敗をどう扱うか（Unknown への畳み込み）は watch task 側が決める

use async_trait::async_trait;

use crate::domain::Observation;

/// FetchError は fetch 失敗の閉じた分類
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum FetchError {
    #[error("request timed out")]
    Timeout,

    #[error("HTTP error: {0}")]
    Http(String),

    #[error("unexpected status {0}")]
    Status(u16),

    #[error("parse error: {0}")]
    Parse(String),
}

#[async_trait]
pub trait StatusFetcher: Send + Sync {
    async fn fetch(&self, url: &str) -> Result<Observation, FetchError>;
}
