//! State - 在庫状態と watch task の状態

use serde::{Deserialize, Serialize};
use std::fmt;

/// StockState は 1 回の観測で得た在庫状態
///
/// ページから読み取れなかった場合や fetch に失敗した場合は `Unknown`。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum StockState {
    InStock,
    OutOfStock,
    Unknown,
}

impl StockState {
    /// schema.org の availability 値から変換
    ///
    /// `InStock` のような素の値と `https://schema.org/InStock` のような URL 形式の両方を受け付けます。
    pub fn from_availability(value: &str) -> Self {
        let tail = value.trim().rsplit('/').next().unwrap_or_default();
        match tail {
            "InStock" => StockState::InStock,
            "OutOfStock" => StockState::OutOfStock,
            _ => StockState::Unknown,
        }
    }
}

impl fmt::Display for StockState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            StockState::InStock => "InStock",
            StockState::OutOfStock => "OutOfStock",
            StockState::Unknown => "Unknown",
        };
        f.write_str(s)
    }
}

/// WatchTaskState は watch task の状態
///
/// # 状態遷移
/// - running: poll → notify → sleep を繰り返す
/// - cancelled: キャンセルを観測した（終端）
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WatchTaskState {
    Running,
    Cancelled,
}
