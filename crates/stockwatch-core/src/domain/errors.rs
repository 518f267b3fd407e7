//! Errors - core 境界を越えるエラー型と分類
//!
//! fetch 系の失敗は watch task 内で吸収されるので、ここには現れません。

use thiserror::Error;

use super::{OwnerId, ShortId};
use crate::ports::StoreError;

/// ErrorKind は呼び出し側（command surface）向けの分類
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// コマンド引数の誤り
    Validation,
    /// store が使えない
    Persistence,
    /// short id に一致する監視がない
    NotFound,
}

#[derive(Debug, Error)]
pub enum TrackerError {
    #[error("invalid command: {0}")]
    Validation(String),

    #[error("persistence unavailable: {0}")]
    Persistence(#[from] StoreError),

    #[error("no watch matches short id {short_id} for owner {owner}")]
    NotFound { owner: OwnerId, short_id: ShortId },
}

impl TrackerError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            TrackerError::Validation(_) => ErrorKind::Validation,
            TrackerError::Persistence(_) => ErrorKind::Persistence,
            TrackerError::NotFound { .. } => ErrorKind::NotFound,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn persistence_error_wraps_store_error() {
        let err: TrackerError = StoreError::Unavailable("disk gone".into()).into();
        assert_eq!(err.kind(), ErrorKind::Persistence);
        assert!(err.to_string().contains("disk gone"));
    }

    #[test]
    fn not_found_mentions_short_id() {
        let err = TrackerError::NotFound {
            owner: OwnerId::new(7),
            short_id: ShortId::for_url("abc"),
        };
        assert_eq!(err.kind(), ErrorKind::NotFound);
        assert!(err.to_string().contains("ba7816bf8f"));
    }
}
