//! WatchStore port - 監視レコードの正本（source of truth）
//!
//! # 実装
//! - **SqliteWatchStore**: 本番用（`impls::sqlite_store`）
//! - **InMemoryWatchStore**: テスト・開発用（`impls::inmem_store`）

use async_trait::async_trait;

use crate::domain::{OwnerId, WatchKey, WatchRecord};

/// StoreError は永続化層のエラー
///
/// scheduler はこれを `TrackerError::Persistence` として呼び出し側に返します。
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("store unavailable: {0}")]
    Unavailable(String),

    #[error("sqlite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("store worker failed: {0}")]
    Join(String),
}

/// WatchStore は `(owner, url) → title` の永続マッピング
///
/// # 設計原則
/// - insert は冪等: 既存キーなら何もしない（既存レコードは変更しない）
/// - delete は冪等: 存在しなくても成功
/// - 並行制御は持たない（純粋な CRUD）
#[async_trait]
pub trait WatchStore: Send + Sync {
    async fn insert(&self, record: WatchRecord) -> Result<(), StoreError>;

    async fn delete(&self, key: &WatchKey) -> Result<(), StoreError>;

    async fn exists(&self, key: &WatchKey) -> Result<bool, StoreError>;

    /// 順序は保証しない
    async fn list_by_owner(&self, owner: OwnerId) -> Result<Vec<WatchRecord>, StoreError>;

    /// restore 専用
    async fn list_all(&self) -> Result<Vec<WatchKey>, StoreError>;
}
