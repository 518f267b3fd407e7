//! InMemoryWatchStore - 開発・テスト用の store
//!
//! # 実装詳細
//! - HashMap<WatchKey, WatchRecord> を tokio::sync::Mutex で保護
//! - `set_unavailable(true)` で書き込みを失敗させ、永続化障害を再現できる

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use tokio::sync::Mutex;

use crate::domain::{OwnerId, WatchKey, WatchRecord};
use crate::ports::{StoreError, WatchStore};

#[derive(Default)]
pub struct InMemoryWatchStore {
    records: Arc<Mutex<HashMap<WatchKey, WatchRecord>>>,
    unavailable: AtomicBool,
}

impl InMemoryWatchStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// true の間、insert / delete は `StoreError::Unavailable` を返す
    pub fn set_unavailable(&self, unavailable: bool) {
        self.unavailable.store(unavailable, Ordering::SeqCst);
    }

    pub async fn contains(&self, key: &WatchKey) -> bool {
        self.records.lock().await.contains_key(key)
    }

    pub async fn get(&self, key: &WatchKey) -> Option<WatchRecord> {
        self.records.lock().await.get(key).cloned()
    }

    pub async fn len(&self) -> usize {
        self.records.lock().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.records.lock().await.is_empty()
    }

    fn check_available(&self) -> Result<(), StoreError> {
        if self.unavailable.load(Ordering::SeqCst) {
            return Err(StoreError::Unavailable("in-memory store switched off".into()));
        }
        Ok(())
    }
}

#[async_trait]
impl WatchStore for InMemoryWatchStore {
    async fn insert(&self, record: WatchRecord) -> Result<(), StoreError> {
        self.check_available()?;
        let mut records = self.records.lock().await;
        records.entry(record.key()).or_insert(record);
        Ok(())
    }

    async fn delete(&self, key: &WatchKey) -> Result<(), StoreError> {
        self.check_available()?;
        self.records.lock().await.remove(key);
        Ok(())
    }

    async fn exists(&self, key: &WatchKey) -> Result<bool, StoreError> {
        Ok(self.records.lock().await.contains_key(key))
    }

    async fn list_by_owner(&self, owner: OwnerId) -> Result<Vec<WatchRecord>, StoreError> {
        let records = self.records.lock().await;
        Ok(records
            .values()
            .filter(|r| r.owner == owner)
            .cloned()
            .collect())
    }

    async fn list_all(&self) -> Result<Vec<WatchKey>, StoreError> {
        let records = self.records.lock().await;
        Ok(records.keys().cloned().collect())
    }
}
