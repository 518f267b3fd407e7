//! SqliteWatchStore - 本番用の store
//!
//! # 実装詳細
//! - rusqlite の Connection を std::sync::Mutex で保護
//! - 同期 I/O は spawn_blocking で実行（async context を止めないため）
//! - 主キー `(chat_id, url)`、insert は `INSERT OR IGNORE`

use std::path::Path;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rusqlite::types::Type;
use rusqlite::{Connection, params};

use crate::domain::{OwnerId, WatchKey, WatchRecord};
use crate::ports::{StoreError, WatchStore};

const SCHEMA: &str = "
CREATE TABLE IF NOT EXISTS tracked_links (
    chat_id    INTEGER NOT NULL,
    url        TEXT    NOT NULL,
    title      TEXT    NOT NULL,
    created_at TEXT    NOT NULL,
    PRIMARY KEY (chat_id, url)
);
";

pub struct SqliteWatchStore {
    conn: Arc<Mutex<Connection>>,
}

impl SqliteWatchStore {
    /// ファイルを開き、テーブルがなければ作成
    pub fn open(path: impl AsRef<Path>) -> Result<Self, StoreError> {
        let path = path.as_ref();
        if let Some(parent) = path.parent()
            && !parent.as_os_str().is_empty()
        {
            std::fs::create_dir_all(parent).map_err(|e| {
                StoreError::Unavailable(format!("create {}: {e}", parent.display()))
            })?;
        }
        let conn = Connection::open(path)?;
        Self::from_connection(conn)
    }

    pub fn open_in_memory() -> Result<Self, StoreError> {
        Self::from_connection(Connection::open_in_memory()?)
    }

    fn from_connection(conn: Connection) -> Result<Self, StoreError> {
        conn.execute_batch(SCHEMA)?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    /// Connection を取って同期処理を blocking pool で実行
    async fn with_conn<T, F>(&self, f: F) -> Result<T, StoreError>
    where
        T: Send + 'static,
        F: FnOnce(&Connection) -> Result<T, StoreError> + Send + 'static,
    {
        let conn = Arc::clone(&self.conn);
        tokio::task::spawn_blocking(move || {
            let guard = conn
                .lock()
                .map_err(|e| StoreError::Unavailable(format!("connection lock poisoned: {e}")))?;
            f(&guard)
        })
        .await
        .map_err(|e| StoreError::Join(e.to_string()))?
    }
}

/// `created_at` 列（RFC 3339）を読む。壊れた値は変換エラーとして返す
fn parse_created_at(raw: &str) -> rusqlite::Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(raw)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(2, Type::Text, Box::new(e)))
}

#[async_trait]
impl WatchStore for SqliteWatchStore {
    async fn insert(&self, record: WatchRecord) -> Result<(), StoreError> {
        self.with_conn(move |conn| {
            conn.execute(
                "INSERT OR IGNORE INTO tracked_links (chat_id, url, title, created_at)
                 VALUES (?1, ?2, ?3, ?4)",
                params![
                    record.owner.get(),
                    record.url,
                    record.title,
                    record.created_at.to_rfc3339()
                ],
            )?;
            Ok(())
        })
        .await
    }

    async fn delete(&self, key: &WatchKey) -> Result<(), StoreError> {
        let key = key.clone();
        self.with_conn(move |conn| {
            conn.execute(
                "DELETE FROM tracked_links WHERE chat_id = ?1 AND url = ?2",
                params![key.owner().get(), key.url()],
            )?;
            Ok(())
        })
        .await
    }

    async fn exists(&self, key: &WatchKey) -> Result<bool, StoreError> {
        let key = key.clone();
        self.with_conn(move |conn| {
            let mut stmt =
                conn.prepare("SELECT 1 FROM tracked_links WHERE chat_id = ?1 AND url = ?2")?;
            Ok(stmt.exists(params![key.owner().get(), key.url()])?)
        })
        .await
    }

    async fn list_by_owner(&self, owner: OwnerId) -> Result<Vec<WatchRecord>, StoreError> {
        self.with_conn(move |conn| {
            let mut stmt = conn.prepare(
                "SELECT url, title, created_at FROM tracked_links WHERE chat_id = ?1",
            )?;
            let rows = stmt.query_map([owner.get()], |r| {
                let created_at: String = r.get(2)?;
                Ok(WatchRecord {
                    owner,
                    url: r.get(0)?,
                    title: r.get(1)?,
                    created_at: parse_created_at(&created_at)?,
                })
            })?;
            let mut records = Vec::new();
            for row in rows {
                records.push(row?);
            }
            Ok(records)
        })
        .await
    }

    async fn list_all(&self) -> Result<Vec<WatchKey>, StoreError> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare("SELECT chat_id, url FROM tracked_links")?;
            let rows = stmt.query_map([], |r| {
                let chat_id: i64 = r.get(0)?;
                let url: String = r.get(1)?;
                Ok(WatchKey::new(OwnerId::new(chat_id), url))
            })?;
            let mut keys = Vec::new();
            for row in rows {
                keys.push(row?);
            }
            Ok(keys)
        })
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn record(owner: i64, url: &str, title: &str) -> WatchRecord {
        let at = Utc.with_ymd_and_hms(2024, 1, 1, 12, 0, 0).unwrap();
        WatchRecord::new(&WatchKey::new(OwnerId::new(owner), url), title, at)
    }

    #[tokio::test]
    async fn insert_then_list_by_owner() {
        let store = SqliteWatchStore::open_in_memory().unwrap();
        store.insert(record(1, "http://x/item", "Widget")).await.unwrap();

        let records = store.list_by_owner(OwnerId::new(1)).await.unwrap();
        assert_eq!(records, vec![record(1, "http://x/item", "Widget")]);
        assert!(store.list_by_owner(OwnerId::new(2)).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn insert_existing_key_is_ignored() {
        let store = SqliteWatchStore::open_in_memory().unwrap();
        store.insert(record(1, "http://x/item", "Widget")).await.unwrap();
        store.insert(record(1, "http://x/item", "Other")).await.unwrap();

        let records = store.list_by_owner(OwnerId::new(1)).await.unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].title, "Widget");
    }

    #[tokio::test]
    async fn delete_is_idempotent() {
        let store = SqliteWatchStore::open_in_memory().unwrap();
        let key = WatchKey::new(OwnerId::new(1), "http://x/item");
        store.insert(record(1, "http://x/item", "Widget")).await.unwrap();

        store.delete(&key).await.unwrap();
        store.delete(&key).await.unwrap();
        assert!(store.list_all().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn exists_follows_insert_and_delete() {
        let store = SqliteWatchStore::open_in_memory().unwrap();
        let key = WatchKey::new(OwnerId::new(1), "http://x/item");
        assert!(!store.exists(&key).await.unwrap());

        store.insert(record(1, "http://x/item", "Widget")).await.unwrap();
        assert!(store.exists(&key).await.unwrap());
        assert!(!store.exists(&WatchKey::new(OwnerId::new(2), "http://x/item")).await.unwrap());

        store.delete(&key).await.unwrap();
        assert!(!store.exists(&key).await.unwrap());
    }

    #[tokio::test]
    async fn corrupt_created_at_is_an_error() {
        let store = SqliteWatchStore::open_in_memory().unwrap();
        store
            .conn
            .lock()
            .unwrap()
            .execute(
                "INSERT INTO tracked_links (chat_id, url, title, created_at)
                 VALUES (1, 'http://x/item', 'Widget', 'yesterday')",
                [],
            )
            .unwrap();

        let err = store.list_by_owner(OwnerId::new(1)).await.unwrap_err();
        assert!(matches!(
            err,
            StoreError::Sqlite(rusqlite::Error::FromSqlConversionFailure(2, Type::Text, _))
        ));
    }

    #[tokio::test]
    async fn records_survive_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("tracked_links.db");
        {
            let store = SqliteWatchStore::open(&path).unwrap();
            store.insert(record(1, "http://x/a", "A")).await.unwrap();
            store.insert(record(2, "http://x/a", "A")).await.unwrap();
        }

        let store = SqliteWatchStore::open(&path).unwrap();
        let mut keys = store.list_all().await.unwrap();
        keys.sort_by_key(|k| k.owner());
        assert_eq!(
            keys,
            vec![
                WatchKey::new(OwnerId::new(1), "http://x/a"),
                WatchKey::new(OwnerId::new(2), "http://x/a"),
            ]
        );
    }
}
