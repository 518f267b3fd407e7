//! WatchRecord - 永続化される監視レコード
//!
//! 追加時に作られ、削除時に消えます。上書き更新はしません。

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::{OwnerId, ShortId, WatchKey};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WatchRecord {
    pub owner: OwnerId,
    pub url: String,
    /// 追加時点の表示名（polling では更新しない）
    pub title: String,
    pub created_at: DateTime<Utc>,
}

impl WatchRecord {
    pub fn new(key: &WatchKey, title: impl Into<String>, created_at: DateTime<Utc>) -> Self {
        Self {
            owner: key.owner(),
            url: key.url().to_string(),
            title: title.into(),
            created_at,
        }
    }

    pub fn key(&self) -> WatchKey {
        WatchKey::new(self.owner, self.url.clone())
    }

    pub fn short_id(&self) -> ShortId {
        ShortId::for_url(&self.url)
    }
}
