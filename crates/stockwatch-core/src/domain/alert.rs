//! StockAlert - 目標状態を観測したときの通知ペイロード
//!
//! # 含むもの
//! - 表示名と価格
//! - url へのリンク
//! - 削除ボタン用の `RemoveAction`（ShortId で url を参照）

use serde::{Deserialize, Serialize};

use super::{Observation, OwnerId, ShortId, WatchKey};

const REMOVE_PREFIX: &str = "remove_";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StockAlert {
    pub owner: OwnerId,
    pub url: String,
    pub title: String,
    pub price: String,
    pub remove: RemoveAction,
}

impl StockAlert {
    pub fn new(key: &WatchKey, observation: &Observation) -> Self {
        Self {
            owner: key.owner(),
            url: key.url().to_string(),
            title: observation.title.clone(),
            price: observation.price.clone(),
            remove: RemoveAction::new(key.short_id()),
        }
    }

    /// 通知本文
    pub fn text(&self) -> String {
        format!("Product \"{}\" is available at {}.", self.title, self.price)
    }
}

/// 「監視をやめる」ボタンが運ぶ参照
///
/// callback data は `remove_<short_id>` の形式です。
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RemoveAction {
    pub short_id: ShortId,
}

impl RemoveAction {
    pub fn new(short_id: ShortId) -> Self {
        Self { short_id }
    }

    pub fn callback_data(&self) -> String {
        format!("{REMOVE_PREFIX}{}", self.short_id)
    }

    pub fn from_callback_data(data: &str) -> Option<Self> {
        let raw = data.strip_prefix(REMOVE_PREFIX)?;
        ShortId::parse(raw).map(Self::new)
    }
}
