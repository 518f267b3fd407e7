//! Commands - チャットのコマンドを scheduler の操作に変換する
//!
//! # 対応コマンド
//! - `/start`, `/help`
//! - `/add <url>` → `TrackingScheduler::add`（target は InStock 固定）
//! - `/remove <url>` → `TrackingScheduler::remove`
//! - `remove_<short_id>`（ボタンの callback）→ `TrackingScheduler::remove_by_short_id`
//! - `/list` → `TrackingScheduler::list_for_owner`

use std::sync::Arc;

use tracing::warn;

use super::scheduler::TrackingScheduler;
use crate::domain::{OwnerId, RemoveAction, ShortId, StockState, TrackerError, WatchKey};

const START_TEXT: &str = "Bot is running! Use /add <URL> to track a product.";
const HELP_TEXT: &str = "Commands:\n\
/add <URL> - track a product and get notified while it is in stock\n\
/remove <URL> - stop tracking a product\n\
/list - show your tracked products";
const STORAGE_UNAVAILABLE_TEXT: &str = "Storage is unavailable, please try again later.";
const NOTHING_MATCHED_TEXT: &str = "Nothing matched that link.";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Start,
    Help,
    Add { url: String },
    Remove { url: String },
    RemoveShort { short_id: ShortId },
    List,
}

impl Command {
    /// テキストメッセージを解釈
    ///
    /// - コマンドでないテキスト、未知のコマンドは `Ok(None)`
    /// - 引数の数が合わなければ `TrackerError::Validation`
    pub fn parse(text: &str) -> Result<Option<Command>, TrackerError> {
        let mut parts = text.split_whitespace();
        let Some(head) = parts.next() else {
            return Ok(None);
        };
        let Some(name) = head.strip_prefix('/') else {
            return Ok(None);
        };
        // `/add@my_bot` 形式
        let name = name.split('@').next().unwrap_or_default();
        let args: Vec<&str> = parts.collect();

        let command = match name {
            "start" => Command::Start,
            "help" => Command::Help,
            "list" => Command::List,
            "add" => match args.as_slice() {
                [url] => Command::Add {
                    url: (*url).to_string(),
                },
                _ => {
                    return Err(TrackerError::Validation(
                        "Please provide exactly one URL after /add.".into(),
                    ));
                }
            },
            "remove" => match args.as_slice() {
                [url] => Command::Remove {
                    url: (*url).to_string(),
                },
                _ => {
                    return Err(TrackerError::Validation(
                        "Please provide the URL to remove.".into(),
                    ));
                }
            },
            _ => return Ok(None),
        };
        Ok(Some(command))
    }

    /// ボタンの callback data を解釈
    pub fn from_callback(data: &str) -> Option<Command> {
        RemoveAction::from_callback_data(data).map(|action| Command::RemoveShort {
            short_id: action.short_id,
        })
    }
}

/// コマンドを実行して返信文を作る
pub struct CommandHandler {
    scheduler: Arc<TrackingScheduler>,
}

impl CommandHandler {
    pub fn new(scheduler: Arc<TrackingScheduler>) -> Self {
        Self { scheduler }
    }

    /// テキストを解釈して実行。コマンドでなければ None
    pub async fn handle_text(&self, owner: OwnerId, text: &str) -> Option<String> {
        match Command::parse(text) {
            Ok(Some(command)) => Some(self.handle(owner, command).await),
            Ok(None) => None,
            Err(err) => Some(render_error(&err)),
        }
    }

    pub async fn handle(&self, owner: OwnerId, command: Command) -> String {
        let result = match command {
            Command::Start => Ok(START_TEXT.to_string()),
            Command::Help => Ok(HELP_TEXT.to_string()),
            Command::Add { url } => self.add(owner, &url).await,
            Command::Remove { url } => self.remove(owner, &url).await,
            Command::RemoveShort { short_id } => self.remove_short(owner, &short_id).await,
            Command::List => self.list(owner).await,
        };
        result.unwrap_or_else(|err| {
            warn!(owner = %owner, kind = ?err.kind(), error = %err, "command failed");
            render_error(&err)
        })
    }

    async fn add(&self, owner: OwnerId, url: &str) -> Result<String, TrackerError> {
        let outcome = self.scheduler.add(owner, url, StockState::InStock).await?;
        Ok(format!(
            "Tracking: {}. Status is checked every {} seconds.",
            outcome.title,
            self.scheduler.poll_interval().as_secs()
        ))
    }

    async fn remove(&self, owner: OwnerId, url: &str) -> Result<String, TrackerError> {
        let existed = self.scheduler.remove(&WatchKey::new(owner, url)).await?;
        if existed {
            Ok(format!("Removed from tracking: {url}."))
        } else {
            Ok(format!("{url} was not being tracked."))
        }
    }

    async fn remove_short(&self, owner: OwnerId, short_id: &ShortId) -> Result<String, TrackerError> {
        let url = self.scheduler.remove_by_short_id(owner, short_id).await?;
        Ok(format!("Link \"{url}\" removed from tracking."))
    }

    async fn list(&self, owner: OwnerId) -> Result<String, TrackerError> {
        let records = self.scheduler.list_for_owner(owner).await?;
        if records.is_empty() {
            return Ok("You have no tracked links.".to_string());
        }
        let lines: Vec<String> = records
            .iter()
            .map(|r| format!("- {} ({})", r.title, r.url))
            .collect();
        Ok(format!("Your tracked links:\n{}", lines.join("\n")))
    }
}

pub fn render_error(err: &TrackerError) -> String {
    match err {
        TrackerError::Validation(msg) => msg.clone(),
        TrackerError::Persistence(_) => STORAGE_UNAVAILABLE_TEXT.to_string(),
        TrackerError::NotFound { .. } => NOTHING_MATCHED_TEXT.to_string(),
    }
}
