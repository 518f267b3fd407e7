//! Bot - Telegram の update を long-poll して CommandHandler に流す
//!
//! # 処理
//! - テキストメッセージ → `CommandHandler::handle_text` → 返信を sendMessage
//! - ボタンの callback → answerCallbackQuery → `Command::from_callback` → 元メッセージを editMessageText
//!
//! update 1 件ごとに task を spawn するので、遅いページの /add が他のチャットを待たせません。

use std::sync::Arc;
use std::time::Duration;

use stockwatch_core::app::{Command, CommandHandler};
use stockwatch_core::domain::OwnerId;
use stockwatch_core::impls::{TelegramClient, Update};
use stockwatch_core::ports::NotifyError;
use tracing::{debug, info, warn};

const ERROR_BACKOFF: Duration = Duration::from_secs(5);

pub struct UpdateLoop {
    client: TelegramClient,
    handler: Arc<CommandHandler>,
    long_poll: Duration,
}

impl UpdateLoop {
    pub fn new(client: TelegramClient, handler: Arc<CommandHandler>, long_poll: Duration) -> Self {
        Self {
            client,
            handler,
            long_poll,
        }
    }

    /// getUpdates を回し続ける。呼び出し側が drop するまで戻らない
    pub async fn run(self) {
        let mut offset: Option<i64> = None;
        info!(long_poll_secs = self.long_poll.as_secs(), "update loop started");

        loop {
            let updates = match self.client.get_updates(offset, self.long_poll).await {
                Ok(updates) => updates,
                Err(NotifyError::RateLimited { retry_after_secs }) => {
                    warn!(retry_after_secs, "getUpdates rate limited");
                    tokio::time::sleep(Duration::from_secs(retry_after_secs)).await;
                    continue;
                }
                Err(err) => {
                    warn!(error = %err, "getUpdates failed");
                    tokio::time::sleep(ERROR_BACKOFF).await;
                    continue;
                }
            };

            for update in updates {
                offset = Some(update.update_id + 1);
                let client = self.client.clone();
                let handler = Arc::clone(&self.handler);
                tokio::spawn(async move {
                    dispatch(&client, &handler, update).await;
                });
            }
        }
    }
}

async fn dispatch(client: &TelegramClient, handler: &CommandHandler, update: Update) {
    if let Some(message) = update.message {
        let Some(text) = message.text else {
            return;
        };
        let chat_id = message.chat.id;
        let Some(reply) = handler.handle_text(OwnerId::new(chat_id), &text).await else {
            debug!(chat_id, "ignoring non-command message");
            return;
        };
        if let Err(err) = client.send_message(chat_id, &reply, None).await {
            warn!(chat_id, error = %err, "failed to send reply");
        }
        return;
    }

    let Some(query) = update.callback_query else {
        return;
    };
    if let Err(err) = client.answer_callback_query(&query.id).await {
        warn!(error = %err, "failed to answer callback query");
    }

    let Some(message) = query.message else {
        return;
    };
    let Some(command) = query.data.as_deref().and_then(Command::from_callback) else {
        debug!(data = ?query.data, "unrecognised callback data");
        return;
    };

    let chat_id = message.chat.id;
    let reply = handler.handle(OwnerId::new(chat_id), command).await;
    if let Err(err) = client
        .edit_message_text(chat_id, message.message_id, &reply)
        .await
    {
        warn!(chat_id, error = %err, "failed to edit alert message");
    }
}
