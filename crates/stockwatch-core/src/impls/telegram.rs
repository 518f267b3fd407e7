//! Telegram Bot API client and alert notifier.
//!
//! `TelegramClient` covers the handful of Bot API methods the bot needs
//! (`sendMessage`, `getUpdates`, `answerCallbackQuery`, `editMessageText`).
//! `TelegramNotifier` delivers [`StockAlert`]s with an inline keyboard: a link
//! to the product and a "Stop tracking" button carrying `remove_<short_id>`.

use std::time::Duration;

use async_trait::async_trait;
use serde::Deserialize;
use serde::de::DeserializeOwned;
use serde_json::{Value, json};

use crate::domain::StockAlert;
use crate::ports::{Notifier, NotifyError};

const DEFAULT_API_BASE: &str = "https://api.telegram.org";
const DEFAULT_RETRY_AFTER_SECS: u64 = 30;
/// Upper bound for every call except `getUpdates`, which sets its own.
const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(30);
/// Extra time on top of the long-poll timeout before the HTTP request gives up.
const LONG_POLL_SLACK: Duration = Duration::from_secs(10);

#[derive(Debug, Clone, Deserialize)]
pub struct Update {
    pub update_id: i64,
    #[serde(default)]
    pub message: Option<Message>,
    #[serde(default)]
    pub callback_query: Option<CallbackQuery>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Message {
    pub message_id: i64,
    pub chat: Chat,
    #[serde(default)]
    pub text: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Chat {
    pub id: i64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CallbackQuery {
    pub id: String,
    #[serde(default)]
    pub data: Option<String>,
    #[serde(default)]
    pub message: Option<Message>,
}

#[derive(Debug, Deserialize)]
struct ApiResponse<T> {
    ok: bool,
    #[serde(default = "Option::default")]
    result: Option<T>,
    #[serde(default)]
    description: Option<String>,
    #[serde(default)]
    parameters: Option<ResponseParameters>,
}

#[derive(Debug, Deserialize)]
struct ResponseParameters {
    #[serde(default)]
    retry_after: Option<u64>,
}

/// Thin JSON client for the Telegram Bot API.
#[derive(Debug, Clone)]
pub struct TelegramClient {
    bot_token: String,
    api_base: String,
    client: reqwest::Client,
}

impl TelegramClient {
    /// Returns [`NotifyError::Config`] if the token is empty.
    pub fn new(bot_token: impl Into<String>) -> Result<Self, NotifyError> {
        let bot_token = bot_token.into();
        if bot_token.trim().is_empty() {
            return Err(NotifyError::Config(
                "Telegram bot token must not be empty".to_string(),
            ));
        }
        let client = reqwest::Client::builder()
            .timeout(DEFAULT_REQUEST_TIMEOUT)
            .build()?;
        Ok(Self {
            bot_token,
            api_base: DEFAULT_API_BASE.to_string(),
            client,
        })
    }

    /// Replace the request timeout (the long-poll call still uses its own).
    pub fn with_timeout(mut self, timeout: Duration) -> Result<Self, NotifyError> {
        self.client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(self)
    }

    /// Point the client at another server (tests, local Bot API servers).
    pub fn with_api_base(mut self, api_base: impl Into<String>) -> Self {
        self.api_base = api_base.into().trim_end_matches('/').to_string();
        self
    }

    async fn call<T: DeserializeOwned>(
        &self,
        method: &str,
        body: Value,
        timeout: Option<Duration>,
    ) -> Result<T, NotifyError> {
        let url = format!("{}/bot{}/{}", self.api_base, self.bot_token, method);

        let mut request = self.client.post(&url).json(&body);
        if let Some(timeout) = timeout {
            request = request.timeout(timeout);
        }
        let response = request.send().await?;
        let status = response.status();
        let resp: ApiResponse<T> = response.json().await?;

        if resp.ok {
            return resp
                .result
                .ok_or_else(|| NotifyError::Api(format!("{method}: response without result")));
        }

        if status == reqwest::StatusCode::TOO_MANY_REQUESTS {
            let retry_after = resp
                .parameters
                .and_then(|p| p.retry_after)
                .unwrap_or(DEFAULT_RETRY_AFTER_SECS);
            return Err(NotifyError::RateLimited {
                retry_after_secs: retry_after,
            });
        }

        let description = resp
            .description
            .unwrap_or_else(|| "Unknown Telegram API error".to_string());
        Err(NotifyError::Api(format!("{method}: {description}")))
    }

    pub async fn send_message(
        &self,
        chat_id: i64,
        text: &str,
        reply_markup: Option<Value>,
    ) -> Result<(), NotifyError> {
        let mut body = json!({
            "chat_id": chat_id,
            "text": text,
        });
        if let Some(markup) = reply_markup {
            body["reply_markup"] = markup;
        }

        tracing::debug!(chat_id, "sending Telegram message");
        let _: Value = self.call("sendMessage", body, None).await?;
        Ok(())
    }

    /// Long-poll for new updates starting at `offset`.
    pub async fn get_updates(
        &self,
        offset: Option<i64>,
        timeout: Duration,
    ) -> Result<Vec<Update>, NotifyError> {
        let mut body = json!({
            "timeout": timeout.as_secs(),
            "allowed_updates": ["message", "callback_query"],
        });
        if let Some(offset) = offset {
            body["offset"] = json!(offset);
        }
        self.call("getUpdates", body, Some(timeout + LONG_POLL_SLACK))
            .await
    }

    pub async fn answer_callback_query(&self, callback_query_id: &str) -> Result<(), NotifyError> {
        let body = json!({ "callback_query_id": callback_query_id });
        let _: Value = self.call("answerCallbackQuery", body, None).await?;
        Ok(())
    }

    pub async fn edit_message_text(
        &self,
        chat_id: i64,
        message_id: i64,
        text: &str,
    ) -> Result<(), NotifyError> {
        let body = json!({
            "chat_id": chat_id,
            "message_id": message_id,
            "text": text,
        });
        let _: Value = self.call("editMessageText", body, None).await?;
        Ok(())
    }
}

/// Inline keyboard attached to an alert.
pub fn alert_markup(alert: &StockAlert) -> Value {
    json!({
        "inline_keyboard": [
            [{ "text": format!("View product: {}", alert.title), "url": alert.url }],
            [{ "text": "Stop tracking", "callback_data": alert.remove.callback_data() }],
        ]
    })
}

/// Delivers stock alerts to the owning chat.
#[derive(Debug, Clone)]
pub struct TelegramNotifier {
    client: TelegramClient,
}

impl TelegramNotifier {
    pub fn new(client: TelegramClient) -> Self {
        Self { client }
    }
}

#[async_trait]
impl Notifier for TelegramNotifier {
    async fn notify(&self, alert: &StockAlert) -> Result<(), NotifyError> {
        self.client
            .send_message(alert.owner.get(), &alert.text(), Some(alert_markup(alert)))
            .await?;
        tracing::info!(owner = %alert.owner, url = %alert.url, "Telegram alert sent");
        Ok(())
    }

    fn channel_name(&self) -> &str {
        "telegram"
    }
}
