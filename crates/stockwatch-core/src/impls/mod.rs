//! Impls - ports の実装
//!
//! # 含まれる実装
//! - **SqliteWatchStore**: 本番用の store（rusqlite）
//! - **InMemoryWatchStore**: 開発・テスト用の store
//! - **HttpStatusFetcher**: 商品ページの取得と解析（reqwest + scraper）
//! - **TelegramNotifier** / **TelegramClient**: Telegram Bot API
//! - **ScriptedFetcher** / **RecordingNotifier**: テスト用

pub mod http_fetcher;
pub mod inmem_store;
pub mod scripted;
pub mod sqlite_store;
pub mod telegram;

pub use self::http_fetcher::{HttpFetcherConfig, HttpStatusFetcher, parse_product_page};
pub use self::inmem_store::InMemoryWatchStore;
pub use self::scripted::{RecordingNotifier, ScriptedFetcher};
pub use self::sqlite_store::SqliteWatchStore;
pub use self::telegram::{
    CallbackQuery, Chat, Message, TelegramClient, TelegramNotifier, Update, alert_markup,
};
