//! Ports - 抽象化レイヤー
//!
//! 各 trait は外部システム（SQLite, HTTP, Telegram）へのインターフェースを提供し、
//! scheduler と watch task から実装の詳細を隠蔽します。
//!
//! # 設計原則
//! - store が source of truth（正本）。live task の集合は store から再構築できる
//! - fetch / notify はネットワーク I/O。scheduler のロックの外で呼ぶ

pub mod clock;
pub mod id_generator;
pub mod notifier;
pub mod status_fetcher;
pub mod watch_store;

pub use self::clock::{Clock, FixedClock, SystemClock};
pub use self::id_generator::{IdGenerator, UlidGenerator};
pub use self::notifier::{Notifier, NotifyError};
pub use self::status_fetcher::{FetchError, StatusFetcher};
pub use self::watch_store::{StoreError, WatchStore};
