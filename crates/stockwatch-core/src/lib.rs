//! stockwatch-core
//!
//! Core building blocks for the stock watcher.
//!
//! # モジュール構成
//! - **domain**: ドメインモデル（ids, state, observation, record, alert, errors）
//! - **ports**: 抽象化レイヤー（WatchStore, StatusFetcher, Notifier, Clock, IdGenerator）
//! - **app**: アプリケーションロジック（TrackingScheduler, WatchTask, CommandHandler）
//! - **impls**: 実装（SQLite / InMemory store, HTTP fetcher, Telegram notifier）

pub mod app;
pub mod domain;
pub mod impls;
pub mod ports;
