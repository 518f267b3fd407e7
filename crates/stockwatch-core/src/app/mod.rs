//! App - アプリケーション層
//!
//! このモジュールは ports を組み合わせてアプリケーションロジックを実装します。
//!
//! # 主要コンポーネント
//! - **TrackingScheduler**: live な watch task の登録・キャンセル・restore
//! - **WatchTask**: poll → notify → sleep のループ（1 監視につき 1 つ）
//! - **CommandHandler**: チャットのコマンドを scheduler の操作に変換

pub mod commands;
pub mod config;
pub mod scheduler;
pub mod watch_task;

pub use self::commands::{Command, CommandHandler, render_error};
pub use self::config::SchedulerConfig;
pub use self::scheduler::{AddOutcome, TrackingScheduler};
pub use self::watch_task::WatchTask;
