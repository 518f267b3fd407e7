//! WatchTask - 1 つの `(owner, url)` を監視するループ
//!
//! # フロー
//! 1. キャンセル済みなら抜ける
//! 2. StatusFetcher::fetch()（キャンセルと競合させる）
//! 3. 観測が target と一致したら Notifier::notify()（キャンセルと競合させる）
//! 4. poll_interval だけ sleep（キャンセルと競合させる）
//!
//! 状態（Running → Cancelled）は `subscribe()` で外から観測できます。
//!
//! 目標状態に達しても止まりません。一致している間は毎サイクル通知します。
//! fetch の失敗は `Observation::unknown()` に畳み込み、そのサイクルの通知を見送るだけです。

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::domain::{Observation, RunId, StockAlert, StockState, WatchKey, WatchTaskState};
use crate::ports::{Notifier, StatusFetcher};

pub struct WatchTask {
    key: WatchKey,
    target: StockState,
    poll_interval: Duration,
    run_id: RunId,
    cancel: CancellationToken,
    fetcher: Arc<dyn StatusFetcher>,
    notifier: Arc<dyn Notifier>,
    state: watch::Sender<WatchTaskState>,
}

impl WatchTask {
    pub fn new(
        key: WatchKey,
        target: StockState,
        poll_interval: Duration,
        run_id: RunId,
        cancel: CancellationToken,
        fetcher: Arc<dyn StatusFetcher>,
        notifier: Arc<dyn Notifier>,
    ) -> Self {
        Self {
            key,
            target,
            poll_interval,
            run_id,
            cancel,
            fetcher,
            notifier,
            state: watch::Sender::new(WatchTaskState::Running),
        }
    }

    /// 現在の状態を受け取る。task が終わると `Cancelled` になる
    pub fn subscribe(&self) -> watch::Receiver<WatchTaskState> {
        self.state.subscribe()
    }

    pub fn key(&self) -> &WatchKey {
        &self.key
    }

    pub fn run_id(&self) -> RunId {
        self.run_id
    }

    /// キャンセルされるまで回り続ける
    ///
    /// 戻り値は常に `WatchTaskState::Cancelled`（唯一の終端状態）。
    pub async fn run(self) -> WatchTaskState {
        info!(
            owner = %self.key.owner(),
            url = %self.key.url(),
            run_id = %self.run_id,
            target = %self.target,
            "watch task started"
        );

        let mut cycles: u64 = 0;
        loop {
            if self.cancel.is_cancelled() {
                break;
            }

            // fetch 中のキャンセルも待たずに抜ける
            let fetched = tokio::select! {
                biased;
                _ = self.cancel.cancelled() => break,
                result = self.fetcher.fetch(self.key.url()) => result,
            };
            cycles += 1;

            let observation = fetched.unwrap_or_else(|err| {
                debug!(url = %self.key.url(), run_id = %self.run_id, error = %err, "fetch failed, no signal this cycle");
                Observation::unknown()
            });

            debug!(
                url = %self.key.url(),
                run_id = %self.run_id,
                cycle = cycles,
                state = %observation.state_tag,
                "poll cycle"
            );

            if self.cancel.is_cancelled() {
                break;
            }

            if observation.matches(self.target) {
                // 止まった送信先に task を縛られない
                tokio::select! {
                    biased;
                    _ = self.cancel.cancelled() => break,
                    _ = self.send_alert(&observation) => {}
                }
            }

            tokio::select! {
                biased;
                _ = self.cancel.cancelled() => break,
                _ = tokio::time::sleep(self.poll_interval) => {}
            }
        }

        info!(
            owner = %self.key.owner(),
            url = %self.key.url(),
            run_id = %self.run_id,
            cycles,
            "watch task cancelled"
        );
        self.state.send_replace(WatchTaskState::Cancelled);
        WatchTaskState::Cancelled
    }

    async fn send_alert(&self, observation: &Observation) {
        let alert = StockAlert::new(&self.key, observation);
        if let Err(err) = self.notifier.notify(&alert).await {
            warn!(
                owner = %self.key.owner(),
                url = %self.key.url(),
                channel = self.notifier.channel_name(),
                error = %err,
                "alert delivery failed"
            );
        }
    }
}
