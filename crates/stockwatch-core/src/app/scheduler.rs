//! TrackingScheduler - live な watch task の集合を管理する
//!
//! # 責務
//! - add / remove / remove_by_short_id / list / restore を提供
//! - 同じ WatchKey に対して live な task は高々 1 つ
//! - 起動した task はすべて registry で追跡し、列挙・一括キャンセルできる
//!
//! # 順序の約束
//! - add: store に insert してから task を起動（途中で落ちても restore で復旧できる）
//! - remove: store から delete してからキャンセル（レコードなしで task だけ残る状態を作らない）
//!
//! # ロック
//! - registry（WatchKey → LiveTask）の操作は 1 つの Mutex で直列化
//! - 同じ key の add（insert → 起動）と remove（delete → キャンセル）は key 単位のロックで直列化。
//!   これがないと remove が insert と起動の間に割り込み、レコードのない task が残る
//! - fetch / notify の I/O はどちらのロックの外で行う

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{Mutex, OwnedMutexGuard, watch};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::config::SchedulerConfig;
use super::watch_task::WatchTask;
use crate::domain::{
    Observation, OwnerId, RunId, ShortId, StockState, TrackerError, WatchKey, WatchRecord,
    WatchTaskState,
};
use crate::ports::{
    Clock, IdGenerator, Notifier, StatusFetcher, SystemClock, UlidGenerator, WatchStore,
};

/// registry の 1 エントリ
struct LiveTask {
    run_id: RunId,
    cancel: CancellationToken,
    state: watch::Receiver<WatchTaskState>,
    handle: JoinHandle<WatchTaskState>,
}

type Registry = Arc<Mutex<HashMap<WatchKey, LiveTask>>>;

/// key 単位の async ロック
///
/// 誰も待っていないロックは解放時に map から外すので、map は使用中の key だけを持ちます。
#[derive(Default)]
struct KeyLocks {
    locks: Mutex<HashMap<WatchKey, Arc<Mutex<()>>>>,
}

impl KeyLocks {
    async fn acquire(&self, key: &WatchKey) -> OwnedMutexGuard<()> {
        let lock = {
            let mut locks = self.locks.lock().await;
            Arc::clone(locks.entry(key.clone()).or_default())
        };
        lock.lock_owned().await
    }

    async fn release(&self, key: &WatchKey, guard: OwnedMutexGuard<()>) {
        drop(guard);
        let mut locks = self.locks.lock().await;
        // clone は map のロック下でしか作られないので、count == 1 なら待ち手はいない
        if locks.get(key).is_some_and(|l| Arc::strong_count(l) == 1) {
            locks.remove(key);
        }
    }
}

/// `add` の結果
#[derive(Debug, Clone)]
pub struct AddOutcome {
    /// 追加時点の表示名（呼び出し側に見せる）
    pub title: String,
    /// 初回の観測
    pub observation: Observation,
    /// 新しく task を起動したか（既に live なら false）
    pub started: bool,
}

pub struct TrackingScheduler {
    store: Arc<dyn WatchStore>,
    fetcher: Arc<dyn StatusFetcher>,
    notifier: Arc<dyn Notifier>,
    clock: Arc<dyn Clock>,
    ids: Arc<dyn IdGenerator>,
    config: SchedulerConfig,
    live: Registry,
    key_locks: KeyLocks,
}

impl TrackingScheduler {
    pub fn new(
        store: Arc<dyn WatchStore>,
        fetcher: Arc<dyn StatusFetcher>,
        notifier: Arc<dyn Notifier>,
        config: SchedulerConfig,
    ) -> Self {
        Self {
            store,
            fetcher,
            notifier,
            clock: Arc::new(SystemClock),
            ids: Arc::new(UlidGenerator::new(SystemClock)),
            config,
            live: Arc::new(Mutex::new(HashMap::new())),
            key_locks: KeyLocks::default(),
        }
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn with_id_generator(mut self, ids: Arc<dyn IdGenerator>) -> Self {
        self.ids = ids;
        self
    }

    pub fn poll_interval(&self) -> Duration {
        self.config.poll_interval
    }

    pub fn config(&self) -> &SchedulerConfig {
        &self.config
    }

    /// 監視を追加
    ///
    /// 1. 初回 fetch（表示名の取得と即時フィードバック用、ロックの外）
    /// 2. store に insert（失敗したら task は起動しない）
    /// 3. live でなければ task を起動
    ///
    /// 2 と 3 は key ロックの中で行います。
    pub async fn add(
        &self,
        owner: OwnerId,
        url: &str,
        target: StockState,
    ) -> Result<AddOutcome, TrackerError> {
        let url = url.trim();
        if url.is_empty() {
            return Err(TrackerError::Validation("url must not be empty".into()));
        }
        let key = WatchKey::new(owner, url);

        let observation = match self.fetcher.fetch(key.url()).await {
            Ok(observation) => observation,
            Err(err) => {
                warn!(owner = %owner, url = %key.url(), error = %err, "initial fetch failed");
                Observation::unknown()
            }
        };

        let record = WatchRecord::new(&key, observation.title.clone(), self.clock.now());
        let guard = self.key_locks.acquire(&key).await;
        if let Err(err) = self.store.insert(record).await {
            self.key_locks.release(&key, guard).await;
            warn!(owner = %owner, url = %key.url(), error = %err, "insert failed, watch not started");
            return Err(err.into());
        }
        let started = self.start_task(key.clone(), target).await;
        self.key_locks.release(&key, guard).await;
        info!(owner = %owner, url = %key.url(), started, "watch added");

        Ok(AddOutcome {
            title: observation.title.clone(),
            observation,
            started,
        })
    }

    /// 監視を削除
    ///
    /// store から delete してから、live な task があればキャンセルします。
    /// 戻り値は live な task が存在したかどうか。
    pub async fn remove(&self, key: &WatchKey) -> Result<bool, TrackerError> {
        let guard = self.key_locks.acquire(key).await;
        if let Err(err) = self.store.delete(key).await {
            self.key_locks.release(key, guard).await;
            warn!(owner = %key.owner(), url = %key.url(), error = %err, "delete failed, watch left running");
            return Err(err.into());
        }

        let entry = self.live.lock().await.remove(key);
        self.key_locks.release(key, guard).await;
        let existed = match entry {
            Some(task) => {
                task.cancel.cancel();
                true
            }
            None => false,
        };

        info!(owner = %key.owner(), url = %key.url(), existed, "watch removed");
        Ok(existed)
    }

    /// short id から url を解決して削除
    ///
    /// owner の全レコードについて short id を再計算して照合します。
    pub async fn remove_by_short_id(
        &self,
        owner: OwnerId,
        short_id: &ShortId,
    ) -> Result<String, TrackerError> {
        let records = self.store.list_by_owner(owner).await?;
        let Some(record) = records.into_iter().find(|r| &r.short_id() == short_id) else {
            debug!(owner = %owner, short_id = %short_id, "short id did not match any watch");
            return Err(TrackerError::NotFound {
                owner,
                short_id: short_id.clone(),
            });
        };

        self.remove(&record.key()).await?;
        Ok(record.url)
    }

    pub async fn list_for_owner(&self, owner: OwnerId) -> Result<Vec<WatchRecord>, TrackerError> {
        Ok(self.store.list_by_owner(owner).await?)
    }

    /// 起動時の再構築
    ///
    /// store の全レコードについて既定の target で task を起動します。
    /// 既に live なキーは飛ばすので、2 回呼んでも重複しません。
    /// 一覧を取った後に remove されたキーは、key ロックの中で存在を確かめて飛ばします。
    /// 戻り値は新しく起動した task の数。
    pub async fn restore(&self) -> Result<usize, TrackerError> {
        let keys = self.store.list_all().await?;
        let total = keys.len();

        let mut started = 0;
        for key in keys {
            let guard = self.key_locks.acquire(&key).await;
            let exists = self.store.exists(&key).await;
            let launched = match exists {
                Ok(true) => self.start_task(key.clone(), self.config.default_target).await,
                Ok(false) => false,
                Err(err) => {
                    self.key_locks.release(&key, guard).await;
                    return Err(err.into());
                }
            };
            self.key_locks.release(&key, guard).await;
            if launched {
                started += 1;
            }
        }

        info!(records = total, started, "watches restored");
        Ok(started)
    }

    pub async fn is_live(&self, key: &WatchKey) -> bool {
        self.live.lock().await.contains_key(key)
    }

    pub async fn live_count(&self) -> usize {
        self.live.lock().await.len()
    }

    pub async fn live_keys(&self) -> Vec<WatchKey> {
        self.live.lock().await.keys().cloned().collect()
    }

    /// live な task の状態。live でなければ None
    pub async fn task_state(&self, key: &WatchKey) -> Option<WatchTaskState> {
        self.live.lock().await.get(key).map(|t| *t.state.borrow())
    }

    /// live な task の実行 ID（Remove → Add で変わる）
    pub async fn run_id(&self, key: &WatchKey) -> Option<RunId> {
        self.live.lock().await.get(key).map(|t| t.run_id)
    }

    /// 全 task をキャンセルし、終了を待つ
    ///
    /// store には触れないので、次回起動時に restore で元に戻ります。
    pub async fn shutdown(&self) {
        let tasks: Vec<(WatchKey, LiveTask)> = self.live.lock().await.drain().collect();
        info!(tasks = tasks.len(), "shutting down watch tasks");

        for (_, task) in &tasks {
            task.cancel.cancel();
        }
        for (key, task) in tasks {
            if let Err(err) = task.handle.await {
                warn!(owner = %key.owner(), url = %key.url(), error = %err, "watch task did not exit cleanly");
            }
        }
    }

    /// key が live でなければ task を起動する。起動したら true
    ///
    /// 存在確認と登録を同じロックの中で行うので、並行 add でも 1 つしか起動しません。
    async fn start_task(&self, key: WatchKey, target: StockState) -> bool {
        let mut live = self.live.lock().await;
        if live.contains_key(&key) {
            debug!(owner = %key.owner(), url = %key.url(), "watch already live");
            return false;
        }

        let run_id = self.ids.generate_run_id();
        let cancel = CancellationToken::new();
        let task = WatchTask::new(
            key.clone(),
            target,
            self.config.poll_interval,
            run_id,
            cancel.clone(),
            Arc::clone(&self.fetcher),
            Arc::clone(&self.notifier),
        );
        let state = task.subscribe();

        let registry = Arc::clone(&self.live);
        let cleanup_key = key.clone();
        let handle = tokio::spawn(async move {
            let final_state = task.run().await;
            // 自分のエントリだけ外す（同じ key で新しい task が起動済みのことがある）
            let mut live = registry.lock().await;
            if live.get(&cleanup_key).is_some_and(|t| t.run_id == run_id) {
                live.remove(&cleanup_key);
            }
            final_state
        });

        live.insert(
            key,
            LiveTask {
                run_id,
                cancel,
                state,
                handle,
            },
        );
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{ErrorKind, StockState};
    use crate::impls::{InMemoryWatchStore, RecordingNotifier, ScriptedFetcher};
    use crate::ports::{FetchError, FixedClock};
    use chrono::{TimeZone, Utc};

    struct Fixture {
        store: Arc<InMemoryWatchStore>,
        fetcher: Arc<ScriptedFetcher>,
        notifier: Arc<RecordingNotifier>,
        scheduler: TrackingScheduler,
    }

    fn fixture(initial: Result<Observation, FetchError>) -> Fixture {
        let store = Arc::new(InMemoryWatchStore::new());
        let fetcher = Arc::new(ScriptedFetcher::new(initial));
        let notifier = Arc::new(RecordingNotifier::new());
        let config = SchedulerConfig::default().with_poll_interval(Duration::from_millis(20));
        let scheduler = TrackingScheduler::new(
            store.clone(),
            fetcher.clone(),
            notifier.clone(),
            config,
        );
        Fixture {
            store,
            fetcher,
            notifier,
            scheduler,
        }
    }

    fn widget(state: StockState) -> Result<Observation, FetchError> {
        Ok(Observation::new("Widget", "10", state))
    }

    fn key(owner: i64, url: &str) -> WatchKey {
        WatchKey::new(OwnerId::new(owner), url)
    }

    #[tokio::test]
    async fn add_persists_record_and_starts_task() {
        let f = fixture(widget(StockState::OutOfStock));
        let at = Utc.with_ymd_and_hms(2024, 1, 1, 12, 0, 0).unwrap();
        let scheduler = f.scheduler.with_clock(Arc::new(FixedClock::new(at)));

        let outcome = scheduler
            .add(OwnerId::new(1), "http://x/item", StockState::InStock)
            .await
            .unwrap();

        assert_eq!(outcome.title, "Widget");
        assert!(outcome.started);
        let record = f.store.get(&key(1, "http://x/item")).await.unwrap();
        assert_eq!(record.title, "Widget");
        assert_eq!(record.created_at, at);
        assert!(scheduler.is_live(&key(1, "http://x/item")).await);

        scheduler.shutdown().await;
    }

    #[tokio::test]
    async fn add_with_failing_fetch_still_tracks() {
        let f = fixture(Err(FetchError::Timeout));
        let outcome = f
            .scheduler
            .add(OwnerId::new(1), "http://x/item", StockState::InStock)
            .await
            .unwrap();

        assert_eq!(outcome.observation.state_tag, StockState::Unknown);
        assert_eq!(outcome.title, Observation::unknown().title);
        assert!(f.store.contains(&key(1, "http://x/item")).await);
        f.scheduler.shutdown().await;
    }

    #[tokio::test]
    async fn add_blank_url_is_validation_error() {
        let f = fixture(widget(StockState::InStock));
        let err = f
            .scheduler
            .add(OwnerId::new(1), "   ", StockState::InStock)
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Validation);
        assert_eq!(f.fetcher.calls(), 0);
    }

    #[tokio::test]
    async fn add_twice_starts_one_task() {
        let f = fixture(widget(StockState::OutOfStock));
        let first = f
            .scheduler
            .add(OwnerId::new(1), "http://x/item", StockState::InStock)
            .await
            .unwrap();
        let second = f
            .scheduler
            .add(OwnerId::new(1), "http://x/item", StockState::InStock)
            .await
            .unwrap();

        assert!(first.started);
        assert!(!second.started);
        assert_eq!(f.scheduler.live_count().await, 1);
        f.scheduler.shutdown().await;
    }

    #[tokio::test]
    async fn add_does_not_start_task_when_insert_fails() {
        let f = fixture(widget(StockState::InStock));
        f.store.set_unavailable(true);

        let err = f
            .scheduler
            .add(OwnerId::new(1), "http://x/item", StockState::InStock)
            .await
            .unwrap_err();

        assert_eq!(err.kind(), ErrorKind::Persistence);
        assert_eq!(f.scheduler.live_count().await, 0);
        assert!(f.store.is_empty().await);
    }

    #[tokio::test]
    async fn remove_deletes_record_and_cancels() {
        let f = fixture(widget(StockState::OutOfStock));
        f.scheduler
            .add(OwnerId::new(1), "http://x/item", StockState::InStock)
            .await
            .unwrap();

        let existed = f.scheduler.remove(&key(1, "http://x/item")).await.unwrap();

        assert!(existed);
        assert!(!f.store.contains(&key(1, "http://x/item")).await);
        assert!(!f.scheduler.is_live(&key(1, "http://x/item")).await);
    }

    #[tokio::test]
    async fn remove_unknown_key_reports_no_task() {
        let f = fixture(widget(StockState::OutOfStock));
        let existed = f.scheduler.remove(&key(1, "http://x/none")).await.unwrap();
        assert!(!existed);
    }

    #[tokio::test]
    async fn remove_keeps_task_when_delete_fails() {
        let f = fixture(widget(StockState::OutOfStock));
        f.scheduler
            .add(OwnerId::new(1), "http://x/item", StockState::InStock)
            .await
            .unwrap();
        f.store.set_unavailable(true);

        let err = f.scheduler.remove(&key(1, "http://x/item")).await.unwrap_err();

        assert_eq!(err.kind(), ErrorKind::Persistence);
        assert!(f.scheduler.is_live(&key(1, "http://x/item")).await);
        assert!(f.store.contains(&key(1, "http://x/item")).await);
        f.scheduler.shutdown().await;
    }

    #[tokio::test]
    async fn remove_by_short_id_resolves_url() {
        let f = fixture(widget(StockState::OutOfStock));
        f.scheduler
            .add(OwnerId::new(1), "http://x/item", StockState::InStock)
            .await
            .unwrap();

        let url = f
            .scheduler
            .remove_by_short_id(OwnerId::new(1), &ShortId::for_url("http://x/item"))
            .await
            .unwrap();

        assert_eq!(url, "http://x/item");
        assert!(!f.store.contains(&key(1, "http://x/item")).await);
        assert_eq!(f.scheduler.live_count().await, 0);
    }

    #[tokio::test]
    async fn remove_by_short_id_is_scoped_to_owner() {
        let f = fixture(widget(StockState::OutOfStock));
        f.scheduler
            .add(OwnerId::new(1), "http://x/item", StockState::InStock)
            .await
            .unwrap();

        let err = f
            .scheduler
            .remove_by_short_id(OwnerId::new(2), &ShortId::for_url("http://x/item"))
            .await
            .unwrap_err();

        assert_eq!(err.kind(), ErrorKind::NotFound);
        assert!(f.scheduler.is_live(&key(1, "http://x/item")).await);
        f.scheduler.shutdown().await;
    }

    #[tokio::test]
    async fn restore_with_no_records_is_noop() {
        let f = fixture(widget(StockState::OutOfStock));
        assert_eq!(f.scheduler.restore().await.unwrap(), 0);
        assert_eq!(f.scheduler.live_count().await, 0);
    }

    #[tokio::test]
    async fn list_for_owner_reads_store() {
        let f = fixture(widget(StockState::OutOfStock));
        f.scheduler
            .add(OwnerId::new(1), "http://x/a", StockState::InStock)
            .await
            .unwrap();
        f.scheduler
            .add(OwnerId::new(2), "http://x/b", StockState::InStock)
            .await
            .unwrap();

        let records = f.scheduler.list_for_owner(OwnerId::new(1)).await.unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].url, "http://x/a");
        f.scheduler.shutdown().await;
    }

    #[tokio::test]
    async fn shutdown_cancels_everything_but_keeps_records() {
        let f = fixture(widget(StockState::OutOfStock));
        for url in ["http://x/a", "http://x/b", "http://x/c"] {
            f.scheduler
                .add(OwnerId::new(1), url, StockState::InStock)
                .await
                .unwrap();
        }
        assert_eq!(f.scheduler.live_count().await, 3);

        f.scheduler.shutdown().await;

        assert_eq!(f.scheduler.live_count().await, 0);
        assert_eq!(f.store.len().await, 3);
        assert_eq!(f.notifier.count().await, 0);
    }

    /// 送信が返ってこない通知先
    struct StalledNotifier;

    #[async_trait::async_trait]
    impl Notifier for StalledNotifier {
        async fn notify(
            &self,
            _alert: &crate::domain::StockAlert,
        ) -> Result<(), crate::ports::NotifyError> {
            std::future::pending().await
        }

        fn channel_name(&self) -> &str {
            "stalled"
        }
    }

    #[tokio::test]
    async fn shutdown_completes_while_alert_send_is_stuck() {
        let store = Arc::new(InMemoryWatchStore::new());
        let fetcher = Arc::new(ScriptedFetcher::new(widget(StockState::InStock)));
        let scheduler = TrackingScheduler::new(
            store,
            fetcher.clone(),
            Arc::new(StalledNotifier),
            SchedulerConfig::default().with_poll_interval(Duration::from_millis(20)),
        );
        scheduler
            .add(OwnerId::new(1), "http://x/item", StockState::InStock)
            .await
            .unwrap();
        tokio::time::timeout(Duration::from_secs(2), fetcher.wait_for_calls(2))
            .await
            .unwrap();

        tokio::time::timeout(Duration::from_secs(2), scheduler.shutdown())
            .await
            .expect("shutdown must not wait on a stuck alert");
        assert_eq!(scheduler.live_count().await, 0);
    }

    #[tokio::test]
    async fn task_state_reports_running_for_live_watch() {
        let f = fixture(widget(StockState::OutOfStock));
        let k = key(1, "http://x/item");
        assert_eq!(f.scheduler.task_state(&k).await, None);

        f.scheduler
            .add(OwnerId::new(1), "http://x/item", StockState::InStock)
            .await
            .unwrap();
        assert_eq!(f.scheduler.task_state(&k).await, Some(WatchTaskState::Running));

        f.scheduler.remove(&k).await.unwrap();
        assert_eq!(f.scheduler.task_state(&k).await, None);
    }
}
