//! Scripted doubles for the fetch / notify ports.
//!
//! Used by the scheduler tests, where no real product page or chat is involved.

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::{Mutex, Notify};

use crate::domain::{Observation, StockAlert};
use crate::ports::{FetchError, Notifier, NotifyError, StatusFetcher};

/// Returns whatever result was last scripted, optionally after a delay.
///
/// A per-url script wins over the default one.
pub struct ScriptedFetcher {
    default: Mutex<Result<Observation, FetchError>>,
    per_url: Mutex<HashMap<String, Result<Observation, FetchError>>>,
    delay: Mutex<Duration>,
    calls: AtomicUsize,
    called: Notify,
}

impl ScriptedFetcher {
    pub fn new(initial: Result<Observation, FetchError>) -> Self {
        Self {
            default: Mutex::new(initial),
            per_url: Mutex::new(HashMap::new()),
            delay: Mutex::new(Duration::ZERO),
            calls: AtomicUsize::new(0),
            called: Notify::new(),
        }
    }

    /// Fetcher that always fails with a timeout.
    pub fn failing() -> Self {
        Self::new(Err(FetchError::Timeout))
    }

    pub async fn set(&self, result: Result<Observation, FetchError>) {
        *self.default.lock().await = result;
    }

    pub async fn set_for(&self, url: impl Into<String>, result: Result<Observation, FetchError>) {
        self.per_url.lock().await.insert(url.into(), result);
    }

    /// Every fetch sleeps this long before answering.
    pub async fn set_delay(&self, delay: Duration) {
        *self.delay.lock().await = delay;
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    /// Wait until at least `n` fetches have started.
    pub async fn wait_for_calls(&self, n: usize) {
        loop {
            let notified = self.called.notified();
            if self.calls() >= n {
                return;
            }
            notified.await;
        }
    }
}

#[async_trait]
impl StatusFetcher for ScriptedFetcher {
    async fn fetch(&self, url: &str) -> Result<Observation, FetchError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.called.notify_waiters();

        let delay = *self.delay.lock().await;
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }

        if let Some(result) = self.per_url.lock().await.get(url) {
            return result.clone();
        }
        self.default.lock().await.clone()
    }
}

/// Keeps every alert it is asked to deliver.
#[derive(Default)]
pub struct RecordingNotifier {
    alerts: Arc<Mutex<Vec<StockAlert>>>,
    delivered: Notify,
}

impl RecordingNotifier {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn alerts(&self) -> Vec<StockAlert> {
        self.alerts.lock().await.clone()
    }

    pub async fn count(&self) -> usize {
        self.alerts.lock().await.len()
    }

    /// Wait until at least `n` alerts have been recorded.
    pub async fn wait_for(&self, n: usize) {
        loop {
            let notified = self.delivered.notified();
            if self.count().await >= n {
                return;
            }
            notified.await;
        }
    }
}

#[async_trait]
impl Notifier for RecordingNotifier {
    async fn notify(&self, alert: &StockAlert) -> Result<(), NotifyError> {
        tracing::info!(owner = %alert.owner, url = %alert.url, text = %alert.text(), "alert recorded");
        self.alerts.lock().await.push(alert.clone());
        self.delivered.notify_waiters();
        Ok(())
    }

    fn channel_name(&self) -> &str {
        "recording"
    }
}
