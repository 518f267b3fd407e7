//! SchedulerConfig - poll 間隔と既定の target

use std::time::Duration;

use crate::domain::StockState;

#[derive(Debug, Clone)]
pub struct SchedulerConfig {
    /// 各 watch task のサイクル間の sleep
    pub poll_interval: Duration,
    /// restore で起動する task の target
    pub default_target: StockState,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_secs(3),
            default_target: StockState::InStock,
        }
    }
}

impl SchedulerConfig {
    pub fn with_poll_interval(mut self, poll_interval: Duration) -> Self {
        self.poll_interval = poll_interval;
        self
    }

    pub fn with_default_target(mut self, target: StockState) -> Self {
        self.default_target = target;
        self
    }
}
