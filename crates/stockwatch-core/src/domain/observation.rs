//! Observation - fetch 1 回分の観測結果（永続化しない）

use serde::{Deserialize, Serialize};

use super::StockState;

pub const TITLE_NOT_FOUND: &str = "Title not found";
pub const PRICE_NOT_FOUND: &str = "Price not found";

const ERROR_TITLE: &str = "Error loading page";
const ERROR_PRICE: &str = "Price unavailable";

/// ページから読み取った表示名・価格・在庫状態
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Observation {
    pub title: String,
    pub price: String,
    pub in_target_state: bool,
    pub state_tag: StockState,
}

impl Observation {
    /// `in_target_state` は InStock のときだけ true
    pub fn new(title: impl Into<String>, price: impl Into<String>, state_tag: StockState) -> Self {
        Self {
            title: title.into(),
            price: price.into(),
            in_target_state: state_tag == StockState::InStock,
            state_tag,
        }
    }

    /// 「今回は信号なし」を表す観測
    ///
    /// fetch 失敗（timeout / transport / parse）はすべてこれに畳み込まれます。
    pub fn unknown() -> Self {
        Self {
            title: ERROR_TITLE.to_string(),
            price: ERROR_PRICE.to_string(),
            in_target_state: false,
            state_tag: StockState::Unknown,
        }
    }

    pub fn matches(&self, target: StockState) -> bool {
        self.state_tag == target
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn in_stock_observation_is_in_target_state() {
        let obs = Observation::new("Widget", "10", StockState::InStock);
        assert!(obs.in_target_state);
        assert!(obs.matches(StockState::InStock));
    }

    #[test]
    fn out_of_stock_observation_is_not_in_target_state() {
        let obs = Observation::new("Widget", "10", StockState::OutOfStock);
        assert!(!obs.in_target_state);
        assert!(!obs.matches(StockState::InStock));
    }

    #[test]
    fn unknown_never_matches_in_stock() {
        let obs = Observation::unknown();
        assert_eq!(obs.state_tag, StockState::Unknown);
        assert!(!obs.in_target_state);
        assert!(!obs.matches(StockState::InStock));
    }
}
