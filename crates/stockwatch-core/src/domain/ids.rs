//! Domain identifiers (strongly-typed IDs).
//!
//! # 監視の識別子
//! - **OwnerId**: 監視を依頼した相手（Telegram の chat_id）
//! - **WatchKey**: `(owner, url)` の複合キー。監視の一意性はこの単位
//! - **ShortId**: url の SHA-256 先頭 10 桁。コールバックで url を短く参照する
//! - **RunId**: watch task 1 回分の実行 ID（ULID）
//!
//! ## Phantom Type パターン
//! `Id<T>` は ULID をラップし、`T` はマーカー型としてコンパイル時にだけ使います。
//! 現在は `RunId` のみですが、ID の種類が増えても混同できません。

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fmt;
use std::marker::PhantomData;
use ulid::Ulid;

/// ShortId の桁数（hex 文字数）
pub const SHORT_ID_LEN: usize = 10;

/// IdMarker は各 ID 型のマーカー trait
///
/// Display で使うプレフィックス（"run-" など）を提供します。
pub trait IdMarker: Send + Sync + 'static {
    fn prefix() -> &'static str;
}

/// ジェネリック ID 型
#[repr(transparent)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Id<T: IdMarker> {
    ulid: Ulid,
    #[serde(skip)]
    _marker: PhantomData<T>,
}

impl<T: IdMarker> Id<T> {
    pub fn from_ulid(ulid: Ulid) -> Self {
        Self {
            ulid,
            _marker: PhantomData,
        }
    }

    pub fn as_ulid(&self) -> Ulid {
        self.ulid
    }
}

impl<T: IdMarker> From<Ulid> for Id<T> {
    fn from(ulid: Ulid) -> Self {
        Self::from_ulid(ulid)
    }
}

impl<T: IdMarker> fmt::Display for Id<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}", T::prefix(), self.ulid)
    }
}

/// Watch task 実行のマーカー型
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Run {}

impl IdMarker for Run {
    fn prefix() -> &'static str {
        "run-"
    }
}

/// 1 回の watch task 実行を識別する ID
///
/// 同じ WatchKey でも Remove → Add すると別の RunId になります。
pub type RunId = Id<Run>;

/// 監視の依頼者（chat）
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct OwnerId(i64);

impl OwnerId {
    pub fn new(value: i64) -> Self {
        Self(value)
    }

    pub fn get(&self) -> i64 {
        self.0
    }
}

impl From<i64> for OwnerId {
    fn from(value: i64) -> Self {
        Self(value)
    }
}

impl fmt::Display for OwnerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// `(owner, url)` の複合キー
///
/// 同じ url でも owner が違えば独立した監視になります。
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct WatchKey {
    owner: OwnerId,
    url: String,
}

impl WatchKey {
    pub fn new(owner: OwnerId, url: impl Into<String>) -> Self {
        Self {
            owner,
            url: url.into(),
        }
    }

    pub fn owner(&self) -> OwnerId {
        self.owner
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    pub fn short_id(&self) -> ShortId {
        ShortId::for_url(&self.url)
    }
}

impl fmt::Display for WatchKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.owner, self.url)
    }
}

/// url の短縮 ID（SHA-256 hex の先頭 10 文字）
///
/// 決定的なので、store に保存しなくても url から再計算して照合できます。
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ShortId(String);

impl ShortId {
    pub fn for_url(url: &str) -> Self {
        let digest = Sha256::digest(url.as_bytes());
        let mut hex = hex::encode(digest);
        hex.truncate(SHORT_ID_LEN);
        Self(hex)
    }

    /// 外部から受け取った文字列を ShortId として解釈
    ///
    /// 長さと文字種だけ検証します。存在するかどうかは store 側で照合します。
    pub fn parse(s: &str) -> Option<Self> {
        let s = s.trim();
        if s.len() == SHORT_ID_LEN && s.chars().all(|c| c.is_ascii_hexdigit()) {
            Some(Self(s.to_ascii_lowercase()))
        } else {
            None
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ShortId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[test]
    fn short_id_is_deterministic_and_fixed_length() {
        let a = ShortId::for_url("http://x/item");
        let b = ShortId::for_url("http://x/item");
        assert_eq!(a, b);
        assert_eq!(a.as_str().len(), SHORT_ID_LEN);
    }

    #[test]
    fn short_id_matches_sha256_prefix() {
        // sha256("abc") = ba7816bf8f01cfea...
        assert_eq!(ShortId::for_url("abc").as_str(), "ba7816bf8f");
    }

    #[test]
    fn different_urls_get_different_short_ids() {
        assert_ne!(
            ShortId::for_url("http://x/item"),
            ShortId::for_url("http://x/other")
        );
    }

    #[rstest]
    #[case::valid("ba7816bf8f", true)]
    #[case::uppercase("BA7816BF8F", true)]
    #[case::too_short("ba7816", false)]
    #[case::too_long("ba7816bf8f01", false)]
    #[case::not_hex("zz7816bf8f", false)]
    #[case::empty("", false)]
    fn short_id_parse(#[case] input: &str, #[case] ok: bool) {
        assert_eq!(ShortId::parse(input).is_some(), ok);
    }

    #[test]
    fn parsed_short_id_is_lowercase() {
        let parsed = ShortId::parse("BA7816BF8F").unwrap();
        assert_eq!(parsed, ShortId::for_url("abc"));
    }

    #[test]
    fn watch_key_identity_is_per_owner() {
        let a = WatchKey::new(OwnerId::new(1), "http://x/item");
        let b = WatchKey::new(OwnerId::new(2), "http://x/item");
        assert_ne!(a, b);
        assert_eq!(a.short_id(), b.short_id());
    }

    #[test]
    fn run_id_display_has_prefix() {
        let id = RunId::from_ulid(Ulid::new());
        assert!(id.to_string().starts_with("run-"));
    }
}
