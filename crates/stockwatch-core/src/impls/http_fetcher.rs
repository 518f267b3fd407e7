//! HttpStatusFetcher - 商品ページを取得して在庫状態を読み取る
//!
//! # フロー
//! 1. reqwest で GET（timeout 付き）
//! 2. 2xx 以外は `FetchError::Status`
//! 3. scraper で schema.org の microdata を読む
//!    - 表示名: `h1[itemprop="name"]`
//!    - 価格: `meta[itemprop="price"]` の content
//!    - 在庫: `[itemprop="offers"]` 内の `[itemprop="availability"]`

use std::time::Duration;

use async_trait::async_trait;
use scraper::{Html, Selector};

use crate::domain::{Observation, PRICE_NOT_FOUND, StockState, TITLE_NOT_FOUND};
use crate::ports::{FetchError, StatusFetcher};

const DEFAULT_USER_AGENT: &str = concat!("stockwatch/", env!("CARGO_PKG_VERSION"));

#[derive(Debug, Clone)]
pub struct HttpFetcherConfig {
    /// 1 リクエストの上限時間
    pub timeout: Duration,
    pub user_agent: String,
}

impl Default for HttpFetcherConfig {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(10),
            user_agent: DEFAULT_USER_AGENT.to_string(),
        }
    }
}

impl HttpFetcherConfig {
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }
}

pub struct HttpStatusFetcher {
    client: reqwest::Client,
}

impl HttpStatusFetcher {
    pub fn new(config: HttpFetcherConfig) -> Result<Self, FetchError> {
        let client = reqwest::Client::builder()
            .timeout(config.timeout)
            .user_agent(config.user_agent)
            .build()
            .map_err(|e| FetchError::Http(format!("client build failed: {e}")))?;
        Ok(Self { client })
    }
}

fn classify(err: reqwest::Error) -> FetchError {
    if err.is_timeout() {
        FetchError::Timeout
    } else {
        FetchError::Http(err.to_string())
    }
}

#[async_trait]
impl StatusFetcher for HttpStatusFetcher {
    async fn fetch(&self, url: &str) -> Result<Observation, FetchError> {
        tracing::trace!(url, "fetching product page");

        let response = self.client.get(url).send().await.map_err(classify)?;
        let status = response.status();
        if !status.is_success() {
            return Err(FetchError::Status(status.as_u16()));
        }
        let html = response.text().await.map_err(classify)?;

        tracing::trace!(url, bytes = html.len(), "product page received");

        parse_product_page(&html)
    }
}

fn selector(css: &str) -> Result<Selector, FetchError> {
    Selector::parse(css).map_err(|e| FetchError::Parse(format!("invalid selector {css}: {e:?}")))
}

/// 商品ページの HTML を Observation に変換
///
/// テストしやすいように fetch から分離しています。
/// 要素が見つからない場合はエラーにせず、既定の文言と `Unknown` を使います。
pub fn parse_product_page(html: &str) -> Result<Observation, FetchError> {
    let document = Html::parse_document(html);

    let title_sel = selector(r#"h1[itemprop="name"]"#)?;
    let price_sel = selector(r#"meta[itemprop="price"]"#)?;
    let offers_sel = selector(r#"[itemprop="offers"]"#)?;
    let availability_sel = selector(r#"[itemprop="availability"]"#)?;

    let title = document
        .select(&title_sel)
        .next()
        .map(|el| el.text().collect::<String>().trim().to_string())
        .filter(|t| !t.is_empty())
        .unwrap_or_else(|| TITLE_NOT_FOUND.to_string());

    let price = document
        .select(&price_sel)
        .next()
        .and_then(|el| el.value().attr("content"))
        .map(|p| p.trim().to_string())
        .filter(|p| !p.is_empty())
        .unwrap_or_else(|| PRICE_NOT_FOUND.to_string());

    let state = document
        .select(&offers_sel)
        .find_map(|offers| {
            offers.select(&availability_sel).find_map(|el| {
                el.value()
                    .attr("content")
                    .or_else(|| el.value().attr("href"))
            })
        })
        .map(StockState::from_availability)
        .unwrap_or(StockState::Unknown);

    Ok(Observation::new(title, price, state))
}
