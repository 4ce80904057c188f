//! Catalog page retrieval
//!
//! One request per page, no retries: a failed page is reported to the
//! orchestrator and abandoned for the rest of the cycle.

use async_trait::async_trait;
use reqwest::Client;
use std::time::Duration;
use tracing::debug;

use crate::cache_hint::CacheHint;
use crate::error::{IngestError, IngestResult};
use crate::models::{PageBody, RawPage};

/// Source of catalog pages
#[async_trait]
pub trait PageFetcher: Send + Sync {
    /// Fetch one page of the catalog
    async fn fetch_page(&self, page: u32) -> IngestResult<RawPage>;

    /// Read the cache metadata of the first page without using its body
    async fn fresh_cache_hint(&self) -> IngestResult<CacheHint> {
        Ok(self.fetch_page(0).await?.cache_hint)
    }
}

/// `PageFetcher` over the upstream HTTP API
#[derive(Clone)]
pub struct HttpPageFetcher {
    client: Client,
    base_url: String,
    timeout: Duration,
}

impl HttpPageFetcher {
    /// Create a fetcher for `{base_url}/auctions?page=N`
    pub fn new(base_url: impl Into<String>, timeout: Duration) -> IngestResult<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .user_agent(concat!("ahsnap/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| IngestError::Config(format!("Failed to build HTTP client: {}", e)))?;

        Ok(Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            timeout,
        })
    }

    fn page_url(&self) -> String {
        format!("{}/auctions", self.base_url)
    }

    fn request_error(&self, page: u32, err: reqwest::Error) -> IngestError {
        if err.is_timeout() {
            IngestError::Timeout {
                page,
                secs: self.timeout.as_secs(),
            }
        } else {
            IngestError::upstream(page, err.to_string())
        }
    }

    async fn get(&self, page: u32) -> IngestResult<reqwest::Response> {
        let response = self
            .client
            .get(self.page_url())
            .query(&[("page", page)])
            .send()
            .await
            .map_err(|e| self.request_error(page, e))?;

        let status = response.status();
        if !status.is_success() {
            return Err(IngestError::upstream(page, format!("HTTP {}", status)));
        }

        Ok(response)
    }
}

#[async_trait]
impl PageFetcher for HttpPageFetcher {
    async fn fetch_page(&self, page: u32) -> IngestResult<RawPage> {
        let response = self.get(page).await?;
        let cache_hint = CacheHint::from_headers(response.headers());

        let body: PageBody = response.json().await.map_err(|e| {
            if e.is_timeout() {
                self.request_error(page, e)
            } else {
                IngestError::upstream(page, format!("Invalid page body: {}", e))
            }
        })?;

        debug!(
            page,
            total_pages = body.total_pages,
            auctions = body.auctions.len(),
            "Fetched catalog page"
        );

        Ok(RawPage::from_body(page, body, cache_hint))
    }

    async fn fresh_cache_hint(&self) -> IngestResult<CacheHint> {
        let response = self.get(0).await?;
        Ok(CacheHint::from_headers(response.headers()))
    }
}
