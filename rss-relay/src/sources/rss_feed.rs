use crate::types::{FeedItem, FeedSource, FetchConfig, Result};
use crate::{FeedParser, Fetcher};
use async_trait::async_trait;
use tracing::debug;

/// Feed source that downloads over HTTP and parses with feed-rs.
pub struct HttpFeedSource {
    url: String,
    fetcher: Fetcher,
}

impl HttpFeedSource {
    pub fn new(url: impl Into<String>, fetch_config: FetchConfig) -> Result<Self> {
        Ok(Self {
            url: url.into(),
            fetcher: Fetcher::new(fetch_config)?,
        })
    }
}

#[async_trait]
impl FeedSource for HttpFeedSource {
    fn url(&self) -> &str {
        &self.url
    }

    async fn fetch(&self) -> anyhow::Result<Vec<FeedItem>> {
        let content = self.fetcher.fetch_feed(&self.url).await?;
        let items = FeedParser::parse_feed(&content)?;

        debug!("Pulled {} items from {}", items.len(), self.url);
        Ok(items)
    }
}
