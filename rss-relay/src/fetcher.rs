use crate::types::{FetchConfig, RelayError, Result};
use backoff::{backoff::Backoff, exponential::ExponentialBackoff};
use reqwest::{Client, Response};
use std::time::{Duration, Instant};
use tracing::{debug, warn};

pub struct Fetcher {
    client: Client,
    config: FetchConfig,
}

impl Fetcher {
    pub fn new(config: FetchConfig) -> Result<Self> {
        let client = Client::builder()
            .user_agent(&config.user_agent)
            .timeout(Duration::from_secs(config.timeout_seconds))
            .gzip(true)
            .deflate(true)
            .brotli(true)
            .redirect(reqwest::redirect::Policy::limited(config.max_redirects))
            .build()?;

        Ok(Self { client, config })
    }

    /// Download a feed body, retrying transport errors and non-success
    /// statuses with exponential backoff.
    pub async fn fetch_feed(&self, url: &str) -> Result<Vec<u8>> {
        let start_time = Instant::now();
        debug!("Fetching feed: {}", url);

        let retry_delay = Duration::from_secs(self.config.retry_delay_seconds);
        let mut backoff: ExponentialBackoff<backoff::SystemClock> = ExponentialBackoff {
            current_interval: retry_delay,
            initial_interval: retry_delay,
            max_interval: retry_delay * 32,
            multiplier: 2.0,
            max_elapsed_time: Some(retry_delay * 60),
            ..Default::default()
        };

        for attempt in 0..=self.config.max_retries {
            let error = match self.client.get(url).send().await {
                Ok(response) if response.status().is_success() => {
                    let body = self.read_body(url, response).await?;
                    debug!(
                        "Fetched feed: {} ({} bytes in {}ms)",
                        url,
                        body.len(),
                        start_time.elapsed().as_millis()
                    );
                    return Ok(body);
                }
                Ok(response) => RelayError::HttpStatus {
                    url: url.to_string(),
                    status: response.status().as_u16(),
                },
                Err(e) => RelayError::Http(e),
            };

            if attempt < self.config.max_retries {
                if let Some(delay) = backoff.next_backoff() {
                    warn!("Attempt {} failed for {}: {}, retrying in {:?}", attempt + 1, url, error, delay);
                    tokio::time::sleep(delay).await;
                    continue;
                }
            }

            return Err(error);
        }

        Err(RelayError::Fetch {
            url: url.to_string(),
            reason: "no attempt was made".to_string(),
        })
    }

    async fn read_body(&self, url: &str, response: Response) -> Result<Vec<u8>> {
        let limit = self.config.max_feed_size_mb * 1024 * 1024;

        if let Some(content_length) = response.content_length() {
            if content_length as usize > limit {
                return Err(RelayError::FeedTooLarge {
                    size_mb: content_length as usize / (1024 * 1024),
                });
            }
        }

        let body = response.bytes().await?;
        if body.len() > limit {
            warn!("Feed body from {} exceeded the size limit", url);
            return Err(RelayError::FeedTooLarge {
                size_mb: body.len() / (1024 * 1024),
            });
        }

        Ok(body.to_vec())
    }
}
