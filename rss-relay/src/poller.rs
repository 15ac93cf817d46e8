//! Per-feed polling loop.
//!
//! A [`FeedPoller`] waits until the notifier is connected, then repeatedly
//! fetches its feed, filters the newest `max_history` items through its
//! [`DedupCache`] and announces whatever it has not seen before, in fetch
//! order. The first successful fetch only seeds the cache so that a restart
//! does not replay the feed's backlog into the channels.
//!
//! After every successful cycle the cache holds the whole fetch window, which
//! is what keeps an item from being announced twice while it stays near the
//! top of the feed.

use crate::cache::DedupCache;
use crate::config::FeedConfig;
use crate::types::{CycleReport, FeedItem, FeedSource, Notifier, RelayError, Result};
use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tracing::{debug, info, warn};

/// How often the connection gate re-checks the notifier.
pub const CONNECTION_CHECK_INTERVAL: Duration = Duration::from_secs(10);

/// Extra wait after the notifier reports connected, for channel joins.
pub const JOIN_GRACE_PERIOD: Duration = Duration::from_secs(1);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PollerState {
    WaitingForConnection,
    Running,
}

pub struct FeedPoller {
    feed: FeedConfig,
    source: Arc<dyn FeedSource>,
    notifier: Arc<dyn Notifier>,
    cache: DedupCache,
    first_run: bool,
    state: PollerState,
}

impl FeedPoller {
    pub fn new(feed: FeedConfig, source: Arc<dyn FeedSource>, notifier: Arc<dyn Notifier>) -> Self {
        let cache = DedupCache::new(feed.max_history);
        Self {
            feed,
            source,
            notifier,
            cache,
            first_run: true,
            state: PollerState::WaitingForConnection,
        }
    }

    pub fn url(&self) -> &str {
        &self.feed.feed_url
    }

    pub fn state(&self) -> PollerState {
        self.state
    }

    pub fn is_first_run(&self) -> bool {
        self.first_run
    }

    pub fn cache(&self) -> &DedupCache {
        &self.cache
    }

    /// Block until the notifier is connected, then move to `Running`.
    ///
    /// Returns `false` if shutdown was requested while waiting.
    pub async fn wait_for_connection(&mut self, shutdown: &mut watch::Receiver<bool>) -> bool {
        while !self.notifier.is_connected() {
            if !sleep_or_shutdown(CONNECTION_CHECK_INTERVAL, shutdown).await {
                return false;
            }
        }

        if !sleep_or_shutdown(JOIN_GRACE_PERIOD, shutdown).await {
            return false;
        }

        self.state = PollerState::Running;
        true
    }

    /// One fetch/filter/announce pass.
    ///
    /// A fetch failure is returned as an error and leaves the cache and the
    /// first-run flag untouched.
    pub async fn poll_cycle(&mut self) -> Result<CycleReport> {
        debug!(url = %self.feed.feed_url, "Polling");

        let items = self.source.fetch().await.map_err(|e| RelayError::Fetch {
            url: self.feed.feed_url.clone(),
            reason: format!("{:#}", e),
        })?;

        Ok(self.announce(items).await)
    }

    async fn announce(&mut self, items: Vec<FeedItem>) -> CycleReport {
        let fetched = items.len();
        let window: Vec<FeedItem> = items.into_iter().take(self.feed.max_history).collect();

        // Diff the whole window before the cache changes, so an eviction
        // caused by one new item cannot make another seen item look new.
        let messages: Vec<String> = {
            let mut fresh = HashSet::new();
            window
                .iter()
                .filter(|item| !self.cache.exists(item.identity()) && fresh.insert(item.identity()))
                .map(announcement)
                .collect()
        };

        let report = CycleReport {
            fetched,
            considered: window.len(),
            new_items: messages.len(),
            announced: 0,
            seeded: self.first_run,
        };

        // Oldest first, refreshing entries still in the window, so FIFO
        // eviction only drops what has left it.
        for item in window.into_iter().rev() {
            if !self.cache.touch(item.identity()) {
                self.cache.save(item);
            }
        }

        if self.first_run {
            // The first run only populates the cache. Later runs announce.
            debug!(url = %self.feed.feed_url, items = report.new_items, "Cache populated");
            self.first_run = false;
            return report;
        }

        let mut report = report;
        for message in messages {
            if self.feed.channels.is_empty() {
                warn!(
                    message = %message,
                    url = %self.feed.feed_url,
                    "No channels provided for message"
                );
                continue;
            }

            self.notifier.deliver(&self.feed.channels, &message).await;
            report.announced += 1;
        }

        report
    }

    /// Gate on the connection, then poll until shutdown is requested.
    pub async fn run(mut self, mut shutdown: watch::Receiver<bool>) {
        if !self.wait_for_connection(&mut shutdown).await {
            return;
        }

        info!(url = %self.feed.feed_url, interval = ?self.feed.poll_interval(), "Poller running");

        loop {
            match self.poll_cycle().await {
                Ok(report) => debug!(
                    url = %self.feed.feed_url,
                    fetched = report.fetched,
                    new = report.new_items,
                    announced = report.announced,
                    "Poll complete"
                ),
                Err(e) => warn!(
                    url = %self.feed.feed_url,
                    error = %e,
                    "An error occurred polling the feed"
                ),
            }

            if !sleep_or_shutdown(self.feed.poll_interval(), &mut shutdown).await {
                break;
            }
        }

        debug!(url = %self.feed.feed_url, "Poller stopped");
    }
}

/// The line announced for a new item.
pub fn announcement(item: &FeedItem) -> String {
    format!("{} {}", item.title, item.link)
}

/// Sleep for `duration`, returning `false` early if shutdown is signalled or
/// its sender is gone.
pub(crate) async fn sleep_or_shutdown(duration: Duration, shutdown: &mut watch::Receiver<bool>) -> bool {
    if *shutdown.borrow() {
        return false;
    }

    tokio::select! {
        _ = tokio::time::sleep(duration) => true,
        changed = shutdown.changed() => changed.is_ok() && !*shutdown.borrow(),
    }
}
