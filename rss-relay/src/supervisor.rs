use crate::config::FeedConfig;
use crate::poller::FeedPoller;
use crate::sources::HttpFeedSource;
use crate::types::{FeedSource, FetchConfig, Notifier, Result};
use std::sync::Arc;
use tokio::sync::watch;
use tokio::task::JoinSet;
use tracing::{info, warn};

/// Owns one long-lived task per feed.
///
/// Dropping the supervisor aborts every poller; [`PollSupervisor::shutdown`]
/// lets them finish their current step first.
pub struct PollSupervisor {
    notifier: Arc<dyn Notifier>,
    shutdown: watch::Sender<bool>,
    tasks: JoinSet<()>,
}

impl PollSupervisor {
    pub fn new(notifier: Arc<dyn Notifier>) -> Self {
        let (shutdown, _) = watch::channel(false);
        Self {
            notifier,
            shutdown,
            tasks: JoinSet::new(),
        }
    }

    /// Start a poller for `feed` reading from `source`.
    pub fn spawn(&mut self, feed: FeedConfig, source: Arc<dyn FeedSource>) {
        info!(url = %feed.feed_url, channels = ?feed.channels, "Starting poller");

        let poller = FeedPoller::new(feed, source, Arc::clone(&self.notifier));
        self.tasks.spawn(poller.run(self.shutdown.subscribe()));
    }

    /// Start an HTTP poller for every configured feed.
    pub fn spawn_all(&mut self, feeds: &[FeedConfig], fetch_config: &FetchConfig) -> Result<()> {
        for feed in feeds {
            let source = HttpFeedSource::new(feed.feed_url.clone(), fetch_config.clone())?;
            self.spawn(feed.clone(), Arc::new(source));
        }
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.tasks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tasks.is_empty()
    }

    /// A receiver that flips to `true` on shutdown, for other background
    /// tasks that should stop with the pollers.
    pub fn subscribe(&self) -> watch::Receiver<bool> {
        self.shutdown.subscribe()
    }

    /// Signal every poller to stop and wait for them.
    pub async fn shutdown(mut self) {
        let _ = self.shutdown.send(true);

        while let Some(result) = self.tasks.join_next().await {
            if let Err(e) = result {
                warn!("Poller task ended abnormally: {}", e);
            }
        }

        info!("All pollers stopped");
    }
}
