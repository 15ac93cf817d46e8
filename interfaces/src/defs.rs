use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// One entry of a syndicated feed.
///
/// The title doubles as the item's identity: two entries with the same title
/// are the same item as far as announcement is concerned.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct FeedItem {
    pub title: String,
    pub link: String,
    pub guid: Option<String>,
    pub description: Option<String>,
    pub published: Option<DateTime<Utc>>,
}

impl FeedItem {
    pub fn new(title: impl Into<String>, link: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            link: link.into(),
            guid: None,
            description: None,
            published: None,
        }
    }

    pub fn identity(&self) -> &str {
        &self.title
    }
}

/// Somewhere feed items come from.
#[async_trait]
pub trait FeedSource: Send + Sync {
    /// Location of the feed, used in logs.
    fn url(&self) -> &str;

    /// Fetch and parse the feed. Items are returned in document order,
    /// which for well-behaved feeds is newest first.
    async fn fetch(&self) -> Result<Vec<FeedItem>>;
}

pub trait ConnectionStatus: Send + Sync {
    fn is_connected(&self) -> bool;
}

/// Outbound delivery path shared by every poller.
///
/// Implementations pace consecutive sends and serialize their own writes.
/// Failures are handled (or logged) by the implementation; callers never
/// retry.
#[async_trait]
pub trait Notifier: ConnectionStatus {
    async fn deliver(&self, channels: &[String], message: &str);
}

// Object style note:
// A FeedSource is owned by exactly one poller task, while one Notifier is
// shared by all of them behind an Arc. Keep per-feed state out of Notifier
// implementations.
