use crate::types::{FeedItem, RelayError, Result};
use feed_rs::parser;
use tracing::debug;

pub struct FeedParser;

impl FeedParser {
    /// Parse RSS, Atom or JSON Feed content into items, keeping document
    /// order.
    pub fn parse_feed(content: &[u8]) -> Result<Vec<FeedItem>> {
        debug!("Parsing feed content ({} bytes)", content.len());

        let feed = parser::parse(content)
            .map_err(|e| RelayError::Parse(format!("Failed to parse feed: {}", e)))?;

        let items: Vec<FeedItem> = feed.entries.into_iter().map(Self::parse_entry).collect();

        debug!("Parsed feed with {} entries", items.len());
        Ok(items)
    }

    fn parse_entry(entry: feed_rs::model::Entry) -> FeedItem {
        let title = entry
            .title
            .map(|t| t.content.trim().to_string())
            .filter(|t| !t.is_empty())
            .unwrap_or_else(|| "Untitled".to_string());

        let link = entry
            .links
            .first()
            .map(|l| l.href.clone())
            .unwrap_or_default();

        let guid = if !entry.id.is_empty() {
            Some(entry.id)
        } else {
            None
        };

        FeedItem {
            title,
            link,
            guid,
            description: entry.summary.map(|s| s.content),
            published: entry.published.or(entry.updated),
        }
    }
}
