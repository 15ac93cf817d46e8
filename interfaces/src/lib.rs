pub mod defs;

pub use defs::{ConnectionStatus, FeedItem, FeedSource, Notifier};
