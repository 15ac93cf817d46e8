pub mod types;
pub mod cache;
pub mod config;
pub mod fetcher;
pub mod parser;
pub mod sources;
pub mod poller;
pub mod supervisor;
pub mod irc;

pub use types::*;
pub use cache::DedupCache;
pub use config::{Config, FeedConfig, IrcConfig};
pub use fetcher::Fetcher;
pub use parser::FeedParser;
pub use poller::{FeedPoller, PollerState};
pub use supervisor::PollSupervisor;
pub use irc::{HealthCheck, IrcClient};
