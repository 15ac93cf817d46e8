//! IRC delivery: line codec, the client session, and its health check.

pub mod connection;
pub mod health;
pub mod message;

pub use connection::{ConnectionErrors, IrcClient};
pub use health::{HealthCheck, Reconnect};
pub use message::IrcMessage;
