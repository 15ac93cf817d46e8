//! Connection health check and reconnect policy.

use super::connection::{ConnectionErrors, IrcClient};
use crate::config::IrcConfig;
use crate::poller::sleep_or_shutdown;
use crate::types::{RelayError, Result};
use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tracing::{debug, error, info, warn};

/// Something that can re-establish its own connection.
#[async_trait]
pub trait Reconnect: Send + Sync {
    async fn reconnect(&self) -> Result<()>;
}

#[async_trait]
impl Reconnect for Arc<IrcClient> {
    async fn reconnect(&self) -> Result<()> {
        IrcClient::reconnect(self).await
    }
}

/// Periodically looks for reported connection failures and reconnects.
///
/// A failed reconnect counts as a retry and is attempted again on the next
/// interval; a successful one resets the counter. Going past
/// `max_reconnect` retries is fatal.
pub struct HealthCheck<R> {
    target: R,
    errors: ConnectionErrors,
    interval: Duration,
    max_reconnect: u32,
    verbose: bool,
    retries: u32,
    pending: bool,
}

impl<R: Reconnect> HealthCheck<R> {
    pub fn new(target: R, errors: ConnectionErrors, config: &IrcConfig) -> Self {
        Self {
            target,
            errors,
            interval: config.reconnect_interval(),
            max_reconnect: config.max_reconnect,
            verbose: config.verbose,
            retries: 0,
            pending: false,
        }
    }

    pub fn retries(&self) -> u32 {
        self.retries
    }

    /// Run one check. Only fails once retries are exhausted.
    pub async fn check(&mut self) -> Result<()> {
        let mut failed = self.pending;
        while let Ok(reason) = self.errors.try_recv() {
            debug!(reason = %reason, "Connection error reported");
            failed = true;
        }

        if !failed {
            if self.verbose {
                debug!("Health check successful");
            }
            return Ok(());
        }

        warn!("Healthcheck failed");

        if self.retries > self.max_reconnect {
            error!(
                retries = self.retries,
                max_retries = self.max_reconnect,
                "Maximum reconnection attempts exceeded"
            );
            return Err(RelayError::ReconnectExhausted {
                retries: self.retries,
                max_retries: self.max_reconnect,
            });
        }

        match self.target.reconnect().await {
            Ok(()) => {
                info!("Reconnected");
                self.retries = 0;
                self.pending = false;
            }
            Err(e) => {
                warn!(error = %e, "Health check error");
                self.retries += 1;
                self.pending = true;
            }
        }

        Ok(())
    }

    pub async fn run(mut self, mut shutdown: watch::Receiver<bool>) -> Result<()> {
        loop {
            self.check().await?;

            if !sleep_or_shutdown(self.interval, &mut shutdown).await {
                return Ok(());
            }
        }
    }
}
