use anyhow::Context;
use clap::Parser;
use rss_relay::config::parse_log_level;
use rss_relay::{Config, HealthCheck, IrcClient, PollSupervisor};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{error, info};

/// Relay new feed items into IRC channels.
#[derive(Debug, Parser)]
#[command(name = "rss-relay", version)]
struct Args {
    /// Path to the YAML config. Defaults to config.yaml in the platform
    /// config directory.
    config: Option<PathBuf>,

    /// Override the configured log level.
    #[arg(long)]
    log_level: Option<String>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    let config = Config::load(args.config.as_deref()).context("Failed to load configuration")?;

    let level = match args.log_level.as_deref() {
        Some(level) => parse_log_level(level),
        None => config.log_level(),
    };
    tracing_subscriber::fmt().with_max_level(level).init();

    info!(level = %level, feeds = config.rss.len(), "Starting RSS relay");

    let (client, connection_errors) = IrcClient::new(config.irc.clone());
    client
        .connect()
        .await
        .with_context(|| format!("Fatal error connecting to {}", config.irc.address()))?;

    let mut supervisor = PollSupervisor::new(client.clone());
    let health = HealthCheck::new(Arc::clone(&client), connection_errors, &config.irc);
    let mut health_task = tokio::spawn(health.run(supervisor.subscribe()));

    supervisor.spawn_all(&config.rss, &config.http)?;

    let outcome = tokio::select! {
        signal = tokio::signal::ctrl_c() => {
            signal.context("Failed to listen for Ctrl-C")?;
            info!("Shutting down");
            Ok(())
        }
        result = &mut health_task => match result {
            Ok(Ok(())) => Ok(()),
            Ok(Err(e)) => {
                error!(error = %e, "Connection health check gave up");
                Err(anyhow::Error::new(e))
            }
            Err(e) => Err(anyhow::Error::new(e).context("Health check task panicked")),
        },
    };

    supervisor.shutdown().await;
    client.disconnect("Shutting down").await;

    outcome
}
