use anyhow::anyhow;
use async_trait::async_trait;
use rss_relay::{
    types::*, ConnectionStatus, FeedConfig, FeedPoller, Notifier, PollSupervisor, PollerState,
};
use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::watch;
use tracing::info;

/// Replays a fixed list of fetch results, then fails.
struct ScriptedSource {
    url: String,
    responses: Mutex<VecDeque<anyhow::Result<Vec<FeedItem>>>>,
    calls: AtomicUsize,
}

impl ScriptedSource {
    fn new(responses: Vec<anyhow::Result<Vec<FeedItem>>>) -> Arc<Self> {
        Arc::new(Self {
            url: "https://example.com/feed.xml".to_string(),
            responses: Mutex::new(responses.into()),
            calls: AtomicUsize::new(0),
        })
    }
}

#[async_trait]
impl FeedSource for ScriptedSource {
    fn url(&self) -> &str {
        &self.url
    }

    async fn fetch(&self) -> anyhow::Result<Vec<FeedItem>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.responses
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| Err(anyhow!("no scripted response left")))
    }
}

/// Records every deliver call.
struct RecordingNotifier {
    connected: AtomicBool,
    deliveries: Mutex<Vec<(Vec<String>, String)>>,
}

impl RecordingNotifier {
    fn new(connected: bool) -> Arc<Self> {
        Arc::new(Self {
            connected: AtomicBool::new(connected),
            deliveries: Mutex::new(Vec::new()),
        })
    }

    fn messages(&self) -> Vec<String> {
        self.deliveries
            .lock()
            .unwrap()
            .iter()
            .map(|(_, message)| message.clone())
            .collect()
    }
}

impl ConnectionStatus for RecordingNotifier {
    fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Notifier for RecordingNotifier {
    async fn deliver(&self, channels: &[String], message: &str) {
        self.deliveries
            .lock()
            .unwrap()
            .push((channels.to_vec(), message.to_string()));
    }
}

fn items(titles: &[&str]) -> Vec<FeedItem> {
    titles
        .iter()
        .map(|title| FeedItem::new(*title, format!("https://example.com/{}", title.to_lowercase())))
        .collect()
}

fn feed(channels: &[&str], max_history: usize) -> FeedConfig {
    FeedConfig {
        feed_url: "https://example.com/feed.xml".to_string(),
        channels: channels.iter().map(|c| c.to_string()).collect(),
        poll_delay: 1,
        max_history,
    }
}

fn poller(
    config: FeedConfig,
    responses: Vec<anyhow::Result<Vec<FeedItem>>>,
    notifier: &Arc<RecordingNotifier>,
) -> FeedPoller {
    let notifier: Arc<dyn Notifier> = notifier.clone();
    FeedPoller::new(config, ScriptedSource::new(responses), notifier)
}

#[tokio::test]
async fn test_first_cycle_seeds_cache_without_delivering() -> Result<()> {
    let _ = tracing_subscriber::fmt()
        .with_max_level(tracing::Level::DEBUG)
        .try_init();

    let notifier = RecordingNotifier::new(true);
    let mut poller = poller(
        feed(&["#news"], 3),
        vec![Ok(items(&["E", "D", "C", "B", "A"]))],
        &notifier,
    );

    assert!(poller.is_first_run());
    let report = poller.poll_cycle().await?;
    info!("First cycle: {:?}", report);

    assert!(report.seeded);
    assert_eq!(report.fetched, 5);
    assert_eq!(report.considered, 3);
    assert_eq!(report.new_items, 3);
    assert_eq!(report.announced, 0);

    assert!(!poller.is_first_run());
    assert_eq!(poller.cache().identities().collect::<Vec<_>>(), vec!["C", "D", "E"]);
    assert!(notifier.messages().is_empty());

    Ok(())
}

#[tokio::test]
async fn test_new_item_is_announced_once() -> Result<()> {
    let notifier = RecordingNotifier::new(true);
    let mut poller = poller(
        feed(&["#news", "#rss"], 3),
        vec![
            Ok(items(&["C", "B", "A"])),
            Ok(items(&["D", "C", "B"])),
            Ok(items(&["D", "C", "B"])),
            Ok(items(&["E", "D", "C"])),
        ],
        &notifier,
    );

    poller.poll_cycle().await?;

    let report = poller.poll_cycle().await?;
    assert!(!report.seeded);
    assert_eq!(report.new_items, 1);
    assert_eq!(report.announced, 1);

    let report = poller.poll_cycle().await?;
    assert_eq!(report.new_items, 0);

    poller.poll_cycle().await?;

    assert_eq!(
        notifier.messages(),
        vec!["D https://example.com/d", "E https://example.com/e"]
    );

    let deliveries = notifier.deliveries.lock().unwrap();
    assert_eq!(deliveries[0].0, vec!["#news".to_string(), "#rss".to_string()]);

    Ok(())
}

#[tokio::test]
async fn test_items_are_announced_in_fetch_order() -> Result<()> {
    let notifier = RecordingNotifier::new(true);
    let mut poller = poller(
        feed(&["#news"], 5),
        vec![Ok(items(&["A"])), Ok(items(&["D", "C", "B", "A"]))],
        &notifier,
    );

    poller.poll_cycle().await?;
    poller.poll_cycle().await?;

    assert_eq!(
        notifier.messages(),
        vec![
            "D https://example.com/d",
            "C https://example.com/c",
            "B https://example.com/b"
        ]
    );

    Ok(())
}

#[tokio::test]
async fn test_items_beyond_window_are_ignored() -> Result<()> {
    let notifier = RecordingNotifier::new(true);
    let mut poller = poller(
        feed(&["#news"], 2),
        vec![
            Ok(items(&["B", "A"])),
            Ok(items(&["B", "A", "Z", "Y"])),
        ],
        &notifier,
    );

    poller.poll_cycle().await?;
    let report = poller.poll_cycle().await?;

    assert_eq!(report.considered, 2);
    assert_eq!(report.new_items, 0);
    assert!(notifier.messages().is_empty());
    assert!(poller.cache().len() <= 2);

    Ok(())
}

#[tokio::test]
async fn test_fetch_failure_leaves_state_untouched() -> Result<()> {
    let notifier = RecordingNotifier::new(true);
    let mut poller = poller(
        feed(&["#news"], 3),
        vec![
            Err(anyhow!("connection refused")),
            Ok(items(&["B", "A"])),
            Err(anyhow!("HTTP 503")),
            Ok(items(&["C", "B", "A"])),
        ],
        &notifier,
    );

    let err = poller.poll_cycle().await.unwrap_err();
    assert!(matches!(err, RelayError::Fetch { .. }));
    assert!(err.to_string().contains("connection refused"));
    assert!(poller.is_first_run());
    assert!(poller.cache().is_empty());

    // The first success still only seeds.
    poller.poll_cycle().await?;
    assert!(notifier.messages().is_empty());

    assert!(poller.poll_cycle().await.is_err());
    assert_eq!(poller.cache().identities().collect::<Vec<_>>(), vec!["A", "B"]);

    poller.poll_cycle().await?;
    assert_eq!(notifier.messages(), vec!["C https://example.com/c"]);

    Ok(())
}

#[tokio::test]
async fn test_feed_without_channels_never_delivers() -> Result<()> {
    let notifier = RecordingNotifier::new(true);
    let mut poller = poller(
        feed(&[], 3),
        vec![Ok(items(&["A"])), Ok(items(&["B", "A"]))],
        &notifier,
    );

    poller.poll_cycle().await?;
    let report = poller.poll_cycle().await?;

    assert_eq!(report.new_items, 1);
    assert_eq!(report.announced, 0);
    assert!(notifier.deliveries.lock().unwrap().is_empty());
    // Still recorded, so it is not reconsidered next time.
    assert!(poller.cache().exists("B"));

    Ok(())
}

#[tokio::test]
async fn test_retitled_item_does_not_evict_items_still_in_window() -> Result<()> {
    let notifier = RecordingNotifier::new(true);
    let mut poller = poller(
        feed(&["#news"], 3),
        vec![
            Ok(items(&["C", "B", "A"])),
            Ok(items(&["C2", "B", "A"])),
            Ok(items(&["C2", "B", "A"])),
        ],
        &notifier,
    );

    poller.poll_cycle().await?;
    poller.poll_cycle().await?;

    // The whole window is tracked; the replaced title is what went.
    assert_eq!(poller.cache().identities().collect::<Vec<_>>(), vec!["A", "B", "C2"]);

    let report = poller.poll_cycle().await?;
    assert_eq!(report.new_items, 0);
    assert_eq!(notifier.messages(), vec!["C2 https://example.com/c2"]);

    Ok(())
}

#[tokio::test]
async fn test_deleted_item_does_not_reannounce_older_ones() -> Result<()> {
    let notifier = RecordingNotifier::new(true);
    let mut poller = poller(
        feed(&["#news"], 3),
        vec![
            Ok(items(&["D", "C", "B", "A"])),
            // "D" removed upstream, "A" slides into the window.
            Ok(items(&["C", "B", "A"])),
            Ok(items(&["E", "C", "B"])),
            Ok(items(&["E", "C", "B"])),
        ],
        &notifier,
    );

    poller.poll_cycle().await?;
    poller.poll_cycle().await?;
    poller.poll_cycle().await?;
    poller.poll_cycle().await?;

    assert_eq!(
        notifier.messages(),
        vec!["A https://example.com/a", "E https://example.com/e"]
    );
    assert_eq!(poller.cache().identities().collect::<Vec<_>>(), vec!["B", "C", "E"]);

    Ok(())
}

#[tokio::test]
async fn test_duplicate_titles_in_one_fetch_are_announced_once() -> Result<()> {
    let notifier = RecordingNotifier::new(true);
    let mut poller = poller(
        feed(&["#news"], 3),
        vec![Ok(items(&["A"])), Ok(items(&["B", "B", "A"]))],
        &notifier,
    );

    poller.poll_cycle().await?;
    poller.poll_cycle().await?;

    assert_eq!(notifier.messages(), vec!["B https://example.com/b"]);

    Ok(())
}

#[tokio::test(start_paused = true)]
async fn test_poller_waits_for_connection() {
    let notifier = RecordingNotifier::new(false);
    let mut poller = poller(feed(&["#news"], 3), Vec::new(), &notifier);
    let (_shutdown_tx, mut shutdown_rx) = watch::channel(false);

    let flip = {
        let notifier = Arc::clone(&notifier);
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_secs(25)).await;
            notifier.connected.store(true, Ordering::SeqCst);
        })
    };

    let started = tokio::time::Instant::now();
    assert_eq!(poller.state(), PollerState::WaitingForConnection);
    assert!(poller.wait_for_connection(&mut shutdown_rx).await);
    assert_eq!(poller.state(), PollerState::Running);

    // Noticed on the 30s check, plus the join grace period.
    assert_eq!(started.elapsed(), Duration::from_secs(31));
    flip.await.unwrap();
}

#[tokio::test(start_paused = true)]
async fn test_shutdown_interrupts_connection_wait() {
    let notifier = RecordingNotifier::new(false);
    let mut poller = poller(feed(&["#news"], 3), Vec::new(), &notifier);
    let (shutdown_tx, mut shutdown_rx) = watch::channel(false);

    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_secs(15)).await;
        let _ = shutdown_tx.send(true);
    });

    assert!(!poller.wait_for_connection(&mut shutdown_rx).await);
    assert_eq!(poller.state(), PollerState::WaitingForConnection);
}

#[tokio::test(start_paused = true)]
async fn test_supervisor_runs_pollers_until_shutdown() {
    let notifier = RecordingNotifier::new(true);
    let source = ScriptedSource::new(vec![
        Ok(items(&["B", "A"])),
        Ok(items(&["C", "B", "A"])),
        Err(anyhow!("feed temporarily unavailable")),
        Ok(items(&["D", "C", "B"])),
    ]);

    let mut supervisor = PollSupervisor::new(notifier.clone());
    supervisor.spawn(feed(&["#news"], 3), source.clone());
    assert_eq!(supervisor.len(), 1);

    // Grace period, then one poll per minute.
    tokio::time::sleep(Duration::from_secs(60 * 3 + 30)).await;
    supervisor.shutdown().await;

    assert_eq!(source.calls.load(Ordering::SeqCst), 4);
    assert_eq!(
        notifier.messages(),
        vec!["C https://example.com/c", "D https://example.com/d"]
    );

    // Nothing polls after shutdown.
    tokio::time::sleep(Duration::from_secs(600)).await;
    assert_eq!(source.calls.load(Ordering::SeqCst), 4);
}
