use rss_relay::sources::HttpFeedSource;
use rss_relay::{types::*, Fetcher};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpListener;

const FEED: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<rss version="2.0">
  <channel>
    <title>Local Feed</title>
    <link>http://127.0.0.1/</link>
    <description>Served by the test</description>
    <item>
      <title>Second post</title>
      <link>http://127.0.0.1/posts/2</link>
    </item>
    <item>
      <title>First post</title>
      <link>http://127.0.0.1/posts/1</link>
    </item>
  </channel>
</rss>"#;

/// Answer every request with the same status and body. Returns the feed URL.
async fn serve(status: &'static str, body: &'static str) -> String {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let url = format!("http://{}/feed.xml", listener.local_addr().unwrap());

    tokio::spawn(async move {
        loop {
            let Ok((mut socket, _)) = listener.accept().await else {
                return;
            };

            let mut request = Vec::new();
            let mut buf = [0u8; 1024];
            while !request.windows(4).any(|w| w == b"\r\n\r\n") {
                match socket.read(&mut buf).await {
                    Ok(0) | Err(_) => break,
                    Ok(n) => request.extend_from_slice(&buf[..n]),
                }
            }

            let response = format!(
                "HTTP/1.1 {}\r\nContent-Type: application/rss+xml\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
                status,
                body.len(),
                body
            );
            let _ = socket.write_all(response.as_bytes()).await;
            let _ = socket.shutdown().await;
        }
    });

    url
}

fn no_retries() -> FetchConfig {
    FetchConfig {
        max_retries: 0,
        timeout_seconds: 5,
        ..Default::default()
    }
}

#[tokio::test]
async fn test_http_source_fetches_and_parses() {
    let url = serve("200 OK", FEED).await;
    let source = HttpFeedSource::new(url.clone(), no_retries()).unwrap();

    let items = source.fetch().await.unwrap();

    assert_eq!(source.url(), url);
    assert_eq!(items.len(), 2);
    assert_eq!(items[0].title, "Second post");
    assert_eq!(items[0].link, "http://127.0.0.1/posts/2");
    assert_eq!(items[1].identity(), "First post");
}

#[tokio::test]
async fn test_error_status_is_reported() {
    let url = serve("404 Not Found", "gone").await;
    let fetcher = Fetcher::new(no_retries()).unwrap();

    let err = fetcher.fetch_feed(&url).await.unwrap_err();
    assert!(matches!(err, RelayError::HttpStatus { status: 404, .. }));
}

#[tokio::test]
async fn test_oversized_feed_is_rejected() {
    let url = serve("200 OK", FEED).await;
    let fetcher = Fetcher::new(FetchConfig {
        max_feed_size_mb: 0,
        ..no_retries()
    })
    .unwrap();

    let err = fetcher.fetch_feed(&url).await.unwrap_err();
    assert!(matches!(err, RelayError::FeedTooLarge { .. }));
}

#[tokio::test]
async fn test_unparseable_body_fails_the_fetch() {
    let url = serve("200 OK", "<html><body>maintenance</body></html>").await;
    let source = HttpFeedSource::new(url, no_retries()).unwrap();

    assert!(source.fetch().await.is_err());
}
