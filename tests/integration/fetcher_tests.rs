//! Fetcher behavior against a mock server: timeouts, retries, redirects

use reel_resolver::config::FetchConfig;
use reel_resolver::fetch::FetchOptions;
use reel_resolver::{FetchError, Fetcher, NetworkErrorKind};
use std::time::{Duration, Instant};
use tokio_util::sync::CancellationToken;
use url::Url;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn fetch_config() -> FetchConfig {
    FetchConfig {
        backoff_base_ms: 10,
        timeout_ms: 2_000,
        ..FetchConfig::default()
    }
}

fn url(server: &MockServer, page_path: &str) -> Url {
    Url::parse(&format!("{}{}", server.uri(), page_path)).unwrap()
}

#[tokio::test]
async fn test_fetch_success() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/page"))
        .respond_with(
            ResponseTemplate::new(200).set_body_raw("<html>ok</html>", "text/html"),
        )
        .expect(1)
        .mount(&server)
        .await;

    let fetcher = Fetcher::new(&fetch_config()).unwrap();
    let page = fetcher
        .fetch(&url(&server, "/page"), &FetchOptions::default(), &CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(page.status, 200);
    assert_eq!(page.body, "<html>ok</html>");
    assert_eq!(page.content_type.as_deref(), Some("text/html"));
    assert_eq!(fetcher.request_count(), 1);
}

#[tokio::test]
async fn test_timeout_with_single_attempt() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/slow"))
        .respond_with(ResponseTemplate::new(200).set_delay(Duration::from_secs(3)))
        .mount(&server)
        .await;

    let fetcher = Fetcher::new(&fetch_config()).unwrap();
    let options = FetchOptions::default()
        .timeout(Duration::from_millis(100))
        .max_attempts(1);

    let started = Instant::now();
    let err = fetcher
        .fetch(&url(&server, "/slow"), &options, &CancellationToken::new())
        .await
        .unwrap_err();

    match err {
        FetchError::Network(e) => {
            assert_eq!(e.kind, NetworkErrorKind::Timeout);
            assert_eq!(e.attempts, 1);
        }
        other => panic!("unexpected {:?}", other),
    }
    assert!(started.elapsed() < Duration::from_secs(1));
}

#[tokio::test]
async fn test_client_error_is_not_retried() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/missing"))
        .respond_with(ResponseTemplate::new(404))
        .expect(1)
        .mount(&server)
        .await;

    let fetcher = Fetcher::new(&fetch_config()).unwrap();
    let err = fetcher
        .fetch(&url(&server, "/missing"), &FetchOptions::default(), &CancellationToken::new())
        .await
        .unwrap_err();

    assert!(err.is_not_found());
    assert!(matches!(err, FetchError::Rejected { status: 404, .. }));
    assert_eq!(fetcher.request_count(), 1);
}

#[tokio::test]
async fn test_server_error_is_retried_until_exhausted() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/flaky"))
        .respond_with(ResponseTemplate::new(503))
        .expect(3)
        .mount(&server)
        .await;

    let fetcher = Fetcher::new(&fetch_config()).unwrap();
    let err = fetcher
        .fetch(&url(&server, "/flaky"), &FetchOptions::default(), &CancellationToken::new())
        .await
        .unwrap_err();

    assert_eq!(
        err,
        FetchError::Network(reel_resolver::NetworkError {
            kind: NetworkErrorKind::HttpStatus(503),
            attempts: 3,
            url: url(&server, "/flaky").to_string(),
        })
    );
}

#[tokio::test]
async fn test_server_error_then_success() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/recovering"))
        .respond_with(ResponseTemplate::new(500))
        .up_to_n_times(1)
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/recovering"))
        .respond_with(ResponseTemplate::new(200).set_body_string("back"))
        .expect(1)
        .mount(&server)
        .await;

    let fetcher = Fetcher::new(&fetch_config()).unwrap();
    let page = fetcher
        .fetch(&url(&server, "/recovering"), &FetchOptions::default(), &CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(page.body, "back");
    assert_eq!(fetcher.request_count(), 2);
}

#[tokio::test]
async fn test_redirect_is_followed() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/old"))
        .respond_with(ResponseTemplate::new(301).insert_header("location", "/new"))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/new"))
        .respond_with(ResponseTemplate::new(200).set_body_string("moved"))
        .mount(&server)
        .await;

    let fetcher = Fetcher::new(&fetch_config()).unwrap();
    let requested = url(&server, "/old");
    let page = fetcher
        .fetch(&requested, &FetchOptions::default(), &CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(page.requested_url, requested);
    assert_eq!(page.final_url, url(&server, "/new"));
    assert_eq!(page.body, "moved");
}

#[tokio::test]
async fn test_redirect_loop_fails_without_retry() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/a"))
        .respond_with(ResponseTemplate::new(302).insert_header("location", "/b"))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/b"))
        .respond_with(ResponseTemplate::new(302).insert_header("location", "/a"))
        .expect(1)
        .mount(&server)
        .await;

    let fetcher = Fetcher::new(&fetch_config()).unwrap();
    let err = fetcher
        .fetch(&url(&server, "/a"), &FetchOptions::default(), &CancellationToken::new())
        .await
        .unwrap_err();

    match err {
        FetchError::Network(e) => {
            assert_eq!(e.kind, NetworkErrorKind::Redirect);
            assert_eq!(e.attempts, 1);
        }
        other => panic!("unexpected {:?}", other),
    }
}

#[tokio::test]
async fn test_redirect_to_unlisted_host_is_refused() {
    let origin = MockServer::start().await;
    let elsewhere = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/series"))
        .respond_with(
            ResponseTemplate::new(302).insert_header("location", format!("{}/landing", elsewhere.uri()).as_str()),
        )
        .expect(1)
        .mount(&origin)
        .await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(200).set_body_string("off the list"))
        .expect(0)
        .mount(&elsewhere)
        .await;

    let fetcher = Fetcher::new(&fetch_config()).unwrap();
    let options = FetchOptions::default().redirect_hosts(vec![origin.address().to_string()]);
    let err = fetcher
        .fetch(&url(&origin, "/series"), &options, &CancellationToken::new())
        .await
        .unwrap_err();

    match err {
        FetchError::Network(e) => {
            assert_eq!(e.kind, NetworkErrorKind::Redirect);
            assert_eq!(e.attempts, 1);
        }
        other => panic!("unexpected {:?}", other),
    }
    assert_eq!(fetcher.request_count(), 1);
}

#[tokio::test]
async fn test_redirect_to_listed_host_is_followed() {
    let origin = MockServer::start().await;
    let mirror = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/series"))
        .respond_with(
            ResponseTemplate::new(301).insert_header("location", format!("{}/series", mirror.uri()).as_str()),
        )
        .mount(&origin)
        .await;
    Mock::given(method("GET"))
        .and(path("/series"))
        .respond_with(ResponseTemplate::new(200).set_body_string("mirror"))
        .expect(1)
        .mount(&mirror)
        .await;

    // One permit per host: the hop to the mirror takes the mirror's permit
    let config = FetchConfig {
        max_concurrent_per_host: 1,
        ..fetch_config()
    };
    let fetcher = Fetcher::new(&config).unwrap();
    let options = FetchOptions::default().redirect_hosts(vec![mirror.address().to_string()]);
    let page = fetcher
        .fetch(&url(&origin, "/series"), &options, &CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(page.final_url, url(&mirror, "/series"));
    assert_eq!(page.body, "mirror");
    assert_eq!(fetcher.request_count(), 2);
}

#[tokio::test]
async fn test_cancel_during_request() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/slow"))
        .respond_with(ResponseTemplate::new(200).set_delay(Duration::from_secs(5)))
        .mount(&server)
        .await;

    let fetcher = Fetcher::new(&fetch_config()).unwrap();
    let cancel = CancellationToken::new();
    let trigger = cancel.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(100)).await;
        trigger.cancel();
    });

    let started = Instant::now();
    let err = fetcher
        .fetch(&url(&server, "/slow"), &FetchOptions::default(), &cancel)
        .await
        .unwrap_err();

    assert_eq!(err, FetchError::Cancelled);
    assert!(started.elapsed() < Duration::from_secs(2));
}
