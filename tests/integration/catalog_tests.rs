//! Catalog resolution against mock providers

use crate::common::{kinogo_page, resolver_for, rezka_page, vidlink_page};
use reel_resolver::{CatalogSink, JsonLinesSink, ProviderKind, ResolveError, Warning};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

const REZKA_PATH: &str = "/series/drama/646-vo-vse-tyazhkie-2008.html";

async fn mount_page(server: &MockServer, page_path: &str, body: String, expected: u64) {
    Mock::given(method("GET"))
        .and(path(page_path))
        .respond_with(
            ResponseTemplate::new(200).set_body_raw(body, "text/html"),
        )
        .expect(expected)
        .mount(server)
        .await;
}

#[tokio::test]
async fn test_repeated_catalog_is_served_from_cache() {
    let server = MockServer::start().await;
    mount_page(&server, REZKA_PATH, rezka_page(&[(1, 1), (1, 2)]), 1).await;

    let resolver = resolver_for(ProviderKind::Rezka, &server);
    let url = format!("{}{}", server.uri(), REZKA_PATH);
    let cancel = CancellationToken::new();

    let first = resolver.resolve_catalog(&url, &cancel).await.unwrap();
    let second = resolver.resolve_catalog(&url, &cancel).await.unwrap();

    assert_eq!(first, second);
    assert_eq!(first.episodes.len(), 2);
    assert_eq!(resolver.fetcher().request_count(), 1);
}

#[tokio::test]
async fn test_concurrent_catalog_requests_share_one_fetch() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path(REZKA_PATH))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_string(rezka_page(&[(1, 1), (1, 2), (2, 1)]))
                .set_delay(std::time::Duration::from_millis(200)),
        )
        .expect(1)
        .mount(&server)
        .await;

    let resolver = Arc::new(resolver_for(ProviderKind::Rezka, &server));
    let url = format!("{}{}", server.uri(), REZKA_PATH);

    let handles: Vec<_> = (0..10)
        .map(|_| {
            let resolver = Arc::clone(&resolver);
            let url = url.clone();
            tokio::spawn(async move {
                resolver
                    .resolve_catalog(&url, &CancellationToken::new())
                    .await
            })
        })
        .collect();

    for handle in handles {
        let catalog = handle.await.unwrap().unwrap();
        assert_eq!(catalog.episodes.len(), 3);
    }
    assert_eq!(resolver.fetcher().request_count(), 1);
    assert_eq!(resolver.cache().in_flight(), 0);
}

#[tokio::test]
async fn test_concurrent_catalog_failure_is_shared() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path(REZKA_PATH))
        .respond_with(ResponseTemplate::new(404).set_delay(std::time::Duration::from_millis(100)))
        .expect(1)
        .mount(&server)
        .await;

    let resolver = Arc::new(resolver_for(ProviderKind::Rezka, &server));
    let url = format!("{}{}", server.uri(), REZKA_PATH);

    let handles: Vec<_> = (0..5)
        .map(|_| {
            let resolver = Arc::clone(&resolver);
            let url = url.clone();
            tokio::spawn(async move {
                resolver
                    .resolve_catalog(&url, &CancellationToken::new())
                    .await
            })
        })
        .collect();

    for handle in handles {
        let err = handle.await.unwrap().unwrap_err();
        assert!(matches!(err, ResolveError::Rejected { status: 404, .. }));
    }
    assert_eq!(resolver.fetcher().request_count(), 1);
    assert!(resolver.cache().is_empty());
    assert_eq!(resolver.cache().in_flight(), 0);
}

#[tokio::test]
async fn test_catalog_is_sorted_and_normalized() {
    let server = MockServer::start().await;
    let playlist = r#"[
        {"title":"Сезон 2","folder":[
            {"title":"Серия 1","name":"Return | смотреть онлайн","file":"https://cdn.example/s2e1.mp4","duration":"1:02:40"}
        ]},
        {"title":"Сезон 1","folder":[
            {"title":"Серия 2","file":"https://cdn.example/s1e2.mp4","poster":"/img/2.jpg"},
            {"title":"Серия 1","name":"Pilot","file":"https://cdn.example/s1e1.mp4","duration":"45 мин"}
        ]}
    ]"#;
    mount_page(&server, "/12345-the-series.html", kinogo_page(playlist), 1).await;

    let resolver = resolver_for(ProviderKind::Kinogo, &server);
    let url = format!("{}/12345-the-series.html", server.uri());
    let catalog = resolver
        .resolve_catalog(&url, &CancellationToken::new())
        .await
        .unwrap();

    let ordinals: Vec<(u32, u32)> = catalog
        .episodes
        .iter()
        .map(|e| (e.season_number, e.episode_number))
        .collect();
    assert_eq!(ordinals, vec![(1, 1), (1, 2), (2, 1)]);

    let pilot = &catalog.episodes[0];
    assert_eq!(pilot.title, "Pilot");
    assert_eq!(pilot.duration_minutes, Some(45));
    assert_eq!(pilot.source_provider, ProviderKind::Kinogo);

    let second = &catalog.episodes[1];
    assert_eq!(second.title, "Episode 2");
    assert_eq!(
        second.thumbnail_url.as_deref(),
        Some(format!("{}/img/2.jpg", server.uri()).as_str())
    );

    let finale = &catalog.episodes[2];
    assert_eq!(finale.title, "Return");
    assert_eq!(finale.duration_minutes, Some(63));
    assert!(catalog.warnings.is_empty());
}

#[tokio::test]
async fn test_malformed_entry_yields_prefix_and_truncated_warning() {
    let server = MockServer::start().await;
    let playlist = r#"[
        {"title":"S1E1","file":"https://cdn.example/1.mp4"},
        {"title":"S1E2","file":"https://cdn.example/2.mp4"},
        {"title":"S1E3","file":"https://cdn.example/3.mp4"},
        {title:broken},
        {"title":"S1E5","file":"https://cdn.example/5.mp4"}
    ]"#;
    mount_page(&server, "/777-partial.html", kinogo_page(playlist), 1).await;

    let resolver = resolver_for(ProviderKind::Kinogo, &server);
    let url = format!("{}/777-partial.html", server.uri());
    let catalog = resolver
        .resolve_catalog(&url, &CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(catalog.episodes.len(), 3);
    let truncated: Vec<_> = catalog
        .warnings
        .iter()
        .filter(|w| matches!(w, Warning::Truncated { .. }))
        .collect();
    assert_eq!(truncated.len(), 1);
    match truncated[0] {
        Warning::Truncated { provider, kept, .. } => {
            assert_eq!(*provider, ProviderKind::Kinogo);
            assert_eq!(*kept, 3);
        }
        _ => unreachable!(),
    }
}

#[tokio::test]
async fn test_duplicate_ordinals_keep_first_and_report_conflict() {
    let server = MockServer::start().await;
    let seasons = r#"[{"season_number":1,"episodes":[
        {"episode_number":1,"name":"Pilot","id":101},
        {"episode_number":1,"name":"Pilot (recap)","id":102},
        {"episode_number":2,"name":"Second","id":103}
    ]}]"#;
    mount_page(&server, "/tv/2190", vidlink_page(seasons), 1).await;

    let resolver = resolver_for(ProviderKind::VidLink, &server);
    let url = format!("{}/tv/2190", server.uri());
    let catalog = resolver
        .resolve_catalog(&url, &CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(catalog.episodes.len(), 2);
    assert_eq!(catalog.episodes[0].title, "Pilot");
    assert_eq!(catalog.episodes[0].source_ref, "101");

    let conflicts: Vec<_> = catalog
        .warnings
        .iter()
        .filter_map(|w| match w {
            Warning::Duplicate(conflict) => Some(conflict),
            _ => None,
        })
        .collect();
    assert_eq!(conflicts.len(), 1);
    assert_eq!(conflicts[0].season_number, 1);
    assert_eq!(conflicts[0].episode_number, 1);
}

#[tokio::test]
async fn test_missing_marker_is_parse_error_and_not_cached() {
    let server = MockServer::start().await;
    mount_page(
        &server,
        REZKA_PATH,
        "<html><body>Checking your browser...</body></html>".to_string(),
        2,
    )
    .await;

    let resolver = resolver_for(ProviderKind::Rezka, &server);
    let url = format!("{}{}", server.uri(), REZKA_PATH);
    let cancel = CancellationToken::new();

    for _ in 0..2 {
        let err = resolver.resolve_catalog(&url, &cancel).await.unwrap_err();
        assert!(matches!(
            err,
            ResolveError::Parse {
                provider: ProviderKind::Rezka,
                ..
            }
        ));
        assert_eq!(err.status_code(), 500);
    }
    assert!(resolver.cache().is_empty());
}

#[tokio::test]
async fn test_unsupported_url_makes_no_request() {
    let server = MockServer::start().await;
    let resolver = resolver_for(ProviderKind::Rezka, &server);

    let err = resolver
        .resolve_catalog(
            &format!("{}/films/comedy/not-a-page", server.uri()),
            &CancellationToken::new(),
        )
        .await
        .unwrap_err();

    assert!(matches!(err, ResolveError::UnsupportedProvider { .. }));
    assert_eq!(resolver.fetcher().request_count(), 0);
    assert!(server.received_requests().await.unwrap().is_empty());
}

#[tokio::test]
async fn test_ingest_catalog_writes_to_sink() {
    let server = MockServer::start().await;
    mount_page(&server, REZKA_PATH, rezka_page(&[(1, 2), (1, 1)]), 1).await;

    let resolver = resolver_for(ProviderKind::Rezka, &server);
    let url = format!("{}{}", server.uri(), REZKA_PATH);
    let sink = JsonLinesSink::new(Vec::new());

    let catalog = resolver
        .ingest_catalog(&url, &sink as &dyn CatalogSink, &CancellationToken::new())
        .await
        .unwrap();
    assert_eq!(catalog.episodes.len(), 2);

    let output = String::from_utf8(sink.into_inner()).unwrap();
    let lines: Vec<serde_json::Value> = output
        .lines()
        .map(|line| serde_json::from_str(line).unwrap())
        .collect();
    assert_eq!(lines.len(), 2);
    assert_eq!(lines[0]["episodeNumber"], 1);
    assert_eq!(lines[1]["episodeNumber"], 2);
    assert_eq!(lines[0]["sourceProvider"], "rezka");
}
