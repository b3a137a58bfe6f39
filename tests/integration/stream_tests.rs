//! Stream URL resolution against mock providers

use crate::common::{kinogo_page, resolver_for, rezka_page};
use reel_resolver::{ProviderKind, ResolveError, ResolveRequest, ResolveResponse};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio_util::sync::CancellationToken;
use wiremock::matchers::{header, method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

#[tokio::test]
async fn test_vidlink_video_url_resolves_embed_page() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/tv/2190/2/5"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_string(r#"<html><body><div id="player"></div></body></html>"#),
        )
        .expect(1)
        .mount(&server)
        .await;

    let resolver = resolver_for(ProviderKind::VidLink, &server);
    let request = ResolveRequest::video_url(format!("{}/tv/2190", server.uri()), Some(2), Some(5));

    let response = resolver
        .handle(&request, &CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(
        response,
        ResolveResponse::Video {
            video_url: format!("{}/tv/2190/2/5", server.uri())
        }
    );
    assert_eq!(
        serde_json::to_value(&response).unwrap(),
        serde_json::json!({ "videoUrl": format!("{}/tv/2190/2/5", server.uri()) })
    );
}

#[tokio::test]
async fn test_missing_identifiers_fail_before_any_request() {
    let server = MockServer::start().await;
    let resolver = resolver_for(ProviderKind::VidLink, &server);
    let cancel = CancellationToken::new();

    let request = ResolveRequest::video_url(format!("{}/tv/2190", server.uri()), None, Some(5));
    let err = resolver.handle(&request, &cancel).await.unwrap_err();
    assert!(matches!(err, ResolveError::InvalidRequest(_)));
    assert_eq!(err.status_code(), 400);

    let err = resolver
        .resolve_stream_url(ProviderKind::VidLink, Some("2190"), Some(2), Some(0), &cancel)
        .await
        .unwrap_err();
    assert!(matches!(err, ResolveError::InvalidRequest(_)));

    assert_eq!(resolver.fetcher().request_count(), 0);
    assert!(server.received_requests().await.unwrap().is_empty());
}

#[tokio::test]
async fn test_rezka_two_hop_stream() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/series/drama/646-vo-vse-tyazhkie-2008.html"))
        .respond_with(ResponseTemplate::new(200).set_body_string(rezka_page(&[(1, 1), (1, 2)])))
        .expect(1)
        .mount(&server)
        .await;

    Mock::given(method("GET"))
        .and(path("/ajax/get_cdn_series/"))
        .and(query_param("id", "646"))
        .and(query_param("translator_id", "56"))
        .and(query_param("season", "1"))
        .and(query_param("episode", "2"))
        .and(header("x-requested-with", "XMLHttpRequest"))
        .respond_with(ResponseTemplate::new(200).set_body_string(
            r#"{"success":true,"message":"","url":"[480p]https://cdn.example/480.mp4,[720p]https://cdn.example/720.mp4:hls:manifest.m3u8 or https://cdn.example/720.mp4"}"#,
        ))
        .expect(1)
        .mount(&server)
        .await;

    let resolver = resolver_for(ProviderKind::Rezka, &server);
    let cancel = CancellationToken::new();

    let source = resolver
        .resolve_stream_url(
            ProviderKind::Rezka,
            Some("series/drama/646-vo-vse-tyazhkie-2008"),
            Some(1),
            Some(2),
            &cancel,
        )
        .await
        .unwrap();

    assert_eq!(source.provider, ProviderKind::Rezka);
    assert_eq!(source.stream_url, "https://cdn.example/720.mp4");

    // Second call is a cache hit
    let again = resolver
        .resolve_stream_url(
            ProviderKind::Rezka,
            Some("series/drama/646-vo-vse-tyazhkie-2008"),
            Some(1),
            Some(2),
            &cancel,
        )
        .await
        .unwrap();
    assert_eq!(again, source);
    assert_eq!(resolver.fetcher().request_count(), 2);
}

#[tokio::test]
async fn test_rezka_cdn_refusal_is_parse_error() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/series/drama/646-vo-vse-tyazhkie-2008.html"))
        .respond_with(ResponseTemplate::new(200).set_body_string(rezka_page(&[(1, 1)])))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/ajax/get_cdn_series/"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_string(r#"{"success":false,"message":"Время сессии истекло"}"#),
        )
        .mount(&server)
        .await;

    let resolver = resolver_for(ProviderKind::Rezka, &server);
    let err = resolver
        .resolve_stream_url(
            ProviderKind::Rezka,
            Some("series/drama/646-vo-vse-tyazhkie-2008"),
            Some(1),
            Some(1),
            &CancellationToken::new(),
        )
        .await
        .unwrap_err();

    assert!(matches!(err, ResolveError::Parse { .. }));
    assert!(resolver.cache().is_empty());
}

#[tokio::test]
async fn test_kinogo_embed_hop() {
    let server = MockServer::start().await;
    let playlist = r#"[{"title":"Сезон 1","folder":[
        {"title":"Серия 1","file":"https://cdn.example/s1e1.mp4"},
        {"title":"Серия 2","embed":"/embed/2"}
    ]}]"#;
    Mock::given(method("GET"))
        .and(path("/12345-the-series.html"))
        .respond_with(ResponseTemplate::new(200).set_body_string(kinogo_page(playlist)))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/embed/2"))
        .and(header(
            "referer",
            format!("{}/12345-the-series.html", server.uri()).as_str(),
        ))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_string(r#"<html><body><video><source src="/media/s1e2.m3u8"></video></body></html>"#),
        )
        .expect(1)
        .mount(&server)
        .await;

    let resolver = resolver_for(ProviderKind::Kinogo, &server);
    let source = resolver
        .resolve_stream_url(
            ProviderKind::Kinogo,
            Some("12345-the-series"),
            Some(1),
            Some(2),
            &CancellationToken::new(),
        )
        .await
        .unwrap();

    assert_eq!(source.stream_url, format!("{}/media/s1e2.m3u8", server.uri()));
    assert_eq!(source.expires_at, None);
}

#[tokio::test]
async fn test_kinogo_unknown_episode_is_not_found() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/12345-the-series.html"))
        .respond_with(ResponseTemplate::new(200).set_body_string(kinogo_page(
            r#"[{"title":"Сезон 1","folder":[{"title":"Серия 1","file":"https://cdn.example/s1e1.mp4"}]}]"#,
        )))
        .mount(&server)
        .await;

    let resolver = resolver_for(ProviderKind::Kinogo, &server);
    let err = resolver
        .resolve_stream_url(
            ProviderKind::Kinogo,
            Some("12345-the-series"),
            Some(4),
            Some(1),
            &CancellationToken::new(),
        )
        .await
        .unwrap_err();

    assert!(matches!(
        err,
        ResolveError::EpisodeNotFound {
            provider: ProviderKind::Kinogo,
            season: 4,
            episode: 1
        }
    ));
    assert_eq!(err.status_code(), 404);
}

#[tokio::test]
async fn test_expired_stream_is_returned_but_not_cached() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/12345-the-series.html"))
        .respond_with(ResponseTemplate::new(200).set_body_string(kinogo_page(
            r#"[{"title":"S1E1","file":"https://cdn.example/s1e1.mp4?expires=1000"}]"#,
        )))
        .expect(2)
        .mount(&server)
        .await;

    let resolver = resolver_for(ProviderKind::Kinogo, &server);
    let cancel = CancellationToken::new();

    for _ in 0..2 {
        let source = resolver
            .resolve_stream_url(ProviderKind::Kinogo, Some("12345-the-series"), Some(1), Some(1), &cancel)
            .await
            .unwrap();
        assert_eq!(source.stream_url, "https://cdn.example/s1e1.mp4?expires=1000");
        assert!(source.expires_at.is_some());
    }
    assert!(resolver.cache().is_empty());
}

#[tokio::test]
async fn test_cancellation_aborts_without_caching() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/tv/2190/1/1"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_string(r#"<div id="player"></div>"#)
                .set_delay(Duration::from_secs(5)),
        )
        .mount(&server)
        .await;

    let resolver = Arc::new(resolver_for(ProviderKind::VidLink, &server));
    let cancel = CancellationToken::new();

    let task = {
        let resolver = Arc::clone(&resolver);
        let cancel = cancel.clone();
        tokio::spawn(async move {
            resolver
                .resolve_stream_url(ProviderKind::VidLink, Some("2190"), Some(1), Some(1), &cancel)
                .await
        })
    };

    tokio::time::sleep(Duration::from_millis(100)).await;
    let started = Instant::now();
    cancel.cancel();

    let err = task.await.unwrap().unwrap_err();
    assert!(matches!(err, ResolveError::Cancelled));
    assert_eq!(err.status_code(), 499);
    assert!(started.elapsed() < Duration::from_secs(2));
    assert!(resolver.cache().is_empty());
    assert_eq!(resolver.cache().in_flight(), 0);
}

#[tokio::test]
async fn test_queued_caller_cancels_without_waiting_for_leader() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/tv/2190/1/1"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_string(r#"<div id="player"></div>"#)
                .set_delay(Duration::from_millis(1500)),
        )
        .expect(1)
        .mount(&server)
        .await;

    let resolver = Arc::new(resolver_for(ProviderKind::VidLink, &server));

    let leader = {
        let resolver = Arc::clone(&resolver);
        tokio::spawn(async move {
            resolver
                .resolve_stream_url(
                    ProviderKind::VidLink,
                    Some("2190"),
                    Some(1),
                    Some(1),
                    &CancellationToken::new(),
                )
                .await
        })
    };
    tokio::time::sleep(Duration::from_millis(50)).await;

    let cancel = CancellationToken::new();
    let waiter = {
        let resolver = Arc::clone(&resolver);
        let cancel = cancel.clone();
        tokio::spawn(async move {
            resolver
                .resolve_stream_url(ProviderKind::VidLink, Some("2190"), Some(1), Some(1), &cancel)
                .await
        })
    };
    tokio::time::sleep(Duration::from_millis(50)).await;

    let started = Instant::now();
    cancel.cancel();
    let err = waiter.await.unwrap().unwrap_err();
    assert!(matches!(err, ResolveError::Cancelled));
    assert!(started.elapsed() < Duration::from_millis(500));

    // The leader is unaffected and still commits its result
    let source = leader.await.unwrap().unwrap();
    assert_eq!(source.stream_url, format!("{}/tv/2190/1/1", server.uri()));
    assert_eq!(resolver.cache().len(), 1);
    assert_eq!(resolver.fetcher().request_count(), 1);
}

#[tokio::test]
async fn test_missing_entry_page_is_episode_not_found() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/tv/2190/9/1"))
        .respond_with(ResponseTemplate::new(404))
        .expect(1)
        .mount(&server)
        .await;

    let resolver = resolver_for(ProviderKind::VidLink, &server);
    let err = resolver
        .resolve_stream_url(ProviderKind::VidLink, Some("2190"), Some(9), Some(1), &CancellationToken::new())
        .await
        .unwrap_err();

    assert!(matches!(
        err,
        ResolveError::EpisodeNotFound {
            provider: ProviderKind::VidLink,
            season: 9,
            episode: 1
        }
    ));
    assert_eq!(err.status_code(), 404);
    assert!(resolver.cache().is_empty());
}
