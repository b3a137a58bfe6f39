//! Configuration files driving a resolver end-to-end

use crate::common::rezka_page;
use reel_resolver::config::{load_config, load_config_with_hash};
use reel_resolver::{ConfigError, ProviderKind, ResolveError, Resolver};
use std::io::Write;
use tempfile::NamedTempFile;
use tokio_util::sync::CancellationToken;
use wiremock::matchers::{header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn write_config(content: &str) -> NamedTempFile {
    let mut file = NamedTempFile::new().unwrap();
    file.write_all(content.as_bytes()).unwrap();
    file.flush().unwrap();
    file
}

#[tokio::test]
async fn test_config_file_points_provider_at_server() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/series/drama/646-vo-vse-tyazhkie-2008.html"))
        .and(header("user-agent", "ReelTest/1.0"))
        .and(header("accept-language", "en"))
        .respond_with(ResponseTemplate::new(200).set_body_string(rezka_page(&[(1, 1)])))
        .expect(1)
        .mount(&server)
        .await;

    let file = write_config(&format!(
        r#"
[fetch]
timeout-ms = 2000
max-attempts = 1
user-agent = "ReelTest/1.0"

[fetch.headers]
accept-language = "en"

[cache]
catalog-ttl-secs = 60

[providers.rezka]
hosts = ["{}"]
base-url = "{}"

[providers.kinogo]
enabled = false
hosts = ["kinogo.biz"]
base-url = "https://kinogo.biz"
"#,
        server.address(),
        server.uri()
    ));

    let (config, hash) = load_config_with_hash(file.path()).unwrap();
    assert_eq!(hash.len(), 64);
    assert_eq!(config.cache.catalog_ttl_secs, 60);

    let resolver = Resolver::new(config).unwrap();
    assert_eq!(
        resolver.registry().kinds(),
        vec![ProviderKind::VidLink, ProviderKind::Rezka]
    );

    let catalog = resolver
        .resolve_catalog(
            &format!("{}/series/drama/646-vo-vse-tyazhkie-2008.html", server.uri()),
            &CancellationToken::new(),
        )
        .await
        .unwrap();
    assert_eq!(catalog.episodes.len(), 1);
}

#[tokio::test]
async fn test_disabled_provider_urls_are_unsupported() {
    let file = write_config(
        r#"
[providers.vidlink]
enabled = false
hosts = ["vidlink.pro"]
base-url = "https://vidlink.pro"
"#,
    );

    let resolver = Resolver::new(load_config(file.path()).unwrap()).unwrap();
    let err = resolver
        .resolve_catalog("https://vidlink.pro/tv/2190", &CancellationToken::new())
        .await
        .unwrap_err();

    assert!(matches!(err, ResolveError::UnsupportedProvider { .. }));
    assert_eq!(resolver.fetcher().request_count(), 0);
}

#[test]
fn test_overlapping_hosts_are_rejected() {
    let file = write_config(
        r#"
[providers.kinogo]
hosts = ["rezka.ag"]
base-url = "https://rezka.ag"
"#,
    );

    assert!(matches!(
        load_config(file.path()),
        Err(ConfigError::Validation(_))
    ));
}
