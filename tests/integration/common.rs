use reel_resolver::config::Config;
use reel_resolver::{ProviderKind, Resolver};
use wiremock::MockServer;

/// Creates a test configuration that points `kind` at the mock server
///
/// Retries back off quickly so failure tests stay fast.
pub fn config_for(kind: ProviderKind, server: &MockServer) -> Config {
    let mut config = Config::default();
    config.fetch.backoff_base_ms = 10;
    config.fetch.timeout_ms = 2_000;

    let provider = match kind {
        ProviderKind::Kinogo => &mut config.providers.kinogo,
        ProviderKind::VidLink => &mut config.providers.vidlink,
        ProviderKind::Rezka => &mut config.providers.rezka,
    };
    provider.hosts = vec![server.address().to_string()];
    provider.base_url = server.uri();
    provider.image_base = None;

    config
}

pub fn resolver_for(kind: ProviderKind, server: &MockServer) -> Resolver {
    Resolver::new(config_for(kind, server)).expect("Failed to build resolver")
}

/// Wraps a Playerjs playlist in a Kinogo series page
pub fn kinogo_page(playlist: &str) -> String {
    format!(
        r#"<html><head><title>Series</title></head><body>
        <div id="player"></div>
        <script>var player = new Playerjs({{id:"player", file:{}}});</script>
        </body></html>"#,
        playlist
    )
}

/// Wraps a seasons array in a VidLink `__NEXT_DATA__` page
pub fn vidlink_page(seasons: &str) -> String {
    format!(
        r#"<html><body><div id="__next"></div>
        <script id="__NEXT_DATA__" type="application/json">{{"props":{{"pageProps":{{"id":2190,"seasons":{}}}}}}}</script>
        </body></html>"#,
        seasons
    )
}

/// Builds a Rezka series page from `(season, episode)` pairs
pub fn rezka_page(items: &[(u32, u32)]) -> String {
    let items: String = items
        .iter()
        .map(|(season, episode)| {
            format!(
                r#"<li class="b-simple_episode__item" data-id="646" data-season_id="{}" data-episode_id="{}">Серия {}</li>"#,
                season, episode, episode
            )
        })
        .collect();

    format!(
        r#"<html><body>
        <ul id="translators-list"><li class="b-translator__item active" data-translator_id="56">Дубляж</li></ul>
        <div id="simple-episodes-tabs"><ul class="b-simple_episodes__list">{}</ul></div>
        </body></html>"#,
        items
    )
}
