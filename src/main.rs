//! Reel-Resolver main entry point
//!
//! This is the command-line interface for the video source resolution engine.

use anyhow::Context;
use clap::{Parser, Subcommand};
use reel_resolver::config::{load_config_with_hash, validate, Config};
use reel_resolver::pipeline::ErrorBody;
use reel_resolver::{
    Action, JsonLinesSink, ProviderKind, ResolveError, ResolveRequest, ResolveResponse, Resolver,
};
use std::fs::File;
use std::io::BufWriter;
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::EnvFilter;

/// Reel-Resolver: turns provider catalog pages into canonical episodes and
/// playable stream URLs
#[derive(Parser, Debug)]
#[command(name = "reel-resolver")]
#[command(version = "1.0.0")]
#[command(about = "Resolve video catalogs and stream URLs", long_about = None)]
struct Cli {
    /// Path to TOML configuration file (built-in defaults when omitted)
    #[arg(short, long, value_name = "CONFIG", global = true)]
    config: Option<PathBuf>,

    /// Increase logging verbosity (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    /// Suppress non-error output
    #[arg(short, long, conflicts_with = "verbose", global = true)]
    quiet: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Resolve a catalog page into episodes
    Catalog {
        /// Series page URL
        url: String,

        /// Write episodes as JSON lines to this file instead of printing
        #[arg(short, long, value_name = "FILE")]
        output: Option<PathBuf>,
    },

    /// Resolve one episode into a playable URL
    Stream {
        #[arg(long)]
        provider: ProviderKind,

        /// Provider series reference (id, slug or path)
        #[arg(long)]
        series: Option<String>,

        #[arg(long, allow_negative_numbers = true)]
        season: Option<i64>,

        #[arg(long, allow_negative_numbers = true)]
        episode: Option<i64>,
    },

    /// Dispatch a URL by action, as a web boundary would
    Resolve {
        url: String,

        /// catalog (alias: scrape) or video-url
        #[arg(long, default_value = "catalog")]
        action: Action,

        #[arg(long)]
        series: Option<String>,

        #[arg(long, allow_negative_numbers = true)]
        season: Option<i64>,

        #[arg(long, allow_negative_numbers = true)]
        episode: Option<i64>,
    },

    /// Validate the configuration and print its hash
    CheckConfig,
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    setup_logging(cli.verbose, cli.quiet);

    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            let (body, code) = match e.downcast_ref::<ResolveError>() {
                Some(resolve) => (
                    ErrorBody::from(resolve),
                    if resolve.is_client_error() { 2 } else { 1 },
                ),
                None => (
                    ErrorBody {
                        error: format!("{:#}", e),
                    },
                    1,
                ),
            };
            match serde_json::to_string(&body) {
                Ok(json) => println!("{}", json),
                Err(_) => println!("{{\"error\":\"{}\"}}", body.error.replace('"', "'")),
            }
            ExitCode::from(code)
        }
    }
}

async fn run(cli: Cli) -> anyhow::Result<()> {
    let config = load(cli.config.as_deref())?;

    if let Command::CheckConfig = cli.command {
        return handle_check_config(cli.config.as_deref(), &config);
    }

    let resolver = Resolver::new(config)?;
    let cancel = CancellationToken::new();
    spawn_interrupt_handler(cancel.clone());
    let _sweeper = resolver.start_sweeper(cancel.child_token());

    match cli.command {
        Command::Catalog { url, output } => handle_catalog(&resolver, &url, output, &cancel).await,
        Command::Stream {
            provider,
            series,
            season,
            episode,
        } => {
            let source = resolver
                .resolve_stream_url(provider, series.as_deref(), season, episode, &cancel)
                .await?;
            print_json(&ResolveResponse::Video {
                video_url: source.stream_url,
            })
        }
        Command::Resolve {
            url,
            action,
            series,
            season,
            episode,
        } => {
            let request = ResolveRequest {
                url,
                action,
                series_ref: series,
                season,
                episode,
            };
            let response = resolver.handle(&request, &cancel).await?;
            print_json(&response)
        }
        Command::CheckConfig => Ok(()),
    }
}

/// Sets up the logging/tracing subscriber based on verbosity level
///
/// Logs go to stderr; stdout carries only JSON results.
fn setup_logging(verbose: u8, quiet: bool) {
    let filter = if quiet {
        EnvFilter::new("error")
    } else {
        match verbose {
            0 => EnvFilter::new("reel_resolver=info,warn"),
            1 => EnvFilter::new("reel_resolver=debug,info"),
            2 => EnvFilter::new("reel_resolver=trace,debug"),
            _ => EnvFilter::new("trace"),
        }
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .with_thread_ids(false)
        .with_file(false)
        .init();
}

fn load(path: Option<&Path>) -> anyhow::Result<Config> {
    let Some(path) = path else {
        tracing::debug!("No configuration file given, using defaults");
        return Ok(Config::default());
    };

    tracing::info!("Loading configuration from: {}", path.display());
    let (config, hash) = load_config_with_hash(path)
        .with_context(|| format!("Failed to load configuration from {}", path.display()))?;
    tracing::info!("Configuration loaded successfully (hash: {})", hash);
    Ok(config)
}

/// Cancels in-flight resolutions on Ctrl-C
fn spawn_interrupt_handler(cancel: CancellationToken) {
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::warn!("Interrupted, cancelling");
            cancel.cancel();
        }
    });
}

async fn handle_catalog(
    resolver: &Resolver,
    url: &str,
    output: Option<PathBuf>,
    cancel: &CancellationToken,
) -> anyhow::Result<()> {
    let Some(output) = output else {
        let catalog = resolver.resolve_catalog(url, cancel).await?;
        return print_json(&catalog);
    };

    let file = File::create(&output)
        .with_context(|| format!("Failed to create {}", output.display()))?;
    let sink = JsonLinesSink::new(BufWriter::new(file));
    let catalog = resolver.ingest_catalog(url, &sink, cancel).await?;

    for warning in &catalog.warnings {
        tracing::warn!("{}", serde_json::to_string(warning)?);
    }
    tracing::info!(
        "Wrote {} episodes to {}",
        catalog.episodes.len(),
        output.display()
    );
    Ok(())
}

/// Handles `check-config`: validates and prints the configuration hash
fn handle_check_config(path: Option<&Path>, config: &Config) -> anyhow::Result<()> {
    validate(config)?;

    let hash = match path {
        Some(path) => reel_resolver::config::compute_config_hash(path)?,
        None => "defaults".to_string(),
    };

    println!("Configuration is valid");
    println!("  Hash: {}", hash);
    for (kind, provider) in config.providers.entries() {
        let status = if provider.enabled { "enabled" } else { "disabled" };
        println!(
            "  {}: {} ({})",
            kind,
            status,
            provider.hosts.join(", ")
        );
    }
    Ok(())
}

fn print_json<T: serde::Serialize>(value: &T) -> anyhow::Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}
