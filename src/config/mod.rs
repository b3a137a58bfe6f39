//! Configuration module for Reel-Resolver
//!
//! This module handles loading, parsing, and validating TOML configuration files.
//! A [`Config`] value is threaded explicitly through the fetcher, providers and
//! pipeline; nothing reads process-wide state.
//!
//! # Example
//!
//! ```no_run
//! use reel_resolver::config::load_config;
//! use std::path::Path;
//!
//! let config = load_config(Path::new("resolver.toml")).unwrap();
//! println!("Catalog TTL: {}s", config.cache.catalog_ttl_secs);
//! ```

mod parser;
mod types;
mod validation;

pub use types::{
    CacheConfig, Config, FetchConfig, NormalizeConfig, ProviderConfig, ProvidersConfig,
};

pub use parser::{compute_config_hash, load_config, load_config_with_hash, parse_config};
pub use validation::validate;
