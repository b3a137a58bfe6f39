//! Integration tests for reel-resolver
//!
//! These tests use wiremock to stand in for the providers and drive the
//! resolver end-to-end.

mod catalog_tests;
mod common;
mod config_tests;
mod fetcher_tests;
mod stream_tests;
