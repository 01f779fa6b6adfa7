//! events-block library
//!
//! Fetches events from a REST API, normalizes them, caches them per
//! `(api_url, item_count)`, and renders the public block and the editor
//! preview. The modules are exposed for the binary and for integration tests.

pub mod app;
pub mod auth;
pub mod cache;
pub mod cli;
pub mod client;
pub mod commands;
pub mod config;
pub mod data;
pub mod render;
pub mod server;
pub mod telemetry;
