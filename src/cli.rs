//! Command-line interface parsing for events-block
//!
//! This module handles parsing of CLI arguments using clap: the global
//! configuration overrides and the `serve`, `render`, `preview` and
//! `clear-cache` subcommands.

use std::path::PathBuf;

use clap::builder::BoolishValueParser;
use clap::{Args, Parser, Subcommand};
use thiserror::Error;

use crate::config::CacheBackend;
use crate::data::{
    BlockAttributes, LayoutStyle, DEFAULT_ITEM_COUNT, MAX_ITEM_COUNT, MIN_ITEM_COUNT,
};

/// Error types for CLI argument parsing
#[derive(Debug, Error)]
pub enum CliError {
    /// The specified layout name is not recognized
    #[error("Invalid layout: '{0}'. Valid layouts: list, grid, cards")]
    InvalidLayout(String),

    /// The cache backend name is not recognized
    #[error("Invalid cache backend: '{0}'. Valid backends: memory, disk")]
    InvalidCacheBackend(String),
}

/// events-block - fetch, cache and render events from a REST API
#[derive(Parser, Debug)]
#[command(name = "events-block")]
#[command(about = "Fetch, cache and render events from a REST events API")]
#[command(version)]
pub struct Cli {
    /// Optional path to a configuration file
    #[arg(
        long = "config-file",
        env = "EVENTS_BLOCK_CONFIG_FILE",
        value_name = "PATH",
        global = true
    )]
    pub config_file: Option<PathBuf>,

    /// Override the base log level (trace|debug|info|warn|error)
    #[arg(long = "log-level", value_name = "LEVEL", global = true)]
    pub log_level: Option<String>,

    /// Toggle JSON logging
    #[arg(
        long = "log-json",
        value_name = "BOOL",
        value_parser = BoolishValueParser::new(),
        global = true
    )]
    pub log_json: Option<bool>,

    /// Override the cache backend (memory|disk)
    #[arg(
        long = "cache-backend",
        value_name = "BACKEND",
        value_parser = parse_cache_backend_arg,
        global = true
    )]
    pub cache_backend: Option<CacheBackend>,

    /// Override the on-disk cache directory
    #[arg(long = "cache-dir", value_name = "PATH", global = true)]
    pub cache_dir: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand, Clone)]
pub enum Command {
    /// Serve the render, session and cache-clear endpoints
    Serve(ServeArgs),
    /// Render the public block HTML once, through the cache
    Render(BlockArgs),
    /// Fetch directly and print the editor preview HTML
    Preview(BlockArgs),
    /// Ask a running server to clear the cached events of an API URL
    #[command(name = "clear-cache")]
    ClearCache(ClearCacheArgs),
}

#[derive(Debug, Args, Default, Clone)]
pub struct ServeArgs {
    /// Override the listener host
    #[arg(long = "host", value_name = "HOST")]
    pub host: Option<String>,

    /// Override the listener port
    #[arg(long = "port", value_name = "PORT")]
    pub port: Option<u16>,
}

#[derive(Debug, Args, Clone)]
pub struct BlockArgs {
    /// Events endpoint, e.g. https://example.com/wp-json/tribe/events/v1/events
    #[arg(long = "api-url", value_name = "URL")]
    pub api_url: String,

    /// Number of events to request
    #[arg(
        long = "item-count",
        value_name = "COUNT",
        default_value_t = DEFAULT_ITEM_COUNT,
        value_parser = clap::value_parser!(u32)
            .range(i64::from(MIN_ITEM_COUNT)..=i64::from(MAX_ITEM_COUNT))
    )]
    pub item_count: u32,

    /// Layout style: list, grid or cards
    #[arg(
        long = "layout",
        value_name = "LAYOUT",
        default_value = "list",
        value_parser = parse_layout_arg
    )]
    pub layout: LayoutStyle,
}

impl BlockArgs {
    /// Block attributes described by these arguments
    pub fn attributes(&self) -> BlockAttributes {
        BlockAttributes {
            api_url: self.api_url.trim().to_string(),
            item_count: self.item_count,
            layout_style: self.layout,
        }
    }
}

#[derive(Debug, Args, Clone)]
pub struct ClearCacheArgs {
    /// Base URL of the running server
    #[arg(
        long = "server",
        value_name = "URL",
        default_value = "http://127.0.0.1:3000"
    )]
    pub server: String,

    /// Editor bearer token
    #[arg(
        long = "token",
        env = "EVENTS_BLOCK_TOKEN",
        value_name = "TOKEN",
        hide_env_values = true
    )]
    pub token: String,

    /// API URL whose cached events should be cleared
    #[arg(long = "api-url", value_name = "URL")]
    pub api_url: String,
}

/// Parses a layout string argument into a LayoutStyle.
///
/// # Arguments
/// * `s` - The layout string from CLI
///
/// # Returns
/// * `Ok(LayoutStyle)` if the string matches a layout
/// * `Err(CliError::InvalidLayout)` if the string doesn't match
pub fn parse_layout_arg(s: &str) -> Result<LayoutStyle, CliError> {
    LayoutStyle::parse(s).ok_or_else(|| CliError::InvalidLayout(s.to_string()))
}

/// Parses a cache backend name
pub fn parse_cache_backend_arg(s: &str) -> Result<CacheBackend, CliError> {
    CacheBackend::parse(s).ok_or_else(|| CliError::InvalidCacheBackend(s.to_string()))
}
