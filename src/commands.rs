//! One-shot subcommands: render, preview and clear-cache

use std::sync::Arc;

use thiserror::Error;
use tracing::info;

use crate::app::EditorPreview;
use crate::cli::{BlockArgs, ClearCacheArgs};
use crate::client::{CacheClearer, ClearCacheClient, ClientError};
use crate::config::{LoadError, Settings};
use crate::data::EventSource;
use crate::render::RenderError;

#[derive(Debug, Error)]
pub enum CommandError {
    #[error(transparent)]
    Config(#[from] LoadError),
    #[error(transparent)]
    Render(#[from] RenderError),
    #[error("cache clear failed: {0}")]
    Client(#[from] ClientError),
}

/// Renders the public block through the configured cache
///
/// Like the public page, a failed fetch renders the placeholder rather than
/// failing the command.
pub async fn render(settings: &Settings, args: &BlockArgs) -> Result<String, CommandError> {
    let source: Arc<dyn EventSource> = Arc::new(settings.events_client());
    let cache = settings.event_cache(source)?;
    let attributes = args.attributes();

    let events = cache
        .events_for_render(&attributes.api_url, attributes.item_count)
        .await;
    Ok(settings
        .renderer()
        .render_block(attributes.layout_style, &events)?)
}

/// Fetches directly, bypassing the cache, and renders the editor preview
pub async fn preview(settings: &Settings, args: &BlockArgs) -> Result<String, CommandError> {
    let client = settings.events_client();
    let mut preview = EditorPreview::new(args.attributes());
    preview.refresh(&client).await;

    Ok(settings.renderer().render_preview(&preview)?)
}

/// Opens an editor session on a running server and clears one URL
pub async fn clear_cache(args: &ClearCacheArgs) -> Result<(), CommandError> {
    let client = ClearCacheClient::connect(&args.server, args.token.clone()).await?;
    let api_url = args.api_url.trim();
    client.clear_cache(api_url).await?;

    info!(target: "events_block::cache", api_url, server = %args.server, "cache cleared");
    Ok(())
}
