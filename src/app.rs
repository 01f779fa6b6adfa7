//! Editor preview state management
//!
//! This module holds the state of a block while it is being edited: its
//! attributes, what the preview currently shows, and the generation counter
//! that keeps a slow, superseded fetch from overwriting newer results.

use tracing::debug;

use crate::client::CacheClearer;
use crate::data::{
    clamp_item_count, BlockAttributes, EventSource, FetchError, LayoutStyle, NormalizedEvent,
};

/// What the editor preview is showing
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PreviewState {
    /// No API URL entered yet
    Empty,
    /// A fetch is in flight
    Loading,
    /// The last fetch failed with this message
    Error(String),
    /// The endpoint answered with no events
    EmptyResult,
    /// Events to display
    ShowingResults(Vec<NormalizedEvent>),
}

impl PreviewState {
    /// Short name of the state, used by the preview template
    pub fn name(&self) -> &'static str {
        match self {
            PreviewState::Empty => "empty",
            PreviewState::Loading => "loading",
            PreviewState::Error(_) => "error",
            PreviewState::EmptyResult => "empty-result",
            PreviewState::ShowingResults(_) => "results",
        }
    }
}

/// A fetch started by the preview
///
/// Only the ticket of the latest generation may update the preview.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchTicket {
    generation: u64,
    pub api_url: String,
    pub item_count: u32,
}

impl FetchTicket {
    pub fn generation(&self) -> u64 {
        self.generation
    }
}

/// Editor-side state of one block instance
#[derive(Debug, Clone)]
pub struct EditorPreview {
    /// Attributes as edited in the settings panel
    pub attributes: BlockAttributes,
    /// What the preview shows
    pub state: PreviewState,
    /// Whether the "cache cleared" notice is showing
    pub cache_cleared: bool,
    /// Bumped by every fetch, clear and URL removal
    generation: u64,
}

impl Default for EditorPreview {
    fn default() -> Self {
        Self::new(BlockAttributes::default())
    }
}

impl EditorPreview {
    /// Creates a preview for saved attributes
    ///
    /// The preview starts out `Empty`; call [`EditorPreview::begin_fetch`] to
    /// load a block that already has a URL.
    pub fn new(mut attributes: BlockAttributes) -> Self {
        attributes.api_url = attributes.api_url.trim().to_string();
        attributes.item_count = attributes.clamped_item_count();
        Self {
            attributes,
            state: PreviewState::Empty,
            cache_cleared: false,
            generation: 0,
        }
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn is_loading(&self) -> bool {
        self.state == PreviewState::Loading
    }

    /// Updates the API URL, restarting the fetch when it changed
    pub fn set_api_url(&mut self, api_url: &str) -> Option<FetchTicket> {
        let api_url = api_url.trim();
        if api_url == self.attributes.api_url {
            return None;
        }
        self.attributes.api_url = api_url.to_string();
        self.begin_fetch()
    }

    /// Updates the item count, restarting the fetch when it changed
    pub fn set_item_count(&mut self, item_count: u32) -> Option<FetchTicket> {
        let item_count = clamp_item_count(item_count);
        if item_count == self.attributes.item_count {
            return None;
        }
        self.attributes.item_count = item_count;
        self.begin_fetch()
    }

    /// Changes the layout; the shown events stay as they are
    pub fn set_layout_style(&mut self, layout_style: LayoutStyle) {
        self.attributes.layout_style = layout_style;
    }

    /// Starts a new generation
    ///
    /// Without a URL the preview becomes `Empty` and no fetch is needed; any
    /// fetch still in flight is invalidated either way.
    pub fn begin_fetch(&mut self) -> Option<FetchTicket> {
        self.generation += 1;

        if !self.attributes.has_api_url() {
            self.state = PreviewState::Empty;
            return None;
        }

        self.state = PreviewState::Loading;
        Some(FetchTicket {
            generation: self.generation,
            api_url: self.attributes.api_url.clone(),
            item_count: self.attributes.item_count,
        })
    }

    /// Applies the outcome of a fetch
    ///
    /// Returns `false`, leaving the preview untouched, when `ticket` belongs
    /// to a superseded generation.
    pub fn apply_result(
        &mut self,
        ticket: &FetchTicket,
        result: Result<Vec<NormalizedEvent>, FetchError>,
    ) -> bool {
        if ticket.generation != self.generation {
            debug!(
                target: "events_block::editor",
                stale = ticket.generation,
                current = self.generation,
                "discarding superseded fetch result"
            );
            return false;
        }

        self.state = match result {
            Ok(events) if events.is_empty() => PreviewState::EmptyResult,
            Ok(events) => PreviewState::ShowingResults(events),
            Err(err) => PreviewState::Error(err.user_message()),
        };
        true
    }

    /// Fetches the current attributes from `source` and applies the result
    pub async fn refresh(&mut self, source: &dyn EventSource) -> bool {
        let Some(ticket) = self.begin_fetch() else {
            return false;
        };
        let result = source
            .fetch_events(&ticket.api_url, ticket.item_count)
            .await;
        self.apply_result(&ticket, result)
    }

    /// Clears the server cache for the current URL, then re-fetches
    ///
    /// Does nothing without a URL. A rejected clear leaves the preview in
    /// `Error` with the server's message.
    pub async fn clear_cache(
        &mut self,
        clearer: &dyn CacheClearer,
        source: &dyn EventSource,
    ) -> bool {
        if !self.attributes.has_api_url() {
            return false;
        }

        self.generation += 1;
        self.state = PreviewState::Loading;
        self.cache_cleared = false;

        match clearer.clear_cache(&self.attributes.api_url).await {
            Ok(()) => {
                self.cache_cleared = true;
                self.refresh(source).await;
                true
            }
            Err(err) => {
                self.state = PreviewState::Error(err.to_string());
                false
            }
        }
    }

    /// Hides the "cache cleared" notice
    pub fn dismiss_notice(&mut self) {
        self.cache_cleared = false;
    }
}
