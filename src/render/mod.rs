//! HTML rendering for the public block and the editor preview
//!
//! Event text may carry inline markup from the upstream API. The public page
//! keeps a small allow-list of formatting tags; the editor preview strips all
//! markup. URLs are only emitted when they are absolute http(s) URLs, and are
//! attribute-escaped by the template.

use std::collections::HashSet;

use ammonia::Builder;
use askama::Template;
use thiserror::Error;
use url::Url;

use crate::app::{EditorPreview, PreviewState};
use crate::data::{LayoutStyle, NormalizedEvent};

/// Placeholder link used when no calendar URL is configured
pub const DEFAULT_CALENDAR_URL: &str = "https://events.example.com/";

/// Inline tags allowed in event text on the public page
const FORMATTING_TAGS: [&str; 14] = [
    "a", "abbr", "b", "br", "code", "em", "i", "mark", "small", "span", "strong", "sub", "sup",
    "u",
];

#[derive(Debug, Error)]
pub enum RenderError {
    #[error("template rendering failed: {0}")]
    Template(#[from] askama::Error),
}

/// Event fields after sanitizing, ready for a template
#[derive(Debug, Clone, PartialEq, Eq)]
struct EventView {
    title: String,
    date: String,
    venue: String,
    image_src: String,
    link_href: String,
}

#[derive(Template)]
#[template(path = "events_block.html")]
struct BlockTemplate<'a> {
    layout: &'a str,
    calendar_url: &'a str,
    events: Vec<EventView>,
}

#[derive(Template)]
#[template(path = "editor_preview.html")]
struct PreviewTemplate<'a> {
    layout: &'a str,
    state: &'a str,
    message: &'a str,
    cache_cleared: bool,
    events: Vec<EventView>,
}

/// Renders event lists with sanitized text
pub struct Renderer {
    rich: Builder<'static>,
    plain: Builder<'static>,
    calendar_url: String,
}

impl std::fmt::Debug for Renderer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Renderer")
            .field("calendar_url", &self.calendar_url)
            .finish_non_exhaustive()
    }
}

impl Default for Renderer {
    fn default() -> Self {
        Self::new(DEFAULT_CALENDAR_URL)
    }
}

impl Renderer {
    /// Renderer linking its placeholder to `calendar_url`
    ///
    /// A calendar URL that is not http(s) falls back to [`DEFAULT_CALENDAR_URL`].
    pub fn new(calendar_url: impl Into<String>) -> Self {
        let mut rich = Builder::default();
        rich.tags(HashSet::from(FORMATTING_TAGS))
            .url_schemes(HashSet::from(["http", "https", "mailto"]))
            .link_rel(Some("noopener noreferrer"));

        let mut plain = Builder::default();
        plain.tags(HashSet::new());

        let calendar_url = calendar_url.into();
        let calendar_url =
            safe_url(&calendar_url).unwrap_or_else(|| DEFAULT_CALENDAR_URL.to_string());

        Self {
            rich,
            plain,
            calendar_url,
        }
    }

    pub fn calendar_url(&self) -> &str {
        &self.calendar_url
    }

    /// Sanitizes text for the public page, keeping inline formatting
    pub fn sanitize_rich(&self, text: &str) -> String {
        self.rich.clean(text).to_string()
    }

    /// Strips every tag, returning escaped plain text
    pub fn strip_markup(&self, text: &str) -> String {
        self.plain.clean(text).to_string()
    }

    /// Renders the public block
    ///
    /// No events (including an empty URL) renders the calendar placeholder.
    pub fn render_block(
        &self,
        layout: LayoutStyle,
        events: &[NormalizedEvent],
    ) -> Result<String, RenderError> {
        let template = BlockTemplate {
            layout: layout.as_str(),
            calendar_url: &self.calendar_url,
            events: events.iter().map(|event| self.public_view(event)).collect(),
        };
        Ok(template.render()?)
    }

    /// Renders the editor preview for its current state
    pub fn render_preview(&self, preview: &EditorPreview) -> Result<String, RenderError> {
        let (message, events) = match &preview.state {
            PreviewState::Error(message) => (message.as_str(), Vec::new()),
            PreviewState::ShowingResults(events) => (
                "",
                events.iter().map(|event| self.preview_view(event)).collect(),
            ),
            _ => ("", Vec::new()),
        };

        let template = PreviewTemplate {
            layout: preview.attributes.layout_style.as_str(),
            state: preview.state.name(),
            message,
            cache_cleared: preview.cache_cleared,
            events,
        };
        Ok(template.render()?)
    }

    fn public_view(&self, event: &NormalizedEvent) -> EventView {
        EventView {
            title: self.sanitize_rich(&event.title),
            date: self.sanitize_rich(&event.date),
            venue: self.sanitize_rich(&event.venue),
            image_src: safe_url(&event.featured_image).unwrap_or_default(),
            link_href: safe_url(&event.link).unwrap_or_default(),
        }
    }

    fn preview_view(&self, event: &NormalizedEvent) -> EventView {
        EventView {
            title: self.strip_markup(&event.title),
            date: self.strip_markup(&event.date),
            venue: self.strip_markup(&event.venue),
            image_src: safe_url(&event.featured_image).unwrap_or_default(),
            link_href: String::new(),
        }
    }
}

/// Returns `raw` normalized when it is an absolute http(s) URL
pub fn safe_url(raw: &str) -> Option<String> {
    let url = Url::parse(raw.trim()).ok()?;
    matches!(url.scheme(), "http" | "https").then(|| url.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::{BlockAttributes, FetchError};

    fn event(title: &str) -> NormalizedEvent {
        NormalizedEvent {
            title: title.to_string(),
            date: "October, 5, 2025".to_string(),
            venue: "Quarry Amphitheater".to_string(),
            organizer: "Arts Division".to_string(),
            featured_image: "https://cdn.example.com/poster.jpg".to_string(),
            link: "https://events.example.com/e/1".to_string(),
        }
    }

    fn preview_with_url() -> EditorPreview {
        let mut preview = EditorPreview::new(BlockAttributes::default());
        preview.set_api_url("https://events.example.com/api");
        preview
    }

    #[test]
    fn test_block_without_events_renders_placeholder() {
        let renderer = Renderer::new("https://calendar.example.edu/");
        let html = renderer
            .render_block(LayoutStyle::Grid, &[])
            .expect("render");

        assert!(html.contains("wp-block-events layout-grid"));
        assert!(html.contains("events-placeholder"));
        assert!(html.contains("href=\"https://calendar.example.edu/\""));
        assert!(!html.contains("events-list"));
    }

    #[test]
    fn test_block_lists_events_with_links_and_lazy_images() {
        let renderer = Renderer::default();
        let html = renderer
            .render_block(LayoutStyle::List, &[event("Jazz Night"), event("Film")])
            .expect("render");

        assert!(html.contains("wp-block-events layout-list"));
        assert_eq!(html.matches("class=\"event-item\"").count(), 2);
        assert!(html.contains("rel=\"noopener noreferrer\""));
        assert!(html.contains("loading=\"lazy\""));
        assert!(html.contains("alt=\"\""));
        assert!(html.contains("October, 5, 2025"));
        assert!(html.contains("Quarry Amphitheater"));
    }

    #[test]
    fn test_block_omits_link_and_image_when_absent() {
        let mut bare = event("Bare");
        bare.link = String::new();
        bare.featured_image = String::new();
        bare.venue = String::new();

        let html = Renderer::default()
            .render_block(LayoutStyle::Cards, &[bare])
            .expect("render");

        assert!(html.contains("Bare"));
        assert!(!html.contains("<a "));
        assert!(!html.contains("<img"));
        assert!(!html.contains("event-venue"));
    }

    #[test]
    fn test_block_keeps_formatting_but_drops_scripts() {
        let html = Renderer::default()
            .render_block(
                LayoutStyle::List,
                &[event("<em>Open</em> Mic<script>alert(1)</script>")],
            )
            .expect("render");

        assert!(html.contains("<em>Open</em> Mic"));
        assert!(!html.contains("<script"));
        assert!(!html.contains("alert(1)"));
    }

    #[test]
    fn test_unsafe_urls_are_not_emitted() {
        let mut hostile = event("Hostile");
        hostile.link = "javascript:alert(1)".to_string();
        hostile.featured_image = "data:image/png;base64,AAAA".to_string();

        let html = Renderer::default()
            .render_block(LayoutStyle::List, &[hostile])
            .expect("render");

        assert!(!html.contains("javascript:"));
        assert!(!html.contains("data:image"));
    }

    #[test]
    fn test_urls_are_attribute_escaped() {
        let mut quoted = event("Quoted");
        quoted.link = "https://events.example.com/e?a=1&b=\"2\"".to_string();

        let html = Renderer::default()
            .render_block(LayoutStyle::List, &[quoted])
            .expect("render");

        assert!(!html.contains("b=\"2\""));
    }

    #[test]
    fn test_strip_markup_returns_plain_text() {
        let renderer = Renderer::default();
        assert_eq!(renderer.strip_markup("<b>Bold</b> move"), "Bold move");
        assert_eq!(renderer.strip_markup("Fish &amp; Chips"), "Fish &amp; Chips");
    }

    #[test]
    fn test_preview_states_render_their_messages() {
        let renderer = Renderer::default();

        let empty = EditorPreview::new(BlockAttributes::default());
        let html = renderer.render_preview(&empty).expect("render");
        assert!(html.contains("Enter an API URL"));

        let loading = preview_with_url();
        let html = renderer.render_preview(&loading).expect("render");
        assert!(html.contains("Loading events..."));

        let mut failed = preview_with_url();
        let ticket = failed.begin_fetch().expect("ticket");
        failed.apply_result(&ticket, Err(FetchError::Forbidden));
        let html = renderer.render_preview(&failed).expect("render");
        assert!(html.contains("notice-error"));
        assert!(html.contains("Access denied to the API endpoint."));

        let mut none = preview_with_url();
        let ticket = none.begin_fetch().expect("ticket");
        none.apply_result(&ticket, Ok(Vec::new()));
        let html = renderer.render_preview(&none).expect("render");
        assert!(html.contains("No events found at the specified API URL."));
    }

    #[test]
    fn test_preview_results_are_plain_text_without_links() {
        let mut preview = preview_with_url();
        let ticket = preview.begin_fetch().expect("ticket");
        preview.apply_result(&ticket, Ok(vec![event("<strong>Gala</strong>")]));

        let html = Renderer::default()
            .render_preview(&preview)
            .expect("render");

        assert!(html.contains("Gala"));
        assert!(!html.contains("<strong>"));
        assert!(!html.contains("<a "));
    }

    #[test]
    fn test_safe_url_accepts_only_http_schemes() {
        assert_eq!(
            safe_url(" https://example.com/a "),
            Some("https://example.com/a".to_string())
        );
        assert_eq!(safe_url("ftp://example.com/a"), None);
        assert_eq!(safe_url("/relative"), None);
        assert_eq!(safe_url(""), None);
    }
}
