//! Core data models for the events block
//!
//! This module contains the display records produced by the normalizer and the
//! attributes persisted with a block instance.

pub mod events;
pub mod normalize;

pub use events::{AllowedHosts, EventSource, EventsClient, FetchError};
pub use normalize::{normalize_events, NormalizeOptions, RawEventRecord};

use serde::{Deserialize, Serialize};

/// Smallest item count offered by the block settings
pub const MIN_ITEM_COUNT: u32 = 1;

/// Largest item count offered by the block settings
pub const MAX_ITEM_COUNT: u32 = 20;

/// Item count used when a block has none configured
pub const DEFAULT_ITEM_COUNT: u32 = 5;

/// An event ready for display
///
/// Every field is populated: absent upstream values become empty strings, and a
/// missing title becomes the configured "Untitled" label.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NormalizedEvent {
    /// Event title, possibly carrying inline markup
    pub title: String,
    /// Start date in long form, e.g. "October, 5, 2025"
    pub date: String,
    /// Venue name
    pub venue: String,
    /// Organizer name
    pub organizer: String,
    /// Image URL, or empty
    pub featured_image: String,
    /// Event page URL, or empty
    pub link: String,
}

/// Layout styles offered by the block
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LayoutStyle {
    #[default]
    List,
    Grid,
    Cards,
}

impl LayoutStyle {
    /// All layout styles, in the order the settings panel lists them
    pub const ALL: [LayoutStyle; 3] = [LayoutStyle::List, LayoutStyle::Grid, LayoutStyle::Cards];

    /// Returns the attribute value for this layout
    pub fn as_str(&self) -> &'static str {
        match self {
            LayoutStyle::List => "list",
            LayoutStyle::Grid => "grid",
            LayoutStyle::Cards => "cards",
        }
    }

    /// Parses an attribute value, case-insensitively
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_lowercase().as_str() {
            "list" => Some(LayoutStyle::List),
            "grid" => Some(LayoutStyle::Grid),
            "cards" => Some(LayoutStyle::Cards),
            _ => None,
        }
    }

    /// Parses an attribute value, falling back to the default layout
    pub fn parse_or_default(s: &str) -> Self {
        Self::parse(s).unwrap_or_default()
    }
}

/// Attributes persisted with a block instance
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct BlockAttributes {
    /// Events endpoint, empty until the editor enters one
    pub api_url: String,
    /// Number of events requested from the endpoint
    pub item_count: u32,
    /// How the event list is laid out
    pub layout_style: LayoutStyle,
}

impl Default for BlockAttributes {
    fn default() -> Self {
        Self {
            api_url: String::new(),
            item_count: DEFAULT_ITEM_COUNT,
            layout_style: LayoutStyle::default(),
        }
    }
}

impl BlockAttributes {
    /// Item count pulled into the range the settings panel allows
    pub fn clamped_item_count(&self) -> u32 {
        clamp_item_count(self.item_count)
    }

    /// Whether the block has an endpoint to fetch from
    pub fn has_api_url(&self) -> bool {
        !self.api_url.trim().is_empty()
    }
}

/// Pulls an item count into `MIN_ITEM_COUNT..=MAX_ITEM_COUNT`
pub fn clamp_item_count(item_count: u32) -> u32 {
    item_count.clamp(MIN_ITEM_COUNT, MAX_ITEM_COUNT)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_block_attributes_defaults() {
        let attributes = BlockAttributes::default();
        assert_eq!(attributes.api_url, "");
        assert_eq!(attributes.item_count, 5);
        assert_eq!(attributes.layout_style, LayoutStyle::List);
        assert!(!attributes.has_api_url());
    }

    #[test]
    fn test_block_attributes_deserialize_partial_json() {
        let attributes: BlockAttributes =
            serde_json::from_str(r#"{"apiUrl":"https://example.com/events","layoutStyle":"cards"}"#)
                .expect("attributes should parse");

        assert_eq!(attributes.api_url, "https://example.com/events");
        assert_eq!(attributes.item_count, DEFAULT_ITEM_COUNT);
        assert_eq!(attributes.layout_style, LayoutStyle::Cards);
    }

    #[test]
    fn test_clamp_item_count_bounds() {
        assert_eq!(clamp_item_count(0), 1);
        assert_eq!(clamp_item_count(7), 7);
        assert_eq!(clamp_item_count(50), 20);
    }

    #[test]
    fn test_layout_style_parse() {
        assert_eq!(LayoutStyle::parse("grid"), Some(LayoutStyle::Grid));
        assert_eq!(LayoutStyle::parse(" Cards "), Some(LayoutStyle::Cards));
        assert_eq!(LayoutStyle::parse("masonry"), None);
        assert_eq!(LayoutStyle::parse_or_default("masonry"), LayoutStyle::List);
    }

    #[test]
    fn test_normalized_event_serializes_camel_case() {
        let event = NormalizedEvent {
            title: "Talk".to_string(),
            date: String::new(),
            venue: String::new(),
            organizer: String::new(),
            featured_image: "https://example.com/a.jpg".to_string(),
            link: String::new(),
        };

        let json = serde_json::to_string(&event).expect("event should serialize");
        assert!(json.contains("\"featuredImage\":\"https://example.com/a.jpg\""));
    }
}
