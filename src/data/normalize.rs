//! Raw event schema and normalization into display records
//!
//! The upstream API makes no promises about which fields are present, or even
//! about their JSON types (the events calendar sends `"venue": []` for events
//! without a venue). Every field of [`RawEventRecord`] is therefore optional and
//! any value of the wrong shape is read as absent. Defaulting happens here and
//! nowhere else.

use std::fmt::Write;

use chrono::format::{Item, StrftimeItems};
use chrono::{DateTime, NaiveDate, NaiveDateTime};
use serde::de::{DeserializeOwned, Deserializer};
use serde::Deserialize;
use serde_json::Value;

use super::NormalizedEvent;

/// Long-form date, e.g. "October, 5, 2025"
pub const DEFAULT_DATE_FORMAT: &str = "%B, %-d, %Y";

/// Title used when the upstream record has none
pub const DEFAULT_UNTITLED_LABEL: &str = "Untitled";

/// Layouts accepted for `start_date`, tried in order after RFC 3339
const START_DATE_FORMATS: &[&str] = &[
    "%Y-%m-%d %H:%M:%S",
    "%Y-%m-%dT%H:%M:%S",
    "%Y-%m-%d %H:%M",
    "%Y-%m-%dT%H:%M",
];

/// One entry of the upstream `events` array
#[derive(Debug, Clone, Default, Deserialize)]
pub struct RawEventRecord {
    #[serde(default, deserialize_with = "lenient")]
    pub title: Option<String>,
    #[serde(default, deserialize_with = "lenient")]
    pub organizer: Option<RawOrganizer>,
    #[serde(default, deserialize_with = "lenient")]
    pub start_date: Option<String>,
    #[serde(default, deserialize_with = "lenient")]
    pub venue: Option<RawVenue>,
    #[serde(default, deserialize_with = "lenient")]
    pub image: Option<RawImage>,
    #[serde(default, deserialize_with = "lenient")]
    pub url: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct RawOrganizer {
    #[serde(default, deserialize_with = "lenient")]
    pub organizer: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct RawVenue {
    #[serde(default, deserialize_with = "lenient")]
    pub venue: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct RawImage {
    #[serde(default, deserialize_with = "lenient")]
    pub url: Option<String>,
    #[serde(default, deserialize_with = "lenient")]
    pub sizes: Option<RawImageSizes>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct RawImageSizes {
    #[serde(default, deserialize_with = "lenient")]
    pub medium: Option<RawImageSize>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct RawImageSize {
    #[serde(default, deserialize_with = "lenient")]
    pub url: Option<String>,
}

/// Reads a field, turning a value of the wrong shape into `None`
fn lenient<'de, D, T>(deserializer: D) -> Result<Option<T>, D::Error>
where
    D: Deserializer<'de>,
    T: DeserializeOwned,
{
    let value = Value::deserialize(deserializer)?;
    Ok(serde_json::from_value(value).ok())
}

/// Display settings applied while normalizing
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NormalizeOptions {
    /// strftime layout for the event date
    pub date_format: String,
    /// Title used when the record has none
    pub untitled_label: String,
}

impl Default for NormalizeOptions {
    fn default() -> Self {
        Self {
            date_format: DEFAULT_DATE_FORMAT.to_string(),
            untitled_label: DEFAULT_UNTITLED_LABEL.to_string(),
        }
    }
}

impl RawEventRecord {
    /// Reads a record from one array entry; non-objects are rejected
    pub fn from_value(value: Value) -> Option<Self> {
        if !value.is_object() {
            return None;
        }
        serde_json::from_value(value).ok()
    }

    /// Maps this record into a display record
    pub fn normalize(&self, options: &NormalizeOptions) -> NormalizedEvent {
        let title = match self.title.as_deref() {
            Some(title) if !title.trim().is_empty() => title.to_string(),
            _ => options.untitled_label.clone(),
        };

        let date = self
            .start_date
            .as_deref()
            .map(|raw| format_start_date(raw, &options.date_format))
            .unwrap_or_default();

        NormalizedEvent {
            title,
            date,
            venue: self
                .venue
                .as_ref()
                .and_then(|venue| venue.venue.clone())
                .unwrap_or_default(),
            organizer: self
                .organizer
                .as_ref()
                .and_then(|organizer| organizer.organizer.clone())
                .unwrap_or_default(),
            featured_image: self.featured_image(),
            link: self.url.clone().unwrap_or_default(),
        }
    }

    /// Direct image URL first, then the medium rendition
    fn featured_image(&self) -> String {
        let Some(image) = self.image.as_ref() else {
            return String::new();
        };

        let direct = image.url.as_deref().filter(|url| !url.is_empty());
        let medium = image
            .sizes
            .as_ref()
            .and_then(|sizes| sizes.medium.as_ref())
            .and_then(|medium| medium.url.as_deref())
            .filter(|url| !url.is_empty());

        direct.or(medium).unwrap_or_default().to_string()
    }
}

/// Normalizes the entries of an `events` array, skipping non-object entries
pub fn normalize_events(items: Vec<Value>, options: &NormalizeOptions) -> Vec<NormalizedEvent> {
    items
        .into_iter()
        .filter_map(RawEventRecord::from_value)
        .map(|record| record.normalize(options))
        .collect()
}

/// Formats an upstream `start_date`; unparseable input yields an empty string
pub fn format_start_date(raw: &str, format: &str) -> String {
    let Some(start) = parse_start_date(raw.trim()) else {
        return String::new();
    };

    let mut out = String::new();
    if write!(out, "{}", start.format(format)).is_err() {
        return String::new();
    }
    out
}

/// Whether a strftime layout is usable for event dates
pub fn is_valid_date_format(format: &str) -> bool {
    !format.is_empty() && StrftimeItems::new(format).all(|item| !matches!(item, Item::Error))
}

fn parse_start_date(raw: &str) -> Option<NaiveDateTime> {
    if raw.is_empty() {
        return None;
    }

    if let Ok(parsed) = DateTime::parse_from_rfc3339(raw) {
        return Some(parsed.naive_local());
    }

    START_DATE_FORMATS
        .iter()
        .find_map(|layout| NaiveDateTime::parse_from_str(raw, layout).ok())
        .or_else(|| {
            NaiveDate::parse_from_str(raw, "%Y-%m-%d")
                .ok()
                .and_then(|date| date.and_hms_opt(0, 0, 0))
        })
}
