//! Events API client
//!
//! Fetches events from a REST endpoint that answers with `{ "events": [...] }`
//! and normalizes each record for display.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::{header, Client, StatusCode};
use serde_json::Value;
use thiserror::Error;
use tracing::debug;
use url::Url;

use super::normalize::{normalize_events, NormalizeOptions};
use super::NormalizedEvent;

/// Hard deadline for one events request
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(8);

/// User-Agent sent with every events request
pub const DEFAULT_USER_AGENT: &str = concat!("events-block/", env!("CARGO_PKG_VERSION"));

/// Query parameter carrying the requested item count
const PER_PAGE_PARAM: &str = "per_page";

/// Item count used when only the URL itself is being checked
const MIN_PER_PAGE: u32 = 1;

/// Errors that can occur when fetching events
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FetchError {
    /// The API URL is not an absolute http(s) URL
    #[error("invalid API URL: {0}")]
    InvalidUrl(String),

    /// The endpoint answered 404
    #[error("API endpoint not found (HTTP 404)")]
    NotFound,

    /// The endpoint answered 403
    #[error("access to API endpoint denied (HTTP 403)")]
    Forbidden,

    /// Any other non-success status
    #[error("API request failed with HTTP {0}")]
    HttpStatus(u16),

    /// The request deadline expired
    #[error("API request timed out")]
    Timeout,

    /// The body is not JSON, or has no `events` array
    #[error("invalid API response format: {0}")]
    InvalidResponseFormat(String),

    /// Connection, TLS or other transport failure
    #[error("network error: {0}")]
    Network(String),
}

impl FetchError {
    /// Message shown in the editor preview
    pub fn user_message(&self) -> String {
        match self {
            FetchError::InvalidUrl(_) => "Please enter a valid URL".to_string(),
            FetchError::NotFound => "API endpoint not found. Please check the URL.".to_string(),
            FetchError::Forbidden => "Access denied to the API endpoint.".to_string(),
            FetchError::HttpStatus(status) => {
                format!("Failed to fetch data from API. Status: {status}")
            }
            FetchError::Timeout => "Request timeout. Please try again.".to_string(),
            FetchError::InvalidResponseFormat(_) => {
                "Invalid API response format. Expected an object with array of events.".to_string()
            }
            FetchError::Network(_) => {
                "Could not reach the API endpoint. Please try again.".to_string()
            }
        }
    }

    /// Short machine-readable kind, used as a log field
    pub fn kind(&self) -> &'static str {
        match self {
            FetchError::InvalidUrl(_) => "invalid_url",
            FetchError::NotFound => "not_found",
            FetchError::Forbidden => "forbidden",
            FetchError::HttpStatus(_) => "http_error",
            FetchError::Timeout => "timeout",
            FetchError::InvalidResponseFormat(_) => "invalid_response_format",
            FetchError::Network(_) => "network_error",
        }
    }
}

/// Anything that can produce normalized events for an endpoint
#[async_trait]
pub trait EventSource: Send + Sync {
    async fn fetch_events(
        &self,
        api_url: &str,
        item_count: u32,
    ) -> Result<Vec<NormalizedEvent>, FetchError>;
}

/// Hosts the public render endpoint may fetch from
///
/// Visitors choose the `apiUrl` of a render request, so the server only
/// fetches from listed hosts. An empty list permits every host.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AllowedHosts {
    hosts: Vec<String>,
}

impl AllowedHosts {
    /// Permits every host
    pub fn any() -> Self {
        Self::default()
    }

    /// Permits only `hosts`, compared case-insensitively
    ///
    /// An entry starting with `.` also permits every subdomain, so
    /// `.example.edu` matches `events.example.edu` and `example.edu`.
    pub fn only<I, S>(hosts: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        Self {
            hosts: hosts
                .into_iter()
                .map(|host| host.as_ref().trim().to_ascii_lowercase())
                .filter(|host| !host.is_empty())
                .collect(),
        }
    }

    pub fn is_unrestricted(&self) -> bool {
        self.hosts.is_empty()
    }

    pub fn hosts(&self) -> &[String] {
        &self.hosts
    }

    /// Whether `api_url` is a valid events URL on a permitted host
    pub fn permits(&self, api_url: &str) -> bool {
        let Ok(url) = EventsClient::request_url(api_url, MIN_PER_PAGE) else {
            return false;
        };
        let Some(host) = url.host_str() else {
            return false;
        };
        if self.is_unrestricted() {
            return true;
        }

        let host = host.to_ascii_lowercase();
        self.hosts.iter().any(|allowed| match allowed.strip_prefix('.') {
            Some(domain) => {
                host == domain
                    || host
                        .strip_suffix(domain)
                        .is_some_and(|prefix| prefix.ends_with('.'))
            }
            None => host == *allowed,
        })
    }
}

/// Client for fetching events from a REST endpoint
#[derive(Debug, Clone)]
pub struct EventsClient {
    http_client: Client,
    timeout: Duration,
    user_agent: String,
    options: NormalizeOptions,
}

impl Default for EventsClient {
    fn default() -> Self {
        Self::new()
    }
}

impl EventsClient {
    /// Create a new EventsClient with default settings
    pub fn new() -> Self {
        Self::with_client(Client::new())
    }

    /// Create a new EventsClient with a custom HTTP client
    pub fn with_client(client: Client) -> Self {
        Self {
            http_client: client,
            timeout: DEFAULT_TIMEOUT,
            user_agent: DEFAULT_USER_AGENT.to_string(),
            options: NormalizeOptions::default(),
        }
    }

    /// Sets the hard deadline for each request (8 seconds by default)
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Sets the `User-Agent` header sent upstream
    pub fn with_user_agent(mut self, user_agent: impl Into<String>) -> Self {
        self.user_agent = user_agent.into();
        self
    }

    /// Sets the date format and untitled label used when normalizing
    ///
    /// # Arguments
    /// * `options` - Normalization settings, usually from the `display` config
    pub fn with_options(mut self, options: NormalizeOptions) -> Self {
        self.options = options;
        self
    }

    /// Builds the request URL: validates `api_url` and sets `per_page`
    ///
    /// An existing `per_page` parameter is replaced; every other parameter is
    /// kept in order.
    pub fn request_url(api_url: &str, item_count: u32) -> Result<Url, FetchError> {
        let mut url =
            Url::parse(api_url.trim()).map_err(|_| FetchError::InvalidUrl(api_url.to_string()))?;

        if !matches!(url.scheme(), "http" | "https") || url.host_str().is_none() {
            return Err(FetchError::InvalidUrl(api_url.to_string()));
        }

        let retained: Vec<(String, String)> = url
            .query_pairs()
            .filter(|(name, _)| name != PER_PAGE_PARAM)
            .map(|(name, value)| (name.into_owned(), value.into_owned()))
            .collect();

        url.query_pairs_mut()
            .clear()
            .extend_pairs(retained)
            .append_pair(PER_PAGE_PARAM, &item_count.to_string());

        Ok(url)
    }

    /// Fetches events directly from the API
    async fn fetch_from_api(&self, url: Url) -> Result<Vec<NormalizedEvent>, FetchError> {
        let response = self
            .http_client
            .get(url)
            .header(header::ACCEPT, "application/json")
            .header(header::USER_AGENT, self.user_agent.as_str())
            .timeout(self.timeout)
            .send()
            .await
            .map_err(transport_error)?;

        let status = response.status();
        if !status.is_success() {
            return Err(status_error(status));
        }

        let body = response.text().await.map_err(transport_error)?;
        let items = extract_events(&body)?;

        Ok(normalize_events(items, &self.options))
    }
}

#[async_trait]
impl EventSource for EventsClient {
    async fn fetch_events(
        &self,
        api_url: &str,
        item_count: u32,
    ) -> Result<Vec<NormalizedEvent>, FetchError> {
        let url = Self::request_url(api_url, item_count)?;
        debug!(target: "events_block::fetch", url = %url, "fetching events");

        let events = self.fetch_from_api(url).await?;
        debug!(
            target: "events_block::fetch",
            api_url,
            count = events.len(),
            "fetched events"
        );
        Ok(events)
    }
}

/// Pulls the `events` array out of a response body
pub fn extract_events(body: &str) -> Result<Vec<Value>, FetchError> {
    let mut payload: Value = serde_json::from_str(body)
        .map_err(|err| FetchError::InvalidResponseFormat(format!("body is not JSON: {err}")))?;

    match payload.get_mut("events").map(Value::take) {
        Some(Value::Array(items)) => Ok(items),
        Some(_) => Err(FetchError::InvalidResponseFormat(
            "`events` is not an array".to_string(),
        )),
        None => Err(FetchError::InvalidResponseFormat(
            "missing `events` field".to_string(),
        )),
    }
}

fn status_error(status: StatusCode) -> FetchError {
    match status {
        StatusCode::NOT_FOUND => FetchError::NotFound,
        StatusCode::FORBIDDEN => FetchError::Forbidden,
        other => FetchError::HttpStatus(other.as_u16()),
    }
}

fn transport_error(err: reqwest::Error) -> FetchError {
    if err.is_timeout() {
        FetchError::Timeout
    } else {
        FetchError::Network(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use httpmock::MockServer;

    #[test]
    fn test_allowed_hosts_any_permits_every_valid_url() {
        let hosts = AllowedHosts::any();
        assert!(hosts.is_unrestricted());
        assert!(hosts.permits("https://events.example.edu/wp-json/tribe/events/v1/events"));
        assert!(!hosts.permits("ftp://events.example.edu/"));
        assert!(!hosts.permits("not a url"));
    }

    #[test]
    fn test_allowed_hosts_only_matches_listed_hosts() {
        let hosts = AllowedHosts::only(["Events.Example.edu", " "]);
        assert_eq!(hosts.hosts(), ["events.example.edu".to_string()]);
        assert!(hosts.permits("https://EVENTS.example.edu/api?x=1"));
        assert!(!hosts.permits("https://example.edu/api"));
        assert!(!hosts.permits("http://169.254.169.254/latest/meta-data"));
        assert!(!hosts.permits("http://127.0.0.1:9/events"));
    }

    #[test]
    fn test_allowed_hosts_leading_dot_covers_subdomains() {
        let hosts = AllowedHosts::only([".example.edu"]);
        assert!(hosts.permits("https://example.edu/events"));
        assert!(hosts.permits("https://calendar.arts.example.edu/events"));
        assert!(!hosts.permits("https://badexample.edu/events"));
        assert!(!hosts.permits("https://example.edu.attacker.net/events"));
    }

    const EVENTS_PATH: &str = "/wp-json/tribe/events/v1/events";

    const FIVE_EVENTS: &str = r#"{
        "events": [
            { "title": "One", "start_date": "2025-10-01 09:00:00" },
            { "title": "Two", "venue": { "venue": "Hall" } },
            { "title": "Three", "url": "https://events.example.com/3" },
            { "title": "Four", "image": { "url": "https://example.com/4.jpg" } },
            { "title": "Five", "organizer": { "organizer": "Library" } }
        ],
        "total": 5
    }"#;

    #[test]
    fn test_request_url_sets_per_page() {
        let url = EventsClient::request_url("https://x.edu/wp-json/tribe/events/v1/events", 3)
            .expect("valid url");
        assert_eq!(url.as_str(), "https://x.edu/wp-json/tribe/events/v1/events?per_page=3");
    }

    #[test]
    fn test_request_url_replaces_existing_per_page_and_keeps_other_params() {
        let url = EventsClient::request_url("https://x.edu/events?categories=arts&per_page=50", 4)
            .expect("valid url");
        assert_eq!(url.as_str(), "https://x.edu/events?categories=arts&per_page=4");
    }

    #[test]
    fn test_request_url_rejects_invalid_urls() {
        for bad in ["not a url", "/relative/path", "ftp://x.edu/events", "mailto:a@b.c", ""] {
            assert!(
                matches!(EventsClient::request_url(bad, 5), Err(FetchError::InvalidUrl(_))),
                "expected {bad:?} to be rejected"
            );
        }
    }

    #[test]
    fn test_extract_events_rejects_non_array() {
        let err = extract_events(r#"{"events": {"0": {"title": "x"}}}"#).unwrap_err();
        assert!(matches!(err, FetchError::InvalidResponseFormat(_)));

        let err = extract_events(r#"{"posts": []}"#).unwrap_err();
        assert!(matches!(err, FetchError::InvalidResponseFormat(_)));

        let err = extract_events("<html>oops</html>").unwrap_err();
        assert!(matches!(err, FetchError::InvalidResponseFormat(_)));

        let err = extract_events("[]").unwrap_err();
        assert!(matches!(err, FetchError::InvalidResponseFormat(_)));
    }

    #[test]
    fn test_user_messages_are_distinct_for_404_and_403() {
        assert_ne!(
            FetchError::NotFound.user_message(),
            FetchError::Forbidden.user_message()
        );
        assert!(FetchError::HttpStatus(502).user_message().contains("502"));
    }

    #[tokio::test]
    async fn test_fetch_requests_per_page_and_normalizes_all_items() {
        let server = MockServer::start_async().await;
        let mock = server
            .mock_async(|when, then| {
                when.method("GET")
                    .path(EVENTS_PATH)
                    .query_param("per_page", "3")
                    .header("accept", "application/json");
                then.status(200)
                    .header("content-type", "application/json")
                    .body(FIVE_EVENTS);
            })
            .await;

        let client = EventsClient::new();
        let events = client
            .fetch_events(&server.url(EVENTS_PATH), 3)
            .await
            .expect("fetch should succeed");

        mock.assert_async().await;
        assert_eq!(events.len(), 5);
        assert_eq!(events[0].date, "October, 1, 2025");
        assert_eq!(events[1].venue, "Hall");
        assert_eq!(events[2].link, "https://events.example.com/3");
        assert_eq!(events[3].featured_image, "https://example.com/4.jpg");
        assert_eq!(events[4].organizer, "Library");
    }

    #[tokio::test]
    async fn test_fetch_empty_events_is_not_an_error() {
        let server = MockServer::start_async().await;
        server
            .mock_async(|when, then| {
                when.method("GET").path(EVENTS_PATH);
                then.status(200).body(r#"{"events": []}"#);
            })
            .await;

        let events = EventsClient::new()
            .fetch_events(&server.url(EVENTS_PATH), 5)
            .await
            .expect("empty list is a success");
        assert!(events.is_empty());
    }

    #[tokio::test]
    async fn test_fetch_maps_status_codes() {
        let server = MockServer::start_async().await;
        server
            .mock_async(|when, then| {
                when.method("GET").path("/missing");
                then.status(404);
            })
            .await;
        server
            .mock_async(|when, then| {
                when.method("GET").path("/private");
                then.status(403);
            })
            .await;
        server
            .mock_async(|when, then| {
                when.method("GET").path("/broken");
                then.status(503);
            })
            .await;

        let client = EventsClient::new();
        assert_eq!(
            client.fetch_events(&server.url("/missing"), 5).await,
            Err(FetchError::NotFound)
        );
        assert_eq!(
            client.fetch_events(&server.url("/private"), 5).await,
            Err(FetchError::Forbidden)
        );
        assert_eq!(
            client.fetch_events(&server.url("/broken"), 5).await,
            Err(FetchError::HttpStatus(503))
        );
    }

    #[tokio::test]
    async fn test_fetch_object_events_is_invalid_format() {
        let server = MockServer::start_async().await;
        server
            .mock_async(|when, then| {
                when.method("GET").path(EVENTS_PATH);
                then.status(200).body(r#"{"events": {"title": "not a list"}}"#);
            })
            .await;

        let result = EventsClient::new()
            .fetch_events(&server.url(EVENTS_PATH), 5)
            .await;
        assert!(matches!(result, Err(FetchError::InvalidResponseFormat(_))));
    }

    #[tokio::test]
    async fn test_fetch_deadline_is_reported_as_timeout() {
        let server = MockServer::start_async().await;
        server
            .mock_async(|when, then| {
                when.method("GET").path(EVENTS_PATH);
                then.status(200)
                    .delay(Duration::from_millis(500))
                    .body(r#"{"events": []}"#);
            })
            .await;

        let client = EventsClient::new().with_timeout(Duration::from_millis(50));
        let result = client.fetch_events(&server.url(EVENTS_PATH), 5).await;
        assert_eq!(result, Err(FetchError::Timeout));
    }

    #[tokio::test]
    async fn test_fetch_unreachable_host_is_network_error() {
        // Port 9 (discard) on localhost is closed in test environments
        let result = EventsClient::new()
            .with_timeout(Duration::from_secs(2))
            .fetch_events("http://127.0.0.1:9/events", 5)
            .await;
        assert!(matches!(result, Err(FetchError::Network(_))));
    }

    #[tokio::test]
    async fn test_invalid_url_fails_without_network() {
        let result = EventsClient::new().fetch_events("events.example.com", 5).await;
        assert!(matches!(result, Err(FetchError::InvalidUrl(_))));
    }
}
