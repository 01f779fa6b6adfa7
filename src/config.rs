//! Configuration layer: typed settings with layered precedence (file → env → CLI).

use std::{net::SocketAddr, path::PathBuf, str::FromStr, sync::Arc, time::Duration};

use config::{Config, Environment, File};
use serde::Deserialize;
use thiserror::Error;
use tracing::level_filters::LevelFilter;
use url::Url;

use crate::auth::{EditorAccount, EditorDirectory, NonceIssuer, DEFAULT_NONCE_LIFETIME};
use crate::cache::{Cache, CacheManager, EventCache, MemoryCache, DEFAULT_TTL};
use crate::cli::Cli;
use crate::data::events::{DEFAULT_TIMEOUT, DEFAULT_USER_AGENT};
use crate::data::normalize::{
    is_valid_date_format, DEFAULT_DATE_FORMAT, DEFAULT_UNTITLED_LABEL,
};
use crate::data::{AllowedHosts, EventSource, EventsClient, NormalizeOptions};
use crate::render::{safe_url, Renderer, DEFAULT_CALENDAR_URL};

const LOCAL_CONFIG_BASENAME: &str = "events-block";
const ENV_PREFIX: &str = "EVENTS_BLOCK";
const DEFAULT_HOST: &str = "127.0.0.1";
const DEFAULT_PORT: u16 = 3000;
/// Shortest nonce lifetime that still leaves each tick a whole second
const MIN_NONCE_LIFETIME_SECS: u64 = 2;

/// Fully-resolved settings after precedence resolution and validation.
#[derive(Debug, Clone)]
pub struct Settings {
    pub server: ServerSettings,
    pub cache: CacheSettings,
    pub fetch: FetchSettings,
    pub display: DisplaySettings,
    pub auth: AuthSettings,
    pub logging: LoggingSettings,
}

#[derive(Debug, Clone)]
pub struct ServerSettings {
    pub addr: SocketAddr,
    /// Externally visible base URL, used to build the action URL
    pub public_url: Url,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CacheBackend {
    Memory,
    Disk,
}

impl CacheBackend {
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_lowercase().as_str() {
            "memory" => Some(CacheBackend::Memory),
            "disk" => Some(CacheBackend::Disk),
            _ => None,
        }
    }
}

#[derive(Debug, Clone)]
pub struct CacheSettings {
    pub backend: CacheBackend,
    /// Directory for the disk backend; the XDG cache directory when unset
    pub directory: Option<PathBuf>,
    pub ttl: Duration,
}

#[derive(Debug, Clone)]
pub struct FetchSettings {
    pub timeout: Duration,
    pub user_agent: String,
    /// Hosts the public render endpoint may fetch from; empty permits all
    pub allowed_hosts: AllowedHosts,
}

#[derive(Debug, Clone)]
pub struct DisplaySettings {
    pub date_format: String,
    pub untitled_label: String,
    pub calendar_url: String,
}

#[derive(Clone)]
pub struct AuthSettings {
    pub nonce_secret: Option<String>,
    pub nonce_lifetime: Duration,
    pub editors: Vec<EditorAccount>,
}

impl std::fmt::Debug for AuthSettings {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AuthSettings")
            .field("nonce_secret", &self.nonce_secret.as_ref().map(|_| "<redacted>"))
            .field("nonce_lifetime", &self.nonce_lifetime)
            .field("editors", &self.editors.len())
            .finish()
    }
}

#[derive(Debug, Clone)]
pub struct LoggingSettings {
    pub level: LevelFilter,
    pub format: LogFormat,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogFormat {
    Json,
    Compact,
}

#[derive(Debug, Error)]
pub enum LoadError {
    #[error("failed to build configuration: {0}")]
    Build(#[from] config::ConfigError),
    #[error("invalid configuration for `{key}`: {reason}")]
    Invalid { key: &'static str, reason: String },
}

impl LoadError {
    fn invalid(key: &'static str, reason: impl Into<String>) -> Self {
        Self::Invalid {
            key,
            reason: reason.into(),
        }
    }
}

/// Load settings using the configured precedence (file → environment → CLI).
pub fn load(cli: &Cli) -> Result<Settings, LoadError> {
    let mut builder =
        Config::builder().add_source(File::with_name(LOCAL_CONFIG_BASENAME).required(false));

    if let Some(path) = cli.config_file.as_ref() {
        builder = builder.add_source(File::from(path.as_path()).required(true));
    }

    builder = builder.add_source(Environment::with_prefix(ENV_PREFIX).separator("__"));

    let mut raw: RawSettings = builder.build()?.try_deserialize()?;
    raw.apply_cli_overrides(cli);

    Settings::from_raw(raw)
}

impl Settings {
    fn from_raw(raw: RawSettings) -> Result<Self, LoadError> {
        let RawSettings {
            server,
            cache,
            fetch,
            display,
            auth,
            logging,
        } = raw;

        Ok(Self {
            server: build_server_settings(server)?,
            cache: build_cache_settings(cache)?,
            fetch: build_fetch_settings(fetch)?,
            display: build_display_settings(display)?,
            auth: build_auth_settings(auth)?,
            logging: build_logging_settings(logging)?,
        })
    }

    pub fn normalize_options(&self) -> NormalizeOptions {
        NormalizeOptions {
            date_format: self.display.date_format.clone(),
            untitled_label: self.display.untitled_label.clone(),
        }
    }

    /// HTTP client for the events API, configured from `fetch` and `display`
    pub fn events_client(&self) -> EventsClient {
        EventsClient::new()
            .with_timeout(self.fetch.timeout)
            .with_user_agent(self.fetch.user_agent.clone())
            .with_options(self.normalize_options())
    }

    /// Renderer for the configured calendar link
    pub fn renderer(&self) -> Renderer {
        Renderer::new(self.display.calendar_url.clone())
    }

    /// Opens the configured cache store
    pub fn cache_store(&self) -> Result<Arc<dyn Cache>, LoadError> {
        match self.cache.backend {
            CacheBackend::Memory => Ok(Arc::new(MemoryCache::new())),
            CacheBackend::Disk => {
                let manager = match self.cache.directory.as_ref() {
                    Some(directory) => CacheManager::with_dir(directory.clone()),
                    None => CacheManager::new().ok_or_else(|| {
                        LoadError::invalid(
                            "cache.directory",
                            "no cache directory could be determined; set one explicitly",
                        )
                    })?,
                };
                Ok(Arc::new(manager))
            }
        }
    }

    /// Cache layer over `source`, using the configured store and TTL
    pub fn event_cache(&self, source: Arc<dyn EventSource>) -> Result<EventCache, LoadError> {
        Ok(EventCache::new(source, self.cache_store()?).with_ttl(self.cache.ttl))
    }

    /// URL editors post actions to
    pub fn ajax_url(&self) -> Result<Url, LoadError> {
        self.server
            .public_url
            .join("admin-ajax")
            .map_err(|err| LoadError::invalid("server.public_url", err.to_string()))
    }
}

impl AuthSettings {
    /// Directory of the configured editor accounts
    pub fn editor_directory(&self) -> EditorDirectory {
        EditorDirectory::new(self.editors.iter().cloned())
    }

    /// Nonce issuer; serving the action endpoint requires a secret
    pub fn nonce_issuer(&self) -> Result<NonceIssuer, LoadError> {
        let secret = self.nonce_secret.as_ref().ok_or_else(|| {
            LoadError::invalid("auth.nonce_secret", "a secret is required to serve editors")
        })?;
        Ok(NonceIssuer::new(secret.as_bytes(), self.nonce_lifetime))
    }
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawSettings {
    server: RawServerSettings,
    cache: RawCacheSettings,
    fetch: RawFetchSettings,
    display: RawDisplaySettings,
    auth: RawAuthSettings,
    logging: RawLoggingSettings,
}

impl RawSettings {
    fn apply_cli_overrides(&mut self, cli: &Cli) {
        if let Some(level) = cli.log_level.as_ref() {
            self.logging.level = Some(level.clone());
        }
        if let Some(json) = cli.log_json {
            self.logging.json = Some(json);
        }
        if let Some(backend) = cli.cache_backend {
            self.cache.backend = Some(
                match backend {
                    CacheBackend::Memory => "memory",
                    CacheBackend::Disk => "disk",
                }
                .to_string(),
            );
        }
        if let Some(directory) = cli.cache_dir.as_ref() {
            self.cache.directory = Some(directory.clone());
        }
        if let crate::cli::Command::Serve(args) = &cli.command {
            if let Some(host) = args.host.as_ref() {
                self.server.host = Some(host.clone());
            }
            if let Some(port) = args.port {
                self.server.port = Some(port);
            }
        }
    }
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawServerSettings {
    host: Option<String>,
    port: Option<u16>,
    public_url: Option<String>,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawCacheSettings {
    backend: Option<String>,
    directory: Option<PathBuf>,
    ttl_seconds: Option<u64>,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawFetchSettings {
    timeout_seconds: Option<u64>,
    user_agent: Option<String>,
    allowed_hosts: Vec<String>,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawDisplaySettings {
    date_format: Option<String>,
    untitled_label: Option<String>,
    calendar_url: Option<String>,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawAuthSettings {
    nonce_secret: Option<String>,
    nonce_lifetime_seconds: Option<u64>,
    editors: Vec<EditorAccount>,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawLoggingSettings {
    level: Option<String>,
    json: Option<bool>,
}

fn build_server_settings(server: RawServerSettings) -> Result<ServerSettings, LoadError> {
    let host = server.host.unwrap_or_else(|| DEFAULT_HOST.to_string());
    let port = server.port.unwrap_or(DEFAULT_PORT);
    if port == 0 {
        return Err(LoadError::invalid(
            "server.port",
            "port must be greater than zero",
        ));
    }

    let addr = parse_socket_addr(&host, port)
        .map_err(|reason| LoadError::invalid("server.addr", reason))?;

    let public_url = match non_blank(server.public_url) {
        Some(raw) => raw,
        None => format!("http://{addr}/"),
    };
    let mut public_url = Url::parse(&public_url)
        .map_err(|err| LoadError::invalid("server.public_url", err.to_string()))?;
    if !matches!(public_url.scheme(), "http" | "https") {
        return Err(LoadError::invalid(
            "server.public_url",
            "must be an http or https URL",
        ));
    }
    if !public_url.path().ends_with('/') {
        let path = format!("{}/", public_url.path());
        public_url.set_path(&path);
    }

    Ok(ServerSettings { addr, public_url })
}

fn build_cache_settings(cache: RawCacheSettings) -> Result<CacheSettings, LoadError> {
    let backend = match non_blank(cache.backend) {
        Some(name) => CacheBackend::parse(&name).ok_or_else(|| {
            LoadError::invalid("cache.backend", format!("unknown backend `{name}`"))
        })?,
        None => CacheBackend::Memory,
    };

    let ttl = match cache.ttl_seconds {
        Some(0) => {
            return Err(LoadError::invalid(
                "cache.ttl_seconds",
                "must be greater than zero",
            ))
        }
        Some(seconds) => Duration::from_secs(seconds),
        None => DEFAULT_TTL,
    };

    Ok(CacheSettings {
        backend,
        directory: cache.directory,
        ttl,
    })
}

fn build_fetch_settings(fetch: RawFetchSettings) -> Result<FetchSettings, LoadError> {
    let timeout = match fetch.timeout_seconds {
        Some(0) => {
            return Err(LoadError::invalid(
                "fetch.timeout_seconds",
                "must be greater than zero",
            ))
        }
        Some(seconds) => Duration::from_secs(seconds),
        None => DEFAULT_TIMEOUT,
    };

    let user_agent =
        non_blank(fetch.user_agent).unwrap_or_else(|| DEFAULT_USER_AGENT.to_string());

    for host in &fetch.allowed_hosts {
        if !is_valid_host_entry(host) {
            return Err(LoadError::invalid(
                "fetch.allowed_hosts",
                format!("`{host}` is not a host name or `.domain` suffix"),
            ));
        }
    }

    Ok(FetchSettings {
        timeout,
        user_agent,
        allowed_hosts: AllowedHosts::only(&fetch.allowed_hosts),
    })
}

fn build_display_settings(display: RawDisplaySettings) -> Result<DisplaySettings, LoadError> {
    let date_format = display
        .date_format
        .filter(|format| !format.is_empty())
        .unwrap_or_else(|| DEFAULT_DATE_FORMAT.to_string());
    if !is_valid_date_format(&date_format) {
        return Err(LoadError::invalid(
            "display.date_format",
            format!("`{date_format}` is not a valid strftime format"),
        ));
    }

    let untitled_label =
        non_blank(display.untitled_label).unwrap_or_else(|| DEFAULT_UNTITLED_LABEL.to_string());

    let calendar_url = match non_blank(display.calendar_url) {
        Some(raw) => safe_url(&raw).ok_or_else(|| {
            LoadError::invalid("display.calendar_url", "must be an http or https URL")
        })?,
        None => DEFAULT_CALENDAR_URL.to_string(),
    };

    Ok(DisplaySettings {
        date_format,
        untitled_label,
        calendar_url,
    })
}

fn build_auth_settings(auth: RawAuthSettings) -> Result<AuthSettings, LoadError> {
    let nonce_lifetime = match auth.nonce_lifetime_seconds {
        Some(seconds) if seconds < MIN_NONCE_LIFETIME_SECS => {
            return Err(LoadError::invalid(
                "auth.nonce_lifetime_seconds",
                format!("must be at least {MIN_NONCE_LIFETIME_SECS}"),
            ))
        }
        Some(seconds) => Duration::from_secs(seconds),
        None => DEFAULT_NONCE_LIFETIME,
    };

    for editor in &auth.editors {
        if editor.name.trim().is_empty() {
            return Err(LoadError::invalid("auth.editors", "every editor needs a name"));
        }
        if editor.token.trim().is_empty() {
            return Err(LoadError::invalid(
                "auth.editors",
                format!("editor `{}` has an empty token", editor.name),
            ));
        }
    }

    Ok(AuthSettings {
        nonce_secret: non_blank(auth.nonce_secret),
        nonce_lifetime,
        editors: auth.editors,
    })
}

fn build_logging_settings(logging: RawLoggingSettings) -> Result<LoggingSettings, LoadError> {
    let level = match logging.level {
        Some(level) => LevelFilter::from_str(level.as_str()).map_err(|err| {
            LoadError::invalid("logging.level", format!("failed to parse: {err}"))
        })?,
        None => LevelFilter::INFO,
    };

    let format = if logging.json.unwrap_or(false) {
        LogFormat::Json
    } else {
        LogFormat::Compact
    };

    Ok(LoggingSettings { level, format })
}

fn parse_socket_addr(host: &str, port: u16) -> Result<SocketAddr, String> {
    let candidate = format!("{host}:{port}");
    candidate
        .parse()
        .map_err(|err| format!("invalid address `{candidate}`: {err}"))
}

/// A bare host, optionally with a leading `.` for subdomains
fn is_valid_host_entry(entry: &str) -> bool {
    let host = entry.trim();
    let host = host.strip_prefix('.').unwrap_or(host);
    if host.is_empty() {
        return false;
    }
    Url::parse(&format!("http://{host}/"))
        .ok()
        .and_then(|url| url.host_str().map(|parsed| parsed.eq_ignore_ascii_case(host)))
        .unwrap_or(false)
}

fn non_blank(value: Option<String>) -> Option<String> {
    value.and_then(|value| {
        let trimmed = value.trim();
        (!trimmed.is_empty()).then(|| trimmed.to_string())
    })
}
