//! Editor-side client for the cache-clear action
//!
//! The editor first asks the server for a session (nonce plus action URL),
//! then posts the clear request as a form, authenticated by its bearer token.

use async_trait::async_trait;
use reqwest::{header, Client};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use url::Url;

use crate::auth::CLEAR_CACHE_ACTION;

/// Path of the session endpoint, relative to the server root
pub const SESSION_PATH: &str = "/editor/session";

/// Path of the action endpoint, relative to the server root
pub const AJAX_PATH: &str = "/admin-ajax";

/// Body of every action endpoint response
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActionResponse {
    pub success: bool,
    pub message: String,
}

impl ActionResponse {
    pub fn success(message: impl Into<String>) -> Self {
        Self {
            success: true,
            message: message.into(),
        }
    }

    pub fn failure(message: impl Into<String>) -> Self {
        Self {
            success: false,
            message: message.into(),
        }
    }
}

/// What the editor needs to call the action endpoint
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EditorSession {
    pub nonce: String,
    pub ajax_url: String,
}

#[derive(Debug, Error)]
pub enum ClientError {
    #[error("invalid server URL: {0}")]
    InvalidUrl(String),

    #[error("request failed: {0}")]
    Http(#[from] reqwest::Error),

    /// The server refused the action; holds its message
    #[error("{0}")]
    Rejected(String),

    #[error("unexpected response from server (HTTP {status})")]
    InvalidResponse { status: u16 },
}

/// Anything that can clear the server-side cache for an API URL
#[async_trait]
pub trait CacheClearer: Send + Sync {
    async fn clear_cache(&self, api_url: &str) -> Result<(), ClientError>;
}

/// Calls `POST /admin-ajax` with `action=events_clear_cache`
#[derive(Debug, Clone)]
pub struct ClearCacheClient {
    http_client: Client,
    ajax_url: Url,
    token: String,
    nonce: String,
}

impl ClearCacheClient {
    /// Client for an already-known action URL and nonce
    pub fn new(ajax_url: Url, token: impl Into<String>, nonce: impl Into<String>) -> Self {
        Self::with_client(Client::new(), ajax_url, token, nonce)
    }

    /// Like [`ClearCacheClient::new`], reusing an existing HTTP client
    pub fn with_client(
        client: Client,
        ajax_url: Url,
        token: impl Into<String>,
        nonce: impl Into<String>,
    ) -> Self {
        Self {
            http_client: client,
            ajax_url,
            token: token.into(),
            nonce: nonce.into(),
        }
    }

    /// Opens an editor session on `server_url` and returns a ready client
    pub async fn connect(server_url: &str, token: impl Into<String>) -> Result<Self, ClientError> {
        let token = token.into();
        let http_client = Client::new();

        let session_url = Url::parse(server_url.trim())
            .and_then(|base| base.join(SESSION_PATH))
            .map_err(|_| ClientError::InvalidUrl(server_url.to_string()))?;

        let response = http_client
            .get(session_url)
            .bearer_auth(&token)
            .header(header::ACCEPT, "application/json")
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            return Err(rejection(status.as_u16(), &response.text().await?));
        }

        let session: EditorSession = response
            .json()
            .await
            .map_err(|_| ClientError::InvalidResponse {
                status: status.as_u16(),
            })?;
        let ajax_url = Url::parse(&session.ajax_url)
            .map_err(|_| ClientError::InvalidUrl(session.ajax_url.clone()))?;

        Ok(Self::with_client(http_client, ajax_url, token, session.nonce))
    }

    pub fn ajax_url(&self) -> &Url {
        &self.ajax_url
    }
}

#[async_trait]
impl CacheClearer for ClearCacheClient {
    async fn clear_cache(&self, api_url: &str) -> Result<(), ClientError> {
        let form = [
            ("action", CLEAR_CACHE_ACTION),
            ("api_url", api_url),
            ("nonce", self.nonce.as_str()),
        ];

        let response = self
            .http_client
            .post(self.ajax_url.clone())
            .bearer_auth(&self.token)
            .header(header::ACCEPT, "application/json")
            .form(&form)
            .send()
            .await?;

        let status = response.status().as_u16();
        let body = response.text().await?;
        match serde_json::from_str::<ActionResponse>(&body) {
            Ok(reply) if reply.success => Ok(()),
            _ => Err(rejection(status, &body)),
        }
    }
}

/// Turns a failed response into the server's message when it sent one
fn rejection(status: u16, body: &str) -> ClientError {
    match serde_json::from_str::<ActionResponse>(body) {
        Ok(reply) if reply.message.is_empty() => {
            ClientError::Rejected("Failed to clear cache".to_string())
        }
        Ok(reply) => ClientError::Rejected(reply.message),
        Err(_) => ClientError::InvalidResponse { status },
    }
}
