//! HTTP surface: block rendering and the editor's cache-clear action
//!
//! Routes:
//! - `GET /blocks/events?apiUrl=&itemCount=&layoutStyle=` renders the public block
//! - `GET /editor/session` hands an authenticated editor a nonce and the action URL
//! - `POST /admin-ajax` runs the `events_clear_cache` action
//! - `GET /healthz` answers 204

mod error;
mod handlers;
mod middleware;

pub use error::{ClearCacheError, ErrorReport};
pub use handlers::{ActionForm, RenderQuery};
pub use middleware::RequestContext;

use std::io;
use std::sync::Arc;

use axum::{
    middleware as axum_middleware,
    routing::{get, post},
    Router,
};
use thiserror::Error;
use tokio::net::TcpListener;
use tracing::{info, warn};

use crate::auth::{EditorDirectory, NonceIssuer};
use crate::cache::EventCache;
use crate::client::{AJAX_PATH, SESSION_PATH};
use crate::config::{LoadError, Settings};
use crate::data::AllowedHosts;
use crate::render::Renderer;

/// Shared state of the request handlers
#[derive(Clone)]
pub struct AppState {
    pub cache: EventCache,
    pub renderer: Arc<Renderer>,
    pub editors: Arc<EditorDirectory>,
    pub nonces: Arc<NonceIssuer>,
    pub ajax_url: Arc<str>,
    /// Hosts `GET /blocks/events` may fetch from
    pub allowed_hosts: Arc<AllowedHosts>,
}

impl AppState {
    /// Wires the state from settings; serving requires a nonce secret
    pub fn from_settings(settings: &Settings) -> Result<Self, LoadError> {
        let source = Arc::new(settings.events_client());
        let cache = settings.event_cache(source)?;
        let editors = settings.auth.editor_directory();
        if editors.is_empty() {
            warn!(
                target: "events_block::server",
                "no editors configured; the cache-clear action will refuse every caller"
            );
        }

        let allowed_hosts = settings.fetch.allowed_hosts.clone();
        if allowed_hosts.is_unrestricted() {
            warn!(
                target: "events_block::server",
                "fetch.allowed_hosts is empty; the render endpoint will fetch from any host"
            );
        }

        Ok(Self {
            cache,
            renderer: Arc::new(settings.renderer()),
            editors: Arc::new(editors),
            nonces: Arc::new(settings.auth.nonce_issuer()?),
            ajax_url: Arc::from(settings.ajax_url()?.as_str()),
            allowed_hosts: Arc::new(allowed_hosts),
        })
    }
}

#[derive(Debug, Error)]
pub enum ServeError {
    #[error(transparent)]
    Config(#[from] LoadError),
    #[error("server I/O failed: {0}")]
    Io(#[from] io::Error),
}

/// Routes with request-id and response-logging layers applied
pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/blocks/events", get(handlers::render_block))
        .route(SESSION_PATH, get(handlers::editor_session))
        .route(AJAX_PATH, post(handlers::admin_ajax))
        .route("/healthz", get(handlers::health))
        .layer(axum_middleware::from_fn(middleware::log_responses))
        .layer(axum_middleware::from_fn(middleware::set_request_context))
        .with_state(state)
}

/// Binds the configured address and serves until Ctrl-C
pub async fn serve(settings: &Settings) -> Result<(), ServeError> {
    let state = AppState::from_settings(settings)?;
    let listener = TcpListener::bind(settings.server.addr).await?;

    info!(
        target: "events_block::server",
        addr = %settings.server.addr,
        public_url = %settings.server.public_url,
        "listening"
    );

    axum::serve(listener, router(state))
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!(target: "events_block::server", "shut down");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(err) = tokio::signal::ctrl_c().await {
        warn!(target: "events_block::server", error = %err, "could not listen for Ctrl-C");
        std::future::pending::<()>().await;
    }
}
