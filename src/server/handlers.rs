//! Request handlers for the block and editor endpoints

use axum::{
    extract::{rejection::FormRejection, Query, State},
    http::{header, HeaderMap, StatusCode},
    response::{Html, IntoResponse, Response},
    Form, Json,
};
use serde::Deserialize;
use tracing::{error, info, warn};

use super::error::{ClearCacheError, ErrorReport};
use super::AppState;
use crate::auth::{bearer_token, AuthError, Capability, Principal, CLEAR_CACHE_ACTION};
use crate::client::{ActionResponse, EditorSession};
use crate::data::{
    clamp_item_count, BlockAttributes, EventsClient, LayoutStyle, DEFAULT_ITEM_COUNT,
};

/// Query string of the render endpoint, as the block's attributes
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct RenderQuery {
    api_url: String,
    item_count: Option<String>,
    layout_style: String,
}

impl RenderQuery {
    /// Attributes with the item count clamped and unknown layouts replaced
    pub fn attributes(&self) -> BlockAttributes {
        let item_count = self
            .item_count
            .as_deref()
            .and_then(|raw| raw.trim().parse::<u32>().ok())
            .unwrap_or(DEFAULT_ITEM_COUNT);

        BlockAttributes {
            api_url: self.api_url.trim().to_string(),
            item_count: clamp_item_count(item_count),
            layout_style: LayoutStyle::parse_or_default(&self.layout_style),
        }
    }
}

/// Form posted to the action endpoint
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct ActionForm {
    action: String,
    api_url: String,
    nonce: String,
}

/// `GET /blocks/events`: the public block for the queried attributes
///
/// URLs on hosts outside `fetch.allowed_hosts` are never fetched; they render
/// the placeholder like any other failed fetch.
pub async fn render_block(
    State(state): State<AppState>,
    Query(query): Query<RenderQuery>,
) -> Response {
    let attributes = query.attributes();
    let events = if attributes.has_api_url() && !state.allowed_hosts.permits(&attributes.api_url)
    {
        warn!(
            target: "events_block::render",
            api_url = %attributes.api_url,
            "host not in fetch.allowed_hosts; rendering placeholder"
        );
        Vec::new()
    } else {
        state
            .cache
            .events_for_render(&attributes.api_url, attributes.item_count)
            .await
    };

    match state.renderer.render_block(attributes.layout_style, &events) {
        Ok(html) => Html(html).into_response(),
        Err(err) => {
            error!(target: "events_block::render", error = %err, "block template failed");
            let mut response = StatusCode::INTERNAL_SERVER_ERROR.into_response();
            response.extensions_mut().insert(ErrorReport {
                source: "render",
                detail: err.to_string(),
            });
            response
        }
    }
}

/// `POST /admin-ajax`
///
/// The nonce is checked before the caller's permission, then the URL, then
/// every item count is cleared.
pub async fn admin_ajax(
    State(state): State<AppState>,
    headers: HeaderMap,
    form: Result<Form<ActionForm>, FormRejection>,
) -> Result<Json<ActionResponse>, ClearCacheError> {
    let Form(form) =
        form.map_err(|rejection| ClearCacheError::BadRequest(rejection.body_text()))?;
    if form.action != CLEAR_CACHE_ACTION {
        return Err(ClearCacheError::UnknownAction(form.action));
    }

    let caller = authenticate(&state, &headers);
    let user = caller
        .as_ref()
        .map(|principal| principal.name.as_str())
        .unwrap_or("");
    state
        .nonces
        .verify(&form.nonce, CLEAR_CACHE_ACTION, user)
        .map_err(ClearCacheError::Unauthorized)?;

    let principal = caller.map_err(ClearCacheError::Unauthorized)?;
    principal
        .require(Capability::EditPosts)
        .map_err(ClearCacheError::Unauthorized)?;

    let api_url = form.api_url.trim();
    if api_url.is_empty() || EventsClient::request_url(api_url, DEFAULT_ITEM_COUNT).is_err() {
        return Err(ClearCacheError::InvalidUrl);
    }

    let report = state.cache.clear_cache(api_url);
    if !report.is_complete() {
        return Err(ClearCacheError::CacheClearFailed {
            failed: report.failed,
        });
    }

    info!(
        target: "events_block::cache",
        api_url,
        editor = %principal.name,
        cleared = report.cleared,
        "cache cleared"
    );
    Ok(Json(ActionResponse::success("Cache cleared successfully")))
}

/// `GET /editor/session`: hands an authenticated editor its nonce
pub async fn editor_session(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> Result<Json<EditorSession>, ClearCacheError> {
    let principal =
        authenticate(&state, &headers).map_err(|_| ClearCacheError::Unauthenticated)?;

    Ok(Json(EditorSession {
        nonce: state.nonces.create(CLEAR_CACHE_ACTION, &principal.name),
        ajax_url: state.ajax_url.to_string(),
    }))
}

/// `GET /healthz`
pub async fn health() -> StatusCode {
    StatusCode::NO_CONTENT
}

fn authenticate(state: &AppState, headers: &HeaderMap) -> Result<Principal, AuthError> {
    let token = headers
        .get(header::AUTHORIZATION)
        .and_then(|value| value.to_str().ok())
        .and_then(bearer_token)
        .unwrap_or("");
    state.editors.authenticate(token)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn query(api_url: &str, item_count: Option<&str>, layout_style: &str) -> RenderQuery {
        RenderQuery {
            api_url: api_url.to_string(),
            item_count: item_count.map(str::to_string),
            layout_style: layout_style.to_string(),
        }
    }

    #[test]
    fn test_render_query_defaults() {
        let attributes = RenderQuery::default().attributes();
        assert_eq!(attributes, BlockAttributes::default());
    }

    #[test]
    fn test_render_query_clamps_and_falls_back() {
        let attributes = query(" https://e.example.com/api ", Some("99"), "carousel").attributes();
        assert_eq!(attributes.api_url, "https://e.example.com/api");
        assert_eq!(attributes.item_count, 20);
        assert_eq!(attributes.layout_style, LayoutStyle::List);

        assert_eq!(query("", Some("0"), "grid").attributes().item_count, 1);
        assert_eq!(query("", Some("lots"), "grid").attributes().item_count, 5);
        assert_eq!(
            query("", None, "CARDS").attributes().layout_style,
            LayoutStyle::Cards
        );
    }
}
