//! Editor endpoint failures and their JSON responses
//!
//! Every failure answers `{ "success": false, "message": ... }` with a status
//! matching its kind, and carries an [`ErrorReport`] for the logging middleware.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use thiserror::Error;

use crate::auth::AuthError;
use crate::client::ActionResponse;

/// Diagnostic attached to failed responses for the logging middleware
#[derive(Debug, Clone)]
pub struct ErrorReport {
    pub source: &'static str,
    pub detail: String,
}

/// Failures of the editor endpoints, reported as `{success: false, message}`
#[derive(Debug, Error)]
pub enum ClearCacheError {
    /// The body could not be read as the action form
    #[error("Invalid request")]
    BadRequest(String),

    #[error("Unknown action")]
    UnknownAction(String),

    #[error("Authentication required")]
    Unauthenticated,

    /// Failed nonce or permission check
    #[error("{}", unauthorized_message(.0))]
    Unauthorized(AuthError),

    #[error("Invalid API URL")]
    InvalidUrl,

    /// Some cached item counts could not be removed
    #[error("Failed to clear cache")]
    CacheClearFailed { failed: Vec<u32> },
}

fn unauthorized_message(err: &AuthError) -> &'static str {
    match err {
        AuthError::BadNonce => "Security check failed",
        _ => "Insufficient permissions",
    }
}

impl ClearCacheError {
    /// HTTP status sent with the failure
    pub fn status(&self) -> StatusCode {
        match self {
            ClearCacheError::BadRequest(_)
            | ClearCacheError::UnknownAction(_)
            | ClearCacheError::InvalidUrl => StatusCode::BAD_REQUEST,
            ClearCacheError::Unauthenticated => StatusCode::UNAUTHORIZED,
            ClearCacheError::Unauthorized(_) => StatusCode::FORBIDDEN,
            ClearCacheError::CacheClearFailed { .. } => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn detail(&self) -> String {
        match self {
            ClearCacheError::BadRequest(reason) => format!("unreadable action form: {reason}"),
            ClearCacheError::UnknownAction(action) => format!("unknown action `{action}`"),
            ClearCacheError::Unauthenticated => "missing or unknown bearer token".to_string(),
            ClearCacheError::Unauthorized(err) => err.to_string(),
            ClearCacheError::InvalidUrl => "api_url is empty or not an http(s) URL".to_string(),
            ClearCacheError::CacheClearFailed { failed } => {
                format!("could not remove item counts {failed:?}")
            }
        }
    }
}

impl IntoResponse for ClearCacheError {
    fn into_response(self) -> Response {
        let report = ErrorReport {
            source: "editor_action",
            detail: self.detail(),
        };
        let mut response = (
            self.status(),
            Json(ActionResponse::failure(self.to_string())),
        )
            .into_response();
        response.extensions_mut().insert(report);
        response
    }
}
