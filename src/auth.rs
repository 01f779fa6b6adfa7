//! Caller identity and anti-forgery nonces for editor actions
//!
//! Editors authenticate with a bearer token listed in the settings. Actions that
//! change state additionally require a nonce bound to the action name and the
//! editor, valid for between one half and one full lifetime.

use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use subtle::ConstantTimeEq;
use thiserror::Error;

/// Nonce action for the cache-clear request
pub const CLEAR_CACHE_ACTION: &str = "events_clear_cache";

/// Default nonce lifetime (one day)
pub const DEFAULT_NONCE_LIFETIME: Duration = Duration::from_secs(24 * 60 * 60);

/// Hex characters kept from the nonce digest
const NONCE_LEN: usize = 20;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AuthError {
    #[error("missing credentials")]
    Missing,
    #[error("invalid credentials")]
    Invalid,
    #[error("missing capability `{0}`")]
    Forbidden(&'static str),
    #[error("invalid or expired nonce")]
    BadNonce,
}

/// Things an editor may be allowed to do
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Capability {
    /// View previews and fetch a nonce
    Read,
    /// Change content, including clearing the events cache
    EditPosts,
}

impl Capability {
    pub fn as_str(&self) -> &'static str {
        match self {
            Capability::Read => "read",
            Capability::EditPosts => "edit_posts",
        }
    }
}

/// An editor account as configured in the settings
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct EditorAccount {
    pub name: String,
    pub token: String,
    #[serde(default)]
    pub capabilities: Vec<Capability>,
}

/// An authenticated caller
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Principal {
    pub name: String,
    pub capabilities: Vec<Capability>,
}

impl Principal {
    /// Whether the principal holds `capability`
    pub fn can(&self, capability: Capability) -> bool {
        self.capabilities.contains(&capability)
    }

    /// Like [`Principal::can`], but as a result
    ///
    /// # Returns
    /// `AuthError::Forbidden` naming the missing capability
    pub fn require(&self, capability: Capability) -> Result<(), AuthError> {
        if self.can(capability) {
            Ok(())
        } else {
            Err(AuthError::Forbidden(capability.as_str()))
        }
    }
}

/// Resolves bearer tokens to editors
#[derive(Debug, Clone, Default)]
pub struct EditorDirectory {
    /// (token digest, account) pairs
    accounts: Vec<(Vec<u8>, EditorAccount)>,
}

impl EditorDirectory {
    /// Directory of `accounts`, keyed by a digest of each token
    pub fn new(accounts: impl IntoIterator<Item = EditorAccount>) -> Self {
        let accounts = accounts
            .into_iter()
            .filter(|account| !account.token.is_empty())
            .map(|account| (digest(account.token.as_bytes()), account))
            .collect();
        Self { accounts }
    }

    pub fn len(&self) -> usize {
        self.accounts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.accounts.is_empty()
    }

    /// Looks up the editor owning `token`
    ///
    /// Every configured token is compared, in constant time, whatever the
    /// outcome.
    pub fn authenticate(&self, token: &str) -> Result<Principal, AuthError> {
        if token.is_empty() {
            return Err(AuthError::Missing);
        }

        let presented = digest(token.as_bytes());
        let mut found = None;
        for (hashed, account) in &self.accounts {
            if bool::from(hashed.ct_eq(&presented)) {
                found = Some(account);
            }
        }

        found
            .map(|account| Principal {
                name: account.name.clone(),
                capabilities: account.capabilities.clone(),
            })
            .ok_or(AuthError::Invalid)
    }
}

/// Extracts the token from an `Authorization: Bearer …` value
pub fn bearer_token(header_value: &str) -> Option<&str> {
    let (scheme, token) = header_value.trim().split_once(' ')?;
    if !scheme.eq_ignore_ascii_case("bearer") {
        return None;
    }
    let token = token.trim();
    (!token.is_empty()).then_some(token)
}

/// Issues and verifies time-bucketed nonces
///
/// Time is split into ticks of half the lifetime; a nonce made in tick `t`
/// verifies during ticks `t` and `t + 1`.
#[derive(Clone)]
pub struct NonceIssuer {
    secret: Vec<u8>,
    lifetime: Duration,
}

impl std::fmt::Debug for NonceIssuer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NonceIssuer")
            .field("lifetime", &self.lifetime)
            .finish_non_exhaustive()
    }
}

impl NonceIssuer {
    /// Issuer for nonces that stay valid for `lifetime`
    ///
    /// # Arguments
    /// * `secret` - Server secret mixed into every nonce
    /// * `lifetime` - Upper bound of validity; a nonce lives between half of it and all of it
    pub fn new(secret: impl Into<Vec<u8>>, lifetime: Duration) -> Self {
        Self {
            secret: secret.into(),
            lifetime,
        }
    }

    /// Nonce for `action` performed by `user`, valid from now
    pub fn create(&self, action: &str, user: &str) -> String {
        self.create_at(action, user, Utc::now())
    }

    pub fn create_at(&self, action: &str, user: &str, now: DateTime<Utc>) -> String {
        self.token_for(self.tick_at(now), action, user)
    }

    /// Checks `nonce` against the current and previous tick
    ///
    /// # Returns
    /// `AuthError::BadNonce` when it matches neither
    pub fn verify(&self, nonce: &str, action: &str, user: &str) -> Result<(), AuthError> {
        self.verify_at(nonce, action, user, Utc::now())
    }

    pub fn verify_at(
        &self,
        nonce: &str,
        action: &str,
        user: &str,
        now: DateTime<Utc>,
    ) -> Result<(), AuthError> {
        if nonce.len() != NONCE_LEN {
            return Err(AuthError::BadNonce);
        }

        let tick = self.tick_at(now);
        let current = self.token_for(tick, action, user);
        let previous = self.token_for(tick - 1, action, user);

        let matches_current = current.as_bytes().ct_eq(nonce.as_bytes());
        let matches_previous = previous.as_bytes().ct_eq(nonce.as_bytes());
        if bool::from(matches_current | matches_previous) {
            Ok(())
        } else {
            Err(AuthError::BadNonce)
        }
    }

    fn tick_at(&self, now: DateTime<Utc>) -> i64 {
        let half_life = i64::try_from(self.lifetime.as_secs() / 2)
            .unwrap_or(i64::MAX)
            .max(1);
        now.timestamp().div_euclid(half_life) + 1
    }

    fn token_for(&self, tick: i64, action: &str, user: &str) -> String {
        let mut hasher = Sha256::new();
        for part in [
            self.secret.as_slice(),
            tick.to_string().as_bytes(),
            action.as_bytes(),
            user.as_bytes(),
        ] {
            hasher.update((part.len() as u64).to_be_bytes());
            hasher.update(part);
        }
        let mut token = hex::encode(hasher.finalize());
        token.truncate(NONCE_LEN);
        token
    }
}

fn digest(bytes: &[u8]) -> Vec<u8> {
    let mut hasher = Sha256::new();
    hasher.update(bytes);
    hasher.finalize().to_vec()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn directory() -> EditorDirectory {
        EditorDirectory::new([
            EditorAccount {
                name: "ana".to_string(),
                token: "editor-token".to_string(),
                capabilities: vec![Capability::Read, Capability::EditPosts],
            },
            EditorAccount {
                name: "sam".to_string(),
                token: "reader-token".to_string(),
                capabilities: vec![Capability::Read],
            },
            EditorAccount {
                name: "nobody".to_string(),
                token: String::new(),
                capabilities: vec![Capability::EditPosts],
            },
        ])
    }

    fn issuer() -> NonceIssuer {
        NonceIssuer::new("test-secret", Duration::from_secs(3600))
    }

    #[test]
    fn test_authenticate_resolves_known_tokens() {
        let principal = directory().authenticate("editor-token").expect("known token");
        assert_eq!(principal.name, "ana");
        assert!(principal.can(Capability::EditPosts));
    }

    #[test]
    fn test_authenticate_rejects_unknown_and_empty_tokens() {
        let directory = directory();
        assert_eq!(directory.len(), 2, "accounts without a token are dropped");
        assert_eq!(directory.authenticate("guess"), Err(AuthError::Invalid));
        assert_eq!(directory.authenticate(""), Err(AuthError::Missing));
    }

    #[test]
    fn test_require_reports_missing_capability() {
        let reader = directory().authenticate("reader-token").expect("known token");
        assert_eq!(
            reader.require(Capability::EditPosts),
            Err(AuthError::Forbidden("edit_posts"))
        );
        assert!(reader.require(Capability::Read).is_ok());
    }

    #[test]
    fn test_bearer_token_parsing() {
        assert_eq!(bearer_token("Bearer abc"), Some("abc"));
        assert_eq!(bearer_token("bearer   abc  "), Some("abc"));
        assert_eq!(bearer_token("Basic abc"), None);
        assert_eq!(bearer_token("Bearer "), None);
        assert_eq!(bearer_token("abc"), None);
    }

    #[test]
    fn test_nonce_round_trip() {
        let issuer = issuer();
        let nonce = issuer.create(CLEAR_CACHE_ACTION, "ana");
        assert_eq!(nonce.len(), NONCE_LEN);
        assert!(issuer.verify(&nonce, CLEAR_CACHE_ACTION, "ana").is_ok());
    }

    #[test]
    fn test_nonce_is_bound_to_action_user_and_secret() {
        let issuer = issuer();
        let nonce = issuer.create(CLEAR_CACHE_ACTION, "ana");

        assert_eq!(
            issuer.verify(&nonce, "other_action", "ana"),
            Err(AuthError::BadNonce)
        );
        assert_eq!(
            issuer.verify(&nonce, CLEAR_CACHE_ACTION, "sam"),
            Err(AuthError::BadNonce)
        );
        let other = NonceIssuer::new("other-secret", Duration::from_secs(3600));
        assert_eq!(
            other.verify(&nonce, CLEAR_CACHE_ACTION, "ana"),
            Err(AuthError::BadNonce)
        );
    }

    #[test]
    fn test_nonce_expires_after_two_ticks() {
        let issuer = issuer();
        let issued_at = Utc.with_ymd_and_hms(2026, 3, 1, 12, 0, 0).unwrap();
        let nonce = issuer.create_at(CLEAR_CACHE_ACTION, "ana", issued_at);

        let half_hour_later = issued_at + chrono::Duration::minutes(30);
        assert!(issuer
            .verify_at(&nonce, CLEAR_CACHE_ACTION, "ana", half_hour_later)
            .is_ok());

        let two_hours_later = issued_at + chrono::Duration::hours(2);
        assert_eq!(
            issuer.verify_at(&nonce, CLEAR_CACHE_ACTION, "ana", two_hours_later),
            Err(AuthError::BadNonce)
        );
    }

    #[test]
    fn test_malformed_nonce_is_rejected() {
        let issuer = issuer();
        assert_eq!(
            issuer.verify("short", CLEAR_CACHE_ACTION, "ana"),
            Err(AuthError::BadNonce)
        );
        assert_eq!(
            issuer.verify("", CLEAR_CACHE_ACTION, "ana"),
            Err(AuthError::BadNonce)
        );
    }
}
