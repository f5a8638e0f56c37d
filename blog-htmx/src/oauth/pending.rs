//! Per-attempt login secrets
//!
//! Each visit to `/login` produces a fresh [`PendingLogin`] that travels in its
//! own short-lived encrypted cookie until the callback consumes it. Two
//! browser tabs logging in at once therefore never overwrite each other.

use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine as _};
use chrono::Utc;
use rand::{rngs::OsRng, RngCore};
use serde::{Deserialize, Serialize};

use super::types::OAuthError;

/// Number of random bytes behind `state`, `nonce` and the PKCE verifier
pub const SECRET_BYTES: usize = 32;

/// Secrets of one authorization request
#[derive(Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct PendingLogin {
    /// Anti-CSRF value echoed back by the provider
    pub state: String,

    /// Replay protection value embedded in the identity token
    pub nonce: String,

    /// PKCE code verifier sent with the token exchange
    pub pkce_verifier: String,

    /// Creation time (seconds since epoch)
    pub issued_at: i64,
}

impl std::fmt::Debug for PendingLogin {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PendingLogin")
            .field("state", &self.state)
            .field("nonce", &"<redacted>")
            .field("pkce_verifier", &"<redacted>")
            .field("issued_at", &self.issued_at)
            .finish()
    }
}

fn random_token() -> Result<String, OAuthError> {
    let mut bytes = [0u8; SECRET_BYTES];
    OsRng
        .try_fill_bytes(&mut bytes)
        .map_err(|e| OAuthError::Entropy(e.to_string()))?;
    Ok(URL_SAFE_NO_PAD.encode(bytes))
}

impl PendingLogin {
    /// Generate fresh secrets from the OS random source
    ///
    /// # Errors
    ///
    /// Returns [`OAuthError::Entropy`] if the random source fails
    pub fn generate() -> Result<Self, OAuthError> {
        Ok(Self {
            state: random_token()?,
            nonce: random_token()?,
            pkce_verifier: random_token()?,
            issued_at: Utc::now().timestamp(),
        })
    }

    /// Whether the attempt is older than `ttl_secs` at `now`
    #[must_use]
    pub fn is_expired_at(&self, now: i64, ttl_secs: u64) -> bool {
        let ttl = i64::try_from(ttl_secs).unwrap_or(i64::MAX);
        now.saturating_sub(self.issued_at) > ttl
    }

    /// Whether the attempt is older than `ttl_secs`
    #[must_use]
    pub fn is_expired(&self, ttl_secs: u64) -> bool {
        self.is_expired_at(Utc::now().timestamp(), ttl_secs)
    }

    /// Exact comparison against the callback's `state` parameter
    #[must_use]
    pub fn state_matches(&self, state: &str) -> bool {
        self.state.as_bytes() == state.as_bytes()
    }
}
