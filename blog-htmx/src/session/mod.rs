//! Encrypted cookie sessions
//!
//! The whole session lives client side in a single private (encrypted and
//! authenticated) cookie. The in-flight login attempt uses a second private
//! cookie with a short lifetime.
//!
//! Handlers take a [`PrivateCookieJar`], hand it to [`CookieSessionStore::save`]
//! and return the jar as part of the response, which places the `Set-Cookie`
//! header ahead of the body.

use axum_extra::extract::cookie::{Cookie, Key, PrivateCookieJar, SameSite};
use base64::{engine::general_purpose::STANDARD, Engine as _};
use serde::{Deserialize, Serialize};
use time::Duration;

use crate::config::{ConfigError, SameSitePolicy, SessionSettings};
use crate::oauth::PendingLogin;

/// Minimum decoded length of `session.secret`
pub const MIN_KEY_BYTES: usize = 64;

/// Tokens kept for an authenticated browser
#[derive(Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct Session {
    /// Verified identity token
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id_token: Option<String>,

    /// Access token for the userinfo endpoint
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub access_token: Option<String>,
}

impl std::fmt::Debug for Session {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Session")
            .field("id_token", &self.id_token.as_ref().map(|_| "<redacted>"))
            .field("access_token", &self.access_token.as_ref().map(|_| "<redacted>"))
            .finish()
    }
}

impl Session {
    /// Authenticated iff a non-empty identity token is present
    #[must_use]
    pub fn is_authenticated(&self) -> bool {
        self.id_token.as_deref().is_some_and(|token| !token.is_empty())
    }

    /// Access token, if any
    #[must_use]
    pub fn access_token(&self) -> Option<&str> {
        self.access_token.as_deref()
    }

    /// Store the tokens of a completed login
    pub fn establish(&mut self, id_token: impl Into<String>, access_token: impl Into<String>) {
        self.id_token = Some(id_token.into());
        self.access_token = Some(access_token.into()).filter(|token| !token.is_empty());
    }

    /// Drop both tokens
    pub fn clear(&mut self) {
        self.id_token = None;
        self.access_token = None;
    }

    /// No token stored
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.id_token.is_none() && self.access_token.is_none()
    }
}

/// Derive the cookie encryption key from settings
///
/// Without a configured secret a random key is generated, so sessions do not
/// survive a restart.
///
/// # Errors
///
/// Returns [`ConfigError::Invalid`] if the secret is not base64 or shorter
/// than [`MIN_KEY_BYTES`]
pub fn cookie_key(settings: &SessionSettings) -> Result<Key, ConfigError> {
    let Some(secret) = settings.secret.as_deref() else {
        tracing::warn!("session.secret not set, generated a random key; sessions will not survive a restart");
        return Ok(Key::generate());
    };

    let bytes = STANDARD
        .decode(secret.trim())
        .map_err(|e| ConfigError::Invalid(format!("session.secret is not valid base64: {e}")))?;
    if bytes.len() < MIN_KEY_BYTES {
        return Err(ConfigError::Invalid(format!(
            "session.secret must decode to at least {MIN_KEY_BYTES} bytes, got {}",
            bytes.len()
        )));
    }

    Key::try_from(bytes.as_slice())
        .map_err(|e| ConfigError::Invalid(format!("session.secret unusable: {e}")))
}

const fn same_site(policy: SameSitePolicy) -> SameSite {
    match policy {
        SameSitePolicy::Strict => SameSite::Strict,
        SameSitePolicy::Lax => SameSite::Lax,
        SameSitePolicy::None => SameSite::None,
    }
}

/// Loads and saves [`Session`] and [`PendingLogin`] cookies
#[derive(Debug, Clone)]
pub struct CookieSessionStore {
    settings: SessionSettings,
}

impl CookieSessionStore {
    /// Create a store for the given cookie settings
    #[must_use]
    pub const fn new(settings: SessionSettings) -> Self {
        Self { settings }
    }

    /// Cookie settings in use
    #[must_use]
    pub const fn settings(&self) -> &SessionSettings {
        &self.settings
    }

    fn cookie(&self, name: &str, value: String, max_age_secs: u64) -> Cookie<'static> {
        let max_age = Duration::seconds(i64::try_from(max_age_secs).unwrap_or(i64::MAX));
        Cookie::build((name.to_string(), value))
            .http_only(true)
            .secure(self.settings.secure_cookies)
            .same_site(same_site(self.settings.same_site))
            .path("/")
            .max_age(max_age)
            .build()
    }

    fn removal(name: &str) -> Cookie<'static> {
        Cookie::build((name.to_string(), "")).path("/").build()
    }

    /// Read the session
    ///
    /// A missing, tampered or malformed cookie gives an empty session.
    #[must_use]
    pub fn load(&self, jar: &PrivateCookieJar) -> Session {
        jar.get(&self.settings.cookie_name)
            .and_then(|cookie| serde_json::from_str(cookie.value()).ok())
            .unwrap_or_default()
    }

    /// Write the session, removing the cookie when it is empty
    #[must_use]
    pub fn save(&self, jar: PrivateCookieJar, session: &Session) -> PrivateCookieJar {
        if session.is_empty() {
            return jar.remove(Self::removal(&self.settings.cookie_name));
        }

        match serde_json::to_string(session) {
            Ok(value) => jar.add(self.cookie(
                &self.settings.cookie_name,
                value,
                self.settings.max_age_secs,
            )),
            Err(e) => {
                tracing::error!(error = %e, "failed to encode session");
                jar
            }
        }
    }

    /// Read the in-flight login attempt
    #[must_use]
    pub fn load_pending(&self, jar: &PrivateCookieJar) -> Option<PendingLogin> {
        jar.get(&self.settings.pending_cookie_name)
            .and_then(|cookie| serde_json::from_str(cookie.value()).ok())
    }

    /// Remember a login attempt until the callback
    #[must_use]
    pub fn save_pending(&self, jar: PrivateCookieJar, pending: &PendingLogin) -> PrivateCookieJar {
        match serde_json::to_string(pending) {
            Ok(value) => jar.add(self.cookie(
                &self.settings.pending_cookie_name,
                value,
                self.settings.pending_login_ttl_secs,
            )),
            Err(e) => {
                tracing::error!(error = %e, "failed to encode pending login");
                jar
            }
        }
    }

    /// Forget the login attempt
    #[must_use]
    pub fn clear_pending(&self, jar: PrivateCookieJar) -> PrivateCookieJar {
        jar.remove(Self::removal(&self.settings.pending_cookie_name))
    }
}
