//! Configuration management for blog-htmx
//!
//! Configuration is loaded from multiple sources with clear precedence:
//!
//! 1. `CLIENT_ID`, `CLIENT_SECRET` and `ISSUER` (highest priority, mapped into `[oauth]`)
//! 2. Environment variables (`BLOG_` prefix, `__` for nesting)
//! 3. `./config.toml` (or the file passed to [`BlogConfig::load_from`])
//! 4. `/etc/blog-htmx/config.toml` (system config)
//! 5. Hardcoded defaults (fallback)
//!
//! Environment variable format: `BLOG_SECTION__FIELD_NAME`
//! - Example: `BLOG_SERVER__PORT=8081`
//! - Example: `BLOG_SESSION__SECURE_COOKIES=true`
//!
//! # Example Configuration
//!
//! ```toml
//! [server]
//! host = "0.0.0.0"
//! port = 8081
//!
//! [oauth]
//! issuer = "https://dev-123456.okta.com/oauth2/default"
//! client_id = "0oa..."
//! redirect_uri = "http://localhost:8081/authorization-code/callback"
//!
//! [session]
//! cookie_name = "okta-hosted-login-session-store"
//! max_age_secs = 86400
//!
//! [database]
//! url = "sqlite://blog.db?mode=rwc"
//! ```

use figment::{
    providers::{Env, Format, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Path of the system-wide configuration file
pub const SYSTEM_CONFIG_PATH: &str = "/etc/blog-htmx/config.toml";

/// HTTP listener settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerSettings {
    /// Interface to bind
    pub host: String,

    /// Port to bind
    pub port: u16,

    /// Upper bound for handling a single request, in milliseconds
    pub request_timeout_ms: u64,
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 8081,
            request_timeout_ms: 30_000,
        }
    }
}

impl ServerSettings {
    /// Socket address string suitable for `TcpListener::bind`
    #[must_use]
    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

/// Identity provider settings
#[derive(Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct OAuthSettings {
    /// OAuth2 client ID
    pub client_id: String,

    /// OAuth2 client secret
    pub client_secret: String,

    /// Issuer base URL (`/v1/authorize`, `/v1/token`, ... are appended)
    pub issuer: String,

    /// Callback URL registered with the provider
    pub redirect_uri: String,

    /// Scopes requested at login
    pub scopes: Vec<String>,

    /// JSON Web Key Set endpoint (defaults to `{issuer}/v1/keys`)
    pub jwks_url: Option<String>,

    /// Timeout applied to every provider call, in milliseconds
    pub request_timeout_ms: u64,

    /// Allowed clock skew when checking token expiry, in seconds
    pub clock_skew_secs: u64,
}

impl Default for OAuthSettings {
    fn default() -> Self {
        Self {
            client_id: String::new(),
            client_secret: String::new(),
            issuer: String::new(),
            redirect_uri: "http://localhost:8081/authorization-code/callback".to_string(),
            scopes: vec![
                "openid".to_string(),
                "profile".to_string(),
                "email".to_string(),
            ],
            jwks_url: None,
            request_timeout_ms: 5000,
            clock_skew_secs: 60,
        }
    }
}

impl std::fmt::Debug for OAuthSettings {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OAuthSettings")
            .field("client_id", &self.client_id)
            .field("client_secret", &"<redacted>")
            .field("issuer", &self.issuer)
            .field("redirect_uri", &self.redirect_uri)
            .field("scopes", &self.scopes)
            .field("jwks_url", &self.jwks_url)
            .field("request_timeout_ms", &self.request_timeout_ms)
            .field("clock_skew_secs", &self.clock_skew_secs)
            .finish()
    }
}

impl OAuthSettings {
    fn endpoint(&self, path: &str) -> String {
        format!("{}{path}", self.issuer.trim_end_matches('/'))
    }

    /// Authorization endpoint
    #[must_use]
    pub fn authorize_url(&self) -> String {
        self.endpoint("/v1/authorize")
    }

    /// Token endpoint
    #[must_use]
    pub fn token_url(&self) -> String {
        self.endpoint("/v1/token")
    }

    /// Userinfo endpoint
    #[must_use]
    pub fn userinfo_url(&self) -> String {
        self.endpoint("/v1/userinfo")
    }

    /// Key set endpoint, explicit setting first
    #[must_use]
    pub fn keys_url(&self) -> String {
        self.jwks_url
            .clone()
            .unwrap_or_else(|| self.endpoint("/v1/keys"))
    }

    /// Provider call timeout
    #[must_use]
    pub const fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }
}

/// Cookie `SameSite` policy
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum SameSitePolicy {
    /// Strict `SameSite` policy
    Strict,
    /// Lax `SameSite` policy (required for the provider redirect back)
    Lax,
    /// None `SameSite` policy (requires secure cookies)
    None,
}

/// Session cookie settings
#[derive(Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionSettings {
    /// Session cookie name
    pub cookie_name: String,

    /// Cookie holding the in-flight login attempt
    pub pending_cookie_name: String,

    /// Base64 encoded cookie encryption key (at least 64 bytes once decoded)
    pub secret: Option<String>,

    /// Enable secure cookies (HTTPS only)
    pub secure_cookies: bool,

    /// Cookie `SameSite` policy
    pub same_site: SameSitePolicy,

    /// Session cookie max age in seconds
    pub max_age_secs: u64,

    /// Lifetime of a pending login attempt in seconds
    pub pending_login_ttl_secs: u64,
}

impl Default for SessionSettings {
    fn default() -> Self {
        Self {
            cookie_name: "okta-hosted-login-session-store".to_string(),
            pending_cookie_name: "blog-pending-login".to_string(),
            secret: None,
            secure_cookies: !cfg!(debug_assertions),
            same_site: SameSitePolicy::Lax,
            max_age_secs: 86400, // 24 hours
            pending_login_ttl_secs: 600,
        }
    }
}

impl std::fmt::Debug for SessionSettings {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionSettings")
            .field("cookie_name", &self.cookie_name)
            .field("pending_cookie_name", &self.pending_cookie_name)
            .field("secret", &self.secret.as_ref().map(|_| "<redacted>"))
            .field("secure_cookies", &self.secure_cookies)
            .field("same_site", &self.same_site)
            .field("max_age_secs", &self.max_age_secs)
            .field("pending_login_ttl_secs", &self.pending_login_ttl_secs)
            .finish()
    }
}

/// Auth gate behaviour
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AuthSettings {
    /// Fetch userinfo claims on every authenticated request
    pub fetch_profile: bool,

    /// Where unauthenticated users are sent by protected handlers
    pub login_path: String,
}

impl Default for AuthSettings {
    fn default() -> Self {
        Self {
            fetch_profile: true,
            login_path: "/login".to_string(),
        }
    }
}

/// Database settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DatabaseSettings {
    /// sqlx connection URL
    pub url: String,

    /// Pool size
    pub max_connections: u32,
}

impl Default for DatabaseSettings {
    fn default() -> Self {
        Self {
            url: "sqlite://blog.db?mode=rwc".to_string(),
            max_connections: 5,
        }
    }
}

/// Static file settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StaticSettings {
    /// Directory served under `/static`
    pub dir: PathBuf,
}

impl Default for StaticSettings {
    fn default() -> Self {
        Self {
            dir: PathBuf::from("./static"),
        }
    }
}

/// Complete blog-htmx configuration
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct BlogConfig {
    /// HTTP listener settings
    #[serde(default)]
    pub server: ServerSettings,

    /// Identity provider settings
    #[serde(default)]
    pub oauth: OAuthSettings,

    /// Session cookie settings
    #[serde(default)]
    pub session: SessionSettings,

    /// Auth gate settings
    #[serde(default)]
    pub auth: AuthSettings,

    /// Database settings
    #[serde(default)]
    pub database: DatabaseSettings,

    /// Static file settings
    #[serde(default)]
    pub static_files: StaticSettings,
}

/// Configuration errors
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// Sources could not be merged or extracted
    #[error("Failed to load configuration: {0}")]
    Load(#[from] Box<figment::Error>),

    /// Defaults could not be serialized
    #[error("Failed to serialize default configuration: {0}")]
    Defaults(#[from] toml::ser::Error),

    /// A required value is missing or malformed
    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

impl BlogConfig {
    fn base_figment() -> Result<Figment, ConfigError> {
        Ok(Figment::new().merge(Toml::string(&toml::to_string(&Self::default())?)))
    }

    fn env_layers(figment: Figment) -> Figment {
        figment
            .merge(Env::prefixed("BLOG_").split("__").lowercase(true))
            .merge(
                Env::raw()
                    .only(&["CLIENT_ID", "CLIENT_SECRET", "ISSUER"])
                    .map(|key| format!("oauth.{}", key.as_str().to_lowercase()).into()),
            )
    }

    fn extract(figment: &Figment) -> Result<Self, ConfigError> {
        figment.extract().map_err(|e| ConfigError::Load(Box::new(e)))
    }

    /// Load configuration from the standard locations
    ///
    /// # Errors
    ///
    /// Returns an error if a configuration file cannot be parsed or a value
    /// has the wrong type
    pub fn load() -> Result<Self, ConfigError> {
        let mut figment = Self::base_figment()?;

        let system_config = Path::new(SYSTEM_CONFIG_PATH);
        if system_config.exists() {
            figment = figment.merge(Toml::file(system_config));
        }

        let local_config = Path::new("./config.toml");
        if local_config.exists() {
            figment = figment.merge(Toml::file(local_config));
        }

        Self::extract(&Self::env_layers(figment))
    }

    /// Load configuration from a specific file, environment still overrides it
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be parsed or a value has the wrong type
    pub fn load_from(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let figment = Self::base_figment()?.merge(Toml::file(path.as_ref()));
        Self::extract(&Self::env_layers(figment))
    }

    /// Check the values the login flow cannot work without
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Invalid`] naming the first missing value
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.oauth.client_id.trim().is_empty() {
            return Err(ConfigError::Invalid(
                "oauth.client_id (CLIENT_ID) is required".to_string(),
            ));
        }
        if self.oauth.issuer.trim().is_empty() {
            return Err(ConfigError::Invalid(
                "oauth.issuer (ISSUER) is required".to_string(),
            ));
        }
        if self.oauth.redirect_uri.trim().is_empty() {
            return Err(ConfigError::Invalid(
                "oauth.redirect_uri is required".to_string(),
            ));
        }
        if self.session.pending_login_ttl_secs == 0 {
            return Err(ConfigError::Invalid(
                "session.pending_login_ttl_secs must be positive".to_string(),
            ));
        }
        Ok(())
    }
}
