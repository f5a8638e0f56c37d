//! Shared application state

use std::sync::Arc;

use axum::extract::FromRef;
use axum_extra::extract::cookie::Key;

use crate::config::BlogConfig;
use crate::oauth::{IdentityProvider, JwksVerifier, OAuthError, OktaClient, TokenVerifier};
use crate::session::CookieSessionStore;
use crate::store::BlogStore;

/// State handed to every handler
///
/// The identity provider and token verifier sit behind trait objects so tests
/// can swap in fakes.
///
/// # Example
///
/// ```rust,no_run
/// use blog_htmx::{config::BlogConfig, state::AppState, store::BlogStore};
///
/// # async fn example() -> anyhow::Result<()> {
/// let config = BlogConfig::load()?;
/// let store = BlogStore::connect(&config.database.url, config.database.max_connections).await?;
/// let key = blog_htmx::session::cookie_key(&config.session)?;
/// let state = AppState::from_config(config, store, key)?;
/// let app = blog_htmx::app(state);
/// # Ok(())
/// # }
/// ```
#[derive(Clone)]
pub struct AppState {
    config: Arc<BlogConfig>,
    store: BlogStore,
    provider: Arc<dyn IdentityProvider>,
    verifier: Arc<dyn TokenVerifier>,
    sessions: CookieSessionStore,
    key: Key,
}

impl std::fmt::Debug for AppState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AppState")
            .field("config", &self.config)
            .field("store", &self.store)
            .finish_non_exhaustive()
    }
}

impl AppState {
    /// Assemble state from explicit parts
    #[must_use]
    pub fn new(
        config: BlogConfig,
        store: BlogStore,
        provider: Arc<dyn IdentityProvider>,
        verifier: Arc<dyn TokenVerifier>,
        key: Key,
    ) -> Self {
        let sessions = CookieSessionStore::new(config.session.clone());
        Self {
            config: Arc::new(config),
            store,
            provider,
            verifier,
            sessions,
            key,
        }
    }

    /// Build the Okta client and key set verifier from configuration
    ///
    /// Both share one HTTP client with the configured timeout.
    ///
    /// # Errors
    ///
    /// Returns error if an endpoint URL is invalid or the HTTP client cannot
    /// be built
    pub fn from_config(config: BlogConfig, store: BlogStore, key: Key) -> Result<Self, OAuthError> {
        let http_client = reqwest::Client::builder()
            .timeout(config.oauth.request_timeout())
            .redirect(reqwest::redirect::Policy::none())
            .build()
            .map_err(|e| OAuthError::Generic(format!("Failed to build HTTP client: {e}")))?;

        let provider = OktaClient::with_http_client(&config.oauth, http_client.clone())?;
        let verifier = JwksVerifier::new(&config.oauth, http_client);

        Ok(Self::new(
            config,
            store,
            Arc::new(provider),
            Arc::new(verifier),
            key,
        ))
    }

    /// Application configuration
    #[must_use]
    pub fn config(&self) -> &BlogConfig {
        &self.config
    }

    /// Post and author storage
    #[must_use]
    pub const fn store(&self) -> &BlogStore {
        &self.store
    }

    /// Identity provider client
    #[must_use]
    pub fn provider(&self) -> &dyn IdentityProvider {
        self.provider.as_ref()
    }

    /// Identity token verifier
    #[must_use]
    pub fn verifier(&self) -> &dyn TokenVerifier {
        self.verifier.as_ref()
    }

    /// Session cookie store
    #[must_use]
    pub const fn sessions(&self) -> &CookieSessionStore {
        &self.sessions
    }
}

impl FromRef<AppState> for Key {
    fn from_ref(state: &AppState) -> Self {
        state.key.clone()
    }
}
