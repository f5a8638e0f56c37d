//! Identity provider client
//!
//! Builds the authorization redirect, exchanges the authorization code for
//! tokens and fetches userinfo claims. Every outbound call shares a single
//! `reqwest::Client` configured with the provider timeout.

use async_trait::async_trait;
use oauth2::basic::BasicTokenType;
use oauth2::{
    AuthUrl, AuthorizationCode, Client, ClientId, ClientSecret, CsrfToken, PkceCodeChallenge,
    PkceCodeVerifier, RedirectUrl, RequestTokenError, Scope, TokenResponse, TokenUrl,
};
use reqwest::header::ACCEPT;

use super::pending::PendingLogin;
use super::types::{
    profile_claims_from_json, ConfiguredClient, IdTokenResponse, OAuthError, ProfileClaims,
    TokenExchange,
};
use crate::config::OAuthSettings;

/// Operations the login flow needs from the identity provider
#[async_trait]
pub trait IdentityProvider: Send + Sync {
    /// URL the browser is redirected to for login
    ///
    /// # Errors
    ///
    /// Returns an error if the URL cannot be built
    fn authorization_url(&self, pending: &PendingLogin) -> Result<String, OAuthError>;

    /// Exchange an authorization code for tokens
    ///
    /// # Errors
    ///
    /// Returns an error on transport failure, an undecodable body, a provider
    /// error or a response without `id_token`
    async fn exchange_code(
        &self,
        code: &str,
        pkce_verifier: &str,
    ) -> Result<TokenExchange, OAuthError>;

    /// Fetch userinfo claims
    ///
    /// No access token means no call and an empty claim set.
    ///
    /// # Errors
    ///
    /// Returns an error on transport failure or a non-success status
    async fn fetch_profile(&self, access_token: Option<&str>)
        -> Result<ProfileClaims, OAuthError>;
}

/// Okta style provider reached at `{issuer}/v1/...`
pub struct OktaClient {
    client: ConfiguredClient,
    http_client: reqwest::Client,
    userinfo_url: String,
    scopes: Vec<String>,
}

impl std::fmt::Debug for OktaClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OktaClient")
            .field("client_id", self.client.client_id())
            .field("userinfo_url", &self.userinfo_url)
            .finish_non_exhaustive()
    }
}

impl OktaClient {
    /// Create a client from provider settings
    ///
    /// # Errors
    ///
    /// Returns error if any endpoint URL is invalid or the HTTP client cannot
    /// be built
    pub fn new(settings: &OAuthSettings) -> Result<Self, OAuthError> {
        let http_client = reqwest::Client::builder()
            .timeout(settings.request_timeout())
            .redirect(reqwest::redirect::Policy::none())
            .build()
            .map_err(|e| OAuthError::Generic(format!("Failed to build HTTP client: {e}")))?;
        Self::with_http_client(settings, http_client)
    }

    /// Create a client around an existing `reqwest::Client`
    ///
    /// The client must not follow redirects.
    ///
    /// # Errors
    ///
    /// Returns error if any endpoint URL is invalid
    pub fn with_http_client(
        settings: &OAuthSettings,
        http_client: reqwest::Client,
    ) -> Result<Self, OAuthError> {
        let client: ConfiguredClient = Client::new(ClientId::new(settings.client_id.clone()))
            .set_client_secret(ClientSecret::new(settings.client_secret.clone()))
            .set_auth_uri(
                AuthUrl::new(settings.authorize_url())
                    .map_err(|e| OAuthError::Generic(format!("Invalid auth URL: {e}")))?,
            )
            .set_token_uri(
                TokenUrl::new(settings.token_url())
                    .map_err(|e| OAuthError::Generic(format!("Invalid token URL: {e}")))?,
            )
            .set_redirect_uri(
                RedirectUrl::new(settings.redirect_uri.clone())
                    .map_err(|e| OAuthError::Generic(format!("Invalid redirect URI: {e}")))?,
            );

        Ok(Self {
            client,
            http_client,
            userinfo_url: settings.userinfo_url(),
            scopes: settings.scopes.clone(),
        })
    }

    fn token_exchange(response: &IdTokenResponse) -> Result<TokenExchange, OAuthError> {
        let id_token = response
            .extra_fields()
            .id_token
            .clone()
            .filter(|token| !token.is_empty())
            .ok_or(OAuthError::MissingIdToken)?;

        Ok(TokenExchange {
            access_token: response.access_token().secret().clone(),
            token_type: token_type_name(response.token_type()).to_string(),
            expires_in: response
                .expires_in()
                .map_or(0, |lifetime| i64::try_from(lifetime.as_secs()).unwrap_or(i64::MAX)),
            scope: response
                .scopes()
                .map(|scopes| {
                    scopes
                        .iter()
                        .map(|scope| scope.as_str())
                        .collect::<Vec<_>>()
                        .join(" ")
                })
                .unwrap_or_default(),
            id_token,
        })
    }
}

fn token_type_name(token_type: &BasicTokenType) -> &str {
    match token_type {
        BasicTokenType::Bearer => "Bearer",
        BasicTokenType::Mac => "MAC",
        BasicTokenType::Extension(name) => name.as_str(),
    }
}

#[async_trait]
impl IdentityProvider for OktaClient {
    fn authorization_url(&self, pending: &PendingLogin) -> Result<String, OAuthError> {
        let verifier = PkceCodeVerifier::new(pending.pkce_verifier.clone());
        let pkce_challenge = PkceCodeChallenge::from_code_verifier_sha256(&verifier);
        let state = pending.state.clone();

        let mut auth_url_builder = self
            .client
            .authorize_url(move || CsrfToken::new(state))
            .add_extra_param("response_mode", "query")
            .add_extra_param("nonce", pending.nonce.clone());

        for scope in &self.scopes {
            auth_url_builder = auth_url_builder.add_scope(Scope::new(scope.clone()));
        }

        let (auth_url, _) = auth_url_builder.set_pkce_challenge(pkce_challenge).url();
        Ok(auth_url.to_string())
    }

    async fn exchange_code(
        &self,
        code: &str,
        pkce_verifier: &str,
    ) -> Result<TokenExchange, OAuthError> {
        let response = self
            .client
            .exchange_code(AuthorizationCode::new(code.to_string()))
            .set_pkce_verifier(PkceCodeVerifier::new(pkce_verifier.to_string()))
            .request_async(&self.http_client)
            .await
            .map_err(|e| match e {
                RequestTokenError::ServerResponse(response) => OAuthError::Provider {
                    error: response.error().to_string(),
                    description: response.error_description().cloned().unwrap_or_default(),
                },
                RequestTokenError::Request(e) => OAuthError::Transport(e.to_string()),
                RequestTokenError::Parse(e, _) => OAuthError::Decode(e.to_string()),
                RequestTokenError::Other(message) => OAuthError::Decode(message),
            })?;

        Self::token_exchange(&response)
    }

    async fn fetch_profile(
        &self,
        access_token: Option<&str>,
    ) -> Result<ProfileClaims, OAuthError> {
        let Some(access_token) = access_token.filter(|token| !token.is_empty()) else {
            return Ok(ProfileClaims::new());
        };

        let response = self
            .http_client
            .get(&self.userinfo_url)
            .bearer_auth(access_token)
            .header(ACCEPT, "application/json")
            .send()
            .await
            .map_err(|e| OAuthError::Transport(e.to_string()))?;

        if !response.status().is_success() {
            return Err(OAuthError::UserInfo(format!(
                "HTTP {}",
                response.status()
            )));
        }

        let json: serde_json::Value = response.json().await?;
        Ok(profile_claims_from_json(&json))
    }
}
