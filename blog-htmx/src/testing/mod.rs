//! Test fixtures: a scripted identity provider, a static-key verifier and
//! request helpers around `tower::ServiceExt::oneshot`

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use axum::{
    body::Body,
    extract::FromRef,
    http::{header, HeaderMap, Request},
    response::{IntoResponse, Response},
    Router,
};
use axum_extra::extract::{cookie::Key, PrivateCookieJar};
use chrono::Utc;
use jsonwebtoken::{encode, Algorithm, DecodingKey, EncodingKey, Header};
use parking_lot::Mutex;
use serde_json::json;
use tower::ServiceExt;

use crate::config::BlogConfig;
use crate::oauth::jwks::{JwksCache, SigningKey};
use crate::oauth::{
    IdentityProvider, JwksVerifier, OAuthError, PendingLogin, ProfileClaims, TokenExchange,
};
use crate::session::Session;
use crate::state::AppState;

pub const TEST_ISSUER: &str = "https://idp.test/oauth2/default";
pub const TEST_CLIENT_ID: &str = "blog-test-client";
pub const TEST_EMAIL: &str = "ada@example.com";
const SIGNING_SECRET: &[u8] = b"blog-htmx-test-signing-secret-0123456789";
const KEY_ID: &str = "test-key";

pub fn test_config() -> BlogConfig {
    let mut config = BlogConfig::default();
    config.oauth.issuer = TEST_ISSUER.to_string();
    config.oauth.client_id = TEST_CLIENT_ID.to_string();
    config.oauth.client_secret = "shh".to_string();
    config.session.secure_cookies = false;
    config
}

/// Identity token as the provider would issue it
pub fn sign_id_token(nonce: &str) -> String {
    let claims = json!({
        "iss": TEST_ISSUER,
        "sub": "00u-ada",
        "aud": TEST_CLIENT_ID,
        "iat": Utc::now().timestamp(),
        "exp": Utc::now().timestamp() + 600,
        "nonce": nonce,
        "email": TEST_EMAIL,
        "name": "Ada Lovelace"
    });
    let mut header = Header::new(Algorithm::HS256);
    header.kid = Some(KEY_ID.to_string());
    encode(&header, &claims, &EncodingKey::from_secret(SIGNING_SECRET))
        .expect("test token signs")
}

pub fn test_verifier(config: &BlogConfig) -> JwksVerifier {
    let key = SigningKey {
        key: DecodingKey::from_secret(SIGNING_SECRET),
        algorithm: Algorithm::HS256,
    };
    JwksVerifier::with_keys(&config.oauth, JwksCache::fixed([(Some(KEY_ID.to_string()), key)]))
}

/// Provider that answers from memory and counts calls
///
/// The exchange returns a token carrying the nonce of the last authorization
/// URL it built, unless `nonce_override` says otherwise.
pub struct FakeProvider {
    pub exchange_calls: AtomicUsize,
    pub profile_calls: AtomicUsize,
    pub last_nonce: Mutex<Option<String>>,
    pub last_code: Mutex<Option<String>>,
    pub nonce_override: Option<String>,
    pub fail_exchange: bool,
    pub fail_profile: bool,
    pub profile: ProfileClaims,
}

impl Default for FakeProvider {
    fn default() -> Self {
        let mut profile = ProfileClaims::new();
        profile.insert("sub".to_string(), "00u-ada".to_string());
        profile.insert("name".to_string(), "Ada Lovelace".to_string());
        profile.insert("email".to_string(), TEST_EMAIL.to_string());

        Self {
            exchange_calls: AtomicUsize::new(0),
            profile_calls: AtomicUsize::new(0),
            last_nonce: Mutex::new(None),
            last_code: Mutex::new(None),
            nonce_override: None,
            fail_exchange: false,
            fail_profile: false,
            profile,
        }
    }
}

#[async_trait]
impl IdentityProvider for FakeProvider {
    fn authorization_url(&self, pending: &PendingLogin) -> Result<String, OAuthError> {
        *self.last_nonce.lock() = Some(pending.nonce.clone());
        Ok(format!(
            "{TEST_ISSUER}/v1/authorize?client_id={TEST_CLIENT_ID}&state={}&nonce={}",
            pending.state, pending.nonce
        ))
    }

    async fn exchange_code(
        &self,
        code: &str,
        _pkce_verifier: &str,
    ) -> Result<TokenExchange, OAuthError> {
        self.exchange_calls.fetch_add(1, Ordering::SeqCst);
        *self.last_code.lock() = Some(code.to_string());

        if self.fail_exchange {
            return Err(OAuthError::Transport("connection refused".to_string()));
        }

        let nonce = self
            .nonce_override
            .clone()
            .or_else(|| self.last_nonce.lock().clone())
            .unwrap_or_default();

        Ok(TokenExchange {
            access_token: "A".to_string(),
            token_type: "Bearer".to_string(),
            expires_in: 3600,
            scope: "openid profile email".to_string(),
            id_token: sign_id_token(&nonce),
        })
    }

    async fn fetch_profile(
        &self,
        access_token: Option<&str>,
    ) -> Result<ProfileClaims, OAuthError> {
        if access_token.is_none_or(str::is_empty) {
            return Ok(ProfileClaims::new());
        }
        self.profile_calls.fetch_add(1, Ordering::SeqCst);
        if self.fail_profile {
            return Err(OAuthError::UserInfo("HTTP 401 Unauthorized".to_string()));
        }
        Ok(self.profile.clone())
    }
}

/// State over an in-memory database and the given fake provider
pub async fn test_state(provider: FakeProvider) -> (AppState, Arc<FakeProvider>) {
    let config = test_config();
    let store = crate::store::tests::memory_store().await;
    let provider = Arc::new(provider);
    let verifier = Arc::new(test_verifier(&config));

    let state = AppState::new(config, store, provider.clone(), verifier, Key::generate());
    (state, provider)
}

/// `Set-Cookie` values of a response
pub fn set_cookies(response: &Response) -> Vec<String> {
    response
        .headers()
        .get_all(header::SET_COOKIE)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .map(ToString::to_string)
        .collect()
}

/// `Cookie` request header replaying what a response set
pub fn cookie_header(response: &Response) -> String {
    set_cookies(response)
        .iter()
        .filter_map(|cookie| cookie.split(';').next())
        .collect::<Vec<_>>()
        .join("; ")
}

/// `Cookie` header for an already established session
pub fn session_cookie(state: &AppState, id_token: &str, access_token: &str) -> String {
    let mut session = Session::default();
    session.establish(id_token, access_token);

    let jar = PrivateCookieJar::from_headers(&HeaderMap::new(), Key::from_ref(state));
    let jar = state.sessions().save(jar, &session);
    cookie_header(&jar.into_response())
}

pub fn location(response: &Response) -> String {
    response
        .headers()
        .get(header::LOCATION)
        .and_then(|v| v.to_str().ok())
        .unwrap_or_default()
        .to_string()
}

pub async fn send(app: &Router, request: Request<Body>) -> Response {
    app.clone().oneshot(request).await.expect("infallible")
}

pub async fn get(app: &Router, path: &str, cookie: Option<&str>) -> Response {
    let mut request = Request::get(path);
    if let Some(cookie) = cookie {
        request = request.header(header::COOKIE, cookie);
    }
    send(app, request.body(Body::empty()).expect("valid request")).await
}
