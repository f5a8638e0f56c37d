//! Login, callback and logout
//!
//! - `/login` creates a [`PendingLogin`], stores it in its own private cookie
//!   and redirects to the provider
//! - `/authorization-code/callback` checks `state`, exchanges the code,
//!   verifies the identity token against the attempt's `nonce` and stores the
//!   tokens in the session
//! - `/logout` drops the session cookie

use axum::{
    extract::{Query, State},
    response::{IntoResponse, Redirect, Response},
};
use axum_extra::extract::PrivateCookieJar;
use serde::Deserialize;

use crate::error::{BlogError, BlogResult};
use crate::oauth::{IdTokenClaims, PendingLogin, ProfileClaims};
use crate::state::AppState;

/// Callback query parameters
#[derive(Debug, Default, Deserialize)]
pub struct AuthorizationCallback {
    /// Authorization code from the provider
    pub code: Option<String>,
    /// Anti-CSRF value echoed back
    pub state: Option<String>,
    /// Error reported by the provider instead of a code
    pub error: Option<String>,
    /// Error description
    pub error_description: Option<String>,
}

fn login_failed(jar: PrivateCookieJar, code: &str) -> Response {
    (jar, Redirect::to(&format!("/?login_error={code}"))).into_response()
}

/// Start a login attempt
///
/// # Errors
///
/// Returns error if randomness is unavailable or the authorization URL
/// cannot be built
pub async fn login(
    State(state): State<AppState>,
    jar: PrivateCookieJar,
) -> BlogResult<(PrivateCookieJar, Redirect)> {
    let pending = PendingLogin::generate()?;
    let auth_url = state.provider().authorization_url(&pending)?;
    let jar = state.sessions().save_pending(jar, &pending);

    tracing::debug!(state = %pending.state, "redirecting to identity provider");
    Ok((jar, Redirect::to(&auth_url)))
}

/// Complete a login attempt
///
/// # Errors
///
/// Returns [`BlogError::BadRequest`] if no unexpired attempt is pending or
/// `code` is missing, and [`BlogError::StateMismatch`] if `state` differs.
/// A provider `error` with the matching `state`, and exchange or
/// verification failures, redirect to `/?login_error=<code>`.
pub async fn callback(
    State(state): State<AppState>,
    jar: PrivateCookieJar,
    Query(params): Query<AuthorizationCallback>,
) -> BlogResult<Response> {
    let sessions = state.sessions();

    let pending = sessions
        .load_pending(&jar)
        .ok_or_else(|| BlogError::BadRequest("no login in progress".to_string()))?;
    if pending.is_expired(sessions.settings().pending_login_ttl_secs) {
        tracing::warn!("login attempt expired");
        return Err(BlogError::BadRequest("login attempt expired".to_string()));
    }

    let returned_state = params.state.as_deref().unwrap_or_default();
    if !pending.state_matches(returned_state) {
        tracing::warn!(
            expected = %pending.state,
            received = %returned_state,
            "state mismatch"
        );
        return Err(BlogError::StateMismatch);
    }

    // A provider error only ends the attempt it answers
    if let Some(error) = params.error.as_deref() {
        tracing::warn!(
            error = %error,
            description = %params.error_description.as_deref().unwrap_or_default(),
            "authorization error from provider"
        );
        let jar = sessions.clear_pending(jar);
        return Ok(login_failed(jar, "provider_error"));
    }

    let code = params
        .code
        .as_deref()
        .filter(|code| !code.is_empty())
        .ok_or_else(|| BlogError::BadRequest("missing authorization code".to_string()))?;

    // The attempt is spent from here on, whatever the outcome
    let jar = sessions.clear_pending(jar);

    let exchange = match state.provider().exchange_code(code, &pending.pkce_verifier).await {
        Ok(exchange) => exchange,
        Err(e) => {
            let error = BlogError::from(e);
            tracing::warn!(error = %error, "token exchange failed");
            return Ok(login_failed(jar, error.code()));
        }
    };

    let claims = match state.verifier().verify(&exchange.id_token, &pending.nonce).await {
        Ok(claims) => claims,
        Err(e) => {
            let error = BlogError::from(e);
            tracing::warn!(error = %error, "identity token rejected");
            return Ok(login_failed(jar, error.code()));
        }
    };

    let mut session = sessions.load(&jar);
    session.establish(exchange.id_token, exchange.access_token);
    let jar = sessions.save(jar, &session);

    tracing::info!(sub = %claims.sub, "login successful");
    record_author(&state, session.access_token(), &claims).await;

    Ok((jar, Redirect::to("/")).into_response())
}

/// Create or refresh the author row for the logged in user
///
/// Failures are logged and do not affect the login.
async fn record_author(state: &AppState, access_token: Option<&str>, claims: &IdTokenClaims) {
    let profile = match state.provider().fetch_profile(access_token).await {
        Ok(profile) => profile,
        Err(e) => {
            tracing::warn!(error = %e, "could not fetch profile for author record");
            ProfileClaims::new()
        }
    };

    let Some(email) = profile
        .get("email")
        .cloned()
        .or_else(|| claims.email.clone())
    else {
        tracing::debug!(sub = %claims.sub, "no email claim, skipping author record");
        return;
    };
    let name = profile
        .get("name")
        .cloned()
        .or_else(|| claims.name.clone())
        .unwrap_or_else(|| email.clone());

    match state.store().upsert_author(&name, &email).await {
        Ok(author) => tracing::debug!(author_id = author.id, "author profile recorded"),
        Err(e) => tracing::error!(error = %e, "failed to record author profile"),
    }
}

/// End the session
pub async fn logout(State(state): State<AppState>, jar: PrivateCookieJar) -> impl IntoResponse {
    let sessions = state.sessions();
    let mut session = sessions.load(&jar);
    session.clear();
    let jar = sessions.save(jar, &session);

    tracing::info!("logged out");
    (jar, Redirect::to("/"))
}

#[cfg(test)]
mod tests {
    use crate::testing::{
        cookie_header, get, location, set_cookies, test_state, FakeProvider, TEST_EMAIL,
    };
    use axum::http::StatusCode;
    use std::sync::atomic::Ordering;

    /// Query parameters of the provider redirect
    fn redirect_param(location: &str, name: &str) -> String {
        reqwest::Url::parse(location)
            .unwrap()
            .query_pairs()
            .find(|(k, _)| k == name)
            .map(|(_, v)| v.into_owned())
            .unwrap()
    }

    #[tokio::test]
    async fn test_login_redirects_with_fresh_state() {
        let (state, _) = test_state(FakeProvider::default()).await;
        let app = crate::app(state);

        let first = get(&app, "/login", None).await;
        let second = get(&app, "/login", None).await;

        assert_eq!(first.status(), StatusCode::SEE_OTHER);
        let first_state = redirect_param(&location(&first), "state");
        let second_state = redirect_param(&location(&second), "state");
        assert_ne!(first_state, second_state);
        assert!(!set_cookies(&first).is_empty());
    }

    #[tokio::test]
    async fn test_callback_success_establishes_session() {
        let (state, provider) = test_state(FakeProvider::default()).await;
        let app = crate::app(state.clone());

        let login = get(&app, "/login", None).await;
        let login_state = redirect_param(&location(&login), "state");
        let cookies = cookie_header(&login);

        let callback = get(
            &app,
            &format!("/authorization-code/callback?state={login_state}&code=abc"),
            Some(&cookies),
        )
        .await;

        assert_eq!(callback.status(), StatusCode::SEE_OTHER);
        assert_eq!(location(&callback), "/");
        assert_eq!(provider.exchange_calls.load(Ordering::SeqCst), 1);
        assert_eq!(provider.last_code.lock().as_deref(), Some("abc"));

        // The new session authenticates the next request
        let profile = get(&app, "/profile", Some(&cookie_header(&callback))).await;
        assert_eq!(profile.status(), StatusCode::OK);

        let author = state
            .store()
            .find_author_by_email(TEST_EMAIL)
            .await
            .unwrap();
        assert_eq!(author.map(|a| a.name).as_deref(), Some("Ada Lovelace"));
    }

    #[tokio::test]
    async fn test_callback_wrong_state_skips_exchange() {
        let (state, provider) = test_state(FakeProvider::default()).await;
        let app = crate::app(state);

        let login = get(&app, "/login", None).await;
        let cookies = cookie_header(&login);

        let callback = get(
            &app,
            "/authorization-code/callback?state=abc&code=abc",
            Some(&cookies),
        )
        .await;

        assert_eq!(callback.status(), StatusCode::BAD_REQUEST);
        assert_eq!(provider.exchange_calls.load(Ordering::SeqCst), 0);
        assert!(set_cookies(&callback).is_empty());
    }

    #[tokio::test]
    async fn test_callback_without_pending_login() {
        let (state, provider) = test_state(FakeProvider::default()).await;
        let app = crate::app(state);

        let callback = get(&app, "/authorization-code/callback?state=S1&code=abc", None).await;

        assert_eq!(callback.status(), StatusCode::BAD_REQUEST);
        assert_eq!(provider.exchange_calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_callback_missing_code() {
        let (state, provider) = test_state(FakeProvider::default()).await;
        let app = crate::app(state);

        let login = get(&app, "/login", None).await;
        let login_state = redirect_param(&location(&login), "state");

        let callback = get(
            &app,
            &format!("/authorization-code/callback?state={login_state}"),
            Some(&cookie_header(&login)),
        )
        .await;

        assert_eq!(callback.status(), StatusCode::BAD_REQUEST);
        assert_eq!(provider.exchange_calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_callback_nonce_mismatch_leaves_session_unchanged() {
        let (state, provider) = test_state(FakeProvider {
            nonce_override: Some("N2".to_string()),
            ..FakeProvider::default()
        })
        .await;
        let app = crate::app(state);

        let login = get(&app, "/login", None).await;
        let login_state = redirect_param(&location(&login), "state");

        let callback = get(
            &app,
            &format!("/authorization-code/callback?state={login_state}&code=abc"),
            Some(&cookie_header(&login)),
        )
        .await;

        assert_eq!(callback.status(), StatusCode::SEE_OTHER);
        assert_eq!(location(&callback), "/?login_error=verification_failed");
        assert_eq!(provider.exchange_calls.load(Ordering::SeqCst), 1);

        // Only the pending-login cookie is touched, no session is issued
        let issued: Vec<String> = set_cookies(&callback)
            .into_iter()
            .filter(|c| c.starts_with("okta-hosted-login-session-store="))
            .collect();
        assert!(issued.is_empty());
    }

    #[tokio::test]
    async fn test_callback_exchange_failure_redirects_with_error() {
        let (state, _) = test_state(FakeProvider {
            fail_exchange: true,
            ..FakeProvider::default()
        })
        .await;
        let app = crate::app(state);

        let login = get(&app, "/login", None).await;
        let login_state = redirect_param(&location(&login), "state");

        let callback = get(
            &app,
            &format!("/authorization-code/callback?state={login_state}&code=abc"),
            Some(&cookie_header(&login)),
        )
        .await;

        assert_eq!(location(&callback), "/?login_error=upstream_unavailable");
    }

    #[tokio::test]
    async fn test_callback_provider_error() {
        let (state, provider) = test_state(FakeProvider::default()).await;
        let app = crate::app(state);

        let login = get(&app, "/login", None).await;
        let login_state = redirect_param(&location(&login), "state");

        let callback = get(
            &app,
            &format!(
                "/authorization-code/callback?state={login_state}&error=access_denied&error_description=nope"
            ),
            Some(&cookie_header(&login)),
        )
        .await;

        assert_eq!(location(&callback), "/?login_error=provider_error");
        assert_eq!(provider.exchange_calls.load(Ordering::SeqCst), 0);
        assert!(set_cookies(&callback)
            .iter()
            .any(|c| c.starts_with("blog-pending-login=") && c.contains("Max-Age=0")));
    }

    #[tokio::test]
    async fn test_error_without_matching_state_keeps_pending_login() {
        let (state, provider) = test_state(FakeProvider::default()).await;
        let app = crate::app(state);

        let login = get(&app, "/login", None).await;
        let login_state = redirect_param(&location(&login), "state");
        let cookies = cookie_header(&login);

        for forged in [
            "/authorization-code/callback?error=access_denied",
            "/authorization-code/callback?state=forged&error=access_denied",
        ] {
            let response = get(&app, forged, Some(&cookies)).await;
            assert_eq!(response.status(), StatusCode::BAD_REQUEST);
            assert!(set_cookies(&response).is_empty());
        }

        let callback = get(
            &app,
            &format!("/authorization-code/callback?state={login_state}&code=abc"),
            Some(&cookies),
        )
        .await;
        assert_eq!(callback.status(), StatusCode::SEE_OTHER);
        assert_eq!(location(&callback), "/");
        assert_eq!(provider.exchange_calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_logout_removes_session_cookie() {
        let (state, _) = test_state(FakeProvider::default()).await;
        let cookie = crate::testing::session_cookie(&state, "T", "A");
        let app = crate::app(state);

        let logout = get(&app, "/logout", Some(&cookie)).await;

        assert_eq!(logout.status(), StatusCode::SEE_OTHER);
        assert_eq!(location(&logout), "/");
        let removal = set_cookies(&logout)
            .into_iter()
            .find(|c| c.starts_with("okta-hosted-login-session-store="))
            .unwrap();
        assert!(removal.contains("Max-Age=0"));
    }
}
