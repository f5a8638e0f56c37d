//! Per-request authentication context
//!
//! [`auth_gate`] runs in front of every route. It reads the session cookie,
//! fetches the userinfo claims for authenticated browsers and attaches an
//! [`AuthContext`] to the request. It never rejects a request; handlers that
//! need a logged-in user take [`RequireAuth`] instead.
//!
//! ```rust,no_run
//! use axum::{middleware, routing::get, Router};
//! use blog_htmx::middleware::{auth_gate, AuthContext};
//! use blog_htmx::state::AppState;
//!
//! async fn whoami(auth: AuthContext) -> String {
//!     auth.profile.get("name").cloned().unwrap_or_default()
//! }
//!
//! fn router(state: AppState) -> Router {
//!     Router::new()
//!         .route("/whoami", get(whoami))
//!         .layer(middleware::from_fn_with_state(state.clone(), auth_gate))
//!         .with_state(state)
//! }
//! ```

use std::convert::Infallible;

use axum::{
    extract::{FromRequestParts, Request, State},
    http::{request::Parts, StatusCode},
    middleware::Next,
    response::{IntoResponse, Redirect, Response},
};
use axum_extra::extract::PrivateCookieJar;
use axum_htmx::{HxRedirect, HxRequest};

use crate::oauth::ProfileClaims;
use crate::state::AppState;

/// What the gate learned about the caller
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AuthContext {
    /// Session holds an identity token
    pub is_authenticated: bool,

    /// Userinfo claims, empty when unauthenticated or not fetched
    pub profile: ProfileClaims,

    /// The userinfo call failed for an authenticated session
    pub profile_unavailable: bool,
}

impl AuthContext {
    /// Claim value by name
    #[must_use]
    pub fn claim(&self, name: &str) -> Option<&str> {
        self.profile.get(name).map(String::as_str)
    }
}

/// Attach an [`AuthContext`] to the request and run the handler
pub async fn auth_gate(
    State(state): State<AppState>,
    jar: PrivateCookieJar,
    mut request: Request,
    next: Next,
) -> Response {
    let session = state.sessions().load(&jar);
    let mut context = AuthContext {
        is_authenticated: session.is_authenticated(),
        ..AuthContext::default()
    };

    if context.is_authenticated && state.config().auth.fetch_profile {
        match state.provider().fetch_profile(session.access_token()).await {
            Ok(profile) => context.profile = profile,
            Err(e) => {
                tracing::warn!(error = %e, path = %request.uri().path(), "profile fetch failed");
                context.profile_unavailable = true;
            }
        }
    }

    request.extensions_mut().insert(context);
    next.run(request).await
}

impl<S> FromRequestParts<S> for AuthContext
where
    S: Send + Sync,
{
    type Rejection = Infallible;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        // Routes mounted outside the gate see an anonymous caller
        Ok(parts
            .extensions
            .get::<Self>()
            .cloned()
            .unwrap_or_default())
    }
}

/// Extractor for handlers that change data
///
/// Unauthenticated callers are redirected to the login path; HTMX requests
/// get 401 with `HX-Redirect` so htmx performs a full page navigation.
#[derive(Debug, Clone)]
pub struct RequireAuth(pub AuthContext);

/// Rejection for [`RequireAuth`]
#[derive(Debug)]
pub enum AuthRejection {
    /// HTMX request, answered with 401 and `HX-Redirect`
    Unauthorized(String),
    /// Browser request, answered with a redirect
    RedirectToLogin(String),
}

impl IntoResponse for AuthRejection {
    fn into_response(self) -> Response {
        match self {
            Self::Unauthorized(login_path) => (
                StatusCode::UNAUTHORIZED,
                HxRedirect::from(login_path.as_str()),
                "Unauthorized",
            )
                .into_response(),
            Self::RedirectToLogin(login_path) => Redirect::to(&login_path).into_response(),
        }
    }
}

impl FromRequestParts<AppState> for RequireAuth {
    type Rejection = AuthRejection;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        let Ok(context) = AuthContext::from_request_parts(parts, state).await;
        if context.is_authenticated {
            return Ok(Self(context));
        }

        let login_path = state.config().auth.login_path.clone();
        let is_htmx = matches!(
            HxRequest::from_request_parts(parts, state).await,
            Ok(HxRequest(true))
        );

        tracing::debug!(path = %parts.uri.path(), is_htmx, "unauthenticated request to protected route");
        if is_htmx {
            Err(AuthRejection::Unauthorized(login_path))
        } else {
            Err(AuthRejection::RedirectToLogin(login_path))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{session_cookie, test_state, FakeProvider};
    use axum::{body::Body, http::Request as HttpRequest, middleware, routing::get, Router};
    use std::sync::atomic::Ordering;
    use tower::ServiceExt;

    async fn whoami(auth: AuthContext) -> String {
        format!(
            "{}|{}|{}",
            auth.is_authenticated,
            auth.claim("name").unwrap_or("-"),
            auth.profile_unavailable
        )
    }

    async fn protected(RequireAuth(_): RequireAuth) -> &'static str {
        "Protected content"
    }

    fn app(state: AppState) -> Router {
        Router::new()
            .route("/whoami", get(whoami))
            .route("/protected", get(protected))
            .layer(middleware::from_fn_with_state(state.clone(), auth_gate))
            .with_state(state)
    }

    async fn body_text(response: Response) -> String {
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        String::from_utf8(bytes.to_vec()).unwrap()
    }

    #[tokio::test]
    async fn test_anonymous_request_is_not_rejected() {
        let (state, provider) = test_state(FakeProvider::default()).await;
        let response = app(state)
            .oneshot(HttpRequest::get("/whoami").body(Body::empty()).unwrap())
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(body_text(response).await, "false|-|false");
        assert_eq!(provider.profile_calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_authenticated_request_gets_profile() {
        let (state, provider) = test_state(FakeProvider::default()).await;
        let cookie = session_cookie(&state, "T", "A");

        let response = app(state)
            .oneshot(
                HttpRequest::get("/whoami")
                    .header("cookie", cookie)
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(body_text(response).await, "true|Ada Lovelace|false");
        assert_eq!(provider.profile_calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_profile_failure_is_recorded_not_fatal() {
        let (state, _) = test_state(FakeProvider {
            fail_profile: true,
            ..FakeProvider::default()
        })
        .await;
        let cookie = session_cookie(&state, "T", "A");

        let response = app(state)
            .oneshot(
                HttpRequest::get("/whoami")
                    .header("cookie", cookie)
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(body_text(response).await, "true|-|true");
    }

    #[tokio::test]
    async fn test_require_auth_redirects_browser() {
        let (state, _) = test_state(FakeProvider::default()).await;
        let response = app(state)
            .oneshot(HttpRequest::get("/protected").body(Body::empty()).unwrap())
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::SEE_OTHER);
        assert_eq!(response.headers().get("location").unwrap(), "/login");
    }

    #[tokio::test]
    async fn test_require_auth_htmx_gets_401() {
        let (state, _) = test_state(FakeProvider::default()).await;
        let response = app(state)
            .oneshot(
                HttpRequest::get("/protected")
                    .header("HX-Request", "true")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
        assert_eq!(response.headers().get("HX-Redirect").unwrap(), "/login");
    }

    #[tokio::test]
    async fn test_require_auth_passes_authenticated() {
        let (state, _) = test_state(FakeProvider::default()).await;
        let cookie = session_cookie(&state, "T", "A");

        let response = app(state)
            .oneshot(
                HttpRequest::get("/protected")
                    .header("cookie", cookie)
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
    }
}
