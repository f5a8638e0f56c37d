//! HTML pages

use axum::{
    extract::{Query, State},
    http::StatusCode,
    response::{IntoResponse, Redirect, Response},
    Form,
};
use axum_htmx::HxRequest;
use serde::Deserialize;

use super::current_author_id;
use crate::error::{BlogError, BlogResult};
use crate::middleware::{AuthContext, RequireAuth};
use crate::oauth::OAuthError;
use crate::state::AppState;
use crate::store::{NewPost, PostUpdate};
use crate::template::{HxPage, IndexTemplate, PostFormTemplate, PostView, ProfileTemplate};

/// `/` query parameters
#[derive(Debug, Default, Deserialize)]
pub struct IndexQuery {
    /// Failure code from the login callback
    pub login_error: Option<String>,
}

/// `/edit` query parameters
#[derive(Debug, Deserialize)]
pub struct EditQuery {
    /// Post to edit
    pub id: i64,
}

/// Fields posted by the post form
#[derive(Debug, Default, Deserialize)]
pub struct PostForm {
    /// Present when editing
    #[serde(default)]
    pub id: Option<i64>,
    /// Title
    #[serde(default)]
    pub title: String,
    /// Body
    #[serde(default)]
    pub body: String,
    /// Checkbox, sent only when checked
    #[serde(default)]
    pub publish: Option<String>,
}

impl PostForm {
    fn publish(&self) -> bool {
        self.publish.is_some()
    }
}

/// Keep only characters a callback error code can contain
fn sanitize_code(code: &str) -> String {
    code.chars()
        .filter(|c| c.is_ascii_alphanumeric() || *c == '_')
        .take(64)
        .collect()
}

/// Post list
///
/// # Errors
///
/// Returns error if posts cannot be loaded or the page cannot be rendered
pub async fn index(
    State(state): State<AppState>,
    auth: AuthContext,
    HxRequest(is_htmx): HxRequest,
    Query(query): Query<IndexQuery>,
) -> BlogResult<Response> {
    let posts = state.store().list_posts().await?;

    let page = IndexTemplate {
        is_authenticated: auth.is_authenticated,
        display_name: auth.claim("name").unwrap_or_default().to_string(),
        login_error: query
            .login_error
            .as_deref()
            .map(sanitize_code)
            .unwrap_or_default(),
        posts: posts.into_iter().map(PostView::from).collect(),
    };

    Ok(page.render_page(is_htmx)?.into_response())
}

/// Claims of the logged in user
///
/// # Errors
///
/// Returns [`BlogError::Upstream`] if the userinfo call failed for this request
pub async fn profile(auth: AuthContext, HxRequest(is_htmx): HxRequest) -> BlogResult<Response> {
    if auth.profile_unavailable {
        return Err(BlogError::Upstream(OAuthError::UserInfo(
            "profile unavailable".to_string(),
        )));
    }

    let page = ProfileTemplate::new(auth.is_authenticated, &auth.profile);
    Ok(page.render_page(is_htmx)?.into_response())
}

/// Empty post form
///
/// # Errors
///
/// Returns error if the page cannot be rendered
pub async fn new_post_form(
    RequireAuth(_): RequireAuth,
    HxRequest(is_htmx): HxRequest,
) -> BlogResult<Response> {
    Ok(PostFormTemplate::new_post()
        .render_page(is_htmx)?
        .into_response())
}

/// Create a post from the form
///
/// # Errors
///
/// Returns error if the post cannot be stored
pub async fn insert_post(
    State(state): State<AppState>,
    RequireAuth(auth): RequireAuth,
    HxRequest(is_htmx): HxRequest,
    Form(form): Form<PostForm>,
) -> BlogResult<Response> {
    let new_post = NewPost {
        title: form.title.clone(),
        body: form.body.clone(),
        author_id: current_author_id(&state, &auth).await?,
        publish: form.publish(),
    };

    if let Err(message) = new_post.validate() {
        let mut page = PostFormTemplate::new_post().with_error(message);
        page.title = form.title;
        page.body = form.body;
        page.published = new_post.publish;
        return Ok((StatusCode::UNPROCESSABLE_ENTITY, page.render_page(is_htmx)?).into_response());
    }

    let post = state.store().create_post(&new_post).await?;
    tracing::info!(post_id = post.id, "post created");
    Ok(Redirect::to("/").into_response())
}

/// Form prefilled with an existing post
///
/// # Errors
///
/// Returns [`BlogError::NotFound`] if the post does not exist
pub async fn edit_post_form(
    State(state): State<AppState>,
    RequireAuth(_): RequireAuth,
    HxRequest(is_htmx): HxRequest,
    Query(query): Query<EditQuery>,
) -> BlogResult<Response> {
    let post = state
        .store()
        .find_post(query.id)
        .await?
        .ok_or_else(|| BlogError::NotFound(format!("post {}", query.id)))?;

    Ok(PostFormTemplate::edit(&post)
        .render_page(is_htmx)?
        .into_response())
}

/// Save an edited post
///
/// # Errors
///
/// Returns [`BlogError::BadRequest`] without an id and [`BlogError::NotFound`]
/// if the post does not exist
pub async fn update_post(
    State(state): State<AppState>,
    RequireAuth(_): RequireAuth,
    HxRequest(is_htmx): HxRequest,
    Form(form): Form<PostForm>,
) -> BlogResult<Response> {
    let id = form
        .id
        .ok_or_else(|| BlogError::BadRequest("missing post id".to_string()))?;

    let update = PostUpdate {
        title: Some(form.title.clone()),
        body: Some(form.body.clone()),
        publish: Some(form.publish()),
    };

    if let Err(message) = update.validate() {
        let page = PostFormTemplate {
            is_authenticated: true,
            heading: "Edit post".to_string(),
            action: "/edit".to_string(),
            id,
            title: form.title,
            body: form.body,
            published: update.publish == Some(true),
            error: message,
        };
        return Ok((StatusCode::UNPROCESSABLE_ENTITY, page.render_page(is_htmx)?).into_response());
    }

    state
        .store()
        .update_post(id, &update)
        .await?
        .ok_or_else(|| BlogError::NotFound(format!("post {id}")))?;

    tracing::info!(post_id = id, "post updated");
    Ok(Redirect::to("/").into_response())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{get, send, session_cookie, test_state, FakeProvider};
    use axum::body::Body;
    use axum::http::{header, Request};

    async fn body_text(response: Response) -> String {
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        String::from_utf8(bytes.to_vec()).unwrap()
    }

    fn form_post(path: &str, body: &str, cookie: &str) -> Request<Body> {
        Request::post(path)
            .header(header::CONTENT_TYPE, "application/x-www-form-urlencoded")
            .header(header::COOKIE, cookie)
            .body(Body::from(body.to_string()))
            .unwrap()
    }

    #[test]
    fn test_sanitize_code() {
        assert_eq!(sanitize_code("verification_failed"), "verification_failed");
        assert_eq!(sanitize_code("<script>"), "script");
    }

    #[tokio::test]
    async fn test_index_shows_login_error() {
        let (state, _) = test_state(FakeProvider::default()).await;
        let app = crate::app(state);

        let response = get(&app, "/?login_error=verification_failed", None).await;
        assert_eq!(response.status(), StatusCode::OK);
        assert!(body_text(response).await.contains("verification_failed"));
    }

    #[tokio::test]
    async fn test_profile_page_lists_claims() {
        let (state, _) = test_state(FakeProvider::default()).await;
        let cookie = session_cookie(&state, "T", "A");
        let app = crate::app(state);

        let response = get(&app, "/profile", Some(&cookie)).await;
        assert_eq!(response.status(), StatusCode::OK);
        assert!(body_text(response).await.contains("Ada Lovelace"));
    }

    #[tokio::test]
    async fn test_profile_page_upstream_failure() {
        let (state, _) = test_state(FakeProvider {
            fail_profile: true,
            ..FakeProvider::default()
        })
        .await;
        let cookie = session_cookie(&state, "T", "A");
        let app = crate::app(state);

        let response = get(&app, "/profile", Some(&cookie)).await;
        assert_eq!(response.status(), StatusCode::BAD_GATEWAY);
    }

    #[tokio::test]
    async fn test_new_form_requires_login() {
        let (state, _) = test_state(FakeProvider::default()).await;
        let app = crate::app(state);

        let response = get(&app, "/new", None).await;
        assert_eq!(response.status(), StatusCode::SEE_OTHER);
        assert_eq!(response.headers().get("location").unwrap(), "/login");
    }

    #[tokio::test]
    async fn test_insert_and_edit_post() {
        let (state, _) = test_state(FakeProvider::default()).await;
        let cookie = session_cookie(&state, "T", "A");
        let app = crate::app(state.clone());

        let created = send(
            &app,
            form_post("/new/insert", "title=Hello&body=First+post&publish=true", &cookie),
        )
        .await;
        assert_eq!(created.status(), StatusCode::SEE_OTHER);

        let posts = state.store().list_posts().await.unwrap();
        assert_eq!(posts.len(), 1);
        assert_eq!(posts[0].author_name.as_deref(), Some("Ada Lovelace"));
        let id = posts[0].id;

        let form = get(&app, &format!("/edit?id={id}"), Some(&cookie)).await;
        assert_eq!(form.status(), StatusCode::OK);
        assert!(body_text(form).await.contains("value=\"Hello\""));

        let updated = send(
            &app,
            form_post("/edit", &format!("id={id}&title=Changed&body=Edited"), &cookie),
        )
        .await;
        assert_eq!(updated.status(), StatusCode::SEE_OTHER);

        let post = state.store().find_post(id).await.unwrap().unwrap();
        assert_eq!(post.title, "Changed");
        assert!(post.published_at.is_none());
    }

    #[tokio::test]
    async fn test_insert_rejects_empty_title() {
        let (state, _) = test_state(FakeProvider::default()).await;
        let cookie = session_cookie(&state, "T", "A");
        let app = crate::app(state.clone());

        let response = send(&app, form_post("/new/insert", "title=&body=x", &cookie)).await;
        assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY);
        assert!(state.store().list_posts().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_edit_missing_post() {
        let (state, _) = test_state(FakeProvider::default()).await;
        let cookie = session_cookie(&state, "T", "A");
        let app = crate::app(state);

        let response = get(&app, "/edit?id=999", Some(&cookie)).await;
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }
}
