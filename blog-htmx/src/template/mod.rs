//! Askama pages with HTMX partial rendering
//!
//! Every page extends `base.html`, which wraps the content block in partial
//! markers. Boosted HTMX navigation receives only the marked content.

use std::borrow::Cow;

use askama::Template;
use axum::response::Html;

use crate::error::BlogResult;
use crate::oauth::ProfileClaims;
use crate::store::PostWithAuthor;

const START_MARKER: &str = "<!-- HTMX_PARTIAL_START -->";
const END_MARKER: &str = "<!-- HTMX_PARTIAL_END -->";

/// Content between the partial markers, or the whole document without them
#[must_use]
pub fn extract_partial(html: &str) -> Cow<'_, str> {
    if let Some(start_pos) = html.find(START_MARKER) {
        let content_start = start_pos + START_MARKER.len();
        if let Some(end_pos) = html[content_start..].find(END_MARKER) {
            return Cow::Borrowed(html[content_start..content_start + end_pos].trim());
        }
    }
    Cow::Borrowed(html)
}

/// Render a page, full or partial
pub trait HxPage: Template {
    /// Full document for browsers, the content block for HTMX requests
    ///
    /// # Errors
    ///
    /// Returns [`crate::error::BlogError::Template`] if rendering fails
    fn render_page(&self, is_htmx: bool) -> BlogResult<Html<String>> {
        let html = self.render()?;
        if is_htmx {
            Ok(Html(extract_partial(&html).into_owned()))
        } else {
            Ok(Html(html))
        }
    }
}

impl<T: Template> HxPage for T {}

/// Post as shown in the list
#[derive(Debug, Clone)]
pub struct PostView {
    /// Post id
    pub id: i64,
    /// Title
    pub title: String,
    /// Body text
    pub body: String,
    /// Author name
    pub byline: String,
    /// Creation date
    pub created: String,
    /// Has a publication date
    pub published: bool,
}

impl From<PostWithAuthor> for PostView {
    fn from(post: PostWithAuthor) -> Self {
        Self {
            id: post.id,
            byline: post.byline().to_string(),
            created: post.created_at.format("%Y-%m-%d").to_string(),
            published: post.published_at.is_some(),
            title: post.title,
            body: post.body,
        }
    }
}

/// Home page
#[derive(Template)]
#[template(path = "index.html")]
pub struct IndexTemplate {
    /// Show authenticated navigation
    pub is_authenticated: bool,
    /// Name from the profile claims
    pub display_name: String,
    /// Error code of a failed login, empty if none
    pub login_error: String,
    /// Posts, newest first
    pub posts: Vec<PostView>,
}

/// Profile page
#[derive(Template)]
#[template(path = "profile.html")]
pub struct ProfileTemplate {
    /// Show authenticated navigation
    pub is_authenticated: bool,
    /// Claim name and value pairs
    pub claims: Vec<(String, String)>,
}

impl ProfileTemplate {
    /// Page for the given claims
    #[must_use]
    pub fn new(is_authenticated: bool, claims: &ProfileClaims) -> Self {
        Self {
            is_authenticated,
            claims: claims
                .iter()
                .map(|(name, value)| (name.clone(), value.clone()))
                .collect(),
        }
    }
}

/// New and edit post form
#[derive(Template)]
#[template(path = "post_form.html")]
pub struct PostFormTemplate {
    /// Show authenticated navigation
    pub is_authenticated: bool,
    /// Page heading
    pub heading: String,
    /// Form target
    pub action: String,
    /// Post id, 0 for a new post
    pub id: i64,
    /// Title value
    pub title: String,
    /// Body value
    pub body: String,
    /// Published checkbox
    pub published: bool,
    /// Validation message, empty if none
    pub error: String,
}

impl PostFormTemplate {
    /// Empty form for a new post
    #[must_use]
    pub fn new_post() -> Self {
        Self {
            is_authenticated: true,
            heading: "New post".to_string(),
            action: "/new/insert".to_string(),
            id: 0,
            title: String::new(),
            body: String::new(),
            published: false,
            error: String::new(),
        }
    }

    /// Form prefilled with an existing post
    #[must_use]
    pub fn edit(post: &PostWithAuthor) -> Self {
        Self {
            is_authenticated: true,
            heading: "Edit post".to_string(),
            action: "/edit".to_string(),
            id: post.id,
            title: post.title.clone(),
            body: post.body.clone(),
            published: post.published_at.is_some(),
            error: String::new(),
        }
    }

    /// Same form with a validation message
    #[must_use]
    pub fn with_error(mut self, error: impl Into<String>) -> Self {
        self.error = error.into();
        self
    }
}
