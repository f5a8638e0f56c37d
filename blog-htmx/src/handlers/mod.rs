//! HTTP handlers

pub mod auth;
pub mod pages;
pub mod posts_api;

use crate::error::BlogResult;
use crate::middleware::AuthContext;
use crate::state::AppState;

/// Author row for the caller, created from the profile claims if needed
///
/// `None` when the profile carries no email.
pub(crate) async fn current_author_id(
    state: &AppState,
    auth: &AuthContext,
) -> BlogResult<Option<i64>> {
    let Some(email) = auth.claim("email") else {
        return Ok(None);
    };

    if let Some(author) = state.store().find_author_by_email(email).await? {
        return Ok(Some(author.id));
    }

    let name = auth.claim("name").unwrap_or(email);
    let author = state.store().upsert_author(name, email).await?;
    Ok(Some(author.id))
}

/// Liveness check
pub async fn health() -> &'static str {
    "ok"
}
