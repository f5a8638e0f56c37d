//! JSON post API

use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use axum_htmx::{HxRedirect, HxRequest};

use super::current_author_id;
use crate::error::{BlogError, BlogResult};
use crate::middleware::RequireAuth;
use crate::state::AppState;
use crate::store::{NewPost, Post, PostUpdate, PostWithAuthor};

/// `GET /posts`
///
/// # Errors
///
/// Returns error if the query fails
pub async fn list(State(state): State<AppState>) -> BlogResult<Json<Vec<PostWithAuthor>>> {
    Ok(Json(state.store().list_posts().await?))
}

/// `POST /posts`
///
/// The post is attributed to the caller unless `author_id` is given.
///
/// # Errors
///
/// Returns [`BlogError::BadRequest`] for an empty title
pub async fn create(
    State(state): State<AppState>,
    RequireAuth(auth): RequireAuth,
    Json(mut new_post): Json<NewPost>,
) -> BlogResult<(StatusCode, Json<Post>)> {
    new_post.validate().map_err(BlogError::BadRequest)?;
    if new_post.author_id.is_none() {
        new_post.author_id = current_author_id(&state, &auth).await?;
    }

    let post = state.store().create_post(&new_post).await?;
    tracing::info!(post_id = post.id, "post created");
    Ok((StatusCode::CREATED, Json(post)))
}

/// `GET /posts/{id}`
///
/// # Errors
///
/// Returns [`BlogError::NotFound`] if the post does not exist
pub async fn show(
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> BlogResult<Json<PostWithAuthor>> {
    state
        .store()
        .find_post(id)
        .await?
        .map(Json)
        .ok_or_else(|| BlogError::NotFound(format!("post {id}")))
}

/// `PATCH /posts/{id}`
///
/// # Errors
///
/// Returns [`BlogError::BadRequest`] for an empty title and
/// [`BlogError::NotFound`] if the post does not exist
pub async fn update(
    State(state): State<AppState>,
    RequireAuth(_): RequireAuth,
    Path(id): Path<i64>,
    Json(update): Json<PostUpdate>,
) -> BlogResult<Json<Post>> {
    update.validate().map_err(BlogError::BadRequest)?;

    let post = state
        .store()
        .update_post(id, &update)
        .await?
        .ok_or_else(|| BlogError::NotFound(format!("post {id}")))?;

    tracing::info!(post_id = id, "post updated");
    Ok(Json(post))
}

/// `DELETE /posts/{id}`
///
/// HTMX callers are sent back to the post list.
///
/// # Errors
///
/// Returns [`BlogError::NotFound`] if the post does not exist
pub async fn delete(
    State(state): State<AppState>,
    RequireAuth(_): RequireAuth,
    HxRequest(is_htmx): HxRequest,
    Path(id): Path<i64>,
) -> BlogResult<Response> {
    if !state.store().delete_post(id).await? {
        return Err(BlogError::NotFound(format!("post {id}")));
    }

    tracing::info!(post_id = id, "post deleted");
    if is_htmx {
        Ok((HxRedirect::from("/"), StatusCode::OK).into_response())
    } else {
        Ok(StatusCode::NO_CONTENT.into_response())
    }
}
