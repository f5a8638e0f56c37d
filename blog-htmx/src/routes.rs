//! Router assembly

use std::time::Duration;

use axum::{
    middleware,
    routing::{get, post},
    Router,
};
use tower_http::{services::ServeDir, timeout::TimeoutLayer, trace::TraceLayer};

use crate::handlers::{auth, health, pages, posts_api};
use crate::middleware::auth_gate;
use crate::state::AppState;

/// All application routes
///
/// Page, auth and API routes run behind the auth gate; `/static` and
/// `/health` do not.
pub fn router(state: AppState) -> Router {
    let gated = Router::new()
        .route("/", get(pages::index))
        .route("/profile", get(pages::profile))
        .route("/new", get(pages::new_post_form))
        .route("/new/insert", post(pages::insert_post))
        .route("/edit", get(pages::edit_post_form).post(pages::update_post))
        .route("/posts", get(posts_api::list).post(posts_api::create))
        .route(
            "/posts/{id}",
            get(posts_api::show)
                .patch(posts_api::update)
                .delete(posts_api::delete),
        )
        .route("/login", get(auth::login))
        .route("/logout", get(auth::logout))
        .route("/authorization-code/callback", get(auth::callback))
        .layer(middleware::from_fn_with_state(state.clone(), auth_gate));

    let request_timeout = Duration::from_millis(state.config().server.request_timeout_ms);
    let static_dir = state.config().static_files.dir.clone();

    gated
        .route("/health", get(health))
        .nest_service("/static", ServeDir::new(static_dir))
        .layer(TraceLayer::new_for_http())
        .layer(TimeoutLayer::new(request_timeout))
        .with_state(state)
}
