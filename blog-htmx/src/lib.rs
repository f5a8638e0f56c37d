//! blog-htmx: an HTMX blog with OpenID Connect hosted login
//!
//! Browsers log in through the identity provider's authorization-code flow.
//! The verified tokens live in an encrypted cookie, an auth gate attaches the
//! caller's userinfo claims to every request, and posts are stored with SQLx.
//!
//! # Quick Start
//!
//! ```rust,no_run
//! use blog_htmx::prelude::*;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     blog_htmx::observability::init()?;
//!
//!     let config = BlogConfig::load()?;
//!     config.validate()?;
//!
//!     let store = BlogStore::connect(&config.database.url, config.database.max_connections).await?;
//!     store.migrate().await?;
//!
//!     let key = blog_htmx::session::cookie_key(&config.session)?;
//!     let addr = config.server.bind_addr();
//!     let app = blog_htmx::app(AppState::from_config(config, store, key)?);
//!
//!     let listener = tokio::net::TcpListener::bind(addr).await?;
//!     axum::serve(listener, app).await?;
//!     Ok(())
//! }
//! ```

pub mod config;
pub mod error;
pub mod handlers;
pub mod middleware;
pub mod oauth;
pub mod observability;
pub mod routes;
pub mod session;
pub mod state;
pub mod store;
pub mod template;

#[cfg(test)]
pub(crate) mod testing;

/// The application router with every route and layer
pub fn app(state: state::AppState) -> axum::Router {
    routes::router(state)
}

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::config::BlogConfig;
    pub use crate::error::{BlogError, BlogResult};
    pub use crate::middleware::{AuthContext, RequireAuth};
    pub use crate::oauth::{IdentityProvider, PendingLogin, TokenVerifier};
    pub use crate::session::{CookieSessionStore, Session};
    pub use crate::state::AppState;
    pub use crate::store::BlogStore;
}
