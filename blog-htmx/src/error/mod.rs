//! Error types and error handling

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
};
use thiserror::Error;

use crate::oauth::{OAuthError, VerificationError};

/// Application error type surfaced to HTTP clients
#[derive(Debug, Error)]
pub enum BlogError {
    /// Bad request error
    #[error("Bad request: {0}")]
    BadRequest(String),

    /// Callback `state` does not match the pending login attempt
    #[error("Bad request: login state mismatch")]
    StateMismatch,

    /// Identity provider unreachable or returned an error
    #[error("Upstream error: {0}")]
    Upstream(#[from] OAuthError),

    /// Identity token rejected
    #[error("Token verification failed: {0}")]
    Verification(#[from] VerificationError),

    /// Database error
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    /// Not Found (404)
    #[error("Not found: {0}")]
    NotFound(String),

    /// Template rendering failed
    #[error("Template error: {0}")]
    Template(#[from] askama::Error),
}

impl BlogError {
    /// HTTP status for this error
    #[must_use]
    pub const fn status_code(&self) -> StatusCode {
        match self {
            Self::BadRequest(_) | Self::StateMismatch => StatusCode::BAD_REQUEST,
            // Local failures that happen to surface through the OAuth client
            Self::Upstream(OAuthError::Entropy(_) | OAuthError::Generic(_)) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
            // An unreachable key set is the provider failing, not the token
            Self::Upstream(_) | Self::Verification(VerificationError::KeySet(_)) => {
                StatusCode::BAD_GATEWAY
            }
            Self::Verification(_) => StatusCode::UNAUTHORIZED,
            Self::NotFound(_) => StatusCode::NOT_FOUND,
            Self::Database(_) | Self::Template(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Short machine readable code, used in `?login_error=` redirects
    #[must_use]
    pub const fn code(&self) -> &'static str {
        match self {
            Self::BadRequest(_) => "bad_request",
            Self::StateMismatch => "state_mismatch",
            Self::Upstream(OAuthError::Provider { .. }) => "provider_rejected",
            Self::Upstream(_) | Self::Verification(VerificationError::KeySet(_)) => {
                "upstream_unavailable"
            }
            Self::Verification(_) => "verification_failed",
            Self::Database(_) => "database",
            Self::NotFound(_) => "not_found",
            Self::Template(_) => "template",
        }
    }
}

impl IntoResponse for BlogError {
    fn into_response(self) -> Response {
        let status = self.status_code();

        // Internal details stay in the logs
        let body = if status.is_server_error() {
            tracing::error!(error = %self, code = self.code(), "request failed");
            if status == StatusCode::BAD_GATEWAY {
                "Identity provider unavailable".to_string()
            } else {
                "Internal server error".to_string()
            }
        } else {
            tracing::debug!(error = %self, code = self.code(), "request rejected");
            self.to_string()
        };

        (status, body).into_response()
    }
}

/// Result alias for handlers
pub type BlogResult<T> = Result<T, BlogError>;
