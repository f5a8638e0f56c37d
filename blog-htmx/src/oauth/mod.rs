//! OpenID Connect authorization-code login
//!
//! - [`client`]: authorization URL, code exchange and userinfo against the provider
//! - [`pending`]: per-attempt `state`, `nonce` and PKCE verifier
//! - [`verifier`]: identity token checks against the provider's key set
//! - [`jwks`]: key set fetching and caching

pub mod client;
pub mod jwks;
pub mod pending;
pub mod types;
pub mod verifier;

pub use client::{IdentityProvider, OktaClient};
pub use pending::PendingLogin;
pub use types::{
    profile_claims_from_json, Audience, IdTokenClaims, OAuthError, ProfileClaims, TokenExchange,
    VerificationError,
};
pub use verifier::{JwksVerifier, TokenVerifier};
