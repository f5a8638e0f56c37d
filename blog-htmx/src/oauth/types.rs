//! OAuth2 / OpenID Connect types

use std::collections::BTreeMap;

use oauth2::basic::{
    BasicErrorResponse, BasicRevocationErrorResponse, BasicTokenIntrospectionResponse,
    BasicTokenType,
};
use oauth2::{
    Client, EndpointNotSet, EndpointSet, ExtraTokenFields, StandardRevocableToken,
    StandardTokenResponse,
};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Extra token response field carrying the OpenID Connect identity token
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct IdTokenFields {
    /// Signed identity token, absent for plain OAuth2 responses
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id_token: Option<String>,
}

impl ExtraTokenFields for IdTokenFields {}

/// Token endpoint response with the identity token
pub type IdTokenResponse = StandardTokenResponse<IdTokenFields, BasicTokenType>;

/// Configured OAuth2 client type with auth and token URLs set
pub type ConfiguredClient = Client<
    BasicErrorResponse,
    IdTokenResponse,
    BasicTokenIntrospectionResponse,
    StandardRevocableToken,
    BasicRevocationErrorResponse,
    EndpointSet,    // HasAuthUrl
    EndpointNotSet, // HasDeviceAuthUrl
    EndpointNotSet, // HasIntrospectionUrl
    EndpointNotSet, // HasRevocationUrl
    EndpointSet,    // HasTokenUrl
>;

/// Errors talking to the identity provider
#[derive(Debug, Error)]
pub enum OAuthError {
    /// Network failure, timeout or connection refused
    #[error("Transport error: {0}")]
    Transport(String),

    /// Response body was not the expected JSON
    #[error("Failed to decode provider response: {0}")]
    Decode(String),

    /// Provider answered with an OAuth error
    #[error("Provider error: {error}: {description}")]
    Provider {
        /// OAuth error code, e.g. `invalid_grant`
        error: String,
        /// Human readable description
        description: String,
    },

    /// Token response lacks an `id_token`
    #[error("Token response did not include an id_token")]
    MissingIdToken,

    /// Userinfo endpoint returned a non-success status
    #[error("Userinfo request failed: {0}")]
    UserInfo(String),

    /// Random source failed
    #[error("Failed to gather randomness: {0}")]
    Entropy(String),

    /// Generic error (bad URLs and similar)
    #[error("OAuth2 error: {0}")]
    Generic(String),
}

impl From<reqwest::Error> for OAuthError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_decode() {
            Self::Decode(err.to_string())
        } else {
            Self::Transport(err.to_string())
        }
    }
}

/// Reasons an identity token is rejected
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum VerificationError {
    /// Token is not a decodable JWT
    #[error("malformed token: {0}")]
    Malformed(String),

    /// No signing key matches the token header
    #[error("no signing key for kid {0:?}")]
    UnknownKey(Option<String>),

    /// Signature or algorithm check failed
    #[error("invalid signature")]
    Signature,

    /// `iss` does not match the configured issuer
    #[error("issuer mismatch")]
    Issuer,

    /// `aud` does not contain the client id
    #[error("audience mismatch")]
    Audience,

    /// Token expired
    #[error("token expired")]
    Expired,

    /// `nonce` claim differs from the login attempt
    #[error("nonce mismatch")]
    NonceMismatch,

    /// Key set could not be fetched or parsed
    #[error("key set unavailable: {0}")]
    KeySet(String),
}

/// Tokens from a successful code exchange
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct TokenExchange {
    /// Access token for the userinfo endpoint
    #[serde(default)]
    pub access_token: String,

    /// Token type, normally `Bearer`
    #[serde(default)]
    pub token_type: String,

    /// Access token lifetime in seconds
    #[serde(default)]
    pub expires_in: i64,

    /// Granted scopes
    #[serde(default)]
    pub scope: String,

    /// Signed identity token
    #[serde(default)]
    pub id_token: String,
}

/// Userinfo claims, name to display value
pub type ProfileClaims = BTreeMap<String, String>;

/// Flatten a userinfo JSON object into [`ProfileClaims`]
///
/// Strings are kept as is, booleans and numbers are rendered, nested values
/// and nulls are dropped.
#[must_use]
pub fn profile_claims_from_json(value: &serde_json::Value) -> ProfileClaims {
    let Some(object) = value.as_object() else {
        return ProfileClaims::new();
    };

    object
        .iter()
        .filter_map(|(name, value)| {
            let rendered = match value {
                serde_json::Value::String(s) => s.clone(),
                serde_json::Value::Bool(b) => b.to_string(),
                serde_json::Value::Number(n) => n.to_string(),
                _ => return None,
            };
            Some((name.clone(), rendered))
        })
        .collect()
}

/// `aud` claim, a single string or a list
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(untagged)]
pub enum Audience {
    /// Claim absent
    #[default]
    None,
    /// Single audience
    Single(String),
    /// Several audiences
    Multiple(Vec<String>),
}

impl Audience {
    /// Whether `client_id` is among the audiences
    #[must_use]
    pub fn contains(&self, client_id: &str) -> bool {
        match self {
            Self::None => false,
            Self::Single(aud) => aud == client_id,
            Self::Multiple(auds) => auds.iter().any(|aud| aud == client_id),
        }
    }
}

/// Verified identity token claims
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct IdTokenClaims {
    /// Issuer
    #[serde(default)]
    pub iss: String,

    /// Subject
    #[serde(default)]
    pub sub: String,

    /// Audience
    #[serde(default)]
    pub aud: Audience,

    /// Expiry (seconds since epoch)
    #[serde(default)]
    pub exp: i64,

    /// Issued at
    #[serde(default)]
    pub iat: i64,

    /// Replay protection value from the authorization request
    #[serde(default)]
    pub nonce: Option<String>,

    /// Email
    #[serde(default)]
    pub email: Option<String>,

    /// Display name
    #[serde(default)]
    pub name: Option<String>,

    /// Everything else
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}
