//! Identity token verification

use async_trait::async_trait;
use chrono::Utc;
use jsonwebtoken::{decode, decode_header, errors::ErrorKind, Validation};
use tracing::debug;

use super::jwks::JwksCache;
use super::types::{IdTokenClaims, VerificationError};
use crate::config::OAuthSettings;

/// Validates identity tokens returned by the token exchange
#[async_trait]
pub trait TokenVerifier: Send + Sync {
    /// Verify `id_token` and return its claims
    ///
    /// # Errors
    ///
    /// Returns the first failed check as a [`VerificationError`]
    async fn verify(
        &self,
        id_token: &str,
        expected_nonce: &str,
    ) -> Result<IdTokenClaims, VerificationError>;
}

/// Verifier backed by the provider's key set
#[derive(Debug)]
pub struct JwksVerifier {
    keys: JwksCache,
    issuer: String,
    client_id: String,
    leeway_secs: u64,
}

impl JwksVerifier {
    /// Verifier fetching keys from the configured key set URL
    #[must_use]
    pub fn new(settings: &OAuthSettings, http_client: reqwest::Client) -> Self {
        Self::with_keys(settings, JwksCache::remote(settings.keys_url(), http_client))
    }

    /// Verifier over an explicit key cache
    #[must_use]
    pub fn with_keys(settings: &OAuthSettings, keys: JwksCache) -> Self {
        Self {
            keys,
            issuer: settings.issuer.clone(),
            client_id: settings.client_id.clone(),
            leeway_secs: settings.clock_skew_secs,
        }
    }

    fn signature_error(kind: &ErrorKind) -> VerificationError {
        match kind {
            ErrorKind::InvalidSignature | ErrorKind::InvalidAlgorithm => {
                VerificationError::Signature
            }
            other => VerificationError::Malformed(format!("{other:?}")),
        }
    }

    fn check_claims(
        &self,
        claims: &IdTokenClaims,
        expected_nonce: &str,
        now: i64,
    ) -> Result<(), VerificationError> {
        if claims.iss != self.issuer {
            return Err(VerificationError::Issuer);
        }
        if !claims.aud.contains(&self.client_id) {
            return Err(VerificationError::Audience);
        }
        let leeway = i64::try_from(self.leeway_secs).unwrap_or(0);
        if claims.exp.saturating_add(leeway) < now {
            return Err(VerificationError::Expired);
        }
        let nonce_matches = claims
            .nonce
            .as_deref()
            .is_some_and(|nonce| nonce.as_bytes() == expected_nonce.as_bytes());
        if !nonce_matches {
            return Err(VerificationError::NonceMismatch);
        }
        Ok(())
    }
}

#[async_trait]
impl TokenVerifier for JwksVerifier {
    async fn verify(
        &self,
        id_token: &str,
        expected_nonce: &str,
    ) -> Result<IdTokenClaims, VerificationError> {
        let header =
            decode_header(id_token).map_err(|e| VerificationError::Malformed(e.to_string()))?;

        debug!(kid = ?header.kid, alg = ?header.alg, "Verifying identity token");

        let signing_key = self.keys.get_key(header.kid.as_deref()).await?;
        if header.alg != signing_key.algorithm {
            return Err(VerificationError::Signature);
        }

        // Claims are checked below so failures come out in a fixed order
        let mut validation = Validation::new(signing_key.algorithm);
        validation.validate_exp = false;
        validation.validate_aud = false;
        validation.required_spec_claims.clear();

        let token_data = decode::<IdTokenClaims>(id_token, &signing_key.key, &validation)
            .map_err(|e| Self::signature_error(e.kind()))?;

        self.check_claims(&token_data.claims, expected_nonce, Utc::now().timestamp())?;

        debug!(sub = %token_data.claims.sub, "Identity token verified");
        Ok(token_data.claims)
    }
}
