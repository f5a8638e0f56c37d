//! JSON Web Key Set fetching and caching

use std::collections::HashMap;
use std::str::FromStr;

use jsonwebtoken::{Algorithm, DecodingKey};
use parking_lot::RwLock;
use serde::Deserialize;
use tracing::{debug, info, warn};

use super::types::VerificationError;

/// Key set document published by the provider
#[derive(Debug, Deserialize)]
pub struct Jwks {
    /// Published keys
    pub keys: Vec<Jwk>,
}

/// Individual JSON Web Key
#[derive(Debug, Deserialize)]
pub struct Jwk {
    /// Key type (RSA, EC)
    pub kty: String,
    /// Key ID
    pub kid: Option<String>,
    /// Algorithm
    pub alg: Option<String>,
    /// Key use (sig, enc)
    #[serde(rename = "use")]
    pub key_use: Option<String>,
    /// RSA modulus (base64url)
    pub n: Option<String>,
    /// RSA exponent (base64url)
    pub e: Option<String>,
    /// EC curve
    pub crv: Option<String>,
    /// EC x coordinate (base64url)
    pub x: Option<String>,
    /// EC y coordinate (base64url)
    pub y: Option<String>,
}

/// A usable verification key
#[derive(Clone)]
pub struct SigningKey {
    /// Key material
    pub key: DecodingKey,
    /// Algorithm the key signs with
    pub algorithm: Algorithm,
}

impl std::fmt::Debug for SigningKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SigningKey")
            .field("algorithm", &self.algorithm)
            .finish_non_exhaustive()
    }
}

impl Jwk {
    fn algorithm(&self) -> Result<Algorithm, String> {
        if let Some(alg) = &self.alg {
            return Algorithm::from_str(alg).map_err(|e| format!("unsupported alg {alg}: {e}"));
        }
        match (self.kty.as_str(), self.crv.as_deref()) {
            ("RSA", _) => Ok(Algorithm::RS256),
            ("EC", Some("P-256")) => Ok(Algorithm::ES256),
            ("EC", Some("P-384")) => Ok(Algorithm::ES384),
            (kty, crv) => Err(format!("cannot infer algorithm for {kty} {crv:?}")),
        }
    }

    /// Convert to a [`SigningKey`]
    ///
    /// # Errors
    ///
    /// Returns a description of the problem for unsupported or incomplete keys
    pub fn to_signing_key(&self) -> Result<SigningKey, String> {
        let algorithm = self.algorithm()?;
        let key = match self.kty.as_str() {
            "RSA" => {
                let n = self.n.as_deref().ok_or("RSA key missing 'n'")?;
                let e = self.e.as_deref().ok_or("RSA key missing 'e'")?;
                DecodingKey::from_rsa_components(n, e).map_err(|e| e.to_string())?
            }
            "EC" => {
                let x = self.x.as_deref().ok_or("EC key missing 'x'")?;
                let y = self.y.as_deref().ok_or("EC key missing 'y'")?;
                DecodingKey::from_ec_components(x, y).map_err(|e| e.to_string())?
            }
            kty => return Err(format!("unsupported key type {kty}")),
        };
        Ok(SigningKey { key, algorithm })
    }
}

/// Cache of signing keys by `kid`
///
/// Lookups that miss trigger at most one refresh from the key set URL. A
/// cache built with [`JwksCache::fixed`] never refreshes.
#[derive(Debug)]
pub struct JwksCache {
    keys: RwLock<HashMap<Option<String>, SigningKey>>,
    jwks_url: Option<String>,
    http_client: reqwest::Client,
}

impl JwksCache {
    /// Cache that loads keys lazily from `jwks_url`
    #[must_use]
    pub fn remote(jwks_url: String, http_client: reqwest::Client) -> Self {
        Self {
            keys: RwLock::new(HashMap::new()),
            jwks_url: Some(jwks_url),
            http_client,
        }
    }

    /// Cache with a fixed set of keys
    #[must_use]
    pub fn fixed(keys: impl IntoIterator<Item = (Option<String>, SigningKey)>) -> Self {
        Self {
            keys: RwLock::new(keys.into_iter().collect()),
            jwks_url: None,
            http_client: reqwest::Client::new(),
        }
    }

    fn lookup(&self, kid: Option<&str>) -> Option<SigningKey> {
        let keys = self.keys.read();
        if let Some(found) = keys.get(&kid.map(ToString::to_string)) {
            return Some(found.clone());
        }
        // A token without kid is accepted only against a single-key set
        if kid.is_none() && keys.len() == 1 {
            return keys.values().next().cloned();
        }
        None
    }

    /// Find the key for `kid`, refreshing once on a miss
    ///
    /// # Errors
    ///
    /// Returns [`VerificationError::UnknownKey`] if no key matches after the
    /// refresh, or [`VerificationError::KeySet`] if the refresh fails
    pub async fn get_key(&self, kid: Option<&str>) -> Result<SigningKey, VerificationError> {
        if let Some(key) = self.lookup(kid) {
            return Ok(key);
        }

        if self.jwks_url.is_none() {
            return Err(VerificationError::UnknownKey(kid.map(ToString::to_string)));
        }

        debug!(kid = ?kid, "Key not found in cache, refreshing JWKS");
        self.refresh().await?;

        self.lookup(kid)
            .ok_or_else(|| VerificationError::UnknownKey(kid.map(ToString::to_string)))
    }

    /// Replace the cached keys with the current key set
    ///
    /// # Errors
    ///
    /// Returns [`VerificationError::KeySet`] if the endpoint is unreachable,
    /// answers with an error status or publishes no usable signing key
    pub async fn refresh(&self) -> Result<(), VerificationError> {
        let Some(url) = &self.jwks_url else {
            return Ok(());
        };

        debug!(url = %url, "Fetching JWKS");
        let response = self
            .http_client
            .get(url)
            .send()
            .await
            .map_err(|e| VerificationError::KeySet(e.to_string()))?;

        if !response.status().is_success() {
            return Err(VerificationError::KeySet(format!(
                "JWKS endpoint returned status {}",
                response.status()
            )));
        }

        let jwks: Jwks = response
            .json()
            .await
            .map_err(|e| VerificationError::KeySet(e.to_string()))?;

        let new_keys = Self::signing_keys(jwks);
        if new_keys.is_empty() {
            return Err(VerificationError::KeySet(
                "no valid signing keys found in JWKS".to_string(),
            ));
        }

        let key_count = new_keys.len();
        *self.keys.write() = new_keys;
        info!(url = %url, key_count, "JWKS cache refreshed");

        Ok(())
    }

    fn signing_keys(jwks: Jwks) -> HashMap<Option<String>, SigningKey> {
        let mut keys = HashMap::new();
        for jwk in jwks.keys {
            // Skip encryption keys
            if jwk.key_use.as_deref() == Some("enc") {
                continue;
            }

            match jwk.to_signing_key() {
                Ok(key) => {
                    debug!(kid = ?jwk.kid, kty = %jwk.kty, "Loaded JWK");
                    keys.insert(jwk.kid, key);
                }
                Err(error) => {
                    warn!(kid = ?jwk.kid, kty = %jwk.kty, %error, "Failed to parse JWK, skipping");
                }
            }
        }
        keys
    }
}
