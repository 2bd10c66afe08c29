//! Signed download token payload.

use chrono::{DateTime, Utc};
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};

use crate::auth::Role;
use crate::{DepotError, Result};

/// Claims embedded in a download token.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DownloadClaims {
    /// File the token grants access to.
    pub file_id: String,
    /// User the token was issued to.
    pub user_id: String,
    /// Role of that user at issue time.
    #[serde(default)]
    pub role: Role,
    /// Issue time in unix milliseconds.
    pub timestamp: i64,
    /// Issued at (unix seconds).
    pub iat: u64,
    /// Expiration (unix seconds).
    pub exp: u64,
    /// Unique token id.
    pub jti: String,
}

impl DownloadClaims {
    /// Claims for a token issued now and valid for `ttl_secs`.
    pub fn new(
        file_id: impl Into<String>,
        user_id: impl Into<String>,
        role: Role,
        ttl_secs: u64,
    ) -> Self {
        let now = Utc::now();
        let iat = now.timestamp().max(0) as u64;
        Self {
            file_id: file_id.into(),
            user_id: user_id.into(),
            role,
            timestamp: now.timestamp_millis(),
            iat,
            exp: iat + ttl_secs,
            jti: uuid::Uuid::new_v4().to_string(),
        }
    }

    /// Whether the signed lifetime has ended at `now`.
    ///
    /// Matches the verifier: a token is still accepted during second `exp`.
    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        u64::try_from(now.timestamp()).map_or(true, |secs| secs > self.exp)
    }
}

/// HS256 signer and verifier for download tokens.
#[derive(Clone)]
pub struct DownloadTokenSigner {
    encoding_key: EncodingKey,
    decoding_key: DecodingKey,
    validation: Validation,
}

impl DownloadTokenSigner {
    /// Create a signer from the download secret.
    pub fn new(secret: &str) -> Self {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.validate_exp = true;
        validation.leeway = 0;
        validation.set_required_spec_claims(&["exp"]);

        Self {
            encoding_key: EncodingKey::from_secret(secret.as_bytes()),
            decoding_key: DecodingKey::from_secret(secret.as_bytes()),
            validation,
        }
    }

    /// Sign `claims` into a compact token.
    pub fn sign(&self, claims: &DownloadClaims) -> Result<String> {
        encode(&Header::new(Algorithm::HS256), claims, &self.encoding_key).map_err(|e| {
            tracing::error!("Failed to encode download token: {}", e);
            DepotError::Config(format!("cannot sign download token: {e}"))
        })
    }

    /// Verify signature and expiry and return the claims.
    pub fn verify(&self, token: &str) -> Result<DownloadClaims> {
        decode::<DownloadClaims>(token, &self.decoding_key, &self.validation)
            .map(|data| data.claims)
            .map_err(|e| {
                tracing::debug!("Download token validation failed: {}", e);
                DepotError::TokenInvalid
            })
    }
}
