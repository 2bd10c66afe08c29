//! JWT authentication middleware.
//!
//! Identity is issued elsewhere; this service only verifies bearer tokens
//! and turns their claims into a [`CurrentUser`].

use axum::{
    async_trait,
    body::Body,
    extract::FromRequestParts,
    http::{header::AUTHORIZATION, request::Parts, HeaderMap, Request},
    middleware::Next,
    response::Response,
};
use jsonwebtoken::{decode, DecodingKey, Validation};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use crate::auth::{CurrentUser, Role};
use crate::web::error::ApiError;

/// Header accepted as an alternative to `Authorization: Bearer`.
pub const TOKEN_HEADER: &str = "token";

/// JWT claims structure.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JwtClaims {
    /// Subject (user ID).
    pub sub: String,
    /// User role (`user`, `moderator` or `admin`).
    #[serde(default)]
    pub role: String,
    /// Issued at timestamp.
    pub iat: u64,
    /// Expiration timestamp.
    pub exp: u64,
    /// JWT ID.
    #[serde(default)]
    pub jti: Option<String>,
}

impl JwtClaims {
    /// Claims for `sub` valid for `ttl_secs` from now.
    pub fn new(sub: impl Into<String>, role: Role, ttl_secs: u64) -> Self {
        let iat = chrono::Utc::now().timestamp().max(0) as u64;
        Self {
            sub: sub.into(),
            role: role.as_str().to_string(),
            iat,
            exp: iat + ttl_secs,
            jti: Some(uuid::Uuid::new_v4().to_string()),
        }
    }

    /// The authenticated caller. Unknown roles degrade to `user`.
    pub fn current_user(&self) -> CurrentUser {
        let role = self.role.parse::<Role>().unwrap_or_default();
        CurrentUser::new(self.sub.clone(), role)
    }
}

/// Application state for JWT authentication.
#[derive(Clone)]
pub struct JwtState {
    /// Decoding key for JWT verification.
    pub decoding_key: DecodingKey,
    /// Validation settings.
    pub validation: Validation,
}

impl JwtState {
    /// Create a new JWT state from a secret key.
    pub fn new(secret: &str) -> Self {
        let decoding_key = DecodingKey::from_secret(secret.as_bytes());
        let mut validation = Validation::default();
        validation.validate_exp = true;

        Self {
            decoding_key,
            validation,
        }
    }

    fn verify(&self, token: &str) -> Result<JwtClaims, jsonwebtoken::errors::Error> {
        decode::<JwtClaims>(token, &self.decoding_key, &self.validation).map(|data| data.claims)
    }
}

fn bearer_token(headers: &HeaderMap) -> Option<&str> {
    if let Some(token) = headers
        .get(AUTHORIZATION)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.strip_prefix("Bearer "))
    {
        return Some(token.trim());
    }
    headers
        .get(TOKEN_HEADER)
        .and_then(|value| value.to_str().ok())
        .map(str::trim)
        .filter(|t| !t.is_empty())
}

/// Extractor for authenticated users.
#[derive(Debug, Clone)]
pub struct AuthUser(pub CurrentUser);

#[async_trait]
impl<S> FromRequestParts<S> for AuthUser
where
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let token = bearer_token(&parts.headers)
            .ok_or_else(|| ApiError::unauthorized("Missing authorization"))?;

        let jwt_state = parts
            .extensions
            .get::<Arc<JwtState>>()
            .ok_or_else(|| ApiError::internal("JWT state not configured"))?;

        let claims = jwt_state.verify(token).map_err(|e| {
            tracing::debug!("JWT validation failed: {}", e);
            ApiError::unauthorized("Invalid or expired token")
        })?;

        Ok(AuthUser(claims.current_user()))
    }
}

/// Like [`AuthUser`] but yields `None` instead of rejecting.
#[derive(Debug, Clone)]
pub struct OptionalAuthUser(pub Option<CurrentUser>);

#[async_trait]
impl<S> FromRequestParts<S> for OptionalAuthUser
where
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let user = match (
            bearer_token(&parts.headers),
            parts.extensions.get::<Arc<JwtState>>(),
        ) {
            (Some(token), Some(state)) => state.verify(token).ok().map(|c| c.current_user()),
            _ => None,
        };
        Ok(OptionalAuthUser(user))
    }
}

/// Middleware function to inject JWT state into request extensions.
pub async fn jwt_auth(
    jwt_state: Arc<JwtState>,
    mut request: Request<Body>,
    next: Next,
) -> Response {
    request.extensions_mut().insert(jwt_state);
    next.run(request).await
}
