//! Bearer Token Authentication
//!
//! HS256 tokens whose subject is the caller's profile id.

use axum::{
    async_trait,
    extract::FromRequestParts,
    http::{header::AUTHORIZATION, request::Parts},
};
use chrono::Utc;
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::api::AppState;
use crate::error::GovernanceError;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    pub sub: String,
    pub iat: i64,
    pub exp: i64,
}

/// The authenticated caller.
#[derive(Debug, Clone)]
pub struct AuthUser {
    pub profile_id: String,
}

pub fn issue_token(profile_id: &str, secret: &str, ttl_secs: i64) -> Result<String, GovernanceError> {
    if profile_id.trim().is_empty() {
        return Err(GovernanceError::ValidationError(
            "Profile id must not be empty".to_string(),
        ));
    }
    let now = Utc::now().timestamp();
    let claims = Claims {
        sub: profile_id.to_string(),
        iat: now,
        exp: now + ttl_secs,
    };
    encode(
        &Header::new(Algorithm::HS256),
        &claims,
        &EncodingKey::from_secret(secret.as_bytes()),
    )
    .map_err(|e| GovernanceError::CryptoError(format!("Failed to sign token: {}", e)))
}

pub fn verify_token(token: &str, secret: &str) -> Result<Claims, GovernanceError> {
    decode::<Claims>(
        token,
        &DecodingKey::from_secret(secret.as_bytes()),
        &Validation::new(Algorithm::HS256),
    )
    .map(|data| data.claims)
    .map_err(|e| GovernanceError::AuthError(format!("Invalid token: {}", e)))
}

#[async_trait]
impl FromRequestParts<AppState> for AuthUser {
    type Rejection = GovernanceError;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self, Self::Rejection> {
        let header = parts
            .headers
            .get(AUTHORIZATION)
            .and_then(|value| value.to_str().ok())
            .ok_or_else(|| GovernanceError::AuthError("Missing Authorization header".to_string()))?;

        let token = header
            .strip_prefix("Bearer ")
            .ok_or_else(|| GovernanceError::AuthError("Expected a Bearer token".to_string()))?;

        let claims = verify_token(token.trim(), &state.config.jwt_secret)?;
        debug!("Authenticated profile {}", claims.sub);
        Ok(AuthUser {
            profile_id: claims.sub,
        })
    }
}
