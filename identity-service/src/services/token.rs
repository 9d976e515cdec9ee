//! Signed session tokens.
//!
//! HMAC-signed JWTs carrying {principal id, email, role id} with a fixed
//! expiry. Stateless: a token is valid iff its signature checks out and it
//! has not expired; there is no token table and no revocation lookup.

use chrono::{Duration, Utc};
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use service_core::error::AppError;

use crate::config::TokenConfig;

/// Claims carried by a session token.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TokenClaims {
    /// Principal id.
    pub sub: Uuid,
    pub email: String,
    pub role_id: Uuid,
    /// Issued at (unix timestamp).
    pub iat: i64,
    /// Expiration (unix timestamp).
    pub exp: i64,
}

#[derive(Clone)]
pub struct TokenService {
    encoding_key: EncodingKey,
    decoding_key: DecodingKey,
    expiry_minutes: i64,
}

impl TokenService {
    pub fn new(config: &TokenConfig) -> Self {
        Self {
            encoding_key: EncodingKey::from_secret(config.signing_secret.as_bytes()),
            decoding_key: DecodingKey::from_secret(config.signing_secret.as_bytes()),
            expiry_minutes: config.expiry_minutes,
        }
    }

    pub fn issue(&self, principal_id: Uuid, email: &str, role_id: Uuid) -> Result<String, AppError> {
        let now = Utc::now();
        let claims = TokenClaims {
            sub: principal_id,
            email: email.to_string(),
            role_id,
            iat: now.timestamp(),
            exp: (now + Duration::minutes(self.expiry_minutes)).timestamp(),
        };

        encode(&Header::new(Algorithm::HS256), &claims, &self.encoding_key)
            .map_err(|e| AppError::Internal(anyhow::anyhow!("failed to encode token: {e}")))
    }

    /// Signature and expiry are both re-checked on every call. Any defect
    /// (bad signature, expired, malformed) collapses into the generic
    /// authentication error.
    pub fn verify(&self, token: &str) -> Result<TokenClaims, AppError> {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.validate_exp = true;
        validation.leeway = 0;

        decode::<TokenClaims>(token, &self.decoding_key, &validation)
            .map(|data| data.claims)
            .map_err(|e| {
                tracing::debug!(error = %e, "token verification failed");
                AppError::Authentication
            })
    }

    pub fn expiry_seconds(&self) -> i64 {
        self.expiry_minutes * 60
    }
}
