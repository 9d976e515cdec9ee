//! Principal accounts.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;
use validator::Validate;

/// Principal record. Never hard-deleted; auth flows mutate the credential,
/// counter, and IP fields, and the anomaly detector reads the IP history
/// the counters feed.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Principal {
    pub principal_id: Uuid,
    pub first_name: String,
    pub last_name: String,
    pub email: String,
    pub password_hash: String,
    pub role_id: Uuid,
    /// Hex-encoded raw TOTP secret. Present from registration on, but
    /// enrollment is complete only once `mfa_enrolled_utc` is stamped by
    /// the first successful challenge.
    pub totp_secret: String,
    pub mfa_enrolled_utc: Option<DateTime<Utc>>,
    pub approved: bool,
    pub sign_in_count: i64,
    pub failed_login_attempts: i64,
    pub current_sign_in_ip: Option<String>,
    pub last_sign_in_ip: Option<String>,
    pub created_utc: DateTime<Utc>,
    pub last_login_utc: Option<DateTime<Utc>>,
}

impl Principal {
    pub fn new(
        first_name: String,
        last_name: String,
        email: String,
        password_hash: String,
        role_id: Uuid,
        totp_secret: String,
    ) -> Self {
        Self {
            principal_id: Uuid::new_v4(),
            first_name,
            last_name,
            email,
            password_hash,
            role_id,
            totp_secret,
            mfa_enrolled_utc: None,
            approved: false,
            sign_in_count: 0,
            failed_login_attempts: 0,
            current_sign_in_ip: None,
            last_sign_in_ip: None,
            created_utc: Utc::now(),
            last_login_utc: None,
        }
    }

    pub fn mfa_enrolled(&self) -> bool {
        self.mfa_enrolled_utc.is_some()
    }
}

/// Registration payload. Password content rules (digit + special character)
/// are enforced separately by `utils::validation::check_password_policy`.
#[derive(Debug, Deserialize, Validate)]
pub struct RegisterRequest {
    #[validate(length(min = 1, message = "first name is required"))]
    pub first_name: String,
    #[validate(length(min = 1, message = "last name is required"))]
    pub last_name: String,
    #[validate(email, length(max = 254))]
    pub email: String,
    #[validate(length(min = 8, max = 49))]
    pub password: String,
}
