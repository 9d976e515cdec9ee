use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use secrecy::{ExposeSecret, Secret};

use service_core::config::get_env;
use service_core::error::AppError;

#[derive(Debug, Clone, PartialEq)]
pub enum Environment {
    Dev,
    Prod,
}

impl FromStr for Environment {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "dev" => Ok(Environment::Dev),
            "prod" => Ok(Environment::Prod),
            other => Err(format!("unknown environment: {other}")),
        }
    }
}

/// Process-wide 256-bit master key, supplied at startup and passed to the
/// envelope engine as explicit configuration. Never logged, never persisted.
pub struct MasterKey(Secret<Vec<u8>>);

impl Clone for MasterKey {
    fn clone(&self) -> Self {
        Self(Secret::new(self.0.expose_secret().clone()))
    }
}

impl MasterKey {
    const LEN: usize = 32;

    /// Parse from the 64-hex-char wire form used by deployment config.
    pub fn from_hex(raw: &str) -> Result<Self, AppError> {
        let bytes = hex::decode(raw.trim())
            .map_err(|e| AppError::Internal(anyhow::anyhow!("master key is not valid hex: {e}")))?;
        Self::from_bytes(bytes)
    }

    pub fn from_bytes(bytes: Vec<u8>) -> Result<Self, AppError> {
        if bytes.len() != Self::LEN {
            return Err(AppError::Internal(anyhow::anyhow!(
                "master key must be {} bytes, got {}",
                Self::LEN,
                bytes.len()
            )));
        }
        Ok(Self(Secret::new(bytes)))
    }

    pub fn secret(&self) -> Secret<Vec<u8>> {
        Secret::new(self.0.expose_secret().clone())
    }
}

impl fmt::Debug for MasterKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("MasterKey([REDACTED])")
    }
}

#[derive(Debug, Clone)]
pub struct TokenConfig {
    pub signing_secret: String,
    pub expiry_minutes: i64,
}

#[derive(Debug, Clone)]
pub struct OtpConfig {
    /// Issuer label embedded in provisioning URIs.
    pub issuer: String,
    /// Accepted clock-skew window in 30-second steps on each side of "now".
    pub skew_steps: i64,
    /// Challenge attempts before the pending ticket is destroyed.
    pub max_attempts: u32,
}

#[derive(Debug, Clone)]
pub struct CryptoConfig {
    /// Key version newly created confidential assets are sealed under.
    /// Updates always reuse the version recorded on the asset.
    pub current_key_version: String,
}

#[derive(Debug, Clone)]
pub struct AnomalyConfig {
    pub speed_limit_kmh: f64,
    pub hijack_window_seconds: i64,
    pub failed_access_threshold: i64,
}

#[derive(Debug, Clone)]
pub struct ServiceConfig {
    pub service_name: String,
    pub log_level: String,
    pub environment: Environment,
    pub master_key: MasterKey,
    pub token: TokenConfig,
    pub otp: OtpConfig,
    pub crypto: CryptoConfig,
    pub anomaly: AnomalyConfig,
    /// Upper bound on any single credential-store, blob, or geo call.
    pub store_timeout: Duration,
}

impl ServiceConfig {
    pub fn from_env() -> Result<Self, AppError> {
        dotenvy::dotenv().ok();

        let environment: Environment = std::env::var("ENVIRONMENT")
            .unwrap_or_else(|_| "dev".to_string())
            .parse()
            .map_err(|e: String| AppError::Internal(anyhow::anyhow!(e)))?;
        let is_prod = environment == Environment::Prod;

        Ok(Self {
            service_name: get_env("SERVICE_NAME", Some("identity-service"), is_prod)?,
            log_level: get_env("LOG_LEVEL", Some("info"), is_prod)?,
            master_key: MasterKey::from_hex(&get_env("MASTER_KEY_HEX", None, is_prod)?)?,
            token: TokenConfig {
                signing_secret: get_env("TOKEN_SIGNING_SECRET", None, is_prod)?,
                expiry_minutes: parse_num(
                    get_env("TOKEN_EXPIRY_MINUTES", Some("60"), is_prod)?,
                    "TOKEN_EXPIRY_MINUTES",
                )?,
            },
            otp: OtpConfig {
                issuer: get_env("OTP_ISSUER", Some("identity-service"), is_prod)?,
                skew_steps: parse_num(get_env("OTP_SKEW_STEPS", Some("1"), is_prod)?, "OTP_SKEW_STEPS")?,
                max_attempts: parse_num(
                    get_env("OTP_MAX_ATTEMPTS", Some("5"), is_prod)?,
                    "OTP_MAX_ATTEMPTS",
                )?,
            },
            crypto: CryptoConfig {
                current_key_version: get_env("ASSET_KEY_VERSION", Some("v1"), is_prod)?,
            },
            anomaly: AnomalyConfig {
                speed_limit_kmh: parse_num(
                    get_env("ANOMALY_SPEED_LIMIT_KMH", Some("1000"), is_prod)?,
                    "ANOMALY_SPEED_LIMIT_KMH",
                )?,
                hijack_window_seconds: parse_num(
                    get_env("ANOMALY_HIJACK_WINDOW_SECONDS", Some("300"), is_prod)?,
                    "ANOMALY_HIJACK_WINDOW_SECONDS",
                )?,
                failed_access_threshold: parse_num(
                    get_env("ANOMALY_FAILED_ACCESS_THRESHOLD", Some("3"), is_prod)?,
                    "ANOMALY_FAILED_ACCESS_THRESHOLD",
                )?,
            },
            store_timeout: Duration::from_millis(parse_num(
                get_env("STORE_TIMEOUT_MS", Some("5000"), is_prod)?,
                "STORE_TIMEOUT_MS",
            )?),
            environment,
        })
    }

    /// Dev-profile configuration around an explicit key and signing secret.
    /// Used by embedders without a full environment and by tests.
    pub fn dev_defaults(master_key: MasterKey, signing_secret: String) -> Self {
        Self {
            service_name: "identity-service".to_string(),
            log_level: "info".to_string(),
            environment: Environment::Dev,
            master_key,
            token: TokenConfig {
                signing_secret,
                expiry_minutes: 60,
            },
            otp: OtpConfig {
                issuer: "identity-service".to_string(),
                skew_steps: 1,
                max_attempts: 5,
            },
            crypto: CryptoConfig {
                current_key_version: "v1".to_string(),
            },
            anomaly: AnomalyConfig {
                speed_limit_kmh: 1000.0,
                hijack_window_seconds: 300,
                failed_access_threshold: 3,
            },
            store_timeout: Duration::from_millis(5000),
        }
    }
}

fn parse_num<T>(value: String, key: &str) -> Result<T, AppError>
where
    T: FromStr,
    T::Err: fmt::Display,
{
    value
        .parse()
        .map_err(|e| AppError::Internal(anyhow::anyhow!("{key} must be numeric: {e}")))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn master_key_rejects_wrong_length() {
        assert!(MasterKey::from_hex("deadbeef").is_err());
        assert!(MasterKey::from_bytes(vec![0u8; 31]).is_err());
        assert!(MasterKey::from_bytes(vec![0u8; 32]).is_ok());
    }

    #[test]
    fn master_key_debug_is_redacted() {
        let key = MasterKey::from_bytes(vec![0x42; 32]).unwrap();
        let shown = format!("{key:?}");
        assert!(!shown.contains("42"));
        assert!(shown.contains("REDACTED"));
    }

    #[test]
    fn master_key_round_trips_hex() {
        let hex64 = "00".repeat(32);
        let key = MasterKey::from_hex(&hex64).unwrap();
        assert_eq!(key.secret().expose_secret().len(), 32);
    }
}
