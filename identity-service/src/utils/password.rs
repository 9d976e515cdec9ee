use argon2::{
    password_hash::{rand_core::OsRng, PasswordHash, PasswordHasher, PasswordVerifier, SaltString},
    Argon2,
};

use service_core::error::AppError;

/// Newtype for plaintext passwords to prevent accidental logging.
#[derive(Clone)]
pub struct Password(String);

impl Password {
    pub fn new(password: String) -> Self {
        Self(password)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Debug for Password {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("Password([REDACTED])")
    }
}

/// Newtype for the stored adaptive hash.
#[derive(Debug, Clone)]
pub struct PasswordHashString(String);

impl PasswordHashString {
    pub fn new(hash: String) -> Self {
        Self(hash)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn into_string(self) -> String {
        self.0
    }
}

/// Hash with Argon2id and a fresh random salt (salt is embedded in the
/// PHC-format output).
pub fn hash_password(password: &Password) -> Result<PasswordHashString, AppError> {
    let argon2 = Argon2::default();
    let salt = SaltString::generate(&mut OsRng);

    let password_hash = argon2
        .hash_password(password.as_str().as_bytes(), &salt)
        .map_err(|e| AppError::Internal(anyhow::anyhow!("password hashing failed: {e}")))?
        .to_string();

    Ok(PasswordHashString::new(password_hash))
}

/// Verify against a stored hash. A mismatch is an `Authentication` error,
/// deliberately the same value every other credential failure produces. A
/// stored hash that does not parse is an internal fault, logged with detail
/// but still surfaced generically by callers.
pub fn verify_password(
    password: &Password,
    password_hash: &PasswordHashString,
) -> Result<(), AppError> {
    let parsed_hash = PasswordHash::new(password_hash.as_str()).map_err(|e| {
        tracing::error!(error = %e, "stored password hash is malformed");
        AppError::Internal(anyhow::anyhow!("invalid password hash format"))
    })?;

    Argon2::default()
        .verify_password(password.as_str().as_bytes(), &parsed_hash)
        .map_err(|_| AppError::Authentication)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hash_produces_argon2_phc_string() {
        let password = Password::new("correct horse 7!".to_string());
        let hash = hash_password(&password).expect("hashing failed");
        assert!(hash.as_str().starts_with("$argon2"));
    }

    #[test]
    fn correct_password_verifies() {
        let password = Password::new("correct horse 7!".to_string());
        let hash = hash_password(&password).expect("hashing failed");
        assert!(verify_password(&password, &hash).is_ok());
    }

    #[test]
    fn wrong_password_fails_with_the_generic_error() {
        let password = Password::new("correct horse 7!".to_string());
        let hash = hash_password(&password).expect("hashing failed");

        let err = verify_password(&Password::new("wrong".to_string()), &hash).unwrap_err();
        assert!(matches!(err, AppError::Authentication));
    }

    #[test]
    fn same_password_hashes_differently_per_salt() {
        let password = Password::new("correct horse 7!".to_string());
        let first = hash_password(&password).expect("hashing failed");
        let second = hash_password(&password).expect("hashing failed");
        assert_ne!(first.as_str(), second.as_str());
        assert!(verify_password(&password, &first).is_ok());
        assert!(verify_password(&password, &second).is_ok());
    }

    #[test]
    fn password_debug_never_prints_the_value() {
        let password = Password::new("top secret 9?".to_string());
        assert!(!format!("{password:?}").contains("top secret"));
    }
}
