use service_core::error::AppError;

const SPECIAL_CHARACTERS: &str = r##"!@#$%^&*()-_=+[]{};:'",.<>/?\|`~"##;

/// Content rules on top of the length bounds the request DTO enforces:
/// at least one digit and one special character. All violations are
/// reported together.
pub fn check_password_policy(password: &str) -> Result<(), AppError> {
    let mut errors = Vec::new();

    if !password.chars().any(|c| c.is_ascii_digit()) {
        errors.push("must include at least one number");
    }
    if !password.chars().any(|c| SPECIAL_CHARACTERS.contains(c)) {
        errors.push("must include at least one special character");
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(AppError::Validation(errors.join("; ")))
    }
}
