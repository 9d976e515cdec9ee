//! Time-based one-time passwords (RFC 6238) for the MFA challenge step.
//!
//! Codes are 6 digits over 30-second steps, HMAC-SHA1, matching what
//! standard authenticator apps generate from the provisioning URI.

use hmac::{Hmac, Mac};
use rand::RngCore;
use sha1::Sha1;
use subtle::ConstantTimeEq;

type HmacSha1 = Hmac<Sha1>;

pub const DIGITS: usize = 6;
pub const STEP_SECONDS: i64 = 30;
const SECRET_BYTES: usize = 20;

/// Enrollment material: the raw secret (hex, as persisted) and the
/// otpauth:// URI an authenticator app imports.
#[derive(Clone)]
pub struct TotpEnrollment {
    pub secret_hex: String,
    pub provisioning_uri: String,
}

impl std::fmt::Debug for TotpEnrollment {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TotpEnrollment")
            .field("secret_hex", &"[REDACTED]")
            .field("provisioning_uri", &"[REDACTED]")
            .finish()
    }
}

/// Fresh 160-bit secret from the OS CSPRNG.
pub fn generate_secret() -> Vec<u8> {
    let mut secret = vec![0u8; SECRET_BYTES];
    rand::thread_rng().fill_bytes(&mut secret);
    secret
}

pub fn enroll(issuer: &str, account: &str) -> TotpEnrollment {
    let secret = generate_secret();
    TotpEnrollment {
        secret_hex: hex::encode(&secret),
        provisioning_uri: provisioning_uri(issuer, account, &secret),
    }
}

/// otpauth:// URI; the secret is base32 here because that is the only
/// encoding authenticator apps accept.
pub fn provisioning_uri(issuer: &str, account: &str, secret: &[u8]) -> String {
    format!(
        "otpauth://totp/{issuer}:{account}?secret={}&issuer={issuer}&algorithm=SHA1&digits={DIGITS}&period={STEP_SECONDS}",
        base32_encode(secret)
    )
}

/// The time step a unix timestamp falls into.
pub fn time_step(unix_seconds: i64) -> i64 {
    unix_seconds.div_euclid(STEP_SECONDS)
}

/// The code valid at `unix_seconds`. Used by enrollment tooling and tests;
/// verification goes through [`verify_at`].
pub fn code_at(secret: &[u8], unix_seconds: i64) -> String {
    hotp(secret, time_step(unix_seconds).max(0) as u64)
}

/// Verify a submitted code against the step for `unix_seconds`, accepting
/// ±`skew_steps` of clock drift. Returns the matching step so callers can
/// enforce single use per step. Comparison is constant-time.
pub fn verify_at(secret: &[u8], code: &str, unix_seconds: i64, skew_steps: i64) -> Option<i64> {
    let code = code.trim();
    if code.len() != DIGITS || !code.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }

    let current = time_step(unix_seconds);
    for delta in -skew_steps..=skew_steps {
        let step = current + delta;
        if step < 0 {
            continue;
        }
        let expected = hotp(secret, step as u64);
        if bool::from(expected.as_bytes().ct_eq(code.as_bytes())) {
            return Some(step);
        }
    }
    None
}

/// RFC 4226 HOTP with dynamic truncation to 6 digits.
fn hotp(secret: &[u8], counter: u64) -> String {
    let mut mac = HmacSha1::new_from_slice(secret).expect("HMAC can take key of any size");
    mac.update(&counter.to_be_bytes());
    let digest = mac.finalize().into_bytes();

    let offset = (digest[digest.len() - 1] & 0x0f) as usize;
    let binary = ((digest[offset] & 0x7f) as u32) << 24
        | (digest[offset + 1] as u32) << 16
        | (digest[offset + 2] as u32) << 8
        | digest[offset + 3] as u32;

    format!("{:06}", binary % 1_000_000)
}

/// RFC 4648 base32, unpadded, for provisioning URIs only.
fn base32_encode(bytes: &[u8]) -> String {
    const ALPHABET: &[u8] = b"ABCDEFGHIJKLMNOPQRSTUVWXYZ234567";

    let mut out = String::with_capacity(bytes.len().div_ceil(5) * 8);
    let mut acc: u64 = 0;
    let mut bits: u32 = 0;
    for &byte in bytes {
        acc = (acc << 8) | u64::from(byte);
        bits += 8;
        while bits >= 5 {
            bits -= 5;
            out.push(ALPHABET[((acc >> bits) & 0x1f) as usize] as char);
        }
    }
    if bits > 0 {
        out.push(ALPHABET[((acc << (5 - bits)) & 0x1f) as usize] as char);
    }
    out
}
