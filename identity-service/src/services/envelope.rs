//! Envelope encryption for confidential asset content.
//!
//! Threat model: storage-layer compromise. Content is sealed under a
//! per-asset data key derived from an injected process-wide master key;
//! data keys are re-derived on demand and never persisted. Ciphertext is
//! bound to the asset's identity and mime type through the AEAD associated
//! data, so ciphertext or metadata substituted across assets fails
//! authentication instead of decrypting.

use aes_gcm::aead::{Aead, KeyInit, Payload};
use aes_gcm::{Aes256Gcm, Key, Nonce};
use hkdf::Hkdf;
use rand::RngCore;
use secrecy::{ExposeSecret, Secret};
use sha2::Sha256;
use uuid::Uuid;
use zeroize::Zeroize;

use service_core::error::AppError;

pub const NONCE_BYTES: usize = 12;
pub const TAG_BYTES: usize = 16;
const KEY_BYTES: usize = 32;

/// Ciphertext plus the envelope metadata persisted alongside the record.
#[derive(Clone)]
pub struct SealedContent {
    pub ciphertext: Vec<u8>,
    pub nonce: Vec<u8>,
    pub tag: Vec<u8>,
    pub key_version: String,
}

pub struct EnvelopeEngine {
    master_key: Secret<Vec<u8>>,
}

impl Clone for EnvelopeEngine {
    fn clone(&self) -> Self {
        Self {
            master_key: Secret::new(self.master_key.expose_secret().clone()),
        }
    }
}

impl EnvelopeEngine {
    /// The master key is injected configuration; it must be exactly 32
    /// bytes.
    pub fn new(master_key: Secret<Vec<u8>>) -> Result<Self, AppError> {
        if master_key.expose_secret().len() != KEY_BYTES {
            return Err(AppError::Internal(anyhow::anyhow!(
                "master key must be {KEY_BYTES} bytes, got {}",
                master_key.expose_secret().len()
            )));
        }
        Ok(Self { master_key })
    }

    /// HKDF-SHA256(master, salt = asset id, info = "asset-data:<version>").
    /// Deterministic: identical inputs always reproduce the same key, which
    /// is why no data key ever needs storing.
    fn derive_data_key(&self, asset_id: Uuid, key_version: &str) -> [u8; KEY_BYTES] {
        let salt = asset_id.to_string();
        let hk = Hkdf::<Sha256>::new(Some(salt.as_bytes()), self.master_key.expose_secret());

        let mut okm = [0u8; KEY_BYTES];
        let info = format!("asset-data:{key_version}");
        hk.expand(info.as_bytes(), &mut okm)
            .expect("32 bytes is a valid HKDF-SHA256 output length");
        okm
    }

    fn associated_data(asset_id: Uuid, mime_type: &str) -> Vec<u8> {
        format!("{asset_id}|confidential|{mime_type}").into_bytes()
    }

    /// Encrypt under a fresh random nonce. The returned tag is detached so
    /// the record can store ciphertext, nonce, and tag as separate fields.
    pub fn seal(
        &self,
        asset_id: Uuid,
        key_version: &str,
        mime_type: &str,
        plaintext: &[u8],
    ) -> Result<SealedContent, AppError> {
        let mut data_key = self.derive_data_key(asset_id, key_version);
        let cipher = Aes256Gcm::new(Key::<Aes256Gcm>::from_slice(&data_key));

        let mut nonce = [0u8; NONCE_BYTES];
        rand::thread_rng().fill_bytes(&mut nonce);

        let aad = Self::associated_data(asset_id, mime_type);
        let sealed = cipher.encrypt(
            Nonce::from_slice(&nonce),
            Payload {
                msg: plaintext,
                aad: &aad,
            },
        );
        data_key.zeroize();

        let mut sealed = sealed.map_err(|_| {
            tracing::error!(asset_id = %asset_id, "envelope encryption failed");
            AppError::Crypto
        })?;

        // aes-gcm appends the tag to the ciphertext; detach it.
        let tag = sealed.split_off(sealed.len() - TAG_BYTES);
        Ok(SealedContent {
            ciphertext: sealed,
            nonce: nonce.to_vec(),
            tag,
            key_version: key_version.to_string(),
        })
    }

    /// Re-derive the data key from the stored key version and verify the
    /// tag before releasing any plaintext. Wrong tag, wrong nonce, wrong
    /// AAD, wrong key version: all collapse into the same generic error,
    /// with the distinction logged internally only.
    pub fn open(
        &self,
        asset_id: Uuid,
        key_version: &str,
        mime_type: &str,
        nonce: &[u8],
        tag: &[u8],
        ciphertext: &[u8],
    ) -> Result<Vec<u8>, AppError> {
        if nonce.len() != NONCE_BYTES || tag.len() != TAG_BYTES {
            tracing::error!(asset_id = %asset_id, "malformed envelope metadata");
            return Err(AppError::Crypto);
        }

        let mut data_key = self.derive_data_key(asset_id, key_version);
        let cipher = Aes256Gcm::new(Key::<Aes256Gcm>::from_slice(&data_key));

        let mut sealed = Vec::with_capacity(ciphertext.len() + TAG_BYTES);
        sealed.extend_from_slice(ciphertext);
        sealed.extend_from_slice(tag);

        let aad = Self::associated_data(asset_id, mime_type);
        let opened = cipher.decrypt(
            Nonce::from_slice(nonce),
            Payload {
                msg: &sealed,
                aad: &aad,
            },
        );
        data_key.zeroize();

        opened.map_err(|_| {
            tracing::warn!(asset_id = %asset_id, "envelope authentication failed");
            AppError::Crypto
        })
    }
}
