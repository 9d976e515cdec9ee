//! Asset records.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::models::role::ResourceClass;

/// What the record knows about its content. The bytes themselves live in
/// blob storage under the asset id; the record carries only integrity or
/// decryption metadata. A record is plaintext-with-hash or
/// ciphertext-with-envelope; the enum makes holding both unrepresentable.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "state", rename_all = "lowercase")]
pub enum AssetPayload {
    Plain {
        /// Hex SHA-256 of the stored content.
        sha256: String,
    },
    Sealed {
        nonce: Vec<u8>,
        tag: Vec<u8>,
        key_version: String,
    },
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AssetRecord {
    pub asset_id: Uuid,
    pub kind: ResourceClass,
    pub file_name: Option<String>,
    pub mime_type: String,
    pub description: Option<String>,
    /// Length of the stored bytes (ciphertext length for sealed assets).
    pub size_bytes: i64,
    pub payload: AssetPayload,
    pub created_utc: DateTime<Utc>,
    pub created_by: Uuid,
    pub updated_utc: Option<DateTime<Utc>>,
    pub updated_by: Option<Uuid>,
    pub deleted_utc: Option<DateTime<Utc>>,
    pub deleted_by: Option<Uuid>,
}

impl AssetRecord {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        asset_id: Uuid,
        kind: ResourceClass,
        file_name: Option<String>,
        mime_type: String,
        description: Option<String>,
        size_bytes: i64,
        payload: AssetPayload,
        created_by: Uuid,
    ) -> Self {
        Self {
            asset_id,
            kind,
            file_name,
            mime_type,
            description,
            size_bytes,
            payload,
            created_utc: Utc::now(),
            created_by,
            updated_utc: None,
            updated_by: None,
            deleted_utc: None,
            deleted_by: None,
        }
    }

    pub fn is_deleted(&self) -> bool {
        self.deleted_utc.is_some()
    }

    pub fn is_confidential(&self) -> bool {
        self.kind == ResourceClass::Confidential
    }
}
