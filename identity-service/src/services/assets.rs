//! Asset operations, parameterized over the resource class.
//!
//! One code path serves images, documents, and confidential assets; the
//! only branch is whether content goes through the envelope engine or is
//! stored plain with a content hash. The permission gate always runs
//! before the existence check, so a caller without the grant cannot use
//! error responses to probe which asset ids exist.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use sha2::{Digest, Sha256};
use uuid::Uuid;

use service_core::error::AppError;

use crate::models::{AssetAction, AssetPayload, AssetRecord, PermissionToken, ResourceClass};
use crate::services::envelope::EnvelopeEngine;
use crate::services::rbac::PermissionService;
use crate::services::token::TokenClaims;
use crate::stores::{bounded, AssetCatalog, BlobStore};

#[derive(Debug, Clone)]
pub struct CreateAssetRequest {
    pub kind: ResourceClass,
    pub file_name: Option<String>,
    pub mime_type: String,
    pub description: Option<String>,
    pub bytes: Vec<u8>,
}

/// Record plus decrypted (or raw) content bytes.
#[derive(Debug, Clone)]
pub struct AssetContent {
    pub record: AssetRecord,
    pub bytes: Vec<u8>,
}

#[derive(Clone)]
pub struct AssetService {
    catalog: Arc<dyn AssetCatalog>,
    blobs: Arc<dyn BlobStore>,
    permissions: PermissionService,
    engine: EnvelopeEngine,
    /// Version newly created confidential assets are sealed under. Updates
    /// reuse the version already on the record.
    current_key_version: String,
    store_timeout: Duration,
}

impl AssetService {
    pub fn new(
        catalog: Arc<dyn AssetCatalog>,
        blobs: Arc<dyn BlobStore>,
        permissions: PermissionService,
        engine: EnvelopeEngine,
        current_key_version: String,
        store_timeout: Duration,
    ) -> Self {
        Self {
            catalog,
            blobs,
            permissions,
            engine,
            current_key_version,
            store_timeout,
        }
    }

    pub async fn create(
        &self,
        actor: &TokenClaims,
        req: CreateAssetRequest,
    ) -> Result<AssetRecord, AppError> {
        self.require(actor, AssetAction::Create, req.kind).await?;

        if req.mime_type.trim().is_empty() {
            return Err(AppError::Validation("mime type is required".to_string()));
        }

        let asset_id = Uuid::new_v4();
        let (payload, stored) = self.prepare_payload(
            asset_id,
            req.kind,
            &self.current_key_version,
            &req.mime_type,
            &req.bytes,
        )?;

        let record = AssetRecord::new(
            asset_id,
            req.kind,
            req.file_name,
            req.mime_type,
            req.description,
            stored.len() as i64,
            payload,
            actor.sub,
        );

        // Two-step write inside one logical transaction: blob first, then
        // the record; a failed record write rolls the blob back so neither
        // side ever exists without the other.
        bounded(self.store_timeout, "blob store", self.blobs.put(asset_id, stored)).await?;
        if let Err(e) = bounded(
            self.store_timeout,
            "asset catalog",
            self.catalog.insert(&record),
        )
        .await
        {
            if let Err(cleanup) = self.blobs.delete(asset_id).await {
                tracing::error!(asset_id = %asset_id, error = %cleanup, "failed to roll back orphaned blob");
            }
            return Err(e);
        }

        tracing::info!(asset_id = %asset_id, kind = %record.kind, "asset created");
        Ok(record)
    }

    pub async fn get(
        &self,
        actor: &TokenClaims,
        kind: ResourceClass,
        asset_id: Uuid,
    ) -> Result<AssetContent, AppError> {
        self.require(actor, AssetAction::View, kind).await?;

        let record = self.fetch_live(kind, asset_id).await?;
        let stored = bounded(self.store_timeout, "blob store", self.blobs.get(asset_id))
            .await?
            .ok_or_else(|| {
                AppError::Internal(anyhow::anyhow!("asset {asset_id} has a record but no content"))
            })?;

        let bytes = match &record.payload {
            AssetPayload::Sealed {
                nonce,
                tag,
                key_version,
            } => self
                .engine
                .open(asset_id, key_version, &record.mime_type, nonce, tag, &stored)?,
            AssetPayload::Plain { sha256 } => {
                let digest = hex::encode(Sha256::digest(&stored));
                if &digest != sha256 {
                    tracing::error!(asset_id = %asset_id, "stored content does not match its recorded hash");
                    return Err(AppError::Crypto);
                }
                stored
            }
        };

        Ok(AssetContent { record, bytes })
    }

    /// Replace content. Confidential assets are re-encrypted under the key
    /// version already recorded on the asset, never a hardcoded one, so a
    /// rotation in progress is not silently undone.
    pub async fn update_content(
        &self,
        actor: &TokenClaims,
        kind: ResourceClass,
        asset_id: Uuid,
        bytes: &[u8],
    ) -> Result<AssetRecord, AppError> {
        self.require(actor, AssetAction::Update, kind).await?;

        let mut record = self.fetch_live(kind, asset_id).await?;
        let key_version = match &record.payload {
            AssetPayload::Sealed { key_version, .. } => key_version.clone(),
            AssetPayload::Plain { .. } => self.current_key_version.clone(),
        };

        let (payload, stored) =
            self.prepare_payload(asset_id, kind, &key_version, &record.mime_type, bytes)?;
        record.payload = payload;
        record.size_bytes = stored.len() as i64;
        record.updated_utc = Some(Utc::now());
        record.updated_by = Some(actor.sub);

        // Keep the old bytes so a failed record write can restore them.
        let previous = bounded(self.store_timeout, "blob store", self.blobs.get(asset_id)).await?;
        bounded(self.store_timeout, "blob store", self.blobs.put(asset_id, stored)).await?;
        if let Err(e) = bounded(
            self.store_timeout,
            "asset catalog",
            self.catalog.update(&record),
        )
        .await
        {
            if let Some(previous) = previous {
                if let Err(restore) = self.blobs.put(asset_id, previous).await {
                    tracing::error!(asset_id = %asset_id, error = %restore, "failed to restore blob after record write failure");
                }
            }
            return Err(e);
        }

        tracing::info!(asset_id = %asset_id, "asset content updated");
        Ok(record)
    }

    /// Patch descriptive fields; `None` leaves a field untouched.
    pub async fn update_metadata(
        &self,
        actor: &TokenClaims,
        kind: ResourceClass,
        asset_id: Uuid,
        description: Option<String>,
        file_name: Option<String>,
    ) -> Result<AssetRecord, AppError> {
        self.require(actor, AssetAction::Update, kind).await?;

        let mut record = self.fetch_live(kind, asset_id).await?;
        if let Some(description) = description {
            record.description = Some(description);
        }
        if let Some(file_name) = file_name {
            record.file_name = Some(file_name);
        }
        record.updated_utc = Some(Utc::now());
        record.updated_by = Some(actor.sub);

        bounded(
            self.store_timeout,
            "asset catalog",
            self.catalog.update(&record),
        )
        .await?;
        Ok(record)
    }

    /// Soft delete: the record is stamped, content is retained.
    pub async fn delete(
        &self,
        actor: &TokenClaims,
        kind: ResourceClass,
        asset_id: Uuid,
    ) -> Result<(), AppError> {
        self.require(actor, AssetAction::Delete, kind).await?;

        let mut record = self.fetch_live(kind, asset_id).await?;
        record.deleted_utc = Some(Utc::now());
        record.deleted_by = Some(actor.sub);

        bounded(
            self.store_timeout,
            "asset catalog",
            self.catalog.update(&record),
        )
        .await?;

        tracing::info!(asset_id = %asset_id, "asset soft-deleted");
        Ok(())
    }

    /// The authorization gate. Runs before any lookups, so denial never
    /// leaks whether the asset exists.
    async fn require(
        &self,
        actor: &TokenClaims,
        action: AssetAction,
        kind: ResourceClass,
    ) -> Result<(), AppError> {
        let token = PermissionToken::new(action, kind);
        if self.permissions.has_permission(actor.role_id, token).await {
            Ok(())
        } else {
            Err(AppError::Authorization(format!("missing permission {token}")))
        }
    }

    async fn fetch_live(
        &self,
        kind: ResourceClass,
        asset_id: Uuid,
    ) -> Result<AssetRecord, AppError> {
        bounded(
            self.store_timeout,
            "asset catalog",
            self.catalog.fetch(asset_id),
        )
        .await?
        .filter(|record| record.kind == kind && !record.is_deleted())
        .ok_or_else(|| AppError::NotFound("asset not found".to_string()))
    }

    fn prepare_payload(
        &self,
        asset_id: Uuid,
        kind: ResourceClass,
        key_version: &str,
        mime_type: &str,
        bytes: &[u8],
    ) -> Result<(AssetPayload, Vec<u8>), AppError> {
        if kind == ResourceClass::Confidential {
            let sealed = self.engine.seal(asset_id, key_version, mime_type, bytes)?;
            Ok((
                AssetPayload::Sealed {
                    nonce: sealed.nonce,
                    tag: sealed.tag,
                    key_version: sealed.key_version,
                },
                sealed.ciphertext,
            ))
        } else {
            let digest = hex::encode(Sha256::digest(bytes));
            Ok((AssetPayload::Plain { sha256: digest }, bytes.to_vec()))
        }
    }
}
