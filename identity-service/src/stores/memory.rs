//! In-memory reference implementations of the store traits, used by the
//! test suites and by embedders that wire real persistence in later.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use uuid::Uuid;

use service_core::error::AppError;

use crate::models::{AssetRecord, AuditEvent, Principal, Role};
use crate::stores::{
    AssetCatalog, AuditLedger, BlobStore, CredentialStore, GeoPoint, GeoResolver,
};

fn principal_not_found() -> AppError {
    AppError::NotFound("principal not found".to_string())
}

#[derive(Default)]
pub struct MemoryCredentialStore {
    principals: DashMap<Uuid, Principal>,
    roles: DashMap<Uuid, Role>,
    /// role_id -> serialized permission map. Each entry is replaced whole,
    /// so reads always see a complete map.
    permissions: DashMap<Uuid, String>,
}

impl MemoryCredentialStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl CredentialStore for MemoryCredentialStore {
    async fn get_principal_by_email(&self, email: &str) -> Result<Option<Principal>, AppError> {
        Ok(self
            .principals
            .iter()
            .find(|entry| entry.value().email.eq_ignore_ascii_case(email))
            .map(|entry| entry.value().clone()))
    }

    async fn get_principal_by_id(&self, principal_id: Uuid) -> Result<Option<Principal>, AppError> {
        Ok(self.principals.get(&principal_id).map(|p| p.clone()))
    }

    async fn insert_principal(&self, principal: &Principal) -> Result<(), AppError> {
        // Unique-email behaves like the index the real store enforces.
        if self
            .principals
            .iter()
            .any(|entry| entry.value().email.eq_ignore_ascii_case(&principal.email))
        {
            return Err(AppError::Conflict("email already registered".to_string()));
        }
        self.principals
            .insert(principal.principal_id, principal.clone());
        Ok(())
    }

    async fn list_principals(&self) -> Result<Vec<Principal>, AppError> {
        Ok(self
            .principals
            .iter()
            .map(|entry| entry.value().clone())
            .collect())
    }

    async fn set_totp_secret(&self, principal_id: Uuid, secret_hex: &str) -> Result<(), AppError> {
        let mut principal = self
            .principals
            .get_mut(&principal_id)
            .ok_or_else(principal_not_found)?;
        principal.totp_secret = secret_hex.to_string();
        // A fresh secret restarts enrollment.
        principal.mfa_enrolled_utc = None;
        Ok(())
    }

    async fn mark_mfa_enrolled(
        &self,
        principal_id: Uuid,
        at: DateTime<Utc>,
    ) -> Result<(), AppError> {
        let mut principal = self
            .principals
            .get_mut(&principal_id)
            .ok_or_else(principal_not_found)?;
        principal.mfa_enrolled_utc = Some(at);
        Ok(())
    }

    async fn record_login_success(
        &self,
        principal_id: Uuid,
        origin_ip: &str,
    ) -> Result<(), AppError> {
        let mut principal = self
            .principals
            .get_mut(&principal_id)
            .ok_or_else(principal_not_found)?;
        principal.failed_login_attempts = 0;
        principal.sign_in_count += 1;
        let previous_ip = principal.current_sign_in_ip.take();
        principal.last_sign_in_ip = previous_ip;
        principal.current_sign_in_ip = Some(origin_ip.to_string());
        principal.last_login_utc = Some(Utc::now());
        Ok(())
    }

    async fn record_otp_failure(&self, principal_id: Uuid) -> Result<(), AppError> {
        let mut principal = self
            .principals
            .get_mut(&principal_id)
            .ok_or_else(principal_not_found)?;
        principal.failed_login_attempts += 1;
        Ok(())
    }

    async fn approve_principal(&self, principal_id: Uuid) -> Result<(), AppError> {
        let mut principal = self
            .principals
            .get_mut(&principal_id)
            .ok_or_else(principal_not_found)?;
        principal.approved = true;
        Ok(())
    }

    async fn set_role(&self, principal_id: Uuid, role_id: Uuid) -> Result<(), AppError> {
        let mut principal = self
            .principals
            .get_mut(&principal_id)
            .ok_or_else(principal_not_found)?;
        principal.role_id = role_id;
        Ok(())
    }

    async fn insert_role(&self, role: &Role) -> Result<(), AppError> {
        self.roles.insert(role.role_id, role.clone());
        Ok(())
    }

    async fn get_role_by_id(&self, role_id: Uuid) -> Result<Option<Role>, AppError> {
        Ok(self.roles.get(&role_id).map(|r| r.clone()))
    }

    async fn get_role_by_name(&self, name: &str) -> Result<Option<Role>, AppError> {
        Ok(self
            .roles
            .iter()
            .find(|entry| entry.value().role_name == name)
            .map(|entry| entry.value().clone()))
    }

    async fn read_permissions(&self, role_id: Uuid) -> Result<Option<String>, AppError> {
        Ok(self.permissions.get(&role_id).map(|p| p.clone()))
    }

    async fn write_permissions(&self, role_id: Uuid, serialized: &str) -> Result<(), AppError> {
        if !self.roles.contains_key(&role_id) {
            return Err(AppError::NotFound("role not found".to_string()));
        }
        self.permissions.insert(role_id, serialized.to_string());
        Ok(())
    }
}

#[derive(Default)]
pub struct MemoryAuditLedger {
    events: DashMap<Uuid, Vec<AuditEvent>>,
}

impl MemoryAuditLedger {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl AuditLedger for MemoryAuditLedger {
    async fn append(&self, event: AuditEvent) -> Result<(), AppError> {
        self.events
            .entry(event.principal_id)
            .or_default()
            .push(event);
        Ok(())
    }

    async fn events_for_principal(&self, principal_id: Uuid) -> Result<Vec<AuditEvent>, AppError> {
        let mut events = self
            .events
            .get(&principal_id)
            .map(|e| e.clone())
            .unwrap_or_default();
        events.sort_by_key(|event| event.created_utc);
        Ok(events)
    }
}

#[derive(Default)]
pub struct MemoryBlobStore {
    blobs: DashMap<Uuid, Vec<u8>>,
}

impl MemoryBlobStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl BlobStore for MemoryBlobStore {
    async fn put(&self, asset_id: Uuid, bytes: Vec<u8>) -> Result<(), AppError> {
        self.blobs.insert(asset_id, bytes);
        Ok(())
    }

    async fn get(&self, asset_id: Uuid) -> Result<Option<Vec<u8>>, AppError> {
        Ok(self.blobs.get(&asset_id).map(|b| b.clone()))
    }

    async fn delete(&self, asset_id: Uuid) -> Result<(), AppError> {
        self.blobs.remove(&asset_id);
        Ok(())
    }
}

#[derive(Default)]
pub struct MemoryAssetCatalog {
    records: DashMap<Uuid, AssetRecord>,
}

impl MemoryAssetCatalog {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl AssetCatalog for MemoryAssetCatalog {
    async fn insert(&self, record: &AssetRecord) -> Result<(), AppError> {
        if self.records.contains_key(&record.asset_id) {
            return Err(AppError::Conflict("asset id already exists".to_string()));
        }
        self.records.insert(record.asset_id, record.clone());
        Ok(())
    }

    async fn fetch(&self, asset_id: Uuid) -> Result<Option<AssetRecord>, AppError> {
        Ok(self.records.get(&asset_id).map(|r| r.clone()))
    }

    async fn update(&self, record: &AssetRecord) -> Result<(), AppError> {
        if !self.records.contains_key(&record.asset_id) {
            return Err(AppError::NotFound("asset not found".to_string()));
        }
        self.records.insert(record.asset_id, record.clone());
        Ok(())
    }
}

/// Fixed-table resolver. Unknown IPs resolve to `None`.
#[derive(Default)]
pub struct StaticGeoResolver {
    table: DashMap<String, GeoPoint>,
}

impl StaticGeoResolver {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, ip: impl Into<String>, lat: f64, lon: f64) {
        self.table.insert(ip.into(), GeoPoint { lat, lon });
    }
}

#[async_trait]
impl GeoResolver for StaticGeoResolver {
    async fn resolve(&self, ip: &str) -> Result<Option<GeoPoint>, AppError> {
        Ok(self.table.get(ip).map(|p| *p))
    }
}
