//! External collaborators, consumed through explicit trait objects passed
//! by reference: no hidden statics, no implicit caches. The in-memory
//! implementations in [`memory`] serve tests and embedders that bring
//! their own persistence later.

pub mod memory;

use std::future::Future;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

use service_core::error::AppError;

use crate::models::{AssetRecord, AuditEvent, Principal, Role};

/// Principal and role records plus serialized permission maps.
#[async_trait]
pub trait CredentialStore: Send + Sync {
    async fn get_principal_by_email(&self, email: &str) -> Result<Option<Principal>, AppError>;
    async fn get_principal_by_id(&self, principal_id: Uuid) -> Result<Option<Principal>, AppError>;
    async fn insert_principal(&self, principal: &Principal) -> Result<(), AppError>;
    async fn list_principals(&self) -> Result<Vec<Principal>, AppError>;

    async fn set_totp_secret(&self, principal_id: Uuid, secret_hex: &str) -> Result<(), AppError>;
    async fn mark_mfa_enrolled(
        &self,
        principal_id: Uuid,
        at: DateTime<Utc>,
    ) -> Result<(), AppError>;
    /// Reset the failure counter, bump the sign-in counter, rotate
    /// current → last sign-in IP, and stamp the login time, atomically.
    async fn record_login_success(&self, principal_id: Uuid, origin_ip: &str)
        -> Result<(), AppError>;
    async fn record_otp_failure(&self, principal_id: Uuid) -> Result<(), AppError>;
    async fn approve_principal(&self, principal_id: Uuid) -> Result<(), AppError>;
    async fn set_role(&self, principal_id: Uuid, role_id: Uuid) -> Result<(), AppError>;

    async fn insert_role(&self, role: &Role) -> Result<(), AppError>;
    async fn get_role_by_id(&self, role_id: Uuid) -> Result<Option<Role>, AppError>;
    async fn get_role_by_name(&self, name: &str) -> Result<Option<Role>, AppError>;
    /// The whole serialized permission map for a role, read in one
    /// operation; concurrent grant/revoke must never expose a partial view.
    async fn read_permissions(&self, role_id: Uuid) -> Result<Option<String>, AppError>;
    async fn write_permissions(&self, role_id: Uuid, serialized: &str) -> Result<(), AppError>;
}

/// Append-only request log. The core never mutates or deletes events.
#[async_trait]
pub trait AuditLedger: Send + Sync {
    async fn append(&self, event: AuditEvent) -> Result<(), AppError>;
    /// Events for one principal, ordered by time ascending.
    async fn events_for_principal(&self, principal_id: Uuid) -> Result<Vec<AuditEvent>, AppError>;
}

/// Opaque byte sink/source for asset content, keyed by asset id.
#[async_trait]
pub trait BlobStore: Send + Sync {
    async fn put(&self, asset_id: Uuid, bytes: Vec<u8>) -> Result<(), AppError>;
    async fn get(&self, asset_id: Uuid) -> Result<Option<Vec<u8>>, AppError>;
    /// Exists so a failed metadata write can roll its blob back; never part
    /// of a user-facing delete (those are soft).
    async fn delete(&self, asset_id: Uuid) -> Result<(), AppError>;
}

/// Asset metadata records.
#[async_trait]
pub trait AssetCatalog: Send + Sync {
    async fn insert(&self, record: &AssetRecord) -> Result<(), AppError>;
    async fn fetch(&self, asset_id: Uuid) -> Result<Option<AssetRecord>, AppError>;
    async fn update(&self, record: &AssetRecord) -> Result<(), AppError>;
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GeoPoint {
    pub lat: f64,
    pub lon: f64,
}

/// Approximate IP geolocation. `Ok(None)` means unresolvable, which is not
/// an error; detection skips the pair.
#[async_trait]
pub trait GeoResolver: Send + Sync {
    async fn resolve(&self, ip: &str) -> Result<Option<GeoPoint>, AppError>;
}

/// Bound an external call. A hung dependency surfaces as a recoverable
/// `Dependency` error instead of blocking the operation; retrying is the
/// caller's decision.
pub async fn bounded<F, T>(limit: Duration, what: &str, call: F) -> Result<T, AppError>
where
    F: Future<Output = Result<T, AppError>>,
{
    match tokio::time::timeout(limit, call).await {
        Ok(result) => result,
        Err(_) => Err(AppError::Dependency(format!(
            "{what} timed out after {}ms",
            limit.as_millis()
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn bounded_surfaces_timeout_as_dependency_error() {
        let never = async {
            tokio::time::sleep(Duration::from_secs(60)).await;
            Ok::<(), AppError>(())
        };
        let err = bounded(Duration::from_millis(10), "credential store", never)
            .await
            .unwrap_err();
        assert!(err.is_retryable());
        assert!(err.to_string().contains("credential store"));
    }

    #[tokio::test]
    async fn bounded_passes_results_through() {
        let ok = bounded(Duration::from_millis(50), "x", async { Ok::<_, AppError>(7) }).await;
        assert_eq!(ok.unwrap(), 7);
    }
}
