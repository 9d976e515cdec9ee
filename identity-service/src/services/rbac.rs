//! Role-based permission evaluation.
//!
//! The stored form is a serialized map; it is read whole (one store call,
//! no partial views) and parsed into the closed vocabulary right here at
//! the boundary. Everything downstream works with typed sets.

use std::sync::Arc;
use std::time::Duration;

use uuid::Uuid;

use service_core::error::AppError;

use crate::models::{PermissionSet, PermissionToken};
use crate::stores::{bounded, CredentialStore};

#[derive(Clone)]
pub struct PermissionService {
    store: Arc<dyn CredentialStore>,
    store_timeout: Duration,
}

impl PermissionService {
    pub fn new(store: Arc<dyn CredentialStore>, store_timeout: Duration) -> Self {
        Self {
            store,
            store_timeout,
        }
    }

    /// Deny by default: unknown role, missing grant, corrupt stored map,
    /// and store failure all evaluate to `false`. Lookup failures are
    /// logged with detail but never turn into an allow.
    pub async fn has_permission(&self, role_id: Uuid, token: PermissionToken) -> bool {
        match self.role_snapshot(role_id).await {
            Ok(Some(set)) => set.contains(&token),
            Ok(None) => false,
            Err(e) => {
                tracing::warn!(role_id = %role_id, token = %token, error = %e, "permission lookup failed, denying");
                false
            }
        }
    }

    /// Immutable parsed snapshot of a role's grants. Refreshing means
    /// calling again; snapshots are never mutated in place.
    pub async fn role_snapshot(&self, role_id: Uuid) -> Result<Option<PermissionSet>, AppError> {
        let raw = bounded(
            self.store_timeout,
            "credential store",
            self.store.read_permissions(role_id),
        )
        .await?;

        match raw {
            Some(raw) => Ok(Some(PermissionSet::from_wire(&raw)?)),
            None => Ok(None),
        }
    }

    /// Persist a typed set. Typed sets are vocabulary-valid by
    /// construction, so this path cannot write corruption.
    pub async fn write_permissions(
        &self,
        role_id: Uuid,
        set: &PermissionSet,
    ) -> Result<(), AppError> {
        let wire = set.to_wire()?;
        bounded(
            self.store_timeout,
            "credential store",
            self.store.write_permissions(role_id, &wire),
        )
        .await
    }

    /// Persist a raw wire payload (e.g. from an administrative request).
    /// The payload is parsed, and anything outside the closed vocabulary
    /// rejected, before the store is touched.
    pub async fn write_permissions_wire(&self, role_id: Uuid, raw: &str) -> Result<(), AppError> {
        let parsed = PermissionSet::from_wire(raw)?;
        self.write_permissions(role_id, &parsed).await
    }
}
