//! Shared builders for the integration suites.

#![allow(dead_code)]

use std::sync::Arc;

use uuid::Uuid;

use identity_service::config::{MasterKey, ServiceConfig};
use identity_service::models::{PermissionSet, RegisterRequest, Role};
use identity_service::services::totp;
use identity_service::services::SessionToken;
use identity_service::stores::memory::{
    MemoryAssetCatalog, MemoryAuditLedger, MemoryBlobStore, MemoryCredentialStore,
    StaticGeoResolver,
};
use identity_service::stores::CredentialStore;
use identity_service::{AppState, ExternalStores};

pub const TEST_IP: &str = "203.0.113.10";

pub struct TestHarness {
    pub state: AppState,
    pub credentials: Arc<MemoryCredentialStore>,
    pub ledger: Arc<MemoryAuditLedger>,
    pub blobs: Arc<MemoryBlobStore>,
    pub catalog: Arc<MemoryAssetCatalog>,
    pub geo: Arc<StaticGeoResolver>,
}

pub fn harness() -> TestHarness {
    harness_with_key_version("v1")
}

/// Harness whose config seals NEW confidential assets under the given key
/// version, sharing no state with any other harness.
pub fn harness_with_key_version(key_version: &str) -> TestHarness {
    let credentials = Arc::new(MemoryCredentialStore::new());
    let ledger = Arc::new(MemoryAuditLedger::new());
    let blobs = Arc::new(MemoryBlobStore::new());
    let catalog = Arc::new(MemoryAssetCatalog::new());
    let geo = Arc::new(StaticGeoResolver::new());

    let state = state_over(
        key_version,
        credentials.clone(),
        ledger.clone(),
        blobs.clone(),
        catalog.clone(),
        geo.clone(),
    );

    TestHarness {
        state,
        credentials,
        ledger,
        blobs,
        catalog,
        geo,
    }
}

/// A second AppState over an existing harness's stores, e.g. to model a
/// deployment whose current key version has moved on.
pub fn state_over(
    key_version: &str,
    credentials: Arc<MemoryCredentialStore>,
    ledger: Arc<MemoryAuditLedger>,
    blobs: Arc<MemoryBlobStore>,
    catalog: Arc<MemoryAssetCatalog>,
    geo: Arc<StaticGeoResolver>,
) -> AppState {
    let mut config = ServiceConfig::dev_defaults(
        MasterKey::from_bytes(vec![0x42; 32]).unwrap(),
        "integration-test-signing-secret".to_string(),
    );
    config.crypto.current_key_version = key_version.to_string();

    AppState::new(
        config,
        ExternalStores {
            credentials,
            ledger,
            blobs,
            catalog,
            geo,
        },
    )
    .unwrap()
}

pub async fn seed_role(h: &TestHarness, name: &str, permissions: PermissionSet) -> Uuid {
    let role = Role::new(name, None);
    h.credentials.insert_role(&role).await.unwrap();
    h.state
        .permissions
        .write_permissions(role.role_id, &permissions)
        .await
        .unwrap();
    role.role_id
}

/// Seeds the Guest role (empty grants) registration depends on, plus an
/// all-grants Admin role. Returns (guest_role_id, admin_role_id).
pub async fn seed_default_roles(h: &TestHarness) -> (Uuid, Uuid) {
    let guest = seed_role(h, "Guest", PermissionSet::new()).await;
    let admin = seed_role(h, "Admin", PermissionSet::full()).await;
    (guest, admin)
}

pub fn register_request(email: &str, password: &str) -> RegisterRequest {
    RegisterRequest {
        first_name: "Test".to_string(),
        last_name: "Principal".to_string(),
        email: email.to_string(),
        password: password.to_string(),
    }
}

/// Register and administratively approve a principal; returns its id.
pub async fn register_approved(h: &TestHarness, email: &str, password: &str) -> Uuid {
    let enrollment = h
        .state
        .auth
        .register(register_request(email, password), TEST_IP)
        .await
        .unwrap();
    h.state
        .auth
        .approve_principal(enrollment.principal_id)
        .await
        .unwrap();
    enrollment.principal_id
}

/// The code an authenticator app would currently display for a principal.
pub async fn current_code(h: &TestHarness, email: &str) -> String {
    let principal = h
        .credentials
        .get_principal_by_email(email)
        .await
        .unwrap()
        .unwrap();
    let secret = hex::decode(principal.totp_secret).unwrap();
    totp::code_at(&secret, chrono::Utc::now().timestamp())
}

/// Full password + challenge flow from `ip`.
pub async fn login_with_mfa(
    h: &TestHarness,
    email: &str,
    password: &str,
    ip: &str,
) -> SessionToken {
    let ticket = h.state.auth.login(email, password, ip).await.unwrap();
    let code = current_code(h, email).await;
    h.state
        .auth
        .challenge_otp(ticket.ticket_id, &code, ip)
        .await
        .unwrap()
}
