//! Identity and confidential-data protection core.
//!
//! The crate is a library: HTTP routing, UI rendering, TLS, and the storage
//! engines themselves live elsewhere and reach this code through the traits
//! in [`stores`]. What lives here is the part that has to be right:
//!
//! - [`services::auth`]: the multi-factor authentication state machine
//!   (password step, TOTP challenge, signed-token issuance)
//! - [`services::rbac`]: the deny-by-default role permission evaluator
//! - [`services::envelope`]: per-asset envelope encryption for
//!   confidential content
//! - [`services::assets`]: kind-parameterized asset operations gated by
//!   the evaluator
//! - [`services::anomaly`]: impossible-travel and session-hijack detection
//!   over the audit ledger

pub mod config;
pub mod models;
pub mod services;
pub mod stores;
pub mod utils;

use std::sync::Arc;

use crate::config::ServiceConfig;
use crate::services::{
    AnomalyDetector, AssetService, AuthService, EnvelopeEngine, PermissionService, TokenClaims,
    TokenService,
};
use crate::stores::{AssetCatalog, AuditLedger, BlobStore, CredentialStore, GeoResolver};

pub use service_core::error::AppError;

/// External collaborators, injected at startup.
pub struct ExternalStores {
    pub credentials: Arc<dyn CredentialStore>,
    pub ledger: Arc<dyn AuditLedger>,
    pub blobs: Arc<dyn BlobStore>,
    pub catalog: Arc<dyn AssetCatalog>,
    pub geo: Arc<dyn GeoResolver>,
}

/// The wired service graph. Everything is constructed from explicit
/// configuration; there are no hidden globals, including the master key.
#[derive(Clone)]
pub struct AppState {
    pub config: ServiceConfig,
    pub tokens: TokenService,
    pub auth: AuthService,
    pub permissions: PermissionService,
    pub assets: AssetService,
    pub anomaly: AnomalyDetector,
}

impl AppState {
    pub fn new(config: ServiceConfig, ext: ExternalStores) -> Result<Self, AppError> {
        let tokens = TokenService::new(&config.token);
        let engine = EnvelopeEngine::new(config.master_key.secret())?;

        let permissions = PermissionService::new(ext.credentials.clone(), config.store_timeout);
        let auth = AuthService::new(
            ext.credentials.clone(),
            ext.ledger.clone(),
            tokens.clone(),
            config.otp.clone(),
            config.store_timeout,
        );
        let assets = AssetService::new(
            ext.catalog,
            ext.blobs,
            permissions.clone(),
            engine,
            config.crypto.current_key_version.clone(),
            config.store_timeout,
        );
        let anomaly = AnomalyDetector::new(
            ext.ledger,
            ext.credentials,
            ext.geo,
            config.anomaly.clone(),
            config.store_timeout,
        );

        Ok(Self {
            config,
            tokens,
            auth,
            permissions,
            assets,
            anomaly,
        })
    }

    /// Verify a bearer token. Signature and expiry are re-checked on every
    /// call; tokens are stateless and never looked up.
    pub fn verify_token(&self, token: &str) -> Result<TokenClaims, AppError> {
        self.tokens.verify(token)
    }
}
