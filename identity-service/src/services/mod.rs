pub mod anomaly;
pub mod assets;
pub mod auth;
pub mod envelope;
pub mod rbac;
pub mod token;
pub mod totp;

pub use anomaly::{
    AnomalyDetector, FailedAccessSummary, HijackAnomaly, PrincipalFindings, PrincipalReport,
    TravelAnomaly,
};
pub use assets::{AssetContent, AssetService, CreateAssetRequest};
pub use auth::{AuthService, LoginTicket, MfaEnrollment, SessionToken};
pub use envelope::{EnvelopeEngine, SealedContent};
pub use rbac::PermissionService;
pub use token::{TokenClaims, TokenService};
