pub mod asset;
pub mod audit;
pub mod principal;
pub mod role;

pub use asset::{AssetPayload, AssetRecord};
pub use audit::AuditEvent;
pub use principal::{Principal, RegisterRequest};
pub use role::{AssetAction, PermissionSet, PermissionToken, ResourceClass, Role};
