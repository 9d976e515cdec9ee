//! Audit ledger events.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// One append-only ledger entry. Ordered by time per principal; the anomaly
/// detector consumes the (origin_ip, created_utc) sequence.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditEvent {
    pub request_id: Uuid,
    pub endpoint: String,
    pub origin_ip: String,
    pub principal_id: Uuid,
    pub success: bool,
    pub created_utc: DateTime<Utc>,
}

impl AuditEvent {
    pub fn new(
        endpoint: impl Into<String>,
        origin_ip: impl Into<String>,
        principal_id: Uuid,
        success: bool,
    ) -> Self {
        Self::at(endpoint, origin_ip, principal_id, success, Utc::now())
    }

    /// Event with an explicit timestamp, for ingestion of historical logs.
    pub fn at(
        endpoint: impl Into<String>,
        origin_ip: impl Into<String>,
        principal_id: Uuid,
        success: bool,
        created_utc: DateTime<Utc>,
    ) -> Self {
        Self {
            request_id: Uuid::new_v4(),
            endpoint: endpoint.into(),
            origin_ip: origin_ip.into(),
            principal_id,
            success,
            created_utc,
        }
    }
}
