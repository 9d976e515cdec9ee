//! Behavioral anomaly detection over the audit ledger.
//!
//! Read-only batch analysis: it walks each principal's time-ordered
//! (origin_ip, timestamp) sequence once, flagging physically implausible
//! travel and fast IP flips. It needs only a consistent-enough snapshot of
//! the append-only ledger, so it runs without locks alongside live writes.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::Serialize;
use uuid::Uuid;

use service_core::error::AppError;

use crate::config::AnomalyConfig;
use crate::models::AuditEvent;
use crate::stores::{bounded, AuditLedger, CredentialStore, GeoPoint, GeoResolver};

const EARTH_RADIUS_KM: f64 = 6371.0;

/// A consecutive event pair whose implied travel speed exceeds the
/// configured physical plausibility bound.
#[derive(Debug, Clone, Serialize)]
pub struct TravelAnomaly {
    pub from_ip: String,
    pub to_ip: String,
    pub distance_km: i64,
    pub elapsed_minutes: i64,
    pub speed_kmh: i64,
    pub timestamp: DateTime<Utc>,
}

/// An origin-IP change faster than a legitimate session plausibly moves,
/// regardless of geography.
#[derive(Debug, Clone, Serialize)]
pub struct HijackAnomaly {
    pub from_ip: String,
    pub to_ip: String,
    pub elapsed_seconds: i64,
    pub timestamp: DateTime<Utc>,
}

/// Findings for one principal. Principals with nothing flagged are omitted
/// from fleet output entirely.
#[derive(Debug, Clone, Serialize)]
pub struct PrincipalReport {
    pub principal_id: Uuid,
    pub email: String,
    pub role_name: String,
    pub impossible_travel: Vec<TravelAnomaly>,
    pub session_hijacks: Vec<HijackAnomaly>,
}

/// A principal/endpoint pair with repeated failed requests.
#[derive(Debug, Clone, Serialize)]
pub struct FailedAccessSummary {
    pub principal_id: Uuid,
    pub endpoint: String,
    pub attempts: i64,
}

/// Both signals for one principal, produced by a single pass.
#[derive(Debug, Clone, Default, Serialize)]
pub struct PrincipalFindings {
    pub impossible_travel: Vec<TravelAnomaly>,
    pub session_hijacks: Vec<HijackAnomaly>,
}

#[derive(Clone)]
pub struct AnomalyDetector {
    ledger: Arc<dyn AuditLedger>,
    store: Arc<dyn CredentialStore>,
    geo: Arc<dyn GeoResolver>,
    config: AnomalyConfig,
    dep_timeout: Duration,
}

impl AnomalyDetector {
    pub fn new(
        ledger: Arc<dyn AuditLedger>,
        store: Arc<dyn CredentialStore>,
        geo: Arc<dyn GeoResolver>,
        config: AnomalyConfig,
        dep_timeout: Duration,
    ) -> Self {
        Self {
            ledger,
            store,
            geo,
            config,
            dep_timeout,
        }
    }

    /// Impossible travel and session hijack for one principal, in one O(n)
    /// pass over consecutive pairs of their event history.
    pub async fn analyze_principal(
        &self,
        principal_id: Uuid,
    ) -> Result<PrincipalFindings, AppError> {
        let events = bounded(
            self.dep_timeout,
            "audit ledger",
            self.ledger.events_for_principal(principal_id),
        )
        .await?;
        self.scan(&events).await
    }

    /// Findings for every principal in the fleet; clean principals are
    /// omitted (sparse output).
    pub async fn fleet_report(&self) -> Result<Vec<PrincipalReport>, AppError> {
        let principals = bounded(
            self.dep_timeout,
            "credential store",
            self.store.list_principals(),
        )
        .await?;

        let mut reports = Vec::new();
        for principal in principals {
            let findings = self.analyze_principal(principal.principal_id).await?;
            if findings.impossible_travel.is_empty() && findings.session_hijacks.is_empty() {
                continue;
            }

            let role_name = bounded(
                self.dep_timeout,
                "credential store",
                self.store.get_role_by_id(principal.role_id),
            )
            .await?
            .map(|role| role.role_name)
            .unwrap_or_else(|| "unknown".to_string());

            reports.push(PrincipalReport {
                principal_id: principal.principal_id,
                email: principal.email,
                role_name,
                impossible_travel: findings.impossible_travel,
                session_hijacks: findings.session_hijacks,
            });
        }
        Ok(reports)
    }

    /// Principal/endpoint pairs with more failed requests than the
    /// configured threshold, most-failed first.
    pub async fn failed_access_summary(&self) -> Result<Vec<FailedAccessSummary>, AppError> {
        let principals = bounded(
            self.dep_timeout,
            "credential store",
            self.store.list_principals(),
        )
        .await?;

        let mut summary = Vec::new();
        for principal in principals {
            let events = bounded(
                self.dep_timeout,
                "audit ledger",
                self.ledger.events_for_principal(principal.principal_id),
            )
            .await?;

            let mut counts: BTreeMap<&str, i64> = BTreeMap::new();
            for event in events.iter().filter(|event| !event.success) {
                *counts.entry(event.endpoint.as_str()).or_default() += 1;
            }
            for (endpoint, attempts) in counts {
                if attempts > self.config.failed_access_threshold {
                    summary.push(FailedAccessSummary {
                        principal_id: principal.principal_id,
                        endpoint: endpoint.to_string(),
                        attempts,
                    });
                }
            }
        }

        summary.sort_by(|a, b| b.attempts.cmp(&a.attempts));
        Ok(summary)
    }

    async fn scan(&self, events: &[AuditEvent]) -> Result<PrincipalFindings, AppError> {
        let mut findings = PrincipalFindings::default();

        for pair in events.windows(2) {
            let (prev, next) = (&pair[0], &pair[1]);
            if prev.origin_ip == next.origin_ip {
                continue;
            }

            let elapsed_seconds = (next.created_utc - prev.created_utc).num_seconds();

            // Fast IP flip, geography-independent. Out-of-order events are
            // clock skew, not a signal.
            if elapsed_seconds >= 0 && elapsed_seconds < self.config.hijack_window_seconds {
                findings.session_hijacks.push(HijackAnomaly {
                    from_ip: prev.origin_ip.clone(),
                    to_ip: next.origin_ip.clone(),
                    elapsed_seconds,
                    timestamp: next.created_utc,
                });
            }

            // Implied speed needs positive elapsed time.
            if elapsed_seconds <= 0 {
                continue;
            }
            // Either endpoint unresolved: skip the pair, neither flag nor error.
            let Some(from) = self.resolve(&prev.origin_ip).await? else {
                continue;
            };
            let Some(to) = self.resolve(&next.origin_ip).await? else {
                continue;
            };

            let distance_km = haversine(from, to);
            let elapsed_hours = elapsed_seconds as f64 / 3600.0;
            let speed_kmh = distance_km / elapsed_hours;

            if speed_kmh > self.config.speed_limit_kmh {
                findings.impossible_travel.push(TravelAnomaly {
                    from_ip: prev.origin_ip.clone(),
                    to_ip: next.origin_ip.clone(),
                    distance_km: distance_km.round() as i64,
                    elapsed_minutes: (elapsed_seconds as f64 / 60.0).round() as i64,
                    speed_kmh: speed_kmh.round() as i64,
                    timestamp: next.created_utc,
                });
            }
        }

        Ok(findings)
    }

    async fn resolve(&self, ip: &str) -> Result<Option<GeoPoint>, AppError> {
        bounded(self.dep_timeout, "geo resolution", self.geo.resolve(ip)).await
    }
}

/// Great-circle distance in kilometers (haversine).
fn haversine(a: GeoPoint, b: GeoPoint) -> f64 {
    let lat_a = a.lat.to_radians();
    let lat_b = b.lat.to_radians();
    let d_lat = (b.lat - a.lat).to_radians();
    let d_lon = (b.lon - a.lon).to_radians();

    let h = (d_lat / 2.0).sin().powi(2) + lat_a.cos() * lat_b.cos() * (d_lon / 2.0).sin().powi(2);
    2.0 * EARTH_RADIUS_KM * h.sqrt().asin()
}
