//! The authentication state machine.
//!
//! States: Anonymous → PasswordVerified (pending ticket) → Authenticated
//! (signed token). State only advances forward; a failed challenge returns
//! the caller to PasswordVerified with the same ticket, until the bounded
//! attempt cap destroys the ticket and the flow restarts from Anonymous.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use uuid::Uuid;
use validator::Validate;

use service_core::error::AppError;

use crate::config::OtpConfig;
use crate::models::{AuditEvent, Principal, RegisterRequest};
use crate::services::token::TokenService;
use crate::services::totp;
use crate::stores::{bounded, AuditLedger, CredentialStore};
use crate::utils::{
    check_password_policy, hash_password, verify_password, Password, PasswordHashString,
};

const REGISTER_ENDPOINT: &str = "/auth/register";
const LOGIN_ENDPOINT: &str = "/auth/login";
const CHALLENGE_ENDPOINT: &str = "/auth/challenge";

/// The name of the role every new registration starts in.
const DEFAULT_ROLE: &str = "Guest";

/// Pending-MFA state between password verification and a successful
/// challenge. Lives only in the registry, keyed by an opaque unguessable
/// id; consumed on success or once the attempt cap is reached.
#[derive(Debug, Clone)]
pub struct LoginTicket {
    pub ticket_id: Uuid,
    pub principal_id: Uuid,
    pub issued_utc: DateTime<Utc>,
    failed_attempts: u32,
}

/// Issued once per successful challenge; stateless thereafter.
#[derive(Debug, Clone)]
pub struct SessionToken {
    pub token: String,
    pub token_type: &'static str,
    pub expires_in: i64,
}

/// Provisioning data handed back by registration and re-enrollment.
#[derive(Clone, Debug)]
pub struct MfaEnrollment {
    pub principal_id: Uuid,
    pub email: String,
    pub provisioning_uri: String,
}

enum ChallengeOutcome {
    Accepted,
    Rejected { ticket_destroyed: bool },
}

#[derive(Clone)]
pub struct AuthService {
    store: Arc<dyn CredentialStore>,
    ledger: Arc<dyn AuditLedger>,
    tokens: TokenService,
    otp: OtpConfig,
    store_timeout: Duration,
    /// The one piece of shared short-lived mutable state: pending tickets.
    /// All failure-counter updates happen under the per-ticket entry.
    tickets: Arc<DashMap<Uuid, LoginTicket>>,
    /// Highest accepted TOTP step per principal; a code is single-use
    /// within its validity window, including across logins.
    accepted_steps: Arc<DashMap<Uuid, i64>>,
}

impl AuthService {
    pub fn new(
        store: Arc<dyn CredentialStore>,
        ledger: Arc<dyn AuditLedger>,
        tokens: TokenService,
        otp: OtpConfig,
        store_timeout: Duration,
    ) -> Self {
        Self {
            store,
            ledger,
            tokens,
            otp,
            store_timeout,
            tickets: Arc::new(DashMap::new()),
            accepted_steps: Arc::new(DashMap::new()),
        }
    }

    /// Create a principal in the default role with a fresh TOTP secret.
    /// The account still needs administrative approval before it can log
    /// in, and MFA enrollment completes on the first successful challenge.
    pub async fn register(
        &self,
        req: RegisterRequest,
        origin_ip: &str,
    ) -> Result<MfaEnrollment, AppError> {
        req.validate()?;
        check_password_policy(&req.password)?;

        let email = req.email.trim().to_lowercase();

        let existing = bounded(
            self.store_timeout,
            "credential store",
            self.store.get_principal_by_email(&email),
        )
        .await?;
        if existing.is_some() {
            return Err(AppError::Conflict("email already registered".to_string()));
        }

        let default_role = bounded(
            self.store_timeout,
            "credential store",
            self.store.get_role_by_name(DEFAULT_ROLE),
        )
        .await?
        .ok_or_else(|| {
            AppError::Internal(anyhow::anyhow!("default role {DEFAULT_ROLE} is not seeded"))
        })?;

        let password_hash = hash_password(&Password::new(req.password))?;
        let enrollment = totp::enroll(&self.otp.issuer, &email);

        let principal = Principal::new(
            req.first_name,
            req.last_name,
            email.clone(),
            password_hash.into_string(),
            default_role.role_id,
            enrollment.secret_hex,
        );

        bounded(
            self.store_timeout,
            "credential store",
            self.store.insert_principal(&principal),
        )
        .await?;

        tracing::info!(principal_id = %principal.principal_id, "principal registered");
        self.audit(REGISTER_ENDPOINT, origin_ip, principal.principal_id, true)
            .await;

        Ok(MfaEnrollment {
            principal_id: principal.principal_id,
            email,
            provisioning_uri: enrollment.provisioning_uri,
        })
    }

    /// Password step. Unknown email, wrong password, and unapproved account
    /// all return the identical generic error; the caller cannot tell which
    /// it was. Success produces a pending ticket, not a token.
    pub async fn login(
        &self,
        email: &str,
        password: &str,
        origin_ip: &str,
    ) -> Result<LoginTicket, AppError> {
        let email = email.trim().to_lowercase();

        let principal = match bounded(
            self.store_timeout,
            "credential store",
            self.store.get_principal_by_email(&email),
        )
        .await?
        {
            Some(principal) => principal,
            None => {
                tracing::info!("login rejected: unknown email");
                return Err(AppError::Authentication);
            }
        };

        if verify_password(
            &Password::new(password.to_string()),
            &PasswordHashString::new(principal.password_hash.clone()),
        )
        .is_err()
        {
            tracing::info!(principal_id = %principal.principal_id, "login rejected: password mismatch");
            self.audit(LOGIN_ENDPOINT, origin_ip, principal.principal_id, false)
                .await;
            return Err(AppError::Authentication);
        }

        if !principal.approved {
            tracing::info!(principal_id = %principal.principal_id, "login rejected: account not approved");
            self.audit(LOGIN_ENDPOINT, origin_ip, principal.principal_id, false)
                .await;
            return Err(AppError::Authentication);
        }

        let ticket = LoginTicket {
            ticket_id: Uuid::new_v4(),
            principal_id: principal.principal_id,
            issued_utc: Utc::now(),
            failed_attempts: 0,
        };
        self.tickets.insert(ticket.ticket_id, ticket.clone());

        tracing::info!(principal_id = %principal.principal_id, "password verified, challenge pending");
        self.audit(LOGIN_ENDPOINT, origin_ip, principal.principal_id, true)
            .await;

        Ok(ticket)
    }

    /// OTP step. Success consumes the ticket, updates sign-in bookkeeping,
    /// stamps MFA enrollment on first verification, and issues the signed
    /// token. Failure keeps the ticket alive for retry until the attempt
    /// cap destroys it.
    pub async fn challenge_otp(
        &self,
        ticket_id: Uuid,
        code: &str,
        origin_ip: &str,
    ) -> Result<SessionToken, AppError> {
        let principal_id = self
            .tickets
            .get(&ticket_id)
            .map(|ticket| ticket.principal_id)
            .ok_or(AppError::Authentication)?;

        let principal = bounded(
            self.store_timeout,
            "credential store",
            self.store.get_principal_by_id(principal_id),
        )
        .await?
        .ok_or(AppError::Authentication)?;

        let secret = hex::decode(&principal.totp_secret).map_err(|e| {
            AppError::Internal(anyhow::anyhow!("stored totp secret is not valid hex: {e}"))
        })?;

        let now = Utc::now().timestamp();

        // Verification happens under the per-ticket entry so that
        // increment-and-check of the failure counter is atomic across
        // concurrent attempts, and so a code accepted by one attempt is
        // already recorded before a racing attempt gets the lock.
        let outcome = {
            let mut ticket = match self.tickets.get_mut(&ticket_id) {
                Some(ticket) => ticket,
                None => return Err(AppError::Authentication),
            };

            match totp::verify_at(&secret, code, now, self.otp.skew_steps) {
                Some(step) => {
                    let replayed = self
                        .accepted_steps
                        .get(&principal_id)
                        .is_some_and(|accepted| *accepted >= step);
                    if replayed {
                        tracing::warn!(principal_id = %principal_id, "rejected replayed otp code");
                        ticket.failed_attempts += 1;
                        ChallengeOutcome::Rejected {
                            ticket_destroyed: ticket.failed_attempts >= self.otp.max_attempts,
                        }
                    } else {
                        self.accepted_steps.insert(principal_id, step);
                        ChallengeOutcome::Accepted
                    }
                }
                None => {
                    ticket.failed_attempts += 1;
                    ChallengeOutcome::Rejected {
                        ticket_destroyed: ticket.failed_attempts >= self.otp.max_attempts,
                    }
                }
            }
        };

        match outcome {
            ChallengeOutcome::Accepted => {
                self.tickets.remove(&ticket_id);

                bounded(
                    self.store_timeout,
                    "credential store",
                    self.store.record_login_success(principal_id, origin_ip),
                )
                .await?;

                if !principal.mfa_enrolled() {
                    bounded(
                        self.store_timeout,
                        "credential store",
                        self.store.mark_mfa_enrolled(principal_id, Utc::now()),
                    )
                    .await?;
                    tracing::info!(principal_id = %principal_id, "mfa enrollment completed");
                }

                let token =
                    self.tokens
                        .issue(principal_id, &principal.email, principal.role_id)?;

                tracing::info!(principal_id = %principal_id, "challenge succeeded, token issued");
                self.audit(CHALLENGE_ENDPOINT, origin_ip, principal_id, true)
                    .await;

                Ok(SessionToken {
                    token,
                    token_type: "Bearer",
                    expires_in: self.tokens.expiry_seconds(),
                })
            }
            ChallengeOutcome::Rejected { ticket_destroyed } => {
                if ticket_destroyed {
                    self.tickets.remove(&ticket_id);
                    tracing::warn!(principal_id = %principal_id, "challenge attempt cap reached, ticket destroyed");
                }

                bounded(
                    self.store_timeout,
                    "credential store",
                    self.store.record_otp_failure(principal_id),
                )
                .await?;

                self.audit(CHALLENGE_ENDPOINT, origin_ip, principal_id, false)
                    .await;

                Err(AppError::Authentication)
            }
        }
    }

    /// Rotate in a fresh secret and return provisioning data. Enrollment is
    /// not marked complete until the first successful challenge against the
    /// new secret.
    pub async fn enroll_mfa(&self, email: &str) -> Result<MfaEnrollment, AppError> {
        let email = email.trim().to_lowercase();

        let principal = bounded(
            self.store_timeout,
            "credential store",
            self.store.get_principal_by_email(&email),
        )
        .await?
        .ok_or_else(|| AppError::NotFound("principal not found".to_string()))?;

        let enrollment = totp::enroll(&self.otp.issuer, &email);
        bounded(
            self.store_timeout,
            "credential store",
            self.store
                .set_totp_secret(principal.principal_id, &enrollment.secret_hex),
        )
        .await?;

        // Step acceptances recorded against the old secret are meaningless
        // against the new one.
        self.accepted_steps.remove(&principal.principal_id);

        tracing::info!(principal_id = %principal.principal_id, "totp secret rotated, awaiting first challenge");

        Ok(MfaEnrollment {
            principal_id: principal.principal_id,
            email,
            provisioning_uri: enrollment.provisioning_uri,
        })
    }

    /// Administrative approval; login is rejected (generically) until this
    /// has happened.
    pub async fn approve_principal(&self, principal_id: Uuid) -> Result<(), AppError> {
        bounded(
            self.store_timeout,
            "credential store",
            self.store.approve_principal(principal_id),
        )
        .await
    }

    /// Administrative role change.
    pub async fn assign_role(&self, principal_id: Uuid, role_id: Uuid) -> Result<(), AppError> {
        let role = bounded(
            self.store_timeout,
            "credential store",
            self.store.get_role_by_id(role_id),
        )
        .await?
        .ok_or_else(|| AppError::NotFound("role not found".to_string()))?;

        bounded(
            self.store_timeout,
            "credential store",
            self.store.set_role(principal_id, role.role_id),
        )
        .await
    }

    /// Whether a ticket is still pending (i.e. the caller is in
    /// PasswordVerified, not Anonymous).
    pub fn has_pending_ticket(&self, ticket_id: Uuid) -> bool {
        self.tickets.contains_key(&ticket_id)
    }

    async fn audit(&self, endpoint: &str, origin_ip: &str, principal_id: Uuid, success: bool) {
        let event = AuditEvent::new(endpoint, origin_ip, principal_id, success);
        if let Err(e) = self.ledger.append(event).await {
            tracing::error!(error = %e, endpoint, "failed to append audit event");
        }
    }
}
