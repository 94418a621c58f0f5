//! Request and response bodies for the admin HTTP surface.
//!
//! Types carrying credentials (passwords, codes, tokens, TOTP secrets) have
//! hand-written `Debug` impls that redact them, so they are safe to pass to
//! `tracing` fields by accident.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Body of `POST /admin/login`.
#[derive(Clone, Deserialize)]
pub struct LoginRequest {
    /// Admin password in clear text.
    pub password: String,

    /// Six-digit TOTP code, when the second factor is enabled.
    #[serde(default)]
    pub code: Option<String>,
}

impl fmt::Debug for LoginRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LoginRequest")
            .field("password", &"[REDACTED]")
            .field("code", &self.code.as_ref().map(|_| "[REDACTED]"))
            .finish()
    }
}

/// Successful login response.
#[derive(Clone, Serialize, Deserialize)]
pub struct LoginResponse {
    /// The session token, also set as a cookie.
    pub token: String,

    /// When the token stops being accepted.
    pub expires_at: DateTime<Utc>,
}

impl fmt::Debug for LoginResponse {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LoginResponse")
            .field("token", &"[REDACTED]")
            .field("expires_at", &self.expires_at)
            .finish()
    }
}

/// Response of `GET /admin/session` for a valid session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionStatus {
    /// Always `true`; invalid sessions get a 401 instead.
    pub authenticated: bool,

    /// When the token was issued.
    pub issued_at: DateTime<Utc>,

    /// When the token stops being accepted.
    pub expires_at: DateTime<Utc>,

    /// Whether logins require a TOTP code.
    pub totp_enabled: bool,
}

/// Response of `POST /admin/totp/setup`.
///
/// The secret is not persisted anywhere; the operator copies it into
/// `FOLIO_TOTP_SECRET` after enrolling it in an authenticator.
#[derive(Clone, Serialize, Deserialize)]
pub struct TotpSetupResponse {
    /// Base32 secret without padding.
    pub secret: String,

    /// `otpauth://` provisioning URI.
    pub uri: String,
}

impl fmt::Debug for TotpSetupResponse {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TotpSetupResponse").finish_non_exhaustive()
    }
}

/// Response of `GET /health`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HealthResponse {
    /// Always `"ok"` while the server is serving.
    pub status: String,

    /// Whether logins require a TOTP code.
    pub totp_enabled: bool,

    /// Seconds since the server started.
    pub uptime_seconds: u64,
}
