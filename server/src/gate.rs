//! Admin gate: the password and TOTP login flow in front of the token
//! authority.
//!
//! The gate holds the expected admin password hash and, optionally, a TOTP
//! secret. Logging in is a two-factor check when a secret is configured and
//! a password-only check otherwise. A session token is only ever issued on
//! [`LoginOutcome::Authenticated`].
//!
//! # Example
//!
//! ```rust
//! use folio_gate::gate::{hash_password, AdminCredentials, AdminGate, LoginOutcome};
//!
//! let gate = AdminGate::new(
//!     AdminCredentials::password_only(hash_password("correct horse")),
//!     Default::default(),
//!     Default::default(),
//! );
//!
//! match gate.login("correct horse", None).unwrap() {
//!     LoginOutcome::Authenticated(token) => assert!(gate.validate(&token.to_string())),
//!     other => panic!("unexpected outcome: {other:?}"),
//! }
//! ```

use std::fmt;

use tracing::{debug, info};

use crate::crypto::{constant_time_eq, sha256_hex};
use crate::error::CryptoError;
use crate::token::{now_millis, SessionToken, TokenAuthority};
use crate::totp::{TotpSecret, TotpVerifier};

/// Hashes a password into the configured credential format: lowercase hex
/// SHA-256 of its UTF-8 bytes.
pub fn hash_password(password: &str) -> String {
    sha256_hex(password.as_bytes())
}

/// The credentials the gate checks logins against.
#[derive(Clone)]
pub struct AdminCredentials {
    /// Expected password hash (lowercase hex SHA-256). Also used as the
    /// token signing material.
    pub password_hash: String,

    /// Second-factor secret; `None` disables the TOTP step.
    pub totp_secret: Option<TotpSecret>,
}

impl AdminCredentials {
    /// Credentials with both factors.
    pub fn new(password_hash: impl Into<String>, totp_secret: Option<TotpSecret>) -> Self {
        Self {
            password_hash: password_hash.into().to_ascii_lowercase(),
            totp_secret,
        }
    }

    /// Credentials without a TOTP step.
    pub fn password_only(password_hash: impl Into<String>) -> Self {
        Self::new(password_hash, None)
    }
}

impl fmt::Debug for AdminCredentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AdminCredentials")
            .field("password_hash", &"[REDACTED]")
            .field("totp_enabled", &self.totp_secret.is_some())
            .finish()
    }
}

/// Proof that the password step passed.
///
/// Only [`AdminGate::check_password`] can construct one, so
/// [`AdminGate::complete`] cannot be reached with an unchecked password.
#[derive(Debug)]
pub struct PasswordVerified {
    _private: (),
}

/// Which factor rejected a login.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RejectReason {
    /// The password did not match.
    Password,
    /// The TOTP code did not match any accepted window.
    TotpCode,
}

/// Result of a login attempt.
#[derive(Debug)]
pub enum LoginOutcome {
    /// Every configured factor passed; the token is ready to store.
    Authenticated(SessionToken),
    /// The password passed but a TOTP code is needed.
    TotpRequired,
    /// A factor failed. No token was issued.
    Rejected(RejectReason),
}

impl LoginOutcome {
    /// Returns `true` if a token was issued.
    pub fn is_authenticated(&self) -> bool {
        matches!(self, Self::Authenticated(_))
    }
}

/// Password + TOTP login in front of a [`TokenAuthority`].
#[derive(Debug, Clone)]
pub struct AdminGate {
    credentials: AdminCredentials,
    authority: TokenAuthority,
    verifier: TotpVerifier,
}

impl AdminGate {
    /// Creates a gate.
    pub fn new(
        credentials: AdminCredentials,
        authority: TokenAuthority,
        verifier: TotpVerifier,
    ) -> Self {
        Self {
            credentials,
            authority,
            verifier,
        }
    }

    /// Returns `true` if logins require a TOTP code.
    pub fn totp_enabled(&self) -> bool {
        self.credentials.totp_secret.is_some()
    }

    /// The token authority used for issuing and validating.
    pub fn authority(&self) -> &TokenAuthority {
        &self.authority
    }

    /// Checks `password` against the expected hash in constant time.
    pub fn check_password(&self, password: &str) -> Option<PasswordVerified> {
        let candidate = hash_password(password);
        if constant_time_eq(
            candidate.as_bytes(),
            self.credentials.password_hash.as_bytes(),
        ) {
            Some(PasswordVerified { _private: () })
        } else {
            debug!("Admin password rejected");
            None
        }
    }

    /// Runs the whole login flow in one call.
    ///
    /// # Errors
    ///
    /// Returns [`CryptoError`] if a token cannot be issued.
    pub fn login(&self, password: &str, code: Option<&str>) -> Result<LoginOutcome, CryptoError> {
        match self.check_password(password) {
            Some(verified) => self.complete(verified, code),
            None => Ok(LoginOutcome::Rejected(RejectReason::Password)),
        }
    }

    /// Second half of the flow, after the password has passed.
    ///
    /// Interactive callers use this to prompt for the code only once the
    /// password is known to be right.
    ///
    /// # Errors
    ///
    /// Returns [`CryptoError`] if a token cannot be issued.
    pub fn complete(
        &self,
        _verified: PasswordVerified,
        code: Option<&str>,
    ) -> Result<LoginOutcome, CryptoError> {
        if let Some(secret) = &self.credentials.totp_secret {
            let Some(code) = code.map(str::trim).filter(|c| !c.is_empty()) else {
                debug!("Admin login waiting for TOTP code");
                return Ok(LoginOutcome::TotpRequired);
            };
            if !self.verifier.verify_secret(code, secret) {
                return Ok(LoginOutcome::Rejected(RejectReason::TotpCode));
            }
        }

        let token = self.authority.issue(&self.credentials.password_hash)?;
        info!(
            totp = self.totp_enabled(),
            issued_at = token.issued_at_millis(),
            "Admin session issued"
        );
        Ok(LoginOutcome::Authenticated(token))
    }

    /// Returns `true` if `token` is a valid session for the current
    /// credentials.
    pub fn validate(&self, token: &str) -> bool {
        self.authority
            .validate(token, &self.credentials.password_hash)
    }

    /// Validates `token` and returns its parsed form.
    pub fn inspect(&self, token: &str) -> Option<SessionToken> {
        match self
            .authority
            .check_at(token, &self.credentials.password_hash, now_millis())
        {
            Ok(token) => Some(token),
            Err(reason) => {
                debug!(reason = %reason, "Session token rejected");
                None
            }
        }
    }
}
