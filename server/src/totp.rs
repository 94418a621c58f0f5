//! Time-based one-time passwords (RFC 6238) for the admin second factor.
//!
//! Codes are 6 digits, HMAC-SHA1 over a 30-second time step counter, which
//! is what Google Authenticator, Microsoft Authenticator and friends expect.
//! The verifier accepts the current step plus `skew_steps` steps either side
//! (one by default, a 90-second acceptance window) to absorb clock drift
//! between the server and the authenticator device.
//!
//! # Example
//!
//! ```rust
//! use folio_gate::totp::{TotpSecret, TotpVerifier, code_at};
//!
//! let secret = TotpSecret::generate().unwrap();
//! let verifier = TotpVerifier::default();
//!
//! let now = 1_760_000_000;
//! let code = code_at(&secret, now, 0).unwrap();
//! assert!(verifier.verify_at(&code, &secret, now));
//! ```

use std::fmt;

use data_encoding::BASE32_NOPAD;
use thiserror::Error;
use totp_rs::{Algorithm, TOTP};
use tracing::{debug, warn};
use zeroize::Zeroize;

use crate::crypto::{constant_time_eq, random_bytes};
use crate::error::CryptoError;

/// Length of a time step in seconds.
pub const STEP_SECS: i64 = 30;

/// Number of digits in a code.
pub const DIGITS: usize = 6;

/// Default number of adjacent steps accepted on each side of the current one.
pub const DEFAULT_SKEW_STEPS: u32 = 1;

/// Length of a generated secret in bytes (160 bits).
pub const SECRET_BYTES: usize = 20;

/// Default account label for provisioning URIs.
pub const DEFAULT_ACCOUNT: &str = "Admin";

/// Default issuer label for provisioning URIs.
pub const DEFAULT_ISSUER: &str = "VibeCoding";

/// Errors produced while computing a TOTP code.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum TotpError {
    /// The secret contains characters outside the base32 alphabet or has an
    /// impossible length.
    #[error("TOTP secret is not valid base32")]
    Decode,

    /// The secret decodes to no key material at all.
    #[error("TOTP secret is empty")]
    Empty,

    /// The time step counter would be negative or overflow.
    #[error("TOTP time step counter out of range")]
    CounterOutOfRange,
}

impl TotpError {
    /// Returns `true` if the error points at a misconfigured secret rather
    /// than at the clock or the platform.
    pub fn is_configuration_error(&self) -> bool {
        matches!(self, Self::Decode | Self::Empty)
    }
}

/// A shared TOTP secret, kept both base32-encoded and decoded.
///
/// Both forms are wiped from memory on drop. Once enrolled into an
/// authenticator the secret must not change.
#[derive(Clone)]
pub struct TotpSecret {
    encoded: String,
    bytes: Vec<u8>,
}

impl TotpSecret {
    /// Decodes a base32 secret.
    ///
    /// Lowercase letters and trailing `=` padding are accepted; any other
    /// character outside `A-Z2-7` is rejected.
    ///
    /// # Errors
    ///
    /// Returns [`TotpError::Decode`] for invalid base32 and
    /// [`TotpError::Empty`] for an empty secret.
    pub fn parse(encoded: &str) -> Result<Self, TotpError> {
        let normalized = encoded.trim_end_matches('=').to_ascii_uppercase();
        let bytes = BASE32_NOPAD
            .decode(normalized.as_bytes())
            .map_err(|_| TotpError::Decode)?;
        if bytes.is_empty() {
            return Err(TotpError::Empty);
        }
        Ok(Self {
            encoded: normalized,
            bytes,
        })
    }

    /// Generates a fresh 160-bit secret from the OS random source.
    ///
    /// # Errors
    ///
    /// Returns [`CryptoError`] if the secure random source is unavailable.
    pub fn generate() -> Result<Self, CryptoError> {
        let mut raw = random_bytes::<SECRET_BYTES>()?;
        let secret = Self {
            encoded: BASE32_NOPAD.encode(&raw),
            bytes: raw.to_vec(),
        };
        raw.zeroize();
        Ok(secret)
    }

    /// The secret in base32 without padding, as shown to the operator.
    pub fn as_base32(&self) -> &str {
        &self.encoded
    }

    /// The decoded key bytes.
    #[cfg(test)]
    fn key(&self) -> &[u8] {
        &self.bytes
    }

    /// SHA-1, six digits, 30-second steps. The window is applied by
    /// [`TotpVerifier`], so the generator itself has no skew.
    ///
    /// Secrets shorter than 128 bits are accepted; the copied key is wiped
    /// when the generator drops.
    fn generator(&self) -> TOTP {
        TOTP::new_unchecked(
            Algorithm::SHA1,
            DIGITS,
            0,
            STEP_SECS.unsigned_abs(),
            self.bytes.clone(),
        )
    }
}

impl Drop for TotpSecret {
    fn drop(&mut self) {
        self.encoded.zeroize();
        self.bytes.zeroize();
    }
}

impl fmt::Debug for TotpSecret {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TotpSecret")
            .field("len", &self.bytes.len())
            .finish_non_exhaustive()
    }
}

/// Computes the code for the step containing `unix_secs`, shifted by
/// `window_offset` steps.
///
/// # Errors
///
/// Returns [`TotpError::CounterOutOfRange`] if the shifted counter is
/// negative or does not fit the clock.
pub fn code_at(
    secret: &TotpSecret,
    unix_secs: i64,
    window_offset: i64,
) -> Result<String, TotpError> {
    // Snap to the start of the shifted step so the generator sees one counter.
    let step_start = unix_secs
        .div_euclid(STEP_SECS)
        .checked_add(window_offset)
        .and_then(|counter| counter.checked_mul(STEP_SECS))
        .and_then(|time| u64::try_from(time).ok())
        .ok_or(TotpError::CounterOutOfRange)?;
    Ok(secret.generator().generate(step_start))
}

/// Current Unix time in whole seconds.
fn now_secs() -> i64 {
    chrono::Utc::now().timestamp()
}

/// Checks TOTP codes with a bounded window around the current step.
#[derive(Debug, Clone, Copy)]
pub struct TotpVerifier {
    skew_steps: u32,
}

impl Default for TotpVerifier {
    fn default() -> Self {
        Self::new(DEFAULT_SKEW_STEPS)
    }
}

impl TotpVerifier {
    /// Creates a verifier accepting `skew_steps` steps either side of now.
    pub fn new(skew_steps: u32) -> Self {
        Self { skew_steps }
    }

    /// Number of adjacent steps accepted on each side.
    pub fn skew_steps(&self) -> u32 {
        self.skew_steps
    }

    /// Code for the current step shifted by `window_offset`, from a base32
    /// secret.
    ///
    /// # Errors
    ///
    /// Returns [`TotpError::Decode`] if `secret` is not valid base32.
    pub fn current_code(&self, secret: &str, window_offset: i64) -> Result<String, TotpError> {
        let secret = TotpSecret::parse(secret)?;
        code_at(&secret, now_secs(), window_offset)
    }

    /// Returns `true` if `candidate` matches the current, previous or next
    /// code (widened by the configured skew) for a base32 secret.
    ///
    /// A secret that fails to decode is a configuration defect: it is logged
    /// at `warn` and reported as a failed verification.
    pub fn verify(&self, candidate: &str, secret: &str) -> bool {
        match TotpSecret::parse(secret) {
            Ok(secret) => self.verify_at(candidate, &secret, now_secs()),
            Err(err) if err.is_configuration_error() => {
                warn!(error = %err, "TOTP secret failed to decode, rejecting code");
                false
            }
            Err(err) => {
                debug!(error = %err, "TOTP secret rejected");
                false
            }
        }
    }

    /// [`verify`](Self::verify) against an already decoded secret.
    pub fn verify_secret(&self, candidate: &str, secret: &TotpSecret) -> bool {
        self.verify_at(candidate, secret, now_secs())
    }

    /// [`verify`](Self::verify) against an already decoded secret with an
    /// explicit clock.
    pub fn verify_at(&self, candidate: &str, secret: &TotpSecret, unix_secs: i64) -> bool {
        if candidate.len() != DIGITS || !candidate.bytes().all(|b| b.is_ascii_digit()) {
            debug!("TOTP code has wrong shape");
            return false;
        }

        let skew = i64::from(self.skew_steps);
        let mut matched = false;
        for offset in -skew..=skew {
            // No early return: every window is computed and compared.
            if let Ok(expected) = code_at(secret, unix_secs, offset) {
                matched |= constant_time_eq(expected.as_bytes(), candidate.as_bytes());
            }
        }

        if !matched {
            debug!(skew_steps = self.skew_steps, "TOTP code did not match any window");
        }
        matched
    }
}

/// Builds the `otpauth://` URI consumed by authenticator apps and QR
/// renderers.
pub fn provisioning_uri(secret: &TotpSecret, account: &str, issuer: &str) -> String {
    let issuer = urlencoding::encode(issuer);
    let account = urlencoding::encode(account);
    format!(
        "otpauth://totp/{issuer}:{account}?secret={}&issuer={issuer}&algorithm=SHA1&digits={DIGITS}&period={STEP_SECS}",
        secret.as_base32()
    )
}

/// A freshly generated secret with its provisioning URI, for enrolment.
#[derive(Debug)]
pub struct TotpSetup {
    /// The new secret.
    pub secret: TotpSecret,
    /// The matching `otpauth://` URI.
    pub uri: String,
}

impl TotpSetup {
    /// Generates a new secret and builds its URI.
    ///
    /// # Errors
    ///
    /// Returns [`CryptoError`] if the secure random source is unavailable.
    pub fn generate(account: &str, issuer: &str) -> Result<Self, CryptoError> {
        let secret = TotpSecret::generate()?;
        let uri = provisioning_uri(&secret, account, issuer);
        Ok(Self { secret, uri })
    }
}
