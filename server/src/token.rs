//! Session token authority: signed, time-limited admin bearer tokens.
//!
//! A token proves that its holder passed the admin password check (and the
//! TOTP challenge, when configured) at some point in the last
//! [`DEFAULT_MAX_AGE_MS`] milliseconds.
//!
//! # Token Format
//!
//! ```text
//! {issued_at_millis}.{nonce}.{signature}
//! ```
//!
//! - `issued_at_millis`: decimal milliseconds since the Unix epoch
//! - `nonce`: 16 random bytes, lowercase hex (32 characters)
//! - `signature`: first 16 bytes of
//!   `SHA-256("{issued_at_millis}.{nonce}.{secret_material}")`, lowercase hex
//!
//! The secret material is the expected admin password hash, so rotating the
//! password invalidates every outstanding token.
//!
//! # Example
//!
//! ```rust
//! use folio_gate::token::TokenAuthority;
//!
//! let authority = TokenAuthority::default();
//! let token = authority.issue("expected-password-hash").unwrap();
//!
//! assert!(authority.validate(&token.to_string(), "expected-password-hash"));
//! assert!(!authority.validate(&token.to_string(), "some-other-hash"));
//! ```

use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use chrono::{DateTime, Utc};
use sha2::{Digest, Sha256};
use thiserror::Error;
use tracing::debug;

use crate::crypto::{constant_time_eq, random_bytes};
use crate::error::CryptoError;

/// Default maximum token age (24 hours).
pub const DEFAULT_MAX_AGE_MS: i64 = 86_400_000;

/// Default tolerance for issuance timestamps ahead of the local clock (1 minute).
pub const DEFAULT_FUTURE_SKEW_MS: i64 = 60_000;

/// Number of random bytes in a token nonce.
const NONCE_BYTES: usize = 16;

/// Number of digest bytes kept in a token signature.
const SIGNATURE_BYTES: usize = 16;

/// Length of the hex-encoded signature segment.
pub const SIGNATURE_HEX_LEN: usize = SIGNATURE_BYTES * 2;

/// Segment separator in the wire format.
const SEPARATOR: char = '.';

/// Why a token failed validation.
///
/// These reasons exist for logging and tests only. [`TokenAuthority::validate`]
/// collapses all of them to `false` so a caller cannot tell which check
/// failed.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum TokenRejection {
    /// The token does not have the three-part shape.
    #[error("malformed token: {0}")]
    Malformed(&'static str),

    /// The token is older than the maximum age.
    #[error("token expired {age_ms}ms after issuance")]
    Expired {
        /// Age of the token at validation time.
        age_ms: i64,
    },

    /// The token claims to be issued too far in the future.
    #[error("token issued {ahead_ms}ms in the future")]
    Premature {
        /// How far ahead of the local clock the timestamp is.
        ahead_ms: i64,
    },

    /// The signature does not match the fields and current secret.
    #[error("token signature mismatch")]
    SignatureMismatch,
}

/// Freshness policy for session tokens.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TokenPolicy {
    /// Maximum accepted age of a token.
    pub max_age: Duration,

    /// Maximum accepted distance of the issuance time into the future.
    pub future_skew: Duration,
}

impl Default for TokenPolicy {
    fn default() -> Self {
        Self {
            max_age: Duration::from_millis(DEFAULT_MAX_AGE_MS as u64),
            future_skew: Duration::from_millis(DEFAULT_FUTURE_SKEW_MS as u64),
        }
    }
}

impl TokenPolicy {
    /// Creates a policy with custom limits.
    pub fn new(max_age: Duration, future_skew: Duration) -> Self {
        Self {
            max_age,
            future_skew,
        }
    }

    fn max_age_ms(&self) -> i64 {
        duration_to_ms(self.max_age)
    }

    fn future_skew_ms(&self) -> i64 {
        duration_to_ms(self.future_skew)
    }
}

fn duration_to_ms(duration: Duration) -> i64 {
    i64::try_from(duration.as_millis()).unwrap_or(i64::MAX)
}

/// A parsed session token.
///
/// Parsing only checks the structure; use [`TokenAuthority`] to check
/// freshness and the signature.
#[derive(Clone, PartialEq, Eq)]
pub struct SessionToken {
    issued_at_millis: i64,
    nonce: String,
    signature: String,
}

impl SessionToken {
    /// Parses the three-part wire format.
    ///
    /// # Errors
    ///
    /// Returns [`TokenRejection::Malformed`] if the token does not split into
    /// exactly three parts, the timestamp is not a canonical unsigned integer,
    /// or the signature is not exactly 32 hex characters.
    pub fn parse(raw: &str) -> Result<Self, TokenRejection> {
        let mut parts = raw.split(SEPARATOR);
        let (Some(timestamp), Some(nonce), Some(signature), None) =
            (parts.next(), parts.next(), parts.next(), parts.next())
        else {
            return Err(TokenRejection::Malformed("expected three segments"));
        };

        if timestamp.is_empty() || !timestamp.bytes().all(|b| b.is_ascii_digit()) {
            return Err(TokenRejection::Malformed("timestamp is not an integer"));
        }
        let issued_at_millis = timestamp
            .parse::<i64>()
            .map_err(|_| TokenRejection::Malformed("timestamp is not an integer"))?;
        // Only the canonical spelling is signed.
        if issued_at_millis.to_string() != timestamp {
            return Err(TokenRejection::Malformed("timestamp is not canonical"));
        }

        if signature.len() != SIGNATURE_HEX_LEN
            || !signature.bytes().all(|b| b.is_ascii_hexdigit())
        {
            return Err(TokenRejection::Malformed("signature is not 32 hex characters"));
        }

        Ok(Self {
            issued_at_millis,
            nonce: nonce.to_string(),
            signature: signature.to_string(),
        })
    }

    /// Issuance time in milliseconds since the Unix epoch.
    pub fn issued_at_millis(&self) -> i64 {
        self.issued_at_millis
    }

    /// Issuance time as a UTC timestamp, if representable.
    pub fn issued_at(&self) -> Option<DateTime<Utc>> {
        DateTime::from_timestamp_millis(self.issued_at_millis)
    }

    /// The nonce segment.
    pub fn nonce(&self) -> &str {
        &self.nonce
    }
}

impl fmt::Display for SessionToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}{SEPARATOR}{}{SEPARATOR}{}",
            self.issued_at_millis, self.nonce, self.signature
        )
    }
}

// Tokens are bearer credentials; keep the signature out of debug output.
impl fmt::Debug for SessionToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SessionToken")
            .field("issued_at_millis", &self.issued_at_millis)
            .field("signature", &"<redacted>")
            .finish()
    }
}

impl FromStr for SessionToken {
    type Err = TokenRejection;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

/// Issues and validates session tokens.
///
/// The authority holds only its freshness policy. It is `Copy`, and all of
/// its operations are pure functions of their inputs and the clock, so it
/// can be shared freely between concurrent requests.
#[derive(Debug, Clone, Copy, Default)]
pub struct TokenAuthority {
    policy: TokenPolicy,
}

impl TokenAuthority {
    /// Creates an authority with the given freshness policy.
    pub fn new(policy: TokenPolicy) -> Self {
        Self { policy }
    }

    /// The freshness policy in effect.
    pub fn policy(&self) -> TokenPolicy {
        self.policy
    }

    /// Issues a new token bound to `secret_material` at the current time.
    ///
    /// # Errors
    ///
    /// Returns [`CryptoError`] if the secure random source is unavailable.
    pub fn issue(&self, secret_material: &str) -> Result<SessionToken, CryptoError> {
        self.issue_at(secret_material, now_millis())
    }

    /// Issues a new token with an explicit issuance time.
    ///
    /// # Errors
    ///
    /// Returns [`CryptoError`] if the secure random source is unavailable.
    pub fn issue_at(
        &self,
        secret_material: &str,
        now_ms: i64,
    ) -> Result<SessionToken, CryptoError> {
        let nonce = hex::encode(random_bytes::<NONCE_BYTES>()?);
        let signature = sign(now_ms, &nonce, secret_material);
        Ok(SessionToken {
            issued_at_millis: now_ms,
            nonce,
            signature,
        })
    }

    /// Returns `true` if `token` is well-formed, fresh, and signed with
    /// `secret_material`.
    ///
    /// Never fails: every malformed, stale, or forged input yields `false`.
    pub fn validate(&self, token: &str, secret_material: &str) -> bool {
        self.validate_at(token, secret_material, now_millis())
    }

    /// [`validate`](Self::validate) with an explicit clock.
    pub fn validate_at(&self, token: &str, secret_material: &str, now_ms: i64) -> bool {
        match self.check_at(token, secret_material, now_ms) {
            Ok(_) => true,
            Err(reason) => {
                debug!(reason = %reason, "Session token rejected");
                false
            }
        }
    }

    /// Runs every validation check and reports the first failure.
    ///
    /// # Errors
    ///
    /// Returns the [`TokenRejection`] describing why the token is invalid.
    pub fn check_at(
        &self,
        token: &str,
        secret_material: &str,
        now_ms: i64,
    ) -> Result<SessionToken, TokenRejection> {
        let parsed = SessionToken::parse(token)?;

        let age_ms = now_ms.saturating_sub(parsed.issued_at_millis);
        if age_ms > self.policy.max_age_ms() {
            return Err(TokenRejection::Expired { age_ms });
        }
        if parsed.issued_at_millis > now_ms.saturating_add(self.policy.future_skew_ms()) {
            return Err(TokenRejection::Premature {
                ahead_ms: parsed.issued_at_millis.saturating_sub(now_ms),
            });
        }

        let expected = sign(parsed.issued_at_millis, &parsed.nonce, secret_material);
        if !constant_time_eq(expected.as_bytes(), parsed.signature.as_bytes()) {
            return Err(TokenRejection::SignatureMismatch);
        }

        Ok(parsed)
    }

    /// Cheap presence hint: shape and age only, no signature check.
    ///
    /// Suitable for deciding whether to show an "admin" affordance, never
    /// for granting access.
    pub fn looks_fresh(&self, token: &str) -> bool {
        self.looks_fresh_at(token, now_millis())
    }

    /// [`looks_fresh`](Self::looks_fresh) with an explicit clock.
    pub fn looks_fresh_at(&self, token: &str, now_ms: i64) -> bool {
        SessionToken::parse(token).is_ok_and(|parsed| {
            now_ms.saturating_sub(parsed.issued_at_millis) <= self.policy.max_age_ms()
        })
    }

    /// When `token` stops being accepted, in milliseconds since the epoch.
    pub fn expires_at_millis(&self, token: &SessionToken) -> i64 {
        token
            .issued_at_millis
            .saturating_add(self.policy.max_age_ms())
    }

    /// [`expires_at_millis`](Self::expires_at_millis) as a UTC timestamp.
    ///
    /// `None` if the instant is outside chrono's representable range.
    pub fn expires_at(&self, token: &SessionToken) -> Option<DateTime<Utc>> {
        DateTime::from_timestamp_millis(self.expires_at_millis(token))
    }
}

/// Current wall-clock time in milliseconds since the Unix epoch.
pub fn now_millis() -> i64 {
    Utc::now().timestamp_millis()
}

/// Computes the truncated, hex-encoded signature over the token fields.
fn sign(issued_at_millis: i64, nonce: &str, secret_material: &str) -> String {
    let digest = Sha256::new()
        .chain_update(issued_at_millis.to_string())
        .chain_update([SEPARATOR as u8])
        .chain_update(nonce)
        .chain_update([SEPARATOR as u8])
        .chain_update(secret_material)
        .finalize();
    hex::encode(&digest[..SIGNATURE_BYTES])
}
