//! Server configuration module.
//!
//! Parses configuration from environment variables for the Folio Gate
//! server and CLI.
//!
//! # Environment Variables
//!
//! | Variable | Required | Default | Description |
//! |----------|----------|---------|-------------|
//! | `FOLIO_ADMIN_PASSWORD_HASH` | Yes | - | Lowercase hex SHA-256 of the admin password |
//! | `FOLIO_TOTP_SECRET` | No | - | Base32 TOTP secret; unset means password only |
//! | `FOLIO_SESSION_MAX_AGE_SECS` | No | 86400 | Session token lifetime |
//! | `FOLIO_SESSION_FUTURE_SKEW_SECS` | No | 60 | Tolerated clock skew for token timestamps |
//! | `FOLIO_TOTP_SKEW_STEPS` | No | 1 | Accepted TOTP steps either side of now |
//! | `FOLIO_COOKIE_SECURE` | No | false | Add `Secure` to the session cookie |
//! | `FOLIO_TRUST_FORWARDED_FOR` | No | false | Throttle by `X-Forwarded-For` (only behind a trusted proxy) |
//! | `PORT` | No | 8080 | HTTP server port |

use std::env;
use std::fmt;
use std::time::Duration;

use thiserror::Error;
use tracing::{info, warn};

use crate::gate::{AdminCredentials, AdminGate};
use crate::token::{TokenAuthority, TokenPolicy};
use crate::totp::{TotpSecret, TotpVerifier, DEFAULT_SKEW_STEPS};

/// Default HTTP server port.
const DEFAULT_PORT: u16 = 8080;

/// Default session lifetime (24 hours).
const DEFAULT_MAX_AGE_SECS: u64 = 86_400;

/// Default tolerance for tokens stamped slightly in the future.
const DEFAULT_FUTURE_SKEW_SECS: u64 = 60;

/// Length of a hex-encoded SHA-256 digest.
const PASSWORD_HASH_LEN: usize = 64;

/// Largest accepted TOTP skew. Each step widens the window by 30 seconds.
const MAX_TOTP_SKEW_STEPS: u32 = 10;

/// Errors that can occur when parsing configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Required environment variable is missing.
    #[error("missing required environment variable: {0}")]
    MissingEnvVar(String),

    /// Environment variable has invalid format.
    #[error("invalid format for {var}: {message}")]
    InvalidFormat { var: String, message: String },

    /// Port number is invalid.
    #[error("invalid port number: {0}")]
    InvalidPort(#[from] std::num::ParseIntError),

    /// Configuration validation failed.
    #[error("configuration validation failed: {0}")]
    ValidationError(String),
}

impl ConfigError {
    fn invalid(var: &str, message: impl Into<String>) -> Self {
        Self::InvalidFormat {
            var: var.to_string(),
            message: message.into(),
        }
    }
}

/// Configuration parsed from environment variables.
#[derive(Clone)]
pub struct Config {
    /// Expected admin password hash, lowercase hex.
    pub password_hash: String,

    /// TOTP secret, if the second factor is enabled.
    pub totp_secret: Option<TotpSecret>,

    /// Session token lifetime.
    pub session_max_age: Duration,

    /// How far in the future a token timestamp may be.
    pub session_future_skew: Duration,

    /// TOTP steps accepted either side of the current one.
    pub totp_skew_steps: u32,

    /// When true, the session cookie carries the `Secure` attribute.
    pub cookie_secure: bool,

    /// When true, the login throttle keys on the first `X-Forwarded-For`
    /// entry instead of the peer address. Only safe behind a proxy that
    /// overwrites the header.
    pub trust_forwarded_for: bool,

    /// HTTP server port.
    pub port: u16,
}

impl fmt::Debug for Config {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Config")
            .field("password_hash", &"[REDACTED]")
            .field("totp_enabled", &self.totp_secret.is_some())
            .field("session_max_age", &self.session_max_age)
            .field("session_future_skew", &self.session_future_skew)
            .field("totp_skew_steps", &self.totp_skew_steps)
            .field("cookie_secure", &self.cookie_secure)
            .field("trust_forwarded_for", &self.trust_forwarded_for)
            .field("port", &self.port)
            .finish()
    }
}

impl Config {
    /// Parse configuration from environment variables.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` if:
    /// - `FOLIO_ADMIN_PASSWORD_HASH` is missing or not 64 hex characters
    /// - `FOLIO_TOTP_SECRET` is set but is not valid base32
    /// - A numeric variable does not parse or is out of range
    /// - Port number is not a valid u16
    ///
    /// # Example
    ///
    /// ```no_run
    /// use folio_gate::config::Config;
    ///
    /// let config = Config::from_env().expect("Failed to load config");
    /// println!("Server will listen on port {}", config.port);
    /// ```
    pub fn from_env() -> Result<Self, ConfigError> {
        let password_hash = parse_password_hash()?;
        let totp_secret = parse_totp_secret()?;
        let session_max_age = Duration::from_secs(parse_u64_env(
            "FOLIO_SESSION_MAX_AGE_SECS",
            DEFAULT_MAX_AGE_SECS,
        )?);
        let session_future_skew = Duration::from_secs(parse_u64_env(
            "FOLIO_SESSION_FUTURE_SKEW_SECS",
            DEFAULT_FUTURE_SKEW_SECS,
        )?);
        let totp_skew_steps = u32::try_from(parse_u64_env(
            "FOLIO_TOTP_SKEW_STEPS",
            u64::from(DEFAULT_SKEW_STEPS),
        )?)
        .map_err(|_| ConfigError::invalid("FOLIO_TOTP_SKEW_STEPS", "value too large"))?;
        let cookie_secure = parse_bool_env("FOLIO_COOKIE_SECURE");
        let trust_forwarded_for = parse_bool_env("FOLIO_TRUST_FORWARDED_FOR");
        let port = parse_port()?;

        let config = Self {
            password_hash,
            totp_secret,
            session_max_age,
            session_future_skew,
            totp_skew_steps,
            cookie_secure,
            trust_forwarded_for,
            port,
        };

        config.validate()?;

        if config.trust_forwarded_for {
            warn!("FOLIO_TRUST_FORWARDED_FOR is set - login throttle trusts X-Forwarded-For");
        }
        if config.totp_secret.is_none() {
            warn!("FOLIO_TOTP_SECRET is not set - admin login is password only");
        }
        info!(
            totp_enabled = config.totp_secret.is_some(),
            session_max_age_secs = config.session_max_age.as_secs(),
            "Admin gate configuration loaded"
        );

        Ok(config)
    }

    /// Validate the configuration.
    fn validate(&self) -> Result<(), ConfigError> {
        if self.session_max_age.is_zero() {
            return Err(ConfigError::ValidationError(
                "FOLIO_SESSION_MAX_AGE_SECS must be greater than zero".to_string(),
            ));
        }

        // Millisecond arithmetic on token timestamps must not overflow.
        if i64::try_from(self.session_max_age.as_millis()).is_err()
            || i64::try_from(self.session_future_skew.as_millis()).is_err()
        {
            return Err(ConfigError::ValidationError(
                "session durations are too large".to_string(),
            ));
        }

        if self.totp_skew_steps > MAX_TOTP_SKEW_STEPS {
            return Err(ConfigError::ValidationError(format!(
                "FOLIO_TOTP_SKEW_STEPS must be at most {MAX_TOTP_SKEW_STEPS}"
            )));
        }

        Ok(())
    }

    /// Returns `true` if logins require a TOTP code.
    pub fn totp_enabled(&self) -> bool {
        self.totp_secret.is_some()
    }

    /// Token freshness policy derived from the session settings.
    pub fn token_policy(&self) -> TokenPolicy {
        TokenPolicy::new(self.session_max_age, self.session_future_skew)
    }

    /// Builds the admin gate described by this configuration.
    pub fn gate(&self) -> AdminGate {
        AdminGate::new(
            AdminCredentials::new(self.password_hash.clone(), self.totp_secret.clone()),
            TokenAuthority::new(self.token_policy()),
            TotpVerifier::new(self.totp_skew_steps),
        )
    }
}

/// Parse a boolean environment variable.
///
/// Returns `true` if the variable is set to "true" (case-insensitive),
/// `false` otherwise.
fn parse_bool_env(name: &str) -> bool {
    env::var(name)
        .map(|v| v.eq_ignore_ascii_case("true"))
        .unwrap_or(false)
}

/// Parse an unsigned integer environment variable, falling back to
/// `default` when unset or empty.
fn parse_u64_env(name: &str, default: u64) -> Result<u64, ConfigError> {
    match env::var(name) {
        Ok(value) if value.trim().is_empty() => Ok(default),
        Ok(value) => value
            .trim()
            .parse()
            .map_err(|err| ConfigError::invalid(name, format!("{err}"))),
        Err(env::VarError::NotPresent) => Ok(default),
        Err(env::VarError::NotUnicode(_)) => Err(ConfigError::invalid(
            name,
            "contains invalid unicode",
        )),
    }
}

/// Parse the PORT environment variable.
///
/// Returns the default port if not set.
fn parse_port() -> Result<u16, ConfigError> {
    match env::var("PORT") {
        Ok(port_str) => Ok(port_str.parse()?),
        Err(env::VarError::NotPresent) => Ok(DEFAULT_PORT),
        Err(env::VarError::NotUnicode(_)) => Err(ConfigError::invalid(
            "PORT",
            "contains invalid unicode",
        )),
    }
}

/// Parse the FOLIO_ADMIN_PASSWORD_HASH environment variable.
///
/// Expected format: 64 hex characters (SHA-256), normalised to lowercase.
fn parse_password_hash() -> Result<String, ConfigError> {
    let hash = match env::var("FOLIO_ADMIN_PASSWORD_HASH") {
        Ok(s) if !s.trim().is_empty() => s.trim().to_ascii_lowercase(),
        _ => {
            return Err(ConfigError::MissingEnvVar(
                "FOLIO_ADMIN_PASSWORD_HASH".to_string(),
            ))
        }
    };

    if hash.len() != PASSWORD_HASH_LEN || !hash.bytes().all(|b| b.is_ascii_hexdigit()) {
        return Err(ConfigError::invalid(
            "FOLIO_ADMIN_PASSWORD_HASH",
            format!("expected {PASSWORD_HASH_LEN} hex characters (SHA-256)"),
        ));
    }

    Ok(hash)
}

/// Parse the FOLIO_TOTP_SECRET environment variable.
///
/// An unset or empty variable disables the TOTP step.
fn parse_totp_secret() -> Result<Option<TotpSecret>, ConfigError> {
    let encoded = match env::var("FOLIO_TOTP_SECRET") {
        Ok(s) if !s.trim().is_empty() => s,
        _ => return Ok(None),
    };

    TotpSecret::parse(encoded.trim())
        .map(Some)
        .map_err(|err| ConfigError::invalid("FOLIO_TOTP_SECRET", err.to_string()))
}
