//! Error types for the Folio Gate server.
//!
//! Credential problems (wrong password, bad code, expired or forged token)
//! are *not* errors in this crate: they collapse to `false` or to a
//! rejection outcome at the component boundary. The types here cover the
//! conditions that must stay distinguishable from "invalid credentials".
//!
//! # Error Types
//!
//! - [`CryptoError`] - The host's random source or keyed hash failed
//! - [`ServerError`] - Top-level error for the HTTP surface and binaries

use std::error::Error;
use std::fmt;

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;
use thiserror::Error as ThisError;
use tracing::error;

use crate::config::ConfigError;
use crate::store::StoreError;

/// Failure of an underlying cryptographic primitive.
///
/// This is an environment failure, never a user input problem, and is
/// always propagated rather than reported as an invalid credential.
#[derive(ThisError, Debug, Clone, PartialEq, Eq)]
pub enum CryptoError {
    /// The operating system's secure random source could not be read.
    #[error("secure random source unavailable: {0}")]
    RandomUnavailable(String),
}

impl CryptoError {
    /// Creates a random source error from any displayable cause.
    pub fn random(cause: impl fmt::Display) -> Self {
        Self::RandomUnavailable(cause.to_string())
    }
}

/// Top-level error type for the Folio Gate server.
///
/// # Error Categories
///
/// - **Configuration errors**: Problems loading or validating server config
/// - **Crypto errors**: The platform could not provide randomness
/// - **Store errors**: The token persistence medium failed
/// - **Authentication errors**: Generic rejection, never carrying the reason
/// - **Rate limiting**: Too many login attempts from one client
/// - **Internal errors**: Unexpected failures that don't fit other categories
#[derive(Debug)]
pub enum ServerError {
    /// Configuration error during server initialization.
    Config(ConfigError),

    /// Cryptographic primitive failure.
    Crypto(CryptoError),

    /// Token persistence failure.
    Store(StoreError),

    /// Authentication failure with a user-facing message and machine code.
    Auth {
        /// Generic message shown to the user.
        message: String,
        /// Stable machine-readable code.
        code: String,
    },

    /// Too many attempts from one client.
    RateLimit {
        /// Identifier for the throttled client.
        source: String,
        /// Number of seconds until the client may retry.
        retry_after: u64,
    },

    /// Unexpected internal server error.
    Internal(String),
}

impl fmt::Display for ServerError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Config(err) => write!(f, "configuration error: {err}"),
            Self::Crypto(err) => write!(f, "crypto error: {err}"),
            Self::Store(err) => write!(f, "token store error: {err}"),
            Self::Auth { message, .. } => write!(f, "authentication failed: {message}"),
            Self::RateLimit {
                source,
                retry_after,
            } => {
                write!(
                    f,
                    "too many attempts from {source}, retry after {retry_after} seconds"
                )
            }
            Self::Internal(msg) => write!(f, "internal server error: {msg}"),
        }
    }
}

impl Error for ServerError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Config(err) => Some(err),
            Self::Crypto(err) => Some(err),
            Self::Store(err) => Some(err),
            _ => None,
        }
    }
}

impl From<ConfigError> for ServerError {
    fn from(err: ConfigError) -> Self {
        Self::Config(err)
    }
}

impl From<CryptoError> for ServerError {
    fn from(err: CryptoError) -> Self {
        Self::Crypto(err)
    }
}

impl From<StoreError> for ServerError {
    fn from(err: StoreError) -> Self {
        Self::Store(err)
    }
}

impl ServerError {
    /// Creates a new authentication error.
    ///
    /// # Example
    ///
    /// ```rust
    /// use folio_gate::error::ServerError;
    ///
    /// let err = ServerError::auth("incorrect password", "invalid_credentials");
    /// assert!(matches!(err, ServerError::Auth { .. }));
    /// ```
    pub fn auth(message: impl Into<String>, code: impl Into<String>) -> Self {
        Self::Auth {
            message: message.into(),
            code: code.into(),
        }
    }

    /// Creates a new rate limit error.
    pub fn rate_limit(source: impl Into<String>, retry_after: u64) -> Self {
        Self::RateLimit {
            source: source.into(),
            retry_after,
        }
    }

    /// Creates a new internal error.
    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal(message.into())
    }

    /// Returns `true` if this error indicates a client-side problem.
    pub fn is_client_error(&self) -> bool {
        matches!(self, Self::Auth { .. } | Self::RateLimit { .. })
    }

    /// Returns `true` if this error indicates a server-side problem.
    pub fn is_server_error(&self) -> bool {
        !self.is_client_error()
    }

    /// The HTTP status this error maps to.
    pub fn status_code(&self) -> StatusCode {
        match self {
            Self::Auth { .. } => StatusCode::UNAUTHORIZED,
            Self::RateLimit { .. } => StatusCode::TOO_MANY_REQUESTS,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

/// JSON error response body.
#[derive(Debug, Serialize)]
pub(crate) struct ErrorResponse {
    pub(crate) error: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub(crate) code: Option<String>,
}

impl ErrorResponse {
    pub(crate) fn new(error: impl Into<String>) -> Self {
        Self {
            error: error.into(),
            code: None,
        }
    }

    pub(crate) fn with_code(mut self, code: impl Into<String>) -> Self {
        self.code = Some(code.into());
        self
    }
}

impl IntoResponse for ServerError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        match self {
            Self::Auth { message, code } => {
                (status, Json(ErrorResponse::new(message).with_code(code))).into_response()
            }
            Self::RateLimit { retry_after, .. } => (
                status,
                [("Retry-After", retry_after.to_string())],
                Json(ErrorResponse::new("too many attempts").with_code("rate_limited")),
            )
                .into_response(),
            other => {
                // Internal details stay in the log, never in the body.
                error!(error = %other, "Request failed with server error");
                (
                    status,
                    Json(ErrorResponse::new("internal server error").with_code("server_error")),
                )
                    .into_response()
            }
        }
    }
}

/// A specialized Result type for server operations.
pub type Result<T> = std::result::Result<T, ServerError>;
