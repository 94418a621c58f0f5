//! Client-side admin session: a gate paired with somewhere to keep the token.
//!
//! [`AdminSession`] is what an embedding application holds. Signing in stores
//! the issued token; checking the session re-validates the stored token on
//! every call and discards it as soon as it stops being valid, so an expired
//! or forged token is never kept around.
//!
//! # Example
//!
//! ```rust
//! use std::sync::Arc;
//!
//! use folio_gate::gate::{hash_password, AdminCredentials, AdminGate};
//! use folio_gate::session::{AdminSession, SessionState};
//! use folio_gate::store::MemoryTokenStore;
//!
//! let gate = Arc::new(AdminGate::new(
//!     AdminCredentials::password_only(hash_password("hunter2")),
//!     Default::default(),
//!     Default::default(),
//! ));
//! let session = AdminSession::new(gate, MemoryTokenStore::new());
//!
//! session.sign_in("hunter2", None).unwrap();
//! assert!(matches!(session.check().unwrap(), SessionState::Active { .. }));
//!
//! session.revoke().unwrap();
//! assert_eq!(session.check().unwrap(), SessionState::SignedOut);
//! ```

use std::sync::Arc;

use chrono::{DateTime, Utc};
use tracing::{debug, info};

use crate::error::{Result, ServerError};
use crate::gate::{AdminGate, LoginOutcome};
use crate::store::TokenStore;

/// State of the stored session after validation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionState {
    /// A valid token is stored.
    Active {
        /// When the token was issued.
        issued_at: DateTime<Utc>,
        /// When the token stops being accepted.
        expires_at: DateTime<Utc>,
    },
    /// No valid token is stored.
    SignedOut,
}

impl SessionState {
    /// Returns `true` for [`SessionState::Active`].
    pub fn is_active(&self) -> bool {
        matches!(self, Self::Active { .. })
    }
}

/// An [`AdminGate`] bound to a [`TokenStore`].
pub struct AdminSession<S: TokenStore> {
    gate: Arc<AdminGate>,
    store: S,
}

impl<S: TokenStore> AdminSession<S> {
    /// Creates a session over `store`.
    pub fn new(gate: Arc<AdminGate>, store: S) -> Self {
        Self { gate, store }
    }

    /// The gate this session authenticates against.
    pub fn gate(&self) -> &AdminGate {
        &self.gate
    }

    /// The underlying store.
    pub fn store(&self) -> &S {
        &self.store
    }

    /// Attempts to sign in and stores the token on success.
    ///
    /// The store is left untouched unless the outcome is
    /// [`LoginOutcome::Authenticated`].
    ///
    /// # Errors
    ///
    /// Returns [`ServerError::Crypto`] if a token cannot be issued, or
    /// [`ServerError::Store`] if it cannot be saved.
    pub fn sign_in(&self, password: &str, code: Option<&str>) -> Result<LoginOutcome> {
        let outcome = self.gate.login(password, code)?;
        self.persist(outcome)
    }

    /// Stores the token carried by an authenticated outcome.
    ///
    /// Used after [`AdminGate::complete`] by interactive callers.
    ///
    /// # Errors
    ///
    /// Returns [`ServerError::Store`] if the token cannot be saved.
    pub fn persist(&self, outcome: LoginOutcome) -> Result<LoginOutcome> {
        if let LoginOutcome::Authenticated(token) = &outcome {
            self.store.save(&token.to_string())?;
            info!("Admin session stored");
        }
        Ok(outcome)
    }

    /// Validates the stored token, clearing it if it is no longer valid.
    ///
    /// # Errors
    ///
    /// Returns [`ServerError::Store`] if the store cannot be read or cleared.
    pub fn check(&self) -> Result<SessionState> {
        let Some(raw) = self.store.load()? else {
            return Ok(SessionState::SignedOut);
        };

        let Some(token) = self.gate.inspect(&raw) else {
            debug!("Stored session token invalid, clearing");
            self.store.clear()?;
            return Ok(SessionState::SignedOut);
        };

        match (token.issued_at(), self.gate.authority().expires_at(&token)) {
            (Some(issued_at), Some(expires_at)) => Ok(SessionState::Active {
                issued_at,
                expires_at,
            }),
            _ => Err(ServerError::internal("session timestamp out of range")),
        }
    }

    /// Removes the stored token. Revoking twice is not an error.
    ///
    /// # Errors
    ///
    /// Returns [`ServerError::Store`] if the store cannot be cleared.
    pub fn revoke(&self) -> Result<()> {
        self.store.clear()?;
        info!("Admin session revoked");
        Ok(())
    }
}
