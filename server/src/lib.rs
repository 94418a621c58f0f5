//! Folio Gate - admin sessions for a personal site.
//!
//! This crate protects an admin area with:
//! - A password check against a configured SHA-256 hash
//! - An optional TOTP second factor (RFC 6238, SHA-1, 6 digits, 30 s)
//! - Signed, time-limited session tokens that need no server-side storage
//!
//! # Architecture
//!
//! [`token::TokenAuthority`] and [`totp::TotpVerifier`] are pure building
//! blocks. [`gate::AdminGate`] combines them into a login flow,
//! [`session::AdminSession`] binds that flow to a [`store::TokenStore`], and
//! [`routes`] exposes it over HTTP with the token in an `HttpOnly` cookie.

pub mod config;
mod crypto;
pub mod error;
pub mod gate;
pub mod rate_limit;
pub mod routes;
pub mod session;
pub mod store;
pub mod token;
pub mod totp;
pub mod types;
