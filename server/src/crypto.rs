//! Small cryptographic helpers shared by the token and TOTP modules.

use rand::rngs::OsRng;
use rand::TryRngCore;
use sha2::{Digest, Sha256};
use subtle::ConstantTimeEq;

use crate::error::CryptoError;

/// Fills `N` bytes from the operating system's secure random source.
///
/// # Errors
///
/// Returns [`CryptoError::RandomUnavailable`] if the OS RNG cannot be read.
pub(crate) fn random_bytes<const N: usize>() -> Result<[u8; N], CryptoError> {
    let mut bytes = [0u8; N];
    OsRng
        .try_fill_bytes(&mut bytes)
        .map_err(|err| CryptoError::random(err))?;
    Ok(bytes)
}

/// Lowercase hex SHA-256 of `input`.
///
/// This is the admin password hash format expected in configuration.
pub(crate) fn sha256_hex(input: &[u8]) -> String {
    hex::encode(Sha256::digest(input))
}

/// Compares two byte strings without short-circuiting on the first mismatch.
///
/// Length differences are not hidden; every caller compares fixed-width
/// values (signatures, hashes, codes).
pub(crate) fn constant_time_eq(a: &[u8], b: &[u8]) -> bool {
    a.ct_eq(b).into()
}
