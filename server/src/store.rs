//! Persistence media for issued session tokens.
//!
//! The token authority never persists anything itself; callers pick a
//! [`TokenStore`]. Stores hold at most one token and follow "last write
//! wins": tokens are replaced whole, never updated in place.
//!
//! - [`MemoryTokenStore`] - process-local, for servers and tests
//! - [`FileTokenStore`] - a single owner-only file, for the CLI
//!
//! Revoking a session is [`TokenStore::clear`], which is idempotent.

use std::fs::{self, File};
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};
use std::sync::{PoisonError, RwLock};

use thiserror::Error;
use tracing::trace;

/// File name used by [`FileTokenStore`] inside its directory.
pub const SESSION_FILE: &str = "admin_session";

/// Scratch file a new token is written to before it replaces [`SESSION_FILE`].
const SESSION_TEMP_FILE: &str = "admin_session.tmp";

/// Errors raised by a token store.
#[derive(Debug, Error)]
pub enum StoreError {
    /// I/O error reading or writing the token file.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// A place to keep the current admin session token.
pub trait TokenStore: Send + Sync {
    /// Returns the stored token, if any.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] if the medium cannot be read.
    fn load(&self) -> Result<Option<String>, StoreError>;

    /// Stores `token`, replacing any previous one.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] if the medium cannot be written.
    fn save(&self, token: &str) -> Result<(), StoreError>;

    /// Removes the stored token. Clearing an empty store is not an error.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] if the medium cannot be written.
    fn clear(&self) -> Result<(), StoreError>;
}

/// In-memory token store.
#[derive(Debug, Default)]
pub struct MemoryTokenStore {
    token: RwLock<Option<String>>,
}

impl MemoryTokenStore {
    /// Creates an empty store.
    pub fn new() -> Self {
        Self::default()
    }
}

impl TokenStore for MemoryTokenStore {
    fn load(&self) -> Result<Option<String>, StoreError> {
        Ok(self
            .token
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone())
    }

    fn save(&self, token: &str) -> Result<(), StoreError> {
        *self.token.write().unwrap_or_else(PoisonError::into_inner) = Some(token.to_string());
        Ok(())
    }

    fn clear(&self) -> Result<(), StoreError> {
        self.token
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        Ok(())
    }
}

/// Token store backed by a single file.
///
/// The file is created with mode 0600 on Unix. A missing or blank file
/// means "no token".
#[derive(Debug, Clone)]
pub struct FileTokenStore {
    path: PathBuf,
    temp_path: PathBuf,
}

impl FileTokenStore {
    /// Creates a store keeping its token in `dir/admin_session`.
    ///
    /// The directory is created lazily on the first save.
    pub fn new(dir: &Path) -> Self {
        Self {
            path: dir.join(SESSION_FILE),
            temp_path: dir.join(SESSION_TEMP_FILE),
        }
    }

    /// Path of the token file.
    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl TokenStore for FileTokenStore {
    fn load(&self) -> Result<Option<String>, StoreError> {
        match fs::read_to_string(&self.path) {
            Ok(contents) => {
                let token = contents.trim();
                Ok((!token.is_empty()).then(|| token.to_string()))
            }
            Err(err) if err.kind() == ErrorKind::NotFound => Ok(None),
            Err(err) => Err(err.into()),
        }
    }

    fn save(&self, token: &str) -> Result<(), StoreError> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)?;
        }

        let mut file = File::create(&self.temp_path)?;

        // Owner read/write only; the token is a bearer credential.
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            let mut perms = fs::metadata(&self.temp_path)?.permissions();
            perms.set_mode(0o600);
            fs::set_permissions(&self.temp_path, perms)?;
        }

        file.write_all(token.as_bytes())?;
        file.write_all(b"\n")?;
        file.sync_all()?;
        drop(file);

        // Readers see either the old token or the new one, never a torn write.
        fs::rename(&self.temp_path, &self.path)?;
        trace!(path = %self.path.display(), "Session token written");
        Ok(())
    }

    fn clear(&self) -> Result<(), StoreError> {
        match fs::remove_file(&self.path) {
            Ok(()) => {
                trace!(path = %self.path.display(), "Session token removed");
                Ok(())
            }
            Err(err) if err.kind() == ErrorKind::NotFound => Ok(()),
            Err(err) => Err(err.into()),
        }
    }
}
