//! Persisted "already purchased" marker.
//!
//! Presence of the marker file is the only source of truth. Creating it is a
//! set-if-absent operation (`create_new`), so concurrent writers converge on
//! the same state and nothing ever clears it.

use std::fs::{self, OpenOptions};
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};

use crate::error::GuardError;

#[derive(Debug, Clone)]
pub struct PurchaseGuard {
    path: PathBuf,
}

impl PurchaseGuard {
    #[must_use]
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    #[must_use]
    pub fn exists(&self) -> bool {
        self.path.exists()
    }

    /// Creates the marker if absent.
    ///
    /// Returns `true` when this call created it, `false` when it was already
    /// present.
    ///
    /// # Errors
    ///
    /// Returns [`GuardError`] if the parent directory or file cannot be written.
    pub fn create(&self) -> Result<bool, GuardError> {
        let wrap = |source| GuardError {
            path: self.path.clone(),
            source,
        };

        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent).map_err(wrap)?;
        }

        match OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(&self.path)
        {
            Ok(mut file) => {
                file.write_all(b"{}").map_err(wrap)?;
                file.sync_all().map_err(wrap)?;
                tracing::info!(path = %self.path.display(), "purchase guard created");
                Ok(true)
            }
            Err(e) if e.kind() == ErrorKind::AlreadyExists => {
                tracing::debug!(path = %self.path.display(), "purchase guard already present");
                Ok(false)
            }
            Err(e) => Err(wrap(e)),
        }
    }
}
