//! Lock file guarding a database against concurrent sweeps

use crate::ConfigError;
use std::fs::{self, OpenOptions};
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};

/// Exclusive hold on a sweep database, released on drop
///
/// The lock is a sibling file `<database>.lock` holding the owner's pid.
#[derive(Debug)]
pub struct LedgerLock {
    path: PathBuf,
}

impl LedgerLock {
    /// Takes the lock for the database at `db_path`
    ///
    /// # Errors
    ///
    /// * `ConfigError::Locked` - another process holds the lock
    /// * `ConfigError::Io` - the lock file could not be created
    pub fn acquire(db_path: &Path) -> Result<Self, ConfigError> {
        let mut name = db_path.as_os_str().to_owned();
        name.push(".lock");
        let path = PathBuf::from(name);

        match OpenOptions::new().write(true).create_new(true).open(&path) {
            Ok(mut file) => {
                writeln!(file, "{}", std::process::id())?;
                tracing::debug!("Acquired lock {}", path.display());
                Ok(Self { path })
            }
            Err(e) if e.kind() == ErrorKind::AlreadyExists => {
                let holder = fs::read_to_string(&path)
                    .map(|pid| pid.trim().to_string())
                    .unwrap_or_else(|_| "unknown".to_string());
                Err(ConfigError::Locked { path, holder })
            }
            Err(e) => Err(ConfigError::Io(e)),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for LedgerLock {
    fn drop(&mut self) {
        if let Err(e) = fs::remove_file(&self.path) {
            tracing::warn!("Failed to remove lock {}: {}", self.path.display(), e);
        }
    }
}
