//! Sibling backups of container files.
//!
//! A backup of `resources.assets` lives at `resources.assets.backup` and is
//! an exact byte copy with no header. Creating a backup overwrites any
//! earlier one; restoring copies it back and leaves the backup in place.
//! Both directions go through [`atomic_copy`], so neither the backup nor the
//! restored file is ever observed half-written, and both are verified by
//! xxh3 digest after the copy.

use crate::atomic::atomic_copy;
use std::ffi::OsString;
use std::fs::File;
use std::io::{self, Read};
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::{debug, info};
use xxhash_rust::xxh3::Xxh3;

pub const BACKUP_SUFFIX: &str = ".backup";

#[derive(Error, Debug)]
pub enum BackupError {
    #[error("source file does not exist: {path}")]
    SourceNotFound { path: PathBuf },

    #[error("failed to create backup {path}: {source}")]
    BackupWriteError {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("backup file does not exist: {path}")]
    BackupNotFound { path: PathBuf },

    #[error("failed to restore {path} from backup: {source}")]
    RestoreWriteError {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("copy verification failed: {path} does not match its source")]
    VerificationFailed { path: PathBuf },
}

/// `<path>.backup`, appended to the full file name.
pub fn backup_path(path: &Path) -> PathBuf {
    let mut name = OsString::from(path.as_os_str());
    name.push(BACKUP_SUFFIX);
    PathBuf::from(name)
}

/// Creates and restores sibling backups. Stateless; construct one wherever
/// it is needed.
#[derive(Debug, Clone, Copy, Default)]
pub struct BackupManager;

impl BackupManager {
    pub fn new() -> Self {
        Self
    }

    /// Copy `path` to `<path>.backup`, replacing any earlier backup.
    pub fn create_backup(&self, path: &Path) -> Result<PathBuf, BackupError> {
        if !path.exists() {
            return Err(BackupError::SourceNotFound {
                path: path.to_path_buf(),
            });
        }

        let backup = backup_path(path);
        let bytes = atomic_copy(path, &backup).map_err(|source| BackupError::BackupWriteError {
            path: backup.clone(),
            source,
        })?;

        let same = files_match(path, &backup).map_err(|source| BackupError::BackupWriteError {
            path: backup.clone(),
            source,
        })?;
        if !same {
            return Err(BackupError::VerificationFailed { path: backup });
        }

        info!(backup = %backup.display(), bytes, "created backup");
        Ok(backup)
    }

    /// Copy `<path>.backup` back over `path`.
    pub fn restore_backup(&self, path: &Path) -> Result<(), BackupError> {
        let backup = backup_path(path);
        if !backup.exists() {
            return Err(BackupError::BackupNotFound { path: backup });
        }

        let bytes = atomic_copy(&backup, path).map_err(|source| BackupError::RestoreWriteError {
            path: path.to_path_buf(),
            source,
        })?;

        let same = files_match(&backup, path).map_err(|source| BackupError::RestoreWriteError {
            path: path.to_path_buf(),
            source,
        })?;
        if !same {
            return Err(BackupError::VerificationFailed {
                path: path.to_path_buf(),
            });
        }

        info!(path = %path.display(), bytes, "restored from backup");
        Ok(())
    }

    pub fn has_backup(&self, path: &Path) -> bool {
        backup_path(path).is_file()
    }

    /// Whether `path` currently holds exactly the bytes of its backup.
    pub fn matches_backup(&self, path: &Path) -> Result<bool, BackupError> {
        let backup = backup_path(path);
        if !backup.exists() {
            return Err(BackupError::BackupNotFound { path: backup });
        }
        if !path.exists() {
            return Err(BackupError::SourceNotFound {
                path: path.to_path_buf(),
            });
        }
        files_match(path, &backup).map_err(|source| BackupError::BackupWriteError {
            path: backup,
            source,
        })
    }
}

fn files_match(a: &Path, b: &Path) -> io::Result<bool> {
    let (len_a, digest_a) = digest(a)?;
    let (len_b, digest_b) = digest(b)?;
    debug!(a = %a.display(), b = %b.display(), digest_a, digest_b, "compared digests");
    Ok(len_a == len_b && digest_a == digest_b)
}

/// Streaming xxh3 digest of a file, with its length.
fn digest(path: &Path) -> io::Result<(u64, u64)> {
    let mut file = File::open(path)?;
    let mut hasher = Xxh3::new();
    let mut buf = vec![0u8; 64 * 1024];
    let mut total = 0u64;
    loop {
        let n = file.read(&mut buf)?;
        if n == 0 {
            break;
        }
        hasher.update(&buf[..n]);
        total += n as u64;
    }
    Ok((total, hasher.digest()))
}
