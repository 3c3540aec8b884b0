//! Process-wide registry of container paths with a patch run in progress.
//!
//! Only one run may target a container at a time. The registry enforces that
//! within one process; separate processes are still the caller's problem.

use super::EngineError;
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, OnceLock, PoisonError};

static ACTIVE_RUNS: OnceLock<Mutex<HashSet<PathBuf>>> = OnceLock::new();

fn active_runs() -> &'static Mutex<HashSet<PathBuf>> {
    ACTIVE_RUNS.get_or_init(|| Mutex::new(HashSet::new()))
}

fn registry_key(path: &Path) -> PathBuf {
    path.canonicalize().unwrap_or_else(|_| path.to_path_buf())
}

/// Held for the duration of a run; releases the path on drop.
#[derive(Debug)]
pub(crate) struct RunGuard {
    key: PathBuf,
}

impl RunGuard {
    pub fn acquire(path: &Path) -> Result<Self, EngineError> {
        let key = registry_key(path);
        let mut active = active_runs().lock().unwrap_or_else(PoisonError::into_inner);
        if !active.insert(key.clone()) {
            return Err(EngineError::AlreadyRunning {
                path: path.to_path_buf(),
            });
        }
        Ok(Self { key })
    }
}

impl Drop for RunGuard {
    fn drop(&mut self) {
        let mut active = active_runs().lock().unwrap_or_else(PoisonError::into_inner);
        active.remove(&self.key);
    }
}

/// Whether a run currently holds `path`.
pub fn is_running(path: &Path) -> bool {
    let key = registry_key(path);
    active_runs()
        .lock()
        .unwrap_or_else(PoisonError::into_inner)
        .contains(&key)
}
