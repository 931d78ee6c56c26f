//! One-time filesystem preparation before the supervised process starts.
//!
//! Every operation here is idempotent: running the entrypoint again over
//! the same volumes succeeds.

use std::fs::OpenOptions;
use std::io;
use std::os::unix::fs::lchown;
use std::path::{Path, PathBuf};

use walkdir::WalkDir;

use super::identity::Identity;
use crate::error::GateError;

/// Filesystem work a role needs before it can start.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PrepareSpec {
    /// Directories created if absent and recursively handed to the
    /// restricted identity.
    pub owned_dirs: Vec<PathBuf>,
    /// Files created empty if absent, owned by the restricted identity.
    pub log_files: Vec<PathBuf>,
    /// File removed unconditionally.
    pub stale_pidfile: Option<PathBuf>,
}

impl PrepareSpec {
    /// Returns `true` when there is nothing to do.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.owned_dirs.is_empty() && self.log_files.is_empty() && self.stale_pidfile.is_none()
    }

    /// Applies the preparation. Ownership is only changed when `owner` is
    /// given.
    ///
    /// # Errors
    ///
    /// Returns [`GateError::Prepare`] on the first filesystem failure.
    pub fn apply(&self, owner: Option<&Identity>) -> Result<(), GateError> {
        for dir in &self.owned_dirs {
            std::fs::create_dir_all(dir).map_err(|source| prepare_error(dir, source))?;
            if let Some(owner) = owner {
                chown_recursive(dir, owner)?;
            }
        }

        for file in &self.log_files {
            ensure_file(file, owner)?;
        }

        if let Some(pidfile) = &self.stale_pidfile {
            remove_if_present(pidfile)?;
        }

        Ok(())
    }
}

/// Hands `root` and everything below it to `owner`. Symlinks are changed
/// themselves, never followed.
///
/// # Errors
///
/// Returns [`GateError::Prepare`] if the tree cannot be walked or an entry
/// cannot be changed.
pub fn chown_recursive(root: &Path, owner: &Identity) -> Result<(), GateError> {
    let mut changed: u64 = 0;
    for entry in WalkDir::new(root) {
        let entry = entry.map_err(|e| {
            let path = e.path().unwrap_or(root).to_path_buf();
            prepare_error(&path, io::Error::from(e))
        })?;
        lchown(entry.path(), Some(owner.uid), Some(owner.gid))
            .map_err(|source| prepare_error(entry.path(), source))?;
        changed = changed.saturating_add(1);
    }
    tracing::info!(
        path = %root.display(),
        owner = %owner.name,
        entries = changed,
        "ownership updated"
    );
    Ok(())
}

/// Creates `path` if absent (keeping existing content) and hands it to
/// `owner`.
///
/// # Errors
///
/// Returns [`GateError::Prepare`] on failure.
pub fn ensure_file(path: &Path, owner: Option<&Identity>) -> Result<(), GateError> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).map_err(|source| prepare_error(parent, source))?;
    }
    OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .map_err(|source| prepare_error(path, source))?;
    if let Some(owner) = owner {
        lchown(path, Some(owner.uid), Some(owner.gid))
            .map_err(|source| prepare_error(path, source))?;
    }
    Ok(())
}

/// Removes `path`; a missing file is fine.
///
/// # Errors
///
/// Returns [`GateError::Prepare`] for any other failure.
pub fn remove_if_present(path: &Path) -> Result<(), GateError> {
    match std::fs::remove_file(path) {
        Ok(()) => {
            tracing::info!(path = %path.display(), "removed stale pid file");
            Ok(())
        }
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
        Err(source) => Err(prepare_error(path, source)),
    }
}

fn prepare_error(path: &Path, source: io::Error) -> GateError {
    GateError::Prepare {
        path: path.to_path_buf(),
        source,
    }
}
