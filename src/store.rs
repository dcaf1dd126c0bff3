//! Object store collaborator, backed by the git executable
//!
//! Two disposable stores are provided: [`SnapshotStore`] stages a directory
//! out of place and builds the pack body, [`EphemeralStore`] is a bare store
//! whose only objects come from a pack body and which checks trees out.
//! Each one lives in a uniquely named temporary directory that is removed
//! when the store is dropped.

mod command;
mod ephemeral;
mod snapshot;

use std::fs;
use std::path::{Path, PathBuf};

use tempfile::TempDir;

use crate::error::StoreError;

pub use command::ensure_available;
pub use ephemeral::EphemeralStore;
pub use snapshot::SnapshotStore;

/// Create a uniquely named directory under `scratch_root`, with an absolute path
fn scratch_dir(scratch_root: &Path, prefix: &str) -> Result<TempDir, StoreError> {
    fs::create_dir_all(scratch_root).map_err(|e| {
        StoreError::io(
            format!("failed to create scratch root {}", scratch_root.display()),
            e,
        )
    })?;
    let scratch_root = absolute(scratch_root)?;
    tempfile::Builder::new()
        .prefix(prefix)
        .tempdir_in(&scratch_root)
        .map_err(|e| {
            StoreError::io(
                format!("failed to create temporary directory in {}", scratch_root.display()),
                e,
            )
        })
}

/// Absolute form of `path`, which must exist
fn absolute(path: &Path) -> Result<PathBuf, StoreError> {
    path.canonicalize()
        .map_err(|e| StoreError::io(format!("failed to resolve {}", path.display()), e))
}
