//! Directory to container: snapshot, pack body, trailer

use std::fs;
use std::io::{BufWriter, Write};
use std::path::Path;

use crate::config::GitpackConfig;
use crate::container;
use crate::error::{PackError, StoreError};
use crate::objects::ObjectId;
use crate::store::SnapshotStore;

/// Packs directories into container files
#[derive(Debug, Clone, Default)]
pub struct Packer {
    config: GitpackConfig,
}

impl Packer {
    pub fn new(config: GitpackConfig) -> Self {
        Self { config }
    }

    /// Snapshot `source` and write it to `output` as a container
    ///
    /// Flow:
    /// 1. Stage `source` into a scratch repository (the source is not modified)
    /// 2. Write the index as a tree and commit it with the configured identity
    /// 3. Stream a pack of everything reachable from the commit
    /// 4. Append the commit identifier as the trailer
    ///
    /// Returns the commit the container is anchored to.
    pub fn pack(&self, source: &Path, output: &Path) -> Result<ObjectId, PackError> {
        let format = self.config.object_format;
        tracing::info!("Packing {} into {}", source.display(), output.display());

        let store = SnapshotStore::create(
            &self.config.git_program,
            &self.config.scratch_root(),
            format,
            source,
        )
        .map_err(PackError::StageFailed)?;
        store
            .stage_all(self.config.respect_ignore_files)
            .map_err(PackError::StageFailed)?;

        let tree = store.write_tree().map_err(PackError::CommitFailed)?;
        if tree == format.empty_tree() {
            return Err(PackError::EmptySnapshot(source.to_path_buf()));
        }
        let commit = store
            .commit(&tree, &self.config.identity)
            .map_err(PackError::CommitFailed)?;
        tracing::info!("Snapshot commit {} (tree {})", commit, tree);

        let written = write_container(&store, &commit, output).map_err(PackError::WriteFailed)?;
        tracing::info!("Wrote {} bytes to {}", written, output.display());

        Ok(commit)
    }
}

/// Write body and trailer to a sibling temporary file, then rename it over `output`
fn write_container(store: &SnapshotStore, commit: &ObjectId, output: &Path) -> Result<u64, StoreError> {
    let parent = match output.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };
    fs::create_dir_all(parent)
        .map_err(|e| StoreError::io(format!("failed to create {}", parent.display()), e))?;

    let file = tempfile::Builder::new()
        .prefix(".gitpack-")
        .suffix(".tmp")
        .tempfile_in(parent)
        .map_err(|e| StoreError::io(format!("failed to create temporary file in {}", parent.display()), e))?;

    let mut writer = BufWriter::new(file);
    let body_len = store.write_pack(commit, &mut writer)?;
    container::append_trailer(&mut writer, commit)
        .map_err(|e| StoreError::io("failed to append trailer", e))?;
    writer
        .flush()
        .map_err(|e| StoreError::io("failed to flush container", e))?;

    let file = writer
        .into_inner()
        .map_err(|e| StoreError::io("failed to flush container", e.into_error()))?;
    file.as_file()
        .sync_all()
        .map_err(|e| StoreError::io("failed to sync container", e))?;
    file.persist(output)
        .map_err(|e| StoreError::io(format!("failed to move container to {}", output.display()), e.error))?;

    Ok(body_len + commit.format().hex_len() as u64)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;
    use tempfile::TempDir;

    fn packer_in(scratch: &TempDir) -> Packer {
        Packer::new(GitpackConfig {
            scratch_dir: Some(scratch.path().to_path_buf()),
            ..GitpackConfig::default()
        })
    }

    #[test]
    fn test_empty_directory_is_rejected() {
        let source = TempDir::new().unwrap();
        let scratch = TempDir::new().unwrap();
        let out = TempDir::new().unwrap();
        let output = out.path().join("empty.gpk");

        let err = packer_in(&scratch).pack(source.path(), &output).unwrap_err();
        assert!(matches!(err, PackError::EmptySnapshot(_)));
        assert_eq!(err.kind(), ErrorKind::CommitConstruction);
        assert!(!output.exists());
        assert_eq!(fs::read_dir(out.path()).unwrap().count(), 0);
    }

    #[test]
    fn test_missing_source_is_staging_error() {
        let scratch = TempDir::new().unwrap();
        let out = TempDir::new().unwrap();

        let err = packer_in(&scratch)
            .pack(&out.path().join("does-not-exist"), &out.path().join("x.gpk"))
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Staging);
    }

    #[test]
    fn test_output_parents_are_created() {
        let source = TempDir::new().unwrap();
        let scratch = TempDir::new().unwrap();
        let out = TempDir::new().unwrap();
        fs::write(source.path().join("a.txt"), "hello").unwrap();
        let output = out.path().join("nested/deeper/packed.gpk");

        let commit = packer_in(&scratch).pack(source.path(), &output).unwrap();

        let bytes = fs::read(&output).unwrap();
        assert!(bytes.starts_with(b"PACK"));
        assert!(bytes.ends_with(commit.to_hex().as_bytes()));
        // Only the container itself, no leftover temporary file
        assert_eq!(fs::read_dir(output.parent().unwrap()).unwrap().count(), 1);
    }
}
