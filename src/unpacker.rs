//! Container to directory: trailer, ephemeral store, checkout

use std::fs;
use std::io::{BufWriter, Write};
use std::path::Path;

use gix_object::{CommitRef, Kind};
use indicatif::{ProgressBar, ProgressStyle};
use tempfile::TempPath;

use crate::config::GitpackConfig;
use crate::container::{self, ContainerLayout};
use crate::error::UnpackError;
use crate::objects::{compute_object_id, ObjectFormat, ObjectId};
use crate::store::EphemeralStore;

/// Extracts container files into directories
#[derive(Debug, Clone, Default)]
pub struct Unpacker {
    config: GitpackConfig,
    show_progress: bool,
}

impl Unpacker {
    pub fn new(config: GitpackConfig) -> Self {
        Self {
            config,
            show_progress: false,
        }
    }

    /// Draw a progress bar on stderr while the pack body is copied
    pub fn with_progress(mut self, show_progress: bool) -> Self {
        self.show_progress = show_progress;
        self
    }

    /// Materialize the tree anchored by `container` into `output_dir`
    ///
    /// Flow:
    /// 1. Detect the trailer width and read the commit identifier
    /// 2. Copy the pack body into a temporary pack file of a bare ephemeral store
    /// 3. Index the pack so it becomes the store's only object source
    /// 4. Resolve the commit and its tree
    /// 5. Force-checkout the tree into `output_dir`
    ///
    /// The temporary pack and the store are removed on every return path.
    pub fn unpack(&self, container: &Path, output_dir: &Path) -> Result<ObjectId, UnpackError> {
        let format = container::detect_format(container, self.config.object_format)?;
        let layout = container::read_layout(container, format)?;
        let commit = layout.commit.clone();
        tracing::info!(
            "Container {} anchors commit {} ({} byte pack body)",
            container.display(),
            commit,
            layout.body_len
        );

        let store = EphemeralStore::create(
            &self.config.git_program,
            &self.config.scratch_root(),
            format,
        )
        .map_err(UnpackError::Store)?;
        let pack = self.extract_body(container, &layout, &store)?;

        store
            .add_pack(&pack)
            .map_err(|e| UnpackError::UnknownCommit {
                id: commit.clone(),
                reason: format!("pack body rejected: {e}"),
            })?;

        let tree = resolve_commit(&store, &commit)?;
        if store.object_kind(&tree).map_err(UnpackError::Store)? != Some(Kind::Tree) {
            return Err(UnpackError::MissingTree { commit, tree });
        }

        fs::create_dir_all(output_dir)
            .map_err(|e| UnpackError::io(format!("failed to create {}", output_dir.display()), e))?;
        let target = output_dir
            .canonicalize()
            .map_err(|e| UnpackError::io(format!("failed to resolve {}", output_dir.display()), e))?;

        store
            .checkout(&tree, &target)
            .map_err(UnpackError::CheckoutFailed)?;
        let conflicts = store
            .unmatched_paths(&target)
            .map_err(UnpackError::CheckoutFailed)?;
        if !conflicts.is_empty() {
            return Err(UnpackError::CheckoutConflict { paths: conflicts });
        }

        tracing::info!("Checked out tree {} into {}", tree, target.display());
        Ok(commit)
    }

    /// Stream the pack body into a temporary pack file owned by `store`
    fn extract_body(
        &self,
        container: &Path,
        layout: &ContainerLayout,
        store: &EphemeralStore,
    ) -> Result<TempPath, UnpackError> {
        let mut file = store.pack_file().map_err(UnpackError::Store)?;
        {
            let mut writer = BufWriter::new(file.as_file_mut());
            container::copy_body(container, layout, &mut writer, &self.progress_bar())?;
            writer
                .flush()
                .map_err(|e| UnpackError::io("failed to write temporary pack", e))?;
        }
        Ok(file.into_temp_path())
    }

    fn progress_bar(&self) -> ProgressBar {
        if !self.show_progress {
            return ProgressBar::hidden();
        }
        let bar = ProgressBar::new(0);
        let style = ProgressStyle::default_bar()
            .template("  {msg} [{bar:40.cyan/blue}] {bytes}/{total_bytes} ({eta})")
            .unwrap_or_else(|_| ProgressStyle::default_bar())
            .progress_chars("█▓░");
        bar.set_style(style);
        bar.set_message("Extracting pack body");
        bar
    }
}

/// Check that `commit` is a commit in the store whose content hashes to it,
/// and return the tree it names
fn resolve_commit(store: &EphemeralStore, commit: &ObjectId) -> Result<ObjectId, UnpackError> {
    let unknown = |reason: String| UnpackError::UnknownCommit {
        id: commit.clone(),
        reason,
    };

    match store.object_kind(commit).map_err(UnpackError::Store)? {
        Some(Kind::Commit) => {}
        Some(other) => {
            return Err(unknown(format!(
                "object is a {}, not a commit",
                String::from_utf8_lossy(other.as_bytes())
            )))
        }
        None => return Err(unknown("not present in the pack body".to_string())),
    }

    let raw = store
        .read_object(Kind::Commit, commit)
        .map_err(UnpackError::Store)?;
    let actual = compute_object_id(commit.format(), Kind::Commit, &raw);
    if actual != *commit {
        return Err(unknown(format!("commit content hashes to {actual}")));
    }
    tree_of_commit(commit.format(), &raw).map_err(unknown)
}

/// Tree named in the header of a raw commit object
fn tree_of_commit(format: ObjectFormat, raw: &[u8]) -> Result<ObjectId, String> {
    let tree: &[u8] = match format {
        ObjectFormat::Sha1 => {
            CommitRef::from_bytes(raw)
                .map_err(|e| format!("malformed commit: {e}"))?
                .tree
        }
        // gix-object decodes SHA-1 commits only
        ObjectFormat::Sha256 => raw
            .strip_prefix(b"tree ")
            .and_then(|rest| rest.split(|&b| b == b'\n').next())
            .ok_or_else(|| "malformed commit: no tree header".to_string())?,
    };
    ObjectId::from_hex_bytes(format, tree).map_err(|e| format!("malformed tree id in commit: {e}"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;
    use crate::packer::Packer;
    use tempfile::TempDir;

    fn config_in(scratch: &TempDir) -> GitpackConfig {
        GitpackConfig {
            scratch_dir: Some(scratch.path().to_path_buf()),
            ..GitpackConfig::default()
        }
    }

    #[test]
    fn test_trailer_naming_a_tree_is_unknown_commit() {
        let scratch = TempDir::new().unwrap();
        let work = TempDir::new().unwrap();
        let source = work.path().join("src");
        fs::create_dir(&source).unwrap();
        fs::write(source.join("a.txt"), "hello").unwrap();
        let container = work.path().join("packed.gpk");

        let commit = Packer::new(config_in(&scratch)).pack(&source, &container).unwrap();

        // Swap the trailer for the id of the snapshot's tree, which the body does contain
        let snapshot_tree = {
            let store = EphemeralStore::create(Path::new("git"), scratch.path(), commit.format()).unwrap();
            let layout = container::read_layout(&container, commit.format()).unwrap();
            let mut file = store.pack_file().unwrap();
            container::copy_body(&container, &layout, file.as_file_mut(), &ProgressBar::hidden()).unwrap();
            let pack = file.into_temp_path();
            store.add_pack(&pack).unwrap();
            resolve_commit(&store, &commit).unwrap()
        };
        let mut bytes = fs::read(&container).unwrap();
        let body_len = bytes.len() - 40;
        bytes.truncate(body_len);
        bytes.extend_from_slice(snapshot_tree.to_hex().as_bytes());
        fs::write(&container, &bytes).unwrap();

        let err = Unpacker::new(config_in(&scratch))
            .unpack(&container, &work.path().join("out"))
            .unwrap_err();
        match err {
            UnpackError::UnknownCommit { reason, .. } => assert!(reason.contains("tree")),
            other => panic!("unexpected error: {other}"),
        }
        assert_eq!(fs::read_dir(scratch.path()).unwrap().count(), 0);
    }

    #[test]
    fn test_trailer_only_container_is_unknown_commit() {
        let scratch = TempDir::new().unwrap();
        let work = TempDir::new().unwrap();
        let container = work.path().join("bare-trailer.gpk");
        fs::write(&container, "0123456789abcdef0123456789abcdef01234567").unwrap();

        let err = Unpacker::new(config_in(&scratch))
            .unpack(&container, &work.path().join("out"))
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Resolution);
        assert!(!work.path().join("out").exists());
        assert_eq!(fs::read_dir(scratch.path()).unwrap().count(), 0);
    }

    fn raw_commit(tree: &ObjectId) -> Vec<u8> {
        format!(
            "tree {tree}\n\
             author GitPacker <gitpacker@example.com> 1700000000 +0000\n\
             committer GitPacker <gitpacker@example.com> 1700000000 +0000\n\
             \n\
             Pack commit\n"
        )
        .into_bytes()
    }

    #[test]
    fn test_tree_is_read_from_commit_header() {
        for format in [ObjectFormat::Sha1, ObjectFormat::Sha256] {
            let tree = compute_object_id(format, Kind::Tree, b"not really a tree");
            assert_eq!(tree_of_commit(format, &raw_commit(&tree)).unwrap(), tree);
        }
    }

    #[test]
    fn test_commit_without_tree_header_is_rejected() {
        let raw = b"author GitPacker <gitpacker@example.com> 1700000000 +0000\n\nmsg\n";
        assert!(tree_of_commit(ObjectFormat::Sha1, raw).is_err());
        assert!(tree_of_commit(ObjectFormat::Sha256, raw).is_err());
    }
}
