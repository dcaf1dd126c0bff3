//! Bare, disposable store backed only by a pack body

use std::ffi::OsStr;
use std::path::{Path, PathBuf};

use gix_object::Kind;
use tempfile::{NamedTempFile, TempDir};

use super::command::{init_repository, Git};
use super::scratch_dir;
use crate::error::StoreError;
use crate::objects::{ObjectFormat, ObjectId};

pub struct EphemeralStore {
    git: Git,
    format: ObjectFormat,
    _dir: TempDir,
}

impl EphemeralStore {
    pub fn create(program: &Path, scratch_root: &Path, format: ObjectFormat) -> Result<Self, StoreError> {
        let dir = scratch_dir(scratch_root, "gitpack-store-")?;
        let git = init_repository(program, &dir.path().join("store.git"), true, format)?;
        tracing::debug!("ephemeral store at {}", git.git_dir().display());

        Ok(Self {
            git,
            format,
            _dir: dir,
        })
    }

    fn pack_dir(&self) -> PathBuf {
        self.git.git_dir().join("objects").join("pack")
    }

    /// New temporary file for a pack body, created where the store looks for packs
    pub fn pack_file(&self) -> Result<NamedTempFile, StoreError> {
        let pack_dir = self.pack_dir();
        tempfile::Builder::new()
            .prefix("gitpack-body-")
            .suffix(".pack")
            .tempfile_in(&pack_dir)
            .map_err(|e| {
                StoreError::io(
                    format!("failed to create temporary pack in {}", pack_dir.display()),
                    e,
                )
            })
    }

    /// Index the pack at `path` so its objects become readable
    ///
    /// The index is written next to the pack, which must live in the store's
    /// pack directory. A truncated or malformed pack is rejected here.
    pub fn add_pack(&self, path: &Path) -> Result<(), StoreError> {
        self.git
            .command([OsStr::new("index-pack"), path.as_os_str()])
            .output()?;
        Ok(())
    }

    /// Kind of the object `id`, or `None` if the store does not have it
    pub fn object_kind(&self, id: &ObjectId) -> Result<Option<Kind>, StoreError> {
        let hex = id.to_hex();
        if !self.git.command(["cat-file", "-e", hex.as_str()]).succeeds()? {
            return Ok(None);
        }

        let kind = self.git.command(["cat-file", "-t", hex.as_str()]).output_text()?;
        Kind::from_bytes(kind.as_bytes())
            .map(Some)
            .map_err(|_| StoreError::UnexpectedOutput {
                command: format!("cat-file -t {hex}"),
                output: kind,
            })
    }

    /// Raw content of an object, without the git header
    pub fn read_object(&self, kind: Kind, id: &ObjectId) -> Result<Vec<u8>, StoreError> {
        let kind = String::from_utf8_lossy(kind.as_bytes()).into_owned();
        let hex = id.to_hex();
        self.git
            .command(["cat-file", kind.as_str(), hex.as_str()])
            .output()
    }

    /// Write every file of `tree` into `target`, overwriting what is there
    pub fn checkout(&self, tree: &ObjectId, target: &Path) -> Result<(), StoreError> {
        let git = self.git.with_work_tree(target);
        let hex = tree.to_hex();
        git.command(["read-tree", hex.as_str()]).output()?;
        git.command(["checkout-index", "--all", "--force", "--index"])
            .output()?;
        Ok(())
    }

    /// Paths in `target` whose content differs from the checked out tree
    pub fn unmatched_paths(&self, target: &Path) -> Result<Vec<String>, StoreError> {
        let git = self.git.with_work_tree(target);
        // Exits non-zero when entries need updating; diff-files reports which
        git.command(["update-index", "-q", "--refresh"]).succeeds()?;
        let output = git
            .command(["diff-files", "--name-only", "-z"])
            .output()?;

        Ok(output
            .split(|&b| b == 0)
            .filter(|path| !path.is_empty())
            .map(|path| String::from_utf8_lossy(path).into_owned())
            .collect())
    }
}
