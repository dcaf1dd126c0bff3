//! Out-of-place snapshot of a directory and the pack body built from it

use std::io::Write;
use std::path::Path;

use tempfile::TempDir;

use super::command::{init_repository, Git};
use super::{absolute, scratch_dir};
use crate::config::Identity;
use crate::error::StoreError;
use crate::objects::{ObjectFormat, ObjectId};

/// Scratch repository whose work tree is the directory being snapshotted
///
/// The index and object database live in the scratch directory, so the
/// source directory is only ever read.
pub struct SnapshotStore {
    git: Git,
    format: ObjectFormat,
    _dir: TempDir,
}

impl SnapshotStore {
    pub fn create(
        program: &Path,
        scratch_root: &Path,
        format: ObjectFormat,
        source: &Path,
    ) -> Result<Self, StoreError> {
        let source = absolute(source)?;
        let dir = scratch_dir(scratch_root, "gitpack-stage-")?;
        let git = init_repository(program, &dir.path().join("stage"), false, format)?
            .with_work_tree(&source);
        tracing::debug!("staging {} through {}", source.display(), git.git_dir().display());

        Ok(Self {
            git,
            format,
            _dir: dir,
        })
    }

    /// Stage every file of the work tree and persist the index
    pub fn stage_all(&self, respect_ignore_files: bool) -> Result<(), StoreError> {
        let mut args = vec!["add", "--all"];
        if !respect_ignore_files {
            args.push("--force");
        }
        self.git.command(args).output()?;

        let nested = self.gitlinks()?;
        if !nested.is_empty() {
            tracing::warn!(
                "nested repositories are recorded as links and their files are not packed: {}",
                nested.join(", ")
            );
        }
        Ok(())
    }

    /// Staged paths that are nested repositories (mode 160000) rather than files
    pub fn gitlinks(&self) -> Result<Vec<String>, StoreError> {
        let output = self.git.command(["ls-files", "--stage", "-z"]).output()?;
        Ok(output
            .split(|&b| b == 0)
            .filter(|entry| entry.starts_with(b"160000 "))
            .filter_map(|entry| {
                let tab = entry.iter().position(|&b| b == b'\t')?;
                Some(String::from_utf8_lossy(&entry[tab + 1..]).into_owned())
            })
            .collect())
    }

    /// Write the index as a tree object
    pub fn write_tree(&self) -> Result<ObjectId, StoreError> {
        let output = self.git.command(["write-tree"]).output_text()?;
        self.parse_id("write-tree", &output)
    }

    /// Create a parentless commit of `tree` signed with `identity`
    pub fn commit(&self, tree: &ObjectId, identity: &Identity) -> Result<ObjectId, StoreError> {
        let timestamp = identity
            .timestamp
            .unwrap_or_else(|| chrono::Utc::now().timestamp());
        let date = format!("{timestamp} +0000");
        let tree = tree.to_hex();

        let output = self
            .git
            .command(["commit-tree", tree.as_str(), "-m", identity.message.as_str()])
            .env("GIT_AUTHOR_NAME", &identity.name)
            .env("GIT_AUTHOR_EMAIL", &identity.email)
            .env("GIT_AUTHOR_DATE", &date)
            .env("GIT_COMMITTER_NAME", &identity.name)
            .env("GIT_COMMITTER_EMAIL", &identity.email)
            .env("GIT_COMMITTER_DATE", &date)
            .output_text()?;
        self.parse_id("commit-tree", &output)
    }

    /// Stream a pack of every object reachable from `commit` into `output`
    pub fn write_pack<W: Write>(&self, commit: &ObjectId, output: &mut W) -> Result<u64, StoreError> {
        let revs = format!("{commit}\n");
        self.git
            .command(["pack-objects", "--revs", "--stdout", "--quiet"])
            .stream_to(revs.as_bytes(), output)
    }

    fn parse_id(&self, command: &str, output: &str) -> Result<ObjectId, StoreError> {
        ObjectId::from_hex(self.format, output).map_err(|_| StoreError::UnexpectedOutput {
            command: command.to_string(),
            output: output.to_string(),
        })
    }
}
