use std::io;
use std::path::PathBuf;
use std::process::ExitStatus;

use thiserror::Error;

use crate::container::TrailerError;
use crate::objects::ObjectId;

/// Failure categories shared by packing and unpacking
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    Staging,
    CommitConstruction,
    Serialization,
    CorruptContainer,
    Resolution,
    Checkout,
    Io,
}

impl ErrorKind {
    /// Process exit code reported by the command line tool
    pub fn exit_code(self) -> u8 {
        match self {
            ErrorKind::Staging => 10,
            ErrorKind::CommitConstruction => 11,
            ErrorKind::Serialization => 12,
            ErrorKind::CorruptContainer => 20,
            ErrorKind::Resolution => 21,
            ErrorKind::Checkout => 22,
            ErrorKind::Io => 23,
        }
    }

    /// Pipeline stage named in diagnostics
    pub fn stage(self) -> &'static str {
        match self {
            ErrorKind::Staging => "stage",
            ErrorKind::CommitConstruction => "commit",
            ErrorKind::Serialization => "write",
            ErrorKind::CorruptContainer => "read trailer",
            ErrorKind::Resolution => "resolve",
            ErrorKind::Checkout => "checkout",
            ErrorKind::Io => "io",
        }
    }
}

/// Errors raised while driving the object store
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("failed to run {program}: {source}")]
    Spawn {
        program: String,
        #[source]
        source: io::Error,
    },
    #[error("`git {command}` failed ({status}): {stderr}")]
    Command {
        command: String,
        status: ExitStatus,
        stderr: String,
    },
    #[error("unexpected output from `git {command}`: {output:?}")]
    UnexpectedOutput { command: String, output: String },
    #[error("{context}: {source}")]
    Io {
        context: String,
        #[source]
        source: io::Error,
    },
}

impl StoreError {
    pub(crate) fn io(context: impl Into<String>, source: io::Error) -> Self {
        StoreError::Io {
            context: context.into(),
            source,
        }
    }
}

#[derive(Debug, Error)]
pub enum PackError {
    #[error("staging failed: {0}")]
    StageFailed(#[source] StoreError),
    #[error("commit construction failed: {0}")]
    CommitFailed(#[source] StoreError),
    #[error("nothing to pack: {} contains no files", .0.display())]
    EmptySnapshot(PathBuf),
    #[error("writing container failed: {0}")]
    WriteFailed(#[source] StoreError),
}

impl PackError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            PackError::StageFailed(_) => ErrorKind::Staging,
            PackError::CommitFailed(_) | PackError::EmptySnapshot(_) => {
                ErrorKind::CommitConstruction
            }
            PackError::WriteFailed(_) => ErrorKind::Serialization,
        }
    }
}

#[derive(Debug, Error)]
pub enum UnpackError {
    #[error("corrupt container trailer: {0}")]
    CorruptTrailer(#[from] TrailerError),
    #[error("{context}: {source}")]
    Io {
        context: String,
        #[source]
        source: io::Error,
    },
    #[error("ephemeral store failed: {0}")]
    Store(#[source] StoreError),
    #[error("commit {id} cannot be resolved from the pack body: {reason}")]
    UnknownCommit { id: ObjectId, reason: String },
    #[error("tree {tree} of commit {commit} is missing from the pack body")]
    MissingTree { commit: ObjectId, tree: ObjectId },
    #[error("checkout failed: {0}")]
    CheckoutFailed(#[source] StoreError),
    #[error("checkout left {} conflicting path(s): {}", .paths.len(), .paths.join(", "))]
    CheckoutConflict { paths: Vec<String> },
}

impl UnpackError {
    pub(crate) fn io(context: impl Into<String>, source: io::Error) -> Self {
        UnpackError::Io {
            context: context.into(),
            source,
        }
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            UnpackError::CorruptTrailer(_) => ErrorKind::CorruptContainer,
            UnpackError::Io { .. } | UnpackError::Store(_) => ErrorKind::Io,
            UnpackError::UnknownCommit { .. } | UnpackError::MissingTree { .. } => {
                ErrorKind::Resolution
            }
            UnpackError::CheckoutFailed(_) | UnpackError::CheckoutConflict { .. } => {
                ErrorKind::Checkout
            }
        }
    }
}
