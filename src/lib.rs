#![deny(clippy::mod_module_files)]
//! Pack a directory into a single git pack container and extract it again
//!
//! A container is a git pack stream holding every object reachable from one
//! snapshot commit, followed by that commit's identifier in hex:
//!
//! ```text
//! [0 .. N-W)   pack body   opaque git pack stream
//! [N-W .. N)   trailer     lowercase hex commit id, W = 40 (SHA-1) or 64 (SHA-256)
//! ```
//!
//! The git executable provides the object store. Every store used along the
//! way is temporary and removed when the operation returns.

pub mod config;
pub mod container;
pub mod error;
pub mod objects;
pub mod packer;
pub mod store;
pub mod unpacker;

use std::path::Path;

pub use config::{GitpackConfig, Identity};
pub use container::{inspect, ContainerLayout, TrailerError};
pub use error::{ErrorKind, PackError, StoreError, UnpackError};
pub use objects::{ObjectFormat, ObjectId};
pub use packer::Packer;
pub use unpacker::Unpacker;

/// Pack `source` into the container `output` with the default configuration
pub fn pack(source: &Path, output: &Path) -> Result<(), PackError> {
    Packer::default().pack(source, output).map(|_| ())
}

/// Extract the container `container` into `output_dir` with the default configuration
pub fn unpack(container: &Path, output_dir: &Path) -> Result<(), UnpackError> {
    Unpacker::default().unpack(container, output_dir).map(|_| ())
}
