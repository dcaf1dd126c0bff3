//! Object identifiers and hashing for the supported git object formats

use std::fmt;
use std::str::FromStr;

use gix_object::Kind;
use serde::{Deserialize, Serialize};
use sha1::Sha1;
use sha2::{Digest, Sha256};

/// Hash algorithm of the object store, which also fixes the trailer width
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ObjectFormat {
    /// Legacy 160-bit identifiers (40 hex characters)
    #[default]
    Sha1,
    /// 256-bit identifiers (64 hex characters)
    Sha256,
}

impl ObjectFormat {
    /// Length of an identifier in bytes
    pub fn byte_len(self) -> usize {
        match self {
            ObjectFormat::Sha1 => 20,
            ObjectFormat::Sha256 => 32,
        }
    }

    /// Length of the canonical hex form, which is also the trailer width
    pub fn hex_len(self) -> usize {
        self.byte_len() * 2
    }

    /// Name understood by `git init --object-format`
    pub fn as_str(self) -> &'static str {
        match self {
            ObjectFormat::Sha1 => "sha1",
            ObjectFormat::Sha256 => "sha256",
        }
    }

    /// Identifier of the tree with no entries
    pub fn empty_tree(self) -> ObjectId {
        compute_object_id(self, Kind::Tree, b"")
    }
}

impl fmt::Display for ObjectFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ObjectFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "sha1" => Ok(ObjectFormat::Sha1),
            "sha256" => Ok(ObjectFormat::Sha256),
            other => Err(format!("unknown object format: {other}")),
        }
    }
}

/// Reasons a hex string is not an identifier of the expected format
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ObjectIdError {
    #[error("expected {expected} hex characters, got {actual}")]
    Length { expected: usize, actual: usize },
    #[error("invalid hex: {0}")]
    Hex(#[from] hex::FromHexError),
}

/// Object identifier stored as raw bytes, displayed as lowercase hex
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ObjectId {
    format: ObjectFormat,
    bytes: Vec<u8>,
}

impl ObjectId {
    /// Parse the hex form of an identifier of `format`
    pub fn from_hex(format: ObjectFormat, hex_str: &str) -> Result<Self, ObjectIdError> {
        Self::from_hex_bytes(format, hex_str.as_bytes())
    }

    /// Parse hex text given as raw bytes, e.g. the tail of a container
    pub fn from_hex_bytes(format: ObjectFormat, text: &[u8]) -> Result<Self, ObjectIdError> {
        if text.len() != format.hex_len() {
            return Err(ObjectIdError::Length {
                expected: format.hex_len(),
                actual: text.len(),
            });
        }
        let bytes = hex::decode(text)?;
        Ok(Self { format, bytes })
    }

    pub fn format(&self) -> ObjectFormat {
        self.format
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes
    }

    /// Canonical lowercase hex text
    pub fn to_hex(&self) -> String {
        hex::encode(&self.bytes)
    }
}

impl fmt::Display for ObjectId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_hex())
    }
}

/// Compute the identifier git assigns to an object of `kind` holding `data`
pub fn compute_object_id(format: ObjectFormat, kind: Kind, data: &[u8]) -> ObjectId {
    let mut header = kind.as_bytes().to_vec();
    header.extend_from_slice(format!(" {}\0", data.len()).as_bytes());
    let bytes = match format {
        ObjectFormat::Sha1 => {
            let mut hasher = Sha1::new();
            hasher.update(&header);
            hasher.update(data);
            hasher.finalize().to_vec()
        }
        ObjectFormat::Sha256 => {
            let mut hasher = Sha256::new();
            hasher.update(&header);
            hasher.update(data);
            hasher.finalize().to_vec()
        }
    };
    ObjectId { format, bytes }
}
