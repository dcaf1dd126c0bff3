//! Encoding of the anchor commit identifier appended to a pack body

use thiserror::Error;

use crate::objects::{ObjectFormat, ObjectId, ObjectIdError};

#[derive(Debug, Error)]
pub enum TrailerError {
    #[error("container is {len} bytes, shorter than the {width}-byte trailer")]
    TooShort { len: u64, width: usize },
    #[error("trailer is not a valid {format} identifier: {source}")]
    Malformed {
        format: ObjectFormat,
        #[source]
        source: ObjectIdError,
    },
}

/// Trailer width in bytes for `format`
pub fn width(format: ObjectFormat) -> usize {
    format.hex_len()
}

/// Trailer bytes for `id`: its lowercase hex form
pub fn encode(id: &ObjectId) -> Vec<u8> {
    id.to_hex().into_bytes()
}

/// Decode the trailer taken from the tail of a container
pub fn decode(format: ObjectFormat, tail: &[u8]) -> Result<ObjectId, TrailerError> {
    ObjectId::from_hex_bytes(format, tail).map_err(|source| TrailerError::Malformed { format, source })
}
