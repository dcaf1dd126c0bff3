//! Container file layout: `PackBody ++ Trailer`
//!
//! The pack body is an opaque git pack stream. The trailer is the anchor
//! commit identifier in lowercase hex, so its width depends on the object
//! format (40 bytes for SHA-1, 64 for SHA-256).

mod trailer;

use std::fs::File;
use std::io::{self, BufReader, Read, Seek, SeekFrom, Write};
use std::path::Path;

use indicatif::ProgressBar;

use crate::error::UnpackError;
use crate::objects::{ObjectFormat, ObjectId};

pub use trailer::TrailerError;

const COPY_BUFFER_SIZE: usize = 1024 * 1024;

/// Where the pack body ends and which commit the trailer names
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContainerLayout {
    pub commit: ObjectId,
    pub body_len: u64,
    pub total_len: u64,
}

impl ContainerLayout {
    pub fn format(&self) -> ObjectFormat {
        self.commit.format()
    }
}

/// Append the trailer for `commit` to a writer positioned after the pack body
pub fn append_trailer<W: Write>(output: &mut W, commit: &ObjectId) -> io::Result<()> {
    output.write_all(&trailer::encode(commit))
}

/// Object format whose trailer the container at `path` ends with
///
/// A pack body ends in a binary checksum, so the longest all-hex tail wins.
/// Containers too short or too damaged to tell fall back to `fallback`.
pub fn detect_format(path: &Path, fallback: ObjectFormat) -> Result<ObjectFormat, UnpackError> {
    let mut file = File::open(path)
        .map_err(|e| UnpackError::io(format!("failed to open container {}", path.display()), e))?;
    let total_len = file
        .metadata()
        .map_err(|e| UnpackError::io(format!("failed to stat container {}", path.display()), e))?
        .len();

    let longest = ObjectFormat::Sha256.hex_len();
    let tail_len = total_len.min(longest as u64) as usize;
    let mut tail = vec![0u8; tail_len];
    file.seek(SeekFrom::End(-(tail_len as i64)))
        .and_then(|_| file.read_exact(&mut tail))
        .map_err(|e| UnpackError::io(format!("failed to read trailer of {}", path.display()), e))?;

    let is_hex_tail = |width: usize| {
        tail[tail.len() - width..]
            .iter()
            .all(|b| b.is_ascii_digit() || (b'a'..=b'f').contains(b))
    };
    let detected = if tail_len < longest {
        fallback
    } else if is_hex_tail(ObjectFormat::Sha256.hex_len()) {
        ObjectFormat::Sha256
    } else if is_hex_tail(ObjectFormat::Sha1.hex_len()) {
        ObjectFormat::Sha1
    } else {
        fallback
    };

    if detected != fallback {
        tracing::info!(
            "{} carries a {} trailer, not {}",
            path.display(),
            detected,
            fallback
        );
    }
    Ok(detected)
}

/// Read the trailer of the container at `path` without reading the body
pub fn read_layout(path: &Path, format: ObjectFormat) -> Result<ContainerLayout, UnpackError> {
    let mut file = File::open(path)
        .map_err(|e| UnpackError::io(format!("failed to open container {}", path.display()), e))?;
    let total_len = file
        .metadata()
        .map_err(|e| UnpackError::io(format!("failed to stat container {}", path.display()), e))?
        .len();

    let width = trailer::width(format);
    let body_len = total_len
        .checked_sub(width as u64)
        .ok_or(TrailerError::TooShort {
            len: total_len,
            width,
        })?;

    let mut tail = vec![0u8; width];
    file.seek(SeekFrom::Start(body_len))
        .and_then(|_| file.read_exact(&mut tail))
        .map_err(|e| UnpackError::io(format!("failed to read trailer of {}", path.display()), e))?;

    let commit = trailer::decode(format, &tail)?;
    Ok(ContainerLayout {
        commit,
        body_len,
        total_len,
    })
}

/// Stream the pack body of the container at `path` into `output`
///
/// Memory use is bounded by the copy buffer regardless of container size.
pub fn copy_body<W: Write>(
    path: &Path,
    layout: &ContainerLayout,
    output: &mut W,
    progress: &ProgressBar,
) -> Result<u64, UnpackError> {
    let file = File::open(path)
        .map_err(|e| UnpackError::io(format!("failed to open container {}", path.display()), e))?;
    let mut body = BufReader::with_capacity(COPY_BUFFER_SIZE, file).take(layout.body_len);

    progress.set_length(layout.body_len);
    let copied = io::copy(&mut body, &mut progress.wrap_write(output))
        .map_err(|e| UnpackError::io("failed to copy pack body", e))?;
    progress.finish_and_clear();

    if copied != layout.body_len {
        return Err(UnpackError::io(
            format!("container {} changed while reading", path.display()),
            io::Error::new(
                io::ErrorKind::UnexpectedEof,
                format!("copied {copied} of {} body bytes", layout.body_len),
            ),
        ));
    }
    Ok(copied)
}

/// Report the anchor commit and body size of a container
///
/// Only the trailer is read; the commit is not looked up. `format` applies
/// when the trailer width cannot be told from the tail.
pub fn inspect(path: &Path, format: ObjectFormat) -> Result<ContainerLayout, UnpackError> {
    let format = detect_format(path, format)?;
    let layout = read_layout(path, format)?;
    tracing::debug!(
        "{}: commit {}, {} byte body",
        path.display(),
        layout.commit,
        layout.body_len
    );
    Ok(layout)
}
