use std::io;

use thiserror::Error;

/// Errors surfaced by the file store.
///
/// Device I/O failures abort the calling operation and carry the
/// underlying [`io::Error`]. A `write` that made partial progress
/// before running out of space does not error; it returns the byte
/// count written so far.
#[derive(Debug, Error)]
pub enum FsError {
    /// A caller-supplied name, descriptor, or seek position is unusable.
    #[error("invalid argument: {0}")]
    InvalidArgument(&'static str),

    /// The named file does not exist.
    #[error("no such file")]
    NotFound,

    /// Block, inode, shadow-slot, or descriptor exhaustion.
    #[error("no space left on volume")]
    NoSpace,

    /// The on-disk state is not something this crate wrote.
    #[error("volume corrupted: {0}")]
    Corrupt(&'static str),

    /// The block device reported a failure.
    #[error("block device failure")]
    Disk(#[from] io::Error),
}

pub type Result<T> = std::result::Result<T, FsError>;
