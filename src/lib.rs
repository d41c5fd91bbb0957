//! shadowfs: a single-volume, block-structured file store with
//! versioned copy-on-write snapshots.
//!
//! The volume is a flat namespace of files addressed through a small
//! POSIX-flavored API: `open`/`close`, independent read and write
//! cursors (`rseek`/`wseek`), `read`/`write`, `remove`. Each file is an
//! inode with direct plus single-indirect block pointers.
//!
//! What makes the store interesting is shadowing. `commit` snapshots
//! the whole namespace by freezing every allocated block in a fresh
//! write mask and copying the current root one shadow slot to the
//! right; the first write to a frozen block after that copies it
//! instead of mutating it, rebuilding the pointer chain up through the
//! inode table to the superblock. `restore` selects any earlier
//! snapshot as the current shadow.
//!
//! Single process, single thread: callers needing concurrency must
//! provide their own mutual exclusion.

#![deny(rust_2018_idioms)]

mod bitmap;
mod dir;
mod disk;
mod error;
mod fs;
mod inode;
mod param;
mod superblock;

pub use crate::dir::FileName;
pub use crate::disk::{BlockDevice, FileDisk, MemDisk};
pub use crate::error::{FsError, Result};
pub use crate::fs::{Fd, ShadowFs, J_NODE, ROOT_DIR};
pub use crate::param::{
    BSIZE, DIRENT_SIZE, FILENAME_SIZE, MAXFILE, NDIRECT, NSHADOW, NUM_BLOCKS,
};

use std::path::Path;

/// Erases and initializes the volume file at `path`, then mounts it.
pub fn format<P: AsRef<Path>>(path: P) -> Result<ShadowFs<FileDisk>> {
    let dev = FileDisk::init_fresh(path, BSIZE, NUM_BLOCKS)?;
    ShadowFs::format(dev)
}

/// Attaches the existing volume file at `path`.
pub fn mount<P: AsRef<Path>>(path: P) -> Result<ShadowFs<FileDisk>> {
    let dev = FileDisk::init_existing(path, BSIZE, NUM_BLOCKS)?;
    ShadowFs::mount(dev)
}
