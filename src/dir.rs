//! Root directory records.
//!
//! The directory is a regular file, a packed array of fixed-size
//! entries mapping a bounded filename to an inode id. An entry whose
//! name bytes are all zero is an empty slot. The entry for inode `i`
//! lives at byte offset `(i - 1) * DIRENT_SIZE`; inode 0 is the
//! directory itself and has no entry.

use core::mem;

use arrayvec::ArrayVec;
use static_assertions::const_assert_eq;
use zerocopy::{AsBytes, FromBytes};

use crate::error::{FsError, Result};
use crate::param::{DIRENT_SIZE, FILENAME_SIZE};

/// A filename as the directory stores it: at most [`FILENAME_SIZE`]
/// bytes, no NUL. Longer input is truncated at the byte boundary.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct FileName(ArrayVec<u8, FILENAME_SIZE>);

impl FileName {
    pub fn new(name: &str) -> Result<Self> {
        if name.is_empty() {
            return Err(FsError::InvalidArgument("empty filename"));
        }
        if name.bytes().any(|b| b == 0) {
            return Err(FsError::InvalidArgument("filename contains NUL"));
        }
        let mut bytes = ArrayVec::new();
        for b in name.bytes().take(FILENAME_SIZE) {
            bytes.push(b);
        }
        Ok(FileName(bytes))
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    /// The name padded with NULs to the full comparison width.
    fn padded(&self) -> [u8; FILENAME_SIZE] {
        let mut out = [0u8; FILENAME_SIZE];
        out[..self.0.len()].copy_from_slice(&self.0);
        out
    }
}

/// On-disk directory entry.
#[repr(C)]
#[derive(Clone, Copy, AsBytes, FromBytes)]
pub(crate) struct Dirent {
    name: [u8; FILENAME_SIZE + 1],
    _pad: u8,
    inode_id: u32,
}

const_assert_eq!(mem::size_of::<Dirent>(), DIRENT_SIZE);

impl Dirent {
    pub fn new(name: &FileName, inode_id: u32) -> Self {
        let mut entry = Dirent::empty();
        let bytes = name.as_bytes();
        entry.name[..bytes.len()].copy_from_slice(bytes);
        // NUL terminator and zero tail come from `empty`.
        entry.inode_id = inode_id;
        entry
    }

    pub fn empty() -> Self {
        Dirent {
            name: [0; FILENAME_SIZE + 1],
            _pad: 0,
            inode_id: 0,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.name[0] == 0
    }

    pub fn inode_id(&self) -> u32 {
        self.inode_id
    }

    /// Compares the first [`FILENAME_SIZE`] name bytes.
    pub fn matches(&self, name: &FileName) -> bool {
        self.name[..FILENAME_SIZE] == name.padded()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_empty_and_nul() {
        assert!(FileName::new("").is_err());
        assert!(FileName::new("a\0b").is_err());
    }

    #[test]
    fn truncates_long_names() {
        let name = FileName::new("averylongfilename.txt").unwrap();
        assert_eq!(name.as_bytes(), b"averylongf");
    }

    #[test]
    fn entry_matches_by_prefix_width() {
        let name = FileName::new("notes.txt").unwrap();
        let entry = Dirent::new(&name, 3);
        assert!(!entry.is_empty());
        assert_eq!(entry.inode_id(), 3);
        assert!(entry.matches(&name));
        assert!(!entry.matches(&FileName::new("notes.tx").unwrap()));
        assert!(!entry.matches(&FileName::new("notes.txt2").unwrap()));
    }

    #[test]
    fn names_identical_through_stored_width_collide() {
        let entry = Dirent::new(&FileName::new("abcdefghijk").unwrap(), 1);
        assert!(entry.matches(&FileName::new("abcdefghijZZZ").unwrap()));
    }

    #[test]
    fn zeroed_entry_is_empty() {
        assert!(Dirent::empty().is_empty());
    }
}
