//! Inodes.
//!
//! An inode describes a single file: its size in bytes, an array of
//! direct block pointers, and one indirect pointer naming a block whose
//! contents are a packed array of further block pointers. Pointer value
//! 0 means "not yet allocated" (block 0 always holds the superblock and
//! can never carry file data).
//!
//! The inode table is itself a file: its inode, the j-node, lives in
//! the superblock's shadow-root array rather than in the table. Every
//! other inode is addressed by its index into the table,
//! `inode_id * INODE_SIZE` bytes in.
//!
//! A table slot is either free or live. On disk a free slot carries the
//! reserved `size` sentinel [`FREE_INODE`]; in memory the distinction
//! is a proper variant, [`InodeSlot`].

use core::mem;

use static_assertions::const_assert_eq;
use zerocopy::{AsBytes, FromBytes};

use crate::param::{BSIZE, INODE_SIZE, NDIRECT, NINDIRECT};

/// On-disk `size` value marking a free inode-table slot.
pub(crate) const FREE_INODE: u32 = u32::MAX;

/// On-disk inode record.
#[repr(C)]
#[derive(Clone, Copy, AsBytes, FromBytes)]
pub(crate) struct Dinode {
    size: u32,
    d_ptrs: [u32; NDIRECT],
    i_ptr: u32,
}

// Inode records must pack the table block exactly.
const_assert_eq!(mem::size_of::<Dinode>(), INODE_SIZE);
const_assert_eq!(BSIZE % INODE_SIZE, 0);

/// In-memory copy of a live inode.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) struct Inode {
    /// File size in bytes.
    pub size: u32,
    /// Direct block pointers; 0 = unallocated.
    pub d_ptrs: [u32; NDIRECT],
    /// Block id of the indirect-pointer block; 0 = absent.
    pub i_ptr: u32,
}

impl Inode {
    /// A live inode with no content.
    pub fn empty() -> Self {
        Inode {
            size: 0,
            d_ptrs: [0; NDIRECT],
            i_ptr: 0,
        }
    }
}

/// A decoded inode-table slot.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) enum InodeSlot {
    Free,
    Live(Inode),
}

impl Dinode {
    /// The record written to a slot when its inode is destroyed.
    pub fn free() -> Self {
        Dinode {
            size: FREE_INODE,
            d_ptrs: [0; NDIRECT],
            i_ptr: 0,
        }
    }

    pub fn decode(&self) -> InodeSlot {
        if self.size == FREE_INODE {
            InodeSlot::Free
        } else {
            InodeSlot::Live(Inode {
                size: self.size,
                d_ptrs: self.d_ptrs,
                i_ptr: self.i_ptr,
            })
        }
    }
}

impl From<&Inode> for Dinode {
    fn from(inode: &Inode) -> Self {
        Dinode {
            size: inode.size,
            d_ptrs: inode.d_ptrs,
            i_ptr: inode.i_ptr,
        }
    }
}

/// An indirect-pointer block: a packed array of block pointers filling
/// exactly one block.
#[repr(C)]
#[derive(Clone, AsBytes, FromBytes)]
pub(crate) struct PtrBlock {
    pub ptrs: [u32; NINDIRECT],
}

const_assert_eq!(mem::size_of::<PtrBlock>(), BSIZE);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn free_sentinel_round_trips() {
        assert_eq!(Dinode::free().decode(), InodeSlot::Free);
    }

    #[test]
    fn live_record_round_trips() {
        let mut inode = Inode::empty();
        inode.size = 2000;
        inode.d_ptrs[0] = 5;
        inode.d_ptrs[1] = 9;
        inode.i_ptr = 17;
        let rec = Dinode::from(&inode);
        assert_eq!(rec.decode(), InodeSlot::Live(inode));
    }

    #[test]
    fn zeroed_record_is_an_empty_live_inode() {
        let rec = Dinode::new_zeroed();
        assert_eq!(rec.decode(), InodeSlot::Live(Inode::empty()));
    }
}
