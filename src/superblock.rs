//! The superblock.
//!
//! Disk layout:
//! [ superblock | per-shadow masks, inode-table blocks and data blocks,
//!   placed wherever the allocator put them ]
//!
//! Block 0 describes the volume and carries the whole snapshot
//! machinery: one j-node (the inode record of the inode table, viewed
//! as a file) per shadow-root slot, plus the block ids of each shadow's
//! free-block mask and write mask. `current_root` selects the active
//! shadow; `commit` copies the active slot one to the right and moves
//! the index, `restore` just moves the index back.

use core::mem;

use static_assertions::const_assert;
use zerocopy::{AsBytes, FromBytes};

use crate::disk::BlockDevice;
use crate::error::{FsError, Result};
use crate::inode::{Dinode, Inode, InodeSlot};
use crate::param::{
    BSIZE, FBM_BLOCK, INODE_SIZE, INODE_TABLE_BLOCK, NSHADOW, NUM_BLOCKS, SUPERBLOCK, WM_BLOCK,
};

/// Identifies a volume as ours.
pub(crate) const FSMAGIC: u32 = 0xACBD_0005;

/// On-disk superblock record (block 0).
///
/// The counters are `u16` so the record fits its block exactly in the
/// reference configuration: `num_inodes` is bounded by the inode-table
/// capacity and `current_root` by [`NSHADOW`], both far below `u16`
/// range.
#[repr(C)]
#[derive(Clone, AsBytes, FromBytes)]
struct DSuperblock {
    magic: u32,
    block_size: u32,
    num_blocks: u32,
    num_inodes: u16,
    current_root: u16,
    roots: [Dinode; NSHADOW],
    fbm_ptrs: [u32; NSHADOW],
    wm_ptrs: [u32; NSHADOW],
}

const_assert!(mem::size_of::<DSuperblock>() <= BSIZE);

/// In-memory copy of the superblock, written back after every change.
pub(crate) struct Superblock {
    d: DSuperblock,
}

impl Superblock {
    /// The superblock of a freshly formatted volume: one inode (the
    /// root directory) in a one-record inode table, shadow 0 active.
    pub fn format() -> Self {
        let mut d = DSuperblock::new_zeroed();
        d.magic = FSMAGIC;
        d.block_size = BSIZE as u32;
        d.num_blocks = NUM_BLOCKS as u32;
        d.num_inodes = 1;
        d.current_root = 0;
        for root in d.roots.iter_mut() {
            *root = Dinode::free();
        }
        let mut jnode = Inode::empty();
        jnode.size = INODE_SIZE as u32;
        jnode.d_ptrs[0] = INODE_TABLE_BLOCK;
        d.roots[0] = Dinode::from(&jnode);
        d.fbm_ptrs[0] = FBM_BLOCK;
        d.wm_ptrs[0] = WM_BLOCK;
        Superblock { d }
    }

    /// Reads and validates block 0 of an existing volume.
    pub fn load<D: BlockDevice>(dev: &mut D) -> Result<Self> {
        let mut buf = [0u8; BSIZE];
        dev.read_blocks(SUPERBLOCK, &mut buf)?;

        // Disk integers are little-endian; check the magic before
        // trusting the rest of the record.
        let magic = u32::from_le_bytes([buf[0], buf[1], buf[2], buf[3]]);
        if magic != FSMAGIC {
            return Err(FsError::Corrupt("not our volume"));
        }
        let d = DSuperblock::read_from_prefix(&buf[..])
            .ok_or(FsError::Corrupt("short superblock"))?;
        if d.block_size != BSIZE as u32 || d.num_blocks != NUM_BLOCKS as u32 {
            return Err(FsError::Corrupt("volume geometry mismatch"));
        }
        if (d.current_root as usize) >= NSHADOW {
            return Err(FsError::Corrupt("shadow-root index out of range"));
        }
        let sb = Superblock { d };
        if sb.fbm_ptr() as usize >= NUM_BLOCKS || sb.wm_ptr() as usize >= NUM_BLOCKS {
            return Err(FsError::Corrupt("mask pointer out of range"));
        }
        Ok(sb)
    }

    pub fn persist<D: BlockDevice>(&self, dev: &mut D) -> Result<()> {
        let mut buf = [0u8; BSIZE];
        buf[..mem::size_of::<DSuperblock>()].copy_from_slice(self.d.as_bytes());
        dev.write_blocks(SUPERBLOCK, &buf)?;
        Ok(())
    }

    pub fn current_root(&self) -> u32 {
        self.d.current_root as u32
    }

    pub fn num_inodes(&self) -> u32 {
        self.d.num_inodes as u32
    }

    pub fn set_num_inodes(&mut self, n: u32) {
        self.d.num_inodes = n as u16;
    }

    /// The active shadow's j-node.
    pub fn root(&self) -> Result<Inode> {
        match self.d.roots[self.d.current_root as usize].decode() {
            InodeSlot::Live(inode) => Ok(inode),
            InodeSlot::Free => Err(FsError::Corrupt("active shadow root is free")),
        }
    }

    pub fn set_root(&mut self, inode: &Inode) {
        self.d.roots[self.d.current_root as usize] = Dinode::from(inode);
    }

    pub fn fbm_ptr(&self) -> u32 {
        self.d.fbm_ptrs[self.d.current_root as usize]
    }

    pub fn wm_ptr(&self) -> u32 {
        self.d.wm_ptrs[self.d.current_root as usize]
    }

    /// Opens the next shadow slot: the new shadow inherits the current
    /// root and gets its own mask blocks. The caller has already
    /// checked that a slot is left.
    pub fn begin_shadow(&mut self, fbm_blk: u32, wm_blk: u32) {
        let cur = self.d.current_root as usize;
        self.d.roots[cur + 1] = self.d.roots[cur];
        self.d.fbm_ptrs[cur + 1] = fbm_blk;
        self.d.wm_ptrs[cur + 1] = wm_blk;
        self.d.current_root += 1;
    }

    pub fn select_root(&mut self, n: u32) {
        self.d.current_root = n as u16;
    }
}
