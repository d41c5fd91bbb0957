//! Per-shadow block masks.
//!
//! Each shadow owns two one-block masks, a byte per volume block: the
//! free-block mask (`1` = free, `0` = allocated) and the write mask
//! (`1` = writable in this shadow, `0` = frozen by an earlier
//! snapshot). Allocation is a first-fit scan from block 0, and the
//! scan does *not* clear the byte: the callee that records the block in
//! an inode pointer clears it once the block's initial contents are
//! written, so an abandoned reservation leaves the mask untouched.

use static_assertions::const_assert;

use crate::disk::BlockDevice;
use crate::error::Result;
use crate::param::{BSIZE, NUM_BLOCKS};

// Each mask must fit in the single block its superblock slot points to.
const_assert!(NUM_BLOCKS <= BSIZE);

/// One byte of state per volume block.
#[derive(Clone)]
pub(crate) struct Mask {
    bytes: [u8; NUM_BLOCKS],
}

impl Mask {
    /// A mask with every byte set.
    pub fn all_set() -> Self {
        Mask {
            bytes: [1; NUM_BLOCKS],
        }
    }

    pub fn load<D: BlockDevice>(dev: &mut D, blk: u32) -> Result<Self> {
        let mut buf = [0u8; BSIZE];
        dev.read_blocks(blk, &mut buf)?;
        let mut mask = Mask {
            bytes: [0; NUM_BLOCKS],
        };
        mask.bytes.copy_from_slice(&buf[..NUM_BLOCKS]);
        Ok(mask)
    }

    pub fn store<D: BlockDevice>(&self, dev: &mut D, blk: u32) -> Result<()> {
        let mut buf = [0u8; BSIZE];
        buf[..NUM_BLOCKS].copy_from_slice(&self.bytes);
        dev.write_blocks(blk, &buf)?;
        Ok(())
    }

    pub fn is_set(&self, b: u32) -> bool {
        self.bytes[b as usize] != 0
    }

    pub fn set(&mut self, b: u32) {
        self.bytes[b as usize] = 1;
    }

    pub fn clear(&mut self, b: u32) {
        self.bytes[b as usize] = 0;
    }

    /// First-fit scan from block 0. Does not clear the byte.
    pub fn first_set(&self) -> Option<u32> {
        self.bytes.iter().position(|&m| m != 0).map(|b| b as u32)
    }

    pub fn count_set(&self) -> usize {
        self.bytes.iter().filter(|&&m| m != 0).count()
    }

    /// Write-mask step of `commit`: freeze every block the free-block
    /// mask reports allocated.
    pub fn freeze_live(&mut self, fbm: &Mask) {
        for (wm, fb) in self.bytes.iter_mut().zip(fbm.bytes.iter()) {
            if *fb == 0 {
                *wm = 0;
            }
        }
    }
}
