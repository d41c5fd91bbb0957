//! Compile-time layout parameters. The on-disk format is parametric in
//! the block size and the volume size; the reference configuration is a
//! 1024-byte block and a 1024-block volume.

/// Block size in bytes.
pub const BSIZE: usize = 1024;

/// Number of blocks in the volume.
pub const NUM_BLOCKS: usize = 1024;

/// Direct block pointers per inode.
pub const NDIRECT: usize = 14;

/// Block pointers held by one indirect-pointer block.
pub const NINDIRECT: usize = BSIZE / core::mem::size_of::<u32>();

/// Maximum number of blocks addressable by one inode.
pub const MAXBLOCKS: usize = NDIRECT + NINDIRECT;

/// Maximum file size in bytes.
pub const MAXFILE: usize = MAXBLOCKS * BSIZE;

/// Shadow-root slots in the superblock; one per possible snapshot.
pub const NSHADOW: usize = 14;

/// Maximum filename length in bytes. Longer names are truncated.
pub const FILENAME_SIZE: usize = 10;

/// Size of an on-disk directory entry.
pub const DIRENT_SIZE: usize = 16;

/// Size of an on-disk inode record.
pub const INODE_SIZE: usize = 64;

/// Inode records per block.
pub const IPB: usize = BSIZE / INODE_SIZE;

/// Descriptor-table slots per volume.
pub const NFD: usize = NUM_BLOCKS;

/// Block holding the superblock.
pub const SUPERBLOCK: u32 = 0;

/// Block holding shadow 0's free-block mask at format time.
pub const FBM_BLOCK: u32 = 1;

/// Block holding shadow 0's write mask at format time.
pub const WM_BLOCK: u32 = 2;

/// First inode-table block at format time.
pub const INODE_TABLE_BLOCK: u32 = 3;

/// First root-directory block at format time.
pub const ROOT_DIR_BLOCK: u32 = 4;
