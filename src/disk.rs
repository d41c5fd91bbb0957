//! Block device adapter.
//!
//! The store runs on anything that can read and write whole blocks at a
//! block-aligned offset. [`FileDisk`] emulates a volume inside a
//! regular file; [`MemDisk`] keeps it in memory for tests.

use std::fs::{File, OpenOptions};
use std::io::{self, Read, Seek, SeekFrom, Write};
use std::path::Path;

/// A fixed-size, block-addressable storage volume.
///
/// `buf` must be a whole number of blocks; `start` is a block index.
/// Implementations reject out-of-range access instead of panicking.
pub trait BlockDevice {
    /// Read `buf.len() / block_size` blocks starting at block `start`.
    fn read_blocks(&mut self, start: u32, buf: &mut [u8]) -> io::Result<()>;

    /// Write `buf.len() / block_size` blocks starting at block `start`.
    fn write_blocks(&mut self, start: u32, buf: &[u8]) -> io::Result<()>;
}

fn span(start: u32, len: usize, block_size: usize, num_blocks: usize) -> io::Result<u64> {
    if len % block_size != 0 {
        return Err(io::Error::new(
            io::ErrorKind::InvalidInput,
            "buffer is not a whole number of blocks",
        ));
    }
    let end = (start as usize)
        .checked_mul(block_size)
        .and_then(|off| off.checked_add(len));
    match end {
        Some(end) if end <= block_size * num_blocks => Ok(start as u64 * block_size as u64),
        _ => Err(io::Error::new(
            io::ErrorKind::InvalidInput,
            "block range out of bounds",
        )),
    }
}

/// A volume backed by a regular file.
pub struct FileDisk {
    file: File,
    block_size: usize,
    num_blocks: usize,
}

impl FileDisk {
    /// Creates (or erases) the backing file and zero-fills it to
    /// `block_size * num_blocks` bytes.
    pub fn init_fresh<P: AsRef<Path>>(
        path: P,
        block_size: usize,
        num_blocks: usize,
    ) -> io::Result<Self> {
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(true)
            .open(path)?;
        file.set_len((block_size * num_blocks) as u64)?;
        Ok(FileDisk {
            file,
            block_size,
            num_blocks,
        })
    }

    /// Attaches an existing backing file, validating its length.
    pub fn init_existing<P: AsRef<Path>>(
        path: P,
        block_size: usize,
        num_blocks: usize,
    ) -> io::Result<Self> {
        let file = OpenOptions::new().read(true).write(true).open(path)?;
        if file.metadata()?.len() != (block_size * num_blocks) as u64 {
            return Err(io::Error::new(
                io::ErrorKind::InvalidData,
                "backing file length does not match volume geometry",
            ));
        }
        Ok(FileDisk {
            file,
            block_size,
            num_blocks,
        })
    }
}

impl BlockDevice for FileDisk {
    fn read_blocks(&mut self, start: u32, buf: &mut [u8]) -> io::Result<()> {
        let off = span(start, buf.len(), self.block_size, self.num_blocks)?;
        self.file.seek(SeekFrom::Start(off))?;
        self.file.read_exact(buf)
    }

    fn write_blocks(&mut self, start: u32, buf: &[u8]) -> io::Result<()> {
        let off = span(start, buf.len(), self.block_size, self.num_blocks)?;
        self.file.seek(SeekFrom::Start(off))?;
        self.file.write_all(buf)
    }
}

/// An in-memory volume.
pub struct MemDisk {
    data: Vec<u8>,
    block_size: usize,
    num_blocks: usize,
}

impl MemDisk {
    pub fn new(block_size: usize, num_blocks: usize) -> Self {
        MemDisk {
            data: vec![0; block_size * num_blocks],
            block_size,
            num_blocks,
        }
    }
}

impl BlockDevice for MemDisk {
    fn read_blocks(&mut self, start: u32, buf: &mut [u8]) -> io::Result<()> {
        let off = span(start, buf.len(), self.block_size, self.num_blocks)? as usize;
        buf.copy_from_slice(&self.data[off..off + buf.len()]);
        Ok(())
    }

    fn write_blocks(&mut self, start: u32, buf: &[u8]) -> io::Result<()> {
        let off = span(start, buf.len(), self.block_size, self.num_blocks)? as usize;
        self.data[off..off + buf.len()].copy_from_slice(buf);
        Ok(())
    }
}
