//! The file store proper. Five layers end here:
//!   + Blocks: the [`BlockDevice`] adapter moves whole blocks.
//!   + Masks: the free-block mask allocates, the write mask decides
//!     between in-place writes and copy-on-write.
//!   + Inodes: direct + single-indirect addressing; growth and
//!     copy-on-write redirect pointers and persist the owning record.
//!   + Directory: a flat name -> inode map, itself a regular file.
//!   + Files: the descriptor table and the public API, including
//!     `commit` and `restore`.
//!
//! Two descriptor slots are reserved and seeded before any user call
//! can run. Slot 0 holds the j-node, the inode of the inode table; its
//! record persists into the superblock's active root slot. Slot 1 holds
//! the root directory, inode 0 of the table. This breaks the bootstrap
//! cycle: the directory is a file, but opening a file needs the
//! directory.
//!
//! Everything an inode owns is reached through the same write path, so
//! shadowing composes: a user write that must copy a frozen data block
//! updates its inode, the inode update rewrites a table block through
//! slot 0 (copying it too if frozen), and the table's own pointer
//! change lands in the superblock. After `commit` freezes the volume,
//! the first write to any file therefore rebuilds exactly the chain of
//! blocks it touches, leaving the snapshot intact.

use core::cmp;

use array_macro::array;
use log::{debug, trace};
use zerocopy::{AsBytes, FromBytes};

use crate::bitmap::Mask;
use crate::dir::{Dirent, FileName};
use crate::disk::BlockDevice;
use crate::error::{FsError, Result};
use crate::inode::{Dinode, Inode, InodeSlot, PtrBlock};
use crate::param::{
    BSIZE, DIRENT_SIZE, FBM_BLOCK, INODE_SIZE, INODE_TABLE_BLOCK, IPB, MAXBLOCKS, MAXFILE, NDIRECT,
    NFD, NSHADOW, NUM_BLOCKS, ROOT_DIR_BLOCK, SUPERBLOCK, WM_BLOCK,
};
use crate::superblock::Superblock;

/// Descriptor index returned by [`ShadowFs::open`].
pub type Fd = usize;

/// Reserved descriptor slot of the j-node.
pub const J_NODE: Fd = 0;

/// Reserved descriptor slot of the root directory.
pub const ROOT_DIR: Fd = 1;

/// A file cursor: a direct-pointer index and a byte offset inside that
/// block.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
struct Cursor {
    d_ptr: usize,
    offset: usize,
}

impl Cursor {
    fn at(loc: usize) -> Self {
        Cursor {
            d_ptr: loc / BSIZE,
            offset: loc % BSIZE,
        }
    }

    fn bytes(self) -> usize {
        self.d_ptr * BSIZE + self.offset
    }
}

/// Where a descriptor's inode record persists.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Owner {
    /// The j-node itself; persists into the superblock's active root.
    JNode,
    /// Table inode `id`; persists through slot [`J_NODE`] at
    /// `id * INODE_SIZE`.
    Ino(u32),
}

#[derive(Clone)]
struct Descriptor {
    inode: Inode,
    owner: Owner,
    rd: Cursor,
    wr: Cursor,
}

fn partial_or_nospace(tot: usize) -> Result<usize> {
    if tot > 0 {
        Ok(tot)
    } else {
        Err(FsError::NoSpace)
    }
}

/// A mounted volume.
///
/// Single-threaded and synchronous: every call runs to completion, and
/// the descriptor table, superblock copy, and current mask pair live
/// here for the life of the mount.
pub struct ShadowFs<D> {
    dev: D,
    sb: Superblock,
    fbm: Mask,
    wm: Mask,
    fdt: Box<[Option<Descriptor>; NFD]>,
}

impl<D: BlockDevice> ShadowFs<D> {
    /// Erases and initializes the volume on `dev`, then mounts it.
    pub fn format(mut dev: D) -> Result<Self> {
        let sb = Superblock::format();
        sb.persist(&mut dev)?;

        // Initial inode table: inode 0 is the root directory, the rest
        // of the block holds free slots.
        let mut table = [0u8; BSIZE];
        let mut dir_inode = Inode::empty();
        dir_inode.d_ptrs[0] = ROOT_DIR_BLOCK;
        table[..INODE_SIZE].copy_from_slice(Dinode::from(&dir_inode).as_bytes());
        for i in 1..IPB {
            table[i * INODE_SIZE..(i + 1) * INODE_SIZE]
                .copy_from_slice(Dinode::free().as_bytes());
        }
        dev.write_blocks(INODE_TABLE_BLOCK, &table)?;
        dev.write_blocks(ROOT_DIR_BLOCK, &[0u8; BSIZE])?;

        let mut fbm = Mask::all_set();
        for b in &[
            SUPERBLOCK,
            FBM_BLOCK,
            WM_BLOCK,
            INODE_TABLE_BLOCK,
            ROOT_DIR_BLOCK,
        ] {
            fbm.clear(*b);
        }
        fbm.store(&mut dev, FBM_BLOCK)?;
        let wm = Mask::all_set();
        wm.store(&mut dev, WM_BLOCK)?;

        let mut fs = ShadowFs {
            dev,
            sb,
            fbm,
            wm,
            fdt: Box::new(array![_ => None; NFD]),
        };
        fs.seed_reserved()?;
        debug!("formatted volume: {} blocks of {} bytes", NUM_BLOCKS, BSIZE);
        Ok(fs)
    }

    /// Attaches an already formatted volume.
    pub fn mount(mut dev: D) -> Result<Self> {
        let sb = Superblock::load(&mut dev)?;
        let fbm = Mask::load(&mut dev, sb.fbm_ptr())?;
        let wm = Mask::load(&mut dev, sb.wm_ptr())?;
        let mut fs = ShadowFs {
            dev,
            sb,
            fbm,
            wm,
            fdt: Box::new(array![_ => None; NFD]),
        };
        fs.seed_reserved()?;
        debug!("mounted volume at shadow root {}", fs.sb.current_root());
        Ok(fs)
    }

    /// Rebuilds the two reserved descriptors from the active shadow,
    /// dropping everything else.
    fn seed_reserved(&mut self) -> Result<()> {
        for slot in self.fdt.iter_mut() {
            *slot = None;
        }
        let jnode = self.sb.root()?;
        self.fdt[J_NODE] = Some(Descriptor {
            inode: jnode,
            owner: Owner::JNode,
            rd: Cursor::default(),
            wr: Cursor::at(jnode.size as usize),
        });
        let dir = match self.read_table_inode(0)? {
            InodeSlot::Live(inode) => inode,
            InodeSlot::Free => return Err(FsError::Corrupt("root directory inode is free")),
        };
        self.fdt[ROOT_DIR] = Some(Descriptor {
            inode: dir,
            owner: Owner::Ino(0),
            rd: Cursor::default(),
            wr: Cursor::at(dir.size as usize),
        });
        Ok(())
    }

    // ------------------------------------------------------------------
    // Public file API.

    /// Opens `name`, creating it if absent. The read cursor starts at
    /// offset 0, the write cursor at end of file.
    pub fn open(&mut self, name: &str) -> Result<Fd> {
        let fname = FileName::new(name)?;
        let (ino, inode) = match self.lookup(&fname)? {
            Some(ino) => match self.read_table_inode(ino)? {
                InodeSlot::Live(inode) => (ino, inode),
                InodeSlot::Free => return Err(FsError::Corrupt("directory names a free inode")),
            },
            None => {
                // Creation may grow the inode table or the directory.
                if self.fbm.first_set().is_none() {
                    return Err(FsError::NoSpace);
                }
                let ino = match self.free_inode_slot()? {
                    Some(ino) => ino,
                    None => self.sb.num_inodes(),
                };
                let inode = Inode::empty();
                self.write_table_inode(ino, &Dinode::from(&inode))?;
                self.sb.set_num_inodes(self.sb.num_inodes() + 1);
                self.sb.persist(&mut self.dev)?;

                let entry = Dirent::new(&fname, ino);
                self.wseek_fd(ROOT_DIR, (ino as usize - 1) * DIRENT_SIZE)?;
                self.write_fd(ROOT_DIR, entry.as_bytes())?;
                debug!("created {} as inode {}", name, ino);
                (ino, inode)
            }
        };
        self.alloc_descriptor(Descriptor {
            owner: Owner::Ino(ino),
            rd: Cursor::default(),
            wr: Cursor::at(inode.size as usize),
            inode,
        })
    }

    /// Drops a user descriptor. The reserved slots cannot be closed.
    pub fn close(&mut self, fd: Fd) -> Result<()> {
        if fd == J_NODE || fd == ROOT_DIR {
            return Err(FsError::InvalidArgument("reserved descriptor"));
        }
        let slot = self
            .fdt
            .get_mut(fd)
            .ok_or(FsError::InvalidArgument("descriptor out of range"))?;
        if slot.take().is_none() {
            return Err(FsError::InvalidArgument("descriptor not open"));
        }
        Ok(())
    }

    /// Moves the read cursor to byte `loc`. Seeking past end of file
    /// parks the cursor at end of file and fails.
    pub fn rseek(&mut self, fd: Fd, loc: usize) -> Result<()> {
        self.rseek_fd(fd, loc)
    }

    /// Moves the write cursor to byte `loc`, which must be within
    /// `[0, size]`.
    pub fn wseek(&mut self, fd: Fd, loc: usize) -> Result<()> {
        if fd == J_NODE || fd == ROOT_DIR {
            return Err(FsError::InvalidArgument("reserved descriptor"));
        }
        self.wseek_fd(fd, loc)
    }

    /// Reads at the read cursor, clamped to end of file. Returns the
    /// number of bytes read.
    pub fn read(&mut self, fd: Fd, buf: &mut [u8]) -> Result<usize> {
        self.check_live(fd)?;
        self.read_fd(fd, buf)
    }

    /// Writes at the write cursor. On allocator exhaustion the byte
    /// count written so far is returned if nonzero.
    pub fn write(&mut self, fd: Fd, buf: &[u8]) -> Result<usize> {
        if fd == J_NODE || fd == ROOT_DIR {
            return Err(FsError::InvalidArgument("reserved descriptor"));
        }
        self.check_live(fd)?;
        self.write_fd(fd, buf)
    }

    /// Destroys `name`: closes its user descriptors, releases its
    /// writable blocks (frozen blocks still belong to earlier
    /// snapshots), tombstones the inode, and clears the directory
    /// entry.
    pub fn remove(&mut self, name: &str) -> Result<()> {
        let fname = FileName::new(name)?;
        let ino = self.lookup(&fname)?.ok_or(FsError::NotFound)?;

        for fd in 2..NFD {
            if matches!(&self.fdt[fd], Some(d) if d.owner == Owner::Ino(ino)) {
                self.fdt[fd] = None;
            }
        }

        let inode = match self.read_table_inode(ino)? {
            InodeSlot::Live(inode) => inode,
            InodeSlot::Free => return Err(FsError::Corrupt("directory names a free inode")),
        };
        for k in 0..NDIRECT {
            let b = inode.d_ptrs[k];
            if b != 0 && (b as usize) < NUM_BLOCKS && self.wm.is_set(b) {
                self.mark_free(b)?;
            }
        }
        if inode.i_ptr != 0 {
            if (inode.i_ptr as usize) >= NUM_BLOCKS {
                return Err(FsError::Corrupt("block pointer out of range"));
            }
            let data = self.read_block(inode.i_ptr)?;
            let pb = PtrBlock::read_from(&data[..])
                .ok_or(FsError::Corrupt("short indirect block"))?;
            for &b in pb.ptrs.iter() {
                if b != 0 && (b as usize) < NUM_BLOCKS && self.wm.is_set(b) {
                    self.mark_free(b)?;
                }
            }
            if self.wm.is_set(inode.i_ptr) {
                self.mark_free(inode.i_ptr)?;
            }
        }

        self.write_table_inode(ino, &Dinode::free())?;
        self.sb.set_num_inodes(self.sb.num_inodes() - 1);
        self.sb.persist(&mut self.dev)?;

        self.wseek_fd(ROOT_DIR, (ino as usize - 1) * DIRENT_SIZE)?;
        self.write_fd(ROOT_DIR, Dirent::empty().as_bytes())?;
        debug!("removed {} (inode {})", name, ino);
        Ok(())
    }

    /// Snapshots the volume. The next shadow slot inherits the current
    /// root and a copy of both masks, with every allocated block frozen.
    /// Returns the index of the snapshot just made immutable.
    pub fn commit(&mut self) -> Result<u32> {
        let cur = self.sb.current_root();
        if cur as usize + 1 >= NSHADOW {
            return Err(FsError::NoSpace);
        }
        let fbm_blk = self.fbm.first_set().ok_or(FsError::NoSpace)?;
        self.mark_allocated(fbm_blk)?;
        let wm_blk = match self.fbm.first_set() {
            Some(b) => b,
            None => {
                self.mark_free(fbm_blk)?;
                return Err(FsError::NoSpace);
            }
        };
        self.mark_allocated(wm_blk)?;

        let new_fbm = self.fbm.clone();
        let mut new_wm = self.wm.clone();
        new_wm.freeze_live(&new_fbm);
        new_fbm.store(&mut self.dev, fbm_blk)?;
        new_wm.store(&mut self.dev, wm_blk)?;

        self.sb.begin_shadow(fbm_blk, wm_blk);
        self.sb.persist(&mut self.dev)?;
        self.fbm = new_fbm;
        self.wm = new_wm;
        debug!("committed shadow {}; current root is {}", cur, cur + 1);
        Ok(cur)
    }

    /// Selects snapshot `n` as the current shadow. Later snapshots stay
    /// addressable; nothing is unfrozen, so writes after a restore
    /// never mutate a block an earlier commit froze. Open user
    /// descriptors describe the abandoned shadow and are dropped.
    pub fn restore(&mut self, n: u32) -> Result<()> {
        if n > self.sb.current_root() {
            return Err(FsError::InvalidArgument("no such snapshot"));
        }
        self.sb.select_root(n);
        self.fbm = Mask::load(&mut self.dev, self.sb.fbm_ptr())?;
        self.wm = Mask::load(&mut self.dev, self.sb.wm_ptr())?;
        self.seed_reserved()?;
        // The inode count tracks the current shadow, so it has to be
        // recounted from the restored table.
        let live = self.count_live_inodes()?;
        self.sb.set_num_inodes(live);
        self.sb.persist(&mut self.dev)?;
        debug!("restored shadow root {}", n);
        Ok(())
    }

    /// Size in bytes of the file behind `fd`.
    pub fn size(&self, fd: Fd) -> Result<usize> {
        match self.fdt.get(fd) {
            Some(Some(d)) => Ok(d.inode.size as usize),
            _ => Err(FsError::InvalidArgument("bad descriptor")),
        }
    }

    /// Number of free blocks in the current shadow.
    pub fn free_blocks(&self) -> usize {
        self.fbm.count_set()
    }

    /// Index of the active shadow root.
    pub fn current_root(&self) -> u32 {
        self.sb.current_root()
    }

    /// Number of live inodes in the current shadow, the root directory
    /// included.
    pub fn num_inodes(&self) -> u32 {
        self.sb.num_inodes()
    }

    // ------------------------------------------------------------------
    // Descriptor plumbing. The `_fd` variants skip the reserved-slot
    // guards so the engine itself can drive slots 0 and 1.

    fn check_live(&self, fd: Fd) -> Result<()> {
        match self.fdt.get(fd) {
            Some(Some(_)) => Ok(()),
            _ => Err(FsError::InvalidArgument("bad descriptor")),
        }
    }

    fn alloc_descriptor(&mut self, d: Descriptor) -> Result<Fd> {
        // Slots 0 and 1 are always occupied, so the scan lands at >= 2.
        match self.fdt.iter().position(|slot| slot.is_none()) {
            Some(fd) => {
                self.fdt[fd] = Some(d);
                Ok(fd)
            }
            None => Err(FsError::NoSpace),
        }
    }

    fn rseek_fd(&mut self, fd: Fd, loc: usize) -> Result<()> {
        let ent = self
            .fdt
            .get_mut(fd)
            .and_then(|slot| slot.as_mut())
            .ok_or(FsError::InvalidArgument("bad descriptor"))?;
        if loc > ent.inode.size as usize {
            // Historical: a past-end read seek fails but still parks
            // the cursor at end of file.
            ent.rd = Cursor::at(ent.inode.size as usize);
            return Err(FsError::InvalidArgument("seek past end of file"));
        }
        ent.rd = Cursor::at(loc);
        Ok(())
    }

    fn wseek_fd(&mut self, fd: Fd, loc: usize) -> Result<()> {
        let ent = self
            .fdt
            .get_mut(fd)
            .and_then(|slot| slot.as_mut())
            .ok_or(FsError::InvalidArgument("bad descriptor"))?;
        if loc > ent.inode.size as usize {
            return Err(FsError::InvalidArgument("seek past end of file"));
        }
        ent.wr = Cursor::at(loc);
        Ok(())
    }

    fn read_fd(&mut self, fd: Fd, buf: &mut [u8]) -> Result<usize> {
        let mut ent = self.fdt[fd]
            .clone()
            .ok_or(FsError::InvalidArgument("bad descriptor"))?;
        let res = self.read_inner(&mut ent, buf);
        self.fdt[fd] = Some(ent);
        res
    }

    fn write_fd(&mut self, fd: Fd, buf: &[u8]) -> Result<usize> {
        let mut ent = self.fdt[fd]
            .clone()
            .ok_or(FsError::InvalidArgument("bad descriptor"))?;
        let res = match self.write_inner(&mut ent, buf) {
            // Persist the inode record even if the size did not change:
            // the loop may have attached or redirected blocks.
            Ok(n) => self.persist_inode(ent.owner, &ent.inode).map(|_| n),
            Err(e) => Err(e),
        };
        self.fdt[fd] = Some(ent);
        res
    }

    fn read_inner(&mut self, ent: &mut Descriptor, buf: &mut [u8]) -> Result<usize> {
        let size = ent.inode.size as usize;
        let len = cmp::min(buf.len(), size.saturating_sub(ent.rd.bytes()));
        let mut tot = 0;
        while tot < len {
            let n = cmp::min(len - tot, BSIZE - ent.rd.offset);
            let b = self
                .block_at(&ent.inode, ent.rd.d_ptr)?
                .ok_or(FsError::Corrupt("unallocated block inside file bounds"))?;
            let data = self.read_block(b)?;
            buf[tot..tot + n].copy_from_slice(&data[ent.rd.offset..ent.rd.offset + n]);
            tot += n;
            ent.rd = Cursor::at(ent.rd.bytes() + n);
        }
        Ok(tot)
    }

    fn write_inner(&mut self, ent: &mut Descriptor, buf: &[u8]) -> Result<usize> {
        if ent.wr.bytes() + buf.len() > MAXFILE {
            return Err(FsError::InvalidArgument("write exceeds maximum file size"));
        }
        let mut tot = 0;
        while tot < buf.len() {
            let k = ent.wr.d_ptr;
            let off = ent.wr.offset;
            let n = cmp::min(buf.len() - tot, BSIZE - off);
            let b = match self.block_at(&ent.inode, k)? {
                Some(b) => b,
                None => {
                    // Grow: reserve a free block, zero it so a recycled
                    // block cannot leak stale bytes, record the pointer.
                    let nb = match self.fbm.first_set() {
                        Some(nb) => nb,
                        None => return partial_or_nospace(tot),
                    };
                    self.zero_block(nb)?;
                    trace!("attach block {} at index {}", nb, k);
                    match self.record_ptr(&mut ent.inode, ent.owner, k, nb) {
                        Err(FsError::NoSpace) => return partial_or_nospace(tot),
                        other => other?,
                    }
                    nb
                }
            };
            if self.wm.is_set(b) {
                let mut data = self.read_block(b)?;
                data[off..off + n].copy_from_slice(&buf[tot..tot + n]);
                self.write_block(b, &data)?;
            } else {
                // Frozen by an earlier snapshot: copy the old contents,
                // overlay the incoming bytes, write the copy, and
                // redirect the pointer. The old block is not freed; a
                // prior shadow still owns it.
                let nb = match self.fbm.first_set() {
                    Some(nb) => nb,
                    None => return partial_or_nospace(tot),
                };
                trace!("copy-on-write {} -> {} at index {}", b, nb, k);
                let mut data = self.read_block(b)?;
                data[off..off + n].copy_from_slice(&buf[tot..tot + n]);
                self.write_block(nb, &data)?;
                match self.record_ptr(&mut ent.inode, ent.owner, k, nb) {
                    Err(FsError::NoSpace) => return partial_or_nospace(tot),
                    other => other?,
                }
            }
            tot += n;
            // Size grows before the cursor advances.
            let pos = ent.wr.bytes() + n;
            ent.inode.size = cmp::max(ent.inode.size, pos as u32);
            ent.wr = Cursor::at(pos);
        }
        Ok(tot)
    }

    // ------------------------------------------------------------------
    // Inode engine.

    /// Resolves pointer index `k` to a block id. `None` means the block
    /// is not yet allocated.
    fn block_at(&mut self, inode: &Inode, k: usize) -> Result<Option<u32>> {
        if k >= MAXBLOCKS {
            return Err(FsError::Corrupt("pointer index out of range"));
        }
        let p = if k < NDIRECT {
            inode.d_ptrs[k]
        } else {
            if inode.i_ptr == 0 {
                return Ok(None);
            }
            if (inode.i_ptr as usize) >= NUM_BLOCKS {
                return Err(FsError::Corrupt("block pointer out of range"));
            }
            let data = self.read_block(inode.i_ptr)?;
            let pb = PtrBlock::read_from(&data[..])
                .ok_or(FsError::Corrupt("short indirect block"))?;
            pb.ptrs[k - NDIRECT]
        };
        if p == 0 {
            Ok(None)
        } else if (p as usize) >= NUM_BLOCKS {
            Err(FsError::Corrupt("block pointer out of range"))
        } else {
            Ok(Some(p))
        }
    }

    /// Records `b` as the block at pointer index `k`, marks it
    /// allocated, and persists the owning inode record. Growing into
    /// the indirect region allocates the pointer block on first use; a
    /// frozen pointer block is copied and redirected like any other
    /// block.
    fn record_ptr(&mut self, inode: &mut Inode, owner: Owner, k: usize, b: u32) -> Result<()> {
        if k >= MAXBLOCKS {
            return Err(FsError::Corrupt("pointer index out of range"));
        }
        self.mark_allocated(b)?;
        if k < NDIRECT {
            inode.d_ptrs[k] = b;
        } else {
            if inode.i_ptr == 0 {
                let ind = match self.fbm.first_set() {
                    Some(ind) => ind,
                    None => {
                        // Roll the reservation back; nothing recorded.
                        self.mark_free(b)?;
                        return Err(FsError::NoSpace);
                    }
                };
                self.zero_block(ind)?;
                self.mark_allocated(ind)?;
                trace!("attach indirect-pointer block {}", ind);
                inode.i_ptr = ind;
            }
            let data = self.read_block(inode.i_ptr)?;
            let mut pb = PtrBlock::read_from(&data[..])
                .ok_or(FsError::Corrupt("short indirect block"))?;
            pb.ptrs[k - NDIRECT] = b;
            if self.wm.is_set(inode.i_ptr) {
                self.write_block(inode.i_ptr, pb.as_bytes())?;
            } else {
                // The pointer block belongs to an earlier snapshot, so
                // the redirect itself must copy on write.
                let ind = match self.fbm.first_set() {
                    Some(ind) => ind,
                    None => {
                        self.mark_free(b)?;
                        return Err(FsError::NoSpace);
                    }
                };
                trace!("copy-on-write indirect-pointer block {} -> {}", inode.i_ptr, ind);
                self.write_block(ind, pb.as_bytes())?;
                self.mark_allocated(ind)?;
                inode.i_ptr = ind;
            }
        }
        self.persist_inode(owner, inode)
    }

    /// Writes the inode record back to wherever it lives: the j-node
    /// into the superblock, everything else into the inode table
    /// through slot [`J_NODE`].
    fn persist_inode(&mut self, owner: Owner, inode: &Inode) -> Result<()> {
        match owner {
            Owner::JNode => {
                self.sb.set_root(inode);
                self.sb.persist(&mut self.dev)
            }
            Owner::Ino(id) => self.write_table_inode(id, &Dinode::from(inode)),
        }
    }

    fn read_table_inode(&mut self, id: u32) -> Result<InodeSlot> {
        self.rseek_fd(J_NODE, id as usize * INODE_SIZE)?;
        let mut rec = [0u8; INODE_SIZE];
        let n = self.read_fd(J_NODE, &mut rec)?;
        if n < INODE_SIZE {
            return Err(FsError::Corrupt("inode table truncated"));
        }
        let rec = Dinode::read_from(&rec[..]).ok_or(FsError::Corrupt("bad inode record"))?;
        Ok(rec.decode())
    }

    fn write_table_inode(&mut self, id: u32, rec: &Dinode) -> Result<()> {
        self.wseek_fd(J_NODE, id as usize * INODE_SIZE)?;
        let n = self.write_fd(J_NODE, rec.as_bytes())?;
        // Records never straddle a block boundary, so no partial write.
        debug_assert_eq!(n, INODE_SIZE);
        Ok(())
    }

    /// Scans the directory for `name`. A miss is not an error here;
    /// `open` creates, `remove` fails.
    fn lookup(&mut self, name: &FileName) -> Result<Option<u32>> {
        self.rseek_fd(ROOT_DIR, 0)?;
        let mut rec = [0u8; DIRENT_SIZE];
        loop {
            let n = self.read_fd(ROOT_DIR, &mut rec)?;
            if n < DIRENT_SIZE {
                return Ok(None);
            }
            let entry =
                Dirent::read_from(&rec[..]).ok_or(FsError::Corrupt("bad directory entry"))?;
            if !entry.is_empty() && entry.matches(name) {
                return Ok(Some(entry.inode_id()));
            }
        }
    }

    /// Live records in the inode table of the current shadow.
    fn count_live_inodes(&mut self) -> Result<u32> {
        self.rseek_fd(J_NODE, 0)?;
        let mut rec = [0u8; INODE_SIZE];
        let mut live = 0;
        loop {
            let n = self.read_fd(J_NODE, &mut rec)?;
            if n < INODE_SIZE {
                return Ok(live);
            }
            let rec = Dinode::read_from(&rec[..]).ok_or(FsError::Corrupt("bad inode record"))?;
            if let InodeSlot::Live(_) = rec.decode() {
                live += 1;
            }
        }
    }

    /// Lowest free inode-table slot, if any.
    fn free_inode_slot(&mut self) -> Result<Option<u32>> {
        self.rseek_fd(J_NODE, 0)?;
        let mut rec = [0u8; INODE_SIZE];
        let mut id = 0;
        loop {
            let n = self.read_fd(J_NODE, &mut rec)?;
            if n < INODE_SIZE {
                return Ok(None);
            }
            let rec = Dinode::read_from(&rec[..]).ok_or(FsError::Corrupt("bad inode record"))?;
            if let InodeSlot::Free = rec.decode() {
                return Ok(Some(id));
            }
            id += 1;
        }
    }

    // ------------------------------------------------------------------
    // Mask and block helpers. Mask updates write through to the current
    // shadow's mask block.

    fn mark_allocated(&mut self, b: u32) -> Result<()> {
        self.fbm.clear(b);
        self.fbm.store(&mut self.dev, self.sb.fbm_ptr())
    }

    fn mark_free(&mut self, b: u32) -> Result<()> {
        self.fbm.set(b);
        self.fbm.store(&mut self.dev, self.sb.fbm_ptr())
    }

    fn read_block(&mut self, b: u32) -> Result<[u8; BSIZE]> {
        let mut buf = [0u8; BSIZE];
        self.dev.read_blocks(b, &mut buf)?;
        Ok(buf)
    }

    fn write_block(&mut self, b: u32, data: &[u8]) -> Result<()> {
        debug_assert_eq!(data.len(), BSIZE);
        self.dev.write_blocks(b, data)?;
        Ok(())
    }

    fn zero_block(&mut self, b: u32) -> Result<()> {
        self.write_block(b, &[0u8; BSIZE])
    }
}
