//! End-to-end scenarios: the plain file API, then the shadowing
//! machinery (commit, copy-on-write, restore) layered on top.

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use shadowfs::{FsError, MemDisk, ShadowFs, BSIZE, MAXFILE, NDIRECT, NSHADOW, NUM_BLOCKS};

fn fresh() -> ShadowFs<MemDisk> {
    ShadowFs::format(MemDisk::new(BSIZE, NUM_BLOCKS)).unwrap()
}

#[test]
fn write_then_read_round_trip() {
    let mut fs = fresh();
    let fd = fs.open("a").unwrap();
    assert_eq!(fd, 2);
    assert_eq!(fs.write(fd, b"hello").unwrap(), 5);
    fs.rseek(fd, 0).unwrap();
    let mut buf = [0u8; 5];
    assert_eq!(fs.read(fd, &mut buf).unwrap(), 5);
    assert_eq!(&buf, b"hello");
}

#[test]
fn two_kilobyte_file_takes_two_direct_blocks() {
    let mut fs = fresh();
    let fd = fs.open("a").unwrap();
    let before = fs.free_blocks();
    let data = vec![b'x'; 2000];
    assert_eq!(fs.write(fd, &data).unwrap(), 2000);
    assert_eq!(fs.size(fd).unwrap(), 2000);
    assert_eq!(fs.free_blocks(), before - 2);
}

#[test]
fn crossing_the_direct_region_allocates_the_pointer_block_once() {
    let mut fs = fresh();
    let fd = fs.open("a").unwrap();

    // Fill the direct region except its very last byte.
    let data = vec![b'x'; NDIRECT * BSIZE - 1];
    fs.write(fd, &data).unwrap();
    let before = fs.free_blocks();

    // Crossing into the indirect region costs one data block plus the
    // indirect-pointer block, exactly once.
    assert_eq!(fs.write(fd, b"abcdefg").unwrap(), 7);
    assert_eq!(fs.free_blocks(), before - 2);
    assert_eq!(fs.size(fd).unwrap(), NDIRECT * BSIZE + 6);

    fs.wseek(fd, NDIRECT * BSIZE + 5).unwrap();
    assert_eq!(fs.write(fd, b"!").unwrap(), 1);
    assert_eq!(fs.free_blocks(), before - 2);

    // The next block in the indirect region reuses the pointer block.
    fs.wseek(fd, fs.size(fd).unwrap()).unwrap();
    let filler = vec![b'y'; BSIZE];
    fs.write(fd, &filler).unwrap();
    assert_eq!(fs.free_blocks(), before - 3);
}

#[test]
fn fifteen_kilobytes_forces_the_indirect_region() {
    let mut fs = fresh();
    let fd = fs.open("a").unwrap();
    let before = fs.free_blocks();
    let data: Vec<u8> = (0..15 * BSIZE).map(|i| (i % 251) as u8).collect();
    assert_eq!(fs.write(fd, &data).unwrap(), data.len());
    // 15 data blocks plus the indirect-pointer block.
    assert_eq!(fs.free_blocks(), before - 16);

    fs.rseek(fd, 0).unwrap();
    let mut out = vec![0u8; data.len()];
    assert_eq!(fs.read(fd, &mut out).unwrap(), data.len());
    assert_eq!(out, data);
}

#[test]
fn commit_then_restore_recovers_the_old_version() {
    let mut fs = fresh();
    let fd = fs.open("a").unwrap();
    fs.write(fd, b"v1").unwrap();
    assert_eq!(fs.commit().unwrap(), 0);

    fs.wseek(fd, 0).unwrap();
    fs.write(fd, b"v2").unwrap();
    fs.rseek(fd, 0).unwrap();
    let mut buf = [0u8; 2];
    fs.read(fd, &mut buf).unwrap();
    assert_eq!(&buf, b"v2");

    fs.restore(0).unwrap();
    let fd = fs.open("a").unwrap();
    let mut buf = [0u8; 2];
    fs.read(fd, &mut buf).unwrap();
    assert_eq!(&buf, b"v1");
}

#[test]
fn every_snapshot_stays_readable() {
    let mut fs = fresh();
    let fd = fs.open("history").unwrap();
    for v in 0..3u32 {
        fs.wseek(fd, 0).unwrap();
        fs.write(fd, format!("version-{}", v).as_bytes()).unwrap();
        assert_eq!(fs.commit().unwrap(), v);
    }
    fs.wseek(fd, 0).unwrap();
    fs.write(fd, b"version-3").unwrap();

    for v in (0..3u32).rev() {
        fs.restore(v).unwrap();
        let fd = fs.open("history").unwrap();
        let mut buf = [0u8; 9];
        fs.rseek(fd, 0).unwrap();
        assert_eq!(fs.read(fd, &mut buf).unwrap(), 9);
        assert_eq!(buf, *format!("version-{}", v).as_bytes());
    }
}

#[test]
fn restore_drops_user_descriptors() {
    let mut fs = fresh();
    let fd = fs.open("a").unwrap();
    fs.write(fd, b"data").unwrap();
    fs.commit().unwrap();
    fs.restore(0).unwrap();
    let mut buf = [0u8; 4];
    assert!(matches!(
        fs.read(fd, &mut buf),
        Err(FsError::InvalidArgument(_))
    ));
}

#[test]
fn remove_then_recreate_reuses_the_inode_slot() {
    let mut fs = fresh();
    for name in &["a", "b", "c"] {
        let fd = fs.open(name).unwrap();
        fs.write(fd, name.as_bytes()).unwrap();
        fs.close(fd).unwrap();
    }
    assert_eq!(fs.num_inodes(), 4);

    fs.remove("b").unwrap();
    assert_eq!(fs.num_inodes(), 3);
    assert!(matches!(fs.remove("b"), Err(FsError::NotFound)));

    // Survivors are untouched.
    let fd = fs.open("c").unwrap();
    let mut buf = [0u8; 1];
    fs.read(fd, &mut buf).unwrap();
    assert_eq!(&buf, b"c");

    // Re-creation lands in the freed slot; no table growth.
    let table_len_before = fs.size(shadowfs::J_NODE).unwrap();
    let fd = fs.open("b").unwrap();
    assert_eq!(fs.size(shadowfs::J_NODE).unwrap(), table_len_before);
    assert_eq!(fs.size(fd).unwrap(), 0);
    assert_eq!(fs.num_inodes(), 4);
}

#[test]
fn remove_closes_descriptors_bound_to_the_file() {
    let mut fs = fresh();
    let fd = fs.open("a").unwrap();
    fs.write(fd, b"data").unwrap();
    fs.remove("a").unwrap();
    let mut buf = [0u8; 4];
    assert!(fs.read(fd, &mut buf).is_err());
}

#[test]
fn remove_keeps_frozen_blocks_for_the_snapshot() {
    let mut fs = fresh();
    let fd = fs.open("a").unwrap();
    fs.write(fd, &vec![b'x'; 3 * BSIZE]).unwrap();
    fs.commit().unwrap();

    // The file's blocks are frozen now; remove may not release them.
    // It costs two blocks instead: the inode-table block and the
    // directory block both shadow on their first post-commit write.
    let before = fs.free_blocks();
    fs.remove("a").unwrap();
    assert_eq!(fs.free_blocks(), before - 2);

    fs.restore(0).unwrap();
    let fd = fs.open("a").unwrap();
    let mut buf = vec![0u8; 3 * BSIZE];
    assert_eq!(fs.read(fd, &mut buf).unwrap(), 3 * BSIZE);
    assert!(buf.iter().all(|&b| b == b'x'));
}

#[test]
fn shadow_slots_exhaust_cleanly() {
    let mut fs = fresh();
    for expected in 0..(NSHADOW as u32 - 1) {
        assert_eq!(fs.commit().unwrap(), expected);
    }
    assert_eq!(fs.current_root(), NSHADOW as u32 - 1);

    let free = fs.free_blocks();
    assert!(matches!(fs.commit(), Err(FsError::NoSpace)));
    // The failed commit changed nothing.
    assert_eq!(fs.current_root(), NSHADOW as u32 - 1);
    assert_eq!(fs.free_blocks(), free);
}

#[test]
fn size_tracks_the_write_cursor_high_water_mark() {
    let mut fs = fresh();
    let fd = fs.open("a").unwrap();
    fs.write(fd, &vec![b'a'; 100]).unwrap();
    assert_eq!(fs.size(fd).unwrap(), 100);

    // Overwriting in the middle does not shrink or grow the file.
    fs.wseek(fd, 40).unwrap();
    fs.write(fd, &vec![b'b'; 20]).unwrap();
    assert_eq!(fs.size(fd).unwrap(), 100);

    // Writing across the end grows it to cursor + count.
    fs.wseek(fd, 90).unwrap();
    fs.write(fd, &vec![b'c'; 20]).unwrap();
    assert_eq!(fs.size(fd).unwrap(), 110);
}

#[test]
fn random_chunked_writes_round_trip() {
    let mut rng = StdRng::seed_from_u64(0x5eed);
    let mut fs = fresh();
    for (i, name) in ["p", "q", "r"].iter().enumerate() {
        let fd = fs.open(name).unwrap();
        let len = rng.gen_range(1..3 * BSIZE);
        let mut data = vec![0u8; len];
        rng.fill(&mut data[..]);

        // Interleave files and chunk sizes to stress the cursor math.
        let mut off = 0;
        while off < len {
            let n = rng.gen_range(1..=BSIZE).min(len - off);
            assert_eq!(fs.write(fd, &data[off..off + n]).unwrap(), n);
            off += n;
        }

        fs.rseek(fd, 0).unwrap();
        let mut out = vec![0u8; len];
        assert_eq!(fs.read(fd, &mut out).unwrap(), len);
        assert_eq!(out, data, "file {} corrupted", i);
    }
}

#[test]
fn read_clamps_to_end_of_file() {
    let mut fs = fresh();
    let fd = fs.open("a").unwrap();
    fs.write(fd, b"0123456789").unwrap();
    fs.rseek(fd, 4).unwrap();
    let mut buf = [0u8; 32];
    assert_eq!(fs.read(fd, &mut buf).unwrap(), 6);
    assert_eq!(&buf[..6], b"456789");
    // Cursor now at end of file.
    assert_eq!(fs.read(fd, &mut buf).unwrap(), 0);
}

#[test]
fn allocator_exhaustion_surfaces_partial_progress() {
    let mut fs = fresh();
    let big = vec![b'z'; MAXFILE];
    let mut filled = Vec::new();
    let overflow = loop {
        let name = format!("f{}", filled.len());
        let fd = fs.open(&name).unwrap();
        match fs.write(fd, &big) {
            Ok(n) if n == MAXFILE => filled.push(name),
            Ok(n) => {
                assert!(n > 0 && n < MAXFILE);
                assert_eq!(n % BSIZE, 0);
                break name;
            }
            Err(e) => panic!("expected partial progress, got {}", e),
        }
    };
    assert_eq!(fs.free_blocks(), 0);

    // A full volume cannot take new files...
    assert!(matches!(fs.open("g"), Err(FsError::NoSpace)));

    // ...until something is removed; nothing is frozen, so the blocks
    // come straight back.
    fs.remove(&filled[0]).unwrap();
    assert!(fs.free_blocks() > NDIRECT);
    let fd = fs.open(&overflow).unwrap();
    fs.wseek(fd, fs.size(fd).unwrap()).unwrap();
    assert_eq!(fs.write(fd, &vec![b'w'; BSIZE]).unwrap(), BSIZE);
}

#[test]
fn snapshots_survive_a_remount() {
    let path = std::env::temp_dir().join(format!("shadowfs-vol-{}.img", std::process::id()));
    {
        let mut fs = shadowfs::format(&path).unwrap();
        let fd = fs.open("persist").unwrap();
        fs.write(fd, b"first").unwrap();
        fs.commit().unwrap();
        fs.wseek(fd, 0).unwrap();
        fs.write(fd, b"later").unwrap();
    }
    {
        let mut fs = shadowfs::mount(&path).unwrap();
        assert_eq!(fs.current_root(), 1);
        let fd = fs.open("persist").unwrap();
        let mut buf = [0u8; 5];
        fs.read(fd, &mut buf).unwrap();
        assert_eq!(&buf, b"later");

        fs.restore(0).unwrap();
        let fd = fs.open("persist").unwrap();
        let mut buf = [0u8; 5];
        fs.read(fd, &mut buf).unwrap();
        assert_eq!(&buf, b"first");
    }
    std::fs::remove_file(&path).unwrap();
}

#[test]
fn commit_freezes_the_inode_table_and_directory_too() {
    let mut fs = fresh();
    let fd = fs.open("a").unwrap();
    fs.write(fd, b"old").unwrap();
    fs.commit().unwrap();

    // Creating a file after the commit rewrites the (frozen) inode
    // table and directory through copy-on-write; the snapshot keeps
    // its own copies.
    let fd_b = fs.open("b").unwrap();
    fs.write(fd_b, b"new").unwrap();
    assert_eq!(fs.num_inodes(), 3);

    fs.restore(0).unwrap();
    assert_eq!(fs.num_inodes(), 2);
    assert!(matches!(fs.remove("b"), Err(FsError::NotFound)));
    let fd = fs.open("a").unwrap();
    let mut buf = [0u8; 3];
    fs.read(fd, &mut buf).unwrap();
    assert_eq!(&buf, b"old");
}
