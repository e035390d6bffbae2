use shadowfs_core::{ErrorKind, FileSystem, FsConfig, FsError};
use shadowfs_disk::MemDisk;

fn init_logger() {
    let _ = env_logger::builder().is_test(true).try_init();
}

fn format(config: &FsConfig) -> FileSystem<MemDisk> {
    init_logger();
    let disk = MemDisk::new(config.block_size, config.total_blocks);
    FileSystem::format(disk, config).unwrap()
}

fn fresh() -> FileSystem<MemDisk> {
    format(&FsConfig::default())
}

#[test]
fn reference_scenario() {
    let mut fs = fresh();
    let fd = fs.open("a.txt").unwrap();
    assert_eq!(fd, 2);

    let data = vec![b'x'; 1500];
    assert_eq!(fs.write(fd, &data).unwrap(), 1500);
    let slot = fs.directory().lookup("a.txt").unwrap();
    assert_eq!(fs.directory().inode(slot).blocks().count(), 2);

    fs.seek_read(fd, 0).unwrap();
    let mut buf = vec![0u8; 1500];
    assert_eq!(fs.read(fd, &mut buf).unwrap(), 1500);
    assert_eq!(buf, data);
}

#[test]
fn append_grows_by_bytes_written() {
    let mut fs = fresh();
    let fd = fs.open("log").unwrap();
    let mut expected = 0;
    for chunk in [10usize, 1014, 1, 3000] {
        assert_eq!(fs.write(fd, &vec![7u8; chunk]).unwrap(), chunk);
        expected += chunk;
        assert_eq!(fs.size(fd).unwrap(), expected);
    }

    let again = fs.open("log").unwrap();
    fs.write(again, b"tail").unwrap();
    assert_eq!(fs.size(again).unwrap(), expected + 4);
    assert_eq!(fs.size(fd).unwrap(), expected + 4);
}

#[test]
fn removed_blocks_are_reused() {
    let mut fs = fresh();
    let fd = fs.open("old").unwrap();
    fs.write(fd, &[1u8; 3 * 1024]).unwrap();
    fs.close(fd).unwrap();
    let freed: Vec<u32> = fs.directory().data_blocks().collect();
    let free_before = fs.free_map().free_count();

    fs.remove("old").unwrap();
    assert_eq!(fs.free_map().free_count(), free_before + 3);

    let fd = fs.open("new").unwrap();
    fs.write(fd, &[2u8; 2 * 1024]).unwrap();
    let reused: Vec<u32> = fs.directory().data_blocks().collect();
    assert_eq!(reused, freed[..2]);
}

#[test]
fn directory_capacity_boundary() {
    let config = FsConfig {
        max_files: 10,
        ..FsConfig::default()
    };
    let mut fs = format(&config);
    let capacity = fs.stat().max_files;
    assert_eq!(capacity, 8);

    for i in 0..capacity {
        let fd = fs.open(&format!("f{}", i)).unwrap();
        fs.close(fd).unwrap();
    }
    let err = fs.open("one-more").unwrap_err();
    assert!(matches!(err, FsError::DirectoryFull { .. }));
    assert_eq!(err.kind(), ErrorKind::ResourceExhausted);

    let fd = fs.open("f3").unwrap();
    fs.close(fd).unwrap();
    fs.remove("f0").unwrap();
    fs.open("one-more").unwrap();
}

#[test]
fn descriptor_capacity_boundary() {
    let config = FsConfig {
        max_open_files: 5,
        ..FsConfig::default()
    };
    let mut fs = format(&config);
    let fds: Vec<_> = (0..3).map(|_| fs.open("shared").unwrap()).collect();
    assert_eq!(fds, vec![2, 3, 4]);

    let err = fs.open("shared").unwrap_err();
    assert!(matches!(err, FsError::TooManyOpenFiles { capacity: 5 }));
    assert!(matches!(
        fs.open("other").unwrap_err(),
        FsError::TooManyOpenFiles { .. }
    ));
    assert_eq!(fs.directory().lookup("other"), None);

    fs.close(3).unwrap();
    assert_eq!(fs.open("other").unwrap(), 3);
}

#[test]
fn seek_boundaries() {
    let mut fs = fresh();
    let fd = fs.open("s").unwrap();
    fs.seek_read(fd, 0).unwrap();

    fs.write(fd, &[0u8; 100]).unwrap();
    fs.seek_read(fd, 99).unwrap();
    assert!(matches!(
        fs.seek_read(fd, 100),
        Err(FsError::InvalidSeek { loc: 100, size: 100 })
    ));
    assert!(matches!(
        fs.seek_write(fd, 100),
        Err(FsError::InvalidSeek { .. })
    ));
    fs.seek_read(fd, 0).unwrap();
}

#[test]
fn reading_an_empty_file_fails() {
    let mut fs = fresh();
    let fd = fs.open("empty").unwrap();
    fs.seek_read(fd, 0).unwrap();
    let mut buf = [0u8; 10];
    let err = fs.read(fd, &mut buf).unwrap_err();
    assert!(matches!(err, FsError::UnassignedBlock { index: 0 }));
    assert_eq!(err.kind(), ErrorKind::NotFound);
}

#[test]
fn descriptor_errors() {
    let mut fs = fresh();
    let mut buf = [0u8; 4];
    assert_eq!(fs.close(0).unwrap_err().kind(), ErrorKind::InvalidArgument);
    assert_eq!(fs.close(200).unwrap_err().kind(), ErrorKind::InvalidArgument);
    assert_eq!(fs.close(2).unwrap_err().kind(), ErrorKind::NotFound);
    assert!(matches!(fs.read(7, &mut buf), Err(FsError::NotOpen(7))));
    assert!(matches!(fs.write(1, b"data"), Err(FsError::BadDescriptor(1))));
}

#[test]
fn names_are_validated() {
    let mut fs = fresh();
    assert_eq!(fs.open("").unwrap_err().kind(), ErrorKind::InvalidArgument);
    assert_eq!(
        fs.open("eleven-char").unwrap_err().kind(),
        ErrorKind::InvalidArgument
    );
    assert!(fs.open("ten-chars!").is_ok());
    assert_eq!(
        fs.open("root.blks").unwrap_err().kind(),
        ErrorKind::InvalidArgument
    );
}

#[test]
fn embedded_nul_never_creates_a_file() {
    let mut fs = fresh();
    let free = fs.free_map().free_count();
    for _ in 0..3 {
        let err = fs.open("a\0b").unwrap_err();
        assert!(matches!(err, FsError::InvalidName(_)));
        assert_eq!(err.kind(), ErrorKind::InvalidArgument);
    }
    assert_eq!(fs.open("\0").unwrap_err().kind(), ErrorKind::InvalidArgument);

    assert!(fs.list().is_empty());
    assert_eq!(fs.directory().lookup("a"), None);
    assert_eq!(fs.free_map().free_count(), free);

    let fd = fs.open("a").unwrap();
    fs.close(fd).unwrap();
    assert_eq!(fs.list().len(), 1);
    assert_eq!(fs.list()[0].name, "a");
}

#[test]
fn remove_rules() {
    let mut fs = fresh();
    assert!(matches!(fs.remove("ghost"), Err(FsError::NotFound(_))));

    let fd = fs.open("busy").unwrap();
    let err = fs.remove("busy").unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Busy);
    fs.close(fd).unwrap();
    fs.remove("busy").unwrap();
    assert!(fs.list().is_empty());
}

#[test]
fn list_reports_user_files_only() {
    let mut fs = fresh();
    let fd = fs.open("b").unwrap();
    fs.write(fd, &[0u8; 2048]).unwrap();
    fs.open("a").unwrap();

    let files = fs.list();
    assert_eq!(files.len(), 2);
    assert_eq!(files[0].name, "b");
    assert_eq!(files[0].size, 2048);
    assert_eq!(files[0].blocks, 2);
    assert_eq!(files[1].name, "a");
    assert_eq!(files[1].size, 0);
}

#[test]
fn writes_fail_without_free_blocks() {
    let config = FsConfig {
        block_size: 512,
        total_blocks: 16,
        max_files: 4,
        max_open_files: 4,
    };
    let mut fs = format(&config);
    let free = fs.free_map().free_count();
    assert_eq!(free, 11);

    let fd = fs.open("big").unwrap();
    fs.write(fd, &vec![1u8; free * 512]).unwrap();
    assert_eq!(fs.free_map().free_count(), 0);

    let other = fs.open("more").unwrap();
    let err = fs.write(other, b"x").unwrap_err();
    assert!(matches!(err, FsError::NoSpace { needed: 1, free: 0 }));
    assert_eq!(fs.size(other).unwrap(), 0);
}
