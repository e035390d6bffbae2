use shadowfs_core::{ErrorKind, FileSystem, FsConfig};
use shadowfs_disk::{BlockDevice, FileDisk, MemDisk};
use tempfile::tempdir;

fn init_logger() {
    let _ = env_logger::builder().is_test(true).try_init();
}

#[test]
fn files_survive_remount() {
    init_logger();
    let dir = tempdir().unwrap();
    let path = dir.path().join("disk.img");
    let config = FsConfig::default();

    {
        let mut fs = FileSystem::<FileDisk>::open_image(&path, &config, true).unwrap();
        let fd = fs.open("notes").unwrap();
        fs.write(fd, b"persisted across mounts").unwrap();
        fs.close(fd).unwrap();
        let fd = fs.open("scratch").unwrap();
        fs.write(fd, &[9u8; 5000]).unwrap();
    }

    let mut fs = FileSystem::<FileDisk>::open_image(&path, &config, false).unwrap();
    assert!(fs.descriptors().is_empty());
    let names: Vec<String> = fs.list().into_iter().map(|f| f.name).collect();
    assert_eq!(names, vec!["notes", "scratch"]);

    let fd = fs.open("notes").unwrap();
    let mut buf = [0u8; 23];
    assert_eq!(fs.read(fd, &mut buf).unwrap(), 23);
    assert_eq!(&buf, b"persisted across mounts");
    assert_eq!(fs.size(fd).unwrap(), 23);
}

#[test]
fn allocator_state_survives_remount() {
    init_logger();
    let dir = tempdir().unwrap();
    let path = dir.path().join("disk.img");
    let config = FsConfig::default();

    let free = {
        let mut fs = FileSystem::<FileDisk>::open_image(&path, &config, true).unwrap();
        let fd = fs.open("a").unwrap();
        fs.write(fd, &[1u8; 2048]).unwrap();
        fs.free_map().free_count()
    };

    let mut fs = FileSystem::<FileDisk>::open_image(&path, &config, false).unwrap();
    assert_eq!(fs.free_map().free_count(), free);
    let fd = fs.open("b").unwrap();
    fs.write(fd, b"b").unwrap();
    let a = fs.directory().lookup("a").unwrap();
    let b = fs.directory().lookup("b").unwrap();
    let a_blocks: Vec<u32> = fs.directory().inode(a).blocks().collect();
    let b_block = fs.directory().inode(b).blocks().next().unwrap();
    assert!(!a_blocks.contains(&b_block));
}

#[test]
fn versions_survive_remount() {
    init_logger();
    let dir = tempdir().unwrap();
    let path = dir.path().join("disk.img");
    let config = FsConfig::default();

    let version = {
        let mut fs = FileSystem::<FileDisk>::open_image(&path, &config, true).unwrap();
        let fd = fs.open("v1").unwrap();
        fs.write(fd, b"first").unwrap();
        fs.close(fd).unwrap();
        let version = fs.commit().unwrap();
        fs.remove("v1").unwrap();
        version
    };

    let mut fs = FileSystem::<FileDisk>::open_image(&path, &config, false).unwrap();
    assert_eq!(fs.versions(), vec![version]);
    assert!(fs.list().is_empty());

    fs.restore(version).unwrap();
    let fd = fs.open("v1").unwrap();
    let mut buf = [0u8; 5];
    fs.read(fd, &mut buf).unwrap();
    assert_eq!(&buf, b"first");
}

#[test]
fn mount_rejects_wrong_geometry() {
    init_logger();
    let dir = tempdir().unwrap();
    let path = dir.path().join("disk.img");
    let config = FsConfig::default();
    drop(FileSystem::<FileDisk>::open_image(&path, &config, true).unwrap());

    let smaller = FsConfig {
        total_blocks: 512,
        ..FsConfig::default()
    };
    let err = FileSystem::<FileDisk>::open_image(&path, &smaller, false)
        .err()
        .unwrap();
    assert_eq!(err.kind(), ErrorKind::Io);
}

#[test]
fn mount_rejects_damaged_superblock() {
    init_logger();
    let config = FsConfig::default();
    let fs = FileSystem::format(MemDisk::new(1024, 1024), &config).unwrap();
    let mut disk = fs.into_device();

    let mut block = vec![0u8; 1024];
    disk.read_block(0, &mut block).unwrap();
    block[0] ^= 0xff;
    disk.write_block(0, &block).unwrap();

    let err = FileSystem::mount(disk, &config).err().unwrap();
    assert_eq!(err.kind(), ErrorKind::Corrupt);
}

#[test]
fn missing_image_is_an_io_error() {
    init_logger();
    let dir = tempdir().unwrap();
    let path = dir.path().join("absent.img");
    let err = FileSystem::<FileDisk>::open_image(&path, &FsConfig::default(), false)
        .err()
        .unwrap();
    assert_eq!(err.kind(), ErrorKind::Io);
}
