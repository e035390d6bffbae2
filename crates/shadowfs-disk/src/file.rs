use std::fs::{File, OpenOptions};
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::Path;

use log::debug;

use crate::{check_transfer, BlockDevice, DeviceError};

/// A disk image stored in a host file, one block after another.
pub struct FileDisk {
    file: File,
    block_size: usize,
    total_blocks: u32,
}

impl FileDisk {
    /// Creates (or truncates) the image and sizes it to `total_blocks` zeroed blocks.
    pub fn format<P: AsRef<Path>>(
        path: P,
        block_size: usize,
        total_blocks: u32,
    ) -> Result<Self, DeviceError> {
        let path = path.as_ref();
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(true)
            .open(path)?;
        file.set_len(block_size as u64 * total_blocks as u64)?;
        debug!(
            "formatted image {} ({} blocks of {} bytes)",
            path.display(),
            total_blocks,
            block_size
        );

        Ok(Self {
            file,
            block_size,
            total_blocks,
        })
    }

    /// Opens an existing image; its length must match the requested geometry.
    pub fn open<P: AsRef<Path>>(
        path: P,
        block_size: usize,
        total_blocks: u32,
    ) -> Result<Self, DeviceError> {
        let path = path.as_ref();
        let file = OpenOptions::new().read(true).write(true).open(path)?;
        let expected = block_size as u64 * total_blocks as u64;
        let actual = file.metadata()?.len();
        if actual != expected {
            return Err(DeviceError::Geometry { expected, actual });
        }
        debug!("opened image {} ({} blocks)", path.display(), total_blocks);

        Ok(Self {
            file,
            block_size,
            total_blocks,
        })
    }

    fn seek_block(&mut self, block: u32) -> Result<(), DeviceError> {
        let pos = block as u64 * self.block_size as u64;
        self.file.seek(SeekFrom::Start(pos))?;
        Ok(())
    }
}

impl BlockDevice for FileDisk {
    fn block_size(&self) -> usize {
        self.block_size
    }

    fn total_blocks(&self) -> u32 {
        self.total_blocks
    }

    fn read_blocks(&mut self, start: u32, count: u32, buf: &mut [u8]) -> Result<(), DeviceError> {
        let len = check_transfer(&*self, start, count, buf.len())?;
        self.seek_block(start)?;
        self.file.read_exact(&mut buf[..len])?;
        Ok(())
    }

    fn write_blocks(&mut self, start: u32, count: u32, buf: &[u8]) -> Result<(), DeviceError> {
        let len = check_transfer(&*self, start, count, buf.len())?;
        self.seek_block(start)?;
        self.file.write_all(&buf[..len])?;
        self.file.flush()?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn format_then_reopen_keeps_blocks() {
        let dir = TempDir::new().expect("tempdir");
        let path = dir.path().join("disk.img");

        let mut disk = FileDisk::format(&path, 512, 8).expect("format");
        let block = [0xABu8; 512];
        disk.write_block(7, &block).expect("write");
        drop(disk);

        let mut disk = FileDisk::open(&path, 512, 8).expect("open");
        let mut buf = [0u8; 512];
        disk.read_block(7, &mut buf).expect("read");
        assert_eq!(buf, block);
        disk.read_block(0, &mut buf).expect("read");
        assert!(buf.iter().all(|&b| b == 0));
    }

    #[test]
    fn open_rejects_mismatched_geometry() {
        let dir = TempDir::new().expect("tempdir");
        let path = dir.path().join("disk.img");
        FileDisk::format(&path, 512, 8).expect("format");

        assert!(matches!(
            FileDisk::open(&path, 512, 16),
            Err(DeviceError::Geometry {
                expected: 8192,
                actual: 4096
            })
        ));
    }

    #[test]
    fn open_missing_image_is_io_error() {
        let dir = TempDir::new().expect("tempdir");
        assert!(matches!(
            FileDisk::open(dir.path().join("absent.img"), 512, 8),
            Err(DeviceError::Io(_))
        ));
    }

    #[test]
    fn multi_block_transfer() {
        let dir = TempDir::new().expect("tempdir");
        let mut disk = FileDisk::format(dir.path().join("disk.img"), 512, 8).expect("format");
        let data: Vec<u8> = (0..1024).map(|i| (i % 251) as u8).collect();
        disk.write_blocks(2, 2, &data).expect("write");

        let mut buf = vec![0u8; 1024];
        disk.read_blocks(2, 2, &mut buf).expect("read");
        assert_eq!(buf, data);
        assert!(matches!(
            disk.read_blocks(7, 2, &mut buf),
            Err(DeviceError::OutOfRange { .. })
        ));
    }
}
