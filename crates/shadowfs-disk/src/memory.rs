use crate::{check_transfer, BlockDevice, DeviceError};

/// A volatile device backed by a byte vector.
#[derive(Debug, Clone)]
pub struct MemDisk {
    data: Vec<u8>,
    block_size: usize,
    total_blocks: u32,
}

impl MemDisk {
    pub fn new(block_size: usize, total_blocks: u32) -> Self {
        Self {
            data: vec![0; block_size * total_blocks as usize],
            block_size,
            total_blocks,
        }
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.data
    }

    fn range(&self, start: u32, len: usize) -> core::ops::Range<usize> {
        let offset = start as usize * self.block_size;
        offset..offset + len
    }
}

impl BlockDevice for MemDisk {
    fn block_size(&self) -> usize {
        self.block_size
    }

    fn total_blocks(&self) -> u32 {
        self.total_blocks
    }

    fn read_blocks(&mut self, start: u32, count: u32, buf: &mut [u8]) -> Result<(), DeviceError> {
        let len = check_transfer(&*self, start, count, buf.len())?;
        buf[..len].copy_from_slice(&self.data[self.range(start, len)]);
        Ok(())
    }

    fn write_blocks(&mut self, start: u32, count: u32, buf: &[u8]) -> Result<(), DeviceError> {
        let len = check_transfer(&*self, start, count, buf.len())?;
        let range = self.range(start, len);
        self.data[range].copy_from_slice(&buf[..len]);
        Ok(())
    }
}
