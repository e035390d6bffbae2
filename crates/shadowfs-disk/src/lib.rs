pub mod error;
pub mod file;
pub mod memory;

pub use error::DeviceError;
pub use file::FileDisk;
pub use memory::MemDisk;

/// Fixed-size block storage addressed by zero-based block index.
///
/// All transfers are whole blocks; `buf` must hold at least
/// `count * block_size()` bytes.
pub trait BlockDevice {
    fn block_size(&self) -> usize;

    fn total_blocks(&self) -> u32;

    fn read_blocks(&mut self, start: u32, count: u32, buf: &mut [u8]) -> Result<(), DeviceError>;

    fn write_blocks(&mut self, start: u32, count: u32, buf: &[u8]) -> Result<(), DeviceError>;

    fn read_block(&mut self, block: u32, buf: &mut [u8]) -> Result<(), DeviceError> {
        self.read_blocks(block, 1, buf)
    }

    fn write_block(&mut self, block: u32, buf: &[u8]) -> Result<(), DeviceError> {
        self.write_blocks(block, 1, buf)
    }
}

/// Validates a transfer and returns its byte length.
pub(crate) fn check_transfer(
    device: &dyn BlockDevice,
    start: u32,
    count: u32,
    buf_len: usize,
) -> Result<usize, DeviceError> {
    let total = device.total_blocks();
    if start as u64 + count as u64 > total as u64 {
        return Err(DeviceError::OutOfRange {
            start,
            count,
            total,
        });
    }
    let len = count as usize * device.block_size();
    if buf_len < len {
        return Err(DeviceError::BufferSize {
            expected: len,
            actual: buf_len,
        });
    }
    Ok(len)
}
