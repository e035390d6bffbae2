#[derive(Debug, thiserror::Error)]
pub enum DeviceError {
    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),

    #[error("{count} blocks from block {start} exceed a device of {total} blocks")]
    OutOfRange { start: u32, count: u32, total: u32 },

    #[error("buffer holds {actual} bytes, transfer needs {expected}")]
    BufferSize { expected: usize, actual: usize },

    #[error("image is {actual} bytes, expected {expected}")]
    Geometry { expected: u64, actual: u64 },
}
