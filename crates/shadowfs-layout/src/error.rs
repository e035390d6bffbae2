#[derive(Debug, thiserror::Error)]
pub enum LayoutError {
    #[error("encode error: {0}")]
    Encode(#[from] bincode::error::EncodeError),

    #[error("decode error: {0}")]
    Decode(#[from] bincode::error::DecodeError),

    #[error("invalid magic: {0:#x}")]
    BadMagic(u32),

    #[error("unsupported format version: {0}")]
    UnsupportedVersion(u32),

    #[error("file name is empty")]
    EmptyName,

    #[error("file name {name:?} is longer than {max} bytes")]
    NameTooLong { name: String, max: usize },

    #[error("file name {0:?} contains a NUL byte")]
    NulInName(String),
}
