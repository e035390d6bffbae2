//! Fixed-width, little-endian encoding of on-disk records.
//!
//! Every record encodes to a constant number of bytes (`INODE_SIZE`,
//! `DIR_ENTRY_SIZE`, `SUPERBLOCK_SIZE`), independent of the in-memory layout.

use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::LayoutError;

fn config() -> impl bincode::config::Config {
    bincode::config::standard().with_fixed_int_encoding()
}

/// Encodes `value` at the start of `buf`, returning the bytes written.
pub fn encode_into<T: Serialize>(value: &T, buf: &mut [u8]) -> Result<usize, LayoutError> {
    Ok(bincode::serde::encode_into_slice(value, buf, config())?)
}

pub fn decode<T: DeserializeOwned>(buf: &[u8]) -> Result<T, LayoutError> {
    let (value, _) = bincode::serde::decode_from_slice(buf, config())?;
    Ok(value)
}
