//! A flat file system over a fixed-size block device, with a small ring of
//! committed directory versions that can be restored later.

pub mod bitmap;
pub mod config;
pub mod descriptor;
pub mod directory;
pub mod error;
pub mod fs;
mod io;
mod snapshot;

pub use bitmap::{Bitmap, BlockState};
pub use config::{FsConfig, Geometry};
pub use descriptor::{DescriptorTable, Fd, OpenFile};
pub use directory::Directory;
pub use error::{ErrorKind, FsError};
pub use fs::{FileInfo, FileSystem, FsStat};

/// Slot of a committed version in the shadow ring.
pub type VersionId = usize;
