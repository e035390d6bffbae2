use shadowfs_disk::DeviceError;
use shadowfs_layout::LayoutError;

/// Broad classes of failure, independent of the concrete cause.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    ResourceExhausted,
    InvalidArgument,
    NotFound,
    Busy,
    Io,
    Corrupt,
}

#[derive(Debug, thiserror::Error)]
pub enum FsError {
    #[error("too many files in the file system (max {capacity})")]
    DirectoryFull { capacity: usize },

    #[error("too many open files (max {capacity})")]
    TooManyOpenFiles { capacity: usize },

    #[error("file system too full: {needed} blocks needed, {free} free")]
    NoSpace { needed: usize, free: usize },

    #[error("file too big: {blocks} blocks exceed {max} direct blocks")]
    FileTooLarge { blocks: usize, max: usize },

    #[error("file descriptor {0} out of bounds")]
    BadDescriptor(usize),

    #[error("length must be positive")]
    InvalidLength,

    #[error("cannot seek to {loc}; file size is {size}")]
    InvalidSeek { loc: usize, size: usize },

    #[error("invalid file name: {0}")]
    InvalidName(LayoutError),

    #[error("{0:?} is reserved for file system metadata")]
    ReservedName(String),

    #[error("no open file associated with file descriptor {0}")]
    NotOpen(usize),

    #[error("could not find the file {0:?}")]
    NotFound(String),

    #[error("block {index} of the file is unassigned")]
    UnassignedBlock { index: usize },

    #[error("file {0:?} is still open")]
    FileBusy(String),

    #[error("{0} file descriptors are still open")]
    DescriptorsOpen(usize),

    #[error("version {0} is not retained")]
    UnknownVersion(usize),

    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("corrupt image: {0}")]
    Corrupt(String),

    #[error(transparent)]
    Layout(#[from] LayoutError),

    #[error("device error: {0}")]
    Device(#[from] DeviceError),
}

impl FsError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            FsError::DirectoryFull { .. }
            | FsError::TooManyOpenFiles { .. }
            | FsError::NoSpace { .. }
            | FsError::FileTooLarge { .. } => ErrorKind::ResourceExhausted,
            FsError::BadDescriptor(_)
            | FsError::InvalidLength
            | FsError::InvalidSeek { .. }
            | FsError::InvalidName(_)
            | FsError::ReservedName(_)
            | FsError::InvalidConfig(_) => ErrorKind::InvalidArgument,
            FsError::NotOpen(_)
            | FsError::NotFound(_)
            | FsError::UnassignedBlock { .. }
            | FsError::UnknownVersion(_) => ErrorKind::NotFound,
            FsError::FileBusy(_) | FsError::DescriptorsOpen(_) => ErrorKind::Busy,
            FsError::Device(_) => ErrorKind::Io,
            FsError::Corrupt(_) | FsError::Layout(_) => ErrorKind::Corrupt,
        }
    }
}
