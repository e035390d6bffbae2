use log::debug;
use shadowfs_layout::Inode;

use crate::FsError;

pub type Fd = usize;

/// Descriptor numbers below this are never handed out.
pub const RESERVED_DESCRIPTORS: usize = 2;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OpenFile {
    /// Directory slot of the file.
    pub slot: usize,
    /// Copy of the inode, refreshed after every write.
    pub inode: Inode,
    pub read_ptr: usize,
    pub write_ptr: usize,
}

/// Bounded table of open files, each with independent cursors.
#[derive(Debug, Clone)]
pub struct DescriptorTable {
    entries: Vec<Option<OpenFile>>,
    full: usize,
}

impl DescriptorTable {
    pub fn new(capacity: usize) -> Self {
        Self {
            entries: vec![None; capacity],
            full: 0,
        }
    }

    pub fn capacity(&self) -> usize {
        self.entries.len()
    }

    pub fn len(&self) -> usize {
        self.full
    }

    pub fn is_empty(&self) -> bool {
        self.full == 0
    }

    pub fn is_full(&self) -> bool {
        self.full + RESERVED_DESCRIPTORS >= self.capacity()
    }

    /// Binds the first free descriptor to `slot`. The read cursor starts at 0,
    /// the write cursor at end of file.
    pub fn open(&mut self, slot: usize, inode: Inode) -> Result<Fd, FsError> {
        let fd = self
            .entries
            .iter()
            .skip(RESERVED_DESCRIPTORS)
            .position(Option::is_none)
            .map(|i| i + RESERVED_DESCRIPTORS)
            .ok_or(FsError::TooManyOpenFiles {
                capacity: self.capacity(),
            })?;

        self.entries[fd] = Some(OpenFile {
            slot,
            inode,
            read_ptr: 0,
            write_ptr: inode.len(),
        });
        self.full += 1;
        debug!("fd {} -> slot {}", fd, slot);
        Ok(fd)
    }

    pub fn close(&mut self, fd: Fd) -> Result<OpenFile, FsError> {
        self.check(fd)?;
        let file = self.entries[fd].take().ok_or(FsError::NotOpen(fd))?;
        self.full -= 1;
        debug!("closed fd {}", fd);
        Ok(file)
    }

    pub fn get(&self, fd: Fd) -> Result<&OpenFile, FsError> {
        self.check(fd)?;
        self.entries[fd].as_ref().ok_or(FsError::NotOpen(fd))
    }

    pub fn get_mut(&mut self, fd: Fd) -> Result<&mut OpenFile, FsError> {
        self.check(fd)?;
        self.entries[fd].as_mut().ok_or(FsError::NotOpen(fd))
    }

    pub fn is_open(&self, slot: usize) -> bool {
        self.iter().any(|(_, file)| file.slot == slot)
    }

    /// Updates the cached inode of every descriptor bound to `slot`.
    pub fn refresh(&mut self, slot: usize, inode: Inode) {
        self.entries
            .iter_mut()
            .flatten()
            .filter(|file| file.slot == slot)
            .for_each(|file| file.inode = inode);
    }

    pub fn iter(&self) -> impl Iterator<Item = (Fd, &OpenFile)> + '_ {
        self.entries
            .iter()
            .enumerate()
            .filter_map(|(fd, file)| file.as_ref().map(|file| (fd, file)))
    }

    fn check(&self, fd: Fd) -> Result<(), FsError> {
        if fd < RESERVED_DESCRIPTORS || fd >= self.capacity() {
            return Err(FsError::BadDescriptor(fd));
        }
        Ok(())
    }
}
