//! The flat directory: a fixed-capacity inode table and an entry table,
//! parallel by index. Slot `i` is a file only when both `files[i]` and
//! `entries[i]` are live.

use log::debug;
use shadowfs_layout::{
    decode, encode_into, entry_table_len, inode_table_len, validate_name, DirEntry, Inode,
    DIRECTORY_HEADER_SIZE, DIR_ENTRY_SIZE, ENTRY_TABLE_NAME, INODE_SIZE, INODE_TABLE_NAME,
};

use crate::config::Geometry;
use crate::FsError;

/// Slots 0 and 1 describe the directory region itself.
pub const RESERVED_SLOTS: usize = 2;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Directory {
    full: u32,
    size: u32,
    files: Vec<Inode>,
    entries: Vec<DirEntry>,
}

impl Directory {
    /// An empty directory holding only the two bootstrap slots.
    pub fn new(geometry: &Geometry) -> Result<Self, FsError> {
        let capacity = geometry.inode_count as usize;
        let mut directory = Self {
            full: 0,
            size: geometry.directory_len() as u32,
            files: vec![Inode::FREE; capacity],
            entries: vec![DirEntry::FREE; capacity],
        };

        let inode_table: Vec<u32> = geometry.inode_table_range().collect();
        let entry_table: Vec<u32> = geometry.entry_table_range().collect();
        directory.bootstrap(
            0,
            INODE_TABLE_NAME,
            Inode::describing(&inode_table, inode_table_len(geometry.inode_count)),
        )?;
        directory.bootstrap(
            1,
            ENTRY_TABLE_NAME,
            Inode::describing(&entry_table, entry_table_len(geometry.inode_count)),
        )?;
        Ok(directory)
    }

    fn bootstrap(&mut self, slot: usize, name: &str, inode: Inode) -> Result<(), FsError> {
        self.entries[slot] = DirEntry::new(name, slot as u32)?;
        self.files[slot] = inode;
        self.full += 1;
        Ok(())
    }

    pub fn capacity(&self) -> usize {
        self.files.len()
    }

    /// Occupied slots, bootstrap slots included.
    pub fn len(&self) -> usize {
        self.full as usize
    }

    pub fn is_empty(&self) -> bool {
        self.len() <= RESERVED_SLOTS
    }

    pub fn is_full(&self) -> bool {
        self.len() == self.capacity()
    }

    pub fn is_reserved(slot: usize) -> bool {
        slot < RESERVED_SLOTS
    }

    /// First slot whose entry carries `name`.
    pub fn lookup(&self, name: &str) -> Option<usize> {
        self.entries.iter().position(|entry| entry.matches(name))
    }

    /// First slot with a free inode.
    pub fn allocate_slot(&self) -> Option<usize> {
        self.files.iter().position(Inode::is_free)
    }

    /// Records a new empty file and returns its slot.
    pub fn create(&mut self, name: &str) -> Result<usize, FsError> {
        validate_name(name).map_err(FsError::InvalidName)?;
        let slot = self
            .allocate_slot()
            .filter(|_| !self.is_full())
            .ok_or(FsError::DirectoryFull {
                capacity: self.capacity(),
            })?;

        self.entries[slot] = DirEntry::new(name, slot as u32)?;
        self.files[slot] = Inode::empty();
        self.full += 1;
        debug!("created {:?} in slot {}", name, slot);
        Ok(slot)
    }

    /// Invalidates both halves of `slot` and returns the inode it held.
    pub fn release(&mut self, slot: usize) -> Inode {
        let inode = core::mem::replace(&mut self.files[slot], Inode::FREE);
        self.entries[slot] = DirEntry::FREE;
        self.full -= 1;
        inode
    }

    pub fn inode(&self, slot: usize) -> &Inode {
        &self.files[slot]
    }

    pub fn set_inode(&mut self, slot: usize, inode: Inode) {
        self.files[slot] = inode;
    }

    pub fn entry(&self, slot: usize) -> &DirEntry {
        &self.entries[slot]
    }

    /// Live user files as `(slot, name, inode)`.
    pub fn files(&self) -> impl Iterator<Item = (usize, &str, &Inode)> + '_ {
        self.entries
            .iter()
            .zip(&self.files)
            .enumerate()
            .skip(RESERVED_SLOTS)
            .filter(|(_, (entry, inode))| !entry.is_free() && !inode.is_free())
            .map(|(slot, (entry, inode))| (slot, entry.name_as_str(), inode))
    }

    /// Data blocks owned by user files.
    pub fn data_blocks(&self) -> impl Iterator<Item = u32> + '_ {
        self.files().flat_map(|(_, _, inode)| inode.blocks())
    }

    /// Whether any live inode, bootstrap slots included, points at `block`.
    pub fn references(&self, block: u32) -> bool {
        self.files
            .iter()
            .filter(|inode| !inode.is_free())
            .any(|inode| inode.blocks().any(|b| b == block))
    }

    /// Serializes the whole region, unused slots included, into
    /// `geometry.directory_len()` bytes.
    pub fn encode(&self, geometry: &Geometry) -> Result<Vec<u8>, FsError> {
        let mut buf = vec![0u8; geometry.directory_len()];
        encode_into(&(self.full, self.size), &mut buf)?;
        for (i, inode) in self.files.iter().enumerate() {
            let offset = DIRECTORY_HEADER_SIZE + i * INODE_SIZE;
            encode_into(inode, &mut buf[offset..offset + INODE_SIZE])?;
        }

        let entries_start = geometry.inode_table_blocks as usize * geometry.block_size;
        for (i, entry) in self.entries.iter().enumerate() {
            let offset = entries_start + i * DIR_ENTRY_SIZE;
            encode_into(entry, &mut buf[offset..offset + DIR_ENTRY_SIZE])?;
        }
        Ok(buf)
    }

    pub fn decode(buf: &[u8], geometry: &Geometry) -> Result<Self, FsError> {
        if buf.len() < geometry.directory_len() {
            return Err(FsError::Corrupt(format!(
                "directory image is {} bytes, expected {}",
                buf.len(),
                geometry.directory_len()
            )));
        }

        let capacity = geometry.inode_count as usize;
        let (full, size): (u32, u32) = decode(buf)?;
        let files = (0..capacity)
            .map(|i| decode(&buf[DIRECTORY_HEADER_SIZE + i * INODE_SIZE..]))
            .collect::<Result<Vec<Inode>, _>>()?;
        let entries_start = geometry.inode_table_blocks as usize * geometry.block_size;
        let entries = (0..capacity)
            .map(|i| decode(&buf[entries_start + i * DIR_ENTRY_SIZE..]))
            .collect::<Result<Vec<DirEntry>, _>>()?;

        let directory = Self {
            full,
            size,
            files,
            entries,
        };
        directory.check()?;
        Ok(directory)
    }

    fn check(&self) -> Result<(), FsError> {
        let mut live = 0;
        for (slot, (entry, inode)) in self.entries.iter().zip(&self.files).enumerate() {
            match (entry.is_free(), inode.is_free()) {
                (true, true) => {}
                (false, false) if entry.inode_index as usize == slot => live += 1,
                _ => {
                    return Err(FsError::Corrupt(format!(
                        "directory slot {} has mismatched inode and entry",
                        slot
                    )))
                }
            }
        }
        if live != self.full || live < RESERVED_SLOTS as u32 {
            return Err(FsError::Corrupt(format!(
                "directory records {} files but holds {}",
                self.full, live
            )));
        }
        Ok(())
    }
}
