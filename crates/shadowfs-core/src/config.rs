use core::ops::Range;

use shadowfs_layout::{
    blocks_for, entry_table_len, inode_table_len, INODE_DIRECT_POINTERS, SUPERBLOCK_SIZE,
};

use crate::descriptor::RESERVED_DESCRIPTORS;
use crate::directory::RESERVED_SLOTS;
use crate::FsError;

pub use shadowfs_layout::DEFAULT_BLOCK_SIZE;

pub const DEFAULT_TOTAL_BLOCKS: u32 = 1024;
pub const DEFAULT_MAX_FILES: u32 = 72;
pub const DEFAULT_MAX_OPEN_FILES: usize = 200;
pub const MIN_BLOCK_SIZE: usize = 512;

/// Trailing blocks holding the free bitmap and the write mask.
pub const BITMAP_BLOCKS: u32 = 2;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FsConfig {
    pub block_size: usize,
    pub total_blocks: u32,
    /// Inode/directory slots, including the two bootstrap slots.
    pub max_files: u32,
    /// Descriptor slots, including the two reserved descriptors.
    pub max_open_files: usize,
}

impl Default for FsConfig {
    fn default() -> Self {
        Self {
            block_size: DEFAULT_BLOCK_SIZE,
            total_blocks: DEFAULT_TOTAL_BLOCKS,
            max_files: DEFAULT_MAX_FILES,
            max_open_files: DEFAULT_MAX_OPEN_FILES,
        }
    }
}

impl FsConfig {
    /// Checks that the layout fits and returns the resulting geometry.
    pub fn validate(&self) -> Result<Geometry, FsError> {
        if self.block_size < MIN_BLOCK_SIZE.max(SUPERBLOCK_SIZE) {
            return Err(FsError::InvalidConfig(format!(
                "block size {} is below the minimum of {}",
                self.block_size, MIN_BLOCK_SIZE
            )));
        }
        if self.max_files as usize <= RESERVED_SLOTS {
            return Err(FsError::InvalidConfig(format!(
                "at least {} file slots are required",
                RESERVED_SLOTS + 1
            )));
        }
        if self.max_open_files <= RESERVED_DESCRIPTORS {
            return Err(FsError::InvalidConfig(format!(
                "at least {} descriptor slots are required",
                RESERVED_DESCRIPTORS + 1
            )));
        }

        let geometry = Geometry::new(self.block_size, self.total_blocks, self.max_files);
        geometry.check()?;
        Ok(geometry)
    }
}

/// Block layout of a formatted image, derived from the superblock fields.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Geometry {
    pub block_size: usize,
    pub total_blocks: u32,
    pub inode_count: u32,
    pub inode_table_blocks: u32,
    pub entry_blocks: u32,
}

impl Geometry {
    pub fn new(block_size: usize, total_blocks: u32, inode_count: u32) -> Self {
        Self {
            block_size,
            total_blocks,
            inode_count,
            inode_table_blocks: blocks_for(inode_table_len(inode_count), block_size),
            entry_blocks: blocks_for(entry_table_len(inode_count), block_size),
        }
    }

    pub(crate) fn check(&self) -> Result<(), FsError> {
        if self.total_blocks as usize > self.block_size * 8 {
            return Err(FsError::InvalidConfig(format!(
                "{} blocks do not fit a one-block bitmap of {} bits",
                self.total_blocks,
                self.block_size * 8
            )));
        }
        if self.inode_table_blocks as usize > INODE_DIRECT_POINTERS
            || self.directory_blocks() as usize > INODE_DIRECT_POINTERS
        {
            return Err(FsError::InvalidConfig(format!(
                "a directory of {} blocks cannot be described by {} direct pointers",
                self.directory_blocks(),
                INODE_DIRECT_POINTERS
            )));
        }
        let metadata = 1 + self.directory_blocks() + BITMAP_BLOCKS;
        if self.total_blocks <= metadata {
            return Err(FsError::InvalidConfig(format!(
                "{} blocks leave no room for data after {} metadata blocks",
                self.total_blocks, metadata
            )));
        }
        Ok(())
    }

    pub fn directory_blocks(&self) -> u32 {
        self.inode_table_blocks + self.entry_blocks
    }

    /// Blocks of the live directory region, right after the superblock.
    pub fn directory_range(&self) -> Range<u32> {
        1..1 + self.directory_blocks()
    }

    pub fn inode_table_range(&self) -> Range<u32> {
        1..1 + self.inode_table_blocks
    }

    pub fn entry_table_range(&self) -> Range<u32> {
        let start = 1 + self.inode_table_blocks;
        start..start + self.entry_blocks
    }

    /// Persisted length of the directory region in bytes.
    pub fn directory_len(&self) -> usize {
        self.directory_blocks() as usize * self.block_size
    }

    pub fn free_map_block(&self) -> u32 {
        self.total_blocks - 2
    }

    pub fn write_mask_block(&self) -> u32 {
        self.total_blocks - 1
    }

    pub fn max_file_size(&self) -> usize {
        INODE_DIRECT_POINTERS * self.block_size
    }
}
