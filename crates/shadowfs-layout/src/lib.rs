use serde::{Deserialize, Serialize};

pub mod codec;
pub mod error;

pub use codec::{decode, encode_into};
pub use error::LayoutError;

pub const DEFAULT_BLOCK_SIZE: usize = 1024;
pub const MAGIC: u32 = 0x5353_4653;
pub const FORMAT_VERSION: u32 = 1;
pub const INODE_DIRECT_POINTERS: usize = 14;
pub const FILENAME_LEN: usize = 10;
pub const SHADOW_SLOTS: usize = 4;

/// Sentinel for a free inode, a free entry or an unassigned block pointer.
pub const UNASSIGNED: i32 = -1;

// Encoded sizes with the fixed-int codec.
pub const INODE_SIZE: usize = 4 + 4 * INODE_DIRECT_POINTERS + 4;
pub const DIR_ENTRY_SIZE: usize = FILENAME_LEN + 4;
pub const SUPERBLOCK_SIZE: usize = 6 * 4 + INODE_SIZE * (1 + SHADOW_SLOTS) + 4;
pub const DIRECTORY_HEADER_SIZE: usize = 8;

/// Names of the two bootstrap slots that describe the directory region itself.
pub const INODE_TABLE_NAME: &str = "root.blks";
pub const ENTRY_TABLE_NAME: &str = "dir.blks";

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
pub struct Inode {
    pub size: i32,
    pub direct: [i32; INODE_DIRECT_POINTERS],
    pub indirect: i32, // Reserved, never assigned
}

impl Inode {
    pub const FREE: Self = Self {
        size: UNASSIGNED,
        direct: [UNASSIGNED; INODE_DIRECT_POINTERS],
        indirect: UNASSIGNED,
    };

    /// A live inode of a zero-length file.
    pub fn empty() -> Self {
        Self {
            size: 0,
            ..Self::FREE
        }
    }

    /// An inode whose direct pointers are `blocks`, in order. At most
    /// `INODE_DIRECT_POINTERS` blocks are recorded.
    pub fn describing(blocks: &[u32], size: usize) -> Self {
        let mut inode = Self {
            size: size as i32,
            ..Self::FREE
        };
        for (ptr, &block) in inode.direct.iter_mut().zip(blocks) {
            *ptr = block as i32;
        }
        inode
    }

    pub fn is_free(&self) -> bool {
        self.size < 0
    }

    /// File length in bytes; zero for a free slot.
    pub fn len(&self) -> usize {
        self.size.max(0) as usize
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn block(&self, index: usize) -> Option<u32> {
        self.direct
            .get(index)
            .and_then(|&ptr| (ptr >= 0).then_some(ptr as u32))
    }

    pub fn set_block(&mut self, index: usize, block: u32) {
        self.direct[index] = block as i32;
    }

    /// Assigned direct blocks, in pointer order.
    pub fn blocks(&self) -> impl Iterator<Item = u32> + '_ {
        self.direct
            .iter()
            .filter(|&&ptr| ptr >= 0)
            .map(|&ptr| ptr as u32)
    }
}

impl Default for Inode {
    fn default() -> Self {
        Self::FREE
    }
}

// Directory entry: 10-byte zero-padded name followed by the inode slot.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
pub struct DirEntry {
    pub name: [u8; FILENAME_LEN],
    pub inode_index: i32,
}

impl DirEntry {
    pub const FREE: Self = Self {
        name: [0; FILENAME_LEN],
        inode_index: UNASSIGNED,
    };

    pub fn new(name_str: &str, inode_index: u32) -> Result<Self, LayoutError> {
        validate_name(name_str)?;
        let mut name = [0u8; FILENAME_LEN];
        let bytes = name_str.as_bytes();
        name[..bytes.len()].copy_from_slice(bytes);
        Ok(Self {
            name,
            inode_index: inode_index as i32,
        })
    }

    pub fn name_as_str(&self) -> &str {
        let end = self
            .name
            .iter()
            .position(|&c| c == 0)
            .unwrap_or(FILENAME_LEN);
        core::str::from_utf8(&self.name[..end]).unwrap_or("<invalid>")
    }

    pub fn is_free(&self) -> bool {
        self.inode_index < 0
    }

    pub fn matches(&self, name: &str) -> bool {
        !self.is_free() && self.name_as_str() == name
    }
}

impl Default for DirEntry {
    fn default() -> Self {
        Self::FREE
    }
}

pub fn validate_name(name: &str) -> Result<(), LayoutError> {
    if name.is_empty() {
        return Err(LayoutError::EmptyName);
    }
    if name.len() > FILENAME_LEN {
        return Err(LayoutError::NameTooLong {
            name: name.to_owned(),
            max: FILENAME_LEN,
        });
    }
    // Stored names are NUL padded, so an embedded NUL would truncate on read.
    if name.contains('\0') {
        return Err(LayoutError::NulInName(name.to_owned()));
    }
    Ok(())
}

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
pub struct SuperBlock {
    pub magic: u32,
    pub version: u32,
    pub block_size: u32,
    pub total_blocks: u32,
    /// Length of the directory region, in blocks.
    pub directory_region_size: u32,
    /// Capacity of the inode and entry tables.
    pub inode_count: u32,
    /// Describes the live directory region.
    pub root: Inode,
    /// Ring of committed directory generations.
    pub shadow: [Inode; SHADOW_SLOTS],
    pub last_shadow: i32,
}

impl SuperBlock {
    pub fn new(
        block_size: u32,
        total_blocks: u32,
        directory_region_size: u32,
        inode_count: u32,
        root: Inode,
    ) -> Self {
        Self {
            magic: MAGIC,
            version: FORMAT_VERSION,
            block_size,
            total_blocks,
            directory_region_size,
            inode_count,
            root,
            shadow: [Inode::FREE; SHADOW_SLOTS],
            last_shadow: UNASSIGNED,
        }
    }

    pub fn validate(&self) -> Result<(), LayoutError> {
        if self.magic != MAGIC {
            return Err(LayoutError::BadMagic(self.magic));
        }
        if self.version != FORMAT_VERSION {
            return Err(LayoutError::UnsupportedVersion(self.version));
        }
        Ok(())
    }

    /// Ring slot the next commit lands in.
    pub fn next_shadow_slot(&self) -> usize {
        (self.last_shadow + 1).rem_euclid(SHADOW_SLOTS as i32) as usize
    }

    /// The retained generation in `slot`, if any.
    pub fn retained(&self, slot: usize) -> Option<&Inode> {
        self.shadow.get(slot).filter(|inode| !inode.is_free())
    }
}

/// Bytes of the inode-table part of the directory region: header plus inodes.
pub fn inode_table_len(inode_count: u32) -> usize {
    DIRECTORY_HEADER_SIZE + inode_count as usize * INODE_SIZE
}

pub fn entry_table_len(inode_count: u32) -> usize {
    inode_count as usize * DIR_ENTRY_SIZE
}

pub fn blocks_for(bytes: usize, block_size: usize) -> u32 {
    bytes.div_ceil(block_size) as u32
}
