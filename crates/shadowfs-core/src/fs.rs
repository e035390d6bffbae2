use std::path::Path;

use log::{debug, error, info, warn};
use shadowfs_disk::{BlockDevice, FileDisk};
use shadowfs_layout::{
    decode, encode_into, validate_name, Inode, SuperBlock, ENTRY_TABLE_NAME, INODE_TABLE_NAME,
    SHADOW_SLOTS,
};

use crate::bitmap::Bitmap;
use crate::config::{FsConfig, Geometry};
use crate::descriptor::{DescriptorTable, Fd, RESERVED_DESCRIPTORS};
use crate::directory::{Directory, RESERVED_SLOTS};
use crate::error::ErrorKind;
use crate::{FsError, VersionId};

/// A user file as reported by [`FileSystem::list`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileInfo {
    pub name: String,
    pub size: usize,
    pub blocks: usize,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FsStat {
    pub block_size: usize,
    pub total_blocks: u32,
    pub free_blocks: usize,
    pub files: usize,
    pub max_files: usize,
    pub open_files: usize,
    pub versions: Vec<VersionId>,
}

/// A mounted file system. Every mutation is written back to the device
/// before the call returns.
pub struct FileSystem<D: BlockDevice> {
    pub(crate) device: D,
    pub(crate) geometry: Geometry,
    pub(crate) superblock: SuperBlock,
    pub(crate) free_map: Bitmap,
    pub(crate) write_mask: Bitmap,
    pub(crate) directory: Directory,
    pub(crate) descriptors: DescriptorTable,
    /// Decoded directory of each retained shadow slot.
    pub(crate) generations: Vec<Option<Directory>>,
}

pub(crate) fn rejected(op: &str, err: &FsError) {
    if err.kind() == ErrorKind::Corrupt {
        error!("{}: {}", op, err);
    } else {
        warn!("{}: {}", op, err);
    }
}

impl<D: BlockDevice> FileSystem<D> {
    /// Lays out an empty file system on `device`.
    pub fn format(device: D, config: &FsConfig) -> Result<Self, FsError> {
        let geometry = config.validate()?;
        if device.block_size() != geometry.block_size
            || device.total_blocks() != geometry.total_blocks
        {
            return Err(FsError::InvalidConfig(format!(
                "device has {} blocks of {} bytes, configuration asks for {} of {}",
                device.total_blocks(),
                device.block_size(),
                geometry.total_blocks,
                geometry.block_size
            )));
        }

        let mut free_map = Bitmap::all_free(geometry.total_blocks);
        free_map.set_used(0);
        for block in geometry.directory_range() {
            free_map.set_used(block);
        }
        free_map.set_used(geometry.free_map_block());
        free_map.set_used(geometry.write_mask_block());

        let directory_blocks: Vec<u32> = geometry.directory_range().collect();
        let root = Inode::describing(&directory_blocks, geometry.directory_len());
        let superblock = SuperBlock::new(
            geometry.block_size as u32,
            geometry.total_blocks,
            geometry.directory_blocks(),
            geometry.inode_count,
            root,
        );

        let mut fs = Self {
            device,
            geometry,
            superblock,
            free_map,
            write_mask: Bitmap::all_free(geometry.total_blocks),
            directory: Directory::new(&geometry)?,
            descriptors: DescriptorTable::new(config.max_open_files),
            generations: vec![None; SHADOW_SLOTS],
        };
        fs.write_superblock()?;
        fs.write_directory()?;
        fs.write_free_map()?;
        fs.write_write_mask()?;

        info!(
            "formatted {} blocks of {} bytes, {} file slots, directory in blocks {:?}",
            geometry.total_blocks,
            geometry.block_size,
            geometry.inode_count,
            geometry.directory_range()
        );
        Ok(fs)
    }

    /// Loads an existing file system. Only `max_open_files` is taken from
    /// `config`; the layout comes from the superblock.
    pub fn mount(mut device: D, config: &FsConfig) -> Result<Self, FsError> {
        if config.max_open_files <= RESERVED_DESCRIPTORS {
            return Err(FsError::InvalidConfig(format!(
                "at least {} descriptor slots are required",
                RESERVED_DESCRIPTORS + 1
            )));
        }

        let mut block = vec![0u8; device.block_size()];
        device.read_block(0, &mut block)?;
        let superblock: SuperBlock = decode(&block)?;
        let geometry = Self::check_superblock(&device, &superblock)
            .inspect_err(|e| rejected("mount", e))?;

        let mut fs = Self {
            device,
            geometry,
            superblock,
            free_map: Bitmap::all_free(geometry.total_blocks),
            write_mask: Bitmap::all_free(geometry.total_blocks),
            directory: Directory::new(&geometry)?,
            descriptors: DescriptorTable::new(config.max_open_files),
            generations: vec![None; SHADOW_SLOTS],
        };

        fs.device.read_block(geometry.free_map_block(), &mut block)?;
        fs.free_map = Bitmap::from_block(&block, geometry.total_blocks);
        fs.device.read_block(geometry.write_mask_block(), &mut block)?;
        fs.write_mask = Bitmap::from_block(&block, geometry.total_blocks);

        let image = fs.read_image(&superblock.root)?;
        fs.directory =
            Directory::decode(&image, &geometry).inspect_err(|e| rejected("mount", e))?;

        for slot in 0..SHADOW_SLOTS {
            if let Some(inode) = superblock.retained(slot) {
                let image = fs.read_image(inode)?;
                fs.generations[slot] = Some(
                    Directory::decode(&image, &geometry).inspect_err(|e| rejected("mount", e))?,
                );
            }
        }

        info!(
            "mounted {} blocks of {} bytes: {} files, {} free blocks, {} versions",
            geometry.total_blocks,
            geometry.block_size,
            fs.directory.files().count(),
            fs.free_map.free_count(),
            fs.versions().len()
        );
        Ok(fs)
    }

    fn check_superblock(device: &D, superblock: &SuperBlock) -> Result<Geometry, FsError> {
        superblock
            .validate()
            .map_err(|e| FsError::Corrupt(e.to_string()))?;

        if superblock.block_size as usize != device.block_size()
            || superblock.total_blocks != device.total_blocks()
        {
            return Err(FsError::Corrupt(format!(
                "superblock describes {} blocks of {} bytes, device has {} of {}",
                superblock.total_blocks,
                superblock.block_size,
                device.total_blocks(),
                device.block_size()
            )));
        }

        let geometry = Geometry::new(
            device.block_size(),
            superblock.total_blocks,
            superblock.inode_count,
        );
        geometry
            .check()
            .map_err(|e| FsError::Corrupt(e.to_string()))?;
        if geometry.directory_blocks() != superblock.directory_region_size
            || superblock.root.blocks().ne(geometry.directory_range())
        {
            return Err(FsError::Corrupt(format!(
                "directory region of {} blocks does not match {} slots",
                superblock.directory_region_size, superblock.inode_count
            )));
        }
        Ok(geometry)
    }

    /// Opens `name`, creating an empty file when it does not exist.
    pub fn open(&mut self, name: &str) -> Result<Fd, FsError> {
        self.open_file(name).inspect_err(|e| rejected("open", e))
    }

    fn open_file(&mut self, name: &str) -> Result<Fd, FsError> {
        validate_name(name).map_err(FsError::InvalidName)?;
        if is_reserved_name(name) {
            return Err(FsError::ReservedName(name.to_owned()));
        }

        let slot = match self.directory.lookup(name) {
            Some(slot) => {
                self.check_descriptor_room()?;
                slot
            }
            None => {
                if self.directory.is_full() {
                    return Err(FsError::DirectoryFull {
                        capacity: self.directory.capacity(),
                    });
                }
                self.check_descriptor_room()?;
                let slot = self.directory.create(name)?;
                self.write_directory()?;
                slot
            }
        };

        let inode = *self.directory.inode(slot);
        self.descriptors.open(slot, inode)
    }

    fn check_descriptor_room(&self) -> Result<(), FsError> {
        if self.descriptors.is_full() {
            return Err(FsError::TooManyOpenFiles {
                capacity: self.descriptors.capacity(),
            });
        }
        Ok(())
    }

    pub fn close(&mut self, fd: Fd) -> Result<(), FsError> {
        self.descriptors
            .close(fd)
            .map(|_| ())
            .inspect_err(|e| rejected("close", e))
    }

    pub fn seek_read(&mut self, fd: Fd, loc: usize) -> Result<(), FsError> {
        self.seek(fd, loc, false).inspect_err(|e| rejected("seek_read", e))
    }

    pub fn seek_write(&mut self, fd: Fd, loc: usize) -> Result<(), FsError> {
        self.seek(fd, loc, true).inspect_err(|e| rejected("seek_write", e))
    }

    // The end of a non-empty file is not a valid target.
    fn seek(&mut self, fd: Fd, loc: usize, write: bool) -> Result<(), FsError> {
        let max = self.geometry.max_file_size();
        let file = self.descriptors.get_mut(fd)?;
        let size = file.inode.len();
        if !(loc == 0 || loc < size) || loc >= max {
            return Err(FsError::InvalidSeek { loc, size });
        }

        if write {
            file.write_ptr = loc;
        } else {
            file.read_ptr = loc;
        }
        Ok(())
    }

    /// Deletes a closed file and frees the blocks no retained version needs.
    pub fn remove(&mut self, name: &str) -> Result<(), FsError> {
        self.remove_file(name).inspect_err(|e| rejected("remove", e))
    }

    fn remove_file(&mut self, name: &str) -> Result<(), FsError> {
        if is_reserved_name(name) {
            return Err(FsError::ReservedName(name.to_owned()));
        }
        let slot = self
            .directory
            .lookup(name)
            .filter(|_| !self.directory.is_empty())
            .ok_or_else(|| FsError::NotFound(name.to_owned()))?;
        if self.descriptors.is_open(slot) {
            return Err(FsError::FileBusy(name.to_owned()));
        }

        let inode = self.directory.release(slot);
        let mut freed = 0;
        for block in inode.blocks() {
            if !self.is_pinned(block) {
                self.free_map.set_free(block);
                freed += 1;
            }
        }
        self.write_directory()?;
        self.write_free_map()?;
        debug!(
            "removed {:?} from slot {}, freed {} of {} blocks",
            name,
            slot,
            freed,
            inode.blocks().count()
        );
        Ok(())
    }

    /// Current size of the file behind `fd`.
    pub fn size(&self, fd: Fd) -> Result<usize, FsError> {
        Ok(self.descriptors.get(fd)?.inode.len())
    }

    pub fn list(&self) -> Vec<FileInfo> {
        self.directory
            .files()
            .map(|(_, name, inode)| FileInfo {
                name: name.to_owned(),
                size: inode.len(),
                blocks: inode.blocks().count(),
            })
            .collect()
    }

    pub fn stat(&self) -> FsStat {
        FsStat {
            block_size: self.geometry.block_size,
            total_blocks: self.geometry.total_blocks,
            free_blocks: self.free_map.free_count(),
            files: self.directory.files().count(),
            max_files: self.directory.capacity() - RESERVED_SLOTS,
            open_files: self.descriptors.len(),
            versions: self.versions(),
        }
    }

    pub fn geometry(&self) -> &Geometry {
        &self.geometry
    }

    pub fn superblock(&self) -> &SuperBlock {
        &self.superblock
    }

    pub fn free_map(&self) -> &Bitmap {
        &self.free_map
    }

    pub fn write_mask(&self) -> &Bitmap {
        &self.write_mask
    }

    pub fn directory(&self) -> &Directory {
        &self.directory
    }

    pub fn descriptors(&self) -> &DescriptorTable {
        &self.descriptors
    }

    pub fn device(&self) -> &D {
        &self.device
    }

    pub fn into_device(self) -> D {
        self.device
    }

    pub(crate) fn write_superblock(&mut self) -> Result<(), FsError> {
        let mut block = vec![0u8; self.geometry.block_size];
        encode_into(&self.superblock, &mut block)?;
        self.device.write_block(0, &block)?;
        Ok(())
    }

    pub(crate) fn write_directory(&mut self) -> Result<(), FsError> {
        let image = self.directory.encode(&self.geometry)?;
        let root = self.superblock.root;
        self.write_image(&root, &image)
    }

    pub(crate) fn write_free_map(&mut self) -> Result<(), FsError> {
        let block = self.free_map.to_block(self.geometry.block_size);
        self.device
            .write_block(self.geometry.free_map_block(), &block)?;
        Ok(())
    }

    fn write_write_mask(&mut self) -> Result<(), FsError> {
        let block = self.write_mask.to_block(self.geometry.block_size);
        self.device
            .write_block(self.geometry.write_mask_block(), &block)?;
        Ok(())
    }

    /// Reads the blocks `inode` points at, in pointer order.
    pub(crate) fn read_image(&mut self, inode: &Inode) -> Result<Vec<u8>, FsError> {
        let bs = self.geometry.block_size;
        let blocks: Vec<u32> = inode.blocks().collect();
        let mut image = vec![0u8; blocks.len() * bs];
        for (chunk, &block) in image.chunks_mut(bs).zip(&blocks) {
            self.device.read_block(block, chunk)?;
        }
        debug!("read image of {} blocks {:?}", blocks.len(), blocks);
        Ok(image)
    }

    /// Writes `image` across the blocks `inode` points at.
    pub(crate) fn write_image(&mut self, inode: &Inode, image: &[u8]) -> Result<(), FsError> {
        let bs = self.geometry.block_size;
        let blocks: Vec<u32> = inode.blocks().collect();
        if image.len() > blocks.len() * bs {
            return Err(FsError::Corrupt(format!(
                "image of {} bytes does not fit {} blocks",
                image.len(),
                blocks.len()
            )));
        }
        for (chunk, &block) in image.chunks(bs).zip(&blocks) {
            if chunk.len() == bs {
                self.device.write_block(block, chunk)?;
            } else {
                let mut padded = vec![0u8; bs];
                padded[..chunk.len()].copy_from_slice(chunk);
                self.device.write_block(block, &padded)?;
            }
        }
        debug!("wrote image of {} blocks {:?}", blocks.len(), blocks);
        Ok(())
    }
}

impl FileSystem<FileDisk> {
    /// Formats a new image at `path` when `fresh`, otherwise mounts the
    /// existing one.
    pub fn open_image<P: AsRef<Path>>(
        path: P,
        config: &FsConfig,
        fresh: bool,
    ) -> Result<Self, FsError> {
        if fresh {
            config.validate()?;
            let disk = FileDisk::format(path, config.block_size, config.total_blocks)?;
            Self::format(disk, config)
        } else {
            let disk = FileDisk::open(path, config.block_size, config.total_blocks)?;
            Self::mount(disk, config)
        }
    }
}

fn is_reserved_name(name: &str) -> bool {
    name == INODE_TABLE_NAME || name == ENTRY_TABLE_NAME
}
