//! Commit and restore of whole directory generations.
//!
//! A commit copies the directory image into newly allocated blocks and
//! records an inode for the copy in the superblock's shadow ring. Data
//! blocks reachable from a retained generation are pinned: they are never
//! freed by `remove` and never modified in place by `write`.

use log::{debug, info};
use shadowfs_disk::BlockDevice;
use shadowfs_layout::{Inode, SHADOW_SLOTS};

use crate::directory::Directory;
use crate::fs::{rejected, FileSystem};
use crate::{FsError, VersionId};

impl<D: BlockDevice> FileSystem<D> {
    /// Records the current directory as a new version, evicting the oldest
    /// one once the ring is full.
    pub fn commit(&mut self) -> Result<VersionId, FsError> {
        self.commit_generation().inspect_err(|e| rejected("commit", e))
    }

    fn commit_generation(&mut self) -> Result<VersionId, FsError> {
        let slot = self.superblock.next_shadow_slot();
        let reclaim = self.reclaimable(slot);
        let needed = self.geometry.directory_blocks() as usize;
        let free = self.free_map.free_count() + reclaim.len();
        if needed > free {
            return Err(FsError::NoSpace { needed, free });
        }

        if self.generations[slot].take().is_some() {
            for &block in &reclaim {
                self.free_map.set_free(block);
            }
            info!(
                "evicted version {} and reclaimed {} blocks",
                slot,
                reclaim.len()
            );
        }

        let mut copy = Vec::with_capacity(needed);
        for _ in 0..needed {
            let block = self.free_map.allocate().ok_or(FsError::NoSpace {
                needed,
                free: copy.len(),
            })?;
            copy.push(block);
        }

        let image = self.directory.encode(&self.geometry)?;
        let shadow = Inode::describing(&copy, image.len());
        self.write_image(&shadow, &image)?;

        self.superblock.shadow[slot] = shadow;
        self.superblock.last_shadow = slot as i32;
        self.generations[slot] = Some(self.directory.clone());
        self.write_superblock()?;
        self.write_free_map()?;

        info!(
            "committed version {} ({} files) to blocks {:?}",
            slot,
            self.directory.files().count(),
            copy
        );
        Ok(slot)
    }

    /// Replaces the live directory with a retained version. All descriptors
    /// must be closed. The version stays retained.
    pub fn restore(&mut self, version: VersionId) -> Result<(), FsError> {
        self.restore_generation(version).inspect_err(|e| rejected("restore", e))
    }

    fn restore_generation(&mut self, version: VersionId) -> Result<(), FsError> {
        let shadow = *self
            .superblock
            .retained(version)
            .filter(|_| self.generations.get(version).is_some_and(Option::is_some))
            .ok_or(FsError::UnknownVersion(version))?;
        if !self.descriptors.is_empty() {
            return Err(FsError::DescriptorsOpen(self.descriptors.len()));
        }

        let image = self.read_image(&shadow)?;
        let image = &image[..self.geometry.directory_len()];
        let restored = Directory::decode(image, &self.geometry)?;
        let root = self.superblock.root;
        self.write_image(&root, image)?;

        let discarded: Vec<u32> = self
            .directory
            .data_blocks()
            .filter(|&block| !restored.references(block) && !self.is_pinned(block))
            .collect();
        for &block in &discarded {
            self.free_map.set_free(block);
        }
        self.directory = restored;
        self.write_free_map()?;

        info!(
            "restored version {} ({} files), freed {} blocks",
            version,
            self.directory.files().count(),
            discarded.len()
        );
        Ok(())
    }

    /// Retained version ids, in ring order.
    pub fn versions(&self) -> Vec<VersionId> {
        (0..SHADOW_SLOTS)
            .filter(|&slot| self.generations[slot].is_some())
            .collect()
    }

    /// Whether a retained version references `block` as file data.
    pub fn is_pinned(&self, block: u32) -> bool {
        self.generations
            .iter()
            .flatten()
            .any(|generation| generation.data_blocks().any(|b| b == block))
    }

    /// Blocks that evicting `slot` would free: the copy of its image, and
    /// data blocks nothing else references.
    fn reclaimable(&self, slot: usize) -> Vec<u32> {
        let Some(generation) = &self.generations[slot] else {
            return Vec::new();
        };

        let mut blocks: Vec<u32> = self.superblock.shadow[slot].blocks().collect();
        let others: Vec<&Directory> = self
            .generations
            .iter()
            .enumerate()
            .filter(|&(other, _)| other != slot)
            .filter_map(|(_, generation)| generation.as_ref())
            .collect();
        for block in generation.data_blocks() {
            let shared = self.directory.references(block)
                || others
                    .iter()
                    .any(|other| other.data_blocks().any(|b| b == block));
            if !shared && !blocks.contains(&block) {
                blocks.push(block);
            }
        }
        debug!("version {} holds {} reclaimable blocks", slot, blocks.len());
        blocks
    }
}

#[cfg(test)]
mod tests {
    use shadowfs_disk::MemDisk;

    use crate::{FileSystem, FsConfig, FsError};

    fn fresh() -> FileSystem<MemDisk> {
        let config = FsConfig::default();
        FileSystem::format(MemDisk::new(config.block_size, config.total_blocks), &config).unwrap()
    }

    fn put(fs: &mut FileSystem<MemDisk>, name: &str, data: &[u8]) {
        let fd = fs.open(name).unwrap();
        fs.write(fd, data).unwrap();
        fs.close(fd).unwrap();
    }

    #[test]
    fn commit_returns_ring_slots() {
        let mut fs = fresh();
        assert_eq!(fs.commit().unwrap(), 0);
        assert_eq!(fs.commit().unwrap(), 1);
        assert_eq!(fs.superblock().last_shadow, 1);
        assert_eq!(fs.versions(), vec![0, 1]);
    }

    #[test]
    fn ring_evicts_oldest_and_reclaims_copy_blocks() {
        let mut fs = fresh();
        for _ in 0..4 {
            fs.commit().unwrap();
        }
        let free = fs.free_map().free_count();
        assert_eq!(fs.commit().unwrap(), 0);
        assert_eq!(fs.free_map().free_count(), free);
        assert_eq!(fs.versions(), vec![0, 1, 2, 3]);
    }

    #[test]
    fn eviction_frees_data_only_the_evicted_version_held() {
        let mut fs = fresh();
        put(&mut fs, "old", &[b'o'; 3 * 1024]);
        let blocks: Vec<u32> = fs.directory().data_blocks().collect();
        assert_eq!(blocks.len(), 3);
        assert_eq!(fs.commit().unwrap(), 0);

        fs.remove("old").unwrap();
        assert!(blocks.iter().all(|&b| !fs.free_map().is_free(b)));
        for _ in 0..3 {
            fs.commit().unwrap();
        }
        assert!(blocks.iter().all(|&b| fs.is_pinned(b)));

        // The new image reuses the evicted copy's blocks, so only the data is a net gain.
        let free = fs.free_map().free_count();
        assert_eq!(fs.commit().unwrap(), 0);
        assert_eq!(fs.free_map().free_count(), free + blocks.len());
        assert!(blocks.iter().all(|&b| !fs.is_pinned(b)));

        fs.restore(0).unwrap();
        assert!(fs.list().is_empty());
    }

    #[test]
    fn committed_data_survives_remove() {
        let mut fs = fresh();
        put(&mut fs, "keep", b"committed bytes");
        let blocks: Vec<u32> = fs.directory().data_blocks().collect();
        let version = fs.commit().unwrap();
        assert!(fs.is_pinned(blocks[0]));

        fs.remove("keep").unwrap();
        assert!(!fs.free_map().is_free(blocks[0]));
        assert!(fs.list().is_empty());

        fs.restore(version).unwrap();
        let fd = fs.open("keep").unwrap();
        let mut buf = [0u8; 15];
        assert_eq!(fs.read(fd, &mut buf).unwrap(), 15);
        assert_eq!(&buf, b"committed bytes");
    }

    #[test]
    fn writes_to_pinned_blocks_copy_first() {
        let mut fs = fresh();
        put(&mut fs, "f", &[b'a'; 100]);
        let before = fs.directory().data_blocks().next().unwrap();
        let version = fs.commit().unwrap();

        let fd = fs.open("f").unwrap();
        fs.seek_write(fd, 50).unwrap();
        fs.write(fd, &[b'b'; 10]).unwrap();
        let moved = fs.directory().data_blocks().next().unwrap();
        assert_ne!(moved, before);

        fs.seek_read(fd, 0).unwrap();
        let mut buf = [0u8; 100];
        fs.read(fd, &mut buf).unwrap();
        assert!(buf[..50].iter().all(|&b| b == b'a'));
        assert!(buf[50..60].iter().all(|&b| b == b'b'));
        fs.close(fd).unwrap();

        fs.restore(version).unwrap();
        assert!(fs.free_map().is_free(moved));
        let fd = fs.open("f").unwrap();
        fs.read(fd, &mut buf).unwrap();
        assert!(buf.iter().all(|&b| b == b'a'));
    }

    #[test]
    fn restore_rules() {
        let mut fs = fresh();
        assert!(matches!(fs.restore(0), Err(FsError::UnknownVersion(0))));
        assert!(matches!(fs.restore(9), Err(FsError::UnknownVersion(9))));

        let version = fs.commit().unwrap();
        let fd = fs.open("busy").unwrap();
        assert!(matches!(
            fs.restore(version),
            Err(FsError::DescriptorsOpen(1))
        ));
        fs.close(fd).unwrap();
        fs.restore(version).unwrap();
        fs.restore(version).unwrap();
        assert!(fs.list().is_empty());
    }
}
