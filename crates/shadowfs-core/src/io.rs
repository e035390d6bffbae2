//! Byte-range reads and writes mapped onto whole-block device transfers.

use log::debug;
use shadowfs_disk::BlockDevice;
use shadowfs_layout::INODE_DIRECT_POINTERS;

use crate::descriptor::Fd;
use crate::fs::{rejected, FileSystem};
use crate::FsError;

impl<D: BlockDevice> FileSystem<D> {
    /// Writes `buf` at the descriptor's write cursor and advances it.
    ///
    /// Blocks are assigned on demand. A block shared with a retained version
    /// is copied to a fresh block before it is modified.
    pub fn write(&mut self, fd: Fd, buf: &[u8]) -> Result<usize, FsError> {
        self.write_at_cursor(fd, buf).inspect_err(|e| rejected("write", e))
    }

    fn write_at_cursor(&mut self, fd: Fd, buf: &[u8]) -> Result<usize, FsError> {
        let bs = self.geometry.block_size;
        let file = *self.descriptors.get(fd)?;
        if buf.is_empty() {
            return Err(FsError::InvalidLength);
        }

        let mut inode = *self.directory.inode(file.slot);
        let start = file.write_ptr;
        let end = start + buf.len();
        let first = start / bs;
        let last = end.div_ceil(bs);
        if last > INODE_DIRECT_POINTERS {
            return Err(FsError::FileTooLarge {
                blocks: last,
                max: INODE_DIRECT_POINTERS,
            });
        }

        let needed = (first..last)
            .filter(|&index| inode.block(index).map_or(true, |b| self.is_pinned(b)))
            .count();
        let free = self.free_map.free_count();
        if needed > free {
            return Err(FsError::NoSpace { needed, free });
        }

        let mut block = vec![0u8; bs];
        for index in first..last {
            let block_start = index * bs;
            let lo = start.max(block_start) - block_start;
            let hi = end.min(block_start + bs) - block_start;

            block.fill(0);
            let current = inode.block(index);
            let keeps_old_bytes = lo > 0 || block_start + hi < inode.len();
            if let Some(old) = current.filter(|_| keeps_old_bytes) {
                self.device.read_block(old, &mut block)?;
            }

            let target = match current {
                Some(old) if !self.is_pinned(old) => old,
                _ => {
                    let fresh = self
                        .free_map
                        .allocate()
                        .ok_or(FsError::NoSpace { needed: 1, free: 0 })?;
                    if let Some(old) = current {
                        debug!("copy-on-write of block {} to {}", old, fresh);
                    }
                    inode.set_block(index, fresh);
                    fresh
                }
            };

            let src = block_start + lo - start..block_start + hi - start;
            block[lo..hi].copy_from_slice(&buf[src]);
            self.device.write_block(target, &block)?;
        }

        inode.size = inode.len().max(end) as i32;
        self.directory.set_inode(file.slot, inode);
        self.descriptors.refresh(file.slot, inode);
        self.descriptors.get_mut(fd)?.write_ptr = end;
        self.write_directory()?;
        self.write_free_map()?;

        debug!(
            "fd {}: wrote {} bytes at {} (blocks {}..{}), size now {}",
            fd,
            buf.len(),
            start,
            first,
            last,
            inode.len()
        );
        Ok(buf.len())
    }

    /// Reads up to `buf.len()` bytes at the descriptor's read cursor.
    ///
    /// Every block the request spans must be assigned; the cursor does not
    /// move.
    pub fn read(&mut self, fd: Fd, buf: &mut [u8]) -> Result<usize, FsError> {
        self.read_at_cursor(fd, buf).inspect_err(|e| rejected("read", e))
    }

    fn read_at_cursor(&mut self, fd: Fd, buf: &mut [u8]) -> Result<usize, FsError> {
        let bs = self.geometry.block_size;
        let file = *self.descriptors.get(fd)?;
        if buf.is_empty() {
            return Err(FsError::InvalidLength);
        }

        let start = file.read_ptr;
        let first = start / bs;
        let last = (start + buf.len()).div_ceil(bs);
        if last > INODE_DIRECT_POINTERS {
            return Err(FsError::FileTooLarge {
                blocks: last,
                max: INODE_DIRECT_POINTERS,
            });
        }
        if let Some(index) = (first..last).find(|&index| file.inode.block(index).is_none()) {
            return Err(FsError::UnassignedBlock { index });
        }

        let count = buf.len().min(file.inode.len().saturating_sub(start));
        let end = start + count;
        let mut block = vec![0u8; bs];
        let mut index = first;
        while index * bs < end {
            let block_start = index * bs;
            let lo = start.max(block_start) - block_start;
            let hi = end.min(block_start + bs) - block_start;
            if let Some(b) = file.inode.block(index) {
                self.device.read_block(b, &mut block)?;
            }
            buf[block_start + lo - start..block_start + hi - start].copy_from_slice(&block[lo..hi]);
            index += 1;
        }

        debug!("fd {}: read {} bytes at {}", fd, count, start);
        Ok(count)
    }
}
