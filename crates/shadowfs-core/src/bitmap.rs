use bitvec::prelude::*;
use log::debug;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BlockState {
    Free,
    Used,
}

/// One bit per block, `1` = free, `0` = used.
///
/// Bit `i` is stored in byte `i / 8` at position `i % 8`, least significant
/// bit first, so the persisted form does not depend on the host word width.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Bitmap {
    bits: BitVec<u8, Lsb0>,
}

impl Bitmap {
    pub fn all_free(blocks: u32) -> Self {
        Self {
            bits: bitvec![u8, Lsb0; 1; blocks as usize],
        }
    }

    /// Rebuilds a bitmap of `blocks` bits from its persisted block.
    pub fn from_block(block: &[u8], blocks: u32) -> Self {
        let len = blocks as usize;
        let mut bits = BitVec::<u8, Lsb0>::from_slice(&block[..len.div_ceil(8)]);
        bits.truncate(len);
        Self { bits }
    }

    /// Persisted form, padded with zero bytes to `block_size`.
    pub fn to_block(&self, block_size: usize) -> Vec<u8> {
        let mut buf = vec![0u8; block_size];
        for index in self.bits.iter_ones() {
            buf[index / 8] |= 1 << (index % 8);
        }
        buf
    }

    pub fn len(&self) -> u32 {
        self.bits.len() as u32
    }

    pub fn is_empty(&self) -> bool {
        self.bits.is_empty()
    }

    /// Indices past the end report `Used`: there is nothing to allocate there.
    pub fn get(&self, index: u32) -> BlockState {
        match self.bits.get(index as usize).as_deref() {
            Some(true) => BlockState::Free,
            _ => BlockState::Used,
        }
    }

    pub fn is_free(&self, index: u32) -> bool {
        self.get(index) == BlockState::Free
    }

    pub fn set_free(&mut self, index: u32) {
        self.set(index, true);
    }

    pub fn set_used(&mut self, index: u32) {
        self.set(index, false);
    }

    /// First free block, scanning upward from block 0.
    pub fn next_free(&self) -> Option<u32> {
        self.bits.first_one().map(|index| index as u32)
    }

    pub fn free_count(&self) -> usize {
        self.bits.count_ones()
    }

    /// Takes the first free block and marks it used.
    pub fn allocate(&mut self) -> Option<u32> {
        let block = self.next_free()?;
        self.set_used(block);
        debug!("allocated block {}", block);
        Some(block)
    }

    fn set(&mut self, index: u32, free: bool) {
        if let Some(mut bit) = self.bits.get_mut(index as usize) {
            *bit = free;
        }
    }
}
