use crate::config::StorageBackend;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::fmt::Formatter;
use thiserror::Error;

/// Linearly addressable backing storage for one or more pages.
///
/// Callers are responsible for bounds checking; `get`/`set`/`read_word` may panic if given an
/// offset outside of `0..len()` (`0..len()-1` for words).
pub trait MemoryBlock: Serialize + DeserializeOwned {
    /// The storage strategy this implementation provides, used to match it against config.
    const BACKEND: StorageBackend;

    fn from_bytes(bytes: &[u8]) -> Self;

    fn zeroed(len: usize) -> Self {
        Self::from_bytes(&vec![0; len])
    }

    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn get(&self, offset: usize) -> u8;

    fn set(&mut self, offset: usize, value: u8);

    /// Little-endian read of the bytes at `offset` and `offset + 1`.
    fn read_word(&self, offset: usize) -> u16;

    fn fill(&mut self, value: u8) {
        for offset in 0..self.len() {
            self.set(offset, value);
        }
    }

    fn to_bytes(&self) -> Vec<u8> {
        (0..self.len()).map(|offset| self.get(offset)).collect()
    }
}

/// Byte-buffer storage with an explicit little-endian word accessor.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TypedBlock {
    bytes: Box<[u8]>,
}

impl MemoryBlock for TypedBlock {
    const BACKEND: StorageBackend = StorageBackend::TypedBuffer;

    fn from_bytes(bytes: &[u8]) -> Self {
        Self { bytes: bytes.into() }
    }

    fn zeroed(len: usize) -> Self {
        Self { bytes: vec![0; len].into_boxed_slice() }
    }

    #[inline]
    fn len(&self) -> usize {
        self.bytes.len()
    }

    #[inline]
    fn get(&self, offset: usize) -> u8 {
        self.bytes[offset]
    }

    #[inline]
    fn set(&mut self, offset: usize, value: u8) {
        self.bytes[offset] = value;
    }

    #[inline]
    fn read_word(&self, offset: usize) -> u16 {
        u16::from_le_bytes([self.bytes[offset], self.bytes[offset + 1]])
    }

    fn fill(&mut self, value: u8) {
        self.bytes.fill(value);
    }

    fn to_bytes(&self) -> Vec<u8> {
        self.bytes.to_vec()
    }
}

/// Plain numeric-array storage. Each cell holds one byte in its low 8 bits and words are composed
/// with shifts and masks.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArrayBlock {
    cells: Vec<u32>,
}

impl MemoryBlock for ArrayBlock {
    const BACKEND: StorageBackend = StorageBackend::NumericArray;

    fn from_bytes(bytes: &[u8]) -> Self {
        Self { cells: bytes.iter().copied().map(u32::from).collect() }
    }

    #[inline]
    fn len(&self) -> usize {
        self.cells.len()
    }

    #[inline]
    fn get(&self, offset: usize) -> u8 {
        (self.cells[offset] & 0xFF) as u8
    }

    #[inline]
    fn set(&mut self, offset: usize, value: u8) {
        self.cells[offset] = u32::from(value);
    }

    #[inline]
    fn read_word(&self, offset: usize) -> u16 {
        ((self.cells[offset] & 0xFF) | ((self.cells[offset + 1] & 0xFF) << 8)) as u16
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct BlockId(u32);

impl BlockId {
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

impl std::fmt::Display for BlockId {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "#{}", self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum CopyRangeError {
    #[error("copy of {length} bytes at position {position} overruns block {block} (length {block_len})")]
    OutOfRange { block: BlockId, position: usize, length: usize, block_len: usize },
    #[error("block {block} does not belong to this arena")]
    MissingBlock { block: BlockId },
}

/// Owner of every backing block in a session. Blocks are only ever appended, so a `BlockId`
/// handed out by an arena stays valid for that arena's lifetime.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BlockArena<B> {
    blocks: Vec<B>,
}

impl<B: MemoryBlock> BlockArena<B> {
    pub fn new() -> Self {
        Self { blocks: Vec::new() }
    }

    pub fn allocate(&mut self, block: B) -> BlockId {
        let id = BlockId(self.blocks.len() as u32);
        self.blocks.push(block);
        id
    }

    pub fn allocate_zeroed(&mut self, len: usize) -> BlockId {
        self.allocate(B::zeroed(len))
    }

    pub fn len(&self) -> usize {
        self.blocks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.blocks.is_empty()
    }

    pub fn contains(&self, id: BlockId) -> bool {
        id.index() < self.blocks.len()
    }

    #[inline]
    pub fn try_get(&self, id: BlockId) -> Option<&B> {
        self.blocks.get(id.index())
    }

    #[inline]
    pub fn get(&self, id: BlockId) -> &B {
        &self.blocks[id.index()]
    }

    #[inline]
    pub fn get_mut(&mut self, id: BlockId) -> &mut B {
        &mut self.blocks[id.index()]
    }

    /// Copy `length` bytes from `src[src_pos..]` to `dest[dest_pos..]`.
    ///
    /// When both ranges are in the same block the copy direction is chosen so that overlapping
    /// ranges behave like `memmove`: descending when `dest_pos >= src_pos`, ascending otherwise.
    /// Copies between distinct blocks always run descending.
    pub fn copy_range(
        &mut self,
        src: BlockId,
        src_pos: usize,
        dest: BlockId,
        dest_pos: usize,
        length: usize,
    ) -> Result<(), CopyRangeError> {
        self.check_range(src, src_pos, length)?;
        self.check_range(dest, dest_pos, length)?;

        if src == dest {
            let block = self.get_mut(dest);
            if dest_pos >= src_pos {
                for i in (0..length).rev() {
                    let value = block.get(src_pos + i);
                    block.set(dest_pos + i, value);
                }
            } else {
                for i in 0..length {
                    let value = block.get(src_pos + i);
                    block.set(dest_pos + i, value);
                }
            }
        } else {
            let (src_block, dest_block) = self.pair_mut(src, dest);
            for i in (0..length).rev() {
                dest_block.set(dest_pos + i, src_block.get(src_pos + i));
            }
        }

        Ok(())
    }

    fn check_range(
        &self,
        id: BlockId,
        position: usize,
        length: usize,
    ) -> Result<(), CopyRangeError> {
        let block_len = self
            .try_get(id)
            .map(MemoryBlock::len)
            .ok_or(CopyRangeError::MissingBlock { block: id })?;
        match position.checked_add(length) {
            Some(end) if end <= block_len => Ok(()),
            _ => Err(CopyRangeError::OutOfRange { block: id, position, length, block_len }),
        }
    }

    fn pair_mut(&mut self, src: BlockId, dest: BlockId) -> (&B, &mut B) {
        let (src, dest) = (src.index(), dest.index());
        if src < dest {
            let (low, high) = self.blocks.split_at_mut(dest);
            (&low[src], &mut high[0])
        } else {
            let (low, high) = self.blocks.split_at_mut(src);
            (&high[0], &mut low[dest])
        }
    }
}

impl<B: MemoryBlock> Default for BlockArena<B> {
    fn default() -> Self {
        Self::new()
    }
}
