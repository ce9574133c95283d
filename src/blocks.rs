//! Fixed-size block indexing over a household series

use std::ops::Range;

use crate::error::{PartencError, Result};

/// Partition of a series of `len` records into blocks of `block_size`.
///
/// The last block may be partial; it is indexed like every other block and
/// counts as one block for budgeting.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct BlockLayout {
    len: usize,
    block_size: usize,
}

impl BlockLayout {
    pub fn new(len: usize, block_size: usize) -> Result<Self> {
        if block_size == 0 {
            return Err(PartencError::InvalidParameter(
                "block size must be positive".to_string(),
            ));
        }
        if len == 0 {
            return Err(PartencError::EmptyDataset(
                "households have no records".to_string(),
            ));
        }
        Ok(BlockLayout { len, block_size })
    }

    /// Number of records `R`
    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Block size `S`
    pub fn block_size(&self) -> usize {
        self.block_size
    }

    /// Number of blocks `B = ⌈R / S⌉`
    pub fn block_count(&self) -> usize {
        self.len.div_ceil(self.block_size)
    }

    /// Record indices covered by block `b`
    pub fn range(&self, block: usize) -> Range<usize> {
        let start = (block * self.block_size).min(self.len);
        let end = ((block + 1) * self.block_size).min(self.len);
        start..end
    }

    /// Block covering record `index`
    pub fn block_of(&self, index: usize) -> usize {
        index / self.block_size
    }

    /// Real number of records in block `b` (shorter than `S` for a partial tail)
    pub fn block_len(&self, block: usize) -> usize {
        self.range(block).len()
    }
}
