use std::ops::Range;

use crate::argument::GroupMetadata;

/// Anything that owns a contiguous range of grid blocks.
pub trait BlockRange {
    fn block_start(&self) -> usize;
    fn block_end(&self) -> usize;
}

impl BlockRange for GroupMetadata {
    fn block_start(&self) -> usize {
        self.block_start
    }

    fn block_end(&self) -> usize {
        self.block_end
    }
}

impl BlockRange for Range<usize> {
    fn block_start(&self) -> usize {
        self.start
    }

    fn block_end(&self) -> usize {
        self.end
    }
}

/// Where a block lands inside its group.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BlockAssignment {
    pub group: usize,
    pub local_block: usize,
    pub batch_index: usize,
    pub tile_index: usize,
}

/// Index of the group whose range contains `block`.
///
/// `ranges` must be sorted, disjoint and contiguous. Empty ranges are
/// skipped over and never returned.
pub fn find_group<R: BlockRange>(ranges: &[R], block: usize) -> Option<usize> {
    let mut low = 0;
    let mut high = ranges.len();
    while low < high {
        let mid = low + (high - low) / 2;
        let range = &ranges[mid];
        if block < range.block_start() {
            high = mid;
        } else if block >= range.block_end() {
            low = mid + 1;
        } else {
            return Some(mid);
        }
    }
    None
}

/// Resolve a grid block to its group, batch and tile.
pub fn resolve_block(groups: &[GroupMetadata], block: usize) -> Option<BlockAssignment> {
    let group = find_group(groups, block)?;
    let meta = &groups[group];
    if meta.blocks_per_batch == 0 {
        return None;
    }
    let local_block = block - meta.block_start;
    Some(BlockAssignment {
        group,
        local_block,
        batch_index: local_block / meta.blocks_per_batch,
        tile_index: local_block % meta.blocks_per_batch,
    })
}
