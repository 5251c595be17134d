//! Public API (§4.6): `BlockAllocator`, the type a caller actually holds.

use crate::bits::width_mask;
use crate::geometry::{Geometry, MAX_TREE_HEIGHT, NUM_TREES};
use crate::leaf::{leaf_has_space_end, leaf_offset};
use crate::tree::{clear_leaf_space_in_tree, leaf_with_space_index, set_leaf_full_in_tree};

/// Largest run `mark`/`clear` accept in a single call.
pub const MAX_MARK_BLOCKS: u32 = 32;

/// A deterministic index over `num_blocks()` fixed-size blocks, backed by a
/// caller-owned `&mut [u32]` buffer for its entire lifetime.
///
/// `BlockAllocator` never allocates past [`BlockAllocator::init`] and never
/// reads or writes the bytes a block stands for — it only tracks which block
/// addresses are in use.
pub struct BlockAllocator<'a> {
    words: &'a mut [u32],
    num_leaves: u32,
    tree_stride: u32,
    row_offsets: [u32; MAX_TREE_HEIGHT],
    num_top_branches: u8,
    tree_height: u8,
}

/// Ceiling log2 of a block count in `1..=32`, i.e. the size class it needs.
fn ceil_log2_small(num_blocks: u32) -> u32 {
    u32::from(num_blocks > 1)
        + u32::from(num_blocks > 2)
        + u32::from(num_blocks > 4)
        + u32::from(num_blocks > 8)
        + u32::from(num_blocks > 16)
}

impl<'a> BlockAllocator<'a> {
    /// Bytes a buffer must hold to back a member sized for `min_blocks`.
    ///
    /// `min_blocks` is clamped first to a floor of 64 (guaranteeing
    /// `tree_height >= 1` and `num_top_branches >= 2`) and then to
    /// `2^32 - 32` — see the open question resolved in DESIGN.md.
    #[must_use]
    pub fn required_buffer_size(min_blocks: u64) -> u32 {
        crate::geometry::required_buffer_size_bytes(min_blocks)
    }

    /// Initializes a member over `buf`, which must hold at least
    /// [`BlockAllocator::required_buffer_size`]`(min_blocks) / 4` words.
    ///
    /// Zeroes every word this member uses and then pins the sentinel bits
    /// (top-node branch positions `num_top_branches..32`) to 1 in each of the
    /// six trees, so a non-power-of-two top branch count never looks like it
    /// has room beyond its real children.
    ///
    /// # Panics
    /// Panics if `buf` is too small to hold the computed geometry.
    #[must_use]
    pub fn init(min_blocks: u64, buf: &'a mut [u32]) -> Self {
        let geometry = Geometry::for_min_blocks(min_blocks);
        let total_words = geometry.total_words() as usize;
        assert!(
            buf.len() >= total_words,
            "buffer holds {} words, member needs {total_words}",
            buf.len()
        );

        let used = buf.get_mut(..total_words).expect("checked above");
        used.fill(0);

        #[expect(
            clippy::cast_possible_truncation,
            reason = "tree_height <= MAX_TREE_HEIGHT and num_top_branches <= 32, both fit u8"
        )]
        let mut allocator = Self {
            words: buf,
            num_leaves: geometry.num_leaves,
            tree_stride: geometry.tree_stride,
            row_offsets: geometry.row_offsets,
            num_top_branches: geometry.num_top_branches as u8,
            tree_height: geometry.tree_height as u8,
        };

        allocator.init_sentinel_bits();
        allocator
    }

    fn init_sentinel_bits(&mut self) {
        let num_top_branches = u32::from(self.num_top_branches);
        if num_top_branches >= 32 {
            return;
        }
        let sentinel = !((1u32 << num_top_branches) - 1);
        for tree_index in 0..NUM_TREES {
            let top = self
                .tree_mut(tree_index)
                .first_mut()
                .expect("every tree has a root node");
            *top = sentinel;
        }
    }

    /// Effective capacity, `num_leaves * 32`. May exceed `min_blocks` passed
    /// to [`BlockAllocator::init`] due to rounding up to the tree's grain.
    #[must_use]
    pub fn num_blocks(&self) -> u64 {
        u64::from(self.num_leaves) << 5
    }

    /// Reserves a naturally-aligned run of `num_blocks` blocks and returns
    /// its starting address, or `None` if no run of that width is free.
    ///
    /// # Panics
    /// Panics if `num_blocks` is 0 or greater than [`MAX_MARK_BLOCKS`].
    pub fn mark(&mut self, num_blocks: u32) -> Option<u32> {
        assert!(
            num_blocks > 0 && num_blocks <= MAX_MARK_BLOCKS,
            "num_blocks must be in 1..={MAX_MARK_BLOCKS}, got {num_blocks}"
        );
        let size_class = ceil_log2_small(num_blocks);

        let top = *self
            .tree(size_class)
            .first()
            .expect("every tree has a root node");
        if top == u32::MAX {
            return None;
        }

        let leaf_i = leaf_with_space_index(
            self.tree(size_class),
            &self.row_offsets,
            u32::from(self.tree_height),
        );
        let leaf = self
            .words
            .get_mut(leaf_i as usize)
            .expect("leaf_i < num_leaves");
        let offset = leaf_offset(*leaf, size_class);
        *leaf |= width_mask(size_class, offset);
        let addr = (leaf_i << 5) + offset;

        let update_start = leaf_has_space_end(*leaf);
        for tree_index in update_start..NUM_TREES {
            set_leaf_full_in_tree(
                self.tree_mut(tree_index),
                leaf_i,
                &self.row_offsets,
                u32::from(self.tree_height),
            );
        }

        Some(addr)
    }

    /// Releases the run of `num_blocks` blocks starting at `addr`.
    ///
    /// `num_blocks` must equal the value passed to the corresponding
    /// [`BlockAllocator::mark`] call; there is no way to detect a mismatched
    /// or double clear.
    ///
    /// # Panics
    /// Panics if `num_blocks` is 0, greater than [`MAX_MARK_BLOCKS`], or if
    /// `addr` is not a valid block address for this member.
    pub fn clear(&mut self, addr: u32, num_blocks: u32) {
        assert!(
            num_blocks > 0 && num_blocks <= MAX_MARK_BLOCKS,
            "num_blocks must be in 1..={MAX_MARK_BLOCKS}, got {num_blocks}"
        );
        assert!(
            u64::from(addr) < self.num_blocks(),
            "addr {addr} out of range for {} blocks",
            self.num_blocks()
        );
        let size_class = ceil_log2_small(num_blocks);
        let leaf_i = addr >> 5;
        let offset = addr & 0x1f;

        let leaf = self
            .words
            .get_mut(leaf_i as usize)
            .expect("leaf_i < num_leaves, checked via addr above");
        *leaf &= !width_mask(size_class, offset);

        let update_end = leaf_has_space_end(*leaf);
        for tree_index in 0..update_end {
            clear_leaf_space_in_tree(
                self.tree_mut(tree_index),
                leaf_i,
                &self.row_offsets,
                u32::from(self.tree_height),
            );
        }
    }

    fn tree(&self, tree_index: u32) -> &[u32] {
        let start = (self.num_leaves + tree_index * self.tree_stride) as usize;
        let end = start + self.tree_stride as usize;
        self.words
            .get(start..end)
            .expect("tree_index < NUM_TREES, region sized by init")
    }

    fn tree_mut(&mut self, tree_index: u32) -> &mut [u32] {
        let start = (self.num_leaves + tree_index * self.tree_stride) as usize;
        let end = start + self.tree_stride as usize;
        self.words
            .get_mut(start..end)
            .expect("tree_index < NUM_TREES, region sized by init")
    }
}

#[cfg(test)]
impl<'a> BlockAllocator<'a> {
    /// Raw leaf bitmap, for cross-checking against a brute-force reference
    /// model in the stress tests. Not part of the public surface.
    pub(crate) fn leaf_words(&self) -> &[u32] {
        self.words.get(..self.num_leaves as usize).expect("leaves occupy the front of the buffer")
    }

    pub(crate) fn top_node(&self, tree_index: u32) -> u32 {
        *self.tree(tree_index).first().expect("every tree has a root node")
    }

    pub(crate) fn tree_height(&self) -> u8 {
        self.tree_height
    }

    pub(crate) fn num_top_branches(&self) -> u8 {
        self.num_top_branches
    }
}
