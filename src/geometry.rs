//! Tree shape derivation (§4.1): how many leaf words a member needs, how
//! tall each of the six summary trees is, and where each tree's rows land in
//! the shared buffer.

pub(crate) const NUM_BRANCHES_LOG2: u32 = 5;
pub(crate) const NUM_BRANCHES: u32 = 1 << NUM_BRANCHES_LOG2;
pub(crate) const NUM_TREES: u32 = NUM_BRANCHES_LOG2 + 1;
/// A tree's interior rows never exceed this count in practice; used to size
/// the fixed `row_offsets` array without a heap allocation.
pub(crate) const MAX_TREE_HEIGHT: usize = 7;

/// Largest `min_blocks` value this crate accepts before clamping, chosen so
/// the leaf count and `num_blocks()` (`= num_leaves * 32`) both fit in `u32`
/// without silently wrapping. See the open question in spec.md §9: the
/// source asserts `min_blocks <= 2^32` while representing block counts in
/// 32 bits; this crate resolves the ambiguity by clamping instead of
/// asserting, and documents it here rather than leaving it silent.
#[expect(clippy::cast_lossless, reason = "const context, widening u32 -> u64")]
pub(crate) const MAX_MIN_BLOCKS: u64 = (1u64 << 32) - NUM_BRANCHES as u64;

/// Lower floor for `min_blocks`, ensuring `tree_height >= 1` and
/// `num_top_branches >= 2`.
const MIN_BLOCKS_FLOOR: u32 = NUM_BRANCHES * 2;

#[derive(Debug, Clone, Copy)]
pub(crate) struct Geometry {
    pub(crate) tree_height: u32,
    pub(crate) num_top_branches: u32,
    pub(crate) num_leaves: u32,
    pub(crate) tree_stride: u32,
    pub(crate) row_offsets: [u32; MAX_TREE_HEIGHT],
}

impl Geometry {
    pub(crate) fn for_min_blocks(min_blocks: u64) -> Self {
        let min_blocks = clamp_min_blocks(min_blocks);

        let tree_height = tree_height(min_blocks);
        let num_top_branches = num_top_node_branches(min_blocks, tree_height);
        let num_leaves = num_leaves(num_top_branches, tree_height);
        let tree_stride = tree_stride(num_top_branches, tree_height);
        let row_offsets = row_offsets(num_top_branches, tree_height);

        Self {
            tree_height,
            num_top_branches,
            num_leaves,
            tree_stride,
            row_offsets,
        }
    }

    /// Total words (leaves + six trees) the buffer must hold.
    pub(crate) fn total_words(&self) -> u32 {
        self.num_leaves + 6 * self.tree_stride
    }
}

/// Clamps `min_blocks` into the range this crate can represent, per
/// [`MAX_MIN_BLOCKS`] and [`MIN_BLOCKS_FLOOR`].
pub(crate) fn clamp_min_blocks(min_blocks: u64) -> u32 {
    let min_blocks = min_blocks.min(MAX_MIN_BLOCKS);
    #[expect(
        clippy::cast_possible_truncation,
        reason = "clamped to MAX_MIN_BLOCKS above, which fits in u32"
    )]
    let min_blocks = min_blocks as u32;
    min_blocks.max(MIN_BLOCKS_FLOOR)
}

/// Smallest `h` such that `32^h * 32 >= min_blocks`, i.e. the number of
/// interior rows above the shared leaves.
fn tree_height(min_blocks: u32) -> u32 {
    let mut h = 1u32;
    let mut capacity = NUM_BRANCHES;

    while capacity != 0 {
        if min_blocks > capacity {
            h += 1;
        }
        capacity <<= NUM_BRANCHES_LOG2;
    }

    debug_assert!(h > 1);
    h - 1
}

fn num_top_node_branches(min_blocks: u32, tree_height: u32) -> u32 {
    let num_top_branch_blocks = 1u32 << (NUM_BRANCHES_LOG2 * tree_height);
    min_blocks / num_top_branch_blocks + u32::from(min_blocks % num_top_branch_blocks != 0)
}

fn num_leaves(num_top_branches: u32, tree_height: u32) -> u32 {
    num_top_branches << (NUM_BRANCHES_LOG2 * (tree_height - 1))
}

fn tree_stride(num_top_branches: u32, tree_height: u32) -> u32 {
    let mut total = 1u32; // top node
    let mut row_width = num_top_branches;

    for _ in 1..tree_height {
        total += row_width;
        row_width <<= NUM_BRANCHES_LOG2;
    }

    total
}

/// Starting index of each interior row within one tree.
fn row_offsets(num_top_branches: u32, tree_height: u32) -> [u32; MAX_TREE_HEIGHT] {
    let mut offsets = [0u32; MAX_TREE_HEIGHT];
    let mut offset = 1u32;
    let mut row_width = num_top_branches;

    for row in 1..tree_height {
        let slot = offsets
            .get_mut(row as usize)
            .expect("tree_height bounded by MAX_TREE_HEIGHT");
        *slot = offset;
        offset += row_width;
        row_width <<= NUM_BRANCHES_LOG2;
    }

    offsets
}

/// Bytes a buffer sized for `min_blocks` must have, per spec.md §4.1/§6.
pub(crate) fn required_buffer_size_bytes(min_blocks: u64) -> u32 {
    let geometry = Geometry::for_min_blocks(min_blocks);
    geometry.total_words() * 4
}
