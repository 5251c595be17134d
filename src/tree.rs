//! Tree descent (§4.4) and tree maintenance (§4.5): walking one of the six
//! summary trees to find a leaf with space, and bubbling a leaf's full/
//! has-space state up toward the root after `mark`/`clear` touch it.

use crate::bits::first_zero;
use crate::geometry::{MAX_TREE_HEIGHT, NUM_BRANCHES_LOG2};

const BRANCH_INDEX_MASK: u32 = (1 << NUM_BRANCHES_LOG2) - 1;

/// Index (within the leaf bitmap) of a leaf that still has a free slot for
/// this tree's size class, found by descending from the root and always
/// following the lowest-indexed zero branch bit.
///
/// Precondition: `tree`'s top node is not all-ones (checked by the caller
/// before descending, since an all-ones top node means no leaf anywhere has
/// space for this class).
pub(crate) fn leaf_with_space_index(
    tree: &[u32],
    row_offsets: &[u32; MAX_TREE_HEIGHT],
    tree_height: u32,
) -> u32 {
    let top = *tree.first().expect("tree always has a root node");
    let mut node_i = first_zero(top);

    for row in 1..tree_height {
        let offset = row_offsets
            .get(row as usize)
            .expect("row < tree_height <= MAX_TREE_HEIGHT");
        let node = tree
            .get((*offset + node_i) as usize)
            .expect("descent index stays within this tree's node count");
        let branch_i = first_zero(*node);
        node_i = (node_i << NUM_BRANCHES_LOG2) + branch_i;
    }

    node_i
}

/// After a leaf lost its last free slot for this tree's size class, sets the
/// leaf's branch bit in the bottom row and bubbles the "this subtree is now
/// full" bit upward, stopping as soon as a touched node still has room for
/// some *other* branch (early exit — the whole point of the tree).
pub(crate) fn set_leaf_full_in_tree(
    tree: &mut [u32],
    leaf_i: u32,
    row_offsets: &[u32; MAX_TREE_HEIGHT],
    tree_height: u32,
) {
    let mut branch_i = leaf_i & BRANCH_INDEX_MASK;
    let mut node_i = leaf_i >> NUM_BRANCHES_LOG2;

    let mut row = tree_height - 1;
    loop {
        let offset = row_offsets
            .get(row as usize)
            .expect("row < tree_height <= MAX_TREE_HEIGHT");
        let node = tree
            .get_mut((*offset + node_i) as usize)
            .expect("ancestor index stays within this tree's node count");
        *node |= 1 << branch_i;
        let node_has_space_left = *node != u32::MAX;

        if row == 0 || node_has_space_left {
            return;
        }

        branch_i = node_i & BRANCH_INDEX_MASK;
        node_i >>= NUM_BRANCHES_LOG2;
        row -= 1;
    }
}

/// After a leaf regained a free slot for this tree's size class, clears the
/// leaf's branch bit in the bottom row and bubbles the "this subtree has
/// space again" state upward, stopping as soon as a touched node already had
/// space before this clear (early exit: an ancestor that already reported
/// space needs no update, and neither do its ancestors).
pub(crate) fn clear_leaf_space_in_tree(
    tree: &mut [u32],
    leaf_i: u32,
    row_offsets: &[u32; MAX_TREE_HEIGHT],
    tree_height: u32,
) {
    let mut branch_i = leaf_i & BRANCH_INDEX_MASK;
    let mut node_i = leaf_i >> NUM_BRANCHES_LOG2;

    let mut row = tree_height - 1;
    loop {
        let offset = row_offsets
            .get(row as usize)
            .expect("row < tree_height <= MAX_TREE_HEIGHT");
        let node = tree
            .get_mut((*offset + node_i) as usize)
            .expect("ancestor index stays within this tree's node count");
        let node_had_space = *node != u32::MAX;
        *node &= !(1 << branch_i);

        if row == 0 || node_had_space {
            return;
        }

        branch_i = node_i & BRANCH_INDEX_MASK;
        node_i >>= NUM_BRANCHES_LOG2;
        row -= 1;
    }
}
