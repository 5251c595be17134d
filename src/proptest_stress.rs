//! Cross-module invariants and stress tests that don't belong to a single
//! component: a brute-force reference model checked against `BlockAllocator`
//! after every operation, plus the named scenarios.

use crate::allocator::BlockAllocator;
use nanorand::{Rng, WyRand};

/// Reference model: a plain bit-per-block `Vec<bool>`, scanned linearly.
/// Anything `BlockAllocator` does has to agree with this.
struct ReferenceModel {
    occupied: Vec<bool>,
}

impl ReferenceModel {
    fn new(num_blocks: usize) -> Self {
        Self {
            occupied: vec![false; num_blocks],
        }
    }

    /// Lowest `width`-aligned run of `width` free blocks, or `None`.
    fn find_free_run(&self, width: usize) -> Option<usize> {
        let mut addr = 0;
        while addr + width <= self.occupied.len() {
            if self
                .occupied
                .get(addr..addr + width)
                .expect("addr + width <= len")
                .iter()
                .all(|&b| !b)
            {
                return Some(addr);
            }
            addr += width;
        }
        None
    }

    fn mark(&mut self, addr: usize, width: usize) {
        for b in self
            .occupied
            .get_mut(addr..addr + width)
            .expect("caller-checked range")
        {
            assert!(!*b, "reference model: double mark at {addr}");
            *b = true;
        }
    }

    fn clear(&mut self, addr: usize, width: usize) {
        for b in self
            .occupied
            .get_mut(addr..addr + width)
            .expect("caller-checked range")
        {
            assert!(*b, "reference model: double clear at {addr}");
            *b = false;
        }
    }

    fn set_count(&self) -> usize {
        self.occupied.iter().filter(|&&b| b).count()
    }
}

fn ceil_log2(n: u32) -> u32 {
    32 - (n - 1).leading_zeros()
}

fn leaf_set_bits(member: &BlockAllocator<'_>) -> u32 {
    member.leaf_words().iter().map(|w| w.count_ones()).sum()
}

#[test]
fn small_fill() {
    // init min_blocks=64 (capacity 64). mark(1) x30 returning 2..31 after
    // the first two single-block marks and a mark(32); mark(1) fails once
    // the first leaf is exhausted.
    let mut buf = vec![0u32; (BlockAllocator::required_buffer_size(64) / 4) as usize];
    let mut member = BlockAllocator::init(64, &mut buf);

    assert_eq!(member.mark(1), Some(0));
    assert_eq!(member.mark(1), Some(1));
    assert_eq!(member.mark(32), Some(32));

    for expected in 2..32 {
        assert_eq!(member.mark(1), Some(expected));
    }
    assert_eq!(member.mark(1), None);
}

#[test]
fn alignment() {
    // init min_blocks=128. mark(3) -> class 2 (width 4) -> addr 0, then 4;
    // mark(1) then lands at 8, the first free single block.
    let mut buf = vec![0u32; (BlockAllocator::required_buffer_size(128) / 4) as usize];
    let mut member = BlockAllocator::init(128, &mut buf);

    assert_eq!(member.mark(3), Some(0));
    assert_eq!(member.mark(3), Some(4));
    assert_eq!(member.mark(1), Some(8));
}

#[test]
fn top_sentinels_stay_pinned_through_exhaustion() {
    // init min_blocks=65: rounds up to t=3 top branches at height 1 (see
    // geometry::tests::rounds_up_past_64). The sentinel bits for branches
    // 3..32 must read 1 before, during, and after the member is exhausted.
    let mut buf = vec![0u32; (BlockAllocator::required_buffer_size(65) / 4) as usize];
    let mut member = BlockAllocator::init(65, &mut buf);

    let num_top_branches = u32::from(member.num_top_branches());
    let sentinel_mask = !((1u32 << num_top_branches) - 1);

    for tree_index in 0..6 {
        assert_eq!(member.top_node(tree_index) & sentinel_mask, sentinel_mask);
    }

    while member.mark(32).is_some() {}

    for tree_index in 0..6 {
        let top = member.top_node(tree_index);
        assert_eq!(top & sentinel_mask, sentinel_mask, "sentinel bits must stay pinned");
        assert_eq!(top, u32::MAX, "every real branch is also full once class 5 is exhausted");
    }
}

#[test]
fn stress_mark_clear_matches_reference_model() {
    // 10,000 random mark/clear pairs on a capacity-4096 member; total set
    // bits in the leaf bitmap are re-checked against the reference model
    // every 100 ops.
    let min_blocks = 4096u64;
    let mut buf = vec![0u32; (BlockAllocator::required_buffer_size(min_blocks) / 4) as usize];
    let mut member = BlockAllocator::init(min_blocks, &mut buf);
    let mut reference = ReferenceModel::new(member.num_blocks() as usize);

    let mut rng = WyRand::new();
    let mut outstanding: Vec<(u32, u32)> = Vec::new();

    for op in 0..10_000u32 {
        let do_mark = outstanding.is_empty() || rng.generate_range(0u32..2) == 0;

        if do_mark {
            let width = rng.generate_range(1u32..33);
            let size_class = ceil_log2(width);
            let class_width = 1u32 << size_class;

            let expected = reference.find_free_run(class_width as usize);
            let actual = member.mark(width);

            assert_eq!(
                actual,
                expected.map(|a| u32::try_from(a).expect("fits u32")),
                "op={op} width={width}"
            );

            if let Some(addr) = actual {
                reference.mark(addr as usize, class_width as usize);
                outstanding.push((addr, width));
            }
        } else {
            let i = rng.generate_range(0..outstanding.len());
            let (addr, width) = outstanding.swap_remove(i);
            let size_class = ceil_log2(width);
            let class_width = 1u32 << size_class;
            reference.clear(addr as usize, class_width as usize);
            member.clear(addr, width);
        }

        if op % 100 == 0 {
            assert_eq!(
                leaf_set_bits(&member),
                u32::try_from(reference.set_count()).expect("fits u32"),
                "conservation check failed at op={op}"
            );
        }
    }
}

#[test]
fn determinism_is_reproducible_from_identical_state() {
    // Descent always picks the lowest-index available slot, so replaying
    // the same mark script on a fresh member must retrace the same
    // addresses every time.
    fn run() -> Vec<Option<u32>> {
        let mut buf = vec![0u32; (BlockAllocator::required_buffer_size(512) / 4) as usize];
        let mut member = BlockAllocator::init(512, &mut buf);
        [1u32, 4, 2, 8, 1, 16, 3]
            .iter()
            .map(|&n| member.mark(n))
            .collect()
    }

    assert_eq!(run(), run());
}

#[test]
fn boundary_top_branch_counts_round_trip() {
    // Every min_blocks value giving t in 2..=32 top branches at height 1;
    // sentinel bits must stay pinned through a full exhaustion pass.
    for t in 2u64..=32 {
        let min_blocks = ((t - 1) * 32 + 1).max(64);
        let mut buf = vec![0u32; (BlockAllocator::required_buffer_size(min_blocks) / 4) as usize];
        let mut member = BlockAllocator::init(min_blocks, &mut buf);

        assert_eq!(u32::from(member.num_top_branches()), u32::try_from(t).expect("fits u32"));
        assert_eq!(member.tree_height(), 1);

        let sentinel_mask = if t == 32 {
            0
        } else {
            !((1u32 << t) - 1)
        };
        for tree_index in 0..6 {
            assert_eq!(member.top_node(tree_index) & sentinel_mask, sentinel_mask);
        }

        while member.mark(32).is_some() {}
        for tree_index in 0..6 {
            assert_eq!(member.top_node(tree_index) & sentinel_mask, sentinel_mask);
        }
    }
}
