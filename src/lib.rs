// Enable all lint groups except restriction
#![deny(
    clippy::all,
    clippy::correctness,
    clippy::suspicious,
    clippy::style,
    clippy::complexity,
    clippy::perf,
    clippy::pedantic
)]
// Lints from the restrictions group
#![deny(
    clippy::allow_attributes_without_reason,
    clippy::as_underscore,
    clippy::deref_by_slicing,
    clippy::else_if_without_else,
    clippy::empty_enum_variants_with_brackets,
    clippy::empty_structs_with_brackets,
    clippy::float_arithmetic,
    clippy::fn_to_numeric_cast_any,
    clippy::if_then_some_else_none,
    clippy::indexing_slicing,
    clippy::map_err_ignore,
    clippy::multiple_unsafe_ops_per_block,
    clippy::pattern_type_mismatch,
    clippy::tests_outside_test_module,
    clippy::todo,
    clippy::undocumented_unsafe_blocks,
    clippy::unwrap_used
)]
#![cfg_attr(not(test), no_std)]

//! A deterministic, O(log N) small-object block allocator.
//!
//! Manages an abstract index space of `N` fixed-size blocks and hands out
//! contiguous, naturally-aligned runs of 1 to 32 blocks. The allocator never
//! touches the bytes a block represents and never allocates memory of its
//! own past [`BlockAllocator::init`] — the caller owns a single `&mut [u32]`
//! buffer for the lifetime of the allocator.
//!
//! The index is a forest of six bit-level summary trees (one per power-of-two
//! size class) sharing a single leaf bitmap, which is what gives `mark`/
//! `clear` their O(log N) bound: see [`allocator`] for the public surface and
//! [`geometry`] for how the tree shape is derived from a block count.
//!
//! The core is single-threaded by contract: `BlockAllocator` borrows its
//! buffer mutably, so the borrow checker already forbids sharing an instance
//! across threads without external synchronization.

mod bits;
mod geometry;
mod leaf;
mod tree;

mod allocator;

#[cfg(test)]
mod proptest_stress;

pub use allocator::{BlockAllocator, MAX_MARK_BLOCKS};
