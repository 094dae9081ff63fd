//! Balanced chain segmentation
//!
//! Splits a half-open block range into contiguous, block-aligned segments
//! holding near-equal transaction counts. Transaction count is the work
//! measure, not block count: block sizes vary too wildly for block-count
//! splits to balance a worker pool.

use crate::chain::{Block, Blockchain};
use crate::types::{BlockHeight, TxIndex};

/// Partition the block range `[start, end)` into at most `segment_count`
/// contiguous segments of near-equal transaction count.
///
/// Runs in O(range length): one pass builds a prefix array of per-block
/// first-tx indices, then each breakpoint is a lower-bound binary search.
/// An exact breakpoint lands the boundary block in the *next* segment.
/// Once the remaining transactions no longer exceed the ideal segment size,
/// all remaining blocks go to the final segment; they join the existing
/// last segment when `segment_count` segments already exist, rather than
/// opening an extra one.
///
/// # Panics
///
/// Panics if the range is out of bounds, if `segment_count` is zero, or,
/// as a fatal internal-consistency check, if the produced segments do not
/// hold exactly the range's transactions.
pub fn segment_chain<'c>(
    chain: &'c Blockchain,
    start: BlockHeight,
    end: BlockHeight,
    segment_count: u32,
) -> Vec<Vec<Block<'c>>> {
    assert!(
        start <= end && end <= chain.len(),
        "segment range [{start}, {end}) out of bounds for chain of {} blocks",
        chain.len()
    );
    assert!(segment_count >= 1, "segment_count must be at least 1");

    if start == end {
        return Vec::new();
    }

    // prefix[i] is the first tx index of block (start + i); the final entry
    // is the end of the last block in range.
    let range_len = (end - start) as usize;
    let mut prefix: Vec<TxIndex> = Vec::with_capacity(range_len + 1);
    for height in start..=end {
        prefix.push(chain.first_tx_index(height));
    }

    let first_tx = prefix[0];
    let last_tx = prefix[range_len];
    let total_tx = u64::from(last_tx - first_tx);
    let ideal = total_tx as f64 / f64::from(segment_count);

    let blocks_from = |lo: usize, hi: usize| -> Vec<Block<'c>> {
        (start + lo as u32..start + hi as u32)
            .map(|height| Block::new(chain, height))
            .collect()
    };

    let mut segments: Vec<Vec<Block<'c>>> = Vec::new();
    let mut cur = 0usize;
    while f64::from(last_tx - prefix[cur]) > ideal {
        let break_point = f64::from(prefix[cur]) + ideal;
        // first block whose first tx index reaches the breakpoint opens the
        // next segment (lower-bound semantics, sentinel excluded)
        let next = cur + prefix[cur..range_len].partition_point(|&tx| f64::from(tx) < break_point);
        segments.push(blocks_from(cur, next));
        cur = next;
    }

    let remainder = blocks_from(cur, range_len);
    if segments.len() == segment_count as usize {
        segments
            .last_mut()
            .expect("segment_count >= 1 segments exist")
            .extend(remainder);
    } else if !remainder.is_empty() || segments.is_empty() {
        segments.push(remainder);
    }

    let counted: u64 = segments
        .iter()
        .flatten()
        .map(|block| u64::from(block.tx_count()))
        .sum();
    assert_eq!(
        counted, total_tx,
        "segmentation dropped or duplicated transactions"
    );

    log::debug!(
        "segmented blocks [{start}, {end}) into {} segments of ~{ideal:.0} txes",
        segments.len()
    );
    segments
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::InMemoryBackend;
    use std::sync::Arc;

    fn chain_of(counts: &[u32]) -> Blockchain {
        Blockchain::new(Arc::new(InMemoryBackend::from_tx_counts(counts)))
    }

    fn segment_tx_counts(segments: &[Vec<Block<'_>>]) -> Vec<u32> {
        segments
            .iter()
            .map(|segment| segment.iter().map(|b| b.tx_count()).sum())
            .collect()
    }

    fn assert_exact_partition(
        segments: &[Vec<Block<'_>>],
        start: BlockHeight,
        end: BlockHeight,
        total_tx: u64,
    ) {
        let heights: Vec<u32> = segments
            .iter()
            .flatten()
            .map(|block| block.height())
            .collect();
        let expected: Vec<u32> = (start..end).collect();
        assert_eq!(heights, expected, "segments must reproduce block order");
        let counted: u64 = segments
            .iter()
            .flatten()
            .map(|b| u64::from(b.tx_count()))
            .sum();
        assert_eq!(counted, total_tx);
    }

    #[test]
    fn test_uneven_blocks_split_on_block_boundaries() {
        let chain = chain_of(&[10, 1, 10]);
        let segments = segment_chain(&chain, 0, 3, 2);
        assert_exact_partition(&segments, 0, 3, 21);
        assert_eq!(segments.len(), 2);
        // 21 txes over 2 segments: the breakpoint can only land between
        // whole blocks, so the split is 11/10.
        assert_eq!(segment_tx_counts(&segments), vec![11, 10]);
    }

    #[test]
    fn test_uniform_blocks_split_evenly() {
        let chain = chain_of(&[10, 10, 10, 10]);
        let segments = segment_chain(&chain, 0, 4, 2);
        assert_eq!(segment_tx_counts(&segments), vec![20, 20]);
        assert_exact_partition(&segments, 0, 4, 40);
    }

    #[test]
    fn test_exact_breakpoint_block_opens_next_segment() {
        // breakpoint after block 0 is exactly block 1's first tx index; the
        // boundary block must start the second segment
        let chain = chain_of(&[5, 5]);
        let segments = segment_chain(&chain, 0, 2, 2);
        assert_eq!(segments.len(), 2);
        assert_eq!(segments[0].len(), 1);
        assert_eq!(segments[1].len(), 1);
        assert_eq!(segments[1][0].height(), 1);
    }

    #[test]
    fn test_more_segments_than_blocks_gives_one_block_each() {
        let chain = chain_of(&[4, 4, 4]);
        let segments = segment_chain(&chain, 0, 3, 10);
        assert_eq!(segments.len(), 3);
        for segment in &segments {
            assert_eq!(segment.len(), 1);
        }
        assert_exact_partition(&segments, 0, 3, 12);
    }

    #[test]
    fn test_single_block_range_is_single_segment() {
        let chain = chain_of(&[7, 3, 9]);
        let segments = segment_chain(&chain, 1, 2, 4);
        assert_eq!(segments.len(), 1);
        assert_eq!(segments[0].len(), 1);
        assert_eq!(segments[0][0].height(), 1);
    }

    #[test]
    fn test_sub_range_partition() {
        let chain = chain_of(&[3, 6, 2, 8, 1, 4]);
        let segments = segment_chain(&chain, 1, 5, 3);
        assert_exact_partition(&segments, 1, 5, 6 + 2 + 8 + 1);
    }

    #[test]
    fn test_empty_blocks_are_carried_not_split() {
        let chain = chain_of(&[6, 0, 0, 6]);
        let segments = segment_chain(&chain, 0, 4, 2);
        assert_exact_partition(&segments, 0, 4, 12);
        for segment in &segments {
            assert!(!segment.is_empty());
        }
    }

    #[test]
    fn test_trailing_small_block_never_opens_an_extra_segment() {
        let chain = chain_of(&[10, 10, 1]);
        let segments = segment_chain(&chain, 0, 3, 2);
        assert_eq!(segments.len(), 2);
        assert_exact_partition(&segments, 0, 3, 21);
    }

    #[test]
    fn test_empty_range_yields_no_segments() {
        let chain = chain_of(&[5, 5]);
        assert!(segment_chain(&chain, 1, 1, 3).is_empty());
    }

    #[test]
    fn test_balance_under_near_uniform_density() {
        let counts = [8u32; 32];
        let chain = chain_of(&counts);
        for n in 1..=8 {
            let segments = segment_chain(&chain, 0, 32, n);
            let sizes = segment_tx_counts(&segments);
            let max = *sizes.iter().max().unwrap();
            let min = *sizes.iter().min().unwrap();
            assert!(
                max - min <= 8,
                "segments {sizes:?} unbalanced for n = {n}"
            );
        }
    }

    #[test]
    #[should_panic(expected = "out of bounds")]
    fn test_range_beyond_chain_panics() {
        let chain = chain_of(&[1, 1]);
        segment_chain(&chain, 0, 3, 1);
    }
}
