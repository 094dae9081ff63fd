//! Parallel map-reduce execution and derived chain queries
//!
//! One map call per segment runs on the rayon pool over an independent
//! read-only chain slice; partial results are collected indexed by segment
//! position and folded left-to-right, so the outcome is identical no matter
//! how workers are scheduled; the reduce function need not be commutative.
//! A failing map call aborts the whole operation; there is no
//! partial-reduce fallback.

use rayon::prelude::*;

use crate::chain::{Block, Blockchain, Transaction};
use crate::error::Result;
use crate::heuristics::{CoinJoinResult, TxClassifier};
use crate::segment::segment_chain;
use crate::types::{AddressKind, BlockHeight};

impl Blockchain {
    /// Run `map` once per segment of `[start, end)` in parallel, then fold
    /// the partial results in range order with `reduce`, starting from
    /// `init`. Segment count is bounded by available parallelism.
    pub fn map_reduce<'c, T, M, R>(
        &'c self,
        start: BlockHeight,
        end: BlockHeight,
        map: M,
        reduce: R,
        init: T,
    ) -> Result<T>
    where
        T: Send,
        M: Fn(&[Block<'c>]) -> Result<T> + Send + Sync,
        R: Fn(T, T) -> T,
    {
        let segment_count = rayon::current_num_threads().max(1) as u32;
        let segments = segment_chain(self, start, end, segment_count);
        log::trace!(
            "map_reduce over blocks [{start}, {end}): {} segments",
            segments.len()
        );

        // collect() keeps segment order and short-circuits on the first
        // worker error
        let partials = segments
            .par_iter()
            .map(|segment| map(segment))
            .collect::<Result<Vec<T>>>()?;
        Ok(partials.into_iter().fold(init, reduce))
    }

    /// Order-preserving parallel block filter over `[start, end)`.
    pub fn filter_blocks<'c, F>(
        &'c self,
        start: BlockHeight,
        end: BlockHeight,
        test: F,
    ) -> Result<Vec<Block<'c>>>
    where
        F: Fn(&Block<'c>) -> bool + Send + Sync,
    {
        self.map_reduce(
            start,
            end,
            |segment| Ok(segment.iter().copied().filter(|block| test(block)).collect()),
            |mut acc: Vec<Block<'c>>, mut part| {
                acc.append(&mut part);
                acc
            },
            Vec::new(),
        )
    }

    /// Order-preserving parallel transaction filter over `[start, end)`.
    pub fn filter_transactions<'c, F>(
        &'c self,
        start: BlockHeight,
        end: BlockHeight,
        test: F,
    ) -> Result<Vec<Transaction<'c>>>
    where
        F: Fn(&Transaction<'c>) -> bool + Send + Sync,
    {
        self.map_reduce(
            start,
            end,
            |segment| {
                let mut matched = Vec::new();
                for block in segment.iter().copied() {
                    for tx in block.transactions() {
                        if test(&tx) {
                            matched.push(tx);
                        }
                    }
                }
                Ok(matched)
            },
            |mut acc: Vec<Transaction<'c>>, mut part| {
                acc.append(&mut part);
                acc
            },
            Vec::new(),
        )
    }
}

/// All transactions in `[start, end)` the classifier marks as coinjoins.
pub fn coinjoin_transactions<'c, C: TxClassifier>(
    chain: &'c Blockchain,
    start: BlockHeight,
    end: BlockHeight,
    classifier: &C,
) -> Result<Vec<Transaction<'c>>> {
    chain.filter_transactions(start, end, |tx| classifier.is_coinjoin(tx))
}

/// Chain-wide possible-coinjoin search. Partitions transactions into
/// (confirmed, timed-out) by per-segment list concatenation; transactions
/// the heuristic rejects outright are dropped.
pub fn possible_coinjoin_transactions<'c, C: TxClassifier>(
    chain: &'c Blockchain,
    classifier: &C,
    min_base_fee: u64,
    fee_percentage: f64,
    max_depth: usize,
) -> Result<(Vec<Transaction<'c>>, Vec<Transaction<'c>>)> {
    chain.map_reduce(
        0,
        chain.len(),
        |segment| {
            let mut confirmed = Vec::new();
            let mut timed_out = Vec::new();
            for block in segment.iter().copied() {
                for tx in block.transactions() {
                    match classifier.possible_coinjoin(&tx, min_base_fee, fee_percentage, max_depth)
                    {
                        CoinJoinResult::True => confirmed.push(tx),
                        CoinJoinResult::Timeout => timed_out.push(tx),
                        CoinJoinResult::False => {}
                    }
                }
            }
            Ok((confirmed, timed_out))
        },
        |(mut confirmed, mut timed_out), (mut c, mut t)| {
            confirmed.append(&mut c);
            timed_out.append(&mut t);
            (confirmed, timed_out)
        },
        (Vec::new(), Vec::new()),
    )
}

/// All transactions in `[start, end)` with at least one output of `kind`.
pub fn transactions_with_output_kind<'c>(
    chain: &'c Blockchain,
    start: BlockHeight,
    end: BlockHeight,
    kind: AddressKind,
) -> Result<Vec<Transaction<'c>>> {
    chain.filter_transactions(start, end, move |tx| {
        tx.outputs().iter().any(|output| output.kind == kind)
    })
}

/// All transactions in `[start, end)` matching the deanonymization test.
pub fn deanon_transactions<'c, C: TxClassifier>(
    chain: &'c Blockchain,
    start: BlockHeight,
    end: BlockHeight,
    classifier: &C,
) -> Result<Vec<Transaction<'c>>> {
    chain.filter_transactions(start, end, |tx| classifier.is_deanon(tx))
}

/// All transactions in `[start, end)` matching the change-over test.
pub fn change_over_transactions<'c, C: TxClassifier>(
    chain: &'c Blockchain,
    start: BlockHeight,
    end: BlockHeight,
    classifier: &C,
) -> Result<Vec<Transaction<'c>>> {
    chain.filter_transactions(start, end, |tx| classifier.is_change_over(tx))
}

/// All transactions in `[start, end)` matching the keyset-change test.
pub fn keyset_change_transactions<'c, C: TxClassifier>(
    chain: &'c Blockchain,
    start: BlockHeight,
    end: BlockHeight,
    classifier: &C,
) -> Result<Vec<Transaction<'c>>> {
    chain.filter_transactions(start, end, |tx| classifier.has_keyset_change(tx))
}
