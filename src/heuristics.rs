//! Consumed transaction heuristics
//!
//! The analysis queries in [`crate::query`] are generic over these pure
//! predicates; the crate never implements them itself. Implementations must
//! be `Sync` since they are evaluated from parallel segment workers.

use serde::{Deserialize, Serialize};

use crate::chain::Transaction;

/// Outcome of the bounded-depth possible-coinjoin heuristic. `Timeout`
/// means the search gave up before reaching a verdict; why it gave up is
/// the predicate's own business and is never interpreted here.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CoinJoinResult {
    True,
    False,
    Timeout,
}

/// External transaction classification predicates.
pub trait TxClassifier: Sync {
    /// Structural coinjoin test.
    fn is_coinjoin(&self, tx: &Transaction<'_>) -> bool;

    /// Bounded-depth coinjoin search with a minimum-fee floor, a
    /// fee-percentage threshold, and a maximum search depth.
    fn possible_coinjoin(
        &self,
        tx: &Transaction<'_>,
        min_base_fee: u64,
        fee_percentage: f64,
        max_depth: usize,
    ) -> CoinJoinResult;

    /// Deanonymization-pattern test.
    fn is_deanon(&self, tx: &Transaction<'_>) -> bool;

    /// Change-over-pattern test (all funds move to fresh addresses).
    fn is_change_over(&self, tx: &Transaction<'_>) -> bool;

    /// Keyset-change test for multisig-controlled funds.
    fn has_keyset_change(&self, tx: &Transaction<'_>) -> bool;
}
