//! In-memory chain backend
//!
//! The reference [`ChainBackend`]: keeps decoded blocks in plain vectors.
//! Used throughout the test suite and by callers that already hold decoded
//! blocks (an ingestion driver mid-parse, for instance).

use crate::chain::ChainBackend;
use crate::types::{BlockHeight, RawOutput, TxIndex};

#[derive(Debug, Clone)]
pub struct InMemoryBackend {
    /// Per-block first transaction index, plus the trailing sentinel row
    /// holding the total transaction count.
    first_tx: Vec<TxIndex>,
    sizes: Vec<u64>,
    /// Output lists, indexed by chain-global transaction index.
    outputs: Vec<Vec<RawOutput>>,
}

impl InMemoryBackend {
    pub fn new() -> Self {
        Self {
            first_tx: vec![0],
            sizes: Vec::new(),
            outputs: Vec::new(),
        }
    }

    /// Append a block given its transactions' output lists.
    pub fn push_block(&mut self, transactions: Vec<Vec<RawOutput>>, size: u64) {
        self.outputs.extend(transactions);
        self.first_tx.push(self.outputs.len() as TxIndex);
        self.sizes.push(size);
    }

    /// Append a block of `tx_count` transactions with empty output lists.
    /// Handy when only the chain's transaction geometry matters.
    pub fn push_block_with_tx_count(&mut self, tx_count: u32) {
        self.push_block(vec![Vec::new(); tx_count as usize], 0);
    }

    /// Build a chain whose blocks hold the given transaction counts.
    pub fn from_tx_counts(counts: &[u32]) -> Self {
        let mut backend = Self::new();
        for &count in counts {
            backend.push_block_with_tx_count(count);
        }
        backend
    }
}

impl Default for InMemoryBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl ChainBackend for InMemoryBackend {
    fn block_count(&self) -> u32 {
        self.sizes.len() as u32
    }

    fn first_tx_index(&self, height: BlockHeight) -> TxIndex {
        self.first_tx[height as usize]
    }

    fn block_size(&self, height: BlockHeight) -> u64 {
        self.sizes[height as usize]
    }

    fn outputs(&self, tx_index: TxIndex) -> Vec<RawOutput> {
        self.outputs[tx_index as usize].clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::AddressKind;

    #[test]
    fn test_sentinel_row_tracks_total_tx_count() {
        let backend = InMemoryBackend::from_tx_counts(&[3, 0, 2]);
        assert_eq!(backend.block_count(), 3);
        assert_eq!(backend.first_tx_index(0), 0);
        assert_eq!(backend.first_tx_index(1), 3);
        assert_eq!(backend.first_tx_index(2), 3);
        assert_eq!(backend.first_tx_index(3), 5);
    }

    #[test]
    fn test_outputs_round_trip() {
        let output = RawOutput {
            value: 50_000,
            script_pubkey: vec![0x6a, 0x01, 0xff],
            kind: AddressKind::NullData,
        };
        let mut backend = InMemoryBackend::new();
        backend.push_block(vec![vec![output.clone()]], 215);
        assert_eq!(backend.outputs(0), vec![output]);
        assert_eq!(backend.block_size(0), 215);
    }
}
