//! Chain backend contract and random-access block views
//!
//! The backend is an explicit shared handle (`Arc<dyn ChainBackend>`)
//! threaded through every view that needs it; all views are cheap copies
//! borrowing the owning [`Blockchain`] and never mutate the backend.

use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::error::{ChainError, Result};
use crate::types::{BlockHeight, RawOutput, TxIndex};

/// Read-only access to one chain's stored records.
///
/// `first_tx_index` must be defined for `0..=block_count()`: the sentinel
/// row at `block_count()` is the total transaction count. That single extra
/// row is what makes `first_tx_index(h + 1) == end_tx_index(h)` hold for
/// every block: transactions partition contiguously with no gaps or
/// overlaps, by construction rather than by a checked invariant.
pub trait ChainBackend: Send + Sync {
    /// Number of blocks currently stored.
    fn block_count(&self) -> u32;

    /// First chain-global transaction index of the block at `height`.
    fn first_tx_index(&self, height: BlockHeight) -> TxIndex;

    /// Serialized size in bytes of the block at `height`.
    fn block_size(&self, height: BlockHeight) -> u64;

    /// Output list of the transaction at chain-global index `tx_index`.
    fn outputs(&self, tx_index: TxIndex) -> Vec<RawOutput>;
}

/// Policy knobs applied when opening a chain view.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChainConfig {
    /// Error out (rather than silently shrink the view) when the backend
    /// loses blocks under us.
    pub error_on_reorg: bool,
    /// Most-recent blocks excluded from the view, as a reorg safety margin.
    pub blocks_ignored: u32,
}

impl Default for ChainConfig {
    fn default() -> Self {
        Self {
            error_on_reorg: true,
            blocks_ignored: 0,
        }
    }
}

impl ChainConfig {
    pub fn from_json(json: &str) -> Result<Self> {
        serde_json::from_str(json).map_err(|e| ChainError::Config(e.to_string()))
    }
}

/// A random-access, ordered view of one chain.
///
/// Many `Blockchain` instances may be opened on the same backend handle;
/// the backend lives as long as its longest holder and is immutable during
/// analysis.
pub struct Blockchain {
    backend: Arc<dyn ChainBackend>,
    config: ChainConfig,
    block_count: u32,
}

impl Blockchain {
    pub fn new(backend: Arc<dyn ChainBackend>) -> Self {
        Self::with_config(backend, ChainConfig::default())
    }

    pub fn with_config(backend: Arc<dyn ChainBackend>, config: ChainConfig) -> Self {
        let block_count = backend.block_count().saturating_sub(config.blocks_ignored);
        Self {
            backend,
            config,
            block_count,
        }
    }

    /// Number of blocks in this view.
    pub fn len(&self) -> u32 {
        self.block_count
    }

    pub fn is_empty(&self) -> bool {
        self.block_count == 0
    }

    /// The shared backend handle, for opening further views on the same
    /// data source.
    pub fn backend(&self) -> Arc<dyn ChainBackend> {
        Arc::clone(&self.backend)
    }

    /// Random access to the block at `height`.
    pub fn block(&self, height: BlockHeight) -> Option<Block<'_>> {
        if height < self.block_count {
            Some(Block::new(self, height))
        } else {
            None
        }
    }

    /// A finite, restartable, double-ended iterator over all blocks in the
    /// view. Restart by calling this again.
    pub fn blocks(&self) -> Blocks<'_> {
        Blocks {
            chain: self,
            front: 0,
            back: self.block_count,
        }
    }

    /// Chain-wide transaction count: the last block's end index.
    pub fn tx_count(&self) -> u64 {
        if self.block_count == 0 {
            0
        } else {
            u64::from(self.backend.first_tx_index(self.block_count))
        }
    }

    /// Re-read the backend's block count and apply the reorg policy: a
    /// shrunken backend is an error when `error_on_reorg` is set, otherwise
    /// the view shrinks to match. Growth always extends the view.
    pub fn refresh(&mut self) -> Result<()> {
        let raw = self.backend.block_count();
        let seen = self.block_count + self.config.blocks_ignored;
        if raw < seen && self.config.error_on_reorg {
            return Err(ChainError::Reorg {
                expected: seen,
                actual: raw,
            });
        }
        self.block_count = raw.saturating_sub(self.config.blocks_ignored);
        Ok(())
    }

    pub(crate) fn first_tx_index(&self, height: BlockHeight) -> TxIndex {
        self.backend.first_tx_index(height)
    }
}

impl fmt::Debug for Blockchain {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Blockchain")
            .field("block_count", &self.block_count)
            .field("config", &self.config)
            .finish()
    }
}

impl<'c> IntoIterator for &'c Blockchain {
    type Item = Block<'c>;
    type IntoIter = Blocks<'c>;

    fn into_iter(self) -> Blocks<'c> {
        self.blocks()
    }
}

/// Lightweight immutable view of one block. Keyed by height; owns no
/// storage and is never mutated.
#[derive(Clone, Copy)]
pub struct Block<'c> {
    height: BlockHeight,
    chain: &'c Blockchain,
}

impl<'c> Block<'c> {
    pub(crate) fn new(chain: &'c Blockchain, height: BlockHeight) -> Self {
        Self { height, chain }
    }

    pub fn height(&self) -> BlockHeight {
        self.height
    }

    pub fn first_tx_index(&self) -> TxIndex {
        self.chain.backend.first_tx_index(self.height)
    }

    pub fn end_tx_index(&self) -> TxIndex {
        self.chain.backend.first_tx_index(self.height + 1)
    }

    pub fn tx_count(&self) -> u32 {
        self.end_tx_index() - self.first_tx_index()
    }

    /// Serialized block size in bytes.
    pub fn size(&self) -> u64 {
        self.chain.backend.block_size(self.height)
    }

    pub fn transactions(self) -> impl Iterator<Item = Transaction<'c>> {
        let chain = self.chain;
        let height = self.height;
        (self.first_tx_index()..self.end_tx_index())
            .map(move |index| Transaction::new(chain, index, height))
    }
}

impl fmt::Debug for Block<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Block").field("height", &self.height).finish()
    }
}

impl PartialEq for Block<'_> {
    fn eq(&self, other: &Self) -> bool {
        self.height == other.height
    }
}

impl Eq for Block<'_> {}

/// Lightweight immutable view of one transaction, keyed by chain-global
/// index.
#[derive(Clone, Copy)]
pub struct Transaction<'c> {
    index: TxIndex,
    block_height: BlockHeight,
    chain: &'c Blockchain,
}

impl<'c> Transaction<'c> {
    pub(crate) fn new(chain: &'c Blockchain, index: TxIndex, block_height: BlockHeight) -> Self {
        Self {
            index,
            block_height,
            chain,
        }
    }

    pub fn index(&self) -> TxIndex {
        self.index
    }

    /// The block this transaction belongs to.
    pub fn block(&self) -> Block<'c> {
        Block::new(self.chain, self.block_height)
    }

    pub fn outputs(&self) -> Vec<RawOutput> {
        self.chain.backend.outputs(self.index)
    }
}

impl fmt::Debug for Transaction<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Transaction")
            .field("index", &self.index)
            .field("block_height", &self.block_height)
            .finish()
    }
}

impl PartialEq for Transaction<'_> {
    fn eq(&self, other: &Self) -> bool {
        self.index == other.index
    }
}

impl Eq for Transaction<'_> {}

/// Double-ended, exact-size block iterator over `[front, back)`.
pub struct Blocks<'c> {
    chain: &'c Blockchain,
    front: BlockHeight,
    back: BlockHeight,
}

impl<'c> Iterator for Blocks<'c> {
    type Item = Block<'c>;

    fn next(&mut self) -> Option<Block<'c>> {
        if self.front < self.back {
            let block = Block::new(self.chain, self.front);
            self.front += 1;
            Some(block)
        } else {
            None
        }
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        let remaining = (self.back - self.front) as usize;
        (remaining, Some(remaining))
    }

    fn nth(&mut self, n: usize) -> Option<Block<'c>> {
        let skip = u32::try_from(n).unwrap_or(u32::MAX);
        self.front = self.front.saturating_add(skip).min(self.back);
        self.next()
    }
}

impl DoubleEndedIterator for Blocks<'_> {
    fn next_back(&mut self) -> Option<Self::Item> {
        if self.front < self.back {
            self.back -= 1;
            Some(Block::new(self.chain, self.back))
        } else {
            None
        }
    }
}

impl ExactSizeIterator for Blocks<'_> {}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::InMemoryBackend;

    fn three_block_chain() -> Blockchain {
        Blockchain::new(Arc::new(InMemoryBackend::from_tx_counts(&[10, 1, 10])))
    }

    #[test]
    fn test_block_tx_ranges_partition_contiguously() {
        let chain = three_block_chain();
        assert_eq!(chain.len(), 3);
        for height in 0..chain.len() - 1 {
            let block = chain.block(height).unwrap();
            let next = chain.block(height + 1).unwrap();
            assert_eq!(block.end_tx_index(), next.first_tx_index());
        }
        assert_eq!(chain.tx_count(), 21);
    }

    #[test]
    fn test_block_out_of_range() {
        let chain = three_block_chain();
        assert!(chain.block(2).is_some());
        assert!(chain.block(3).is_none());
    }

    #[test]
    fn test_blocks_iterator_is_restartable_and_double_ended() {
        let chain = three_block_chain();
        let forward: Vec<u32> = chain.blocks().map(|b| b.height()).collect();
        assert_eq!(forward, vec![0, 1, 2]);

        let backward: Vec<u32> = chain.blocks().rev().map(|b| b.height()).collect();
        assert_eq!(backward, vec![2, 1, 0]);

        let mut iter = chain.blocks();
        assert_eq!(iter.len(), 3);
        assert_eq!(iter.nth(2).map(|b| b.height()), Some(2));
        assert!(iter.next().is_none());
    }

    #[test]
    fn test_ignored_tail_blocks_shrink_the_view() {
        let backend = Arc::new(InMemoryBackend::from_tx_counts(&[5, 5, 5, 5]));
        let chain = Blockchain::with_config(
            backend,
            ChainConfig {
                error_on_reorg: true,
                blocks_ignored: 2,
            },
        );
        assert_eq!(chain.len(), 2);
        assert_eq!(chain.tx_count(), 10);
    }

    #[test]
    fn test_refresh_reports_reorg() {
        let backend = Arc::new(InMemoryBackend::from_tx_counts(&[1, 1, 1]));
        let mut chain = Blockchain::new(Arc::clone(&backend) as Arc<dyn ChainBackend>);
        assert_eq!(chain.len(), 3);

        // A second, shorter backend swapped in behind a fresh view stands in
        // for a truncated data source.
        let shorter = Arc::new(InMemoryBackend::from_tx_counts(&[1]));
        let mut truncated = Blockchain::new(shorter.clone());
        truncated.block_count = 3; // view opened before the truncation
        let err = truncated.refresh().unwrap_err();
        assert!(matches!(err, ChainError::Reorg { expected: 3, actual: 1 }));

        // Growth is never an error.
        chain.refresh().unwrap();
        assert_eq!(chain.len(), 3);
    }

    #[test]
    fn test_refresh_shrinks_quietly_when_policy_allows() {
        let shorter = Arc::new(InMemoryBackend::from_tx_counts(&[1, 1]));
        let mut chain = Blockchain::with_config(
            shorter,
            ChainConfig {
                error_on_reorg: false,
                blocks_ignored: 0,
            },
        );
        chain.block_count = 5; // pretend the view predates a truncation
        chain.refresh().unwrap();
        assert_eq!(chain.len(), 2);
    }

    #[test]
    fn test_chain_config_from_json() {
        let config =
            ChainConfig::from_json(r#"{"error_on_reorg": false, "blocks_ignored": 6}"#).unwrap();
        assert!(!config.error_on_reorg);
        assert_eq!(config.blocks_ignored, 6);
        assert!(ChainConfig::from_json("not json").is_err());
    }

    #[test]
    fn test_empty_chain() {
        let chain = Blockchain::new(Arc::new(InMemoryBackend::new()));
        assert!(chain.is_empty());
        assert_eq!(chain.tx_count(), 0);
        assert_eq!(chain.blocks().count(), 0);
    }
}
