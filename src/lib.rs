//! # chainscope
//!
//! Analytical core for full-chain blockchain queries: balanced chain
//! segmentation with deterministic parallel map-reduce, and output-script
//! classification with deduplicated address identities.
//!
//! A [`Blockchain`] wraps any [`ChainBackend`] and hands out cheap
//! [`Block`]/[`Transaction`] views. [`segment::segment_chain`] splits a
//! block range into contiguous segments of near-equal transaction count,
//! and [`Blockchain::map_reduce`] runs one worker per segment, folding the
//! partial results in range order so the answer never depends on worker
//! scheduling.
//!
//! On the address side, [`script::AnyScriptOutput::classify`] turns a raw
//! output script into one of eight address kinds, and resolving it against
//! an [`address_state::AddressState`] assigns a dense, stable,
//! first-seen-wins id per deduplication group.
//!
//! ```
//! use std::sync::Arc;
//! use chainscope::memory::InMemoryBackend;
//! use chainscope::segment::segment_chain;
//! use chainscope::Blockchain;
//!
//! let chain = Blockchain::new(Arc::new(InMemoryBackend::from_tx_counts(&[10, 1, 10])));
//! let segments = segment_chain(&chain, 0, chain.len(), 2);
//! assert_eq!(segments.len(), 2);
//!
//! let total: u64 = chain
//!     .map_reduce(
//!         0,
//!         chain.len(),
//!         |segment| Ok(segment.iter().map(|b| u64::from(b.tx_count())).sum()),
//!         |a, b| a + b,
//!         0,
//!     )
//!     .unwrap();
//! assert_eq!(total, 21);
//! ```

pub mod address_state;
pub mod chain;
pub mod error;
pub mod heuristics;
pub mod memory;
pub mod query;
pub mod script;
pub mod segment;
pub mod types;

pub use chain::{Block, Blockchain, ChainBackend, ChainConfig, Transaction};
pub use error::{ChainError, Result};
pub use types::{Address, AddressKind, BlockHeight, Hash160, Hash256, RawOutput, ScriptGroup, TxIndex};
