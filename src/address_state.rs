//! Address deduplication state
//!
//! One dedup table per deduplicated [`ScriptGroup`] maps a canonical
//! 160-bit script hash to its assigned address id. Ids are dense per group
//! and start at 1. First-seen-wins: once a hash maps to an id, every later
//! observation yields the same id.
//!
//! Mutation is single-writer: concurrent [`AddressState::resolve`] calls on
//! the same state are not safe without external serialization, since the
//! lookup, id allocation, and insert are not atomic as a unit. Read-only
//! [`AddressState::find`] calls may run concurrently with each other.

use std::collections::HashMap;

use crate::error::Result;
use crate::types::{Hash160, ScriptGroup};

#[derive(Debug, Clone)]
pub struct AddressState {
    /// Dedup tables, indexed by [`ScriptGroup::index`] for the three
    /// deduplicated groups.
    tables: [HashMap<Hash160, u32>; 3],
    /// Highest id handed out so far, per group (deduplicated or not).
    next_id: [u32; ScriptGroup::COUNT],
}

impl AddressState {
    pub fn new() -> Self {
        Self {
            tables: [HashMap::new(), HashMap::new(), HashMap::new()],
            next_id: [0; ScriptGroup::COUNT],
        }
    }

    fn table(&self, group: ScriptGroup) -> &HashMap<Hash160, u32> {
        debug_assert!(group.is_deduplicated());
        &self.tables[group.index()]
    }

    /// Look up a canonical hash without mutating anything. Returns the
    /// assigned id, or `None` for never-seen hashes and for groups that
    /// carry no dedup table.
    pub fn find(&self, group: ScriptGroup, hash: Hash160) -> Option<u32> {
        if !group.is_deduplicated() {
            return None;
        }
        self.table(group).get(&hash).copied()
    }

    /// Resolve a canonical hash to its id, allocating a fresh one on first
    /// sight. Returns `(id, is_new)`.
    pub fn resolve(&mut self, group: ScriptGroup, hash: Hash160) -> (u32, bool) {
        debug_assert!(group.is_deduplicated(), "resolve on a counter-only group");
        if let Some(num) = self.tables[group.index()].get(&hash) {
            return (*num, false);
        }
        let num = self.allocate(group);
        self.tables[group.index()].insert(hash, num);
        (num, true)
    }

    /// Hand out the next id for `group` without touching any table. This is
    /// the whole resolution path for null-data and nonstandard outputs.
    pub fn allocate(&mut self, group: ScriptGroup) -> u32 {
        self.next_id[group.index()] += 1;
        self.next_id[group.index()]
    }

    /// Number of ids assigned in `group` so far.
    pub fn count(&self, group: ScriptGroup) -> u32 {
        self.next_id[group.index()]
    }
}

impl Default for AddressState {
    fn default() -> Self {
        Self::new()
    }
}

/// Load/flush contract of the external address-index storage engine. The
/// persistence format is the collaborator's business, not this crate's.
pub trait AddressStore {
    fn load(&mut self) -> Result<AddressState>;
    fn flush(&mut self, state: &AddressState) -> Result<()>;
}
