//! Core chain and address types

use serde::{Deserialize, Serialize};

/// 160-bit hash (RIPEMD160 of SHA256, or a 20-byte witness program)
pub type Hash160 = [u8; 20];

/// 256-bit hash
pub type Hash256 = [u8; 32];

/// Block height within one chain
pub type BlockHeight = u32;

/// Chain-global transaction index
pub type TxIndex = u32;

/// Byte string type
pub type ByteString = Vec<u8>;

/// The fixed set of recognized output-script shapes.
///
/// New kinds are added as new variants plus a classification rule in
/// [`crate::script::AnyScriptOutput::classify`], never by subtyping.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum AddressKind {
    Pubkey,
    PubkeyHash,
    ScriptHash,
    WitnessPubkeyHash,
    WitnessScriptHash,
    Multisig,
    NullData,
    Nonstandard,
}

impl AddressKind {
    /// The dedup-table scope this kind resolves in. Key-bearing kinds share
    /// the pubkey group (the same key observed bare, hashed, or as a witness
    /// program yields one address id); both script-hash forms share the
    /// script-hash group.
    pub fn dedup_group(self) -> ScriptGroup {
        match self {
            AddressKind::Pubkey | AddressKind::PubkeyHash | AddressKind::WitnessPubkeyHash => {
                ScriptGroup::Pubkey
            }
            AddressKind::ScriptHash | AddressKind::WitnessScriptHash => ScriptGroup::ScriptHash,
            AddressKind::Multisig => ScriptGroup::Multisig,
            AddressKind::NullData => ScriptGroup::NullData,
            AddressKind::Nonstandard => ScriptGroup::Nonstandard,
        }
    }

    /// Whether repeated observations of this kind reuse one address id.
    pub fn is_deduplicated(self) -> bool {
        self.dedup_group().is_deduplicated()
    }
}

/// Scope of one address id space. Ids are dense and monotonically increasing
/// per group; the first three groups carry a dedup table, the last two are
/// counters only (every observation is a fresh address).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ScriptGroup {
    Pubkey,
    ScriptHash,
    Multisig,
    NullData,
    Nonstandard,
}

impl ScriptGroup {
    pub const COUNT: usize = 5;

    pub fn index(self) -> usize {
        match self {
            ScriptGroup::Pubkey => 0,
            ScriptGroup::ScriptHash => 1,
            ScriptGroup::Multisig => 2,
            ScriptGroup::NullData => 3,
            ScriptGroup::Nonstandard => 4,
        }
    }

    pub fn is_deduplicated(self) -> bool {
        matches!(
            self,
            ScriptGroup::Pubkey | ScriptGroup::ScriptHash | ScriptGroup::Multisig
        )
    }
}

/// A resolved address identity: the assigned id plus the kind it was
/// observed as. Ids start at 1; 0 marks "not found" in the check protocol.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Address {
    pub num: u32,
    pub kind: AddressKind,
}

/// One transaction output as the chain backend hands it out: the raw
/// scriptPubKey bytes plus the backend's declared classification.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RawOutput {
    pub value: i64,
    pub script_pubkey: ByteString,
    pub kind: AddressKind,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_key_bearing_kinds_share_pubkey_group() {
        assert_eq!(AddressKind::Pubkey.dedup_group(), ScriptGroup::Pubkey);
        assert_eq!(AddressKind::PubkeyHash.dedup_group(), ScriptGroup::Pubkey);
        assert_eq!(
            AddressKind::WitnessPubkeyHash.dedup_group(),
            ScriptGroup::Pubkey
        );
    }

    #[test]
    fn test_script_hash_kinds_share_group() {
        assert_eq!(
            AddressKind::ScriptHash.dedup_group(),
            ScriptGroup::ScriptHash
        );
        assert_eq!(
            AddressKind::WitnessScriptHash.dedup_group(),
            ScriptGroup::ScriptHash
        );
    }

    #[test]
    fn test_data_kinds_never_deduplicate() {
        assert!(!AddressKind::NullData.is_deduplicated());
        assert!(!AddressKind::Nonstandard.is_deduplicated());
        assert!(AddressKind::Multisig.is_deduplicated());
    }

    #[test]
    fn test_group_indices_are_distinct() {
        let groups = [
            ScriptGroup::Pubkey,
            ScriptGroup::ScriptHash,
            ScriptGroup::Multisig,
            ScriptGroup::NullData,
            ScriptGroup::Nonstandard,
        ];
        for (i, g) in groups.iter().enumerate() {
            assert_eq!(g.index(), i);
        }
    }
}
