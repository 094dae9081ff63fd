//! Output-script classification, decoding, and address resolution
//!
//! Every observed output script is classified into exactly one
//! [`AddressKind`] by structural pattern match on the raw bytes, decoded
//! into a kind-specific payload, and resolved against [`AddressState`] for
//! a stable address id. [`AnyScriptOutput`] is the closed, kind-tagged
//! union over the per-kind [`ScriptOutput`] variants: adding a kind means
//! adding a variant plus a classification rule, never a subtype.

use bitcoin_hashes::{Hash as BitcoinHash, HashEngine};
use ripemd::Ripemd160;
use sha2::{Digest, Sha256};

use crate::address_state::AddressState;
use crate::error::{ChainError, Result};
use crate::types::{Address, AddressKind, ByteString, Hash160, Hash256, ScriptGroup};

const OP_0: u8 = 0x00;
const OP_PUSHDATA1: u8 = 0x4c;
const OP_PUSHDATA2: u8 = 0x4d;
const OP_PUSHDATA4: u8 = 0x4e;
const OP_1: u8 = 0x51;
const OP_RETURN: u8 = 0x6a;
const OP_DUP: u8 = 0x76;
const OP_EQUAL: u8 = 0x87;
const OP_EQUALVERIFY: u8 = 0x88;
const OP_HASH160: u8 = 0xa9;
const OP_CHECKSIG: u8 = 0xac;
const OP_CHECKMULTISIG: u8 = 0xae;

/// Maximum signer keys in a multisig output. OP_16 is the largest count
/// opcode the parser accepts, which also bounds the nested resolution work.
pub const MAX_MULTISIG_KEYS: usize = 16;

/// RIPEMD160(SHA256(x))
pub fn hash160(data: &[u8]) -> Hash160 {
    let sha256_hash = Sha256::digest(data);
    let ripemd160_hash = Ripemd160::digest(sha256_hash);
    let mut out = [0u8; 20];
    out.copy_from_slice(&ripemd160_hash);
    out
}

/// Decoded payload contract for one address kind.
pub trait ScriptPayload {
    /// Dedup-table scope of this payload's kind.
    const GROUP: ScriptGroup;

    /// Canonical dedup key. `None` for never-deduplicated kinds, which are
    /// new on every observation.
    fn dedup_hash(&self) -> Option<Hash160> {
        None
    }

    /// Structural well-formedness. Invalid payloads are rejected before any
    /// hash or id computation.
    fn is_valid(&self) -> bool {
        true
    }

    /// Resolve addresses nested inside this payload (multisig signer keys).
    /// Called only when the payload itself was newly assigned.
    fn resolve_nested(&mut self, _state: &mut AddressState) -> Result<()> {
        Ok(())
    }

    /// Read-only twin of [`ScriptPayload::resolve_nested`].
    fn check_nested(&mut self, _state: &AddressState) -> Result<()> {
        Ok(())
    }
}

/// A decoded script plus its resolution outcome. Resolved exactly once;
/// the id and newness flag are never touched again afterwards.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScriptOutput<D> {
    pub data: D,
    address_num: u32,
    is_new: bool,
}

impl<D: ScriptPayload> ScriptOutput<D> {
    pub fn new(data: D) -> Self {
        Self {
            data,
            address_num: 0,
            is_new: false,
        }
    }

    /// Assigned address id; 0 until resolved (and 0 after a `check` miss).
    pub fn address_num(&self) -> u32 {
        self.address_num
    }

    /// Whether resolution assigned a fresh id (or, after `check`, whether
    /// the address is absent from the state).
    pub fn is_new(&self) -> bool {
        self.is_new
    }

    pub fn is_valid(&self) -> bool {
        self.data.is_valid()
    }

    /// Assign this output's address id: reuse the group table's id when the
    /// canonical hash was seen before, allocate the next id otherwise.
    /// Kinds without a canonical hash always allocate. Nested addresses are
    /// resolved only on first sight; a dedup hit stops with no further
    /// side effects.
    pub fn resolve(&mut self, state: &mut AddressState) -> Result<()> {
        if !self.data.is_valid() {
            return Err(ChainError::InvalidScript(
                "malformed payload rejected before id assignment".to_string(),
            ));
        }
        match self.data.dedup_hash() {
            Some(hash) => {
                let (num, is_new) = state.resolve(D::GROUP, hash);
                self.address_num = num;
                self.is_new = is_new;
            }
            None => {
                self.address_num = state.allocate(D::GROUP);
                self.is_new = true;
            }
        }
        if self.is_new {
            self.data.resolve_nested(state)?;
        }
        Ok(())
    }

    /// Read-only resolution: report the known id or absence without
    /// allocating or inserting anything. Safe to run concurrently with
    /// other `check` calls, never with a `resolve` on the same state.
    pub fn check(&mut self, state: &AddressState) -> Result<()> {
        if !self.data.is_valid() {
            return Err(ChainError::InvalidScript(
                "malformed payload rejected before lookup".to_string(),
            ));
        }
        match self.data.dedup_hash().and_then(|hash| state.find(D::GROUP, hash)) {
            Some(num) => {
                self.address_num = num;
                self.is_new = false;
            }
            None => {
                self.address_num = 0;
                self.is_new = true;
            }
        }
        self.data.check_nested(state)
    }
}

/// Raw public key observed bare in a pay-to-pubkey output or as a multisig
/// signer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PubkeyData {
    bytes: ByteString,
}

impl PubkeyData {
    pub fn new(bytes: ByteString) -> Self {
        Self { bytes }
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes
    }

    /// hash160 of the serialized key, the canonical identity a key shares
    /// with its pay-to-pubkey-hash and witness-pubkey-hash forms.
    pub fn key_hash(&self) -> Hash160 {
        hash160(&self.bytes)
    }

    /// Whether the bytes parse as a point on the curve. Informational:
    /// structurally plausible keys resolve even when they never were valid
    /// key material.
    pub fn is_fully_valid(&self) -> bool {
        secp256k1::PublicKey::from_slice(&self.bytes).is_ok()
    }
}

impl ScriptPayload for PubkeyData {
    const GROUP: ScriptGroup = ScriptGroup::Pubkey;

    fn dedup_hash(&self) -> Option<Hash160> {
        Some(self.key_hash())
    }

    fn is_valid(&self) -> bool {
        match self.bytes.len() {
            33 => self.bytes[0] == 0x02 || self.bytes[0] == 0x03,
            65 => self.bytes[0] == 0x04,
            _ => false,
        }
    }
}

/// Pay-to-pubkey-hash payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PubkeyHashData {
    pub hash: Hash160,
}

impl ScriptPayload for PubkeyHashData {
    const GROUP: ScriptGroup = ScriptGroup::Pubkey;

    fn dedup_hash(&self) -> Option<Hash160> {
        Some(self.hash)
    }
}

/// Version-0 witness-pubkey-hash payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WitnessPubkeyHashData {
    pub hash: Hash160,
}

impl ScriptPayload for WitnessPubkeyHashData {
    const GROUP: ScriptGroup = ScriptGroup::Pubkey;

    fn dedup_hash(&self) -> Option<Hash160> {
        Some(self.hash)
    }
}

/// Pay-to-script-hash payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ScriptHashData {
    pub hash: Hash160,
}

impl ScriptPayload for ScriptHashData {
    const GROUP: ScriptGroup = ScriptGroup::ScriptHash;

    fn dedup_hash(&self) -> Option<Hash160> {
        Some(self.hash)
    }
}

/// Version-0 witness-script-hash payload. The dedup tables are keyed by
/// 160-bit hashes; the 256-bit program (sha256 of the script) keys by its
/// ripemd160, which equals hash160 of the underlying script. A script
/// wrapped as pay-to-script-hash and as a witness program is therefore one
/// stored address.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WitnessScriptHashData {
    pub hash: Hash256,
}

impl ScriptPayload for WitnessScriptHashData {
    const GROUP: ScriptGroup = ScriptGroup::ScriptHash;

    fn dedup_hash(&self) -> Option<Hash160> {
        let ripemd160_hash = Ripemd160::digest(self.hash);
        let mut out = [0u8; 20];
        out.copy_from_slice(&ripemd160_hash);
        Some(out)
    }
}

/// Bare multisig payload: the declared m-of-n plus the decoded signer set.
/// A multisig address's identity derives only from a complete, well-formed
/// signer set, so validity is checked before any hash or id computation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MultisigData {
    pub required: u8,
    pub total: u8,
    signers: Vec<ScriptOutput<PubkeyData>>,
}

impl MultisigData {
    pub fn new(required: u8, total: u8) -> Self {
        Self {
            required,
            total,
            signers: Vec::new(),
        }
    }

    fn add_signer(&mut self, bytes: &[u8]) {
        // only key-sized pushes count as signers; anything else leaves the
        // decoded count short of the declared total, which invalidates the
        // script
        if bytes.len() == 33 || bytes.len() == 65 {
            self.signers
                .push(ScriptOutput::new(PubkeyData::new(bytes.to_vec())));
        }
    }

    pub fn signers(&self) -> &[ScriptOutput<PubkeyData>] {
        &self.signers
    }
}

impl ScriptPayload for MultisigData {
    const GROUP: ScriptGroup = ScriptGroup::Multisig;

    fn dedup_hash(&self) -> Option<Hash160> {
        let mut engine = bitcoin_hashes::hash160::Hash::engine();
        engine.input(&[self.required, self.total]);
        for signer in &self.signers {
            engine.input(signer.data.as_bytes());
        }
        Some(bitcoin_hashes::hash160::Hash::from_engine(engine).into_inner())
    }

    fn is_valid(&self) -> bool {
        self.required >= 1
            && self.required <= self.total
            && self.signers.len() == usize::from(self.total)
            && self.signers.iter().all(|signer| signer.is_valid())
    }

    fn resolve_nested(&mut self, state: &mut AddressState) -> Result<()> {
        // each signer key resolves as its own pay-to-pubkey output; the
        // signer count bounds this recursion at one level of at most
        // MAX_MULTISIG_KEYS keys
        for signer in &mut self.signers {
            signer.resolve(state)?;
        }
        Ok(())
    }

    fn check_nested(&mut self, state: &AddressState) -> Result<()> {
        for signer in &mut self.signers {
            signer.check(state)?;
        }
        Ok(())
    }
}

/// OP_RETURN payload: the raw data carried after the opcode. Never
/// deduplicated.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NullDataData {
    pub data: ByteString,
}

impl ScriptPayload for NullDataData {
    const GROUP: ScriptGroup = ScriptGroup::NullData;
}

/// Fallback for every script shape the classifier does not recognize.
/// Never deduplicated.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NonstandardData {
    pub script: ByteString,
}

impl ScriptPayload for NonstandardData {
    const GROUP: ScriptGroup = ScriptGroup::Nonstandard;
}

/// Closed, kind-tagged union over all decoded output variants.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AnyScriptOutput {
    Pubkey(ScriptOutput<PubkeyData>),
    PubkeyHash(ScriptOutput<PubkeyHashData>),
    ScriptHash(ScriptOutput<ScriptHashData>),
    WitnessPubkeyHash(ScriptOutput<WitnessPubkeyHashData>),
    WitnessScriptHash(ScriptOutput<WitnessScriptHashData>),
    Multisig(ScriptOutput<MultisigData>),
    NullData(ScriptOutput<NullDataData>),
    Nonstandard(ScriptOutput<NonstandardData>),
}

impl AnyScriptOutput {
    /// Classify a raw scriptPubKey into exactly one kind and decode its
    /// payload. Witness shapes only classify once `witness_activated` is
    /// set; before that they fall through to nonstandard. A recognized
    /// multisig frame with a malformed signer set still classifies as
    /// multisig; it is rejected at resolve time, never silently reshaped.
    pub fn classify(script: &[u8], witness_activated: bool) -> Self {
        if script.len() == 25
            && script[0] == OP_DUP
            && script[1] == OP_HASH160
            && script[2] == 20
            && script[23] == OP_EQUALVERIFY
            && script[24] == OP_CHECKSIG
        {
            let mut hash = [0u8; 20];
            hash.copy_from_slice(&script[3..23]);
            return AnyScriptOutput::PubkeyHash(ScriptOutput::new(PubkeyHashData { hash }));
        }

        if script.len() == 23 && script[0] == OP_HASH160 && script[1] == 20 && script[22] == OP_EQUAL
        {
            let mut hash = [0u8; 20];
            hash.copy_from_slice(&script[2..22]);
            return AnyScriptOutput::ScriptHash(ScriptOutput::new(ScriptHashData { hash }));
        }

        if witness_activated && script.len() == 22 && script[0] == OP_0 && script[1] == 20 {
            let mut hash = [0u8; 20];
            hash.copy_from_slice(&script[2..22]);
            return AnyScriptOutput::WitnessPubkeyHash(ScriptOutput::new(WitnessPubkeyHashData {
                hash,
            }));
        }

        if witness_activated && script.len() == 34 && script[0] == OP_0 && script[1] == 32 {
            let mut hash = [0u8; 32];
            hash.copy_from_slice(&script[2..34]);
            return AnyScriptOutput::WitnessScriptHash(ScriptOutput::new(WitnessScriptHashData {
                hash,
            }));
        }

        if (script.len() == 35 && script[0] == 33 && script[34] == OP_CHECKSIG)
            || (script.len() == 67 && script[0] == 65 && script[66] == OP_CHECKSIG)
        {
            let key_len = script[0] as usize;
            return AnyScriptOutput::Pubkey(ScriptOutput::new(PubkeyData::new(
                script[1..1 + key_len].to_vec(),
            )));
        }

        if !script.is_empty() && script[0] == OP_RETURN {
            return AnyScriptOutput::NullData(ScriptOutput::new(NullDataData {
                data: script[1..].to_vec(),
            }));
        }

        if let Some(multisig) = parse_multisig(script) {
            return AnyScriptOutput::Multisig(ScriptOutput::new(multisig));
        }

        AnyScriptOutput::Nonstandard(ScriptOutput::new(NonstandardData {
            script: script.to_vec(),
        }))
    }

    pub fn kind(&self) -> AddressKind {
        match self {
            AnyScriptOutput::Pubkey(_) => AddressKind::Pubkey,
            AnyScriptOutput::PubkeyHash(_) => AddressKind::PubkeyHash,
            AnyScriptOutput::ScriptHash(_) => AddressKind::ScriptHash,
            AnyScriptOutput::WitnessPubkeyHash(_) => AddressKind::WitnessPubkeyHash,
            AnyScriptOutput::WitnessScriptHash(_) => AddressKind::WitnessScriptHash,
            AnyScriptOutput::Multisig(_) => AddressKind::Multisig,
            AnyScriptOutput::NullData(_) => AddressKind::NullData,
            AnyScriptOutput::Nonstandard(_) => AddressKind::Nonstandard,
        }
    }

    /// The resolved address identity (id 0 before resolution).
    pub fn address(&self) -> Address {
        Address {
            num: self.address_num(),
            kind: self.kind(),
        }
    }

    pub fn address_num(&self) -> u32 {
        match self {
            AnyScriptOutput::Pubkey(out) => out.address_num(),
            AnyScriptOutput::PubkeyHash(out) => out.address_num(),
            AnyScriptOutput::ScriptHash(out) => out.address_num(),
            AnyScriptOutput::WitnessPubkeyHash(out) => out.address_num(),
            AnyScriptOutput::WitnessScriptHash(out) => out.address_num(),
            AnyScriptOutput::Multisig(out) => out.address_num(),
            AnyScriptOutput::NullData(out) => out.address_num(),
            AnyScriptOutput::Nonstandard(out) => out.address_num(),
        }
    }

    pub fn is_new(&self) -> bool {
        match self {
            AnyScriptOutput::Pubkey(out) => out.is_new(),
            AnyScriptOutput::PubkeyHash(out) => out.is_new(),
            AnyScriptOutput::ScriptHash(out) => out.is_new(),
            AnyScriptOutput::WitnessPubkeyHash(out) => out.is_new(),
            AnyScriptOutput::WitnessScriptHash(out) => out.is_new(),
            AnyScriptOutput::Multisig(out) => out.is_new(),
            AnyScriptOutput::NullData(out) => out.is_new(),
            AnyScriptOutput::Nonstandard(out) => out.is_new(),
        }
    }

    pub fn is_valid(&self) -> bool {
        match self {
            AnyScriptOutput::Pubkey(out) => out.is_valid(),
            AnyScriptOutput::PubkeyHash(out) => out.is_valid(),
            AnyScriptOutput::ScriptHash(out) => out.is_valid(),
            AnyScriptOutput::WitnessPubkeyHash(out) => out.is_valid(),
            AnyScriptOutput::WitnessScriptHash(out) => out.is_valid(),
            AnyScriptOutput::Multisig(out) => out.is_valid(),
            AnyScriptOutput::NullData(out) => out.is_valid(),
            AnyScriptOutput::Nonstandard(out) => out.is_valid(),
        }
    }

    /// Resolve this output's address id (and any nested signer ids) against
    /// the state. Single-writer: callers serialize `resolve` calls per
    /// state.
    pub fn resolve(&mut self, state: &mut AddressState) -> Result<()> {
        match self {
            AnyScriptOutput::Pubkey(out) => out.resolve(state),
            AnyScriptOutput::PubkeyHash(out) => out.resolve(state),
            AnyScriptOutput::ScriptHash(out) => out.resolve(state),
            AnyScriptOutput::WitnessPubkeyHash(out) => out.resolve(state),
            AnyScriptOutput::WitnessScriptHash(out) => out.resolve(state),
            AnyScriptOutput::Multisig(out) => out.resolve(state),
            AnyScriptOutput::NullData(out) => out.resolve(state),
            AnyScriptOutput::Nonstandard(out) => out.resolve(state),
        }
    }

    /// Read-only resolution for verification passes that must not allocate
    /// ids as a side effect.
    pub fn check(&mut self, state: &AddressState) -> Result<()> {
        match self {
            AnyScriptOutput::Pubkey(out) => out.check(state),
            AnyScriptOutput::PubkeyHash(out) => out.check(state),
            AnyScriptOutput::ScriptHash(out) => out.check(state),
            AnyScriptOutput::WitnessPubkeyHash(out) => out.check(state),
            AnyScriptOutput::WitnessScriptHash(out) => out.check(state),
            AnyScriptOutput::Multisig(out) => out.check(state),
            AnyScriptOutput::NullData(out) => out.check(state),
            AnyScriptOutput::Nonstandard(out) => out.check(state),
        }
    }
}

/// Shorthand for callers that only need the kind tag (building declared
/// output metadata, for instance).
pub fn classify_kind(script: &[u8], witness_activated: bool) -> AddressKind {
    AnyScriptOutput::classify(script, witness_activated).kind()
}

/// Parse `OP_m <key>... OP_n OP_CHECKMULTISIG`. Returns `None` when the
/// frame itself is not multisig-shaped; returns a (possibly invalid)
/// payload when it is; truncated or non-key pushes leave the signer count
/// short and are rejected at resolve time.
fn parse_multisig(script: &[u8]) -> Option<MultisigData> {
    if script.len() < 3 || script[script.len() - 1] != OP_CHECKMULTISIG {
        return None;
    }
    let max_count_op = OP_1 + MAX_MULTISIG_KEYS as u8 - 1;
    let required_op = script[0];
    let total_op = script[script.len() - 2];
    if !(OP_1..=max_count_op).contains(&required_op) || !(OP_1..=max_count_op).contains(&total_op) {
        return None;
    }

    let mut data = MultisigData::new(required_op - OP_1 + 1, total_op - OP_1 + 1);
    let mut pos = 1;
    let end = script.len() - 2;
    while pos < end {
        match read_push(script, end, pos) {
            Some((bytes, next)) => {
                data.add_signer(bytes);
                pos = next;
            }
            // a non-push opcode or truncated push: stop scanning, the
            // signer count stays short and validity fails
            None => break,
        }
    }
    Some(data)
}

/// Read one push operation starting at `pos`, bounded by `end`.
fn read_push(script: &[u8], end: usize, pos: usize) -> Option<(&[u8], usize)> {
    let opcode = *script.get(pos)?;
    let (len, data_start) = match opcode {
        1..=75 => (usize::from(opcode), pos + 1),
        OP_PUSHDATA1 => (usize::from(*script.get(pos + 1)?), pos + 2),
        OP_PUSHDATA2 => {
            let lo = *script.get(pos + 1)?;
            let hi = *script.get(pos + 2)?;
            (usize::from(u16::from_le_bytes([lo, hi])), pos + 3)
        }
        OP_PUSHDATA4 => {
            let mut len_bytes = [0u8; 4];
            len_bytes.copy_from_slice(script.get(pos + 1..pos + 5)?);
            (u32::from_le_bytes(len_bytes) as usize, pos + 5)
        }
        _ => return None,
    };
    let data_end = data_start.checked_add(len)?;
    if data_end > end {
        return None;
    }
    Some((&script[data_start..data_end], data_end))
}
