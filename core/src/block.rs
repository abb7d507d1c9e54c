//! Canonical data model: transactions, headers, blocks, events and the
//! bloom filter (component of C6/C7, external interfaces in spec §6).

use crate::account::ChangeLog;
use crate::codec::{keccak256, Encode};
use crate::deputy::DeputyNode;
use crate::params::MAX_EXTRA_LENGTH;
use crate::{Address, Hash};
use num_bigint::BigUint;
use serde::{Deserialize, Serialize};

/// A signed (or about-to-be-signed) transfer / contract invocation.
///
/// Immutable once signed: `hash()` is stable for the lifetime of the value.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Transaction {
    /// Recipient address; absent means contract creation.
    pub to: Option<Address>,
    pub value: BigUint,
    pub gas_limit: u64,
    pub gas_price: BigUint,
    pub data: Vec<u8>,
    /// Replay-protection domain; 200 is reserved for the test harness.
    pub chain_id: u16,
    /// Seconds-since-epoch after which the transaction is rejected.
    pub expiration: u64,
    pub note: String,
    pub label: String,
    pub v: u64,
    pub r: [u8; 32],
    pub s: [u8; 32],
}

impl Transaction {
    /// Canonical fields covered by the signing digest, in wire order,
    /// omitting `v`, `r`, `s`.
    fn encode_unsigned(&self, out: &mut Vec<u8>) {
        let mut payload = Vec::new();
        self.to.encode(&mut payload);
        self.value.encode(&mut payload);
        self.gas_limit.encode(&mut payload);
        self.gas_price.encode(&mut payload);
        self.data.encode(&mut payload);
        self.chain_id.encode(&mut payload);
        self.expiration.encode(&mut payload);
        self.note.encode(&mut payload);
        self.label.encode(&mut payload);
        let tag = 0x01u8; // list tag, matches codec::TAG_LIST layout
        out.push(tag);
        out.extend_from_slice(&(payload.len() as u32).to_be_bytes());
        out.extend_from_slice(&payload);
    }

    /// The digest signed by [`crate::signer::sign`]; excludes `v, r, s`.
    pub fn signing_hash(&self) -> Hash {
        let mut buf = Vec::new();
        self.encode_unsigned(&mut buf);
        keccak256(&buf)
    }

    /// Whether the caller intends contract creation (`to` is absent).
    pub fn is_contract_creation(&self) -> bool {
        self.to.is_none()
    }

    /// Maximum fee the sender can be charged: `gas_limit * gas_price`.
    pub fn max_fee(&self) -> BigUint {
        BigUint::from(self.gas_limit) * &self.gas_price
    }

    /// Total cost a sender must have available: `value + max_fee()`.
    pub fn cost(&self) -> BigUint {
        &self.value + self.max_fee()
    }
}

impl Encode for Transaction {
    fn encode(&self, out: &mut Vec<u8>) {
        let mut payload = Vec::new();
        self.to.encode(&mut payload);
        self.value.encode(&mut payload);
        self.gas_limit.encode(&mut payload);
        self.gas_price.encode(&mut payload);
        self.data.encode(&mut payload);
        self.chain_id.encode(&mut payload);
        self.expiration.encode(&mut payload);
        self.note.encode(&mut payload);
        self.label.encode(&mut payload);
        self.v.encode(&mut payload);
        self.r.encode(&mut payload);
        self.s.encode(&mut payload);
        out.push(0x01u8);
        out.extend_from_slice(&(payload.len() as u32).to_be_bytes());
        out.extend_from_slice(&payload);
    }
}

impl Transaction {
    /// Stable identity hash: Keccak-256 of the full canonical encoding,
    /// including `v, r, s`.
    pub fn hash(&self) -> Hash {
        crate::codec::hash_encoded(self)
    }
}

pub type Transactions = Vec<Transaction>;

/// 2048-bit bloom filter over event addresses and topics.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Bloom(pub [u8; 256]);

impl Default for Bloom {
    fn default() -> Self {
        Bloom([0u8; 256])
    }
}

// `serde`'s array support tops out at 32 elements; bloom filters are 256
// bytes, so (de)serialize through a byte-slice/Vec instead of deriving.
impl Serialize for Bloom {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> core::result::Result<S::Ok, S::Error> {
        serializer.serialize_bytes(&self.0)
    }
}

impl<'de> Deserialize<'de> for Bloom {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> core::result::Result<Self, D::Error> {
        let bytes: Vec<u8> = serde::Deserialize::deserialize(deserializer)?;
        if bytes.len() != 256 {
            return Err(serde::de::Error::invalid_length(bytes.len(), &"256"));
        }
        let mut arr = [0u8; 256];
        arr.copy_from_slice(&bytes);
        Ok(Bloom(arr))
    }
}

impl Bloom {
    fn set_from_hash(&mut self, h: &Hash) {
        // Three pairs of bytes at fixed offsets, each taken mod 2048.
        for pair_offset in [0usize, 2, 4] {
            let word = u16::from_be_bytes([h[pair_offset], h[pair_offset + 1]]);
            let bit = (word as usize) % 2048;
            self.0[bit / 8] |= 1 << (bit % 8);
        }
    }

    pub fn add(&mut self, address: &Address) {
        self.set_from_hash(&keccak256(address));
    }

    pub fn add_topic(&mut self, topic: &Hash) {
        self.set_from_hash(&keccak256(topic));
    }

    fn contains_hash(&self, h: &Hash) -> bool {
        for pair_offset in [0usize, 2, 4] {
            let word = u16::from_be_bytes([h[pair_offset], h[pair_offset + 1]]);
            let bit = (word as usize) % 2048;
            if self.0[bit / 8] & (1 << (bit % 8)) == 0 {
                return false;
            }
        }
        true
    }

    pub fn contains_address(&self, address: &Address) -> bool {
        self.contains_hash(&keccak256(address))
    }

    pub fn contains_topic(&self, topic: &Hash) -> bool {
        self.contains_hash(&keccak256(topic))
    }

    /// Builds the bloom filter for a full batch of events.
    pub fn from_events(events: &[Event]) -> Bloom {
        let mut bloom = Bloom::default();
        for event in events {
            bloom.add(&event.address);
            for topic in &event.topics {
                bloom.add_topic(topic);
            }
        }
        bloom
    }
}

/// A contract log. Only `address`, `topics` and `data` enter `event_root`;
/// the remaining fields are derived context filled in by the node.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Event {
    pub address: Address,
    pub topics: Vec<Hash>,
    pub data: Vec<u8>,
    pub block_height: u32,
    pub tx_hash: Hash,
    pub tx_index: u32,
    pub block_hash: Hash,
    pub index: u32,
    pub removed: bool,
}

impl Encode for Event {
    fn encode(&self, out: &mut Vec<u8>) {
        // Only the consensus subset is hashed into event_root.
        let mut payload = Vec::new();
        self.address.encode(&mut payload);
        self.topics.encode(&mut payload);
        self.data.encode(&mut payload);
        out.push(0x01u8);
        out.extend_from_slice(&(payload.len() as u32).to_be_bytes());
        out.extend_from_slice(&payload);
    }
}

/// Block header. `hash()` covers every field except `sign_data`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Header {
    pub parent_hash: Hash,
    pub miner_address: Address,
    pub version_root: Hash,
    pub tx_root: Hash,
    pub log_root: Hash,
    pub event_root: Hash,
    pub bloom: Bloom,
    pub height: u32,
    pub gas_limit: u64,
    pub gas_used: u64,
    pub time: u32,
    pub extra: Vec<u8>,
    pub deputy_root: Hash,
    pub sign_data: Vec<u8>,
}

impl Header {
    fn encode_unsigned(&self, out: &mut Vec<u8>) {
        assert!(self.extra.len() <= MAX_EXTRA_LENGTH, "extra exceeds 256 bytes");
        let mut payload = Vec::new();
        self.parent_hash.encode(&mut payload);
        self.miner_address.encode(&mut payload);
        self.version_root.encode(&mut payload);
        self.tx_root.encode(&mut payload);
        self.log_root.encode(&mut payload);
        self.event_root.encode(&mut payload);
        self.bloom.0.encode(&mut payload);
        self.height.encode(&mut payload);
        self.gas_limit.encode(&mut payload);
        self.gas_used.encode(&mut payload);
        self.time.encode(&mut payload);
        self.extra.encode(&mut payload);
        self.deputy_root.encode(&mut payload);
        out.push(0x01u8);
        out.extend_from_slice(&(payload.len() as u32).to_be_bytes());
        out.extend_from_slice(&payload);
    }

    /// Hash over every field except `sign_data`; this is both the block
    /// identity and what the proposer signs.
    pub fn hash(&self) -> Hash {
        let mut buf = Vec::new();
        self.encode_unsigned(&mut buf);
        keccak256(&buf)
    }
}

/// Header + the batch it seals: transactions, change logs, events and the
/// deputy-node list effective at this height.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Block {
    pub header: Header,
    pub transactions: Transactions,
    pub change_logs: Vec<ChangeLog>,
    pub events: Vec<Event>,
    pub deputy_nodes: Vec<DeputyNode>,
}

impl Block {
    pub fn new(
        header: Header,
        transactions: Transactions,
        change_logs: Vec<ChangeLog>,
        events: Vec<Event>,
        deputy_nodes: Vec<DeputyNode>,
    ) -> Self {
        Self {
            header,
            transactions,
            change_logs,
            events,
            deputy_nodes,
        }
    }

    pub fn hash(&self) -> Hash {
        self.header.hash()
    }

    pub fn height(&self) -> u32 {
        self.header.height
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_tx() -> Transaction {
        Transaction {
            to: Some([0x10u8; 20]),
            value: BigUint::from(1u32),
            gas_limit: 2_000_000,
            gas_price: BigUint::from(2u32),
            data: vec![0x0c],
            chain_id: 200,
            expiration: 1_700_000_000,
            note: String::new(),
            label: String::new(),
            v: 0,
            r: [0u8; 32],
            s: [0u8; 32],
        }
    }

    #[test]
    fn signing_hash_ignores_signature_fields() {
        let mut tx = sample_tx();
        let h1 = tx.signing_hash();
        tx.v = 42;
        tx.r = [9u8; 32];
        tx.s = [9u8; 32];
        let h2 = tx.signing_hash();
        assert_eq!(h1, h2);
    }

    #[test]
    fn full_hash_is_sensitive_to_signature_fields() {
        let mut tx = sample_tx();
        let h1 = tx.hash();
        tx.v = 42;
        let h2 = tx.hash();
        assert_ne!(h1, h2);
    }

    #[test]
    fn header_hash_ignores_sign_data() {
        let mut header = Header {
            parent_hash: [0u8; 32],
            miner_address: [1u8; 20],
            version_root: [2u8; 32],
            tx_root: [3u8; 32],
            log_root: [4u8; 32],
            event_root: [5u8; 32],
            bloom: Bloom::default(),
            height: 1,
            gas_limit: 1_000_000,
            gas_used: 0,
            time: 1_538_209_751,
            extra: Vec::new(),
            deputy_root: [6u8; 32],
            sign_data: Vec::new(),
        };
        let h1 = header.hash();
        header.sign_data = vec![1, 2, 3];
        let h2 = header.hash();
        assert_eq!(h1, h2);
    }

    #[test]
    fn bloom_contains_every_event_address_and_topic() {
        let event = Event {
            address: [7u8; 20],
            topics: vec![[8u8; 32], [9u8; 32]],
            data: vec![],
            block_height: 1,
            tx_hash: [0u8; 32],
            tx_index: 0,
            block_hash: [0u8; 32],
            index: 0,
            removed: false,
        };
        let bloom = Bloom::from_events(std::slice::from_ref(&event));
        assert!(bloom.contains_address(&event.address));
        for topic in &event.topics {
            assert!(bloom.contains_topic(topic));
        }
    }
}
