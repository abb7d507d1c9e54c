//! Deputy roster and slot scheduler (component C4).
//!
//! The roster is kept as an ordered sequence of "nodes effective from
//! height H" records rather than a single current list, so that a replica
//! replaying history can always ask "who were the deputies at height N".
//! [`RosterManager`] is an explicit value threaded through the miner and
//! chain (never a process-global singleton): a node running more than one
//! chain, or replaying history in a test, must be able to hold more than
//! one roster at a time.

use crate::codec::Encode;
use crate::params::{SNAPSHOT_INTERVAL, TRANSITION_PERIOD};
use crate::{Address, Error, Height, Result};
use serde::{Deserialize, Serialize};
use std::net::IpAddr;

/// A single member of the deputy roster.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeputyNode {
    pub miner_address: Address,
    /// Uncompressed public key tail identifying the node on the network,
    /// always exactly 64 bytes.
    pub node_id: Vec<u8>,
    pub ip: IpAddr,
    pub port: u32,
    /// Vote-sorted rank within the roster, starting from 0.
    pub rank: u32,
    pub votes: u32,
}

impl DeputyNode {
    /// Validates field-level invariants: `node_id` must be exactly 64 bytes
    /// and `port` must fit in a `u16`.
    pub fn check(&self) -> Result<()> {
        if self.node_id.len() != 64 {
            return Err(Error::InvalidDeputyNode("node_id must be 64 bytes"));
        }
        if self.port > 65535 {
            return Err(Error::InvalidDeputyNode("port exceeds 65535"));
        }
        Ok(())
    }

    fn ip_octets(&self) -> Vec<u8> {
        match self.ip {
            IpAddr::V4(v4) => v4.octets().to_vec(),
            IpAddr::V6(v6) => v6.octets().to_vec(),
        }
    }

    pub fn hash(&self) -> crate::Hash {
        let mut payload = Vec::new();
        self.miner_address.encode(&mut payload);
        self.node_id.encode(&mut payload);
        self.ip_octets().encode(&mut payload);
        self.port.encode(&mut payload);
        self.rank.encode(&mut payload);
        self.votes.encode(&mut payload);
        crate::codec::keccak256(&payload)
    }
}

impl Encode for DeputyNode {
    fn encode(&self, out: &mut Vec<u8>) {
        let mut payload = Vec::new();
        self.miner_address.encode(&mut payload);
        self.node_id.encode(&mut payload);
        self.ip_octets().encode(&mut payload);
        self.port.encode(&mut payload);
        self.rank.encode(&mut payload);
        self.votes.encode(&mut payload);
        out.push(0x01u8);
        out.extend_from_slice(&(payload.len() as u32).to_be_bytes());
        out.extend_from_slice(&payload);
    }
}

struct DeputyNodesRecord {
    height: Height,
    nodes: Vec<DeputyNode>,
}

/// Roster manager: a sequence of deputy lists, each keyed by the height at
/// which it becomes effective. Held as an explicit value by whatever owns a
/// chain, never as a global.
#[derive(Default)]
pub struct RosterManager {
    records: Vec<DeputyNodesRecord>,
}

impl RosterManager {
    pub fn new() -> Self {
        Self { records: Vec::new() }
    }

    /// Registers `nodes` as effective starting at `height`. Heights must be
    /// added in strictly increasing order.
    pub fn add(&mut self, height: Height, nodes: Vec<DeputyNode>) {
        if let Some(last) = self.records.last() {
            assert!(
                height > last.height,
                "deputy roster heights must be strictly increasing"
            );
        }
        self.records.push(DeputyNodesRecord { height, nodes });
    }

    /// The deputy list effective at `height`: the greatest record whose
    /// `height` is `<= height`, or the last record if `height` is beyond
    /// every registered boundary.
    fn deputies_at(&self, height: Height) -> &[DeputyNode] {
        for window in self.records.windows(2) {
            if window[0].height <= height && window[1].height > height {
                return &window[0].nodes;
            }
        }
        self.records
            .last()
            .map(|r| r.nodes.as_slice())
            .unwrap_or(&[])
    }

    /// Number of deputies in the roster's first (genesis) record. Reads only
    /// the genesis list even when later snapshots change the roster size —
    /// this mirrors the node count used to reduce `slot()` modulo, which is
    /// intentionally fixed at genesis for the lifetime of the chain.
    pub fn count(&self) -> usize {
        self.records.first().map(|r| r.nodes.len()).unwrap_or(0)
    }

    pub fn deputy_by_address(&self, height: Height, address: &Address) -> Option<&DeputyNode> {
        self.deputies_at(height)
            .iter()
            .find(|n| &n.miner_address == address)
    }

    pub fn deputy_by_node_id(&self, height: Height, node_id: &[u8]) -> Option<&DeputyNode> {
        self.deputies_at(height).iter().find(|n| n.node_id == node_id)
    }

    /// Distance, in slots, between the deputy that produced the previous
    /// block (`prev_miner`) and the deputy about to produce the next one
    /// (`next_miner`) at `height`.
    ///
    /// At the genesis block and at the first height past a snapshot
    /// transition window, the schedule restarts from `next_miner`'s own rank
    /// rather than the gap between the two miners, since there is no
    /// meaningful "previous" miner to measure from in those cases.
    pub fn slot(&self, height: Height, prev_miner: Address, next_miner: Address) -> Result<i64> {
        let next_node = self.deputy_by_address(height, &next_miner);

        let restarts_schedule = height == 1
            || (height > SNAPSHOT_INTERVAL && height % SNAPSHOT_INTERVAL == TRANSITION_PERIOD + 1);
        if restarts_schedule {
            if let Some(next_node) = next_node {
                return Ok(next_node.rank as i64 + 1);
            }
        }

        let prev_node = self.deputy_by_address(height, &prev_miner);
        let (Some(prev_node), Some(next_node)) = (prev_node, next_node) else {
            return Err(Error::RosterMissing);
        };

        let node_count = self.count() as i64;
        if node_count == 1 {
            return Ok(1);
        }
        if node_count == 0 {
            return Err(Error::RosterMissing);
        }
        Ok(((next_node.rank as i64 - prev_node.rank as i64) % node_count + node_count) % node_count)
    }

    /// Whether `height` is the block at which rewards for a just-retired
    /// roster record are handed out: exactly 1001 blocks past that record's
    /// effective height.
    pub fn time_to_pay_rewards(&self, height: Height) -> bool {
        self.records
            .iter()
            .skip(1)
            .any(|record| record.height + TRANSITION_PERIOD + 1 == height)
    }
}
