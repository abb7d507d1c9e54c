//! Miner (component C7): the slot-aware timer that decides when this node
//! should propose a block, and the sealing pipeline that turns pending
//! transactions into one.
//!
//! [`Miner::modify_timer`] is pure decision logic (no I/O, no sleeping) so
//! it can be tested directly: given the chain's current block and the
//! deputy roster, it decides whether to mine immediately, arm a timer for
//! some number of milliseconds, or leave the existing timer alone. The
//! event loop in [`Miner::run`] is the only place that actually sleeps.

use crate::block::{Block, Bloom, Header};
use crate::chain::Chain;
use crate::deputy::{DeputyNode, RosterManager};
use crate::params::{
    GAS_LIMIT_BOUND_DIVISOR, MAX_TXS_PER_SEAL, MIN_GAS_LIMIT, REWARD_ADDRESS_REFRESH_INTERVAL,
    TARGET_GAS_LIMIT,
};
use crate::tx_pool::TxPool;
use crate::vm::Vm;
use crate::{processor::TxProcessor, Address, Height, Result};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast;

/// Lifecycle state of a [`Miner`]'s event loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MinerState {
    /// Constructed but `run` has not been called, or `stop` was called and
    /// `run` returned.
    Idle,
    /// `run` is live and the timer is being driven.
    Armed,
    /// Actively applying transactions and signing a header.
    Sealing,
    /// `stop` was requested; the loop will exit at its next iteration.
    Stopped,
}

/// What [`Miner::modify_timer`] decided to do about the block-mine timer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimerDecision {
    /// This node isn't due to produce a block soon; leave any existing
    /// timer running untouched.
    Skip,
    /// It's this node's turn right now.
    MineNow,
    /// Arm (or re-arm) the timer for this many milliseconds.
    WaitMs(i64),
}

/// Fixed parameters the miner needs beyond the chain/pool/roster it's
/// handed at construction.
pub struct MinerConfig {
    pub block_interval_ms: i64,
    pub slot_timeout_ms: i64,
    pub private_key: [u8; 32],
    pub miner_address: Address,
    pub self_node_id: Vec<u8>,
    pub extra: Vec<u8>,
}

pub struct Miner<V: Vm> {
    config: MinerConfig,
    chain: Chain,
    tx_pool: Arc<TxPool>,
    processor: TxProcessor<V>,
    roster: RosterManager,
    state: MinerState,
    mined_blocks: broadcast::Sender<Block>,
}

impl<V: Vm> Miner<V> {
    pub fn new(config: MinerConfig, chain: Chain, tx_pool: Arc<TxPool>, processor: TxProcessor<V>, roster: RosterManager) -> Self {
        let (mined_blocks, _) = broadcast::channel(16);
        Self {
            config,
            chain,
            tx_pool,
            processor,
            roster,
            state: MinerState::Idle,
            mined_blocks,
        }
    }

    pub fn state(&self) -> MinerState {
        self.state
    }

    /// A fresh receiver that observes every block this miner seals from
    /// this point on.
    pub fn mined_blocks(&self) -> broadcast::Receiver<Block> {
        self.mined_blocks.subscribe()
    }

    pub fn stop(&mut self) {
        self.state = MinerState::Stopped;
    }

    fn is_self_deputy_node(&self, height: Height) -> bool {
        self.roster
            .deputy_by_node_id(height, &self.config.self_node_id)
            .is_some()
    }

    /// Milliseconds since the current block's timestamp, or
    /// `block_interval_ms` if that block has no timestamp yet (height 0
    /// seen before genesis time is known).
    fn time_span_ms(&self, current: &Block) -> i64 {
        let last = current.header.time as i64;
        if last == 0 {
            return self.config.block_interval_ms;
        }
        (crate::now_ts() as i64 - last) * 1000
    }

    /// Decides whether this node should mine right now, should wait, or has
    /// nothing to do at this height. Pure: reads the chain's current block
    /// and the roster, but performs no I/O of its own and sleeps nowhere.
    #[tracing::instrument(skip_all)]
    pub fn modify_timer(&self) -> Result<TimerDecision> {
        let current = self.chain.current_block()?;
        let height = current.header.height;
        if !self.is_self_deputy_node(height) {
            tracing::debug!(height, "not a deputy at this height, skipping");
            return Ok(TimerDecision::Skip);
        }

        let node_count = self.roster.count() as i64;
        if node_count <= 1 {
            tracing::debug!(node_count, "single-node roster, waiting out the block interval");
            return Ok(TimerDecision::WaitMs(self.config.block_interval_ms));
        }

        let time_dur = self.time_span_ms(&current);
        let myself = match self.roster.deputy_by_node_id(height, &self.config.self_node_id) {
            Some(n) => n.miner_address,
            None => return Ok(TimerDecision::Skip),
        };
        let slot = match self.roster.slot(height, current.header.miner_address, myself) {
            Ok(s) => s,
            Err(_) => return Ok(TimerDecision::Skip),
        };
        let one_loop_time = node_count * self.config.slot_timeout_ms;

        let decision = match slot {
            0 => {
                if time_dur <= one_loop_time {
                    TimerDecision::Skip
                } else {
                    let time_dur = time_dur % one_loop_time;
                    let wait = (node_count - 1) * self.config.slot_timeout_ms - time_dur;
                    if wait <= 0 {
                        TimerDecision::MineNow
                    } else {
                        TimerDecision::WaitMs(wait)
                    }
                }
            }
            1 => {
                if time_dur > one_loop_time {
                    let time_dur = time_dur % one_loop_time;
                    if time_dur < self.config.slot_timeout_ms {
                        TimerDecision::MineNow
                    } else {
                        TimerDecision::WaitMs(one_loop_time - time_dur)
                    }
                } else if time_dur > self.config.slot_timeout_ms {
                    TimerDecision::WaitMs(one_loop_time - time_dur)
                } else if time_dur >= self.config.block_interval_ms {
                    TimerDecision::MineNow
                } else {
                    TimerDecision::WaitMs(self.config.block_interval_ms - time_dur)
                }
            }
            slot => {
                let time_dur = time_dur % one_loop_time;
                if time_dur >= (slot - 1) * self.config.slot_timeout_ms && time_dur < slot * self.config.slot_timeout_ms {
                    TimerDecision::MineNow
                } else {
                    let wait = ((slot - 1) * self.config.slot_timeout_ms - time_dur + one_loop_time) % one_loop_time;
                    TimerDecision::WaitMs(wait)
                }
            }
        };
        tracing::debug!(height, slot, ?decision, "timer decision");
        Ok(decision)
    }

    fn calc_gas_limit(parent: &Block) -> u64 {
        let gas_used = parent.header.gas_used;
        let gas_limit = parent.header.gas_limit;
        let contrib = (gas_used + gas_used / 2) / GAS_LIMIT_BOUND_DIVISOR;
        let decay = gas_limit / GAS_LIMIT_BOUND_DIVISOR - 1;

        let mut limit = gas_limit.saturating_sub(decay) + contrib;
        if limit < MIN_GAS_LIMIT {
            limit = MIN_GAS_LIMIT;
        }
        if limit < TARGET_GAS_LIMIT {
            limit = (gas_limit + decay).min(TARGET_GAS_LIMIT);
        }
        limit
    }

    /// Builds the unsigned, unfilled header for the block this node is
    /// about to seal: parent linkage, gas limit, timestamp and the
    /// configured reward address, refreshed from the roster at each
    /// snapshot transition boundary.
    fn seal_head(&mut self) -> Result<Header> {
        let parent = self.chain.current_block()?;
        let next_height = parent.header.height + 1;
        if next_height % REWARD_ADDRESS_REFRESH_INTERVAL == 1 {
            if let Some(node) = self.roster.deputy_by_node_id(next_height, &self.config.self_node_id) {
                self.config.miner_address = node.miner_address;
            }
        }
        Ok(Header {
            parent_hash: parent.hash(),
            miner_address: self.config.miner_address,
            version_root: crate::ZERO_HASH,
            tx_root: crate::ZERO_HASH,
            log_root: crate::ZERO_HASH,
            event_root: crate::ZERO_HASH,
            bloom: Bloom::default(),
            height: next_height,
            gas_limit: Self::calc_gas_limit(&parent),
            gas_used: 0,
            time: crate::now_ts() as u32,
            extra: self.config.extra.clone(),
            // The deputy root is only ever stamped at genesis; ordinary
            // blocks leave it zeroed, matching the reference engine.
            deputy_root: crate::ZERO_HASH,
            sign_data: Vec::new(),
        })
    }

    /// Dequeues pending transactions, applies as many as fit the new
    /// block's gas limit, signs the resulting header, and persists the
    /// block as the chain's new stable tip.
    #[tracing::instrument(skip_all)]
    pub fn seal_block(&mut self, active_deputies: Vec<DeputyNode>) -> Result<Block> {
        self.state = MinerState::Sealing;
        let result = self.seal_block_inner(active_deputies);
        self.state = MinerState::Armed;
        if let Err(ref err) = result {
            tracing::warn!(%err, "block sealing failed");
        }
        result
    }

    fn seal_block_inner(&mut self, active_deputies: Vec<DeputyNode>) -> Result<Block> {
        let parent_height = self.chain.current_block()?.header.height;
        if !self.is_self_deputy_node(parent_height) {
            tracing::debug!(parent_height, "not a deputy at parent height, refusing to seal");
            return Err(crate::Error::RosterMissing);
        }
        let header = self.seal_head()?;
        let candidates = self.tx_pool.pending(MAX_TXS_PER_SEAL);
        tracing::debug!(height = header.height, candidates = candidates.len(), "sealing block");
        let (mut filled_header, selected, _invalid) = self.processor.apply_txs(&header, &candidates)?;

        let hash = filled_header.hash();
        filled_header.sign_data = crate::signer::sign_hash(&hash, &self.config.private_key)?;

        let change_logs = self.processor.account_manager().change_logs().to_vec();
        let events = self.processor.account_manager().events().to_vec();
        let block = Block::new(filled_header, selected.clone(), change_logs, events, active_deputies);

        self.chain.db().set_block(hash, block.clone())?;
        self.processor.account_manager().save(hash)?;
        self.chain.db().set_stable_block(hash)?;
        self.tx_pool.remove(&selected.iter().map(|tx| tx.hash()).collect::<Vec<_>>());
        tracing::info!(height = block.header.height, txs = selected.len(), hash = ?hash, "block sealed");
        let _ = self.mined_blocks.send(block.clone());
        Ok(block)
    }

    /// Drives the timer/seal state machine until `stop` is called. A peer
    /// block arriving on `peer_blocks` just causes the timer to be
    /// re-evaluated against the (externally updated) current block; this
    /// miner does not itself perform block import.
    pub async fn run(&mut self, mut peer_blocks: broadcast::Receiver<Block>, active_deputies: Vec<DeputyNode>) {
        self.state = MinerState::Armed;
        loop {
            if self.state != MinerState::Armed {
                return;
            }
            let decision = self.modify_timer().unwrap_or(TimerDecision::Skip);
            let wait_ms = match decision {
                TimerDecision::MineNow => 0,
                TimerDecision::WaitMs(ms) => ms.max(0) as u64,
                TimerDecision::Skip => self.config.slot_timeout_ms.max(0) as u64,
            };

            tokio::select! {
                _ = tokio::time::sleep(Duration::from_millis(wait_ms)) => {
                    if !matches!(decision, TimerDecision::Skip) {
                        let _ = self.seal_block(active_deputies.clone());
                    }
                }
                recv = peer_blocks.recv() => {
                    if recv.is_err() {
                        return;
                    }
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chaindb::MemChainDb;
    use crate::genesis::{setup_genesis, GenesisSpec};
    use crate::vm::TransferOnlyVm;
    use std::net::{IpAddr, Ipv4Addr};

    fn deputy(address: Address, node_id: Vec<u8>, rank: u32) -> DeputyNode {
        DeputyNode {
            miner_address: address,
            node_id,
            ip: IpAddr::V4(Ipv4Addr::new(127, 0, 0, 1)),
            port: 7001,
            rank,
            votes: 1,
        }
    }

    fn build_miner(node_id: Vec<u8>, address: Address, deputies: Vec<DeputyNode>) -> (Miner<TransferOnlyVm>, Arc<dyn crate::chaindb::ChainDb>) {
        let db: Arc<dyn crate::chaindb::ChainDb> = Arc::new(MemChainDb::new());
        let spec = GenesisSpec {
            time: 1_535_616_000,
            extra: Vec::new(),
            gas_limit: 105_000_000,
            founder: address,
            deputy_nodes: deputies.clone(),
        };
        setup_genesis(db.clone(), &spec).unwrap();

        let mut roster = RosterManager::new();
        roster.add(0, deputies);

        let chain = Chain::new(db.clone());
        let parent_hash = chain.current_block().unwrap().hash();
        let processor = TxProcessor::new(db.clone(), TransferOnlyVm, parent_hash).unwrap();
        let config = MinerConfig {
            block_interval_ms: 3000,
            slot_timeout_ms: 10_000,
            private_key: [0x12u8; 32],
            miner_address: address,
            self_node_id: node_id,
            extra: Vec::new(),
        };
        let tx_pool = Arc::new(TxPool::new());
        (Miner::new(config, chain, tx_pool, processor, roster), db)
    }

    #[test]
    fn non_deputy_node_always_skips() {
        let (miner, _db) = build_miner(
            vec![0xffu8; 64],
            [9u8; 20],
            vec![deputy([1u8; 20], vec![0xabu8; 64], 0)],
        );
        assert_eq!(miner.modify_timer().unwrap(), TimerDecision::Skip);
    }

    #[test]
    fn single_deputy_always_waits_block_interval() {
        let (miner, _db) = build_miner(
            vec![0xabu8; 64],
            [1u8; 20],
            vec![deputy([1u8; 20], vec![0xabu8; 64], 0)],
        );
        assert_eq!(miner.modify_timer().unwrap(), TimerDecision::WaitMs(3000));
    }

    #[test]
    fn seal_block_advances_chain_height() {
        let deputies = vec![deputy([1u8; 20], vec![0xabu8; 64], 0)];
        let (mut miner, db) = build_miner(vec![0xabu8; 64], [1u8; 20], deputies.clone());
        let block = miner.seal_block(deputies).unwrap();
        assert_eq!(block.header.height, 1);
        assert_eq!(db.stable_block().unwrap(), block.hash());
    }

    #[test]
    fn calc_gas_limit_stays_within_bounds() {
        let header = crate::block::Header {
            parent_hash: crate::ZERO_HASH,
            miner_address: [0u8; 20],
            version_root: crate::ZERO_HASH,
            tx_root: crate::ZERO_HASH,
            log_root: crate::ZERO_HASH,
            event_root: crate::ZERO_HASH,
            bloom: Bloom::default(),
            height: 1,
            gas_limit: 105_000_000,
            gas_used: 80_000_000,
            time: 0,
            extra: Vec::new(),
            deputy_root: crate::ZERO_HASH,
            sign_data: Vec::new(),
        };
        let block = Block::new(header, Vec::new(), Vec::new(), Vec::new(), Vec::new());
        let limit = Miner::<TransferOnlyVm>::calc_gas_limit(&block);
        assert!(limit >= MIN_GAS_LIMIT);
        assert!(limit <= TARGET_GAS_LIMIT.max(105_000_000));
    }
}
