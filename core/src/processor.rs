//! Transaction processor (component C6): applies transactions against an
//! [`AccountManager`], handling gas purchase/refund/charge and driving the
//! [`Vm`] at the sender/recipient boundary.
//!
//! `process` replays a peer-proposed block's transactions in order and
//! fails the whole block on the first invalid transaction. `apply_txs`
//! instead greedily selects transactions out of a candidate set (the
//! miner's pool), snapshotting before each attempt and reverting on
//! failure so a bad transaction never leaks partial state into the block
//! being built.

use crate::account::AccountManager;
use crate::block::{Block, Bloom, Event, Header, Transaction, Transactions};
use crate::chaindb::ChainDb;
use crate::codec::merkle_root;
use crate::params::{TX_DATA_NON_ZERO_GAS, TX_DATA_ZERO_GAS, TX_GAS, TX_GAS_CONTRACT_CREATION};
use crate::vm::{Context, Vm, VmError};
use crate::{Address, Error, Hash, Result};
use num_bigint::BigUint;
use std::sync::Arc;

/// Remaining gas budget for the block currently being built or applied.
pub struct GasPool(u64);

impl GasPool {
    pub fn new(limit: u64) -> Self {
        GasPool(limit)
    }

    pub fn gas(&self) -> u64 {
        self.0
    }

    pub fn add_gas(&mut self, amount: u64) {
        self.0 += amount;
    }

    pub fn sub_gas(&mut self, amount: u64) -> Result<()> {
        if self.0 < amount {
            return Err(Error::GasLimitReached);
        }
        self.0 -= amount;
        Ok(())
    }
}

/// The intrinsic cost of a transaction before any VM execution: a base fee
/// depending on whether it creates a contract, plus a per-byte charge for
/// its data, priced differently for zero and non-zero bytes.
pub fn intrinsic_gas(data: &[u8], contract_creation: bool) -> Result<u64> {
    let mut gas = if contract_creation {
        TX_GAS_CONTRACT_CREATION
    } else {
        TX_GAS
    };
    let non_zero = data.iter().filter(|&&b| b != 0).count() as u64;
    let zero = data.len() as u64 - non_zero;
    gas = gas
        .checked_add(non_zero.checked_mul(TX_DATA_NON_ZERO_GAS).ok_or(Error::OutOfGas)?)
        .ok_or(Error::OutOfGas)?;
    gas = gas
        .checked_add(zero.checked_mul(TX_DATA_ZERO_GAS).ok_or(Error::OutOfGas)?)
        .ok_or(Error::OutOfGas)?;
    Ok(gas)
}

/// Applies transactions against account state on behalf of either a peer
/// block import ([`TxProcessor::process`]) or a block being assembled by
/// the miner ([`TxProcessor::apply_txs`]).
pub struct TxProcessor<V> {
    db: Arc<dyn ChainDb>,
    am: AccountManager,
    vm: V,
}

impl<V: Vm> TxProcessor<V> {
    pub fn new(db: Arc<dyn ChainDb>, vm: V, parent_hash: Hash) -> Result<Self> {
        let am = AccountManager::new(db.clone(), parent_hash)?;
        Ok(Self { db, am, vm })
    }

    pub fn db(&self) -> &Arc<dyn ChainDb> {
        &self.db
    }

    pub fn account_manager(&mut self) -> &mut AccountManager {
        &mut self.am
    }

    /// Replays every transaction in `block` in order. The genesis block
    /// (height 0) carries no transactions to apply and is returned as-is.
    /// Any transaction failure rejects the whole block with
    /// [`Error::InvalidTxInBlock`].
    #[tracing::instrument(skip_all, fields(height = block.header.height, txs = block.transactions.len()))]
    pub fn process(&mut self, block: &Block) -> Result<Header> {
        let header = &block.header;
        self.am.reset(header.parent_hash)?;
        self.am.set_height(header.height);
        if header.height == 0 {
            tracing::debug!("genesis block carries no transactions to apply");
            return Ok(header.clone());
        }

        let mut gas_pool = GasPool::new(header.gas_limit);
        let mut gas_used = 0u64;
        let mut total_fee = BigUint::from(0u32);
        for (index, tx) in block.transactions.iter().enumerate() {
            let tx_hash = tx.hash();
            let gas = self
                .apply_tx(&mut gas_pool, header, tx, index as u32, block.hash())
                .map_err(|err| {
                    tracing::warn!(hash = ?tx_hash, %err, "rejecting imported block: invalid transaction");
                    Error::InvalidTxInBlock
                })?;
            gas_used += gas;
            total_fee += BigUint::from(gas) * &tx.gas_price;
        }
        self.charge_for_gas(&total_fee, header.miner_address);
        tracing::info!(gas_used, "imported block applied");
        self.fill_header(header.clone(), &block.transactions, gas_used)
    }

    /// Greedily selects transactions out of `candidates` to fill a block at
    /// `header`'s gas limit, stopping once the remaining gas pool can no
    /// longer cover even the cheapest transaction. Returns the filled
    /// header, the selected transactions (in selection order) and those
    /// candidates that failed for reasons other than running out of gas.
    #[tracing::instrument(skip_all, fields(height = header.height, candidates = candidates.len()))]
    pub fn apply_txs(
        &mut self,
        header: &Header,
        candidates: &[Transaction],
    ) -> Result<(Header, Transactions, Transactions)> {
        self.am.reset(header.parent_hash)?;
        self.am.set_height(header.height);

        let mut gas_pool = GasPool::new(header.gas_limit);
        let mut gas_used = 0u64;
        let mut total_fee = BigUint::from(0u32);
        let mut selected = Transactions::new();
        let mut invalid = Transactions::new();

        for tx in candidates {
            if gas_pool.gas() < TX_GAS {
                tracing::debug!(remaining = gas_pool.gas(), "gas pool exhausted, stopping selection");
                break;
            }
            let snapshot = self.am.snapshot();
            match self.apply_tx(&mut gas_pool, header, tx, selected.len() as u32, crate::ZERO_HASH) {
                Ok(gas) => {
                    gas_used += gas;
                    total_fee += BigUint::from(gas) * &tx.gas_price;
                    selected.push(tx.clone());
                }
                Err(Error::GasLimitReached) => {
                    tracing::debug!(hash = ?tx.hash(), "block full, leaving transaction in pool");
                    self.am.revert_to(snapshot);
                    break;
                }
                Err(err) => {
                    tracing::warn!(hash = ?tx.hash(), %err, "dropping invalid transaction from selection");
                    self.am.revert_to(snapshot);
                    invalid.push(tx.clone());
                }
            }
        }
        self.charge_for_gas(&total_fee, header.miner_address);
        let filled = self.fill_header(header.clone(), &selected, gas_used)?;
        tracing::info!(selected = selected.len(), invalid = invalid.len(), gas_used, "block selection complete");
        Ok((filled, selected, invalid))
    }

    #[tracing::instrument(skip_all, fields(hash = ?tx.hash(), tx_index))]
    fn apply_tx(
        &mut self,
        gas_pool: &mut GasPool,
        header: &Header,
        tx: &Transaction,
        tx_index: u32,
        block_hash: Hash,
    ) -> Result<u64> {
        let sender_addr = crate::signer::sender(tx).map_err(|_| Error::InvalidSender)?;
        if header.time as u64 > tx.expiration {
            tracing::debug!(expiration = tx.expiration, time = header.time, "rejecting expired transaction");
            return Err(Error::ExpiredTransaction);
        }
        let merge_from = self.am.change_logs().len();

        self.buy_gas(gas_pool, tx, sender_addr)?;
        let mut rest_gas = self.pay_intrinsic_gas(tx, tx.gas_limit)?;

        let ctx = Context {
            tx_hash: tx.hash(),
            tx_index,
            block_hash,
            origin: sender_addr,
            miner_address: header.miner_address,
            block_height: header.height,
            time: header.time,
            gas_limit: tx.gas_limit,
            gas_price: tx.gas_price.clone(),
        };

        let (recipient_addr, vm_err) = if tx.is_contract_creation() {
            let (addr, gas_left, err) =
                self.vm.create(&mut self.am, &ctx, sender_addr, &tx.data, rest_gas, &tx.value);
            rest_gas = gas_left;
            (addr, err)
        } else {
            let recipient_addr = tx.to.expect("checked by is_contract_creation");
            let (gas_left, err) = self.vm.call(
                &mut self.am,
                &ctx,
                sender_addr,
                recipient_addr,
                &tx.data,
                rest_gas,
                &tx.value,
            );
            rest_gas = gas_left;
            (recipient_addr, err)
        };
        // VM errors other than insufficient balance do not affect consensus:
        // the transaction still consumes whatever gas it used.
        if vm_err == Some(VmError::InsufficientBalance) {
            return Err(Error::InsufficientBalance);
        }

        self.refund_gas(gas_pool, tx, sender_addr, rest_gas);
        self.am.save_tx_in_account(sender_addr, recipient_addr, tx.hash());
        self.am.merge_change_logs(merge_from);

        let gas_used = tx.gas_limit - rest_gas;
        tracing::debug!(gas_used, "transaction applied");
        Ok(gas_used)
    }

    fn buy_gas(&mut self, gas_pool: &mut GasPool, tx: &Transaction, sender: Address) -> Result<()> {
        let max_fee = tx.max_fee();
        if self.am.balance(sender) < max_fee {
            return Err(Error::InsufficientBalanceForGas);
        }
        gas_pool.sub_gas(tx.gas_limit)?;
        self.am.get(sender).sub_balance(&max_fee);
        Ok(())
    }

    fn pay_intrinsic_gas(&self, tx: &Transaction, rest_gas: u64) -> Result<u64> {
        let gas = intrinsic_gas(&tx.data, tx.is_contract_creation())?;
        if rest_gas < gas {
            return Err(Error::OutOfGas);
        }
        Ok(rest_gas - gas)
    }

    fn refund_gas(&mut self, gas_pool: &mut GasPool, tx: &Transaction, sender: Address, rest_gas: u64) {
        let remaining = BigUint::from(rest_gas) * &tx.gas_price;
        self.am.get(sender).add_balance(&remaining);
        gas_pool.add_gas(rest_gas);
    }

    fn charge_for_gas(&mut self, charge: &BigUint, miner: Address) {
        if *charge != BigUint::from(0u32) {
            self.am.get(miner).add_balance(charge);
        }
    }

    /// Derives `bloom`, `event_root`, `gas_used`, `tx_root`, `version_root`
    /// and `log_root` from the state this processor accumulated, leaving
    /// every other header field as supplied by the caller.
    fn fill_header(&mut self, mut header: Header, txs: &[Transaction], gas_used: u64) -> Result<Header> {
        let events: Vec<Event> = self.am.events().to_vec();
        header.bloom = Bloom::from_events(&events);
        header.event_root = merkle_root(&events);
        header.gas_used = gas_used;
        header.tx_root = merkle_root(txs);
        header.version_root = self.am.finalise()?;
        header.log_root = merkle_root(self.am.change_logs());
        Ok(header)
    }
}
