//! External interface to the EVM bytecode interpreter.
//!
//! The interpreter itself is a black-box callee (spec §1 "Out of scope"):
//! given a [`Context`], a sender, code/call data, gas and value, it returns
//! return data, remaining gas and an error, mutating state only through the
//! [`AccountManager`] capability it is handed.

use crate::account::AccountManager;
use crate::{Address, Hash};
use num_bigint::BigUint;

/// Execution context derived from the block header and the transaction
/// being applied.
#[derive(Debug, Clone)]
pub struct Context {
    pub tx_hash: Hash,
    pub tx_index: u32,
    pub block_hash: Hash,
    pub origin: Address,
    pub miner_address: Address,
    pub block_height: u32,
    pub time: u32,
    pub gas_limit: u64,
    pub gas_price: BigUint,
}

/// Errors the VM may report. Only [`VmError::InsufficientBalance`] is
/// consensus-fatal; every other variant is swallowed by the processor and
/// simply consumes gas.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum VmError {
    #[error("insufficient balance")]
    InsufficientBalance,
    #[error("execution reverted")]
    Reverted,
    #[error("out of gas")]
    OutOfGas,
    #[error("vm error: {0}")]
    Other(String),
}

/// The narrow capability the transaction processor hands to the VM: black-box
/// `create`/`call` entry points operating against the account manager.
pub trait Vm {
    /// Deploys `code` as a new contract owned by `sender`, transferring
    /// `value`. Returns the created contract's address, remaining gas, and
    /// an error if execution failed.
    fn create(
        &mut self,
        am: &mut AccountManager,
        ctx: &Context,
        sender: Address,
        code: &[u8],
        gas: u64,
        value: &BigUint,
    ) -> (Address, u64, Option<VmError>);

    /// Invokes `recipient`'s code (or performs a plain transfer if it has
    /// none) with `data`, transferring `value`. Returns remaining gas and an
    /// error if execution failed.
    fn call(
        &mut self,
        am: &mut AccountManager,
        ctx: &Context,
        sender: Address,
        recipient: Address,
        data: &[u8],
        gas: u64,
        value: &BigUint,
    ) -> (u64, Option<VmError>);
}

/// Minimal [`Vm`] used by tests and by deployments with no contract support:
/// every call is a plain value transfer, every creation fails with
/// [`VmError::Other`] since there is no bytecode interpreter attached.
pub struct TransferOnlyVm;

impl Vm for TransferOnlyVm {
    fn create(
        &mut self,
        _am: &mut AccountManager,
        _ctx: &Context,
        _sender: Address,
        _code: &[u8],
        gas: u64,
        _value: &BigUint,
    ) -> (Address, u64, Option<VmError>) {
        (
            crate::ZERO_ADDRESS,
            gas,
            Some(VmError::Other("no EVM attached".into())),
        )
    }

    fn call(
        &mut self,
        am: &mut AccountManager,
        _ctx: &Context,
        sender: Address,
        recipient: Address,
        _data: &[u8],
        gas: u64,
        value: &BigUint,
    ) -> (u64, Option<VmError>) {
        if am.get(sender).balance() < *value {
            return (gas, Some(VmError::InsufficientBalance));
        }
        am.get(sender).sub_balance(value);
        am.get(recipient).add_balance(value);
        (gas, None)
    }
}
