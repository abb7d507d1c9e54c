//! Error types for the **Obscura** core crate.
//!
//! All fallible public operations return [`crate::Result`]. Per-tx errors
//! encountered during block *selection* are handled locally by the caller
//! (snapshot-revert, then either stop or discard); per-tx errors during
//! *import* of a peer block are consensus-fatal and reject the whole block.

use thiserror::Error;

/// Core crate error type.
#[derive(Debug, Error, PartialEq, Eq, Clone)]
pub enum Error {
    /// `r == 0`, `s == 0`, `v` out of range, or the recovered key is zero.
    #[error("invalid signature")]
    InvalidSignature,

    /// Sender address could not be recovered from the transaction signature.
    #[error("invalid sender")]
    InvalidSender,

    /// `balance(sender) < gas_limit * gas_price`.
    #[error("insufficient balance to pay for gas")]
    InsufficientBalanceForGas,

    /// The VM's first balance transfer failed; the only VM error that is
    /// consensus-fatal.
    #[error("insufficient balance")]
    InsufficientBalance,

    /// Intrinsic gas exceeds the transaction's gas limit.
    #[error("out of gas")]
    OutOfGas,

    /// Not enough gas left in the block's gas pool for this transaction.
    #[error("gas pool exhausted")]
    GasPoolExhausted,

    /// Remaining block gas pool is below the minimum tx cost; selection stops.
    #[error("gas limit reached")]
    GasLimitReached,

    /// A transaction inside an imported block failed to apply; the whole
    /// block is rejected.
    #[error("block contains invalid transaction")]
    InvalidTxInBlock,

    /// `now > tx.expiration`.
    #[error("transaction expired")]
    ExpiredTransaction,

    /// Requested key is absent from the backing store.
    #[error("not found")]
    NotExist,

    /// Write target already exists; treated as a successful idempotent apply.
    #[error("already exists")]
    Exists,

    /// Slot math was asked about an address absent from the active roster.
    #[error("address not present in deputy roster")]
    RosterMissing,

    /// A [`crate::deputy::DeputyNode`] failed its field-level sanity check.
    #[error("invalid deputy node: {0}")]
    InvalidDeputyNode(&'static str),

    /// The genesis specification itself failed validation.
    #[error("invalid genesis block: {0}")]
    InvalidGenesis(&'static str),
}

/// Convenient result alias used throughout the crate.
pub type Result<T> = core::result::Result<T, Error>;
