//! Obscura Core Library
//!
//! Consensus-and-execution core of a permissioned, deputy-node blockchain:
//! the deputy roster/slot scheduler, the transaction pool, the block
//! building/applying pipeline, and the versioned account manager that backs
//! it. The peer-to-peer layer, RPC server, persistent key-value store and
//! EVM bytecode interpreter are external collaborators, represented here as
//! narrow trait boundaries ([`chaindb::ChainDb`], [`vm::Vm`]).

pub mod account;
pub mod block;
pub mod chain;
pub mod chaindb;
pub mod codec;
pub mod config;
pub mod deputy;
pub mod error;
pub mod genesis;
pub mod miner;
pub mod params;
pub mod processor;
pub mod signer;
pub mod tx_pool;
pub mod vm;

/// 20-byte account identifier, derived from the last 20 bytes of a public
/// key's Keccak-256 digest.
pub type Address = [u8; 20];

/// 32-byte Keccak-256 digest.
pub type Hash = [u8; 32];

/// Monotonic block height.
pub type Height = u32;

/// All-zero hash, used for the genesis block's `parent_hash`.
pub const ZERO_HASH: Hash = [0u8; 32];

/// All-zero address, used to detect a failed signature recovery.
pub const ZERO_ADDRESS: Address = [0u8; 20];

pub use error::{Error, Result};

/// Returns the UNIX timestamp in seconds.
pub(crate) fn now_ts() -> u64 {
    use std::time::{SystemTime, UNIX_EPOCH};
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .expect("time went backwards")
        .as_secs()
}
