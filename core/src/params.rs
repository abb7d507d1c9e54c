//! Protocol-wide constants.
//!
//! Gas schedule, header size limits and gas-limit adjustment bounds. Kept in
//! their own module so [`crate::processor`] and [`crate::miner`] can share
//! them without a dependency cycle.

/// Base intrinsic gas for a plain call.
pub const TX_GAS: u64 = 21_000;

/// Base intrinsic gas for contract creation.
pub const TX_GAS_CONTRACT_CREATION: u64 = 53_000;

/// Per-byte cost of a zero byte in transaction data.
pub const TX_DATA_ZERO_GAS: u64 = 4;

/// Per-byte cost of a non-zero byte in transaction data.
pub const TX_DATA_NON_ZERO_GAS: u64 = 68;

/// Maximum length, in bytes, of a header's `extra` field.
pub const MAX_EXTRA_LENGTH: usize = 256;

/// Height period at which the deputy roster transitions to a new snapshot.
pub const SNAPSHOT_INTERVAL: u32 = 100_000;

/// Width of the transition window around a snapshot boundary.
pub const TRANSITION_PERIOD: u32 = 1_000;

/// Divisor used to bound per-block gas-limit adjustment, go-ethereum style.
pub const GAS_LIMIT_BOUND_DIVISOR: u64 = 1024;

/// Floor below which the adaptive gas limit is never allowed to drop.
pub const MIN_GAS_LIMIT: u64 = 5000;

/// Target gas limit the adaptive algorithm steers towards.
pub const TARGET_GAS_LIMIT: u64 = 105_000_000;

/// Founder balance minted in the genesis block, in base units.
pub const GENESIS_FOUNDER_BALANCE: &str = "1600000000000000000000000000";

/// Height at which a node's configured reward address is refreshed from the
/// roster (one slot beyond the first post-genesis snapshot transition).
pub const REWARD_ADDRESS_REFRESH_INTERVAL: u32 = 1_001_000;

/// Maximum number of transactions the miner dequeues from the pool per seal.
pub const MAX_TXS_PER_SEAL: usize = 10_000_000;

/// Dedup horizon for the transaction pool's recent-set, in seconds.
pub const TX_TIMEOUT_SECS: i64 = 10;
