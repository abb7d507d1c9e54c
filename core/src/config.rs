//! Miner and network configuration for **Obscura** core.
//!
//! The [`Config`] struct centralises tunable parameters: block timing,
//! chain-id replay domain, and the opaque `extra` bytes stamped into every
//! sealed block. It is constructed via the [`ConfigBuilder`] using the
//! fluent builder pattern, enabling callers to customise only the fields
//! they care about while keeping sensible defaults.
//!
//! All fields are `pub` so read-only access is ergonomic, however mutation
//! should occur through the builder to preserve validation invariants.
//!
//! ```
//! use obscura_core::config::Config;
//!
//! let cfg = Config::default();
//! assert_eq!(cfg.block_interval_ms, 3000);
//! ```

use serde::{Deserialize, Serialize};

/// `chain_id` reserved for the test harness (see scenarios in spec §8).
pub const TEST_CHAIN_ID: u16 = 200;

/// Runtime configuration shared across the crate.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Config {
    /// Minimum inter-block delay, in milliseconds.
    pub block_interval_ms: u64,

    /// Per-deputy slot window, in milliseconds.
    pub slot_timeout_ms: u64,

    /// Replay-protection domain. `200` is reserved for the test harness.
    pub chain_id: u16,

    /// Enables VM tracing during transaction application.
    pub debug: bool,

    /// Opaque bytes stamped into every sealed block's `extra` header field.
    /// Must not exceed 256 bytes.
    pub extra: Vec<u8>,

    /// Human-readable name identifying the network (e.g. "main", "test").
    pub network: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            block_interval_ms: 3000,
            slot_timeout_ms: 10_000,
            chain_id: 1,
            debug: false,
            extra: Vec::new(),
            network: "main".into(),
        }
    }
}

/// Fluent builder for [`Config`].
pub struct ConfigBuilder {
    inner: Config,
}

impl Default for ConfigBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl ConfigBuilder {
    /// Starts a new builder pre-populated with [`Config::default`].
    pub fn new() -> Self {
        Self { inner: Config::default() }
    }

    pub fn block_interval_ms(mut self, ms: u64) -> Self {
        self.inner.block_interval_ms = ms;
        self
    }

    pub fn slot_timeout_ms(mut self, ms: u64) -> Self {
        self.inner.slot_timeout_ms = ms;
        self
    }

    pub fn chain_id(mut self, id: u16) -> Self {
        self.inner.chain_id = id;
        self
    }

    pub fn debug(mut self, debug: bool) -> Self {
        self.inner.debug = debug;
        self
    }

    /// Panics if `extra` is longer than 256 bytes, mirroring the header
    /// field's hard limit.
    pub fn extra(mut self, extra: Vec<u8>) -> Self {
        assert!(extra.len() <= 256, "extra must be at most 256 bytes");
        self.inner.extra = extra;
        self
    }

    pub fn network<S: Into<String>>(mut self, name: S) -> Self {
        self.inner.network = name.into();
        self
    }

    /// Consumes the builder returning an immutable configuration value.
    pub fn finish(self) -> Config {
        self.inner
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builder_overrides_fields() {
        let cfg = ConfigBuilder::new()
            .block_interval_ms(5000)
            .slot_timeout_ms(15_000)
            .chain_id(TEST_CHAIN_ID)
            .network("test")
            .finish();
        assert_eq!(cfg.block_interval_ms, 5000);
        assert_eq!(cfg.slot_timeout_ms, 15_000);
        assert_eq!(cfg.chain_id, TEST_CHAIN_ID);
        assert_eq!(cfg.network, "test");
    }

    #[test]
    #[should_panic(expected = "extra must be at most 256 bytes")]
    fn builder_rejects_oversized_extra() {
        ConfigBuilder::new().extra(vec![0u8; 257]);
    }
}
