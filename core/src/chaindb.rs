//! External interface to the persistent block/state key-value store.
//!
//! The actual store (disk-backed, replicated) lives outside this crate's
//! scope (spec §1 "Out of scope"). This trait is the narrow capability the
//! account manager and chain facade need from it.

use crate::block::Block;
use crate::{Address, Error, Hash, Result};
use std::collections::HashMap;

/// A read snapshot of account state rooted at a particular block hash.
pub trait StateSnapshot: Send + Sync {
    fn get(&self, address: &Address) -> Option<crate::account::AccountData>;
}

/// Persistent storage for blocks and account state. Implemented outside
/// this crate; consumers (tests, the chain facade) inject their own.
pub trait ChainDb: Send + Sync {
    fn set_block(&self, hash: Hash, block: Block) -> Result<()>;

    /// Returns [`Error::NotExist`] if the hash is unknown.
    fn get_block(&self, hash: &Hash) -> Result<Block>;

    fn set_stable_block(&self, hash: Hash) -> Result<()>;

    fn stable_block(&self) -> Result<Hash>;

    fn state_snapshot(&self, block_hash: &Hash) -> Result<Box<dyn StateSnapshot>>;

    fn write_state(
        &self,
        block_hash: Hash,
        accounts: HashMap<Address, crate::account::AccountData>,
    ) -> Result<()>;
}

/// A simple in-memory [`ChainDb`] used by tests and the genesis facade.
/// Writing an already-present block is treated as success (idempotent
/// apply), matching spec §7's `Exists` policy.
#[derive(Default)]
pub struct MemChainDb {
    inner: std::sync::Mutex<MemChainDbInner>,
}

#[derive(Default)]
struct MemChainDbInner {
    blocks: HashMap<Hash, Block>,
    states: HashMap<Hash, HashMap<Address, crate::account::AccountData>>,
    stable: Option<Hash>,
}

struct MemStateSnapshot {
    accounts: HashMap<Address, crate::account::AccountData>,
}

impl StateSnapshot for MemStateSnapshot {
    fn get(&self, address: &Address) -> Option<crate::account::AccountData> {
        self.accounts.get(address).cloned()
    }
}

impl MemChainDb {
    pub fn new() -> Self {
        Self::default()
    }
}

impl ChainDb for MemChainDb {
    fn set_block(&self, hash: Hash, block: Block) -> Result<()> {
        let mut inner = self.inner.lock().unwrap();
        if inner.blocks.contains_key(&hash) {
            return Ok(());
        }
        inner.blocks.insert(hash, block);
        Ok(())
    }

    fn get_block(&self, hash: &Hash) -> Result<Block> {
        let inner = self.inner.lock().unwrap();
        inner.blocks.get(hash).cloned().ok_or(Error::NotExist)
    }

    fn set_stable_block(&self, hash: Hash) -> Result<()> {
        self.inner.lock().unwrap().stable = Some(hash);
        Ok(())
    }

    fn stable_block(&self) -> Result<Hash> {
        self.inner.lock().unwrap().stable.ok_or(Error::NotExist)
    }

    fn state_snapshot(&self, block_hash: &Hash) -> Result<Box<dyn StateSnapshot>> {
        let inner = self.inner.lock().unwrap();
        let accounts = inner.states.get(block_hash).cloned().unwrap_or_default();
        Ok(Box::new(MemStateSnapshot { accounts }))
    }

    fn write_state(
        &self,
        block_hash: Hash,
        accounts: HashMap<Address, crate::account::AccountData>,
    ) -> Result<()> {
        self.inner.lock().unwrap().states.insert(block_hash, accounts);
        Ok(())
    }
}
