//! Chain facade (component C8): the thin read surface over [`ChainDb`] that
//! the miner and RPC layer consult for "what does the chain currently look
//! like". Fork choice and block import live outside this crate's scope
//! (spec §1 "Out of scope"); a node's own stable block is always treated as
//! its current block.

use crate::block::Block;
use crate::chaindb::ChainDb;
use crate::{Hash, Result};
use std::sync::Arc;

pub struct Chain {
    db: Arc<dyn ChainDb>,
}

impl Chain {
    pub fn new(db: Arc<dyn ChainDb>) -> Self {
        Self { db }
    }

    pub fn db(&self) -> &Arc<dyn ChainDb> {
        &self.db
    }

    /// The node's own most recent block, i.e. its stable block.
    pub fn current_block(&self) -> Result<Block> {
        self.stable_block()
    }

    pub fn stable_block(&self) -> Result<Block> {
        let hash = self.db.stable_block()?;
        self.db.get_block(&hash)
    }

    pub fn block_by_hash(&self, hash: &Hash) -> Result<Block> {
        self.db.get_block(hash)
    }
}
