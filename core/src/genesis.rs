//! Genesis block construction (component C8).

use crate::account::AccountManager;
use crate::block::{Block, Bloom, Header};
use crate::chaindb::ChainDb;
use crate::codec::{empty_root, merkle_root};
use crate::deputy::DeputyNode;
use crate::params::{GENESIS_FOUNDER_BALANCE, MAX_EXTRA_LENGTH};
use crate::{Address, Error, Hash, Result};
use num_bigint::BigUint;
use std::str::FromStr;
use std::sync::Arc;

/// Everything needed to build and persist a chain's genesis block.
pub struct GenesisSpec {
    pub time: u32,
    pub extra: Vec<u8>,
    pub gas_limit: u64,
    pub founder: Address,
    pub deputy_nodes: Vec<DeputyNode>,
}

/// Validates `spec`, builds the genesis block, and persists it as both the
/// chain's only block and its stable block. Returns the genesis block's
/// hash.
pub fn setup_genesis(db: Arc<dyn ChainDb>, spec: &GenesisSpec) -> Result<Hash> {
    if spec.deputy_nodes.is_empty() {
        return Err(Error::InvalidGenesis("deputy nodes can't be empty"));
    }
    if spec.extra.len() > MAX_EXTRA_LENGTH {
        return Err(Error::InvalidGenesis("extra data exceeds 256 bytes"));
    }
    if spec.time as u64 > crate::now_ts() {
        return Err(Error::InvalidGenesis("genesis time can't be in the future"));
    }
    for deputy in &spec.deputy_nodes {
        deputy.check().map_err(|_| Error::InvalidGenesis("deputy node failed its check"))?;
    }

    let header = Header {
        parent_hash: crate::ZERO_HASH,
        miner_address: spec.founder,
        version_root: crate::ZERO_HASH,
        tx_root: empty_root(),
        log_root: crate::ZERO_HASH,
        event_root: empty_root(),
        bloom: Bloom::default(),
        height: 0,
        gas_limit: spec.gas_limit,
        gas_used: 0,
        time: spec.time,
        extra: spec.extra.clone(),
        deputy_root: merkle_root(&spec.deputy_nodes),
        sign_data: Vec::new(),
    };

    let mut am = AccountManager::new(db.clone(), crate::ZERO_HASH)?;
    am.set_height(0);
    let founder_balance =
        BigUint::from_str(GENESIS_FOUNDER_BALANCE).expect("GENESIS_FOUNDER_BALANCE is a valid decimal literal");
    am.get(spec.founder).set_balance(founder_balance);

    let mut header = header;
    header.version_root = am.finalise()?;
    header.log_root = merkle_root(am.change_logs());

    let hash = header.hash();
    let block = Block::new(header, Vec::new(), am.change_logs().to_vec(), Vec::new(), spec.deputy_nodes.clone());
    db.set_block(hash, block)?;
    am.save(hash)?;
    db.set_stable_block(hash)?;
    Ok(hash)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chaindb::MemChainDb;
    use std::net::{IpAddr, Ipv4Addr};

    fn deputy(address: Address) -> DeputyNode {
        DeputyNode {
            miner_address: address,
            node_id: vec![0xabu8; 64],
            ip: IpAddr::V4(Ipv4Addr::new(127, 0, 0, 1)),
            port: 7001,
            rank: 0,
            votes: 1,
        }
    }

    fn spec() -> GenesisSpec {
        GenesisSpec {
            time: 1_535_616_000, // 2018-08-30 12:00:00 UTC
            extra: Vec::new(),
            gas_limit: 105_000_000,
            founder: [0xaau8; 20],
            deputy_nodes: vec![deputy([0xaau8; 20])],
        }
    }

    #[test]
    fn setup_genesis_persists_founder_balance() {
        let db: Arc<dyn ChainDb> = Arc::new(MemChainDb::new());
        let hash = setup_genesis(db.clone(), &spec()).unwrap();
        assert_eq!(db.stable_block().unwrap(), hash);
        let block = db.get_block(&hash).unwrap();
        assert_eq!(block.header.height, 0);
        assert_eq!(block.header.miner_address, [0xaau8; 20]);

        let snapshot = db.state_snapshot(&hash).unwrap();
        let account = snapshot.get(&[0xaau8; 20]).unwrap();
        assert_eq!(account.balance, BigUint::from_str(GENESIS_FOUNDER_BALANCE).unwrap());
    }

    #[test]
    fn setup_genesis_rejects_empty_deputy_list() {
        let db: Arc<dyn ChainDb> = Arc::new(MemChainDb::new());
        let mut s = spec();
        s.deputy_nodes.clear();
        assert!(matches!(setup_genesis(db, &s), Err(Error::InvalidGenesis(_))));
    }

    #[test]
    fn setup_genesis_rejects_oversized_extra() {
        let db: Arc<dyn ChainDb> = Arc::new(MemChainDb::new());
        let mut s = spec();
        s.extra = vec![0u8; 300];
        assert!(matches!(setup_genesis(db, &s), Err(Error::InvalidGenesis(_))));
    }
}
