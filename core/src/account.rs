//! Account manager with change-log journal and snapshot/rollback
//! (component C3).
//!
//! The manager layers an in-memory mapping `address -> AccountData` over a
//! [`crate::chaindb::ChainDb`] snapshot rooted at a parent block hash. Reads
//! go through the layer; every mutation produces both the in-memory write
//! and a [`ChangeLog`] entry, which is how `log_root` and snapshot/revert
//! are made possible.

use crate::block::Event;
use crate::chaindb::{ChainDb, StateSnapshot};
use crate::codec::{keccak256, Encode};
use crate::{Address, Hash, Height, Result};
use num_bigint::BigUint;
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::sync::Arc;

/// Kind of state mutation a [`ChangeLog`] records. Drives which
/// [`AccountData`] field `finalise` bumps the version of.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ChangeLogType {
    Balance,
    Code,
    Storage,
    AddEvent,
    TxHash,
}

impl ChangeLogType {
    fn tag(self) -> u8 {
        match self {
            ChangeLogType::Balance => 0,
            ChangeLogType::Code => 1,
            ChangeLogType::Storage => 2,
            ChangeLogType::AddEvent => 3,
            ChangeLogType::TxHash => 4,
        }
    }
}

impl Encode for ChangeLogType {
    fn encode(&self, out: &mut Vec<u8>) {
        self.tag().encode(out)
    }
}

/// The per-(type, address) version vector entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct VersionRecord {
    pub version: u32,
    pub height: u32,
}

/// The value carried by a [`ChangeLog`]'s `old_value`/`new_value` fields.
/// Distinct variants cover the distinct mutation shapes the manager
/// supports; `None` marks "not applicable" (append-only log types have no
/// meaningful old value).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum ChangeLogValue {
    None,
    Balance(BigUint),
    Hash(Hash),
    Event(Event),
}

impl Encode for ChangeLogValue {
    fn encode(&self, out: &mut Vec<u8>) {
        let mut payload = Vec::new();
        match self {
            ChangeLogValue::None => {
                0u8.encode(&mut payload);
            }
            ChangeLogValue::Balance(v) => {
                1u8.encode(&mut payload);
                v.encode(&mut payload);
            }
            ChangeLogValue::Hash(h) => {
                2u8.encode(&mut payload);
                h.encode(&mut payload);
            }
            ChangeLogValue::Event(e) => {
                3u8.encode(&mut payload);
                e.encode(&mut payload);
            }
        }
        out.push(0x01u8);
        out.extend_from_slice(&(payload.len() as u32).to_be_bytes());
        out.extend_from_slice(&payload);
    }
}

/// One journal entry per observable state mutation. Ordering invariant:
/// within a transaction, logs appear in mutation order; across a block they
/// are concatenated in transaction order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChangeLog {
    pub log_type: ChangeLogType,
    pub address: Address,
    /// Sequence number for this `(log_type, address)` pair, assigned when
    /// the log is created; committed into `newest_records` at `finalise`.
    pub version: u32,
    pub old_value: ChangeLogValue,
    pub new_value: ChangeLogValue,
    pub extra: Vec<u8>,
}

impl Encode for ChangeLog {
    fn encode(&self, out: &mut Vec<u8>) {
        let mut payload = Vec::new();
        self.log_type.encode(&mut payload);
        self.address.encode(&mut payload);
        self.version.encode(&mut payload);
        self.old_value.encode(&mut payload);
        self.new_value.encode(&mut payload);
        self.extra.encode(&mut payload);
        out.push(0x01u8);
        out.extend_from_slice(&(payload.len() as u32).to_be_bytes());
        out.extend_from_slice(&payload);
    }
}

/// Per-address state: balance, code/storage roots, the version vector and
/// the ordered set of transaction hashes that have touched this account.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AccountData {
    pub address: Address,
    pub balance: BigUint,
    pub code_hash: Hash,
    pub storage_root: Hash,
    pub newest_records: HashMap<ChangeLogType, VersionRecord>,
    pub tx_hash_list: Vec<Hash>,
}

impl AccountData {
    pub fn empty(address: Address) -> Self {
        Self {
            address,
            balance: BigUint::from(0u32),
            code_hash: empty_code_hash(),
            storage_root: crate::codec::empty_root(),
            newest_records: HashMap::new(),
            tx_hash_list: Vec::new(),
        }
    }
}

impl Encode for AccountData {
    fn encode(&self, out: &mut Vec<u8>) {
        let mut payload = Vec::new();
        self.address.encode(&mut payload);
        self.balance.encode(&mut payload);
        self.code_hash.encode(&mut payload);
        self.storage_root.encode(&mut payload);
        let mut records: Vec<_> = self.newest_records.iter().collect();
        records.sort_by_key(|(t, _)| t.tag());
        for (t, r) in records {
            t.encode(&mut payload);
            r.version.encode(&mut payload);
            r.height.encode(&mut payload);
        }
        self.tx_hash_list.encode(&mut payload);
        out.push(0x01u8);
        out.extend_from_slice(&(payload.len() as u32).to_be_bytes());
        out.extend_from_slice(&payload);
    }
}

/// Keccak-256 of the empty byte string; the default `code_hash` for an
/// account that has no contract code.
pub fn empty_code_hash() -> Hash {
    keccak256(&[])
}

/// Opaque handle returned by [`AccountManager::snapshot`]; really just the
/// journal length at the time it was taken.
pub type SnapshotId = usize;

/// The mutable state layer backing block building and application.
pub struct AccountManager {
    db: Arc<dyn ChainDb>,
    parent: Hash,
    base: Box<dyn StateSnapshot>,
    accounts: HashMap<Address, AccountData>,
    logs: Vec<ChangeLog>,
    events: Vec<Event>,
    pending_versions: HashMap<(ChangeLogType, Address), u32>,
    touched: HashSet<(ChangeLogType, Address)>,
    height: Height,
}

impl AccountManager {
    /// Constructs a manager rooted at `parent_hash`.
    pub fn new(db: Arc<dyn ChainDb>, parent_hash: Hash) -> Result<Self> {
        let base = db.state_snapshot(&parent_hash)?;
        Ok(Self {
            db,
            parent: parent_hash,
            base,
            accounts: HashMap::new(),
            logs: Vec::new(),
            events: Vec::new(),
            pending_versions: HashMap::new(),
            touched: HashSet::new(),
            height: 0,
        })
    }

    /// Drops all in-memory mutations and rebases on the snapshot at
    /// `parent_hash`.
    pub fn reset(&mut self, parent_hash: Hash) -> Result<()> {
        self.base = self.db.state_snapshot(&parent_hash)?;
        self.parent = parent_hash;
        self.accounts.clear();
        self.logs.clear();
        self.events.clear();
        self.pending_versions.clear();
        self.touched.clear();
        Ok(())
    }

    /// Sets the height stamped into `newest_records` at the next
    /// `finalise()` (the height of the block currently being built/applied).
    pub fn set_height(&mut self, height: Height) {
        self.height = height;
    }

    fn load(&mut self, address: Address) -> &mut AccountData {
        if !self.accounts.contains_key(&address) {
            let data = self
                .base
                .get(&address)
                .unwrap_or_else(|| AccountData::empty(address));
            self.accounts.insert(address, data);
        }
        self.accounts.get_mut(&address).unwrap()
    }

    fn next_version(&mut self, log_type: ChangeLogType, address: Address) -> u32 {
        let entry = self.pending_versions.entry((log_type, address)).or_insert(0);
        *entry += 1;
        *entry
    }

    fn append_log(
        &mut self,
        log_type: ChangeLogType,
        address: Address,
        old_value: ChangeLogValue,
        new_value: ChangeLogValue,
    ) {
        let version = self.next_version(log_type, address);
        self.touched.insert((log_type, address));
        self.logs.push(ChangeLog {
            log_type,
            address,
            version,
            old_value,
            new_value,
            extra: Vec::new(),
        });
    }

    /// Returns a cursor for reading and mutating `address`'s state. Every
    /// setter appends a [`ChangeLog`].
    pub fn get(&mut self, address: Address) -> AccountRef<'_> {
        self.load(address);
        AccountRef { mgr: self, address }
    }

    pub fn balance(&mut self, address: Address) -> BigUint {
        self.load(address).balance.clone()
    }

    /// Records `tx_hash` in the next position of this account's ordered,
    /// de-duplicated set of touching transactions.
    pub fn save_tx_in_account(&mut self, sender: Address, recipient: Address, tx_hash: Hash) {
        for addr in [sender, recipient] {
            let account = self.load(addr);
            if !account.tx_hash_list.contains(&tx_hash) {
                account.tx_hash_list.push(tx_hash);
                self.append_log(ChangeLogType::TxHash, addr, ChangeLogValue::None, ChangeLogValue::Hash(tx_hash));
            }
        }
    }

    /// Emits `event` against its own `address`, appending both to the
    /// events list and the change-log journal.
    pub fn emit_event(&mut self, mut event: Event) {
        event.index = self.events.len() as u32;
        let address = event.address;
        self.events.push(event.clone());
        self.append_log(ChangeLogType::AddEvent, address, ChangeLogValue::None, ChangeLogValue::Event(event));
    }

    /// Records the length of the change-log journal; O(1).
    pub fn snapshot(&self) -> SnapshotId {
        self.logs.len()
    }

    /// Drops all logs at or after `id` and undoes their effects by
    /// replaying `old_value` in reverse order. `revert_to(snapshot())` is a
    /// no-op.
    pub fn revert_to(&mut self, id: SnapshotId) {
        while self.logs.len() > id {
            let log = self.logs.pop().unwrap();
            match (log.log_type, &log.old_value) {
                (ChangeLogType::Balance, ChangeLogValue::Balance(old)) => {
                    self.load(log.address).balance = old.clone();
                }
                (ChangeLogType::Code, ChangeLogValue::Hash(old)) => {
                    self.load(log.address).code_hash = *old;
                }
                (ChangeLogType::Storage, ChangeLogValue::Hash(old)) => {
                    self.load(log.address).storage_root = *old;
                }
                (ChangeLogType::AddEvent, _) => {
                    self.events.pop();
                }
                (ChangeLogType::TxHash, _) => {
                    self.load(log.address).tx_hash_list.pop();
                }
                _ => unreachable!("change log value shape does not match its log_type"),
            }
            if let Some(v) = self.pending_versions.get_mut(&(log.log_type, log.address)) {
                *v = v.saturating_sub(1);
            }
        }
    }

    /// Coalesces consecutive logs on the same `(log_type, address)`
    /// produced since `from_idx` into one entry, folding the earliest
    /// `old_value` with the latest `new_value`. Only applies to the
    /// overwritable-state log types (`Balance`, `Code`, `Storage`); `AddEvent`
    /// and `TxHash` entries are append-only records and are never merged,
    /// since collapsing them would silently drop distinct events/tx touches.
    pub fn merge_change_logs(&mut self, from_idx: usize) {
        if from_idx >= self.logs.len() {
            return;
        }
        let tail: Vec<ChangeLog> = self.logs.split_off(from_idx);
        let mut order: Vec<(ChangeLogType, Address)> = Vec::new();
        let mut merged: HashMap<(ChangeLogType, Address), ChangeLog> = HashMap::new();
        let mut passthrough: Vec<ChangeLog> = Vec::new();

        for log in tail {
            if matches!(log.log_type, ChangeLogType::AddEvent | ChangeLogType::TxHash) {
                passthrough.push(log);
                continue;
            }
            let key = (log.log_type, log.address);
            match merged.get_mut(&key) {
                Some(existing) => {
                    existing.new_value = log.new_value;
                    existing.version = log.version;
                }
                None => {
                    order.push(key);
                    merged.insert(key, log);
                }
            }
        }
        for key in order {
            self.logs.push(merged.remove(&key).unwrap());
        }
        self.logs.extend(passthrough);
    }

    /// Commits in-memory mutations into the state trie: bumps every touched
    /// account's `newest_records` entry and recomputes `version_root` as the
    /// Merkle root over account encodings, sorted by address.
    pub fn finalise(&mut self) -> Result<Hash> {
        for (log_type, address) in self.touched.drain().collect::<Vec<_>>() {
            let version = *self.pending_versions.get(&(log_type, address)).unwrap_or(&0);
            let height = self.height;
            let account = self
                .accounts
                .entry(address)
                .or_insert_with(|| AccountData::empty(address));
            account
                .newest_records
                .insert(log_type, VersionRecord { version, height });
        }
        Ok(self.version_root())
    }

    /// Merkle root over every loaded account's encoding, sorted by address
    /// so the result does not depend on load order.
    pub fn version_root(&self) -> Hash {
        let mut accounts: Vec<&AccountData> = self.accounts.values().collect();
        accounts.sort_by_key(|a| a.address);
        crate::codec::merkle_root(&accounts.into_iter().cloned().collect::<Vec<_>>())
    }

    pub fn change_logs(&self) -> &[ChangeLog] {
        &self.logs
    }

    pub fn events(&self) -> &[Event] {
        &self.events
    }

    /// Persists the finalised state under `block_hash`.
    pub fn save(&self, block_hash: Hash) -> Result<()> {
        self.db.write_state(block_hash, self.accounts.clone())
    }
}

/// A cursor over one account's state, returned by [`AccountManager::get`].
/// Every setter appends a [`ChangeLog`] to the owning manager's journal.
pub struct AccountRef<'a> {
    mgr: &'a mut AccountManager,
    address: Address,
}

impl AccountRef<'_> {
    pub fn balance(&self) -> BigUint {
        self.mgr.accounts[&self.address].balance.clone()
    }

    pub fn set_balance(&mut self, value: BigUint) {
        let old = self.mgr.load(self.address).balance.clone();
        self.mgr.load(self.address).balance = value.clone();
        self.mgr
            .append_log(ChangeLogType::Balance, self.address, ChangeLogValue::Balance(old), ChangeLogValue::Balance(value));
    }

    pub fn add_balance(&mut self, amount: &BigUint) {
        let new = self.balance() + amount;
        self.set_balance(new);
    }

    pub fn sub_balance(&mut self, amount: &BigUint) {
        let new = self.balance() - amount;
        self.set_balance(new);
    }

    pub fn code_hash(&self) -> Hash {
        self.mgr.accounts[&self.address].code_hash
    }

    pub fn set_code_hash(&mut self, hash: Hash) {
        let old = self.mgr.load(self.address).code_hash;
        self.mgr.load(self.address).code_hash = hash;
        self.mgr
            .append_log(ChangeLogType::Code, self.address, ChangeLogValue::Hash(old), ChangeLogValue::Hash(hash));
    }

    pub fn storage_root(&self) -> Hash {
        self.mgr.accounts[&self.address].storage_root
    }

    pub fn set_storage_root(&mut self, root: Hash) {
        let old = self.mgr.load(self.address).storage_root;
        self.mgr.load(self.address).storage_root = root;
        self.mgr
            .append_log(ChangeLogType::Storage, self.address, ChangeLogValue::Hash(old), ChangeLogValue::Hash(root));
    }

    pub fn tx_hash_list(&self) -> &[Hash] {
        &self.mgr.accounts[&self.address].tx_hash_list
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chaindb::MemChainDb;

    fn manager() -> AccountManager {
        let db = Arc::new(MemChainDb::new());
        AccountManager::new(db, crate::ZERO_HASH).unwrap()
    }

    #[test]
    fn revert_to_snapshot_is_a_no_op() {
        let mut am = manager();
        let addr = [1u8; 20];
        am.get(addr).set_balance(BigUint::from(10u32));
        let id = am.snapshot();
        let before = am.version_root();
        am.get(addr).set_balance(BigUint::from(99u32));
        am.revert_to(id);
        assert_eq!(am.version_root(), before);
        assert_eq!(am.balance(addr), BigUint::from(10u32));
    }

    #[test]
    fn revert_undoes_sequence_of_mutations() {
        let mut am = manager();
        let addr = [2u8; 20];
        am.get(addr).set_balance(BigUint::from(5u32));
        let id = am.snapshot();
        am.get(addr).set_balance(BigUint::from(50u32));
        am.get(addr).set_code_hash([9u8; 32]);
        am.revert_to(id);
        assert_eq!(am.balance(addr), BigUint::from(5u32));
        assert_eq!(am.get(addr).code_hash(), empty_code_hash());
    }

    #[test]
    fn two_managers_produce_identical_roots_for_identical_mutations() {
        let mut a = manager();
        let mut b = manager();
        for (addr, value) in [([1u8; 20], 10u32), ([2u8; 20], 20u32)] {
            a.get(addr).set_balance(BigUint::from(value));
            b.get(addr).set_balance(BigUint::from(value));
        }
        a.set_height(1);
        b.set_height(1);
        assert_eq!(a.finalise().unwrap(), b.finalise().unwrap());
    }

    #[test]
    fn merge_change_logs_keeps_earliest_old_and_latest_new() {
        let mut am = manager();
        let addr = [3u8; 20];
        am.get(addr).set_balance(BigUint::from(1u32));
        let from = am.snapshot();
        am.get(addr).set_balance(BigUint::from(2u32));
        am.get(addr).set_balance(BigUint::from(3u32));
        am.merge_change_logs(from);
        let tail: Vec<_> = am.change_logs()[from..].to_vec();
        assert_eq!(tail.len(), 1);
        assert_eq!(tail[0].old_value, ChangeLogValue::Balance(BigUint::from(1u32)));
        assert_eq!(tail[0].new_value, ChangeLogValue::Balance(BigUint::from(3u32)));
    }

    #[test]
    fn merge_change_logs_never_collapses_events() {
        let mut am = manager();
        let addr = [4u8; 20];
        let from = am.snapshot();
        for i in 0..3u8 {
            am.emit_event(Event {
                address: addr,
                topics: vec![],
                data: vec![i],
                block_height: 0,
                tx_hash: [0u8; 32],
                tx_index: 0,
                block_hash: [0u8; 32],
                index: 0,
                removed: false,
            });
        }
        am.merge_change_logs(from);
        let event_logs = am
            .change_logs()
            .iter()
            .filter(|l| l.log_type == ChangeLogType::AddEvent)
            .count();
        assert_eq!(event_logs, 3);
    }

    #[test]
    fn finalise_bumps_version_and_stamps_height() {
        let mut am = manager();
        let addr = [5u8; 20];
        am.set_height(7);
        am.get(addr).set_balance(BigUint::from(1u32));
        am.finalise().unwrap();
        let record = am.accounts[&addr].newest_records[&ChangeLogType::Balance];
        assert_eq!(record.version, 1);
        assert_eq!(record.height, 7);
    }
}
