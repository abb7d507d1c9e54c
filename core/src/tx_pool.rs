//! Transaction pool (component C5): an arrival-order FIFO queue feeding the
//! miner, plus a bounded dedup window so the same transaction is never
//! queued twice within its replay horizon.
//!
//! The queue ([`TxsSortByTime`]) is soft-delete: [`TxsSortByTime::remove`]
//! only flags an entry, it does not shift the backing vector. The vector
//! and its hash index are only physically reset once a [`TxsSortByTime::pop`]
//! finds every remaining entry flagged — i.e. once the queue has fully
//! drained — so a long-running pool doesn't hold onto a vector of
//! tombstones it never reclaims meanwhile.
//!
//! The dedup window ([`RecentSet`]) rotates two hash sets: transactions
//! seen in the current window and the one before it. A hash is considered
//! "recently seen" if it is in either set, giving a horizon of one to two
//! [`TX_TIMEOUT_SECS`] depending on when within the window it arrived.

use crate::block::{Transaction, Transactions};
use crate::params::TX_TIMEOUT_SECS;
use crate::Hash;
use std::collections::{HashMap, HashSet};
use std::sync::Mutex;
use tokio::sync::broadcast;

struct TxWithTime {
    tx: Transaction,
    deleted: bool,
}

/// Arrival-order queue of pending transactions with soft-delete.
struct TxsSortByTime {
    txs: Vec<TxWithTime>,
    index: HashMap<Hash, usize>,
}

impl TxsSortByTime {
    fn new() -> Self {
        Self {
            txs: Vec::new(),
            index: HashMap::new(),
        }
    }

    fn push(&mut self, tx: Transaction) {
        let hash = tx.hash();
        self.index.insert(hash, self.txs.len());
        self.txs.push(TxWithTime { tx, deleted: false });
    }

    /// Returns up to `size` not-yet-removed transactions in arrival order.
    /// If none remain (every entry was removed), physically clears the
    /// backing vector and index before returning.
    fn pop(&mut self, size: usize) -> Transactions {
        let mut out = Transactions::new();
        if size == 0 || self.txs.is_empty() {
            return out;
        }
        for entry in self.txs.iter() {
            if out.len() >= size {
                break;
            }
            if !entry.deleted {
                out.push(entry.tx.clone());
            }
        }
        if out.is_empty() {
            self.txs.clear();
            self.index.clear();
        }
        out
    }

    fn remove(&mut self, hash: &Hash) {
        if let Some(&pos) = self.index.get(hash) {
            self.txs[pos].deleted = true;
        }
    }

    fn remove_batch(&mut self, hashes: &[Hash]) {
        for hash in hashes {
            self.remove(hash);
        }
    }
}

/// Rotating two-bucket dedup set with a `[TX_TIMEOUT_SECS, 2*TX_TIMEOUT_SECS)`
/// horizon: a hash stays "seen" for at least one window and at most two.
struct RecentSet {
    last_rotate: i64,
    current: usize,
    buckets: [HashSet<Hash>; 2],
}

impl RecentSet {
    fn new(now: i64) -> Self {
        Self {
            last_rotate: now,
            current: 0,
            buckets: [HashSet::new(), HashSet::new()],
        }
    }

    fn contains(&self, hash: &Hash) -> bool {
        self.buckets[0].contains(hash) || self.buckets[1].contains(hash)
    }

    fn put(&mut self, hash: Hash, now: i64) {
        if now - self.last_rotate > TX_TIMEOUT_SECS {
            self.last_rotate = now;
            let stale = 1 - self.current;
            self.buckets[stale].clear();
            self.current = stale;
        }
        self.buckets[self.current].insert(hash);
    }
}

struct TxPoolInner {
    cache: TxsSortByTime,
    recent: RecentSet,
}

/// The miner's source of pending transactions. Safe to share across
/// threads: all mutable state lives behind a single mutex, and new arrivals
/// are broadcast on [`TxPool::subscribe`] for the miner's event loop to wake
/// up on.
pub struct TxPool {
    inner: Mutex<TxPoolInner>,
    new_txs: broadcast::Sender<Transactions>,
}

impl TxPool {
    pub fn new() -> Self {
        let (new_txs, _) = broadcast::channel(1024);
        Self {
            inner: Mutex::new(TxPoolInner {
                cache: TxsSortByTime::new(),
                recent: RecentSet::new(crate::now_ts() as i64),
            }),
            new_txs,
        }
    }

    /// A fresh receiver that observes every batch queued from this point on.
    pub fn subscribe(&self) -> broadcast::Receiver<Transactions> {
        self.new_txs.subscribe()
    }

    /// Queues `tx` unless its hash was already seen within the dedup
    /// horizon, in which case this is a silent no-op (matching how a
    /// duplicate broadcast relay is expected to behave).
    pub fn add_tx(&self, tx: Transaction) {
        self.add_txs(vec![tx]);
    }

    pub fn add_txs(&self, txs: Transactions) {
        let now = crate::now_ts() as i64;
        let mut fresh = Transactions::new();
        {
            let mut inner = self.inner.lock().unwrap();
            for tx in txs {
                let hash = tx.hash();
                if inner.recent.contains(&hash) {
                    continue;
                }
                inner.recent.put(hash, now);
                inner.cache.push(tx.clone());
                fresh.push(tx);
            }
        }
        if !fresh.is_empty() {
            let _ = self.new_txs.send(fresh);
        }
    }

    /// Marks `hash` as recently seen without queuing a transaction for it;
    /// used to suppress re-queuing a transaction the node has already
    /// included in a block it just imported.
    pub fn add_key(&self, hash: Hash) {
        let now = crate::now_ts() as i64;
        self.inner.lock().unwrap().recent.put(hash, now);
    }

    /// Up to `size` not-yet-removed transactions in arrival order.
    pub fn pending(&self, size: usize) -> Transactions {
        self.inner.lock().unwrap().cache.pop(size)
    }

    /// Soft-deletes `hashes` from the pending queue, typically called after
    /// they have been sealed into a block.
    pub fn remove(&self, hashes: &[Hash]) {
        self.inner.lock().unwrap().cache.remove_batch(hashes);
    }
}

impl Default for TxPool {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use num_bigint::BigUint;

    fn tx(tag: u8) -> Transaction {
        Transaction {
            to: Some([tag; 20]),
            value: BigUint::from(1u32),
            gas_limit: 21_000,
            gas_price: BigUint::from(1u32),
            data: vec![],
            chain_id: 200,
            expiration: 4_000_000_000,
            note: String::new(),
            label: String::new(),
            v: 0,
            r: [0u8; 32],
            s: [0u8; 32],
        }
    }

    #[test]
    fn duplicate_tx_is_queued_once() {
        let pool = TxPool::new();
        pool.add_tx(tx(1));
        pool.add_tx(tx(1));
        assert_eq!(pool.pending(10).len(), 1);
    }

    #[test]
    fn pending_respects_size_and_preserves_arrival_order() {
        let pool = TxPool::new();
        pool.add_txs(vec![tx(1), tx(2), tx(3)]);
        let batch = pool.pending(2);
        assert_eq!(batch.len(), 2);
        assert_eq!(batch[0].to, Some([1u8; 20]));
        assert_eq!(batch[1].to, Some([2u8; 20]));
    }

    #[test]
    fn removed_tx_is_excluded_from_pending() {
        let pool = TxPool::new();
        pool.add_txs(vec![tx(1), tx(2)]);
        pool.remove(&[tx(1).hash()]);
        let batch = pool.pending(10);
        assert_eq!(batch.len(), 1);
        assert_eq!(batch[0].to, Some([2u8; 20]));
    }

    #[test]
    fn pool_resets_once_fully_drained() {
        let pool = TxPool::new();
        pool.add_tx(tx(1));
        pool.remove(&[tx(1).hash()]);
        assert!(pool.pending(10).is_empty());
        // After a full drain the pool can accept the same hash again.
        pool.add_tx(tx(9));
        assert_eq!(pool.pending(10).len(), 1);
    }

    #[test]
    fn recent_set_rejects_resend_within_horizon() {
        let mut recent = RecentSet::new(1000);
        let hash = [7u8; 32];
        recent.put(hash, 1000);
        assert!(recent.contains(&hash));
        recent.put(hash, 1005);
        assert!(recent.contains(&hash));
    }

    #[test]
    fn recent_set_forgets_after_two_full_windows() {
        let mut recent = RecentSet::new(0);
        let hash = [7u8; 32];
        recent.put(hash, 0);
        // First rotation: hash still lives in the now-stale bucket.
        recent.put([1u8; 32], TX_TIMEOUT_SECS + 1);
        assert!(recent.contains(&hash));
        // Second rotation clears that bucket.
        recent.put([2u8; 32], 2 * (TX_TIMEOUT_SECS + 1));
        assert!(!recent.contains(&hash));
    }
}
