//! Wait-for graph used to detect deadlocks between transactions.
//!
//! Nodes are transactions and table locks, stored in two arenas and
//! addressed by integer handles. A transaction points at the lock it waits
//! for; a lock points at the transactions holding it. A new wait closes a
//! cycle when one of the lock's holders can reach the waiting transaction.

use crate::table::TableId;
use crate::transaction::TransactionId;
use hashbrown::HashMap;

#[derive(Debug, Default)]
struct TxnNode {
    id: TransactionId,
    waits_for: Option<usize>,
    holds: Vec<usize>,
}

#[derive(Debug, Default)]
struct LockNode {
    held_by: Vec<usize>,
}

/// Wait-for graph over transactions and table locks.
#[derive(Debug, Default)]
pub struct WaitForGraph {
    txns: Vec<TxnNode>,
    free_txns: Vec<usize>,
    txn_handles: HashMap<TransactionId, usize>,
    locks: Vec<LockNode>,
    lock_handles: HashMap<TableId, usize>,
}

impl WaitForGraph {
    /// Creates an empty graph.
    pub fn new() -> Self {
        Self::default()
    }

    /// Records that `txn` is about to block on the lock of `table`.
    ///
    /// Returns `false` and leaves the graph unchanged if the wait would close
    /// a cycle. The holder edge of `txn` itself is ignored, so upgrading a
    /// read lock only deadlocks when another holder waits on `txn`.
    pub fn add_wait(&mut self, txn: TransactionId, table: TableId) -> bool {
        let t = self.txn_handle(txn);
        let l = self.lock_handle(table);
        if self.reaches(l, t) {
            return false;
        }
        self.txns[t].waits_for = Some(l);
        true
    }

    /// Records that `txn` was granted the lock of `table`, clearing its wait.
    pub fn grant(&mut self, txn: TransactionId, table: TableId) {
        let t = self.txn_handle(txn);
        let l = self.lock_handle(table);
        self.txns[t].waits_for = None;
        if !self.locks[l].held_by.contains(&t) {
            self.locks[l].held_by.push(t);
            self.txns[t].holds.push(l);
        }
    }

    /// Clears the pending wait of `txn`, if any.
    pub fn cancel_wait(&mut self, txn: TransactionId) {
        if let Some(&t) = self.txn_handles.get(&txn) {
            self.txns[t].waits_for = None;
        }
    }

    /// Records that `txn` released the lock of `table`.
    pub fn release(&mut self, txn: TransactionId, table: TableId) {
        let (Some(&t), Some(&l)) = (self.txn_handles.get(&txn), self.lock_handles.get(&table))
        else {
            return;
        };
        self.locks[l].held_by.retain(|&h| h != t);
        self.txns[t].holds.retain(|&h| h != l);
    }

    /// Drops every edge of `txn` and recycles its node.
    pub fn remove_transaction(&mut self, txn: TransactionId) {
        let Some(t) = self.txn_handles.remove(&txn) else {
            return;
        };
        let node = std::mem::take(&mut self.txns[t]);
        for l in node.holds {
            self.locks[l].held_by.retain(|&h| h != t);
        }
        self.free_txns.push(t);
    }

    /// Returns true if `txn` is recorded as waiting.
    pub fn is_waiting(&self, txn: TransactionId) -> bool {
        self.txn_handles
            .get(&txn)
            .is_some_and(|&t| self.txns[t].waits_for.is_some())
    }

    /// Returns the transactions recorded as holding the lock of `table`.
    pub fn holders(&self, table: TableId) -> Vec<TransactionId> {
        match self.lock_handles.get(&table) {
            Some(&l) => self.locks[l].held_by.iter().map(|&t| self.txns[t].id).collect(),
            None => Vec::new(),
        }
    }

    /// Number of transactions currently tracked.
    pub fn transaction_count(&self) -> usize {
        self.txn_handles.len()
    }

    /// Depth-first search from the holders of `lock` (other than `target`)
    /// for a path back to `target`.
    fn reaches(&self, lock: usize, target: usize) -> bool {
        let mut visited = vec![false; self.txns.len()];
        let mut stack: Vec<usize> = self.locks[lock]
            .held_by
            .iter()
            .copied()
            .filter(|&h| h != target)
            .collect();

        while let Some(t) = stack.pop() {
            if t == target {
                return true;
            }
            if std::mem::replace(&mut visited[t], true) {
                continue;
            }
            if let Some(l) = self.txns[t].waits_for {
                stack.extend(self.locks[l].held_by.iter().copied());
            }
        }
        false
    }

    fn txn_handle(&mut self, txn: TransactionId) -> usize {
        if let Some(&t) = self.txn_handles.get(&txn) {
            return t;
        }
        let node = TxnNode {
            id: txn,
            ..TxnNode::default()
        };
        let t = match self.free_txns.pop() {
            Some(t) => {
                self.txns[t] = node;
                t
            }
            None => {
                self.txns.push(node);
                self.txns.len() - 1
            }
        };
        self.txn_handles.insert(txn, t);
        t
    }

    fn lock_handle(&mut self, table: TableId) -> usize {
        if let Some(&l) = self.lock_handles.get(&table) {
            return l;
        }
        self.locks.push(LockNode::default());
        let l = self.locks.len() - 1;
        self.lock_handles.insert(table, l);
        l
    }
}
