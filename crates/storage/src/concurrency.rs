//! Table lock management per transaction.
//!
//! The [`ConcurrencyManager`] owns one [`TableLock`] per table and a lock
//! inventory per transaction. It makes table locks reentrant for a
//! transaction, turns a second request for write access into an upgrade,
//! applies the isolation level's release policy and refuses any wait that
//! would close a cycle in the wait-for graph.

use crate::lock::{BackoffConfig, LockMode, TableLock};
use crate::table::{Table, TableId};
use crate::transaction::{Transaction, TransactionHandler, TransactionId};
use crate::wait_for::WaitForGraph;
use hashbrown::HashMap;
use marrow_core::{Error, Result};
use parking_lot::{Mutex, RwLock};
use std::sync::Arc;
use tracing::{trace, warn};

/// What a transaction holds on one table.
///
/// While `write_held` is set, `read_held` is only a flag: the write lock
/// covers reads and no reader slot is occupied.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct LockInfo {
    pub read_held: bool,
    pub write_held: bool,
    /// Locked through a relation rather than as an operand; held until the
    /// transaction ends.
    pub related: bool,
}

impl LockInfo {
    fn holds_any(&self) -> bool {
        self.read_held || self.write_held
    }
}

type Inventory = HashMap<TransactionId, HashMap<TableId, LockInfo>>;

/// Coordinates table locks between transactions.
pub struct ConcurrencyManager {
    backoff: BackoffConfig,
    locks: RwLock<HashMap<TableId, Arc<TableLock>>>,
    inventory: Mutex<Inventory>,
    graph: Mutex<WaitForGraph>,
}

impl ConcurrencyManager {
    /// Creates a manager whose table locks use `backoff`.
    pub fn new(backoff: BackoffConfig) -> Self {
        Self {
            backoff,
            locks: RwLock::new(HashMap::new()),
            inventory: Mutex::new(HashMap::new()),
            graph: Mutex::new(WaitForGraph::new()),
        }
    }

    /// Acquires the write lock of `table`, upgrading a held read lock.
    pub fn acquire_table_write_lock(self: &Arc<Self>, txn: &Transaction, table: &Table) -> Result<()> {
        txn.check_active()?;
        let info = self.info(txn.id(), table.id());
        if info.write_held {
            return Ok(());
        }
        let mode = if info.read_held {
            LockMode::Upgrade
        } else {
            LockMode::Write
        };
        self.acquire(txn, table, mode)
    }

    /// Ends the operation's use of the write lock of `table`.
    ///
    /// The lock is only given back under `ReadUncommitted`; it is downgraded
    /// if the transaction also reads the table or locked it through a
    /// relation.
    pub fn release_table_write_lock(&self, txn: &Transaction, table: &Table) {
        if !txn.isolation().releases_write_locks_early() {
            return;
        }
        let downgrade = {
            let mut inventory = self.inventory.lock();
            let Some(info) = Self::entry_mut(&mut inventory, txn.id(), table.id()) else {
                return;
            };
            if !info.write_held {
                return;
            }
            info.write_held = false;
            let downgrade = info.read_held || info.related;
            info.read_held = downgrade;
            if !info.holds_any() {
                Self::remove_entry(&mut inventory, txn.id(), table.id());
            }
            downgrade
        };
        let lock = self.table_lock(table.id());
        if downgrade {
            lock.downgrade();
            trace!(txn = txn.id(), table = table.name(), "write lock downgraded");
        } else {
            self.graph.lock().release(txn.id(), table.id());
            lock.exit_write();
            trace!(txn = txn.id(), table = table.name(), "write lock released");
        }
    }

    /// Acquires a read lock on `table`.
    pub fn acquire_table_read_lock(self: &Arc<Self>, txn: &Transaction, table: &Table) -> Result<()> {
        txn.check_active()?;
        let info = self.info(txn.id(), table.id());
        if info.read_held {
            return Ok(());
        }
        if info.write_held {
            return self.mark(txn, table.id(), |i| i.read_held = true);
        }
        self.acquire(txn, table, LockMode::Read)
    }

    /// Ends the operation's use of the read lock of `table`.
    ///
    /// The lock is given back only when the isolation level allows it and
    /// the table was not locked through a relation.
    pub fn release_table_read_lock(&self, txn: &Transaction, table: &Table) {
        if !txn.isolation().releases_read_locks_early() {
            return;
        }
        {
            let mut inventory = self.inventory.lock();
            let Some(info) = Self::entry_mut(&mut inventory, txn.id(), table.id()) else {
                return;
            };
            if !info.read_held || info.related {
                return;
            }
            info.read_held = false;
            if info.write_held {
                return;
            }
            Self::remove_entry(&mut inventory, txn.id(), table.id());
        }
        self.graph.lock().release(txn.id(), table.id());
        self.table_lock(table.id()).exit_read();
        trace!(txn = txn.id(), table = table.name(), "read lock released");
    }

    /// Locks a table reached through a relation: takes a read lock unless
    /// one is held already and keeps it until the transaction ends.
    pub fn acquire_related_table_lock(self: &Arc<Self>, txn: &Transaction, table: &Table) -> Result<()> {
        txn.check_active()?;
        if !self.info(txn.id(), table.id()).holds_any() {
            self.acquire(txn, table, LockMode::Read)?;
        }
        self.mark(txn, table.id(), |i| i.related = true)
    }

    /// Releases every lock held by `txn`.
    pub fn release_all_locks(&self, txn: TransactionId) {
        let entries = self.inventory.lock().remove(&txn);
        self.graph.lock().remove_transaction(txn);
        let Some(entries) = entries else {
            return;
        };
        let count = entries.len();
        let locks = self.locks.read();
        for (table, info) in entries {
            let Some(lock) = locks.get(&table) else {
                continue;
            };
            if info.write_held {
                lock.exit_write();
            } else if info.read_held {
                lock.exit_read();
            }
        }
        trace!(txn, tables = count, "all table locks released");
    }

    /// Locks held by `txn`, sorted by table.
    pub fn held_locks(&self, txn: TransactionId) -> Vec<(TableId, LockInfo)> {
        let inventory = self.inventory.lock();
        let mut held: Vec<_> = inventory
            .get(&txn)
            .map(|tables| {
                tables
                    .iter()
                    .filter(|(_, info)| info.holds_any())
                    .map(|(&t, &i)| (t, i))
                    .collect()
            })
            .unwrap_or_default();
        held.sort_unstable_by_key(|(t, _)| *t);
        held
    }

    /// Returns true if `txn` holds a read lock (or the read flag) on `table`.
    pub fn holds_read_lock(&self, txn: TransactionId, table: TableId) -> bool {
        self.info(txn, table).read_held
    }

    /// Returns true if `txn` holds the write lock on `table`.
    pub fn holds_write_lock(&self, txn: TransactionId, table: TableId) -> bool {
        self.info(txn, table).write_held
    }

    /// Returns true if `txn` is blocked on a table lock.
    pub fn is_waiting(&self, txn: TransactionId) -> bool {
        self.graph.lock().is_waiting(txn)
    }

    /// Returns the lock of `table`, creating it on first use.
    pub fn table_lock(&self, table: TableId) -> Arc<TableLock> {
        if let Some(lock) = self.locks.read().get(&table) {
            return Arc::clone(lock);
        }
        let mut locks = self.locks.write();
        Arc::clone(
            locks
                .entry(table)
                .or_insert_with(|| Arc::new(TableLock::new(self.backoff))),
        )
    }

    fn acquire(self: &Arc<Self>, txn: &Transaction, table: &Table, mode: LockMode) -> Result<()> {
        txn.enlist(Arc::clone(self) as Arc<dyn TransactionHandler>);
        let lock = self.table_lock(table.id());

        // An upgrade gives up the reader slot, so it must no longer be
        // released on the transaction's behalf.
        if mode == LockMode::Upgrade {
            self.mark(txn, table.id(), |i| i.read_held = false)?;
        }

        if !lock.try_acquire(mode) {
            if !self.graph.lock().add_wait(txn.id(), table.id()) {
                warn!(txn = txn.id(), table = table.name(), ?mode, "deadlock detected");
                if mode == LockMode::Upgrade
                    && self.mark(txn, table.id(), |i| i.read_held = true).is_err()
                {
                    lock.exit_read();
                }
                return Err(Error::deadlock(txn.id(), table.name()));
            }
            trace!(txn = txn.id(), table = table.name(), ?mode, "waiting for table lock");
            lock.acquire(mode);
        }
        self.graph.lock().grant(txn.id(), table.id());

        let recorded = self.mark(txn, table.id(), |i| match mode {
            LockMode::Read => i.read_held = true,
            LockMode::Write => i.write_held = true,
            LockMode::Upgrade => {
                i.read_held = true;
                i.write_held = true;
            }
        });
        if let Err(e) = recorded {
            // The transaction ended while we waited; nobody else will
            // release what was just granted.
            self.graph.lock().remove_transaction(txn.id());
            match mode {
                LockMode::Read => lock.exit_read(),
                LockMode::Write | LockMode::Upgrade => lock.exit_write(),
            }
            return Err(e);
        }
        trace!(txn = txn.id(), table = table.name(), ?mode, "table lock acquired");
        Ok(())
    }

    /// Updates the inventory entry of (`txn`, `table`) unless the
    /// transaction has already ended.
    fn mark(&self, txn: &Transaction, table: TableId, f: impl FnOnce(&mut LockInfo)) -> Result<()> {
        let mut inventory = self.inventory.lock();
        txn.check_active()?;
        f(inventory.entry(txn.id()).or_default().entry(table).or_default());
        Ok(())
    }

    fn info(&self, txn: TransactionId, table: TableId) -> LockInfo {
        self.inventory
            .lock()
            .get(&txn)
            .and_then(|tables| tables.get(&table))
            .copied()
            .unwrap_or_default()
    }

    fn entry_mut(inventory: &mut Inventory, txn: TransactionId, table: TableId) -> Option<&mut LockInfo> {
        inventory.get_mut(&txn).and_then(|tables| tables.get_mut(&table))
    }

    fn remove_entry(inventory: &mut Inventory, txn: TransactionId, table: TableId) {
        if let Some(tables) = inventory.get_mut(&txn) {
            tables.remove(&table);
        }
    }
}

impl Default for ConcurrencyManager {
    fn default() -> Self {
        Self::new(BackoffConfig::default())
    }
}

impl TransactionHandler for ConcurrencyManager {
    fn on_commit(&self, txn: &Transaction) {
        self.release_all_locks(txn.id());
    }

    fn on_rollback(&self, txn: &Transaction) {
        self.release_all_locks(txn.id());
    }
}
