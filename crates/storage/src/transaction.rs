//! Transactions for Marrow.
//!
//! A [`Transaction`] is shared as `Arc<Transaction>` between the thread that
//! runs it and anyone allowed to abort it. It owns the undo log, guards
//! mutations with an atomic section and notifies enlisted handlers (the
//! concurrency manager) when it ends.

use crate::journal::{LogEntry, TransactionLog};
use crate::lock::{SpinLock, SpinLockGuard};
use marrow_core::{Error, Result};
use parking_lot::Mutex;
use std::fmt;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use tracing::{debug, trace, warn};

/// Transaction ID type.
pub type TransactionId = u64;

/// Global transaction ID counter.
static NEXT_TX_ID: AtomicU64 = AtomicU64::new(1);

/// How long a transaction keeps the table locks it took.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub enum IsolationLevel {
    /// Read and write locks are released as soon as the operation ends.
    ReadUncommitted,
    /// Read locks are released when the operation ends, write locks are
    /// held until the transaction ends.
    #[default]
    ReadCommitted,
    /// Every lock is held until the transaction ends.
    RepeatableRead,
    /// Every lock is held until the transaction ends.
    Serializable,
}

impl IsolationLevel {
    /// Returns true if write locks are released at the end of each operation.
    pub fn releases_write_locks_early(self) -> bool {
        matches!(self, IsolationLevel::ReadUncommitted)
    }

    /// Returns true if read locks on operand tables are released at the end
    /// of each operation. Related-table locks are never released early.
    pub fn releases_read_locks_early(self) -> bool {
        matches!(
            self,
            IsolationLevel::ReadUncommitted | IsolationLevel::ReadCommitted
        )
    }
}

/// Transaction state.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TransactionState {
    /// Transaction is active and can perform operations.
    Active,
    /// Transaction has been committed.
    Committed,
    /// Transaction has been rolled back.
    RolledBack,
}

/// Outcome of the prepare phase.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Vote {
    /// Ready to commit.
    Prepared,
    /// The transaction cannot commit and must be rolled back.
    ForceRollback,
}

/// Two-phase commit participant protocol.
pub trait Participant {
    /// Votes on the outcome of the transaction.
    fn prepare(&self) -> Vote;
    /// Makes the transaction's effects permanent.
    fn commit(&self) -> Result<()>;
    /// Undoes the transaction's effects.
    fn rollback(&self) -> Result<()>;
    /// The coordinator lost track of the outcome.
    fn in_doubt(&self) -> Result<()>;
}

/// Receives end-of-transaction notifications, at most once per transaction.
pub trait TransactionHandler: Send + Sync {
    /// Called after the transaction committed.
    fn on_commit(&self, txn: &Transaction);
    /// Called after the transaction log was rolled back.
    fn on_rollback(&self, txn: &Transaction);
}

/// A unit of work.
pub struct Transaction {
    id: TransactionId,
    isolation: IsolationLevel,
    aborted: AtomicBool,
    committed: AtomicBool,
    section: SpinLock<()>,
    log: Mutex<TransactionLog>,
    handlers: Mutex<Vec<Arc<dyn TransactionHandler>>>,
}

/// Guard of a transaction's atomic section.
///
/// While it is alive the transaction cannot be rolled back by another
/// thread.
pub struct AtomicSection<'a> {
    _guard: SpinLockGuard<'a, ()>,
}

impl Transaction {
    /// Begins a new transaction.
    pub fn begin(isolation: IsolationLevel) -> Arc<Self> {
        Arc::new(Self::new(isolation))
    }

    /// Creates a new active transaction.
    pub fn new(isolation: IsolationLevel) -> Self {
        let id = NEXT_TX_ID.fetch_add(1, Ordering::SeqCst);
        trace!(txn = id, ?isolation, "transaction started");
        Self {
            id,
            isolation,
            aborted: AtomicBool::new(false),
            committed: AtomicBool::new(false),
            section: SpinLock::new(()),
            log: Mutex::new(TransactionLog::new()),
            handlers: Mutex::new(Vec::new()),
        }
    }

    /// Returns the transaction ID.
    #[inline]
    pub fn id(&self) -> TransactionId {
        self.id
    }

    /// Returns the isolation level.
    #[inline]
    pub fn isolation(&self) -> IsolationLevel {
        self.isolation
    }

    /// Returns true once the transaction was rolled back.
    pub fn is_aborted(&self) -> bool {
        self.aborted.load(Ordering::SeqCst)
    }

    /// Returns the transaction state.
    pub fn state(&self) -> TransactionState {
        if self.aborted.load(Ordering::SeqCst) {
            TransactionState::RolledBack
        } else if self.committed.load(Ordering::SeqCst) {
            TransactionState::Committed
        } else {
            TransactionState::Active
        }
    }

    /// Returns true if the transaction can still perform operations.
    pub fn is_active(&self) -> bool {
        self.state() == TransactionState::Active
    }

    /// Fails unless the transaction is active.
    pub fn check_active(&self) -> Result<()> {
        match self.state() {
            TransactionState::Active => Ok(()),
            TransactionState::RolledBack => Err(Error::transaction_aborted(self.id)),
            TransactionState::Committed => Err(Error::transaction_not_active(self.id)),
        }
    }

    /// Enters the atomic section, failing if the transaction already ended.
    pub fn enter_atomic_section(&self) -> Result<AtomicSection<'_>> {
        let guard = self.section.lock();
        self.check_active()?;
        Ok(AtomicSection { _guard: guard })
    }

    /// Registers a handler to be notified when the transaction ends.
    /// Registering the same handler twice has no effect.
    pub fn enlist(&self, handler: Arc<dyn TransactionHandler>) {
        let mut handlers = self.handlers.lock();
        let ptr = Arc::as_ptr(&handler) as *const ();
        if !handlers.iter().any(|h| Arc::as_ptr(h) as *const () == ptr) {
            handlers.push(handler);
        }
    }

    /// Current length of the undo log.
    pub fn log_position(&self) -> usize {
        self.log.lock().position()
    }

    pub(crate) fn write_log(&self, entry: LogEntry) {
        trace!(txn = self.id, entry = entry.kind(), table = entry.table().name(), "log write");
        self.log.lock().write(entry);
    }

    /// Undoes every log entry written after `position`, newest first.
    /// Returns the number of undone entries.
    pub(crate) fn rollback_log_to(&self, position: usize) -> usize {
        let entries = self.log.lock().split_off(position);
        let count = entries.len();
        for entry in entries.into_iter().rev() {
            entry.undo();
        }
        count
    }

    /// Commits the transaction, running the participant protocol locally.
    pub fn commit(&self) -> Result<()> {
        self.check_active()?;
        match Participant::prepare(self) {
            Vote::Prepared => Participant::commit(self),
            Vote::ForceRollback => {
                self.rollback()?;
                Err(Error::transaction_aborted(self.id))
            }
        }
    }

    /// Rolls the transaction back. Rolling back twice is a no-op.
    pub fn rollback(&self) -> Result<()> {
        let undone = {
            let _section = self.section.lock();
            match self.state() {
                TransactionState::RolledBack => return Ok(()),
                TransactionState::Committed => {
                    return Err(Error::transaction_not_active(self.id))
                }
                TransactionState::Active => {}
            }
            // Flag first so operations racing for the section fail fast.
            self.aborted.store(true, Ordering::SeqCst);
            self.rollback_log_to(0)
        };
        debug!(txn = self.id, entries = undone, "transaction rolled back");
        for handler in self.take_handlers() {
            handler.on_rollback(self);
        }
        Ok(())
    }

    fn take_handlers(&self) -> Vec<Arc<dyn TransactionHandler>> {
        std::mem::take(&mut *self.handlers.lock())
    }
}

impl Participant for Transaction {
    fn prepare(&self) -> Vote {
        if self.is_aborted() || !self.is_active() {
            Vote::ForceRollback
        } else {
            Vote::Prepared
        }
    }

    fn commit(&self) -> Result<()> {
        let entries = {
            let _section = self.section.lock();
            self.check_active()?;
            self.committed.store(true, Ordering::SeqCst);
            let mut log = self.log.lock();
            let entries = log.len();
            log.clear();
            entries
        };
        debug!(txn = self.id, entries, "transaction committed");
        for handler in self.take_handlers() {
            handler.on_commit(self);
        }
        Ok(())
    }

    fn rollback(&self) -> Result<()> {
        Transaction::rollback(self)
    }

    fn in_doubt(&self) -> Result<()> {
        warn!(txn = self.id, "transaction outcome in doubt, rolling back");
        Transaction::rollback(self)
    }
}

impl fmt::Debug for Transaction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Transaction")
            .field("id", &self.id)
            .field("isolation", &self.isolation)
            .field("aborted", &self.is_aborted())
            .finish_non_exhaustive()
    }
}
