//! Lock primitives for table-level concurrency control.
//!
//! - [`SpinLock`]: a short critical-section mutex that backs off from pure
//!   spinning to yielding and finally to sleeping.
//! - [`TableLock`]: a reader/writer lock with FIFO writer ordering that can
//!   upgrade a held read lock to a write lock and downgrade it back.
//!
//! Neither lock is reentrant. Reentrancy is tracked per transaction by the
//! [`ConcurrencyManager`](crate::ConcurrencyManager).

use std::cell::UnsafeCell;
use std::collections::VecDeque;
use std::fmt;
use std::hint;
use std::ops::{Deref, DerefMut};
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::thread;
use std::time::Duration;

/// Backoff policy shared by every lock a database creates.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct BackoffConfig {
    /// Steps that busy-spin; step `n` spins `2^n` times.
    pub spin_limit: u32,
    /// Last step that yields the thread instead of sleeping.
    pub yield_limit: u32,
    /// Sleep duration once the yield steps are exhausted.
    pub sleep: Duration,
}

impl BackoffConfig {
    /// The default policy: 6 spin steps, yielding up to step 10, then 50µs sleeps.
    pub const DEFAULT: BackoffConfig = BackoffConfig {
        spin_limit: 6,
        yield_limit: 10,
        sleep: Duration::from_micros(50),
    };
}

impl Default for BackoffConfig {
    fn default() -> Self {
        Self::DEFAULT
    }
}

/// Escalating wait helper: spin, then yield, then sleep.
#[derive(Debug)]
pub struct Backoff {
    step: u32,
    config: BackoffConfig,
}

impl Backoff {
    /// Creates a backoff at its first step.
    pub fn new(config: BackoffConfig) -> Self {
        Self { step: 0, config }
    }

    /// Waits for the duration of the current step and moves to the next one.
    pub fn snooze(&mut self) {
        if self.step <= self.config.spin_limit {
            for _ in 0..(1u32 << self.step.min(16)) {
                hint::spin_loop();
            }
        } else if self.step <= self.config.yield_limit {
            thread::yield_now();
        } else {
            thread::sleep(self.config.sleep);
        }
        self.step = self.step.saturating_add(1);
    }

    /// Returns true once the backoff has escalated to sleeping.
    pub fn is_sleeping(&self) -> bool {
        self.step > self.config.yield_limit
    }

    /// Restarts from the first step.
    pub fn reset(&mut self) {
        self.step = 0;
    }
}

/// A mutual-exclusion spinlock for short critical sections.
pub struct SpinLock<T> {
    locked: AtomicBool,
    backoff: BackoffConfig,
    value: UnsafeCell<T>,
}

// SAFETY: access to `value` is serialized by `locked`.
unsafe impl<T: Send> Send for SpinLock<T> {}
unsafe impl<T: Send> Sync for SpinLock<T> {}

impl<T> SpinLock<T> {
    /// Creates an unlocked spinlock with the default backoff policy.
    pub const fn new(value: T) -> Self {
        Self::with_backoff(value, BackoffConfig::DEFAULT)
    }

    /// Creates an unlocked spinlock with the given backoff policy.
    pub const fn with_backoff(value: T, backoff: BackoffConfig) -> Self {
        Self {
            locked: AtomicBool::new(false),
            backoff,
            value: UnsafeCell::new(value),
        }
    }

    /// Acquires the lock, blocking the thread until it is available.
    pub fn lock(&self) -> SpinLockGuard<'_, T> {
        let mut backoff = Backoff::new(self.backoff);
        loop {
            if let Some(guard) = self.try_lock() {
                return guard;
            }
            while self.locked.load(Ordering::Relaxed) {
                backoff.snooze();
            }
        }
    }

    /// Acquires the lock if it is free.
    pub fn try_lock(&self) -> Option<SpinLockGuard<'_, T>> {
        self.locked
            .compare_exchange(false, true, Ordering::Acquire, Ordering::Relaxed)
            .ok()
            .map(|_| SpinLockGuard { lock: self })
    }

    /// Returns true if the lock is currently held.
    pub fn is_locked(&self) -> bool {
        self.locked.load(Ordering::Relaxed)
    }

    /// Returns a mutable reference to the protected value.
    pub fn get_mut(&mut self) -> &mut T {
        self.value.get_mut()
    }

    /// Consumes the lock and returns the protected value.
    pub fn into_inner(self) -> T {
        self.value.into_inner()
    }
}

impl<T: Default> Default for SpinLock<T> {
    fn default() -> Self {
        Self::new(T::default())
    }
}

impl<T> fmt::Debug for SpinLock<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SpinLock")
            .field("locked", &self.is_locked())
            .finish_non_exhaustive()
    }
}

/// RAII guard of a [`SpinLock`]; unlocks on drop.
pub struct SpinLockGuard<'a, T> {
    lock: &'a SpinLock<T>,
}

impl<T> Deref for SpinLockGuard<'_, T> {
    type Target = T;

    fn deref(&self) -> &T {
        // SAFETY: the guard proves exclusive ownership of the lock.
        unsafe { &*self.lock.value.get() }
    }
}

impl<T> DerefMut for SpinLockGuard<'_, T> {
    fn deref_mut(&mut self) -> &mut T {
        // SAFETY: the guard proves exclusive ownership of the lock.
        unsafe { &mut *self.lock.value.get() }
    }
}

impl<T> Drop for SpinLockGuard<'_, T> {
    fn drop(&mut self) {
        self.lock.locked.store(false, Ordering::Release);
    }
}

/// Lock mode requested from a [`TableLock`].
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum LockMode {
    /// Shared access.
    Read,
    /// Exclusive access.
    Write,
    /// Exclusive access converted from a read lock already held.
    Upgrade,
}

/// A fair reader/writer lock for one table.
///
/// Writers line up in a FIFO queue of tickets and proceed only when their
/// ticket is at the head and no readers remain. Readers enter whenever no
/// writer is pending, so a queued writer is never starved by readers that
/// arrive after it.
///
/// The lock does not track owners: callers must pair every enter with the
/// matching exit, upgrade or downgrade.
pub struct TableLock {
    readers: AtomicUsize,
    pending: AtomicUsize,
    next_ticket: AtomicU64,
    queue: SpinLock<VecDeque<u64>>,
    backoff: BackoffConfig,
}

impl TableLock {
    /// Creates an unlocked table lock.
    pub fn new(backoff: BackoffConfig) -> Self {
        Self {
            readers: AtomicUsize::new(0),
            pending: AtomicUsize::new(0),
            next_ticket: AtomicU64::new(0),
            queue: SpinLock::with_backoff(VecDeque::new(), backoff),
            backoff,
        }
    }

    /// Number of readers currently inside the lock.
    pub fn readers(&self) -> usize {
        self.readers.load(Ordering::SeqCst)
    }

    /// Number of writers holding or waiting for the lock.
    pub fn pending_writers(&self) -> usize {
        self.pending.load(Ordering::SeqCst)
    }

    /// Acquires the lock in `mode`, blocking until it is granted.
    pub fn acquire(&self, mode: LockMode) {
        match mode {
            LockMode::Read => self.enter_read(),
            LockMode::Write => self.enter_write(),
            LockMode::Upgrade => self.upgrade(),
        }
    }

    /// Acquires the lock in `mode` only if that does not require waiting.
    pub fn try_acquire(&self, mode: LockMode) -> bool {
        match mode {
            LockMode::Read => self.try_enter_read(),
            LockMode::Write => self.try_enter_write(),
            LockMode::Upgrade => self.try_upgrade(),
        }
    }

    /// Enters the lock as a reader.
    pub fn enter_read(&self) {
        let mut backoff = Backoff::new(self.backoff);
        while !self.try_enter_read() {
            while self.pending.load(Ordering::SeqCst) != 0 {
                backoff.snooze();
            }
        }
    }

    /// Enters the lock as a reader if no writer is pending.
    pub fn try_enter_read(&self) -> bool {
        self.readers.fetch_add(1, Ordering::SeqCst);
        if self.pending.load(Ordering::SeqCst) == 0 {
            return true;
        }
        self.readers.fetch_sub(1, Ordering::SeqCst);
        false
    }

    /// Leaves the lock as a reader.
    pub fn exit_read(&self) {
        self.readers.fetch_sub(1, Ordering::SeqCst);
    }

    /// Enters the lock as the writer, waiting behind earlier writers.
    pub fn enter_write(&self) {
        let ticket = self.enqueue();
        self.wait_for_turn(ticket);
    }

    /// Enters the lock as the writer if it is completely free.
    pub fn try_enter_write(&self) -> bool {
        let mut queue = self.queue.lock();
        if !queue.is_empty() || self.readers.load(Ordering::SeqCst) != 0 {
            return false;
        }
        self.pending.fetch_add(1, Ordering::SeqCst);
        queue.push_back(self.next_ticket.fetch_add(1, Ordering::Relaxed));
        if self.readers.load(Ordering::SeqCst) == 0 {
            return true;
        }
        queue.pop_back();
        self.pending.fetch_sub(1, Ordering::SeqCst);
        false
    }

    /// Leaves the lock as the writer and hands it to the next queued writer.
    pub fn exit_write(&self) {
        self.queue.lock().pop_front();
        self.pending.fetch_sub(1, Ordering::SeqCst);
    }

    /// Converts a held read lock into the write lock.
    ///
    /// The caller gives up its reader slot and joins the writer queue; it
    /// holds the write lock once its ticket reaches the head and every other
    /// reader has left. Ownership is not continuous when a writer was queued
    /// first: that writer runs before the upgrade completes, so anything read
    /// under the reader slot must be re-checked afterwards.
    pub fn upgrade(&self) {
        let ticket = self.enqueue();
        self.readers.fetch_sub(1, Ordering::SeqCst);
        self.wait_for_turn(ticket);
    }

    /// Converts a held read lock into the write lock if no one else is inside
    /// or queued. On failure the read lock is still held.
    pub fn try_upgrade(&self) -> bool {
        let mut queue = self.queue.lock();
        if !queue.is_empty() {
            return false;
        }
        self.pending.fetch_add(1, Ordering::SeqCst);
        queue.push_back(self.next_ticket.fetch_add(1, Ordering::Relaxed));
        if self.readers.fetch_sub(1, Ordering::SeqCst) == 1 {
            return true;
        }
        self.readers.fetch_add(1, Ordering::SeqCst);
        queue.pop_back();
        self.pending.fetch_sub(1, Ordering::SeqCst);
        false
    }

    /// Converts the held write lock into a read lock.
    pub fn downgrade(&self) {
        self.readers.fetch_add(1, Ordering::SeqCst);
        self.exit_write();
    }

    fn enqueue(&self) -> u64 {
        // Raise `pending` before queueing so new readers back off.
        self.pending.fetch_add(1, Ordering::SeqCst);
        let ticket = self.next_ticket.fetch_add(1, Ordering::Relaxed);
        self.queue.lock().push_back(ticket);
        ticket
    }

    fn wait_for_turn(&self, ticket: u64) {
        let mut backoff = Backoff::new(self.backoff);
        loop {
            let at_head = self.queue.lock().front() == Some(&ticket);
            if at_head && self.readers.load(Ordering::SeqCst) == 0 {
                return;
            }
            backoff.snooze();
        }
    }
}

impl Default for TableLock {
    fn default() -> Self {
        Self::new(BackoffConfig::default())
    }
}

impl fmt::Debug for TableLock {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TableLock")
            .field("readers", &self.readers())
            .field("pending_writers", &self.pending_writers())
            .finish()
    }
}
