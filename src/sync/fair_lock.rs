//! # Fair lock
//! A FIFO mutual-exclusion lock that hands ownership over instead of letting threads race for it.
//!
//! Two queues of [RendezvousSignal]s:
//! - entry - threads that called [FairLock::lock] while it was taken
//! - urgent - threads that signaled a [Condition] and wait to get the lock back
//!
//! [FairLock::unlock] serves the urgent queue first, then the entry queue. The releasing thread
//! writes the next owner itself and only then wakes it up, so a woken thread never re-checks
//! anything: it owns the lock the moment it runs.
//!
//! All of the above lives behind one [FutexMutex], held only for the bookkeeping.
//! A [Condition] shares it and always takes it before its own queue's mutex.

use std::{
    collections::VecDeque,
    sync::Arc,
    thread::{self, ThreadId},
};

use log::trace;
use strum_macros::Display;

use super::{futex_mutex::FutexMutex, Condition, RendezvousSignal};
use crate::error::{Result, SyncError};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Display)]
pub enum LockState {
    Unlocked,
    Locked,
}

pub(crate) type SignalQueue = VecDeque<Arc<RendezvousSignal>>;

/// Everything that changes hands: guarded by the internal mutex.
pub(crate) struct LockInner {
    pub(crate) state: LockState,
    pub(crate) owner: Option<ThreadId>,
    pub(crate) entry: SignalQueue,
    pub(crate) urgent: SignalQueue,
}

impl LockInner {
    fn new() -> Self {
        Self {
            state: LockState::Unlocked,
            owner: None,
            entry: VecDeque::new(),
            urgent: VecDeque::new(),
        }
    }

    pub(crate) fn check_owner(&self, caller: ThreadId) -> Result<()> {
        match self.owner {
            Some(owner) if owner == caller => Ok(()),
            Some(owner) => Err(SyncError::NotOwner { caller, owner }),
            None => Err(SyncError::NotLocked),
        }
    }

    /// Gives the lock to the next queued thread, urgent ones first, or unlocks it.
    /// Returns the signal to fire once the internal mutex is dropped.
    pub(crate) fn hand_off(&mut self) -> Option<Arc<RendezvousSignal>> {
        let next = self
            .urgent
            .pop_front()
            .inspect(|s| trace!("handing the lock to urgent {:?}", s.owner()))
            .or_else(|| {
                self.entry
                    .pop_front()
                    .inspect(|s| trace!("handing the lock to entrant {:?}", s.owner()))
            });
        match &next {
            Some(signal) => self.owner = Some(signal.owner()),
            None => {
                self.owner = None;
                self.state = LockState::Unlocked;
            }
        }
        next
    }
}

pub struct FairLock {
    inner: Arc<FutexMutex<LockInner>>,
}

impl FairLock {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(FutexMutex::new(LockInner::new())),
        }
    }

    /// Takes the lock, or queues up behind everybody who asked earlier.
    ///
    /// # Errors
    /// [SyncError::ReentrantLock] if the calling thread owns the lock already.
    pub fn lock(&self) -> Result<()> {
        let me = thread::current().id();
        let signal = {
            let mut inner = self.inner.lock();
            if inner.owner == Some(me) {
                return Err(SyncError::ReentrantLock(me));
            }
            if inner.state == LockState::Unlocked {
                inner.state = LockState::Locked;
                inner.owner = Some(me);
                return Ok(());
            }
            let signal = Arc::new(RendezvousSignal::new());
            inner.entry.push_back(signal.clone());
            trace!("{me:?} queued on entry, {} waiting", inner.entry.len());
            signal
        };

        // whoever wakes us has already made us the owner
        signal.wait();
        Ok(())
    }

    /// Passes the lock to the next queued thread or unlocks it if there's none.
    ///
    /// # Errors
    /// [SyncError::NotOwner] or [SyncError::NotLocked] if the caller doesn't hold the lock.
    pub fn unlock(&self) -> Result<()> {
        let me = thread::current().id();
        let next = {
            let mut inner = self.inner.lock();
            inner.check_owner(me)?;
            inner.hand_off()
        };
        if let Some(signal) = next {
            signal.signal();
        }
        Ok(())
    }

    pub fn state(&self) -> LockState {
        self.inner.lock().state
    }

    pub fn is_locked(&self) -> bool {
        self.state() == LockState::Locked
    }

    pub fn is_unlocked(&self) -> bool {
        self.state() == LockState::Unlocked
    }

    pub fn is_held_by_current_thread(&self) -> bool {
        self.inner.lock().owner == Some(thread::current().id())
    }

    /// Number of threads blocked in [FairLock::lock].
    pub fn entry_len(&self) -> usize {
        self.inner.lock().entry.len()
    }

    /// Number of signalers waiting to get the lock back.
    pub fn urgent_len(&self) -> usize {
        self.inner.lock().urgent.len()
    }

    /// Creates a condition permanently bound to this lock.
    pub fn new_condition(&self) -> Condition {
        Condition::new(self.inner.clone())
    }
}

impl Default for FairLock {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod test {
    use std::{
        sync::Mutex,
        thread::{scope, sleep, yield_now},
        time::Duration,
    };

    use super::*;

    fn wait_until(f: impl Fn() -> bool) {
        while !f() {
            yield_now();
        }
    }

    #[test]
    fn test_fast_path() {
        let lock = FairLock::new();
        assert!(lock.is_unlocked());
        lock.lock().unwrap();
        assert!(lock.is_locked());
        assert!(lock.is_held_by_current_thread());
        lock.unlock().unwrap();
        assert!(lock.is_unlocked());
        assert!(!lock.is_held_by_current_thread());
    }

    #[test]
    fn test_reentrant_lock_is_an_error() {
        let lock = FairLock::new();
        lock.lock().unwrap();
        assert_eq!(
            lock.lock(),
            Err(SyncError::ReentrantLock(thread::current().id()))
        );
        // the failed attempt changes nothing
        assert!(lock.is_held_by_current_thread());
        assert_eq!(lock.entry_len(), 0);
        lock.unlock().unwrap();
    }

    #[test]
    fn test_unlock_errors() {
        let lock = FairLock::new();
        assert_eq!(lock.unlock(), Err(SyncError::NotLocked));

        lock.lock().unwrap();
        let owner = thread::current().id();
        scope(|s| {
            s.spawn(|| {
                let caller = thread::current().id();
                assert_eq!(lock.unlock(), Err(SyncError::NotOwner { caller, owner }));
            });
        });
        assert!(lock.is_held_by_current_thread());
        lock.unlock().unwrap();
    }

    #[test]
    fn test_fifo_admission() {
        let lock = FairLock::new();
        let order = Mutex::new(Vec::new());

        lock.lock().unwrap();
        scope(|s| {
            let (lock, order) = (&lock, &order);
            for i in 0..5 {
                // queue them one by one so the arrival order is known
                s.spawn(move || {
                    lock.lock().unwrap();
                    order.lock().unwrap().push(i);
                    lock.unlock().unwrap();
                });
                wait_until(|| lock.entry_len() == i + 1);
            }
            lock.unlock().unwrap();
        });

        assert_eq!(*order.lock().unwrap(), [0, 1, 2, 3, 4]);
        assert!(lock.is_unlocked());
    }

    #[test]
    fn test_ownership_is_handed_off() {
        let lock = FairLock::new();
        lock.lock().unwrap();
        scope(|s| {
            let waiter = s.spawn(|| {
                lock.lock().unwrap();
                let held = lock.is_held_by_current_thread();
                lock.unlock().unwrap();
                held
            });
            wait_until(|| lock.entry_len() == 1);
            lock.unlock().unwrap();
            assert!(waiter.join().unwrap());
        });
    }

    #[test]
    fn test_mutual_exclusion() {
        let lock = FairLock::new();
        let inside = Mutex::new(0);
        scope(|s| {
            for _ in 0..4 {
                s.spawn(|| {
                    for _ in 0..50 {
                        lock.lock().unwrap();
                        {
                            let mut n = inside.lock().unwrap();
                            *n += 1;
                            assert_eq!(*n, 1, "two owners at once");
                        }
                        sleep(Duration::from_micros(50));
                        *inside.lock().unwrap() -= 1;
                        lock.unlock().unwrap();
                    }
                });
            }
        });
        assert!(lock.is_unlocked());
    }
}
