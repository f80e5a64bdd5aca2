//! # Condition
//! A condition variable with "signal and urgent" semantics, bound to one [FairLock](super::FairLock).
//!
//! [Condition::signal] doesn't just wake a waiter: it makes the waiter the lock's owner right away
//! and parks the signaler on the lock's urgent queue. The signaler gets the lock back as soon as the
//! waiter lets it go, ahead of any thread blocked in `lock`.
//!
//! There are no spurious wake-ups: every waiter sleeps on its own [RendezvousSignal] that's fired
//! exactly once, by the thread that made it the owner.
//!
//! Locking order: the lock's internal mutex, then the condition's queue. Never the other way around.

use std::{
    sync::Arc,
    thread::{self, ThreadId},
};

use log::trace;

use super::{
    fair_lock::{LockInner, SignalQueue},
    futex_mutex::FutexMutex,
    RendezvousSignal,
};
use crate::error::{Result, SyncError};

pub struct Condition {
    lock: Arc<FutexMutex<LockInner>>,
    waiters: FutexMutex<SignalQueue>,
}

impl Condition {
    pub(crate) fn new(lock: Arc<FutexMutex<LockInner>>) -> Self {
        Self {
            lock,
            waiters: FutexMutex::new(SignalQueue::new()),
        }
    }

    fn check_owner(inner: &LockInner, caller: ThreadId) -> Result<()> {
        if inner.owner == Some(caller) {
            Ok(())
        } else {
            Err(SyncError::ConditionNotOwned(caller))
        }
    }

    /// Releases the lock and blocks until signaled. Returns holding the lock again.
    ///
    /// # Errors
    /// [SyncError::ConditionNotOwned] if the caller doesn't hold the bound lock.
    pub fn wait(&self) -> Result<()> {
        let me = thread::current().id();
        let (signal, next) = {
            let mut inner = self.lock.lock();
            Self::check_owner(&inner, me)?;

            let signal = Arc::new(RendezvousSignal::new());
            self.waiters.lock().push_back(signal.clone());
            trace!("{me:?} waits on a condition");

            // enqueue and unlock in one go => no signal can slip in between
            (signal, inner.hand_off())
        };
        if let Some(next) = next {
            next.signal();
        }

        // the signaler has made us the owner before waking us
        signal.wait();
        Ok(())
    }

    /// Hands the lock to the longest waiting thread and blocks on the urgent queue until it's back.
    /// Does nothing if nobody waits.
    ///
    /// # Errors
    /// [SyncError::ConditionNotOwned] if the caller doesn't hold the bound lock.
    pub fn signal(&self) -> Result<()> {
        let me = thread::current().id();
        let (waiter, urgent) = {
            let mut inner = self.lock.lock();
            Self::check_owner(&inner, me)?;

            let Some(waiter) = self.waiters.lock().pop_front() else {
                return Ok(());
            };

            let urgent = Arc::new(RendezvousSignal::new());
            inner.urgent.push_back(urgent.clone());
            inner.owner = Some(waiter.owner());
            trace!("{me:?} signals {:?} and goes urgent", waiter.owner());
            (waiter, urgent)
        };

        waiter.signal();
        // resumed by unlock's urgent branch, owning the lock again
        urgent.wait();
        Ok(())
    }

    /// Number of parked waiters.
    pub fn len(&self) -> usize {
        self.waiters.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod test {
    use std::{
        sync::Mutex,
        thread::{scope, yield_now},
    };

    use super::*;
    use crate::sync::FairLock;

    fn wait_until(f: impl Fn() -> bool) {
        while !f() {
            yield_now();
        }
    }

    #[test]
    fn test_signal_without_waiters_keeps_ownership() {
        let lock = FairLock::new();
        let cond = lock.new_condition();
        lock.lock().unwrap();
        cond.signal().unwrap();
        assert!(lock.is_held_by_current_thread());
        assert_eq!(lock.urgent_len(), 0);
        lock.unlock().unwrap();
    }

    #[test]
    fn test_requires_ownership() {
        let lock = FairLock::new();
        let cond = lock.new_condition();
        let me = thread::current().id();
        assert_eq!(cond.wait(), Err(SyncError::ConditionNotOwned(me)));
        assert_eq!(cond.signal(), Err(SyncError::ConditionNotOwned(me)));

        // a different lock doesn't count either
        let other = FairLock::new();
        other.lock().unwrap();
        assert_eq!(cond.signal(), Err(SyncError::ConditionNotOwned(me)));
        other.unlock().unwrap();
        assert!(cond.is_empty());
    }

    #[test]
    fn test_wait_releases_and_reacquires() {
        let lock = FairLock::new();
        let cond = lock.new_condition();
        scope(|s| {
            let waiter = s.spawn(|| {
                lock.lock().unwrap();
                cond.wait().unwrap();
                let held = lock.is_held_by_current_thread();
                lock.unlock().unwrap();
                held
            });

            wait_until(|| cond.len() == 1);
            // the waiter gave the lock up
            lock.lock().unwrap();
            cond.signal().unwrap();
            // and we've got it back
            assert!(lock.is_held_by_current_thread());
            lock.unlock().unwrap();

            assert!(waiter.join().unwrap());
        });
        assert!(lock.is_unlocked());
        assert!(cond.is_empty());
    }

    #[test]
    fn test_waiters_resume_in_fifo_order() {
        let lock = FairLock::new();
        let cond = lock.new_condition();
        let order = Mutex::new(Vec::new());
        scope(|s| {
            let (lock, cond, order) = (&lock, &cond, &order);
            for i in 0..4 {
                s.spawn(move || {
                    lock.lock().unwrap();
                    cond.wait().unwrap();
                    order.lock().unwrap().push(i);
                    lock.unlock().unwrap();
                });
                wait_until(|| cond.len() == i + 1);
            }
            for _ in 0..4 {
                lock.lock().unwrap();
                cond.signal().unwrap();
                lock.unlock().unwrap();
            }
        });
        assert_eq!(*order.lock().unwrap(), [0, 1, 2, 3]);
    }

    #[test]
    fn test_signaler_resumes_before_entrants() {
        let lock = FairLock::new();
        let cond = lock.new_condition();
        let log = Mutex::new(Vec::new());
        scope(|s| {
            let (lock, cond, log) = (&lock, &cond, &log);
            s.spawn(move || {
                lock.lock().unwrap();
                cond.wait().unwrap();
                log.lock().unwrap().push("waiter");
                lock.unlock().unwrap();
            });
            wait_until(|| cond.len() == 1);

            lock.lock().unwrap();
            for _ in 0..2 {
                s.spawn(move || {
                    lock.lock().unwrap();
                    log.lock().unwrap().push("entrant");
                    lock.unlock().unwrap();
                });
            }
            wait_until(|| lock.entry_len() == 2);

            cond.signal().unwrap();
            log.lock().unwrap().push("signaler");
            lock.unlock().unwrap();
        });
        assert_eq!(
            *log.lock().unwrap(),
            ["waiter", "signaler", "entrant", "entrant"]
        );
    }
}
