//! # Internal mutex
//! The short critical section guarding the bookkeeping of [FairLock](super::FairLock) and
//! each [Condition](super::Condition). It's never held while a thread waits for its turn,
//! only while queues and the owner field are touched.
//!
//! The state word has 3 values so the unlock path can skip `wake_one` when nobody waits:
//! - 0 - unlocked
//! - 1 - locked, no other threads
//! - 2 - locked, other threads are waiting
//!
//! Contended lockers spin for a short while first, as the section is expected to be brief,
//! then fall back to the `wait` syscall.
//!
//! It's not fair on its own. Fairness is the job of the queues it protects.

use std::{
    cell::UnsafeCell,
    ops::{Deref, DerefMut},
    sync::atomic::{
        AtomicU32,
        Ordering::{Acquire, Relaxed, Release},
    },
};

use atomic_wait::{wait, wake_one};

const UNLOCKED: u32 = 0;
const LOCKED: u32 = 1;
const CONTENDED: u32 = 2;

const SPIN_LIMIT: u32 = 100;

pub(crate) struct FutexMutex<Y> {
    state: AtomicU32,
    value: UnsafeCell<Y>,
}

/// it's safe to share if the underlying value is safe to send
unsafe impl<Y> Sync for FutexMutex<Y> where Y: Send {}

impl<Y> FutexMutex<Y> {
    pub(crate) const fn new(value: Y) -> Self {
        Self {
            state: AtomicU32::new(UNLOCKED),
            value: UnsafeCell::new(value),
        }
    }

    pub(crate) fn lock(&self) -> FutexGuard<'_, Y> {
        if self
            .state
            .compare_exchange(UNLOCKED, LOCKED, Acquire, Relaxed)
            .is_err()
        {
            Self::lock_contended(&self.state);
        }
        FutexGuard { mutex: self }
    }

    #[cold]
    fn lock_contended(state: &AtomicU32) {
        let mut spin_count = 0;

        // only spin on 1, a 2 means somebody already gave up and went to sleep
        while state.load(Relaxed) == LOCKED && spin_count < SPIN_LIMIT {
            spin_count += 1;
            std::hint::spin_loop();
        }

        if state
            .compare_exchange(UNLOCKED, LOCKED, Acquire, Relaxed)
            .is_ok()
        {
            return;
        }

        // leave 2 behind so the unlocker knows to wake somebody
        while state.swap(CONTENDED, Acquire) != UNLOCKED {
            wait(state, CONTENDED);
        }
    }
}

pub(crate) struct FutexGuard<'a, Y> {
    mutex: &'a FutexMutex<Y>,
}

impl<Y> Deref for FutexGuard<'_, Y> {
    type Target = Y;
    fn deref(&self) -> &Self::Target {
        // SAFETY: existence of the guard means the mutex is locked
        unsafe { &*self.mutex.value.get() }
    }
}

impl<Y> DerefMut for FutexGuard<'_, Y> {
    fn deref_mut(&mut self) -> &mut Self::Target {
        // SAFETY: existence of the guard means the mutex is locked
        unsafe { &mut *self.mutex.value.get() }
    }
}

impl<Y> Drop for FutexGuard<'_, Y> {
    fn drop(&mut self) {
        if self.mutex.state.swap(UNLOCKED, Release) == CONTENDED {
            wake_one(&self.mutex.state);
        }
    }
}
