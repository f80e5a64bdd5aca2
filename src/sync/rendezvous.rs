//! # Rendezvous signal
//! A one-shot handshake between exactly one waiter and one signaler.
//!
//! The flag is a futex word: 0 - not signaled, 1 - signaled.
//! [RendezvousSignal::wait] consumes the flag with a swap, so a spurious return of the
//! `wait` syscall just loops back to sleep and never leaks out to the caller.
//!
//! The signal also remembers the thread that created it. The lock uses that to hand
//! ownership over to the right thread *before* waking it.

use std::{
    sync::atomic::{
        AtomicU32,
        Ordering::{Acquire, Release},
    },
    thread::{self, ThreadId},
};

use atomic_wait::{wait, wake_one};

pub struct RendezvousSignal {
    signaled: AtomicU32,
    owner: ThreadId,
}

impl RendezvousSignal {
    /// Creates a signal owned by the calling thread.
    pub fn new() -> Self {
        Self {
            signaled: AtomicU32::new(0),
            owner: thread::current().id(),
        }
    }

    /// The thread that's going to wait on this signal.
    pub fn owner(&self) -> ThreadId {
        self.owner
    }

    /// Blocks until [RendezvousSignal::signal] is called, then clears the flag.
    pub fn wait(&self) {
        // Acquire pairs with the Release in signal => everything the signaler did is visible
        while self.signaled.swap(0, Acquire) == 0 {
            wait(&self.signaled, 0);
        }
    }

    /// Sets the flag and wakes the waiter, if it's asleep already.
    ///
    /// Must be called at most once per wait. The signaler has to keep the signal alive
    /// until this returns, which is why the queues share signals through `Arc`.
    pub fn signal(&self) {
        let previous = self.signaled.swap(1, Release);
        debug_assert_eq!(previous, 0, "rendezvous signaled twice");
        wake_one(&self.signaled);
    }
}

impl Default for RendezvousSignal {
    fn default() -> Self {
        Self::new()
    }
}
