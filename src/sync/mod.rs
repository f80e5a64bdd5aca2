//! # Fair lock and signal-and-urgent conditions
//!
//! The building blocks, bottom-up:
//! - `futex_mutex` - a short internal mutex for the bookkeeping, on top of futex wait & wake
//! - [RendezvousSignal] - one waiter, one signaler, one shot
//! - [FairLock] - FIFO admission with direct ownership hand-off
//! - [Condition] - Hoare-style condition variable bound to a [FairLock]
//!
//! Blocking goes through the [atomic-wait](https://crates.io/crates/atomic-wait) crate:
//! - `wait(&AtomicU32, u32)` - blocks only if the atomic still has the given value, may wake up spuriously
//! - `wake_one(&AtomicU32)` - wakes a single thread waiting on the same atomic
//!
//! None of the locks are reentrant. Nothing here times out or can be cancelled.

mod condition;
mod fair_lock;
pub(crate) mod futex_mutex;
mod rendezvous;

pub use condition::Condition;
pub use fair_lock::{FairLock, LockState};
pub use rendezvous::RendezvousSignal;
