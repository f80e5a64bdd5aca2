//! # Resource manager
//! A single Free/Busy resource shared by two priority classes, written as a monitor on top of
//! [FairLock] and two [Condition]s.
//!
//! - `request` takes the resource if it's free, otherwise waits on the condition of its class
//! - `release` hands the resource straight to a waiter, B before A, or frees it
//!
//! The hand-off doesn't touch the state: the resource stays Busy and the woken waiter
//! returns from `request` owning it. Within a class the order is FIFO.
//! Class A can be starved by a steady stream of class B requests, that's the policy.

use std::cell::UnsafeCell;

use log::debug;
use strum_macros::{Display, EnumIter, EnumString};

use crate::{
    error::{Result, SyncError},
    sync::{Condition, FairLock},
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumString, EnumIter)]
pub enum Priority {
    A,
    B,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Display)]
pub enum ResourceState {
    Free,
    Busy,
}

pub struct ResourceManager {
    lock: FairLock,
    condition_a: Condition,
    condition_b: Condition,
    state: UnsafeCell<ResourceState>,
}

/// The state is only touched by the owner of `lock`, which makes the manager safe to share.
unsafe impl Sync for ResourceManager {}

impl ResourceManager {
    pub fn new() -> Self {
        let lock = FairLock::new();
        let condition_a = lock.new_condition();
        let condition_b = lock.new_condition();
        Self {
            lock,
            condition_a,
            condition_b,
            state: UnsafeCell::new(ResourceState::Free),
        }
    }

    fn condition(&self, priority: Priority) -> &Condition {
        match priority {
            Priority::A => &self.condition_a,
            Priority::B => &self.condition_b,
        }
    }

    // SAFETY: the callers below hold `lock`
    fn load(&self) -> ResourceState {
        debug_assert!(self.lock.is_held_by_current_thread());
        unsafe { *self.state.get() }
    }

    fn store(&self, state: ResourceState) {
        debug_assert!(self.lock.is_held_by_current_thread());
        unsafe { *self.state.get() = state }
    }

    pub fn state(&self) -> Result<ResourceState> {
        self.lock.lock()?;
        let state = self.load();
        self.lock.unlock()?;
        Ok(state)
    }

    pub fn is_free(&self) -> Result<bool> {
        Ok(self.state()? == ResourceState::Free)
    }

    /// Number of threads of the given class blocked in `request`.
    pub fn waiting(&self, priority: Priority) -> usize {
        self.condition(priority).len()
    }

    /// Blocks until the caller holds the resource.
    pub fn request(&self, priority: Priority) -> Result<()> {
        self.request_with(priority, &mut || {})
    }

    /// [ResourceManager::request] that runs `admitted` inside the monitor, before anything is decided.
    /// The hook must not call back into the manager.
    pub fn request_with(&self, priority: Priority, admitted: &mut dyn FnMut()) -> Result<()> {
        self.lock.lock()?;
        admitted();

        if self.load() == ResourceState::Free {
            self.store(ResourceState::Busy);
            debug!("class {priority} takes the free resource");
        } else {
            debug!("class {priority} waits for the resource");
            // comes back owning both the lock and the resource
            self.condition(priority).wait()?;
        }

        self.lock.unlock()
    }

    /// Gives the resource to the next waiter, or frees it.
    ///
    /// # Errors
    /// [SyncError::ResourceAlreadyFree] if nobody holds the resource.
    pub fn release(&self) -> Result<()> {
        self.release_with(&mut || {})
    }

    /// [ResourceManager::release] that runs `admitted` inside the monitor, before anything is decided.
    /// The hook must not call back into the manager.
    pub fn release_with(&self, admitted: &mut dyn FnMut()) -> Result<()> {
        self.lock.lock()?;
        admitted();

        if self.load() == ResourceState::Free {
            self.lock.unlock()?;
            return Err(SyncError::ResourceAlreadyFree);
        }

        if !self.condition_b.is_empty() {
            debug!("handing the resource to class B");
            self.condition_b.signal()?;
        } else if !self.condition_a.is_empty() {
            debug!("handing the resource to class A");
            self.condition_a.signal()?;
        } else {
            debug!("resource is free");
            self.store(ResourceState::Free);
        }

        self.lock.unlock()
    }
}

impl Default for ResourceManager {
    fn default() -> Self {
        Self::new()
    }
}
