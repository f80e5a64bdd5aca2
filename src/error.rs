use std::thread::ThreadId;

use thiserror::Error;

use crate::trace::Event;

/// Contract breaches of the lock, its conditions and the resource manager.
/// They are never retried: the caller did something illegal.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SyncError {
    #[error("thread {0:?} already owns the lock")]
    ReentrantLock(ThreadId),

    #[error("thread {caller:?} can't unlock a lock owned by {owner:?}")]
    NotOwner { caller: ThreadId, owner: ThreadId },

    #[error("unlock called while the lock is unlocked")]
    NotLocked,

    #[error("condition used by thread {0:?} without holding its lock")]
    ConditionNotOwned(ThreadId),

    #[error("release called while the resource is free")]
    ResourceAlreadyFree,
}

#[derive(Error, Debug)]
pub enum TraceError {
    #[error("unrecognized trace entry at line {line}: '{token}'")]
    Parse { line: usize, token: String },

    #[error("property violation at event #{index} ({event}): {reason}")]
    Violation {
        index: usize,
        event: Event,
        reason: &'static str,
    },

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, SyncError>;
