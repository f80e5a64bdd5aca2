pub mod driver;
pub mod error;
pub mod logging;
pub mod manager;
pub mod sync;
pub mod trace;

pub use error::{SyncError, TraceError};
pub use manager::{Priority, ResourceManager, ResourceState};
pub use sync::{Condition, FairLock, LockState, RendezvousSignal};
