//! Snapshot set manager: provider orchestration, discovery, lifecycle
//! operations, and chroot mount support (spec §4.2, §4.7).

mod critical;
mod lock;
mod manager;
mod mounts;

pub use critical::{JournalGuard, SignalGuard};
pub use lock::{default_lock_path, ManagerLock};
pub use manager::{Manager, SourceSpec};
pub use mounts::{Mounts, RootMount, SysMount};
