//! LVM2-CoW and LVM2-Thin provider adapters (spec §4.1, §4.3, §9).
//!
//! Grounded on the algorithmic detail in `snapm/manager/plugins/lvm2.py`
//! (free-space accounting, the 512 MiB CoW floor) and on the shelling-out
//! style of `ah-fs-snapshots-btrfs` (isolated command builder functions so
//! tests can assert on argument vectors without a live LVM2 stack).

mod command;
mod cow;
mod thin;

pub use command::LVM_SYSTEM_DIR_ENV;
pub use cow::Lvm2CowProvider;
pub use thin::Lvm2ThinProvider;
