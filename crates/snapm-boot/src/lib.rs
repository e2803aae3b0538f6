//! Boot loader integration: fstab parsing, kernel command line tagging, and
//! boot entry lifecycle management (spec §4.4).

mod entry_store;
mod fstab;
mod mount_list;
mod ops;
mod root;

pub use entry_store::{
    BootCache, BootEntry, BootEntryCache, BootEntrySpec, BootEntryStore, FakeBootEntryStore,
    REVERT_ARG, SNAPSET_ARG,
};
pub use fstab::{Fstab, FstabEntry};
pub use mount_list::{build_snapset_mount_list, build_swap_list};
pub use ops::{
    create_snapset_boot_entry, create_snapset_revert_entry, delete_snapset_boot_entry,
    delete_snapset_revert_entry, uts_release,
};
pub use root::{find_snapset_root, BlkidResolver, DeviceResolver};
