//! High level boot-entry operations for a snapshot set (spec §4.4).

use snapm_core::{Error, Result, SnapshotSet};

use crate::entry_store::{BootEntrySpec, BootEntryStore, REVERT_ARG, SNAPSET_ARG};
use crate::fstab::Fstab;
use crate::mount_list::{build_snapset_mount_list, build_swap_list};
use crate::root::{find_snapset_root, DeviceResolver};

/// The running kernel's UTS release (`uname -r`), used as a boot entry's
/// `version` field.
pub fn uts_release() -> Result<String> {
    let uts = nix::sys::utsname::uname().map_err(|e| Error::system(format!("uname() failed: {e}")))?;
    Ok(uts.release().to_string_lossy().into_owned())
}

/// Create a boot entry that boots directly into `set`'s snapshots, tagging
/// the kernel command line with `snapm.snapset=<uuid>` and recording the
/// association on `set.boot_entry`.
pub fn create_snapset_boot_entry(
    set: &mut SnapshotSet,
    fstab: &Fstab,
    resolver: &dyn DeviceResolver,
    store: &dyn BootEntryStore,
    title: Option<String>,
) -> Result<()> {
    let version = uts_release()?;
    let title = title.unwrap_or_else(|| format!("Snapshot {} {} ({version})", set.name(), set.timestamp()));
    let root_device = find_snapset_root(set, false, fstab, resolver)?;
    let mounts = build_snapset_mount_list(set, fstab);
    let swaps = build_swap_list(fstab);
    let tag_arg = format!("{SNAPSET_ARG}={}", set.uuid());

    store.create_entry(&BootEntrySpec { version, title, tag_arg, root_device, mounts, swaps })?;
    set.boot_entry = Some(set.uuid());
    tracing::debug!(uuid = %set.uuid(), "created boot entry for snapshot set");
    Ok(())
}

/// Create a boot entry that reverts `set`'s sources to their pre-snapshot
/// state on next boot, tagged `snapm.revert=<uuid>`.
pub fn create_snapset_revert_entry(
    set: &mut SnapshotSet,
    fstab: &Fstab,
    resolver: &dyn DeviceResolver,
    store: &dyn BootEntryStore,
    title: Option<String>,
) -> Result<()> {
    let version = uts_release()?;
    let title = title.unwrap_or_else(|| format!("Revert {} {} ({version})", set.name(), set.timestamp()));
    let root_device = find_snapset_root(set, true, fstab, resolver)?;
    let tag_arg = format!("{REVERT_ARG}={}", set.uuid());

    store.create_entry(&BootEntrySpec { version, title, tag_arg, root_device, mounts: vec![], swaps: vec![] })?;
    set.revert_entry = Some(set.uuid());
    tracing::debug!(uuid = %set.uuid(), "created revert entry for snapshot set");
    Ok(())
}

fn delete_by_uuid(uuid: uuid::Uuid, entry_arg: &str, store: &dyn BootEntryStore) -> Result<()> {
    for entry in store.find_entries()? {
        let tag = format!("{entry_arg}=");
        if entry.options.split_whitespace().any(|w| w == format!("{tag}{uuid}")) {
            store.delete_entry(&entry.boot_id)?;
        }
    }
    Ok(())
}

pub fn delete_snapset_boot_entry(set: &mut SnapshotSet, store: &dyn BootEntryStore) -> Result<()> {
    let Some(uuid) = set.boot_entry else { return Ok(()) };
    delete_by_uuid(uuid, SNAPSET_ARG, store)?;
    set.boot_entry = None;
    Ok(())
}

pub fn delete_snapset_revert_entry(set: &mut SnapshotSet, store: &dyn BootEntryStore) -> Result<()> {
    let Some(uuid) = set.revert_entry else { return Ok(()) };
    delete_by_uuid(uuid, REVERT_ARG, store)?;
    set.revert_entry = None;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entry_store::FakeBootEntryStore;
    use snapm_core::Snapshot;
    use std::io::Write;
    use tempfile::NamedTempFile;

    struct NoResolver;
    impl DeviceResolver for NoResolver {
        fn resolve(&self, _identifier: &str, _by_type: &str) -> Option<String> {
            None
        }
    }

    fn write_fstab(contents: &str) -> NamedTempFile {
        let mut f = NamedTempFile::new().unwrap();
        f.write_all(contents.as_bytes()).unwrap();
        f
    }

    #[test]
    fn create_and_delete_boot_entry_round_trips() {
        let mut snap = Snapshot::new("s0", "t", None, "/dev/vg0/root", 1000, "/", "lvm2-cow", 0, 0);
        snap.devpath = "/dev/vg0/t".to_string();
        let mut set = SnapshotSet::new("t", 1000, vec![snap]).unwrap();
        let f = write_fstab("UUID=abcd / ext4 defaults 0 1\n");
        let fstab = Fstab::read(f.path()).unwrap();
        let resolver = NoResolver;
        let store = FakeBootEntryStore::new();

        create_snapset_boot_entry(&mut set, &fstab, &resolver, &store, None).unwrap();
        assert_eq!(set.boot_entry, Some(set.uuid()));
        assert_eq!(store.find_entries().unwrap().len(), 1);

        delete_snapset_boot_entry(&mut set, &store).unwrap();
        assert!(set.boot_entry.is_none());
        assert!(store.find_entries().unwrap().is_empty());
    }

    #[test]
    fn deleting_without_an_entry_is_a_no_op() {
        let snap = Snapshot::new("s0", "t", None, "/dev/vg0/root", 1000, "/", "lvm2-cow", 0, 0);
        let mut set = SnapshotSet::new("t", 1000, vec![snap]).unwrap();
        let store = FakeBootEntryStore::new();
        assert!(delete_snapset_revert_entry(&mut set, &store).is_ok());
    }
}
