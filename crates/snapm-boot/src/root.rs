//! Root-device resolution for a snapshot set (spec §4.4).

use snapm_core::{Error, Result, SnapshotSet};

use crate::fstab::Fstab;

/// Resolves a `UUID=`/`LABEL=` fstab `what` field to a device path. The real
/// implementation shells out to `blkid`; tests substitute a fake.
pub trait DeviceResolver {
    fn resolve(&self, identifier: &str, by_type: &str) -> Option<String>;
}

/// Resolves `UUID=`/`LABEL=` entries by shelling out to `blkid -t TYPE=VALUE -o device`.
#[derive(Debug, Default)]
pub struct BlkidResolver;

impl DeviceResolver for BlkidResolver {
    fn resolve(&self, identifier: &str, by_type: &str) -> Option<String> {
        let output = std::process::Command::new("blkid")
            .args(["-t", &format!("{}={}", by_type.to_uppercase(), identifier), "-o", "device"])
            .output()
            .ok()?;
        if !output.status.success() {
            return None;
        }
        let out = String::from_utf8_lossy(&output.stdout).trim().to_string();
        if out.is_empty() {
            None
        } else {
            Some(out)
        }
    }
}

/// Find the device that backs `/` for `set`, per spec §4.4's preference order:
/// (i) the `devpath` of the member whose mount point is `/`; (ii) if `origin`,
/// that member's `origin` device instead; (iii) the current `/` device
/// resolved via `/etc/fstab`.
pub fn find_snapset_root(set: &SnapshotSet, origin: bool, fstab: &Fstab, resolver: &dyn DeviceResolver) -> Result<String> {
    for snapshot in set.snapshots() {
        if snapshot.mount_point == "/" {
            if origin {
                return Ok(snapshot.origin.clone());
            }
            return Ok(snapshot.devpath.clone());
        }
    }

    for entry in fstab.lookup_where("/") {
        if let Some(ident) = entry.what.strip_prefix("UUID=") {
            if let Some(dev) = resolver.resolve(ident, "uuid") {
                return Ok(dev);
            }
        }
        if let Some(ident) = entry.what.strip_prefix("LABEL=") {
            if let Some(dev) = resolver.resolve(ident, "label") {
                return Ok(dev);
            }
        }
        if entry.what.starts_with('/') {
            return Ok(entry.what.clone());
        }
    }

    Err(Error::not_found(format!("could not find root device for snapset {}", set.name())))
}

#[cfg(test)]
mod tests {
    use super::*;
    use snapm_core::{SnapStatus, Snapshot};
    use std::io::Write;
    use tempfile::NamedTempFile;

    struct FakeResolver(Option<String>);
    impl DeviceResolver for FakeResolver {
        fn resolve(&self, _identifier: &str, _by_type: &str) -> Option<String> {
            self.0.clone()
        }
    }

    fn write_fstab(contents: &str) -> NamedTempFile {
        let mut f = NamedTempFile::new().unwrap();
        f.write_all(contents.as_bytes()).unwrap();
        f
    }

    #[test]
    fn prefers_member_devpath_when_root_is_in_the_set() {
        let mut snap = Snapshot::new("s0", "t", None, "/dev/vg0/root", 1000, "/", "lvm2-cow", 0, 0);
        snap.status = SnapStatus::Active;
        snap.devpath = "/dev/vg0/t".to_string();
        let set = SnapshotSet::new("t", 1000, vec![snap]).unwrap();
        let f = write_fstab("UUID=abcd / ext4 defaults 0 1\n");
        let fstab = Fstab::read(f.path()).unwrap();
        let resolver = FakeResolver(Some("/dev/sda1".to_string()));
        assert_eq!(find_snapset_root(&set, false, &fstab, &resolver).unwrap(), "/dev/vg0/t");
    }

    #[test]
    fn origin_flag_returns_origin_device() {
        let mut snap = Snapshot::new("s0", "t", None, "/dev/vg0/root", 1000, "/", "lvm2-cow", 0, 0);
        snap.devpath = "/dev/vg0/t".to_string();
        let set = SnapshotSet::new("t", 1000, vec![snap]).unwrap();
        let f = write_fstab("UUID=abcd / ext4 defaults 0 1\n");
        let fstab = Fstab::read(f.path()).unwrap();
        let resolver = FakeResolver(None);
        assert_eq!(find_snapset_root(&set, true, &fstab, &resolver).unwrap(), "/dev/vg0/root");
    }

    #[test]
    fn falls_back_to_fstab_uuid_resolution() {
        let snap = Snapshot::new("s0", "t", None, "/dev/vg0/var", 1000, "/var", "lvm2-cow", 0, 0);
        let set = SnapshotSet::new("t", 1000, vec![snap]).unwrap();
        let f = write_fstab("UUID=abcd / ext4 defaults 0 1\n");
        let fstab = Fstab::read(f.path()).unwrap();
        let resolver = FakeResolver(Some("/dev/sda1".to_string()));
        assert_eq!(find_snapset_root(&set, false, &fstab, &resolver).unwrap(), "/dev/sda1");
    }

    #[test]
    fn not_found_when_nothing_resolves() {
        let snap = Snapshot::new("s0", "t", None, "/dev/vg0/var", 1000, "/var", "lvm2-cow", 0, 0);
        let set = SnapshotSet::new("t", 1000, vec![snap]).unwrap();
        let f = write_fstab("UUID=abcd / ext4 defaults 0 1\n");
        let fstab = Fstab::read(f.path()).unwrap();
        let resolver = FakeResolver(None);
        assert!(find_snapset_root(&set, false, &fstab, &resolver).is_err());
    }
}
