//! Boot-entry mount/swap unit synthesis (spec §4.4).

use snapm_core::SnapshotSet;

use crate::fstab::Fstab;

/// Build `WHAT:WHERE:FSTYPE:OPTS` strings for every fstab row except `/` and
/// swap entries, substituting the set's own snapshot devpath wherever a row's
/// mount point is one of the set's members.
pub fn build_snapset_mount_list(set: &SnapshotSet, fstab: &Fstab) -> Vec<String> {
    let mut mounts = Vec::new();
    for entry in fstab.entries() {
        if entry.where_ == "/" || entry.fstype == "swap" {
            continue;
        }
        if let Some(snapshot) = set.snapshots().iter().find(|s| s.mount_point == entry.where_) {
            mounts.push(format!(
                "{}:{}:{}:{}",
                snapshot.devpath, entry.where_, entry.fstype, entry.options
            ));
        } else {
            mounts.push(format!(
                "{}:{}:{}:{}",
                entry.what, entry.where_, entry.fstype, entry.options
            ));
        }
    }
    mounts
}

/// Build `WHAT:OPTIONS` strings for every swap row in `fstab`.
pub fn build_swap_list(fstab: &Fstab) -> Vec<String> {
    fstab
        .entries()
        .iter()
        .filter(|e| e.fstype == "swap")
        .map(|e| format!("{}:{}", e.what, e.options))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use snapm_core::Snapshot;
    use std::io::Write;
    use tempfile::NamedTempFile;

    fn write_fstab(contents: &str) -> NamedTempFile {
        let mut f = NamedTempFile::new().unwrap();
        f.write_all(contents.as_bytes()).unwrap();
        f
    }

    #[test]
    fn substitutes_devpath_for_set_members_and_skips_root_and_swap() {
        let mut var_snap = Snapshot::new("s0", "t", None, "/dev/vg0/var", 1000, "/var", "lvm2-cow", 0, 0);
        var_snap.devpath = "/dev/vg0/t_var".to_string();
        let set = SnapshotSet::new("t", 1000, vec![var_snap]).unwrap();
        let f = write_fstab(
            "UUID=abcd / ext4 defaults 0 1\n/dev/vg0/var /var ext4 defaults 0 2\n/dev/sda3 none swap sw 0 0\n/dev/vg0/home /home ext4 defaults 0 2\n",
        );
        let fstab = Fstab::read(f.path()).unwrap();
        let mounts = build_snapset_mount_list(&set, &fstab);
        assert_eq!(mounts, vec![
            "/dev/vg0/t_var:/var:ext4:defaults".to_string(),
            "/dev/vg0/home:/home:ext4:defaults".to_string(),
        ]);
    }

    #[test]
    fn swap_list_extracts_swap_rows_only() {
        let f = write_fstab(
            "UUID=abcd / ext4 defaults 0 1\n/dev/sda3 none swap sw 0 0\n",
        );
        let fstab = Fstab::read(f.path()).unwrap();
        assert_eq!(build_swap_list(&fstab), vec!["/dev/sda3:sw".to_string()]);
    }
}
