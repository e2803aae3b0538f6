//! LVM2 CoW (`lvcreate --snapshot`) provider adapter.

use std::path::Path;

use snapm_core::{
    apply_lvm2_cow_floor, encode_snapshot_name, parse_snapshot_name, Error, Result, SizePolicy,
    SnapStatus, Snapshot, VolumeStats,
};
use snapm_provider::{Provider, ProviderCapabilities, ProviderKind, SourceRequest, TransactionHandle};

use crate::command::{report_args, run_lvm};

/// Adapter for LVM2's original copy-on-write snapshot mechanism
/// (`lvcreate --snapshot`), which allocates a fixed-size CoW exception store
/// per snapshot rather than sharing a thin pool.
#[derive(Debug, Default)]
pub struct Lvm2CowProvider;

impl Lvm2CowProvider {
    pub fn new() -> Self {
        Self
    }

    /// `vg_name/lv_name` split from a `/dev/vg_name/lv_name` style path.
    fn vg_lv_from_device(path: &Path) -> Option<(String, String)> {
        let s = path.to_str()?;
        let s = s.strip_prefix("/dev/")?;
        let (vg, lv) = s.split_once('/')?;
        Some((vg.to_string(), lv.to_string()))
    }

    fn vg_extent_size(&self, vg_name: &str) -> Result<u64> {
        let out = run_lvm("vgs", &[&report_args("vg_extent_size")[..], &[vg_name]].concat())?;
        parse_single_u64_field(&out, "vg_extent_size")
    }

    fn vg_free_bytes(&self, vg_name: &str) -> Result<u64> {
        let out = run_lvm("vgs", &[&report_args("vg_free")[..], &[vg_name]].concat())?;
        parse_single_u64_field(&out, "vg_free")
    }
}

/// Extremely small JSON-report field extractor: LVM2's `--reportformat json`
/// output is an object-of-arrays-of-objects; this pulls the first row's named
/// field as an integer-with-unit-suffix string (`"1234b"`) and strips the
/// trailing `b` the `--units b` flag guarantees.
fn parse_single_u64_field(report: &str, field: &str) -> Result<u64> {
    let value: serde_json::Value =
        serde_json::from_str(report).map_err(|e| Error::callout(format!("malformed LVM2 report: {e}")))?;
    let section = value
        .get("report")
        .and_then(|r| r.get(0))
        .and_then(|r| r.as_object())
        .ok_or_else(|| Error::callout("LVM2 report missing top-level section"))?;
    let row = section
        .values()
        .find_map(|rows| rows.as_array().and_then(|rows| rows.first()))
        .and_then(|row| row.get(field))
        .and_then(|v| v.as_str())
        .ok_or_else(|| Error::callout(format!("LVM2 report missing field {field}")))?;
    row.trim_end_matches('b')
        .parse()
        .map_err(|e| Error::callout(format!("malformed LVM2 size field {field:?}: {e}")))
}

impl Provider for Lvm2CowProvider {
    fn kind(&self) -> ProviderKind {
        ProviderKind::Lvm2Cow
    }

    fn detect_capabilities(&self, source: &Path) -> ProviderCapabilities {
        if Self::vg_lv_from_device(source).is_some() {
            ProviderCapabilities {
                kind: ProviderKind::Lvm2Cow,
                score: 50,
                notes: vec!["source resolves to an LVM2 logical volume".to_string()],
            }
        } else {
            ProviderCapabilities {
                kind: ProviderKind::Lvm2Cow,
                score: 0,
                notes: vec!["source is not an LVM2 device path".to_string()],
            }
        }
    }

    fn can_snapshot(&self, source: &Path) -> Result<bool> {
        Ok(Self::vg_lv_from_device(source).is_some())
    }

    fn origin_from_mount_point(&self, mount_point: &Path) -> Result<Option<String>> {
        let out = run_lvm("findmnt", &["-n", "-o", "SOURCE", "--target", &mount_point.to_string_lossy()])?;
        Ok(if out.is_empty() { None } else { Some(out) })
    }

    fn check_create_snapshot(&self, tx: &TransactionHandle, req: &SourceRequest<'_>) -> Result<()> {
        let (vg_name, _lv_name) = Self::vg_lv_from_device(req.source)
            .ok_or_else(|| Error::path(format!("{} is not an LVM2 device path", req.source.display())))?;

        let free = self.vg_free_bytes(&vg_name)?;
        let extent_size = self.vg_extent_size(&vg_name)?;
        let stats = VolumeStats {
            free,
            used: 0,
            dev_size: free,
        };
        let raw = req.policy.evaluate(stats)?;
        let size = apply_lvm2_cow_floor(raw, extent_size);

        let already_reserved = tx.reserved_for(&vg_name);
        if already_reserved + size > free {
            return Err(Error::no_space(format!(
                "volume group {vg_name} has {free} bytes free, {already_reserved} already reserved this transaction, need {size} more"
            )));
        }
        tx.reserve(&vg_name, size);
        Ok(())
    }

    fn create_snapshot(&self, _tx: &TransactionHandle, req: &SourceRequest<'_>) -> Result<Snapshot> {
        let (vg_name, lv_name) = Self::vg_lv_from_device(req.source)
            .ok_or_else(|| Error::path(format!("{} is not an LVM2 device path", req.source.display())))?;

        let extent_size = self.vg_extent_size(&vg_name)?;
        let free = self.vg_free_bytes(&vg_name)?;
        let stats = VolumeStats {
            free,
            used: 0,
            dev_size: free,
        };
        let raw = req.policy.evaluate(stats)?;
        let size = apply_lvm2_cow_floor(raw, extent_size);

        let snap_name = encode_snapshot_name(&lv_name, req.snapset_name, req.timestamp, req.mount_point);

        run_lvm(
            "lvcreate",
            &[
                "--snapshot",
                "--name",
                &snap_name,
                "--size",
                &format!("{size}b"),
                &format!("{vg_name}/{lv_name}"),
            ],
        )?;

        Ok(Snapshot::new(
            snap_name,
            req.snapset_name,
            None,
            req.source.to_string_lossy(),
            req.timestamp,
            req.mount_point,
            self.kind().to_string(),
            size,
            size,
        ))
    }

    fn rename_snapshot(&self, snapshot: &mut Snapshot, new_snapset_name: &str) -> Result<()> {
        snapshot.check_mutable()?;
        let (vg_name, lv_name) = Self::vg_lv_from_device(Path::new(&snapshot.origin))
            .ok_or_else(|| Error::path("snapshot origin is not an LVM2 device path"))?;
        let new_name = encode_snapshot_name(&lv_name, new_snapset_name, snapshot.timestamp, &snapshot.mount_point);
        run_lvm("lvrename", &[&vg_name, &snapshot.name, &new_name])?;
        snapshot.rename(new_name);
        snapshot.snapset_name = new_snapset_name.to_string();
        Ok(())
    }

    fn check_resize_snapshot(&self, tx: &TransactionHandle, snapshot: &Snapshot, policy: SizePolicy) -> Result<()> {
        let (vg_name, _) = Self::vg_lv_from_device(Path::new(&snapshot.origin))
            .ok_or_else(|| Error::path("snapshot origin is not an LVM2 device path"))?;
        let free = self.vg_free_bytes(&vg_name)?;
        let extent_size = self.vg_extent_size(&vg_name)?;
        let stats = VolumeStats {
            free,
            used: 0,
            dev_size: free,
        };
        let raw = policy.evaluate(stats)?;
        let size = apply_lvm2_cow_floor(raw, extent_size);
        let already = tx.reserved_for(&vg_name);
        if already + size > free + snapshot.size {
            return Err(Error::no_space(format!(
                "volume group {vg_name} cannot accommodate resize to {size} bytes"
            )));
        }
        tx.reserve(&vg_name, size);
        Ok(())
    }

    fn resize_snapshot(&self, snapshot: &mut Snapshot, policy: SizePolicy) -> Result<()> {
        snapshot.check_mutable()?;
        let (vg_name, _) = Self::vg_lv_from_device(Path::new(&snapshot.origin))
            .ok_or_else(|| Error::path("snapshot origin is not an LVM2 device path"))?;
        let free = self.vg_free_bytes(&vg_name)?;
        let extent_size = self.vg_extent_size(&vg_name)?;
        let stats = VolumeStats {
            free,
            used: 0,
            dev_size: free,
        };
        let raw = policy.evaluate(stats)?;
        let size = apply_lvm2_cow_floor(raw, extent_size);
        run_lvm("lvresize", &["--size", &format!("{size}b"), &format!("{vg_name}/{}", snapshot.name)])?;
        snapshot.size = size;
        Ok(())
    }

    fn check_revert_snapshot(&self, snapshot: &Snapshot) -> Result<()> {
        if snapshot.status == SnapStatus::Reverting {
            return Err(Error::busy(format!("snapshot {} revert already in progress", snapshot.name)));
        }
        Ok(())
    }

    fn revert_snapshot(&self, snapshot: &mut Snapshot) -> Result<()> {
        self.check_revert_snapshot(snapshot)?;
        let (vg_name, _) = Self::vg_lv_from_device(Path::new(&snapshot.origin))
            .ok_or_else(|| Error::path("snapshot origin is not an LVM2 device path"))?;
        run_lvm("lvconvert", &["--merge", &format!("{vg_name}/{}", snapshot.name)])?;
        snapshot.status = SnapStatus::Reverting;
        Ok(())
    }

    fn delete_snapshot(&self, snapshot: &Snapshot) -> Result<()> {
        let (vg_name, _) = Self::vg_lv_from_device(Path::new(&snapshot.origin))
            .ok_or_else(|| Error::path("snapshot origin is not an LVM2 device path"))?;
        run_lvm("lvremove", &["--force", &format!("{vg_name}/{}", snapshot.name)])?;
        Ok(())
    }

    fn activate_snapshot(&self, snapshot: &mut Snapshot) -> Result<()> {
        let (vg_name, _) = Self::vg_lv_from_device(Path::new(&snapshot.origin))
            .ok_or_else(|| Error::path("snapshot origin is not an LVM2 device path"))?;
        run_lvm("lvchange", &["--activate", "y", &format!("{vg_name}/{}", snapshot.name)])?;
        snapshot.status = SnapStatus::Active;
        snapshot.devpath = format!("/dev/{vg_name}/{}", snapshot.name);
        Ok(())
    }

    fn deactivate_snapshot(&self, snapshot: &mut Snapshot) -> Result<()> {
        let (vg_name, _) = Self::vg_lv_from_device(Path::new(&snapshot.origin))
            .ok_or_else(|| Error::path("snapshot origin is not an LVM2 device path"))?;
        run_lvm("lvchange", &["--activate", "n", &format!("{vg_name}/{}", snapshot.name)])?;
        snapshot.status = SnapStatus::Inactive;
        snapshot.devpath.clear();
        Ok(())
    }

    fn set_autoactivate(&self, snapshot: &mut Snapshot, auto: bool) -> Result<()> {
        let (vg_name, _) = Self::vg_lv_from_device(Path::new(&snapshot.origin))
            .ok_or_else(|| Error::path("snapshot origin is not an LVM2 device path"))?;
        run_lvm(
            "lvchange",
            &["--setautoactivation", if auto { "y" } else { "n" }, &format!("{vg_name}/{}", snapshot.name)],
        )?;
        snapshot.autoactivate = auto;
        Ok(())
    }

    fn discover_snapshots(&self) -> Result<Vec<Snapshot>> {
        let out = run_lvm("lvs", &report_args("vg_name,lv_name,origin,lv_size"))?;
        let report: serde_json::Value =
            serde_json::from_str(&out).map_err(|e| Error::callout(format!("malformed lvs report: {e}")))?;
        let mut snapshots = Vec::new();
        let Some(rows) = report
            .get("report")
            .and_then(|r| r.get(0))
            .and_then(|r| r.get("lv"))
            .and_then(|v| v.as_array())
        else {
            return Ok(snapshots);
        };
        for row in rows {
            let (Some(lv_name), Some(origin)) = (
                row.get("lv_name").and_then(|v| v.as_str()),
                row.get("origin").and_then(|v| v.as_str()),
            ) else {
                continue;
            };
            if origin.is_empty() {
                continue; // not a snapshot LV
            }
            let Some((snapset_name, timestamp, mount_point)) = parse_snapshot_name(lv_name, origin) else {
                continue; // unparsable name: skip during discovery (spec §6)
            };
            let vg_name = row.get("vg_name").and_then(|v| v.as_str()).unwrap_or_default();
            let size = row
                .get("lv_size")
                .and_then(|v| v.as_str())
                .and_then(|s| s.trim_end_matches('b').parse().ok())
                .unwrap_or(0);
            snapshots.push(Snapshot::new(
                lv_name,
                snapset_name,
                None,
                format!("/dev/{vg_name}/{origin}"),
                timestamp,
                mount_point,
                self.kind().to_string(),
                size,
                0,
            ));
        }
        Ok(snapshots)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn vg_lv_split() {
        assert_eq!(
            Lvm2CowProvider::vg_lv_from_device(Path::new("/dev/vg0/root")),
            Some(("vg0".to_string(), "root".to_string()))
        );
        assert_eq!(Lvm2CowProvider::vg_lv_from_device(Path::new("/dev/sda1")), None);
    }

    #[test]
    fn detect_capabilities_scores_lvm_device() {
        let provider = Lvm2CowProvider::new();
        let caps = provider.detect_capabilities(Path::new("/dev/vg0/root"));
        assert_eq!(caps.score, 50);
        let caps = provider.detect_capabilities(Path::new("/dev/sda1"));
        assert_eq!(caps.score, 0);
    }

    #[test]
    fn parse_vgs_report_field() {
        let report = r#"{"report":[{"vg":[{"vg_free":"1073741824b"}]}]}"#;
        assert_eq!(parse_single_u64_field(report, "vg_free").unwrap(), 1073741824);
    }
}
