//! LVM2 Thin (`lvcreate --snapshot` of a thin-pool-backed LV) provider adapter.
//!
//! Unlike the CoW adapter, free space is a property of the shared thin pool
//! (`data_percent` consumed out of `pool_size`), not of the volume group.

use std::path::Path;

use snapm_core::{
    encode_snapshot_name, parse_snapshot_name, round_up_to_sector, Error, Result, SizePolicy,
    SnapStatus, Snapshot, VolumeStats,
};
use snapm_provider::{Provider, ProviderCapabilities, ProviderKind, SourceRequest, TransactionHandle};

use crate::command::{report_args, run_lvm};

#[derive(Debug, Default)]
pub struct Lvm2ThinProvider;

impl Lvm2ThinProvider {
    pub fn new() -> Self {
        Self
    }

    fn vg_lv_from_device(path: &Path) -> Option<(String, String)> {
        let s = path.to_str()?;
        let s = s.strip_prefix("/dev/")?;
        let (vg, lv) = s.split_once('/')?;
        Some((vg.to_string(), lv.to_string()))
    }

    /// `(pool_name, pool_size, data_percent)` for the thin pool backing `lv_name`.
    fn pool_info(&self, vg_name: &str, lv_name: &str) -> Result<(String, u64, f64)> {
        let out = run_lvm(
            "lvs",
            &[&report_args("pool_lv,lv_size,data_percent")[..], &[&format!("{vg_name}/{lv_name}")]].concat(),
        )?;
        let report: serde_json::Value =
            serde_json::from_str(&out).map_err(|e| Error::callout(format!("malformed lvs report: {e}")))?;
        let row = report
            .get("report")
            .and_then(|r| r.get(0))
            .and_then(|r| r.get("lv"))
            .and_then(|v| v.as_array())
            .and_then(|rows| rows.first())
            .ok_or_else(|| Error::callout("lvs report missing pool row"))?;
        let pool_name = row
            .get("pool_lv")
            .and_then(|v| v.as_str())
            .ok_or_else(|| Error::path(format!("{lv_name} is not backed by a thin pool")))?
            .to_string();
        let pool_size: u64 = row
            .get("lv_size")
            .and_then(|v| v.as_str())
            .and_then(|s| s.trim_end_matches('b').parse().ok())
            .ok_or_else(|| Error::callout("malformed lv_size field"))?;
        let data_percent: f64 = row
            .get("data_percent")
            .and_then(|v| v.as_str())
            .and_then(|s| s.parse().ok())
            .unwrap_or(0.0);
        Ok((pool_name, pool_size, data_percent))
    }

    /// Mirrors the Python original's `pool_size - floor(pool_size * data_percent / 100)`.
    fn pool_free_space(pool_size: u64, data_percent: f64) -> u64 {
        let used = ((pool_size as f64) * data_percent / 100.0).floor() as u64;
        pool_size.saturating_sub(used)
    }
}

impl Provider for Lvm2ThinProvider {
    fn kind(&self) -> ProviderKind {
        ProviderKind::Lvm2Thin
    }

    fn detect_capabilities(&self, source: &Path) -> ProviderCapabilities {
        match Self::vg_lv_from_device(source) {
            Some((vg, lv)) if self.pool_info(&vg, &lv).is_ok() => ProviderCapabilities {
                kind: ProviderKind::Lvm2Thin,
                score: 60,
                notes: vec!["source is a thin-pool-backed LVM2 logical volume".to_string()],
            },
            _ => ProviderCapabilities {
                kind: ProviderKind::Lvm2Thin,
                score: 0,
                notes: vec!["source is not a thin-pool-backed LVM2 device".to_string()],
            },
        }
    }

    fn can_snapshot(&self, source: &Path) -> Result<bool> {
        let Some((vg, lv)) = Self::vg_lv_from_device(source) else {
            return Ok(false);
        };
        Ok(self.pool_info(&vg, &lv).is_ok())
    }

    fn origin_from_mount_point(&self, mount_point: &Path) -> Result<Option<String>> {
        let out = run_lvm("findmnt", &["-n", "-o", "SOURCE", "--target", &mount_point.to_string_lossy()])?;
        Ok(if out.is_empty() { None } else { Some(out) })
    }

    fn check_create_snapshot(&self, tx: &TransactionHandle, req: &SourceRequest<'_>) -> Result<()> {
        let (vg_name, lv_name) = Self::vg_lv_from_device(req.source)
            .ok_or_else(|| Error::path(format!("{} is not an LVM2 device path", req.source.display())))?;
        let (pool_name, pool_size, data_percent) = self.pool_info(&vg_name, &lv_name)?;
        let free = Self::pool_free_space(pool_size, data_percent);
        let stats = VolumeStats {
            free,
            used: 0,
            dev_size: pool_size,
        };
        let size = req.policy.evaluate(stats)?;

        let pool_key = format!("{vg_name}/{pool_name}");
        let already_reserved = tx.reserved_for(&pool_key);
        if already_reserved + size > free {
            return Err(Error::no_space(format!(
                "thin pool {pool_key} has {free} bytes free, {already_reserved} already reserved this transaction, need {size} more"
            )));
        }
        tx.reserve(&pool_key, size);
        Ok(())
    }

    fn create_snapshot(&self, _tx: &TransactionHandle, req: &SourceRequest<'_>) -> Result<Snapshot> {
        let (vg_name, lv_name) = Self::vg_lv_from_device(req.source)
            .ok_or_else(|| Error::path(format!("{} is not an LVM2 device path", req.source.display())))?;
        let (pool_name, pool_size, data_percent) = self.pool_info(&vg_name, &lv_name)?;
        let free = Self::pool_free_space(pool_size, data_percent);
        let stats = VolumeStats {
            free,
            used: 0,
            dev_size: pool_size,
        };
        let size = round_up_to_sector(req.policy.evaluate(stats)?);

        let snap_name = encode_snapshot_name(&lv_name, req.snapset_name, req.timestamp, req.mount_point);

        // Thin snapshots inherit the pool's provisioning; no explicit --size
        // is passed (matching the source's thin lvcreate invocation), the
        // pool name is carried only for capacity accounting above.
        let _ = pool_name;
        run_lvm("lvcreate", &["--snapshot", "--name", &snap_name, &format!("{vg_name}/{lv_name}")])?;

        Ok(Snapshot::new(
            snap_name,
            req.snapset_name,
            None,
            req.source.to_string_lossy(),
            req.timestamp,
            req.mount_point,
            self.kind().to_string(),
            size,
            free,
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

    fn check_resize_snapshot(&self, _tx: &TransactionHandle, _snapshot: &Snapshot, _policy: SizePolicy) -> Result<()> {
        // Thin snapshots draw from the pool's shared free space on demand;
        // there is no separate per-snapshot resize operation to check.
        Ok(())
    }

    fn resize_snapshot(&self, _snapshot: &mut Snapshot, _policy: SizePolicy) -> Result<()> {
        Err(Error::argument("LVM2 thin snapshots cannot be resized independently of their pool"))
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
        let out = run_lvm("lvs", &report_args("vg_name,lv_name,origin,lv_size,pool_lv"))?;
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
            let (Some(lv_name), Some(origin), Some(pool_lv)) = (
                row.get("lv_name").and_then(|v| v.as_str()),
                row.get("origin").and_then(|v| v.as_str()),
                row.get("pool_lv").and_then(|v| v.as_str()),
            ) else {
                continue;
            };
            if origin.is_empty() || pool_lv.is_empty() {
                continue; // not a thin snapshot LV
            }
            let Some((snapset_name, timestamp, mount_point)) = parse_snapshot_name(lv_name, origin) else {
                continue;
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
    fn pool_free_space_matches_data_percent() {
        assert_eq!(Lvm2ThinProvider::pool_free_space(1000, 25.0), 750);
        assert_eq!(Lvm2ThinProvider::pool_free_space(1000, 0.0), 1000);
        assert_eq!(Lvm2ThinProvider::pool_free_space(1000, 100.0), 0);
    }

    #[test]
    fn vg_lv_split() {
        assert_eq!(
            Lvm2ThinProvider::vg_lv_from_device(Path::new("/dev/vg0/data")),
            Some(("vg0".to_string(), "data".to_string()))
        );
    }
}
