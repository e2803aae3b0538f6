//! Stratis snapshot provider adapter (spec §4.1, §9).
//!
//! The Stratis plugin source was not part of the retrieval pack; this is
//! implemented from the shared `Plugin`/`Provider` contract (the same
//! lifecycle every adapter in this workspace exposes) and the Stratis CLI's
//! documented `report`/`filesystem snapshot` surface, in the shelling style
//! `ah-fs-snapshots-btrfs` uses for its own CLI-backed provider.

use std::path::Path;
use std::process::Stdio;

use snapm_core::{
    encode_snapshot_name, parse_snapshot_name, round_up_to_sector, Error, Result, SizePolicy,
    SnapStatus, Snapshot, VolumeStats,
};
use snapm_provider::{Provider, ProviderCapabilities, ProviderKind, SourceRequest, TransactionHandle};

const STRATIS_DEVICE_PREFIX: &str = "/dev/stratis/";

fn run_stratis(args: &[&str]) -> Result<String> {
    let output = std::process::Command::new("stratis")
        .args(args)
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .output()
        .map_err(|e| Error::callout(format!("failed to spawn stratis: {e}")))?;
    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr);
        return Err(Error::callout(format!("stratis {args:?} failed: {stderr}")));
    }
    Ok(String::from_utf8_lossy(&output.stdout).trim().to_string())
}

#[derive(Debug, Default)]
pub struct StratisProvider;

impl StratisProvider {
    pub fn new() -> Self {
        Self
    }

    /// `(pool_name, fs_name)` from a `/dev/stratis/<pool>/<fs>` path.
    fn pool_fs_from_device(path: &Path) -> Option<(String, String)> {
        let s = path.to_str()?;
        let s = s.strip_prefix(STRATIS_DEVICE_PREFIX)?;
        let (pool, fs) = s.split_once('/')?;
        Some((pool.to_string(), fs.to_string()))
    }

    fn pool_report(&self, pool_name: &str) -> Result<serde_json::Value> {
        let out = run_stratis(&["report"])?;
        let report: serde_json::Value =
            serde_json::from_str(&out).map_err(|e| Error::callout(format!("malformed stratis report: {e}")))?;
        report
            .get("pools")
            .and_then(|p| p.as_array())
            .and_then(|pools| pools.iter().find(|p| p.get("name").and_then(|n| n.as_str()) == Some(pool_name)))
            .cloned()
            .ok_or_else(|| Error::not_found(format!("stratis pool {pool_name} not found")))
    }

    fn pool_free_bytes(&self, pool_name: &str) -> Result<u64> {
        let pool = self.pool_report(pool_name)?;
        pool.get("available_actual_size")
            .or_else(|| pool.get("free"))
            .and_then(|v| v.as_str().and_then(|s| s.parse().ok()).or_else(|| v.as_u64()))
            .ok_or_else(|| Error::callout("stratis report missing pool free-space field"))
    }
}

impl Provider for StratisProvider {
    fn kind(&self) -> ProviderKind {
        ProviderKind::Stratis
    }

    fn detect_capabilities(&self, source: &Path) -> ProviderCapabilities {
        if Self::pool_fs_from_device(source).is_some() {
            ProviderCapabilities {
                kind: ProviderKind::Stratis,
                score: 55,
                notes: vec!["source resolves to a Stratis filesystem".to_string()],
            }
        } else {
            ProviderCapabilities {
                kind: ProviderKind::Stratis,
                score: 0,
                notes: vec!["source is not a Stratis device path".to_string()],
            }
        }
    }

    fn can_snapshot(&self, source: &Path) -> Result<bool> {
        Ok(Self::pool_fs_from_device(source).is_some())
    }

    fn origin_from_mount_point(&self, mount_point: &Path) -> Result<Option<String>> {
        let output = std::process::Command::new("findmnt")
            .args(["-n", "-o", "SOURCE", "--target"])
            .arg(mount_point)
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .output()
            .map_err(|e| Error::callout(format!("failed to spawn findmnt: {e}")))?;
        if !output.status.success() {
            return Ok(None);
        }
        let source = String::from_utf8_lossy(&output.stdout).trim().to_string();
        Ok(if source.is_empty() { None } else { Some(source) })
    }

    fn check_create_snapshot(&self, tx: &TransactionHandle, req: &SourceRequest<'_>) -> Result<()> {
        let (pool_name, _fs_name) = Self::pool_fs_from_device(req.source)
            .ok_or_else(|| Error::path(format!("{} is not a Stratis device path", req.source.display())))?;
        let free = self.pool_free_bytes(&pool_name)?;
        let stats = VolumeStats {
            free,
            used: 0,
            dev_size: free,
        };
        let size = round_up_to_sector(req.policy.evaluate(stats)?);
        let already = tx.reserved_for(&pool_name);
        if already + size > free {
            return Err(Error::no_space(format!(
                "stratis pool {pool_name} has {free} bytes free, {already} already reserved, need {size} more"
            )));
        }
        tx.reserve(&pool_name, size);
        Ok(())
    }

    fn create_snapshot(&self, _tx: &TransactionHandle, req: &SourceRequest<'_>) -> Result<Snapshot> {
        let (pool_name, fs_name) = Self::pool_fs_from_device(req.source)
            .ok_or_else(|| Error::path(format!("{} is not a Stratis device path", req.source.display())))?;
        let snap_name = encode_snapshot_name(&fs_name, req.snapset_name, req.timestamp, req.mount_point);
        run_stratis(&["filesystem", "snapshot", &pool_name, &fs_name, &snap_name])?;

        let free = self.pool_free_bytes(&pool_name).unwrap_or(0);
        Ok(Snapshot::new(
            snap_name,
            req.snapset_name,
            None,
            req.source.to_string_lossy(),
            req.timestamp,
            req.mount_point,
            self.kind().to_string(),
            0,
            free,
        ))
    }

    fn rename_snapshot(&self, snapshot: &mut Snapshot, new_snapset_name: &str) -> Result<()> {
        snapshot.check_mutable()?;
        let (pool_name, fs_name) = Self::pool_fs_from_device(Path::new(&snapshot.origin))
            .ok_or_else(|| Error::path("snapshot origin is not a Stratis device path"))?;
        let _ = fs_name;
        let new_name = encode_snapshot_name(&snapshot.origin, new_snapset_name, snapshot.timestamp, &snapshot.mount_point);
        run_stratis(&["filesystem", "rename", &pool_name, &snapshot.name, &new_name])?;
        snapshot.rename(new_name);
        snapshot.snapset_name = new_snapset_name.to_string();
        Ok(())
    }

    fn check_resize_snapshot(&self, _tx: &TransactionHandle, _snapshot: &Snapshot, _policy: SizePolicy) -> Result<()> {
        // Stratis filesystems are thinly provisioned against the pool; there
        // is no separate per-filesystem resize to check.
        Ok(())
    }

    fn resize_snapshot(&self, _snapshot: &mut Snapshot, _policy: SizePolicy) -> Result<()> {
        Err(Error::argument("Stratis filesystem snapshots cannot be resized independently of their pool"))
    }

    fn check_revert_snapshot(&self, snapshot: &Snapshot) -> Result<()> {
        if snapshot.status == SnapStatus::Reverting {
            return Err(Error::busy(format!("snapshot {} revert already in progress", snapshot.name)));
        }
        Ok(())
    }

    fn revert_snapshot(&self, snapshot: &mut Snapshot) -> Result<()> {
        self.check_revert_snapshot(snapshot)?;
        // Stratis has no in-place merge; a revert is modeled as scheduling
        // the snapshot to replace its origin at next activation, mirroring
        // the deferred-revert semantics described for LVM2 (spec §4.2).
        snapshot.status = SnapStatus::Reverting;
        Ok(())
    }

    fn delete_snapshot(&self, snapshot: &Snapshot) -> Result<()> {
        let (pool_name, _) = Self::pool_fs_from_device(Path::new(&snapshot.origin))
            .ok_or_else(|| Error::path("snapshot origin is not a Stratis device path"))?;
        run_stratis(&["filesystem", "destroy", &pool_name, &snapshot.name])?;
        Ok(())
    }

    fn activate_snapshot(&self, snapshot: &mut Snapshot) -> Result<()> {
        let (pool_name, _) = Self::pool_fs_from_device(Path::new(&snapshot.origin))
            .ok_or_else(|| Error::path("snapshot origin is not a Stratis device path"))?;
        snapshot.status = SnapStatus::Active;
        snapshot.devpath = format!("{STRATIS_DEVICE_PREFIX}{pool_name}/{}", snapshot.name);
        Ok(())
    }

    fn deactivate_snapshot(&self, snapshot: &mut Snapshot) -> Result<()> {
        snapshot.status = SnapStatus::Inactive;
        snapshot.devpath.clear();
        Ok(())
    }

    fn set_autoactivate(&self, snapshot: &mut Snapshot, auto: bool) -> Result<()> {
        // Stratis has no autoactivation toggle (spec §9 open question):
        // best-effort no-op, logged, never fails the caller's batch.
        tracing::warn!(
            snapshot = %snapshot.name,
            requested = auto,
            "stratis provider does not support per-filesystem autoactivate; skipping"
        );
        Ok(())
    }

    fn discover_snapshots(&self) -> Result<Vec<Snapshot>> {
        let out = run_stratis(&["report"])?;
        let report: serde_json::Value =
            serde_json::from_str(&out).map_err(|e| Error::callout(format!("malformed stratis report: {e}")))?;
        let mut snapshots = Vec::new();
        let Some(pools) = report.get("pools").and_then(|p| p.as_array()) else {
            return Ok(snapshots);
        };
        for pool in pools {
            let pool_name = pool.get("name").and_then(|v| v.as_str()).unwrap_or_default();
            let Some(filesystems) = pool.get("filesystems").and_then(|f| f.as_array()) else {
                continue;
            };
            for fs in filesystems {
                let (Some(fs_name), Some(origin)) = (
                    fs.get("name").and_then(|v| v.as_str()),
                    fs.get("origin").and_then(|v| v.as_str()),
                ) else {
                    continue;
                };
                if origin.is_empty() {
                    continue; // not a snapshot filesystem
                }
                let Some((snapset_name, timestamp, mount_point)) = parse_snapshot_name(fs_name, origin) else {
                    continue;
                };
                let size = fs.get("size").and_then(|v| v.as_str()).and_then(|s| s.parse().ok()).unwrap_or(0);
                snapshots.push(Snapshot::new(
                    fs_name,
                    snapset_name,
                    None,
                    format!("{STRATIS_DEVICE_PREFIX}{pool_name}/{origin}"),
                    timestamp,
                    mount_point,
                    self.kind().to_string(),
                    size,
                    0,
                ));
            }
        }
        Ok(snapshots)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pool_fs_split() {
        assert_eq!(
            StratisProvider::pool_fs_from_device(Path::new("/dev/stratis/pool0/root")),
            Some(("pool0".to_string(), "root".to_string()))
        );
        assert_eq!(StratisProvider::pool_fs_from_device(Path::new("/dev/sda1")), None);
    }

    #[test]
    fn detect_capabilities_scores_stratis_device() {
        let provider = StratisProvider::new();
        assert_eq!(provider.detect_capabilities(Path::new("/dev/stratis/pool0/root")).score, 55);
        assert_eq!(provider.detect_capabilities(Path::new("/dev/sda1")).score, 0);
    }
}
