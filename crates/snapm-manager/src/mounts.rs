//! Chroot-style mount orchestration for a snapshot set (spec §4.7).

use std::fs;
use std::path::{Path, PathBuf};
use std::process::{Command, ExitStatus};

use snapm_boot::{DeviceResolver, Fstab};
use snapm_core::{Error, Result, SnapshotSet};

const API_FILESYSTEMS: &[&str] = &["/proc", "/sys", "/dev", "/run"];

/// A mounted root a command can be `exec`'d inside of.
pub trait RootMount {
    fn root(&self) -> &Path;

    fn exec(&self, argv: &[&str]) -> Result<ExitStatus>;
}

fn resolve_what(what: &str, resolver: &dyn DeviceResolver) -> String {
    if let Some(ident) = what.strip_prefix("UUID=") {
        return resolver.resolve(ident, "uuid").unwrap_or_else(|| what.to_string());
    }
    if let Some(ident) = what.strip_prefix("LABEL=") {
        return resolver.resolve(ident, "label").unwrap_or_else(|| what.to_string());
    }
    if let Some(ident) = what.strip_prefix("PARTUUID=") {
        return resolver.resolve(ident, "partuuid").unwrap_or_else(|| what.to_string());
    }
    if let Some(ident) = what.strip_prefix("PARTLABEL=") {
        return resolver.resolve(ident, "partlabel").unwrap_or_else(|| what.to_string());
    }
    what.to_string()
}

/// Discovers and manages a chroot-style mount of a snapshot set under a
/// controlled directory: root first, then non-root set members, then the
/// API filesystems. Any failure rolls back every path mounted so far.
pub struct Mounts {
    root: PathBuf,
    mounted: Vec<PathBuf>,
}

impl Mounts {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Mounts { root: root.into(), mounted: Vec::new() }
    }

    fn mount_one(&mut self, what: &str, target: &Path, fstype: Option<&str>, options: Option<&str>) -> Result<()> {
        fs::create_dir_all(target).map_err(|e| Error::mount(format!("cannot create mount point {}: {e}", target.display())))?;

        let mut cmd = Command::new("mount");
        if let Some(fstype) = fstype {
            cmd.args(["-t", fstype]);
        }
        if let Some(options) = options {
            cmd.args(["-o", options]);
        }
        cmd.arg(what).arg(target);

        let output = cmd.output().map_err(|e| Error::mount(format!("failed to spawn mount: {e}")))?;
        if !output.status.success() {
            self.rollback();
            return Err(Error::mount(format!(
                "mount {what} on {} failed: {}",
                target.display(),
                String::from_utf8_lossy(&output.stderr)
            )));
        }
        self.mounted.push(target.to_path_buf());
        Ok(())
    }

    fn mount_bind_api(&mut self, source: &str, target: &Path) -> Result<()> {
        fs::create_dir_all(target).map_err(|e| Error::mount(format!("cannot create mount point {}: {e}", target.display())))?;
        let output = Command::new("mount")
            .args(["--rbind", source])
            .arg(target)
            .output()
            .map_err(|e| Error::mount(format!("failed to spawn mount: {e}")))?;
        if !output.status.success() {
            self.rollback();
            return Err(Error::mount(format!(
                "bind mount {source} on {} failed: {}",
                target.display(),
                String::from_utf8_lossy(&output.stderr)
            )));
        }
        self.mounted.push(target.to_path_buf());
        Ok(())
    }

    fn rollback(&mut self) {
        for path in self.mounted.drain(..).rev() {
            let _ = Command::new("umount").arg("-R").arg(&path).status();
        }
    }

    /// Mount `set`'s root member, then its non-root members (resolved via
    /// `fstab` for anything not covered by the set itself), then the API
    /// filesystems. Rolls back every mount on failure.
    pub fn mount_set(&mut self, set: &SnapshotSet, fstab: &Fstab, resolver: &dyn DeviceResolver) -> Result<()> {
        let root_snapshot = set
            .snapshots()
            .iter()
            .find(|s| s.mount_point == "/")
            .ok_or_else(|| Error::mount(format!("snapshot set {} has no root member", set.name())))?;

        let root_entry = fstab.lookup_where("/").next();
        let fstype = root_entry.map(|e| e.fstype.as_str());
        if let Err(err) = self.mount_one(&root_snapshot.devpath, &self.root.clone(), fstype, None) {
            return Err(err);
        }

        for entry in fstab.entries() {
            if entry.where_ == "/" || entry.fstype == "swap" {
                continue;
            }
            let target = self.root.join(entry.where_.trim_start_matches('/'));
            let what = if let Some(snapshot) = set.snapshots().iter().find(|s| s.mount_point == entry.where_) {
                snapshot.devpath.clone()
            } else {
                resolve_what(&entry.what, resolver)
            };
            if let Err(err) = self.mount_one(&what, &target, Some(&entry.fstype), Some(&entry.options)) {
                return Err(err);
            }
        }

        for api_fs in API_FILESYSTEMS {
            let target = self.root.join(api_fs.trim_start_matches('/'));
            if let Err(err) = self.mount_bind_api(api_fs, &target) {
                return Err(err);
            }
        }

        Ok(())
    }

    pub fn unmount_all(&mut self) -> Result<()> {
        let mut failures = Vec::new();
        for path in self.mounted.drain(..).rev() {
            let status = Command::new("umount").arg("-R").arg(&path).status();
            match status {
                Ok(s) if s.success() => {}
                _ => failures.push(path.display().to_string()),
            }
        }
        if failures.is_empty() {
            Ok(())
        } else {
            Err(Error::umount(format!("failed to unmount: {}", failures.join(", "))))
        }
    }
}

impl RootMount for Mounts {
    fn root(&self) -> &Path {
        &self.root
    }

    fn exec(&self, argv: &[&str]) -> Result<ExitStatus> {
        if argv.is_empty() {
            return Err(Error::argument("exec requires a command"));
        }
        Command::new("chroot")
            .arg(&self.root)
            .args(argv)
            .status()
            .map_err(|e| Error::system(format!("failed to spawn chroot: {e}")))
    }
}

/// Models the running system's own root: no mount/umount, no chroot prefix.
pub struct SysMount {
    root: PathBuf,
}

impl SysMount {
    pub fn new() -> Self {
        SysMount { root: PathBuf::from("/") }
    }
}

impl Default for SysMount {
    fn default() -> Self {
        Self::new()
    }
}

impl RootMount for SysMount {
    fn root(&self) -> &Path {
        &self.root
    }

    fn exec(&self, argv: &[&str]) -> Result<ExitStatus> {
        if argv.is_empty() {
            return Err(Error::argument("exec requires a command"));
        }
        Command::new(argv[0])
            .args(&argv[1..])
            .status()
            .map_err(|e| Error::system(format!("failed to spawn {}: {e}", argv[0])))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sys_mount_root_is_system_root() {
        let sys = SysMount::new();
        assert_eq!(sys.root(), Path::new("/"));
    }

    #[test]
    fn mounts_rollback_clears_tracked_paths() {
        let dir = tempfile::tempdir().unwrap();
        let mut mounts = Mounts::new(dir.path());
        mounts.mounted.push(dir.path().join("proc"));
        mounts.rollback();
        assert!(mounts.mounted.is_empty());
    }
}
