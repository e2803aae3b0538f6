//! Process-exclusive instance guard (spec §5): an advisory file lock under
//! `/run/snapm`, held for the `Manager`'s lifetime.

use std::fs::{self, OpenOptions};
use std::os::fd::AsFd;
use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};

use nix::errno::Errno;
use nix::fcntl::{flock, FlockArg};

use snapm_core::{Error, Result};

pub fn default_lock_path() -> PathBuf {
    PathBuf::from("/run/snapm/manager.lock")
}

/// Holds an exclusive, non-blocking `flock` on a lock file for as long as it
/// lives. The lock releases automatically when the underlying file descriptor
/// closes on drop.
#[derive(Debug)]
pub struct ManagerLock {
    _file: fs::File,
}

impl ManagerLock {
    pub fn acquire(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)
                .map_err(|e| Error::system(format!("cannot create lock directory {}: {e}", parent.display())))?;
            let mut perms = fs::metadata(parent)
                .map_err(|e| Error::system(format!("cannot stat lock directory {}: {e}", parent.display())))?
                .permissions();
            perms.set_mode(0o700);
            let _ = fs::set_permissions(parent, perms);
        }

        let file = OpenOptions::new()
            .create(true)
            .write(true)
            .open(path)
            .map_err(|e| Error::system(format!("cannot open lock file {}: {e}", path.display())))?;

        flock(file.as_fd(), FlockArg::LockExclusiveNonblock).map_err(|errno| {
            if errno == Errno::EWOULDBLOCK {
                Error::busy(format!("another snapm manager instance holds the lock at {}", path.display()))
            } else {
                Error::system(format!("flock({}) failed: {errno}", path.display()))
            }
        })?;

        Ok(ManagerLock { _file: file })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn second_lock_on_same_file_fails_busy() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("manager.lock");
        let first = ManagerLock::acquire(&path).unwrap();
        let second = ManagerLock::acquire(&path);
        assert!(matches!(second, Err(Error::Busy { .. })));
        drop(first);
        assert!(ManagerLock::acquire(&path).is_ok());
    }
}
