//! Atomic file write helper shared by the scheduler's config writer and timer
//! drop-in writer (spec §4.5, §6): temp file → fsync → rename → fsync parent
//! dir → chmod.

use std::fs::{self, File, OpenOptions};
use std::io::Write;
use std::os::unix::fs::PermissionsExt;
use std::path::Path;

use crate::error::{Error, Result};

/// Atomically (re)write `path` with `contents`, ending with file mode `mode`.
///
/// The temp file is created in the same directory as `path` so the final
/// `rename` is guaranteed to be on the same filesystem (and therefore atomic).
pub fn atomic_write(path: &Path, contents: &[u8], mode: u32) -> Result<()> {
    let dir = path
        .parent()
        .ok_or_else(|| Error::system(format!("path has no parent directory: {}", path.display())))?;
    fs::create_dir_all(dir).map_err(|e| Error::system(format!("failed to create {}: {e}", dir.display())))?;

    let tmp_path = dir.join(format!(
        ".{}.tmp-{}",
        path.file_name().unwrap_or_default().to_string_lossy(),
        std::process::id()
    ));

    {
        let mut tmp = OpenOptions::new()
            .write(true)
            .create(true)
            .truncate(true)
            .open(&tmp_path)
            .map_err(|e| Error::system(format!("failed to create {}: {e}", tmp_path.display())))?;
        tmp.write_all(contents)
            .map_err(|e| Error::system(format!("failed to write {}: {e}", tmp_path.display())))?;
        tmp.sync_all()
            .map_err(|e| Error::system(format!("failed to fsync {}: {e}", tmp_path.display())))?;
    }

    fs::set_permissions(&tmp_path, fs::Permissions::from_mode(mode))
        .map_err(|e| Error::system(format!("failed to chmod {}: {e}", tmp_path.display())))?;

    fs::rename(&tmp_path, path)
        .map_err(|e| Error::system(format!("failed to rename into {}: {e}", path.display())))?;

    let dir_handle = File::open(dir).map_err(|e| Error::system(format!("failed to open {}: {e}", dir.display())))?;
    dir_handle
        .sync_all()
        .map_err(|e| Error::system(format!("failed to fsync directory {}: {e}", dir.display())))?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn writes_and_sets_mode() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("schedule.json");
        atomic_write(&path, b"{}", 0o644).unwrap();
        let contents = fs::read_to_string(&path).unwrap();
        assert_eq!(contents, "{}");
        let mode = fs::metadata(&path).unwrap().permissions().mode() & 0o777;
        assert_eq!(mode, 0o644);
    }

    #[test]
    fn overwrites_existing_file() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("schedule.json");
        atomic_write(&path, b"one", 0o644).unwrap();
        atomic_write(&path, b"two", 0o644).unwrap();
        assert_eq!(fs::read_to_string(&path).unwrap(), "two");
    }

    #[test]
    fn no_leftover_temp_file() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("schedule.json");
        atomic_write(&path, b"{}", 0o644).unwrap();
        let entries: Vec<_> = fs::read_dir(dir.path()).unwrap().collect();
        assert_eq!(entries.len(), 1);
    }
}
