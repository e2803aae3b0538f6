//! `/etc/fstab` parsing (spec §4.4).

use std::fs;
use std::path::Path;

use snapm_core::{Error, Result};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FstabEntry {
    pub what: String,
    pub where_: String,
    pub fstype: String,
    pub options: String,
    pub freq: u32,
    pub passno: u32,
}

/// A parsed fstab file. Malformed lines (not exactly 6 whitespace-separated
/// fields) are skipped with a warning, matching the donor parser.
#[derive(Debug, Clone)]
pub struct Fstab {
    path: String,
    entries: Vec<FstabEntry>,
}

impl Fstab {
    pub fn read(path: impl AsRef<Path>) -> Result<Self> {
        let path_ref = path.as_ref();
        let contents = fs::read_to_string(path_ref).map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                Error::not_found(format!("fstab file not found: {}", path_ref.display()))
            } else {
                Error::system(format!("error reading fstab file {}: {e}", path_ref.display()))
            }
        })?;

        let mut entries = Vec::new();
        for line in contents.lines() {
            let line = line.trim();
            if line.is_empty() || line.starts_with('#') {
                continue;
            }
            let parts: Vec<&str> = line.split_whitespace().collect();
            if parts.len() != 6 {
                tracing::warn!(line, "skipping malformed fstab line");
                continue;
            }
            let (Ok(freq), Ok(passno)) = (parts[4].parse(), parts[5].parse()) else {
                tracing::warn!(line, "skipping fstab line with non-numeric freq/passno");
                continue;
            };
            entries.push(FstabEntry {
                what: parts[0].to_string(),
                where_: parts[1].to_string(),
                fstype: parts[2].to_string(),
                options: parts[3].to_string(),
                freq,
                passno,
            });
        }

        Ok(Fstab {
            path: path_ref.display().to_string(),
            entries,
        })
    }

    pub fn path(&self) -> &str {
        &self.path
    }

    pub fn entries(&self) -> &[FstabEntry] {
        &self.entries
    }

    /// All entries whose `where` field equals `mount_point`.
    pub fn lookup_where<'a>(&'a self, mount_point: &'a str) -> impl Iterator<Item = &'a FstabEntry> {
        self.entries.iter().filter(move |e| e.where_ == mount_point)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    fn write_fstab(contents: &str) -> NamedTempFile {
        let mut f = NamedTempFile::new().unwrap();
        f.write_all(contents.as_bytes()).unwrap();
        f
    }

    #[test]
    fn parses_well_formed_entries() {
        let f = write_fstab(
            "# comment\nUUID=abcd / ext4 defaults 0 1\n/dev/sda2 /var ext4 defaults 0 2\n",
        );
        let fstab = Fstab::read(f.path()).unwrap();
        assert_eq!(fstab.entries().len(), 2);
        assert_eq!(fstab.entries()[0].where_, "/");
    }

    #[test]
    fn skips_malformed_lines() {
        let f = write_fstab("not enough fields\nUUID=abcd / ext4 defaults 0 1\n");
        let fstab = Fstab::read(f.path()).unwrap();
        assert_eq!(fstab.entries().len(), 1);
    }

    #[test]
    fn missing_file_is_not_found() {
        let err = Fstab::read("/nonexistent/fstab").unwrap_err();
        assert!(matches!(err, Error::NotFound { .. }));
    }

    #[test]
    fn lookup_where_filters_by_mount_point() {
        let f = write_fstab("UUID=abcd / ext4 defaults 0 1\n/dev/sda2 /var ext4 defaults 0 2\n");
        let fstab = Fstab::read(f.path()).unwrap();
        let matches: Vec<_> = fstab.lookup_where("/var").collect();
        assert_eq!(matches.len(), 1);
        assert_eq!(matches[0].what, "/dev/sda2");
    }
}
