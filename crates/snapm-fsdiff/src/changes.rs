//! File system entry change detection and classification (spec §4.6).

use serde::{Deserialize, Serialize};

use crate::entry::FsEntry;
use crate::options::DiffOptions;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChangeType {
    Content,
    Permissions,
    Ownership,
    Timestamps,
    Xattrs,
    SymlinkTarget,
}

impl ChangeType {
    pub fn value(self) -> &'static str {
        match self {
            ChangeType::Content => "content",
            ChangeType::Permissions => "permissions",
            ChangeType::Ownership => "ownership",
            ChangeType::Timestamps => "timestamps",
            ChangeType::Xattrs => "extended_attributes",
            ChangeType::SymlinkTarget => "symlink_target",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FileChange {
    pub change_type: ChangeType,
    pub old_value: Option<String>,
    pub new_value: Option<String>,
    pub description: String,
}

impl FileChange {
    fn new(change_type: ChangeType, old_value: Option<String>, new_value: Option<String>, description: impl Into<String>) -> Self {
        FileChange { change_type, old_value, new_value, description: description.into() }
    }
}

/// Detects and classifies changes between two `FsEntry` snapshots of the
/// same path.
#[derive(Default)]
pub struct ChangeDetector;

impl ChangeDetector {
    pub fn new() -> Self {
        ChangeDetector
    }

    /// A path present only in the newer tree: content is the only change
    /// worth recording (everything else is implied by `DiffType::Added`).
    pub fn detect_added(&self, entry: &FsEntry) -> Vec<FileChange> {
        if entry.is_file {
            vec![FileChange::new(ChangeType::Content, None, entry.content_hash.clone(), "file added")]
        } else {
            Vec::new()
        }
    }

    /// A path present only in the older tree.
    pub fn detect_removed(&self, entry: &FsEntry) -> Vec<FileChange> {
        if entry.is_file {
            vec![FileChange::new(ChangeType::Content, entry.content_hash.clone(), None, "file removed")]
        } else {
            Vec::new()
        }
    }

    /// A path present in both trees with the same entry type: compare every
    /// metadata/content field `options` doesn't ask us to ignore.
    pub fn detect_changes(&self, old_entry: &FsEntry, new_entry: &FsEntry, options: &DiffOptions) -> Vec<FileChange> {
        let mut changes = Vec::new();

        if old_entry.is_file && new_entry.is_file && old_entry.content_hash != new_entry.content_hash {
            changes.push(FileChange::new(
                ChangeType::Content,
                old_entry.content_hash.clone(),
                new_entry.content_hash.clone(),
                "content hash changed",
            ));
        }

        if options.content_only {
            return changes;
        }

        if !options.ignore_permissions {
            let old_perms = old_entry.mode & 0o7777;
            let new_perms = new_entry.mode & 0o7777;
            if old_perms != new_perms {
                changes.push(FileChange::new(
                    ChangeType::Permissions,
                    Some(format!("{old_perms:o}")),
                    Some(format!("{new_perms:o}")),
                    format!("mode changed from 0o{old_perms:o} to 0o{new_perms:o}"),
                ));
            }
        }

        if !options.ignore_ownership && (old_entry.uid != new_entry.uid || old_entry.gid != new_entry.gid) {
            changes.push(FileChange::new(
                ChangeType::Ownership,
                Some(format!("{}:{}", old_entry.uid, old_entry.gid)),
                Some(format!("{}:{}", new_entry.uid, new_entry.gid)),
                "owner changed",
            ));
        }

        if old_entry.is_symlink && new_entry.is_symlink && old_entry.symlink_target != new_entry.symlink_target {
            changes.push(FileChange::new(
                ChangeType::SymlinkTarget,
                old_entry.symlink_target.clone(),
                new_entry.symlink_target.clone(),
                "symlink target changed",
            ));
        }

        if !options.ignore_timestamps && old_entry.mtime != new_entry.mtime {
            changes.push(FileChange::new(
                ChangeType::Timestamps,
                Some(old_entry.mtime.to_string()),
                Some(new_entry.mtime.to_string()),
                "modification time changed",
            ));
        }

        if old_entry.xattrs != new_entry.xattrs {
            changes.push(FileChange::new(
                ChangeType::Xattrs,
                Some(format!("{:?}", old_entry.xattrs)),
                Some(format!("{:?}", new_entry.xattrs)),
                "extended attributes changed",
            ));
        }

        changes
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;
    use std::path::PathBuf;

    fn base_entry(path: &str) -> FsEntry {
        FsEntry {
            path: path.to_string(),
            full_path: PathBuf::from(path),
            mode: 0o100644,
            uid: 0,
            gid: 0,
            size: 4,
            mtime: 1000,
            is_file: true,
            is_dir: false,
            is_symlink: false,
            is_block: false,
            is_char: false,
            is_sock: false,
            is_fifo: false,
            symlink_target: None,
            content_hash: Some("aaaa".to_string()),
            xattrs: BTreeMap::new(),
            file_type_info: None,
        }
    }

    #[test]
    fn detects_content_change() {
        let old = base_entry("/a");
        let mut new = base_entry("/a");
        new.content_hash = Some("bbbb".to_string());
        let changes = ChangeDetector::new().detect_changes(&old, &new, &DiffOptions::default());
        assert!(changes.iter().any(|c| c.change_type == ChangeType::Content));
    }

    #[test]
    fn content_only_suppresses_metadata_changes() {
        let old = base_entry("/a");
        let mut new = base_entry("/a");
        new.mode = 0o100755;
        let mut options = DiffOptions::default();
        options.content_only = true;
        let changes = ChangeDetector::new().detect_changes(&old, &new, &options);
        assert!(changes.is_empty());
    }

    #[test]
    fn ignore_permissions_suppresses_mode_change() {
        let old = base_entry("/a");
        let mut new = base_entry("/a");
        new.mode = 0o100755;
        let mut options = DiffOptions::default();
        options.ignore_permissions = true;
        let changes = ChangeDetector::new().detect_changes(&old, &new, &options);
        assert!(changes.iter().all(|c| c.change_type != ChangeType::Permissions));
    }
}
