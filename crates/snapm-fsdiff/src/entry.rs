//! A single file system object captured during a tree walk (spec §4.6).

use std::collections::BTreeMap;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::options::DiffCategory;

/// MIME-type-ish classification for a regular file, produced by the
/// `use_magic_file_type` content probe.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FileTypeInfo {
    pub mime_type: String,
    pub category: DiffCategory,
}

/// A captured file system entry: the metadata `ChangeDetector` and
/// `DiffEngine` compare between two trees. Paths are relative to the mount
/// root being walked; `full_path` retains the absolute path used to read
/// content during the walk.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FsEntry {
    pub path: String,
    pub full_path: PathBuf,
    pub mode: u32,
    pub uid: u32,
    pub gid: u32,
    pub size: u64,
    pub mtime: i64,
    pub is_file: bool,
    pub is_dir: bool,
    pub is_symlink: bool,
    pub is_block: bool,
    pub is_char: bool,
    pub is_sock: bool,
    pub is_fifo: bool,
    pub symlink_target: Option<String>,
    pub content_hash: Option<String>,
    pub xattrs: BTreeMap<String, String>,
    pub file_type_info: Option<FileTypeInfo>,
}

impl FsEntry {
    /// A short description of this entry's file type, used when reporting a
    /// `TypeChanged` record.
    pub fn type_desc(&self) -> &'static str {
        if self.is_dir {
            "directory"
        } else if self.is_symlink {
            "symlink"
        } else if self.is_block {
            "block device"
        } else if self.is_char {
            "character device"
        } else if self.is_sock {
            "socket"
        } else if self.is_fifo {
            "fifo"
        } else {
            "file"
        }
    }
}
