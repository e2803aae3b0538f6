//! Recursive file system tree capture (spec §4.6).

use std::collections::BTreeMap;
use std::fs;
use std::os::unix::fs::MetadataExt;
use std::path::{Path, PathBuf};

use glob::Pattern;
use sha2::{Digest, Sha256};

use snapm_core::{Error, Result};

use crate::entry::{FileTypeInfo, FsEntry};
use crate::options::{DiffCategory, DiffOptions};

/// Directories excluded from a walk unless `include_system_dirs` is set,
/// matching the API filesystems `Mounts` binds into a snapshot set chroot.
const SYSTEM_DIRS: &[&str] = &["/proc", "/sys", "/dev", "/run"];

/// Walks one mounted root, producing a `path -> FsEntry` map keyed by paths
/// relative to the mount root.
pub struct TreeWalker {
    options: DiffOptions,
    include_patterns: Vec<Pattern>,
    exclude_patterns: Vec<Pattern>,
}

impl TreeWalker {
    pub fn new(options: DiffOptions) -> Result<Self> {
        let include_patterns = compile_patterns(&options.file_patterns)?;
        let exclude_patterns = compile_patterns(&options.exclude_patterns)?;
        Ok(TreeWalker { options, include_patterns, exclude_patterns })
    }

    /// Walk `root`, returning entries keyed by path relative to
    /// `strip_prefix` (pass `""` when the mount root itself is `/`).
    pub fn walk_tree(&self, root: &Path, strip_prefix: &str) -> Result<BTreeMap<String, FsEntry>> {
        let mut tree = BTreeMap::new();
        let start = self.options.from_path.as_deref().map(|p| root.join(p.trim_start_matches('/'))).unwrap_or_else(|| root.to_path_buf());

        if let Ok(metadata) = fs::symlink_metadata(&start) {
            let rel_path = self.relative_path(&start, root, strip_prefix);
            if let Ok(entry) = self.build_entry(&start, &rel_path, &metadata) {
                tree.insert(rel_path, entry);
            }
        }

        self.walk_dir(&start, root, strip_prefix, &mut tree)?;
        Ok(tree)
    }

    fn relative_path(&self, full_path: &Path, root: &Path, strip_prefix: &str) -> String {
        let rel = full_path.strip_prefix(root).unwrap_or(full_path);
        let mut path = format!("/{}", rel.to_string_lossy());
        if !strip_prefix.is_empty() {
            path = path.strip_prefix(strip_prefix).map(str::to_string).unwrap_or(path);
        }
        if path.is_empty() {
            path = "/".to_string();
        }
        path
    }

    fn is_system_dir(&self, path: &str) -> bool {
        SYSTEM_DIRS.iter().any(|d| path == *d || path.starts_with(&format!("{d}/")))
    }

    fn passes_patterns(&self, path: &str) -> bool {
        if !self.exclude_patterns.is_empty() && self.exclude_patterns.iter().any(|p| p.matches(path)) {
            return false;
        }
        if self.include_patterns.is_empty() {
            return true;
        }
        self.include_patterns.iter().any(|p| p.matches(path))
    }

    fn walk_dir(&self, dir: &Path, root: &Path, strip_prefix: &str, tree: &mut BTreeMap<String, FsEntry>) -> Result<()> {
        let entries = match fs::read_dir(dir) {
            Ok(entries) => entries,
            Err(e) => return Err(Error::system(format!("failed to read directory {}: {e}", dir.display()))),
        };

        for entry in entries {
            let entry = entry.map_err(|e| Error::system(format!("failed to read directory entry under {}: {e}", dir.display())))?;
            let full_path = entry.path();
            let rel_path = self.relative_path(&full_path, root, strip_prefix);

            if !self.options.include_system_dirs && self.is_system_dir(&rel_path) {
                continue;
            }

            let metadata = if self.options.follow_symlinks {
                fs::metadata(&full_path)
            } else {
                fs::symlink_metadata(&full_path)
            };
            let metadata = match metadata {
                Ok(m) => m,
                Err(e) => {
                    tracing::warn!(path = %full_path.display(), error = %e, "skipping unreadable entry during tree walk");
                    continue;
                }
            };

            let is_dir = metadata.is_dir();

            if !is_dir && !self.passes_patterns(&rel_path) {
                continue;
            }

            if self.options.max_file_size > 0 && !is_dir && metadata.size() > self.options.max_file_size {
                continue;
            }

            let fs_entry = self.build_entry(&full_path, &rel_path, &metadata)?;
            let recurse = is_dir;
            tree.insert(rel_path, fs_entry);

            if recurse {
                self.walk_dir(&full_path, root, strip_prefix, tree)?;
            }
        }
        Ok(())
    }

    fn build_entry(&self, full_path: &Path, rel_path: &str, metadata: &fs::Metadata) -> Result<FsEntry> {
        let file_type = metadata.file_type();
        let is_file = file_type.is_file();
        let is_dir = file_type.is_dir();
        let is_symlink = file_type.is_symlink();
        let is_block = file_type.is_block_device();
        let is_char = file_type.is_char_device();
        let is_sock = file_type.is_socket();
        let is_fifo = file_type.is_fifo();

        let symlink_target =
            if is_symlink { fs::read_link(full_path).ok().map(|p| p.to_string_lossy().into_owned()) } else { None };

        let content_hash = if is_file && (self.options.max_content_hash_size == 0 || metadata.size() <= self.options.max_content_hash_size) {
            hash_file(full_path).ok()
        } else {
            None
        };

        let file_type_info = if is_file && self.options.use_magic_file_type { probe_file_type(full_path, rel_path) } else { None };

        Ok(FsEntry {
            path: rel_path.to_string(),
            full_path: full_path.to_path_buf(),
            mode: metadata.mode(),
            uid: metadata.uid(),
            gid: metadata.gid(),
            size: metadata.size(),
            mtime: metadata.mtime(),
            is_file,
            is_dir,
            is_symlink,
            is_block,
            is_char,
            is_sock,
            is_fifo,
            symlink_target,
            content_hash,
            xattrs: Default::default(),
            file_type_info,
        })
    }
}

fn compile_patterns(patterns: &[String]) -> Result<Vec<Pattern>> {
    patterns.iter().map(|p| Pattern::new(p).map_err(|e| Error::argument(format!("invalid glob pattern '{p}': {e}")))).collect()
}

fn hash_file(path: &Path) -> std::io::Result<String> {
    let mut file = fs::File::open(path)?;
    let mut hasher = Sha256::new();
    std::io::copy(&mut file, &mut hasher)?;
    Ok(format!("{:x}", hasher.finalize()))
}

/// A null-byte probe over the first chunk of a file: the common
/// no-`libmagic` heuristic for distinguishing text from binary content.
fn probe_file_type(path: &Path, rel_path: &str) -> Option<FileTypeInfo> {
    let mut buf = [0u8; 8192];
    let read = {
        use std::io::Read;
        let mut file = fs::File::open(path).ok()?;
        file.read(&mut buf).ok()?
    };
    let is_binary = buf[..read].contains(&0);
    let mime_type = if is_binary { "application/octet-stream" } else { "text/plain" }.to_string();
    let category = DiffCategory::for_path(rel_path).unwrap_or(DiffCategory::Application);
    Some(FileTypeInfo { mime_type, category })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn walks_nested_directories() {
        let dir = tempfile::tempdir().unwrap();
        fs::create_dir_all(dir.path().join("a/b")).unwrap();
        fs::write(dir.path().join("a/b/file.txt"), b"hello").unwrap();

        let walker = TreeWalker::new(DiffOptions::default()).unwrap();
        let tree = walker.walk_tree(dir.path(), "").unwrap();

        assert!(tree.contains_key("/a"));
        assert!(tree.contains_key("/a/b"));
        assert!(tree.contains_key("/a/b/file.txt"));
        let entry = &tree["/a/b/file.txt"];
        assert!(entry.is_file);
        assert!(entry.content_hash.is_some());
    }

    #[test]
    fn respects_exclude_patterns() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("keep.txt"), b"x").unwrap();
        fs::write(dir.path().join("skip.log"), b"y").unwrap();

        let mut options = DiffOptions::default();
        options.exclude_patterns = vec!["*.log".to_string()];
        let walker = TreeWalker::new(options).unwrap();
        let tree = walker.walk_tree(dir.path(), "").unwrap();

        assert!(tree.contains_key("/keep.txt"));
        assert!(!tree.contains_key("/skip.log"));
    }

    #[test]
    fn strips_mount_prefix() {
        let dir = tempfile::tempdir().unwrap();
        fs::create_dir_all(dir.path().join("mnt/sub")).unwrap();
        let mut f = fs::File::create(dir.path().join("mnt/sub/file")).unwrap();
        f.write_all(b"data").unwrap();

        let walker = TreeWalker::new(DiffOptions::default()).unwrap();
        let tree = walker.walk_tree(&dir.path().join("mnt"), "").unwrap();
        assert!(tree.contains_key("/sub/file"));
    }
}
