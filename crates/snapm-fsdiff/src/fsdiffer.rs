//! Top-level interface for comparing two mounted snapshot roots (spec §4.6).

use std::path::{Path, PathBuf};

use snapm_core::{Error, Result};

use crate::cache::{load_cache, save_cache, DiffRoot, DEFAULT_CACHE_DIR};
use crate::engine::{DiffEngine, FsDiffResults};
use crate::options::DiffOptions;
use crate::procinfo::{get_current_rss, get_total_memory};
use crate::treewalk::TreeWalker;

/// Maximum fraction of total memory the process may be using before a
/// content-diff comparison is refused.
const MAX_RSS_FRACTION: f64 = 0.333;

fn should_diff(options: &DiffOptions) -> bool {
    if !options.include_content_diffs {
        return true;
    }
    let Some(total) = get_total_memory() else {
        tracing::warn!("cannot determine total system memory, proceeding");
        return true;
    };
    let Some(rss) = get_current_rss() else {
        tracing::warn!("cannot determine current process memory use, proceeding");
        return true;
    };
    let fraction = rss as f64 / total as f64;
    if fraction > MAX_RSS_FRACTION {
        tracing::error!(
            fraction = %format!("{:.1}%", fraction * 100.0),
            limit = %format!("{:.1}%", MAX_RSS_FRACTION * 100.0),
            "refusing to compute diff: RSS exceeds safe threshold of system memory"
        );
        return false;
    }
    true
}

/// Compares two mounted snapshot roots, optionally using and populating the
/// on-disk diff cache.
pub struct FsDiffer {
    options: DiffOptions,
    tree_walker: TreeWalker,
    diff_engine: DiffEngine,
    cache: bool,
    cache_dir: PathBuf,
    cache_expires: i64,
}

impl FsDiffer {
    pub fn new(options: DiffOptions) -> Result<Self> {
        let tree_walker = TreeWalker::new(options.clone())?;
        Ok(FsDiffer { options, tree_walker, diff_engine: DiffEngine::new(), cache: true, cache_dir: PathBuf::from(DEFAULT_CACHE_DIR), cache_expires: -1 })
    }

    pub fn with_cache(mut self, cache: bool) -> Self {
        self.cache = cache;
        self
    }

    pub fn with_cache_dir(mut self, cache_dir: impl Into<PathBuf>) -> Self {
        self.cache_dir = cache_dir.into();
        self
    }

    pub fn with_cache_expires(mut self, cache_expires: i64) -> Self {
        self.cache_expires = cache_expires;
        self
    }

    /// Compare `root_a` against `root_b`, consulting the cache first and
    /// writing a fresh entry back on a cache miss.
    pub fn compare_roots(&self, root_a: &DiffRoot, root_b: &DiffRoot) -> Result<FsDiffResults> {
        if self.cache {
            match load_cache(&self.cache_dir, root_a, root_b, &self.options, self.cache_expires) {
                Ok(results) => return Ok(results),
                Err(Error::NotFound(_)) => {}
                Err(err) => tracing::info!(error = %err, "failed to load diff cache, recomputing"),
            }
        }

        let strip_a = strip_prefix(&root_a.root);
        let tree_a = self.tree_walker.walk_tree(&root_a.root, &strip_a)?;

        let strip_b = strip_prefix(&root_b.root);
        let tree_b = self.tree_walker.walk_tree(&root_b.root, &strip_b)?;

        if !should_diff(&self.options) {
            return Err(Error::system("RSS limit exceeded after tree construction; retry with content diffs disabled"));
        }

        let records = self.diff_engine.compute_diff(&tree_a, &tree_b, &self.options);
        let timestamp = crate::cache::now_secs();
        let results = FsDiffResults::new(records, self.options.clone(), timestamp);

        if self.cache {
            if let Err(err) = save_cache(&self.cache_dir, root_a, root_b, &results) {
                tracing::info!(error = %err, "failed to save diff cache");
            }
        }

        Ok(results)
    }
}

fn strip_prefix(root: &Path) -> String {
    if root == Path::new("/") {
        String::new()
    } else {
        root.to_string_lossy().into_owned()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use uuid::Uuid;

    #[test]
    fn compares_two_roots_without_cache() {
        let dir_a = tempfile::tempdir().unwrap();
        let dir_b = tempfile::tempdir().unwrap();
        fs::write(dir_a.path().join("same.txt"), b"hello").unwrap();
        fs::write(dir_b.path().join("same.txt"), b"hello").unwrap();
        fs::write(dir_a.path().join("removed.txt"), b"bye").unwrap();
        fs::write(dir_b.path().join("added.txt"), b"new").unwrap();

        let mut options = DiffOptions::default();
        options.include_content_diffs = false;
        let differ = FsDiffer::new(options).unwrap().with_cache(false);

        let root_a = DiffRoot::new("a", dir_a.path(), Some(Uuid::new_v4()));
        let root_b = DiffRoot::new("b", dir_b.path(), Some(Uuid::new_v4()));
        let results = differ.compare_roots(&root_a, &root_b).unwrap();

        assert!(results.paths().contains(&"/removed.txt"));
        assert!(results.paths().contains(&"/added.txt"));
        assert!(!results.paths().contains(&"/same.txt"));
    }
}
