//! Filesystem comparison engine for two mounted snapshot roots.
//!
//! Walks both trees, classifies every path as added/removed/modified/moved/
//! type-changed, optionally generates unified content diffs, and caches
//! results on disk so repeat comparisons of the same pair are cheap.

mod cache;
mod changes;
mod contentdiff;
mod difftree;
mod engine;
mod entry;
mod fsdiffer;
mod options;
mod procinfo;
mod treewalk;

pub use cache::{load_cache, save_cache, DiffRoot, DEFAULT_CACHE_DIR};
pub use changes::{ChangeDetector, ChangeType, FileChange};
pub use contentdiff::{ContentDiff, ContentDiffer, ContentDifferManager};
pub use difftree::DiffTree;
pub use engine::{DiffEngine, DiffType, FsDiffRecord, FsDiffResults};
pub use entry::{FileTypeInfo, FsEntry};
pub use fsdiffer::FsDiffer;
pub use options::{DiffCategory, DiffOptions};
pub use procinfo::{get_current_rss, get_total_memory};
pub use treewalk::TreeWalker;
