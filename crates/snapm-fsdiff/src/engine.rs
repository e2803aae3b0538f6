//! File system diff engine (spec §4.6): classifies path differences
//! between two trees, generates content diffs, and detects moves.

use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet};

use serde::{Deserialize, Serialize};

use crate::changes::{ChangeDetector, ChangeType, FileChange};
use crate::contentdiff::{ContentDiff, ContentDiffer, ContentDifferManager};
use crate::entry::FsEntry;
use crate::options::DiffOptions;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DiffType {
    Added,
    Removed,
    Modified,
    Moved,
    TypeChanged,
}

impl DiffType {
    pub fn value(self) -> &'static str {
        match self {
            DiffType::Added => "added",
            DiffType::Removed => "removed",
            DiffType::Modified => "modified",
            DiffType::Moved => "moved",
            DiffType::TypeChanged => "type_changed",
        }
    }
}

/// A single path's comparison result.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FsDiffRecord {
    pub path: String,
    pub diff_type: DiffType,
    pub old_entry: Option<FsEntry>,
    pub new_entry: Option<FsEntry>,
    pub changes: Vec<FileChange>,
    pub content_diff: Option<ContentDiff>,
    pub moved_from: Option<String>,
    pub moved_to: Option<String>,
}

impl FsDiffRecord {
    fn new(path: impl Into<String>, diff_type: DiffType, old_entry: Option<FsEntry>, new_entry: Option<FsEntry>) -> Self {
        FsDiffRecord {
            path: path.into(),
            diff_type,
            old_entry,
            new_entry,
            changes: Vec::new(),
            content_diff: None,
            moved_from: None,
            moved_to: None,
        }
    }

    fn add_change(&mut self, change: FileChange) {
        self.changes.push(change);
    }

    fn set_content_diff(&mut self, diff: ContentDiff) {
        self.content_diff = Some(diff);
    }

    pub fn file_type(&self) -> String {
        let Some(entry) = self.new_entry.as_ref().or(self.old_entry.as_ref()) else { return "unknown".to_string() };
        if entry.is_dir {
            "directory".to_string()
        } else if entry.is_symlink {
            "symlink".to_string()
        } else if let Some(info) = &entry.file_type_info {
            info.mime_type.clone()
        } else {
            "file".to_string()
        }
    }

    pub fn file_category(&self) -> String {
        let entry = self.new_entry.as_ref().or(self.old_entry.as_ref());
        match entry.and_then(|e| e.file_type_info.as_ref()) {
            Some(info) => info.category.value().to_string(),
            None => "unknown".to_string(),
        }
    }

    /// A short human-readable summary, e.g. for tree rendering.
    pub fn change_summary(&self) -> String {
        match self.diff_type {
            DiffType::Added => format!("Added {}", self.file_type()),
            DiffType::Removed => format!("Removed {}", self.file_type()),
            DiffType::Moved => {
                format!("Moved from {} to {}", self.moved_from.as_deref().unwrap_or(""), self.moved_to.as_deref().unwrap_or(""))
            }
            DiffType::TypeChanged => match (&self.old_entry, &self.new_entry) {
                (Some(old), Some(new)) => format!("Type changed from {} to {}", old.type_desc(), new.type_desc()),
                _ => "Type changed".to_string(),
            },
            DiffType::Modified => {
                let mut kinds: Vec<&str> = self.changes.iter().map(|c| c.change_type.value()).collect();
                kinds.sort_unstable();
                kinds.dedup();
                format!("Changed: {}", kinds.join(", "))
            }
        }
    }
}

fn effective_changes(changes: Vec<FileChange>, options: &DiffOptions) -> Vec<FileChange> {
    if options.content_only {
        changes.into_iter().filter(|c| c.change_type == ChangeType::Content).collect()
    } else {
        changes
    }
}

/// Core diff computation: classification followed by move detection.
pub struct DiffEngine {
    change_detector: ChangeDetector,
    content_differ: Box<dyn ContentDiffer>,
}

impl Default for DiffEngine {
    fn default() -> Self {
        DiffEngine { change_detector: ChangeDetector::new(), content_differ: Box::new(ContentDifferManager::new()) }
    }
}

impl DiffEngine {
    pub fn new() -> Self {
        Self::default()
    }

    fn maybe_content_diff(&self, old: Option<&FsEntry>, new: Option<&FsEntry>, options: &DiffOptions) -> Option<ContentDiff> {
        if !options.include_content_diffs {
            return None;
        }
        let size = new.or(old).map(|e| e.size).unwrap_or(0);
        if options.max_content_diff_size > 0 && size > options.max_content_diff_size {
            return None;
        }
        let old_path = old.filter(|e| e.is_file).map(|e| e.full_path.as_path());
        let new_path = new.filter(|e| e.is_file).map(|e| e.full_path.as_path());
        if old_path.is_none() && new_path.is_none() {
            return None;
        }
        self.content_differ.generate(old_path, new_path, old, new)
    }

    pub fn compute_diff(&self, tree_a: &BTreeMap<String, FsEntry>, tree_b: &BTreeMap<String, FsEntry>, options: &DiffOptions) -> Vec<FsDiffRecord> {
        let all_paths: BTreeSet<&String> = tree_a.keys().chain(tree_b.keys()).collect();
        let mut diffs = Vec::new();

        for path in all_paths {
            let entry_a = tree_a.get(path);
            let entry_b = tree_b.get(path);

            match (entry_a, entry_b) {
                (None, Some(new_entry)) => {
                    let mut record = FsDiffRecord::new(path.clone(), DiffType::Added, None, Some(new_entry.clone()));
                    let changes = effective_changes(self.change_detector.detect_added(new_entry), options);
                    for change in changes {
                        record.add_change(change);
                    }
                    if new_entry.is_file {
                        if let Some(diff) = self.maybe_content_diff(None, Some(new_entry), options) {
                            record.set_content_diff(diff);
                        }
                    }
                    diffs.push(record);
                }
                (Some(old_entry), None) => {
                    let mut record = FsDiffRecord::new(path.clone(), DiffType::Removed, Some(old_entry.clone()), None);
                    let changes = effective_changes(self.change_detector.detect_removed(old_entry), options);
                    for change in changes {
                        record.add_change(change);
                    }
                    if old_entry.is_file {
                        if let Some(diff) = self.maybe_content_diff(Some(old_entry), None, options) {
                            record.set_content_diff(diff);
                        }
                    }
                    diffs.push(record);
                }
                (Some(old_entry), Some(new_entry)) => {
                    let type_changed = old_entry.is_file != new_entry.is_file
                        || old_entry.is_dir != new_entry.is_dir
                        || old_entry.is_symlink != new_entry.is_symlink
                        || old_entry.is_block != new_entry.is_block
                        || old_entry.is_char != new_entry.is_char
                        || old_entry.is_sock != new_entry.is_sock
                        || old_entry.is_fifo != new_entry.is_fifo;

                    if type_changed {
                        diffs.push(FsDiffRecord::new(path.clone(), DiffType::TypeChanged, Some(old_entry.clone()), Some(new_entry.clone())));
                        continue;
                    }

                    let changes = effective_changes(self.change_detector.detect_changes(old_entry, new_entry, options), options);
                    if changes.is_empty() {
                        continue;
                    }

                    let mut record = FsDiffRecord::new(path.clone(), DiffType::Modified, Some(old_entry.clone()), Some(new_entry.clone()));
                    let has_content_change = changes.iter().any(|c| c.change_type == ChangeType::Content);
                    for change in changes {
                        record.add_change(change);
                    }
                    if has_content_change && old_entry.is_file && new_entry.is_file {
                        if let Some(diff) = self.maybe_content_diff(Some(old_entry), Some(new_entry), options) {
                            record.set_content_diff(diff);
                        }
                    }
                    diffs.push(record);
                }
                (None, None) => unreachable!("path drawn from the union of both trees' keys"),
            }
        }

        self.detect_moves(diffs, tree_a, tree_b, options)
    }

    fn detect_moves(
        &self,
        mut diffs: Vec<FsDiffRecord>,
        tree_a: &BTreeMap<String, FsEntry>,
        tree_b: &BTreeMap<String, FsEntry>,
        options: &DiffOptions,
    ) -> Vec<FsDiffRecord> {
        let removed_or_changed: HashSet<&str> = diffs
            .iter()
            .filter(|d| matches!(d.diff_type, DiffType::Removed | DiffType::Modified))
            .filter(|d| d.old_entry.as_ref().is_some_and(|e| e.is_file && e.content_hash.is_some()))
            .map(|d| d.path.as_str())
            .collect();
        let added_or_changed: HashSet<&str> = diffs
            .iter()
            .filter(|d| matches!(d.diff_type, DiffType::Added | DiffType::Modified))
            .filter(|d| d.new_entry.as_ref().is_some_and(|e| e.is_file && e.content_hash.is_some()))
            .map(|d| d.path.as_str())
            .collect();

        let mut dest_hashes: HashMap<&str, Vec<&str>> = HashMap::new();
        for (path, entry) in tree_b {
            if entry.is_file {
                if let Some(hash) = entry.content_hash.as_deref() {
                    dest_hashes.entry(hash).or_default().push(path.as_str());
                }
            }
        }

        let mut used_dests: HashSet<String> = HashSet::new();
        let mut moved_records = Vec::new();

        for (path, entry_a) in tree_a {
            let Some(hash) = entry_a.content_hash.as_deref().filter(|_| entry_a.is_file) else { continue };
            let Some(candidates) = dest_hashes.get(hash) else { continue };

            // Several destinations can share this content hash (duplicate
            // files); take the first one that is still a valid, unused move
            // target rather than always the first in the bucket, so a
            // bucket with N equal-content renames can still match N times.
            let Some(dest_path) = candidates.iter().copied().find(|&dest_path| {
                dest_path != path.as_str()
                    && removed_or_changed.contains(path.as_str())
                    && added_or_changed.contains(dest_path)
                    && !used_dests.contains(dest_path)
            }) else {
                continue;
            };
            used_dests.insert(dest_path.to_string());

            let entry_b = &tree_b[dest_path];
            let mut record = FsDiffRecord::new(path.clone(), DiffType::Moved, Some(entry_a.clone()), Some(entry_b.clone()));
            let changes = effective_changes(self.change_detector.detect_changes(entry_a, entry_b, options), options);
            for change in changes {
                record.add_change(change);
            }
            record.moved_from = Some(path.clone());
            record.moved_to = Some(dest_path.to_string());
            moved_records.push((path.clone(), dest_path.to_string(), record));
        }

        let to_prune: HashSet<(String, DiffType)> = moved_records
            .iter()
            .flat_map(|(src, dest, _)| {
                [(src.clone(), DiffType::Removed), (src.clone(), DiffType::Modified), (dest.clone(), DiffType::Added), (dest.clone(), DiffType::Modified)]
            })
            .collect();

        // Only prune a source/dest's ADDED or REMOVED record, never a
        // Modified one that legitimately stands on its own (Modified
        // records never participate in a move: the path didn't disappear).
        diffs.retain(|d| {
            if d.diff_type == DiffType::Removed && to_prune.contains(&(d.path.clone(), DiffType::Removed)) {
                return false;
            }
            if d.diff_type == DiffType::Added && to_prune.contains(&(d.path.clone(), DiffType::Added)) {
                return false;
            }
            true
        });

        diffs.extend(moved_records.into_iter().map(|(_, _, record)| record));
        diffs
    }
}

/// A timestamped, immutable collection of diff records with reporting
/// projections.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FsDiffResults {
    pub records: Vec<FsDiffRecord>,
    pub options: DiffOptions,
    pub timestamp: i64,
}

impl FsDiffResults {
    pub fn new(records: Vec<FsDiffRecord>, options: DiffOptions, timestamp: i64) -> Self {
        FsDiffResults { records, options, timestamp }
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn count_of(&self, diff_type: DiffType) -> usize {
        self.records.iter().filter(|r| r.diff_type == diff_type).count()
    }

    pub fn paths(&self) -> Vec<&str> {
        self.records.iter().map(|r| r.path.as_str()).collect()
    }

    /// One line per record: `[+] /path`.
    pub fn short(&self) -> String {
        self.records.iter().map(|r| format!("[{}] {}", marker(r.diff_type), r.path)).collect::<Vec<_>>().join("\n")
    }

    /// One line per record with the full change description appended.
    pub fn full(&self) -> String {
        self.records
            .iter()
            .map(|r| format!("[{}] {} ({})", marker(r.diff_type), r.path, r.change_summary()))
            .collect::<Vec<_>>()
            .join("\n")
    }

    pub fn json(&self, pretty: bool) -> serde_json::Result<String> {
        if pretty {
            serde_json::to_string_pretty(self)
        } else {
            serde_json::to_string(self)
        }
    }

    /// Render a unified-diff-style report: one `diff a/<path> b/<path>`
    /// section per record with a content body when available, and
    /// `/dev/null` overlays for pure adds/removes.
    pub fn diff(&self, diffstat: bool) -> String {
        let mut out = String::new();
        for record in &self.records {
            out.push_str(&format!("diff a{0} b{0}\n", record.path));
            let (old_label, new_label) = match record.diff_type {
                DiffType::Added => ("/dev/null".to_string(), format!("b{}", record.path)),
                DiffType::Removed => (format!("a{}", record.path), "/dev/null".to_string()),
                _ => (format!("a{}", record.path), format!("b{}", record.path)),
            };
            out.push_str(&format!("--- {old_label}\n+++ {new_label}\n"));
            if let Some(diff) = &record.content_diff {
                if diff.is_binary {
                    out.push_str(&format!("Binary files differ: {}\n", diff.summary));
                } else {
                    for line in &diff.lines {
                        out.push_str(line);
                        out.push('\n');
                    }
                }
            } else {
                out.push_str(&format!("{}\n", record.change_summary()));
            }
            if diffstat {
                out.push_str(&format!("  ({} change(s))\n", record.changes.len()));
            }
        }
        out
    }

    pub fn summary(&self) -> String {
        format!(
            "{} added, {} removed, {} modified, {} moved, {} type changed",
            self.count_of(DiffType::Added),
            self.count_of(DiffType::Removed),
            self.count_of(DiffType::Modified),
            self.count_of(DiffType::Moved),
            self.count_of(DiffType::TypeChanged),
        )
    }
}

fn marker(diff_type: DiffType) -> &'static str {
    match diff_type {
        DiffType::Added => "+",
        DiffType::Removed => "-",
        DiffType::Modified => "*",
        DiffType::Moved => "x",
        DiffType::TypeChanged => "!",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;
    use std::path::PathBuf;

    fn file_entry(path: &str, hash: &str) -> FsEntry {
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
            content_hash: Some(hash.to_string()),
            xattrs: Default::default(),
            file_type_info: None,
        }
    }

    fn options_no_content_diff() -> DiffOptions {
        let mut options = DiffOptions::default();
        options.include_content_diffs = false;
        options
    }

    #[test]
    fn detects_added_and_removed() {
        let mut tree_a = BTreeMap::new();
        tree_a.insert("/old".to_string(), file_entry("/old", "X"));
        let mut tree_b = BTreeMap::new();
        tree_b.insert("/new".to_string(), file_entry("/new", "Y"));

        let engine = DiffEngine::new();
        let diffs = engine.compute_diff(&tree_a, &tree_b, &options_no_content_diff());
        assert_eq!(diffs.len(), 2);
        assert!(diffs.iter().any(|d| d.diff_type == DiffType::Added && d.path == "/new"));
        assert!(diffs.iter().any(|d| d.diff_type == DiffType::Removed && d.path == "/old"));
    }

    #[test]
    fn detects_move_by_matching_content_hash() {
        let mut tree_a = BTreeMap::new();
        tree_a.insert("/old".to_string(), file_entry("/old", "X"));
        let mut tree_b = BTreeMap::new();
        tree_b.insert("/new".to_string(), file_entry("/new", "X"));

        let engine = DiffEngine::new();
        let diffs = engine.compute_diff(&tree_a, &tree_b, &options_no_content_diff());

        assert_eq!(diffs.len(), 1);
        assert_eq!(diffs[0].diff_type, DiffType::Moved);
        assert_eq!(diffs[0].moved_from.as_deref(), Some("/old"));
        assert_eq!(diffs[0].moved_to.as_deref(), Some("/new"));
    }

    #[test]
    fn detects_moves_for_every_file_sharing_a_duplicate_hash() {
        let mut tree_a = BTreeMap::new();
        tree_a.insert("/a".to_string(), file_entry("/a", "X"));
        tree_a.insert("/b".to_string(), file_entry("/b", "X"));
        let mut tree_b = BTreeMap::new();
        tree_b.insert("/x".to_string(), file_entry("/x", "X"));
        tree_b.insert("/y".to_string(), file_entry("/y", "X"));

        let engine = DiffEngine::new();
        let diffs = engine.compute_diff(&tree_a, &tree_b, &options_no_content_diff());

        assert_eq!(diffs.iter().filter(|d| d.diff_type == DiffType::Moved).count(), 2);
        let dests: std::collections::HashSet<_> = diffs.iter().filter_map(|d| d.moved_to.as_deref()).collect();
        assert_eq!(dests, std::collections::HashSet::from(["/x", "/y"]));
    }

    #[test]
    fn unmodified_entries_produce_no_record() {
        let mut tree_a = BTreeMap::new();
        tree_a.insert("/same".to_string(), file_entry("/same", "X"));
        let tree_b = tree_a.clone();

        let engine = DiffEngine::new();
        let diffs = engine.compute_diff(&tree_a, &tree_b, &options_no_content_diff());
        assert!(diffs.is_empty());
    }

    #[test]
    fn results_projections_report_correct_counts() {
        let mut tree_a = BTreeMap::new();
        tree_a.insert("/gone".to_string(), file_entry("/gone", "A"));
        let mut tree_b = BTreeMap::new();
        tree_b.insert("/added".to_string(), file_entry("/added", "B"));

        let engine = DiffEngine::new();
        let records = engine.compute_diff(&tree_a, &tree_b, &options_no_content_diff());
        let results = FsDiffResults::new(records, options_no_content_diff(), 1000);
        assert_eq!(results.count_of(DiffType::Added), 1);
        assert_eq!(results.count_of(DiffType::Removed), 1);
        assert_eq!(results.paths().len(), 2);
    }
}
