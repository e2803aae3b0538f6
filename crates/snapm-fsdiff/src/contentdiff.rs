//! Content-level diffing for changed regular files (spec §4.6, §9): a
//! `ContentDiffer` trait keyed by file type, with a unified-diff default and
//! a summary-only fallback for binary content.

use std::fs;
use std::io::Read;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::entry::FsEntry;

/// Lines of content above which line-level unified diffing is skipped in
/// favour of a summary, to bound worst-case diff cost on huge text files.
const MAX_DIFF_LINES: usize = 20_000;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContentDiff {
    pub summary: String,
    pub is_binary: bool,
    pub lines: Vec<String>,
}

/// Dispatches content diffing by probing for binary content, matching the
/// donor's `use_magic`-independent null-byte heuristic.
pub trait ContentDiffer: Send + Sync {
    fn generate(
        &self,
        old_path: Option<&Path>,
        new_path: Option<&Path>,
        old_entry: Option<&FsEntry>,
        new_entry: Option<&FsEntry>,
    ) -> Option<ContentDiff>;
}

#[derive(Default)]
pub struct ContentDifferManager;

impl ContentDifferManager {
    pub fn new() -> Self {
        ContentDifferManager
    }
}

impl ContentDiffer for ContentDifferManager {
    fn generate(
        &self,
        old_path: Option<&Path>,
        new_path: Option<&Path>,
        old_entry: Option<&FsEntry>,
        new_entry: Option<&FsEntry>,
    ) -> Option<ContentDiff> {
        let old_bytes = old_path.and_then(|p| fs::read(p).ok());
        let new_bytes = new_path.and_then(|p| fs::read(p).ok());

        if old_bytes.as_deref().map(is_binary).unwrap_or(false) || new_bytes.as_deref().map(is_binary).unwrap_or(false) {
            return Some(binary_summary(old_entry, new_entry));
        }

        let old_text = old_bytes.map(|b| String::from_utf8_lossy(&b).into_owned());
        let new_text = new_bytes.map(|b| String::from_utf8_lossy(&b).into_owned());

        Some(text_unified_diff(old_text.as_deref(), new_text.as_deref()))
    }
}

fn is_binary(bytes: &[u8]) -> bool {
    bytes.iter().take(8192).any(|b| *b == 0)
}

fn binary_summary(old_entry: Option<&FsEntry>, new_entry: Option<&FsEntry>) -> ContentDiff {
    let old_size = old_entry.map(|e| e.size).unwrap_or(0);
    let new_size = new_entry.map(|e| e.size).unwrap_or(0);
    ContentDiff { summary: format!("binary file changed ({old_size} -> {new_size} bytes)"), is_binary: true, lines: Vec::new() }
}

fn text_unified_diff(old_text: Option<&str>, new_text: Option<&str>) -> ContentDiff {
    let old_lines: Vec<&str> = old_text.map(|t| t.lines().collect()).unwrap_or_default();
    let new_lines: Vec<&str> = new_text.map(|t| t.lines().collect()).unwrap_or_default();

    if old_lines.len() > MAX_DIFF_LINES || new_lines.len() > MAX_DIFF_LINES {
        return ContentDiff {
            summary: format!("{} -> {} lines (too large for line-level diff)", old_lines.len(), new_lines.len()),
            is_binary: false,
            lines: Vec::new(),
        };
    }

    let ops = diff_lines(&old_lines, &new_lines);
    let lines = render_unified(&old_lines, &new_lines, &ops);
    let added = ops.iter().filter(|op| matches!(op, DiffOp::Insert(_))).count();
    let removed = ops.iter().filter(|op| matches!(op, DiffOp::Delete(_))).count();

    ContentDiff { summary: format!("{added} insertion(s), {removed} deletion(s)"), is_binary: false, lines }
}

#[derive(Debug, Clone, Copy)]
enum DiffOp {
    /// Index into both `old` and `new` line slices (equal line).
    Equal(usize, usize),
    /// Index into `old` (line removed).
    Delete(usize),
    /// Index into `new` (line added).
    Insert(usize),
}

/// Longest-common-subsequence based line diff. Quadratic in input size;
/// callers bound input via `MAX_DIFF_LINES`.
fn diff_lines(old: &[&str], new: &[&str]) -> Vec<DiffOp> {
    let n = old.len();
    let m = new.len();
    let mut table = vec![vec![0u32; m + 1]; n + 1];
    for i in (0..n).rev() {
        for j in (0..m).rev() {
            table[i][j] = if old[i] == new[j] { table[i + 1][j + 1] + 1 } else { table[i + 1][j].max(table[i][j + 1]) };
        }
    }

    let mut ops = Vec::new();
    let (mut i, mut j) = (0, 0);
    while i < n && j < m {
        if old[i] == new[j] {
            ops.push(DiffOp::Equal(i, j));
            i += 1;
            j += 1;
        } else if table[i + 1][j] >= table[i][j + 1] {
            ops.push(DiffOp::Delete(i));
            i += 1;
        } else {
            ops.push(DiffOp::Insert(j));
            j += 1;
        }
    }
    while i < n {
        ops.push(DiffOp::Delete(i));
        i += 1;
    }
    while j < m {
        ops.push(DiffOp::Insert(j));
        j += 1;
    }
    ops
}

/// Render diff ops as unified-diff body lines (no file headers; callers in
/// `engine`/cache add the `--- a/<path>` / `+++ b/<path>` preamble).
fn render_unified(old: &[&str], new: &[&str], ops: &[DiffOp]) -> Vec<String> {
    let mut lines = Vec::new();
    for op in ops {
        match op {
            DiffOp::Equal(i, _) => lines.push(format!(" {}", old[*i])),
            DiffOp::Delete(i) => lines.push(format!("-{}", old[*i])),
            DiffOp::Insert(j) => lines.push(format!("+{}", new[*j])),
        }
    }
    lines
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn detects_inserted_and_deleted_lines() {
        let old = vec!["a", "b", "c"];
        let new = vec!["a", "x", "c"];
        let ops = diff_lines(&old, &new);
        let lines = render_unified(&old, &new, &ops);
        assert!(lines.contains(&"-b".to_string()));
        assert!(lines.contains(&"+x".to_string()));
        assert!(lines.contains(&" a".to_string()));
    }

    #[test]
    fn binary_content_falls_back_to_summary() {
        let summary = binary_summary(None, None);
        assert!(summary.is_binary);
        assert!(summary.lines.is_empty());
    }
}
