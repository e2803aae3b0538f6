//! File system comparison options and path-based diff categories (spec §4.6).

use serde::{Deserialize, Serialize};

/// Controls for a single diff run. Immutable once constructed; every field
/// has a default matching the conservative, metadata-inclusive behaviour.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DiffOptions {
    pub ignore_timestamps: bool,
    pub ignore_permissions: bool,
    pub ignore_ownership: bool,
    pub content_only: bool,
    pub include_system_dirs: bool,
    pub include_content_diffs: bool,
    pub use_magic_file_type: bool,
    pub follow_symlinks: bool,
    pub max_file_size: u64,
    pub max_content_diff_size: u64,
    pub max_content_hash_size: u64,
    pub file_patterns: Vec<String>,
    pub exclude_patterns: Vec<String>,
    pub from_path: Option<String>,
    pub quiet: bool,
}

impl Default for DiffOptions {
    fn default() -> Self {
        DiffOptions {
            ignore_timestamps: false,
            ignore_permissions: false,
            ignore_ownership: false,
            content_only: false,
            include_system_dirs: false,
            include_content_diffs: true,
            use_magic_file_type: false,
            follow_symlinks: false,
            max_file_size: 0,
            max_content_diff_size: 1 << 20,
            max_content_hash_size: 1 << 20,
            file_patterns: Vec::new(),
            exclude_patterns: Vec::new(),
            from_path: None,
            quiet: false,
        }
    }
}

impl DiffOptions {
    /// A stable hash used to key diff cache filenames and to detect option
    /// mismatches on cache load.
    pub fn options_hash(&self) -> u64 {
        use std::collections::hash_map::DefaultHasher;
        use std::hash::{Hash, Hasher};

        let mut hasher = DefaultHasher::new();
        self.ignore_timestamps.hash(&mut hasher);
        self.ignore_permissions.hash(&mut hasher);
        self.ignore_ownership.hash(&mut hasher);
        self.content_only.hash(&mut hasher);
        self.include_system_dirs.hash(&mut hasher);
        self.include_content_diffs.hash(&mut hasher);
        self.use_magic_file_type.hash(&mut hasher);
        self.follow_symlinks.hash(&mut hasher);
        self.max_file_size.hash(&mut hasher);
        self.max_content_diff_size.hash(&mut hasher);
        self.max_content_hash_size.hash(&mut hasher);
        self.file_patterns.hash(&mut hasher);
        self.exclude_patterns.hash(&mut hasher);
        self.from_path.hash(&mut hasher);
        hasher.finish()
    }
}

/// Path-based categorization of a diff record, independent of its
/// `DiffType`. A path may match more than one prefix; the first matching
/// category in declaration order wins.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DiffCategory {
    CriticalSystem,
    UserData,
    Application,
    Temporary,
    LogFiles,
    PackageManagement,
}

impl DiffCategory {
    pub fn value(self) -> &'static str {
        match self {
            DiffCategory::CriticalSystem => "critical_system",
            DiffCategory::UserData => "user_data",
            DiffCategory::Application => "application",
            DiffCategory::Temporary => "temporary",
            DiffCategory::LogFiles => "log_files",
            DiffCategory::PackageManagement => "package_mgmt",
        }
    }

    /// Classify a diff path (relative to a mount root, leading `/`) into a
    /// category, or `None` if it matches none of the known prefixes.
    pub fn for_path(path: &str) -> Option<Self> {
        const RULES: &[(&str, DiffCategory)] = &[
            ("/etc", DiffCategory::CriticalSystem),
            ("/boot", DiffCategory::CriticalSystem),
            ("/home", DiffCategory::UserData),
            ("/var/log", DiffCategory::LogFiles),
            ("/var/tmp", DiffCategory::Temporary),
            ("/tmp", DiffCategory::Temporary),
            ("/usr", DiffCategory::Application),
            ("/opt", DiffCategory::Application),
        ];
        for (prefix, category) in RULES {
            if path == *prefix || path.starts_with(&format!("{prefix}/")) {
                return Some(*category);
            }
        }
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hash_changes_with_options() {
        let a = DiffOptions::default();
        let mut b = DiffOptions::default();
        b.ignore_timestamps = true;
        assert_ne!(a.options_hash(), b.options_hash());
    }

    #[test]
    fn classifies_known_prefixes() {
        assert_eq!(DiffCategory::for_path("/etc/passwd"), Some(DiffCategory::CriticalSystem));
        assert_eq!(DiffCategory::for_path("/var/log/messages"), Some(DiffCategory::LogFiles));
        assert_eq!(DiffCategory::for_path("/srv/data"), None);
    }
}
