//! `BootEntryStore`: the narrow surface this crate needs from an external
//! boot-loader-snippet manager (spec §4.4, §6 "boom" external dependency).
//!
//! The real system delegates to the `boom` command line tool/library; it is
//! treated here as an external collaborator behind a trait so the rest of
//! this crate stays testable without BLS snippets on disk.

use std::collections::HashMap;

use snapm_core::Result;

pub const SNAPSET_ARG: &str = "snapm.snapset";
pub const REVERT_ARG: &str = "snapm.revert";

/// Arguments needed to create one boot entry.
#[derive(Debug, Clone)]
pub struct BootEntrySpec {
    pub version: String,
    pub title: String,
    /// `"snapm.snapset=<uuid>"` or `"snapm.revert=<uuid>"`.
    pub tag_arg: String,
    pub root_device: String,
    pub mounts: Vec<String>,
    pub swaps: Vec<String>,
}

/// A created boot entry as reported by the store.
#[derive(Debug, Clone)]
pub struct BootEntry {
    pub boot_id: String,
    /// Raw kernel command line options string, including the `tag_arg`.
    pub options: String,
}

pub trait BootEntryStore: Send + Sync {
    fn create_entry(&self, spec: &BootEntrySpec) -> Result<BootEntry>;
    fn delete_entry(&self, boot_id: &str) -> Result<()>;
    fn find_entries(&self) -> Result<Vec<BootEntry>>;
}

/// In-memory `BootEntryStore`, used by tests in place of `boom`.
#[derive(Debug, Default)]
pub struct FakeBootEntryStore {
    entries: std::sync::Mutex<HashMap<String, BootEntry>>,
    next_id: std::sync::atomic::AtomicU64,
}

impl FakeBootEntryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl BootEntryStore for FakeBootEntryStore {
    fn create_entry(&self, spec: &BootEntrySpec) -> Result<BootEntry> {
        let id = self.next_id.fetch_add(1, std::sync::atomic::Ordering::SeqCst);
        let boot_id = format!("{id:016x}");
        let mut options = spec.tag_arg.clone();
        if !spec.mounts.is_empty() {
            options = format!("rw {options}");
        }
        let entry = BootEntry { boot_id: boot_id.clone(), options };
        self.entries.lock().unwrap().insert(boot_id, entry.clone());
        Ok(entry)
    }

    fn delete_entry(&self, boot_id: &str) -> Result<()> {
        self.entries.lock().unwrap().remove(boot_id);
        Ok(())
    }

    fn find_entries(&self) -> Result<Vec<BootEntry>> {
        Ok(self.entries.lock().unwrap().values().cloned().collect())
    }
}

/// Maps tag values (e.g. a snapset UUID as a string) to the `BootEntry`
/// tagged with that value, for one `entry_arg` ("snapm.snapset" or
/// "snapm.revert").
#[derive(Debug, Default)]
pub struct BootEntryCache {
    entry_arg: String,
    map: HashMap<String, BootEntry>,
}

impl BootEntryCache {
    pub fn new(entry_arg: impl Into<String>) -> Self {
        BootEntryCache { entry_arg: entry_arg.into(), map: HashMap::new() }
    }

    fn parse_entry(&self, entry: &BootEntry) -> Option<String> {
        entry.options.split_whitespace().find_map(|word| {
            word.strip_prefix(&format!("{}=", self.entry_arg)).map(|v| v.to_string())
        })
    }

    pub fn refresh(&mut self, store: &dyn BootEntryStore) -> Result<()> {
        self.map.clear();
        for entry in store.find_entries()? {
            if let Some(tag_value) = self.parse_entry(&entry) {
                self.map.insert(tag_value, entry);
            }
        }
        Ok(())
    }

    pub fn get(&self, tag_value: &str) -> Option<&BootEntry> {
        self.map.get(tag_value)
    }

    pub fn len(&self) -> usize {
        self.map.len()
    }

    pub fn is_empty(&self) -> bool {
        self.map.is_empty()
    }
}

/// Both entry caches (boot + revert) together, per the system's discovery
/// pass over boot entries.
#[derive(Debug)]
pub struct BootCache {
    pub entry_cache: BootEntryCache,
    pub revert_cache: BootEntryCache,
}

impl BootCache {
    pub fn new(store: &dyn BootEntryStore) -> Result<Self> {
        let mut entry_cache = BootEntryCache::new(SNAPSET_ARG);
        entry_cache.refresh(store)?;
        tracing::debug!(count = entry_cache.len(), "initialised boot entry cache");
        let mut revert_cache = BootEntryCache::new(REVERT_ARG);
        revert_cache.refresh(store)?;
        tracing::debug!(count = revert_cache.len(), "initialised revert boot entry cache");
        Ok(BootCache { entry_cache, revert_cache })
    }

    pub fn refresh(&mut self, store: &dyn BootEntryStore) -> Result<()> {
        self.entry_cache.refresh(store)?;
        tracing::debug!(count = self.entry_cache.len(), "refreshed boot entry cache");
        self.revert_cache.refresh(store)?;
        tracing::debug!(count = self.revert_cache.len(), "refreshed revert boot entry cache");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cache_indexes_entries_by_tag_value() {
        let store = FakeBootEntryStore::new();
        store
            .create_entry(&BootEntrySpec {
                version: "6.1.0".into(),
                title: "Snapshot t 1000".into(),
                tag_arg: format!("{SNAPSET_ARG}=abc-123"),
                root_device: "/dev/vg0/root".into(),
                mounts: vec![],
                swaps: vec![],
            })
            .unwrap();
        let cache = BootCache::new(&store).unwrap();
        assert!(cache.entry_cache.get("abc-123").is_some());
        assert!(cache.revert_cache.is_empty());
    }

    #[test]
    fn delete_then_refresh_drops_entry() {
        let store = FakeBootEntryStore::new();
        let created = store
            .create_entry(&BootEntrySpec {
                version: "6.1.0".into(),
                title: "Snapshot t 1000".into(),
                tag_arg: format!("{SNAPSET_ARG}=abc-123"),
                root_device: "/dev/vg0/root".into(),
                mounts: vec![],
                swaps: vec![],
            })
            .unwrap();
        let mut cache = BootCache::new(&store).unwrap();
        store.delete_entry(&created.boot_id).unwrap();
        cache.refresh(&store).unwrap();
        assert!(cache.entry_cache.is_empty());
    }
}
