//! `Manager`: the high level snapshot set lifecycle interface (spec §4.2).

use std::collections::HashMap;
use std::fs;
use std::os::unix::fs::FileTypeExt;
use std::path::{Path, PathBuf};

use uuid::Uuid;

use snapm_boot::{
    create_snapset_boot_entry, create_snapset_revert_entry, delete_snapset_boot_entry,
    delete_snapset_revert_entry, BlkidResolver, BootCache, BootEntryStore, DeviceResolver, Fstab,
};
use snapm_core::{validate_name, Error, Result, Selection, SizePolicy, Snapshot, SnapshotSet};
use snapm_provider::{Provider, SourceRequest};

use crate::critical::{JournalGuard, SignalGuard};
use crate::lock::{default_lock_path, ManagerLock};

/// One parsed `"<source>[:<size_policy>]"` source specification.
#[derive(Debug, Clone)]
pub struct SourceSpec {
    pub source: String,
    pub size_policy: Option<String>,
}

impl SourceSpec {
    /// A trailing `:<policy>` segment is only treated as a policy if it
    /// parses as one; otherwise it is folded back into the path, so paths
    /// containing a literal colon still work.
    pub fn parse(spec: &str) -> Self {
        if let Some((path, policy)) = spec.rsplit_once(':') {
            if SizePolicy::parse(Some(policy), true).is_ok() {
                return SourceSpec { source: path.to_string(), size_policy: Some(policy.to_string()) };
            }
        }
        SourceSpec { source: spec.to_string(), size_policy: None }
    }
}

fn is_block_device(path: &Path) -> bool {
    fs::metadata(path).map(|m| m.file_type().is_block_device()).unwrap_or(false)
}

fn find_mount_point_for_devpath(devpath: &str) -> Result<String> {
    let output = std::process::Command::new("findmnt")
        .args(["-n", "-o", "TARGET", "--source", devpath])
        .output()
        .map_err(|e| Error::callout(format!("failed to spawn findmnt: {e}")))?;
    if !output.status.success() {
        return Err(Error::not_found(format!("no mount point for device {devpath}")));
    }
    Ok(String::from_utf8_lossy(&output.stdout).trim().to_string())
}

/// Snapshot set manager: process-exclusive instance, provider orchestration,
/// discovery, and lifecycle operations.
pub struct Manager {
    providers: Vec<Box<dyn Provider>>,
    snapshot_sets: Vec<SnapshotSet>,
    by_name: HashMap<String, usize>,
    by_uuid: HashMap<Uuid, usize>,
    boot_cache: Option<BootCache>,
    boot_store: Option<Box<dyn BootEntryStore>>,
    fstab_path: PathBuf,
    resolver: Box<dyn DeviceResolver>,
    _lock: ManagerLock,
}

impl Manager {
    pub fn new(providers: Vec<Box<dyn Provider>>, boot_store: Option<Box<dyn BootEntryStore>>) -> Result<Self> {
        Self::with_lock_path(providers, boot_store, default_lock_path(), PathBuf::from("/etc/fstab"))
    }

    /// Like [`Manager::new`], but with an overridable lock file and fstab
    /// path, for use from tests and alternate roots.
    pub fn with_lock_path(
        providers: Vec<Box<dyn Provider>>,
        boot_store: Option<Box<dyn BootEntryStore>>,
        lock_path: PathBuf,
        fstab_path: PathBuf,
    ) -> Result<Self> {
        let lock = ManagerLock::acquire(&lock_path)?;
        let boot_cache = match &boot_store {
            Some(store) => Some(BootCache::new(store.as_ref())?),
            None => None,
        };
        let mut manager = Manager {
            providers,
            snapshot_sets: Vec::new(),
            by_name: HashMap::new(),
            by_uuid: HashMap::new(),
            boot_cache,
            boot_store,
            fstab_path,
            resolver: Box::new(BlkidResolver),
            _lock: lock,
        };
        manager.discover_snapshot_sets()?;
        Ok(manager)
    }

    fn rebuild_indices(&mut self) {
        self.by_name.clear();
        self.by_uuid.clear();
        for (idx, set) in self.snapshot_sets.iter().enumerate() {
            self.by_name.insert(set.name().to_string(), idx);
            self.by_uuid.insert(set.uuid(), idx);
        }
    }

    /// Rediscover snapshot sets from every loaded provider, grouping members
    /// by `snapset_name` and rejecting groups with inconsistent timestamps.
    pub fn discover_snapshot_sets(&mut self) -> Result<()> {
        if let (Some(cache), Some(store)) = (&mut self.boot_cache, &self.boot_store) {
            cache.refresh(store.as_ref())?;
        }

        let mut snapshots: Vec<Snapshot> = Vec::new();
        for provider in &self.providers {
            match provider.discover_snapshots() {
                Ok(mut found) => snapshots.append(&mut found),
                Err(err) => tracing::warn!(provider = %provider.kind(), error = %err, "provider discovery failed"),
            }
        }

        let mut names: Vec<String> = snapshots.iter().map(|s| s.snapset_name.clone()).collect();
        names.sort();
        names.dedup();

        let mut sets = Vec::new();
        for name in names {
            let members: Vec<Snapshot> = snapshots.iter().filter(|s| s.snapset_name == name).cloned().collect();
            let timestamp = members[0].timestamp;
            if members.iter().any(|m| m.timestamp != timestamp) {
                tracing::warn!(snapset = %name, "snapshot set has inconsistent timestamps, excluding from discovery");
                continue;
            }
            let mut set = SnapshotSet::new(name, timestamp, members)?;
            if let Some(cache) = &self.boot_cache {
                let uuid_str = set.uuid().to_string();
                if cache.entry_cache.get(set.name()).is_some() || cache.entry_cache.get(&uuid_str).is_some() {
                    set.boot_entry = Some(set.uuid());
                }
                if cache.revert_cache.get(set.name()).is_some() || cache.revert_cache.get(&uuid_str).is_some() {
                    set.revert_entry = Some(set.uuid());
                }
            }
            sets.push(set);
        }
        sets.sort_by(|a, b| a.name().cmp(b.name()));

        self.snapshot_sets = sets;
        self.rebuild_indices();
        tracing::debug!(count = self.snapshot_sets.len(), "discovered snapshot sets");
        Ok(())
    }

    pub fn find_snapshot_sets(&self, selection: &Selection) -> Vec<&SnapshotSet> {
        self.snapshot_sets.iter().filter(|s| selection_matches_set(selection, s)).collect()
    }

    pub fn find_snapshots(&self, selection: &Selection) -> Vec<&Snapshot> {
        self.snapshot_sets
            .iter()
            .flat_map(|s| s.snapshots())
            .filter(|s| selection_matches_snapshot(selection, s))
            .collect()
    }

    fn snapset_from_name_or_uuid(&self, name: Option<&str>, uuid: Option<Uuid>) -> Result<&SnapshotSet> {
        let idx = match (name, uuid) {
            (Some(name), Some(uuid)) => {
                let by_name = *self.by_name.get(name).ok_or_else(|| Error::not_found(format!("no snapshot set named {name}")))?;
                let by_uuid = *self.by_uuid.get(&uuid).ok_or_else(|| Error::not_found(format!("no snapshot set with uuid {uuid}")))?;
                if by_name != by_uuid {
                    return Err(Error::invalid_identifier(format!("conflicting name and uuid: {uuid} does not match {name}")));
                }
                by_name
            }
            (Some(name), None) => *self.by_name.get(name).ok_or_else(|| Error::not_found(format!("no snapshot set named {name}")))?,
            (None, Some(uuid)) => *self.by_uuid.get(&uuid).ok_or_else(|| Error::not_found(format!("no snapshot set with uuid {uuid}")))?,
            (None, None) => return Err(Error::not_found("a snapshot set name or uuid is required")),
        };
        Ok(&self.snapshot_sets[idx])
    }

    fn validate_snapset_name(&self, name: &str) -> Result<()> {
        if self.by_name.contains_key(name) {
            return Err(Error::exists(format!("snapshot set named '{name}' already exists")));
        }
        validate_name(name)
    }

    /// Probe every loaded provider for each source; fail `NoProvider` if none
    /// claim it.
    fn find_and_verify_providers<'a>(&'a self, sources: &[String]) -> Result<HashMap<String, &'a dyn Provider>> {
        let mut map = HashMap::new();
        for source in sources {
            let path = Path::new(source);
            if !path.exists() {
                return Err(Error::not_found(format!("source path '{source}' does not exist")));
            }
            let is_mount = std::process::Command::new("findmnt")
                .args(["-n", "--target", source])
                .output()
                .map(|o| o.status.success())
                .unwrap_or(false);
            if !is_mount && !is_block_device(path) {
                return Err(Error::path(format!("path '{source}' is not a block device or mount point")));
            }
            let mut chosen: Option<&dyn Provider> = None;
            for provider in &self.providers {
                if provider.can_snapshot(path)? {
                    chosen = Some(provider.as_ref());
                }
            }
            match chosen {
                Some(p) => {
                    map.insert(source.clone(), p);
                }
                None => return Err(Error::no_provider(format!("could not find snapshot provider for {source}"))),
            }
        }
        Ok(map)
    }

    fn check_recursion(&self, origins: &HashMap<String, String>) -> Result<()> {
        let snapshot_devices: Vec<&str> =
            self.snapshot_sets.iter().flat_map(|s| s.snapshots()).map(|s| s.devpath.as_str()).collect();
        for (source, device) in origins {
            if snapshot_devices.contains(&device.as_str()) {
                return Err(Error::recursion(format!(
                    "snapshots of snapshots are not supported: {source} corresponds to snapshot device {device}"
                )));
            }
        }
        Ok(())
    }

    /// The lowest unused integer `n` such that `<basename>.<n>` is not an
    /// existing set name, for autoindexed creation.
    fn next_autoindex(&self, basename: &str) -> u32 {
        let mut n = 0u32;
        loop {
            let candidate = format!("{basename}.{n}");
            if !self.by_name.contains_key(&candidate) {
                return n;
            }
            n += 1;
        }
    }

    #[allow(clippy::too_many_arguments)]
    pub fn create_snapshot_set(
        &mut self,
        name: &str,
        source_specs: &[String],
        default_size_policy: Option<&str>,
        boot: bool,
        revert: bool,
        autoindex: bool,
        timestamp: i64,
    ) -> Result<&SnapshotSet> {
        if source_specs.is_empty() {
            return Err(Error::argument("at least one source is required"));
        }

        let name = if autoindex {
            format!("{name}.{}", self.next_autoindex(name))
        } else {
            name.to_string()
        };
        self.validate_snapset_name(&name)?;

        let specs: Vec<SourceSpec> = source_specs.iter().map(|s| SourceSpec::parse(s)).collect();
        let sources: Vec<String> = specs.iter().map(|s| s.source.clone()).collect();
        let provider_map = self.find_and_verify_providers(&sources)?;

        let mut origins: HashMap<String, String> = HashMap::new();
        let mut mounts: HashMap<String, String> = HashMap::new();
        for spec in &specs {
            let path = Path::new(&spec.source);
            if is_block_device(path) {
                let mount = find_mount_point_for_devpath(&spec.source)?;
                if provider_map.contains_key(&mount) {
                    return Err(Error::invalid_identifier(format!(
                        "duplicate snapshot source {} already added to {name} as {mount}",
                        spec.source
                    )));
                }
                origins.insert(spec.source.clone(), spec.source.clone());
                mounts.insert(spec.source.clone(), mount);
            } else {
                let provider = provider_map[&spec.source];
                let origin = provider
                    .origin_from_mount_point(path)?
                    .ok_or_else(|| Error::not_found(format!("no origin device for mount point {}", spec.source)))?;
                origins.insert(spec.source.clone(), origin);
                mounts.insert(spec.source.clone(), spec.source.clone());
            }
        }

        // Termination signals are blocked for the remainder of this
        // operation; delivery resumes (and any pending signal is handled)
        // when the guard drops at the end of this function.
        let _signal_guard = SignalGuard::block()?;

        self.check_recursion(&origins)?;

        let mut transactions = HashMap::new();
        for (source, provider) in &provider_map {
            let policy = SizePolicy::parse(
                specs.iter().find(|s| &s.source == source).and_then(|s| s.size_policy.as_deref()).or(default_size_policy),
                !is_block_device(Path::new(source)),
            )?;
            let mount = &mounts[source];
            let tx = transactions
                .entry(provider.kind())
                .or_insert_with(|| provider.start_transaction());
            let req = SourceRequest {
                source: Path::new(&origins[source]),
                mount_point: mount,
                policy,
                snapset_name: &name,
                timestamp,
            };
            provider.check_create_snapshot(tx, &req).map_err(|err| {
                tracing::error!(provider = %provider.kind(), error = %err, "error checking snapshot creation");
                err
            })?;
        }

        // Journal writes to /var are suspended for the duration of snapshot
        // creation and resumed on every exit from this block, success or
        // failure, so the journal never writes to a volume mid-snapshot.
        let journal_guard = JournalGuard::suspend()?;

        let mut snapshots = Vec::new();
        for (source, provider) in &provider_map {
            let policy = SizePolicy::parse(
                specs.iter().find(|s| &s.source == source).and_then(|s| s.size_policy.as_deref()).or(default_size_policy),
                !is_block_device(Path::new(source)),
            )?;
            let mount = &mounts[source];
            let tx = &transactions[&provider.kind()];
            let req = SourceRequest {
                source: Path::new(&origins[source]),
                mount_point: mount,
                policy,
                snapset_name: &name,
                timestamp,
            };
            match provider.create_snapshot(tx, &req) {
                Ok(snapshot) => snapshots.push((provider, snapshot)),
                Err(err) => {
                    tracing::error!(error = %err, "error creating snapshot set member {name}");
                    drop(journal_guard);
                    for (p, s) in &snapshots {
                        let _ = p.delete_snapshot(s);
                    }
                    return Err(Error::plugin_with_source(format!("could not create all snapshots for set {name}"), err));
                }
            }
        }

        drop(journal_guard);

        for (kind, tx) in transactions {
            if let Some(provider) = provider_map.values().find(|p| p.kind() == kind) {
                provider.end_transaction(tx)?;
            }
        }

        let mut set = SnapshotSet::new(name, timestamp, snapshots.into_iter().map(|(_, s)| s).collect())?;

        if boot || revert {
            set.set_autoactivate(true);
            self.activate_set_members(&mut set)?;
        }

        if boot {
            let fstab = Fstab::read(&self.fstab_path)?;
            if let Some(store) = &self.boot_store {
                if let Err(err) = create_snapset_boot_entry(&mut set, &fstab, self.resolver.as_ref(), store.as_ref(), None) {
                    self.delete_set_members(&set)?;
                    return Err(Error::plugin_with_source("failed to create snapshot set boot entry", err));
                }
            }
        }

        if revert {
            let fstab = Fstab::read(&self.fstab_path)?;
            if let Some(store) = &self.boot_store {
                if let Err(err) = create_snapset_revert_entry(&mut set, &fstab, self.resolver.as_ref(), store.as_ref(), None) {
                    self.delete_set_members(&set)?;
                    return Err(Error::plugin_with_source("failed to create snapshot set revert entry", err));
                }
            }
        }

        let idx = self.snapshot_sets.len();
        self.by_name.insert(set.name().to_string(), idx);
        self.by_uuid.insert(set.uuid(), idx);
        self.snapshot_sets.push(set);
        Ok(&self.snapshot_sets[idx])
    }

    fn provider_for_snapshot(&self, snapshot: &Snapshot) -> Option<&dyn Provider> {
        self.providers.iter().map(|p| p.as_ref()).find(|p| p.kind().to_string() == snapshot.provider)
    }

    fn activate_set_members(&self, set: &mut SnapshotSet) -> Result<()> {
        for snapshot in set.snapshots_mut() {
            if let Some(provider) = self.provider_for_snapshot(snapshot) {
                provider.activate_snapshot(snapshot)?;
            }
        }
        Ok(())
    }

    fn delete_set_members(&self, set: &SnapshotSet) -> Result<()> {
        for snapshot in set.snapshots() {
            if let Some(provider) = self.provider_for_snapshot(snapshot) {
                provider.delete_snapshot(snapshot)?;
            }
        }
        Ok(())
    }

    pub fn rename_snapshot_set(&mut self, old_name: &str, new_name: &str) -> Result<()> {
        let idx = *self.by_name.get(old_name).ok_or_else(|| Error::not_found(format!("cannot find snapshot set named {old_name}")))?;
        self.validate_snapset_name(new_name)?;
        self.snapshot_sets[idx].check_mutable()?;

        let original = self.snapshot_sets[idx].snapshots().to_vec();
        let mut renamed: Vec<Snapshot> = Vec::with_capacity(original.len());

        for snapshot in &original {
            let mut s = snapshot.clone();
            match self.provider_for_snapshot(&s) {
                Some(provider) => {
                    if let Err(err) = provider.rename_snapshot(&mut s, new_name) {
                        tracing::error!(error = %err, "failed to rename snapshot {}", snapshot.name);
                        self.rollback_member_renames(&original, &renamed);
                        return Err(Error::plugin_with_source("could not rename all snapshot set members", err));
                    }
                    renamed.push(s);
                }
                None => renamed.push(s),
            }
        }

        self.snapshot_sets[idx].replace_members(renamed);
        self.snapshot_sets[idx].rename(new_name)?;
        self.rebuild_indices();
        Ok(())
    }

    /// Roll every already-renamed member in `renamed` back to its original
    /// on-disk identity by re-invoking its provider with the original
    /// per-member `snapset_name`, matching how the forward rename produced
    /// a distinct provider-encoded name per member. Best-effort: a failure
    /// to roll back one member is logged, not propagated, since the caller
    /// is already unwinding a failed rename.
    fn rollback_member_renames(&self, original: &[Snapshot], renamed: &[Snapshot]) {
        for s in renamed {
            let Some(before) = original.iter().find(|o| o.origin == s.origin) else {
                continue;
            };
            if let Some(provider) = self.provider_for_snapshot(s) {
                let mut s = s.clone();
                if let Err(err) = provider.rename_snapshot(&mut s, &before.snapset_name) {
                    tracing::error!(error = %err, "failed to roll back rename for snapshot {}", s.name);
                }
            }
        }
    }

    pub fn delete_snapshot_sets(&mut self, selection: &Selection) -> Result<usize> {
        let matching: Vec<usize> = self
            .snapshot_sets
            .iter()
            .enumerate()
            .filter(|(_, s)| selection_matches_set(selection, s))
            .map(|(i, _)| i)
            .collect();
        if matching.is_empty() {
            return Err(Error::not_found(format!("could not find snapshot sets matching {selection:?}")));
        }
        for &idx in &matching {
            if self.snapshot_sets[idx].any_mounted() {
                return Err(Error::busy(format!("snapshot set {} has mounted members", self.snapshot_sets[idx].name())));
            }
        }

        let mut deleted = 0;
        let mut names = Vec::new();
        for &idx in &matching {
            names.push(self.snapshot_sets[idx].name().to_string());
        }
        for name in names {
            let idx = self.by_name[&name];
            let mut set = self.snapshot_sets[idx].clone();
            if let Some(store) = &self.boot_store {
                delete_snapset_boot_entry(&mut set, store.as_ref())?;
                delete_snapset_revert_entry(&mut set, store.as_ref())?;
            }
            self.delete_set_members(&set)?;
            let idx = self.by_name[&name];
            self.snapshot_sets.remove(idx);
            self.rebuild_indices();
            deleted += 1;
        }
        if let (Some(cache), Some(store)) = (&mut self.boot_cache, &self.boot_store) {
            cache.refresh(store.as_ref())?;
        }
        Ok(deleted)
    }

    pub fn resize_snapshot_set(&mut self, name: Option<&str>, uuid: Option<Uuid>, source_specs: &[String], default_size_policy: Option<&str>) -> Result<()> {
        let idx = {
            let set = self.snapset_from_name_or_uuid(name, uuid)?;
            self.by_uuid[&set.uuid()]
        };
        self.snapshot_sets[idx].check_mutable()?;

        let per_source: HashMap<String, Option<String>> = if !source_specs.is_empty() {
            source_specs
                .iter()
                .map(|spec| {
                    let parsed = SourceSpec::parse(spec);
                    (parsed.source, parsed.size_policy)
                })
                .collect()
        } else {
            self.snapshot_sets[idx]
                .snapshots()
                .iter()
                .map(|s| (s.origin.clone(), default_size_policy.map(str::to_string)))
                .collect()
        };

        let mut transactions = HashMap::new();
        let set = self.snapshot_sets[idx].clone();
        for snapshot in set.snapshots() {
            let Some(policy_str) = per_source.get(&snapshot.origin) else { continue };
            let Some(provider) = self.provider_for_snapshot(snapshot) else { continue };
            let policy = SizePolicy::parse(policy_str.as_deref().or(default_size_policy), !snapshot.mount_point.is_empty())?;
            let tx = transactions.entry(provider.kind()).or_insert_with(|| provider.start_transaction());
            provider.check_resize_snapshot(tx, snapshot, policy)?;
        }
        for snapshot in self.snapshot_sets[idx].snapshots_mut() {
            let Some(policy_str) = per_source.get(&snapshot.origin) else { continue };
            let policy = SizePolicy::parse(policy_str.as_deref().or(default_size_policy), !snapshot.mount_point.is_empty())?;
            // Provider lookup is duplicated here since we need &self for
            // provider_for_snapshot and &mut self.snapshot_sets simultaneously.
            let provider_kind = snapshot.provider.clone();
            if let Some(provider) = self.providers.iter().find(|p| p.kind().to_string() == provider_kind) {
                provider.resize_snapshot(snapshot, policy)?;
            }
        }
        for (kind, tx) in transactions {
            if let Some(provider) = self.providers.iter().find(|p| p.kind() == kind) {
                provider.end_transaction(tx)?;
            }
        }
        Ok(())
    }

    pub fn revert_snapshot_set(&mut self, name: Option<&str>, uuid: Option<Uuid>) -> Result<()> {
        let idx = {
            let set = self.snapset_from_name_or_uuid(name, uuid)?;
            if matches!(set.status(), snapm_core::SnapStatus::Invalid | snapm_core::SnapStatus::Reverting) {
                return Err(Error::state(format!("snapshot set {} cannot be reverted", set.name())));
            }
            self.by_uuid[&set.uuid()]
        };

        if let Some(store) = &self.boot_store {
            let mut set = self.snapshot_sets[idx].clone();
            delete_snapset_boot_entry(&mut set, store.as_ref())?;
            self.snapshot_sets[idx].boot_entry = set.boot_entry;
        }

        for snapshot in self.snapshot_sets[idx].clone().snapshots() {
            let provider_kind = snapshot.provider.clone();
            if let Some(provider) = self.providers.iter().find(|p| p.kind().to_string() == provider_kind) {
                provider.check_revert_snapshot(snapshot)?;
            }
        }
        for snapshot in self.snapshot_sets[idx].snapshots_mut() {
            let provider_kind = snapshot.provider.clone();
            if let Some(provider) = self.providers.iter().find(|p| p.kind().to_string() == provider_kind) {
                provider.revert_snapshot(snapshot)?;
            }
        }

        if let (Some(cache), Some(store)) = (&mut self.boot_cache, &self.boot_store) {
            cache.refresh(store.as_ref())?;
        }
        Ok(())
    }

    pub fn activate_snapshot_sets(&mut self, selection: &Selection) -> Result<usize> {
        self.for_each_matching_mut(selection, |manager, idx| {
            manager.snapshot_sets[idx].check_mutable()?;
            let mut set = manager.snapshot_sets[idx].clone();
            manager.activate_set_members(&mut set)?;
            manager.snapshot_sets[idx] = set;
            Ok(())
        })
    }

    pub fn deactivate_snapshot_sets(&mut self, selection: &Selection) -> Result<usize> {
        self.for_each_matching_mut(selection, |manager, idx| {
            manager.snapshot_sets[idx].check_mutable()?;
            for snapshot in manager.snapshot_sets[idx].snapshots_mut() {
                let provider_kind = snapshot.provider.clone();
                if let Some(provider) = manager.providers.iter().find(|p| p.kind().to_string() == provider_kind) {
                    provider.deactivate_snapshot(snapshot)?;
                }
            }
            Ok(())
        })
    }

    pub fn set_autoactivate(&mut self, selection: &Selection, auto: bool) -> Result<usize> {
        self.for_each_matching_mut(selection, |manager, idx| {
            manager.snapshot_sets[idx].check_mutable()?;
            for snapshot in manager.snapshot_sets[idx].snapshots_mut() {
                let provider_kind = snapshot.provider.clone();
                if let Some(provider) = manager.providers.iter().find(|p| p.kind().to_string() == provider_kind) {
                    provider.set_autoactivate(snapshot, auto)?;
                }
            }
            manager.snapshot_sets[idx].set_autoactivate(auto);
            Ok(())
        })
    }

    fn for_each_matching_mut(&mut self, selection: &Selection, mut f: impl FnMut(&mut Manager, usize) -> Result<()>) -> Result<usize> {
        let matching: Vec<usize> = self
            .snapshot_sets
            .iter()
            .enumerate()
            .filter(|(_, s)| selection_matches_set(selection, s))
            .map(|(i, _)| i)
            .collect();
        if matching.is_empty() {
            return Err(Error::not_found(format!("could not find snapshot sets matching {selection:?}")));
        }
        let mut count = 0;
        for idx in matching {
            f(self, idx)?;
            count += 1;
        }
        Ok(count)
    }

    /// Move `sources` out of `src_name` into either a newly-named set
    /// (`dst_name` given, i.e. split) or delete them outright (prune).
    pub fn split_snapshot_set(&mut self, src_name: &str, dst_name: Option<&str>, sources: &[String]) -> Result<()> {
        if sources.is_empty() {
            return Err(Error::argument("at least one source is required"));
        }
        let idx = *self.by_name.get(src_name).ok_or_else(|| Error::not_found(format!("no snapshot set named {src_name}")))?;
        self.snapshot_sets[idx].check_mutable()?;

        let mut set = self.snapshot_sets[idx].clone();
        let (moved, remaining): (Vec<Snapshot>, Vec<Snapshot>) =
            set.snapshots().iter().cloned().partition(|s| sources.contains(&s.origin));
        if moved.is_empty() {
            return Err(Error::not_found(format!("none of the given sources belong to {src_name}")));
        }
        if remaining.is_empty() {
            return Err(Error::argument("split would leave the source set empty"));
        }

        let timestamp = set.timestamp();
        set = SnapshotSet::new(src_name, timestamp, remaining)?;
        self.snapshot_sets[idx] = set;

        if let Some(dst_name) = dst_name {
            self.validate_snapset_name(dst_name)?;
            let mut moved_renamed = Vec::new();
            for mut snapshot in moved {
                let provider_kind = snapshot.provider.clone();
                if let Some(provider) = self.providers.iter().find(|p| p.kind().to_string() == provider_kind) {
                    provider.rename_snapshot(&mut snapshot, dst_name)?;
                }
                moved_renamed.push(snapshot);
            }
            let dst_set = SnapshotSet::new(dst_name, timestamp, moved_renamed)?;
            let dst_idx = self.snapshot_sets.len();
            self.snapshot_sets.push(dst_set);
            self.by_name.insert(dst_name.to_string(), dst_idx);
            self.by_uuid.insert(self.snapshot_sets[dst_idx].uuid(), dst_idx);
        } else {
            for snapshot in &moved {
                if let Some(provider) = self.provider_for_snapshot(snapshot) {
                    provider.delete_snapshot(snapshot)?;
                }
            }
        }
        self.rebuild_indices();
        Ok(())
    }

    pub fn snapshot_sets(&self) -> &[SnapshotSet] {
        &self.snapshot_sets
    }
}

fn selection_matches_set(sel: &Selection, set: &SnapshotSet) -> bool {
    if let Some(name) = &sel.name {
        if set.name() != name {
            return false;
        }
    }
    if let Some(uuid) = sel.uuid {
        if set.uuid() != uuid {
            return false;
        }
    }
    if let Some(basename) = &sel.basename {
        if &set.basename() != basename {
            return false;
        }
    }
    if let Some(index) = sel.index {
        if set.basename_index().1 != Some(index) {
            return false;
        }
    }
    if let Some(timestamp) = sel.timestamp {
        if set.timestamp() != timestamp {
            return false;
        }
    }
    if let Some(n) = sel.nr_snapshots {
        if set.snapshots().len() != n {
            return false;
        }
    }
    if let Some(mp) = &sel.mount_point {
        if !set.mount_points().iter().any(|m| m == mp) {
            return false;
        }
    }
    true
}

fn selection_matches_snapshot(sel: &Selection, snapshot: &Snapshot) -> bool {
    if let Some(name) = &sel.snapshot_name {
        if &snapshot.name != name {
            return false;
        }
    }
    if let Some(uuid) = sel.snapshot_uuid {
        if snapshot.uuid != uuid {
            return false;
        }
    }
    if let Some(origin) = &sel.origin {
        if &snapshot.origin != origin {
            return false;
        }
    }
    if let Some(mp) = &sel.mount_point {
        if &snapshot.mount_point != mp {
            return false;
        }
    }
    if let Some(name) = &sel.name {
        if &snapshot.snapset_name != name {
            return false;
        }
    }
    true
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn source_spec_parses_trailing_size_policy() {
        let spec = SourceSpec::parse("/var:50%FREE");
        assert_eq!(spec.source, "/var");
        assert_eq!(spec.size_policy.as_deref(), Some("50%FREE"));
    }

    #[test]
    fn source_spec_without_policy_keeps_whole_path() {
        let spec = SourceSpec::parse("/var");
        assert_eq!(spec.source, "/var");
        assert!(spec.size_policy.is_none());
    }

    #[test]
    fn autoindex_picks_lowest_unused_suffix() {
        let providers: Vec<Box<dyn Provider>> = Vec::new();
        let dir = tempfile::tempdir().unwrap();
        let mut manager = Manager::with_lock_path(
            providers,
            None,
            dir.path().join("manager.lock"),
            dir.path().join("fstab"),
        )
        .unwrap();
        assert_eq!(manager.next_autoindex("hourly"), 0);
        manager.by_name.insert("hourly.0".to_string(), 0);
        assert_eq!(manager.next_autoindex("hourly"), 1);
    }
}
