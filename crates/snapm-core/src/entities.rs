//! Snapshot / SnapshotSet entities (spec §3).

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::{Error, Result};

/// Fixed v5 namespace used for every UUID derived within this crate, so the
/// same `(name, timestamp)` pair always produces the same UUID across process
/// restarts and providers.
pub const NAMESPACE_SNAPSHOT_SET: Uuid = Uuid::from_bytes([
    0x6b, 0xa7, 0xb8, 0x14, 0x9d, 0xad, 0x11, 0xd1, 0x80, 0xb4, 0x00, 0xc0, 0x4f, 0xd4, 0x30, 0xc8,
]);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SnapStatus {
    Active,
    Inactive,
    Invalid,
    Reverting,
}

impl SnapStatus {
    /// Aggregate a set of member statuses per the precedence
    /// `Invalid > Reverting > Inactive > Active`.
    pub fn aggregate<I: IntoIterator<Item = SnapStatus>>(statuses: I) -> SnapStatus {
        let mut any_invalid = false;
        let mut any_reverting = false;
        let mut any_inactive = false;
        let mut any = false;
        for s in statuses {
            any = true;
            match s {
                SnapStatus::Invalid => any_invalid = true,
                SnapStatus::Reverting => any_reverting = true,
                SnapStatus::Inactive => any_inactive = true,
                SnapStatus::Active => {}
            }
        }
        if !any {
            return SnapStatus::Invalid;
        }
        if any_invalid {
            SnapStatus::Invalid
        } else if any_reverting {
            SnapStatus::Reverting
        } else if any_inactive {
            SnapStatus::Inactive
        } else {
            SnapStatus::Active
        }
    }
}

/// One provider-created point-in-time copy of a single source.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Snapshot {
    pub name: String,
    pub uuid: Uuid,
    pub snapset_name: String,
    /// `None` means "no index" (the set's name has no `.N` suffix).
    pub snapset_index: Option<u32>,
    pub origin: String,
    pub timestamp: i64,
    pub mount_point: String,
    pub provider: String,
    pub status: SnapStatus,
    pub size: u64,
    pub free: u64,
    pub autoactivate: bool,
    pub devpath: String,
}

impl Snapshot {
    pub fn new(
        name: impl Into<String>,
        snapset_name: impl Into<String>,
        snapset_index: Option<u32>,
        origin: impl Into<String>,
        timestamp: i64,
        mount_point: impl Into<String>,
        provider: impl Into<String>,
        size: u64,
        free: u64,
    ) -> Self {
        let name = name.into();
        let uuid = Uuid::new_v5(&NAMESPACE_SNAPSHOT_SET, name.as_bytes());
        Snapshot {
            uuid,
            name,
            snapset_name: snapset_name.into(),
            snapset_index,
            origin: origin.into(),
            timestamp,
            mount_point: mount_point.into(),
            provider: provider.into(),
            status: SnapStatus::Inactive,
            size,
            free,
            autoactivate: false,
            devpath: String::new(),
        }
    }

    /// Rename produces a fresh UUID: `uuid = uuid5(new_name)`.
    pub fn rename(&mut self, new_name: impl Into<String>) {
        let new_name = new_name.into();
        self.uuid = Uuid::new_v5(&NAMESPACE_SNAPSHOT_SET, new_name.as_bytes());
        self.name = new_name;
    }

    /// `devpath` non-empty iff `status == Active` (spec §3 invariant).
    pub fn check_devpath_invariant(&self) -> Result<()> {
        let active = self.status == SnapStatus::Active;
        let has_devpath = !self.devpath.is_empty();
        if active != has_devpath {
            return Err(Error::state(format!(
                "snapshot {} violates devpath/status invariant (status={:?}, devpath={:?})",
                self.name, self.status, self.devpath
            )));
        }
        Ok(())
    }

    pub fn check_mutable(&self) -> Result<()> {
        if self.status == SnapStatus::Reverting {
            return Err(Error::state(format!(
                "snapshot {} is reverting, no mutating operations permitted",
                self.name
            )));
        }
        Ok(())
    }
}

/// Compute the set's name with its autoindex suffix, if any.
pub fn set_name_with_index(basename: &str, index: Option<u32>) -> String {
    match index {
        Some(n) => format!("{basename}.{n}"),
        None => basename.to_string(),
    }
}

/// An ordered group of Snapshots sharing one timestamp.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SnapshotSet {
    name: String,
    uuid: Uuid,
    timestamp: i64,
    snapshots: Vec<Snapshot>,
    pub boot_entry: Option<Uuid>,
    pub revert_entry: Option<Uuid>,
}

impl SnapshotSet {
    /// Construct a new set. Fails if `snapshots` is empty or members disagree
    /// on `timestamp` (spec §3 invariant).
    pub fn new(name: impl Into<String>, timestamp: i64, snapshots: Vec<Snapshot>) -> Result<Self> {
        if snapshots.is_empty() {
            return Err(Error::argument("a snapshot set must have at least one member"));
        }
        if snapshots.iter().any(|s| s.timestamp != timestamp) {
            return Err(Error::state(
                "all members of a snapshot set must share the set's timestamp",
            ));
        }
        let name = name.into();
        let uuid = Self::compute_uuid(&name, timestamp);
        Ok(SnapshotSet {
            name,
            uuid,
            timestamp,
            snapshots,
            boot_entry: None,
            revert_entry: None,
        })
    }

    fn compute_uuid(name: &str, timestamp: i64) -> Uuid {
        let material = format!("{name}{timestamp}");
        Uuid::new_v5(&NAMESPACE_SNAPSHOT_SET, material.as_bytes())
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn uuid(&self) -> Uuid {
        self.uuid
    }

    pub fn timestamp(&self) -> i64 {
        self.timestamp
    }

    pub fn snapshots(&self) -> &[Snapshot] {
        &self.snapshots
    }

    pub fn snapshots_mut(&mut self) -> &mut [Snapshot] {
        &mut self.snapshots
    }

    /// The `basename.N` split, or `(name, None)` if unindexed.
    pub fn basename_index(&self) -> (String, Option<u32>) {
        if let Some((base, idx)) = self.name.rsplit_once('.') {
            if let Ok(n) = idx.parse::<u32>() {
                return (base.to_string(), Some(n));
            }
        }
        (self.name.clone(), None)
    }

    pub fn basename(&self) -> String {
        self.basename_index().0
    }

    pub fn mount_points(&self) -> Vec<String> {
        self.snapshots
            .iter()
            .map(|s| s.mount_point.clone())
            .filter(|m| !m.is_empty())
            .collect()
    }

    pub fn sources(&self) -> Vec<String> {
        self.snapshots.iter().map(|s| s.origin.clone()).collect()
    }

    pub fn status(&self) -> SnapStatus {
        SnapStatus::aggregate(self.snapshots.iter().map(|s| s.status))
    }

    pub fn autoactivate(&self) -> bool {
        self.snapshots.iter().all(|s| s.autoactivate)
    }

    pub fn set_autoactivate(&mut self, value: bool) {
        for s in &mut self.snapshots {
            s.autoactivate = value;
        }
    }

    /// Replace every member with its provider-renamed counterpart, same
    /// order. Each member's `name`/`uuid` is the provider-encoded on-disk
    /// identity, distinct per source, not the bare set name — callers must
    /// rename each member through its provider before calling this (see
    /// `Manager::rename_snapshot_set`), never by overwriting `name` directly.
    pub fn replace_members(&mut self, snapshots: Vec<Snapshot>) {
        self.snapshots = snapshots;
    }

    /// Update the set's own name and UUID once every member has already
    /// been renamed on disk (via `replace_members`). Does not touch member
    /// names or UUIDs.
    pub fn rename(&mut self, new_name: impl Into<String>) -> Result<()> {
        if matches!(self.status(), SnapStatus::Invalid | SnapStatus::Reverting) {
            return Err(Error::state("cannot rename an Invalid or Reverting set"));
        }
        let new_name = new_name.into();
        self.uuid = Self::compute_uuid(&new_name, self.timestamp);
        self.name = new_name;
        Ok(())
    }

    pub fn check_mutable(&self) -> Result<()> {
        match self.status() {
            SnapStatus::Invalid => Err(Error::state(format!("set {} is Invalid", self.name))),
            SnapStatus::Reverting => Err(Error::state(format!("set {} is Reverting", self.name))),
            _ => Ok(()),
        }
    }

    pub fn any_mounted(&self) -> bool {
        self.snapshots
            .iter()
            .any(|s| s.status == SnapStatus::Active && !s.devpath.is_empty())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn snap(name: &str, snapset: &str, ts: i64, mount: &str) -> Snapshot {
        Snapshot::new(name, snapset, None, format!("/dev/{name}"), ts, mount, "test", 0, 0)
    }

    #[test]
    fn uuid_matches_name_and_timestamp() {
        let set = SnapshotSet::new("testset0", 1000, vec![snap("s0", "testset0", 1000, "/")]).unwrap();
        let expected = Uuid::new_v5(&NAMESPACE_SNAPSHOT_SET, b"testset01000");
        assert_eq!(set.uuid(), expected);
    }

    #[test]
    fn inconsistent_timestamps_rejected() {
        let a = snap("a", "t", 1000, "/");
        let b = snap("b", "t", 2000, "/var");
        assert!(SnapshotSet::new("t", 1000, vec![a, b]).is_err());
    }

    #[test]
    fn rename_changes_set_uuid_without_touching_member_identity() {
        let mut set = SnapshotSet::new("old", 1000, vec![snap("s0", "old", 1000, "/")]).unwrap();
        let old_uuid = set.uuid();
        let member_name_before = set.snapshots()[0].name.clone();
        set.rename("new").unwrap();
        assert_ne!(set.uuid(), old_uuid);
        assert_eq!(set.name(), "new");
        // member identity is only changed via `replace_members`, driven by
        // the owning provider, never by the set-level rename itself.
        assert_eq!(set.snapshots()[0].name, member_name_before);
    }

    #[test]
    fn replace_members_keeps_distinct_per_member_names() {
        let mut set = SnapshotSet::new(
            "old",
            1000,
            vec![snap("s0-old", "old", 1000, "/"), snap("s1-old", "old", 1000, "/var")],
        )
        .unwrap();
        let renamed = vec![snap("s0-new", "new", 1000, "/"), snap("s1-new", "new", 1000, "/var")];
        set.replace_members(renamed);
        set.rename("new").unwrap();
        assert_eq!(set.name(), "new");
        assert_ne!(set.snapshots()[0].name, set.snapshots()[1].name);
        assert_ne!(set.snapshots()[0].uuid, set.snapshots()[1].uuid);
    }

    #[test]
    fn status_aggregation_precedence() {
        assert_eq!(
            SnapStatus::aggregate([SnapStatus::Active, SnapStatus::Inactive]),
            SnapStatus::Inactive
        );
        assert_eq!(
            SnapStatus::aggregate([SnapStatus::Inactive, SnapStatus::Reverting]),
            SnapStatus::Reverting
        );
        assert_eq!(
            SnapStatus::aggregate([SnapStatus::Reverting, SnapStatus::Invalid]),
            SnapStatus::Invalid
        );
    }

    #[test]
    fn basename_index_parses_autoindex_suffix() {
        let set = SnapshotSet::new("hourly.3", 1000, vec![snap("s0", "hourly.3", 1000, "/")]).unwrap();
        assert_eq!(set.basename_index(), ("hourly".to_string(), Some(3)));
    }

    #[test]
    fn basename_index_without_suffix() {
        let set = SnapshotSet::new("testset0", 1000, vec![snap("s0", "testset0", 1000, "/")]).unwrap();
        assert_eq!(set.basename_index(), ("testset0".to_string(), None));
    }
}
