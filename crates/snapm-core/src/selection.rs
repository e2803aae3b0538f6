//! Disjunction-free queries over snapshot-set/snapshot entities.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// A query over entities. Every populated field must match (logical AND); an
/// empty `Selection` matches everything.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Selection {
    pub name: Option<String>,
    pub uuid: Option<Uuid>,
    pub basename: Option<String>,
    pub index: Option<u32>,
    pub timestamp: Option<i64>,
    pub nr_snapshots: Option<usize>,
    pub mount_points: Option<Vec<String>>,
    pub origin: Option<String>,
    pub mount_point: Option<String>,
    pub snapshot_name: Option<String>,
    pub snapshot_uuid: Option<Uuid>,
    pub sched_name: Option<String>,
}

impl Selection {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn by_name<S: Into<String>>(name: S) -> Self {
        Self {
            name: Some(name.into()),
            ..Default::default()
        }
    }

    pub fn by_uuid(uuid: Uuid) -> Self {
        Self {
            uuid: Some(uuid),
            ..Default::default()
        }
    }

    pub fn by_basename<S: Into<String>>(basename: S) -> Self {
        Self {
            basename: Some(basename.into()),
            ..Default::default()
        }
    }

    /// True iff this selection is precise enough to identify at most one entity.
    pub fn is_single(&self) -> bool {
        self.name.is_some() || self.uuid.is_some()
    }

    pub fn is_empty(&self) -> bool {
        self.name.is_none()
            && self.uuid.is_none()
            && self.basename.is_none()
            && self.index.is_none()
            && self.timestamp.is_none()
            && self.nr_snapshots.is_none()
            && self.mount_points.is_none()
            && self.origin.is_none()
            && self.mount_point.is_none()
            && self.snapshot_name.is_none()
            && self.snapshot_uuid.is_none()
            && self.sched_name.is_none()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_selection_matches_all() {
        let sel = Selection::new();
        assert!(sel.is_empty());
        assert!(!sel.is_single());
    }

    #[test]
    fn name_selection_is_single() {
        let sel = Selection::by_name("testset0");
        assert!(sel.is_single());
        assert!(!sel.is_empty());
    }

    #[test]
    fn basename_selection_is_not_single() {
        let sel = Selection::by_basename("hourly");
        assert!(!sel.is_single());
    }
}
