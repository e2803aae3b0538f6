//! Provider/plugin trait surface for snapshot backends (spec §4.1).
//!
//! The concrete trait here is authored from how the donor workspace's
//! `ah-fs-snapshots` crate *consumes* its `FsSnapshotProvider` trait (the
//! trait's own crate, `ah-fs-snapshots-traits`, ships no source in the
//! retrieval pack) — `provider_for`'s scoring pattern and
//! `ProviderCapabilities`'s shape are reproduced here, generalized from
//! "pick one winning provider" to "route each source to the provider that
//! claims it" since a snapshot set may span LVM2 and Stratis sources at once.

use std::collections::HashMap;
use std::path::Path;
use std::sync::Mutex;

use snapm_core::{Result, SizePolicy, Snapshot};

/// The concrete snapshot backend a provider adapts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ProviderKind {
    Lvm2Cow,
    Lvm2Thin,
    Stratis,
}

impl std::fmt::Display for ProviderKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            ProviderKind::Lvm2Cow => "lvm2-cow",
            ProviderKind::Lvm2Thin => "lvm2-thin",
            ProviderKind::Stratis => "stratis",
        };
        f.write_str(s)
    }
}

/// What a provider reports about a candidate source, mirroring
/// `ah-fs-snapshots::ProviderCapabilities`.
#[derive(Debug, Clone)]
pub struct ProviderCapabilities {
    pub kind: ProviderKind,
    /// Higher wins when more than one provider claims the same source.
    pub score: u8,
    pub notes: Vec<String>,
}

/// A per-provider scratch map summing tentatively-reserved snapshot sizes
/// across every source touched by one create/resize (spec §4.1).
///
/// Scoped to a single create/resize and cleared by `end_transaction`.
#[derive(Debug, Default)]
pub struct TransactionHandle {
    reserved: Mutex<HashMap<String, u64>>,
}

impl TransactionHandle {
    pub fn new() -> Self {
        Self::default()
    }

    /// Reserve `bytes` against `pool_key` (a VG name or pool UUID) and return
    /// the running total reserved against that pool within this transaction.
    pub fn reserve(&self, pool_key: &str, bytes: u64) -> u64 {
        let mut guard = self.reserved.lock().expect("transaction mutex poisoned");
        let entry = guard.entry(pool_key.to_string()).or_insert(0);
        *entry += bytes;
        *entry
    }

    pub fn reserved_for(&self, pool_key: &str) -> u64 {
        self.reserved
            .lock()
            .expect("transaction mutex poisoned")
            .get(pool_key)
            .copied()
            .unwrap_or(0)
    }
}

/// A source to be snapshotted, with its resolved size policy.
#[derive(Debug, Clone)]
pub struct SourceRequest<'a> {
    pub source: &'a Path,
    pub mount_point: &'a str,
    pub policy: SizePolicy,
    pub snapset_name: &'a str,
    pub timestamp: i64,
}

/// The capability set a snapshot backend adapter implements (spec §4.1).
///
/// Implementations are expected to be blocking (they shell out to CLI
/// tooling); callers that need to stay off an async executor's thread wrap
/// calls in `tokio::task::spawn_blocking`, the same tradeoff
/// `ah-fs-snapshots-btrfs` makes by offering both sync and async entry
/// points over one blocking core.
pub trait Provider: Send + Sync {
    fn kind(&self) -> ProviderKind;

    fn info(&self) -> String {
        format!("{} provider", self.kind())
    }

    /// Probe whether this provider can claim `source` (and with what score).
    fn detect_capabilities(&self, source: &Path) -> ProviderCapabilities;

    /// Fails `Busy` if `source` is already part of an in-progress revert.
    fn can_snapshot(&self, source: &Path) -> Result<bool>;

    fn origin_from_mount_point(&self, mount_point: &Path) -> Result<Option<String>>;

    fn start_transaction(&self) -> TransactionHandle {
        TransactionHandle::new()
    }

    fn end_transaction(&self, _tx: TransactionHandle) -> Result<()> {
        Ok(())
    }

    fn check_create_snapshot(&self, tx: &TransactionHandle, req: &SourceRequest<'_>) -> Result<()>;

    fn create_snapshot(&self, tx: &TransactionHandle, req: &SourceRequest<'_>) -> Result<Snapshot>;

    fn rename_snapshot(&self, snapshot: &mut Snapshot, new_snapset_name: &str) -> Result<()>;

    fn check_resize_snapshot(&self, tx: &TransactionHandle, snapshot: &Snapshot, policy: SizePolicy) -> Result<()>;

    fn resize_snapshot(&self, snapshot: &mut Snapshot, policy: SizePolicy) -> Result<()>;

    fn check_revert_snapshot(&self, snapshot: &Snapshot) -> Result<()>;

    fn revert_snapshot(&self, snapshot: &mut Snapshot) -> Result<()>;

    fn delete_snapshot(&self, snapshot: &Snapshot) -> Result<()>;

    fn activate_snapshot(&self, snapshot: &mut Snapshot) -> Result<()>;

    fn deactivate_snapshot(&self, snapshot: &mut Snapshot) -> Result<()>;

    /// Best-effort per spec §9: providers that cannot express "don't
    /// auto-activate" should log and return `Ok(())` rather than error.
    fn set_autoactivate(&self, snapshot: &mut Snapshot, auto: bool) -> Result<()>;

    /// Reconstruct every snapshot set member this provider currently knows
    /// about purely from storage state (spec §4.1 naming contract).
    fn discover_snapshots(&self) -> Result<Vec<Snapshot>>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn transaction_handle_sums_reservations_per_pool() {
        let tx = TransactionHandle::new();
        assert_eq!(tx.reserve("vg0", 100), 100);
        assert_eq!(tx.reserve("vg0", 50), 150);
        assert_eq!(tx.reserve("vg1", 10), 10);
        assert_eq!(tx.reserved_for("vg0"), 150);
        assert_eq!(tx.reserved_for("vg1"), 10);
        assert_eq!(tx.reserved_for("nonexistent"), 0);
    }
}
