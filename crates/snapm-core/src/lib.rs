//! Shared entities, error taxonomy and size-policy evaluation for the
//! snapshot set manager. Every other crate in this workspace depends on this
//! one and re-uses its `Error`/`Result` rather than minting its own.

pub mod atomic;
pub mod entities;
pub mod error;
pub mod naming;
pub mod selection;
pub mod size_policy;
pub mod validate;

pub use atomic::atomic_write;
pub use entities::{set_name_with_index, SnapStatus, Snapshot, SnapshotSet, NAMESPACE_SNAPSHOT_SET};
pub use error::{Error, Result};
pub use naming::{encode_mount_point, encode_snapshot_name, parse_snapshot_name};
pub use selection::Selection;
pub use size_policy::{apply_lvm2_cow_floor, round_up_to_sector, SizePolicy, VolumeStats};
pub use validate::validate_name;
