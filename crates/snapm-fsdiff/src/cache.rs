//! Diff result cache at `/var/cache/snapm/diffcache` (spec §4.6, §6).

use std::fs;
use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};
use std::time::{SystemTime, UNIX_EPOCH};

use uuid::Uuid;

use snapm_core::{Error, Result, NAMESPACE_SNAPSHOT_SET};

use crate::engine::FsDiffResults;
use crate::options::DiffOptions;
use crate::procinfo::get_total_memory;

pub const DEFAULT_CACHE_DIR: &str = "/var/cache/snapm/diffcache";
const CACHE_DIR_MODE: u32 = 0o700;
const DEFAULT_EXPIRES_SECS: i64 = 900;
/// Magic fallback timestamp for a root file system with no snapset, mirroring
/// the donor's fixed placeholder used to derive a stable cache identity.
const ROOT_TIMESTAMP: i64 = 282_528_000;

/// One side of a comparison: a mounted tree plus the identity used to key
/// cache entries (the owning snapset's UUID, or a fallback for the live
/// root file system).
#[derive(Debug, Clone)]
pub struct DiffRoot {
    pub name: String,
    pub root: PathBuf,
    pub snapset_uuid: Option<Uuid>,
}

impl DiffRoot {
    pub fn new(name: impl Into<String>, root: impl Into<PathBuf>, snapset_uuid: Option<Uuid>) -> Self {
        DiffRoot { name: name.into(), root: root.into(), snapset_uuid }
    }

    fn cache_uuid(&self) -> Uuid {
        self.snapset_uuid.unwrap_or_else(|| Uuid::new_v5(&NAMESPACE_SNAPSHOT_SET, format!("{}{ROOT_TIMESTAMP}", self.name).as_bytes()))
    }
}

fn ensure_cache_dir(dir: &Path) -> Result<()> {
    if !dir.exists() {
        fs::create_dir_all(dir).map_err(|e| Error::system(format!("failed to create diff cache dir {}: {e}", dir.display())))?;
    }
    let metadata = fs::metadata(dir).map_err(|e| Error::system(format!("failed to stat diff cache dir {}: {e}", dir.display())))?;
    if !metadata.is_dir() {
        return Err(Error::system(format!("diff cache dir {} exists but is not a directory", dir.display())));
    }
    if metadata.permissions().mode() & 0o777 != CACHE_DIR_MODE {
        fs::set_permissions(dir, fs::Permissions::from_mode(CACHE_DIR_MODE))
            .map_err(|e| Error::system(format!("failed to set permissions on {}: {e}", dir.display())))?;
    }
    Ok(())
}

fn cache_file_name(root_a: &DiffRoot, root_b: &DiffRoot, options: &DiffOptions, timestamp: i64) -> Result<String> {
    let uuid_a = root_a.cache_uuid();
    let uuid_b = root_b.cache_uuid();
    if uuid_a == uuid_b {
        return Err(Error::invalid_identifier("cannot cache a diff between a mount and itself"));
    }
    Ok(format!("{uuid_a}.{uuid_b}.{}.{timestamp}.cache", options.options_hash()))
}

/// Maximum number of records to attempt to compress, scaled by total system
/// memory; `0` means unlimited.
fn max_cache_records() -> usize {
    match get_total_memory() {
        None => 1_000,
        Some(bytes) if bytes < 2 * (1 << 30) => 1_000,
        Some(bytes) if bytes < 4 * (1 << 30) => 10_000,
        Some(bytes) if bytes < 8 * (1 << 30) => 50_000,
        Some(bytes) if bytes < 16 * (1 << 30) => 100_000,
        _ => 0,
    }
}

pub fn now_secs() -> i64 {
    SystemTime::now().duration_since(UNIX_EPOCH).map(|d| d.as_secs() as i64).unwrap_or(0)
}

/// Attempt to load a cached comparison of `root_a`/`root_b` matching
/// `options`, pruning expired and unreadable entries as it scans.
/// `expires` is seconds (`0` disables expiry, negative selects the default).
pub fn load_cache(cache_dir: &Path, root_a: &DiffRoot, root_b: &DiffRoot, options: &DiffOptions, expires: i64) -> Result<FsDiffResults> {
    ensure_cache_dir(cache_dir)?;
    let expires = if expires < 0 { DEFAULT_EXPIRES_SECS } else { expires };

    let uuid_a = root_a.cache_uuid();
    let uuid_b = root_b.cache_uuid();
    if uuid_a == uuid_b {
        return Err(Error::invalid_identifier("cannot load a diff cache for a mount against itself"));
    }

    let entries = fs::read_dir(cache_dir).map_err(|e| Error::system(format!("failed to read diff cache dir: {e}")))?;
    for entry in entries {
        let entry = entry.map_err(|e| Error::system(format!("failed to read cache dir entry: {e}")))?;
        let file_name = entry.file_name().to_string_lossy().into_owned();
        if !file_name.ends_with(".cache") && !file_name.ends_with(".cache.zstd") {
            continue;
        }

        let stem = file_name.strip_suffix(".zstd").unwrap_or(&file_name);
        let parts: Vec<&str> = stem.split('.').collect();
        let [load_uuid_a, load_uuid_b, _opts_hash, timestamp_str, _ext] = parts[..] else {
            tracing::debug!(file = %file_name, "ignoring cache file with malformed name");
            continue;
        };

        let Ok(timestamp) = timestamp_str.parse::<i64>() else {
            tracing::debug!(file = %file_name, "ignoring cache file with invalid timestamp");
            continue;
        };

        let path = entry.path();
        if expires != 0 && timestamp < now_secs() - expires {
            tracing::info!(file = %file_name, "pruning expired diff cache entry");
            let _ = fs::remove_file(&path);
            continue;
        }

        if load_uuid_a != uuid_a.to_string() || load_uuid_b != uuid_b.to_string() {
            continue;
        }

        match read_cache_file(&path) {
            Ok(results) if &results.options == options => return Ok(results),
            Ok(_) => {
                tracing::debug!(file = %file_name, "ignoring cache entry with mismatched options");
                continue;
            }
            Err(err) => {
                tracing::warn!(file = %file_name, error = %err, "deleting unreadable diff cache file");
                let _ = fs::remove_file(&path);
                continue;
            }
        }
    }

    Err(Error::not_found("no matching diff cache file found"))
}

fn read_cache_file(path: &Path) -> Result<FsDiffResults> {
    let raw = fs::read(path).map_err(|e| Error::system(format!("failed to read cache file {}: {e}", path.display())))?;
    let decoded = if path.extension().and_then(|e| e.to_str()) == Some("zstd") {
        zstd::decode_all(&raw[..]).map_err(|e| Error::system(format!("failed to decompress cache file {}: {e}", path.display())))?
    } else {
        raw
    };
    serde_json::from_slice(&decoded).map_err(|e| Error::system(format!("malformed cache file {}: {e}", path.display())))
}

/// Persist `results` for `root_a`/`root_b`, compressing with `zstd` unless
/// the record count exceeds the memory-scaled threshold while content diffs
/// are enabled (compression of huge content-diff bodies risks excessive
/// transient memory use).
pub fn save_cache(cache_dir: &Path, root_a: &DiffRoot, root_b: &DiffRoot, results: &FsDiffResults) -> Result<()> {
    ensure_cache_dir(cache_dir)?;
    let file_name = cache_file_name(root_a, root_b, &results.options, results.timestamp)?;

    let limit = max_cache_records();
    let compress = !(limit > 0 && results.len() > limit && results.options.include_content_diffs);

    let encoded = serde_json::to_vec(results).map_err(|e| Error::system(format!("failed to encode diff cache: {e}")))?;

    let (file_name, payload) = if compress {
        let compressed = zstd::encode_all(&encoded[..], 0).map_err(|e| Error::system(format!("failed to compress diff cache: {e}")))?;
        (format!("{file_name}.zstd"), compressed)
    } else {
        (file_name, encoded)
    };

    let path = cache_dir.join(file_name);
    fs::write(&path, payload).map_err(|e| Error::system(format!("failed to write cache file {}: {e}", path.display())))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::FsDiffResults;

    #[test]
    fn round_trips_through_disk() {
        let dir = tempfile::tempdir().unwrap();
        let root_a = DiffRoot::new("a", "/mnt/a", Some(Uuid::new_v4()));
        let root_b = DiffRoot::new("b", "/mnt/b", Some(Uuid::new_v4()));
        let results = FsDiffResults::new(Vec::new(), DiffOptions::default(), 1_700_000_000);

        save_cache(dir.path(), &root_a, &root_b, &results).unwrap();
        let loaded = load_cache(dir.path(), &root_a, &root_b, &DiffOptions::default(), 0).unwrap();
        assert_eq!(loaded.timestamp, results.timestamp);
    }

    #[test]
    fn rejects_comparing_a_root_to_itself() {
        let dir = tempfile::tempdir().unwrap();
        let uuid = Some(Uuid::new_v4());
        let root_a = DiffRoot::new("a", "/mnt/a", uuid);
        let root_b = DiffRoot::new("a", "/mnt/a", uuid);
        let results = FsDiffResults::new(Vec::new(), DiffOptions::default(), 1_700_000_000);
        assert!(save_cache(dir.path(), &root_a, &root_b, &results).is_err());
    }

    #[test]
    fn missing_cache_is_not_found() {
        let dir = tempfile::tempdir().unwrap();
        let root_a = DiffRoot::new("a", "/mnt/a", Some(Uuid::new_v4()));
        let root_b = DiffRoot::new("b", "/mnt/b", Some(Uuid::new_v4()));
        let result = load_cache(dir.path(), &root_a, &root_b, &DiffOptions::default(), 0);
        assert!(result.is_err());
    }
}
