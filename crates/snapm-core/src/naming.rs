//! Stable snapshot naming codec (spec §6).
//!
//! Providers encode `snapset_name`, `timestamp` and the mount point into the
//! backend object's name so that `discover_snapshots` can reconstruct set
//! membership purely from storage state, with no side database.

/// Encode the mount point the way providers do: escape literal `-` as `--`
/// first, then replace `/` with `-`, so decoding can tell a path separator
/// from a hyphen that was already part of a path component.
pub fn encode_mount_point(mount_point: &str) -> String {
    mount_point.replace('-', "--").replace('/', "-")
}

/// Inverse of [`encode_mount_point`]: a lone `-` is a path separator, a
/// doubled `--` is one literal `-`.
fn decode_mount_point(encoded: &str) -> String {
    let mut decoded = String::with_capacity(encoded.len());
    let mut chars = encoded.chars().peekable();
    while let Some(c) = chars.next() {
        if c == '-' {
            if chars.peek() == Some(&'-') {
                chars.next();
                decoded.push('-');
            } else {
                decoded.push('/');
            }
        } else {
            decoded.push(c);
        }
    }
    decoded
}

/// Build `<origin_lv>-snapset_<snapset_name>_<timestamp>_<encoded_mount_point>`.
pub fn encode_snapshot_name(origin_lv: &str, snapset_name: &str, timestamp: i64, mount_point: &str) -> String {
    format!(
        "{origin_lv}-snapset_{snapset_name}_{timestamp}_{}",
        encode_mount_point(mount_point)
    )
}

/// Inverse of [`encode_snapshot_name`]. Returns `None` for unparsable names
/// (callers skip these during discovery rather than erroring).
pub fn parse_snapshot_name(name: &str, origin_lv: &str) -> Option<(String, i64, String)> {
    let prefix = format!("{origin_lv}-snapset_");
    let rest = name.strip_prefix(&prefix)?;

    // rest == "<snapset_name>_<timestamp>_<encoded_mount_point>"
    // snapset_name itself may not contain '_' (forbidden at create time), so
    // splitting on '_' from the left gives exactly three fields.
    let mut parts = rest.splitn(3, '_');
    let snapset_name = parts.next()?.to_string();
    let timestamp: i64 = parts.next()?.parse().ok()?;
    let encoded_mount = parts.next()?;

    Some((snapset_name, timestamp, decode_mount_point(encoded_mount)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trip_with_mount_point() {
        let name = encode_snapshot_name("vg0-root", "testset0", 1_700_000_000, "/var");
        assert_eq!(name, "vg0-root-snapset_testset0_1700000000_-var");
        let parsed = parse_snapshot_name(&name, "vg0-root").unwrap();
        assert_eq!(parsed, ("testset0".to_string(), 1_700_000_000, "/var".to_string()));
    }

    #[test]
    fn round_trip_with_root_mount_point() {
        let name = encode_snapshot_name("vg0-root", "testset0", 1_700_000_000, "/");
        let parsed = parse_snapshot_name(&name, "vg0-root").unwrap();
        assert_eq!(parsed.2, "/");
    }

    #[test]
    fn round_trip_with_hyphen_in_mount_point() {
        let name = encode_snapshot_name("vg0-root", "testset0", 1_700_000_000, "/mnt/my-data");
        let parsed = parse_snapshot_name(&name, "vg0-root").unwrap();
        assert_eq!(parsed.2, "/mnt/my-data");
    }

    #[test]
    fn round_trip_block_device_source_has_empty_mount_point() {
        let name = encode_snapshot_name("vg0-data", "testset0", 1_700_000_000, "");
        let parsed = parse_snapshot_name(&name, "vg0-data").unwrap();
        assert_eq!(parsed.2, "");
    }

    #[test]
    fn unparsable_name_is_skipped() {
        assert!(parse_snapshot_name("not-a-snapshot-name", "vg0-root").is_none());
    }
}
