//! Size policy parsing and evaluation (spec §4.3, §3A).

use crate::error::{Error, Result};

/// Sector size used for generic rounding. Evaluation always rounds up.
pub const SECTOR_SIZE: u64 = 512;

/// Minimum possible LVM2 CoW snapshot size (512 MiB), enforced by the LVM2-CoW
/// provider on top of the generic sector rounding performed here.
pub const MIN_LVM2_COW_SNAPSHOT_SIZE: u64 = 512 * 1024 * 1024;

/// Default `%USED` value applied when no explicit policy is given and the
/// source has a mount point.
const DEFAULT_PERCENT_USED: u64 = 200;

/// Default `%SIZE` value applied when no explicit policy is given and the
/// source has no mount point (a bare block device).
const DEFAULT_PERCENT_SIZE: u64 = 25;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SizePolicy {
    Fixed(u64),
    PercentFree(u64),
    PercentUsed(u64),
    PercentSize(u64),
}

/// The volume statistics a policy is evaluated against.
#[derive(Debug, Clone, Copy, Default)]
pub struct VolumeStats {
    pub free: u64,
    pub used: u64,
    pub dev_size: u64,
}

impl SizePolicy {
    /// Parse a policy string per spec §4.3. `has_mount` controls the default
    /// chosen when `policy` is `None` and whether `%USED` is legal.
    pub fn parse(policy: Option<&str>, has_mount: bool) -> Result<Self> {
        let Some(spec) = policy else {
            return Ok(if has_mount {
                SizePolicy::PercentUsed(DEFAULT_PERCENT_USED)
            } else {
                SizePolicy::PercentSize(DEFAULT_PERCENT_SIZE)
            });
        };
        let spec = spec.trim();
        if spec.is_empty() {
            return Err(Error::size_policy("empty size policy"));
        }

        if let Some(pct_str) = spec.strip_suffix("%FREE") {
            let pct = parse_percent(pct_str)?;
            if pct > 100 {
                return Err(Error::size_policy("%FREE must be <= 100"));
            }
            return Ok(SizePolicy::PercentFree(pct));
        }
        if let Some(pct_str) = spec.strip_suffix("%USED") {
            if !has_mount {
                return Err(Error::size_policy("%USED requires a mount point"));
            }
            let pct = parse_percent(pct_str)?;
            return Ok(SizePolicy::PercentUsed(pct));
        }
        if let Some(pct_str) = spec.strip_suffix("%SIZE") {
            let pct = parse_percent(pct_str)?;
            if pct > 100 {
                return Err(Error::size_policy("%SIZE must be <= 100"));
            }
            return Ok(SizePolicy::PercentSize(pct));
        }

        parse_fixed(spec).map(SizePolicy::Fixed)
    }

    /// Evaluate the policy to a concrete byte count, rounded up to a sector
    /// multiple. Callers that need the LVM2-CoW floor/extent rounding apply it
    /// on top of this result.
    pub fn evaluate(&self, stats: VolumeStats) -> Result<u64> {
        let raw = match *self {
            SizePolicy::Fixed(bytes) => bytes,
            SizePolicy::PercentFree(pct) => stats.free * pct / 100,
            SizePolicy::PercentUsed(pct) => stats.used * pct / 100,
            SizePolicy::PercentSize(pct) => stats.dev_size * pct / 100,
        };
        Ok(round_up_to_sector(raw))
    }
}

fn parse_percent(s: &str) -> Result<u64> {
    s.parse::<u64>()
        .map_err(|_| Error::size_policy(format!("invalid percentage: {s}")))
}

/// Parse `"<N><unit>"` with `unit` one of `B,K,M,G,T,P,E,Z` (binary, base 1024).
fn parse_fixed(spec: &str) -> Result<u64> {
    let (num_str, unit) = match spec.chars().last() {
        Some(c) if c.is_ascii_alphabetic() => (&spec[..spec.len() - 1], c.to_ascii_uppercase()),
        Some(_) => (spec, 'B'),
        None => return Err(Error::size_policy("empty size policy")),
    };
    let n: u64 = num_str
        .parse()
        .map_err(|_| Error::size_policy(format!("invalid size value: {spec}")))?;
    let k = match unit {
        'B' => 0,
        'K' => 1,
        'M' => 2,
        'G' => 3,
        'T' => 4,
        'P' => 5,
        'E' => 6,
        'Z' => 7,
        other => return Err(Error::size_policy(format!("unknown size unit: {other}"))),
    };
    Ok(n * 1024u64.pow(k))
}

pub fn round_up_to_sector(bytes: u64) -> u64 {
    if bytes % SECTOR_SIZE == 0 {
        bytes
    } else {
        (bytes / SECTOR_SIZE + 1) * SECTOR_SIZE
    }
}

/// Apply the LVM2-CoW floor (512 MiB) and round to the volume group's extent
/// size, per spec §4.3.
pub fn apply_lvm2_cow_floor(bytes: u64, vg_extent_size: u64) -> u64 {
    let floored = bytes.max(MIN_LVM2_COW_SNAPSHOT_SIZE);
    if vg_extent_size == 0 {
        return floored;
    }
    if floored % vg_extent_size == 0 {
        floored
    } else {
        (floored / vg_extent_size + 1) * vg_extent_size
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_with_mount_is_percent_used_200() {
        let p = SizePolicy::parse(None, true).unwrap();
        assert_eq!(p, SizePolicy::PercentUsed(200));
    }

    #[test]
    fn default_without_mount_is_percent_size_25() {
        let p = SizePolicy::parse(None, false).unwrap();
        assert_eq!(p, SizePolicy::PercentSize(25));
    }

    #[test]
    fn percent_used_without_mount_is_error() {
        assert!(SizePolicy::parse(Some("50%USED"), false).is_err());
    }

    #[test]
    fn percent_free_over_100_is_error() {
        assert!(SizePolicy::parse(Some("150%FREE"), true).is_err());
    }

    #[test]
    fn fixed_size_parses_units() {
        assert_eq!(
            SizePolicy::parse(Some("10G"), false).unwrap(),
            SizePolicy::Fixed(10 * 1024 * 1024 * 1024)
        );
    }

    #[test]
    fn evaluate_rounds_up_to_sector() {
        let p = SizePolicy::Fixed(513);
        let stats = VolumeStats::default();
        assert_eq!(p.evaluate(stats).unwrap(), 1024);
    }

    #[test]
    fn evaluate_exact_sector_multiple_unchanged() {
        let p = SizePolicy::Fixed(1024);
        assert_eq!(p.evaluate(VolumeStats::default()).unwrap(), 1024);
    }

    #[test]
    fn lvm2_cow_floor_applies() {
        let small = round_up_to_sector(1024);
        let floored = apply_lvm2_cow_floor(small, 4 * 1024 * 1024);
        assert_eq!(floored, MIN_LVM2_COW_SNAPSHOT_SIZE);
    }
}
