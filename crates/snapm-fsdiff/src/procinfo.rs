//! Process/system memory readouts via `/proc`, matching the donor
//! convention of reading procfs directly rather than adding a sysinfo
//! dependency (spec §4.6).

use std::fs;

const PROC_SELF_STATUS: &str = "/proc/self/status";
const PROC_MEMINFO: &str = "/proc/meminfo";

fn parse_kb_field(contents: &str, field: &str) -> Option<u64> {
    contents.lines().find_map(|line| {
        let rest = line.strip_prefix(field)?;
        let kb: u64 = rest.split_whitespace().next()?.parse().ok()?;
        Some(kb * 1024)
    })
}

/// Current process resident set size in bytes, or `None` if `/proc` is
/// unavailable or unparsable.
pub fn get_current_rss() -> Option<u64> {
    let contents = fs::read_to_string(PROC_SELF_STATUS).ok()?;
    parse_kb_field(&contents, "VmRSS:")
}

/// Total system memory in bytes, or `None` if `/proc` is unavailable or
/// unparsable.
pub fn get_total_memory() -> Option<u64> {
    let contents = fs::read_to_string(PROC_MEMINFO).ok()?;
    parse_kb_field(&contents, "MemTotal:")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_kb_field_from_sample_meminfo() {
        let sample = "MemTotal:       16384000 kB\nMemFree:         800000 kB\n";
        assert_eq!(parse_kb_field(sample, "MemTotal:"), Some(16384000 * 1024));
    }

    #[test]
    fn missing_field_returns_none() {
        let sample = "MemFree:         800000 kB\n";
        assert_eq!(parse_kb_field(sample, "MemTotal:"), None);
    }
}
