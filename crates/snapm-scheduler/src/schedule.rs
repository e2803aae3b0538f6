//! A named, persisted create+GC schedule (spec §4.5, §6).

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use snapm_core::{atomic_write, validate_name, Error, Result};

use crate::calendar::CalendarSpec;
use crate::gc_policy::GcPolicy;

const SCHEDULE_FILE_MODE: u32 = 0o644;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Schedule {
    pub name: String,
    pub sources: Vec<String>,
    pub default_size_policy: Option<String>,
    pub autoindex: bool,
    pub calendarspec: String,
    pub gc_policy: GcPolicy,
    #[serde(default)]
    pub boot: bool,
    #[serde(default)]
    pub revert: bool,
}

impl Schedule {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        name: impl Into<String>,
        sources: Vec<String>,
        default_size_policy: Option<String>,
        autoindex: bool,
        calendarspec: impl Into<String>,
        gc_policy: GcPolicy,
        boot: bool,
        revert: bool,
    ) -> Result<Self> {
        let name = name.into();
        validate_name(&name)?;
        if sources.is_empty() {
            return Err(Error::argument("a schedule requires at least one source"));
        }
        let mut seen = std::collections::HashSet::new();
        for source in &sources {
            if !seen.insert(source) {
                return Err(Error::argument(format!("duplicate schedule source '{source}'")));
            }
        }
        let calendarspec = calendarspec.into();
        // Validate it parses; the CalendarSpec itself is reconstructed lazily
        // by the scheduler when computing next-elapse times.
        CalendarSpec::parse(&calendarspec)?;

        Ok(Schedule { name, sources, default_size_policy, autoindex, calendarspec, gc_policy, boot, revert })
    }

    pub fn calendar(&self) -> Result<CalendarSpec> {
        CalendarSpec::parse(&self.calendarspec)
    }

    pub fn config_path(sched_dir: &Path, name: &str) -> PathBuf {
        sched_dir.join(format!("{name}.json"))
    }

    /// Atomically write this schedule's JSON config into `sched_dir`.
    pub fn write_config(&self, sched_dir: &Path) -> Result<()> {
        let path = Self::config_path(sched_dir, &self.name);
        let json = serde_json::to_vec_pretty(self).map_err(|e| Error::system(format!("failed to encode schedule '{}': {e}", self.name)))?;
        atomic_write(&path, &json, SCHEDULE_FILE_MODE)
    }

    pub fn delete_config(sched_dir: &Path, name: &str) -> Result<()> {
        let path = Self::config_path(sched_dir, name);
        match std::fs::remove_file(&path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(Error::system(format!("failed to remove schedule config {}: {e}", path.display()))),
        }
    }

    pub fn from_file(path: &Path) -> Result<Self> {
        let contents = std::fs::read_to_string(path).map_err(|e| Error::system(format!("failed to read schedule file {}: {e}", path.display())))?;
        serde_json::from_str(&contents).map_err(|e| Error::argument(format!("malformed schedule file {}: {e}", path.display())))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gc_policy::GcPolicy;

    fn sample_policy() -> GcPolicy {
        GcPolicy::Count { policy_name: "hourly".to_string(), keep_count: 24 }
    }

    #[test]
    fn rejects_duplicate_sources() {
        let result = Schedule::new(
            "hourly",
            vec!["/var".to_string(), "/var".to_string()],
            None,
            true,
            "*-*-* *:00:00",
            sample_policy(),
            false,
            false,
        );
        assert!(result.is_err());
    }

    #[test]
    fn rejects_invalid_calendarspec() {
        let result = Schedule::new("hourly", vec!["/var".to_string()], None, true, "not valid", sample_policy(), false, false);
        assert!(result.is_err());
    }

    #[test]
    fn round_trips_through_disk() {
        let dir = tempfile::tempdir().unwrap();
        let schedule =
            Schedule::new("hourly", vec!["/var".to_string()], None, true, "*-*-* *:00:00", sample_policy(), false, false).unwrap();
        schedule.write_config(dir.path()).unwrap();
        let loaded = Schedule::from_file(&Schedule::config_path(dir.path(), "hourly")).unwrap();
        assert_eq!(loaded.name, schedule.name);
        assert_eq!(loaded.sources, schedule.sources);
    }
}
