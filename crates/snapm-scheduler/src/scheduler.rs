//! The `Scheduler`: a map of named `Schedule` objects loaded from
//! `/etc/snapm/schedule.d/*.json`, each paired with a create timer and a GC
//! timer (spec §4.5).

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use snapm_core::{Error, Result, SnapshotSet};

use crate::gc_policy::GcPolicy;
use crate::schedule::Schedule;
use crate::timer::{Timer, TimerStatus, TimerType};

/// Fixed calendar expression for every schedule's GC timer.
pub const GC_CALENDAR_SPEC: &str = "*-*-* *:10:00";

pub fn default_schedule_dir() -> PathBuf {
    PathBuf::from("/etc/snapm/schedule.d")
}

/// A narrow collaborator the scheduler uses to enumerate and delete snapshot
/// sets during GC, without depending on the concrete `Manager` type.
pub trait SnapshotSetGc: Send + Sync {
    fn sets_with_basename(&self, basename: &str) -> Vec<SnapshotSet>;
    fn delete_set(&self, set: &SnapshotSet) -> Result<()>;
}

pub struct Scheduler {
    sched_dir: PathBuf,
    timer: Arc<dyn Timer>,
    schedules: HashMap<String, Schedule>,
}

impl Scheduler {
    /// Load every `*.json` file under `sched_dir`, skipping (and logging)
    /// malformed ones rather than failing the whole load.
    pub fn load(sched_dir: impl Into<PathBuf>, timer: Arc<dyn Timer>) -> Result<Self> {
        let sched_dir = sched_dir.into();
        let mut schedules = HashMap::new();
        if sched_dir.is_dir() {
            let entries = std::fs::read_dir(&sched_dir)
                .map_err(|e| Error::system(format!("failed to read schedule directory {}: {e}", sched_dir.display())))?;
            for entry in entries {
                let entry = entry.map_err(|e| Error::system(format!("failed to read directory entry: {e}")))?;
                let path = entry.path();
                if path.extension().and_then(|e| e.to_str()) != Some("json") {
                    continue;
                }
                match Schedule::from_file(&path) {
                    Ok(schedule) => {
                        schedules.insert(schedule.name.clone(), schedule);
                    }
                    Err(err) => tracing::warn!(path = %path.display(), error = %err, "skipping malformed schedule config"),
                }
            }
        }
        Ok(Scheduler { sched_dir, timer, schedules })
    }

    #[allow(clippy::too_many_arguments)]
    pub fn create(
        &mut self,
        name: &str,
        sources: Vec<String>,
        default_size_policy: Option<String>,
        autoindex: bool,
        calendarspec: &str,
        gc_policy: GcPolicy,
        boot: bool,
        revert: bool,
    ) -> Result<()> {
        if self.schedules.contains_key(name) {
            return Err(Error::exists(format!("schedule '{name}' already exists")));
        }
        let schedule = Schedule::new(name, sources, default_size_policy, autoindex, calendarspec, gc_policy, boot, revert)?;
        schedule.write_config(&self.sched_dir)?;
        self.schedules.insert(name.to_string(), schedule);
        Ok(())
    }

    /// Replace the schedule named `name` with a freshly constructed one,
    /// keeping the same slot. Used when callers change calendar expression,
    /// size policy, or GC policy parameters.
    #[allow(clippy::too_many_arguments)]
    pub fn edit(
        &mut self,
        name: &str,
        sources: Vec<String>,
        default_size_policy: Option<String>,
        autoindex: bool,
        calendarspec: &str,
        gc_policy: GcPolicy,
        boot: bool,
        revert: bool,
    ) -> Result<()> {
        if !self.schedules.contains_key(name) {
            return Err(Error::not_found(format!("no schedule named '{name}'")));
        }
        let schedule = Schedule::new(name, sources, default_size_policy, autoindex, calendarspec, gc_policy, boot, revert)?;
        schedule.write_config(&self.sched_dir)?;
        self.schedules.insert(name.to_string(), schedule);
        Ok(())
    }

    pub fn delete(&mut self, name: &str) -> Result<()> {
        if !self.schedules.contains_key(name) {
            return Err(Error::not_found(format!("no schedule named '{name}'")));
        }
        self.timer.stop(TimerType::Create, name)?;
        self.timer.stop(TimerType::Gc, name)?;
        self.timer.disable(TimerType::Create, name)?;
        self.timer.disable(TimerType::Gc, name)?;
        Schedule::delete_config(&self.sched_dir, name)?;
        self.schedules.remove(name);
        Ok(())
    }

    fn get(&self, name: &str) -> Result<&Schedule> {
        self.schedules.get(name).ok_or_else(|| Error::not_found(format!("no schedule named '{name}'")))
    }

    pub fn enable(&mut self, name: &str, start: bool) -> Result<()> {
        let schedule = self.get(name)?;
        let calendar = schedule.calendar()?;
        let gc_calendar = crate::calendar::CalendarSpec::parse(GC_CALENDAR_SPEC)?;
        self.timer.enable(TimerType::Create, name, &calendar)?;
        self.timer.enable(TimerType::Gc, name, &gc_calendar)?;
        if start {
            self.timer.start(TimerType::Create, name)?;
            self.timer.start(TimerType::Gc, name)?;
        }
        Ok(())
    }

    pub fn disable(&mut self, name: &str) -> Result<()> {
        self.get(name)?;
        self.timer.stop(TimerType::Create, name)?;
        self.timer.stop(TimerType::Gc, name)?;
        self.timer.disable(TimerType::Create, name)?;
        self.timer.disable(TimerType::Gc, name)
    }

    pub fn start(&mut self, name: &str) -> Result<()> {
        self.get(name)?;
        self.timer.start(TimerType::Create, name)?;
        self.timer.start(TimerType::Gc, name)
    }

    pub fn stop(&mut self, name: &str) -> Result<()> {
        self.get(name)?;
        self.timer.stop(TimerType::Create, name)?;
        self.timer.stop(TimerType::Gc, name)
    }

    pub fn is_enabled(&self, name: &str) -> Result<bool> {
        self.get(name)?;
        let create = self.timer.status(TimerType::Create, name)?;
        Ok(matches!(create, TimerStatus::Enabled | TimerStatus::Running))
    }

    pub fn is_running(&self, name: &str) -> Result<bool> {
        self.get(name)?;
        let create = self.timer.status(TimerType::Create, name)?;
        let gc = self.timer.status(TimerType::Gc, name)?;
        Ok(create == TimerStatus::Running && gc == TimerStatus::Running)
    }

    /// Resolve the schedule named `name`, select the sets sharing its
    /// basename, evaluate its GC policy, and delete every set it selects
    /// (including boot/revert entries). Returns the deleted set names.
    pub fn gc(&self, name: &str, source: &dyn SnapshotSetGc) -> Result<Vec<String>> {
        let schedule = self.get(name)?;
        let mut sets = source.sets_with_basename(name);
        sets.sort_by_key(|s| s.timestamp());
        let to_delete = schedule.gc_policy.evaluate(&sets);
        let mut deleted = Vec::new();
        for set in to_delete {
            source.delete_set(set)?;
            deleted.push(set.name().to_string());
        }
        Ok(deleted)
    }

    pub fn schedules(&self) -> impl Iterator<Item = &Schedule> {
        self.schedules.values()
    }

    pub fn schedule_dir(&self) -> &Path {
        &self.sched_dir
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::timer::NullTimer;
    use std::sync::Mutex;

    struct FakeGc {
        deleted: Mutex<Vec<String>>,
    }

    impl SnapshotSetGc for FakeGc {
        fn sets_with_basename(&self, _basename: &str) -> Vec<SnapshotSet> {
            Vec::new()
        }

        fn delete_set(&self, set: &SnapshotSet) -> Result<()> {
            self.deleted.lock().unwrap().push(set.name().to_string());
            Ok(())
        }
    }

    fn policy() -> GcPolicy {
        GcPolicy::Count { policy_name: "hourly".to_string(), keep_count: 3 }
    }

    #[test]
    fn create_then_enable_then_start_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let timer: Arc<dyn Timer> = Arc::new(NullTimer::new());
        let mut scheduler = Scheduler::load(dir.path(), timer).unwrap();
        scheduler.create("hourly", vec!["/var".to_string()], None, true, "*-*-* *:00:00", policy(), false, false).unwrap();
        assert!(!scheduler.is_enabled("hourly").unwrap());
        scheduler.enable("hourly", true).unwrap();
        assert!(scheduler.is_enabled("hourly").unwrap());
        assert!(scheduler.is_running("hourly").unwrap());
    }

    #[test]
    fn delete_removes_config_file() {
        let dir = tempfile::tempdir().unwrap();
        let timer: Arc<dyn Timer> = Arc::new(NullTimer::new());
        let mut scheduler = Scheduler::load(dir.path(), timer).unwrap();
        scheduler.create("hourly", vec!["/var".to_string()], None, true, "*-*-* *:00:00", policy(), false, false).unwrap();
        scheduler.delete("hourly").unwrap();
        assert!(!Schedule::config_path(dir.path(), "hourly").exists());
        assert!(scheduler.get("hourly").is_err());
    }

    #[test]
    fn reload_picks_up_persisted_schedule() {
        let dir = tempfile::tempdir().unwrap();
        {
            let timer: Arc<dyn Timer> = Arc::new(NullTimer::new());
            let mut scheduler = Scheduler::load(dir.path(), timer).unwrap();
            scheduler.create("hourly", vec!["/var".to_string()], None, true, "*-*-* *:00:00", policy(), false, false).unwrap();
        }
        let timer: Arc<dyn Timer> = Arc::new(NullTimer::new());
        let scheduler = Scheduler::load(dir.path(), timer).unwrap();
        assert_eq!(scheduler.schedules().count(), 1);
    }
}
