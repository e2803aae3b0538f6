//! Calendar-driven schedules, garbage-collection policies, and systemd timer
//! control for the snapshot set manager (spec §4.5).

mod calendar;
mod gc_policy;
mod schedule;
mod scheduler;
mod timer;

pub use calendar::CalendarSpec;
pub use gc_policy::{GcPolicy, GcPolicyType};
pub use schedule::Schedule;
pub use scheduler::{default_schedule_dir, Scheduler, SnapshotSetGc, GC_CALENDAR_SPEC};
pub use timer::{NullTimer, SystemdTimer, Timer, TimerStatus, TimerType};
