//! `snapm schedule ...`: calendar-driven schedule and GC policy commands.

use std::sync::Arc;

use anyhow::{anyhow, Result};
use clap::{Args, Subcommand};

use snapm_scheduler::{default_schedule_dir, GcPolicy, Scheduler, SystemdTimer};

fn open_scheduler() -> Result<Scheduler> {
    Scheduler::load(default_schedule_dir(), Arc::new(SystemdTimer::new())).map_err(|e| anyhow!(e))
}

/// Parse a compact `kind[:k1=v1,k2=v2,...]` GC policy description, e.g.
/// `count:keep_count=4`, `age:keep_weeks=2`, `timeline:keep_daily=7,keep_weekly=4`, `all`.
fn parse_gc_policy(spec: &str) -> Result<GcPolicy> {
    let (kind, params) = spec.split_once(':').unwrap_or((spec, ""));
    let mut fields: std::collections::HashMap<&str, u32> = std::collections::HashMap::new();
    for pair in params.split(',').filter(|p| !p.is_empty()) {
        let (key, value) = pair.split_once('=').ok_or_else(|| anyhow!("malformed GC policy field '{pair}'"))?;
        fields.insert(key, value.parse().map_err(|_| anyhow!("invalid value for '{key}'"))?);
    }
    let get = |f: &mut std::collections::HashMap<&str, u32>, key: &str| f.remove(key).unwrap_or(0);

    Ok(match kind {
        "all" => GcPolicy::All { policy_name: "ALL".to_string() },
        "count" => GcPolicy::Count { policy_name: "COUNT".to_string(), keep_count: get(&mut fields, "keep_count") },
        "age" => GcPolicy::Age {
            policy_name: "AGE".to_string(),
            keep_years: get(&mut fields, "keep_years"),
            keep_months: get(&mut fields, "keep_months"),
            keep_weeks: get(&mut fields, "keep_weeks"),
            keep_days: get(&mut fields, "keep_days"),
        },
        "timeline" => GcPolicy::Timeline {
            policy_name: "TIMELINE".to_string(),
            keep_yearly: get(&mut fields, "keep_yearly"),
            keep_quarterly: get(&mut fields, "keep_quarterly"),
            keep_monthly: get(&mut fields, "keep_monthly"),
            keep_weekly: get(&mut fields, "keep_weekly"),
            keep_daily: get(&mut fields, "keep_daily"),
            keep_hourly: get(&mut fields, "keep_hourly"),
        },
        other => return Err(anyhow!("unknown GC policy kind '{other}'")),
    })
}

#[derive(Args)]
pub struct CreateArgs {
    name: String,
    #[arg(required = true)]
    sources: Vec<String>,
    #[arg(long)]
    default_size_policy: Option<String>,
    #[arg(long)]
    autoindex: bool,
    /// systemd OnCalendar-style expression, e.g. `*-*-* *:00:00`
    #[arg(long)]
    calendar: String,
    /// Compact GC policy spec, e.g. `count:keep_count=4`
    #[arg(long)]
    gc: String,
    #[arg(long)]
    boot: bool,
    #[arg(long)]
    revert: bool,
}

#[derive(Args)]
pub struct NameArgs {
    name: String,
}

#[derive(Subcommand)]
pub enum ScheduleCommands {
    /// Create a new schedule
    Create(CreateArgs),
    /// List configured schedules
    List,
    /// Delete a schedule
    Delete(NameArgs),
    /// Enable a schedule's timers
    Enable(NameArgs),
    /// Disable a schedule's timers
    Disable(NameArgs),
}

impl ScheduleCommands {
    pub async fn run(self) -> Result<()> {
        match self {
            ScheduleCommands::Create(args) => Self::create(args),
            ScheduleCommands::List => Self::list(),
            ScheduleCommands::Delete(args) => Self::delete(args),
            ScheduleCommands::Enable(args) => Self::enable(args),
            ScheduleCommands::Disable(args) => Self::disable(args),
        }
    }

    fn create(args: CreateArgs) -> Result<()> {
        let mut scheduler = open_scheduler()?;
        let gc_policy = parse_gc_policy(&args.gc)?;
        scheduler
            .create(&args.name, args.sources, args.default_size_policy, args.autoindex, &args.calendar, gc_policy, args.boot, args.revert)
            .map_err(|e| anyhow!(e))
    }

    fn list() -> Result<()> {
        let scheduler = open_scheduler()?;
        for schedule in scheduler.schedules() {
            println!("{} calendar={} gc={} sources={:?}", schedule.name, schedule.calendarspec, schedule.gc_policy.name(), schedule.sources);
        }
        Ok(())
    }

    fn delete(args: NameArgs) -> Result<()> {
        let mut scheduler = open_scheduler()?;
        scheduler.delete(&args.name).map_err(|e| anyhow!(e))
    }

    fn enable(args: NameArgs) -> Result<()> {
        let mut scheduler = open_scheduler()?;
        scheduler.enable(&args.name, true).map_err(|e| anyhow!(e))
    }

    fn disable(args: NameArgs) -> Result<()> {
        let mut scheduler = open_scheduler()?;
        scheduler.disable(&args.name).map_err(|e| anyhow!(e))
    }
}
